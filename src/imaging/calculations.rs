//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any I/O or images:
//! resize targets, crop rectangles, merge layouts, watermark placement and
//! the letterbox fit used by slideshow frames.

use super::params::{Anchor, CropArea, Edge, MergeDirection, ResizeMode, ResizeSpec};
use super::raster::Rect;

fn round_px(v: f64) -> u32 {
    v.round().max(1.0) as u32
}

/// Output dimensions of a non-crop resize.
///
/// `spec` must already be clamped. Crop mode returns the crop rectangle's
/// size (see [`crop_rect`]).
///
/// # Examples
/// ```
/// # use pixbatch::imaging::{calculate_resize_dimensions, ResizeSpec};
/// // 50% of 200x100 → 100x50
/// assert_eq!(calculate_resize_dimensions((200, 100), &ResizeSpec::percentage(50.0)), (100, 50));
/// ```
pub fn calculate_resize_dimensions(source: (u32, u32), spec: &ResizeSpec) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (w, h) = (src_w as f64, src_h as f64);

    match spec.mode {
        ResizeMode::Percentage => {
            let pct = spec.percentage as f64 / 100.0;
            (round_px(w * pct), round_px(h * pct))
        }
        ResizeMode::Fixed => {
            let (tw, th) = (spec.width, spec.height);
            if !spec.maintain_aspect {
                return (tw, th);
            }
            // Fit inside the box: the side that overshoots the source aspect shrinks.
            let aspect = w / h;
            if tw as f64 / th as f64 > aspect {
                (round_px(th as f64 * aspect), th)
            } else {
                (tw, round_px(tw as f64 / aspect))
            }
        }
        ResizeMode::Width => {
            let tw = spec.width;
            let th = if spec.maintain_aspect {
                round_px(h * (tw as f64 / w))
            } else {
                src_h
            };
            (tw, th)
        }
        ResizeMode::Height => {
            let th = spec.height;
            let tw = if spec.maintain_aspect {
                round_px(w * (th as f64 / h))
            } else {
                src_w
            };
            (tw, th)
        }
        ResizeMode::Crop => {
            let r = crop_rect(source, &spec.crop_area);
            (r.width, r.height)
        }
    }
}

/// Pixel rectangle selected by a percentage crop area.
///
/// Each edge is rounded independently, then the rectangle is kept inside the
/// source and at least one pixel wide and high.
pub fn crop_rect(source: (u32, u32), area: &CropArea) -> Rect {
    let (src_w, src_h) = source;
    let area = area.clamped();
    let scale = |dim: u32, pct: f32| (dim as f64 * pct as f64 / 100.0).round() as u32;

    let x = scale(src_w, area.x).min(src_w.saturating_sub(1));
    let y = scale(src_h, area.y).min(src_h.saturating_sub(1));
    let width = scale(src_w, area.width).max(1).min(src_w - x);
    let height = scale(src_h, area.height).max(1).min(src_h - y);
    Rect::new(x, y, width, height)
}

/// Canvas size and per-image placement for a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeLayout {
    pub width: u32,
    pub height: u32,
    /// Top-left corner of each input, in input order.
    pub positions: Vec<(u32, u32)>,
}

/// Lay images out in a row or column with `spacing` pixels between them.
///
/// Along the merge axis the canvas is the sum of sizes plus the gaps; across
/// it, the largest image. Smaller images are centred across the axis.
pub fn calculate_merge_layout(
    sizes: &[(u32, u32)],
    direction: MergeDirection,
    spacing: u32,
) -> MergeLayout {
    let gaps = spacing * (sizes.len().saturating_sub(1) as u32);
    let mut positions = Vec::with_capacity(sizes.len());

    match direction {
        MergeDirection::Horizontal => {
            let height = sizes.iter().map(|s| s.1).max().unwrap_or(0);
            let mut x = 0;
            for &(w, h) in sizes {
                positions.push((x, (height - h) / 2));
                x += w + spacing;
            }
            MergeLayout {
                width: sizes.iter().map(|s| s.0).sum::<u32>() + gaps,
                height,
                positions,
            }
        }
        MergeDirection::Vertical => {
            let width = sizes.iter().map(|s| s.0).max().unwrap_or(0);
            let mut y = 0;
            for &(w, h) in sizes {
                positions.push(((width - w) / 2, y));
                y += h + spacing;
            }
            MergeLayout {
                width,
                height: sizes.iter().map(|s| s.1).sum::<u32>() + gaps,
                positions,
            }
        }
    }
}

/// Top-left corner of a `stamp`-sized box anchored inside `canvas`.
///
/// Offsets push the box away from the edge it is anchored to and are ignored
/// on centred axes. The result may be negative or overflow when the stamp is
/// larger than the canvas.
pub fn anchor_position(
    canvas: (u32, u32),
    stamp: (u32, u32),
    anchor: Anchor,
    offset: (f32, f32),
) -> (f32, f32) {
    let place = |edge: Edge, outer: u32, inner: u32, off: f32| -> f32 {
        let (outer, inner) = (outer as f32, inner as f32);
        match edge {
            Edge::Start => off,
            Edge::Middle => (outer - inner) / 2.0,
            Edge::End => outer - inner - off,
        }
    };
    let (h, v) = anchor.edges();
    (
        place(h, canvas.0, stamp.0, offset.0),
        place(v, canvas.1, stamp.1, offset.1),
    )
}

/// Tile cell origins covering `canvas` with one cell of overscan per side.
///
/// `cols = ceil(W / sx) + 2`, `rows = ceil(H / sy) + 2` and cell `(c, r)`
/// sits at `(c * sx - sx / 2, r * sy - sy / 2)`.
pub fn calculate_tile_origins(canvas: (u32, u32), spacing: (u32, u32)) -> Vec<(f32, f32)> {
    let (sx, sy) = (spacing.0.max(1), spacing.1.max(1));
    let (cols, rows) = tile_grid_size(canvas, (sx, sy));
    let (half_x, half_y) = (sx as f32 / 2.0, sy as f32 / 2.0);

    (0..rows)
        .flat_map(|row| {
            (0..cols).map(move |col| (col as f32 * sx as f32 - half_x, row as f32 * sy as f32 - half_y))
        })
        .collect()
}

/// Number of tile columns and rows [`calculate_tile_origins`] produces.
pub fn tile_grid_size(canvas: (u32, u32), spacing: (u32, u32)) -> (u32, u32) {
    (
        canvas.0.div_ceil(spacing.0.max(1)) + 2,
        canvas.1.div_ceil(spacing.1.max(1)) + 2,
    )
}

/// Scale `source` to fit inside `frame` keeping its aspect ratio, centred.
///
/// Returns the placement rectangle inside the frame.
pub fn calculate_contain_rect(source: (u32, u32), frame: (u32, u32)) -> Rect {
    let (sw, sh) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let (fw, fh) = (frame.0 as f64, frame.1 as f64);
    let scale = (fw / sw).min(fh / sh);
    let w = ((sw * scale).round() as u32).clamp(1, frame.0.max(1));
    let h = ((sh * scale).round() as u32).clamp(1, frame.1.max(1));
    Rect::new((frame.0 - w.min(frame.0)) / 2, (frame.1 - h.min(frame.1)) / 2, w, h)
}
