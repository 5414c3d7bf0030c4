//! Watermark stamps: preparation and compositing.
//!
//! A watermark is rendered once per batch into a [`Stamp`] (a small RGBA
//! buffer) and then composited onto every image, either once at an anchor
//! or repeatedly on a tile grid.
//!
//! Text stamps are rasterised through resvg: the text is wrapped in a tiny
//! SVG document, laid out against the system font database and rendered to
//! a pixmap cropped to its stroke bounding box.
//!
//! Compositing maps each destination pixel back into stamp space, so
//! rotation about the stamp centre and fractional positions come out the
//! same way. Sampling is bilinear on premultiplied values.

use super::backend::ImageBackend;
use super::calculations::{anchor_position, calculate_tile_origins};
use super::operations::PreconditionError;
use super::params::{WatermarkContentType, WatermarkSpec};
use super::raster::{CHANNELS, RasterBuffer, Rect};
use rayon::prelude::*;
use resvg::tiny_skia::Pixmap;
use resvg::usvg::{self, Transform, fontdb};
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

/// Blank pixels kept around rendered text so antialiased edges aren't clipped.
const TEXT_PADDING: u32 = 2;

static FONT_DB: LazyLock<Arc<fontdb::Database>> = LazyLock::new(|| {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    // The generic sans-serif family defaults to Arial; point it at something
    // that is actually installed when Arial isn't.
    let sans = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };
    if db.query(&sans).is_none() {
        let installed = db
            .faces()
            .flat_map(|face| face.families.iter().map(|(name, _)| name.clone()))
            .min_by_key(|name| !name.contains("Sans"));
        if let Some(family) = installed {
            tracing::debug!(%family, "Using fallback sans-serif family");
            db.set_sans_serif_family(family);
        }
    }

    tracing::debug!(font_count = db.len(), "Loaded fonts for watermark text");
    Arc::new(db)
});

/// Where a stamp sits relative to a tile cell origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileAnchor {
    /// Centre of the stamp on the cell origin (text).
    Centre,
    /// Top-left corner of the stamp on the cell origin (images).
    TopLeft,
}

/// A rendered watermark, ready to composite.
#[derive(Debug, Clone)]
pub struct Stamp {
    pub raster: RasterBuffer,
    pub tile_anchor: TileAnchor,
}

/// Render the watermark described by `spec` into a stamp.
///
/// Fails when there is nothing to stamp: empty text, no image, an image that
/// doesn't decode, or text that produced no glyphs.
pub fn prepare_stamp(
    spec: &WatermarkSpec,
    backend: &impl ImageBackend,
) -> Result<Stamp, PreconditionError> {
    let spec = spec.clamped();
    match spec.content_type {
        WatermarkContentType::Text => {
            if spec.text.trim().is_empty() {
                return Err(PreconditionError::EmptyWatermarkText);
            }
            Ok(Stamp {
                raster: render_text(&spec)?,
                tile_anchor: TileAnchor::Centre,
            })
        }
        WatermarkContentType::Image => {
            let bytes = spec
                .image
                .as_ref()
                .ok_or(PreconditionError::MissingWatermarkImage)?;
            let decoded = backend
                .decode(bytes)
                .map_err(|e| PreconditionError::WatermarkImageUnreadable(e.to_string()))?;
            Ok(Stamp {
                raster: scale_stamp(&decoded, spec.image_scale),
                tile_anchor: TileAnchor::TopLeft,
            })
        }
    }
}

fn scale_stamp(src: &RasterBuffer, scale: f32) -> RasterBuffer {
    if scale == 1.0 {
        return src.clone();
    }
    let w = ((src.width() as f32 * scale).round() as u32).max(1);
    let h = ((src.height() as f32 * scale).round() as u32).max(1);
    let mut dst = RasterBuffer::new(w, h);
    dst.draw_region(src, src.bounds(), Rect::of_size(w, h));
    dst
}

// =============================================================================
// Text rendering
// =============================================================================

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// SVG document holding the watermark text as a single `<text>` element.
///
/// The stroke, when enabled, is painted under the fill. The document is
/// larger than needed; [`render_text`] crops to the stroke bounding box.
pub fn text_svg(spec: &WatermarkSpec) -> String {
    let size = spec.font_size;
    let chars = spec.text.chars().count().max(1) as f32;
    let width = (size * (chars + 2.0)).ceil();
    let height = (size * 3.0).ceil();

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}">"#
    );
    let _ = write!(
        svg,
        r#"<text x="{x}" y="{y}" font-family="'{family}', sans-serif" font-size="{size}" fill="{fill}""#,
        x = size,
        y = size * 2.0,
        family = escape_xml(&spec.font_family),
        fill = spec.color.to_hex(),
    );
    if spec.stroke {
        let _ = write!(
            svg,
            r#" stroke="{}" stroke-width="{}" stroke-linejoin="round" paint-order="stroke""#,
            spec.stroke_color.to_hex(),
            spec.stroke_width,
        );
    }
    let _ = write!(svg, ">{}</text></svg>", escape_xml(&spec.text));
    svg
}

/// Rasterise the watermark text, cropped to its painted extent.
pub fn render_text(spec: &WatermarkSpec) -> Result<RasterBuffer, PreconditionError> {
    let svg = text_svg(spec);
    let options = usvg::Options {
        fontdb: FONT_DB.clone(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_data(svg.as_bytes(), &options)
        .map_err(|e| PreconditionError::TextRender(e.to_string()))?;

    if !tree.root().has_children() {
        return Err(PreconditionError::TextRender(format!(
            "no glyphs for font '{}'",
            spec.font_family
        )));
    }
    let bbox = tree.root().abs_stroke_bounding_box();
    if bbox.width() <= 0.0 || bbox.height() <= 0.0 {
        return Err(PreconditionError::TextRender("text has no visible extent".into()));
    }

    let pad = TEXT_PADDING as f32;
    let width = bbox.width().ceil() as u32 + 2 * TEXT_PADDING;
    let height = bbox.height().ceil() as u32 + 2 * TEXT_PADDING;
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| PreconditionError::TextRender(format!("cannot allocate {width}x{height}")))?;

    let transform = Transform::from_translate(pad - bbox.x(), pad - bbox.y());
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let samples = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    RasterBuffer::from_raw(width, height, samples)
        .ok_or_else(|| PreconditionError::TextRender("pixmap size mismatch".into()))
}

// =============================================================================
// Compositing
// =============================================================================

/// Premultiplied bilinear sample at stamp coordinates; transparent outside.
fn sample(src: &RasterBuffer, x: f32, y: f32) -> [f32; 4] {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let x0 = x.floor();
    let y0 = y.floor();
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let fetch = |ix: i64, iy: i64| -> [f32; 4] {
        if ix < 0 || iy < 0 || ix >= w || iy >= h {
            return [0.0; 4];
        }
        let [r, g, b, a] = src.pixel(ix as u32, iy as u32);
        let a = a as f32;
        [r as f32 * a / 255.0, g as f32 * a / 255.0, b as f32 * a / 255.0, a]
    };

    let weights = [
        ((1.0 - fx) * (1.0 - fy), fetch(x0, y0)),
        (fx * (1.0 - fy), fetch(x0 + 1, y0)),
        ((1.0 - fx) * fy, fetch(x0, y0 + 1)),
        (fx * fy, fetch(x0 + 1, y0 + 1)),
    ];
    let mut out = [0.0f32; 4];
    for (weight, px) in weights {
        if weight == 0.0 {
            continue;
        }
        for c in 0..4 {
            out[c] += px[c] * weight;
        }
    }
    out
}

/// Source-over of a premultiplied sample onto a straight RGBA pixel.
fn blend_over(dst: &mut [u8], src: [f32; 4], opacity: f32) {
    let sa = src[3] / 255.0 * opacity;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let premult = src[c] * opacity + dst[c] as f32 * da * (1.0 - sa);
        dst[c] = (premult / out_a).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Composite `stamp` centred on `centre`, rotated clockwise by `rotation`
/// degrees, with global `opacity` in `[0, 1]`.
pub fn composite(
    dst: &mut RasterBuffer,
    stamp: &RasterBuffer,
    centre: (f32, f32),
    rotation: f32,
    opacity: f32,
) {
    if opacity <= 0.0 || stamp.width() == 0 || stamp.height() == 0 {
        return;
    }
    let (sin, cos) = rotation.to_radians().sin_cos();
    let (sw, sh) = (stamp.width() as f32, stamp.height() as f32);
    let half_w = (sw * cos.abs() + sh * sin.abs()) / 2.0;
    let half_h = (sw * sin.abs() + sh * cos.abs()) / 2.0;

    let (dw, dh) = dst.dimensions();
    let x_start = (centre.0 - half_w - 1.0).floor().max(0.0) as u32;
    let x_end = ((centre.0 + half_w + 1.0).ceil().max(0.0) as u32).min(dw);
    let y_start = (centre.1 - half_h - 1.0).floor().max(0.0) as u32;
    let y_end = ((centre.1 + half_h + 1.0).ceil().max(0.0) as u32).min(dh);
    if x_start >= x_end || y_start >= y_end {
        return;
    }

    let stride = dst.stride();
    dst.samples_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y_start as usize)
        .take((y_end - y_start) as usize)
        .for_each(|(y, row)| {
            let dy = y as f32 + 0.5 - centre.1;
            for x in x_start..x_end {
                let dx = x as f32 + 0.5 - centre.0;
                // Inverse rotation back into stamp space.
                let u = dx * cos + dy * sin;
                let v = -dx * sin + dy * cos;
                let px = sample(stamp, u + sw / 2.0 - 0.5, v + sh / 2.0 - 0.5);
                let i = x as usize * CHANNELS;
                blend_over(&mut row[i..i + CHANNELS], px, opacity);
            }
        });
}

/// Composite a prepared stamp onto `dst` according to `spec`.
pub fn apply_watermark(dst: &mut RasterBuffer, stamp: &Stamp, spec: &WatermarkSpec) {
    let spec = spec.clamped();
    let (sw, sh) = (stamp.raster.width() as f32, stamp.raster.height() as f32);

    if spec.tile_mode {
        let origins =
            calculate_tile_origins(dst.dimensions(), (spec.tile_spacing_x, spec.tile_spacing_y));
        for (ox, oy) in origins {
            let centre = match stamp.tile_anchor {
                TileAnchor::Centre => (ox, oy),
                TileAnchor::TopLeft => (ox + sw / 2.0, oy + sh / 2.0),
            };
            composite(dst, &stamp.raster, centre, spec.rotation, spec.opacity);
        }
    } else {
        let (x, y) = anchor_position(
            dst.dimensions(),
            stamp.raster.dimensions(),
            spec.position,
            (spec.offset_x, spec.offset_y),
        );
        let centre = (x + sw / 2.0, y + sh / 2.0);
        composite(dst, &stamp.raster, centre, spec.rotation, spec.opacity);
    }
}
