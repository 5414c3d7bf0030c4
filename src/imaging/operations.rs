//! Buffer-level geometry operations: resize, crop and merge.
//!
//! Each takes source buffers and returns a freshly allocated one; the
//! dimension maths lives in [`calculations`](super::calculations).

use super::calculations::{calculate_merge_layout, calculate_resize_dimensions, crop_rect};
use super::params::{MergeSpec, ResizeMode, ResizeSpec};
use super::raster::{RasterBuffer, Rect};
use thiserror::Error;

/// A batch-level requirement that isn't met. Nothing is produced.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("merge needs at least two images, got {0}")]
    NotEnoughImages(usize),
    #[error("merge selection index {index} is out of range for {len} images")]
    SelectionOutOfRange { index: usize, len: usize },
    #[error("watermark text is empty")]
    EmptyWatermarkText,
    #[error("image watermark has no image")]
    MissingWatermarkImage,
    #[error("watermark image could not be decoded: {0}")]
    WatermarkImageUnreadable(String),
    #[error("watermark text could not be rendered: {0}")]
    TextRender(String),
}

/// Resize or crop according to `spec` (clamped here).
pub fn resize(src: &RasterBuffer, spec: &ResizeSpec) -> RasterBuffer {
    let spec = spec.clamped();
    if spec.mode == ResizeMode::Crop {
        return crop(src, crop_rect(src.dimensions(), &spec.crop_area));
    }

    let (width, height) = calculate_resize_dimensions(src.dimensions(), &spec);
    let mut dst = RasterBuffer::new(width, height);
    dst.draw_region(src, src.bounds(), Rect::of_size(width, height));
    dst
}

/// One-to-one copy of `rect` into a new buffer of the same size.
pub fn crop(src: &RasterBuffer, rect: Rect) -> RasterBuffer {
    let rect = rect.clip_to(src.width(), src.height());
    let mut dst = RasterBuffer::new(rect.width, rect.height);
    dst.draw_region(src, rect, Rect::of_size(rect.width, rect.height));
    dst
}

/// Concatenate `inputs` in order onto a background-filled canvas.
pub fn merge(inputs: &[&RasterBuffer], spec: &MergeSpec) -> Result<RasterBuffer, PreconditionError> {
    if inputs.len() < 2 {
        return Err(PreconditionError::NotEnoughImages(inputs.len()));
    }

    let sizes: Vec<(u32, u32)> = inputs.iter().map(|b| b.dimensions()).collect();
    let layout = calculate_merge_layout(&sizes, spec.direction, spec.clamped_spacing());

    let mut canvas = RasterBuffer::filled(layout.width, layout.height, spec.background.to_rgba());
    for (buf, &(x, y)) in inputs.iter().zip(&layout.positions) {
        canvas.overlay(buf, x as i64, y as i64);
    }
    Ok(canvas)
}
