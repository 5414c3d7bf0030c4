//! In-memory RGBA pixel surface.
//!
//! A [`RasterBuffer`] is what every tool reads and writes: straight
//! (non-premultiplied) RGBA, 8 bits per channel, row-major, stride
//! `width * 4`. Cloning a buffer is a deep copy, which is what history
//! snapshots rely on.

use super::backend::BackendError;
use super::params::{MimeType, Quality};
use super::rust_backend;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Bytes per pixel.
pub const CHANNELS: usize = 4;

/// Pixel rectangle. Always non-negative; may extend past a buffer's edge,
/// callers clip with [`Rect::clip_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn of_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Intersection with a `width x height` surface anchored at the origin.
    pub fn clip_to(&self, width: u32, height: u32) -> Rect {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Rect {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterBuffer {
    pixels: RgbaImage,
}

impl RasterBuffer {
    /// Fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self {
            pixels: RgbaImage::from_pixel(width, height, Rgba(rgba)),
        }
    }

    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Wrap raw RGBA samples. `None` if the length doesn't match.
    pub fn from_raw(width: u32, height: u32, samples: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, samples).map(Self::from_image)
    }

    /// Decode PNG/JPEG/WebP/GIF bytes into a fresh buffer.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self, BackendError> {
        rust_backend::decode_rgba(bytes).map(Self::from_image)
    }

    /// Encode into `mime`. `quality` is honoured for JPEG only.
    pub fn encode(&self, mime: MimeType, quality: Option<Quality>) -> Result<Vec<u8>, BackendError> {
        rust_backend::encode_rgba(&self.pixels, mime, quality)
    }

    /// Independent deep copy.
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Row stride in bytes.
    pub fn stride(&self) -> usize {
        self.width() as usize * CHANNELS
    }

    /// Heap bytes held by the pixel data.
    pub fn byte_len(&self) -> usize {
        self.pixels.as_raw().len()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        self.pixels.put_pixel(x, y, Rgba(rgba));
    }

    pub fn samples(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn samples_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Copy `src_rect` of `src` into `dst_rect` of `self`, scaling with
    /// Lanczos3 when the sizes differ. The copied pixels are alpha-composited
    /// over what is already there. Both rectangles are clipped first; an
    /// empty rectangle after clipping is a no-op.
    pub fn draw_region(&mut self, src: &RasterBuffer, src_rect: Rect, dst_rect: Rect) {
        let src_rect = src_rect.clip_to(src.width(), src.height());
        if src_rect.is_empty() || dst_rect.is_empty() {
            return;
        }

        let region =
            imageops::crop_imm(&src.pixels, src_rect.x, src_rect.y, src_rect.width, src_rect.height)
                .to_image();
        let region = if (src_rect.width, src_rect.height) == (dst_rect.width, dst_rect.height) {
            region
        } else {
            imageops::resize(&region, dst_rect.width, dst_rect.height, FilterType::Lanczos3)
        };

        imageops::overlay(&mut self.pixels, &region, dst_rect.x as i64, dst_rect.y as i64);
    }

    /// Alpha-composite all of `src` with its top-left corner at `(x, y)`.
    /// Parts falling outside `self` are dropped.
    pub fn overlay(&mut self, src: &RasterBuffer, x: i64, y: i64) {
        imageops::overlay(&mut self.pixels, &src.pixels, x, y);
    }

    /// Whole-buffer rectangle.
    pub fn bounds(&self) -> Rect {
        Rect::of_size(self.width(), self.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn new_buffer_is_transparent() {
        let buf = RasterBuffer::new(3, 2);
        assert_eq!(buf.dimensions(), (3, 2));
        assert_eq!(buf.byte_len(), 3 * 2 * 4);
        assert!(buf.samples().iter().all(|&b| b == 0));
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(RasterBuffer::from_raw(2, 2, vec![0; 15]).is_none());
        assert!(RasterBuffer::from_raw(2, 2, vec![0; 16]).is_some());
    }

    #[test]
    fn snapshot_is_independent() {
        let mut buf = RasterBuffer::filled(2, 2, RED);
        let snap = buf.snapshot();
        buf.put_pixel(0, 0, BLUE);
        assert_eq!(snap.pixel(0, 0), RED);
        assert_eq!(buf.pixel(0, 0), BLUE);
    }

    #[test]
    fn draw_region_copies_one_to_one() {
        let src = gradient(8, 8);
        let mut dst = RasterBuffer::new(4, 4);
        dst.draw_region(&src, Rect::new(2, 3, 4, 4), Rect::of_size(4, 4));
        assert_eq!(dst.pixel(0, 0), src.pixel(2, 3));
        assert_eq!(dst.pixel(3, 3), src.pixel(5, 6));
    }

    #[test]
    fn draw_region_scales_solid_colour() {
        let src = RasterBuffer::filled(10, 10, RED);
        let mut dst = RasterBuffer::new(5, 5);
        dst.draw_region(&src, src.bounds(), Rect::of_size(5, 5));
        assert_eq!(dst.pixel(2, 2), RED);
        assert_eq!(dst.pixel(4, 4), RED);
    }

    #[test]
    fn draw_region_clips_source_rect() {
        let src = RasterBuffer::filled(4, 4, RED);
        let mut dst = RasterBuffer::filled(4, 4, WHITE);
        dst.draw_region(&src, Rect::new(10, 10, 4, 4), Rect::of_size(4, 4));
        assert_eq!(dst.pixel(0, 0), WHITE);
    }

    #[test]
    fn overlay_composites_at_offset() {
        let mut dst = RasterBuffer::filled(4, 4, WHITE);
        dst.overlay(&RasterBuffer::filled(2, 2, RED), 2, 2);
        assert_eq!(dst.pixel(1, 1), WHITE);
        assert_eq!(dst.pixel(2, 2), RED);
        assert_eq!(dst.pixel(3, 3), RED);
    }

    #[test]
    fn png_round_trip_preserves_pixels() {
        let buf = gradient(16, 9);
        let bytes = buf.encode(MimeType::Png, None).unwrap();
        let decoded = RasterBuffer::from_encoded(&bytes).unwrap();
        assert_eq!(decoded, buf);
    }

    #[test]
    fn rect_clip() {
        assert_eq!(Rect::new(3, 3, 10, 10).clip_to(5, 4), Rect::new(3, 3, 2, 1));
        assert!(Rect::new(9, 0, 2, 2).clip_to(5, 5).is_empty());
    }
}
