//! Shared test utilities for the pixbatch test suite.
//!
//! Provides colour constants, synthetic buffers and ready-to-intake images so
//! tests don't need fixture files on disk.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let img = png_image("a.png", &RasterBuffer::filled(4, 4, RED));
//! let session = session_with(vec![img]);
//! assert_eq!(session.working().len(), 1);
//! ```

pub use crate::imaging::RasterBuffer;
use crate::imaging::{MimeType, Quality, RustBackend};
use crate::session::Session;
use crate::types::Image;

// =========================================================================
// Colours
// =========================================================================

pub const RED: [u8; 4] = [255, 0, 0, 255];
pub const GREEN: [u8; 4] = [0, 255, 0, 255];
pub const BLUE: [u8; 4] = [0, 0, 255, 255];
pub const WHITE: [u8; 4] = [255, 255, 255, 255];
pub const BLACK: [u8; 4] = [0, 0, 0, 255];

// =========================================================================
// Buffers
// =========================================================================

/// Opaque buffer where every pixel is distinct-ish: r follows x, g follows y.
pub fn gradient(width: u32, height: u32) -> RasterBuffer {
    let mut buf = RasterBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.max(2).saturating_sub(1)).min(255) as u8;
            let g = (y * 255 / height.max(2).saturating_sub(1)).min(255) as u8;
            buf.put_pixel(x, y, [r, g, 128, 255]);
        }
    }
    buf
}

/// Deterministic pseudo-random opaque pixels.
pub fn noise(width: u32, height: u32) -> RasterBuffer {
    let mut state: u32 = 0x9e37_79b9;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state >> 24) as u8
    };
    let mut buf = RasterBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            buf.put_pixel(x, y, [next(), next(), next(), 255]);
        }
    }
    buf
}

// =========================================================================
// Encoded bytes and images
// =========================================================================

pub fn png_bytes(buf: &RasterBuffer) -> Vec<u8> {
    buf.encode(MimeType::Png, None).unwrap()
}

pub fn jpeg_bytes(buf: &RasterBuffer) -> Vec<u8> {
    buf.encode(MimeType::Jpeg, Some(Quality::default())).unwrap()
}

/// Untouched PNG image holding `buf`.
pub fn png_image(name: &str, buf: &RasterBuffer) -> Image {
    Image::from_encoded(name, png_bytes(buf), MimeType::Png)
}

/// Untouched JPEG image holding `buf`.
pub fn jpeg_image(name: &str, buf: &RasterBuffer) -> Image {
    Image::from_encoded(name, jpeg_bytes(buf), MimeType::Jpeg)
}

/// Image with bytes no decoder accepts.
pub fn corrupt_image(name: &str) -> Image {
    Image::from_encoded(name, b"not really a png".to_vec(), MimeType::Png)
}

// =========================================================================
// Sessions
// =========================================================================

/// Session over the real codec backend, already holding `images`.
pub fn session_with(images: Vec<Image>) -> Session<RustBackend> {
    let mut session = Session::new(RustBackend::new());
    session.load(images);
    session
}

/// Decoded pixels of an image's current state.
pub fn pixels_of(img: &Image) -> RasterBuffer {
    match &img.raster {
        Some(r) => r.clone(),
        None => RasterBuffer::from_encoded(img.source.bytes()).unwrap(),
    }
}
