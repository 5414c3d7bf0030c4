//! Pure Rust codec backend built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG, WebP, GIF) | `image::load_from_memory` → RGBA8 |
//! | Sniff format | `image::guess_format` |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder::new_with_quality` (alpha flattened onto black) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder::new_lossless` |

use super::backend::{BackendError, ImageBackend};
use super::params::{MimeType, Quality};
use super::raster::RasterBuffer;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, RgbImage, RgbaImage};

const FORMAT_CANDIDATES: &[(MimeType, ImageFormat)] = &[
    (MimeType::Png, ImageFormat::Png),
    (MimeType::Jpeg, ImageFormat::Jpeg),
    (MimeType::Webp, ImageFormat::WebP),
    (MimeType::Gif, ImageFormat::Gif),
];

/// Identify encoded bytes by their magic number.
pub fn sniff_mime(bytes: &[u8]) -> Option<MimeType> {
    let format = image::guess_format(bytes).ok()?;
    FORMAT_CANDIDATES
        .iter()
        .find(|(_, fmt)| *fmt == format)
        .map(|(mime, _)| *mime)
}

pub(crate) fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, BackendError> {
    let image = image::load_from_memory(bytes).map_err(|e| BackendError::Decode(e.to_string()))?;
    if image.width() == 0 || image.height() == 0 {
        return Err(BackendError::Decode("image has no pixels".into()));
    }
    Ok(image.into_rgba8())
}

pub(crate) fn encode_rgba(
    pixels: &RgbaImage,
    mime: MimeType,
    quality: Option<Quality>,
) -> Result<Vec<u8>, BackendError> {
    let (width, height) = pixels.dimensions();
    let mut out = Vec::new();
    let result = match mime {
        MimeType::Png => PngEncoder::new(&mut out).write_image(
            pixels.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        MimeType::Jpeg => {
            let q = quality.unwrap_or_default().value();
            let rgb = flatten_onto_black(pixels);
            JpegEncoder::new_with_quality(&mut out, q).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        MimeType::Webp => WebPEncoder::new_lossless(&mut out).write_image(
            pixels.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
        MimeType::Gif => return Err(BackendError::UnsupportedFormat(mime)),
    };
    result.map_err(|e| BackendError::Encode {
        mime,
        reason: e.to_string(),
    })?;
    Ok(out)
}

/// JPEG has no alpha channel; transparent pixels come out black.
fn flatten_onto_black(pixels: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(pixels.width(), pixels.height(), |x, y| {
        let [r, g, b, a] = pixels.get_pixel(x, y).0;
        let scale = |c: u8| ((c as u32 * a as u32 + 127) / 255) as u8;
        image::Rgb([scale(r), scale(g), scale(b)])
    })
}

/// Codec backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBackend for RustBackend {
    fn decode(&self, bytes: &[u8]) -> Result<RasterBuffer, BackendError> {
        RasterBuffer::from_encoded(bytes)
    }

    fn encode(
        &self,
        buffer: &RasterBuffer,
        mime: MimeType,
        quality: Option<Quality>,
    ) -> Result<Vec<u8>, BackendError> {
        buffer.encode(mime, quality)
    }
}
