//! Codec backend trait and its error type.
//!
//! The [`ImageBackend`] trait is the seam between the pipeline and the
//! encoded-bytes world: decode bytes into a [`RasterBuffer`], encode a buffer
//! into a requested format. All pixel work happens on buffers and never goes
//! through the backend.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend). Tests swap in the
//! recording [`MockBackend`](tests::MockBackend).

use super::params::{MimeType, Quality};
use super::raster::RasterBuffer;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encoding to {mime} failed: {reason}")]
    Encode { mime: MimeType, reason: String },
    #[error("no encoder for {0}")]
    UnsupportedFormat(MimeType),
}

/// Trait for codec backends.
///
/// Implementations must be `Sync`: the pipeline decodes and encodes images
/// of a batch in parallel through a shared reference.
pub trait ImageBackend: Sync {
    /// Decode encoded image bytes into straight RGBA.
    fn decode(&self, bytes: &[u8]) -> Result<RasterBuffer, BackendError>;

    /// Encode a buffer. `quality` only matters for lossy formats.
    fn encode(
        &self,
        buffer: &RasterBuffer,
        mime: MimeType,
        quality: Option<Quality>,
    ) -> Result<Vec<u8>, BackendError>;
}

impl<B: ImageBackend + ?Sized> ImageBackend for &B {
    fn decode(&self, bytes: &[u8]) -> Result<RasterBuffer, BackendError> {
        (**self).decode(bytes)
    }

    fn encode(
        &self,
        buffer: &RasterBuffer,
        mime: MimeType,
        quality: Option<Quality>,
    ) -> Result<Vec<u8>, BackendError> {
        (**self).encode(buffer, mime, quality)
    }
}
