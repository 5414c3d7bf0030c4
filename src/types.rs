//! Shared types used across the session, pipeline, history and export stages.
//!
//! An [`Image`] is one entry in a working set. It always carries the source
//! bytes it was loaded from; once any tool has touched it, it also carries a
//! decoded [`RasterBuffer`] and the encoded result of that tool.

use crate::imaging::rust_backend::sniff_mime;
use crate::imaging::{MimeType, Quality, RasterBuffer};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IntakeError {
    #[error("{name}: '{mime}' is not an image type")]
    NotAnImage { name: String, mime: String },
    #[error("{name}: unsupported image type '{mime}'")]
    UnsupportedType { name: String, mime: String },
}

/// Immutable encoded bytes plus their SHA-256, shared between copies.
#[derive(Clone)]
pub struct SourceBytes {
    bytes: Arc<[u8]>,
    digest: Arc<str>,
}

impl SourceBytes {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let digest = format!("{:x}", Sha256::digest(&bytes));
        Self {
            bytes,
            digest: digest.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex SHA-256 of the bytes.
    pub fn sha256(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for SourceBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBytes")
            .field("len", &self.bytes.len())
            .field("sha256", &&self.digest[..12.min(self.digest.len())])
            .finish()
    }
}

/// A file offered for intake: name, bytes and the declared media type.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes,
            mime: mime.into(),
        }
    }

    /// Read a file from disk, declaring its type from the extension, or
    /// from the content when the extension says nothing.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(MimeType::from_extension)
            .or_else(|| sniff_mime(&bytes))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(Self { name, bytes, mime })
    }
}

/// One image in a working set.
#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    /// Encoded bytes the image was loaded from. Never mutated.
    pub source: SourceBytes,
    /// Byte length of `source`.
    pub original_size: u64,
    pub mime: MimeType,
    /// Encode quality carried by the image (JPEG only).
    pub quality: Option<Quality>,
    /// Current pixels, once a tool has run.
    pub raster: Option<RasterBuffer>,
    /// Encoded form of `raster`, ready for preview or export.
    pub encoded: Option<Vec<u8>>,
}

impl Image {
    /// Accept a file whose declared type is a supported `image/*`.
    pub fn intake(file: SourceFile) -> Result<Self, IntakeError> {
        if !file.mime.trim().to_ascii_lowercase().starts_with("image/") {
            return Err(IntakeError::NotAnImage {
                name: file.name,
                mime: file.mime,
            });
        }
        let Some(mime) = MimeType::from_mime(&file.mime) else {
            return Err(IntakeError::UnsupportedType {
                name: file.name,
                mime: file.mime,
            });
        };
        Ok(Self::from_encoded(file.name, file.bytes, mime))
    }

    /// Untouched image wrapping encoded bytes.
    pub fn from_encoded(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>, mime: MimeType) -> Self {
        let source = SourceBytes::new(bytes);
        Self {
            name: name.into(),
            original_size: source.len() as u64,
            source,
            mime,
            quality: mime.intake_quality(),
            raster: None,
            encoded: None,
        }
    }

    /// Whether any tool has produced pixels for this image.
    pub fn is_touched(&self) -> bool {
        self.raster.is_some()
    }

    /// Size of the processed result, if any.
    pub fn new_size(&self) -> Option<u64> {
        self.encoded.as_ref().map(|e| e.len() as u64)
    }

    /// File name without its last extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(i) if i > 0 => &self.name[..i],
            _ => &self.name,
        }
    }

    /// Heap bytes held by pixel and encoded data.
    pub fn retained_bytes(&self) -> usize {
        self.raster.as_ref().map_or(0, RasterBuffer::byte_len)
            + self.encoded.as_ref().map_or(0, Vec::len)
    }
}

/// Expand `inputs` into image files: files are kept as given, directories
/// are walked for supported extensions in file-name order.
pub fn collect_image_paths(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            paths.push(input.clone());
            continue;
        }
        paths.extend(
            WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .and_then(MimeType::from_extension)
                        .is_some()
                })
                .map(|e| e.into_path()),
        );
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{gradient, png_bytes};

    #[test]
    fn intake_accepts_supported_images() {
        let img = Image::intake(SourceFile::new("a.jpg", vec![1, 2, 3], "image/jpeg")).unwrap();
        assert_eq!(img.mime, MimeType::Jpeg);
        assert_eq!(img.quality, Some(Quality::new(90)));
        assert_eq!(img.original_size, 3);
        assert!(!img.is_touched());

        let img = Image::intake(SourceFile::new("b.png", vec![1], "image/png")).unwrap();
        assert_eq!(img.quality, None);
    }

    #[test]
    fn intake_rejects_non_images() {
        let err = Image::intake(SourceFile::new("notes.txt", vec![], "text/plain")).unwrap_err();
        assert!(matches!(err, IntakeError::NotAnImage { .. }));

        let err = Image::intake(SourceFile::new("x.svg", vec![], "image/svg+xml")).unwrap_err();
        assert!(matches!(err, IntakeError::UnsupportedType { .. }));
    }

    #[test]
    fn source_digest_is_sha256_hex() {
        let src = SourceBytes::new(b"abc".to_vec());
        assert_eq!(
            src.sha256(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn stem_strips_last_extension() {
        let img = Image::from_encoded("holiday.photo.jpg", vec![0u8], MimeType::Jpeg);
        assert_eq!(img.stem(), "holiday.photo");
        let img = Image::from_encoded(".hidden", vec![0u8], MimeType::Png);
        assert_eq!(img.stem(), ".hidden");
    }

    #[test]
    fn new_size_follows_encoded() {
        let mut img = Image::from_encoded("a.png", vec![1u8, 2], MimeType::Png);
        assert_eq!(img.new_size(), None);
        img.encoded = Some(vec![9]);
        assert_eq!(img.new_size(), Some(1));
    }

    #[test]
    fn read_sniffs_type_without_extension() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("scan");
        std::fs::write(&path, png_bytes(&gradient(2, 2))).unwrap();
        let file = SourceFile::read(&path).unwrap();
        assert_eq!(file.name, "scan");
        assert_eq!(file.mime, "image/png");

        let text = tmp.path().join("notes.txt");
        std::fs::write(&text, b"hello").unwrap();
        assert_eq!(SourceFile::read(&text).unwrap().mime, "application/octet-stream");
    }

    #[test]
    fn collect_walks_directories_for_images() {
        let tmp = tempfile::TempDir::new().unwrap();
        let nested = tmp.path().join("sub");
        std::fs::create_dir(&nested).unwrap();
        for name in ["b.png", "a.JPG", "notes.txt"] {
            std::fs::write(tmp.path().join(name), b"x").unwrap();
        }
        std::fs::write(nested.join("c.webp"), b"x").unwrap();
        let explicit = tmp.path().join("notes.txt");

        let paths = collect_image_paths(&[tmp.path().to_path_buf(), explicit.clone()]);
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.webp", "notes.txt"]);
        assert_eq!(paths[3], explicit);
    }
}
