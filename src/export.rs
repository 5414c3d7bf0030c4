//! Export of processed images as a single file or a ZIP archive.
//!
//! ## Naming
//!
//! ```text
//! <operation>-<stem>.<ext>        one image, or each archive member
//! <operation>-images.zip          several images
//! ```
//!
//! The extension follows the image's MIME type: `jpg` for JPEG, `webp` for
//! WebP, `png` for everything else. Only images a tool has produced pixels
//! for are exported; untouched originals are skipped.

use crate::imaging::{BackendError, ImageBackend};
use crate::types::Image;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("encoding {name} failed: {source}")]
    Encode {
        name: String,
        #[source]
        source: BackendError,
    },
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Archive name suffix used when none is configured.
pub const DEFAULT_ARCHIVE_SUFFIX: &str = "images";

/// A finished export, ready to be saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Export {
    Single { file_name: String, bytes: Vec<u8> },
    Archive { file_name: String, bytes: Vec<u8> },
}

impl Export {
    pub fn file_name(&self) -> &str {
        match self {
            Self::Single { file_name, .. } | Self::Archive { file_name, .. } => file_name,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Single { bytes, .. } | Self::Archive { bytes, .. } => bytes,
        }
    }

    /// Write into `dir` (created if missing) and return the file path.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.bytes())?;
        Ok(path)
    }
}

/// Turns a working set into downloadable bytes.
pub trait BatchExporter {
    /// Export `images` under `operation`'s name. `Ok(None)` when there is
    /// nothing to export.
    fn export(&self, images: &[Image], operation: &str) -> Result<Option<Export>, ExportError>;
}

/// File name of one exported image.
pub fn export_file_name(operation: &str, image: &Image) -> String {
    format!(
        "{operation}-{}.{}",
        image.stem(),
        image.mime.export_extension()
    )
}

/// Exporter producing a bare file for one image and a ZIP for several.
pub struct ZipExporter<'a, B: ImageBackend> {
    backend: &'a B,
    archive_suffix: String,
}

impl<'a, B: ImageBackend> ZipExporter<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            archive_suffix: DEFAULT_ARCHIVE_SUFFIX.to_string(),
        }
    }

    pub fn with_archive_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.archive_suffix = suffix.into();
        self
    }

    /// Encoded bytes of a touched image, re-encoding only if the pipeline
    /// didn't leave any.
    fn bytes_of(&self, image: &Image) -> Result<Option<Vec<u8>>, ExportError> {
        if let Some(encoded) = &image.encoded {
            return Ok(Some(encoded.clone()));
        }
        let Some(raster) = &image.raster else {
            return Ok(None);
        };
        self.backend
            .encode(raster, image.mime.output_format(), image.quality)
            .map(Some)
            .map_err(|source| ExportError::Encode {
                name: image.name.clone(),
                source,
            })
    }

    fn archive(&self, images: &[Image], operation: &str) -> Result<Option<Export>, ExportError> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut members = 0;
        for image in images {
            let Some(bytes) = self.bytes_of(image)? else {
                continue;
            };
            zip.start_file(export_file_name(operation, image), options)?;
            zip.write_all(&bytes)?;
            members += 1;
        }
        if members == 0 {
            return Ok(None);
        }

        let bytes = zip.finish()?.into_inner();
        let file_name = format!("{operation}-{}.zip", self.archive_suffix);
        tracing::info!(archive = %file_name, members, size = bytes.len(), "Archive built");
        Ok(Some(Export::Archive { file_name, bytes }))
    }
}

impl<B: ImageBackend> BatchExporter for ZipExporter<'_, B> {
    fn export(&self, images: &[Image], operation: &str) -> Result<Option<Export>, ExportError> {
        match images {
            [] => Ok(None),
            [image] => Ok(self.bytes_of(image)?.map(|bytes| Export::Single {
                file_name: export_file_name(operation, image),
                bytes,
            })),
            _ => self.archive(images, operation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::imaging::{MimeType, Quality, RustBackend};
    use crate::test_helpers::*;
    use std::io::Read;

    fn touched(name: &str, mime: MimeType) -> Image {
        let buf = gradient(6, 6);
        let mut img = Image::from_encoded(name, png_bytes(&buf), mime);
        img.encoded = Some(buf.encode(mime, Some(Quality::default())).unwrap());
        img.raster = Some(buf);
        img
    }

    fn archive_names(bytes: &[u8]) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn file_names_map_mime_to_extension() {
        assert_eq!(
            export_file_name("size", &touched("photo.jpeg", MimeType::Jpeg)),
            "size-photo.jpg"
        );
        assert_eq!(
            export_file_name("color", &touched("a.b.webp", MimeType::Webp)),
            "color-a.b.webp"
        );
        assert_eq!(
            export_file_name("processed", &touched("anim.gif", MimeType::Gif)),
            "processed-anim.png"
        );
    }

    #[test]
    fn single_image_exports_bare_file() {
        let backend = RustBackend::new();
        let img = touched("a.png", MimeType::Png);
        let export = ZipExporter::new(&backend)
            .export(std::slice::from_ref(&img), "size")
            .unwrap()
            .unwrap();
        assert!(matches!(export, Export::Single { .. }));
        assert_eq!(export.file_name(), "size-a.png");
        assert_eq!(export.bytes(), img.encoded.as_deref().unwrap());
    }

    #[test]
    fn several_images_export_as_zip() {
        let backend = RustBackend::new();
        let images = vec![touched("a.png", MimeType::Png), touched("b.jpg", MimeType::Jpeg)];
        let export = ZipExporter::new(&backend)
            .export(&images, "watermark")
            .unwrap()
            .unwrap();
        assert_eq!(export.file_name(), "watermark-images.zip");
        assert_eq!(archive_names(export.bytes()), vec!["watermark-a.png", "watermark-b.jpg"]);

        let mut archive = zip::ZipArchive::new(Cursor::new(export.bytes())).unwrap();
        let mut member = Vec::new();
        archive.by_index(0).unwrap().read_to_end(&mut member).unwrap();
        assert_eq!(member, images[0].encoded.clone().unwrap());
    }

    #[test]
    fn untouched_images_are_left_out() {
        let backend = RustBackend::new();
        let images = vec![touched("a.png", MimeType::Png), png_image("b.png", &gradient(2, 2))];
        let export = ZipExporter::new(&backend)
            .export(&images, "processed")
            .unwrap()
            .unwrap();
        assert_eq!(archive_names(export.bytes()), vec!["processed-a.png"]);
    }

    #[test]
    fn nothing_touched_exports_nothing() {
        let backend = RustBackend::new();
        let exporter = ZipExporter::new(&backend);
        assert!(exporter.export(&[], "x").unwrap().is_none());
        let single = vec![png_image("a.png", &gradient(2, 2))];
        assert!(exporter.export(&single, "x").unwrap().is_none());
        let pair = vec![png_image("a.png", &gradient(2, 2)), png_image("b.png", &gradient(2, 2))];
        assert!(exporter.export(&pair, "x").unwrap().is_none());
    }

    #[test]
    fn raster_without_bytes_is_encoded() {
        let backend = MockBackend::new();
        let mut img = touched("a.png", MimeType::Png);
        img.encoded = None;
        let export = ZipExporter::new(&backend)
            .export(&[img], "size")
            .unwrap()
            .unwrap();
        assert!(!export.bytes().is_empty());
        assert_eq!(backend.encodes().len(), 1);
    }

    #[test]
    fn archive_suffix_is_configurable() {
        let backend = RustBackend::new();
        let images = vec![touched("a.png", MimeType::Png), touched("b.png", MimeType::Png)];
        let export = ZipExporter::new(&backend)
            .with_archive_suffix("batch")
            .export(&images, "processed")
            .unwrap()
            .unwrap();
        assert_eq!(export.file_name(), "processed-batch.zip");
    }

    #[test]
    fn write_to_creates_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let export = Export::Single {
            file_name: "x.png".into(),
            bytes: vec![1, 2, 3],
        };
        let path = export.write_to(&tmp.path().join("out")).unwrap();
        assert_eq!(std::fs::read(path).unwrap(), vec![1, 2, 3]);
    }
}
