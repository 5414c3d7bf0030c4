//! End-to-end flow through the public API: intake, several tools, history
//! navigation and export.

use pixbatch::config::Recipe;
use pixbatch::export::{BatchExporter, Export, ZipExporter};
use pixbatch::imaging::{
    ColorTransformKind, ColorTransformSpec, MergeDirection, MergeSpec, MimeType, RasterBuffer,
    ResizeSpec, RustBackend,
};
use pixbatch::pipeline::{Operation, OperationKind};
use pixbatch::session::{Session, SessionError};
use pixbatch::types::SourceFile;
use std::io::Cursor;
use tempfile::TempDir;

const RED: [u8; 4] = [255, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];

fn gradient(width: u32, height: u32) -> RasterBuffer {
    let mut buf = RasterBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let r = (x * 255 / width.max(2).saturating_sub(1).max(1)) as u8;
            let g = (y * 255 / height.max(2).saturating_sub(1).max(1)) as u8;
            buf.put_pixel(x, y, [r, g, 128, 255]);
        }
    }
    buf
}

fn png_file(name: &str, buf: &RasterBuffer) -> SourceFile {
    SourceFile::new(name, buf.encode(MimeType::Png, None).unwrap(), "image/png")
}

fn loaded_session() -> Session<RustBackend> {
    let mut session = Session::new(RustBackend::new());
    let report = session.intake(vec![
        png_file("a.png", &gradient(40, 20)),
        png_file("b.png", &gradient(20, 40)),
        SourceFile::new("readme.txt", b"hello".to_vec(), "text/plain"),
    ]);
    assert_eq!(report.accepted, 2);
    assert_eq!(report.rejected.len(), 1);
    session
}

fn raster_dims(session: &Session<RustBackend>) -> Vec<(u32, u32)> {
    session
        .working()
        .iter()
        .map(|img| img.raster.as_ref().unwrap().dimensions())
        .collect()
}

fn invert() -> Operation {
    Operation::Color(ColorTransformSpec::of_kind(ColorTransformKind::Invert))
}

// ============================================================================
// History navigation
// ============================================================================

#[test]
fn tools_chain_and_history_reverts() {
    let mut session = loaded_session();

    let resized = session
        .apply(&Operation::Resize(ResizeSpec::percentage(50.0)))
        .unwrap()
        .entry
        .unwrap();
    assert_eq!(raster_dims(&session), vec![(20, 10), (10, 20)]);
    let after_resize = session.working()[0].raster.clone().unwrap();

    session.apply(&invert()).unwrap();
    assert_ne!(session.working()[0].raster.as_ref().unwrap(), &after_resize);
    assert_eq!(session.history().len(), 2);

    session.revert_to(resized).unwrap();
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.working()[0].raster.as_ref().unwrap(), &after_resize);

    session
        .apply(&Operation::Color(ColorTransformSpec::of_kind(
            ColorTransformKind::Grayscale,
        )))
        .unwrap();
    let kinds: Vec<OperationKind> = session
        .history()
        .entries()
        .iter()
        .map(|e| e.operation())
        .collect();
    assert_eq!(kinds, vec![OperationKind::Size, OperationKind::Color]);

    // grayscale keeps the resized geometry
    assert_eq!(raster_dims(&session), vec![(20, 10), (10, 20)]);
    let px = session.working()[0].raster.as_ref().unwrap().pixel(5, 5);
    assert_eq!(px[0], px[1]);
    assert_eq!(px[1], px[2]);

    session.reset_to_original();
    assert!(session.history().is_empty());
    assert!(session.working().iter().all(|img| img.raster.is_none()));
    assert_eq!(
        session.working()[0].source.sha256(),
        session.originals()[0].source.sha256()
    );
}

#[test]
fn merge_appends_and_failed_merge_leaves_state() {
    let mut session = loaded_session();
    let outcome = session
        .apply(&Operation::Merge(MergeSpec {
            direction: MergeDirection::Horizontal,
            selected: vec![0, 1],
            ..MergeSpec::default()
        }))
        .unwrap();
    assert_eq!(outcome.produced, 3);
    let merged = &session.working()[2];
    assert!(merged.name.starts_with("merged-horizontal-"));
    assert_eq!(merged.mime, MimeType::Png);
    assert_eq!(merged.raster.as_ref().unwrap().dimensions(), (60, 40));

    let err = session
        .apply(&Operation::Merge(MergeSpec {
            selected: vec![0, 9],
            ..MergeSpec::default()
        }))
        .unwrap_err();
    assert!(matches!(err, SessionError::Pipeline(_)));
    assert_eq!(session.working().len(), 3);
    assert_eq!(session.history().len(), 1);
}

// ============================================================================
// Recipes and export
// ============================================================================

#[test]
fn recipe_with_image_watermark_exports_zip() {
    let tmp = TempDir::new().unwrap();
    let logo = RasterBuffer::filled(8, 8, RED).encode(MimeType::Png, None).unwrap();
    std::fs::write(tmp.path().join("logo.png"), logo).unwrap();
    let recipe_path = tmp.path().join("recipe.toml");
    std::fs::write(
        &recipe_path,
        r##"
[[steps]]
op = "size"
mode = "fixed"
width = 32
height = 32
maintain_aspect = false

[[steps]]
op = "watermark"
content_type = "image"
image_path = "logo.png"
position = "top-left"
offset_x = 0
offset_y = 0
opacity = 1.0
"##,
    )
    .unwrap();
    let recipe = Recipe::load(&recipe_path).unwrap();

    let mut session = Session::new(RustBackend::new());
    session.intake(vec![
        png_file("a.png", &RasterBuffer::filled(64, 64, WHITE)),
        png_file("b.png", &RasterBuffer::filled(16, 16, WHITE)),
    ]);
    for step in &recipe.steps {
        session.apply(step).unwrap();
    }

    for img in session.working() {
        assert!(img.name.starts_with("watermarked-"));
        let raster = img.raster.as_ref().unwrap();
        assert_eq!(raster.dimensions(), (32, 32));
        let stamped = raster.pixel(3, 3);
        assert!(stamped[0] > 200 && stamped[1] < 60, "got {stamped:?}");
        assert_eq!(raster.pixel(30, 30), WHITE);
    }

    let exporter = ZipExporter::new(session.backend());
    let export = session.export_working(&exporter, "processed").unwrap().unwrap();
    assert!(matches!(export, Export::Archive { .. }));
    assert_eq!(export.file_name(), "processed-images.zip");

    let path = export.write_to(&tmp.path().join("out")).unwrap();
    let bytes = std::fs::read(path).unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec!["processed-watermarked-a.png", "processed-watermarked-b.png"]
    );
}

#[test]
fn format_conversion_to_jpeg_exports_single_file() {
    let mut session = Session::new(RustBackend::new());
    session.intake(vec![png_file("photo.png", &gradient(24, 24))]);
    session
        .apply(&Operation::Format(pixbatch::imaging::FormatSpec {
            target: MimeType::Jpeg,
            ..Default::default()
        }))
        .unwrap();

    let img = &session.working()[0];
    assert_eq!(img.mime, MimeType::Jpeg);
    let encoded = img.encoded.as_ref().unwrap();
    assert_eq!(&encoded[..2], &[0xFF, 0xD8]);

    let exporter = ZipExporter::new(session.backend());
    let export = exporter
        .export(session.working(), "format")
        .unwrap()
        .unwrap();
    assert_eq!(export.file_name(), "format-photo.jpg");
    assert_eq!(export.bytes(), encoded.as_slice());
}
