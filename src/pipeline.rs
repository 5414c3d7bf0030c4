//! Batch tool execution.
//!
//! A [`ToolPipeline`] runs one [`Operation`] across a working set and returns
//! the new working set. Work happens in three passes, each parallel over
//! images with rayon:
//!
//! ```text
//! Idle → Loading → Transforming → Encoding → Done
//!          │                                   ▲
//!          └──────── (precondition) ──→ Failed │
//! ```
//!
//! - **Loading**: obtain pixels for each image. Format conversion always
//!   decodes the original bytes; every other tool starts from the image's
//!   current raster when it has one.
//! - **Transforming**: apply the tool to each buffer.
//! - **Encoding**: encode each result in its output format.
//!
//! An image that fails to decode or encode is dropped from the result and
//! listed in [`BatchResult::skipped`]; the rest of the batch carries on.
//! Only batch-level preconditions (merge selection, watermark content)
//! abort the whole run.
//!
//! Progress is logged through `tracing` and, if a channel is attached,
//! reported as [`PipelineEvent`]s for the CLI printer.

use crate::imaging::operations::{self, PreconditionError};
use crate::imaging::watermark::{self, Stamp};
use crate::imaging::{
    BackendError, ColorBalanceSpec, ColorTransformKind, ColorTransformSpec, FormatSpec,
    ImageBackend, MergeSpec, MimeType, Quality, RasterBuffer, ResizeMode, ResizeSpec,
    WatermarkContentType, WatermarkSpec, kernel,
};
use crate::types::Image;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
}

/// One tool invocation with its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Format(FormatSpec),
    #[serde(rename = "size")]
    Resize(ResizeSpec),
    Color(ColorTransformSpec),
    Balance(ColorBalanceSpec),
    Merge(MergeSpec),
    Watermark(WatermarkSpec),
}

/// Tool identity, as recorded in history and used in export file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Format,
    Size,
    Color,
    Balance,
    Merge,
    Watermark,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::Size => "size",
            Self::Color => "color",
            Self::Balance => "balance",
            Self::Merge => "merge",
            Self::Watermark => "watermark",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a tool takes its input pixels from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Always decode the bytes the image was loaded from.
    Original,
    /// Use the current raster if there is one, else decode the source.
    Working,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Format(_) => OperationKind::Format,
            Self::Resize(_) => OperationKind::Size,
            Self::Color(_) => OperationKind::Color,
            Self::Balance(_) => OperationKind::Balance,
            Self::Merge(_) => OperationKind::Merge,
            Self::Watermark(_) => OperationKind::Watermark,
        }
    }

    pub fn source_policy(&self) -> SourcePolicy {
        match self {
            Self::Format(_) => SourcePolicy::Original,
            _ => SourcePolicy::Working,
        }
    }

    /// One-line human description for history listings.
    pub fn describe(&self) -> String {
        match self {
            Self::Format(spec) => match spec.output_quality() {
                Some(q) => format!("Format conversion to {} (quality {}%)", spec.target, q.value()),
                None => format!("Format conversion to {}", spec.target),
            },
            Self::Resize(spec) => describe_resize(&spec.clamped()),
            Self::Color(spec) => describe_color(spec),
            Self::Balance(spec) => describe_balance(&spec.clamped()),
            Self::Merge(spec) => format!(
                "Merge of {} images ({}, spacing {}px)",
                spec.selection().len(),
                spec.direction.as_str(),
                spec.clamped_spacing()
            ),
            Self::Watermark(spec) => {
                let layout = if spec.tile_mode { "tiled" } else { "single" };
                match spec.content_type {
                    WatermarkContentType::Text => {
                        format!("Text watermark \"{}\" ({layout})", spec.text)
                    }
                    WatermarkContentType::Image => format!("Image watermark ({layout})"),
                }
            }
        }
    }
}

fn describe_resize(spec: &ResizeSpec) -> String {
    match spec.mode {
        ResizeMode::Percentage => format!("Resize to {}%", spec.percentage),
        ResizeMode::Fixed if spec.maintain_aspect => {
            format!("Resize to fit {}x{}", spec.width, spec.height)
        }
        ResizeMode::Fixed => format!("Resize to {}x{}", spec.width, spec.height),
        ResizeMode::Width => format!("Resize to width {}px", spec.width),
        ResizeMode::Height => format!("Resize to height {}px", spec.height),
        ResizeMode::Crop => {
            let a = spec.crop_area;
            format!(
                "Crop {}%x{}% at ({}%, {}%)",
                a.width, a.height, a.x, a.y
            )
        }
    }
}

fn describe_color(spec: &ColorTransformSpec) -> String {
    match spec.kind {
        ColorTransformKind::Replace => format!(
            "Color replace {} \u{2192} {} (tolerance {})",
            spec.source_color.to_hex(),
            spec.target_color.to_hex(),
            spec.clamped_tolerance()
        ),
        ColorTransformKind::Grayscale => "Grayscale".to_string(),
        ColorTransformKind::Sepia => "Sepia".to_string(),
        ColorTransformKind::Invert => "Invert colors".to_string(),
    }
}

fn describe_balance(spec: &ColorBalanceSpec) -> String {
    let parts: Vec<String> = [
        ("red", spec.red),
        ("green", spec.green),
        ("blue", spec.blue),
        ("brightness", spec.brightness),
        ("contrast", spec.contrast),
        ("saturation", spec.saturation),
    ]
    .into_iter()
    .filter(|(_, v)| *v != 0.0)
    .map(|(name, v)| format!("{name} {v:+}"))
    .chain((spec.opacity < 100.0).then(|| format!("opacity {}%", spec.opacity)))
    .collect();

    if parts.is_empty() {
        "Color balance (no change)".to_string()
    } else {
        format!("Color balance: {}", parts.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Transforming,
    Encoding,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Transforming => "transforming",
            Self::Encoding => "encoding",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// An image that dropped out of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedImage {
    /// Position in the input working set.
    pub index: usize,
    pub name: String,
    pub reason: String,
}

/// Progress reports for a listening printer.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Started {
        kind: OperationKind,
        image_count: usize,
    },
    StateChanged(PipelineState),
    ImageDone {
        index: usize,
        name: String,
        original_size: u64,
        new_size: u64,
    },
    ImageSkipped(SkippedImage),
    Finished {
        kind: OperationKind,
        produced: usize,
        skipped: usize,
    },
}

/// The new working set produced by one run.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub kind: OperationKind,
    pub images: Vec<Image>,
    pub skipped: Vec<SkippedImage>,
}

/// Runs operations against working sets through a codec backend.
pub struct ToolPipeline<'a, B: ImageBackend> {
    backend: &'a B,
    events: Option<Sender<PipelineEvent>>,
    state: PipelineState,
}

/// Per-run data prepared once before any image is touched.
enum Prepared {
    Nothing,
    Stamp(Stamp),
}

impl<'a, B: ImageBackend> ToolPipeline<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            events: None,
            state: PipelineState::Idle,
        }
    }

    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver just means nobody is listening.
            let _ = tx.send(event);
        }
    }

    fn transition(&mut self, state: PipelineState) {
        tracing::debug!(from = self.state.as_str(), to = state.as_str(), "Pipeline state");
        self.state = state;
        self.emit(PipelineEvent::StateChanged(state));
    }

    fn fail(&mut self, err: PreconditionError) -> PipelineError {
        tracing::warn!(error = %err, "Batch aborted");
        self.transition(PipelineState::Failed);
        PipelineError::Precondition(err)
    }

    fn skip(&self, skipped: &mut Vec<SkippedImage>, index: usize, name: &str, err: &BackendError) {
        tracing::warn!(image = name, error = %err, "Image skipped");
        let entry = SkippedImage {
            index,
            name: name.to_string(),
            reason: err.to_string(),
        };
        self.emit(PipelineEvent::ImageSkipped(entry.clone()));
        skipped.push(entry);
    }

    /// Apply `op` to `working` and return the resulting working set.
    ///
    /// `working` itself is never modified.
    pub fn run(&mut self, working: &[Image], op: &Operation) -> Result<BatchResult, PipelineError> {
        let kind = op.kind();
        tracing::info!(operation = %kind, images = working.len(), "Running batch");
        self.emit(PipelineEvent::Started {
            kind,
            image_count: working.len(),
        });

        let result = match op {
            Operation::Merge(spec) => self.run_merge(working, spec)?,
            _ => {
                let prepared = match op {
                    Operation::Watermark(spec) => match watermark::prepare_stamp(spec, self.backend) {
                        Ok(stamp) => Prepared::Stamp(stamp),
                        Err(e) => return Err(self.fail(e)),
                    },
                    _ => Prepared::Nothing,
                };
                self.run_per_image(working, op, &prepared)
            }
        };

        self.transition(PipelineState::Done);
        tracing::info!(
            operation = %kind,
            produced = result.images.len(),
            skipped = result.skipped.len(),
            "Batch finished"
        );
        self.emit(PipelineEvent::Finished {
            kind,
            produced: result.images.len(),
            skipped: result.skipped.len(),
        });
        Ok(result)
    }

    fn load(&self, image: &Image, policy: SourcePolicy) -> Result<RasterBuffer, BackendError> {
        match (&image.raster, policy) {
            (Some(raster), SourcePolicy::Working) => Ok(raster.clone()),
            _ => self.backend.decode(image.source.bytes()),
        }
    }

    /// Load every image in `indices` in parallel; failures go to `skipped`.
    fn load_all(
        &mut self,
        working: &[Image],
        indices: &[usize],
        policy: SourcePolicy,
        skipped: &mut Vec<SkippedImage>,
    ) -> Vec<(usize, RasterBuffer)> {
        self.transition(PipelineState::Loading);
        let results: Vec<(usize, Result<RasterBuffer, BackendError>)> = indices
            .par_iter()
            .map(|&i| (i, self.load(&working[i], policy)))
            .collect();

        let mut loaded = Vec::with_capacity(results.len());
        for (i, result) in results {
            match result {
                Ok(buf) => loaded.push((i, buf)),
                Err(e) => self.skip(skipped, i, &working[i].name, &e),
            }
        }
        loaded
    }

    fn run_per_image(&mut self, working: &[Image], op: &Operation, prepared: &Prepared) -> BatchResult {
        let mut skipped = Vec::new();
        let indices: Vec<usize> = (0..working.len()).collect();
        let mut loaded = self.load_all(working, &indices, op.source_policy(), &mut skipped);

        self.transition(PipelineState::Transforming);
        loaded
            .par_iter_mut()
            .for_each(|(_, buf)| transform(buf, op, prepared));

        self.transition(PipelineState::Encoding);
        let encoded: Vec<(usize, RasterBuffer, Result<Vec<u8>, BackendError>)> = loaded
            .into_par_iter()
            .map(|(i, buf)| {
                let (mime, quality) = output_format(op, &working[i]);
                let bytes = self.backend.encode(&buf, mime, quality);
                (i, buf, bytes)
            })
            .collect();

        let mut images = Vec::with_capacity(encoded.len());
        for (i, buf, bytes) in encoded {
            let source = &working[i];
            match bytes {
                Ok(bytes) => {
                    let (mime, quality) = output_format(op, source);
                    self.emit(PipelineEvent::ImageDone {
                        index: i,
                        name: source.name.clone(),
                        original_size: source.original_size,
                        new_size: bytes.len() as u64,
                    });
                    images.push(Image {
                        name: output_name(op, &source.name),
                        source: source.source.clone(),
                        original_size: source.original_size,
                        mime,
                        quality,
                        raster: Some(buf),
                        encoded: Some(bytes),
                    });
                }
                Err(e) => self.skip(&mut skipped, i, &source.name, &e),
            }
        }

        BatchResult {
            kind: op.kind(),
            images,
            skipped,
        }
    }

    fn run_merge(&mut self, working: &[Image], spec: &MergeSpec) -> Result<BatchResult, PipelineError> {
        let selection = spec.selection();
        if selection.len() < 2 {
            return Err(self.fail(PreconditionError::NotEnoughImages(selection.len())));
        }
        if let Some(&index) = selection.iter().find(|&&i| i >= working.len()) {
            return Err(self.fail(PreconditionError::SelectionOutOfRange {
                index,
                len: working.len(),
            }));
        }

        let mut skipped = Vec::new();
        let loaded = self.load_all(working, &selection, SourcePolicy::Working, &mut skipped);

        self.transition(PipelineState::Transforming);
        let buffers: Vec<&RasterBuffer> = loaded.iter().map(|(_, b)| b).collect();
        let merged = match operations::merge(&buffers, spec) {
            Ok(m) => m,
            Err(e) => return Err(self.fail(e)),
        };

        self.transition(PipelineState::Encoding);
        let mut images = working.to_vec();
        match self.backend.encode(&merged, MimeType::Png, None) {
            Ok(bytes) => {
                let name = format!(
                    "merged-{}-{}.png",
                    spec.direction.as_str(),
                    chrono::Utc::now().timestamp_millis()
                );
                self.emit(PipelineEvent::ImageDone {
                    index: working.len(),
                    name: name.clone(),
                    original_size: bytes.len() as u64,
                    new_size: bytes.len() as u64,
                });
                let mut image = Image::from_encoded(name, bytes.clone(), MimeType::Png);
                image.raster = Some(merged);
                image.encoded = Some(bytes);
                images.push(image);
            }
            Err(e) => self.skip(&mut skipped, working.len(), "merged image", &e),
        }

        Ok(BatchResult {
            kind: OperationKind::Merge,
            images,
            skipped,
        })
    }
}

fn transform(buf: &mut RasterBuffer, op: &Operation, prepared: &Prepared) {
    match op {
        Operation::Format(_) => {}
        Operation::Resize(spec) => *buf = operations::resize(buf, spec),
        Operation::Color(spec) => match spec.kind {
            ColorTransformKind::Replace => kernel::color_replace(
                buf,
                spec.source_color,
                spec.target_color,
                spec.clamped_tolerance(),
            ),
            ColorTransformKind::Grayscale => kernel::grayscale(buf),
            ColorTransformKind::Sepia => kernel::sepia(buf),
            ColorTransformKind::Invert => kernel::invert(buf),
        },
        Operation::Balance(spec) => kernel::color_balance(buf, spec),
        Operation::Watermark(spec) => {
            if let Prepared::Stamp(stamp) = prepared {
                watermark::apply_watermark(buf, stamp, spec);
            }
        }
        // Merge is whole-batch and never reaches the per-image path.
        Operation::Merge(_) => {}
    }
}

/// Format and quality an image is written in after `op`.
fn output_format(op: &Operation, image: &Image) -> (MimeType, Option<Quality>) {
    match op {
        Operation::Format(spec) => (spec.target, spec.output_quality()),
        _ => {
            let mime = image.mime.output_format();
            (mime, if mime.uses_quality() { image.quality } else { None })
        }
    }
}

fn output_name(op: &Operation, name: &str) -> String {
    match op {
        Operation::Watermark(_) => format!("watermarked-{name}"),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::{MockBackend, RecordedOp};
    use crate::imaging::{CropArea, MergeDirection, Rgb};
    use crate::test_helpers::*;
    use std::sync::mpsc;

    fn run(backend: &MockBackend, working: &[Image], op: Operation) -> BatchResult {
        ToolPipeline::new(backend).run(working, &op).unwrap()
    }

    // =========================================================================
    // Per-image tools
    // =========================================================================

    #[test]
    fn resize_applies_to_every_image() {
        let backend = MockBackend::new();
        let working = vec![
            png_image("a.png", &gradient(200, 100)),
            png_image("b.png", &gradient(40, 40)),
        ];
        let result = run(&backend, &working, Operation::Resize(ResizeSpec::percentage(50.0)));

        assert_eq!(result.kind, OperationKind::Size);
        assert_eq!(result.images.len(), 2);
        assert_eq!(result.images[0].raster.as_ref().unwrap().dimensions(), (100, 50));
        assert_eq!(result.images[1].raster.as_ref().unwrap().dimensions(), (20, 20));
        assert_eq!(result.images[0].name, "a.png");
        assert!(result.skipped.is_empty());
    }

    #[test]
    fn input_working_set_is_untouched() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &gradient(10, 10))];
        let _ = run(&backend, &working, Operation::Color(ColorTransformSpec::of_kind(ColorTransformKind::Invert)));
        assert!(working[0].raster.is_none());
    }

    #[test]
    fn crop_takes_centre_region() {
        let backend = MockBackend::new();
        let src = gradient(400, 200);
        let working = vec![png_image("a.png", &src)];
        let spec = ResizeSpec::crop(CropArea {
            x: 25.0,
            y: 25.0,
            width: 50.0,
            height: 50.0,
        });
        let result = run(&backend, &working, Operation::Resize(spec));
        let out = result.images[0].raster.as_ref().unwrap();
        assert_eq!(out.dimensions(), (200, 100));
        assert_eq!(out.pixel(0, 0), src.pixel(100, 50));
    }

    #[test]
    fn working_tools_chain_on_current_raster() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &gradient(100, 100))];
        let halved = run(&backend, &working, Operation::Resize(ResizeSpec::percentage(50.0)));
        let gray = run(
            &backend,
            &halved.images,
            Operation::Color(ColorTransformSpec::of_kind(ColorTransformKind::Grayscale)),
        );
        assert_eq!(gray.images[0].raster.as_ref().unwrap().dimensions(), (50, 50));
    }

    #[test]
    fn format_conversion_starts_from_original_bytes() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &gradient(100, 100))];
        let halved = run(&backend, &working, Operation::Resize(ResizeSpec::percentage(50.0)));

        let spec = FormatSpec {
            target: MimeType::Jpeg,
            quality: Quality::new(70),
        };
        let converted = run(&backend, &halved.images, Operation::Format(spec));
        let img = &converted.images[0];
        assert_eq!(img.raster.as_ref().unwrap().dimensions(), (100, 100));
        assert_eq!(img.mime, MimeType::Jpeg);
        assert_eq!(img.quality, Some(Quality::new(70)));
        assert!(backend.encodes().contains(&RecordedOp::Encode {
            width: 100,
            height: 100,
            mime: MimeType::Jpeg,
            quality: Some(70),
        }));
    }

    #[test]
    fn jpeg_keeps_its_quality_through_other_tools() {
        let backend = MockBackend::new();
        let working = vec![jpeg_image("a.jpg", &gradient(16, 16))];
        let result = run(&backend, &working, Operation::Color(ColorTransformSpec::of_kind(ColorTransformKind::Invert)));
        assert_eq!(result.images[0].mime, MimeType::Jpeg);
        assert_eq!(result.images[0].quality, Some(Quality::new(90)));
    }

    #[test]
    fn gif_results_are_written_as_png() {
        let backend = MockBackend::new();
        let buf = RasterBuffer::filled(4, 4, RED);
        let gif = {
            let mut out = std::io::Cursor::new(Vec::new());
            image::DynamicImage::ImageRgba8(buf.clone().into_image())
                .write_to(&mut out, image::ImageFormat::Gif)
                .unwrap();
            out.into_inner()
        };
        let working = vec![Image::from_encoded("a.gif", gif, MimeType::Gif)];
        let result = run(&backend, &working, Operation::Color(ColorTransformSpec::of_kind(ColorTransformKind::Invert)));
        assert_eq!(result.images[0].mime, MimeType::Png);
    }

    #[test]
    fn undecodable_image_is_skipped_not_fatal() {
        let backend = MockBackend::new();
        let working = vec![
            png_image("a.png", &gradient(10, 10)),
            corrupt_image("broken.png"),
            png_image("c.png", &gradient(12, 12)),
        ];
        let result = run(&backend, &working, Operation::Color(ColorTransformSpec::of_kind(ColorTransformKind::Sepia)));
        let names: Vec<_> = result.images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.png", "c.png"]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].index, 1);
        assert_eq!(result.skipped[0].name, "broken.png");
    }

    #[test]
    fn encode_failure_is_skipped() {
        let backend = MockBackend::failing_encode(7, 7);
        let working = vec![
            png_image("a.png", &gradient(7, 7)),
            png_image("b.png", &gradient(8, 8)),
        ];
        let result = run(&backend, &working, Operation::Color(ColorTransformSpec::of_kind(ColorTransformKind::Invert)));
        assert_eq!(result.images.len(), 1);
        assert_eq!(result.images[0].name, "b.png");
        assert_eq!(result.skipped[0].name, "a.png");
    }

    #[test]
    fn color_replace_hits_only_matching_pixels() {
        let backend = MockBackend::new();
        let mut buf = RasterBuffer::filled(2, 1, RED);
        buf.put_pixel(1, 0, WHITE);
        let working = vec![png_image("a.png", &buf)];
        let spec = ColorTransformSpec {
            kind: ColorTransformKind::Replace,
            source_color: Rgb::new(255, 0, 0),
            target_color: Rgb::new(0, 0, 255),
            tolerance: 0.0,
        };
        let result = run(&backend, &working, Operation::Color(spec));
        let out = result.images[0].raster.as_ref().unwrap();
        assert_eq!(out.pixel(0, 0), BLUE);
        assert_eq!(out.pixel(1, 0), WHITE);
    }

    // =========================================================================
    // Merge
    // =========================================================================

    fn merge_spec(selected: Vec<usize>) -> MergeSpec {
        MergeSpec {
            direction: MergeDirection::Horizontal,
            spacing: 10,
            background: Rgb::WHITE,
            selected,
        }
    }

    #[test]
    fn merge_appends_combined_image() {
        let backend = MockBackend::new();
        let working = vec![
            png_image("a.png", &RasterBuffer::filled(100, 50, RED)),
            png_image("b.png", &RasterBuffer::filled(80, 60, BLUE)),
            png_image("c.png", &RasterBuffer::filled(5, 5, GREEN)),
        ];
        let result = run(&backend, &working, Operation::Merge(merge_spec(vec![1, 0])));

        assert_eq!(result.images.len(), 4);
        assert_eq!(result.images[2].name, "c.png");
        assert!(result.images[2].raster.is_none());

        let merged = &result.images[3];
        assert!(merged.name.starts_with("merged-horizontal-"));
        assert!(merged.name.ends_with(".png"));
        assert_eq!(merged.mime, MimeType::Png);
        let raster = merged.raster.as_ref().unwrap();
        assert_eq!(raster.dimensions(), (190, 60));
        // sorted selection: a first, then b
        assert_eq!(raster.pixel(0, 5), RED);
        assert_eq!(raster.pixel(0, 0), WHITE);
        assert_eq!(raster.pixel(110, 0), BLUE);
        assert_eq!(merged.original_size, merged.new_size().unwrap());
    }

    #[test]
    fn merge_needs_two_selected() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &gradient(4, 4)), png_image("b.png", &gradient(4, 4))];
        let mut pipeline = ToolPipeline::new(&backend);
        let err = pipeline
            .run(&working, &Operation::Merge(merge_spec(vec![1, 1])))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Precondition(PreconditionError::NotEnoughImages(1))
        ));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn merge_rejects_out_of_range_selection() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &gradient(4, 4))];
        let err = ToolPipeline::new(&backend)
            .run(&working, &Operation::Merge(merge_spec(vec![0, 3])))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Precondition(PreconditionError::SelectionOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn merge_fails_when_loading_leaves_one_image() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &gradient(4, 4)), corrupt_image("b.png")];
        let err = ToolPipeline::new(&backend)
            .run(&working, &Operation::Merge(merge_spec(vec![0, 1])))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Precondition(PreconditionError::NotEnoughImages(1))
        ));
    }

    // =========================================================================
    // Watermark
    // =========================================================================

    #[test]
    fn watermark_renames_outputs() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &RasterBuffer::filled(20, 20, WHITE))];
        let spec = WatermarkSpec {
            opacity: 1.0,
            ..WatermarkSpec::image(png_bytes(&RasterBuffer::filled(4, 4, RED)))
        };
        let result = run(&backend, &working, Operation::Watermark(spec));
        assert_eq!(result.images[0].name, "watermarked-a.png");
        // bottom-right with 20px offsets lands off a 20px canvas
        assert_eq!(result.images[0].raster.as_ref().unwrap().pixel(19, 19), WHITE);
    }

    #[test]
    fn empty_watermark_text_fails_batch() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &gradient(4, 4))];
        let err = ToolPipeline::new(&backend)
            .run(&working, &Operation::Watermark(WatermarkSpec::text("")))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Precondition(PreconditionError::EmptyWatermarkText)
        ));
        assert!(backend.get_operations().is_empty());
    }

    // =========================================================================
    // Events, descriptions, serde
    // =========================================================================

    #[test]
    fn events_follow_state_machine() {
        let backend = MockBackend::new();
        let working = vec![png_image("a.png", &gradient(4, 4))];
        let (tx, rx) = mpsc::channel();
        ToolPipeline::new(&backend)
            .with_events(tx)
            .run(&working, &Operation::Color(ColorTransformSpec::of_kind(ColorTransformKind::Invert)))
            .unwrap();

        let states: Vec<PipelineState> = rx
            .try_iter()
            .filter_map(|e| match e {
                PipelineEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                PipelineState::Loading,
                PipelineState::Transforming,
                PipelineState::Encoding,
                PipelineState::Done,
            ]
        );
    }

    #[test]
    fn descriptions_are_readable() {
        assert_eq!(
            Operation::Resize(ResizeSpec::percentage(50.0)).describe(),
            "Resize to 50%"
        );
        assert_eq!(
            Operation::Color(ColorTransformSpec::default()).describe(),
            "Color replace #ff0000 \u{2192} #00ff00 (tolerance 30)"
        );
        let balance = ColorBalanceSpec {
            red: 10.0,
            contrast: -5.0,
            opacity: 80.0,
            ..ColorBalanceSpec::default()
        };
        assert_eq!(
            Operation::Balance(balance).describe(),
            "Color balance: red +10, contrast -5, opacity 80%"
        );
        assert_eq!(
            Operation::Format(FormatSpec::default()).describe(),
            "Format conversion to image/png"
        );
    }

    #[test]
    fn operations_deserialize_from_tagged_tables() {
        let op: Operation = toml::from_str("op = \"size\"\nmode = \"percentage\"\npercentage = 50.0\n").unwrap();
        assert_eq!(op, Operation::Resize(ResizeSpec::percentage(50.0)));

        let op: Operation = toml::from_str("op = \"color\"\ntype = \"invert\"\n").unwrap();
        assert_eq!(op.kind(), OperationKind::Color);

        let op: Operation = toml::from_str("op = \"merge\"\nselected = [0, 2]\n").unwrap();
        assert_eq!(op.source_policy(), SourcePolicy::Working);
    }
}
