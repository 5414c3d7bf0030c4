//! Slideshow video export.
//!
//! Each image becomes one still frame: scaled to fit a fixed canvas (1920x1080
//! by default), centred on a black background and encoded as PNG. The frames
//! are handed to a [`VideoEncoder`]; the production encoder shells out to
//! `ffmpeg`:
//!
//! ```text
//! ffmpeg -y -framerate 1 -i frame%04d.png -c:v libx264 -pix_fmt yuv420p \
//!        -preset medium -crf 23 output.mp4
//! ```
//!
//! The `ffmpeg` binary is looked up on `PATH` once per process.

use crate::imaging::{
    BackendError, ImageBackend, MimeType, RasterBuffer, Rgb, calculate_contain_rect,
};
use crate::types::Image;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("no frames to encode")]
    NoFrames,
    #[error("ffmpeg not found (looked for {0})")]
    EncoderNotFound(String),
    #[error("frame encoding failed: {0}")]
    Frame(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg exited with {status}: {stderr}")]
    EncoderFailed { status: String, stderr: String },
}

/// Frame geometry and encoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlideshowSpec {
    pub width: u32,
    pub height: u32,
    /// Frames (slides) per second.
    pub frame_rate: u32,
    pub preset: String,
    pub crf: u8,
    pub background: Rgb,
    /// Explicit ffmpeg binary; looked up on `PATH` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ffmpeg: Option<PathBuf>,
}

impl Default for SlideshowSpec {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            frame_rate: 1,
            preset: "medium".to_string(),
            crf: 23,
            background: Rgb::BLACK,
            ffmpeg: None,
        }
    }
}

/// Frames in, video bytes out.
pub trait VideoEncoder {
    fn encode(&self, frames: &[Vec<u8>], spec: &SlideshowSpec) -> Result<Vec<u8>, VideoError>;
}

/// Letterbox `buffer` onto a background-filled frame.
pub fn render_frame(buffer: &RasterBuffer, spec: &SlideshowSpec) -> RasterBuffer {
    let mut frame = RasterBuffer::filled(spec.width, spec.height, spec.background.to_rgba());
    let placement = calculate_contain_rect(buffer.dimensions(), (spec.width, spec.height));
    frame.draw_region(buffer, buffer.bounds(), placement);
    frame
}

/// Render every image to an encoded PNG frame, in order.
///
/// Images that can't be decoded are left out with a warning.
pub fn render_frames(
    images: &[Image],
    backend: &impl ImageBackend,
    spec: &SlideshowSpec,
) -> Result<Vec<Vec<u8>>, VideoError> {
    let frames: Vec<Option<Result<Vec<u8>, BackendError>>> = images
        .par_iter()
        .map(|image| {
            let pixels = match &image.raster {
                Some(raster) => raster.clone(),
                None => match backend.decode(image.source.bytes()) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        tracing::warn!(image = %image.name, error = %e, "Slide skipped");
                        return None;
                    }
                },
            };
            Some(backend.encode(&render_frame(&pixels, spec), MimeType::Png, None))
        })
        .collect();

    let frames = frames.into_iter().flatten().collect::<Result<Vec<_>, _>>()?;
    if frames.is_empty() {
        return Err(VideoError::NoFrames);
    }
    Ok(frames)
}

/// Render `images` into frames and encode them into a video.
pub fn make_slideshow(
    images: &[Image],
    backend: &impl ImageBackend,
    encoder: &impl VideoEncoder,
    spec: &SlideshowSpec,
) -> Result<Vec<u8>, VideoError> {
    let frames = render_frames(images, backend, spec)?;
    tracing::info!(frames = frames.len(), "Encoding slideshow");
    encoder.encode(&frames, spec)
}

// ============================================================================
// ffmpeg
// ============================================================================

const FRAME_PATTERN: &str = "frame%04d.png";
const OUTPUT_NAME: &str = "output.mp4";

fn frame_name(index: usize) -> String {
    format!("frame{index:04}.png")
}

/// Command-line arguments for one encode, relative to the frame directory.
pub fn ffmpeg_args(spec: &SlideshowSpec) -> Vec<String> {
    [
        "-y",
        "-framerate",
        &spec.frame_rate.to_string(),
        "-i",
        FRAME_PATTERN,
        "-c:v",
        "libx264",
        "-pix_fmt",
        "yuv420p",
        "-preset",
        &spec.preset,
        "-crf",
        &spec.crf.to_string(),
        OUTPUT_NAME,
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn find_on_path(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

static FFMPEG_ON_PATH: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Encoder running a local `ffmpeg` binary over frames in a temp directory.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
}

impl FfmpegEncoder {
    /// Use `configured` if given, else the `ffmpeg` found on `PATH`.
    pub fn locate(configured: Option<&Path>) -> Result<Self, VideoError> {
        if let Some(path) = configured {
            return if path.is_file() {
                Ok(Self {
                    program: path.to_path_buf(),
                })
            } else {
                Err(VideoError::EncoderNotFound(path.display().to_string()))
            };
        }
        let exe = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
        FFMPEG_ON_PATH
            .get_or_init(|| find_on_path(exe))
            .clone()
            .map(|program| Self { program })
            .ok_or_else(|| VideoError::EncoderNotFound(format!("{exe} on PATH")))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn encode(&self, frames: &[Vec<u8>], spec: &SlideshowSpec) -> Result<Vec<u8>, VideoError> {
        if frames.is_empty() {
            return Err(VideoError::NoFrames);
        }
        let workdir = tempfile::TempDir::new()?;
        for (i, frame) in frames.iter().enumerate() {
            std::fs::write(workdir.path().join(frame_name(i)), frame)?;
        }

        tracing::debug!(program = %self.program.display(), frames = frames.len(), "Running ffmpeg");
        let output = Command::new(&self.program)
            .args(ffmpeg_args(spec))
            .current_dir(workdir.path())
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            return Err(VideoError::EncoderFailed {
                status: output.status.to_string(),
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }
        Ok(std::fs::read(workdir.path().join(OUTPUT_NAME))?)
    }
}
