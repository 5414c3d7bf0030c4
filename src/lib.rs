//! # pixbatch
//!
//! A batch raster editor. Load a set of images, run tools over all of them at
//! once, step back through what you did, and export the result as a single
//! file or a ZIP archive.
//!
//! # Architecture
//!
//! ```text
//! intake → Session ──apply(op)──→ ToolPipeline ──→ new working set
//!             │                       │                    │
//!             │                  ImageBackend              ▼
//!             │               (decode / encode)      HistoryStore
//!             └──────────export──→ BatchExporter ──→ file / .zip
//! ```
//!
//! A [`session::Session`] owns the loaded originals, the current working set
//! and the history. Each tool invocation is an [`pipeline::Operation`]; the
//! [`pipeline::ToolPipeline`] runs it over every image in parallel and hands
//! back a fresh working set, which is then snapshotted into
//! [`history::HistoryStore`]. Reverting or resetting never re-runs a tool:
//! history entries are full copies.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Pixel buffers, per-pixel kernels, geometry, watermark compositing, codecs |
//! | [`pipeline`] | Operation definitions and the batch state machine |
//! | [`history`] | Append-only snapshot log with revert and reset |
//! | [`session`] | Intake, apply, revert, export; the one-batch-at-a-time flag |
//! | [`export`] | Single-file and ZIP export |
//! | [`slideshow`] | Letterboxed slide frames and the ffmpeg video encoder |
//! | [`config`] | Layered `pixbatch.toml` loading and recipe files |
//! | [`types`] | Intake files and the `Image` record |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Fail the image, not the batch
//!
//! A file that won't decode or encode drops out of the batch result and is
//! listed in [`pipeline::BatchResult::skipped`]. The session keeps its
//! previous state in the working set, so the next tool retries it. Only problems with the request
//! itself (a merge with one image selected, a watermark with no text) abort
//! the run, and then the working set and history are left as they were.
//!
//! ## Format conversion starts from the original
//!
//! Converting to JPEG and back must not compound loss, so the format tool
//! always decodes the bytes the image was loaded with. Every other tool
//! continues from the current pixels.
//!
//! ## Pure-Rust codecs, ffmpeg only for video
//!
//! Decoding and encoding go through the `image` crate behind the
//! [`imaging::backend::ImageBackend`] trait; text watermarks are rasterised
//! with `resvg`. The only external program is `ffmpeg`, used solely for the
//! slideshow export and located lazily on first use.

pub mod config;
pub mod export;
pub mod history;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod session;
pub mod slideshow;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
