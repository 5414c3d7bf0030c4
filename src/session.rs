//! An editing session: one set of loaded images and everything done to them.
//!
//! The session owns the codec backend, the current working set and the
//! [`HistoryStore`]. Tools run through [`Session::apply`], which replaces the
//! working set with the pipeline's result and records it in history. An
//! image that drops out of a batch keeps its previous state in the working
//! set, so the next tool gets another go at it.
//!
//! Only one batch may run at a time. The session exposes a
//! [`ProcessingFlag`] that is raised for the duration of a batch so other
//! threads (a progress printer, a UI) can observe it.

use crate::export::{BatchExporter, Export, ExportError};
use crate::history::{EntryId, HistoryError, HistoryStore};
use crate::imaging::ImageBackend;
use crate::pipeline::{
    BatchResult, Operation, OperationKind, PipelineError, PipelineEvent, SkippedImage, ToolPipeline,
};
use crate::types::{Image, IntakeError, SourceFile};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a batch is already running")]
    Busy,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Shared "batch in progress" indicator.
#[derive(Debug, Clone, Default)]
pub struct ProcessingFlag(Arc<AtomicBool>);

impl ProcessingFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Raise the flag; `None` if it was already raised.
    fn acquire(&self) -> Option<ProcessingGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard(self))
    }
}

/// Lowers the flag when dropped, including on early return.
struct ProcessingGuard<'a>(&'a ProcessingFlag);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.0.store(false, Ordering::Release);
    }
}

/// Which files made it into the session.
#[derive(Debug, Default)]
pub struct IntakeReport {
    pub accepted: usize,
    pub rejected: Vec<IntakeError>,
}

/// What a successful [`Session::apply`] did.
#[derive(Debug)]
pub struct ApplyOutcome {
    pub kind: OperationKind,
    /// History entry for this batch; `None` if nothing was produced.
    pub entry: Option<EntryId>,
    pub produced: usize,
    pub skipped: Vec<SkippedImage>,
}

pub struct Session<B: ImageBackend> {
    backend: B,
    working: Vec<Image>,
    history: HistoryStore,
    processing: ProcessingFlag,
    events: Option<Sender<PipelineEvent>>,
}

impl<B: ImageBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            working: Vec::new(),
            history: HistoryStore::default(),
            processing: ProcessingFlag::default(),
            events: None,
        }
    }

    /// Forward pipeline progress to `events`.
    pub fn with_events(mut self, events: Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Stop forwarding progress; drops the sender so a printer can finish.
    pub fn close_events(&mut self) {
        self.events = None;
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn working(&self) -> &[Image] {
        &self.working
    }

    pub fn originals(&self) -> &[Image] {
        self.history.originals()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn is_processing(&self) -> bool {
        self.processing.is_set()
    }

    /// Handle for observing the processing state from elsewhere.
    pub fn processing_flag(&self) -> ProcessingFlag {
        self.processing.clone()
    }

    /// Accept image files, replacing the session contents.
    ///
    /// Files that aren't supported images are reported and left out. If no
    /// file is accepted the session keeps what it had.
    pub fn intake(&mut self, files: Vec<SourceFile>) -> IntakeReport {
        let mut report = IntakeReport::default();
        let mut accepted = Vec::new();
        for file in files {
            match Image::intake(file) {
                Ok(img) => accepted.push(img),
                Err(e) => {
                    tracing::warn!(error = %e, "File rejected");
                    report.rejected.push(e);
                }
            }
        }
        report.accepted = accepted.len();
        if !accepted.is_empty() {
            self.load(accepted);
        }
        report
    }

    /// Start over with `images` as both originals and working set.
    pub fn load(&mut self, images: Vec<Image>) {
        tracing::info!(images = images.len(), "Images loaded");
        self.working = images.clone();
        self.history = HistoryStore::new(images);
    }

    /// Run `op` over the working set.
    ///
    /// On success the working set is replaced by the result and a history
    /// entry is recorded. Skipped images stay in place as they were. If the
    /// batch fails, or every image is skipped, nothing changes.
    pub fn apply(&mut self, op: &Operation) -> Result<ApplyOutcome, SessionError> {
        let flag = self.processing.clone();
        let _guard = flag.acquire().ok_or(SessionError::Busy)?;

        let mut pipeline = ToolPipeline::new(&self.backend);
        if let Some(tx) = &self.events {
            pipeline = pipeline.with_events(tx.clone());
        }
        let BatchResult {
            kind,
            images,
            skipped,
        } = pipeline.run(&self.working, op)?;

        let produced = images.len();
        if produced == 0 {
            tracing::warn!(operation = %kind, skipped = skipped.len(), "No image survived the batch");
            return Ok(ApplyOutcome {
                kind,
                entry: None,
                produced,
                skipped,
            });
        }

        let images = match kind {
            // merge already carries the whole working set forward
            OperationKind::Merge => images,
            _ => carry_forward(&self.working, images, &skipped),
        };
        let entry = self.history.record(kind, op.describe(), &images);
        self.working = images;
        Ok(ApplyOutcome {
            kind,
            entry,
            produced,
            skipped,
        })
    }

    /// Restore the working set recorded by entry `id`.
    pub fn revert_to(&mut self, id: EntryId) -> Result<(), SessionError> {
        self.working = self.history.revert_to(id)?;
        tracing::info!(%id, "Reverted");
        Ok(())
    }

    /// Discard all history and go back to the images as loaded.
    pub fn reset_to_original(&mut self) {
        self.working = self.history.reset_to_original();
        tracing::info!("Reset to original images");
    }

    /// Export the current working set under the given operation name.
    pub fn export_working(
        &self,
        exporter: &impl BatchExporter,
        operation: &str,
    ) -> Result<Option<Export>, SessionError> {
        Ok(exporter.export(&self.working, operation)?)
    }

    /// Export the images recorded by history entry `id`.
    pub fn export_entry(
        &self,
        exporter: &impl BatchExporter,
        id: EntryId,
    ) -> Result<Option<Export>, SessionError> {
        let entry = self.history.get(id).ok_or(HistoryError::UnknownEntry(id))?;
        Ok(exporter.export(entry.images(), entry.operation().as_str())?)
    }
}

/// Put the previous version of each skipped image back at its position.
///
/// `produced` holds the surviving images in working-set order.
fn carry_forward(working: &[Image], produced: Vec<Image>, skipped: &[SkippedImage]) -> Vec<Image> {
    let mut produced = produced.into_iter();
    working
        .iter()
        .enumerate()
        .filter_map(|(i, previous)| {
            if skipped.iter().any(|s| s.index == i) {
                Some(previous.clone())
            } else {
                produced.next()
            }
        })
        .collect()
}
