//! Undo history over working-set snapshots.
//!
//! The store keeps the originals loaded at intake plus an append-only list of
//! entries, each a deep copy of the working set after one tool ran. Reverting
//! truncates the list after the chosen entry and hands back copies of its
//! images; resetting clears the list and hands back the originals.
//!
//! Every entry holds full pixel buffers, so memory grows linearly with the
//! number of recorded operations. [`HistoryStore::retained_bytes`] reports
//! the current total.

use crate::pipeline::OperationKind;
use crate::types::Image;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum HistoryError {
    #[error("no history entry with id {0}")]
    UnknownEntry(EntryId),
}

/// Identifier of a history entry. Unique and increasing within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One recorded operation. Immutable once created.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    id: EntryId,
    created_at: DateTime<Utc>,
    operation: OperationKind,
    description: String,
    images: Vec<Image>,
}

impl HistoryEntry {
    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn images(&self) -> &[Image] {
        &self.images
    }

    fn retained_bytes(&self) -> usize {
        self.images.iter().map(Image::retained_bytes).sum()
    }

    pub fn summary(&self) -> EntrySummary {
        EntrySummary {
            id: self.id,
            created_at: self.created_at,
            operation: self.operation,
            description: self.description.clone(),
            images: self.images.iter().map(|img| img.name.clone()).collect(),
        }
    }
}

/// Pixel-free view of an entry, written to the run log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntrySummary {
    pub id: EntryId,
    pub created_at: DateTime<Utc>,
    pub operation: OperationKind,
    pub description: String,
    pub images: Vec<String>,
}

#[derive(Debug, Default)]
pub struct HistoryStore {
    originals: Vec<Image>,
    entries: Vec<HistoryEntry>,
    next_id: u64,
}

impl HistoryStore {
    pub fn new(originals: Vec<Image>) -> Self {
        Self {
            originals,
            entries: Vec::new(),
            next_id: 1,
        }
    }

    pub fn originals(&self) -> &[Image] {
        &self.originals
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: EntryId) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Append a deep copy of `images` as a new entry.
    ///
    /// Batches where no image carries pixels are not recorded; `None` is
    /// returned for those.
    pub fn record(
        &mut self,
        operation: OperationKind,
        description: impl Into<String>,
        images: &[Image],
    ) -> Option<EntryId> {
        if !images.iter().any(Image::is_touched) {
            tracing::debug!(%operation, "Nothing processed, history unchanged");
            return None;
        }

        let id = EntryId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        self.entries.push(HistoryEntry {
            id,
            created_at: Utc::now(),
            operation,
            description: description.into(),
            images: images.to_vec(),
        });
        tracing::debug!(
            %id,
            %operation,
            entries = self.entries.len(),
            retained_bytes = self.retained_bytes(),
            "History entry recorded"
        );
        Some(id)
    }

    /// Drop every entry after `id` and return copies of `id`'s images.
    ///
    /// On an unknown id nothing changes.
    pub fn revert_to(&mut self, id: EntryId) -> Result<Vec<Image>, HistoryError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or(HistoryError::UnknownEntry(id))?;
        self.entries.truncate(pos + 1);
        tracing::debug!(%id, entries = self.entries.len(), "Reverted history");
        Ok(self.entries[pos].images.clone())
    }

    /// Clear every entry and return copies of the originals.
    pub fn reset_to_original(&mut self) -> Vec<Image> {
        self.entries.clear();
        self.originals.clone()
    }

    pub fn summaries(&self) -> Vec<EntrySummary> {
        self.entries.iter().map(HistoryEntry::summary).collect()
    }

    /// Bytes of pixel and encoded data held across all entries.
    pub fn retained_bytes(&self) -> usize {
        self.entries.iter().map(HistoryEntry::retained_bytes).sum()
    }
}
