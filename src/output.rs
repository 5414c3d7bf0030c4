//! CLI output formatting.
//!
//! Display is information-first: every image leads with its positional index
//! and name, sizes and details follow as indented context.
//!
//! ## Working set
//!
//! ```text
//! 001 beach.jpg (jpeg)
//!     2.4 MB → 512.3 KB (79% smaller)
//! 002 logo.png (png)
//!     14.2 KB, unprocessed
//! ```
//!
//! ## History
//!
//! ```text
//! #1 size: Resize to 50% (2 images)
//! #2 watermark: Text watermark "© me" (single) (2 images)
//! ```
//!
//! ## Pipeline events
//!
//! ```text
//! ==> size (2 images)
//!     001 beach.jpg: 2.4 MB → 512.3 KB
//!     skipped 002 broken.png: decode failed: ...
//! ==> size done: 1 produced, 1 skipped
//! ```
//!
//! Each section has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout.

use crate::history::HistoryStore;
use crate::pipeline::PipelineEvent;
use crate::types::Image;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count, base 1024, up to two decimals.
///
/// ```text
/// 0        → 0 Bytes
/// 1536     → 1.5 KB
/// 1048576  → 1 MB
/// ```
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exp = 0;
    while exp + 1 < UNITS.len() && bytes >= 1u64 << (10 * (exp + 1)) {
        exp += 1;
    }
    let value = bytes as f64 / (1u64 << (10 * exp)) as f64;
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[exp])
}

/// Percentage saved going from `original` to `new`, rounded.
///
/// Negative when the result grew; zero for an empty original.
pub fn compression_percent(original: u64, new: u64) -> i64 {
    if original == 0 {
        return 0;
    }
    ((original as f64 - new as f64) / original as f64 * 100.0).round() as i64
}

// ============================================================================
// Processing statistics
// ============================================================================

/// Size totals over the processed images of a working set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingStats {
    pub processed: usize,
    pub total_original: u64,
    pub total_new: u64,
    /// Mean of the per-image compression percentages.
    pub average_compression: f64,
}

impl ProcessingStats {
    pub fn of(images: &[Image]) -> Self {
        let sizes: Vec<(u64, u64)> = images
            .iter()
            .filter_map(|img| img.new_size().map(|new| (img.original_size, new)))
            .collect();
        if sizes.is_empty() {
            return Self::default();
        }
        let percent_sum: i64 = sizes
            .iter()
            .map(|&(orig, new)| compression_percent(orig, new))
            .sum();
        Self {
            processed: sizes.len(),
            total_original: sizes.iter().map(|s| s.0).sum(),
            total_new: sizes.iter().map(|s| s.1).sum(),
            average_compression: percent_sum as f64 / sizes.len() as f64,
        }
    }

    /// Bytes saved overall; negative when the results are larger.
    pub fn saved(&self) -> i64 {
        self.total_original as i64 - self.total_new as i64
    }

    pub fn compression(&self) -> i64 {
        compression_percent(self.total_original, self.total_new)
    }
}

fn size_change(original: u64, new: u64) -> String {
    let pct = compression_percent(original, new);
    let change = if pct >= 0 {
        format!("{pct}% smaller")
    } else {
        format!("{}% larger", -pct)
    };
    format!(
        "{} → {} ({change})",
        format_file_size(original),
        format_file_size(new)
    )
}

/// Format the totals line block for a finished run.
pub fn format_stats(stats: &ProcessingStats) -> Vec<String> {
    if stats.processed == 0 {
        return vec!["No images processed".to_string()];
    }
    let saved = stats.saved();
    let saved_line = if saved >= 0 {
        format!("Saved {}", format_file_size(saved as u64))
    } else {
        format!("Grew by {}", format_file_size(saved.unsigned_abs()))
    };
    vec![
        format!(
            "Processed {} image{}: {}",
            stats.processed,
            if stats.processed == 1 { "" } else { "s" },
            size_change(stats.total_original, stats.total_new)
        ),
        format!(
            "{}{saved_line}, average {:.0}% per image",
            indent(1),
            stats.average_compression
        ),
    ]
}

pub fn print_stats(stats: &ProcessingStats) {
    for line in format_stats(stats) {
        println!("{}", line);
    }
}

// ============================================================================
// Working set and history
// ============================================================================

/// Format a working set, one entry per image with its size context.
pub fn format_working_set(images: &[Image]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, img) in images.iter().enumerate() {
        lines.push(format!(
            "{} {} ({})",
            format_index(i + 1),
            img.name,
            img.mime.export_extension()
        ));
        let detail = match (img.new_size(), &img.raster) {
            (Some(new), Some(raster)) => {
                let (w, h) = raster.dimensions();
                format!("{}, {w}x{h}", size_change(img.original_size, new))
            }
            _ => format!("{}, unprocessed", format_file_size(img.original_size)),
        };
        lines.push(format!("{}{}", indent(1), detail));
    }
    lines
}

pub fn print_working_set(images: &[Image]) {
    for line in format_working_set(images) {
        println!("{}", line);
    }
}

/// Format the history log, oldest entry first.
pub fn format_history(history: &HistoryStore) -> Vec<String> {
    if history.is_empty() {
        return vec!["History: empty".to_string()];
    }
    let mut lines: Vec<String> = history
        .entries()
        .iter()
        .map(|entry| {
            let count = entry.images().len();
            format!(
                "#{} {}: {} ({} image{})",
                entry.id(),
                entry.operation(),
                entry.description(),
                count,
                if count == 1 { "" } else { "s" }
            )
        })
        .collect();
    lines.push(format!(
        "History holds {}",
        format_file_size(history.retained_bytes() as u64)
    ));
    lines
}

pub fn print_history(history: &HistoryStore) {
    for line in format_history(history) {
        println!("{}", line);
    }
}

// ============================================================================
// Pipeline progress
// ============================================================================

/// Format one pipeline event as display lines.
///
/// State transitions are left to the `tracing` debug log.
pub fn format_pipeline_event(event: &PipelineEvent) -> Vec<String> {
    match event {
        PipelineEvent::Started { kind, image_count } => {
            vec![format!("==> {} ({} images)", kind, image_count)]
        }
        PipelineEvent::StateChanged(_) => Vec::new(),
        PipelineEvent::ImageDone {
            index,
            name,
            original_size,
            new_size,
        } => vec![format!(
            "{}{} {}: {} → {}",
            indent(1),
            format_index(index + 1),
            name,
            format_file_size(*original_size),
            format_file_size(*new_size)
        )],
        PipelineEvent::ImageSkipped(skipped) => vec![format!(
            "{}skipped {} {}: {}",
            indent(1),
            format_index(skipped.index + 1),
            skipped.name,
            skipped.reason
        )],
        PipelineEvent::Finished {
            kind,
            produced,
            skipped,
        } => vec![format!(
            "==> {} done: {} produced, {} skipped",
            kind, produced, skipped
        )],
    }
}
