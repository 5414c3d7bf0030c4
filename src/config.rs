//! Application configuration and recipe files.
//!
//! ## Config file
//!
//! `pixbatch.toml` is optional. Values it sets are layered over the stock
//! defaults, so a file only needs the keys it wants to change:
//!
//! ```toml
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//!
//! [export]
//! archive_suffix = "images" # <operation>-<suffix>.zip
//! working_name = "processed"
//!
//! [slideshow]
//! width = 1920
//! height = 1080
//! frame_rate = 1
//! preset = "medium"
//! crf = 23
//! background = "#000000"
//! # ffmpeg = "/usr/local/bin/ffmpeg"
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! ## Recipes
//!
//! A recipe is an ordered list of tool steps, each tagged with `op`:
//!
//! ```toml
//! [[steps]]
//! op = "size"
//! mode = "percentage"
//! percentage = 50
//!
//! [[steps]]
//! op = "watermark"
//! content_type = "image"
//! image_path = "logo.png"   # relative to the recipe file
//! position = "bottom-right"
//! ```
//!
//! Out-of-range tool settings are clamped when the tool runs, never rejected.

use crate::imaging::{WatermarkContentType, WatermarkSpec};
use crate::pipeline::Operation;
use crate::slideshow::SlideshowSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// File name looked up in the working directory when no config is given.
pub const CONFIG_FILE_NAME: &str = "pixbatch.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
    #[error("watermark image {path}: {source}")]
    WatermarkImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub processing: ProcessingConfig,
    pub export: ExportConfig,
    pub slideshow: SlideshowSpec,
}

impl AppConfig {
    /// Validate values that can't be clamped into something sensible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        for (key, value) in [
            ("export.archive_suffix", &self.export.archive_suffix),
            ("export.working_name", &self.export.working_name),
        ] {
            if value.is_empty() || value.contains(['/', '\\']) {
                return Err(ConfigError::Validation(format!(
                    "{key} must be a non-empty file name part"
                )));
            }
        }

        let show = &self.slideshow;
        if show.width == 0 || show.height == 0 {
            return Err(ConfigError::Validation(
                "slideshow.width and slideshow.height must be non-zero".into(),
            ));
        }
        // yuv420p subsamples chroma 2x2
        if show.width % 2 != 0 || show.height % 2 != 0 {
            return Err(ConfigError::Validation(
                "slideshow.width and slideshow.height must be even".into(),
            ));
        }
        if show.frame_rate == 0 {
            return Err(ConfigError::Validation(
                "slideshow.frame_rate must be at least 1".into(),
            ));
        }
        if show.crf > 51 {
            return Err(ConfigError::Validation("slideshow.crf must be 0-51".into()));
        }
        if !X264_PRESETS.contains(&show.preset.as_str()) {
            return Err(ConfigError::Validation(format!(
                "slideshow.preset must be one of: {}",
                X264_PRESETS.join(", ")
            )));
        }
        Ok(())
    }
}

const X264_PRESETS: [&str; 10] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image processing workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

/// Export naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportConfig {
    /// Suffix of multi-image archives: `<operation>-<suffix>.zip`.
    pub archive_suffix: String,
    /// Operation name used when exporting the current working set.
    pub working_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            archive_suffix: crate::export::DEFAULT_ARCHIVE_SUFFIX.to_string(),
            working_name: "processed".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// The stock default config as a `toml::Value::Table`, the base layer for
/// merging user overrides.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(AppConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value; `Ok(None)` if it doesn't exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<AppConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: AppConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the config at `path`, or `pixbatch.toml` in the working directory.
///
/// An explicitly named file must exist; the implicit one may be absent, in
/// which case the stock defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let overlay = match path {
        Some(p) => Some(toml::from_str(&fs::read_to_string(p)?)?),
        None => load_raw_config(Path::new(CONFIG_FILE_NAME))?,
    };
    resolve_config(stock_defaults_value()?, overlay)
}

/// Returns a fully-commented stock `pixbatch.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# pixbatch configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# pixbatch reads ./pixbatch.toml, or the file given with --config.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Export
# ---------------------------------------------------------------------------
[export]
# Several images are exported as <operation>-<archive_suffix>.zip.
archive_suffix = "images"

# Operation name used for the final export of a run.
working_name = "processed"

# ---------------------------------------------------------------------------
# Slideshow video
# ---------------------------------------------------------------------------
[slideshow]
# Frame size in pixels. Both must be even.
width = 1920
height = 1080

# Slides per second.
frame_rate = 1

# libx264 preset and constant rate factor (0-51, lower = better).
preset = "medium"
crf = 23

# Letterbox colour around each slide.
background = "#000000"

# Path to the ffmpeg binary. Looked up on PATH when unset.
# ffmpeg = "/usr/local/bin/ffmpeg"
"##
}

// =============================================================================
// Recipes
// =============================================================================

/// An ordered list of tool steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    #[serde(default)]
    pub steps: Vec<Operation>,
}

impl Recipe {
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let recipe: Recipe = toml::from_str(content)?;
        if recipe.steps.is_empty() {
            return Err(ConfigError::Validation("recipe has no steps".into()));
        }
        Ok(recipe)
    }

    /// Load a recipe and read any watermark images it names.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut recipe = Self::parse(&fs::read_to_string(path)?)?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        recipe.resolve(base_dir)?;
        Ok(recipe)
    }

    /// Read `image_path` of every image watermark step, relative to `base_dir`.
    pub fn resolve(&mut self, base_dir: &Path) -> Result<(), ConfigError> {
        for step in &mut self.steps {
            if let Operation::Watermark(spec) = step {
                resolve_watermark_image(spec, base_dir)?;
            }
        }
        Ok(())
    }
}

fn resolve_watermark_image(spec: &mut WatermarkSpec, base_dir: &Path) -> Result<(), ConfigError> {
    if spec.content_type != WatermarkContentType::Image || spec.image.is_some() {
        return Ok(());
    }
    let Some(rel) = &spec.image_path else {
        // the pipeline reports the missing stamp
        return Ok(());
    };
    let path = base_dir.join(rel);
    let bytes = fs::read(&path).map_err(|source| ConfigError::WatermarkImage {
        path: path.clone(),
        source,
    })?;
    spec.image = Some(Arc::from(bytes));
    Ok(())
}
