//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`pipeline`](crate::pipeline) (which decides which
//! images an operation touches) and the pixel code in
//! [`kernel`](super::kernel) and [`operations`](super::operations).
//!
//! Every spec deserializes from a recipe step and carries the defaults the
//! editor starts with. Out-of-range numbers are never an error: each spec has
//! a `clamped()` accessor and the kernels only ever see clamped values.
//!
//! ## Types
//!
//! - [`Quality`] - Lossy encoding quality (10–100 %, default 90). Clamped on construction.
//! - [`MimeType`] - Encoded formats the editor reads and writes.
//! - [`Rgb`] - Colour parsed from `#rrggbb`.
//! - [`FormatSpec`], [`ResizeSpec`], [`ColorTransformSpec`], [`ColorBalanceSpec`],
//!   [`MergeSpec`], [`WatermarkSpec`] - one per tool.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Quality setting for lossy image encoding, stored as a percentage (10-100).
///
/// Recipes express it as a fraction (`quality = 0.9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "f32", into = "f32")]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(percent: u32) -> Self {
        Self(percent.clamp(10, 100) as u8)
    }

    pub fn from_fraction(fraction: f32) -> Self {
        if fraction.is_nan() {
            return Self::default();
        }
        Self::new((fraction.clamp(0.1, 1.0) * 100.0).round() as u32)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn fraction(self) -> f32 {
        self.0 as f32 / 100.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

impl From<f32> for Quality {
    fn from(fraction: f32) -> Self {
        Self::from_fraction(fraction)
    }
}

impl From<Quality> for f32 {
    fn from(q: Quality) -> Self {
        q.fraction()
    }
}

/// Encoded image formats known to the editor.
///
/// GIF is accepted on intake only; the encoder side has no GIF writer, so
/// results derived from a GIF are written as PNG (see [`MimeType::output_format`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MimeType {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl MimeType {
    pub const ALL: [MimeType; 4] = [Self::Png, Self::Jpeg, Self::Webp, Self::Gif];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == mime)
            .or(match mime.as_str() {
                "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
                _ => None,
            })
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            _ => None,
        }
    }

    /// Extension used when exporting: `jpg`, `webp`, everything else `png`.
    pub fn export_extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Png | Self::Gif => "png",
        }
    }

    /// The format a re-encode of this image is written in.
    pub fn output_format(self) -> Self {
        match self {
            Self::Gif => Self::Png,
            other => other,
        }
    }

    /// Whether the encoder honours a [`Quality`] for this format.
    pub fn uses_quality(self) -> bool {
        self == Self::Jpeg
    }

    /// Quality an image gets on intake: 0.9 for JPEG, none otherwise.
    pub fn intake_quality(self) -> Option<Quality> {
        self.uses_quality().then(Quality::default)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque RGB colour, written `#rrggbb` in recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb` (the leading `#` is optional, hex digits are case-insensitive).
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().strip_prefix('#').unwrap_or(hex.trim());
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid colour '{value}', expected #rrggbb"))
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        c.to_hex()
    }
}

// =============================================================================
// Format conversion
// =============================================================================

/// Format conversion: re-encode every image from its original bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatSpec {
    pub target: MimeType,
    /// Only used when `target` is JPEG.
    pub quality: Quality,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            target: MimeType::Png,
            quality: Quality::default(),
        }
    }
}

impl FormatSpec {
    pub fn output_quality(&self) -> Option<Quality> {
        self.target.uses_quality().then_some(self.quality)
    }
}

// =============================================================================
// Resize / crop
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    Percentage,
    Fixed,
    Width,
    Height,
    Crop,
}

/// Crop rectangle expressed as percentages of the source dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CropArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for CropArea {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 100.0,
        }
    }
}

impl CropArea {
    /// Keep the rectangle inside `[0, 100]` on both axes.
    pub fn clamped(&self) -> Self {
        let x = finite_or(self.x, 0.0).clamp(0.0, 100.0);
        let y = finite_or(self.y, 0.0).clamp(0.0, 100.0);
        Self {
            x,
            y,
            width: finite_or(self.width, 100.0).clamp(0.0, 100.0 - x),
            height: finite_or(self.height, 100.0).clamp(0.0, 100.0 - y),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizeSpec {
    pub mode: ResizeMode,
    /// Scale factor in percent (10–200) for [`ResizeMode::Percentage`].
    pub percentage: f32,
    /// Target width in pixels (1–4000).
    pub width: u32,
    /// Target height in pixels (1–4000).
    pub height: u32,
    pub maintain_aspect: bool,
    pub crop_area: CropArea,
}

impl Default for ResizeSpec {
    fn default() -> Self {
        Self {
            mode: ResizeMode::Percentage,
            percentage: 100.0,
            width: 800,
            height: 600,
            maintain_aspect: true,
            crop_area: CropArea::default(),
        }
    }
}

impl ResizeSpec {
    pub fn percentage(pct: f32) -> Self {
        Self {
            mode: ResizeMode::Percentage,
            percentage: pct,
            ..Self::default()
        }
    }

    pub fn crop(area: CropArea) -> Self {
        Self {
            mode: ResizeMode::Crop,
            crop_area: area,
            ..Self::default()
        }
    }

    pub fn clamped(&self) -> Self {
        Self {
            mode: self.mode,
            percentage: finite_or(self.percentage, 100.0).clamp(10.0, 200.0),
            width: self.width.clamp(1, 4000),
            height: self.height.clamp(1, 4000),
            maintain_aspect: self.maintain_aspect,
            crop_area: self.crop_area.clamped(),
        }
    }
}

// =============================================================================
// Colour transform
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorTransformKind {
    Replace,
    Grayscale,
    Sepia,
    Invert,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorTransformSpec {
    #[serde(rename = "type")]
    pub kind: ColorTransformKind,
    pub source_color: Rgb,
    pub target_color: Rgb,
    /// Maximum RGB distance (0–100) that still counts as a match.
    pub tolerance: f32,
}

impl Default for ColorTransformSpec {
    fn default() -> Self {
        Self {
            kind: ColorTransformKind::Replace,
            source_color: Rgb::new(0xff, 0, 0),
            target_color: Rgb::new(0, 0xff, 0),
            tolerance: 30.0,
        }
    }
}

impl ColorTransformSpec {
    pub fn of_kind(kind: ColorTransformKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn clamped_tolerance(&self) -> f32 {
        finite_or(self.tolerance, 0.0).clamp(0.0, 100.0)
    }
}

// =============================================================================
// Colour balance
// =============================================================================

/// Per-channel, brightness, contrast and saturation deltas (−100..100 each)
/// plus an opacity percentage (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorBalanceSpec {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub opacity: f32,
}

impl Default for ColorBalanceSpec {
    fn default() -> Self {
        Self {
            red: 0.0,
            green: 0.0,
            blue: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            opacity: 100.0,
        }
    }
}

impl ColorBalanceSpec {
    pub fn clamped(&self) -> Self {
        let delta = |v: f32| finite_or(v, 0.0).clamp(-100.0, 100.0);
        Self {
            red: delta(self.red),
            green: delta(self.green),
            blue: delta(self.blue),
            brightness: delta(self.brightness),
            contrast: delta(self.contrast),
            saturation: delta(self.saturation),
            opacity: finite_or(self.opacity, 100.0).clamp(0.0, 100.0),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// Merge
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeDirection {
    Horizontal,
    Vertical,
}

impl MergeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MergeSpec {
    pub direction: MergeDirection,
    /// Gap between neighbouring images in pixels (0–100).
    pub spacing: u32,
    pub background: Rgb,
    /// Indices into the working set; at least two distinct entries.
    pub selected: Vec<usize>,
}

impl Default for MergeSpec {
    fn default() -> Self {
        Self {
            direction: MergeDirection::Horizontal,
            spacing: 0,
            background: Rgb::WHITE,
            selected: Vec::new(),
        }
    }
}

impl MergeSpec {
    pub fn clamped_spacing(&self) -> u32 {
        self.spacing.min(100)
    }

    /// Selected indices, sorted ascending with duplicates removed.
    pub fn selection(&self) -> Vec<usize> {
        let mut sel = self.selected.clone();
        sel.sort_unstable();
        sel.dedup();
        sel
    }
}

// =============================================================================
// Watermark
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkContentType {
    Text,
    Image,
}

/// One of the nine placement anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

/// Where an anchor sits along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Start,
    Middle,
    End,
}

impl Anchor {
    /// `(horizontal, vertical)` edges of the anchor.
    pub fn edges(self) -> (Edge, Edge) {
        use Edge::*;
        match self {
            Self::TopLeft => (Start, Start),
            Self::TopCenter => (Middle, Start),
            Self::TopRight => (End, Start),
            Self::CenterLeft => (Start, Middle),
            Self::Center => (Middle, Middle),
            Self::CenterRight => (End, Middle),
            Self::BottomLeft => (Start, End),
            Self::BottomCenter => (Middle, End),
            Self::BottomRight => (End, End),
        }
    }
}

/// Watermark configuration, flat like the tool panel it came from.
///
/// Text fields apply when `content_type` is `text`; `image`/`image_scale`
/// when it is `image`. Recipes name the stamp with `image_path`, which the
/// recipe loader resolves into `image` bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatermarkSpec {
    pub content_type: WatermarkContentType,
    pub text: String,
    pub font_size: f32,
    pub font_family: String,
    pub color: Rgb,
    pub stroke: bool,
    pub stroke_color: Rgb,
    pub stroke_width: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(skip)]
    pub image: Option<Arc<[u8]>>,
    pub image_scale: f32,
    pub position: Anchor,
    pub offset_x: f32,
    pub offset_y: f32,
    /// Degrees, clockwise, around the stamp's own centre.
    pub rotation: f32,
    pub opacity: f32,
    pub tile_mode: bool,
    pub tile_spacing_x: u32,
    pub tile_spacing_y: u32,
}

impl Default for WatermarkSpec {
    fn default() -> Self {
        Self {
            content_type: WatermarkContentType::Text,
            text: "Watermark".to_string(),
            font_size: 48.0,
            font_family: "Arial".to_string(),
            color: Rgb::WHITE,
            stroke: false,
            stroke_color: Rgb::BLACK,
            stroke_width: 2.0,
            image_path: None,
            image: None,
            image_scale: 1.0,
            position: Anchor::BottomRight,
            offset_x: 20.0,
            offset_y: 20.0,
            rotation: 0.0,
            opacity: 0.5,
            tile_mode: false,
            tile_spacing_x: 150,
            tile_spacing_y: 150,
        }
    }
}

impl WatermarkSpec {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn image(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            content_type: WatermarkContentType::Image,
            image: Some(bytes.into()),
            ..Self::default()
        }
    }

    pub fn clamped(&self) -> Self {
        Self {
            font_size: finite_or(self.font_size, 48.0).clamp(12.0, 200.0),
            stroke_width: finite_or(self.stroke_width, 2.0).clamp(1.0, 10.0),
            image_scale: finite_or(self.image_scale, 1.0).clamp(0.1, 2.0),
            offset_x: finite_or(self.offset_x, 0.0).clamp(0.0, 200.0),
            offset_y: finite_or(self.offset_y, 0.0).clamp(0.0, 200.0),
            rotation: finite_or(self.rotation, 0.0).clamp(-180.0, 180.0),
            opacity: finite_or(self.opacity, 1.0).clamp(0.0, 1.0),
            tile_spacing_x: self.tile_spacing_x.clamp(50, 500),
            tile_spacing_y: self.tile_spacing_y.clamp(50, 500),
            ..self.clone()
        }
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value } else { fallback }
}
