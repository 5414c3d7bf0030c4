//! Image processing: pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode / encode** | `image` codecs (PNG, JPEG, WebP; GIF decode only) |
//! | **Resize** | `image::imageops::resize` with `Lanczos3` |
//! | **Colour kernels** | row-parallel loops over RGBA samples (rayon) |
//! | **Text watermark** | `resvg` / `usvg` with the system font database |
//!
//! The module is split into:
//! - **Raster**: [`RasterBuffer`], the RGBA surface every tool works on
//! - **Parameters**: Data structures describing each tool's settings
//! - **Calculations**: Pure functions for dimension and placement math (unit testable)
//! - **Kernel**: Per-pixel colour transforms
//! - **Operations / Watermark**: Geometry and compositing on buffers
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
pub mod kernel;
pub mod operations;
mod params;
pub mod raster;
pub mod rust_backend;
pub mod watermark;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{
    MergeLayout, anchor_position, calculate_contain_rect, calculate_merge_layout,
    calculate_resize_dimensions, calculate_tile_origins, crop_rect, tile_grid_size,
};
pub use operations::PreconditionError;
pub use params::{
    Anchor, ColorBalanceSpec, ColorTransformKind, ColorTransformSpec, CropArea, Edge, FormatSpec,
    MergeDirection, MergeSpec, MimeType, Quality, ResizeMode, ResizeSpec, Rgb,
    WatermarkContentType, WatermarkSpec,
};
pub use raster::{RasterBuffer, Rect};
pub use rust_backend::RustBackend;
pub use watermark::Stamp;
