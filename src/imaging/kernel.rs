//! Per-pixel colour kernels.
//!
//! Every kernel rewrites a [`RasterBuffer`] in place, one pixel at a time,
//! with no neighbourhood reads. Rows are processed in parallel. Alpha is left
//! alone except by [`color_balance`] when opacity is below 100 %.
//!
//! The per-pixel maths is exposed as plain functions on `[u8; 4]` so it can
//! be tested without buffers.

use super::params::{ColorBalanceSpec, Rgb};
use super::raster::{CHANNELS, RasterBuffer};
use rayon::prelude::*;

/// Apply `f` to every pixel of `buffer`, rows in parallel.
pub fn map_pixels<F>(buffer: &mut RasterBuffer, f: F)
where
    F: Fn(&mut [u8; 4]) + Sync,
{
    let stride = buffer.stride();
    if stride == 0 {
        return;
    }
    buffer
        .samples_mut()
        .par_chunks_mut(stride)
        .for_each(|row| {
            for px in row.chunks_exact_mut(CHANNELS) {
                if let Ok(px) = <&mut [u8; 4]>::try_from(px) {
                    f(px);
                }
            }
        });
}

/// Euclidean distance between two RGB triples.
pub fn color_distance(a: [u8; 3], b: [u8; 3]) -> f64 {
    let d = |x: u8, y: u8| (x as f64 - y as f64).powi(2);
    (d(a[0], b[0]) + d(a[1], b[1]) + d(a[2], b[2])).sqrt()
}

// =============================================================================
// Pixel functions
// =============================================================================

/// Pull a pixel toward `target` when it lies within `tolerance` of `source`.
///
/// The blend factor is `1 - distance / tolerance`, so an exact match becomes
/// `target` and a pixel right at the tolerance edge is left as is. With a
/// tolerance of zero only exact matches are replaced, fully.
pub fn replace_pixel(px: &mut [u8; 4], source: Rgb, target: Rgb, tolerance: f64) {
    let rgb = [px[0], px[1], px[2]];
    let distance = color_distance(rgb, [source.r, source.g, source.b]);
    if distance > tolerance {
        return;
    }
    let factor = if tolerance == 0.0 {
        1.0
    } else {
        1.0 - distance / tolerance
    };
    let blend = |c: u8, t: u8| (c as f64 + (t as f64 - c as f64) * factor).round() as u8;
    px[0] = blend(px[0], target.r);
    px[1] = blend(px[1], target.g);
    px[2] = blend(px[2], target.b);
}

/// Rec. 601 luma, written to all three channels.
pub fn grayscale_pixel(px: &mut [u8; 4]) {
    let gray = (px[0] as f64 * 0.299 + px[1] as f64 * 0.587 + px[2] as f64 * 0.114).round();
    let gray = gray.clamp(0.0, 255.0) as u8;
    px[0] = gray;
    px[1] = gray;
    px[2] = gray;
}

pub fn sepia_pixel(px: &mut [u8; 4]) {
    let (r, g, b) = (px[0] as f64, px[1] as f64, px[2] as f64);
    let tone = |kr: f64, kg: f64, kb: f64| (r * kr + g * kg + b * kb).round().min(255.0) as u8;
    px[0] = tone(0.393, 0.769, 0.189);
    px[1] = tone(0.349, 0.686, 0.168);
    px[2] = tone(0.272, 0.534, 0.131);
}

pub fn invert_pixel(px: &mut [u8; 4]) {
    px[0] = 255 - px[0];
    px[1] = 255 - px[1];
    px[2] = 255 - px[2];
}

/// Channel deltas, brightness, contrast and saturation in that order.
///
/// Each stage clamps to `[0, 255]`; rounding happens once at the end. The
/// spec must already be clamped.
pub fn balance_pixel(px: &mut [u8; 4], spec: &ColorBalanceSpec) {
    let clamp = |v: f64| v.clamp(0.0, 255.0);
    let mut r = clamp(px[0] as f64 + spec.red as f64);
    let mut g = clamp(px[1] as f64 + spec.green as f64);
    let mut b = clamp(px[2] as f64 + spec.blue as f64);

    if spec.brightness != 0.0 {
        let delta = spec.brightness as f64;
        r = clamp(r + delta);
        g = clamp(g + delta);
        b = clamp(b + delta);
    }

    if spec.contrast != 0.0 {
        let c = spec.contrast as f64;
        let factor = (259.0 * (c + 255.0)) / (255.0 * (259.0 - c));
        r = clamp(factor * (r - 128.0) + 128.0);
        g = clamp(factor * (g - 128.0) + 128.0);
        b = clamp(factor * (b - 128.0) + 128.0);
    }

    if spec.saturation != 0.0 {
        (r, g, b) = saturate(r, g, b, spec.saturation as f64 / 100.0);
    }

    px[0] = r.round() as u8;
    px[1] = g.round() as u8;
    px[2] = b.round() as u8;

    if spec.opacity < 100.0 {
        px[3] = (px[3] as f64 * spec.opacity as f64 / 100.0).round() as u8;
    }
}

/// Shift HSL saturation by `delta` (a fraction) and scale the chroma around
/// the lightness accordingly. Achromatic pixels are returned untouched.
fn saturate(r: f64, g: f64, b: f64, delta: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b) / 255.0;
    let min = r.min(g).min(b) / 255.0;
    let diff = max - min;
    if diff == 0.0 {
        return (r, g, b);
    }
    let sum = max + min;
    let lightness = sum / 2.0;
    let current = if lightness < 0.5 {
        diff / sum
    } else {
        diff / (2.0 - sum)
    };
    let target = (current + delta).clamp(0.0, 1.0);
    let ratio = if current == 0.0 { 0.0 } else { target / current };

    let adjust = |c: f64| ((lightness + (c / 255.0 - lightness) * ratio) * 255.0).clamp(0.0, 255.0);
    (adjust(r), adjust(g), adjust(b))
}

// =============================================================================
// Buffer kernels
// =============================================================================

/// Replace colours near `source` with `target`. `tolerance` is clamped to 0–100.
pub fn color_replace(buffer: &mut RasterBuffer, source: Rgb, target: Rgb, tolerance: f32) {
    let tolerance = tolerance.clamp(0.0, 100.0) as f64;
    map_pixels(buffer, |px| replace_pixel(px, source, target, tolerance));
}

pub fn grayscale(buffer: &mut RasterBuffer) {
    map_pixels(buffer, grayscale_pixel);
}

pub fn sepia(buffer: &mut RasterBuffer) {
    map_pixels(buffer, sepia_pixel);
}

pub fn invert(buffer: &mut RasterBuffer) {
    map_pixels(buffer, invert_pixel);
}

pub fn color_balance(buffer: &mut RasterBuffer, spec: &ColorBalanceSpec) {
    let spec = spec.clamped();
    if spec.is_identity() {
        return;
    }
    map_pixels(buffer, |px| balance_pixel(px, &spec));
}
