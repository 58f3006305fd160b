//! Pure pixel-buffer transforms used to build decode candidates
//!
//! Every function takes a buffer by reference and returns a new one; inputs
//! are never modified.

use rayon::prelude::*;

use super::grayscale::luma_plane;
use crate::models::{ChannelLayout, PixelBuffer, Preprocess, Rotation, TransformDescriptor};

/// Output rows at or above this pixel count are filled in parallel
const PARALLEL_MIN_PIXELS: usize = 640 * 480;

/// Keep the centered `fraction` of each side.
///
/// `fraction` is clamped to `(0, 1]`; a crop that would shrink a side to zero
/// keeps at least one pixel when the source side is non-empty.
pub fn crop_center(buffer: &PixelBuffer, fraction: f32) -> PixelBuffer {
    let fraction = if fraction.is_finite() { fraction.clamp(0.0, 1.0) } else { 1.0 };
    if fraction >= 1.0 || buffer.is_empty() {
        return buffer.clone();
    }

    let (w, h) = (buffer.width(), buffer.height());
    let cw = ((w as f32 * fraction).floor() as usize).clamp(1, w);
    let ch = ((h as f32 * fraction).floor() as usize).clamp(1, h);
    let x0 = (w - cw) / 2;
    let y0 = (h - ch) / 2;

    let channels = buffer.layout().channels();
    let stride = buffer.stride();
    let src = buffer.data();
    let mut out = Vec::with_capacity(cw * ch * channels);
    for y in y0..y0 + ch {
        let start = y * stride + x0 * channels;
        out.extend_from_slice(&src[start..start + cw * channels]);
    }
    buffer.derive(cw, ch, buffer.layout(), out)
}

/// Target dimensions for a nearest-neighbour upscale by `factor`
pub fn scaled_dimensions(width: usize, height: usize, factor: f32) -> (usize, usize) {
    if !(factor.is_finite() && factor > 1.0) {
        return (width, height);
    }
    // Small bias so 10 * 1.8 lands on 18 despite f32 rounding
    (
        (width as f32 * factor + 1e-3).floor() as usize,
        (height as f32 * factor + 1e-3).floor() as usize,
    )
}

/// Nearest-neighbour upscale.
///
/// Nearest sampling keeps module edges hard; interpolating filters would blur
/// finder patterns. Factors at or below 1.0 return the input unchanged.
pub fn upscale_nearest(buffer: &PixelBuffer, factor: f32) -> PixelBuffer {
    let (dw, dh) = scaled_dimensions(buffer.width(), buffer.height(), factor);
    if (dw, dh) == (buffer.width(), buffer.height()) || buffer.is_empty() {
        return buffer.clone();
    }

    let (sw, sh) = (buffer.width(), buffer.height());
    let channels = buffer.layout().channels();
    let src = buffer.data();
    let src_stride = buffer.stride();

    // Precompute the source column of every output column
    let x_map: Vec<usize> = (0..dw)
        .map(|x| ((x as f32 / factor) as usize).min(sw - 1))
        .collect();

    let mut out = vec![0u8; dw * dh * channels];
    let fill_row = |(y, row): (usize, &mut [u8])| {
        let sy = ((y as f32 / factor) as usize).min(sh - 1);
        let src_row = &src[sy * src_stride..(sy + 1) * src_stride];
        for (x, &sx) in x_map.iter().enumerate() {
            let s = sx * channels;
            row[x * channels..(x + 1) * channels].copy_from_slice(&src_row[s..s + channels]);
        }
    };

    if dw * dh >= PARALLEL_MIN_PIXELS {
        out.par_chunks_mut(dw * channels).enumerate().for_each(fill_row);
    } else {
        out.chunks_mut(dw * channels).enumerate().for_each(fill_row);
    }
    buffer.derive(dw, dh, buffer.layout(), out)
}

/// Target dimensions for a nearest-neighbour downscale by `factor`
pub fn downscaled_dimensions(width: usize, height: usize, factor: f32) -> (usize, usize) {
    if !(factor.is_finite() && factor > 0.0 && factor < 1.0) {
        return (width, height);
    }
    (
        ((width as f32 * factor) as usize).clamp(1, width.max(1)),
        ((height as f32 * factor) as usize).clamp(1, height.max(1)),
    )
}

/// Nearest-neighbour downscale by `factor` in `(0, 1)`.
///
/// Sides never shrink below one pixel. Factors at or above 1.0 return the
/// input unchanged.
pub fn downscale_nearest(buffer: &PixelBuffer, factor: f32) -> PixelBuffer {
    if !(factor.is_finite() && factor > 0.0 && factor < 1.0) || buffer.is_empty() {
        return buffer.clone();
    }

    let (sw, sh) = (buffer.width(), buffer.height());
    let (dw, dh) = downscaled_dimensions(sw, sh, factor);
    let channels = buffer.layout().channels();
    let src = buffer.data();
    let src_stride = buffer.stride();

    let x_map: Vec<usize> = (0..dw).map(|x| x * sw / dw).collect();
    let mut out = Vec::with_capacity(dw * dh * channels);
    for y in 0..dh {
        let sy = y * sh / dh;
        let src_row = &src[sy * src_stride..(sy + 1) * src_stride];
        for &sx in &x_map {
            out.extend_from_slice(&src_row[sx * channels..(sx + 1) * channels]);
        }
    }
    buffer.derive(dw, dh, buffer.layout(), out)
}

/// Rotate clockwise by a multiple of 90 degrees.
///
/// The output canvas is resized (width and height swap for quarter turns), so
/// no pixels are clipped.
pub fn rotate(buffer: &PixelBuffer, rotation: Rotation) -> PixelBuffer {
    if rotation == Rotation::Deg0 || buffer.is_empty() {
        return buffer.clone();
    }

    let (w, h) = (buffer.width(), buffer.height());
    let (dw, dh) = if rotation.swaps_axes() { (h, w) } else { (w, h) };
    let channels = buffer.layout().channels();
    let mut out = vec![0u8; w * h * channels];

    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match rotation {
                Rotation::Deg0 => (x, y),
                Rotation::Deg90 => (h - 1 - y, x),
                Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                Rotation::Deg270 => (y, w - 1 - x),
            };
            let d = (dy * dw + dx) * channels;
            out[d..d + channels].copy_from_slice(buffer.pixel(x, y));
        }
    }
    buffer.derive(dw, dh, buffer.layout(), out)
}

/// Grayscale plus a linear stretch of observed luminance to `[0, 255]`.
///
/// A flat image (min == max) has no contrast to recover and is returned as
/// plain grayscale.
pub fn contrast_stretch(buffer: &PixelBuffer) -> PixelBuffer {
    let mut gray = luma_plane(buffer);
    let (min, max) = gray
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    if max > min && (min > 0 || max < 255) {
        let range = (max - min) as u32;
        let mut lut = [0u8; 256];
        for (v, slot) in lut.iter_mut().enumerate().skip(min as usize).take(range as usize + 1) {
            *slot = (((v as u32 - min as u32) * 255 + range / 2) / range) as u8;
        }
        for v in gray.iter_mut() {
            *v = lut[*v as usize];
        }
    }
    buffer.derive(buffer.width(), buffer.height(), ChannelLayout::Gray, gray)
}

/// Invert every sample (alpha included for RGBA)
pub fn invert(buffer: &PixelBuffer) -> PixelBuffer {
    let out: Vec<u8> = buffer.data().iter().map(|v| 255 - v).collect();
    buffer.derive(buffer.width(), buffer.height(), buffer.layout(), out)
}

/// Apply one preprocessing pass
pub fn preprocess(buffer: &PixelBuffer, pass: Preprocess) -> PixelBuffer {
    match pass {
        Preprocess::Identity => buffer.clone(),
        Preprocess::Contrast => contrast_stretch(buffer),
        Preprocess::ContrastInverted => invert(&contrast_stretch(buffer)),
    }
}

/// Apply a full descriptor: crop, rotate, upscale, preprocess
pub fn apply(buffer: &PixelBuffer, descriptor: &TransformDescriptor) -> PixelBuffer {
    let cropped = crop_center(buffer, descriptor.crop);
    let rotated = rotate(&cropped, descriptor.rotation);
    let scaled = upscale_nearest(&rotated, descriptor.scale);
    preprocess(&scaled, descriptor.preprocess)
}
