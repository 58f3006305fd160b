//! Luminance conversion for pixel buffers
//! Y = 0.299*R + 0.587*G + 0.114*B
//! Uses fast integer arithmetic: Y = (76*R + 150*G + 29*B) >> 8
//!
//! Rows are converted in parallel with rayon once a frame is large enough for
//! the split to pay off; small frames stay on the calling thread.
use rayon::prelude::*;

use crate::models::{ChannelLayout, PixelBuffer};

/// Coefficients for grayscale conversion: Y = (76*R + 150*G + 29*B) >> 8
const COEF_R: i32 = 76;
const COEF_G: i32 = 150;
const COEF_B: i32 = 29;

/// Frames with at least this many pixels are converted row-parallel
const PARALLEL_MIN_PIXELS: usize = 640 * 480;

/// Luminance of one interleaved pixel
#[inline]
pub fn luma(pixel: &[u8]) -> u8 {
    match pixel.len() {
        1 => pixel[0],
        _ => {
            let r = pixel[0] as i32;
            let g = pixel[1] as i32;
            let b = pixel[2] as i32;
            ((COEF_R * r + COEF_G * g + COEF_B * b) >> 8).min(255) as u8
        }
    }
}

/// Raw luminance plane of a buffer, one byte per pixel
pub fn luma_plane(buffer: &PixelBuffer) -> Vec<u8> {
    let width = buffer.width();
    let channels = buffer.layout().channels();
    let src = buffer.data();

    if buffer.layout() == ChannelLayout::Gray {
        return src.to_vec();
    }

    let mut gray = vec![0u8; buffer.area()];
    if width == 0 {
        return gray;
    }
    let convert_row = |(y, row): (usize, &mut [u8])| {
        let row_start = y * width * channels;
        for (x, out) in row.iter_mut().enumerate() {
            let idx = row_start + x * channels;
            *out = luma(&src[idx..idx + channels]);
        }
    };

    if buffer.area() >= PARALLEL_MIN_PIXELS {
        gray.par_chunks_mut(width).enumerate().for_each(convert_row);
    } else {
        gray.chunks_mut(width).enumerate().for_each(convert_row);
    }
    gray
}

/// Convert any buffer to a grayscale buffer with the same provenance
pub fn to_grayscale(buffer: &PixelBuffer) -> PixelBuffer {
    if buffer.layout() == ChannelLayout::Gray {
        return buffer.clone();
    }
    let gray = luma_plane(buffer);
    buffer.derive(buffer.width(), buffer.height(), ChannelLayout::Gray, gray)
}
