//! Utility functions for image processing
//!
//! This module provides the pixel transforms behind the decode search:
//! - Grayscale conversion (RGB/RGBA to luminance)
//! - Center crop, nearest-neighbour upscale, quarter-turn rotation
//! - Contrast stretch and inversion

/// RGB to luminance conversion
pub mod grayscale;
/// Crop, rotate, scale, contrast
pub mod transform;
