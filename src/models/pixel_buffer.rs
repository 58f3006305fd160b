use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;

/// Sample layout of a [`PixelBuffer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    /// One luminance byte per pixel
    Gray,
    /// Three bytes per pixel (R, G, B)
    Rgb,
    /// Four bytes per pixel (R, G, B, A); alpha is ignored by every transform
    Rgba,
}

impl ChannelLayout {
    /// Bytes per pixel for this layout
    pub fn channels(&self) -> usize {
        match self {
            ChannelLayout::Gray => 1,
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }
}

/// Raised when samples do not match the declared geometry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("pixel buffer expects {expected} bytes for {width}x{height} {layout:?}, got {actual}")]
pub struct PixelBufferError {
    /// Declared width
    pub width: usize,
    /// Declared height
    pub height: usize,
    /// Declared layout
    pub layout: ChannelLayout,
    /// Bytes required by the geometry
    pub expected: usize,
    /// Bytes supplied
    pub actual: usize,
}

/// An owned, immutable grid of samples plus the timestamp of the frame it came from.
///
/// Samples live behind an `Arc`, so cloning a buffer to hand it to a worker
/// never copies pixel data. Transforms always build a new buffer.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    layout: ChannelLayout,
    data: Arc<[u8]>,
    captured_at: Instant,
}

impl PixelBuffer {
    /// Wrap raw samples, checking that their length matches the geometry
    pub fn new(
        width: usize,
        height: usize,
        layout: ChannelLayout,
        data: Vec<u8>,
        captured_at: Instant,
    ) -> Result<Self, PixelBufferError> {
        let expected = width * height * layout.channels();
        if data.len() != expected {
            return Err(PixelBufferError {
                width,
                height,
                layout,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            layout,
            data: data.into(),
            captured_at,
        })
    }

    /// Grayscale buffer stamped with the current instant
    pub fn from_gray(width: usize, height: usize, data: Vec<u8>) -> Result<Self, PixelBufferError> {
        Self::new(width, height, ChannelLayout::Gray, data, Instant::now())
    }

    /// RGB buffer stamped with the current instant
    pub fn from_rgb(width: usize, height: usize, data: Vec<u8>) -> Result<Self, PixelBufferError> {
        Self::new(width, height, ChannelLayout::Rgb, data, Instant::now())
    }

    /// A buffer derived from `self`: same provenance, new samples.
    ///
    /// Internal constructor for transforms, which always produce consistent geometry.
    pub(crate) fn derive(
        &self,
        width: usize,
        height: usize,
        layout: ChannelLayout,
        data: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(data.len(), width * height * layout.channels());
        Self {
            width,
            height,
            layout,
            data: data.into(),
            captured_at: self.captured_at,
        }
    }

    /// Same samples, new capture timestamp. Shares the sample storage.
    pub fn restamp(&self, captured_at: Instant) -> Self {
        Self {
            captured_at,
            ..self.clone()
        }
    }

    /// Width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Channel layout
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Raw interleaved samples, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// When the source frame was captured
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// `width * height`
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// True when the buffer has no pixels at all
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// Bytes in one row
    pub fn stride(&self) -> usize {
        self.width * self.layout.channels()
    }

    /// Samples of the pixel at `(x, y)`
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let c = self.layout.channels();
        let idx = (y * self.width + x) * c;
        &self.data[idx..idx + c]
    }
}
