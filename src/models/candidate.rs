use std::fmt;

use super::PixelBuffer;

/// Clockwise rotation applied before a decode attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    /// No rotation
    Deg0,
    /// Quarter turn clockwise
    Deg90,
    /// Half turn
    Deg180,
    /// Three quarter turns clockwise
    Deg270,
}

impl Rotation {
    /// All rotations in search order
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    /// Rotation angle in degrees
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True when width and height swap under this rotation
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Pixel preprocessing applied as the last step of a candidate transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preprocess {
    /// Samples passed through unchanged
    Identity,
    /// Grayscale followed by a linear min/max contrast stretch
    Contrast,
    /// Grayscale, contrast stretch, then inversion (light-on-dark symbols)
    ContrastInverted,
}

impl Preprocess {
    /// All passes in search order
    pub const ALL: [Preprocess; 3] = [
        Preprocess::Identity,
        Preprocess::Contrast,
        Preprocess::ContrastInverted,
    ];
}

/// Which transform produced a decode candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformDescriptor {
    /// Fraction of each side kept by the center crop (1.0 = full frame)
    pub crop: f32,
    /// Rotation applied after cropping
    pub rotation: Rotation,
    /// Nearest-neighbour upscale factor applied after rotation
    pub scale: f32,
    /// Final preprocessing pass
    pub preprocess: Preprocess,
}

impl TransformDescriptor {
    /// The single transform used by the live tier
    pub const LIVE: TransformDescriptor = TransformDescriptor {
        crop: 1.0,
        rotation: Rotation::Deg0,
        scale: 1.0,
        preprocess: Preprocess::Identity,
    };
}

impl fmt::Display for TransformDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "crop={:.2} rot={} scale={:.1} pre={:?}",
            self.crop,
            self.rotation.degrees(),
            self.scale,
            self.preprocess
        )
    }
}

/// A transformed buffer waiting for one decode attempt
#[derive(Debug, Clone)]
pub struct DecodeCandidate {
    /// The transformed pixels
    pub buffer: PixelBuffer,
    /// How they were produced
    pub descriptor: TransformDescriptor,
}

/// The string content extracted from a symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodedPayload(String);

impl DecodedPayload {
    /// Wrap decoded text
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Borrow the payload text
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DecodedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DecodedPayload {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_display() {
        let text = TransformDescriptor::LIVE.to_string();
        assert_eq!(text, "crop=1.00 rot=0 scale=1.0 pre=Identity");
    }
}
