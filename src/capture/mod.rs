//! Capture source adapter
//!
//! A capture source yields live frames and, on request, a full-resolution
//! still. The escalation controller owns its source exclusively for the
//! duration of a scan session.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::CaptureError;
use crate::models::PixelBuffer;

/// Replayed image sequences
pub mod sequence;

pub use sequence::{CaptureCapabilities, ImageSequenceSource};

/// Which camera to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facing {
    /// Rear-facing ("environment") camera
    Rear,
    /// Front-facing ("user") camera
    Front,
}

/// Stream constraints requested when opening a capture source.
///
/// `ideal_*` values are hints; `min_frame_rate` and `facing` are hard
/// requirements that make `open` fail when unmet.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConstraints {
    /// Preferred frame width
    pub ideal_width: Option<u32>,
    /// Preferred frame height
    pub ideal_height: Option<u32>,
    /// Preferred frame rate
    pub ideal_frame_rate: Option<f32>,
    /// Lowest acceptable frame rate
    pub min_frame_rate: Option<f32>,
    /// Required camera
    pub facing: Option<Facing>,
}

impl CaptureConstraints {
    /// High-resolution rear camera: 3840x2160 at 60 fps, at least 15 fps
    pub fn preferred() -> Self {
        Self {
            ideal_width: Some(3840),
            ideal_height: Some(2160),
            ideal_frame_rate: Some(60.0),
            min_frame_rate: Some(15.0),
            facing: Some(Facing::Rear),
        }
    }

    /// Anything the device can produce
    pub fn basic() -> Self {
        Self {
            ideal_width: None,
            ideal_height: None,
            ideal_frame_rate: None,
            min_frame_rate: None,
            facing: None,
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::preferred()
    }
}

/// A camera-like frame producer
#[async_trait]
pub trait CaptureSource: Send {
    /// Acquire the device with `constraints`
    async fn open(&mut self, constraints: &CaptureConstraints) -> Result<(), CaptureError>;

    /// Wait for the next live frame
    async fn next_frame(&mut self) -> Result<PixelBuffer, CaptureError>;

    /// Grab one frame at the highest resolution the device offers
    async fn grab_still_frame(&mut self) -> Result<PixelBuffer, CaptureError>;

    /// Give the device back. Idempotent.
    fn release(&mut self);

    /// Whether the device is currently held
    fn is_open(&self) -> bool;
}

/// Open with the preferred constraints, retrying once with basic ones.
///
/// Returns the constraints that were accepted.
pub async fn open_with_fallback<S>(source: &mut S) -> Result<CaptureConstraints, CaptureError>
where
    S: CaptureSource + ?Sized,
{
    let preferred = CaptureConstraints::preferred();
    match source.open(&preferred).await {
        Ok(()) => {
            info!("capture opened with preferred constraints");
            Ok(preferred)
        }
        Err(err) => {
            warn!(error = %err, "preferred constraints rejected, retrying with basic");
            let basic = CaptureConstraints::basic();
            source.open(&basic).await.map_err(|retry| match retry {
                CaptureError::Unavailable(detail) => CaptureError::Unavailable(detail),
                other => CaptureError::Unavailable(other.to_string()),
            })?;
            info!("capture opened with basic constraints");
            Ok(basic)
        }
    }
}
