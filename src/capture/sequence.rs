use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{CaptureConstraints, CaptureSource, Facing};
use crate::error::CaptureError;
use crate::models::PixelBuffer;
use crate::tools::load_pixel_buffer;

/// What a simulated device can satisfy
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureCapabilities {
    /// Device can be acquired at all (false models a denied permission)
    pub available: bool,
    /// Highest frame rate the device reaches
    pub max_frame_rate: f32,
    /// Cameras present
    pub facings: Vec<Facing>,
}

impl Default for CaptureCapabilities {
    fn default() -> Self {
        Self {
            available: true,
            max_frame_rate: 30.0,
            facings: vec![Facing::Rear, Facing::Front],
        }
    }
}

impl CaptureCapabilities {
    fn check(&self, constraints: &CaptureConstraints) -> Result<(), CaptureError> {
        if !self.available {
            return Err(CaptureError::Unavailable("permission denied".into()));
        }
        if let Some(min) = constraints.min_frame_rate {
            if min > self.max_frame_rate {
                return Err(CaptureError::Unavailable(format!(
                    "frame rate {min} unsupported (max {})",
                    self.max_frame_rate
                )));
            }
        }
        if let Some(facing) = constraints.facing {
            if !self.facings.contains(&facing) {
                return Err(CaptureError::Unavailable(format!("no {:?} camera", facing)));
            }
        }
        Ok(())
    }
}

/// Replays a fixed list of frames at a fixed interval.
///
/// Frames loop by default, the way a camera keeps producing; `once()` makes
/// the stream end with [`CaptureError::Closed`] after the last frame. A still
/// grab returns the high-resolution counterpart of the frame most recently
/// delivered, or the frame itself when no stills were supplied.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    frames: Vec<PixelBuffer>,
    stills: Vec<PixelBuffer>,
    interval: Duration,
    capabilities: CaptureCapabilities,
    repeat: bool,
    cursor: usize,
    current: Option<usize>,
    open: bool,
    open_attempts: usize,
    stills_grabbed: usize,
}

impl ImageSequenceSource {
    /// Replay `frames`, one every `interval`
    pub fn from_frames(frames: Vec<PixelBuffer>, interval: Duration) -> Self {
        Self {
            frames,
            stills: Vec::new(),
            interval,
            capabilities: CaptureCapabilities::default(),
            repeat: true,
            cursor: 0,
            current: None,
            open: false,
            open_attempts: 0,
            stills_grabbed: 0,
        }
    }

    /// Load every path as one frame
    pub fn from_paths<P: AsRef<Path>>(
        paths: &[P],
        interval: Duration,
    ) -> Result<Self, CaptureError> {
        let frames = paths
            .iter()
            .map(|path| {
                load_pixel_buffer(path.as_ref()).map_err(|err| {
                    CaptureError::Unavailable(format!("{}: {}", path.as_ref().display(), err))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_frames(frames, interval))
    }

    /// High-resolution stills, indexed like the frames
    pub fn with_stills(mut self, stills: Vec<PixelBuffer>) -> Self {
        self.stills = stills;
        self
    }

    /// Simulated device capabilities
    pub fn with_capabilities(mut self, capabilities: CaptureCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// End the stream after the last frame instead of looping
    pub fn once(mut self) -> Self {
        self.repeat = false;
        self
    }

    /// Calls to `open`, successful or not
    pub fn open_attempts(&self) -> usize {
        self.open_attempts
    }

    /// Stills handed out so far
    pub fn stills_grabbed(&self) -> usize {
        self.stills_grabbed
    }

    fn now() -> std::time::Instant {
        tokio::time::Instant::now().into_std()
    }
}

#[async_trait]
impl CaptureSource for ImageSequenceSource {
    async fn open(&mut self, constraints: &CaptureConstraints) -> Result<(), CaptureError> {
        self.open_attempts += 1;
        self.capabilities.check(constraints)?;
        if self.frames.is_empty() {
            return Err(CaptureError::Unavailable("no frames to replay".into()));
        }
        self.open = true;
        self.cursor = 0;
        self.current = None;
        debug!(frames = self.frames.len(), "image sequence opened");
        Ok(())
    }

    async fn next_frame(&mut self) -> Result<PixelBuffer, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        if self.cursor >= self.frames.len() {
            if !self.repeat {
                return Err(CaptureError::Closed);
            }
            self.cursor = 0;
        }
        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }
        let index = self.cursor;
        self.cursor += 1;
        self.current = Some(index);
        Ok(self.frames[index].restamp(Self::now()))
    }

    async fn grab_still_frame(&mut self) -> Result<PixelBuffer, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        let index = self.current.unwrap_or(0);
        let still = self
            .stills
            .get(index)
            .or_else(|| self.frames.get(index))
            .ok_or(CaptureError::Closed)?;
        self.stills_grabbed += 1;
        Ok(still.restamp(Self::now()))
    }

    fn release(&mut self) {
        if self.open {
            debug!("image sequence released");
        }
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
