use std::borrow::Cow;
use std::fmt;

use tracing::{debug, trace};

use super::reader::{RqrrReader, SymbolReader};
use super::search::SearchSpace;
use crate::error::DecodeError;
use crate::models::{DecodeCandidate, DecodedPayload, PixelBuffer, Rotation, TransformDescriptor};
use crate::utils::transform::{
    crop_center, downscale_nearest, preprocess, rotate, upscale_nearest,
};

/// A successful search: the payload and where it was found
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    /// Decoded text
    pub payload: DecodedPayload,
    /// Transform of the winning attempt
    pub descriptor: TransformDescriptor,
    /// Attempts made, including the winning one
    pub attempts: usize,
}

/// Bounded pyramid search over a fixed transform space.
///
/// The engine holds no per-call state: the result depends only on the input
/// buffer, the search space and the reader.
pub struct DecodeEngine {
    reader: Box<dyn SymbolReader>,
    space: SearchSpace,
}

impl DecodeEngine {
    /// Full search space with the `rqrr` reader
    pub fn new() -> Self {
        Self::with_reader(RqrrReader)
    }

    /// Full search space with a custom reader
    pub fn with_reader<R: SymbolReader + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
            space: SearchSpace::full(),
        }
    }

    /// Replace the search space
    pub fn with_space(mut self, space: SearchSpace) -> Self {
        self.space = space;
        self
    }

    /// The configured search space
    pub fn space(&self) -> &SearchSpace {
        &self.space
    }

    /// First payload found by the full search, if any
    pub fn decode(&self, buffer: &PixelBuffer) -> Option<DecodedPayload> {
        self.search(buffer).ok().map(|outcome| outcome.payload)
    }

    /// Single lightweight attempt used on live frames
    pub fn decode_live(&self, buffer: &PixelBuffer) -> Option<DecodedPayload> {
        if buffer.is_empty() {
            return None;
        }
        let candidate = DecodeCandidate {
            buffer: buffer.clone(),
            descriptor: TransformDescriptor::LIVE,
        };
        self.attempt(&candidate)
    }

    /// Run the full search
    pub fn search(&self, buffer: &PixelBuffer) -> Result<DecodeOutcome, DecodeError> {
        self.search_until(buffer, || false)
    }

    /// Run the full search, checking `abort` before every attempt
    pub fn search_until<F>(
        &self,
        buffer: &PixelBuffer,
        abort: F,
    ) -> Result<DecodeOutcome, DecodeError>
    where
        F: Fn() -> bool,
    {
        if buffer.is_empty() {
            return Err(DecodeError::EmptyBuffer);
        }

        let space = &self.space;
        let factor = space.prescale_factor(buffer.width(), buffer.height());
        let source = if factor < 1.0 {
            debug!(
                width = buffer.width(),
                height = buffer.height(),
                factor,
                "shrinking input to fit candidate budget"
            );
            Cow::Owned(downscale_nearest(buffer, factor))
        } else {
            Cow::Borrowed(buffer)
        };

        let mut stages = Stages::default();
        let mut attempts = 0usize;

        for descriptor in space.descriptors() {
            if abort() {
                debug!(attempts, "decode search aborted");
                return Err(DecodeError::Aborted { attempts });
            }

            let TransformDescriptor { crop, rotation, scale, .. } = descriptor;
            let cropped = stage(&mut stages.cropped, crop, || crop_center(&source, crop));
            let rotated = stage(&mut stages.rotated, (crop, rotation), || {
                rotate(cropped, rotation)
            });
            let scaled = stage(&mut stages.scaled, (crop, rotation, scale), || {
                upscale_nearest(rotated, scale)
            });

            let candidate = DecodeCandidate {
                buffer: preprocess(scaled, descriptor.preprocess),
                descriptor,
            };
            attempts += 1;
            if let Some(payload) = self.attempt(&candidate) {
                debug!(attempts, descriptor = %candidate.descriptor, "symbol decoded");
                return Ok(DecodeOutcome {
                    payload,
                    descriptor,
                    attempts,
                });
            }
        }

        debug!(attempts, "decode search exhausted");
        Err(DecodeError::Exhausted { attempts })
    }

    fn attempt(&self, candidate: &DecodeCandidate) -> Option<DecodedPayload> {
        match self.reader.read(&candidate.buffer) {
            Ok(Some(text)) => Some(DecodedPayload::new(text)),
            Ok(None) => None,
            Err(err) => {
                // A located-but-unreadable symbol is just a miss for this tuple
                trace!(descriptor = %candidate.descriptor, error = %err, "candidate rejected");
                None
            }
        }
    }
}

/// Intermediate buffers shared by consecutive tuples with a common prefix
#[derive(Default)]
struct Stages {
    cropped: Option<(f32, PixelBuffer)>,
    rotated: Option<((f32, Rotation), PixelBuffer)>,
    scaled: Option<((f32, Rotation, f32), PixelBuffer)>,
}

/// Reuse `slot` while its key matches, rebuild it otherwise
fn stage<K: PartialEq>(
    slot: &mut Option<(K, PixelBuffer)>,
    key: K,
    build: impl FnOnce() -> PixelBuffer,
) -> &PixelBuffer {
    if slot.as_ref().is_some_and(|(current, _)| *current != key) {
        *slot = None;
    }
    &slot.get_or_insert_with(|| (key, build())).1
}

impl Default for DecodeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DecodeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeEngine")
            .field("space", &self.space)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadError;
    use crate::models::Preprocess;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and never finds anything
    #[derive(Default)]
    struct CountingReader {
        calls: AtomicUsize,
        largest: AtomicUsize,
        fail_with_parse_error: bool,
    }

    impl SymbolReader for CountingReader {
        fn read(&self, buffer: &PixelBuffer) -> Result<Option<String>, ReadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.largest.fetch_max(buffer.width() * buffer.height(), Ordering::SeqCst);
            if self.fail_with_parse_error {
                Err(ReadError::Parse("bad codewords".into()))
            } else {
                Ok(None)
            }
        }
    }

    /// Succeeds only on portrait candidates that are at least `min_width` wide
    struct ShapeReader {
        min_width: usize,
    }

    impl SymbolReader for ShapeReader {
        fn read(&self, buffer: &PixelBuffer) -> Result<Option<String>, ReadError> {
            if buffer.height() > buffer.width() && buffer.width() >= self.min_width {
                Ok(Some("found".into()))
            } else {
                Ok(None)
            }
        }
    }

    fn blank(width: usize, height: usize) -> PixelBuffer {
        PixelBuffer::from_gray(width, height, vec![200; width * height]).unwrap()
    }

    #[test]
    fn test_empty_buffer_makes_no_attempts() {
        let reader = Arc::new(CountingReader::default());
        let engine = DecodeEngine::with_reader(reader.clone());
        let err = engine.search(&blank(0, 40)).unwrap_err();
        assert_eq!(err, DecodeError::EmptyBuffer);
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_exhausts_exactly_108_attempts() {
        let reader = Arc::new(CountingReader::default());
        let engine = DecodeEngine::with_reader(reader.clone());
        let err = engine.search(&blank(20, 20)).unwrap_err();
        assert_eq!(err, DecodeError::Exhausted { attempts: 108 });
        assert_eq!(reader.calls.load(Ordering::SeqCst), 108);
    }

    #[test]
    fn test_parse_errors_do_not_stop_the_search() {
        let reader = Arc::new(CountingReader {
            fail_with_parse_error: true,
            ..Default::default()
        });
        let engine = DecodeEngine::with_reader(reader.clone());
        assert!(matches!(
            engine.search(&blank(20, 20)),
            Err(DecodeError::Exhausted { attempts: 108 })
        ));
    }

    #[test]
    fn test_first_hit_wins_in_search_order() {
        // A 30x20 landscape frame only reads as portrait after a quarter turn,
        // and only once upscaled past 36 px wide (20 * 1.8).
        let engine = DecodeEngine::with_reader(ShapeReader { min_width: 36 });
        let outcome = engine.search(&blank(30, 20)).unwrap();
        assert_eq!(outcome.payload.as_str(), "found");
        assert_eq!(outcome.descriptor.crop, 1.0);
        assert_eq!(outcome.descriptor.rotation, Rotation::Deg90);
        assert_eq!(outcome.descriptor.scale, 1.8);
        assert_eq!(outcome.descriptor.preprocess, Preprocess::Identity);
        // 9 attempts at rotation 0, 3 at scale 1.0 of rotation 90, then the hit
        assert_eq!(outcome.attempts, 9 + 3 + 1);
    }

    #[test]
    fn test_oversized_input_is_shrunk_not_skipped() {
        let reader = Arc::new(CountingReader::default());
        let engine = DecodeEngine::with_reader(reader.clone())
            .with_space(SearchSpace::full().with_max_candidate_pixels(20 * 20));
        let err = engine.search(&blank(20, 20)).unwrap_err();
        assert_eq!(err, DecodeError::Exhausted { attempts: 108 });
        assert_eq!(reader.calls.load(Ordering::SeqCst), 108);
        assert!(reader.largest.load(Ordering::SeqCst) <= 20 * 20);
    }

    #[test]
    fn test_4k_still_attempts_every_tuple() {
        let budget = 400_000;
        let reader = Arc::new(CountingReader::default());
        let engine = DecodeEngine::with_reader(reader.clone())
            .with_space(SearchSpace::full().with_max_candidate_pixels(budget));
        let err = engine.search(&blank(3840, 2160)).unwrap_err();
        assert_eq!(err, DecodeError::Exhausted { attempts: 108 });
        assert_eq!(reader.calls.load(Ordering::SeqCst), 108);
        let largest = reader.largest.load(Ordering::SeqCst);
        assert!(largest <= budget && largest > budget / 2, "{largest}");
    }

    #[test]
    fn test_stage_reuses_matching_key() {
        let mut slot = None;
        let mut builds = 0;
        for key in [1, 1, 2, 2, 1] {
            stage(&mut slot, key, || {
                builds += 1;
                blank(1, 1)
            });
        }
        assert_eq!(builds, 3);
    }

    #[test]
    fn test_abort_stops_between_attempts() {
        let reader = Arc::new(CountingReader::default());
        let engine = DecodeEngine::with_reader(reader.clone());
        let err = engine
            .search_until(&blank(20, 20), || reader.calls.load(Ordering::SeqCst) >= 5)
            .unwrap_err();
        assert_eq!(err, DecodeError::Aborted { attempts: 5 });
    }

    #[test]
    fn test_decode_live_is_one_attempt() {
        let reader = Arc::new(CountingReader::default());
        let engine = DecodeEngine::with_reader(reader.clone());
        assert!(engine.decode_live(&blank(20, 20)).is_none());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }
}
