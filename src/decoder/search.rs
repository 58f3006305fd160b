//! The bounded transform search space

use crate::models::{Preprocess, Rotation, TransformDescriptor};
use crate::utils::transform::{downscaled_dimensions, scaled_dimensions};

/// Largest candidate area the full search builds (about 24 MP)
pub const DEFAULT_MAX_CANDIDATE_PIXELS: usize = 24_000_000;

/// Crop fractions, rotations, scales and passes tried by the decode search.
///
/// Iteration is outer-to-inner in field order: crop, rotation, scale, pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    /// Center-crop fractions, largest first
    pub crops: Vec<f32>,
    /// Rotations to try for each crop
    pub rotations: Vec<Rotation>,
    /// Nearest-neighbour upscale factors for each rotation
    pub scales: Vec<f32>,
    /// Preprocessing passes for each scale
    pub passes: Vec<Preprocess>,
    /// Inputs are shrunk once so the largest candidate stays within this
    pub max_candidate_pixels: usize,
}

impl SearchSpace {
    /// The full 3 x 4 x 3 x 3 pyramid (108 attempts worst case)
    pub fn full() -> Self {
        Self {
            crops: vec![1.0, 0.85, 0.7],
            rotations: Rotation::ALL.to_vec(),
            scales: vec![1.0, 1.8, 2.5],
            passes: Preprocess::ALL.to_vec(),
            max_candidate_pixels: DEFAULT_MAX_CANDIDATE_PIXELS,
        }
    }

    /// The single transform used for live frames
    pub fn live() -> Self {
        let d = TransformDescriptor::LIVE;
        Self {
            crops: vec![d.crop],
            rotations: vec![d.rotation],
            scales: vec![d.scale],
            passes: vec![d.preprocess],
            max_candidate_pixels: usize::MAX,
        }
    }

    /// Replace the candidate area budget
    pub fn with_max_candidate_pixels(mut self, max: usize) -> Self {
        self.max_candidate_pixels = max;
        self
    }

    /// Worst-case number of attempts
    pub fn len(&self) -> usize {
        self.crops.len() * self.rotations.len() * self.scales.len() * self.passes.len()
    }

    /// True when no tuple would be tried
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest upscale factor in the space, never below 1.0
    pub fn max_scale(&self) -> f32 {
        self.scales.iter().copied().fold(1.0, f32::max)
    }

    /// Area of the largest candidate built from a `width` x `height` input
    pub fn largest_candidate(&self, width: usize, height: usize) -> usize {
        let (w, h) = scaled_dimensions(width, height, self.max_scale());
        w.saturating_mul(h)
    }

    /// Uniform shrink applied to the input before the search.
    ///
    /// Returns 1.0 when every candidate already fits `max_candidate_pixels`;
    /// otherwise the factor at which the uncropped input at the largest
    /// scale fits.
    pub fn prescale_factor(&self, width: usize, height: usize) -> f32 {
        let budget = self.max_candidate_pixels;
        let largest = self.largest_candidate(width, height);
        if largest <= budget {
            return 1.0;
        }

        let mut factor = (budget as f64 / largest as f64).sqrt() as f32;
        // Rounding in the upscale can leave the estimate a few pixels over
        loop {
            let (w, h) = downscaled_dimensions(width, height, factor);
            if self.largest_candidate(w, h) <= budget || (w, h) == (1, 1) {
                return factor;
            }
            factor *= 0.995;
        }
    }

    /// Every tuple in search order
    pub fn descriptors(&self) -> impl Iterator<Item = TransformDescriptor> + '_ {
        self.crops.iter().flat_map(move |&crop| {
            self.rotations.iter().flat_map(move |&rotation| {
                self.scales.iter().flat_map(move |&scale| {
                    self.passes.iter().map(move |&preprocess| TransformDescriptor {
                        crop,
                        rotation,
                        scale,
                        preprocess,
                    })
                })
            })
        })
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_space_is_bounded() {
        let space = SearchSpace::full();
        assert_eq!(space.len(), 108);
        assert_eq!(space.descriptors().count(), 108);
    }

    #[test]
    fn test_search_order_outer_to_inner() {
        let space = SearchSpace::full();
        let order: Vec<_> = space.descriptors().take(4).collect();
        assert_eq!(order[0], TransformDescriptor::LIVE);
        assert_eq!(order[1].preprocess, Preprocess::Contrast);
        assert_eq!(order[2].preprocess, Preprocess::ContrastInverted);
        assert_eq!(order[3].scale, 1.8);

        let last = space.descriptors().last().unwrap();
        assert_eq!(last.crop, 0.7);
        assert_eq!(last.rotation, Rotation::Deg270);
        assert_eq!(last.scale, 2.5);
        assert_eq!(last.preprocess, Preprocess::ContrastInverted);
    }

    #[test]
    fn test_prescale_fits_4k_still_under_default_budget() {
        let space = SearchSpace::full();
        let factor = space.prescale_factor(3840, 2160);
        assert!(factor < 1.0);
        let (w, h) = downscaled_dimensions(3840, 2160, factor);
        assert!(space.largest_candidate(w, h) <= DEFAULT_MAX_CANDIDATE_PIXELS);
        // Not shrunk further than needed
        assert!(w > 2500 && h > 1400, "{w}x{h}");
    }

    #[test]
    fn test_small_inputs_are_not_prescaled() {
        let space = SearchSpace::full();
        assert_eq!(space.prescale_factor(1280, 720), 1.0);
        assert_eq!(SearchSpace::live().prescale_factor(8000, 8000), 1.0);
    }

    #[test]
    fn test_live_space_is_single_identity_attempt() {
        let space = SearchSpace::live();
        assert_eq!(space.descriptors().collect::<Vec<_>>(), vec![TransformDescriptor::LIVE]);
    }
}
