//! QR payload decoding
//!
//! This module contains the decode side of the pipeline:
//! - Symbol readers (one attempt on one candidate)
//! - The bounded transform search space
//! - The decode engine that walks the space and stops at the first hit

/// Pyramid-search decode engine
pub mod engine;
/// Symbol reader trait and the `rqrr` implementation
pub mod reader;
/// Crop/rotation/scale/pass search space
pub mod search;

pub use engine::{DecodeEngine, DecodeOutcome};
pub use reader::{RqrrReader, SymbolReader};
pub use search::SearchSpace;
