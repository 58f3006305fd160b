//! Core data structures

/// Accounts, tokens and attendance results
pub mod attendance;
/// Decode candidates, transforms and payloads
pub mod candidate;
/// Immutable pixel buffers
pub mod pixel_buffer;

pub use attendance::{
    Account, AccountId, AttendanceResult, AttendanceStatus, Credentials, ResultSet, Token,
};
pub use candidate::{DecodeCandidate, DecodedPayload, Preprocess, Rotation, TransformDescriptor};
pub use pixel_buffer::{ChannelLayout, PixelBuffer, PixelBufferError};
