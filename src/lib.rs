//! qr_relay - escalating QR acquisition with concurrent attendance relay
//!
//! Frames from a [`capture::CaptureSource`] go through three decode tiers:
//! a single attempt per live frame, a bounded 108-attempt pyramid search on
//! a rayon worker, and finally a remote decoder. The first accepted payload
//! is fanned out to every registered account by the
//! [`dispatch::AttendanceDispatcher`], which resolves session tokens through
//! the [`session::SessionCache`] and reports one result per account.
//!
//! ```no_run
//! use qr_relay::decoder::DecodeEngine;
//! use qr_relay::tools::load_pixel_buffer;
//!
//! let frame = load_pixel_buffer("code.png".as_ref()).unwrap();
//! if let Some(payload) = DecodeEngine::new().decode(&frame) {
//!     println!("{payload}");
//! }
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

/// Capture device abstraction and a replaying implementation
pub mod capture;
/// Layered configuration
pub mod config;
/// Decode engine, symbol readers and the search space
pub mod decoder;
/// Per-account attendance dispatch
pub mod dispatch;
/// Error types
pub mod error;
/// Scan session state machine and escalation controller
pub mod escalation;
/// Core data structures (PixelBuffer, DecodedPayload, Account, ResultSet, ...)
pub mod models;
/// End-to-end wiring
pub mod relay;
/// Session token cache and login
pub mod session;
/// File and dataset helpers
pub mod tools;
/// Pixel transforms
pub mod utils;

pub use config::RelayConfig;
pub use decoder::{DecodeEngine, DecodeOutcome};
pub use error::RelayError;
pub use escalation::{ScanController, ScanOutcome, Tier};
pub use models::{
    Account, AccountId, AttendanceResult, AttendanceStatus, DecodedPayload, PixelBuffer, ResultSet,
};
pub use relay::{Relay, ScanReport};

/// Full pyramid search on one buffer
pub fn decode(buffer: &PixelBuffer) -> Option<DecodedPayload> {
    DecodeEngine::new().decode(buffer)
}
