//! Error types for every pipeline stage
//!
//! Each component owns a small `thiserror` enum; [`RelayError`] is the
//! taxonomy surfaced to callers of the end-to-end relay.

use thiserror::Error;

use crate::models::{AccountId, PixelBufferError};

/// Decode engine failures. None of these are fatal to a scan session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer has zero width or height; no attempt was made
    #[error("buffer has zero area")]
    EmptyBuffer,
    /// Every tuple of the search space was tried without a hit
    #[error("search space exhausted after {attempts} attempts")]
    Exhausted {
        /// Attempts performed
        attempts: usize,
    },
    /// The caller asked the search to stop early
    #[error("search aborted after {attempts} attempts")]
    Aborted {
        /// Attempts performed before the abort
        attempts: usize,
    },
}

/// Symbol reader failure for one candidate
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    /// A symbol was located but its data could not be parsed
    #[error("symbol parse failed: {0}")]
    Parse(String),
}

/// Capture device failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Permission denied, hardware missing, or constraints unsatisfiable
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
    /// A frame was requested while the device is not open
    #[error("capture device is not open")]
    NotOpen,
    /// The stream ended
    #[error("capture stream ended")]
    Closed,
    /// A frame could not be turned into a pixel buffer
    #[error("invalid frame: {0}")]
    InvalidFrame(#[from] PixelBufferError),
}

/// Scan session failures surfaced by the escalation controller
#[derive(Debug, Error)]
pub enum ScanError {
    /// No frames can be produced; the session was torn down
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Remote decode collaborator failures. Always absorbed by the controller.
#[derive(Debug, Error)]
pub enum RemoteDecodeError {
    /// The frame could not be serialized
    #[error("frame encoding failed: {0}")]
    Encode(String),
    /// Transport-level failure
    #[error("remote decoder request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The decoder answered with an upstream failure status
    #[error("remote decoder returned status {0}")]
    Upstream(u16),
}

/// Session token resolution failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The login collaborator rejected or failed the login
    #[error("login failed for {account}: {reason}")]
    LoginFailed {
        /// Account whose login failed
        account: AccountId,
        /// Collaborator-supplied detail
        reason: String,
    },
    /// No credentials are known for the account
    #[error("no credentials for {0}")]
    MissingCredentials(AccountId),
    /// The login collaborator did not answer within the request timeout
    #[error("login for {0} timed out")]
    LoginTimedOut(AccountId),
}

/// Attendance collaborator failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttendanceError {
    /// Transport-level failure
    #[error("attendance request failed: {0}")]
    Network(String),
    /// The response body was not in the expected shape
    #[error("attendance response unreadable: {0}")]
    Parse(String),
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        source: std::io::Error,
    },
    /// The file is not valid TOML for the expected schema
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Error taxonomy of the end-to-end relay
#[derive(Debug, Error)]
pub enum RelayError {
    /// All decode tiers failed for a one-shot decode
    #[error(transparent)]
    DecodeExhausted(#[from] DecodeError),
    /// The capture device failed; fatal to the session
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(#[from] CaptureError),
    /// A token could not be resolved for one account
    #[error(transparent)]
    SessionResolutionFailed(#[from] SessionError),
    /// An attendance request timed out
    #[error("attendance request for {0} timed out")]
    DispatchTimeout(AccountId),
    /// The attendance service answered with an unrecognized code
    #[error("unknown attendance response code {code} for {account}")]
    UnknownResponseCode {
        /// Account the response belongs to
        account: AccountId,
        /// Raw code
        code: String,
    },
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A runtime component could not be built
    #[error("setup failed: {0}")]
    Setup(String),
}

impl From<ScanError> for RelayError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Capture(e) => RelayError::CaptureUnavailable(e),
        }
    }
}
