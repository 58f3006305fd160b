//! Concurrent per-account attendance dispatch

/// Attendance collaborator and its HTTP implementation
pub mod client;
/// Fan-out orchestrator
pub mod dispatcher;
/// Progress reporting
pub mod progress;

pub use client::{AttendanceCollaborator, AttendanceReply, HttpAttendanceClient};
pub use dispatcher::{AttendanceDispatcher, AttendanceTask, classify};
pub use progress::{NoopObserver, ProgressObserver, TracingObserver};
