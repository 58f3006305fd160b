//! Escalating decode pipeline
//!
//! - `state`: the explicit scan session state machine
//! - `controller`: the async frame loop driving it
//! - `worker`: full search on a rayon pool
//! - `remote`: HTTP fallback decoder

/// Frame loop and tier selection
pub mod controller;
/// Remote decoder collaborator
pub mod remote;
/// Scan session state machine
pub mod state;
/// Worker pool boundary
pub mod worker;

pub use controller::{PayloadSink, ScanController, ScanOutcome, Tier};
pub use remote::{HttpRemoteDecoder, RemoteDecoder};
pub use state::{EscalationPolicy, ScanEvent, ScanSession, ScanSessionId, ScanState};
pub use worker::{RayonWorker, WorkerDecoder, WorkerRequest, WorkerResponse};
