//! Off-loop full search
//!
//! The 108-attempt search is CPU bound, so it runs on a dedicated rayon
//! pool and reports back over a oneshot channel. The async side only
//! waits, with a deadline and a cancellation token.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::decoder::DecodeEngine;
use crate::error::DecodeError;
use crate::models::{DecodedPayload, PixelBuffer};

/// Message sent to the worker pool
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    /// Run the full search on one frame
    Decode {
        /// Frame to search
        buffer: PixelBuffer,
    },
}

/// Message sent back by the worker pool
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerResponse {
    /// A symbol was decoded
    Result {
        /// Decoded text
        payload: DecodedPayload,
    },
    /// The search ran to the end without a hit
    None,
    /// The search could not complete
    Error {
        /// Human-readable cause
        detail: String,
    },
}

/// Asynchronous full-search capability.
///
/// Returns `None` on a miss, an error, a timeout or cancellation; the
/// controller treats all of them as a failed escalation.
#[async_trait]
pub trait WorkerDecoder: Send + Sync {
    /// Search `buffer`, giving up after `deadline` or when `cancel` fires
    async fn decode(
        &self,
        buffer: PixelBuffer,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Option<DecodedPayload>;
}

/// [`WorkerDecoder`] backed by a rayon thread pool
pub struct RayonWorker {
    engine: Arc<DecodeEngine>,
    pool: Arc<rayon::ThreadPool>,
}

impl RayonWorker {
    /// Worker with its own pool of `threads` threads
    pub fn new(engine: DecodeEngine, threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("qr-worker-{i}"))
            .build()?;
        Ok(Self {
            engine: Arc::new(engine),
            pool: Arc::new(pool),
        })
    }

    /// Queue `request` on the pool; the search stops early once `cancel` fires
    pub fn submit(
        &self,
        request: WorkerRequest,
        cancel: CancellationToken,
    ) -> oneshot::Receiver<WorkerResponse> {
        let (tx, rx) = oneshot::channel();
        let engine = self.engine.clone();
        self.pool.spawn(move || {
            let WorkerRequest::Decode { buffer } = request;
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                engine.search_until(&buffer, || cancel.is_cancelled())
            }));
            let response = match outcome {
                Ok(Ok(outcome)) => WorkerResponse::Result {
                    payload: outcome.payload,
                },
                Ok(Err(DecodeError::Exhausted { .. } | DecodeError::EmptyBuffer)) => {
                    WorkerResponse::None
                }
                Ok(Err(err)) => WorkerResponse::Error {
                    detail: err.to_string(),
                },
                Err(_) => WorkerResponse::Error {
                    detail: "decode worker panicked".to_string(),
                },
            };
            // The receiver is gone when the escalation was abandoned
            let _ = tx.send(response);
        });
        rx
    }
}

impl std::fmt::Debug for RayonWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayonWorker")
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WorkerDecoder for RayonWorker {
    async fn decode(
        &self,
        buffer: PixelBuffer,
        deadline: Duration,
        cancel: CancellationToken,
    ) -> Option<DecodedPayload> {
        let job = cancel.child_token();
        // Dropping this future (or returning) stops the pool job
        let _stop_job = job.clone().drop_guard();
        let rx = self.submit(WorkerRequest::Decode { buffer }, job);

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("worker decode cancelled");
                return None;
            }
            response = tokio::time::timeout(deadline, rx) => response,
        };

        match response {
            Ok(Ok(WorkerResponse::Result { payload })) => Some(payload),
            Ok(Ok(WorkerResponse::None)) => None,
            Ok(Ok(WorkerResponse::Error { detail })) => {
                warn!(%detail, "worker decode failed");
                None
            }
            Ok(Err(_)) => {
                warn!("worker dropped its reply channel");
                None
            }
            Err(_) => {
                debug!(?deadline, "worker decode timed out");
                None
            }
        }
    }
}
