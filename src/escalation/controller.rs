use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::remote::RemoteDecoder;
use super::state::{EscalationPolicy, ScanEvent, ScanSession, ScanSessionId, ScanState};
use super::worker::WorkerDecoder;
use crate::capture::{CaptureSource, open_with_fallback};
use crate::config::ScanConfig;
use crate::decoder::DecodeEngine;
use crate::error::ScanError;
use crate::models::{DecodedPayload, PixelBuffer};

/// Which stage of the pipeline produced a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Single attempt on a live frame
    Live,
    /// Full search on a still frame
    Worker,
    /// Remote decoder
    Remote,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Live => "live",
            Tier::Worker => "worker",
            Tier::Remote => "remote",
        })
    }
}

/// How a scan session ended
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// A payload was accepted and handed to the sink
    Decoded {
        /// Session that produced it
        session_id: ScanSessionId,
        /// Decoded text
        payload: DecodedPayload,
        /// Producing tier
        tier: Tier,
    },
    /// The caller cancelled before anything decoded
    Cancelled,
}

/// Receives the one accepted payload of a session
#[async_trait]
pub trait PayloadSink: Send + Sync {
    /// Called at most once per session, after the capture was released
    async fn on_payload(&self, session_id: ScanSessionId, payload: DecodedPayload, tier: Tier);
}

struct PendingDecode {
    session_id: ScanSessionId,
    tier: Tier,
    handle: JoinHandle<Option<DecodedPayload>>,
}

/// Resolves when the in-flight escalation finishes, or never when none is
async fn join_pending(
    pending: &mut Option<PendingDecode>,
) -> (ScanSessionId, Tier, Option<DecodedPayload>) {
    match pending {
        Some(p) => {
            let result = match (&mut p.handle).await {
                Ok(result) => result,
                Err(err) => {
                    warn!(tier = %p.tier, error = %err, "escalation task failed");
                    None
                }
            };
            (p.session_id, p.tier, result)
        }
        None => std::future::pending().await,
    }
}

/// Drives one scan session from capture open to a terminal state.
///
/// Live frames are decoded inline with a single attempt. Misses escalate to
/// the worker tier, and repeated worker failures escalate once to the remote
/// tier. At most one escalation is in flight; live decoding continues while
/// it runs. The first accepted payload wins and everything still running is
/// cancelled.
pub struct ScanController {
    engine: Arc<DecodeEngine>,
    worker: Arc<dyn WorkerDecoder>,
    remote: Option<Arc<dyn RemoteDecoder>>,
    config: ScanConfig,
}

impl ScanController {
    /// Controller with live and worker tiers
    pub fn new(
        engine: Arc<DecodeEngine>,
        worker: Arc<dyn WorkerDecoder>,
        config: ScanConfig,
    ) -> Self {
        Self {
            engine,
            worker,
            remote: None,
            config,
        }
    }

    /// Enable the remote tier
    pub fn with_remote(mut self, remote: Arc<dyn RemoteDecoder>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Escalation policy derived from the configuration
    pub fn policy(&self) -> EscalationPolicy {
        EscalationPolicy::from_config(&self.config, self.remote.is_some())
    }

    /// Run one session on `capture` until a payload is accepted, `cancel`
    /// fires or the capture fails.
    ///
    /// The capture is released before returning in every case. The sink is
    /// called only for [`ScanOutcome::Decoded`].
    pub async fn run<S>(
        &self,
        capture: &mut S,
        sink: &dyn PayloadSink,
        cancel: CancellationToken,
    ) -> Result<ScanOutcome, ScanError>
    where
        S: CaptureSource + ?Sized,
    {
        if capture.is_open() {
            debug!("releasing capture held by a previous session");
            capture.release();
        }

        let mut session = ScanSession::new(self.policy(), now());
        let session_id = session.id();
        info!(%session_id, "scan session started");

        if let Err(err) = open_with_fallback(capture).await {
            session.transition(ScanEvent::CaptureLost);
            warn!(%session_id, error = %err, "capture unavailable");
            return Err(ScanError::Capture(err));
        }
        session.transition(ScanEvent::Open);

        let escalations = cancel.child_token();
        let mut pending: Option<PendingDecode> = None;

        let result = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    session.transition(ScanEvent::Cancel);
                    info!(%session_id, "scan session cancelled");
                    break Ok(ScanOutcome::Cancelled);
                }

                (launched_for, tier, result) = join_pending(&mut pending) => {
                    pending = None;
                    if let Some(outcome) = self.settle(&mut session, launched_for, tier, result) {
                        break Ok(outcome);
                    }
                }

                frame = capture.next_frame() => {
                    let frame = match frame {
                        Ok(frame) => frame,
                        Err(err) => {
                            session.transition(ScanEvent::CaptureLost);
                            warn!(%session_id, error = %err, "capture lost");
                            break Err(ScanError::Capture(err));
                        }
                    };

                    if let Some(payload) = self.engine.decode_live(&frame) {
                        let state = session.transition(ScanEvent::LiveHit(session_id));
                        if state == ScanState::Completed {
                            let tier = Tier::Live;
                            break Ok(ScanOutcome::Decoded { session_id, payload, tier });
                        }
                    }
                    session.transition(ScanEvent::LiveMiss);

                    if pending.is_none() {
                        pending = self
                            .escalate(&mut session, capture, frame, &escalations)
                            .await;
                    }
                }
            }
        };

        escalations.cancel();
        if let Some(p) = pending.take() {
            p.handle.abort();
        }
        capture.release();

        if let Ok(ScanOutcome::Decoded { session_id, payload, tier }) = &result {
            info!(%session_id, %tier, "payload accepted");
            sink.on_payload(*session_id, payload.clone(), *tier).await;
        }
        result
    }

    fn settle(
        &self,
        session: &mut ScanSession,
        launched_for: ScanSessionId,
        tier: Tier,
        result: Option<DecodedPayload>,
    ) -> Option<ScanOutcome> {
        if !session.accepts(launched_for) {
            debug!(%launched_for, %tier, "stale escalation result dropped");
            return None;
        }
        let event = match (tier, &result) {
            (Tier::Worker, Some(_)) => ScanEvent::WorkerHit(launched_for),
            (Tier::Worker, None) => ScanEvent::WorkerMiss,
            (Tier::Remote, Some(_)) => ScanEvent::RemoteHit(launched_for),
            (Tier::Remote, None) => ScanEvent::RemoteMiss,
            (Tier::Live, _) => return None,
        };
        let state = session.transition(event);
        debug!(
            session_id = %session.id(),
            %tier,
            hit = result.is_some(),
            failed_escalations = session.failed_escalations(),
            "escalation finished"
        );
        match (state, result) {
            (ScanState::Completed, Some(payload)) => Some(ScanOutcome::Decoded {
                session_id: launched_for,
                payload,
                tier,
            }),
            _ => None,
        }
    }

    async fn escalate<S>(
        &self,
        session: &mut ScanSession,
        capture: &mut S,
        frame: PixelBuffer,
        escalations: &CancellationToken,
    ) -> Option<PendingDecode>
    where
        S: CaptureSource + ?Sized,
    {
        let session_id = session.id();

        if session.remote_due() {
            let remote = self.remote.clone()?;
            session.transition(ScanEvent::RemoteStarted);
            debug!(%session_id, "escalating to remote decoder");
            let token = escalations.clone();
            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => None,
                    result = remote.decode(&frame) => match result {
                        Ok(payload) => payload,
                        Err(err) => {
                            debug!(error = %err, "remote decode failed");
                            None
                        }
                    },
                }
            });
            return Some(PendingDecode {
                session_id,
                tier: Tier::Remote,
                handle,
            });
        }

        if !session.worker_due(now()) {
            return None;
        }

        let still = tokio::select! {
            biased;

            _ = escalations.cancelled() => {
                debug!(%session_id, "still grab abandoned");
                return None;
            }

            still = capture.grab_still_frame() => match still {
                Ok(still) => still,
                Err(err) => {
                    debug!(%session_id, error = %err, "still grab failed, using live frame");
                    frame
                }
            },
        };
        session.transition(ScanEvent::WorkerStarted);
        debug!(
            %session_id,
            width = still.width(),
            height = still.height(),
            "escalating to worker"
        );

        let worker = self.worker.clone();
        let deadline = self.config.worker_timeout();
        let token = escalations.child_token();
        let handle = tokio::spawn(async move {
            tokio::time::timeout(deadline, worker.decode(still, deadline, token))
                .await
                .ok()
                .flatten()
        });
        Some(PendingDecode {
            session_id,
            tier: Tier::Worker,
            handle,
        })
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

impl fmt::Debug for ScanController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanController")
            .field("config", &self.config)
            .field("remote", &self.remote.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct IdleWorker;

    #[async_trait]
    impl WorkerDecoder for IdleWorker {
        async fn decode(
            &self,
            _buffer: PixelBuffer,
            _deadline: Duration,
            _cancel: CancellationToken,
        ) -> Option<DecodedPayload> {
            None
        }
    }

    fn controller() -> ScanController {
        let engine = Arc::new(DecodeEngine::new());
        ScanController::new(engine, Arc::new(IdleWorker), ScanConfig::default())
    }

    fn worker_escalation(controller: &ScanController) -> ScanSession {
        let mut session = ScanSession::new(controller.policy(), now());
        session.transition(ScanEvent::Open);
        session.transition(ScanEvent::LiveMiss);
        session.transition(ScanEvent::WorkerStarted);
        session
    }

    #[test]
    fn test_settle_drops_result_for_another_session() {
        let controller = controller();
        let mut session = worker_escalation(&controller);
        let hit = Some(DecodedPayload::from("QR123"));

        let other = ScanSessionId::new();
        let stale = controller.settle(&mut session, other, Tier::Worker, hit.clone());
        assert!(stale.is_none());
        assert_eq!(session.state(), ScanState::WorkerEscalation);

        let id = session.id();
        let own = controller.settle(&mut session, id, Tier::Worker, hit);
        assert!(matches!(own, Some(ScanOutcome::Decoded { tier: Tier::Worker, .. })));
        assert_eq!(session.state(), ScanState::Completed);
    }

    #[test]
    fn test_settle_ignores_results_after_terminal_state() {
        let controller = controller();
        let mut session = worker_escalation(&controller);
        session.transition(ScanEvent::Cancel);

        let late = Some(DecodedPayload::from("QR123"));
        let id = session.id();
        assert!(controller.settle(&mut session, id, Tier::Worker, late).is_none());
        assert_eq!(session.state(), ScanState::Cancelled);
    }
}
