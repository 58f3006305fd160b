//! End-to-end relay: scan one code, dispatch it for every account

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::capture::CaptureSource;
use crate::config::RelayConfig;
use crate::decoder::{DecodeEngine, SearchSpace};
use crate::dispatch::{
    AttendanceCollaborator, AttendanceDispatcher, HttpAttendanceClient, ProgressObserver,
};
use crate::error::{RelayError, SessionError};
use crate::escalation::{
    HttpRemoteDecoder, PayloadSink, RayonWorker, ScanController, ScanOutcome, ScanSessionId, Tier,
    WorkerDecoder,
};
use crate::models::{Account, AttendanceStatus, DecodedPayload, ResultSet, Token};
use crate::session::{HttpLoginClient, LoginCollaborator, SessionCache};

/// Sink that dispatches the accepted payload through an [`AttendanceDispatcher`]
pub struct DispatchOnScan {
    dispatcher: Arc<AttendanceDispatcher>,
    accounts: Arc<Vec<Account>>,
    results: Mutex<Option<ResultSet>>,
}

impl DispatchOnScan {
    /// Sink for `accounts`
    pub fn new(dispatcher: Arc<AttendanceDispatcher>, accounts: Arc<Vec<Account>>) -> Self {
        Self {
            dispatcher,
            accounts,
            results: Mutex::new(None),
        }
    }

    /// Results of the last dispatched round
    pub fn take_results(&self) -> Option<ResultSet> {
        self.results.lock().take()
    }
}

#[async_trait]
impl PayloadSink for DispatchOnScan {
    async fn on_payload(&self, session_id: ScanSessionId, payload: DecodedPayload, tier: Tier) {
        info!(%session_id, %tier, "dispatching decoded payload");
        let handled = self
            .dispatcher
            .handle_scan(session_id, &payload, &self.accounts)
            .await;
        if let Some(results) = handled {
            *self.results.lock() = Some(results);
        }
    }
}

/// Outcome of one relay run
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// How the scan session ended
    pub outcome: ScanOutcome,
    /// Per-account results when a payload was dispatched
    pub results: Option<ResultSet>,
}

impl ScanReport {
    /// Per-account failures expressed in the relay error taxonomy
    pub fn errors(&self, accounts: &[Account]) -> Vec<RelayError> {
        let Some(results) = &self.results else {
            return Vec::new();
        };
        results
            .entries()
            .iter()
            .zip(accounts)
            .filter_map(|(result, account)| match result.status {
                AttendanceStatus::Timeout => Some(RelayError::DispatchTimeout(account.id.clone())),
                AttendanceStatus::UnknownCode => Some(RelayError::UnknownResponseCode {
                    account: account.id.clone(),
                    code: result.code.clone().unwrap_or_default(),
                }),
                AttendanceStatus::SessionError => result
                    .session_error
                    .clone()
                    .map(RelayError::SessionResolutionFailed),
                AttendanceStatus::Marked | AttendanceStatus::InvalidPayload => None,
            })
            .collect()
    }
}

/// Scan controller, dispatcher and accounts wired together
pub struct Relay {
    controller: ScanController,
    dispatcher: Arc<AttendanceDispatcher>,
    accounts: Arc<Vec<Account>>,
}

impl Relay {
    /// Assemble from parts
    pub fn new(
        controller: ScanController,
        dispatcher: Arc<AttendanceDispatcher>,
        accounts: Vec<Account>,
    ) -> Self {
        Self {
            controller,
            dispatcher,
            accounts: Arc::new(accounts),
        }
    }

    /// Production wiring: rqrr engine, rayon worker, HTTP collaborators
    pub fn from_config(
        config: &RelayConfig,
        accounts: Vec<Account>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<Self, RelayError> {
        let engine = Arc::new(engine_for(config));
        let worker: Arc<dyn WorkerDecoder> = Arc::new(
            RayonWorker::new(engine_for(config), config.scan.worker_threads).map_err(setup)?,
        );
        let mut controller = ScanController::new(engine, worker, config.scan.clone());
        if let Some(url) = &config.endpoints.remote_decoder_url {
            let remote =
                HttpRemoteDecoder::new(url.clone(), config.scan.worker_timeout()).map_err(setup)?;
            controller = controller.with_remote(Arc::new(remote));
        }

        let timeout = config.dispatch.request_timeout();
        let base = &config.endpoints.attendance_base_url;
        let login: Arc<dyn LoginCollaborator> =
            Arc::new(HttpLoginClient::new(base.clone(), timeout).map_err(setup)?);
        let client: Arc<dyn AttendanceCollaborator> =
            Arc::new(HttpAttendanceClient::new(base.clone(), timeout).map_err(setup)?);
        let sessions = Arc::new(SessionCache::new(login, config.session.ttl()));
        let dispatcher =
            AttendanceDispatcher::new(sessions, client, timeout).with_observer(observer);
        Ok(Self::new(controller, Arc::new(dispatcher), accounts))
    }

    /// Registered accounts, in order
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// The dispatcher, for retries
    pub fn dispatcher(&self) -> &Arc<AttendanceDispatcher> {
        &self.dispatcher
    }

    /// Log every account in ahead of a scan
    pub async fn prewarm(&self) -> Vec<(crate::models::AccountId, Result<Token, SessionError>)> {
        self.dispatcher.sessions().prewarm(&self.accounts).await
    }

    /// True when every account holds a valid session token
    pub fn is_ready(&self) -> bool {
        self.dispatcher
            .sessions()
            .is_warm(self.accounts.iter().map(|a| &a.id))
    }

    /// Scan until a payload is accepted or `cancel` fires, then dispatch it
    pub async fn scan<S>(
        &self,
        capture: &mut S,
        cancel: CancellationToken,
    ) -> Result<ScanReport, RelayError>
    where
        S: CaptureSource + ?Sized,
    {
        let sink = DispatchOnScan::new(self.dispatcher.clone(), self.accounts.clone());
        let outcome = self.controller.run(capture, &sink, cancel).await?;
        Ok(ScanReport {
            outcome,
            results: sink.take_results(),
        })
    }

    /// Re-dispatch the accounts of `report` that were not marked
    pub async fn retry_failed(&self, report: &mut ScanReport) -> usize {
        let ScanOutcome::Decoded { payload, .. } = &report.outcome else {
            return 0;
        };
        let Some(results) = &mut report.results else {
            return 0;
        };
        self.dispatcher.retry_failed(payload, &self.accounts, results).await
    }
}

fn engine_for(config: &RelayConfig) -> DecodeEngine {
    let space = SearchSpace::full().with_max_candidate_pixels(config.scan.max_candidate_pixels);
    DecodeEngine::new().with_space(space)
}

fn setup(err: impl std::fmt::Display) -> RelayError {
    RelayError::Setup(err.to_string())
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("controller", &self.controller)
            .field("accounts", &self.accounts.len())
            .finish_non_exhaustive()
    }
}
