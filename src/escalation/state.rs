//! Scan session state machine
//!
//! Pure bookkeeping: no frames, no tasks, no clocks beyond the instants
//! handed in. The controller feeds it events and asks it what to do next.

use std::fmt;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::config::ScanConfig;

/// Identity of one scan session; late results are matched against it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScanSessionId(Uuid);

impl ScanSessionId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScanSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scan session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Created, capture not open yet
    Idle,
    /// Decoding live frames, one attempt each
    LiveScanning,
    /// A full search on a still frame is running off the frame loop
    WorkerEscalation,
    /// The current frame was submitted to the remote decoder
    RemoteEscalation,
    /// A payload was accepted
    Completed,
    /// Stopped by the caller or by losing the capture
    Cancelled,
}

impl ScanState {
    /// `Completed` or `Cancelled`
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Completed | ScanState::Cancelled)
    }
}

/// Inputs to [`ScanSession::transition`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    /// The capture source opened
    Open,
    /// A live frame produced nothing
    LiveMiss,
    /// A live frame decoded, for the given session
    LiveHit(ScanSessionId),
    /// A worker escalation was launched
    WorkerStarted,
    /// The worker found nothing, failed or timed out
    WorkerMiss,
    /// The worker decoded, for the given session
    WorkerHit(ScanSessionId),
    /// A remote escalation was launched
    RemoteStarted,
    /// The remote decoder found nothing or failed
    RemoteMiss,
    /// The remote decoder decoded, for the given session
    RemoteHit(ScanSessionId),
    /// The caller stopped the session
    Cancel,
    /// The capture source stopped producing frames
    CaptureLost,
}

/// Escalation timing and thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    /// Minimum spacing between worker escalations
    pub worker_interval: Duration,
    /// Failed worker escalations before going remote; `None` disables the remote tier
    pub remote_after_failures: Option<u32>,
}

impl EscalationPolicy {
    /// Policy from configuration, with or without a remote tier
    pub fn from_config(config: &ScanConfig, remote_enabled: bool) -> Self {
        Self {
            worker_interval: config.worker_interval(),
            remote_after_failures: remote_enabled.then_some(config.remote_after_failures),
        }
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default(), true)
    }
}

/// One scan session and its counters
#[derive(Debug, Clone)]
pub struct ScanSession {
    id: ScanSessionId,
    started_at: Instant,
    state: ScanState,
    policy: EscalationPolicy,
    scanning_since: Option<Instant>,
    last_worker_attempt_at: Option<Instant>,
    live_misses: u64,
    failed_escalations: u32,
}

impl ScanSession {
    /// New idle session
    pub fn new(policy: EscalationPolicy, now: Instant) -> Self {
        Self {
            id: ScanSessionId::new(),
            started_at: now,
            state: ScanState::Idle,
            policy,
            scanning_since: None,
            last_worker_attempt_at: None,
            live_misses: 0,
            failed_escalations: 0,
        }
    }

    /// Session identity
    pub fn id(&self) -> ScanSessionId {
        self.id
    }

    /// Current state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// When the session was created
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// When the last worker escalation was launched
    pub fn last_worker_attempt_at(&self) -> Option<Instant> {
        self.last_worker_attempt_at
    }

    /// Live frames that produced nothing
    pub fn live_misses(&self) -> u64 {
        self.live_misses
    }

    /// Worker escalations that failed since the last remote attempt
    pub fn failed_escalations(&self) -> u32 {
        self.failed_escalations
    }

    /// True when a hit produced for `id` may still complete this session
    pub fn accepts(&self, id: ScanSessionId) -> bool {
        !self.state.is_terminal() && id == self.id
    }

    /// Apply `event` at the current instant
    pub fn transition(&mut self, event: ScanEvent) -> ScanState {
        self.transition_at(event, tokio::time::Instant::now().into_std())
    }

    /// Apply `event` at `now`. Events that do not apply to the current state are ignored.
    pub fn transition_at(&mut self, event: ScanEvent, now: Instant) -> ScanState {
        use ScanEvent::*;
        use ScanState::*;

        if self.state.is_terminal() {
            return self.state;
        }

        self.state = match (self.state, event) {
            (_, Cancel) | (_, CaptureLost) => Cancelled,
            (Idle, Open) => {
                self.scanning_since = Some(now);
                LiveScanning
            }
            (LiveScanning | WorkerEscalation | RemoteEscalation, LiveMiss) => {
                self.live_misses += 1;
                self.state
            }
            (LiveScanning | WorkerEscalation | RemoteEscalation, LiveHit(id)) if id == self.id => {
                Completed
            }
            (LiveScanning, WorkerStarted) => {
                self.last_worker_attempt_at = Some(now);
                WorkerEscalation
            }
            (WorkerEscalation, WorkerMiss) => {
                self.failed_escalations += 1;
                LiveScanning
            }
            (WorkerEscalation, WorkerHit(id)) if id == self.id => Completed,
            (LiveScanning, RemoteStarted) => RemoteEscalation,
            (RemoteEscalation, RemoteMiss) => {
                self.failed_escalations = 0;
                LiveScanning
            }
            (RemoteEscalation, RemoteHit(id)) if id == self.id => Completed,
            (state, _) => state,
        };
        self.state
    }

    /// Whether a worker escalation should launch now
    pub fn worker_due(&self, now: Instant) -> bool {
        if self.state != ScanState::LiveScanning || self.live_misses == 0 || self.remote_due() {
            return false;
        }
        let anchor = match self.last_worker_attempt_at.or(self.scanning_since) {
            Some(anchor) => anchor,
            None => return false,
        };
        now.saturating_duration_since(anchor) >= self.policy.worker_interval
    }

    /// Whether the remote tier should be tried next
    pub fn remote_due(&self) -> bool {
        match self.policy.remote_after_failures {
            Some(threshold) => {
                self.state == ScanState::LiveScanning && self.failed_escalations >= threshold
            }
            None => false,
        }
    }
}
