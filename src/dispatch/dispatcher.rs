use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::client::{AttendanceCollaborator, AttendanceReply};
use super::progress::{NoopObserver, ProgressObserver};
use crate::error::{AttendanceError, SessionError};
use crate::escalation::ScanSessionId;
use crate::models::{
    Account, AccountId, AttendanceResult, AttendanceStatus, DecodedPayload, ResultSet, Token,
};
use crate::session::SessionCache;

/// One account's share of a dispatch round
#[derive(Debug, Clone)]
pub struct AttendanceTask {
    /// Slot in the result set
    pub index: usize,
    /// Account the request is made for
    pub account_id: AccountId,
    /// Resolved session token
    pub token: Token,
    /// Decoded payload to submit
    pub payload: DecodedPayload,
}

/// Map a collaborator reply to a status and the raw code.
///
/// Transport and parse failures, like a missing or empty code, are
/// indistinguishable from a timeout for the caller.
pub fn classify(
    reply: &Result<AttendanceReply, AttendanceError>,
) -> (AttendanceStatus, Option<String>) {
    let code = match reply {
        Ok(AttendanceReply { code: Some(code) }) if !code.is_empty() => code,
        _ => return (AttendanceStatus::Timeout, None),
    };
    let status = match code.as_str() {
        "SUCCESS" => AttendanceStatus::Marked,
        "ATTENDANCE_NOT_VALID" => AttendanceStatus::InvalidPayload,
        _ => AttendanceStatus::UnknownCode,
    };
    (status, Some(code.clone()))
}

struct RoundGuard<'a>(&'a AtomicBool);

impl<'a> RoundGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Fans one payload out to many accounts.
///
/// Every account gets its own task with its own timeout; no account can
/// delay or fail another. The result set always has one slot per account.
pub struct AttendanceDispatcher {
    sessions: Arc<SessionCache>,
    client: Arc<dyn AttendanceCollaborator>,
    observer: Arc<dyn ProgressObserver>,
    request_timeout: Duration,
    in_flight: AtomicBool,
    last_handled: Mutex<Option<ScanSessionId>>,
}

impl AttendanceDispatcher {
    /// Dispatcher with a silent observer
    pub fn new(
        sessions: Arc<SessionCache>,
        client: Arc<dyn AttendanceCollaborator>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            client,
            observer: Arc::new(NoopObserver),
            request_timeout,
            in_flight: AtomicBool::new(false),
            last_handled: Mutex::new(None),
        }
    }

    /// Replace the progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Shared session cache
    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }

    /// True while a round is running
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submit `payload` for every account
    pub async fn dispatch(&self, payload: &DecodedPayload, accounts: &[Account]) -> ResultSet {
        let indices: Vec<usize> = (0..accounts.len()).collect();
        let finished = self.run_round(payload, accounts, &indices).await;
        let mut slots: Vec<Option<AttendanceResult>> = vec![None; accounts.len()];
        for (index, result) in finished {
            slots[index] = Some(result);
        }
        ResultSet::from_entries(
            slots
                .into_iter()
                .zip(accounts)
                .map(|(slot, account)| slot.unwrap_or_else(|| timed_out(account)))
                .collect(),
        )
    }

    /// Dispatch once per scan session.
    ///
    /// Returns `None` without doing anything when `session_id` was already
    /// handled or when another round is still running.
    pub async fn handle_scan(
        &self,
        session_id: ScanSessionId,
        payload: &DecodedPayload,
        accounts: &[Account],
    ) -> Option<ResultSet> {
        if *self.last_handled.lock() == Some(session_id) {
            debug!(%session_id, "scan already handled");
            return None;
        }
        let Some(_round) = RoundGuard::acquire(&self.in_flight) else {
            debug!(%session_id, "dispatch round in flight, ignoring scan");
            return None;
        };
        // Re-check under the round guard; the previous holder may have just handled it
        {
            let mut last = self.last_handled.lock();
            if *last == Some(session_id) {
                return None;
            }
            *last = Some(session_id);
        }
        info!(%session_id, accounts = accounts.len(), payload = %payload, "dispatching scan");
        Some(self.dispatch(payload, accounts).await)
    }

    /// Re-dispatch every slot that is not `MARKED`, overwriting those slots.
    ///
    /// Returns how many accounts were retried; 0 when a round is in flight.
    pub async fn retry_failed(
        &self,
        payload: &DecodedPayload,
        accounts: &[Account],
        results: &mut ResultSet,
    ) -> usize {
        let Some(_round) = RoundGuard::acquire(&self.in_flight) else {
            return 0;
        };
        let indices: Vec<usize> = results
            .unmarked()
            .into_iter()
            .filter(|&i| i < accounts.len())
            .collect();
        if indices.is_empty() {
            return 0;
        }
        info!(retrying = indices.len(), "retrying failed accounts");
        let finished = self.run_round(payload, accounts, &indices).await;
        let mut seen = vec![false; accounts.len()];
        for (index, result) in finished {
            seen[index] = true;
            results.record(index, result);
        }
        for &index in &indices {
            if !seen[index] {
                results.record(index, timed_out(&accounts[index]));
            }
        }
        indices.len()
    }

    async fn run_round(
        &self,
        payload: &DecodedPayload,
        accounts: &[Account],
        indices: &[usize],
    ) -> Vec<(usize, AttendanceResult)> {
        let total = indices.len();
        let completed = Arc::new(AtomicUsize::new(0));
        let supplier: Arc<Vec<Account>> = Arc::new(accounts.to_vec());
        let mut tasks = JoinSet::new();

        for &index in indices {
            let supplier = supplier.clone();
            let sessions = self.sessions.clone();
            let client = self.client.clone();
            let observer = self.observer.clone();
            let completed = completed.clone();
            let payload = payload.clone();
            let timeout = self.request_timeout;

            tasks.spawn(async move {
                let account = &supplier[index];
                let request = Request {
                    sessions: &sessions,
                    client: client.as_ref(),
                    supplier: &supplier,
                    timeout,
                };
                let result = request.attend(account, index, payload).await;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                observer.on_result(index, &result);
                observer.on_progress(done, total);
                (index, result)
            });
        }

        let mut finished = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => finished.push(entry),
                Err(err) => {
                    // The slot stays empty and is reported as a timeout
                    warn!(error = %err, "attendance task failed");
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    self.observer.on_progress(done, total);
                }
            }
        }
        finished
    }
}

fn timed_out(account: &Account) -> AttendanceResult {
    AttendanceResult::new(AttendanceStatus::Timeout, &account.display_name)
}

/// Borrowed collaborators of one attendance task
struct Request<'a> {
    sessions: &'a SessionCache,
    client: &'a dyn AttendanceCollaborator,
    supplier: &'a [Account],
    timeout: Duration,
}

impl Request<'_> {
    /// Resolve a token, then submit. Login and request are each bounded by `timeout`.
    async fn attend(
        &self,
        account: &Account,
        index: usize,
        payload: DecodedPayload,
    ) -> AttendanceResult {
        let timeout = self.timeout;
        let login = self.sessions.get_token(&account.id, self.supplier);
        let token = match tokio::time::timeout(timeout, login).await {
            Ok(Ok(token)) => token,
            Ok(Err(err)) => {
                warn!(account = %account.id, error = %err, "session unavailable");
                return AttendanceResult::session_failure(&account.display_name, err);
            }
            Err(_) => {
                warn!(account = %account.id, ?timeout, "login timed out");
                let err = SessionError::LoginTimedOut(account.id.clone());
                return AttendanceResult::session_failure(&account.display_name, err);
            }
        };
        let task = AttendanceTask {
            index,
            account_id: account.id.clone(),
            token,
            payload,
        };

        let request = self
            .client
            .mark_attendance(&task.account_id, &task.token, &task.payload);
        let reply = match tokio::time::timeout(timeout, request).await {
            Ok(reply) => reply,
            Err(_) => {
                warn!(account = %task.account_id, ?timeout, "attendance request timed out");
                return timed_out(account);
            }
        };
        if let Err(err) = &reply {
            warn!(account = %task.account_id, error = %err, "attendance request failed");
        }

        let (status, code) = classify(&reply);
        let result = AttendanceResult::new(status, &account.display_name);
        match code {
            Some(code) => result.with_code(code),
            None => result,
        }
    }
}

impl std::fmt::Debug for AttendanceDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttendanceDispatcher")
            .field("request_timeout", &self.request_timeout)
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_codes() {
        let cases = [
            (Ok(AttendanceReply::with_code("SUCCESS")), AttendanceStatus::Marked),
            (
                Ok(AttendanceReply::with_code("ATTENDANCE_NOT_VALID")),
                AttendanceStatus::InvalidPayload,
            ),
            (
                Ok(AttendanceReply::with_code("ALREADY_MARKED")),
                AttendanceStatus::UnknownCode,
            ),
            (Ok(AttendanceReply::with_code("")), AttendanceStatus::Timeout),
            (Ok(AttendanceReply::default()), AttendanceStatus::Timeout),
            (Err(AttendanceError::Network("reset".into())), AttendanceStatus::Timeout),
            (Err(AttendanceError::Parse("html".into())), AttendanceStatus::Timeout),
        ];
        for (reply, expected) in cases {
            assert_eq!(classify(&reply).0, expected, "{:?}", reply);
        }
    }

    #[test]
    fn test_unknown_code_is_kept() {
        let (status, code) = classify(&Ok(AttendanceReply::with_code("ALREADY_MARKED")));
        assert_eq!(status, AttendanceStatus::UnknownCode);
        assert_eq!(code.as_deref(), Some("ALREADY_MARKED"));
    }

    #[test]
    fn test_round_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = RoundGuard::acquire(&flag);
        assert!(first.is_some());
        assert!(RoundGuard::acquire(&flag).is_none());
        drop(first);
        assert!(RoundGuard::acquire(&flag).is_some());
    }
}
