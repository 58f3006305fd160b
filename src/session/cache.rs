use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};
use super::login::LoginCollaborator;
use crate::error::SessionError;
use crate::models::{Account, AccountId, Credentials, Token};

/// Looks up the login secret for an account
pub trait CredentialSupplier: Send + Sync {
    /// `None` when the account is unknown or has no credentials
    fn credentials(&self, account: &AccountId) -> Option<Credentials>;
}

impl CredentialSupplier for [Account] {
    fn credentials(&self, account: &AccountId) -> Option<Credentials> {
        self.iter()
            .find(|a| &a.id == account)
            .and_then(|a| a.credentials.clone())
    }
}

impl CredentialSupplier for Vec<Account> {
    fn credentials(&self, account: &AccountId) -> Option<Credentials> {
        self.as_slice().credentials(account)
    }
}

impl CredentialSupplier for HashMap<AccountId, Credentials> {
    fn credentials(&self, account: &AccountId) -> Option<Credentials> {
        self.get(account).cloned()
    }
}

/// A cached token and when it was obtained
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCacheEntry {
    /// Session token
    pub token: Token,
    /// Login completion time
    pub obtained_at: Instant,
}

impl SessionCacheEntry {
    /// Valid while `now - obtained_at < ttl`
    pub fn is_valid(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.obtained_at) < ttl
    }
}

/// Per-account token cache with passive expiry.
///
/// Valid hits never touch the network. A miss or an expired entry logs in
/// exactly once per call; only successes are stored. Concurrent misses for
/// the same account each log in, and the last one to finish wins.
pub struct SessionCache {
    entries: Mutex<HashMap<AccountId, SessionCacheEntry>>,
    login: Arc<dyn LoginCollaborator>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl SessionCache {
    /// Cache on the system clock
    pub fn new(login: Arc<dyn LoginCollaborator>, ttl: Duration) -> Self {
        Self::with_clock(login, ttl, Arc::new(SystemClock))
    }

    /// Cache on an injected clock
    pub fn with_clock(
        login: Arc<dyn LoginCollaborator>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            login,
            clock,
            ttl,
        }
    }

    /// Token time-to-live
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Valid cached token, without logging in
    pub fn cached(&self, account: &AccountId) -> Option<Token> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        entries
            .get(account)
            .filter(|entry| entry.is_valid(now, self.ttl))
            .map(|entry| entry.token.clone())
    }

    /// Cached token, or a fresh login on miss or expiry
    pub async fn get_token(
        &self,
        account: &AccountId,
        supplier: &(impl CredentialSupplier + ?Sized),
    ) -> Result<Token, SessionError> {
        if let Some(token) = self.cached(account) {
            debug!(%account, "session cache hit");
            return Ok(token);
        }

        let credentials = supplier
            .credentials(account)
            .ok_or_else(|| SessionError::MissingCredentials(account.clone()))?;
        debug!(%account, "session cache miss, logging in");

        // The lock is not held across the login
        let token = self.login.login(account, &credentials).await?;
        let entry = SessionCacheEntry {
            token: token.clone(),
            obtained_at: self.clock.now(),
        };
        self.entries.lock().insert(account.clone(), entry);
        Ok(token)
    }

    /// Resolve every account concurrently, in input order
    pub async fn prewarm(
        &self,
        accounts: &[Account],
    ) -> Vec<(AccountId, Result<Token, SessionError>)> {
        let results = join_all(accounts.iter().map(|a| self.get_token(&a.id, accounts))).await;
        let out: Vec<_> = accounts.iter().map(|a| a.id.clone()).zip(results).collect();
        let failed = out.iter().filter(|(_, r)| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = out.len(), "prewarm incomplete");
        } else {
            info!(total = out.len(), "all sessions warm");
        }
        out
    }

    /// True when every account holds a valid token
    pub fn is_warm<'a>(&self, accounts: impl IntoIterator<Item = &'a AccountId>) -> bool {
        accounts.into_iter().all(|account| self.cached(account).is_some())
    }

    /// Drop the entry for `account`
    pub fn invalidate(&self, account: &AccountId) -> bool {
        self.entries.lock().remove(account).is_some()
    }

    /// Stored entries, valid or not
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("entries", &self.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
