use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// External identifier of an account (the student id sent with attendance requests)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap an identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Login secret handed to the login collaborator
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Login e-mail
    pub email: String,
    /// Plain password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A pre-registered account, in registration order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    /// External identifier
    pub id: AccountId,
    /// Name shown next to the account's result
    #[serde(rename = "name")]
    pub display_name: String,
    /// Login secret; absent when the account only relies on a pre-warmed token
    #[serde(flatten)]
    pub credentials: Option<Credentials>,
}

impl Account {
    /// Account without credentials
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: AccountId::new(id),
            display_name: display_name.into(),
            credentials: None,
        }
    }

    /// Attach login credentials
    pub fn with_credentials(
        mut self,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials {
            email: email.into(),
            password: password.into(),
        });
        self
    }
}

/// Opaque session token (a `connect.sid=...` cookie pair for the HTTP login)
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wrap a token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(<{} bytes>)", self.0.len())
    }
}

/// Outcome class of one attendance task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttendanceStatus {
    /// The service accepted the payload
    Marked,
    /// The service rejected the payload (expired code or wrong account)
    InvalidPayload,
    /// No session token could be resolved; no request was sent
    SessionError,
    /// Network failure, unreadable response, or the request timed out
    Timeout,
    /// The service answered with a code outside the known set
    UnknownCode,
}

impl AttendanceStatus {
    /// Wire-style name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Marked => "MARKED",
            AttendanceStatus::InvalidPayload => "INVALID_PAYLOAD",
            AttendanceStatus::SessionError => "SESSION_ERROR",
            AttendanceStatus::Timeout => "TIMEOUT",
            AttendanceStatus::UnknownCode => "UNKNOWN_CODE",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one account's attendance task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceResult {
    /// Classified outcome
    pub status: AttendanceStatus,
    /// The account's display name
    pub display_name: String,
    /// Raw response code, when the service answered with one
    pub code: Option<String>,
    /// Why no session token was resolved, for `SESSION_ERROR` slots
    #[serde(skip)]
    pub session_error: Option<SessionError>,
}

impl AttendanceResult {
    /// Result with no response code
    pub fn new(status: AttendanceStatus, display_name: impl Into<String>) -> Self {
        Self {
            status,
            display_name: display_name.into(),
            code: None,
            session_error: None,
        }
    }

    /// `SESSION_ERROR` result carrying its cause
    pub fn session_failure(display_name: impl Into<String>, error: SessionError) -> Self {
        Self {
            session_error: Some(error),
            ..Self::new(AttendanceStatus::SessionError, display_name)
        }
    }

    /// Attach the raw response code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Per-scan results, one slot per account in registration order.
///
/// Slots are overwritten, never appended, so a retried account still owns
/// exactly one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    entries: Vec<AttendanceResult>,
}

impl ResultSet {
    /// Build from finished slots
    pub fn from_entries(entries: Vec<AttendanceResult>) -> Self {
        Self { entries }
    }

    /// Overwrite the slot at `index`; out-of-range indices are ignored
    pub fn record(&mut self, index: usize, result: AttendanceResult) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = result;
        }
    }

    /// All entries in account order
    pub fn entries(&self) -> &[AttendanceResult] {
        &self.entries
    }

    /// Entry for the account at `index`
    pub fn get(&self, index: usize) -> Option<&AttendanceResult> {
        self.entries.get(index)
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no accounts
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many entries carry `status`
    pub fn count(&self, status: AttendanceStatus) -> usize {
        self.entries.iter().filter(|r| r.status == status).count()
    }

    /// Statuses in account order
    pub fn statuses(&self) -> Vec<AttendanceStatus> {
        self.entries.iter().map(|r| r.status).collect()
    }

    /// Indices of slots that did not end up `Marked`
    pub fn unmarked(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, r)| r.status != AttendanceStatus::Marked)
            .map(|(i, _)| i)
            .collect()
    }
}
