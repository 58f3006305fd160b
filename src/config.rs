//! Relay configuration
//!
//! Defaults, then an optional TOML file, then `QR_RELAY_*` environment
//! overrides. Every field has a default so an empty file is valid.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::decoder::search::DEFAULT_MAX_CANDIDATE_PIXELS;
use crate::error::ConfigError;
use crate::models::Account;

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u32) -> u32 {
    lookup(name)
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn parse_usize(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: usize) -> usize {
    lookup(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn parse_string(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Escalation controller tuning
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Minimum spacing between worker escalations, in milliseconds
    pub worker_interval_ms: u64,
    /// Hard timeout for one worker decode, in milliseconds
    pub worker_timeout_ms: u64,
    /// Failed worker escalations before the remote tier is tried
    pub remote_after_failures: u32,
    /// Frame spacing for replayed capture sources, in milliseconds
    pub frame_interval_ms: u64,
    /// Oversized inputs are shrunk so no candidate exceeds this pixel count
    pub max_candidate_pixels: usize,
    /// Threads in the worker decode pool
    pub worker_threads: usize,
}

impl ScanConfig {
    /// Worker escalation spacing
    pub fn worker_interval(&self) -> Duration {
        Duration::from_millis(self.worker_interval_ms)
    }

    /// Worker decode deadline
    pub fn worker_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_timeout_ms)
    }

    /// Replayed frame spacing
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            worker_interval_ms: 200,
            worker_timeout_ms: 2_000,
            remote_after_failures: 3,
            frame_interval_ms: 33,
            max_candidate_pixels: DEFAULT_MAX_CANDIDATE_PIXELS,
            worker_threads: 2,
        }
    }
}

/// Session cache policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Token time-to-live, in seconds
    pub ttl_secs: u64,
}

impl SessionConfig {
    /// Token time-to-live
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 600 }
    }
}

/// Attendance dispatch policy
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-request timeout, in milliseconds
    pub request_timeout_ms: u64,
}

impl DispatchConfig {
    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 9_000,
        }
    }
}

/// External service locations
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL of the login and attendance service
    pub attendance_base_url: String,
    /// Remote decoder endpoint; the remote tier is disabled when unset
    pub remote_decoder_url: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            attendance_base_url: "https://student.bennetterp.camu.in".to_string(),
            remote_decoder_url: None,
        }
    }
}

/// Complete relay configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Escalation controller tuning
    pub scan: ScanConfig,
    /// Session cache policy
    pub session: SessionConfig,
    /// Dispatch policy
    pub dispatch: DispatchConfig,
    /// External endpoints
    pub endpoints: EndpointConfig,
}

impl RelayConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults or `path`, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(base.with_env_overrides())
    }

    /// Apply `QR_RELAY_*` variables from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let scan = &mut self.scan;
        scan.worker_interval_ms =
            parse_u64(&lookup, "QR_RELAY_WORKER_INTERVAL_MS", scan.worker_interval_ms);
        scan.worker_timeout_ms =
            parse_u64(&lookup, "QR_RELAY_WORKER_TIMEOUT_MS", scan.worker_timeout_ms);
        scan.remote_after_failures =
            parse_u32(&lookup, "QR_RELAY_REMOTE_AFTER_FAILURES", scan.remote_after_failures);
        scan.frame_interval_ms =
            parse_u64(&lookup, "QR_RELAY_FRAME_INTERVAL_MS", scan.frame_interval_ms);
        scan.max_candidate_pixels =
            parse_usize(&lookup, "QR_RELAY_MAX_CANDIDATE_PIXELS", scan.max_candidate_pixels).max(1);
        scan.worker_threads =
            parse_usize(&lookup, "QR_RELAY_WORKER_THREADS", scan.worker_threads).max(1);

        self.session.ttl_secs =
            parse_u64(&lookup, "QR_RELAY_SESSION_TTL_SECS", self.session.ttl_secs);
        self.dispatch.request_timeout_ms = parse_u64(
            &lookup,
            "QR_RELAY_REQUEST_TIMEOUT_MS",
            self.dispatch.request_timeout_ms,
        );

        if let Some(url) = parse_string(&lookup, "QR_RELAY_ATTENDANCE_URL") {
            self.endpoints.attendance_base_url = url;
        }
        if let Some(url) = parse_string(&lookup, "QR_RELAY_REMOTE_DECODER_URL") {
            self.endpoints.remote_decoder_url = Some(url);
        }
        self
    }
}

#[derive(Deserialize)]
struct AccountsFile {
    #[serde(default)]
    account: Vec<Account>,
}

/// Parse `[[account]]` tables, keeping file order
pub fn accounts_from_toml_str(text: &str) -> Result<Vec<Account>, ConfigError> {
    let file: AccountsFile = toml::from_str(text)?;
    Ok(file.account)
}

/// Read registered accounts from a TOML file
pub fn load_accounts(path: &Path) -> Result<Vec<Account>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    accounts_from_toml_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.scan.worker_interval(), Duration::from_millis(200));
        assert_eq!(config.scan.worker_timeout(), Duration::from_secs(2));
        assert_eq!(config.session.ttl(), Duration::from_secs(600));
        assert_eq!(config.dispatch.request_timeout(), Duration::from_secs(9));
        assert!(config.endpoints.remote_decoder_url.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RelayConfig::from_toml_str(
            r#"
            [session]
            ttl_secs = 60

            [endpoints]
            remote_decoder_url = "http://localhost:8000/decode"
            "#,
        )
        .unwrap();
        assert_eq!(config.session.ttl_secs, 60);
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(
            config.endpoints.remote_decoder_url.as_deref(),
            Some("http://localhost:8000/decode")
        );
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(matches!(
            RelayConfig::from_toml_str("[scan]\nworker_interval_ms = \"fast\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides_win_and_garbage_is_ignored() {
        let vars: HashMap<&str, &str> = [
            ("QR_RELAY_WORKER_INTERVAL_MS", "150"),
            ("QR_RELAY_SESSION_TTL_SECS", "not-a-number"),
            ("QR_RELAY_ATTENDANCE_URL", " http://127.0.0.1:9 "),
        ]
        .into_iter()
        .collect();
        let config =
            RelayConfig::default().with_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.scan.worker_interval_ms, 150);
        assert_eq!(config.session.ttl_secs, 600);
        assert_eq!(config.endpoints.attendance_base_url, "http://127.0.0.1:9");
    }

    #[test]
    fn test_accounts_keep_file_order() {
        let accounts = accounts_from_toml_str(
            r#"
            [[account]]
            id = "s2"
            name = "Ben"
            email = "b@x"
            password = "pw"

            [[account]]
            id = "s1"
            name = "Asha"
            "#,
        )
        .unwrap();
        let ids: Vec<_> = accounts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
        assert!(accounts_from_toml_str("").unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = RelayConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
