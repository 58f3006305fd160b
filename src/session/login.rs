//! Login collaborator

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::Serialize;
use tracing::debug;

use crate::error::SessionError;
use crate::models::{AccountId, Credentials, Token};

/// Exchanges credentials for a session token
#[async_trait]
pub trait LoginCollaborator: Send + Sync {
    /// One login round trip
    async fn login(
        &self,
        account: &AccountId,
        credentials: &Credentials,
    ) -> Result<Token, SessionError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    dtype: &'static str,
    #[serde(rename = "Email")]
    email: &'a str,
    pwd: &'a str,
}

/// `connect.sid=<value>` from the `Set-Cookie` headers, attributes stripped
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|cookie| cookie.trim_start().starts_with("connect.sid="))
        .and_then(|cookie| cookie.split(';').next())
        .map(|pair| pair.trim().to_string())
}

/// HTTP login against `{base}/login/validate`
#[derive(Debug, Clone)]
pub struct HttpLoginClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLoginClient {
    /// Client for `base_url` with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Client sharing an existing connection pool
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LoginCollaborator for HttpLoginClient {
    async fn login(
        &self,
        account: &AccountId,
        credentials: &Credentials,
    ) -> Result<Token, SessionError> {
        let failed = |reason: String| SessionError::LoginFailed {
            account: account.clone(),
            reason,
        };

        let response = self
            .client
            .post(format!("{}/login/validate", self.base_url))
            .header("accept", "application/json, text/plain, */*")
            .json(&LoginRequest {
                dtype: "M",
                email: &credentials.email,
                pwd: &credentials.password,
            })
            .send()
            .await
            .map_err(|err| failed(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("login returned status {}", status.as_u16())));
        }
        let cookie = session_cookie(response.headers())
            .ok_or_else(|| failed("no connect.sid cookie in response".to_string()))?;
        debug!(%account, "login succeeded");
        Ok(Token::new(cookie))
    }
}
