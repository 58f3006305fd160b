//! Attendance collaborator

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::AttendanceError;
use crate::models::{AccountId, DecodedPayload, Token};

/// What the attendance service answered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceReply {
    /// Result code, when the body carried one
    pub code: Option<String>,
}

impl AttendanceReply {
    /// Reply carrying `code`
    pub fn with_code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
        }
    }
}

/// Submits one attendance record for one account
#[async_trait]
pub trait AttendanceCollaborator: Send + Sync {
    /// One request; the caller applies the timeout
    async fn mark_attendance(
        &self,
        account: &AccountId,
        token: &Token,
        payload: &DecodedPayload,
    ) -> Result<AttendanceReply, AttendanceError>;
}

#[derive(Serialize)]
struct AttendanceRequest<'a> {
    #[serde(rename = "attendanceId")]
    attendance_id: &'a str,
    #[serde(rename = "StuID")]
    stu_id: &'a str,
    #[serde(rename = "offQrCdEnbld")]
    offline_qr_enabled: bool,
}

/// Extract `output.data.code` from a response body
pub fn response_code(body: &Value) -> Option<String> {
    body.pointer("/output/data/code")
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// HTTP client for `{base}/api/Attendance/record-online-attendance`
#[derive(Debug, Clone)]
pub struct HttpAttendanceClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAttendanceClient {
    /// Client for `base_url`; `timeout` bounds the whole exchange
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
impl AttendanceCollaborator for HttpAttendanceClient {
    async fn mark_attendance(
        &self,
        account: &AccountId,
        token: &Token,
        payload: &DecodedPayload,
    ) -> Result<AttendanceReply, AttendanceError> {
        let response = self
            .client
            .post(format!("{}/api/Attendance/record-online-attendance", self.base_url))
            .header("accept", "application/json, text/plain, */*")
            .header("appversion", "v2")
            .header("clienttzofst", "330")
            .header("cookie", token.as_str())
            .json(&AttendanceRequest {
                attendance_id: payload.as_str(),
                stu_id: account.as_str(),
                offline_qr_enabled: true,
            })
            .send()
            .await
            .map_err(|err| AttendanceError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttendanceError::Network(format!("status {}", status.as_u16())));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| AttendanceError::Parse(err.to_string()))?;
        let code = response_code(&body);
        debug!(%account, code = code.as_deref().unwrap_or(""), "attendance replied");
        Ok(AttendanceReply { code })
    }
}
