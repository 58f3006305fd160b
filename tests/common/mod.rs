#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use qrcode::{Color, QrCode};

use qr_relay::dispatch::{AttendanceCollaborator, AttendanceReply};
use qr_relay::error::{AttendanceError, SessionError};
use qr_relay::escalation::{PayloadSink, ScanSessionId, Tier};
use qr_relay::models::{Account, AccountId, Credentials, DecodedPayload, PixelBuffer, Token};
use qr_relay::session::LoginCollaborator;

const QUIET_ZONE: usize = 4;

/// Render `text` as a black-on-white symbol, `module_px` pixels per module
pub fn render_symbol(text: &str, module_px: usize) -> PixelBuffer {
    let code = QrCode::new(text.as_bytes()).expect("encodable payload");
    let modules = code.width();
    let colors = code.to_colors();
    let side = (modules + 2 * QUIET_ZONE) * module_px;
    let mut data = vec![255u8; side * side];
    for my in 0..modules {
        for mx in 0..modules {
            if colors[my * modules + mx] != Color::Dark {
                continue;
            }
            let x0 = (mx + QUIET_ZONE) * module_px;
            let y0 = (my + QUIET_ZONE) * module_px;
            for y in y0..y0 + module_px {
                data[y * side + x0..y * side + x0 + module_px].fill(0);
            }
        }
    }
    PixelBuffer::from_gray(side, side, data).unwrap()
}

/// Gray buffer expanded to RGB
pub fn to_rgb(buffer: &PixelBuffer) -> PixelBuffer {
    let data = buffer.data().iter().flat_map(|&v| [v, v, v]).collect();
    PixelBuffer::from_rgb(buffer.width(), buffer.height(), data).unwrap()
}

/// Paste a gray `symbol` onto a mid-gray canvas at `(x, y)`
pub fn on_canvas(
    symbol: &PixelBuffer,
    width: usize,
    height: usize,
    x: usize,
    y: usize,
) -> PixelBuffer {
    let mut data = vec![128u8; width * height];
    for sy in 0..symbol.height() {
        let row = &symbol.data()[sy * symbol.width()..(sy + 1) * symbol.width()];
        let start = (y + sy) * width + x;
        data[start..start + symbol.width()].copy_from_slice(row);
    }
    PixelBuffer::from_gray(width, height, data).unwrap()
}

/// Flat frame with nothing to find
pub fn blank_frame(width: usize, height: usize) -> PixelBuffer {
    PixelBuffer::from_gray(width, height, vec![200; width * height]).unwrap()
}

/// Three accounts; the third one's password is rejected by [`ScriptedLogin`]
pub fn three_accounts() -> Vec<Account> {
    vec![
        Account::new("stu-1", "Asha").with_credentials("asha@example.com", "pw1"),
        Account::new("stu-2", "Ravi").with_credentials("ravi@example.com", "pw2"),
        Account::new("stu-3", "Meera").with_credentials("meera@example.com", "wrong"),
    ]
}

/// Login that rejects the password "wrong"
#[derive(Default)]
pub struct ScriptedLogin {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub accounts: Mutex<Vec<AccountId>>,
}

impl ScriptedLogin {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, account: &str) -> usize {
        self.accounts.lock().iter().filter(|a| a.as_str() == account).count()
    }
}

#[async_trait]
impl LoginCollaborator for ScriptedLogin {
    async fn login(
        &self,
        account: &AccountId,
        credentials: &Credentials,
    ) -> Result<Token, SessionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.accounts.lock().push(account.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if credentials.password == "wrong" {
            return Err(SessionError::LoginFailed {
                account: account.clone(),
                reason: "invalid credentials".into(),
            });
        }
        Ok(Token::new(format!("connect.sid={account}")))
    }
}

/// How a [`ScriptedAttendance`] answers for one account
#[derive(Clone)]
pub enum Script {
    Code(&'static str),
    NoCode,
    Fail,
    /// Answer `SUCCESS` after sleeping
    Slow(Duration),
}

/// Attendance collaborator answering per account, `SUCCESS` by default
#[derive(Default)]
pub struct ScriptedAttendance {
    pub scripts: HashMap<String, Script>,
    pub calls: Mutex<Vec<(AccountId, String, String)>>,
}

impl ScriptedAttendance {
    pub fn with(mut self, account: &str, script: Script) -> Self {
        self.scripts.insert(account.to_string(), script);
        self
    }

    pub fn called_for(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(a, _, _)| a.to_string()).collect()
    }
}

#[async_trait]
impl AttendanceCollaborator for ScriptedAttendance {
    async fn mark_attendance(
        &self,
        account: &AccountId,
        token: &Token,
        payload: &DecodedPayload,
    ) -> Result<AttendanceReply, AttendanceError> {
        self.calls.lock().push((
            account.clone(),
            token.as_str().to_string(),
            payload.as_str().to_string(),
        ));
        let script = self.scripts.get(account.as_str()).cloned();
        match script.unwrap_or(Script::Code("SUCCESS")) {
            Script::Code(code) => Ok(AttendanceReply::with_code(code)),
            Script::NoCode => Ok(AttendanceReply::default()),
            Script::Fail => Err(AttendanceError::Network("connection reset".into())),
            Script::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(AttendanceReply::with_code("SUCCESS"))
            }
        }
    }
}

/// Records every payload it receives
#[derive(Default)]
pub struct RecordingSink {
    pub received: Mutex<Vec<(ScanSessionId, DecodedPayload, Tier)>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.received.lock().len()
    }
}

#[async_trait]
impl PayloadSink for RecordingSink {
    async fn on_payload(&self, session_id: ScanSessionId, payload: DecodedPayload, tier: Tier) {
        self.received.lock().push((session_id, payload, tier));
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
