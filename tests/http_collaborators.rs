use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use qr_relay::dispatch::{AttendanceCollaborator, HttpAttendanceClient};
use qr_relay::error::{AttendanceError, RemoteDecodeError, SessionError};
use qr_relay::escalation::{HttpRemoteDecoder, RemoteDecoder};
use qr_relay::models::{AccountId, Credentials, DecodedPayload, PixelBuffer, Token};
use qr_relay::session::{HttpLoginClient, LoginCollaborator};

const TIMEOUT: Duration = Duration::from_secs(2);

fn credentials() -> Credentials {
    Credentials {
        email: "asha@example.com".into(),
        password: "pw1".into(),
    }
}

fn frame() -> PixelBuffer {
    PixelBuffer::from_gray(8, 8, vec![255; 64]).unwrap()
}

#[tokio::test]
async fn test_login_returns_session_cookie() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/validate"))
        .and(body_json(json!({ "dtype": "M", "Email": "asha@example.com", "pwd": "pw1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "connect.sid=s%3Aabc.xyz; Path=/; HttpOnly")
                .set_body_json(json!({ "output": { "data": {} } })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpLoginClient::new(mock_server.uri(), TIMEOUT).unwrap();
    let token = client.login(&AccountId::new("stu-1"), &credentials()).await.unwrap();

    assert_eq!(token.as_str(), "connect.sid=s%3Aabc.xyz");
}

#[tokio::test]
async fn test_login_rejected_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/validate"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let client = HttpLoginClient::new(mock_server.uri(), TIMEOUT).unwrap();
    let err = client.login(&AccountId::new("stu-1"), &credentials()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::LoginFailed { ref account, .. } if account.as_str() == "stu-1"
    ));
}

#[tokio::test]
async fn test_login_without_cookie_fails() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/validate"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "theme=dark; Path=/"))
        .mount(&mock_server)
        .await;

    let client = HttpLoginClient::new(mock_server.uri(), TIMEOUT).unwrap();
    let result = client.login(&AccountId::new("stu-1"), &credentials()).await;

    assert!(matches!(result, Err(SessionError::LoginFailed { .. })));
}

#[tokio::test]
async fn test_attendance_request_shape_and_code() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/Attendance/record-online-attendance"))
        .and(header("appversion", "v2"))
        .and(header("clienttzofst", "330"))
        .and(header("cookie", "connect.sid=abc"))
        .and(body_json(json!({
            "attendanceId": "QR123",
            "StuID": "stu-1",
            "offQrCdEnbld": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "data": { "code": "SUCCESS" } }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = HttpAttendanceClient::new(mock_server.uri(), TIMEOUT).unwrap();
    let reply = client
        .mark_attendance(
            &AccountId::new("stu-1"),
            &Token::new("connect.sid=abc"),
            &DecodedPayload::from("QR123"),
        )
        .await
        .unwrap();

    assert_eq!(reply.code.as_deref(), Some("SUCCESS"));
}

#[tokio::test]
async fn test_attendance_body_without_code() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/Attendance/record-online-attendance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": {} })))
        .mount(&mock_server)
        .await;

    let client = HttpAttendanceClient::new(mock_server.uri(), TIMEOUT).unwrap();
    let reply = client
        .mark_attendance(&AccountId::new("stu-1"), &Token::new("t"), &DecodedPayload::from("QR123"))
        .await
        .unwrap();

    assert_eq!(reply.code, None);
}

#[tokio::test]
async fn test_attendance_server_error_and_bad_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/Attendance/record-online-attendance"))
        .and(header("cookie", "broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/Attendance/record-online-attendance"))
        .and(header("cookie", "garbled"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock_server)
        .await;

    let client = HttpAttendanceClient::new(mock_server.uri(), TIMEOUT).unwrap();
    let account = AccountId::new("stu-1");
    let payload = DecodedPayload::from("QR123");

    let server_error = client.mark_attendance(&account, &Token::new("broken"), &payload).await;
    assert!(matches!(server_error, Err(AttendanceError::Network(_))));

    let bad_body = client.mark_attendance(&account, &Token::new("garbled"), &payload).await;
    assert!(matches!(bad_body, Err(AttendanceError::Parse(_))));
}

#[tokio::test]
async fn test_remote_decoder_hit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/decode"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "text": "QR123" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let decoder = HttpRemoteDecoder::new(format!("{}/decode", mock_server.uri()), TIMEOUT).unwrap();
    let payload = decoder.decode(&frame()).await.unwrap();

    assert_eq!(payload.as_ref().map(|p| p.as_str()), Some("QR123"));

    let requests = mock_server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let image = body["imageBase64"].as_str().unwrap();
    assert!(image.starts_with("data:image/png;base64,"));
}

#[tokio::test]
async fn test_remote_decoder_not_found_is_a_miss() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/decode"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let decoder = HttpRemoteDecoder::new(format!("{}/decode", mock_server.uri()), TIMEOUT).unwrap();
    assert_eq!(decoder.decode(&frame()).await.unwrap(), None);
}

#[tokio::test]
async fn test_remote_decoder_upstream_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/decode"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let decoder = HttpRemoteDecoder::new(format!("{}/decode", mock_server.uri()), TIMEOUT).unwrap();
    let err = decoder.decode(&frame()).await.unwrap_err();

    assert!(matches!(err, RemoteDecodeError::Upstream(500)));
}
