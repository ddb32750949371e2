use std::time::Duration;

use payrace::errors::PayraceError;
use payrace::http::{HttpTransport, PreparedRequest, ReqwestTransport, TransportOptions};
use payrace::models::Session;
use serde_json::json;
use wiremock::{
    matchers::{body_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn transport(options: TransportOptions) -> ReqwestTransport {
    ReqwestTransport::new(&options).unwrap()
}

#[tokio::test]
async fn test_redirects_are_not_followed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/login"))
        .mount(&mock_server)
        .await;
    Mock::given(path("/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("login page"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let request = PreparedRequest::new("POST", &format!("{}/pay", mock_server.uri()));
    let reply = transport(TransportOptions::default()).send(&request).await.unwrap();

    assert_eq!(reply.status, 302);
    assert!(!reply.is_success());
}

#[tokio::test]
async fn test_session_credentials_reach_the_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/redeem"))
        .and(header("authorization", "Bearer tok"))
        .and(header("x-session-token", "tok"))
        .and(header("cookie", "sid=abc"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"code": "WELCOME10"})))
        .respond_with(ResponseTemplate::new(201).set_body_string("{\"redeemed\":true}"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut session = Session::default();
    session.cookies.insert("sid".into(), "abc".into());
    session.session_token = Some("tok".into());

    let request = PreparedRequest::new("POST", &format!("{}/api/redeem", mock_server.uri()))
        .json(&json!({"code": "WELCOME10"}))
        .with_session(&session);
    let reply = transport(TransportOptions::default()).send(&request).await.unwrap();

    assert_eq!(reply.status, 201);
    assert_eq!(reply.body, "{\"redeemed\":true}");
}

#[tokio::test]
async fn test_body_is_truncated_to_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_string("a".repeat(50_000)))
        .mount(&mock_server)
        .await;

    let options = TransportOptions {
        body_limit: 128,
        ..TransportOptions::default()
    };
    let request = PreparedRequest::get(&format!("{}/big", mock_server.uri()));
    let reply = transport(options).send(&request).await.unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body.len(), 128);
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let options = TransportOptions {
        timeout: Duration::from_millis(200),
        ..TransportOptions::default()
    };
    let request = PreparedRequest::new("POST", &format!("{}/slow", mock_server.uri()));
    let err = transport(options).send(&request).await.unwrap_err();

    assert!(matches!(err, PayraceError::Timeout(_)), "{err:?}");
}

#[tokio::test]
async fn test_invalid_scheme_rejected_before_sending() {
    let request = PreparedRequest::new("POST", "ftp://files.test/pay");
    let err = transport(TransportOptions::default()).send(&request).await.unwrap_err();
    assert!(matches!(err, PayraceError::InvalidTarget(_)));
}
