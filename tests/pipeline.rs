//! End-to-end pipeline tests against the mock encrypted API.

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use encrypted_api_client::config::TransportConfig;
use encrypted_api_client::http::HyperTransport;
use encrypted_api_client::{
    AesGcmEngine, ConfigurationError, EncryptedApiClient, Error, RequestOptions, SecretPair,
};

mod common;

fn echoed(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_get_is_tunneled_and_decrypted() {
    let server = common::start_mock_server().await;
    let mut client = EncryptedApiClient::from_config(&server.config()).unwrap();

    let response = client.get("echo?page=2", RequestOptions::new()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-served-by"], "mock");
    let body = echoed(response.body());
    assert_eq!(body["method"], "GET");
    assert_eq!(body["path"], "/v1/echo");

    let received = server.received();
    assert_eq!(received[0].wire_method, Method::POST);
    assert!(received[0].wire_headers.get("x-http-method-override").is_none());
    assert_eq!(
        received[0].envelope.url.as_deref(),
        Some(format!("{}echo?page=2", server.base_url()).as_str())
    );
    assert_eq!(received[0].envelope.headers.first("x-http-method-override"), Some("GET"));
}

#[tokio::test]
async fn test_head_is_tunneled_and_decrypted() {
    let server = common::start_mock_server().await;
    let mut client = EncryptedApiClient::from_config(&server.config()).unwrap();

    let response = client.head("echo", RequestOptions::new()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-served-by"], "mock");
    assert_eq!(echoed(response.body())["method"], "HEAD");

    let received = server.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].wire_method, Method::POST);
    assert_eq!(received[0].envelope.method.as_deref(), Some("HEAD"));
    assert_eq!(received[0].envelope.headers.first("x-http-method-override"), Some("HEAD"));
}

#[tokio::test]
async fn test_no_spoofing_sends_get() {
    let server = common::start_mock_server().await;
    let mut client = EncryptedApiClient::from_config(&server.config()).unwrap();

    client
        .get("echo", RequestOptions::new().automatic_method_spoofing(false))
        .await
        .unwrap();
    assert_eq!(server.received()[0].wire_method, Method::GET);
}

#[tokio::test]
async fn test_header_visibility_on_the_wire() {
    let server = common::start_mock_server().await;
    let mut client = EncryptedApiClient::from_config(&server.config()).unwrap();

    let options = RequestOptions::new()
        .header("authorization", "Bearer secret-token")
        .header("x-api-version", "3")
        .header("x-request-id", "r-1")
        .visible_header("x-api-version")
        .unmanaged_header("x-request-id")
        .json(json!({"name": "lamp"}));
    client.post("items", options).await.unwrap();

    let received = &server.received()[0];
    let wire = &received.wire_headers;
    assert!(wire.get("authorization").is_none());
    assert_eq!(wire["x-api-version"], "3");
    assert_eq!(wire["x-request-id"], "r-1");
    assert_eq!(wire["content-type"], "application/json");

    let signed = &received.envelope.headers;
    assert_eq!(signed.first("authorization"), Some("Bearer secret-token"));
    assert_eq!(signed.first("x-api-version"), Some("3"));
    assert!(!signed.contains("x-request-id"));
    assert_eq!(received.envelope.data.as_ref(), br#"{"name":"lamp"}"#);
}

#[tokio::test]
async fn test_per_call_secrets_override_defaults() {
    let server = common::start_mock_server().await;
    let mut config = server.config();
    config.encrypted_api.secret1 = None;
    config.encrypted_api.secret2 = None;
    let mut client = EncryptedApiClient::from_config(&config).unwrap();

    let err = client.get("echo", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, Error::Configuration(ConfigurationError::MissingSecrets)));
    assert!(server.received().is_empty());

    let options = RequestOptions::new().secrets(common::secrets());
    assert!(client.get("echo", options).await.is_ok());
}

#[tokio::test]
async fn test_wrong_secrets_fail_decryption() {
    let server = common::start_mock_server().await;
    let mut client = EncryptedApiClient::from_config(&server.config()).unwrap();

    let options = RequestOptions::new().secrets(SecretPair::new("other", "pair").unwrap());
    let err = client.get("echo", options).await.unwrap_err();
    assert!(matches!(err, Error::Crypto(_)));
    assert!(client
        .middleware()
        .partial_raw_response()
        .is_some_and(|r| r.status() == StatusCode::BAD_REQUEST));
}

#[tokio::test]
async fn test_response_id_mismatch() {
    let server = common::start_mock_server().await;
    let mut client = EncryptedApiClient::from_config(&server.config()).unwrap();

    let err = client.get("wrong-id", RequestOptions::new()).await.unwrap_err();
    match err {
        Error::InvalidResponseId { received, .. } => assert_eq!(received, "someone-else"),
        other => panic!("expected InvalidResponseId, got {:?}", other),
    }
    assert!(client.is_request_completed());
    assert_eq!(client.last_response().unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_plain_response_is_rejected_but_kept() {
    let server = common::start_mock_server().await;
    let mut client = EncryptedApiClient::from_config(&server.config()).unwrap();

    let err = client.get("plain", RequestOptions::new()).await.unwrap_err();
    assert!(matches!(err, Error::Crypto(_)));
    assert!(matches!(client.last_raw_response(), Err(Error::Logic)));
    assert_eq!(
        client.middleware().partial_raw_response().unwrap().body().as_ref(),
        b"plain text, not an envelope"
    );
}

#[tokio::test]
async fn test_one_shot_spoofed_method() {
    let server = common::start_mock_server().await;
    let mut client = EncryptedApiClient::from_config(&server.config()).unwrap();

    let response = client
        .post("echo", RequestOptions::new().spoofed_method("patch"))
        .await
        .unwrap();
    assert_eq!(echoed(response.body())["method"], "PATCH");

    let response = client.post("echo", RequestOptions::new()).await.unwrap();
    assert_eq!(echoed(response.body())["method"], "POST");
}

#[tokio::test]
async fn test_hyper_transport() {
    let server = common::start_mock_server().await;
    let config = server.config();
    let mut client = EncryptedApiClient::with_transport(
        HyperTransport::with_config(&TransportConfig::default()),
        Arc::new(AesGcmEngine::new()),
        &config,
    )
    .unwrap();

    let response = client
        .put("echo", RequestOptions::new().body("replace me"))
        .await
        .unwrap();
    let body = echoed(response.body());
    assert_eq!(body["method"], "PUT");
    assert_eq!(body["data"], "replace me");
    assert_eq!(server.received()[0].wire_method, Method::PUT);
}
