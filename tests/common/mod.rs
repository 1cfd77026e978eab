//! Shared utilities for integration testing.
//!
//! Starts an axum server that opens envelopes with the reference engine and
//! answers with encrypted responses. Behaviour is picked by the path of the
//! signed url:
//!
//! - `.../plain`     200 with an unencrypted body
//! - `.../wrong-id`  200 answering a different request id
//! - `.../see-other` 303 to `/v1/landing`
//! - `.../moved`     307 to `/v1/echo`
//! - `.../loop`      302 to itself
//! - anything else   200 echoing what was signed, as JSON

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use serde_json::json;
use tokio::net::TcpListener;

use encrypted_api_client::config::{ClientConfig, EncryptedApiConfig};
use encrypted_api_client::envelope::{HeaderSet, InboundEnvelope};
use encrypted_api_client::{AesGcmEngine, CryptoEngine, SecretPair};

pub const SECRET1: &str = "integration-secret-one";
pub const SECRET2: &str = "integration-secret-two";

pub fn secrets() -> SecretPair {
    SecretPair::new(SECRET1, SECRET2).unwrap()
}

/// One file part as the server saw it.
#[derive(Debug, Clone)]
pub struct ReceivedFile {
    pub name: String,
    pub filename: Option<String>,
    pub part_headers: HeaderMap,
    pub envelope: InboundEnvelope,
}

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Received {
    pub wire_method: Method,
    pub wire_headers: HeaderMap,
    pub envelope: InboundEnvelope,
    pub files: Vec<ReceivedFile>,
}

#[derive(Clone, Default)]
struct MockState {
    received: Arc<Mutex<Vec<Received>>>,
}

pub struct MockServer {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockServer {
    pub fn base_url(&self) -> String {
        format!("http://{}/v1/", self.addr)
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }

    /// Client configuration pointing at this server with the shared secrets.
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            base_url: Some(self.base_url()),
            encrypted_api: EncryptedApiConfig {
                secret1: Some(SECRET1.to_string()),
                secret2: Some(SECRET2.to_string()),
                ..EncryptedApiConfig::default()
            },
            ..ClientConfig::default()
        }
    }
}

/// Start the mock encrypted API on a free local port.
pub async fn start_mock_server() -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = MockState::default();

    let app = Router::new().fallback(handle).with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockServer { addr, state }
}

async fn handle(State(state): State<MockState>, request: Request) -> Response {
    let wire_method = request.method().clone();
    let wire_headers = request.headers().clone();
    let engine = AesGcmEngine::new();

    let is_multipart = wire_headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let (main, files) = if is_multipart {
        let mut multipart = Multipart::from_request(request, &()).await.unwrap();
        let mut main = Bytes::new();
        let mut files = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);
            let part_headers = field.headers().clone();
            let data = field.bytes().await.unwrap();
            if name == "request" {
                main = data;
            } else {
                files.push(ReceivedFile {
                    name,
                    filename,
                    part_headers,
                    envelope: engine.decrypt(&data, &secrets()).unwrap(),
                });
            }
        }
        (main, files)
    } else {
        let body = axum::body::to_bytes(request.into_body(), usize::MAX).await.unwrap();
        (body, Vec::new())
    };

    let envelope = match engine.decrypt(&main, &secrets()) {
        Ok(envelope) => envelope,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    state.received.lock().unwrap().push(Received {
        wire_method,
        wire_headers,
        envelope: envelope.clone(),
        files: files.clone(),
    });

    let path = envelope
        .url
        .as_deref()
        .and_then(|u| url::Url::parse(u).ok())
        .map(|u| u.path().to_string())
        .unwrap_or_default();

    let mut headers: HeaderSet = [("content-type", "application/json"), ("x-served-by", "mock")]
        .into_iter()
        .collect();
    let mut id = envelope.id.clone();
    let status = if path.ends_with("/plain") {
        return (StatusCode::OK, "plain text, not an envelope").into_response();
    } else if path.ends_with("/wrong-id") {
        id = "someone-else".to_string();
        StatusCode::OK
    } else if path.ends_with("/see-other") {
        headers.insert("location", "/v1/landing");
        StatusCode::SEE_OTHER
    } else if path.ends_with("/moved") {
        headers.insert("location", "/v1/echo");
        StatusCode::TEMPORARY_REDIRECT
    } else if path.ends_with("/loop") {
        headers.insert("location", "/v1/loop");
        StatusCode::FOUND
    } else {
        StatusCode::OK
    };

    let echo = json!({
        "method": envelope.method,
        "path": path,
        "data": String::from_utf8_lossy(&envelope.data),
        "headers": envelope.headers,
        "uploads": envelope.uploads.as_ref().map(|u| u.len()).unwrap_or(0),
        "files": files.iter().map(|f| json!({
            "name": f.name,
            "data": String::from_utf8_lossy(&f.envelope.data),
        })).collect::<Vec<_>>(),
    });

    let body = engine
        .encrypt_response(&id, &headers, echo.to_string().as_bytes(), &secrets())
        .unwrap();

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}
