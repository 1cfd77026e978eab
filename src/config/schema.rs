//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the encrypted API client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL relative request targets resolve against.
    pub base_url: Option<String>,

    /// Envelope defaults applied to every call.
    pub encrypted_api: EncryptedApiConfig,

    /// Transport timeouts and identity.
    pub transport: TransportConfig,

    /// Redirect following.
    pub redirects: RedirectConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Instance defaults for the envelope pipeline.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncryptedApiConfig {
    /// Encryption secret.
    pub secret1: Option<String>,

    /// Signing secret.
    pub secret2: Option<String>,

    /// Extra headers sent in clear as well as signed.
    pub visible_headers: Vec<String>,

    /// Headers sent only in clear.
    pub unmanaged_headers: Vec<String>,

    /// Copy each file's own headers onto its plain multipart part.
    pub files_visible_headers: bool,

    /// Tunnel GET through POST.
    pub automatic_method_spoofing: bool,

    /// Bodies above this many bytes carry `Expect: 100-continue`.
    pub expect_continue_threshold: Option<u64>,
}

impl Default for EncryptedApiConfig {
    fn default() -> Self {
        Self {
            secret1: None,
            secret2: None,
            visible_headers: Vec::new(),
            unmanaged_headers: Vec::new(),
            files_visible_headers: false,
            automatic_method_spoofing: true,
            expect_continue_threshold: None,
        }
    }
}

impl std::fmt::Debug for EncryptedApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |s: &Option<String>| s.as_ref().map(|_| "<redacted>");
        f.debug_struct("EncryptedApiConfig")
            .field("secret1", &redact(&self.secret1))
            .field("secret2", &redact(&self.secret2))
            .field("visible_headers", &self.visible_headers)
            .field("unmanaged_headers", &self.unmanaged_headers)
            .field("files_visible_headers", &self.files_visible_headers)
            .field("automatic_method_spoofing", &self.automatic_method_spoofing)
            .field("expect_continue_threshold", &self.expect_continue_threshold)
            .finish()
    }
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Whole request timeout in seconds.
    pub request_timeout_secs: u64,

    /// `User-Agent` of every request.
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            request_timeout_secs: 30,
            user_agent: concat!("encrypted-api-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Redirect configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// Follow decrypted 3xx responses.
    pub enabled: bool,

    /// Maximum redirects per logical request.
    pub max: u32,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self { enabled: true, max: 5 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
