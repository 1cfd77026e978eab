//! Error taxonomy for the encrypted API pipeline.
//!
//! # Categories
//! - Configuration: caught before any network call, never retried
//! - InvalidResponse / InvalidResponseId: protocol violations found while
//!   decoding the server's envelope
//! - Logic: pipeline accessors used before a request completed
//! - Crypto / Transport: failures surfaced by the collaborators

use thiserror::Error;

use crate::crypto::CryptoError;

/// Misconfiguration detected before an envelope is built.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Neither the call options nor the instance defaults carry both secrets.
    #[error(
        "unable to resolve shared secrets for request: set default secret1/secret2 \
         in the client configuration or provide both as request options"
    )]
    MissingSecrets,

    /// A secret was supplied but is empty.
    #[error("shared secret {0} must not be empty")]
    EmptySecret(&'static str),

    /// An always-recomputed header was put into a user-managed set.
    #[error("{header} can not be sent as {set} header")]
    ForbiddenHeader { header: String, set: &'static str },

    /// Structured form fields and file parts were both supplied.
    #[error(
        "form_params and multipart can not be used at the same time: use form_params \
         for application/x-www-form-urlencoded requests and multipart for multipart/form-data"
    )]
    AmbiguousBody,

    /// A multipart entry has an unusable shape.
    #[error("request multipart array has invalid format: {0}")]
    MalformedMultipartField(String),

    /// A header name or value can not be represented on the wire.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// A request target could not be parsed or resolved.
    #[error("invalid uri: {0}")]
    InvalidUri(String),
}

/// Errors returned by the encrypted API pipeline and client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The decrypted envelope has request-only fields populated.
    #[error("invalid response: decrypted envelope carries request fields (url, method or uploads)")]
    InvalidResponse,

    /// The decrypted response answers a different request.
    #[error("invalid response id: sent {sent}, received {received}")]
    InvalidResponseId { sent: String, received: String },

    /// Request or response accessed before the current call completed.
    #[error("perform a request first")]
    Logic,

    #[error("crypto engine error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("transport error: {0}")]
    Transport(#[source] tower::BoxError),

    /// Decrypted headers that can not be placed on an HTTP message.
    #[error("invalid decrypted header: {0}")]
    InvalidHeader(String),

    #[error("too many redirects (max {0})")]
    TooManyRedirects(u32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors raised before anything was sent.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }
}
