//! Crypto engine seam.
//!
//! # Responsibilities
//! - Define the seal/open contract the pipeline depends on
//! - Hold the shared secret pair
//! - Ship a reference engine for clients, servers and tests
//!
//! # Design Decisions
//! - The pipeline never inspects ciphertext; algorithm choice and byte
//!   layout belong to the engine
//! - Engines are synchronous and shared behind `Arc<dyn CryptoEngine>`

pub mod aes_gcm;
pub mod secrets;

use bytes::Bytes;
use thiserror::Error;

use crate::envelope::{HeaderSet, InboundEnvelope, UploadDescriptor};

pub use aes_gcm::AesGcmEngine;
pub use secrets::SecretPair;

/// Errors raised by a crypto engine.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Payload is not in the engine's transmit format.
    #[error("malformed payload: {0}")]
    Format(String),

    /// Signature check failed; the payload was not produced with these secrets.
    #[error("signature verification failed")]
    Signature,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Input to a seal call.
#[derive(Debug, Clone, Copy)]
pub struct SealInput<'a> {
    pub headers: &'a HeaderSet,
    pub data: &'a [u8],
    pub uri: &'a str,
    pub method: &'a str,
    /// Lightweight signature-only envelope for one multipart file.
    pub file_only: bool,
    /// Upload declarations embedded in a main envelope.
    pub uploads: Option<&'a [UploadDescriptor]>,
}

/// Output of a seal call.
#[derive(Debug, Clone)]
pub struct Sealed {
    /// Bytes to put on the wire.
    pub transmit: Bytes,
    /// Correlation id the response must echo.
    pub id: String,
    pub signature: String,
}

/// Black-box encryption collaborator.
pub trait CryptoEngine: Send + Sync {
    /// Seal a request (or file part) into transmit bytes.
    fn encrypt(&self, input: SealInput<'_>, secrets: &SecretPair) -> Result<Sealed, CryptoError>;

    /// Open transmit bytes back into an envelope.
    fn decrypt(&self, body: &[u8], secrets: &SecretPair) -> Result<InboundEnvelope, CryptoError>;
}
