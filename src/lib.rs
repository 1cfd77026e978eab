//! Encrypted API client library.
//!
//! Seals every outgoing HTTP request into a signed, encrypted envelope and
//! validates the encrypted answer before handing a plain response back.

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod http;
pub mod observability;
pub mod security;

pub use config::ClientConfig;
pub use crypto::{AesGcmEngine, CryptoEngine, SecretPair};
pub use envelope::MultipartField;
pub use error::{ConfigurationError, Error, Result};
pub use crate::http::{EncryptedApiClient, EncryptedApiLayer, EncryptedApiMiddleware, RequestOptions};
