//! HTTP client subsystem.
//!
//! # Data Flow
//! ```text
//! EncryptedApiClient::request(method, target, options)
//!     → request.rs (prepare main body, split multipart fields)
//!     → client.rs (Host, User-Agent, caller headers, body headers)
//!     → middleware.rs (spoofing, envelope sealing, wire filter)
//!     → transport.rs (reqwest or hyper, redirects disabled)
//!     → response.rs (decrypt, shape check, rebuild, id check)
//!     → client.rs (follow decrypted redirects)
//! ```
//!
//! # Design Decisions
//! - Bodies are buffered `Bytes`; envelopes are sealed in memory
//! - The pipeline stage is usable on its own over any tower transport

pub mod client;
pub mod middleware;
pub mod request;
pub mod response;
pub mod transport;

pub use client::EncryptedApiClient;
pub use middleware::{EncryptedApiLayer, EncryptedApiMiddleware, Stage};
pub use request::{parse_multipart_json, prepare_body, PreparedBody, RequestOptions};
pub use transport::{HyperTransport, ReqwestTransport};
