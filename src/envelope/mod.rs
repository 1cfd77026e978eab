//! Envelope construction subsystem.
//!
//! # Data Flow
//! ```text
//! plain request (method, uri, headers, body)
//!     → headers.rs (normalize into HeaderSet, drop unmanaged)
//!     → json.rs | multipart.rs (seal through the crypto engine)
//!     → recompute body headers, force Content-Type
//!     → wire visibility filter (security::headers)
//!     → BuiltRequest { request, id } handed to the transport
//! ```
//!
//! # Design Decisions
//! - The plain body and every non-visible header only survive inside the
//!   signed envelope
//! - The correlation id comes from the crypto engine and is kept for
//!   response validation
//! - Envelope building is synchronous; only the transport call awaits

pub mod headers;
pub mod json;
pub mod multipart;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

pub use headers::HeaderSet;
pub use json::{BuiltRequest, EnvelopeBuilder};
pub use multipart::{is_valid_file_form_name, MultipartField, PartContents};

/// Content type of every envelope payload.
pub const ENVELOPE_CONTENT_TYPE: &str = "application/json";

/// Per-file metadata embedded in the main envelope of a multipart request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDescriptor {
    /// Original multipart field name.
    pub name: String,
    /// File name as sent on the multipart part.
    pub filename: String,
    /// Signature of the file's own sub-envelope.
    pub signature: String,
}

/// Plaintext of a sealed envelope.
///
/// Main envelopes carry `method` and `url`; file sub-envelopes and
/// responses leave them out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEnvelope {
    pub id: String,
    pub timestamp: u64,
    pub method: Option<String>,
    pub url: Option<String>,
    pub headers: HeaderSet,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
    pub uploads: Option<Vec<UploadDescriptor>>,
}

/// Decrypted envelope as returned by the crypto engine.
///
/// A genuine response has `url`, `method` and `uploads` all absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundEnvelope {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub uploads: Option<Vec<UploadDescriptor>>,
    #[serde(default, with = "base64_bytes")]
    pub data: Bytes,
    #[serde(default)]
    pub headers: HeaderSet,
}

impl InboundEnvelope {
    /// True when request-only fields are populated.
    pub fn has_request_shape(&self) -> bool {
        self.url.is_some() || self.method.is_some() || self.uploads.is_some()
    }
}

/// Strip the always-recomputed headers and set them for a new body.
///
/// `Expect: 100-continue` is added only when `expect_threshold` is set and
/// the body is larger than it.
pub fn recompute_body_headers(headers: &mut HeaderMap, body_len: usize, expect_threshold: Option<u64>) {
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::EXPECT);

    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));

    if let Some(threshold) = expect_threshold {
        if body_len as u64 > threshold {
            headers.insert(header::EXPECT, HeaderValue::from_static("100-continue"));
        }
    }
}

pub(crate) mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD
            .decode(encoded)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recompute_body_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::EXPECT, HeaderValue::from_static("100-continue"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("ua"));

        recompute_body_headers(&mut headers, 42, None);

        assert_eq!(headers[header::CONTENT_LENGTH], "42");
        assert!(!headers.contains_key(header::CONTENT_TYPE));
        assert!(!headers.contains_key(header::TRANSFER_ENCODING));
        assert!(!headers.contains_key(header::EXPECT));
        assert_eq!(headers[header::USER_AGENT], "ua");

        recompute_body_headers(&mut headers, 2048, Some(1024));
        assert_eq!(headers[header::EXPECT], "100-continue");
    }

    #[test]
    fn test_inbound_request_shape() {
        let response: InboundEnvelope =
            serde_json::from_str(r#"{"id": "1", "url": null, "method": null, "uploads": null, "data": "aGk=", "headers": {}}"#)
                .unwrap();
        assert!(!response.has_request_shape());
        assert_eq!(response.data, Bytes::from_static(b"hi"));

        let echoed: InboundEnvelope =
            serde_json::from_str(r#"{"id": "1", "method": "GET", "data": "", "headers": {}}"#).unwrap();
        assert!(echoed.has_request_shape());

        let with_url: InboundEnvelope =
            serde_json::from_str(r#"{"id": "1", "url": "https://api.example.com/", "data": "", "headers": {}}"#)
                .unwrap();
        assert!(with_url.has_request_shape());

        let with_uploads: InboundEnvelope =
            serde_json::from_str(r#"{"id": "1", "uploads": [], "data": "", "headers": {}}"#).unwrap();
        assert!(with_uploads.has_request_shape());
    }
}
