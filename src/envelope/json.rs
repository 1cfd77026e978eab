//! JSON envelope path.
//!
//! # Responsibilities
//! - Normalize plain headers into list form and drop unmanaged ones
//! - Seal (headers, body, uri, signed method) through the crypto engine
//! - Replace the body with the transmit bytes and recompute body headers
//! - Apply the wire visibility filter

use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use http::request::Parts;
use http::{Method, Request};

use crate::crypto::{CryptoEngine, SealInput, SecretPair};
use crate::envelope::{recompute_body_headers, HeaderSet, ENVELOPE_CONTENT_TYPE};
use crate::error::Result;
use crate::security::HeaderPolicy;

/// A sealed request ready for the transport.
#[derive(Debug)]
pub struct BuiltRequest {
    pub request: Request<Bytes>,
    /// Correlation id the response must echo.
    pub id: String,
}

/// Builds outbound envelopes for one request.
pub struct EnvelopeBuilder<'a> {
    pub(crate) engine: &'a dyn CryptoEngine,
    pub(crate) secrets: &'a SecretPair,
    pub(crate) policy: &'a HeaderPolicy,
    pub(crate) files_visible_headers: bool,
    expect_threshold: Option<u64>,
}

impl<'a> EnvelopeBuilder<'a> {
    pub fn new(engine: &'a dyn CryptoEngine, secrets: &'a SecretPair, policy: &'a HeaderPolicy) -> Self {
        Self {
            engine,
            secrets,
            policy,
            files_visible_headers: false,
            expect_threshold: None,
        }
    }

    /// Merge each file's own headers into its plain multipart part.
    pub fn files_visible_headers(mut self, enabled: bool) -> Self {
        self.files_visible_headers = enabled;
        self
    }

    /// Add `Expect: 100-continue` to bodies larger than `threshold` bytes.
    pub fn expect_continue_threshold(mut self, threshold: Option<u64>) -> Self {
        self.expect_threshold = threshold;
        self
    }

    /// Seal a plain request into a JSON envelope.
    ///
    /// `request` already carries the wire method; `signed_method` is the
    /// method recorded inside the envelope.
    pub fn build_json(&self, request: Request<Bytes>, signed_method: &Method) -> Result<BuiltRequest> {
        let (parts, body) = request.into_parts();
        let uri = parts.uri.to_string();
        let headers = self.signed_headers(&parts.headers);

        let sealed = self.engine.encrypt(
            SealInput {
                headers: &headers,
                data: &body,
                uri: &uri,
                method: signed_method.as_str(),
                file_only: false,
                uploads: None,
            },
            self.secrets,
        )?;

        tracing::debug!(
            id = %sealed.id,
            method = %signed_method,
            uri = %uri,
            signed_headers = headers.len(),
            "Sealed JSON envelope"
        );

        Ok(self.finish(
            parts,
            sealed.transmit,
            HeaderValue::from_static(ENVELOPE_CONTENT_TYPE),
            sealed.id,
        ))
    }

    /// Plain headers in list form, minus unmanaged ones.
    pub(crate) fn signed_headers(&self, headers: &HeaderMap) -> HeaderSet {
        let mut set = HeaderSet::from_header_map(headers);
        self.policy.strip_unmanaged(&mut set);
        set
    }

    /// Swap in the sealed body, recompute body headers and filter the wire set.
    pub(crate) fn finish(&self, mut parts: Parts, body: Bytes, content_type: HeaderValue, id: String) -> BuiltRequest {
        recompute_body_headers(&mut parts.headers, body.len(), self.expect_threshold);
        parts.headers.insert(CONTENT_TYPE, content_type);
        self.policy.filter_wire_headers(&mut parts.headers);

        BuiltRequest {
            request: Request::from_parts(parts, body),
            id,
        }
    }
}
