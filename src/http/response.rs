//! Response validation and decoding.
//!
//! # Responsibilities
//! - Decrypt the transport's raw response through the crypto engine
//! - Reject envelopes that look like requests
//! - Rebuild a plain response from the decrypted headers and data
//! - Check the correlation id against the one sent
//!
//! # Design Decisions
//! - The decoded response is a fresh value; the raw response stays intact
//! - Status and version come from the transport, headers and body from
//!   the envelope only
//! - The id check runs last so the decoded response is still recorded

use bytes::Bytes;
use http::Response;

use crate::crypto::{CryptoEngine, SecretPair};
use crate::envelope::InboundEnvelope;
use crate::error::{Error, Result};

/// Decrypt the raw body and reject request-shaped envelopes.
pub fn open_envelope(engine: &dyn CryptoEngine, secrets: &SecretPair, raw: &Response<Bytes>) -> Result<InboundEnvelope> {
    let envelope = engine.decrypt(raw.body(), secrets)?;
    if envelope.has_request_shape() {
        tracing::warn!(
            id = %envelope.id,
            url = ?envelope.url,
            method = ?envelope.method,
            "Decrypted response carries request fields"
        );
        return Err(Error::InvalidResponse);
    }
    Ok(envelope)
}

/// Build the plain response: transport status, decrypted headers and body.
pub fn rebuild_response(raw: &Response<Bytes>, envelope: &InboundEnvelope) -> Result<Response<Bytes>> {
    let headers = envelope.headers.to_header_map().map_err(Error::InvalidHeader)?;

    let mut response = Response::new(envelope.data.clone());
    *response.status_mut() = raw.status();
    *response.version_mut() = raw.version();
    *response.headers_mut() = headers;
    Ok(response)
}

/// The response must echo the id of the request it answers.
pub fn check_correlation(sent: &str, envelope: &InboundEnvelope) -> Result<()> {
    if envelope.id == sent {
        return Ok(());
    }
    tracing::warn!(sent = %sent, received = %envelope.id, "Response id mismatch");
    Err(Error::InvalidResponseId {
        sent: sent.to_string(),
        received: envelope.id.clone(),
    })
}

/// Shallow copy of a buffered response.
pub(crate) fn snapshot(response: &Response<Bytes>) -> Response<Bytes> {
    let mut copy = Response::new(response.body().clone());
    *copy.status_mut() = response.status();
    *copy.version_mut() = response.version();
    *copy.headers_mut() = response.headers().clone();
    copy
}
