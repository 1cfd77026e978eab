//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject half-configured or empty secrets
//! - Reject always-recomputed headers in the visible/unmanaged sets
//! - Validate value ranges (timeouts > 0, redirect limit)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::ClientConfig;
use crate::security::headers::is_overridden;

/// A single semantic problem in a loaded configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("encrypted_api.{0} is set but encrypted_api.{1} is missing")]
    HalfConfiguredSecrets(&'static str, &'static str),

    #[error("encrypted_api.{0} must not be empty")]
    EmptySecret(&'static str),

    #[error("{header} can not be sent as {set} header")]
    ForbiddenHeader { header: String, set: &'static str },

    #[error("base_url {0:?} is not an absolute URL")]
    InvalidBaseUrl(String),

    #[error("transport.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("redirects.max must be greater than zero when redirects are enabled")]
    ZeroRedirects,
}

pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let api = &config.encrypted_api;

    match (&api.secret1, &api.secret2) {
        (Some(_), None) => errors.push(ValidationError::HalfConfiguredSecrets("secret1", "secret2")),
        (None, Some(_)) => errors.push(ValidationError::HalfConfiguredSecrets("secret2", "secret1")),
        _ => {}
    }
    if api.secret1.as_deref() == Some("") {
        errors.push(ValidationError::EmptySecret("secret1"));
    }
    if api.secret2.as_deref() == Some("") {
        errors.push(ValidationError::EmptySecret("secret2"));
    }

    for (set, names) in [("visible", &api.visible_headers), ("unmanaged", &api.unmanaged_headers)] {
        for name in names.iter().filter(|n| is_overridden(n.trim())) {
            errors.push(ValidationError::ForbiddenHeader {
                header: name.trim().to_ascii_lowercase(),
                set,
            });
        }
    }

    if let Some(base) = &config.base_url {
        if url::Url::parse(base).is_err() {
            errors.push(ValidationError::InvalidBaseUrl(base.clone()));
        }
    }

    if config.transport.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_timeout_secs"));
    }
    if config.transport.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_timeout_secs"));
    }
    if config.redirects.enabled && config.redirects.max == 0 {
        errors.push(ValidationError::ZeroRedirects);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
