//! Method spoofing state machine.
//!
//! # States
//! - Normal: GET and HEAD are tunneled through POST when automatic spoofing is on
//! - OneShotOverride(method): next call signs `method`, then back to Normal
//! - Suppressed: previous response was a redirect; let the follow-up through as-is
//!
//! # State Transitions
//! ```text
//! Normal --override_once--> OneShotOverride --decide--> Normal
//! any --observe_response(3xx + Location)--> Suppressed
//! any --observe_response(other)--> Normal
//! ```
//!
//! # Design Decisions
//! - Encrypted payloads need a body, so GET travels as POST with the real
//!   method signed inside the envelope
//! - HEAD follows the same path; a HEAD response has no body to decrypt
//! - Redirect chains must not be re-spoofed indefinitely

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::{Method, StatusCode};

/// Header carrying the tunneled method.
pub const METHOD_OVERRIDE_HEADER: HeaderName = HeaderName::from_static("x-http-method-override");

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SpoofingState {
    #[default]
    Normal,
    OneShotOverride(Method),
    Suppressed,
}

/// Outcome of one spoofing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpoofDecision {
    /// Method put on the wire.
    pub wire_method: Method,
    /// Method signed inside the envelope.
    pub signed_method: Method,
    /// Value of the override header, `None` clears it.
    pub override_header: Option<Method>,
}

impl SpoofDecision {
    /// Rewrite the plain request's override header to match this decision.
    pub fn apply_header(&self, headers: &mut HeaderMap) {
        headers.remove(&METHOD_OVERRIDE_HEADER);
        if let Some(method) = &self.override_header {
            if let Ok(value) = HeaderValue::from_str(method.as_str()) {
                headers.insert(METHOD_OVERRIDE_HEADER, value);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MethodSpoofing {
    state: SpoofingState,
}

impl MethodSpoofing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SpoofingState {
        &self.state
    }

    /// Arm a one-shot override for the next call. The method is upper-cased.
    pub fn override_once(&mut self, method: &str) -> Result<(), http::method::InvalidMethod> {
        let method = Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())?;
        self.state = SpoofingState::OneShotOverride(method);
        Ok(())
    }

    /// Decide wire/signed methods for the next outbound call.
    pub fn decide(&mut self, method: &Method, automatic: bool) -> SpoofDecision {
        if let SpoofingState::OneShotOverride(spoofed) = &self.state {
            let spoofed = spoofed.clone();
            self.state = SpoofingState::Normal;
            let wire_method = if carries_no_body(method) {
                Method::POST
            } else {
                method.clone()
            };
            return SpoofDecision {
                wire_method,
                signed_method: spoofed.clone(),
                override_header: Some(spoofed),
            };
        }

        if carries_no_body(method) && automatic && self.state != SpoofingState::Suppressed {
            return SpoofDecision {
                wire_method: Method::POST,
                signed_method: method.clone(),
                override_header: Some(method.clone()),
            };
        }

        SpoofDecision {
            wire_method: method.clone(),
            signed_method: method.clone(),
            override_header: None,
        }
    }

    /// Update state from a validated, decrypted response.
    pub fn observe_response(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.state = if status.is_redirection() && headers.contains_key(http::header::LOCATION) {
            SpoofingState::Suppressed
        } else {
            SpoofingState::Normal
        };
    }
}

fn carries_no_body(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}
