//! Header classification policy.
//!
//! # Responsibilities
//! - Classify header names as overridden, visible, unmanaged or opaque
//! - Strip unmanaged headers before signing
//! - Decide which plain headers survive on the wire after sealing
//!
//! # Design Decisions
//! - Overridden headers are recomputed for every new body and can never be
//!   user-classified
//! - Unmanaged headers are never signed, so they stay visible on the wire
//! - Names are compared lower-cased

use std::collections::BTreeSet;

use http::header::HeaderMap;

use crate::envelope::HeaderSet;
use crate::error::ConfigurationError;

/// Always recomputed after the body is replaced.
pub const OVERRIDDEN_HEADERS: [&str; 4] = ["content-type", "content-length", "transfer-encoding", "expect"];

/// Sent in clear in addition to being signed, unless configured otherwise.
pub const DEFAULT_VISIBLE_HEADERS: [&str; 2] = ["user-agent", "host"];

/// Classification of a header name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderClass {
    /// Recomputed for the sealed body.
    Overridden,
    /// Signed and also sent in clear.
    Visible,
    /// Sent only in clear, unauthenticated.
    Unmanaged,
    /// Signed only; removed from the wire.
    Opaque,
}

/// Visible/unmanaged sets for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderPolicy {
    visible: BTreeSet<String>,
    unmanaged: BTreeSet<String>,
}

impl Default for HeaderPolicy {
    fn default() -> Self {
        Self {
            visible: DEFAULT_VISIBLE_HEADERS.iter().map(|h| h.to_string()).collect(),
            unmanaged: BTreeSet::new(),
        }
    }
}

impl HeaderPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default policy extended with extra visible and unmanaged names.
    pub fn with_extensions<V, U>(visible: V, unmanaged: U) -> Result<Self, ConfigurationError>
    where
        V: IntoIterator,
        V::Item: AsRef<str>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        let mut policy = Self::default();
        policy.extend(visible, unmanaged)?;
        Ok(policy)
    }

    /// Add more names to both sets.
    pub fn extend<V, U>(&mut self, visible: V, unmanaged: U) -> Result<(), ConfigurationError>
    where
        V: IntoIterator,
        V::Item: AsRef<str>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        for name in visible {
            self.add_visible(name.as_ref())?;
        }
        for name in unmanaged {
            self.add_unmanaged(name.as_ref())?;
        }
        Ok(())
    }

    pub fn classify(&self, name: &str) -> HeaderClass {
        let name = name.to_ascii_lowercase();
        if is_overridden(&name) {
            HeaderClass::Overridden
        } else if self.unmanaged.contains(&name) {
            HeaderClass::Unmanaged
        } else if self.visible.contains(&name) {
            HeaderClass::Visible
        } else {
            HeaderClass::Opaque
        }
    }

    pub fn add_visible(&mut self, name: &str) -> Result<(), ConfigurationError> {
        let name = checked_name(name, "visible")?;
        self.visible.insert(name);
        Ok(())
    }

    pub fn add_unmanaged(&mut self, name: &str) -> Result<(), ConfigurationError> {
        let name = checked_name(name, "unmanaged")?;
        self.unmanaged.insert(name);
        Ok(())
    }

    pub fn remove_visible(&mut self, name: &str) -> bool {
        self.visible.remove(&name.to_ascii_lowercase())
    }

    pub fn remove_unmanaged(&mut self, name: &str) -> bool {
        self.unmanaged.remove(&name.to_ascii_lowercase())
    }

    pub fn is_unmanaged(&self, name: &str) -> bool {
        self.classify(name) == HeaderClass::Unmanaged
    }

    /// Whether a plain header may stay on the outgoing wire request.
    pub fn allows_on_wire(&self, name: &str) -> bool {
        self.classify(name) != HeaderClass::Opaque
    }

    /// Drop unmanaged headers from a set about to be signed.
    pub fn strip_unmanaged(&self, headers: &mut HeaderSet) {
        headers.retain(|name| !self.unmanaged.contains(name));
    }

    /// Remove every plain header whose authoritative copy lives only in the envelope.
    pub fn filter_wire_headers(&self, headers: &mut HeaderMap) {
        let removed: Vec<_> = headers
            .keys()
            .filter(|name| !self.allows_on_wire(name.as_str()))
            .cloned()
            .collect();
        for name in removed {
            headers.remove(&name);
        }
    }

    pub fn visible(&self) -> impl Iterator<Item = &str> {
        self.visible.iter().map(String::as_str)
    }

    pub fn unmanaged(&self) -> impl Iterator<Item = &str> {
        self.unmanaged.iter().map(String::as_str)
    }
}

pub fn is_overridden(name: &str) -> bool {
    OVERRIDDEN_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn checked_name(name: &str, set: &'static str) -> Result<String, ConfigurationError> {
    let name = name.trim().to_ascii_lowercase();
    if is_overridden(&name) {
        return Err(ConfigurationError::ForbiddenHeader { header: name, set });
    }
    Ok(name)
}
