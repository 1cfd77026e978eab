//! Per-call request options and main-body preparation.
//!
//! # Responsibilities
//! - Carry per-call overrides (secrets, header sets, spoofing, multipart)
//! - Turn body sources (raw, json, form fields) into the main request body
//! - Split multipart entries into plain form values and file parts
//!
//! # Design Decisions
//! - Options are built per call and never mutate instance defaults
//! - Supplying more than one body source is a configuration error

use std::collections::BTreeMap;
use std::path::PathBuf;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;

use crate::crypto::SecretPair;
use crate::envelope::MultipartField;
use crate::error::{ConfigurationError, Result};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Options for a single call. Values extend the instance defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub secrets: Option<SecretPair>,
    pub visible_headers: Vec<String>,
    pub unmanaged_headers: Vec<String>,
    pub files_visible_headers: Option<bool>,
    /// One-shot method override.
    pub spoofed_method: Option<String>,
    pub automatic_method_spoofing: Option<bool>,
    pub multipart: Option<Vec<MultipartField>>,
    pub form_params: Option<Vec<(String, String)>>,
    pub json: Option<Value>,
    pub body: Option<Bytes>,
    pub headers: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn secrets(mut self, secrets: SecretPair) -> Self {
        self.secrets = Some(secrets);
        self
    }

    pub fn visible_header(mut self, name: impl Into<String>) -> Self {
        self.visible_headers.push(name.into());
        self
    }

    pub fn unmanaged_header(mut self, name: impl Into<String>) -> Self {
        self.unmanaged_headers.push(name.into());
        self
    }

    pub fn files_visible_headers(mut self, enabled: bool) -> Self {
        self.files_visible_headers = Some(enabled);
        self
    }

    pub fn spoofed_method(mut self, method: impl Into<String>) -> Self {
        self.spoofed_method = Some(method.into());
        self
    }

    pub fn automatic_method_spoofing(mut self, enabled: bool) -> Self {
        self.automatic_method_spoofing = Some(enabled);
        self
    }

    pub fn multipart(mut self, fields: Vec<MultipartField>) -> Self {
        self.multipart = Some(fields);
        self
    }

    pub fn form_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.form_params = Some(params.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.json = Some(value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Options forwarded to the pipeline once the body has been prepared.
    pub(crate) fn for_pipeline(&self, files: Option<Vec<MultipartField>>) -> Self {
        Self {
            secrets: self.secrets.clone(),
            visible_headers: self.visible_headers.clone(),
            unmanaged_headers: self.unmanaged_headers.clone(),
            files_visible_headers: self.files_visible_headers,
            spoofed_method: self.spoofed_method.clone(),
            automatic_method_spoofing: self.automatic_method_spoofing,
            multipart: files,
            ..Self::default()
        }
    }

    /// Drop everything that describes a body.
    pub(crate) fn without_body(mut self) -> Self {
        self.multipart = None;
        self.form_params = None;
        self.json = None;
        self.body = None;
        self
    }
}

/// Main body plus the file parts left for the multipart path.
#[derive(Debug, Clone, Default)]
pub struct PreparedBody {
    pub body: Bytes,
    pub content_type: Option<&'static str>,
    /// `Some` selects the multipart path, even when empty.
    pub files: Option<Vec<MultipartField>>,
}

/// Build the main request body from the option's body sources.
pub fn prepare_body(options: &RequestOptions) -> std::result::Result<PreparedBody, ConfigurationError> {
    let sources = [
        options.form_params.is_some(),
        options.json.is_some(),
        options.body.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();

    if let Some(fields) = &options.multipart {
        if sources > 0 {
            return Err(ConfigurationError::AmbiguousBody);
        }

        let mut form = Vec::new();
        let mut files = Vec::new();
        for field in fields {
            let Some(name) = &field.name else {
                continue;
            };
            if field.is_plain_form_field() {
                form.push((
                    name.clone(),
                    String::from_utf8_lossy(field.contents.data()).into_owned(),
                ));
            } else {
                files.push(field.clone());
            }
        }

        return Ok(PreparedBody {
            body: encode_form(&form),
            content_type: Some(FORM_CONTENT_TYPE),
            files: Some(files),
        });
    }

    if sources > 1 {
        return Err(ConfigurationError::AmbiguousBody);
    }

    if let Some(params) = &options.form_params {
        return Ok(PreparedBody {
            body: encode_form(params),
            content_type: Some(FORM_CONTENT_TYPE),
            files: None,
        });
    }

    if let Some(json) = &options.json {
        return Ok(PreparedBody {
            body: Bytes::from(json.to_string()),
            content_type: Some(JSON_CONTENT_TYPE),
            files: None,
        });
    }

    Ok(PreparedBody {
        body: options.body.clone().unwrap_or_default(),
        content_type: None,
        files: None,
    })
}

fn encode_form(params: &[(String, String)]) -> Bytes {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        serializer.append_pair(key, value);
    }
    Bytes::from(serializer.finish())
}

#[derive(Debug, Deserialize)]
struct MultipartEntry {
    name: Option<String>,
    #[serde(default)]
    contents: Option<String>,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

/// Read multipart entries from a JSON array of objects.
///
/// Each object takes `name`, either `contents` or `path`, and optional
/// `filename` and `headers`. Files named by `path` are read from disk.
pub async fn parse_multipart_json(value: &Value) -> Result<Vec<MultipartField>> {
    let entries = value.as_array().ok_or_else(|| {
        ConfigurationError::MalformedMultipartField("expected an array of entries".to_string())
    })?;

    let mut fields = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        if !entry.is_object() {
            return Err(ConfigurationError::MalformedMultipartField(format!(
                "entry {} is not an object",
                index
            ))
            .into());
        }
        let entry: MultipartEntry = serde_json::from_value(entry.clone()).map_err(|e| {
            ConfigurationError::MalformedMultipartField(format!("entry {}: {}", index, e))
        })?;

        let mut field = match &entry.path {
            Some(path) => MultipartField::from_path(entry.name.clone().unwrap_or_default(), path).await?,
            None => MultipartField::new(
                entry.name.clone().unwrap_or_default(),
                entry.contents.clone().unwrap_or_default(),
            ),
        };
        field.name = entry.name;
        field.filename = entry.filename;
        field.headers = entry.headers.into_iter().collect();
        fields.push(field);
    }

    Ok(fields)
}
