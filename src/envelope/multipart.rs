//! Multipart envelope path.
//!
//! # Responsibilities
//! - Seal every file field into a signature-only sub-envelope
//! - Collect upload descriptors for fields with a well-formed form name
//! - Seal the main request with the uploads list as the `request` part
//! - Encode the final multipart/form-data body
//!
//! # Design Decisions
//! - Parts are staged in memory; a part without a usable filename gets a
//!   generated staging name, and its descriptor records that same name
//! - Sub-envelopes are sealed against the main request's uri and method so
//!   the server can cross-check them with the main envelope

use std::fmt::Write as _;
use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::HeaderValue;
use http::{Method, Request};

use crate::crypto::SealInput;
use crate::envelope::json::{BuiltRequest, EnvelopeBuilder};
use crate::envelope::{HeaderSet, UploadDescriptor, ENVELOPE_CONTENT_TYPE};
use crate::error::{ConfigurationError, Error, Result};

/// Name of the part carrying the main envelope.
pub const MAIN_PART_NAME: &str = "request";

/// Where a multipart field's bytes came from.
#[derive(Debug, Clone)]
pub enum PartContents {
    /// Anonymous in-memory bytes.
    Memory(Bytes),
    /// Bytes read from a named source, usually a file path.
    Named { source: String, data: Bytes },
}

impl PartContents {
    pub fn data(&self) -> &Bytes {
        match self {
            PartContents::Memory(data) => data,
            PartContents::Named { data, .. } => data,
        }
    }

    /// Name of the source, `None` for anonymous bytes.
    pub fn source_name(&self) -> Option<&str> {
        match self {
            PartContents::Memory(_) => None,
            PartContents::Named { source, .. } => Some(source),
        }
    }
}

/// One multipart entry as supplied by the caller.
#[derive(Debug, Clone)]
pub struct MultipartField {
    pub name: Option<String>,
    pub contents: PartContents,
    pub filename: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl MultipartField {
    /// In-memory field.
    pub fn new(name: impl Into<String>, contents: impl Into<Bytes>) -> Self {
        Self {
            name: Some(name.into()),
            contents: PartContents::Memory(contents.into()),
            filename: None,
            headers: Vec::new(),
        }
    }

    /// Field backed by a file on disk; the path becomes the fallback filename.
    pub async fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        Ok(Self {
            name: Some(name.into()),
            contents: PartContents::Named {
                source: path.display().to_string(),
                data: Bytes::from(data),
            },
            filename: None,
            headers: Vec::new(),
        })
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Anonymous bytes without a filename are ordinary form values, not files.
    ///
    /// The literal filename `"0"` still marks a file.
    pub fn is_plain_form_field(&self) -> bool {
        let unnamed = match self.filename.as_deref() {
            None | Some("") => true,
            Some(_) => false,
        };
        unnamed && self.contents.source_name().is_none()
    }

    /// Filename given by the caller, else the source's own name.
    fn resolved_filename(&self) -> Option<&str> {
        match self.filename.as_deref() {
            Some(name) if !name.is_empty() => Some(name),
            _ => self.contents.source_name(),
        }
    }
}

/// Check a file field's form name.
///
/// Accepts a plain name optionally followed by one bracketed segment:
/// `files` and `files[]` pass; `files[][x]`, `a]` and `a[b[c]]` do not.
pub fn is_valid_file_form_name(name: &str) -> bool {
    let mut in_segment = false;
    let mut segments = 0;

    for c in name.chars() {
        match c {
            '[' => {
                if in_segment || segments > 0 {
                    return false;
                }
                in_segment = true;
            }
            ']' => {
                if !in_segment {
                    return false;
                }
                in_segment = false;
                segments += 1;
            }
            _ => {
                if segments > 0 && !in_segment {
                    return false;
                }
            }
        }
    }

    !in_segment
}

struct StagedPart {
    name: String,
    filename: Option<String>,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl<'a> EnvelopeBuilder<'a> {
    /// Seal a plain request plus file fields into a multipart envelope.
    pub fn build_multipart(
        &self,
        request: Request<Bytes>,
        signed_method: &Method,
        fields: &[MultipartField],
    ) -> Result<BuiltRequest> {
        let (parts, body) = request.into_parts();
        let uri = parts.uri.to_string();
        let main_headers = self.signed_headers(&parts.headers);

        let mut staged = Vec::with_capacity(fields.len() + 1);
        let mut uploads = Vec::new();

        for field in fields {
            let (part, signature) = self.stage_file(field, &uri, signed_method)?;

            if is_valid_file_form_name(&part.name) {
                uploads.push(UploadDescriptor {
                    name: part.name.clone(),
                    filename: part.filename.clone().unwrap_or_default(),
                    signature,
                });
            } else {
                tracing::debug!(field = %part.name, "Form name not eligible for an upload declaration");
            }
            staged.push(part);
        }

        let sealed = self.engine.encrypt(
            SealInput {
                headers: &main_headers,
                data: &body,
                uri: &uri,
                method: signed_method.as_str(),
                file_only: false,
                uploads: Some(&uploads),
            },
            self.secrets,
        )?;

        staged.insert(
            0,
            StagedPart {
                name: MAIN_PART_NAME.to_string(),
                filename: None,
                headers: envelope_part_headers(sealed.transmit.len()),
                body: sealed.transmit,
            },
        );

        tracing::debug!(
            id = %sealed.id,
            method = %signed_method,
            uri = %uri,
            files = fields.len(),
            uploads = uploads.len(),
            "Sealed multipart envelope"
        );

        let boundary = generate_boundary();
        let content_type = HeaderValue::from_str(&format!("multipart/form-data; boundary={}", boundary))
            .map_err(|e| ConfigurationError::InvalidHeader(e.to_string()))?;
        let body = encode_parts(&boundary, &staged);

        Ok(self.finish(parts, body, content_type, sealed.id))
    }

    fn stage_file(&self, field: &MultipartField, uri: &str, method: &Method) -> Result<(StagedPart, String)> {
        let name = field.name.clone().ok_or_else(|| {
            Error::from(ConfigurationError::MalformedMultipartField(
                "file entry without a name".to_string(),
            ))
        })?;
        for (key, _) in &field.headers {
            http::HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
                Error::from(ConfigurationError::MalformedMultipartField(format!(
                    "invalid header name {:?} on file entry {}",
                    key, name
                )))
            })?;
        }
        let filename = field.resolved_filename();
        let data = field.contents.data();

        let mut file_headers: HeaderSet = field.headers.iter().map(|(k, v)| (k, v.clone())).collect();
        if !file_headers.contains("content-type") {
            if let Some(mime) = filename.and_then(|f| mime_guess::from_path(f).first()) {
                file_headers.insert("content-type", mime.essence_str());
            }
        }
        if !data.is_empty() {
            file_headers.insert("content-length", data.len().to_string());
        }

        let sealed = self.engine.encrypt(
            SealInput {
                headers: &file_headers,
                data,
                uri,
                method: method.as_str(),
                file_only: true,
                uploads: None,
            },
            self.secrets,
        )?;

        let mut headers = envelope_part_headers(sealed.transmit.len());
        if self.files_visible_headers {
            for (key, value) in &field.headers {
                if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(key)) {
                    headers.push((key.clone(), value.clone()));
                }
            }
        }

        let wire_filename = match filename {
            Some(f) if f != "0" => basename(f),
            _ => staging_name(),
        };

        Ok((
            StagedPart {
                name,
                filename: Some(wire_filename),
                headers,
                body: sealed.transmit,
            },
            sealed.signature,
        ))
    }
}

fn envelope_part_headers(len: usize) -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), ENVELOPE_CONTENT_TYPE.to_string()),
        ("Content-Length".to_string(), len.to_string()),
    ]
}

fn generate_boundary() -> String {
    format!("{:032x}", fastrand::u128(..))
}

fn staging_name() -> String {
    format!("upload-{:016x}", fastrand::u64(..))
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Quote a disposition parameter without letting it break the header line.
fn quote(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace(['\r', '\n'], " ")
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

fn encode_parts(boundary: &str, parts: &[StagedPart]) -> Bytes {
    let mut out = BytesMut::new();
    for part in parts {
        let mut head = String::new();
        let _ = write!(head, "--{}\r\n", boundary);
        let _ = write!(head, "Content-Disposition: form-data; name=\"{}\"", quote(&part.name));
        if let Some(filename) = &part.filename {
            let _ = write!(head, "; filename=\"{}\"", quote(filename));
        }
        head.push_str("\r\n");
        for (key, value) in &part.headers {
            let _ = write!(head, "{}: {}\r\n", key, single_line(value));
        }
        head.push_str("\r\n");

        out.put_slice(head.as_bytes());
        out.put_slice(&part.body);
        out.put_slice(b"\r\n");
    }
    out.put_slice(format!("--{}--\r\n", boundary).as_bytes());
    out.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AesGcmEngine, CryptoEngine, SecretPair};
    use crate::security::HeaderPolicy;
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};

    /// Minimal multipart reader for assertions.
    fn split_parts(content_type: &str, body: &[u8]) -> Vec<(String, Vec<u8>)> {
        let boundary = content_type.split("boundary=").nth(1).unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        text.split(&format!("--{}", boundary))
            .filter(|chunk| !chunk.is_empty() && !chunk.starts_with("--"))
            .map(|chunk| {
                let chunk = chunk.trim_start_matches("\r\n");
                let (head, rest) = chunk.split_once("\r\n\r\n").unwrap();
                let payload = rest.strip_suffix("\r\n").unwrap_or(rest);
                (head.to_string(), payload.as_bytes().to_vec())
            })
            .collect()
    }

    fn request() -> Request<Bytes> {
        Request::builder()
            .method(Method::POST)
            .uri("https://api.example.com/upload")
            .header("host", "api.example.com")
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Bytes::from_static(b"title=holiday"))
            .unwrap()
    }

    #[test]
    fn test_form_name_validation() {
        assert!(is_valid_file_form_name("files"));
        assert!(is_valid_file_form_name("files[]"));
        assert!(is_valid_file_form_name("files[avatar]"));
        assert!(!is_valid_file_form_name("files[][x]"));
        assert!(!is_valid_file_form_name("a]"));
        assert!(!is_valid_file_form_name("a[b[c]]"));
        assert!(!is_valid_file_form_name("a[b"));
        assert!(!is_valid_file_form_name("a[]b"));
    }

    #[test]
    fn test_plain_form_field_detection() {
        assert!(MultipartField::new("title", "x").is_plain_form_field());
        assert!(!MultipartField::new("doc", "x").with_filename("a.txt").is_plain_form_field());
        assert!(!MultipartField::new("doc", "x").with_filename("0").is_plain_form_field());
    }

    #[test]
    fn test_multipart_envelope_layout() {
        let engine = AesGcmEngine::new();
        let secrets = SecretPair::new("s1", "s2").unwrap();
        let policy = HeaderPolicy::new();
        let builder = EnvelopeBuilder::new(&engine, &secrets, &policy);

        let fields = vec![
            MultipartField::new("files[]", "hello").with_filename("notes.txt"),
            MultipartField::new("bad[][x]", "ignored").with_filename("b.bin"),
        ];
        let built = builder.build_multipart(request(), &Method::POST, &fields).unwrap();

        let content_type = built.request.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("multipart/form-data; boundary="));
        assert_eq!(
            built.request.headers()[CONTENT_LENGTH],
            built.request.body().len().to_string().as_str()
        );

        let parts = split_parts(&content_type, built.request.body());
        assert_eq!(parts.len(), 3);
        assert!(parts[0].0.contains("name=\"request\""));
        assert!(parts[1].0.contains("name=\"files[]\"; filename=\"notes.txt\""));
        assert!(parts[2].0.contains("name=\"bad[][x]\""));

        let main = engine.decrypt(&parts[0].1, &secrets).unwrap();
        assert_eq!(main.id, built.id);
        assert_eq!(main.data, Bytes::from_static(b"title=holiday"));
        let uploads = main.uploads.unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].name, "files[]");
        assert_eq!(uploads[0].filename, "notes.txt");

        let file = engine.decrypt(&parts[1].1, &secrets).unwrap();
        assert_eq!(file.data, Bytes::from_static(b"hello"));
        assert_eq!(file.headers.first("content-type"), Some("text/plain"));
        assert_eq!(file.headers.first("content-length"), Some("5"));
    }

    #[test]
    fn test_all_invalid_names_still_declare_empty_uploads() {
        let engine = AesGcmEngine::new();
        let secrets = SecretPair::new("s1", "s2").unwrap();
        let policy = HeaderPolicy::new();
        let builder = EnvelopeBuilder::new(&engine, &secrets, &policy);

        let fields = vec![MultipartField::new("a]", "x").with_filename("x.txt")];
        let built = builder.build_multipart(request(), &Method::POST, &fields).unwrap();

        let content_type = built.request.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        let parts = split_parts(&content_type, built.request.body());
        let main = engine.decrypt(&parts[0].1, &secrets).unwrap();
        assert_eq!(main.uploads, Some(Vec::new()));
    }

    #[test]
    fn test_zero_filename_uses_staging_name() {
        let engine = AesGcmEngine::new();
        let secrets = SecretPair::new("s1", "s2").unwrap();
        let policy = HeaderPolicy::new();
        let builder = EnvelopeBuilder::new(&engine, &secrets, &policy);

        let fields = vec![MultipartField::new("file", "zero").with_filename("0")];
        let built = builder.build_multipart(request(), &Method::POST, &fields).unwrap();

        let content_type = built.request.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        let parts = split_parts(&content_type, built.request.body());
        let main = engine.decrypt(&parts[0].1, &secrets).unwrap();
        let upload = &main.uploads.unwrap()[0];

        assert!(upload.filename.starts_with("upload-"));
        assert!(parts[1].0.contains(&format!("filename=\"{}\"", upload.filename)));
    }

    #[test]
    fn test_files_visible_headers_merge_into_part() {
        let engine = AesGcmEngine::new();
        let secrets = SecretPair::new("s1", "s2").unwrap();
        let policy = HeaderPolicy::new();
        let builder = EnvelopeBuilder::new(&engine, &secrets, &policy).files_visible_headers(true);

        let fields = vec![MultipartField::new("doc", "{}")
            .with_filename("doc.json")
            .with_header("X-Checksum", "abc")
            .with_header("Content-Type", "text/plain")];
        let built = builder.build_multipart(request(), &Method::POST, &fields).unwrap();

        let content_type = built.request.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        let parts = split_parts(&content_type, built.request.body());
        assert!(parts[1].0.contains("X-Checksum: abc"));
        assert!(parts[1].0.contains("Content-Type: application/json"));
        assert!(!parts[1].0.contains("Content-Type: text/plain"));
    }

    #[test]
    fn test_unnamed_file_entry_is_malformed() {
        let engine = AesGcmEngine::new();
        let secrets = SecretPair::new("s1", "s2").unwrap();
        let policy = HeaderPolicy::new();
        let builder = EnvelopeBuilder::new(&engine, &secrets, &policy);

        let mut field = MultipartField::new("x", "y");
        field.name = None;
        let err = builder.build_multipart(request(), &Method::POST, &[field]).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration(ConfigurationError::MalformedMultipartField(_))
        ));
    }

    #[test]
    fn test_file_header_name_must_be_a_token() {
        let engine = AesGcmEngine::new();
        let secrets = SecretPair::new("s1", "s2").unwrap();
        let policy = HeaderPolicy::new();
        let builder = EnvelopeBuilder::new(&engine, &secrets, &policy).files_visible_headers(true);

        for bad in ["X-Evil\r\nContent-Type", "x:y", ""] {
            let fields = vec![MultipartField::new("doc", "x")
                .with_filename("doc.txt")
                .with_header(bad, "v")];
            let err = builder.build_multipart(request(), &Method::POST, &fields).unwrap_err();
            assert!(matches!(
                err,
                Error::Configuration(ConfigurationError::MalformedMultipartField(_))
            ));
        }
    }
}
