//! Encrypted API pipeline stage.
//!
//! Wraps a transport service: every call is sealed into an envelope on the
//! way out and validated on the way back.
//!
//! # Stages
//! ```text
//! Idle → Building → Sent → Validating → Completed
//!            │         │         │
//!            └─────────┴─────────┴──→ Failed
//! ```
//!
//! # Design Decisions
//! - `call` takes `&mut self`; one request is in flight per instance
//! - The completion flag and stored messages are reset at the start of
//!   every call
//! - Per-call options extend the instance defaults and never mutate them

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{Request, Response};
use tower::{BoxError, Layer, Service, ServiceExt};

use crate::config::EncryptedApiConfig;
use crate::crypto::{CryptoEngine, SecretPair};
use crate::envelope::{BuiltRequest, EnvelopeBuilder};
use crate::error::{ConfigurationError, Error, Result};
use crate::http::request::RequestOptions;
use crate::http::response;
use crate::observability::metrics;
use crate::security::{HeaderPolicy, MethodSpoofing, SpoofingState};

/// Where the current (or last) call is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    #[default]
    Idle,
    Building,
    Sent,
    Validating,
    Completed,
    Failed,
}

#[derive(Debug, Default)]
struct PipelineState {
    stage: Stage,
    completed: bool,
    last_request: Option<Request<Bytes>>,
    last_raw_response: Option<Response<Bytes>>,
    last_response: Option<Response<Bytes>>,
}

impl PipelineState {
    fn reset(&mut self) {
        *self = Self {
            stage: Stage::Building,
            ..Self::default()
        };
    }
}

/// Envelope pipeline around a transport service `S`.
pub struct EncryptedApiMiddleware<S> {
    inner: S,
    engine: Arc<dyn CryptoEngine>,
    defaults: EncryptedApiConfig,
    spoofing: MethodSpoofing,
    state: PipelineState,
}

impl<S> std::fmt::Debug for EncryptedApiMiddleware<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedApiMiddleware")
            .field("spoofing", &self.spoofing)
            .field("stage", &self.state.stage)
            .field("completed", &self.state.completed)
            .finish_non_exhaustive()
    }
}

impl<S> EncryptedApiMiddleware<S> {
    pub fn new(inner: S, engine: Arc<dyn CryptoEngine>, defaults: EncryptedApiConfig) -> Self {
        Self {
            inner,
            engine,
            defaults,
            spoofing: MethodSpoofing::new(),
            state: PipelineState::default(),
        }
    }

    pub fn defaults(&self) -> &EncryptedApiConfig {
        &self.defaults
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn is_request_completed(&self) -> bool {
        self.state.completed
    }

    pub fn spoofing_state(&self) -> &SpoofingState {
        self.spoofing.state()
    }

    /// Sign `method` on the next call regardless of the plain request's method.
    pub fn override_method_once(&mut self, method: &str) -> Result<()> {
        self.spoofing
            .override_once(method)
            .map_err(|e| ConfigurationError::InvalidHeader(format!("spoofed method {:?}: {}", method, e)))?;
        Ok(())
    }

    /// Sealed request as handed to the transport.
    pub fn last_request(&self) -> Result<&Request<Bytes>> {
        self.completed()?.last_request.as_ref().ok_or(Error::Logic)
    }

    /// Encrypted response as returned by the transport.
    pub fn last_raw_response(&self) -> Result<&Response<Bytes>> {
        self.completed()?.last_raw_response.as_ref().ok_or(Error::Logic)
    }

    /// Decrypted response.
    pub fn last_response(&self) -> Result<&Response<Bytes>> {
        self.completed()?.last_response.as_ref().ok_or(Error::Logic)
    }

    /// Raw response of the current call, even if validation failed.
    pub fn partial_raw_response(&self) -> Option<&Response<Bytes>> {
        self.state.last_raw_response.as_ref()
    }

    fn completed(&self) -> Result<&PipelineState> {
        if self.state.completed {
            Ok(&self.state)
        } else {
            Err(Error::Logic)
        }
    }

    fn resolve_secrets(&self, options: &RequestOptions) -> Result<SecretPair> {
        if let Some(secrets) = &options.secrets {
            return Ok(secrets.clone());
        }
        SecretPair::from_parts(self.defaults.secret1.as_deref(), self.defaults.secret2.as_deref())
            .ok_or_else(|| ConfigurationError::MissingSecrets.into())
    }

    fn resolve_policy(&self, options: &RequestOptions) -> Result<HeaderPolicy> {
        let visible = self.defaults.visible_headers.iter().chain(&options.visible_headers);
        let unmanaged = self.defaults.unmanaged_headers.iter().chain(&options.unmanaged_headers);
        Ok(HeaderPolicy::with_extensions(visible, unmanaged)?)
    }
}

impl<S> EncryptedApiMiddleware<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>>,
    S::Error: Into<BoxError>,
{
    /// Seal `request`, send it through the transport and decode the answer.
    ///
    /// `options` only carries envelope settings here; body preparation
    /// happens before the pipeline.
    pub async fn call(&mut self, request: Request<Bytes>, options: &RequestOptions) -> Result<Response<Bytes>> {
        let started = Instant::now();
        let method = request.method().to_string();

        let result = self.run(request, options).await;

        metrics::record_request(&method, metrics::outcome(&result), started);
        if let Err(error) = &result {
            if !self.state.completed {
                self.state.stage = Stage::Failed;
            }
            tracing::warn!(method = %method, error = %error, stage = ?self.state.stage, "Encrypted API call failed");
        }
        result
    }

    async fn run(&mut self, mut request: Request<Bytes>, options: &RequestOptions) -> Result<Response<Bytes>> {
        self.state.reset();

        if options.form_params.is_some() && options.multipart.is_some() {
            return Err(ConfigurationError::AmbiguousBody.into());
        }
        let secrets = self.resolve_secrets(options)?;
        let policy = self.resolve_policy(options)?;

        if let Some(method) = &options.spoofed_method {
            self.override_method_once(method)?;
        }
        let automatic = options
            .automatic_method_spoofing
            .unwrap_or(self.defaults.automatic_method_spoofing);
        let decision = self.spoofing.decide(request.method(), automatic);
        *request.method_mut() = decision.wire_method.clone();
        decision.apply_header(request.headers_mut());

        let builder = EnvelopeBuilder::new(self.engine.as_ref(), &secrets, &policy)
            .files_visible_headers(
                options
                    .files_visible_headers
                    .unwrap_or(self.defaults.files_visible_headers),
            )
            .expect_continue_threshold(self.defaults.expect_continue_threshold);

        let BuiltRequest { request, id } = match &options.multipart {
            Some(fields) => builder.build_multipart(request, &decision.signed_method, fields)?,
            None => builder.build_json(request, &decision.signed_method)?,
        };

        tracing::debug!(
            id = %id,
            wire_method = %decision.wire_method,
            signed_method = %decision.signed_method,
            uri = %request.uri(),
            "Sending encrypted request"
        );
        self.state.last_request = Some(snapshot_request(&request));
        self.state.stage = Stage::Sent;

        let raw = self
            .inner
            .ready()
            .await
            .map_err(|e| Error::Transport(e.into()))?
            .call(request)
            .await
            .map_err(|e| Error::Transport(e.into()))?;

        self.state.stage = Stage::Validating;
        self.state.last_raw_response = Some(response::snapshot(&raw));

        let envelope = response::open_envelope(self.engine.as_ref(), &secrets, &raw)?;
        let decoded = response::rebuild_response(&raw, &envelope)?;

        self.spoofing.observe_response(decoded.status(), decoded.headers());
        self.state.last_response = Some(response::snapshot(&decoded));
        self.state.completed = true;
        self.state.stage = Stage::Completed;

        response::check_correlation(&id, &envelope)?;

        tracing::debug!(id = %id, status = %decoded.status(), "Encrypted response validated");
        Ok(decoded)
    }
}

fn snapshot_request(request: &Request<Bytes>) -> Request<Bytes> {
    let mut copy = Request::new(request.body().clone());
    *copy.method_mut() = request.method().clone();
    *copy.uri_mut() = request.uri().clone();
    *copy.version_mut() = request.version();
    *copy.headers_mut() = request.headers().clone();
    copy
}

/// `tower::Layer` that wraps a transport in the encrypted pipeline.
#[derive(Clone)]
pub struct EncryptedApiLayer {
    engine: Arc<dyn CryptoEngine>,
    defaults: EncryptedApiConfig,
}

impl EncryptedApiLayer {
    pub fn new(engine: Arc<dyn CryptoEngine>, defaults: EncryptedApiConfig) -> Self {
        Self { engine, defaults }
    }
}

impl<S> Layer<S> for EncryptedApiLayer {
    type Service = EncryptedApiMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        EncryptedApiMiddleware::new(inner, Arc::clone(&self.engine), self.defaults.clone())
    }
}
