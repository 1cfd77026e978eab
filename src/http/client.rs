//! Typed client over the encrypted pipeline.
//!
//! # Responsibilities
//! - Resolve request targets against the configured base URL
//! - Prepare the main body and standard headers before sealing
//! - Follow decrypted redirects through the pipeline
//!
//! # Redirects
//! ```text
//! 303, or 301/302 for non-GET/HEAD → GET, body dropped
//! 307/308                          → same method, same options
//! 301/302 for GET/HEAD             → same method
//! ```
//! Follow-ups never re-apply a one-shot spoofed method.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION, USER_AGENT};
use http::{Method, Request, Response, StatusCode, Uri};
use tower::{BoxError, Layer, Service};
use url::Url;

use crate::config::{ClientConfig, RedirectConfig};
use crate::crypto::{AesGcmEngine, CryptoEngine};
use crate::error::{ConfigurationError, Error, Result};
use crate::http::middleware::{EncryptedApiLayer, EncryptedApiMiddleware};
use crate::http::request::{prepare_body, RequestOptions};
use crate::http::transport::ReqwestTransport;

pub struct EncryptedApiClient<S = ReqwestTransport> {
    middleware: EncryptedApiMiddleware<S>,
    base_url: Option<Url>,
    user_agent: HeaderValue,
    redirects: RedirectConfig,
}

impl EncryptedApiClient<ReqwestTransport> {
    /// Client over reqwest with the reference crypto engine.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let transport =
            ReqwestTransport::from_config(&config.transport).map_err(|e| Error::Transport(Box::new(e)))?;
        Self::with_transport(transport, Arc::new(AesGcmEngine::new()), config)
    }
}

impl<S> EncryptedApiClient<S> {
    pub fn middleware(&self) -> &EncryptedApiMiddleware<S> {
        &self.middleware
    }

    pub fn middleware_mut(&mut self) -> &mut EncryptedApiMiddleware<S> {
        &mut self.middleware
    }

    pub fn is_request_completed(&self) -> bool {
        self.middleware.is_request_completed()
    }

    pub fn last_request(&self) -> Result<&Request<Bytes>> {
        self.middleware.last_request()
    }

    pub fn last_raw_response(&self) -> Result<&Response<Bytes>> {
        self.middleware.last_raw_response()
    }

    pub fn last_response(&self) -> Result<&Response<Bytes>> {
        self.middleware.last_response()
    }

    fn resolve(&self, target: &str) -> Result<Url> {
        let resolved = match &self.base_url {
            Some(base) => base.join(target),
            None => Url::parse(target),
        };
        resolved.map_err(|e| ConfigurationError::InvalidUri(format!("{}: {}", target, e)).into())
    }

    /// Plain request with body, standard headers and caller headers.
    fn build_request(&self, method: &Method, target: &Url, options: &RequestOptions) -> Result<(Request<Bytes>, RequestOptions)> {
        let prepared = prepare_body(options)?;

        let mut target = target.clone();
        target.set_fragment(None);
        let uri: Uri = target
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| ConfigurationError::InvalidUri(e.to_string()))?;

        let mut request = Request::new(prepared.body.clone());
        *request.method_mut() = method.clone();
        *request.uri_mut() = uri;

        let headers = request.headers_mut();
        headers.insert(HOST, host_header(&target)?);
        headers.insert(USER_AGENT, self.user_agent.clone());

        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConfigurationError::InvalidHeader(format!("{}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ConfigurationError::InvalidHeader(format!("{}: {}", name, e)))?;
            if name == HOST || name == USER_AGENT {
                headers.insert(name, value);
            } else {
                headers.append(name, value);
            }
        }

        if let Some(content_type) = prepared.content_type {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }
        if !prepared.body.is_empty() {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(prepared.body.len()));
        }

        Ok((request, options.for_pipeline(prepared.files)))
    }
}

impl<S> EncryptedApiClient<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>>,
    S::Error: Into<BoxError>,
{
    pub fn with_transport(transport: S, engine: Arc<dyn CryptoEngine>, config: &ClientConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| ConfigurationError::InvalidUri(e.to_string()))?;
        let user_agent = HeaderValue::from_str(&config.transport.user_agent)
            .map_err(|e| ConfigurationError::InvalidHeader(format!("user agent: {}", e)))?;

        Ok(Self {
            middleware: EncryptedApiLayer::new(engine, config.encrypted_api.clone()).layer(transport),
            base_url,
            user_agent,
            redirects: config.redirects.clone(),
        })
    }

    pub async fn get(&mut self, target: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::GET, target, options).await
    }

    pub async fn head(&mut self, target: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::HEAD, target, options).await
    }

    pub async fn post(&mut self, target: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::POST, target, options).await
    }

    pub async fn put(&mut self, target: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::PUT, target, options).await
    }

    pub async fn patch(&mut self, target: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::PATCH, target, options).await
    }

    pub async fn delete(&mut self, target: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::DELETE, target, options).await
    }

    pub async fn options(&mut self, target: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::OPTIONS, target, options).await
    }

    /// Send one logical request, following decrypted redirects.
    pub async fn request(&mut self, method: Method, target: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        let mut url = self.resolve(target)?;
        let mut method = method;
        let mut options = options;
        let mut followed = 0u32;

        loop {
            let (request, pipeline_options) = self.build_request(&method, &url, &options)?;
            let response = self.middleware.call(request, &pipeline_options).await?;

            if !self.redirects.enabled || !response.status().is_redirection() {
                return Ok(response);
            }
            let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) else {
                return Ok(response);
            };
            if followed >= self.redirects.max {
                return Err(Error::TooManyRedirects(self.redirects.max));
            }
            followed += 1;

            let next = url
                .join(location)
                .map_err(|e| ConfigurationError::InvalidUri(format!("{}: {}", location, e)))?;
            tracing::debug!(
                status = %response.status(),
                from = %url,
                to = %next,
                redirect = followed,
                "Following encrypted redirect"
            );

            (method, options) = follow_up(response.status(), method, options);
            url = next;
        }
    }
}

fn follow_up(status: StatusCode, method: Method, options: RequestOptions) -> (Method, RequestOptions) {
    let mut options = options;
    options.spoofed_method = None;

    let keeps_method = match status {
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => true,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => method == Method::GET || method == Method::HEAD,
        _ => false,
    };

    if keeps_method {
        (method, options)
    } else {
        (Method::GET, options.without_body())
    }
}

fn host_header(url: &Url) -> Result<HeaderValue> {
    let host = url
        .host_str()
        .ok_or_else(|| ConfigurationError::InvalidUri(format!("{} has no host", url)))?;
    let value = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).map_err(|e| ConfigurationError::InvalidHeader(e.to_string()).into())
}
