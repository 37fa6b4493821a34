// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core primitives – errors, methods, buffered requests/responses, hooks
//! and the correlation-ID seam.
//!
//! Everything that physically moves through the forwarding pipeline is
//! defined in this module.  No protocol-level logic lives here; that sits
//! in `router` (matching) and `proxy` (forwarding).


use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during proxy operations.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// HTTP client error
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Router / route-table error
    #[error("routing error: {0}")]
    RoutingError(String),

    /// Request rejected because no route rule allows it
    #[error("path is not allowed: {0}")]
    NotAllowed(String),

    /// Request method the route table cannot express
    #[error("unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Failure while producing a response for the caller
    #[error("response error: {0}")]
    ResponseError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<crate::config::ConfigError> for ProxyError {
    fn from(err: crate::config::ConfigError) -> Self {
        ProxyError::ConfigError(err.to_string())
    }
}

/// HTTP methods supported by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Delete => write!(f, "DELETE"),
            HttpMethod::Head => write!(f, "HEAD"),
            HttpMethod::Options => write!(f, "OPTIONS"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Trace => write!(f, "TRACE"),
            HttpMethod::Connect => write!(f, "CONNECT"),
        }
    }
}

impl TryFrom<&reqwest::Method> for HttpMethod {
    type Error = ProxyError;

    /// Extension methods (`PROPFIND`, ...) have no route-table
    /// representation and must be rejected by the caller, never coerced
    /// onto a known method.
    fn try_from(method: &reqwest::Method) -> Result<Self, Self::Error> {
        match method.as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            "PATCH" => Ok(HttpMethod::Patch),
            "TRACE" => Ok(HttpMethod::Trace),
            "CONNECT" => Ok(HttpMethod::Connect),
            other => Err(ProxyError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Trace => reqwest::Method::TRACE,
            HttpMethod::Connect => reqwest::Method::CONNECT,
        }
    }
}

/// An inbound HTTP request with its body fully buffered.
///
/// Buffering is deliberate: the same bytes must be replayable to the
/// upstream and to the request-body hook (see `proxy`).
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Option<String>,
    pub headers: reqwest::header::HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    /// The original request-URI: path plus query, verbatim.
    pub fn request_uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// A fully assembled HTTP response, ready for the transport layer.
///
/// Status, headers and body are fixed together before anything reaches the
/// wire, so no field can be lost to transport write ordering.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: reqwest::header::HeaderMap,
    pub body: Bytes,
}

impl ProxyResponse {
    /// An empty-bodied response with the given status.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: reqwest::header::HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

/// Hook invoked with an internal error and the request's correlation ID.
pub type ErrorHook = Arc<dyn Fn(&ProxyError, &str) + Send + Sync>;

/// Hook invoked with body bytes and the request's correlation ID.
pub type BodyHook = Arc<dyn Fn(&[u8], &str) + Send + Sync>;

/// Optional observation points invoked by the forwarder.
///
/// Every invocation for one HTTP exchange carries the same correlation ID,
/// so hook output from a single exchange can be stitched back together.
/// An absent hook is a no-op, never an error.  Hooks may be called from
/// many request tasks concurrently and must be reentrant.
#[derive(Clone, Default)]
pub struct Hooks {
    on_error: Option<ErrorHook>,
    on_request_body: Option<BodyHook>,
    on_response_body: Option<BodyHook>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for internal errors.
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ProxyError, &str) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }

    /// Register a hook for the buffered inbound request body.
    pub fn on_request_body<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[u8], &str) + Send + Sync + 'static,
    {
        self.on_request_body = Some(Arc::new(hook));
        self
    }

    /// Register a hook for the outgoing response body.
    ///
    /// For gzip-encoded upstream responses this receives the decompressed
    /// copy, not the bytes on the wire.
    pub fn on_response_body<F>(mut self, hook: F) -> Self
    where
        F: Fn(&[u8], &str) + Send + Sync + 'static,
    {
        self.on_response_body = Some(Arc::new(hook));
        self
    }

    pub(crate) fn error(&self, err: &ProxyError, correlation_id: &str) {
        if let Some(hook) = &self.on_error {
            hook(err, correlation_id);
        }
    }

    pub(crate) fn request_body(&self, body: &[u8], correlation_id: &str) {
        if let Some(hook) = &self.on_request_body {
            hook(body, correlation_id);
        }
    }

    pub(crate) fn response_body(&self, body: &[u8], correlation_id: &str) {
        if let Some(hook) = &self.on_response_body {
            hook(body, correlation_id);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_error", &self.on_error.is_some())
            .field("on_request_body", &self.on_request_body.is_some())
            .field("on_response_body", &self.on_response_body.is_some())
            .finish()
    }
}

/// Source of per-request correlation IDs.
///
/// Injected into the forwarder so tests can substitute a deterministic
/// sequence; the default produces opaque unique strings.
pub trait CorrelationIdSource: fmt::Debug + Send + Sync {
    /// Produce a new ID representing one HTTP exchange.
    fn next_id(&self) -> String;
}

/// Default ID source backed by random v4 UUIDs.
#[derive(Debug, Default)]
pub struct UuidCorrelationSource;

impl CorrelationIdSource for UuidCorrelationSource {
    fn next_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}
