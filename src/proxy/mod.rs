// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The proxy forwarder.
//!
//! One [`ProxyForwarder::forward`] call handles one inbound request:
//! bypass check, correlation ID, route authorization, upstream forward,
//! response reconstruction, and the observability hooks along the way.
//! Hosting transports dispatch these concurrently; the forwarder holds no
//! locks and shares only the immutable route table, the pooled HTTP
//! client and the hook closures.
//!
//! Bodies are fully buffered rather than streamed.  That is a deliberate
//! memory-for-simplicity trade: the same bytes can be replayed to the
//! upstream and handed to the hooks having been read exactly once, at the
//! cost of ruling out very large payloads.

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use flate2::read::GzDecoder;
use log::{debug, warn};
use reqwest::header::{CONTENT_ENCODING, HeaderMap};
use serde_json::json;

use crate::core::{
    CorrelationIdSource, Hooks, ProxyError, ProxyRequest, ProxyResponse, UuidCorrelationSource,
};
use crate::response::{JsonResponseWriter, ResponseWriter};
use crate::router::Router;

/// Forwards route-approved requests to a single configured upstream.
///
/// The route table and HTTP client are shared references owned by the
/// surrounding process; the client's connection pooling makes it safe and
/// cheap to use from many in-flight requests.
#[derive(Debug, Clone)]
pub struct ProxyForwarder {
    router: Arc<Router>,
    upstream_base_url: String,
    client: reqwest::Client,
    /// Exact-match paths answered with an empty 200, bypassing all hooks.
    ignored_paths: HashSet<String>,
    hooks: Hooks,
    correlation: Arc<dyn CorrelationIdSource>,
    writer: Arc<dyn ResponseWriter>,
}

impl ProxyForwarder {
    /// Create a forwarder over the given route table, upstream base URL
    /// and shared HTTP client.
    pub fn new(router: Arc<Router>, upstream_base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            router,
            upstream_base_url: upstream_base_url.into(),
            client,
            ignored_paths: HashSet::new(),
            hooks: Hooks::new(),
            correlation: Arc::new(UuidCorrelationSource),
            writer: Arc::new(JsonResponseWriter),
        }
    }

    /// Paths answered with an empty 200 without touching hooks or logs.
    /// Intended for health-check noise.
    pub fn with_ignored_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Install observability hooks.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Substitute the correlation-ID source.
    pub fn with_correlation_source(mut self, source: Arc<dyn CorrelationIdSource>) -> Self {
        self.correlation = source;
        self
    }

    /// Substitute the response writer.
    pub fn with_response_writer(mut self, writer: Arc<dyn ResponseWriter>) -> Self {
        self.writer = writer;
        self
    }

    /// Handle one inbound request end to end.
    ///
    /// Never returns an error: every failure is mapped to a response for
    /// the caller and reported through the error hook, leaving the table
    /// and client valid for subsequent requests.
    pub async fn forward(&self, request: ProxyRequest) -> ProxyResponse {
        if self.ignored_paths.contains(&request.path) {
            return ProxyResponse::empty(200);
        }

        let correlation_id = self.correlation.next_id();
        let uri = request.request_uri();

        if !self.router.has_match(request.method, &uri) {
            let err = ProxyError::NotAllowed(uri);
            warn!("[{}] {}", correlation_id, err);
            self.hooks.error(&err, &correlation_id);
            return self.write_error(401, "unauthorized call", &correlation_id);
        }

        match self.forward_upstream(&request, &correlation_id).await {
            Ok(response) => response,
            Err(err) => {
                warn!("[{}] {}", correlation_id, err);
                self.hooks.error(&err, &correlation_id);
                self.write_error(500, "internal error", &correlation_id)
            }
        }
    }

    /// Answer a request whose method the route table cannot express.
    /// No rule can allow such a request, so it takes the same path as an
    /// unmatched route: error hook plus the 401 envelope.
    pub fn reject_unsupported(&self, err: ProxyError) -> ProxyResponse {
        let correlation_id = self.correlation.next_id();
        warn!("[{}] {}", correlation_id, err);
        self.hooks.error(&err, &correlation_id);
        self.write_error(401, "unauthorized call", &correlation_id)
    }

    /// Map a failure that occurred before a request could be assembled
    /// (e.g. the transport failed to read the inbound body) onto the
    /// standard internal-error response.
    pub fn reject_internal(&self, err: ProxyError) -> ProxyResponse {
        let correlation_id = self.correlation.next_id();
        warn!("[{}] {}", correlation_id, err);
        self.hooks.error(&err, &correlation_id);
        self.write_error(500, "internal error", &correlation_id)
    }

    async fn forward_upstream(
        &self,
        request: &ProxyRequest,
        correlation_id: &str,
    ) -> Result<ProxyResponse, ProxyError> {
        let redirect_url = format!("{}{}", self.upstream_base_url, request.request_uri());
        let url = reqwest::Url::parse(&redirect_url).map_err(|e| {
            ProxyError::Other(format!("unable to parse URL '{redirect_url}': {e}"))
        })?;

        self.hooks.request_body(&request.body, correlation_id);

        debug!(
            "[{}] forwarding {} {} to {}",
            correlation_id,
            request.method,
            request.request_uri(),
            url
        );

        let upstream = self
            .client
            .request(request.method.into(), url)
            .headers(request.headers.clone())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| ProxyError::Other(format!("error executing http request: {e}")))?;

        let status = upstream.status().as_u16();
        // HeaderMap keeps every value of a repeated header; the clone
        // carries all of them onto the outbound response.
        let headers = upstream.headers().clone();
        let body = upstream
            .bytes()
            .await
            .map_err(|e| ProxyError::Other(format!("error reading response payload: {e}")))?;

        debug!(
            "[{}] upstream answered {} with {} body bytes",
            correlation_id,
            status,
            body.len()
        );

        let response = ProxyResponse {
            status,
            headers,
            body,
        };

        let mut hook_body = response.body.clone();
        if is_gzip(&response.headers) {
            // The caller receives the compressed bytes unchanged; this
            // copy exists only so the hook sees readable content.
            match gunzip(&response.body) {
                Ok(decompressed) => hook_body = Bytes::from(decompressed),
                Err(err) => {
                    warn!("[{}] {}", correlation_id, err);
                    self.hooks.error(&err, correlation_id);
                    self.write_error(500, "internal error", correlation_id);
                    return Ok(response);
                }
            }
        }

        self.hooks.response_body(&hook_body, correlation_id);
        Ok(response)
    }

    /// The uniform error tail: produce the JSON envelope, report a
    /// secondary write failure through the error hook, and hand the
    /// written bytes to the response-body hook.
    fn write_error(&self, status: u16, message: &str, correlation_id: &str) -> ProxyResponse {
        match self.writer.write_json(status, &json!({ "message": message })) {
            Ok((response, written)) => {
                self.hooks.response_body(&written, correlation_id);
                response
            }
            Err(write_err) => {
                let wrapped =
                    ProxyError::ResponseError(format!("write response error: {write_err}"));
                self.hooks.error(&wrapped, correlation_id);
                ProxyResponse::empty(status)
            }
        }
    }
}

fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("gzip"))
}

fn gunzip(body: &[u8]) -> Result<Vec<u8>, ProxyError> {
    let mut decoder = GzDecoder::new(body);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| ProxyError::Other(format!("error reading from gzip reader: {e}")))?;
    Ok(decompressed)
}
