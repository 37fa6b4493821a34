// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::core::{CorrelationIdSource, Hooks, HttpMethod, ProxyRequest};
use crate::response::ResponseWriter;
use crate::router::{RouteRule, Router};

/// Captures every hook invocation together with its correlation ID.
#[derive(Clone, Default)]
struct Recorder {
    errors: Arc<Mutex<Vec<(String, String)>>>,
    request_bodies: Arc<Mutex<Vec<(Vec<u8>, String)>>>,
    response_bodies: Arc<Mutex<Vec<(Vec<u8>, String)>>>,
}

impl Recorder {
    fn hooks(&self) -> Hooks {
        let errors = self.errors.clone();
        let request_bodies = self.request_bodies.clone();
        let response_bodies = self.response_bodies.clone();

        Hooks::new()
            .on_error(move |err, id| {
                errors.lock().unwrap().push((err.to_string(), id.to_string()));
            })
            .on_request_body(move |body, id| {
                request_bodies
                    .lock()
                    .unwrap()
                    .push((body.to_vec(), id.to_string()));
            })
            .on_response_body(move |body, id| {
                response_bodies
                    .lock()
                    .unwrap()
                    .push((body.to_vec(), id.to_string()));
            })
    }

    fn is_untouched(&self) -> bool {
        self.errors.lock().unwrap().is_empty()
            && self.request_bodies.lock().unwrap().is_empty()
            && self.response_bodies.lock().unwrap().is_empty()
    }
}

#[derive(Debug, Default)]
struct SequentialIdSource(AtomicUsize);

impl CorrelationIdSource for SequentialIdSource {
    fn next_id(&self) -> String {
        format!("corr-{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

#[derive(Debug)]
struct FailingWriter;

impl ResponseWriter for FailingWriter {
    fn write_json(
        &self,
        _status: u16,
        _payload: &serde_json::Value,
    ) -> Result<(ProxyResponse, Bytes), ProxyError> {
        Err(ProxyError::ResponseError("writer broken".into()))
    }
}

fn request(http_method: HttpMethod, req_path: &str, query: Option<&str>, body: &[u8]) -> ProxyRequest {
    ProxyRequest {
        method: http_method,
        path: req_path.to_string(),
        query: query.map(|q| q.to_string()),
        headers: reqwest::header::HeaderMap::new(),
        body: Bytes::copy_from_slice(body),
    }
}

fn forwarder(rules: Vec<RouteRule>, upstream: impl Into<String>, hooks: Hooks) -> ProxyForwarder {
    let router = Arc::new(Router::new(rules).unwrap());
    ProxyForwarder::new(router, upstream, reqwest::Client::new()).with_hooks(hooks)
}

fn gzip(plain: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plain).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn forwards_allowed_request_and_fires_hooks() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/transfers"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-upstream", "yes")
                .set_body_string("created"),
        )
        .mount(&upstream)
        .await;

    let recorder = Recorder::default();
    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Post, "/api/transfers", false)],
        upstream.uri(),
        recorder.hooks(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Post, "/api/transfers", None, b"payload"))
        .await;

    assert_eq!(response.status, 201);
    assert_eq!(&response.body[..], b"created");
    assert_eq!(response.headers.get("x-upstream").unwrap(), "yes");

    assert!(recorder.errors.lock().unwrap().is_empty());

    let request_bodies = recorder.request_bodies.lock().unwrap();
    assert_eq!(request_bodies.len(), 1);
    assert_eq!(request_bodies[0].0, b"payload");

    let response_bodies = recorder.response_bodies.lock().unwrap();
    assert_eq!(response_bodies.len(), 1);
    assert_eq!(response_bodies[0].0, b"created");

    // Both hooks carry the same correlation ID for one exchange.
    assert_eq!(request_bodies[0].1, response_bodies[0].1);
}

#[tokio::test]
async fn query_string_is_appended_verbatim_to_the_upstream_url() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("page two"))
        .mount(&upstream)
        .await;

    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        upstream.uri(),
        Hooks::new(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", Some("page=2"), b""))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"page two");
}

#[tokio::test]
async fn unregistered_route_gets_401_envelope() {
    let recorder = Recorder::default();
    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        "http://127.0.0.1:9",
        recorder.hooks(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Post, "/api/secret", None, b""))
        .await;

    assert_eq!(response.status, 401);
    assert_eq!(&response.body[..], br#"{"message":"unauthorized call"}"#);
    assert_eq!(
        response.headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
        "application/json"
    );

    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.contains("path is not allowed: /api/secret"));

    // The hook sees the bytes actually written to the caller.
    let response_bodies = recorder.response_bodies.lock().unwrap();
    assert_eq!(response_bodies.len(), 1);
    assert_eq!(response_bodies[0].0, br#"{"message":"unauthorized call"}"#);
    assert_eq!(response_bodies[0].1, errors[0].1);
}

#[tokio::test]
async fn ignored_path_returns_empty_200_without_hooks() {
    let recorder = Recorder::default();
    let forwarder = forwarder(Vec::new(), "http://127.0.0.1:9", recorder.hooks())
        .with_ignored_paths(["/healthz"]);

    for http_method in [HttpMethod::Get, HttpMethod::Post, HttpMethod::Delete] {
        let response = forwarder
            .forward(request(http_method, "/healthz", None, b""))
            .await;
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    assert!(recorder.is_untouched());
}

#[tokio::test]
async fn repeated_upstream_headers_are_all_preserved() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "a=1")
                .append_header("set-cookie", "b=2")
                .set_body_string("ok"),
        )
        .mount(&upstream)
        .await;

    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        upstream.uri(),
        Hooks::new(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", None, b""))
        .await;

    let cookies: Vec<_> = response.headers.get_all("set-cookie").iter().collect();
    assert_eq!(cookies.len(), 2);
    assert_eq!(cookies[0], "a=1");
    assert_eq!(cookies[1], "b=2");
}

#[tokio::test]
async fn non_200_status_and_body_pass_through_together() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(ResponseTemplate::new(418).set_body_string("teapot"))
        .mount(&upstream)
        .await;

    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        upstream.uri(),
        Hooks::new(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", None, b""))
        .await;

    assert_eq!(response.status, 418);
    assert_eq!(&response.body[..], b"teapot");
}

#[tokio::test]
async fn gzip_body_passes_through_compressed_while_hook_sees_plaintext() {
    let plain = b"hello plaintext body";
    let compressed = gzip(plain);

    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(compressed.clone()),
        )
        .mount(&upstream)
        .await;

    let recorder = Recorder::default();
    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        upstream.uri(),
        recorder.hooks(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", None, b""))
        .await;

    // The caller receives exactly what the upstream sent.
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], &compressed[..]);

    // The hook receives the decompressed copy.
    let response_bodies = recorder.response_bodies.lock().unwrap();
    assert_eq!(response_bodies.len(), 1);
    assert_eq!(response_bodies[0].0, plain);

    assert!(recorder.errors.lock().unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_gzip_reports_error_without_retracting_the_response() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(b"definitely not gzip".to_vec()),
        )
        .mount(&upstream)
        .await;

    let recorder = Recorder::default();
    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        upstream.uri(),
        recorder.hooks(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", None, b""))
        .await;

    // The upstream bytes still reach the caller unchanged.
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"definitely not gzip");

    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.contains("gzip"));
}

#[tokio::test]
async fn unreachable_upstream_maps_to_500_envelope() {
    let recorder = Recorder::default();
    // Nothing listens on port 9.
    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        "http://127.0.0.1:9",
        recorder.hooks(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", None, b""))
        .await;

    assert_eq!(response.status, 500);
    assert_eq!(&response.body[..], br#"{"message":"internal error"}"#);

    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.contains("error executing http request"));

    let response_bodies = recorder.response_bodies.lock().unwrap();
    assert_eq!(response_bodies.len(), 1);
    assert_eq!(response_bodies[0].0, br#"{"message":"internal error"}"#);
}

#[tokio::test]
async fn unparseable_upstream_url_maps_to_500_envelope() {
    let recorder = Recorder::default();
    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        "not a base url",
        recorder.hooks(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", None, b""))
        .await;

    assert_eq!(response.status, 500);
    assert_eq!(&response.body[..], br#"{"message":"internal error"}"#);

    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.contains("unable to parse URL"));
}

#[test]
fn inexpressible_method_is_rejected_with_401() {
    let recorder = Recorder::default();
    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        "http://127.0.0.1:9",
        recorder.hooks(),
    );

    let propfind = reqwest::Method::from_bytes(b"PROPFIND").unwrap();
    let err = HttpMethod::try_from(&propfind).unwrap_err();
    let response = forwarder.reject_unsupported(err);

    assert_eq!(response.status, 401);
    assert_eq!(&response.body[..], br#"{"message":"unauthorized call"}"#);

    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.contains("PROPFIND"));

    let response_bodies = recorder.response_bodies.lock().unwrap();
    assert_eq!(response_bodies.len(), 1);
    assert_eq!(response_bodies[0].0, br#"{"message":"unauthorized call"}"#);
}

#[tokio::test]
async fn secondary_write_failure_is_reported_and_swallowed() {
    let recorder = Recorder::default();
    let forwarder = forwarder(Vec::new(), "http://127.0.0.1:9", recorder.hooks())
        .with_response_writer(Arc::new(FailingWriter));

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/anything", None, b""))
        .await;

    // No envelope could be produced; the status still goes out.
    assert_eq!(response.status, 401);
    assert!(response.body.is_empty());

    let errors = recorder.errors.lock().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].0.contains("path is not allowed"));
    assert!(errors[1].0.contains("write response error"));

    assert!(recorder.response_bodies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn each_exchange_gets_its_own_correlation_id() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&upstream)
        .await;

    let recorder = Recorder::default();
    let forwarder = forwarder(
        vec![RouteRule::new(HttpMethod::Get, "/api/accounts", false)],
        upstream.uri(),
        recorder.hooks(),
    )
    .with_correlation_source(Arc::new(SequentialIdSource::default()));

    forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", None, b""))
        .await;
    forwarder
        .forward(request(HttpMethod::Get, "/api/accounts", None, b""))
        .await;

    let request_bodies = recorder.request_bodies.lock().unwrap();
    let response_bodies = recorder.response_bodies.lock().unwrap();
    assert_eq!(request_bodies[0].1, "corr-0");
    assert_eq!(response_bodies[0].1, "corr-0");
    assert_eq!(request_bodies[1].1, "corr-1");
    assert_eq!(response_bodies[1].1, "corr-1");
}

#[tokio::test]
async fn dynamic_route_allows_forwarding_with_extracted_segment() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/transfers/12345"))
        .respond_with(ResponseTemplate::new(200).set_body_string("transfer 12345"))
        .mount(&upstream)
        .await;

    let forwarder = forwarder(
        vec![RouteRule::new(
            HttpMethod::Get,
            "/api/transfers/{uniqueID}",
            true,
        )],
        upstream.uri(),
        Hooks::new(),
    );

    let response = forwarder
        .forward(request(HttpMethod::Get, "/api/transfers/12345", None, b""))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"transfer 12345");
}
