// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP server hosting the forwarder.
//!
//! The server is a *thin* wrapper around **hyper-util**.  It owns the
//! listening socket and translates between Hyper's body types and the
//! buffered [`ProxyRequest`] / [`ProxyResponse`] values the forwarder
//! uses.
//!
//! **Protocol support**
//! Uses `hyper_util::server::conn::auto::Builder`, so the same
//! connection transparently handles both HTTP/1.1 *and* HTTP/2.
//!
//! Inbound bodies are collected in full before the forwarder runs; the
//! forwarder's hook contract requires replayable bytes, so streaming is
//! out of scope here.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::task::JoinSet;

use crate::core::{HttpMethod, ProxyError, ProxyRequest, ProxyResponse};
use crate::proxy::ProxyForwarder;

#[cfg(unix)]
use tokio::signal::unix::SignalKind;

/// Configuration for the HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// HTTP server dispatching inbound requests to a shared forwarder.
#[derive(Debug, Clone)]
pub struct ProxyServer {
    config: ServerConfig,
    forwarder: Arc<ProxyForwarder>,
}

impl ProxyServer {
    /// Create a new server over the given configuration and forwarder.
    pub fn new(config: ServerConfig, forwarder: Arc<ProxyForwarder>) -> Self {
        Self { config, forwarder }
    }

    /// Run the accept loop until Ctrl-C or SIGTERM, then drain open
    /// connections.
    pub async fn start(&self) -> Result<(), ProxyError> {
        // Resolve through ToSocketAddrs so hostnames like "localhost"
        // work, not just literal IP addresses.
        let listener = tokio::net::TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| {
                ProxyError::Other(format!(
                    "failed to bind {}:{}: {e}",
                    self.config.host, self.config.port
                ))
            })?;
        let addr = listener
            .local_addr()
            .map_err(|e| ProxyError::Other(format!("cannot read bound address: {e}")))?;

        info!("Portico proxy listening on http://{}", addr);

        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let mut term_stream = signal::unix::signal(SignalKind::terminate())
            .map_err(|e| ProxyError::Other(format!("cannot install SIGTERM handler: {e}")))?;

        #[cfg(unix)]
        let sigterm = term_stream.recv();
        #[cfg(not(unix))]
        let sigterm = std::future::pending::<Option<()>>();

        tokio::pin!(ctrl_c);
        tokio::pin!(sigterm);

        let mut join_set = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl-C; initiating shutdown");
                    break;
                }
                _ = &mut sigterm => {
                    info!("Received SIGTERM; initiating shutdown");
                    break;
                }
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, remote_addr)) => {
                            let forwarder = self.forwarder.clone();
                            join_set.spawn(async move {
                                let service = service_fn(move |req: Request<Incoming>| {
                                    debug!("Incoming over {:?}", &req.version());
                                    handle_request(req, forwarder.clone())
                                });
                                let io = TokioIo::new(stream);

                                let builder = {
                                    let mut b = AutoBuilder::new(TokioExecutor::new());
                                    b.http1();
                                    b.http2();
                                    b
                                };

                                if let Err(e) = builder.serve_connection(io, service).await {
                                    let err_str = e.to_string();
                                    if !err_str.contains("connection closed")
                                        && !err_str.contains("connection reset")
                                    {
                                        error!("Connection error from {}: {}", remote_addr, e);
                                    }
                                }
                            });
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
            }
        }

        info!("Shutting down; waiting for {} connection(s)", join_set.len());

        let drain = async {
            while join_set.join_next().await.is_some() {}
        };
        if tokio::time::timeout(Duration::from_secs(30), drain).await.is_err() {
            warn!("Shutdown timed out after 30 seconds; aborting remaining connections");
            join_set.shutdown().await;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Convert a hyper request into a buffered proxy request.
async fn convert_hyper_request(req: Request<Incoming>) -> Result<ProxyRequest, ProxyError> {
    let method = HttpMethod::try_from(req.method())?;
    let uri = req.uri().clone();
    let path = uri.path().to_owned();
    let query = uri.query().map(|q| q.to_owned());
    let headers = req.headers().clone();

    let body = req
        .into_body()
        .collect()
        .await
        .map_err(|e| ProxyError::Other(format!("error reading request body: {e}")))?
        .to_bytes();

    Ok(ProxyRequest {
        method,
        path,
        query,
        headers,
        body,
    })
}

/// Convert a buffered proxy response into a hyper response.
fn convert_proxy_response(resp: ProxyResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(resp.status);
    if let Some(headers) = builder.headers_mut() {
        *headers = resp.headers;
    }

    match builder.body(Full::new(resp.body)) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to build response: {}", e);
            let mut fallback =
                Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}

/// Handle an incoming HTTP request.
async fn handle_request(
    req: Request<Incoming>,
    forwarder: Arc<ProxyForwarder>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    debug!("Received request: {} {}", method, path);

    let response = match convert_hyper_request(req).await {
        Ok(proxy_req) => forwarder.forward(proxy_req).await,
        Err(err @ ProxyError::UnsupportedMethod(_)) => forwarder.reject_unsupported(err),
        Err(e) => forwarder.reject_internal(e),
    };

    debug!("Responding {} for {} {}", response.status, method, path);
    Ok(convert_proxy_response(response))
}
