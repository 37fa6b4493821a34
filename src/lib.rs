// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Portico – a route-table-driven HTTP reverse proxy library.
//!
//! Portico forwards requests to a single configured upstream, gated by a
//! declarative route table: static paths matched exactly, dynamic paths
//! declared with `{name}` placeholders and matched via compiled patterns.
//! A request that no rule allows is answered with a JSON 401 envelope;
//! everything else is relayed byte-for-byte, headers, status and all.
//!
//! # Core pieces
//!
//! - [`Router`] – immutable route table with an exact-match index for
//!   static paths and an ordered scan for dynamic ones (first registered
//!   match wins).
//! - [`ProxyForwarder`] – per-request forwarding pipeline with uniform
//!   error-to-status mapping and gzip-aware body logging.
//! - [`Hooks`] – optional callbacks for errors and request/response
//!   bodies, all correlated by an opaque per-request ID.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use portico::{Hooks, Portico};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hooks = Hooks::new()
//!         .on_error(|err, id| eprintln!("[{id}] {err}"))
//!         .on_response_body(|body, id| {
//!             println!("[{id}] {}", String::from_utf8_lossy(body))
//!         });
//!
//!     let portico = Portico::loader()
//!         .with_config_file("portico.toml")
//!         .with_hooks(hooks)
//!         .build()?;
//!
//!     portico.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Route expressions
//!
//! `{identifier}` denotes a named path parameter matching one or more
//! non-whitespace characters; everything else is a literal.  Example:
//! `/api/transfers/{id}/something/{ref}`.  Parameters cannot contain
//! whitespace, and two parameters must be separated by at least one
//! literal character.

// Module declarations
pub mod config;
pub mod core;
pub mod loader;
pub mod logging;
pub mod proxy;
pub mod response;
pub mod router;
pub mod server;

// Re-export key types at the crate root for convenience
pub use config::{ConfigError, ProxyConfig, RouteConfig, UpstreamConfig};
pub use self::core::{
    BodyHook, CorrelationIdSource, ErrorHook, Hooks, HttpMethod, ProxyError, ProxyRequest,
    ProxyResponse, UuidCorrelationSource,
};
pub use loader::{LoaderError, Portico, PorticoLoader};
pub use proxy::ProxyForwarder;
pub use response::{JsonResponseWriter, ResponseWriter};
pub use router::{RouteMatch, RouteRule, Router, regex_to_route, route_to_regex};
pub use server::{ProxyServer, ServerConfig};
