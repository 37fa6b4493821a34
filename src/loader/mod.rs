// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry-point – "turn the key and go".
//!
//! The [`PorticoLoader`] consumes configuration, builds the route table,
//! wires the forwarder with its injected collaborators (hooks,
//! correlation source, response writer) and returns a [`Portico`] ready
//! to serve.


use std::sync::Arc;
use std::time::Duration;

use log::info;
use thiserror::Error;

use crate::config::{ConfigError, ProxyConfig};
use crate::core::{CorrelationIdSource, Hooks, ProxyError};
use crate::proxy::ProxyForwarder;
use crate::response::ResponseWriter;
use crate::router::{RouteRule, Router};
use crate::server::ProxyServer;

/// Errors that can occur during Portico initialization.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Proxy error
    #[error("proxy error: {0}")]
    ProxyError(#[from] ProxyError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Builder for initializing and configuring Portico.
#[derive(Debug, Default)]
pub struct PorticoLoader {
    config: Option<ProxyConfig>,
    config_file_path: Option<String>,
    use_env_overrides: bool,
    hooks: Hooks,
    correlation: Option<Arc<dyn CorrelationIdSource>>,
    writer: Option<Arc<dyn ResponseWriter>>,
}

impl PorticoLoader {
    /// Create a new loader with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an already-constructed configuration.
    pub fn with_config(mut self, config: ProxyConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a configuration file to load.
    pub fn with_config_file(mut self, file_path: &str) -> Self {
        self.config_file_path = Some(file_path.to_string());
        self
    }

    /// Apply `PORTICO_*` environment overrides after loading.
    pub fn with_env_overrides(mut self) -> Self {
        self.use_env_overrides = true;
        self
    }

    /// Install observability hooks on the forwarder.
    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Substitute the correlation-ID source.
    pub fn with_correlation_source(mut self, source: Arc<dyn CorrelationIdSource>) -> Self {
        self.correlation = Some(source);
        self
    }

    /// Substitute the response writer.
    pub fn with_response_writer(mut self, writer: Arc<dyn ResponseWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Build and initialize Portico.
    ///
    /// Route-table or configuration problems surface here, before any
    /// socket is bound.
    pub fn build(self) -> Result<Portico, LoaderError> {
        let mut config = match (self.config, self.config_file_path) {
            (Some(config), _) => config,
            (None, Some(path)) => ProxyConfig::from_file(&path)?,
            (None, None) => {
                return Err(LoaderError::Other(
                    "no configuration source provided".to_string(),
                ));
            }
        };

        if self.use_env_overrides {
            config.apply_env_overrides();
        }
        config.validate()?;

        crate::logging::init("info");
        info!("Portico starting up");

        let rules: Vec<RouteRule> = config
            .routes
            .iter()
            .map(|r| RouteRule::new(r.method, &r.path, r.dynamic))
            .collect();
        let router = Arc::new(Router::new(rules)?);

        info!(
            "Route table built with {} rule(s); forwarding to {}",
            router.rules().len(),
            config.proxy.upstream
        );

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.proxy.timeout))
            .build()
            .map_err(|e| crate::logging::log_error("upstream client", ProxyError::ClientError(e)))?;

        let mut forwarder =
            ProxyForwarder::new(router, config.proxy.upstream.clone(), client)
                .with_ignored_paths(config.proxy.ignored_paths.iter().cloned())
                .with_hooks(self.hooks);
        if let Some(source) = self.correlation {
            forwarder = forwarder.with_correlation_source(source);
        }
        if let Some(writer) = self.writer {
            forwarder = forwarder.with_response_writer(writer);
        }

        let server = ProxyServer::new(config.server.clone(), Arc::new(forwarder));

        Ok(Portico { config, server })
    }
}

/// An initialized proxy: configuration plus a ready-to-run server.
#[derive(Debug, Clone)]
pub struct Portico {
    config: ProxyConfig,
    server: ProxyServer,
}

impl Portico {
    /// Create a new loader for initializing Portico.
    pub fn loader() -> PorticoLoader {
        PorticoLoader::new()
    }

    /// Get the configuration.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Start the proxy server.
    pub async fn start(&self) -> Result<(), LoaderError> {
        self.server.start().await.map_err(LoaderError::ProxyError)
    }
}
