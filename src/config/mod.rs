// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed configuration.
//!
//! A [`ProxyConfig`] is loaded from a JSON, TOML or YAML file (format
//! detected by extension) and optionally overridden from `PORTICO_*`
//! environment variables.  Non-JSON formats funnel through
//! `serde_json::Value` so every format deserializes identically.
//!
//! | key                   | type     | default     | description                    |
//! |-----------------------|----------|-------------|--------------------------------|
//! | `server.host`         | string   | `127.0.0.1` | Address to bind                |
//! | `server.port`         | u16      | `8080`      | Port to listen on              |
//! | `proxy.upstream`      | string   | –           | Upstream base URL              |
//! | `proxy.timeout`       | u64      | `30`        | Upstream client timeout (secs) |
//! | `proxy.ignored_paths` | [string] | `[]`        | Exact paths answered 200/empty |
//! | `routes`              | array    | `[]`        | Route rules                    |
//!
//! Route entries: `{ "method": "GET", "path": "/api/transfers/{id}",
//! "dynamic": true }`.

mod error;


pub use error::ConfigError;

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::HttpMethod;
use crate::server::ServerConfig;

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// JSON format (.json)
    Json,
    /// TOML format (.toml)
    Toml,
    /// YAML format (.yaml, .yml)
    Yaml,
}

impl FileFormat {
    /// Detect the file format from the file extension.
    pub fn from_extension(path: &Path) -> Option<Self> {
        path.extension().and_then(|ext| {
            let ext_str = ext.to_string_lossy().to_lowercase();
            match ext_str.as_str() {
                "json" => Some(FileFormat::Json),
                "toml" => Some(FileFormat::Toml),
                "yaml" | "yml" => Some(FileFormat::Yaml),
                _ => None,
            }
        })
    }
}

/// One configured route rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub method: HttpMethod,
    pub path: String,
    /// Set for paths with `{param}` route parameters.  Query parameters
    /// do not make a path dynamic.
    #[serde(default)]
    pub dynamic: bool,
}

/// Forwarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL requests are forwarded to; the original request-URI is
    /// appended verbatim.
    pub upstream: String,

    /// Upstream client timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Exact-match paths answered with an empty 200, bypassing hooks.
    #[serde(default)]
    pub ignored_paths: Vec<String>,
}

fn default_timeout() -> u64 {
    30
}

/// Complete proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub proxy: UpstreamConfig,

    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl ProxyConfig {
    /// Load configuration from a file, detecting the format from its
    /// extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = FileFormat::from_extension(path).ok_or_else(|| {
            ConfigError::UnsupportedFormat(path.to_string_lossy().into_owned())
        })?;

        let content = fs::read_to_string(path)?;

        let value: serde_json::Value = match format {
            FileFormat::Json => serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(format!("invalid JSON: {e}")))?,
            FileFormat::Toml => {
                let toml_value: toml::Value = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseError(format!("invalid TOML: {e}")))?;
                serde_json::to_value(toml_value)
                    .map_err(|e| ConfigError::ParseError(format!("failed to convert TOML: {e}")))?
            }
            FileFormat::Yaml => {
                let yaml_value: serde_yaml::Value = serde_yaml::from_str(&content)
                    .map_err(|e| ConfigError::ParseError(format!("invalid YAML: {e}")))?;
                serde_json::to_value(yaml_value)
                    .map_err(|e| ConfigError::ParseError(format!("failed to convert YAML: {e}")))?
            }
        };

        let config: ProxyConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(config)
    }

    /// Apply `PORTICO_*` environment overrides on top of the loaded
    /// values.  Scalar settings only; route rules come from the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = env::var("PORTICO_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("PORTICO_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(upstream) = env::var("PORTICO_UPSTREAM") {
            self.proxy.upstream = upstream;
        }
        if let Ok(timeout) = env::var("PORTICO_TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                self.proxy.timeout = timeout;
            }
        }
    }

    /// Startup-time validation: the parts that must be present for the
    /// service to come up at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.upstream.is_empty() {
            return Err(ConfigError::Invalid("proxy.upstream must not be empty".into()));
        }
        if self.proxy.timeout == 0 {
            return Err(ConfigError::Invalid("proxy.timeout must be at least 1 second".into()));
        }
        Ok(())
    }
}
