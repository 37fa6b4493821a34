// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration error types.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// All of these are startup-time failures: a proxy with a bad
/// configuration must not start.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failure reading the configuration file
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// File extension is not a supported format
    #[error("unsupported configuration file format: '{0}'")]
    UnsupportedFormat(String),

    /// Content could not be parsed or deserialized
    #[error("parse error: {0}")]
    ParseError(String),

    /// Content parsed but failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
