// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging setup.
//!
//! Process-level logging goes through the `log` facade backed by
//! `env_logger`.  Per-request observability (bodies, errors) is the
//! hook contract on the forwarder, not the logger.


use std::sync::Once;

use log::info;

static INIT: Once = Once::new();

/// Initialize logging once for the process.
///
/// `RUST_LOG` wins when set; `default_level` applies otherwise.
/// Subsequent calls are no-ops, so tests and embedding applications can
/// call this freely.
pub fn init(default_level: &str) {
    let env = env_logger::Env::default().filter_or("RUST_LOG", default_level);

    INIT.call_once(|| {
        env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_target(true)
            .init();

        info!("Logging initialized at level: {}", log::max_level());
    });
}

/// Log an error with context and hand it back, for use inside `map_err`
/// chains.
pub fn log_error<E: std::fmt::Display>(context: &str, err: E) -> E {
    log::error!("[{}] {}", context, err);
    err
}
