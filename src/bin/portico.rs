// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal CLI wrapper so the library can run as a stand-alone proxy.
//!
//! Build it with `cargo build --release --bin portico`.
//! The binary honours PORTICO_CONFIG_FILE, then a positional argument,
//! then falls back to /etc/portico/config.toml.

use std::env;
use std::error::Error;

use log::{error, info};
use portico::Portico;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    println!("Starting Portico");

    let config_path = env::var("PORTICO_CONFIG_FILE")
        .ok()
        .or_else(|| env::args().nth(1))
        .unwrap_or_else(|| "/etc/portico/config.toml".to_string());

    if !std::path::Path::new(&config_path).exists() {
        println!("Configuration file {config_path} does not exist.");
        return Err(Box::from("No configuration file found."));
    }
    println!("Using configuration from {config_path}");

    let proxy = match Portico::loader()
        .with_config_file(&config_path)
        .with_env_overrides()
        .build()
    {
        Ok(p) => p,
        Err(e) => {
            println!("Failed to build proxy: {e}");
            return Err(e.into());
        }
    };

    match proxy.start().await {
        Ok(_) => {
            info!("Proxy server stopped gracefully");
        }
        Err(e) => {
            error!("Proxy server failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
