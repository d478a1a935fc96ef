// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use std::time::Duration;

use tokio::io::BufReader;
use tracing::{debug, error, info, warn};

use edge_log::{logger, Config, EdgeLog, CLIENT_VERSION};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Parses `key:value` pairs separated by commas, skipping malformed entries.
fn parse_tags(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once(':')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("EDGE_LOG_DIAG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    logger::init(&log_level);
    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on edge log pipe startup: {e}");
            return;
        }
    };

    let client = match EdgeLog::start(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Error starting edge log client: {e}");
            return;
        }
    };
    client.install_panic_hook();

    if let Ok(tags) = env::var("EDGE_LOG_TAGS") {
        client.global(parse_tags(&tags));
    }
    info!("edge-log-pipe {CLIENT_VERSION}: forwarding stdin");

    match client.forward_lines(BufReader::new(tokio::io::stdin())).await {
        Ok(lines) => debug!("Forwarded {lines} lines"),
        Err(e) => error!("Error reading stdin: {e}"),
    }

    if !client.flush_timeout(FLUSH_TIMEOUT).await {
        warn!(
            "Timed out flushing, {} log lines undelivered",
            client.pending()
        );
    }
    client.shutdown();
}
