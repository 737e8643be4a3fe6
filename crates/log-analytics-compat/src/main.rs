// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};

use log_analytics_listener::{
    config::{FLUSH_INTERVAL_MS_KEY, FLUSH_THRESHOLD_KEY},
    hooks::{install_panic_hook, on_process_exit, shutdown_signal},
    logger::{init_logging, log_level_from_env},
    ListenerOptions, Severity, TraceListener,
};

const SOURCE: &str = "log-analytics-compat";

#[tokio::main]
pub async fn main() {
    let log_level = log_level_from_env();
    if let Err(e) = init_logging(&log_level) {
        eprintln!("LA | ERROR | {SOURCE} | {e}");
    }
    debug!("Logging subsystem enabled");

    let mut options = ListenerOptions::default();
    for key in [FLUSH_INTERVAL_MS_KEY, FLUSH_THRESHOLD_KEY] {
        if let Ok(value) = env::var(format!("LA_{key}")) {
            options = options.with_attribute(key, value);
        }
    }

    let listener = Arc::new(TraceListener::new(options));
    install_panic_hook(Arc::clone(&listener));

    let startup = Arc::clone(&listener);
    let enabled = match tokio::task::spawn_blocking(move || {
        startup.trace_event(Some(SOURCE), Severity::Start, 0, Some("Main starts."));
        startup.is_enabled()
    })
    .await
    {
        Ok(enabled) => enabled,
        Err(e) => {
            error!("Listener startup task failed: {e}");
            false
        }
    };
    if !enabled {
        info!("Trace listener is disabled, stdin lines are not forwarded");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => forward(&listener, &line),
                Ok(None) => {
                    debug!("Reached end of input");
                    break;
                }
                Err(e) => {
                    error!("Failed to read input: {e}");
                    break;
                }
            },
        }
    }

    let exiting = Arc::clone(&listener);
    if let Err(e) = tokio::task::spawn_blocking(move || on_process_exit(&exiting)).await {
        error!("Failed to close trace listener: {e}");
    }
}

/// Maps a leading `error:`/`warning:`/`info:` marker to a severity; anything
/// else goes through as a plain line.
fn forward(listener: &TraceListener, line: &str) {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    match trimmed.split_once(':') {
        Some((marker, rest)) => match marker.trim().parse::<Severity>() {
            Ok(severity) => listener.trace_event(Some(SOURCE), severity, 0, Some(rest.trim())),
            Err(_) => listener.write_line(trimmed),
        },
        None => listener.write_line(trimmed),
    }
}
