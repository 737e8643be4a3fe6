// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process lifecycle hooks that keep buffered events from being lost.

use std::panic;
use std::sync::Arc;
use tracing::{error, info};
use trace_event_store::Severity;

use crate::listener::TraceListener;

/// Source recorded on events emitted by the hooks.
pub const HOOK_SOURCE: &str = "log_analytics_listener::hooks";

pub const EXIT_MESSAGE: &str = "Process is exiting.";

/// Records a panic as a warning and drains the listener before handing over
/// to the previously installed hook.
pub fn install_panic_hook(listener: Arc<TraceListener>) {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let message = format!("Caught unhandled panic: {panic_info}");
        error!("{message}");
        listener.record_if_initialized(Some(HOOK_SOURCE), Severity::Warning, message);
        listener.close();
        previous(panic_info);
    }));
}

/// Records the exit event and closes the listener.
pub fn on_process_exit(listener: &TraceListener) {
    info!("{EXIT_MESSAGE}");
    listener.record_if_initialized(
        Some(HOOK_SOURCE),
        Severity::Information,
        EXIT_MESSAGE.to_string(),
    );
    listener.close();
}

/// Resolves once the process is asked to stop: Ctrl-C everywhere, SIGTERM on
/// unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
