// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::thread;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use crate::error::IngestionError;

const RUNTIME_THREAD_NAME: &str = "la-ingestion";

/// Small tokio runtime that drives the HTTP collaborators from synchronous
/// callers.
///
/// Trace calls, the event dispatcher and `close` are all synchronous and may
/// run on plain threads or inside the host's own tokio runtime. [`block_on`]
/// works in both cases, and dropping the runtime never blocks.
///
/// [`block_on`]: IngestionRuntime::block_on
#[derive(Debug)]
pub struct IngestionRuntime {
    runtime: Option<Runtime>,
}

impl IngestionRuntime {
    pub fn new() -> Result<Self, IngestionError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(RUNTIME_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|e| IngestionError::Runtime(format!("failed to build runtime: {e}")))?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Runs `future` to completion on this runtime and returns its output.
    pub fn block_on<F>(&self, future: F) -> Result<F::Output, IngestionError>
    where
        F: Future + Send,
        F::Output: Send,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            return Err(IngestionError::Runtime("runtime is shut down".to_string()));
        };

        if Handle::try_current().is_err() {
            return Ok(runtime.block_on(future));
        }

        // Blocking inside another runtime's worker panics, so hop to a
        // plain thread for the duration of the call.
        thread::scope(|scope| {
            thread::Builder::new()
                .name(RUNTIME_THREAD_NAME.to_string())
                .spawn_scoped(scope, || runtime.block_on(future))
                .map_err(|e| IngestionError::Runtime(format!("failed to spawn thread: {e}")))?
                .join()
                .map_err(|_| IngestionError::Runtime("blocking task panicked".to_string()))
        })
    }
}

impl Drop for IngestionRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!("Shutting down ingestion runtime");
            runtime.shutdown_background();
        }
    }
}
