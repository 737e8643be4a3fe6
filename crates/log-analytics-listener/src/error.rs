// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised by the ingestion collaborators: configuration, instance
/// metadata, credentials and transport.
///
/// None of these reach trace call sites; the listener logs them and either
/// disables itself or drops the affected batch.
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("Incomplete configuration: {0}")]
    IncompleteConfig(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Instance metadata request failed: {0}")]
    Metadata(String),

    #[error("Failed to acquire access token: {0}")]
    Credential(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Store(#[from] trace_event_store::StoreError),
}
