// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while building an [`EventStore`](crate::store::EventStore).
///
/// These are the only errors the store ever surfaces. Once running, every
/// failure is absorbed and logged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),
}
