// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use crate::event::Event;

/// Why a batch could not be delivered.
///
/// The store treats every variant the same way: the batch is dropped and the
/// error is logged.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SendError {
    #[error("Failed to prepare payload: {0}")]
    Payload(String),

    #[error("Destination rejected batch (status {status:?}): {message}")]
    Destination {
        status: Option<u16>,
        message: String,
    },

    #[error("Sender unavailable: {0}")]
    Unavailable(String),
}

/// Transmits a batch of events to wherever they are ingested.
///
/// Implementations own their retry policy and only report a failure once it
/// is exhausted. The store calls `send` from its dispatcher thread and, during
/// a synchronous flush or close, from the flushing caller's thread, but never
/// from two threads at once.
pub trait LogSender: Send + Sync {
    fn send(&self, batch: &[Event]) -> Result<(), SendError>;
}

impl<S: LogSender + ?Sized> LogSender for Arc<S> {
    fn send(&self, batch: &[Event]) -> Result<(), SendError> {
        (**self).send(batch)
    }
}

impl<S: LogSender + ?Sized> LogSender for Box<S> {
    fn send(&self, batch: &[Event]) -> Result<(), SendError> {
        (**self).send(batch)
    }
}
