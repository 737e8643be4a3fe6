// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace listener that ships trace events to a logs ingestion endpoint
//! authenticated with a managed identity.
//!
//! The listener resolves its delivery settings from attributes, `LA_`
//! environment variables and instance metadata tags, then buffers events in a
//! [`trace_event_store::EventStore`] whose batches are uploaded by an
//! [`IngestionSender`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod credential;
pub mod error;
pub mod hooks;
pub mod http_utils;
pub mod listener;
pub mod logger;
pub mod metadata;
pub mod runtime;
pub mod sender;

pub use config::DeliveryConfig;
pub use error::IngestionError;
pub use listener::{ListenerOptions, TraceListener};
pub use sender::{IngestionSender, RetryPolicy};
pub use trace_event_store::Severity;
