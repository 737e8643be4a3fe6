// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process buffering of trace events with batched, asynchronous delivery.
//!
//! Producers hand [`Event`]s to an [`EventStore`] from any thread. The store
//! queues them and a single background dispatcher forwards them in batches to
//! a [`LogSender`], the only network-facing piece. Flushes happen when the
//! queue reaches a threshold, when a warning-or-worse event arrives, on a
//! fixed interval, or on request; closing the store drains it.
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use trace_event_store::{
//!     Event, EventStore, EventStoreConfig, LogSender, ProcessInfo, SendError, Severity,
//! };
//!
//! struct StdoutSender;
//!
//! impl LogSender for StdoutSender {
//!     fn send(&self, batch: &[Event]) -> Result<(), SendError> {
//!         for event in batch {
//!             println!("{} {}", event.severity(), event.content());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let process = Arc::new(ProcessInfo::capture());
//! let store = EventStore::new(Arc::new(StdoutSender), EventStoreConfig::default())
//!     .expect("failed to start event store");
//! store.put(Event::new(Utc::now(), Severity::Information, 0, None, "hello", process));
//! store.close();
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod constants;
pub mod errors;
pub mod event;
pub mod sender;
mod signal;
pub mod store;
mod timer;

pub use constants::BATCH_SIZE;
pub use errors::{ParseError, StoreError};
pub use event::{Event, ProcessInfo, Severity};
pub use sender::{LogSender, SendError};
pub use store::{EventStore, EventStoreConfig, StoreState, StoreStats};
