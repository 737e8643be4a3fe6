// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock senders for testing the event store

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use trace_event_store::{Event, EventStore, LogSender, SendError};

/// Records every batch it accepts; optionally fails every call.
#[derive(Default)]
pub struct MockLogSender {
    failure: Option<String>,
    count: AtomicUsize,
    batches: Mutex<Vec<Vec<(String, i32)>>>,
}

#[allow(dead_code)]
impl MockLogSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Sizes of the batches received, in arrival order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    /// `(source, id)` of every delivered event, in delivery order.
    pub fn delivered(&self) -> Vec<(String, i32)> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

impl LogSender for MockLogSender {
    fn send(&self, batch: &[Event]) -> Result<(), SendError> {
        if let Some(message) = &self.failure {
            return Err(SendError::Unavailable(message.clone()));
        }
        let records = batch
            .iter()
            .map(|event| (event.source().unwrap_or_default().to_string(), event.event_id()))
            .collect::<Vec<_>>();
        // Record before counting so observers that wait on the count see the batch.
        self.batches.lock().push(records);
        self.count.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    }
}

/// Panics on the first call, then behaves like a counting sender.
#[derive(Default)]
pub struct PanicOnceSender {
    calls: AtomicUsize,
    count: AtomicUsize,
}

#[allow(dead_code)]
impl PanicOnceSender {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl LogSender for PanicOnceSender {
    fn send(&self, batch: &[Event]) -> Result<(), SendError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("sender exploded");
        }
        self.count.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    }
}

/// Closes the store it is attached to from inside `send`.
#[derive(Default)]
pub struct ClosingSender {
    store: OnceLock<Weak<EventStore>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl ClosingSender {
    pub fn attach(&self, store: &Arc<EventStore>) {
        let _ = self.store.set(Arc::downgrade(store));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LogSender for ClosingSender {
    fn send(&self, _batch: &[Event]) -> Result<(), SendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(store) = self.store.get().and_then(Weak::upgrade) {
            store.close();
        }
        Ok(())
    }
}
