// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Buffering and batched delivery of trace events.
//!
//! # Architecture
//!
//! ```text
//!   producers ──put──▶ ┌──────────────┐
//!                      │  EventQueue  │ (unbounded FIFO, one mutex)
//!                      └──────┬───────┘
//!   size / severity ─┐        │ take ≤ BATCH_SIZE
//!   flush timer ─────┼─wake─▶ ┌──────────────┐
//!   flush(false) ────┘        │  dispatcher  │──send──▶ LogSender
//!                             └──────────────┘
//!   flush(true) / close ── drains on the caller's thread ──▶ LogSender
//! ```
//!
//! Every trigger is just a reason to raise the same wake signal, so the
//! dispatcher never runs twice for one burst of signals. A batch is taken and
//! sent while holding the delivery lock, which serializes the dispatcher and
//! any synchronous drain: the sender is never called concurrently, an event is
//! never sent twice, and batches reach the sender in queue order. Producers
//! only ever touch the queue lock, so they never wait on delivery.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::constants::{
    BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_FLUSH_THRESHOLD, DISPATCHER_THREAD_NAME,
};
use crate::errors::StoreError;
use crate::event::Event;
use crate::sender::LogSender;
use crate::signal::WakeSignal;
use crate::timer::FlushTimer;

/// Tuning for an [`EventStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStoreConfig {
    /// How often pending events are flushed even if nothing else asks for it.
    pub flush_interval: Duration,
    /// Queue length at which a flush is requested.
    pub flush_threshold: usize,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

impl EventStoreConfig {
    pub fn from_millis(flush_interval_ms: u64, flush_threshold: usize) -> Self {
        Self {
            flush_interval: Duration::from_millis(flush_interval_ms),
            flush_threshold,
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.flush_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "flush interval must be greater than 0".to_string(),
            ));
        }
        if self.flush_threshold == 0 {
            return Err(StoreError::InvalidConfig(
                "flush threshold must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a store. Moves forward only, exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Accepting events; dispatcher and timer active.
    Running,
    /// No longer accepting events; final drain in progress.
    Closing,
    /// Timer stopped, dispatcher exited.
    Closed,
}

/// Point-in-time copy of the store counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Events appended to the queue.
    pub accepted: u64,
    /// Events refused because the store was closing or closed.
    pub rejected: u64,
    /// Events in batches the sender accepted.
    pub sent: u64,
    /// Events in batches the sender failed on.
    pub dropped: u64,
    /// Calls made to the sender.
    pub batches: u64,
    /// Sender calls that returned an error or panicked.
    pub failed_batches: u64,
    /// Events waiting in the queue.
    pub pending: usize,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
}

#[derive(Debug, Default)]
struct EventQueue {
    events: VecDeque<Event>,
    adding_completed: bool,
}

struct Shared {
    queue: Mutex<EventQueue>,
    // Reentrant so a sender may close the store from `send`. `close` never
    // joins the dispatcher while the calling thread holds this lock.
    delivery: ReentrantMutex<()>,
    wake: WakeSignal,
    sender: Arc<dyn LogSender>,
    flush_threshold: usize,
    counters: Counters,
}

impl Shared {
    fn take_batch(&self, max: usize) -> Vec<Event> {
        let mut queue = self.queue.lock();
        let count = max.min(queue.events.len());
        queue.events.drain(..count).collect()
    }

    fn is_drained(&self) -> bool {
        let queue = self.queue.lock();
        queue.adding_completed && queue.events.is_empty()
    }

    /// Takes and sends one batch. Returns how many events were taken.
    fn send_next_batch(&self) -> usize {
        let _delivery = self.delivery.lock();
        let batch = self.take_batch(BATCH_SIZE);
        let count = batch.len();
        if count > 0 {
            self.send_batch(&batch);
        }
        count
    }

    fn send_batch(&self, batch: &[Event]) {
        let count = batch.len() as u64;
        self.counters.batches.fetch_add(1, Ordering::Relaxed);

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.sender.send(batch)));
        match result {
            Ok(Ok(())) => {
                self.counters.sent.fetch_add(count, Ordering::Relaxed);
                trace!("Sent batch of {count} events");
            }
            Ok(Err(e)) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                self.counters.dropped.fetch_add(count, Ordering::Relaxed);
                error!("Error on uploading logs, dropping {count} events: {e}");
            }
            Err(_) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                self.counters.dropped.fetch_add(count, Ordering::Relaxed);
                error!("Sender panicked while uploading logs, dropping {count} events");
            }
        }
    }

    /// Sends batches on the calling thread until the queue is observed empty.
    fn drain(&self) {
        while self.send_next_batch() > 0 {}
    }
}

fn run_dispatcher(shared: &Shared) {
    debug!("Event dispatcher started");
    loop {
        if shared.send_next_batch() > 0 {
            continue;
        }
        if shared.is_drained() {
            break;
        }
        shared.wake.wait();
    }
    debug!("Event dispatcher stopped");
}

/// Thread-safe event buffer that forwards events to a [`LogSender`] in batches.
///
/// Producers call [`put`](Self::put) and never block on I/O. A dedicated
/// dispatcher thread sends batches of at most [`BATCH_SIZE`] events whenever
/// it is woken by the size threshold, a warning-or-worse event, the periodic
/// timer, or an explicit [`flush`](Self::flush). [`close`](Self::close)
/// drains whatever is left.
///
/// No public method returns an error or panics once the store is built:
/// delivery failures drop the affected batch and are logged.
pub struct EventStore {
    shared: Arc<Shared>,
    state: Mutex<StoreState>,
    timer: Mutex<Option<FlushTimer>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventStore {
    pub fn new(sender: Arc<dyn LogSender>, config: EventStoreConfig) -> Result<Self, StoreError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            queue: Mutex::new(EventQueue::default()),
            delivery: ReentrantMutex::new(()),
            wake: WakeSignal::new(),
            sender,
            flush_threshold: config.flush_threshold,
            counters: Counters::default(),
        });

        let dispatcher_shared = Arc::clone(&shared);
        let dispatcher = thread::Builder::new()
            .name(DISPATCHER_THREAD_NAME.to_string())
            .spawn(move || run_dispatcher(&dispatcher_shared))
            .map_err(|source| StoreError::Spawn {
                name: DISPATCHER_THREAD_NAME,
                source,
            })?;

        let timer_shared = Arc::clone(&shared);
        let timer = match FlushTimer::start(config.flush_interval, move || {
            timer_shared.wake.set();
        }) {
            Ok(timer) => timer,
            Err(e) => {
                // Let the dispatcher observe completion and exit.
                shared.queue.lock().adding_completed = true;
                shared.wake.set();
                if dispatcher.join().is_err() {
                    error!("Event dispatcher panicked");
                }
                return Err(e);
            }
        };

        debug!(
            "Event store started: flush interval {} ms, flush threshold {}",
            config.flush_interval.as_millis(),
            config.flush_threshold
        );

        Ok(Self {
            shared,
            state: Mutex::new(StoreState::Running),
            timer: Mutex::new(Some(timer)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Appends an event to the queue.
    ///
    /// Warning-or-worse events wake the dispatcher right away, as does
    /// reaching the flush threshold. After [`close`](Self::close) the event
    /// is dropped with a warning.
    pub fn put(&self, event: Event) {
        let severity = event.severity();
        let pending = {
            let mut queue = self.shared.queue.lock();
            if queue.adding_completed {
                drop(queue);
                self.shared.counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Event store is closed, dropping {severity} event");
                return;
            }
            queue.events.push_back(event);
            queue.events.len()
        };
        self.shared.counters.accepted.fetch_add(1, Ordering::Relaxed);
        trace!("Put {severity} event, {pending} pending");

        if severity.is_escalated() || pending >= self.shared.flush_threshold {
            self.flush(false);
        }
    }

    /// Forces pending events toward the sender.
    ///
    /// With `synchronized == false` this only wakes the dispatcher. With
    /// `synchronized == true` the calling thread sends batches itself until
    /// it sees the queue empty, taking turns with the dispatcher batch by
    /// batch. Producers that keep putting events meanwhile keep this call
    /// running.
    pub fn flush(&self, synchronized: bool) {
        if synchronized {
            debug!("Events to flush: {}", self.pending());
            self.shared.drain();
        } else {
            self.shared.wake.set();
        }
    }

    /// Stops intake and delivers everything still queued.
    ///
    /// Only the first call has an effect. A concurrent second call returns
    /// without waiting for the first one to finish.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state != StoreState::Running {
                return;
            }
            *state = StoreState::Closing;
        }
        info!("Closing event store, {} events pending", self.pending());

        if let Some(mut timer) = self.timer.lock().take() {
            timer.stop();
        }

        self.shared.queue.lock().adding_completed = true;
        self.shared.drain();

        self.shared.wake.set();
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            if dispatcher.thread().id() == thread::current().id() {
                // Closed from inside the sender; the loop exits on its own.
                debug!("Event store closed from the dispatcher thread");
            } else if self.shared.delivery.is_owned_by_current_thread() {
                // The dispatcher may be waiting on the lock this thread holds.
                // Once released it finds the queue drained and exits.
                debug!("Event store closed from inside a synchronous flush");
            } else if dispatcher.join().is_err() {
                error!("Event dispatcher panicked");
            }
        }

        *self.state.lock() = StoreState::Closed;
        let stats = self.stats();
        info!(
            "Event store closed: {} sent, {} dropped, {} rejected",
            stats.sent, stats.dropped, stats.rejected
        );
    }

    pub fn state(&self) -> StoreState {
        *self.state.lock()
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().events.len()
    }

    pub fn stats(&self) -> StoreStats {
        let counters = &self.shared.counters;
        StoreStats {
            accepted: counters.accepted.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
            sent: counters.sent.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            batches: counters.batches.load(Ordering::Relaxed),
            failed_batches: counters.failed_batches.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }
}

impl Drop for EventStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("state", &self.state())
            .field("pending", &self.pending())
            .field("flush_threshold", &self.shared.flush_threshold)
            .finish()
    }
}
