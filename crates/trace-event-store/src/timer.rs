// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::errors::StoreError;

const TIMER_THREAD_NAME: &str = "la-flush-timer";

#[derive(Debug, Default)]
struct StopGate {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

/// Calls `on_tick` every `interval` on its own thread until stopped.
///
/// The callback only signals; it must not block. Stopping interrupts the
/// current wait instead of letting the interval run out.
#[derive(Debug)]
pub(crate) struct FlushTimer {
    gate: Arc<StopGate>,
    handle: Option<JoinHandle<()>>,
}

impl FlushTimer {
    pub(crate) fn start<F>(interval: Duration, on_tick: F) -> Result<Self, StoreError>
    where
        F: Fn() + Send + 'static,
    {
        let gate = Arc::new(StopGate::default());
        let thread_gate = Arc::clone(&gate);
        let handle = thread::Builder::new()
            .name(TIMER_THREAD_NAME.to_string())
            .spawn(move || run(&thread_gate, interval, on_tick))
            .map_err(|source| StoreError::Spawn {
                name: TIMER_THREAD_NAME,
                source,
            })?;

        Ok(Self {
            gate,
            handle: Some(handle),
        })
    }

    pub(crate) fn stop(&mut self) {
        {
            let mut stopped = self.gate.stopped.lock();
            *stopped = true;
            self.gate.condvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Flush timer thread panicked");
            }
        }
    }
}

impl Drop for FlushTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<F: Fn()>(gate: &StopGate, interval: Duration, on_tick: F) {
    debug!("Flush timer started with interval {} ms", interval.as_millis());
    let mut next_tick = Instant::now() + interval;
    let mut stopped = gate.stopped.lock();
    loop {
        while !*stopped && Instant::now() < next_tick {
            let _ = gate.condvar.wait_until(&mut stopped, next_tick);
        }
        if *stopped {
            break;
        }
        next_tick += interval;
        MutexGuard::unlocked(&mut stopped, &on_tick);
    }
    debug!("Flush timer stopped");
}
