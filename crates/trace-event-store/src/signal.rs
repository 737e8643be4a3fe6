// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use parking_lot::{Condvar, Mutex};

/// Level-triggered binary gate.
///
/// `set` may be called any number of times from any thread; all sets that
/// happen before a waiter wakes collapse into one wake-up. `wait` consumes
/// the signal.
#[derive(Debug, Default)]
pub(crate) struct WakeSignal {
    raised: Mutex<bool>,
    condvar: Condvar,
}

impl WakeSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self) {
        let mut raised = self.raised.lock();
        if !*raised {
            *raised = true;
            self.condvar.notify_one();
        }
    }

    /// Blocks until the gate is raised, then lowers it.
    pub(crate) fn wait(&self) {
        let mut raised = self.raised.lock();
        while !*raised {
            self.condvar.wait(&mut raised);
        }
        *raised = false;
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    /// Returns whether the gate was raised.
    #[cfg(test)]
    pub(crate) fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        let mut raised = self.raised.lock();
        if !*raised {
            // Spurious wake-ups only shorten the wait; callers re-check state.
            let _ = self.condvar.wait_for(&mut raised, timeout);
        }
        std::mem::replace(&mut *raised, false)
    }

    #[cfg(test)]
    pub(crate) fn is_set(&self) -> bool {
        *self.raised.lock()
    }
}
