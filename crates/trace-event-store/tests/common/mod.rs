// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared helpers for event store integration tests

pub mod mocks;

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use trace_event_store::{Event, ProcessInfo, Severity};

pub fn process() -> Arc<ProcessInfo> {
    Arc::new(ProcessInfo::new("test-host", "event-store-test", 1234))
}

pub fn event(severity: Severity) -> Event {
    Event::new(Utc::now(), severity, 0, Some(String::new()), "OK", process())
}

pub fn numbered_event(source: &str, id: i32) -> Event {
    Event::new(
        Utc::now(),
        Severity::Information,
        id,
        Some(source.to_string()),
        format!("event {id}"),
        process(),
    )
}

/// Polls `condition` until it holds or `timeout` elapses.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
