// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Store limits and defaults.

use std::time::Duration;

/// Maximum number of events handed to the sender in one call. Independent
/// of the flush threshold.
pub const BATCH_SIZE: usize = 100;

/// Default time between periodic flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(60_000);

/// Default queue length that triggers a flush.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 100;

pub(crate) const DISPATCHER_THREAD_NAME: &str = "la-event-dispatcher";
