// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Trace events and the process context shared by all of them.
//!
//! An [`Event`] is created at the moment a trace call happens and is never
//! mutated afterwards. Host name, process name and process id are captured
//! once into a [`ProcessInfo`] and shared by reference, so building an event
//! never touches the operating system.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::ParseError;

/// Importance of a trace event.
///
/// Discriminants follow the platform trace codes, so a lower value is more
/// severe. The declaration order matches the numeric order, which makes the
/// derived `Ord` usable for "at least as severe as" comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Severity {
    Critical = 1,
    Error = 2,
    Warning = 4,
    Information = 8,
    Verbose = 16,
    Start = 256,
    Stop = 512,
    Suspend = 1024,
    Resume = 2048,
    Transfer = 4096,
}

impl Severity {
    /// Numeric trace code, as written to the wire.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Warning or anything more severe. Such events force an immediate flush.
    pub fn is_escalated(self) -> bool {
        self <= Severity::Warning
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::Error => "Error",
            Severity::Warning => "Warning",
            Severity::Information => "Information",
            Severity::Verbose => "Verbose",
            Severity::Start => "Start",
            Severity::Stop => "Stop",
            Severity::Suspend => "Suspend",
            Severity::Resume => "Resume",
            Severity::Transfer => "Transfer",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let severity = match s.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "error" => Severity::Error,
            "warning" | "warn" => Severity::Warning,
            "information" | "info" => Severity::Information,
            "verbose" => Severity::Verbose,
            "start" => Severity::Start,
            "stop" => Severity::Stop,
            "suspend" => Severity::Suspend,
            "resume" => Severity::Resume,
            "transfer" => Severity::Transfer,
            _ => return Err(ParseError::UnknownSeverity(s.to_string())),
        };
        Ok(severity)
    }
}

impl Serialize for Severity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

/// Identity of the emitting process, captured once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    host_name: String,
    process_name: String,
    process_id: u32,
}

impl ProcessInfo {
    pub fn new(
        host_name: impl Into<String>,
        process_name: impl Into<String>,
        process_id: u32,
    ) -> Self {
        Self {
            host_name: host_name.into(),
            process_name: process_name.into(),
            process_id,
        }
    }

    /// Reads host name, executable name and pid of the running process.
    pub fn capture() -> Self {
        Self {
            host_name: detect_host_name(),
            process_name: detect_process_name(),
            process_id: std::process::id(),
        }
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    pub fn process_id(&self) -> u32 {
        self.process_id
    }
}

fn detect_host_name() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}

fn detect_process_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_default()
}

/// One trace occurrence.
#[derive(Debug, Clone)]
pub struct Event {
    timestamp: DateTime<Utc>,
    process: Arc<ProcessInfo>,
    severity: Severity,
    event_id: i32,
    source: Option<String>,
    content: String,
}

impl Event {
    pub fn new(
        timestamp: DateTime<Utc>,
        severity: Severity,
        event_id: i32,
        source: Option<String>,
        content: impl Into<String>,
        process: Arc<ProcessInfo>,
    ) -> Self {
        Self {
            timestamp,
            process,
            severity,
            event_id,
            source,
            content: content.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn host_name(&self) -> &str {
        self.process.host_name()
    }

    pub fn process_name(&self) -> &str {
        self.process.process_name()
    }

    pub fn process_id(&self) -> u32 {
        self.process.process_id()
    }

    pub fn process(&self) -> &Arc<ProcessInfo> {
        &self.process
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn event_id(&self) -> i32 {
        self.event_id
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

// Column names are fixed by the ingestion stream schema.
impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Event", 8)?;
        state.serialize_field("Time", &self.timestamp)?;
        state.serialize_field("ComputerName", self.process.host_name())?;
        state.serialize_field("ProcessName", self.process.process_name())?;
        state.serialize_field("ProcessId", &self.process.process_id())?;
        state.serialize_field("Type", &self.severity)?;
        state.serialize_field("Id", &self.event_id)?;
        state.serialize_field("Source", &self.source)?;
        state.serialize_field("Content", &self.content)?;
        state.end()
    }
}
