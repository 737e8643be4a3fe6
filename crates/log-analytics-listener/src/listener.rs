// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use core::time::Duration;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};
use trace_event_store::{Event, EventStore, ProcessInfo, Severity};

use crate::config::{store_config_from_attributes, DeliveryConfig};
use crate::credential::{ManagedIdentityCredential, DEFAULT_IDENTITY_ENDPOINT};
use crate::error::IngestionError;
use crate::metadata::{MetadataClient, DEFAULT_METADATA_TAGS_URL, METADATA_TIMEOUT};
use crate::runtime::IngestionRuntime;
use crate::sender::{IngestionSender, RetryPolicy, DEFAULT_REQUEST_TIMEOUT};

/// Settings a [`TraceListener`] is built from.
#[derive(Debug, Clone)]
pub struct ListenerOptions {
    /// Listener attributes, see [`SUPPORTED_ATTRIBUTES`](crate::config::SUPPORTED_ATTRIBUTES)
    pub attributes: HashMap<String, String>,
    /// Instance metadata tag list URL
    pub metadata_url: String,
    /// Managed identity token endpoint
    pub identity_endpoint: String,
    /// Timeout for each upload and token request
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            attributes: HashMap::new(),
            metadata_url: DEFAULT_METADATA_TAGS_URL.to_string(),
            identity_endpoint: DEFAULT_IDENTITY_ENDPOINT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ListenerOptions {
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Trace sink that ships events to a logs ingestion endpoint.
///
/// Nothing happens until the first trace call. That call resolves the
/// delivery settings and builds the [`EventStore`]; if the settings are
/// incomplete or the store cannot be built the listener stays disabled and
/// every later call is a no-op. Trace calls never panic and never report
/// errors to the caller.
pub struct TraceListener {
    options: ListenerOptions,
    process: Arc<ProcessInfo>,
    store: OnceLock<Option<Arc<EventStore>>>,
}

impl TraceListener {
    pub fn new(options: ListenerOptions) -> Self {
        Self {
            options,
            process: Arc::new(ProcessInfo::capture()),
            store: OnceLock::new(),
        }
    }

    pub fn options(&self) -> &ListenerOptions {
        &self.options
    }

    /// Whether the first trace call has already happened.
    pub fn is_initialized(&self) -> bool {
        self.store.get().is_some()
    }

    /// Whether events are being shipped. Triggers initialization.
    pub fn is_enabled(&self) -> bool {
        self.store().is_some()
    }

    pub fn write(&self, message: &str) {
        self.trace_event(None, Severity::Information, 0, Some(message));
    }

    pub fn write_line(&self, message: &str) {
        self.trace_event(None, Severity::Information, 0, Some(message));
    }

    pub fn fail(&self, message: &str, detail: &str) {
        self.record(None, Severity::Error, 0, format!("{message} {detail}"));
    }

    pub fn trace_event(
        &self,
        source: Option<&str>,
        severity: Severity,
        id: i32,
        message: Option<&str>,
    ) {
        self.record(source, severity, id, message.unwrap_or_default().to_string());
    }

    pub fn trace_event_fmt(
        &self,
        source: Option<&str>,
        severity: Severity,
        id: i32,
        args: fmt::Arguments<'_>,
    ) {
        self.record(source, severity, id, args.to_string());
    }

    pub fn trace_data(
        &self,
        source: Option<&str>,
        severity: Severity,
        id: i32,
        data: &[&dyn fmt::Display],
    ) {
        let message = data
            .iter()
            .map(|item| item.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        self.record(source, severity, id, message);
    }

    pub fn trace_transfer(
        &self,
        source: Option<&str>,
        id: i32,
        message: &str,
        related_activity_id: &dyn fmt::Display,
    ) {
        self.record(
            source,
            Severity::Transfer,
            id,
            format!("{related_activity_id}: {message}"),
        );
    }

    /// Asks the store to send what it holds without waiting for delivery.
    pub fn flush(&self) {
        if let Some(store) = self.store() {
            store.flush(false);
        }
    }

    /// Drains and closes the store. Does not initialize the listener.
    pub fn close(&self) {
        if let Some(store) = self.initialized_store() {
            store.close();
        }
    }

    /// Records an event only if the listener is already running. Safe to use
    /// from a panic hook, which may fire during initialization.
    pub(crate) fn record_if_initialized(
        &self,
        source: Option<&str>,
        severity: Severity,
        message: String,
    ) {
        if let Some(store) = self.initialized_store() {
            store.put(self.event(source, severity, 0, message));
        }
    }

    fn record(&self, source: Option<&str>, severity: Severity, id: i32, message: String) {
        if let Some(store) = self.store() {
            store.put(self.event(source, severity, id, message));
        }
    }

    fn event(&self, source: Option<&str>, severity: Severity, id: i32, message: String) -> Event {
        Event::new(
            Utc::now(),
            severity,
            id,
            Some(source.unwrap_or_default().to_string()),
            message,
            Arc::clone(&self.process),
        )
    }

    fn initialized_store(&self) -> Option<&Arc<EventStore>> {
        self.store.get().and_then(Option::as_ref)
    }

    fn store(&self) -> Option<&Arc<EventStore>> {
        self.store
            .get_or_init(|| match self.initialize() {
                Ok(store) => store.map(Arc::new),
                Err(e) => {
                    error!("Error when initializing trace listener: {e}");
                    None
                }
            })
            .as_ref()
    }

    fn initialize(&self) -> Result<Option<EventStore>, IngestionError> {
        let runtime = Arc::new(IngestionRuntime::new()?);
        let metadata = MetadataClient::new(self.options.metadata_url.as_str(), METADATA_TIMEOUT)?;
        let config =
            runtime.block_on(DeliveryConfig::resolve(&self.options.attributes, &metadata))?;
        debug!("Got config: {config}");

        if !config.is_complete() {
            warn!("Incomplete config, trace listener is disabled");
            return Ok(None);
        }

        let credential = Arc::new(ManagedIdentityCredential::new(
            self.options.identity_endpoint.as_str(),
            config.identity_client_id.as_str(),
            self.options.request_timeout,
        )?);
        let sender = IngestionSender::new(
            &config,
            credential,
            self.options.retry,
            self.options.request_timeout,
            runtime,
        )?;
        debug!("Uploading events to {}", sender.upload_url());

        let store_config = store_config_from_attributes(&self.options.attributes);
        let store = EventStore::new(Arc::new(sender), store_config)?;
        info!("Trace listener initialized");
        Ok(Some(store))
    }
}

impl Default for TraceListener {
    fn default() -> Self {
        Self::new(ListenerOptions::default())
    }
}

impl Drop for TraceListener {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for TraceListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceListener")
            .field("process", &self.process)
            .field("initialized", &self.is_initialized())
            .field("enabled", &self.initialized_store().is_some())
            .finish_non_exhaustive()
    }
}
