// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use chrono::Utc;
use core::time::Duration;
use log_analytics_listener::config::{DCE_URL_KEY, DCR_ID_KEY, DCR_STREAM_KEY, MI_CLIENT_ID_KEY};
use log_analytics_listener::{DeliveryConfig, ListenerOptions, RetryPolicy};
use mockito::{Matcher, Mock, ServerGuard};
use std::sync::Arc;
use trace_event_store::{Event, ProcessInfo, Severity};

pub const ROUTE_ID: &str = "dcr-00000000";
pub const STREAM_ID: &str = "Custom-TraceEvents";
pub const UPLOAD_PATH: &str = "/dataCollectionRules/dcr-00000000/streams/Custom-TraceEvents";

/// Nothing listens on port 1, so metadata and identity lookups fail fast.
pub fn offline_options() -> ListenerOptions {
    ListenerOptions {
        metadata_url: "http://127.0.0.1:1/metadata/tags".to_string(),
        identity_endpoint: "http://127.0.0.1:1/token".to_string(),
        request_timeout: Duration::from_millis(500),
        retry: fast_retry(0),
        ..Default::default()
    }
}

pub fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(10),
    }
}

pub fn delivery_config(endpoint: &str) -> DeliveryConfig {
    DeliveryConfig {
        identity_client_id: "mi-client".to_string(),
        route_id: ROUTE_ID.to_string(),
        stream_id: STREAM_ID.to_string(),
        endpoint_url: endpoint.to_string(),
    }
}

/// Options pointing both the identity endpoint and the ingestion endpoint at
/// `server`.
pub fn server_options(server: &ServerGuard) -> ListenerOptions {
    ListenerOptions {
        identity_endpoint: format!("{}/token", server.url()),
        ..offline_options()
    }
    .with_attribute(MI_CLIENT_ID_KEY, "mi-client")
    .with_attribute(DCR_ID_KEY, ROUTE_ID)
    .with_attribute(DCR_STREAM_KEY, STREAM_ID)
    .with_attribute(DCE_URL_KEY, server.url())
}

pub fn mock_token(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/token")
        .match_query(Matcher::Any)
        .match_header("Metadata", "true")
        .with_status(200)
        .with_body(r#"{"access_token":"test-token","expires_in":"3599"}"#)
        .create()
}

pub fn event(content: &str) -> Event {
    Event::new(
        Utc::now(),
        Severity::Information,
        0,
        Some("test".to_string()),
        content,
        Arc::new(ProcessInfo::new("host", "app", 42)),
    )
}
