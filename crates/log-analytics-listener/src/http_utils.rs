// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use reqwest::ClientBuilder;

use crate::error::IngestionError;

/// Creates a reqwest client builder with rustls TLS.
pub fn create_reqwest_client_builder() -> ClientBuilder {
    reqwest::Client::builder().use_rustls_tls()
}

/// Builds an HTTP client with a per-request `timeout`, routing HTTPS traffic
/// through `proxy_url` when one is given.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, IngestionError> {
    let mut builder = create_reqwest_client_builder().timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

/// Statuses worth another attempt: throttling, timeouts and server errors.
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
