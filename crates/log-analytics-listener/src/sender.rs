// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Uploads event batches to a logs ingestion endpoint.
//!
//! ```text
//!   EventStore dispatcher
//!           │ send(batch)
//!           ▼
//!   ┌────────────────┐    ┌──────────────┐
//!   │ JSON arrays of │───▶│ Bearer token │ (cached)
//!   │ at most 1 MiB  │    └──────────────┘
//!   └───────┬────────┘
//!           ▼
//!   POST {endpoint}/dataCollectionRules/{route}/streams/{stream}
//!           │
//!       Retry? (network, 408, 429, 5xx; exponential backoff)
//! ```

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};
use trace_event_store::{Event, LogSender, SendError};

use crate::config::DeliveryConfig;
use crate::credential::ManagedIdentityCredential;
use crate::error::IngestionError;
use crate::http_utils::{build_client, is_retryable_status};
use crate::runtime::IngestionRuntime;

pub const INGESTION_API_VERSION: &str = "2023-01-01";

/// Largest request body the ingestion API accepts.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each one after it
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry`, counting from 1.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

pub struct IngestionSender {
    client: reqwest::Client,
    credential: Arc<ManagedIdentityCredential>,
    upload_url: String,
    retry: RetryPolicy,
    runtime: Arc<IngestionRuntime>,
}

impl IngestionSender {
    pub fn new(
        config: &DeliveryConfig,
        credential: Arc<ManagedIdentityCredential>,
        retry: RetryPolicy,
        timeout: Duration,
        runtime: Arc<IngestionRuntime>,
    ) -> Result<Self, IngestionError> {
        config.validate()?;
        Ok(Self {
            client: build_client(None, timeout)?,
            credential,
            upload_url: upload_url(config),
            retry,
            runtime,
        })
    }

    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    async fn upload(&self, batch: &[Event]) -> Result<(), SendError> {
        let chunks = encode_chunks(batch, MAX_PAYLOAD_BYTES)?;
        let token = self
            .credential
            .token()
            .await
            .map_err(|e| SendError::Unavailable(e.to_string()))?;

        for body in chunks {
            self.post_with_retry(&token, body).await?;
        }
        Ok(())
    }

    async fn post_with_retry(&self, token: &str, body: Vec<u8>) -> Result<(), SendError> {
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let time = Instant::now();
            let response = self
                .client
                .post(&self.upload_url)
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await;
            let elapsed = time.elapsed();

            let failure = match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        debug!(
                            "INGESTION | Uploaded {} bytes in {} ms",
                            body.len(),
                            elapsed.as_millis()
                        );
                        return Ok(());
                    }
                    let message = resp.text().await.unwrap_or_default();
                    let failure = SendError::Destination {
                        status: Some(status.as_u16()),
                        message,
                    };
                    if !is_retryable_status(status) {
                        error!("INGESTION | Request rejected with status {status}");
                        return Err(failure);
                    }
                    failure
                }
                Err(e) => SendError::Unavailable(e.to_string()),
            };

            if attempts > self.retry.max_retries {
                error!(
                    "INGESTION | Failed to send request after {} ms and {} attempts: {}",
                    elapsed.as_millis(),
                    attempts,
                    failure
                );
                return Err(failure);
            }

            let delay = self.retry.delay(attempts);
            warn!(
                "INGESTION | Attempt {attempts} failed ({failure}), retrying in {} ms",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

impl LogSender for IngestionSender {
    fn send(&self, batch: &[Event]) -> Result<(), SendError> {
        if batch.is_empty() {
            return Ok(());
        }
        self.runtime
            .block_on(self.upload(batch))
            .map_err(|e| SendError::Unavailable(e.to_string()))?
    }
}

impl std::fmt::Debug for IngestionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionSender")
            .field("upload_url", &self.upload_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

pub fn upload_url(config: &DeliveryConfig) -> String {
    format!(
        "{}/dataCollectionRules/{}/streams/{}?api-version={INGESTION_API_VERSION}",
        config.endpoint_url.trim_end_matches('/'),
        config.route_id,
        config.stream_id
    )
}

/// Encodes `batch` as one or more JSON arrays, none larger than `max_bytes`
/// unless it holds a single event that is larger on its own.
pub fn encode_chunks(batch: &[Event], max_bytes: usize) -> Result<Vec<Vec<u8>>, SendError> {
    let mut chunks = Vec::new();
    let mut current: Vec<u8> = Vec::new();

    for event in batch {
        let encoded =
            serde_json::to_vec(event).map_err(|e| SendError::Payload(e.to_string()))?;
        // Opening bracket or separator, plus the closing bracket.
        if !current.is_empty() && current.len() + 1 + encoded.len() + 1 > max_bytes {
            current.push(b']');
            chunks.push(std::mem::take(&mut current));
        }
        current.push(if current.is_empty() { b'[' } else { b',' });
        current.extend_from_slice(&encoded);
    }

    if !current.is_empty() {
        current.push(b']');
        chunks.push(current);
    }
    Ok(chunks)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use trace_event_store::{ProcessInfo, Severity};

    fn event(content: &str) -> Event {
        Event::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap(),
            Severity::Information,
            0,
            None,
            content,
            Arc::new(ProcessInfo::new("host", "app", 7)),
        )
    }

    fn config(endpoint: &str) -> DeliveryConfig {
        DeliveryConfig {
            identity_client_id: "mi".to_string(),
            route_id: "dcr-1".to_string(),
            stream_id: "Custom-Trace".to_string(),
            endpoint_url: endpoint.to_string(),
        }
    }

    #[test]
    fn test_upload_url() {
        assert_eq!(
            upload_url(&config("https://dce.example.com/")),
            "https://dce.example.com/dataCollectionRules/dcr-1/streams/Custom-Trace?api-version=2023-01-01"
        );
    }

    #[test]
    fn test_retry_delay_is_exponential() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(2));
        assert_eq!(policy.delay(2), Duration::from_secs(4));
        assert_eq!(policy.delay(5), Duration::from_secs(32));
    }

    #[test]
    fn test_encode_single_chunk() {
        let batch = vec![event("a"), event("b")];
        let chunks = encode_chunks(&batch, MAX_PAYLOAD_BYTES).unwrap();
        assert_eq!(chunks.len(), 1);

        let decoded: Vec<serde_json::Value> = serde_json::from_slice(&chunks[0]).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0]["Content"], "a");
        assert_eq!(decoded[1]["Content"], "b");
    }

    #[test]
    fn test_encode_splits_at_limit() {
        let batch = (0..10).map(|i| event(&"x".repeat(100 + i))).collect::<Vec<_>>();
        let one = serde_json::to_vec(&batch[0]).unwrap().len();
        let limit = one * 3 + 4;

        let chunks = encode_chunks(&batch, limit).unwrap();
        assert!(chunks.len() > 1);
        let mut total = 0;
        for chunk in &chunks {
            assert!(chunk.len() <= limit);
            let decoded: Vec<serde_json::Value> = serde_json::from_slice(chunk).unwrap();
            total += decoded.len();
        }
        assert_eq!(total, 10);
    }

    #[test]
    fn test_encode_oversized_event_is_sent_alone() {
        let batch = vec![event("small"), event(&"y".repeat(500)), event("small")];
        let chunks = encode_chunks(&batch, 200).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].len() > 200);
    }

    #[test]
    fn test_encode_empty_batch() {
        assert!(encode_chunks(&[], MAX_PAYLOAD_BYTES).unwrap().is_empty());
    }

    #[test]
    fn test_new_rejects_invalid_endpoint() {
        let credential = Arc::new(
            ManagedIdentityCredential::new("http://127.0.0.1:1/token", "mi", DEFAULT_REQUEST_TIMEOUT)
                .unwrap(),
        );
        let result = IngestionSender::new(
            &config("some value"),
            credential,
            RetryPolicy::none(),
            DEFAULT_REQUEST_TIMEOUT,
            Arc::new(IngestionRuntime::new().unwrap()),
        );
        assert!(matches!(result, Err(IngestionError::InvalidConfig(_))));
    }
}
