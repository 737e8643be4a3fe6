// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bearer tokens from the instance managed identity endpoint.

use core::time::Duration;
use serde::Deserialize;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::IngestionError;
use crate::http_utils::build_client;

pub const DEFAULT_IDENTITY_ENDPOINT: &str =
    "http://169.254.169.254/metadata/identity/oauth2/token?api-version=2018-02-01";

/// Audience of tokens accepted by the logs ingestion API.
pub const INGESTION_RESOURCE: &str = "https://monitor.azure.com";

/// A cached token is refreshed once it is this close to expiring.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
}

/// The identity endpoint reports `expires_in` as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn as_duration(&self) -> Option<Duration> {
        match self {
            ExpiresIn::Seconds(secs) => Some(Duration::from_secs(*secs)),
            ExpiresIn::Text(text) => text.trim().parse::<u64>().ok().map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Debug)]
pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    endpoint: String,
    client_id: String,
    cache: Mutex<Option<CachedToken>>,
}

impl ManagedIdentityCredential {
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IngestionError> {
        Ok(Self {
            client: build_client(None, timeout)?,
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            cache: Mutex::new(None),
        })
    }

    /// Returns a token for the ingestion resource, reusing the cached one
    /// until it nears expiry.
    pub async fn token(&self) -> Result<String, IngestionError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value.clone());
            }
        }

        let (value, expires_in) = self.request_token().await?;
        let refresh_at = Instant::now() + expires_in.saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!("Acquired access token valid for {}s", expires_in.as_secs());
        *cache = Some(CachedToken {
            value: value.clone(),
            refresh_at,
        });
        Ok(value)
    }

    async fn request_token(&self) -> Result<(String, Duration), IngestionError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("resource", INGESTION_RESOURCE),
                ("client_id", self.client_id.as_str()),
            ])
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| IngestionError::Credential(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestionError::Credential(format!(
                "identity endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IngestionError::Credential(format!("invalid token response: {e}")))?;
        if token.access_token.is_empty() {
            return Err(IngestionError::Credential(
                "identity endpoint returned an empty token".to_string(),
            ));
        }

        // Without a usable lifetime the token is not cached.
        let expires_in = token
            .expires_in
            .as_ref()
            .and_then(ExpiresIn::as_duration)
            .unwrap_or(Duration::ZERO);
        Ok((token.access_token, expires_in))
    }
}
