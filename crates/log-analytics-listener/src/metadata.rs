// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Client for the instance metadata service.

use core::time::Duration;
use serde::Deserialize;
use tracing::debug;

use crate::error::IngestionError;
use crate::http_utils::build_client;

/// Tag list of the compute instance the process runs on.
pub const DEFAULT_METADATA_TAGS_URL: &str =
    "http://169.254.169.254/metadata/instance/compute/tagsList?api-version=2021-02-01";

/// The metadata service answers locally or not at all.
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

/// One `name`/`value` pair from the instance tag list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetadataTag {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl MetadataTag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: reqwest::Client,
    tags_url: String,
}

impl MetadataClient {
    pub fn new(tags_url: impl Into<String>, timeout: Duration) -> Result<Self, IngestionError> {
        Ok(Self {
            client: build_client(None, timeout)?,
            tags_url: tags_url.into(),
        })
    }

    pub fn tags_url(&self) -> &str {
        &self.tags_url
    }

    /// Fetches the instance tag list.
    pub async fn fetch_tags(&self) -> Result<Vec<MetadataTag>, IngestionError> {
        let response = self
            .client
            .get(&self.tags_url)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|e| IngestionError::Metadata(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestionError::Metadata(format!(
                "unexpected status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| IngestionError::Metadata(e.to_string()))?;
        debug!("Instance metadata tags: {body}");

        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str::<Option<Vec<MetadataTag>>>(&body)
            .map(Option::unwrap_or_default)
            .map_err(|e| IngestionError::Metadata(format!("invalid tag list: {e}")))
    }
}
