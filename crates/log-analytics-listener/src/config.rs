// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::env;
use std::fmt;
use tracing::{debug, warn};
use trace_event_store::constants::{DEFAULT_FLUSH_INTERVAL, DEFAULT_FLUSH_THRESHOLD};
use trace_event_store::EventStoreConfig;

use crate::error::IngestionError;
use crate::metadata::{MetadataClient, MetadataTag};

pub const MI_CLIENT_ID_KEY: &str = "MiClientId";
pub const DCR_ID_KEY: &str = "DcrId";
pub const DCR_STREAM_KEY: &str = "DcrStream";
pub const DCE_URL_KEY: &str = "DceUrl";

pub const FLUSH_INTERVAL_MS_KEY: &str = "FlushIntervalMs";
pub const FLUSH_THRESHOLD_KEY: &str = "FlushThreshold";

/// Prefix of environment variables and instance tags carrying delivery settings.
pub const ENV_PREFIX: &str = "LA_";

/// Attribute names a listener understands.
pub const SUPPORTED_ATTRIBUTES: [&str; 6] = [
    MI_CLIENT_ID_KEY,
    DCR_ID_KEY,
    DCR_STREAM_KEY,
    DCE_URL_KEY,
    FLUSH_INTERVAL_MS_KEY,
    FLUSH_THRESHOLD_KEY,
];

/// Where and as whom events are delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Client id of the managed identity used to authenticate
    pub identity_client_id: String,
    /// Immutable id of the data collection rule
    pub route_id: String,
    /// Stream declared by the data collection rule
    pub stream_id: String,
    /// Base URL of the data collection endpoint
    pub endpoint_url: String,
}

impl DeliveryConfig {
    pub fn is_complete(&self) -> bool {
        !self.identity_client_id.is_empty()
            && !self.route_id.is_empty()
            && !self.stream_id.is_empty()
            && !self.endpoint_url.is_empty()
    }

    /// Fills every empty field from `other`. Fields already set are kept.
    pub fn merge(&mut self, other: DeliveryConfig) {
        fn fill(field: &mut String, value: String) {
            if field.is_empty() {
                *field = value;
            }
        }
        fill(&mut self.identity_client_id, other.identity_client_id);
        fill(&mut self.route_id, other.route_id);
        fill(&mut self.stream_id, other.stream_id);
        fill(&mut self.endpoint_url, other.endpoint_url);
    }

    /// Reads the four delivery keys from listener attributes. Key lookup
    /// ignores case.
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Self {
        let lookup = |key: &str| attribute(attributes, key).unwrap_or_default();
        let config = Self {
            identity_client_id: lookup(MI_CLIENT_ID_KEY),
            route_id: lookup(DCR_ID_KEY),
            stream_id: lookup(DCR_STREAM_KEY),
            endpoint_url: lookup(DCE_URL_KEY),
        };
        debug!("Config from attributes: {config}");
        config
    }

    /// Create configuration from `LA_`-prefixed environment variables
    pub fn from_env() -> Self {
        Self::from_env_with(|name| env::var(name).ok())
    }

    pub fn from_env_with<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(&format!("{ENV_PREFIX}{key}")).unwrap_or_default();
        let config = Self {
            identity_client_id: read(MI_CLIENT_ID_KEY),
            route_id: read(DCR_ID_KEY),
            stream_id: read(DCR_STREAM_KEY),
            endpoint_url: read(DCE_URL_KEY),
        };
        debug!("Config from environment variables: {config}");
        config
    }

    /// Picks the `LA_`-prefixed entries out of an instance tag list. Tag
    /// names are compared without regard to case; the first match wins.
    pub fn from_tags(tags: &[MetadataTag]) -> Self {
        let read = |key: &str| {
            let name = format!("{ENV_PREFIX}{key}");
            tags.iter()
                .find(|tag| tag.name.eq_ignore_ascii_case(&name))
                .map(|tag| tag.value.clone())
                .unwrap_or_default()
        };
        Self {
            identity_client_id: read(MI_CLIENT_ID_KEY),
            route_id: read(DCR_ID_KEY),
            stream_id: read(DCR_STREAM_KEY),
            endpoint_url: read(DCE_URL_KEY),
        }
    }

    /// Best effort: a failed lookup is logged and yields an empty config.
    pub async fn from_instance_metadata(client: &MetadataClient) -> Self {
        match client.fetch_tags().await {
            Ok(tags) => {
                let config = Self::from_tags(&tags);
                debug!("Config from instance metadata: {config}");
                config
            }
            Err(e) => {
                warn!("Error when reading instance metadata: {e}");
                Self::default()
            }
        }
    }

    /// Resolves the delivery settings: attributes first, then the
    /// environment, then instance metadata. Later sources only fill what
    /// earlier ones left empty, and lookup stops once the config is complete.
    pub async fn resolve(attributes: &HashMap<String, String>, metadata: &MetadataClient) -> Self {
        let mut config = Self::from_attributes(attributes);
        if config.is_complete() {
            return config;
        }
        config.merge(Self::from_env());
        if config.is_complete() {
            return config;
        }
        config.merge(Self::from_instance_metadata(metadata).await);
        debug!("Merged config: {config}");
        config
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), IngestionError> {
        if !self.is_complete() {
            return Err(IngestionError::IncompleteConfig(self.to_string()));
        }

        let url = reqwest::Url::parse(&self.endpoint_url).map_err(|e| {
            IngestionError::InvalidConfig(format!(
                "{DCE_URL_KEY} '{}' is not a valid URL: {e}",
                self.endpoint_url
            ))
        })?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(IngestionError::InvalidConfig(format!(
                "{DCE_URL_KEY} must use http or https, got '{}'",
                url.scheme()
            )));
        }

        Ok(())
    }
}

impl fmt::Display for DeliveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MI_CLIENT_ID_KEY}: \"{}\", {DCR_ID_KEY}: \"{}\", {DCR_STREAM_KEY}: \"{}\", {DCE_URL_KEY}: \"{}\"",
            self.identity_client_id, self.route_id, self.stream_id, self.endpoint_url
        )
    }
}

/// Store tuning from the `FlushIntervalMs` and `FlushThreshold` attributes.
/// Missing or unparsable values fall back to the defaults.
pub fn store_config_from_attributes(attributes: &HashMap<String, String>) -> EventStoreConfig {
    let mut config = EventStoreConfig::default();

    if let Some(raw) = attribute(attributes, FLUSH_INTERVAL_MS_KEY) {
        match raw.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => config.flush_interval = core::time::Duration::from_millis(ms),
            _ => warn!(
                "Ignoring {FLUSH_INTERVAL_MS_KEY} '{raw}', using {}ms",
                DEFAULT_FLUSH_INTERVAL.as_millis()
            ),
        }
    }

    if let Some(raw) = attribute(attributes, FLUSH_THRESHOLD_KEY) {
        match raw.trim().parse::<usize>() {
            Ok(threshold) if threshold > 0 => config.flush_threshold = threshold,
            _ => warn!("Ignoring {FLUSH_THRESHOLD_KEY} '{raw}', using {DEFAULT_FLUSH_THRESHOLD}"),
        }
    }

    config
}

fn attribute(attributes: &HashMap<String, String>, key: &str) -> Option<String> {
    attributes
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.clone())
}
