//! HTTP client for `GET /api/v1/sites/{site}/stats/zones/{zone}`.
//!
//! A zone's occupants are the union of its SDK clients and its wireless
//! clients. A 404 means the zone currently has no statistics and is
//! treated as empty.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;

use attend_core::error::{CoreError, CoreResult};
use attend_core::ports::PresenceProvider;

use crate::config::PresenceConfig;

/// Errors from the zone-statistics API layer.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API returned a non-2xx status other than 404.
    #[error("Presence API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A 2xx body that is not a zone-statistics document.
    #[error("Malformed zone statistics: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<PresenceError> for CoreError {
    fn from(err: PresenceError) -> Self {
        CoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ZoneStats {
    #[serde(default)]
    sdkclients: Option<Vec<String>>,
    #[serde(default)]
    clients: Option<Vec<String>>,
}

/// Interpret a zone-statistics response.
///
/// Identifiers are deduplicated, keeping first-seen order (SDK clients
/// first).
pub fn parse_zone_stats(status: u16, body: &str) -> Result<Vec<String>, PresenceError> {
    if status == StatusCode::NOT_FOUND.as_u16() {
        return Ok(Vec::new());
    }
    if !(200..300).contains(&status) {
        return Err(PresenceError::Api {
            status,
            body: body.to_string(),
        });
    }

    let stats: ZoneStats = serde_json::from_str(body)?;
    let mut occupants: Vec<String> = Vec::new();
    for id in stats
        .sdkclients
        .unwrap_or_default()
        .into_iter()
        .chain(stats.clients.unwrap_or_default())
    {
        if !id.is_empty() && !occupants.contains(&id) {
            occupants.push(id);
        }
    }
    Ok(occupants)
}

/// [`PresenceProvider`] backed by the Mist REST API.
pub struct MistPresenceClient {
    client: reqwest::Client,
    config: PresenceConfig,
}

impl MistPresenceClient {
    pub fn new(config: PresenceConfig) -> Result<Self, PresenceError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Reuse an existing [`reqwest::Client`]; its own timeout applies.
    pub fn with_client(client: reqwest::Client, config: PresenceConfig) -> Self {
        Self { client, config }
    }

    fn zone_stats_url(&self, zone_id: &str) -> String {
        format!(
            "{}/api/v1/sites/{}/stats/zones/{}",
            self.config.base_url, self.config.site_id, zone_id
        )
    }

    /// Fetch the device identifiers currently located in a zone.
    pub async fn fetch_zone_occupants(&self, zone_id: &str) -> Result<Vec<String>, PresenceError> {
        let response = self
            .client
            .get(self.zone_stats_url(zone_id))
            .header(AUTHORIZATION, format!("Token {}", self.config.api_token))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if status == StatusCode::NOT_FOUND.as_u16() {
            tracing::debug!(zone_id, "Zone statistics not found, treating as empty");
        }
        parse_zone_stats(status, &body)
    }
}

#[async_trait]
impl PresenceProvider for MistPresenceClient {
    async fn zone_occupants(&self, zone_id: &str) -> CoreResult<Vec<String>> {
        Ok(self.fetch_zone_occupants(zone_id).await?)
    }
}
