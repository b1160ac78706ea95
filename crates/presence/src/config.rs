use std::time::Duration;

use attend_core::config::{env_or, env_required};
use attend_core::error::CoreResult;

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.mist.com";

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the zone-statistics API.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    pub base_url: String,
    pub api_token: String,
    pub site_id: String,
    pub timeout: Duration,
}

impl PresenceConfig {
    /// Load from environment variables.
    ///
    /// | Env var          | Default                |
    /// |------------------|------------------------|
    /// | `MIST_BASE_URL`  | `https://api.mist.com` |
    /// | `MIST_API_TOKEN` | required               |
    /// | `MIST_SITE_ID`   | required               |
    pub fn from_env() -> CoreResult<Self> {
        let base_url: String = env_or("MIST_BASE_URL", DEFAULT_BASE_URL.to_string())?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: env_required("MIST_API_TOKEN")?,
            site_id: env_required("MIST_SITE_ID")?,
            timeout: REQUEST_TIMEOUT,
        })
    }
}
