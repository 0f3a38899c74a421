//! src/config.rs
//!
//! Runtime configuration for the analytics pipeline. Everything here has a
//! working default except the backend URL; `from_env` layers `FOOTFALL_*`
//! environment variables (via dotenv) on top of those defaults.

use std::path::PathBuf;
use std::time::Duration;

use footfall_common::Error;

/// Tuning for the dev-tools dimension heuristic.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// How often the viewport is sampled.
    pub poll_interval: Duration,
    /// A delta above this (exclusive) on either axis counts as "open".
    pub threshold_px: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            threshold_px: 160,
        }
    }
}

/// Tuning for the realtime channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub connect_timeout: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_backoff: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            reconnect_attempts: 5,
            reconnect_backoff: Duration::from_secs(3),
        }
    }
}

/// Credentials for the optional measurement sink. Both values must be present
/// for the sink to be enabled.
#[derive(Debug, Clone)]
pub struct MeasurementConfig {
    pub measurement_id: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct AnalyticsConfig {
    /// Base URL of the analytics backend, e.g. `https://example.com`.
    pub backend_url: String,
    /// Cookie under which the visitor id is persisted.
    pub cookie_name: String,
    pub cookie_ttl_days: i64,
    /// Reported on session open and on every alert.
    pub user_agent: String,
    /// Reported once on session open, if the host knows one.
    pub referrer: Option<String>,
    /// Per-request timeout for backend calls, including session open.
    pub http_timeout: Duration,
    /// How long `shutdown` waits for the beacon queue to drain.
    pub beacon_grace: Duration,
    /// Override for the on-disk profile directory (cookie jar location).
    pub profile_dir: Option<PathBuf>,
    pub detector: DetectorConfig,
    pub channel: ChannelConfig,
    pub measurement: Option<MeasurementConfig>,
}

impl AnalyticsConfig {
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into(),
            cookie_name: "visitor_id".to_string(),
            cookie_ttl_days: 365,
            user_agent: default_user_agent(),
            referrer: None,
            http_timeout: Duration::from_secs(5),
            beacon_grace: Duration::from_secs(3),
            profile_dir: None,
            detector: DetectorConfig::default(),
            channel: ChannelConfig::default(),
            measurement: None,
        }
    }

    /// Build a config from the environment. `FOOTFALL_BACKEND_URL` is
    /// required; the rest fall back to defaults. A `.env` file in the working
    /// directory is honored.
    pub fn from_env() -> Result<Self, Error> {
        let _ = dotenv::dotenv();

        let backend_url = std::env::var("FOOTFALL_BACKEND_URL")
            .map_err(|_| Error::Config("FOOTFALL_BACKEND_URL is not set".to_string()))?;

        let mut cfg = Self::new(backend_url);

        if let Ok(ua) = std::env::var("FOOTFALL_USER_AGENT") {
            cfg.user_agent = ua;
        }
        if let Ok(referrer) = std::env::var("FOOTFALL_REFERRER") {
            if !referrer.is_empty() {
                cfg.referrer = Some(referrer);
            }
        }
        if let Ok(dir) = std::env::var("FOOTFALL_PROFILE_DIR") {
            cfg.profile_dir = Some(PathBuf::from(dir));
        }

        let measurement_id = std::env::var("FOOTFALL_MEASUREMENT_ID").ok();
        let api_secret = std::env::var("FOOTFALL_API_SECRET").ok();
        if let (Some(measurement_id), Some(api_secret)) = (measurement_id, api_secret) {
            cfg.measurement = Some(MeasurementConfig { measurement_id, api_secret });
        }

        Ok(cfg)
    }

    /// Directory the file-backed cookie jar should live in.
    pub fn resolve_profile_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.profile_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("footfall")
    }
}

fn default_user_agent() -> String {
    format!("footfall/{}", env!("CARGO_PKG_VERSION"))
}
