use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, ShortyError};

/// Environment prefix for overrides, e.g. `SHORTY__RATE_LIMIT__REQUESTS_PER_MINUTE`
pub const ENV_PREFIX: &str = "SHORTY";

/// Top-level service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub rate_limit: RateLimitSettings,
    pub geo: GeoSettings,
    pub click: ClickSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub http_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Admission control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Bucket capacity; also the sustained rate per minute
    pub requests_per_minute: u32,
    /// Idle time after which a client's bucket is forgotten
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 10,
            idle_ttl_secs: 30 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl RateLimitSettings {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Geo-IP cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoSettings {
    pub ttl_secs: u64,
    pub lookup_timeout_ms: u64,
    pub endpoint: String,
    pub sweep_interval_secs: u64,
}

impl Default for GeoSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            lookup_timeout_ms: 2_000,
            endpoint: crate::geo::DEFAULT_ENDPOINT.to_string(),
            sweep_interval_secs: 10 * 60,
        }
    }
}

impl GeoSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickSettings {
    pub hash_salt: String,
}

impl Default for ClickSettings {
    fn default() -> Self {
        Self {
            hash_salt: "change-me-in-env-later".to_string(),
        }
    }
}

impl Settings {
    /// Layer defaults, a config file and `SHORTY__*` environment variables
    ///
    /// A named file must exist; pass `None` to run on defaults and environment only.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Missing keys fall back to the serde defaults above.
        let mut builder = ::config::Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(::config::File::with_name(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the components cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.requests_per_minute == 0 {
            return Err(ShortyError::Config(
                "rate_limit.requests_per_minute must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.idle_ttl_secs == 0 {
            return Err(ShortyError::Config(
                "rate_limit.idle_ttl_secs must be positive".to_string(),
            ));
        }
        if self.rate_limit.sweep_interval_secs == 0 || self.geo.sweep_interval_secs == 0 {
            return Err(ShortyError::Config(
                "sweep intervals must be positive".to_string(),
            ));
        }
        if self.geo.ttl_secs == 0 {
            return Err(ShortyError::Config(
                "geo.ttl_secs must be positive".to_string(),
            ));
        }
        if self.geo.lookup_timeout_ms == 0 {
            return Err(ShortyError::Config(
                "geo.lookup_timeout_ms must be positive".to_string(),
            ));
        }
        if self.geo.endpoint.trim().is_empty() {
            return Err(ShortyError::Config(
                "geo.endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from a YAML string
pub fn load_settings_from_yaml(yaml: &str) -> Result<Settings> {
    let settings: Settings = serde_yaml::from_str(yaml)?;
    settings.validate()?;
    Ok(settings)
}
