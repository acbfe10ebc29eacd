//! Configuration management for hybridroute
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::router::{RoutingPreferences, Tier, decision};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Upper bound for every timeout setting, in seconds
pub const MAX_TIMEOUT_SECONDS: u64 = 300;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub local: LocalConfig,
    /// Session defaults applied at startup
    #[serde(default)]
    pub preferences: RoutingPreferences,
    #[serde(default)]
    pub availability: AvailabilityConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout() -> u64 {
    60
}

/// Remote collaborator base URLs
///
/// Fields are private so validated URLs cannot be changed afterwards.
/// Paths (`/v1/chat/completions`, `/v1/health`) are appended by the router.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EndpointsConfig {
    on_premise: String,
    cloud: String,
    health: String,
}

impl EndpointsConfig {
    pub fn on_premise(&self) -> &str {
        &self.on_premise
    }

    pub fn cloud(&self) -> &str {
        &self.cloud
    }

    /// Base URL of the combined health endpoint
    pub fn health(&self) -> &str {
        &self.health
    }

    /// Base URL for a remote tier, `None` for the local tier
    pub fn for_tier(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Browser => None,
            Tier::OnPremise => Some(&self.on_premise),
            Tier::Cloud => Some(&self.cloud),
        }
    }
}

/// Local model server (Browser tier)
///
/// Without `base_url` the Browser tier is never ready.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_local_model")]
    pub model: String,
    #[serde(default = "default_true")]
    pub load_on_startup: bool,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_local_model(),
            load_on_startup: true,
        }
    }
}

fn default_local_model() -> String {
    decision::model_for(Tier::Browser).to_string()
}

fn default_true() -> bool {
    true
}

/// Availability probing schedule
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AvailabilityConfig {
    /// Probe once before serving
    #[serde(default = "default_true")]
    pub probe_on_startup: bool,
    /// Re-probe periodically; 0 disables the background loop
    #[serde(default)]
    pub probe_interval_seconds: u64,
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            probe_on_startup: true,
            probe_interval_seconds: 0,
        }
    }
}

/// Per-tier timeout overrides
///
/// Tiers without an override use `server.request_timeout_seconds`.
/// All values must be in (0, 300] seconds.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TimeoutsConfig {
    browser: Option<u64>,
    on_premise: Option<u64>,
    cloud: Option<u64>,
    /// Timeout for the availability probe (defaults to 5 seconds)
    health: Option<u64>,
}

impl TimeoutsConfig {
    /// Create a new TimeoutsConfig
    ///
    /// # Errors
    ///
    /// Returns an error if any timeout is zero or exceeds 300 seconds.
    pub fn new(
        browser: Option<u64>,
        on_premise: Option<u64>,
        cloud: Option<u64>,
        health: Option<u64>,
    ) -> AppResult<Self> {
        let timeouts = Self {
            browser,
            on_premise,
            cloud,
            health,
        };
        timeouts.validate()?;
        Ok(timeouts)
    }

    fn validate(&self) -> AppResult<()> {
        for (name, timeout) in [
            ("browser", self.browser),
            ("on_premise", self.on_premise),
            ("cloud", self.cloud),
            ("health", self.health),
        ] {
            if let Some(timeout) = timeout {
                check_timeout(&format!("timeouts.{name}"), timeout)?;
            }
        }
        Ok(())
    }

    pub fn browser(&self) -> Option<u64> {
        self.browser
    }

    pub fn on_premise(&self) -> Option<u64> {
        self.on_premise
    }

    pub fn cloud(&self) -> Option<u64> {
        self.cloud
    }

    pub fn health(&self) -> Option<u64> {
        self.health
    }
}

fn check_timeout(name: &str, timeout: u64) -> AppResult<()> {
    if timeout == 0 {
        return Err(AppError::Config(format!(
            "{name} must be greater than 0, got {timeout}"
        )));
    }
    if timeout > MAX_TIMEOUT_SECONDS {
        return Err(AppError::Config(format!(
            "{name} cannot exceed {MAX_TIMEOUT_SECONDS} seconds (5 minutes), got {timeout}"
        )));
    }
    Ok(())
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Default probe timeout when `timeouts.health` is unset
const DEFAULT_HEALTH_TIMEOUT_SECONDS: u64 = 5;

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        // Phase 3: Validate parsed config
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Get timeout for a tier
    ///
    /// Returns the per-tier timeout if configured, otherwise falls back to
    /// the global `server.request_timeout_seconds`.
    pub fn timeout_for_tier(&self, tier: Tier) -> u64 {
        let tier_timeout = match tier {
            Tier::Browser => self.timeouts.browser(),
            Tier::OnPremise => self.timeouts.on_premise(),
            Tier::Cloud => self.timeouts.cloud(),
        };
        tier_timeout.unwrap_or(self.server.request_timeout_seconds)
    }

    /// Get timeout for the availability probe
    pub fn health_timeout(&self) -> u64 {
        self.timeouts
            .health()
            .unwrap_or(DEFAULT_HEALTH_TIMEOUT_SECONDS)
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()` and `from_str()`, but
    /// can also be called explicitly (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        let mut urls = vec![
            ("endpoints.on_premise", self.endpoints.on_premise.as_str()),
            ("endpoints.cloud", self.endpoints.cloud.as_str()),
            ("endpoints.health", self.endpoints.health.as_str()),
        ];
        if let Some(base_url) = &self.local.base_url {
            urls.push(("local.base_url", base_url.as_str()));
        }

        for (name, url) in urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "{name} has invalid URL '{url}'. URLs must start with 'http://' or 'https://'."
                )));
            }
            // Paths are appended as /v1/..., so a /v1 suffix would double it
            if url.trim_end_matches('/').ends_with("/v1") {
                return Err(AppError::Config(format!(
                    "{name} has URL '{url}' ending in '/v1'. \
                    Configure the base URL only (e.g., 'http://host:port'); \
                    '/v1/chat/completions' and '/v1/health' are appended automatically."
                )));
            }
        }

        if self.local.model.trim().is_empty() {
            return Err(AppError::Config(
                "local.model must not be empty".to_string(),
            ));
        }

        check_timeout(
            "server.request_timeout_seconds",
            self.server.request_timeout_seconds,
        )?;
        self.timeouts.validate()?;

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{PreferredTier, PrivacyLevel};

    const TEST_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 3000
request_timeout_seconds = 30

[endpoints]
on_premise = "http://gpu-cluster.internal:8000"
cloud = "https://inference.example.com"
health = "http://gateway.internal:8080"

[local]
base_url = "http://127.0.0.1:11434"
model = "llama-3.2-3b-instruct-q4"
load_on_startup = false

[preferences]
preferred_tier = "auto"
privacy_level = "high"
cost_optimization = true

[availability]
probe_interval_seconds = 30

[timeouts]
browser = 120
cloud = 45

[observability]
log_level = "debug"
"#;

    const MINIMAL_CONFIG: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[endpoints]
on_premise = "http://localhost:8000"
cloud = "https://cloud.example.com"
health = "http://localhost:8080"
"#;

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.endpoints.on_premise(), "http://gpu-cluster.internal:8000");
        assert_eq!(config.endpoints.cloud(), "https://inference.example.com");
        assert_eq!(config.endpoints.health(), "http://gateway.internal:8080");
        assert_eq!(
            config.local.base_url.as_deref(),
            Some("http://127.0.0.1:11434")
        );
        assert!(!config.local.load_on_startup);
        assert_eq!(config.availability.probe_interval_seconds, 30);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_config_parses_preferences() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.preferences.preferred_tier, PreferredTier::Auto);
        assert_eq!(config.preferences.privacy_level, PrivacyLevel::High);
        assert!(config.preferences.cost_optimization);
        // Unspecified fields keep their defaults
        assert!(config.preferences.fallback_enabled);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_str(MINIMAL_CONFIG).expect("should parse minimal config");
        assert_eq!(config.server.request_timeout_seconds, 60);
        assert_eq!(config.local.base_url, None);
        assert_eq!(config.local.model, decision::model_for(Tier::Browser));
        assert!(config.availability.probe_on_startup);
        assert_eq!(config.availability.probe_interval_seconds, 0);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.preferences, RoutingPreferences::default());
    }

    #[test]
    fn test_timeout_for_tier_override_and_default() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.timeout_for_tier(Tier::Browser), 120);
        assert_eq!(config.timeout_for_tier(Tier::Cloud), 45);
        assert_eq!(config.timeout_for_tier(Tier::OnPremise), 30);
        assert_eq!(config.health_timeout(), 5);
    }

    #[test]
    fn test_endpoints_for_tier() {
        let config = Config::from_str(MINIMAL_CONFIG).expect("should parse config");
        assert_eq!(config.endpoints.for_tier(Tier::Browser), None);
        assert_eq!(
            config.endpoints.for_tier(Tier::OnPremise),
            Some("http://localhost:8000")
        );
        assert_eq!(
            config.endpoints.for_tier(Tier::Cloud),
            Some("https://cloud.example.com")
        );
    }

    #[test]
    fn test_rejects_non_http_url() {
        let bad = MINIMAL_CONFIG.replace("http://localhost:8000", "localhost:8000");
        let err = Config::from_str(&bad).unwrap_err().to_string();
        assert!(err.contains("endpoints.on_premise"), "{err}");
        assert!(err.contains("http://"), "{err}");
    }

    #[test]
    fn test_rejects_v1_suffix() {
        let bad = MINIMAL_CONFIG.replace("https://cloud.example.com", "https://cloud.example.com/v1");
        let err = Config::from_str(&bad).unwrap_err().to_string();
        assert!(err.contains("endpoints.cloud"), "{err}");
        assert!(err.contains("/v1"), "{err}");
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let bad = format!("{MINIMAL_CONFIG}\n[timeouts]\ncloud = 0\n");
        let err = Config::from_str(&bad).unwrap_err().to_string();
        assert!(err.contains("timeouts.cloud"), "{err}");
    }

    #[test]
    fn test_rejects_excessive_request_timeout() {
        let bad = MINIMAL_CONFIG.replace("port = 8080", "port = 8080\nrequest_timeout_seconds = 301");
        let err = Config::from_str(&bad).unwrap_err().to_string();
        assert!(err.contains("request_timeout_seconds"), "{err}");
    }

    #[test]
    fn test_rejects_unknown_preference_value() {
        let bad = format!("{MINIMAL_CONFIG}\n[preferences]\nprivacy_level = \"extreme\"\n");
        assert!(matches!(
            Config::from_str(&bad),
            Err(AppError::ConfigParseFailed { .. })
        ));
    }

    #[test]
    fn test_timeouts_config_new_validates() {
        assert!(TimeoutsConfig::new(Some(10), None, Some(300), Some(2)).is_ok());
        assert!(TimeoutsConfig::new(None, Some(301), None, None).is_err());
        assert!(TimeoutsConfig::new(None, None, None, Some(0)).is_err());
    }
}
