//! Resolved settings for climate data acquisition.

use crate::error::ClimateError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_KEY: &str = "NSRDB_API_KEY";
pub const ENV_API_EMAIL: &str = "NSRDB_API_EMAIL";
pub const ENV_NCEI_TOKEN: &str = "NCEI_API_TOKEN";

/// Settings for the cache, the data sources and the orchestrator.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
/// Environment variables take precedence over file values once
/// [`ClimateConfig::with_env_overrides`] is applied.
///
/// ```
/// use solar_climate::ClimateConfig;
///
/// let config = ClimateConfig::default();
/// assert_eq!(config.api_key, "DEMO_KEY");
/// assert_eq!(config.cache_max_age_days, 365);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// NREL developer API key.
    pub api_key: String,
    /// Email registered with the NREL API key.
    pub api_email: String,
    pub default_year: i32,
    pub cache_max_age_days: i64,
    pub cache_dir: PathBuf,
    /// Maximum distance for substituting a nearby cache file.
    pub max_cache_distance_km: f64,
    /// NOAA CDO token. Precipitation enrichment is skipped without one.
    pub ncei_token: Option<String>,
    pub precipitation_enabled: bool,
    pub max_station_distance_km: f64,
    pub request_timeout_secs: u64,
    pub enrichment_timeout_secs: u64,
    pub max_concurrent_fetches: usize,
    /// Pause before each retry of a failed primary fetch.
    pub retry_delay_ms: u64,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            api_key: "DEMO_KEY".to_string(),
            api_email: "demo@example.com".to_string(),
            default_year: 2024,
            cache_max_age_days: 365,
            cache_dir: PathBuf::from("data/climate"),
            max_cache_distance_km: 50.0,
            ncei_token: None,
            precipitation_enabled: true,
            max_station_distance_km: 100.0,
            request_timeout_secs: 120,
            enrichment_timeout_secs: 30,
            max_concurrent_fetches: 4,
            retry_delay_ms: 0,
        }
    }
}

impl ClimateConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ClimateError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClimateError::ConfigRead(path.to_path_buf(), e))?;
        serde_json::from_str(&contents).map_err(|e| ClimateError::ConfigParse(path.to_path_buf(), e))
    }

    /// Applies `NSRDB_API_KEY`, `NSRDB_API_EMAIL` and `NCEI_API_TOKEN` from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`. Unset or empty values leave the field untouched.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(key) = value(ENV_API_KEY) {
            self.api_key = key;
        }
        if let Some(email) = value(ENV_API_EMAIL) {
            self.api_email = email;
        }
        if let Some(token) = value(ENV_NCEI_TOKEN) {
            self.ncei_token = Some(token);
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn enrichment_timeout(&self) -> Duration {
        Duration::from_secs(self.enrichment_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ClimateConfig::default();
        assert_eq!(config.api_email, "demo@example.com");
        assert_eq!(config.default_year, 2024);
        assert_eq!(config.cache_dir, PathBuf::from("data/climate"));
        assert_eq!(config.max_cache_distance_km, 50.0);
        assert_eq!(config.max_station_distance_km, 100.0);
        assert!(config.precipitation_enabled);
        assert_eq!(config.ncei_token, None);
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_concurrent_fetches, 4);
    }

    #[test]
    fn test_overrides_replace_only_set_values() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "real-key"),
            (ENV_API_EMAIL, "   "),
            (ENV_NCEI_TOKEN, "token-123"),
        ]
        .into_iter()
        .collect();

        let config = ClimateConfig::default()
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.api_key, "real-key");
        assert_eq!(config.api_email, "demo@example.com");
        assert_eq!(config.ncei_token.as_deref(), Some("token-123"));

        let untouched = ClimateConfig::default().apply_overrides(|_| None);
        assert_eq!(untouched, ClimateConfig::default());
    }

    #[test]
    fn test_partial_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("climate.json");
        std::fs::write(
            &path,
            r#"{ "default_year": 2022, "cache_dir": "/tmp/weather", "precipitation_enabled": false }"#,
        )
        .unwrap();

        let config = ClimateConfig::from_json_file(&path).unwrap();
        assert_eq!(config.default_year, 2022);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/weather"));
        assert!(!config.precipitation_enabled);
        assert_eq!(config.api_key, "DEMO_KEY");
    }

    #[test]
    fn test_bad_json_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("climate.json");
        std::fs::write(&path, "{ default_year: ").unwrap();
        assert!(matches!(
            ClimateConfig::from_json_file(&path),
            Err(ClimateError::ConfigParse(_, _))
        ));
        assert!(matches!(
            ClimateConfig::from_json_file(&dir.path().join("missing.json")),
            Err(ClimateError::ConfigRead(_, _))
        ));
    }
}
