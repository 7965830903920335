//! Statistics configuration file support.
//!
//! Settings are read from a TOML file; every section and key is optional and
//! falls back to the defaults below. A few operational knobs can additionally
//! be overridden from the environment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::repository::{RepositoryError, RepositoryResult, MAX_BATCH_WRITES};
use crate::api::Phenophase;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "PHENO_STATS_CONFIG";
/// Environment override for `store.batch_size`.
pub const BATCH_SIZE_ENV: &str = "PHENO_STATS_BATCH_SIZE";
/// Environment override for `store.transaction_max_attempts`.
pub const TXN_ATTEMPTS_ENV: &str = "PHENO_STATS_TXN_ATTEMPTS";

/// Complete statistics configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsConfig {
    #[serde(default)]
    pub collections: CollectionNames,
    #[serde(default)]
    pub phenology: PhenologySettings,
    #[serde(default)]
    pub store: StoreSettings,
}

/// Names of the collections read and written by the statistics core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionNames {
    pub observations: String,
    pub individuals: String,
    pub definitions: String,
    pub analytics_state: String,
    pub analytics_result: String,
    pub statistics: String,
    pub statistics_yearly_species: String,
    pub statistics_yearly_altitude: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            observations: "observations".to_string(),
            individuals: "individuals".to_string(),
            definitions: "definitions".to_string(),
            analytics_state: "analytics_state".to_string(),
            analytics_result: "analytics_result".to_string(),
            statistics: "statistics".to_string(),
            statistics_yearly_species: "statistics_yearly_species".to_string(),
            statistics_yearly_altitude: "statistics_yearly_altitude".to_string(),
        }
    }
}

/// Domain settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhenologySettings {
    /// Phases included in batch statistics.
    pub relevant_phenophases: Vec<Phenophase>,
    /// Comment fragments marking an observation as non-authoritative.
    pub comment_markers: Vec<String>,
    /// Widths, in years, of the rolled-up windows.
    pub window_ranges: Vec<i32>,
    /// Significance floor used by the window validity check.
    pub min_window_observations: u64,
}

fn default_relevant_phenophases() -> Vec<Phenophase> {
    ["BEA", "BLA", "BFA", "BVA", "BLB", "FRA", "KNS", "KNV"]
        .into_iter()
        .map(Phenophase::from)
        .collect()
}

fn default_comment_markers() -> Vec<String> {
    vec!["duplicate".to_string(), "correction".to_string()]
}

impl Default for PhenologySettings {
    fn default() -> Self {
        Self {
            relevant_phenophases: default_relevant_phenophases(),
            comment_markers: default_comment_markers(),
            window_ranges: vec![5, 30],
            min_window_observations: 20,
        }
    }
}

/// Document store tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub batch_size: usize,
    pub transaction_max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_WRITES,
            transaction_max_attempts: 5,
            retry_backoff_ms: 25,
        }
    }
}

impl StatisticsConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(StatisticsConfig)` if successful
    /// * `Err(RepositoryError)` if file cannot be read, parsed or validated
    pub fn from_file<P: AsRef<Path>>(path: P) -> RepositoryResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RepositoryError::configuration(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> RepositoryResult<Self> {
        let config: StatisticsConfig = toml::from_str(content).map_err(|e| {
            RepositoryError::configuration(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `statistics.toml` in:
    /// 1. Current directory
    /// 2. `backend/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> RepositoryResult<Self> {
        let search_paths = [
            PathBuf::from("statistics.toml"),
            PathBuf::from("backend/statistics.toml"),
            PathBuf::from("../statistics.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(RepositoryError::configuration(
            "No statistics.toml found in standard locations",
        ))
    }

    /// Resolve configuration from the environment.
    ///
    /// Uses the file named by `PHENO_STATS_CONFIG`, else the default
    /// location, else built-in defaults; then applies the numeric overrides.
    pub fn from_env() -> RepositoryResult<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::from_default_location().unwrap_or_else(|e| {
                log::debug!("Using default statistics configuration: {}", e);
                Self::default()
            }),
        };

        if let Some(batch_size) = env_override::<usize>(BATCH_SIZE_ENV)? {
            config.store.batch_size = batch_size;
        }
        if let Some(attempts) = env_override::<u32>(TXN_ATTEMPTS_ENV)? {
            config.store.transaction_max_attempts = attempts;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the store or the aggregation cannot honour.
    pub fn validate(&self) -> RepositoryResult<()> {
        if self.store.batch_size == 0 || self.store.batch_size > MAX_BATCH_WRITES {
            return Err(RepositoryError::configuration(format!(
                "store.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_WRITES, self.store.batch_size
            )));
        }
        if self.store.transaction_max_attempts == 0 {
            return Err(RepositoryError::configuration(
                "store.transaction_max_attempts must be at least 1",
            ));
        }
        if self.phenology.relevant_phenophases.is_empty() {
            return Err(RepositoryError::configuration(
                "phenology.relevant_phenophases must not be empty",
            ));
        }
        if let Some(width) = self.phenology.window_ranges.iter().find(|w| **w <= 0) {
            return Err(RepositoryError::configuration(format!(
                "phenology.window_ranges must be positive, got {}",
                width
            )));
        }
        Ok(())
    }
}

fn env_override<T: std::str::FromStr>(key: &str) -> RepositoryResult<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            RepositoryError::configuration(format!("{} is not a valid number: {}", key, raw))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = StatisticsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.phenology.relevant_phenophases.len(), 8);
        assert_eq!(config.store.batch_size, 500);
        assert_eq!(config.collections.analytics_state, "analytics_state");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = StatisticsConfig::from_toml_str(
            r#"
            [collections]
            statistics = "stats_v2"

            [store]
            batch_size = 100
            "#,
        )
        .unwrap();

        assert_eq!(config.collections.statistics, "stats_v2");
        assert_eq!(config.collections.observations, "observations");
        assert_eq!(config.store.batch_size, 100);
        assert_eq!(config.store.transaction_max_attempts, 5);
        assert_eq!(config.phenology.window_ranges, vec![5, 30]);
    }

    #[test]
    fn test_batch_size_above_store_ceiling_is_rejected() {
        let result = StatisticsConfig::from_toml_str("[store]\nbatch_size = 501\n");
        assert!(matches!(result, Err(RepositoryError::ConfigurationError { .. })));
    }

    #[test]
    fn test_non_positive_window_is_rejected() {
        let result = StatisticsConfig::from_toml_str("[phenology]\nwindow_ranges = [5, 0]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_toml_is_a_configuration_error() {
        let result = StatisticsConfig::from_toml_str("[store\nbatch_size = 1");
        assert!(matches!(result, Err(RepositoryError::ConfigurationError { .. })));
    }
}
