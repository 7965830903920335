//! Configuration loading from files and the environment.

mod support;

use std::io::Write;

use pheno_stats::db::config::{BATCH_SIZE_ENV, CONFIG_PATH_ENV, TXN_ATTEMPTS_ENV};
use pheno_stats::db::{RepositoryError, StatisticsConfig};
use support::with_scoped_env;

fn config_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_from_file_reads_every_section() {
    let file = config_file(
        r#"
        [collections]
        analytics_state = "live_state"

        [phenology]
        relevant_phenophases = ["BEA", "BLA"]
        comment_markers = ["dup"]
        window_ranges = [10]
        min_window_observations = 50

        [store]
        batch_size = 250
        transaction_max_attempts = 8
        retry_backoff_ms = 5
        "#,
    );

    let config = StatisticsConfig::from_file(file.path()).unwrap();
    assert_eq!(config.collections.analytics_state, "live_state");
    assert_eq!(config.collections.analytics_result, "analytics_result");
    assert_eq!(config.phenology.relevant_phenophases.len(), 2);
    assert_eq!(config.phenology.window_ranges, vec![10]);
    assert_eq!(config.phenology.min_window_observations, 50);
    assert_eq!(config.store.batch_size, 250);
    assert_eq!(config.store.transaction_max_attempts, 8);
}

#[test]
fn test_missing_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = StatisticsConfig::from_file(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(RepositoryError::ConfigurationError { .. })));
}

#[test]
fn test_empty_phase_set_is_rejected() {
    let file = config_file("[phenology]\nrelevant_phenophases = []\n");
    assert!(StatisticsConfig::from_file(file.path()).is_err());
}

#[test]
fn test_env_points_at_file_and_overrides_numbers() {
    let file = config_file("[store]\nbatch_size = 100\n");
    let path = file.path().to_string_lossy().to_string();

    let config = with_scoped_env(
        &[
            (CONFIG_PATH_ENV, Some(path.as_str())),
            (BATCH_SIZE_ENV, Some("40")),
            (TXN_ATTEMPTS_ENV, Some("2")),
        ],
        StatisticsConfig::from_env,
    )
    .unwrap();

    assert_eq!(config.store.batch_size, 40);
    assert_eq!(config.store.transaction_max_attempts, 2);
}

#[test]
fn test_env_override_must_be_valid() {
    let file = config_file("");
    let path = file.path().to_string_lossy().to_string();

    let not_a_number = with_scoped_env(
        &[
            (CONFIG_PATH_ENV, Some(path.as_str())),
            (BATCH_SIZE_ENV, Some("lots")),
            (TXN_ATTEMPTS_ENV, None),
        ],
        StatisticsConfig::from_env,
    );
    assert!(matches!(not_a_number, Err(RepositoryError::ConfigurationError { .. })));

    let too_large = with_scoped_env(
        &[
            (CONFIG_PATH_ENV, Some(path.as_str())),
            (BATCH_SIZE_ENV, Some("900")),
            (TXN_ATTEMPTS_ENV, None),
        ],
        StatisticsConfig::from_env,
    );
    assert!(too_large.is_err());
}
