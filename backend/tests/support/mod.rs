#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Mutex;

use pheno_stats::api::{Individual, Observation};
use pheno_stats::db::repositories::LocalRepository;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the previous values on unwind and serializes access to the
/// process-global environment across parallel tests.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn observation(
    id: &str,
    individual: &str,
    year: i32,
    phase: &str,
    source: &str,
    on: DateTime<Utc>,
) -> Observation {
    Observation {
        id: id.into(),
        individual_id: individual.into(),
        year,
        species: "Fagus".into(),
        phenophase: phase.into(),
        source: source.into(),
        date: on,
        comment: None,
    }
}

/// Repository with three individuals: `low` (alt1), `high` (alt5) and
/// `nowhere` without altitude.
pub fn seeded_repository() -> LocalRepository {
    let repo = LocalRepository::new();
    for (id, altitude) in [("low", Some(320.0)), ("high", Some(1410.0)), ("nowhere", None)] {
        repo.insert_individual(&Individual {
            id: id.into(),
            altitude,
            species: Some("Fagus".into()),
        })
        .unwrap();
    }
    repo
}
