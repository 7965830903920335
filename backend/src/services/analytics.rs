//! Incremental per-event analytics.
//!
//! Every aggregation key owns a state document (phase -> observation id ->
//! date) and a result document (phase -> order statistics of the live dates).
//! Each mutation is a read-modify-write of that pair inside one optimistic
//! transaction, retried on conflict.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::altitude::AltitudeClassifier;
use super::error::{StatisticsError, StatisticsResult};
use super::quantiles::summarize;
use crate::api::{AltitudeBand, AnalyticsKey, AnalyticsState, Observation, ObservationId, Phenophase, Source, Species};
use crate::db::config::StatisticsConfig;
use crate::db::models::{encode, DocumentUpdate};
use crate::db::repository::{DocumentStore, IndividualRepository, Transaction};

/// Keys touched by one observation: its own source and `"all"`, each again
/// with the altitude band when one is known.
pub fn aggregation_keys(
    year: i32,
    species: &Species,
    source: &Source,
    altitude: Option<AltitudeBand>,
) -> Vec<AnalyticsKey> {
    let mut sources = vec![source.clone()];
    if !source.is_all() {
        sources.push(Source::all());
    }

    let bands = std::iter::once(None).chain(altitude.map(Some));
    bands
        .flat_map(|band| {
            sources
                .iter()
                .map(move |source| AnalyticsKey::new(year, species.clone(), source.clone(), band))
        })
        .collect()
}

/// Change applied to one aggregation key.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Insert {
        observation_id: ObservationId,
        phenophase: Phenophase,
        date: DateTime<Utc>,
    },
    Remove {
        observation_id: ObservationId,
        phenophase: Phenophase,
    },
}

impl Mutation {
    fn phenophase(&self) -> &Phenophase {
        match self {
            Mutation::Insert { phenophase, .. } | Mutation::Remove { phenophase, .. } => phenophase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// Nothing to do; the transaction was abandoned.
    Skipped,
}

/// Maintains the analytics state and result documents.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine {
    state_collection: String,
    result_collection: String,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl AnalyticsEngine {
    pub fn new(config: &StatisticsConfig) -> Self {
        Self {
            state_collection: config.collections.analytics_state.clone(),
            result_collection: config.collections.analytics_result.clone(),
            max_attempts: config.store.transaction_max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.store.retry_backoff_ms),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn state_collection(&self) -> &str {
        &self.state_collection
    }

    pub fn result_collection(&self) -> &str {
        &self.result_collection
    }

    /// Apply `mutation` to the document pair of `key` through `txn`.
    ///
    /// Reads and writes go through the transaction only; committing is left to
    /// the caller. A removal of an observation the state does not hold is
    /// logged and reported as [`MutationOutcome::Skipped`] without writes.
    pub async fn apply_in_transaction(
        &self,
        txn: &mut dyn Transaction,
        key: &AnalyticsKey,
        mutation: &Mutation,
    ) -> StatisticsResult<MutationOutcome> {
        let phase = mutation.phenophase();
        if phase.as_str().is_empty() || phase.as_str().contains('.') {
            return Err(StatisticsError::InvalidArgument(format!(
                "phenophase '{}' cannot be used as a field name",
                phase
            )));
        }

        let id = key.document_id();
        let existing = txn.get(&self.state_collection, &id).await?;

        let mut state = match (&existing, mutation) {
            (Some(doc), _) => doc.decode::<AnalyticsState>()?,
            (None, Mutation::Insert { .. }) => AnalyticsState::empty(key),
            (None, Mutation::Remove { observation_id, .. }) => {
                log::error!(
                    "Cannot remove observation {} from {}: no analytics state",
                    observation_id,
                    id
                );
                return Ok(MutationOutcome::Skipped);
            }
        };

        match mutation {
            Mutation::Insert {
                observation_id,
                phenophase,
                date,
            } => state.insert(phenophase, observation_id, *date),
            Mutation::Remove {
                observation_id,
                phenophase,
            } => {
                if !state.remove(phenophase, observation_id) {
                    log::error!(
                        "Cannot remove observation {} from {}: not aggregated under {}",
                        observation_id,
                        id,
                        phenophase
                    );
                    return Ok(MutationOutcome::Skipped);
                }
            }
        }

        txn.set(&self.state_collection, &id, encode(&state)?, false);
        txn.merge_fields(&self.result_collection, &id, result_update(key, phase, &state)?);
        Ok(MutationOutcome::Applied)
    }

    /// Record `date` for an observation under `key`.
    pub async fn update<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        key: &AnalyticsKey,
        observation_id: &ObservationId,
        phenophase: &Phenophase,
        date: DateTime<Utc>,
    ) -> StatisticsResult<MutationOutcome> {
        let mutation = Mutation::Insert {
            observation_id: observation_id.clone(),
            phenophase: phenophase.clone(),
            date,
        };
        self.run(store, key, &mutation).await
    }

    /// Withdraw an observation from `key`.
    pub async fn remove<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        key: &AnalyticsKey,
        observation_id: &ObservationId,
        phenophase: &Phenophase,
    ) -> StatisticsResult<MutationOutcome> {
        let mutation = Mutation::Remove {
            observation_id: observation_id.clone(),
            phenophase: phenophase.clone(),
        };
        self.run(store, key, &mutation).await
    }

    /// Add an observation to every key it aggregates into.
    ///
    /// Returns the number of keys updated.
    pub async fn record_observation<R>(
        &self,
        repo: &R,
        altitude: &AltitudeClassifier,
        observation: &Observation,
    ) -> StatisticsResult<usize>
    where
        R: DocumentStore + IndividualRepository + ?Sized,
    {
        let mutation = Mutation::Insert {
            observation_id: observation.id.clone(),
            phenophase: observation.phenophase.clone(),
            date: observation.date,
        };
        self.fan_out(repo, altitude, observation, &mutation).await
    }

    /// Remove an observation from every key it aggregates into.
    ///
    /// Returns the number of keys changed.
    pub async fn retract_observation<R>(
        &self,
        repo: &R,
        altitude: &AltitudeClassifier,
        observation: &Observation,
    ) -> StatisticsResult<usize>
    where
        R: DocumentStore + IndividualRepository + ?Sized,
    {
        let mutation = Mutation::Remove {
            observation_id: observation.id.clone(),
            phenophase: observation.phenophase.clone(),
        };
        self.fan_out(repo, altitude, observation, &mutation).await
    }

    async fn fan_out<R>(
        &self,
        repo: &R,
        altitude: &AltitudeClassifier,
        observation: &Observation,
        mutation: &Mutation,
    ) -> StatisticsResult<usize>
    where
        R: DocumentStore + IndividualRepository + ?Sized,
    {
        let (band, lookup_error) = match altitude.classify(repo, &observation.individual_id).await {
            Ok(band) => (Some(band), None),
            Err(e @ (StatisticsError::NotFound(_) | StatisticsError::MissingAttribute { .. })) => {
                log::warn!(
                    "No altitude band for observation {}, skipping banded analytics: {}",
                    observation.id,
                    e
                );
                (None, None)
            }
            Err(e) => {
                log::warn!(
                    "Altitude lookup failed for observation {}, skipping banded analytics: {}",
                    observation.id,
                    e
                );
                (None, Some(e))
            }
        };

        let keys = aggregation_keys(observation.year, &observation.species, &observation.source, band);
        let mut applied = 0;
        for key in &keys {
            if self.run(repo, key, mutation).await? == MutationOutcome::Applied {
                applied += 1;
            }
        }
        log::debug!(
            "Observation {} changed {} of {} analytics keys",
            observation.id,
            applied,
            keys.len()
        );

        // The source-level keys are done; surface a store failure of the lookup.
        match lookup_error {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }

    async fn run<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        key: &AnalyticsKey,
        mutation: &Mutation,
    ) -> StatisticsResult<MutationOutcome> {
        let mut attempt = 1;
        loop {
            match self.attempt(store, key, mutation).await {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    log::warn!(
                        "Analytics transaction for {} failed (attempt {}/{}), retrying: {}",
                        key.document_id(),
                        attempt,
                        self.max_attempts,
                        e
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn attempt<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        key: &AnalyticsKey,
        mutation: &Mutation,
    ) -> StatisticsResult<MutationOutcome> {
        let mut txn = store.begin_transaction().await?;
        let outcome = self.apply_in_transaction(txn.as_mut(), key, mutation).await?;
        if outcome == MutationOutcome::Applied {
            txn.commit().await?;
        }
        Ok(outcome)
    }
}

/// Patch of the result document for one phase: the key fields, plus either
/// the phase's statistics or a tombstone when no live dates remain.
fn result_update(key: &AnalyticsKey, phase: &Phenophase, state: &AnalyticsState) -> StatisticsResult<DocumentUpdate> {
    let mut update = DocumentUpdate::new()
        .set("year", key.year)
        .set("species", key.species.as_str())
        .set("source", key.source.as_str());
    if let Some(band) = key.altitude_grp {
        update = update.set("altitude_grp", band.as_str());
    }

    let path = format!("values.{}", phase);
    Ok(match summarize(&state.dates(phase)) {
        Some(summary) => update.set(path, serde_json::to_value(summary).map_err(crate::db::RepositoryError::from)?),
        None => update.delete(path),
    })
}

#[cfg(test)]
#[path = "analytics_tests.rs"]
mod analytics_tests;
