//! Week-of-year counts for single years.

use std::collections::BTreeMap;

use super::altitude::AltitudeClassifier;
use super::error::{StatisticsError, StatisticsResult};
use crate::api::{AltitudeBand, Observation, WeeklyAggregate};
use crate::db::repository::IndividualRepository;
use crate::models::week_of_year;

/// Builds 1-year aggregates keyed by [`WeeklyAggregate::document_id`].
pub struct OneYearAggregator<'a> {
    altitude: &'a AltitudeClassifier,
}

impl<'a> OneYearAggregator<'a> {
    pub fn new(altitude: &'a AltitudeClassifier) -> Self {
        Self { altitude }
    }

    /// Aggregate `observations`, one record per year, species, band and phase.
    ///
    /// Observations whose individual cannot be classified are logged and
    /// skipped. A failing store aborts the run.
    pub async fn aggregate<R: IndividualRepository + ?Sized>(
        &self,
        repo: &R,
        observations: &[Observation],
    ) -> StatisticsResult<BTreeMap<String, WeeklyAggregate>> {
        let mut aggregates = BTreeMap::new();
        let mut skipped = 0usize;

        for observation in observations {
            match self.altitude.classify(repo, &observation.individual_id).await {
                Ok(band) => accumulate(&mut aggregates, observation, band),
                Err(e @ StatisticsError::Repository(_)) => return Err(e),
                Err(e) => {
                    skipped += 1;
                    log::warn!("Skipping observation {}: {}", observation.id, e);
                }
            }
        }

        if skipped > 0 {
            log::info!(
                "Aggregated {} observations into {} 1-year records, skipped {}",
                observations.len() - skipped,
                aggregates.len(),
                skipped
            );
        }
        Ok(aggregates)
    }
}

/// Count one observation into its 1-year record.
pub fn accumulate(aggregates: &mut BTreeMap<String, WeeklyAggregate>, observation: &Observation, band: AltitudeBand) {
    let year = observation.year;
    let record = WeeklyAggregate::one_year(
        year,
        observation.species.clone(),
        band,
        observation.phenophase.clone(),
    );
    let entry = aggregates.entry(record.document_id()).or_insert(record);

    *entry.obs_woy.entry(week_of_year(year, &observation.date)).or_insert(0) += 1;
    *entry.year_obs_sum.entry(year).or_insert(0) += 1;
    entry.agg_obs_sum += 1;
}
