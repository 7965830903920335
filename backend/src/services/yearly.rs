//! Full-year date distributions per species and source.
//!
//! Every observation contributes twice: to its own source and to the
//! cross-source `"all"` bucket. The altitude variant nests the band under the
//! phenophase.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use super::altitude::AltitudeClassifier;
use super::error::{StatisticsError, StatisticsResult};
use super::quantiles::distribution_stats;
use crate::api::{
    yearly_document_id, AltitudeBand, Observation, Phenophase, Source, Species, YearlyAltitudeStatistic,
    YearlySpeciesStatistic,
};
use crate::db::repository::IndividualRepository;

type GroupKey = (i32, Species, Source);

fn sources_of(observation: &Observation) -> Vec<Source> {
    if observation.source.is_all() {
        vec![Source::all()]
    } else {
        vec![observation.source.clone(), Source::all()]
    }
}

fn ensure_input(observations: &[Observation]) -> StatisticsResult<()> {
    if observations.is_empty() {
        return Err(StatisticsError::EmptyInput(
            "yearly statistics over zero observations".to_string(),
        ));
    }
    Ok(())
}

/// Computes the yearly species and altitude statistics documents.
pub struct YearlyDistributionAggregator<'a> {
    altitude: &'a AltitudeClassifier,
}

impl<'a> YearlyDistributionAggregator<'a> {
    pub fn new(altitude: &'a AltitudeClassifier) -> Self {
        Self { altitude }
    }

    /// Distribution per `(year, species, source)` and phenophase, keyed by
    /// [`yearly_document_id`].
    ///
    /// # Returns
    /// * `Err(StatisticsError::EmptyInput)` - If `observations` is empty
    pub fn species_stats(observations: &[Observation]) -> StatisticsResult<BTreeMap<String, YearlySpeciesStatistic>> {
        ensure_input(observations)?;

        let mut groups: BTreeMap<GroupKey, BTreeMap<Phenophase, Vec<DateTime<Utc>>>> = BTreeMap::new();
        for observation in observations {
            for source in sources_of(observation) {
                groups
                    .entry((observation.year, observation.species.clone(), source))
                    .or_default()
                    .entry(observation.phenophase.clone())
                    .or_default()
                    .push(observation.date);
            }
        }

        let mut statistics = BTreeMap::new();
        for ((year, species, source), phases) in groups {
            let values = phases
                .into_iter()
                .map(|(phase, dates)| Ok((phase, distribution_stats(&dates)?)))
                .collect::<StatisticsResult<BTreeMap<_, _>>>()?;
            statistics.insert(
                yearly_document_id(year, &species, &source),
                YearlySpeciesStatistic {
                    year,
                    species,
                    source,
                    values,
                },
            );
        }
        Ok(statistics)
    }

    /// Distribution per `(year, species, source)`, phenophase and altitude band.
    ///
    /// Observations whose individual cannot be classified are logged and skipped.
    ///
    /// # Returns
    /// * `Err(StatisticsError::EmptyInput)` - If `observations` is empty
    pub async fn altitude_stats<R: IndividualRepository + ?Sized>(
        &self,
        repo: &R,
        observations: &[Observation],
    ) -> StatisticsResult<BTreeMap<String, YearlyAltitudeStatistic>> {
        ensure_input(observations)?;

        let mut banded = Vec::with_capacity(observations.len());
        for observation in observations {
            match self.altitude.classify(repo, &observation.individual_id).await {
                Ok(band) => banded.push((observation, band)),
                Err(e @ StatisticsError::Repository(_)) => return Err(e),
                Err(e) => log::warn!("Skipping observation {} in altitude statistics: {}", observation.id, e),
            }
        }
        Self::altitude_stats_banded(banded)
    }

    /// Altitude statistics over already classified observations.
    pub fn altitude_stats_banded<'o, I>(banded: I) -> StatisticsResult<BTreeMap<String, YearlyAltitudeStatistic>>
    where
        I: IntoIterator<Item = (&'o Observation, AltitudeBand)>,
    {
        let mut groups: BTreeMap<GroupKey, BTreeMap<Phenophase, BTreeMap<AltitudeBand, Vec<DateTime<Utc>>>>> =
            BTreeMap::new();
        for (observation, band) in banded {
            for source in sources_of(observation) {
                groups
                    .entry((observation.year, observation.species.clone(), source))
                    .or_default()
                    .entry(observation.phenophase.clone())
                    .or_default()
                    .entry(band)
                    .or_default()
                    .push(observation.date);
            }
        }

        let mut statistics = BTreeMap::new();
        for ((year, species, source), phases) in groups {
            let mut values = BTreeMap::new();
            for (phase, bands) in phases {
                let per_band = bands
                    .into_iter()
                    .map(|(band, dates)| Ok((band, distribution_stats(&dates)?)))
                    .collect::<StatisticsResult<BTreeMap<_, _>>>()?;
                values.insert(phase, per_band);
            }
            statistics.insert(
                yearly_document_id(year, &species, &source),
                YearlyAltitudeStatistic {
                    year,
                    species,
                    source,
                    values,
                },
            );
        }
        Ok(statistics)
    }
}
