//! Public API surface for the statistics backend.
//!
//! This file consolidates the document shapes read and written by the
//! aggregation services. All types derive Serialize/Deserialize so they can be
//! stored as JSON documents in the backing document store.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_key_type!(Species);
crate::define_key_type!(Source);
crate::define_key_type!(Phenophase);
crate::define_key_type!(IndividualId);
crate::define_key_type!(ObservationId);

/// Aggregate source token combining every observation source.
pub const ALL_SOURCES: &str = "all";

impl Source {
    /// The cross-source aggregate `"all"`.
    pub fn all() -> Self {
        Source::new(ALL_SOURCES)
    }

    pub fn is_all(&self) -> bool {
        self.0 == ALL_SOURCES
    }
}

/// Discrete elevation bucket used to stratify statistics.
///
/// Bands are left-inclusive: an altitude exactly on a threshold belongs to the
/// upper band.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AltitudeBand {
    /// altitude < 500
    Alt1,
    /// 500 <= altitude < 800
    Alt2,
    /// 800 <= altitude < 1000
    Alt3,
    /// 1000 <= altitude < 1200
    Alt4,
    /// altitude >= 1200
    Alt5,
}

impl AltitudeBand {
    pub const ALL: [AltitudeBand; 5] = [
        AltitudeBand::Alt1,
        AltitudeBand::Alt2,
        AltitudeBand::Alt3,
        AltitudeBand::Alt4,
        AltitudeBand::Alt5,
    ];

    /// Classify an altitude in meters.
    pub fn from_altitude(altitude: f64) -> Self {
        if altitude < 500.0 {
            AltitudeBand::Alt1
        } else if altitude < 800.0 {
            AltitudeBand::Alt2
        } else if altitude < 1000.0 {
            AltitudeBand::Alt3
        } else if altitude < 1200.0 {
            AltitudeBand::Alt4
        } else {
            AltitudeBand::Alt5
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AltitudeBand::Alt1 => "alt1",
            AltitudeBand::Alt2 => "alt2",
            AltitudeBand::Alt3 => "alt3",
            AltitudeBand::Alt4 => "alt4",
            AltitudeBand::Alt5 => "alt5",
        }
    }
}

impl fmt::Display for AltitudeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AltitudeBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AltitudeBand::ALL
            .into_iter()
            .find(|band| band.as_str() == s)
            .ok_or_else(|| format!("Unknown altitude band: {}", s))
    }
}

/// A single phenological observation.
///
/// The id is the document id in the observations collection and is not part
/// of the stored payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(skip)]
    pub id: ObservationId,
    pub individual_id: IndividualId,
    pub year: i32,
    pub species: Species,
    pub phenophase: Phenophase,
    pub source: Source,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// The observed plant or animal; only the attributes statistics depend on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    #[serde(skip)]
    pub id: IndividualId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species: Option<Species>,
}

/// Nearest-rank order statistics of a non-empty sample.
///
/// Every field is a member of the sample it was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantileSummary<T> {
    pub min: T,
    pub max: T,
    pub median: T,
    pub quantile_25: T,
    pub quantile_75: T,
}

/// Full-year distribution of observation dates for one phenophase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionStats {
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
    pub median: DateTime<Utc>,
    pub quantile_25: DateTime<Utc>,
    pub quantile_75: DateTime<Utc>,
    pub obs_sum: usize,
}

// ==================== Incremental analytics ====================

/// Aggregation key of the live analytics pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalyticsKey {
    pub year: i32,
    pub species: Species,
    pub source: Source,
    pub altitude_grp: Option<AltitudeBand>,
}

impl AnalyticsKey {
    pub fn new(year: i32, species: Species, source: Source, altitude_grp: Option<AltitudeBand>) -> Self {
        Self {
            year,
            species,
            source,
            altitude_grp,
        }
    }

    /// `{year}_{species}_{source}` with an `_{altitude}` suffix for banded keys.
    ///
    /// Shared by the state and result documents of the key.
    pub fn document_id(&self) -> String {
        match self.altitude_grp {
            Some(band) => format!("{}_{}_{}_{}", self.year, self.species, self.source, band),
            None => format!("{}_{}_{}", self.year, self.species, self.source),
        }
    }
}

/// Working set of the live analytics: phase -> observation id -> date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsState {
    pub year: i32,
    pub species: Species,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_grp: Option<AltitudeBand>,
    #[serde(default)]
    pub state: BTreeMap<Phenophase, BTreeMap<ObservationId, DateTime<Utc>>>,
}

impl AnalyticsState {
    pub fn empty(key: &AnalyticsKey) -> Self {
        Self {
            year: key.year,
            species: key.species.clone(),
            source: key.source.clone(),
            altitude_grp: key.altitude_grp,
            state: BTreeMap::new(),
        }
    }

    /// Insert or overwrite the date of an observation.
    pub fn insert(&mut self, phase: &Phenophase, observation_id: &ObservationId, date: DateTime<Utc>) {
        self.state
            .entry(phase.clone())
            .or_default()
            .insert(observation_id.clone(), date);
    }

    /// Remove an observation; the phase entry goes away with its last observation.
    ///
    /// Returns `false` if the observation was not part of the state.
    pub fn remove(&mut self, phase: &Phenophase, observation_id: &ObservationId) -> bool {
        let Some(observations) = self.state.get_mut(phase) else {
            return false;
        };
        if observations.remove(observation_id).is_none() {
            return false;
        }
        if observations.is_empty() {
            self.state.remove(phase);
        }
        true
    }

    /// Live dates of a phase, empty if the phase has none.
    pub fn dates(&self, phase: &Phenophase) -> Vec<DateTime<Utc>> {
        self.state
            .get(phase)
            .map(|observations| observations.values().copied().collect())
            .unwrap_or_default()
    }
}

/// Derived per-phase statistics of an [`AnalyticsState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    pub year: i32,
    pub species: Species,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude_grp: Option<AltitudeBand>,
    #[serde(default)]
    pub values: BTreeMap<Phenophase, QuantileSummary<DateTime<Utc>>>,
}

// ==================== Weekly aggregates ====================

/// Week-bucketed observation counts over `[start_year, end_year]`.
///
/// A 1-year aggregate has `start_year == end_year`, `agg_range == 1` and
/// `years == 1`; windowed aggregates sum a contiguous span of those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAggregate {
    pub start_year: i32,
    pub end_year: i32,
    pub species: Species,
    pub altitude_grp: AltitudeBand,
    pub phenophase: Phenophase,
    pub agg_range: i32,
    pub obs_woy: BTreeMap<i32, u64>,
    pub year_obs_sum: BTreeMap<i32, u64>,
    pub agg_obs_sum: u64,
    pub years: u32,
}

impl WeeklyAggregate {
    /// Empty 1-year aggregate.
    pub fn one_year(year: i32, species: Species, altitude_grp: AltitudeBand, phenophase: Phenophase) -> Self {
        Self {
            start_year: year,
            end_year: year,
            species,
            altitude_grp,
            phenophase,
            agg_range: 1,
            obs_woy: BTreeMap::new(),
            year_obs_sum: BTreeMap::new(),
            agg_obs_sum: 0,
            years: 1,
        }
    }

    /// Empty aggregate for the window `[range_start, range_end)`.
    pub fn window(
        range_start: i32,
        range_end: i32,
        species: Species,
        altitude_grp: AltitudeBand,
        phenophase: Phenophase,
    ) -> Self {
        Self {
            start_year: range_start,
            end_year: range_end - 1,
            species,
            altitude_grp,
            phenophase,
            agg_range: range_end - range_start,
            obs_woy: BTreeMap::new(),
            year_obs_sum: BTreeMap::new(),
            agg_obs_sum: 0,
            years: 0,
        }
    }

    /// `{start_year}_{end_year}_{species}_{altitude}_{phase}`
    pub fn document_id(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            self.start_year, self.end_year, self.species, self.altitude_grp, self.phenophase
        )
    }

    /// A window is usable when every year contributed and the total volume
    /// exceeds the significance floor.
    pub fn is_valid(&self, min_observations: u64) -> bool {
        if min_observations == 0 {
            return self.years as i32 == self.agg_range;
        }
        self.years as i32 == self.agg_range
            && self.agg_obs_sum as f64 / min_observations as f64 > 1.0
    }
}

// ==================== Yearly distributions ====================

/// Yearly date distribution per phenophase for `(year, species, source)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlySpeciesStatistic {
    pub year: i32,
    pub species: Species,
    pub source: Source,
    pub values: BTreeMap<Phenophase, DistributionStats>,
}

/// Yearly date distribution per phenophase and altitude band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearlyAltitudeStatistic {
    pub year: i32,
    pub species: Species,
    pub source: Source,
    pub values: BTreeMap<Phenophase, BTreeMap<AltitudeBand, DistributionStats>>,
}

/// `{year}_{species}_{source}`, the key of both yearly keyspaces.
pub fn yearly_document_id(year: i32, species: &Species, source: &Source) -> String {
    format!("{}_{}_{}", year, species, source)
}
