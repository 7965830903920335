//! Batch statistics runs.
//!
//! A run recomputes derived documents from the observation set and writes
//! them in chunked batches. Runs are idempotent: repeating one over unchanged
//! observations rewrites identical documents. Stored documents of the same
//! year or window range that the run no longer produces are deleted.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;

use super::context::AggregationContext;
use super::error::StatisticsError;
use super::one_year::OneYearAggregator;
use super::rollup::MultiYearRollup;
use super::yearly::YearlyDistributionAggregator;
use crate::db::batch::BatchWriter;
use crate::db::config::StatisticsConfig;
use crate::db::models::{encode, BatchWrite, Filter};
use crate::db::repository::FullRepository;

/// Documents produced by [`StatisticsRunner::process_year`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YearRunSummary {
    pub year: i32,
    pub observations: usize,
    pub one_year_aggregates: usize,
    /// Stored 1-year aggregates of the year no longer backed by observations.
    pub removed_aggregates: usize,
    pub species_statistics: usize,
    pub altitude_statistics: usize,
    /// Stored species and altitude statistics of the year no longer backed by
    /// observations.
    pub removed_yearly_statistics: usize,
    pub writes: usize,
}

/// Documents produced by [`StatisticsRunner::process_windows`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WindowRunSummary {
    pub end_year: i32,
    pub windows: usize,
    /// Windows passing [`crate::api::WeeklyAggregate::is_valid`].
    pub valid_windows: usize,
    /// Stored windows of the same ranges the rollup no longer produces.
    pub removed_windows: usize,
    pub writes: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RolloverSummary {
    pub year: YearRunSummary,
    pub windows: WindowRunSummary,
}

/// Runs the batch statistics against one repository.
pub struct StatisticsRunner<'a, R: FullRepository + ?Sized> {
    repo: &'a R,
    config: StatisticsConfig,
    context: AggregationContext,
}

impl<'a, R: FullRepository + ?Sized> StatisticsRunner<'a, R> {
    pub fn new(repo: &'a R, config: StatisticsConfig) -> Self {
        let context = AggregationContext::new(&config);
        Self::with_context(repo, config, context)
    }

    pub fn with_context(repo: &'a R, config: StatisticsConfig, context: AggregationContext) -> Self {
        Self { repo, config, context }
    }

    pub fn context(&self) -> &AggregationContext {
        &self.context
    }

    pub fn config(&self) -> &StatisticsConfig {
        &self.config
    }

    /// Recompute the 1-year aggregates and yearly distributions of `year`.
    pub async fn process_year(&self, year: i32) -> Result<YearRunSummary> {
        self.context.clear();
        log::info!("Processing statistics for {}", year);

        let observations = self
            .context
            .observations
            .load(self.repo, year)
            .await
            .with_context(|| format!("Failed to load observations for {}", year))?;

        let aggregates = OneYearAggregator::new(&self.context.altitude)
            .aggregate(self.repo, &observations)
            .await
            .with_context(|| format!("Failed to aggregate weeks for {}", year))?;

        let species = match YearlyDistributionAggregator::species_stats(&observations) {
            Ok(stats) => Some(stats),
            Err(StatisticsError::EmptyInput(_)) => None,
            Err(e) => return Err(e).with_context(|| format!("Failed species statistics for {}", year)),
        };
        let altitude = match species {
            Some(_) => Some(
                YearlyDistributionAggregator::new(&self.context.altitude)
                    .altitude_stats(self.repo, &observations)
                    .await
                    .with_context(|| format!("Failed altitude statistics for {}", year))?,
            ),
            None => {
                log::info!("No observations for {}, skipping yearly statistics", year);
                None
            }
        };

        let collections = &self.config.collections;
        let stale = self
            .stale_documents(
                &collections.statistics,
                &[Filter::eq("agg_range", 1), Filter::eq("end_year", year)],
                &aggregates.keys().cloned().collect(),
            )
            .await?;
        let stale_species = self
            .stale_documents(
                &collections.statistics_yearly_species,
                &[Filter::eq("year", year)],
                &species.iter().flat_map(|s| s.keys().cloned()).collect(),
            )
            .await?;
        let stale_altitude = self
            .stale_documents(
                &collections.statistics_yearly_altitude,
                &[Filter::eq("year", year)],
                &altitude.iter().flat_map(|s| s.keys().cloned()).collect(),
            )
            .await?;

        let mut writer = BatchWriter::new(self.repo, self.config.store.batch_size);
        for (collection, ids) in [
            (&collections.statistics, &stale),
            (&collections.statistics_yearly_species, &stale_species),
            (&collections.statistics_yearly_altitude, &stale_altitude),
        ] {
            for id in ids {
                writer
                    .push(BatchWrite::Delete {
                        collection: collection.clone(),
                        id: id.clone(),
                    })
                    .await?;
            }
        }
        for (id, aggregate) in &aggregates {
            writer
                .push(BatchWrite::set(&collections.statistics, id.clone(), encode(aggregate)?))
                .await?;
        }
        for (id, stat) in species.iter().flatten() {
            writer
                .push(BatchWrite::set(&collections.statistics_yearly_species, id.clone(), encode(stat)?))
                .await?;
        }
        for (id, stat) in altitude.iter().flatten() {
            writer
                .push(BatchWrite::set(&collections.statistics_yearly_altitude, id.clone(), encode(stat)?))
                .await?;
        }
        let writes = writer
            .finish()
            .await
            .with_context(|| format!("Failed to write statistics for {}", year))?;
        self.context.aggregates.invalidate(year);

        let summary = YearRunSummary {
            year,
            observations: observations.len(),
            one_year_aggregates: aggregates.len(),
            removed_aggregates: stale.len(),
            species_statistics: species.as_ref().map_or(0, |s| s.len()),
            altitude_statistics: altitude.as_ref().map_or(0, |s| s.len()),
            removed_yearly_statistics: stale_species.len() + stale_altitude.len(),
            writes,
        };
        log::info!("Finished statistics for {}: {:?}", year, summary);
        Ok(summary)
    }

    /// Roll up every configured window ending with `end_year`.
    pub async fn process_windows(&self, end_year: i32) -> Result<WindowRunSummary> {
        self.context.clear();
        let mut summary = WindowRunSummary {
            end_year,
            ..Default::default()
        };

        let mut writer = BatchWriter::new(self.repo, self.config.store.batch_size);
        for width in &self.config.phenology.window_ranges {
            let range_start = end_year - width + 1;
            let range_end = end_year + 1;

            let records = self
                .context
                .aggregates
                .load_range(self.repo, range_start, range_end)
                .await
                .with_context(|| format!("Failed to load 1-year aggregates for {}..{}", range_start, end_year))?;
            let windows = MultiYearRollup::aggregate(&records, range_start, range_end)?;
            let stale = self
                .stale_documents(
                    &self.config.collections.statistics,
                    &[
                        Filter::eq("start_year", range_start),
                        Filter::eq("end_year", end_year),
                        Filter::eq("agg_range", *width),
                    ],
                    &windows.keys().cloned().collect(),
                )
                .await?;

            let valid = windows
                .values()
                .filter(|w| w.is_valid(self.config.phenology.min_window_observations))
                .count();
            log::info!(
                "{}-year window {}..{}: {} aggregates, {} valid",
                width,
                range_start,
                end_year,
                windows.len(),
                valid
            );
            summary.windows += windows.len();
            summary.valid_windows += valid;
            summary.removed_windows += stale.len();

            for id in stale {
                writer
                    .push(BatchWrite::Delete {
                        collection: self.config.collections.statistics.clone(),
                        id,
                    })
                    .await?;
            }
            for (id, window) in &windows {
                writer
                    .push(BatchWrite::set(&self.config.collections.statistics, id.clone(), encode(window)?))
                    .await?;
            }
        }
        summary.writes = writer
            .finish()
            .await
            .with_context(|| format!("Failed to write windows ending {}", end_year))?;
        Ok(summary)
    }

    /// [`Self::process_year`] for the configured phenoyear.
    pub async fn process_current_year(&self) -> Result<YearRunSummary> {
        let year = self
            .repo
            .current_phenoyear()
            .await
            .context("Failed to resolve the current phenoyear")?;
        self.process_year(year).await
    }

    /// Finalize the phenoyear preceding the configured one: its yearly
    /// statistics and every window ending with it.
    pub async fn process_rollover(&self) -> Result<RolloverSummary> {
        let current = self
            .repo
            .current_phenoyear()
            .await
            .context("Failed to resolve the current phenoyear")?;
        let year = current - 1;
        log::info!("Rolling over phenoyear {} into {}", year, current);

        let year_summary = self.process_year(year).await?;
        let windows = self.process_windows(year).await?;
        Ok(RolloverSummary {
            year: year_summary,
            windows,
        })
    }

    /// Ids of stored documents matching `filters` that are not in `keep`.
    async fn stale_documents(
        &self,
        collection: &str,
        filters: &[Filter],
        keep: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        let stored = self
            .repo
            .query(collection, filters)
            .await
            .with_context(|| format!("Failed to list stored documents of {}", collection))?;
        Ok(stored
            .into_iter()
            .map(|doc| doc.id)
            .filter(|id| !keep.contains(id))
            .collect())
    }
}
