//! Multi-year windows composed from 1-year aggregates.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::error::{StatisticsError, StatisticsResult};
use crate::api::WeeklyAggregate;
use crate::db::models::Filter;
use crate::db::repository::DocumentStore;

/// Sums 1-year aggregates over the window `[range_start, range_end)`.
pub struct MultiYearRollup;

impl MultiYearRollup {
    /// Roll up every record whose `end_year` lies in the window.
    ///
    /// `years` of each window is the number of distinct years that
    /// contributed, so an incomplete window has `years < agg_range`.
    ///
    /// # Returns
    /// * `Err(StatisticsError::InvalidArgument)` - If the window is empty
    pub fn aggregate<'a, I>(
        aggregates: I,
        range_start: i32,
        range_end: i32,
    ) -> StatisticsResult<BTreeMap<String, WeeklyAggregate>>
    where
        I: IntoIterator<Item = &'a WeeklyAggregate>,
    {
        if range_end <= range_start {
            return Err(StatisticsError::InvalidArgument(format!(
                "window [{}, {}) is empty",
                range_start, range_end
            )));
        }

        let mut windows: BTreeMap<String, WeeklyAggregate> = BTreeMap::new();
        for record in aggregates {
            if record.end_year < range_start || record.end_year >= range_end {
                continue;
            }
            let window = WeeklyAggregate::window(
                range_start,
                range_end,
                record.species.clone(),
                record.altitude_grp,
                record.phenophase.clone(),
            );
            let entry = windows.entry(window.document_id()).or_insert(window);

            for (week, count) in &record.obs_woy {
                *entry.obs_woy.entry(*week).or_insert(0) += count;
            }
            entry.year_obs_sum.insert(record.end_year, record.agg_obs_sum);
            entry.agg_obs_sum += record.agg_obs_sum;
        }

        for window in windows.values_mut() {
            window.years = window.year_obs_sum.len() as u32;
        }
        Ok(windows)
    }
}

/// Per-year cache of stored 1-year aggregates.
pub struct AggregateCache {
    collection: String,
    years: RwLock<HashMap<i32, Arc<Vec<WeeklyAggregate>>>>,
}

impl AggregateCache {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            years: RwLock::new(HashMap::new()),
        }
    }

    /// The stored 1-year aggregates of `year`.
    pub async fn load<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        year: i32,
    ) -> StatisticsResult<Arc<Vec<WeeklyAggregate>>> {
        if let Some(cached) = self.years.read().get(&year) {
            return Ok(Arc::clone(cached));
        }

        let documents = store
            .query(
                &self.collection,
                &[Filter::eq("agg_range", 1), Filter::eq("end_year", year)],
            )
            .await?;

        let aggregates: Vec<WeeklyAggregate> = documents
            .iter()
            .filter_map(|doc| match doc.decode() {
                Ok(aggregate) => Some(aggregate),
                Err(e) => {
                    log::warn!("Skipping malformed aggregate {}: {}", doc.id, e);
                    None
                }
            })
            .collect();
        log::debug!("Loaded {} 1-year aggregates for {}", aggregates.len(), year);

        let aggregates = Arc::new(aggregates);
        self.years.write().insert(year, Arc::clone(&aggregates));
        Ok(aggregates)
    }

    /// The 1-year aggregates of every year in `[range_start, range_end)`.
    pub async fn load_range<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        range_start: i32,
        range_end: i32,
    ) -> StatisticsResult<Vec<WeeklyAggregate>> {
        let mut all = Vec::new();
        for year in range_start..range_end {
            all.extend(self.load(store, year).await?.iter().cloned());
        }
        Ok(all)
    }

    /// Drop the cached aggregates of one year, after they were rewritten.
    pub fn invalidate(&self, year: i32) {
        self.years.write().remove(&year);
    }

    pub fn clear(&self) {
        self.years.write().clear();
    }
}
