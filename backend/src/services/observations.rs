//! Per-year cache of the observations feeding batch statistics.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::comments::CommentClassifier;
use super::error::{StatisticsError, StatisticsResult};
use crate::api::{Observation, Phenophase};
use crate::db::models::Filter;
use crate::db::repository::DocumentStore;

/// Loads the relevant observations of a year once and serves them until cleared.
pub struct ObservationCache {
    collection: String,
    relevant: BTreeSet<Phenophase>,
    comments: Arc<dyn CommentClassifier>,
    years: RwLock<HashMap<i32, Arc<Vec<Observation>>>>,
}

impl ObservationCache {
    pub fn new(
        collection: impl Into<String>,
        relevant: impl IntoIterator<Item = Phenophase>,
        comments: Arc<dyn CommentClassifier>,
    ) -> Self {
        Self {
            collection: collection.into(),
            relevant: relevant.into_iter().collect(),
            comments,
            years: RwLock::new(HashMap::new()),
        }
    }

    pub fn relevant_phenophases(&self) -> &BTreeSet<Phenophase> {
        &self.relevant
    }

    /// Authoritative observations of `year` in a relevant phenophase, ordered by id.
    ///
    /// Documents that do not decode as observations are logged and skipped.
    pub async fn load<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        year: i32,
    ) -> StatisticsResult<Arc<Vec<Observation>>> {
        if let Some(cached) = self.years.read().get(&year) {
            return Ok(Arc::clone(cached));
        }

        let phases: Vec<Value> = self
            .relevant
            .iter()
            .map(|p| Value::String(p.to_string()))
            .collect();
        let documents = store
            .query(
                &self.collection,
                &[Filter::eq("year", year), Filter::any_of("phenophase", phases)],
            )
            .await?;

        let fetched = documents.len();
        let mut observations = Vec::with_capacity(fetched);
        for doc in documents {
            let mut observation: Observation = match doc.decode() {
                Ok(observation) => observation,
                Err(e) => {
                    log::warn!("Skipping malformed observation {}: {}", doc.id, e);
                    continue;
                }
            };
            observation.id = doc.id.as_str().into();
            if self.comments.excludes(&observation) {
                log::debug!("Skipping non-authoritative observation {}", observation.id);
                continue;
            }
            observations.push(observation);
        }
        observations.sort_by(|a, b| a.id.cmp(&b.id));

        log::info!(
            "Loaded {} of {} observations for {}",
            observations.len(),
            fetched,
            year
        );
        let observations = Arc::new(observations);
        self.years.write().insert(year, Arc::clone(&observations));
        Ok(observations)
    }

    /// The year's observations restricted to `phenophases`.
    ///
    /// # Returns
    /// * `Err(StatisticsError::InvalidArgument)` - If a requested phase is not relevant
    pub async fn filter<S: DocumentStore + ?Sized>(
        &self,
        store: &S,
        year: i32,
        phenophases: &[Phenophase],
    ) -> StatisticsResult<Vec<Observation>> {
        if let Some(unknown) = phenophases.iter().find(|p| !self.relevant.contains(*p)) {
            return Err(StatisticsError::InvalidArgument(format!(
                "phenophase {} is not one of the relevant phenophases",
                unknown
            )));
        }

        let wanted: BTreeSet<&Phenophase> = phenophases.iter().collect();
        Ok(self
            .load(store, year)
            .await?
            .iter()
            .filter(|o| wanted.contains(&o.phenophase))
            .cloned()
            .collect())
    }

    pub fn is_cached(&self, year: i32) -> bool {
        self.years.read().contains_key(&year)
    }

    pub fn clear(&self) {
        self.years.write().clear();
    }
}
