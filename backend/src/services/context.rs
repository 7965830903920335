//! Caches owned by one aggregation run.

use std::sync::Arc;

use super::altitude::AltitudeClassifier;
use super::comments::{CommentClassifier, MarkerCommentClassifier};
use super::observations::ObservationCache;
use super::rollup::AggregateCache;
use crate::db::config::StatisticsConfig;

/// Memoized lookups shared by the components of a run.
///
/// Nothing here is global: a worker creates a context, hands it to the
/// aggregators and calls [`AggregationContext::clear`] between logically
/// distinct runs.
pub struct AggregationContext {
    pub altitude: AltitudeClassifier,
    pub observations: ObservationCache,
    pub aggregates: AggregateCache,
    pub comments: Arc<dyn CommentClassifier>,
}

impl AggregationContext {
    /// Context using the configured comment markers.
    pub fn new(config: &StatisticsConfig) -> Self {
        let comments = Arc::new(MarkerCommentClassifier::new(&config.phenology.comment_markers));
        Self::with_comment_classifier(config, comments)
    }

    pub fn with_comment_classifier(config: &StatisticsConfig, comments: Arc<dyn CommentClassifier>) -> Self {
        Self {
            altitude: AltitudeClassifier::new(),
            observations: ObservationCache::new(
                config.collections.observations.clone(),
                config.phenology.relevant_phenophases.iter().cloned(),
                Arc::clone(&comments),
            ),
            aggregates: AggregateCache::new(config.collections.statistics.clone()),
            comments,
        }
    }

    /// Drop every memoized value.
    pub fn clear(&self) {
        self.altitude.clear();
        self.observations.clear();
        self.aggregates.clear();
    }
}
