//! Translation of observation mutations into analytics updates.

use super::analytics::AnalyticsEngine;
use super::context::AggregationContext;
use super::error::StatisticsResult;
use crate::api::Observation;
use crate::db::repository::{DocumentStore, IndividualRepository};

/// A decoded change of one observation document.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationEvent {
    Created(Observation),
    Updated { before: Observation, after: Observation },
    Deleted(Observation),
}

impl ObservationEvent {
    pub fn observation_id(&self) -> &str {
        match self {
            ObservationEvent::Created(o) | ObservationEvent::Deleted(o) => o.id.as_str(),
            ObservationEvent::Updated { after, .. } => after.id.as_str(),
        }
    }
}

/// Analytics keys touched while handling one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventOutcome {
    pub recorded: usize,
    pub retracted: usize,
}

/// Whether two versions aggregate under the same keys.
fn same_keys(a: &Observation, b: &Observation) -> bool {
    a.id == b.id
        && a.year == b.year
        && a.species == b.species
        && a.phenophase == b.phenophase
        && a.source == b.source
        && a.individual_id == b.individual_id
}

/// Feeds observation events into an [`AnalyticsEngine`].
pub struct ObservationEventHandler<'a> {
    engine: &'a AnalyticsEngine,
    context: &'a AggregationContext,
}

impl<'a> ObservationEventHandler<'a> {
    pub fn new(engine: &'a AnalyticsEngine, context: &'a AggregationContext) -> Self {
        Self { engine, context }
    }

    fn counts(&self, observation: &Observation) -> bool {
        !self.context.comments.excludes(observation)
    }

    pub async fn handle<R>(&self, repo: &R, event: &ObservationEvent) -> StatisticsResult<EventOutcome>
    where
        R: DocumentStore + IndividualRepository + ?Sized,
    {
        let mut outcome = EventOutcome::default();
        match event {
            ObservationEvent::Created(observation) => {
                if self.counts(observation) {
                    outcome.recorded = self.record(repo, observation).await?;
                } else {
                    log::debug!("Ignoring non-authoritative observation {}", observation.id);
                }
            }
            ObservationEvent::Deleted(observation) => {
                if self.counts(observation) {
                    outcome.retracted = self.retract(repo, observation).await?;
                }
            }
            ObservationEvent::Updated { before, after } => {
                let (was_counted, is_counted) = (self.counts(before), self.counts(after));
                if was_counted && is_counted && same_keys(before, after) {
                    if before.date != after.date {
                        outcome.recorded = self.record(repo, after).await?;
                    }
                } else {
                    if was_counted {
                        outcome.retracted = self.retract(repo, before).await?;
                    }
                    if is_counted {
                        outcome.recorded = self.record(repo, after).await?;
                    }
                }
            }
        }

        log::debug!(
            "Observation {}: {} keys recorded, {} retracted",
            event.observation_id(),
            outcome.recorded,
            outcome.retracted
        );
        Ok(outcome)
    }

    async fn record<R>(&self, repo: &R, observation: &Observation) -> StatisticsResult<usize>
    where
        R: DocumentStore + IndividualRepository + ?Sized,
    {
        self.engine
            .record_observation(repo, &self.context.altitude, observation)
            .await
    }

    async fn retract<R>(&self, repo: &R, observation: &Observation) -> StatisticsResult<usize>
    where
        R: DocumentStore + IndividualRepository + ?Sized,
    {
        self.engine
            .retract_observation(repo, &self.context.altitude, observation)
            .await
    }
}
