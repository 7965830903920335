//! Service layer for statistics aggregation and orchestration.
//!
//! The components sit between the repository traits and the caller that
//! receives observation events or schedules batch runs. Live analytics are
//! updated per event in [`analytics`]; batch statistics are recomputed per
//! year by [`jobs`] from the components below it.

pub mod altitude;
pub mod analytics;
pub mod comments;
pub mod context;
pub mod error;
pub mod events;
pub mod jobs;
pub mod observations;
pub mod one_year;
pub mod quantiles;
pub mod rollup;
pub mod yearly;

pub use altitude::AltitudeClassifier;
pub use analytics::{aggregation_keys, AnalyticsEngine, Mutation, MutationOutcome};
pub use comments::{CommentClassifier, MarkerCommentClassifier};
pub use context::AggregationContext;
pub use error::{StatisticsError, StatisticsResult};
pub use events::{EventOutcome, ObservationEvent, ObservationEventHandler};
pub use jobs::{RolloverSummary, StatisticsRunner, WindowRunSummary, YearRunSummary};
pub use observations::ObservationCache;
pub use one_year::OneYearAggregator;
pub use quantiles::{distribution_stats, nearest_rank_index, summarize, Quantile};
pub use rollup::{AggregateCache, MultiYearRollup};
pub use yearly::YearlyDistributionAggregator;
