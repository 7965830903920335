//! Nearest-rank order statistics.
//!
//! Quantiles resolve to an actual sample element, never an interpolated value.
//! The rank of quantile `q` over `n` sorted values is `(n - 1) * q` rounded to
//! the nearest index, computed in exact integer arithmetic; a rank exactly
//! half-way between two indices rounds to the even one.

use chrono::{DateTime, Utc};

use super::error::{StatisticsError, StatisticsResult};
use crate::api::{DistributionStats, QuantileSummary};

/// Quantiles reported by the statistics documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantile {
    Q25,
    Median,
    Q75,
}

impl Quantile {
    /// The quantile as an exact fraction `(numerator, denominator)`.
    fn fraction(self) -> (usize, usize) {
        match self {
            Quantile::Q25 => (1, 4),
            Quantile::Median => (1, 2),
            Quantile::Q75 => (3, 4),
        }
    }
}

/// Index of quantile `q` in a sorted sample of `len` elements.
///
/// `len` must be non-zero.
pub fn nearest_rank_index(len: usize, q: Quantile) -> usize {
    debug_assert!(len > 0);
    let (num, den) = q.fraction();
    let scaled = len.saturating_sub(1) * num;
    let base = scaled / den;
    let twice_remainder = 2 * (scaled % den);
    match twice_remainder.cmp(&den) {
        std::cmp::Ordering::Less => base,
        std::cmp::Ordering::Greater => base + 1,
        std::cmp::Ordering::Equal if base % 2 == 0 => base,
        std::cmp::Ordering::Equal => base + 1,
    }
}

/// Order statistics of `values`, `None` for an empty sample.
pub fn summarize<T: Ord + Copy>(values: &[T]) -> Option<QuantileSummary<T>> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let at = |q| sorted[nearest_rank_index(sorted.len(), q)];

    Some(QuantileSummary {
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        median: at(Quantile::Median),
        quantile_25: at(Quantile::Q25),
        quantile_75: at(Quantile::Q75),
    })
}

/// Full-year distribution of observation dates.
///
/// # Returns
/// * `Err(StatisticsError::EmptyInput)` - If `dates` is empty
pub fn distribution_stats(dates: &[DateTime<Utc>]) -> StatisticsResult<DistributionStats> {
    let summary = summarize(dates).ok_or_else(|| {
        StatisticsError::EmptyInput("distribution statistics over zero dates".to_string())
    })?;

    Ok(DistributionStats {
        min: summary.min,
        max: summary.max,
        median: summary.median,
        quantile_25: summary.quantile_25,
        quantile_75: summary.quantile_75,
        obs_sum: dates.len(),
    })
}
