//! Altitude band classification of individuals.

use parking_lot::RwLock;
use std::collections::HashMap;

use super::error::{StatisticsError, StatisticsResult};
use crate::api::{AltitudeBand, IndividualId};
use crate::db::repository::IndividualRepository;

/// Memoizing classifier from individual to [`AltitudeBand`].
///
/// Altitude is a static attribute of an individual, so a classification is
/// cached until [`AltitudeClassifier::clear`] is called. Failed lookups are not
/// cached.
#[derive(Debug, Default)]
pub struct AltitudeClassifier {
    cache: RwLock<HashMap<IndividualId, AltitudeBand>>,
}

impl AltitudeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Altitude band of an individual.
    ///
    /// # Returns
    /// * `Err(StatisticsError::NotFound)` - If the individual does not exist
    /// * `Err(StatisticsError::MissingAttribute)` - If it has no altitude
    pub async fn classify<R: IndividualRepository + ?Sized>(
        &self,
        repo: &R,
        individual_id: &IndividualId,
    ) -> StatisticsResult<AltitudeBand> {
        if let Some(band) = self.cache.read().get(individual_id) {
            return Ok(*band);
        }

        let individual = repo
            .get_individual(individual_id)
            .await?
            .ok_or_else(|| StatisticsError::NotFound(format!("individual {}", individual_id)))?;
        let altitude = individual.altitude.ok_or_else(|| StatisticsError::MissingAttribute {
            entity: format!("individual {}", individual_id),
            attribute: "altitude",
        })?;

        let band = AltitudeBand::from_altitude(altitude);
        self.cache.write().insert(individual_id.clone(), band);
        Ok(band)
    }

    /// Forget every cached classification.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}
