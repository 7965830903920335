//! Individual lookup used for altitude classification.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{Individual, IndividualId};

#[async_trait]
pub trait IndividualRepository: Send + Sync {
    /// Fetch an individual by id, `None` if it does not exist.
    async fn get_individual(&self, id: &IndividualId) -> RepositoryResult<Option<Individual>>;
}
