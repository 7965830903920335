//! Access to the system-wide phenoyear setting.

use async_trait::async_trait;

use super::error::RepositoryResult;

#[async_trait]
pub trait PhenoyearRepository: Send + Sync {
    /// The currently active observation year.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no phenoyear is configured
    async fn current_phenoyear(&self) -> RepositoryResult<i32>;
}
