//! Repository trait definitions for document store operations.
//!
//! The aggregation core talks to its backing store through a few focused
//! traits, so implementations (and test fakes) stay small.
//!
//! # Module Organization
//!
//! - [`error`]: Error types for repository operations
//! - [`document`]: Generic document CRUD, queries, transactions and batched writes
//! - [`individual`]: Lookup of observed individuals (altitude source)
//! - [`phenoyear`]: The globally configured active observation year
//!
//! # Convenience Trait Bound
//!
//! Services needing every capability use the [`FullRepository`] bound:
//!
//! ```ignore
//! async fn my_service<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<()> {
//!     let year = repo.current_phenoyear().await?;
//!     let docs = repo.query("observations", &[Filter::eq("year", year)]).await?;
//!     Ok(())
//! }
//! ```

pub mod document;
pub mod error;
pub mod individual;
pub mod phenoyear;

// Re-export error types
pub use error::{ErrorContext, RepositoryError, RepositoryResult};

// Re-export all traits
pub use document::{DocumentStore, Transaction, MAX_BATCH_WRITES};
pub use individual::IndividualRepository;
pub use phenoyear::PhenoyearRepository;

/// Composite trait bound for a complete repository implementation.
///
/// Automatically implemented for any type implementing all three traits.
pub trait FullRepository: DocumentStore + IndividualRepository + PhenoyearRepository {}

// Blanket implementation: any type implementing all three traits automatically implements FullRepository
impl<T> FullRepository for T where T: DocumentStore + IndividualRepository + PhenoyearRepository {}
