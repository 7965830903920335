//! Generic document store operations.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::db::models::{BatchWrite, Document, DocumentData, DocumentUpdate, Filter};

/// Most writes a single batch commit may carry.
pub const MAX_BATCH_WRITES: usize = 500;

/// Repository trait for schemaless document collections.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document, `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> RepositoryResult<Option<Document>>;

    /// Write a whole document. With `merge`, nested objects are merged into
    /// the existing document instead of replacing it.
    async fn set(&self, collection: &str, id: &str, data: DocumentData, merge: bool) -> RepositoryResult<()>;

    /// Patch an existing document.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If the document does not exist
    async fn update(&self, collection: &str, id: &str, update: DocumentUpdate) -> RepositoryResult<()>;

    /// Patch a document, creating it if absent.
    async fn merge_fields(&self, collection: &str, id: &str, update: DocumentUpdate) -> RepositoryResult<()>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, collection: &str, id: &str) -> RepositoryResult<bool>;

    /// All documents of `collection` matching every filter, ordered by id.
    async fn query(&self, collection: &str, filters: &[Filter]) -> RepositoryResult<Vec<Document>>;

    /// Start an optimistic read-modify-write transaction.
    async fn begin_transaction(&self) -> RepositoryResult<Box<dyn Transaction>>;

    /// Apply up to [`MAX_BATCH_WRITES`] writes atomically.
    ///
    /// # Returns
    /// * `Ok(usize)` - Number of writes applied
    /// * `Err(RepositoryError::BatchLimitExceeded)` - If the batch is too large
    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> RepositoryResult<usize>;
}

/// Handle of a single transaction.
///
/// Reads go to the store and record the version they observed; writes are
/// buffered until [`Transaction::commit`], which fails with a retryable
/// `TransactionError` if any document read in the transaction has changed in
/// the meantime. Dropping the handle without committing discards the writes.
#[async_trait]
pub trait Transaction: Send {
    async fn get(&mut self, collection: &str, id: &str) -> RepositoryResult<Option<Document>>;

    fn set(&mut self, collection: &str, id: &str, data: DocumentData, merge: bool);

    fn update(&mut self, collection: &str, id: &str, update: DocumentUpdate);

    fn merge_fields(&mut self, collection: &str, id: &str, update: DocumentUpdate);

    fn delete(&mut self, collection: &str, id: &str);

    /// Number of buffered writes.
    fn pending_writes(&self) -> usize;

    async fn commit(self: Box<Self>) -> RepositoryResult<usize>;
}
