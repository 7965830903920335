//! Chunked batched writes.

use super::models::BatchWrite;
use super::repository::{DocumentStore, RepositoryResult, MAX_BATCH_WRITES};

/// Accumulates writes and commits them in batches of at most `batch_size`.
///
/// # Example
/// ```ignore
/// let mut writer = BatchWriter::new(repo, config.store.batch_size);
/// for (id, doc) in documents {
///     writer.push(BatchWrite::set("statistics", id, doc)).await?;
/// }
/// let written = writer.finish().await?;
/// ```
pub struct BatchWriter<'a, R: DocumentStore + ?Sized> {
    store: &'a R,
    pending: Vec<BatchWrite>,
    batch_size: usize,
    written: usize,
    commits: usize,
}

impl<'a, R: DocumentStore + ?Sized> BatchWriter<'a, R> {
    /// `batch_size` is clamped to `1..=MAX_BATCH_WRITES`.
    pub fn new(store: &'a R, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, MAX_BATCH_WRITES);
        Self {
            store,
            pending: Vec::with_capacity(batch_size),
            batch_size,
            written: 0,
            commits: 0,
        }
    }

    /// Queue a write, committing the current batch once it is full.
    pub async fn push(&mut self, write: BatchWrite) -> RepositoryResult<()> {
        self.pending.push(write);
        if self.pending.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Commit whatever is queued.
    pub async fn flush(&mut self) -> RepositoryResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        let size = batch.len();
        self.written += self
            .store
            .commit_batch(batch)
            .await
            .map_err(|e| e.with_operation(format!("commit_batch({} writes)", size)))?;
        self.commits += 1;
        Ok(())
    }

    /// Commit the remainder and return the total number of writes.
    pub async fn finish(mut self) -> RepositoryResult<usize> {
        self.flush().await?;
        log::debug!("Committed {} writes in {} batches", self.written, self.commits);
        Ok(self.written)
    }
}
