//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. Collections are kept in
//! memory as ordered maps, providing fast, deterministic, and isolated
//! execution, with the same optimistic-concurrency and batch-size rules a
//! hosted document store enforces.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::api::{Individual, IndividualId, Observation};
use crate::db::config::CollectionNames;
use crate::db::models::{deep_merge, encode, BatchWrite, Document, DocumentData, DocumentUpdate, Filter};
use crate::db::repository::*;

/// Document id of the global settings document in the definitions collection.
pub const CONFIG_DOCUMENT_ID: &str = "config";

/// In-memory local repository.
///
/// Cloning is cheap and every clone shares the same underlying data.
///
/// # Example
/// ```
/// use pheno_stats::db::repositories::LocalRepository;
/// use pheno_stats::db::repository::PhenoyearRepository;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let repo = LocalRepository::new();
/// repo.set_phenoyear(2023).unwrap();
/// assert_eq!(repo.current_phenoyear().await.unwrap(), 2023);
/// # });
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
    collections: Arc<CollectionNames>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    data: DocumentData,
    version: u64,
}

struct LocalData {
    collections: HashMap<String, BTreeMap<String, StoredDocument>>,
    next_version: u64,

    // Instrumentation and failure injection
    write_count: usize,
    injected_conflicts: usize,
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            collections: HashMap::new(),
            next_version: 0,
            write_count: 0,
            injected_conflicts: 0,
            is_healthy: true,
        }
    }
}

impl LocalData {
    fn lookup(&self, collection: &str, id: &str) -> Option<&StoredDocument> {
        self.collections.get(collection)?.get(id)
    }

    fn check_health(&self) -> RepositoryResult<()> {
        if !self.is_healthy {
            return Err(RepositoryError::connection("Document store is not healthy"));
        }
        Ok(())
    }

    /// Apply `writes` all-or-nothing.
    ///
    /// Every write is first resolved against a staging area so a failing write
    /// leaves the store untouched.
    fn apply_writes(&mut self, writes: Vec<BatchWrite>) -> RepositoryResult<usize> {
        let now = Utc::now();
        let count = writes.len();
        let mut staged: HashMap<(String, String), Option<DocumentData>> = HashMap::new();
        let mut order: Vec<(String, String)> = Vec::new();

        for write in writes {
            let key = (write.collection().to_string(), write.id().to_string());
            let current = match staged.get(&key) {
                Some(staged_doc) => staged_doc.clone(),
                None => self.lookup(&key.0, &key.1).map(|doc| doc.data.clone()),
            };

            let next = match write {
                BatchWrite::Set { data, merge, .. } => {
                    if merge {
                        let mut base = current.unwrap_or_default();
                        deep_merge(&mut base, data);
                        Some(base)
                    } else {
                        Some(data)
                    }
                }
                BatchWrite::Update { update, .. } => {
                    let mut base = current.ok_or_else(|| {
                        RepositoryError::not_found_with_context(
                            "Cannot update a missing document",
                            ErrorContext::new("update")
                                .with_entity(&key.0)
                                .with_entity_id(&key.1),
                        )
                    })?;
                    update.apply(&mut base, now)?;
                    Some(base)
                }
                BatchWrite::Merge { update, .. } => {
                    let mut base = current.unwrap_or_default();
                    update.apply(&mut base, now)?;
                    Some(base)
                }
                BatchWrite::Delete { .. } => None,
            };

            if !staged.contains_key(&key) {
                order.push(key.clone());
            }
            staged.insert(key, next);
        }

        for key in order {
            let Some(next) = staged.remove(&key) else {
                continue;
            };
            let (collection, id) = key;
            match next {
                Some(data) => {
                    self.next_version += 1;
                    let version = self.next_version;
                    self.collections
                        .entry(collection)
                        .or_default()
                        .insert(id, StoredDocument { data, version });
                }
                None => {
                    if let Some(docs) = self.collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }

        self.write_count += count;
        Ok(count)
    }
}

impl LocalRepository {
    /// Create a new empty local repository using the default collection names.
    pub fn new() -> Self {
        Self::with_collections(CollectionNames::default())
    }

    /// Create a new empty local repository with custom collection names.
    pub fn with_collections(collections: CollectionNames) -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
            collections: Arc::new(collections),
        }
    }

    pub fn collections(&self) -> &CollectionNames {
        &self.collections
    }

    /// Store an observation under its id.
    ///
    /// This is a helper method for setting up data.
    pub fn insert_observation(&self, observation: &Observation) -> RepositoryResult<()> {
        let data = encode(observation)?;
        self.seed(&self.collections.observations, observation.id.as_str(), data)
    }

    /// Store an individual under its id.
    pub fn insert_individual(&self, individual: &Individual) -> RepositoryResult<()> {
        let data = encode(individual)?;
        self.seed(&self.collections.individuals, individual.id.as_str(), data)
    }

    /// Set the phenoyear in the definitions collection.
    pub fn set_phenoyear(&self, year: i32) -> RepositoryResult<()> {
        let update = DocumentUpdate::new().set("phenoyear", year);
        let write = BatchWrite::Merge {
            collection: self.collections.definitions.clone(),
            id: CONFIG_DOCUMENT_ID.to_string(),
            update,
        };
        self.data.write().apply_writes(vec![write]).map(|_| ())
    }

    fn seed(&self, collection: &str, id: &str, data: DocumentData) -> RepositoryResult<()> {
        self.data
            .write()
            .apply_writes(vec![BatchWrite::set(collection, id, data)])
            .map(|_| ())
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Make the next `count` transaction commits fail with a retryable conflict.
    pub fn inject_conflicts(&self, count: usize) {
        self.data.write().injected_conflicts = count;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    /// Number of documents in a collection.
    pub fn document_count(&self, collection: &str) -> usize {
        self.data
            .read()
            .collections
            .get(collection)
            .map_or(0, |docs| docs.len())
    }

    /// Total number of writes committed since creation or the last `clear`.
    pub fn write_count(&self) -> usize {
        self.data.read().write_count
    }

    fn write(&self, write: BatchWrite) -> RepositoryResult<usize> {
        let mut data = self.data.write();
        data.check_health()?;
        data.apply_writes(vec![write])
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Document Store ====================

#[async_trait]
impl DocumentStore for LocalRepository {
    async fn get(&self, collection: &str, id: &str) -> RepositoryResult<Option<Document>> {
        let data = self.data.read();
        data.check_health()?;
        Ok(data.lookup(collection, id).map(|stored| Document {
            id: id.to_string(),
            data: stored.data.clone(),
            version: stored.version,
        }))
    }

    async fn set(&self, collection: &str, id: &str, data: DocumentData, merge: bool) -> RepositoryResult<()> {
        self.write(BatchWrite::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
            merge,
        })
        .map(|_| ())
    }

    async fn update(&self, collection: &str, id: &str, update: DocumentUpdate) -> RepositoryResult<()> {
        self.write(BatchWrite::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            update,
        })
        .map(|_| ())
    }

    async fn merge_fields(&self, collection: &str, id: &str, update: DocumentUpdate) -> RepositoryResult<()> {
        self.write(BatchWrite::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            update,
        })
        .map(|_| ())
    }

    async fn delete(&self, collection: &str, id: &str) -> RepositoryResult<bool> {
        let mut data = self.data.write();
        data.check_health()?;
        let existed = data.lookup(collection, id).is_some();
        data.apply_writes(vec![BatchWrite::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }])?;
        Ok(existed)
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> RepositoryResult<Vec<Document>> {
        let data = self.data.read();
        data.check_health()?;

        let Some(docs) = data.collections.get(collection) else {
            return Ok(Vec::new());
        };

        Ok(docs
            .iter()
            .filter(|(_, stored)| filters.iter().all(|f| f.matches(&stored.data)))
            .map(|(id, stored)| Document {
                id: id.clone(),
                data: stored.data.clone(),
                version: stored.version,
            })
            .collect())
    }

    async fn begin_transaction(&self) -> RepositoryResult<Box<dyn Transaction>> {
        self.data.read().check_health()?;
        Ok(Box::new(LocalTransaction {
            data: Arc::clone(&self.data),
            reads: HashMap::new(),
            writes: Vec::new(),
        }))
    }

    async fn commit_batch(&self, writes: Vec<BatchWrite>) -> RepositoryResult<usize> {
        if writes.len() > MAX_BATCH_WRITES {
            return Err(RepositoryError::BatchLimitExceeded {
                size: writes.len(),
                limit: MAX_BATCH_WRITES,
            });
        }
        let mut data = self.data.write();
        data.check_health()?;
        data.apply_writes(writes)
    }
}

// ==================== Transactions ====================

/// Optimistic transaction over a [`LocalRepository`].
struct LocalTransaction {
    data: Arc<RwLock<LocalData>>,
    /// Version observed by the first read of each document; `None` if absent.
    reads: HashMap<(String, String), Option<u64>>,
    writes: Vec<BatchWrite>,
}

#[async_trait]
impl Transaction for LocalTransaction {
    async fn get(&mut self, collection: &str, id: &str) -> RepositoryResult<Option<Document>> {
        let data = self.data.read();
        data.check_health()?;
        let stored = data.lookup(collection, id);
        self.reads
            .entry((collection.to_string(), id.to_string()))
            .or_insert_with(|| stored.map(|doc| doc.version));
        Ok(stored.map(|doc| Document {
            id: id.to_string(),
            data: doc.data.clone(),
            version: doc.version,
        }))
    }

    fn set(&mut self, collection: &str, id: &str, data: DocumentData, merge: bool) {
        self.writes.push(BatchWrite::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
            merge,
        });
    }

    fn update(&mut self, collection: &str, id: &str, update: DocumentUpdate) {
        self.writes.push(BatchWrite::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            update,
        });
    }

    fn merge_fields(&mut self, collection: &str, id: &str, update: DocumentUpdate) {
        self.writes.push(BatchWrite::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            update,
        });
    }

    fn delete(&mut self, collection: &str, id: &str) {
        self.writes.push(BatchWrite::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
    }

    fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<usize> {
        let LocalTransaction { data, reads, writes } = *self;
        let mut data = data.write();
        data.check_health()?;

        if data.injected_conflicts > 0 {
            data.injected_conflicts -= 1;
            return Err(RepositoryError::conflict(
                "Injected transaction conflict",
                ErrorContext::new("commit"),
            ));
        }

        for ((collection, id), seen) in &reads {
            let current = data.lookup(collection, id).map(|doc| doc.version);
            if current != *seen {
                return Err(RepositoryError::conflict(
                    "Document changed since it was read",
                    ErrorContext::new("commit")
                        .with_entity(collection)
                        .with_entity_id(id),
                ));
            }
        }

        data.apply_writes(writes)
    }
}

// ==================== Lookups ====================

#[async_trait]
impl IndividualRepository for LocalRepository {
    async fn get_individual(&self, id: &IndividualId) -> RepositoryResult<Option<Individual>> {
        let Some(doc) = self.get(&self.collections.individuals, id.as_str()).await? else {
            return Ok(None);
        };
        let mut individual: Individual = doc.decode()?;
        individual.id = id.clone();
        Ok(Some(individual))
    }
}

#[async_trait]
impl PhenoyearRepository for LocalRepository {
    async fn current_phenoyear(&self) -> RepositoryResult<i32> {
        let context = || {
            ErrorContext::new("current_phenoyear")
                .with_entity(&self.collections.definitions)
                .with_entity_id(CONFIG_DOCUMENT_ID)
        };
        let doc = self
            .get(&self.collections.definitions, CONFIG_DOCUMENT_ID)
            .await?
            .ok_or_else(|| RepositoryError::not_found_with_context("No configuration document", context()))?;

        doc.field("phenoyear")
            .and_then(|v| v.as_i64())
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| RepositoryError::not_found_with_context("No phenoyear configured", context()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> DocumentData {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_set_get_and_versions() {
        let repo = LocalRepository::new();
        repo.set("c", "a", data(json!({"x": 1})), false).await.unwrap();
        let first = repo.get("c", "a").await.unwrap().unwrap();
        repo.set("c", "a", data(json!({"y": 2})), true).await.unwrap();
        let second = repo.get("c", "a").await.unwrap().unwrap();

        assert!(second.version > first.version);
        assert_eq!(serde_json::Value::Object(second.data), json!({"x": 1, "y": 2}));
    }

    #[tokio::test]
    async fn test_update_missing_document_is_not_found() {
        let repo = LocalRepository::new();
        let result = repo.update("c", "missing", DocumentUpdate::new().set("x", 1)).await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
        assert_eq!(repo.document_count("c"), 0);
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let repo = LocalRepository::new();
        let writes = vec![
            BatchWrite::set("c", "a", data(json!({"x": 1}))),
            BatchWrite::Update {
                collection: "c".to_string(),
                id: "missing".to_string(),
                update: DocumentUpdate::new().set("x", 1),
            },
        ];
        assert!(repo.commit_batch(writes).await.is_err());
        assert_eq!(repo.document_count("c"), 0);
        assert_eq!(repo.write_count(), 0);
    }

    #[tokio::test]
    async fn test_batch_ceiling() {
        let repo = LocalRepository::new();
        let writes: Vec<BatchWrite> = (0..=MAX_BATCH_WRITES)
            .map(|i| BatchWrite::set("c", i.to_string(), DocumentData::new()))
            .collect();
        let result = repo.commit_batch(writes).await;
        assert!(matches!(result, Err(RepositoryError::BatchLimitExceeded { size: 501, limit: 500 })));
    }

    #[tokio::test]
    async fn test_transaction_conflict_on_concurrent_write() {
        let repo = LocalRepository::new();
        repo.set("c", "a", data(json!({"n": 1})), false).await.unwrap();

        let mut txn = repo.begin_transaction().await.unwrap();
        txn.get("c", "a").await.unwrap();
        txn.update("c", "a", DocumentUpdate::new().increment("n", 1));

        repo.update("c", "a", DocumentUpdate::new().increment("n", 10)).await.unwrap();

        let err = txn.commit().await.unwrap_err();
        assert!(err.is_retryable());
        let doc = repo.get("c", "a").await.unwrap().unwrap();
        assert_eq!(doc.data["n"], 11);
    }

    #[tokio::test]
    async fn test_transaction_conflict_when_absent_document_appears() {
        let repo = LocalRepository::new();
        let mut txn = repo.begin_transaction().await.unwrap();
        assert!(txn.get("c", "a").await.unwrap().is_none());
        txn.set("c", "a", data(json!({"n": 1})), false);

        repo.set("c", "a", data(json!({"n": 5})), false).await.unwrap();
        assert!(txn.commit().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_writes() {
        let repo = LocalRepository::new();
        {
            let mut txn = repo.begin_transaction().await.unwrap();
            txn.set("c", "a", DocumentData::new(), false);
            assert_eq!(txn.pending_writes(), 1);
        }
        assert!(repo.get("c", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unhealthy_store_rejects_operations() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        assert!(matches!(
            repo.get("c", "a").await,
            Err(RepositoryError::ConnectionError { .. })
        ));
        assert!(repo.begin_transaction().await.is_err());
    }

    #[tokio::test]
    async fn test_phenoyear_lookup() {
        let repo = LocalRepository::new();
        assert!(repo.current_phenoyear().await.unwrap_err().is_not_found());
        repo.set_phenoyear(2024).unwrap();
        assert_eq!(repo.current_phenoyear().await.unwrap(), 2024);
    }
}
