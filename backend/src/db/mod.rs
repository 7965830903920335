//! Database module for statistics document storage.
//!
//! This module provides abstractions for document store operations via the
//! Repository pattern, allowing different storage backends to be swapped easily.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Event handling / scheduled jobs (caller)               │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Service Layer (services/) - Aggregation                │
//! │  - Incremental analytics (transactional)                │
//! │  - Weekly aggregates and windowed roll-ups              │
//! │  - Yearly distribution statistics                       │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//! ┌───────────────────▼─────────────────────────────────────┐
//! │  Repository Traits (repository/) - Abstract Interface   │
//! └───────────────────┬─────────────────────────────────────┘
//!                     │
//!     ┌──────────────────────────────────────────────┐
//!     │             Local Repository                  │
//!     │               (in-memory)                     │
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! # Module Layout
//! - `repository`: Trait definitions and the error type
//! - `repositories::local`: In-memory implementation for unit testing and local development
//! - `models`: Documents, field-level updates, filters and batched writes
//! - `batch`: Chunked batched writes honouring the per-commit ceiling
//! - `config`: TOML/environment configuration

pub mod batch;
pub mod config;
pub mod models;
pub mod repositories;
pub mod repository;

pub use batch::BatchWriter;
pub use config::{CollectionNames, PhenologySettings, StatisticsConfig, StoreSettings};
pub use models::{BatchWrite, Document, DocumentData, DocumentUpdate, FieldValue, Filter, FilterOp};
pub use repositories::LocalRepository;
pub use repository::{
    DocumentStore, ErrorContext, FullRepository, IndividualRepository, PhenoyearRepository,
    RepositoryError, RepositoryResult, Transaction, MAX_BATCH_WRITES,
};
