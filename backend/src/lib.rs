//! # Phenology statistics
//!
//! Aggregation engine deriving statistics documents from phenological
//! observations kept in a document store.
//!
//! Two pipelines share the same domain types:
//!
//! - **Live analytics**: every observation create, update or delete is folded
//!   into per-key state documents and their derived min/max/quartile results,
//!   inside optimistic transactions.
//! - **Batch statistics**: per-year week-of-year counts, multi-year windows
//!   composed from them, and full-year date distributions, recomputed from the
//!   observation set of a year.
//!
//! ## Architecture
//!
//! - [`models`]: Calendar helpers (day and week of year)
//! - [`api`]: Domain and document types
//! - [`db`]: Repository traits, the in-memory repository, batching and configuration
//! - [`services`]: Aggregation components and batch runs
//!
//! The crate installs no logger; it reports through the `log` facade.

// Allow large error types - RepositoryError carries context for debugging
#![allow(clippy::result_large_err)]

pub mod models;

pub mod api;

pub mod db;

pub mod services;
