//! Storage and reconciliation layer for a personal journal.
//!
//! Two interchangeable engines (embedded SQLite, flat JSON files) sit behind
//! [`backend::StorageBackend`]. [`store::RecordStore`] is the application
//! surface: schema-on-write field projection, per-collection singularity
//! rules, bulk cleanup, and change notifications. [`gateway::DataGateway`]
//! aggregates reads across collections.

pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod projector;
pub mod reconcile;
pub mod store;
pub mod types;
pub mod utils;

pub use config::{AppConfig, BackendKind, StoreConfig};
pub use error::StorageError;
pub use gateway::DataGateway;
pub use reconcile::{CleanupReport, CleanupStats};
pub use store::{RecordStore, StoreEvent};
pub use types::{Collection, Content, FieldValue, Fields, Record, RecordId};
