//! Storage substrates behind one narrow interface.
//!
//! The record store is written against [`StorageBackend`] only; which engine
//! sits behind it is decided once, at composition time. Two implementations
//! exist: [`sqlite::SqliteBackend`] (typed columns, per-statement atomicity)
//! and [`flat::FlatBackend`] (whole-collection JSON files, no transactions).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::types::{Collection, Content, Fields, Record, RecordId};

pub mod flat;
pub mod sqlite;

/// Durable get/set of named collections of records.
///
/// Implementations store the canonical content verbatim alongside the
/// projected fields; neither engine re-derives projections on read. All
/// methods are per-collection; nothing here spans collections atomically.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// All records of a collection, newest `created_at` first.
    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StorageError>;

    /// Persist a new record; the backend assigns and returns its id.
    async fn insert(
        &self,
        collection: Collection,
        content: &Content,
        fields: &Fields,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<RecordId, StorageError>;

    /// Replace a record's content and fields wholesale.
    ///
    /// `refresh_created` re-stamps `created_at` as well (used by the
    /// reaffirmation path for preferences). Returns `false` when the id does
    /// not exist — a no-op, not an error.
    async fn update_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
        content: &Content,
        fields: &Fields,
        updated_at: DateTime<Utc>,
        refresh_created: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError>;

    /// Delete by id; returns the number of records removed (0 or 1).
    /// Id comparison is string-normalized.
    async fn delete_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<u64, StorageError>;

    /// Remove every record in the collection.
    async fn clear(&self, collection: Collection) -> Result<(), StorageError>;

    /// Replace the whole collection with `records`, preserving their ids and
    /// timestamps. Used by bulk cleanup to commit a retained set. This is
    /// clear-then-reinsert on both engines and is not crash-atomic.
    async fn replace_all(
        &self,
        collection: Collection,
        records: &[Record],
    ) -> Result<(), StorageError>;

    /// Number of records in the collection.
    async fn count(&self, collection: Collection) -> Result<u64, StorageError>;
}
