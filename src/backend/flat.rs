//! Flat engine: one JSON array file per collection.
//!
//! This is the web-profile substrate: no transactions, no typed columns, and
//! every write rewrites the whole collection file. An in-memory cache fronts
//! the files; the cache is loaded once at open and is the read source of
//! truth afterwards. Mutations hold the cache write lock across the file
//! rewrite so two writers cannot interleave inside one collection mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::types::{Collection, Content, Fields, Record, RecordId};

pub struct FlatBackend {
    dir: PathBuf,
    cache: RwLock<HashMap<Collection, Vec<Record>>>,
    id_counter: AtomicU64,
}

impl FlatBackend {
    /// Open the data directory and load every collection file present.
    ///
    /// Damage is contained at the smallest unit possible: an individual
    /// record that fails to deserialize is skipped with a warning, and only
    /// a file that is not a JSON array at all starts the collection empty.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let mut cache = HashMap::new();
        for collection in Collection::ALL {
            let path = collection_path(&dir, collection);
            let records = match tokio::fs::read(&path).await {
                Ok(bytes) => load_records(collection, &bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            cache.insert(collection, records);
        }

        // Resume the id counter past any suffix already on disk so a reopen
        // within the same millisecond cannot reissue an existing id.
        let next_counter = cache
            .values()
            .flatten()
            .filter_map(|r| r.id.as_str().rsplit_once('-'))
            .filter_map(|(_, n)| n.parse::<u64>().ok())
            .max()
            .map_or(0, |n| n + 1);

        Ok(FlatBackend {
            dir,
            cache: RwLock::new(cache),
            id_counter: AtomicU64::new(next_counter),
        })
    }

    /// Monotonic-ish id token: wall-clock millis plus a per-process counter
    /// so two inserts in the same millisecond stay distinct.
    fn next_id(&self) -> RecordId {
        let n = self.id_counter.fetch_add(1, Ordering::Relaxed);
        RecordId::new(format!("{}-{}", Utc::now().timestamp_millis(), n))
    }

    /// Rewrite the whole collection file from the cached array.
    async fn persist(&self, collection: Collection, records: &[Record]) -> Result<(), StorageError> {
        if !self.dir.is_dir() {
            return Err(StorageError::Uninitialized(format!(
                "data directory {} is gone",
                self.dir.display()
            )));
        }
        let bytes = serde_json::to_vec(records)?;
        tokio::fs::write(collection_path(&self.dir, collection), bytes).await?;
        Ok(())
    }
}

fn collection_path(dir: &Path, collection: Collection) -> PathBuf {
    dir.join(format!("{}.json", collection.as_str()))
}

/// Deserialize a collection file, dropping only the records that fail.
fn load_records(collection: Collection, bytes: &[u8]) -> Vec<Record> {
    let values = match serde_json::from_slice::<Vec<serde_json::Value>>(bytes) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!(
                collection = collection.as_str(),
                "Collection file is not a JSON array, starting empty: {}",
                e
            );
            return Vec::new();
        }
    };
    values
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<Record>(v) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    collection = collection.as_str(),
                    "Skipping unreadable record: {}",
                    e
                );
                None
            }
        })
        .collect()
}

#[async_trait]
impl super::StorageBackend for FlatBackend {
    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StorageError> {
        let cache = self.cache.read().await;
        let mut records = cache.get(&collection).cloned().unwrap_or_default();
        // The file holds insertion order; the contract is newest-first.
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn insert(
        &self,
        collection: Collection,
        content: &Content,
        fields: &Fields,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<RecordId, StorageError> {
        let id = self.next_id();
        let record = Record {
            id: id.clone(),
            collection,
            content: content.clone(),
            fields: fields.clone(),
            created_at,
            updated_at,
        };

        let mut cache = self.cache.write().await;
        let records = cache.entry(collection).or_default();
        records.push(record);
        self.persist(collection, records).await?;
        Ok(id)
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
        content: &Content,
        fields: &Fields,
        updated_at: DateTime<Utc>,
        refresh_created: Option<DateTime<Utc>>,
    ) -> Result<bool, StorageError> {
        let mut cache = self.cache.write().await;
        let records = cache.entry(collection).or_default();
        let Some(record) = records.iter_mut().find(|r| r.id.matches(id.as_str())) else {
            return Ok(false);
        };
        record.content = content.clone();
        record.fields = fields.clone();
        record.updated_at = updated_at;
        if let Some(created) = refresh_created {
            record.created_at = created;
        }
        self.persist(collection, records).await?;
        Ok(true)
    }

    async fn delete_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<u64, StorageError> {
        let mut cache = self.cache.write().await;
        let records = cache.entry(collection).or_default();
        let before = records.len();
        records.retain(|r| !r.id.matches(id.as_str()));
        let deleted = (before - records.len()) as u64;
        if deleted > 0 {
            self.persist(collection, records).await?;
        }
        Ok(deleted)
    }

    async fn clear(&self, collection: Collection) -> Result<(), StorageError> {
        let mut cache = self.cache.write().await;
        let records = cache.entry(collection).or_default();
        records.clear();
        self.persist(collection, records).await?;
        Ok(())
    }

    async fn replace_all(
        &self,
        collection: Collection,
        new_records: &[Record],
    ) -> Result<(), StorageError> {
        let mut cache = self.cache.write().await;
        let records = cache.entry(collection).or_default();
        *records = new_records.to_vec();
        self.persist(collection, records).await?;
        Ok(())
    }

    async fn count(&self, collection: Collection) -> Result<u64, StorageError> {
        let cache = self.cache.read().await;
        Ok(cache.get(&collection).map(|r| r.len()).unwrap_or(0) as u64)
    }
}
