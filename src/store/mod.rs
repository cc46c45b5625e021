//! The CRUD façade over a storage backend.
//!
//! All application access to journal data goes through [`RecordStore`]. On
//! the write path it projects content into typed fields, applies the
//! per-collection singularity rules (one personal-info subject, one mood per
//! day, one current preference per item, title-matched milestones/thoughts),
//! and emits a change notification. Read paths never fail: backend errors
//! are logged and an empty result returned, keeping the journal usable over
//! strict error visibility.
//!
//! Every read-modify-write sequence holds a per-collection mutex. The
//! backends themselves only guarantee per-statement (sqlite) or
//! per-file-rewrite (flat) atomicity, so without the mutex two interleaved
//! inserts into `preferences` could both observe the pre-insert state and
//! double-insert.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::warn;

use crate::backend::StorageBackend;
use crate::error::StorageError;
use crate::projector::project;
use crate::reconcile::canonical_key;
use crate::types::{Collection, Content, Record, RecordId};

#[cfg(test)]
mod tests;

/// Emitted after every successful write so dependent layers can refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub collection: Collection,
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
    locks: HashMap<Collection, Mutex<()>>,
    events: broadcast::Sender<StoreEvent>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let locks = Collection::ALL
            .into_iter()
            .map(|c| (c, Mutex::new(())))
            .collect();
        RecordStore {
            backend,
            locks,
            events,
        }
    }

    /// Subscribe to change notifications. Lagging receivers miss events;
    /// they do not block writers.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub(crate) fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub(crate) fn write_lock(&self, collection: Collection) -> &Mutex<()> {
        // The map is built over Collection::ALL at construction; every
        // variant is present.
        &self.locks[&collection]
    }

    pub(crate) fn notify(&self, collection: Collection) {
        let _ = self.events.send(StoreEvent { collection });
    }

    /// Persist one content payload, applying the collection's singularity
    /// rule. Returns the id of the record that now carries the content —
    /// which is an existing record's id whenever the rule merged.
    pub async fn insert(
        &self,
        collection: Collection,
        content: Content,
    ) -> Result<RecordId, StorageError> {
        let _guard = self.write_lock(collection).lock().await;

        let id = match collection {
            Collection::Preferences => self.insert_preference(content).await?,
            Collection::PersonalInfo => self.insert_personal_info(content).await?,
            Collection::Moods => self.insert_mood(content).await?,
            Collection::Milestones | Collection::Thoughts => {
                self.insert_titled(collection, content).await?
            }
            Collection::FoodRecords | Collection::ChatHistory => {
                self.insert_plain(collection, content).await?
            }
        };

        self.notify(collection);
        Ok(id)
    }

    async fn insert_plain(
        &self,
        collection: Collection,
        content: Content,
    ) -> Result<RecordId, StorageError> {
        let fields = project(collection, &content);
        let now = Utc::now();
        self.backend
            .insert(collection, &content, &fields, now, now)
            .await
    }

    /// At most one current preference per (category, item). A repeat of the
    /// same pair overwrites the existing record — same polarity counts as a
    /// reaffirmation, opposite polarity as a retraction — and refreshes
    /// `created_at` either way: the most recent statement wins.
    async fn insert_preference(&self, content: Content) -> Result<RecordId, StorageError> {
        let collection = Collection::Preferences;
        let incoming = preference_pair(&content);

        if let Some(pair) = incoming {
            let existing = self.read_all(collection).await;
            if let Some(record) = existing
                .iter()
                .find(|r| preference_pair(&r.content).as_ref() == Some(&pair))
            {
                let fields = project(collection, &content);
                let now = Utc::now();
                self.backend
                    .update_by_id(collection, &record.id, &content, &fields, now, Some(now))
                    .await?;
                return Ok(record.id.clone());
            }
        }
        self.insert_plain(collection, content).await
    }

    /// One logical subject: every insert after the first shallow-merges into
    /// the earliest existing record.
    async fn insert_personal_info(&self, content: Content) -> Result<RecordId, StorageError> {
        let collection = Collection::PersonalInfo;
        let existing = self.read_all(collection).await;

        // get_all is newest-first; the logical subject is the oldest row.
        if let Some(record) = existing.last() {
            let merged = shallow_merge(&record.content, &content);
            let fields = project(collection, &merged);
            let now = Utc::now();
            self.backend
                .update_by_id(collection, &record.id, &merged, &fields, now, None)
                .await?;
            return Ok(record.id.clone());
        }
        self.insert_plain(collection, content).await
    }

    /// One mood per calendar date; a repeat for the same date merges the new
    /// fields over the old ones.
    async fn insert_mood(&self, content: Content) -> Result<RecordId, StorageError> {
        let collection = Collection::Moods;
        let incoming_date = content
            .get("date")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().format("%Y-%m-%d").to_string());

        let existing = self.read_all(collection).await;
        if let Some(record) = existing.iter().find(|r| {
            r.content_str("date")
                .map(str::to_string)
                .unwrap_or_else(|| r.created_at.format("%Y-%m-%d").to_string())
                == incoming_date
        }) {
            let merged = shallow_merge(&record.content, &content);
            let fields = project(collection, &merged);
            let now = Utc::now();
            self.backend
                .update_by_id(collection, &record.id, &merged, &fields, now, None)
                .await?;
            return Ok(record.id.clone());
        }
        self.insert_plain(collection, content).await
    }

    /// Milestones and thoughts collapse on title. A repeat only bumps the
    /// existing record's recency — narrative content is left as written.
    async fn insert_titled(
        &self,
        collection: Collection,
        content: Content,
    ) -> Result<RecordId, StorageError> {
        let title = content
            .get("title")
            .and_then(|v| v.as_str())
            .map(canonical_key)
            .filter(|t| !t.is_empty());

        if let Some(title) = title {
            let existing = self.read_all(collection).await;
            if let Some(record) = existing.iter().find(|r| {
                r.content_str("title")
                    .map(canonical_key)
                    .is_some_and(|t| t == title)
            }) {
                let now = Utc::now();
                self.backend
                    .update_by_id(
                        collection,
                        &record.id,
                        &record.content,
                        &record.fields,
                        now,
                        None,
                    )
                    .await?;
                return Ok(record.id.clone());
            }
        }
        self.insert_plain(collection, content).await
    }

    /// All records, newest first. Never fails: backend errors degrade to an
    /// empty list with a warning.
    pub async fn get_all(&self, collection: Collection) -> Vec<Record> {
        self.read_all(collection).await
    }

    async fn read_all(&self, collection: Collection) -> Vec<Record> {
        match self.backend.get_all(collection).await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    collection = collection.as_str(),
                    "Read failed, returning empty: {}", e
                );
                Vec::new()
            }
        }
    }

    /// Records created within the last `days` days, newest first.
    pub async fn get_recent(&self, collection: Collection, days: u32) -> Vec<Record> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));
        self.read_all(collection)
            .await
            .into_iter()
            .filter(|r| r.created_at >= cutoff)
            .collect()
    }

    /// Replace a record's content wholesale and re-stamp `updated_at`.
    /// Does not re-run singularity rules: those are an insert-time concern.
    /// Returns `false` when the id does not exist.
    pub async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        content: Content,
    ) -> Result<bool, StorageError> {
        let _guard = self.write_lock(collection).lock().await;
        let fields = project(collection, &content);
        let updated = self
            .backend
            .update_by_id(collection, id, &content, &fields, Utc::now(), None)
            .await?;
        if updated {
            self.notify(collection);
        }
        Ok(updated)
    }

    /// Delete by id; returns how many records were removed (0 or 1).
    pub async fn delete(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<u64, StorageError> {
        let _guard = self.write_lock(collection).lock().await;
        let deleted = self.backend.delete_by_id(collection, id).await?;
        if deleted > 0 {
            self.notify(collection);
        }
        Ok(deleted)
    }

    /// Remove every record in the collection.
    pub async fn clear(&self, collection: Collection) -> Result<(), StorageError> {
        let _guard = self.write_lock(collection).lock().await;
        self.backend.clear(collection).await?;
        self.notify(collection);
        Ok(())
    }

    /// Wipe the whole store. Collections are cleared independently; one
    /// failure is logged and the rest proceed.
    pub async fn clear_all(&self) {
        for collection in Collection::ALL {
            if let Err(e) = self.clear(collection).await {
                warn!(
                    collection = collection.as_str(),
                    "Clear failed during clear_all: {}", e
                );
            }
        }
    }

    /// Record count; degrades to 0 on backend failure (read-path policy).
    pub async fn count(&self, collection: Collection) -> u64 {
        match self.backend.count(collection).await {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    collection = collection.as_str(),
                    "Count failed, returning 0: {}", e
                );
                0
            }
        }
    }
}

/// Field-by-field overwrite of `base` with the entries of `overlay`.
fn shallow_merge(base: &Content, overlay: &Content) -> Content {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Canonicalized (category, item) pair, if both keys are present.
fn preference_pair(content: &Content) -> Option<(String, String)> {
    let category = content.get("category").and_then(|v| v.as_str())?;
    let item = content.get("item").and_then(|v| v.as_str())?;
    Some((canonical_key(category), canonical_key(item)))
}
