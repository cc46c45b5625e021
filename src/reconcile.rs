//! Bulk deduplication and conflict resolution.
//!
//! Insert-time singularity rules live on the write path in [`crate::store`];
//! this module is the explicit maintenance pass: fingerprint every record of
//! a collection, collapse each fingerprint group to its most recent member,
//! and commit the retained set back.
//!
//! Fingerprints are heuristics, not strict identity. Two milestones that
//! happen to share a title will collapse; that matches the product's
//! "reaffirmed, not duplicated" reading of repeated extractions.

use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::error::StorageError;
use crate::store::RecordStore;
use crate::types::{Collection, Record};
use crate::utils::truncate_str;

/// Leading slice of a chat message / serialized payload used as identity.
const FINGERPRINT_PREFIX_CHARS: usize = 64;

/// Normalize free text into a stable matching key: trim, lowercase, collapse
/// runs of non-alphanumerics into single underscores.
pub fn canonical_key(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        raw.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Collection-specific identity key for dedup grouping.
///
/// Records whose content lacks the expected keys fall back to the raw
/// serialized payload as the key — they are never dropped silently.
pub fn fingerprint(record: &Record) -> String {
    let key = match record.collection {
        // (category, item) ignoring polarity: a like and a dislike of the
        // same item land in one group, so the generic most-recent-wins
        // collapse below is exactly the contradiction-resolution policy.
        Collection::Preferences => pair_key(record, "category", "item"),
        Collection::PersonalInfo => record
            .content_str("name")
            .map(canonical_key)
            .filter(|k| !k.is_empty()),
        Collection::Milestones => title_key(record),
        Collection::Thoughts => title_key(record),
        Collection::Moods => Some(format!(
            "{}|{}",
            canonical_key(record.content_str("mood_type").unwrap_or("")),
            record_date(record)
        )),
        Collection::FoodRecords => record.content_str("food_name").map(|name| {
            format!("{}|{}", canonical_key(name), record_date(record))
        }),
        Collection::ChatHistory => record.content_str("user_message").map(|msg| {
            format!(
                "{}|{}",
                truncate_str(&canonical_key(msg), FINGERPRINT_PREFIX_CHARS),
                record.content_str("session_id").unwrap_or("")
            )
        }),
    };

    key.unwrap_or_else(|| raw_content_key(record))
}

/// Title if present, else a truncated canonical slice of the whole payload.
fn title_key(record: &Record) -> Option<String> {
    match record.content_str("title").map(canonical_key) {
        Some(k) if !k.is_empty() => Some(k),
        _ => Some(truncate_str(
            &canonical_key(&raw_content_key(record)),
            FINGERPRINT_PREFIX_CHARS,
        )),
    }
}

fn pair_key(record: &Record, a: &str, b: &str) -> Option<String> {
    match (record.content_str(a), record.content_str(b)) {
        (Some(x), Some(y)) => Some(format!("{}|{}", canonical_key(x), canonical_key(y))),
        _ => None,
    }
}

/// The record's own date field, defaulting to its creation date.
fn record_date(record: &Record) -> String {
    record
        .content_str("date")
        .map(str::to_string)
        .unwrap_or_else(|| record.created_at.format("%Y-%m-%d").to_string())
}

/// Last-resort key: the serialized payload itself.
fn raw_content_key(record: &Record) -> String {
    serde_json::to_string(&record.content).unwrap_or_else(|e| {
        warn!(
            collection = record.collection.as_str(),
            id = record.id.as_str(),
            "Content failed to serialize during fingerprinting: {}",
            e
        );
        format!("{:?}", record.content)
    })
}

/// Per-collection cleanup outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupStats {
    pub scanned: usize,
    pub removed: usize,
}

/// Outcome of a full-store cleanup run. One collection failing does not
/// abort the others; failures show up as absent entries plus a warning.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub collections: BTreeMap<Collection, CleanupStats>,
}

impl CleanupReport {
    pub fn total_removed(&self) -> usize {
        self.collections.values().map(|s| s.removed).sum()
    }
}

impl RecordStore {
    /// Deduplicate one collection: group by fingerprint, retain the most
    /// recent record of each group (last-seen wins on timestamp ties), and
    /// commit the retained set. Idempotent: a second run removes nothing.
    pub async fn cleanup_collection(
        &self,
        collection: Collection,
    ) -> Result<CleanupStats, StorageError> {
        let _guard = self.write_lock(collection).lock().await;

        let records = self.backend().get_all(collection).await?;
        let scanned = records.len();

        let mut retained: HashMap<String, Record> = HashMap::with_capacity(scanned);
        // Scan oldest-first; on a created_at tie the later-seen record wins.
        for record in records.into_iter().rev() {
            let key = fingerprint(&record);
            match retained.get(&key) {
                Some(existing) if record.created_at < existing.created_at => {}
                _ => {
                    retained.insert(key, record);
                }
            }
        }

        let removed = scanned - retained.len();
        if removed > 0 {
            let mut kept: Vec<Record> = retained.into_values().collect();
            kept.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            self.backend().replace_all(collection, &kept).await?;
            self.notify(collection);
        }

        info!(
            collection = collection.as_str(),
            scanned, removed, "Cleanup pass finished"
        );
        Ok(CleanupStats { scanned, removed })
    }

    /// Run cleanup over every collection. Each is independent; one failure
    /// doesn't block the others.
    pub async fn run_cleanup(&self) -> CleanupReport {
        let mut report = CleanupReport::default();
        for collection in Collection::ALL {
            match self.cleanup_collection(collection).await {
                Ok(stats) => {
                    report.collections.insert(collection, stats);
                }
                Err(e) => {
                    warn!(
                        collection = collection.as_str(),
                        "Cleanup failed for collection: {}", e
                    );
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::flat::FlatBackend;
    use crate::backend::StorageBackend;
    use crate::projector::project;
    use crate::types::Content;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn content(v: serde_json::Value) -> Content {
        v.as_object().unwrap().clone()
    }

    async fn setup_store() -> (RecordStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FlatBackend::open(dir.path()).await.unwrap();
        (RecordStore::new(Arc::new(backend)), dir)
    }

    /// Insert through the backend directly, bypassing insert-time rules, so
    /// cleanup has actual duplicates to chew on.
    async fn raw_insert(
        store: &RecordStore,
        collection: Collection,
        payload: Content,
        age_days: i64,
    ) {
        let ts = Utc::now() - Duration::days(age_days);
        let fields = project(collection, &payload);
        store
            .backend()
            .insert(collection, &payload, &fields, ts, ts)
            .await
            .unwrap();
    }

    #[test]
    fn canonical_key_normalizes() {
        assert_eq!(canonical_key("  Dog Name "), "dog_name");
        assert_eq!(canonical_key("jazz!!"), "jazz");
        assert_eq!(canonical_key("--"), "--");
        assert_eq!(canonical_key(""), "");
    }

    #[tokio::test]
    async fn contradictory_preferences_keep_most_recent() {
        let (store, _dir) = setup_store().await;
        raw_insert(
            &store,
            Collection::Preferences,
            content(json!({"category": "food", "item": "durian", "preference_type": "like"})),
            2,
        )
        .await;
        raw_insert(
            &store,
            Collection::Preferences,
            content(json!({"category": "food", "item": "durian", "preference_type": "dislike"})),
            0,
        )
        .await;

        let stats = store
            .cleanup_collection(Collection::Preferences)
            .await
            .unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.removed, 1);

        let remaining = store.get_all(Collection::Preferences).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].content_str("preference_type"), Some("dislike"));
    }

    #[tokio::test]
    async fn cleanup_is_idempotent() {
        let (store, _dir) = setup_store().await;
        for i in 0..3 {
            raw_insert(
                &store,
                Collection::Thoughts,
                content(json!({"title": "same thought"})),
                i,
            )
            .await;
        }
        raw_insert(
            &store,
            Collection::Thoughts,
            content(json!({"title": "different thought"})),
            1,
        )
        .await;

        let first = store.cleanup_collection(Collection::Thoughts).await.unwrap();
        assert_eq!(first.removed, 2);

        let second = store.cleanup_collection(Collection::Thoughts).await.unwrap();
        assert_eq!(second.scanned, 2);
        assert_eq!(second.removed, 0);
    }

    #[tokio::test]
    async fn chat_history_dedup_respects_sessions() {
        let (store, _dir) = setup_store().await;
        let msg = |session: &str| {
            content(json!({
                "session_id": session,
                "user_message": "how was my week?",
                "ai_response": "pretty good overall"
            }))
        };
        // Same session, exact repeat: collapses.
        raw_insert(&store, Collection::ChatHistory, msg("s1"), 1).await;
        raw_insert(&store, Collection::ChatHistory, msg("s1"), 0).await;
        // Other session, identical text: retained.
        raw_insert(&store, Collection::ChatHistory, msg("s2"), 0).await;

        let stats = store
            .cleanup_collection(Collection::ChatHistory)
            .await
            .unwrap();
        assert_eq!(stats.removed, 1);
        assert_eq!(store.get_all(Collection::ChatHistory).await.len(), 2);
    }

    #[tokio::test]
    async fn keyless_records_fall_back_to_raw_content() {
        let (store, _dir) = setup_store().await;
        // No food_name: each distinct payload keys on its own serialization.
        raw_insert(
            &store,
            Collection::FoodRecords,
            content(json!({"notes": "skipped lunch"})),
            1,
        )
        .await;
        raw_insert(
            &store,
            Collection::FoodRecords,
            content(json!({"notes": "late dinner"})),
            0,
        )
        .await;

        let stats = store
            .cleanup_collection(Collection::FoodRecords)
            .await
            .unwrap();
        assert_eq!(stats.removed, 0);
    }

    #[tokio::test]
    async fn cleanup_preserves_ids_and_timestamps() {
        let (store, _dir) = setup_store().await;
        raw_insert(
            &store,
            Collection::Milestones,
            content(json!({"title": "first 10k", "status": "completed"})),
            3,
        )
        .await;
        let before = store.get_all(Collection::Milestones).await;
        raw_insert(
            &store,
            Collection::Milestones,
            content(json!({"title": "first 10k", "status": "completed", "date": "2026-08-23"})),
            0,
        )
        .await;

        store
            .cleanup_collection(Collection::Milestones)
            .await
            .unwrap();
        let after = store.get_all(Collection::Milestones).await;
        assert_eq!(after.len(), 1);
        // The survivor is the newer record, untouched.
        assert_ne!(after[0].id, before[0].id);
        assert_eq!(after[0].content_str("date"), Some("2026-08-23"));
    }
}
