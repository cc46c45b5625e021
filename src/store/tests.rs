use super::*;
use crate::backend::flat::FlatBackend;
use crate::backend::sqlite::SqliteBackend;
use crate::types::FieldValue;
use serde_json::json;
use tempfile::TempDir;

fn content(v: serde_json::Value) -> Content {
    v.as_object().unwrap().clone()
}

async fn setup_sqlite_store() -> RecordStore {
    let backend = SqliteBackend::open_in_memory().await.unwrap();
    RecordStore::new(Arc::new(backend))
}

async fn setup_flat_store() -> (RecordStore, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let backend = FlatBackend::open(dir.path()).await.unwrap();
    (RecordStore::new(Arc::new(backend)), dir)
}

// ==================== Insert / read round trips ====================

async fn check_insert_round_trip(store: &RecordStore) {
    let payload = content(json!({
        "category": "music",
        "item": "jazz",
        "preference_type": "like",
        "intensity": 8
    }));
    store
        .insert(Collection::Preferences, payload.clone())
        .await
        .unwrap();

    let all = store.get_all(Collection::Preferences).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content, payload);
    assert_eq!(
        all[0].fields.get("intensity"),
        Some(&FieldValue::Int(8))
    );
}

#[tokio::test]
async fn insert_round_trip_sqlite() {
    check_insert_round_trip(&setup_sqlite_store().await).await;
}

#[tokio::test]
async fn insert_round_trip_flat() {
    let (store, _dir) = setup_flat_store().await;
    check_insert_round_trip(&store).await;
}

// ==================== Preference singularity ====================

async fn check_preference_polarity_flip(store: &RecordStore) {
    store
        .insert(
            Collection::Preferences,
            content(json!({"category": "food", "item": "durian", "preference_type": "like"})),
        )
        .await
        .unwrap();
    store
        .insert(
            Collection::Preferences,
            content(json!({"category": "food", "item": "durian", "preference_type": "dislike"})),
        )
        .await
        .unwrap();

    let all = store.get_all(Collection::Preferences).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content_str("preference_type"), Some("dislike"));
}

#[tokio::test]
async fn preference_polarity_flip_sqlite() {
    check_preference_polarity_flip(&setup_sqlite_store().await).await;
}

#[tokio::test]
async fn preference_polarity_flip_flat() {
    let (store, _dir) = setup_flat_store().await;
    check_preference_polarity_flip(&store).await;
}

#[tokio::test]
async fn distinct_preference_items_do_not_merge() {
    let store = setup_sqlite_store().await;
    store
        .insert(
            Collection::Preferences,
            content(json!({"category": "food", "item": "durian", "preference_type": "like"})),
        )
        .await
        .unwrap();
    store
        .insert(
            Collection::Preferences,
            content(json!({"category": "food", "item": "natto", "preference_type": "like"})),
        )
        .await
        .unwrap();

    assert_eq!(store.get_all(Collection::Preferences).await.len(), 2);
}

#[tokio::test]
async fn reaffirmed_preference_keeps_one_record() {
    let store = setup_sqlite_store().await;
    let id1 = store
        .insert(
            Collection::Preferences,
            content(json!({"category": "music", "item": "jazz", "preference_type": "like"})),
        )
        .await
        .unwrap();
    let id2 = store
        .insert(
            Collection::Preferences,
            content(json!({"category": "music", "item": "jazz", "preference_type": "like", "intensity": 9})),
        )
        .await
        .unwrap();

    assert_eq!(id1, id2);
    let all = store.get_all(Collection::Preferences).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].fields.get("intensity"), Some(&FieldValue::Int(9)));
}

// ==================== Personal-info merge ====================

async fn check_personal_info_merge(store: &RecordStore) {
    store
        .insert(Collection::PersonalInfo, content(json!({"name": "Alice"})))
        .await
        .unwrap();
    store
        .insert(Collection::PersonalInfo, content(json!({"age": 30})))
        .await
        .unwrap();

    let all = store.get_all(Collection::PersonalInfo).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content_str("name"), Some("Alice"));
    assert_eq!(all[0].content.get("age"), Some(&json!(30)));
    assert_eq!(all[0].fields.get("age"), Some(&FieldValue::Int(30)));
}

#[tokio::test]
async fn personal_info_merge_sqlite() {
    check_personal_info_merge(&setup_sqlite_store().await).await;
}

#[tokio::test]
async fn personal_info_merge_flat() {
    let (store, _dir) = setup_flat_store().await;
    check_personal_info_merge(&store).await;
}

// ==================== Mood per day ====================

async fn check_mood_per_day(store: &RecordStore) {
    store
        .insert(
            Collection::Moods,
            content(json!({"mood_type": "anxious", "mood_score": 4, "date": "2026-08-20"})),
        )
        .await
        .unwrap();
    store
        .insert(
            Collection::Moods,
            content(json!({"mood_type": "calm", "date": "2026-08-20", "note": "evening walk helped"})),
        )
        .await
        .unwrap();

    let all = store.get_all(Collection::Moods).await;
    assert_eq!(all.len(), 1);
    // Later insert merged over the earlier one.
    assert_eq!(all[0].content_str("mood_type"), Some("calm"));
    assert_eq!(all[0].content.get("mood_score"), Some(&json!(4)));
    assert_eq!(all[0].content_str("note"), Some("evening walk helped"));
}

#[tokio::test]
async fn mood_per_day_sqlite() {
    check_mood_per_day(&setup_sqlite_store().await).await;
}

#[tokio::test]
async fn mood_per_day_flat() {
    let (store, _dir) = setup_flat_store().await;
    check_mood_per_day(&store).await;
}

#[tokio::test]
async fn moods_on_different_dates_stay_separate() {
    let store = setup_sqlite_store().await;
    store
        .insert(
            Collection::Moods,
            content(json!({"mood_type": "calm", "date": "2026-08-19"})),
        )
        .await
        .unwrap();
    store
        .insert(
            Collection::Moods,
            content(json!({"mood_type": "calm", "date": "2026-08-20"})),
        )
        .await
        .unwrap();
    assert_eq!(store.get_all(Collection::Moods).await.len(), 2);
}

// ==================== Titled collections ====================

#[tokio::test]
async fn repeated_milestone_title_bumps_instead_of_duplicating() {
    let store = setup_sqlite_store().await;
    store
        .insert(
            Collection::Milestones,
            content(json!({"title": "First 10k", "description": "ran the whole way"})),
        )
        .await
        .unwrap();
    store
        .insert(
            Collection::Milestones,
            content(json!({"title": "first 10k!", "description": "a rewrite that must not win"})),
        )
        .await
        .unwrap();

    let all = store.get_all(Collection::Milestones).await;
    assert_eq!(all.len(), 1);
    // Content is left as originally written; only recency is bumped.
    assert_eq!(
        all[0].content_str("description"),
        Some("ran the whole way")
    );
}

#[tokio::test]
async fn chat_history_is_append_only() {
    let store = setup_sqlite_store().await;
    let msg = content(json!({
        "session_id": "s1",
        "user_message": "hello",
        "ai_response": "hi"
    }));
    store
        .insert(Collection::ChatHistory, msg.clone())
        .await
        .unwrap();
    store.insert(Collection::ChatHistory, msg).await.unwrap();

    assert_eq!(store.get_all(Collection::ChatHistory).await.len(), 2);
}

// ==================== Delete / update / clear ====================

async fn check_delete_exactness(store: &RecordStore) {
    let keep = store
        .insert(
            Collection::Thoughts,
            content(json!({"title": "keep me"})),
        )
        .await
        .unwrap();
    let drop = store
        .insert(
            Collection::Thoughts,
            content(json!({"title": "drop me"})),
        )
        .await
        .unwrap();

    // Id arrives through a sloppier code path: padded string form.
    let sloppy = RecordId::new(format!("  {}  ", drop));
    assert_eq!(store.delete(Collection::Thoughts, &sloppy).await.unwrap(), 1);

    let all = store.get_all(Collection::Thoughts).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, keep);

    // Deleting again is a no-op, not an error.
    assert_eq!(store.delete(Collection::Thoughts, &sloppy).await.unwrap(), 0);
}

#[tokio::test]
async fn delete_exactness_sqlite() {
    check_delete_exactness(&setup_sqlite_store().await).await;
}

#[tokio::test]
async fn delete_exactness_flat() {
    let (store, _dir) = setup_flat_store().await;
    check_delete_exactness(&store).await;
}

#[tokio::test]
async fn update_replaces_content_and_keeps_unknown_fields() {
    let store = setup_sqlite_store().await;
    let id = store
        .insert(
            Collection::Thoughts,
            content(json!({"title": "on rain", "subjective_color": "grey"})),
        )
        .await
        .unwrap();

    // Unknown field survives insert verbatim.
    let all = store.get_all(Collection::Thoughts).await;
    assert_eq!(all[0].content_str("subjective_color"), Some("grey"));

    let updated = store
        .update(
            Collection::Thoughts,
            &id,
            content(json!({"title": "on rain", "subjective_color": "silver"})),
        )
        .await
        .unwrap();
    assert!(updated);

    let all = store.get_all(Collection::Thoughts).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content_str("subjective_color"), Some("silver"));

    // Missing target is Ok(false).
    let missing = store
        .update(
            Collection::Thoughts,
            &RecordId::new("999999"),
            content(json!({"title": "ghost"})),
        )
        .await
        .unwrap();
    assert!(!missing);
}

#[tokio::test]
async fn clear_empties_the_collection() {
    let (store, _dir) = setup_flat_store().await;
    store
        .insert(Collection::Thoughts, content(json!({"title": "a"})))
        .await
        .unwrap();
    store.clear(Collection::Thoughts).await.unwrap();
    assert!(store.get_all(Collection::Thoughts).await.is_empty());
    assert_eq!(store.count(Collection::Thoughts).await, 0);
}

// ==================== Recency window ====================

#[tokio::test]
async fn get_recent_filters_by_creation_date() {
    let (store, _dir) = setup_flat_store().await;

    // An old mood goes in through the backend so its created_at is 10 days back.
    let old_payload = content(json!({"mood_type": "tired", "date": "2026-08-16"}));
    let old_fields = crate::projector::project(Collection::Moods, &old_payload);
    let old_ts = Utc::now() - Duration::days(10);
    store
        .backend()
        .insert(Collection::Moods, &old_payload, &old_fields, old_ts, old_ts)
        .await
        .unwrap();

    store
        .insert(Collection::Moods, content(json!({"mood_type": "calm"})))
        .await
        .unwrap();

    let recent = store.get_recent(Collection::Moods, 7).await;
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].content_str("mood_type"), Some("calm"));
}

// ==================== Change notifications ====================

#[tokio::test]
async fn writes_emit_change_events() {
    let store = setup_sqlite_store().await;
    let mut events = store.subscribe();

    store
        .insert(Collection::Moods, content(json!({"mood_type": "calm"})))
        .await
        .unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(event.collection, Collection::Moods);
}
