//! Core domain types: collections, records, and the typed column vocabulary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The fixed set of logical tables the journal persists.
///
/// The vocabulary is closed: upstream analysis only ever produces payloads for
/// these seven categories, and the storage layer rejects nothing else because
/// nothing else can reach it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    PersonalInfo,
    Preferences,
    Milestones,
    Moods,
    Thoughts,
    FoodRecords,
    ChatHistory,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::PersonalInfo,
        Collection::Preferences,
        Collection::Milestones,
        Collection::Moods,
        Collection::Thoughts,
        Collection::FoodRecords,
        Collection::ChatHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::PersonalInfo => "personal_info",
            Collection::Preferences => "preferences",
            Collection::Milestones => "milestones",
            Collection::Moods => "moods",
            Collection::Thoughts => "thoughts",
            Collection::FoodRecords => "food_records",
            Collection::ChatHistory => "chat_history",
        }
    }

    /// The typed columns projected out of a content payload for this
    /// collection. Everything not listed here stays in the canonical payload
    /// and never becomes a column.
    pub fn columns(&self) -> &'static [ColumnSpec] {
        const PERSONAL_INFO: &[ColumnSpec] = &[
            ColumnSpec::text("name"),
            ColumnSpec::integer("age"),
            ColumnSpec::real("height"),
            ColumnSpec::real("weight"),
            ColumnSpec::text("occupation"),
            ColumnSpec::text("location"),
        ];
        const PREFERENCES: &[ColumnSpec] = &[
            ColumnSpec::text("category"),
            ColumnSpec::text("item"),
            ColumnSpec {
                name: "preference_type",
                ty: ColumnType::Enum(&["like", "dislike"]),
            },
            ColumnSpec::integer("intensity"),
            ColumnSpec::text("reason"),
        ];
        const MILESTONES: &[ColumnSpec] = &[
            ColumnSpec::text("title"),
            ColumnSpec::text("description"),
            ColumnSpec::text("category"),
            ColumnSpec::text("status"),
            ColumnSpec::text("date"),
        ];
        const MOODS: &[ColumnSpec] = &[
            ColumnSpec::text("mood_type"),
            ColumnSpec::integer("mood_score"),
            ColumnSpec::text("date"),
            ColumnSpec::text("trigger"),
            ColumnSpec::text("note"),
        ];
        const THOUGHTS: &[ColumnSpec] = &[
            ColumnSpec::text("title"),
            ColumnSpec::text("category"),
            ColumnSpec::text("tags"),
        ];
        const FOOD_RECORDS: &[ColumnSpec] = &[
            ColumnSpec::text("food_name"),
            ColumnSpec::text("meal_type"),
            ColumnSpec::real("calories"),
            ColumnSpec::text("quantity"),
            ColumnSpec::text("date"),
            ColumnSpec::text("notes"),
        ];
        const CHAT_HISTORY: &[ColumnSpec] = &[
            ColumnSpec::text("session_id"),
            ColumnSpec::text("user_message"),
            ColumnSpec::text("ai_response"),
        ];

        match self {
            Collection::PersonalInfo => PERSONAL_INFO,
            Collection::Preferences => PREFERENCES,
            Collection::Milestones => MILESTONES,
            Collection::Moods => MOODS,
            Collection::Thoughts => THOUGHTS,
            Collection::FoodRecords => FOOD_RECORDS,
            Collection::ChatHistory => CHAT_HISTORY,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal_info" => Ok(Collection::PersonalInfo),
            "preferences" => Ok(Collection::Preferences),
            "milestones" => Ok(Collection::Milestones),
            "moods" => Ok(Collection::Moods),
            "thoughts" => Ok(Collection::Thoughts),
            "food_records" => Ok(Collection::FoodRecords),
            "chat_history" => Ok(Collection::ChatHistory),
            other => Err(format!("unknown collection: {}", other)),
        }
    }
}

/// Declared type of a projected column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    /// TEXT restricted to a closed set of values, enforced with a CHECK
    /// constraint on the relational backend.
    Enum(&'static [&'static str]),
}

/// One projected column: its name and declared type.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl ColumnSpec {
    const fn text(name: &'static str) -> Self {
        ColumnSpec {
            name,
            ty: ColumnType::Text,
        }
    }

    const fn integer(name: &'static str) -> Self {
        ColumnSpec {
            name,
            ty: ColumnType::Integer,
        }
    }

    const fn real(name: &'static str) -> Self {
        ColumnSpec {
            name,
            ty: ColumnType::Real,
        }
    }
}

/// A typed value held in a projected column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Real(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Opaque record identifier.
///
/// The relational backend assigns auto-increment integers, the flat backend
/// assigns monotonic string tokens. Both are carried as strings so ids survive
/// round-trips through untyped JSON; equality is string-normalized to tolerate
/// a numeric id arriving as `7` in one code path and `"7"` in another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(raw: impl Into<String>) -> Self {
        RecordId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized equality against any id-ish value.
    pub fn matches(&self, other: &str) -> bool {
        self.0.trim() == other.trim()
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId(n.to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Projected fields: column name to typed value, absent keys omitted.
pub type Fields = BTreeMap<String, FieldValue>;

/// Canonical content payload as produced by upstream analysis.
pub type Content = Map<String, Value>;

/// The universal storage unit.
///
/// `content` is the source of truth; `fields` is derived via the schema
/// projector and must stay re-derivable from `content` at all times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub collection: Collection,
    pub content: Content,
    pub fields: Fields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Convenience accessor into the canonical payload.
    pub fn content_str(&self, key: &str) -> Option<&str> {
        self.content.get(key).and_then(Value::as_str)
    }
}
