//! Relational engine: one typed table per collection on embedded SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::error::StorageError;
use crate::types::{
    Collection, ColumnSpec, ColumnType, Content, FieldValue, Fields, Record, RecordId,
};

/// Set restrictive file permissions (0600) on the database and WAL files.
#[cfg(unix)]
fn set_db_file_permissions(db_path: &str) {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::Permissions::from_mode(0o600);
    if let Err(e) = std::fs::set_permissions(db_path, mode.clone()) {
        tracing::warn!("Failed to set permissions on {}: {}", db_path, e);
    }
    for suffix in &["-wal", "-shm"] {
        let path = format!("{}{}", db_path, suffix);
        if std::path::Path::new(&path).exists() {
            if let Err(e) = std::fs::set_permissions(&path, mode.clone()) {
                tracing::warn!("Failed to set permissions on {}: {}", path, e);
            }
        }
    }
}

#[cfg(not(unix))]
fn set_db_file_permissions(_db_path: &str) {}

/// SQL column definition for one projected column.
fn column_ddl(col: &ColumnSpec) -> String {
    match col.ty {
        ColumnType::Integer => format!("{} INTEGER", col.name),
        ColumnType::Real => format!("{} REAL", col.name),
        ColumnType::Text => format!("{} TEXT", col.name),
        ColumnType::Enum(values) => {
            let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
            format!(
                "{} TEXT CHECK({} IN ({}))",
                col.name,
                col.name,
                quoted.join(", ")
            )
        }
    }
}

pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open (or create) the database and build one table per collection.
    pub async fn open(db_path: &str) -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await?;

        set_db_file_permissions(db_path);
        Self::create_tables(&pool).await?;
        Ok(SqliteBackend { pool })
    }

    /// In-memory database for tests and throwaway stores.
    ///
    /// Pinned to a single connection: pooled `:memory:` connections would
    /// each see their own empty database.
    pub async fn open_in_memory() -> Result<Self, StorageError> {
        let opts = SqliteConnectOptions::new().filename(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::create_tables(&pool).await?;
        Ok(SqliteBackend { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), StorageError> {
        for collection in Collection::ALL {
            let cols: Vec<String> = collection.columns().iter().map(column_ddl).collect();
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    content TEXT NOT NULL,
                    {},
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                collection.as_str(),
                cols.join(",\n                    ")
            );
            sqlx::query(&ddl).execute(pool).await?;

            let idx = format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_created ON {}(created_at)",
                collection.as_str(),
                collection.as_str()
            );
            sqlx::query(&idx).execute(pool).await?;
        }
        Ok(())
    }

    fn row_to_record(collection: Collection, row: &sqlx::sqlite::SqliteRow) -> Record {
        let id: i64 = row.get("id");
        let raw_content: String = row.get("content");
        let content: Content = serde_json::from_str(&raw_content).unwrap_or_else(|e| {
            tracing::warn!(
                collection = collection.as_str(),
                id,
                "Stored content is not valid JSON, treating as empty: {}",
                e
            );
            Content::new()
        });

        let mut fields = Fields::new();
        for col in collection.columns() {
            let value = match col.ty {
                ColumnType::Integer => row
                    .try_get::<Option<i64>, _>(col.name)
                    .unwrap_or(None)
                    .map(FieldValue::Int),
                ColumnType::Real => row
                    .try_get::<Option<f64>, _>(col.name)
                    .unwrap_or(None)
                    .map(FieldValue::Real),
                ColumnType::Text | ColumnType::Enum(_) => row
                    .try_get::<Option<String>, _>(col.name)
                    .unwrap_or(None)
                    .map(FieldValue::Text),
            };
            if let Some(v) = value {
                fields.insert(col.name.to_string(), v);
            }
        }

        Record {
            id: RecordId::from(id),
            collection,
            content,
            fields,
            created_at: parse_ts(row.get("created_at")),
            updated_at: parse_ts(row.get("updated_at")),
        }
    }
}

fn parse_ts(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        // Malformed timestamps sort oldest rather than newest.
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parse a string-normalized id back to the table's integer key.
fn int_id(id: &RecordId) -> Option<i64> {
    id.as_str().trim().parse::<i64>().ok()
}

#[async_trait]
impl super::StorageBackend for SqliteBackend {
    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StorageError> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY created_at DESC, id DESC",
            collection.as_str()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| Self::row_to_record(collection, row))
            .collect())
    }

    async fn insert(
        &self,
        collection: Collection,
        content: &Content,
        fields: &Fields,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<RecordId, StorageError> {
        let cols = collection.columns();
        let col_names: Vec<&str> = cols.iter().map(|c| c.name).collect();
        let placeholders: Vec<&str> = std::iter::repeat("?").take(cols.len() + 3).collect();
        let sql = format!(
            "INSERT INTO {} (content, {}, created_at, updated_at) VALUES ({})",
            collection.as_str(),
            col_names.join(", "),
            placeholders.join(", ")
        );

        let serialized = serde_json::to_string(content)?;
        let mut query = sqlx::query(&sql).bind(serialized);
        for col in cols {
            query = bind_field(query, col, fields);
        }
        let result = query
            .bind(created_at.to_rfc3339())
            .bind(updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(RecordId::from(result.last_insert_rowid()))
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
        let Some(row_id) = int_id(id) else {
            return Ok(false);
        };

        let cols = collection.columns();
        let mut sets: Vec<String> = vec!["content = ?".to_string()];
        sets.extend(cols.iter().map(|c| format!("{} = ?", c.name)));
        sets.push("updated_at = ?".to_string());
        if refresh_created.is_some() {
            sets.push("created_at = ?".to_string());
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            collection.as_str(),
            sets.join(", ")
        );

        let serialized = serde_json::to_string(content)?;
        let mut query = sqlx::query(&sql).bind(serialized);
        for col in cols {
            query = bind_field(query, col, fields);
        }
        query = query.bind(updated_at.to_rfc3339());
        if let Some(created) = refresh_created {
            query = query.bind(created.to_rfc3339());
        }
        let result = query.bind(row_id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> Result<u64, StorageError> {
        let Some(row_id) = int_id(id) else {
            return Ok(0);
        };
        let sql = format!("DELETE FROM {} WHERE id = ?", collection.as_str());
        let result = sqlx::query(&sql).bind(row_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn clear(&self, collection: Collection) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {}", collection.as_str());
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn replace_all(
        &self,
        collection: Collection,
        records: &[Record],
    ) -> Result<(), StorageError> {
        // Delete-then-reinsert; per-statement atomicity only (see spec on
        // cleanup crash behavior).
        self.clear(collection).await?;

        let cols = collection.columns();
        let col_names: Vec<&str> = cols.iter().map(|c| c.name).collect();
        let placeholders: Vec<&str> = std::iter::repeat("?").take(cols.len() + 4).collect();
        let sql = format!(
            "INSERT INTO {} (id, content, {}, created_at, updated_at) VALUES ({})",
            collection.as_str(),
            col_names.join(", "),
            placeholders.join(", ")
        );

        for record in records {
            let serialized = serde_json::to_string(&record.content)?;
            let mut query = sqlx::query(&sql)
                .bind(int_id(&record.id))
                .bind(serialized);
            for col in cols {
                query = bind_field(query, col, &record.fields);
            }
            query
                .bind(record.created_at.to_rfc3339())
                .bind(record.updated_at.to_rfc3339())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn count(&self, collection: Collection) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", collection.as_str());
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

/// Bind one projected column value (or NULL) with the column's declared type.
fn bind_field<'q>(query: SqliteQuery<'q>, col: &ColumnSpec, fields: &Fields) -> SqliteQuery<'q> {
    match col.ty {
        ColumnType::Integer => query.bind(fields.get(col.name).and_then(FieldValue::as_int)),
        ColumnType::Real => query.bind(fields.get(col.name).and_then(|v| match v {
            FieldValue::Real(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Text(_) => None,
        })),
        ColumnType::Text | ColumnType::Enum(_) => query.bind(
            fields
                .get(col.name)
                .and_then(FieldValue::as_text)
                .map(str::to_string),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StorageBackend;
    use crate::projector::project;
    use serde_json::json;

    fn content(v: serde_json::Value) -> Content {
        v.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn invalid_enum_value_is_a_constraint_violation() {
        let backend = SqliteBackend::open_in_memory().await.unwrap();
        let payload = content(json!({
            "category": "food",
            "item": "durian",
            "preference_type": "adores"
        }));
        let fields = project(Collection::Preferences, &payload);
        let now = Utc::now();

        let err = backend
            .insert(Collection::Preferences, &payload, &fields, now, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)));

        // Aborted insert leaves no partial write behind.
        assert_eq!(backend.count(Collection::Preferences).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn typed_columns_round_trip() {
        let backend = SqliteBackend::open_in_memory().await.unwrap();
        let payload = content(json!({
            "mood_type": "calm",
            "mood_score": "8",
            "date": "2026-08-20"
        }));
        let fields = project(Collection::Moods, &payload);
        let now = Utc::now();

        backend
            .insert(Collection::Moods, &payload, &fields, now, now)
            .await
            .unwrap();

        let all = backend.get_all(Collection::Moods).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fields.get("mood_score"), Some(&FieldValue::Int(8)));
        assert_eq!(all[0].content, payload);
    }
}
