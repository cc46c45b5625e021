//! Typed errors surfaced by the storage layer.
//!
//! Write paths propagate these to the caller; read paths never do — the
//! record store logs the cause and returns an empty result instead. A missing
//! update/delete target is not an error at all: those operations report
//! `Ok(false)` / `Ok(0)`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Operation attempted against a backend whose storage location is gone
    /// or was never set up. Writes fail hard with this; reads degrade to
    /// empty results upstream.
    #[error("storage not initialized: {0}")]
    Uninitialized(String),

    /// The relational engine rejected a write (e.g. an enum CHECK failure).
    /// The insert is aborted with no partial write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Content could not be parsed or serialized. During reconciliation
    /// fingerprinting this is recovered locally by keying on the raw content.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying file/database operation failed (disk full, corruption,
    /// pool closed).
    #[error("storage I/O error: {0}")]
    Io(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            // SQLite constraint family: primary code 19 plus extended codes
            // (275 = CHECK, 1555 = PRIMARY KEY, 2067 = UNIQUE).
            if matches!(
                db_err.code().as_deref(),
                Some("19") | Some("275") | Some("1555") | Some("2067")
            ) {
                return StorageError::ConstraintViolation(db_err.message().to_string());
            }
        }
        StorageError::Io(e.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}
