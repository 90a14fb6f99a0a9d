//! # Local Store Errors
//!
//! ```text
//! sqlx::Error / MigrateError ──► DbError ──► SdkError::Persistence ──► host
//! ```
//!
//! A failed write aborts the registration step or classification that issued
//! it; nothing above this layer retries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// No row for the given key.
    ///
    /// ## When This Occurs
    /// - Marking a campaign viewed when its id was never stored
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The database file could not be opened or created.
    ///
    /// ## When This Occurs
    /// - The data directory is read-only
    /// - The file is locked by another process past the connect timeout
    #[error("Cannot open local store: {0}")]
    ConnectionFailed(String),

    #[error("Schema migration failed: {0}")]
    MigrationFailed(String),

    /// SQLite rejected a statement.
    #[error("Statement failed: {0}")]
    QueryFailed(String),

    /// A multi-statement write (campaign upsert) could not commit.
    #[error("Write could not be committed: {0}")]
    TransactionFailed(String),

    #[error("No free connection to the local store")]
    PoolExhausted,

    #[error("Local store error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),
            sqlx::Error::Database(db_err) => DbError::QueryFailed(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("store was closed".to_string()),
            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
