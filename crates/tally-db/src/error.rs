//! # Store Errors
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error ──► DbError ──► OpsError (tally-ops)                       │
//! │                                                                         │
//! │  NotFound     missing row, or a conditional write that matched nothing  │
//! │  Conflict     row exists but is no longer in the state that was read    │
//! │  *Violation   schema constraint refused the write                       │
//! │  the rest     connection, migration or query failures                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// SQLite extended result codes for constraint failures.
const SQLITE_CONSTRAINT_CHECK: &str = "275";
const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";
const SQLITE_CONSTRAINT_PRIMARYKEY: &str = "1555";
const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A conditional write saw a different state than the caller read:
    /// status moved on, shipment already voided, refunds would exceed the
    /// order total.
    #[error("{entity} {id} was modified concurrently: {reason}")]
    Conflict {
        entity: String,
        id: String,
        reason: String,
    },

    /// Duplicate order number, SKU or label id. `target` is the
    /// `table.column` SQLite names.
    #[error("Duplicate value for {target}")]
    UniqueViolation { target: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Negative stock, zero-delta ledger rows and similar.
    #[error("Check constraint failed: {message}")]
    CheckViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn conflict(
        entity: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        DbError::Conflict {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }

    /// Connection-level failures, as opposed to anything about the data.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_) | DbError::PoolExhausted)
    }

    fn from_constraint(code: Option<&str>, message: &str) -> Self {
        match code {
            Some(SQLITE_CONSTRAINT_UNIQUE) | Some(SQLITE_CONSTRAINT_PRIMARYKEY) => {
                DbError::UniqueViolation {
                    target: message
                        .rsplit(": ")
                        .next()
                        .unwrap_or(message)
                        .to_string(),
                }
            }
            Some(SQLITE_CONSTRAINT_FOREIGNKEY) => DbError::ForeignKeyViolation {
                message: message.to_string(),
            },
            Some(SQLITE_CONSTRAINT_CHECK) => DbError::CheckViolation {
                message: message.to_string(),
            },
            _ => DbError::QueryFailed(message.to_string()),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            // Repositories use fetch_optional; a bare RowNotFound has no id to report
            sqlx::Error::RowNotFound => DbError::not_found("Row", "(unspecified)"),
            sqlx::Error::Database(db_err) => {
                DbError::from_constraint(db_err.code().as_deref(), db_err.message())
            }
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
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
