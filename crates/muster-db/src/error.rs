//! Database-specific error types and conversions.

use muster_core::error::MusterError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid stored record: {0}")]
    Decode(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Version conflict on {entity} {id}: expected {expected}, found {found}")]
    Conflict {
        entity: String,
        id: String,
        expected: u64,
        found: u64,
    },
}

impl From<DbError> for MusterError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => MusterError::NotFound { entity, id },
            DbError::Conflict {
                entity,
                id,
                expected,
                found,
            } => MusterError::Conflict {
                entity,
                id,
                expected,
                found,
            },
            other => MusterError::Persistence(other.to_string()),
        }
    }
}
