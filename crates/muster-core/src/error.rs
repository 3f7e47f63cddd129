//! Error types for the muster system.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MusterError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflicting write on {entity} {id}: expected version {expected}, found {found}")]
    Conflict {
        entity: String,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("Persistence error: {0}")]
    Persistence(String),
}

pub type MusterResult<T> = Result<T, MusterError>;
