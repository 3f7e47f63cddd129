//! Engine error types.

use muster_core::error::MusterError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rank catalog is empty")]
    EmptyCatalog,

    #[error("duplicate rank name in catalog: {0}")]
    DuplicateRankName(String),

    #[error("duplicate rank order in catalog: {0}")]
    DuplicateRankOrder(u32),

    #[error("rank {0} uses order 0, which is reserved for unknown ranks")]
    ReservedRankOrder(String),

    #[error("merit boundary rank is not in the catalog: {0}")]
    UnknownMeritBoundary(String),

    #[error("threshold references a rank that is not in the catalog: {0}")]
    UnknownThresholdRank(String),

    #[error("thresholds must ascend by attendance count ({previous} then {next})")]
    ThresholdsNotAscending { previous: u32, next: u32 },

    #[error("threshold rank {next} at {count} is below the preceding rank {previous}")]
    ThresholdsNotMonotonic {
        count: u32,
        previous: String,
        next: String,
    },

    #[error("threshold targets merit rank {0}; merit ranks are promoted manually")]
    MeritThreshold(String),

    #[error("unknown rank: {0}")]
    UnknownRank(String),

    #[error("cannot {action} member {member_id}: {reason}")]
    IllegalTransition {
        member_id: Uuid,
        action: &'static str,
        reason: &'static str,
    },

    #[error("{0} requires a privileged caller")]
    PrivilegeRequired(&'static str),

    #[error("invalid member input: {0}")]
    InvalidInput(String),
}

impl From<EngineError> for MusterError {
    fn from(err: EngineError) -> Self {
        MusterError::Validation {
            message: err.to_string(),
        }
    }
}
