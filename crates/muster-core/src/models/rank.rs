//! Rank and promotion-threshold domain models.

use serde::{Deserialize, Serialize};

use super::member::Certification;

/// A named position in the community hierarchy.
///
/// Ranks are totally ordered by `order`; a catalog never holds two ranks
/// with the same order value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rank {
    pub name: String,
    pub order: u32,
}

impl Rank {
    pub fn new(name: impl Into<String>, order: u32) -> Self {
        Self {
            name: name.into(),
            order,
        }
    }
}

/// One step of the attendance-to-rank step function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PromotionThreshold {
    /// Minimum attendance count at which this step applies.
    pub attendance_count: u32,
    pub rank: Rank,
    /// Certification the member must hold for this step to count.
    pub requires: Option<Certification>,
}
