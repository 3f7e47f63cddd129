//! Promotion rules.
//!
//! Ranks below the merit boundary follow an attendance step function
//! (threshold promotion). Ranks at or above it advance one step at a time
//! and only on a privileged caller's decision (merit promotion).

use muster_core::models::member::{Certifications, Member};
use muster_core::models::rank::{PromotionThreshold, Rank};
use serde::Serialize;

use crate::catalog::RankCatalog;
use crate::config::EngineConfig;
use crate::error::EngineError;

/// Reason shown to unprivileged callers for members in the merit tier.
pub const MERIT_TIER_REASON: &str = "Merit tier: promotion by command decision";

/// Reason shown when a merit-tier member already holds the top rank.
pub const TOP_RANK_REASON: &str = "Highest rank reached";

/// Outcome of a promotion evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionResult {
    pub eligible: bool,
    pub suggested_rank: Option<Rank>,
    pub is_merit: bool,
    pub display_reason: String,
}

impl PromotionResult {
    fn not_eligible(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            suggested_rank: None,
            is_merit: false,
            display_reason: reason.into(),
        }
    }
}

/// Attendance thresholds, ascending by count.
#[derive(Debug, Clone)]
pub struct ThresholdTable {
    steps: Vec<PromotionThreshold>,
}

impl ThresholdTable {
    /// Validate a threshold list against the catalog.
    ///
    /// Counts must ascend strictly, ranks must exist, rank order must not
    /// decrease along the table and no step may target a merit rank.
    pub fn new(steps: Vec<PromotionThreshold>, catalog: &RankCatalog) -> Result<Self, EngineError> {
        for step in &steps {
            if catalog.rank_of(&step.rank.name) != Some(&step.rank) {
                return Err(EngineError::UnknownThresholdRank(step.rank.name.clone()));
            }
            if catalog.is_merit_rank(&step.rank.name) {
                return Err(EngineError::MeritThreshold(step.rank.name.clone()));
            }
        }
        for pair in steps.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.attendance_count <= prev.attendance_count {
                return Err(EngineError::ThresholdsNotAscending {
                    previous: prev.attendance_count,
                    next: next.attendance_count,
                });
            }
            if next.rank.order < prev.rank.order {
                return Err(EngineError::ThresholdsNotMonotonic {
                    count: next.attendance_count,
                    previous: prev.rank.name.clone(),
                    next: next.rank.name.clone(),
                });
            }
        }
        Ok(Self { steps })
    }

    /// Resolve configured rank names against the catalog.
    pub fn from_config(config: &EngineConfig, catalog: &RankCatalog) -> Result<Self, EngineError> {
        let steps = config
            .thresholds
            .iter()
            .map(|t| {
                let rank = catalog
                    .rank_of(&t.rank)
                    .cloned()
                    .ok_or_else(|| EngineError::UnknownThresholdRank(t.rank.clone()))?;
                Ok(PromotionThreshold {
                    attendance_count: t.attendance_count,
                    rank,
                    requires: t.requires,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        Self::new(steps, catalog)
    }

    /// Floor of the step function: the last applicable threshold whose
    /// count does not exceed `attendance_count`. Steps gated on a
    /// certification the member does not hold are skipped.
    pub fn rank_for(&self, attendance_count: u32, certifications: &Certifications) -> Option<&Rank> {
        self.steps
            .iter()
            .filter(|s| s.requires.is_none_or(|c| certifications.holds(c)))
            .take_while(|s| s.attendance_count <= attendance_count)
            .last()
            .map(|s| &s.rank)
    }
}

/// Pure promotion calculator over a catalog and threshold table.
#[derive(Debug, Clone)]
pub struct PromotionEngine {
    catalog: RankCatalog,
    thresholds: ThresholdTable,
}

impl PromotionEngine {
    pub fn new(catalog: RankCatalog, thresholds: ThresholdTable) -> Self {
        Self {
            catalog,
            thresholds,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let catalog = RankCatalog::from_config(config)?;
        let thresholds = ThresholdTable::from_config(config, &catalog)?;
        Ok(Self::new(catalog, thresholds))
    }

    pub fn catalog(&self) -> &RankCatalog {
        &self.catalog
    }

    /// Rank earned by attendance alone; the lowest catalog rank when no
    /// threshold applies.
    pub fn threshold_rank(&self, attendance_count: u32, certifications: &Certifications) -> &Rank {
        self.thresholds
            .rank_for(attendance_count, certifications)
            .unwrap_or_else(|| self.catalog.lowest())
    }

    /// Compute promotion eligibility for `member`.
    ///
    /// Never mutates anything; `caller_is_privileged` only widens what is
    /// reported for merit-tier members.
    pub fn evaluate(&self, member: &Member, caller_is_privileged: bool) -> PromotionResult {
        if self.catalog.is_merit_rank(&member.rank) {
            if !caller_is_privileged {
                return PromotionResult::not_eligible(MERIT_TIER_REASON);
            }
            return match self.catalog.next_above(&member.rank) {
                Some(next) => PromotionResult {
                    eligible: true,
                    suggested_rank: Some(next.clone()),
                    is_merit: true,
                    display_reason: format!("Merit promotion to {}", next.name),
                },
                None => PromotionResult::not_eligible(TOP_RANK_REASON),
            };
        }

        let candidate = self.threshold_rank(member.attendance_count, &member.certifications);
        if candidate.order > self.catalog.order_of(&member.rank) {
            return PromotionResult {
                eligible: true,
                suggested_rank: Some(candidate.clone()),
                is_merit: false,
                display_reason: format!("Eligible for promotion to {}", candidate.name),
            };
        }

        let reason = member
            .promotion_status_note
            .clone()
            .unwrap_or_else(|| member.rank.clone());
        PromotionResult::not_eligible(reason)
    }

    /// Apply a promotion. Attendance is left untouched and applying the
    /// same target twice yields the same state.
    pub fn confirm_promotion(&self, member: &mut Member, new_rank: &str) -> Result<(), EngineError> {
        let rank = self
            .catalog
            .rank_of(new_rank)
            .ok_or_else(|| EngineError::UnknownRank(new_rank.to_string()))?;
        member.rank = rank.name.clone();
        member.promotion_status_note = Some(format!("Promoted to {}", rank.name));
        Ok(())
    }
}
