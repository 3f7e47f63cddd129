//! Engine configuration.
//!
//! Loaded once at process start. The defaults describe the community's
//! standard hierarchy so the engine is usable without a config file.

use muster_core::models::member::Certification;
use muster_core::models::rank::Rank;
use serde::{Deserialize, Serialize};

/// Threshold entry as written in configuration; the rank is referenced
/// by name and resolved against the catalog at load time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThresholdConfig {
    pub attendance_count: u32,
    pub rank: String,
    #[serde(default)]
    pub requires: Option<Certification>,
}

/// Configuration for the rank catalog, promotion thresholds and the
/// lifecycle controller.
///
/// Thresholds may only target ranks below `merit_boundary`; a table that
/// names a merit rank is rejected at load time. Merit promotion only moves
/// a member who already holds a merit rank, so nothing promotes into the
/// merit tier. With the defaults, a Captain becomes a Major only through
/// `MemberLifecycleController::administrative_edit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Every rank in the hierarchy. Orders must be unique and non-zero.
    pub ranks: Vec<Rank>,
    /// Name of the first rank of the merit tier. This rank and every rank
    /// above it are entered only by administrative edit.
    pub merit_boundary: String,
    /// Attendance step function, ascending by count. Every target must sit
    /// below `merit_boundary`.
    pub thresholds: Vec<ThresholdConfig>,
    /// Reject writes whose member version is stale (default: false, which
    /// keeps last-write-wins semantics).
    pub optimistic_concurrency: bool,
    /// How long a remotely changed roster entry stays highlighted
    /// (default: 5 seconds).
    pub highlight_window_secs: u64,
}

const DEFAULT_RANKS: &[(&str, u32)] = &[
    ("Recruit", 1),
    ("Soldier", 2),
    ("Private-First-Class", 3),
    ("Lance-Corporal", 4),
    ("Corporal", 5),
    ("Sergeant3", 6),
    ("Sergeant2", 7),
    ("Sergeant1", 8),
    ("Sub-Lieutenant", 9),
    ("Cadet", 10),
    ("Aspirant", 11),
    ("Second-Lieutenant", 12),
    ("First-Lieutenant", 13),
    ("Captain", 14),
    ("Major", 15),
    ("Lieutenant-Colonel", 16),
    ("Colonel", 17),
    ("General", 18),
];

const DEFAULT_THRESHOLDS: &[(u32, &str, Option<Certification>)] = &[
    (0, "Recruit", None),
    (5, "Soldier", None),
    (15, "Private-First-Class", None),
    (30, "Lance-Corporal", None),
    (45, "Corporal", None),
    (55, "Sergeant3", Some(Certification::Training)),
    (70, "Sergeant2", Some(Certification::Training)),
    (90, "Sergeant1", Some(Certification::Training)),
    (110, "Sub-Lieutenant", Some(Certification::Leadership)),
    (130, "Cadet", Some(Certification::Leadership)),
    (150, "Aspirant", Some(Certification::Leadership)),
    (175, "Second-Lieutenant", Some(Certification::Leadership)),
    (200, "First-Lieutenant", Some(Certification::Leadership)),
    (250, "Captain", Some(Certification::Leadership)),
];

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ranks: DEFAULT_RANKS
                .iter()
                .map(|(name, order)| Rank::new(*name, *order))
                .collect(),
            merit_boundary: "Major".into(),
            thresholds: DEFAULT_THRESHOLDS
                .iter()
                .map(|(count, rank, requires)| ThresholdConfig {
                    attendance_count: *count,
                    rank: (*rank).into(),
                    requires: *requires,
                })
                .collect(),
            optimistic_concurrency: false,
            highlight_window_secs: 5,
        }
    }
}
