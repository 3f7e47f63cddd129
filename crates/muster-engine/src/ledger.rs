//! Disciplinary warning ledger.
//!
//! Warnings are appended to the end of a member's list and never edited.
//! Removal targets one exact entry, either by its stable id or, for
//! records created before ids existed, by field equality.

use std::collections::HashMap;

use muster_core::models::member::Member;
use muster_core::models::warning::{NewWarning, Warning, WarningIdentity, WarningType};
use uuid::Uuid;

/// Result of a removal attempt. A miss is an expected outcome, not an
/// error, and leaves the member untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    Removed(Warning),
    NotFound,
}

impl Removal {
    /// Whether the call removed a warning.
    pub fn is_removed(&self) -> bool {
        matches!(self, Removal::Removed(_))
    }
}

/// Append a warning. No deduplication and no cap.
pub fn append(member: &mut Member, warning: NewWarning) -> &Warning {
    member.warnings.push(warning.into_warning());
    &member.warnings[member.warnings.len() - 1]
}

/// Remove the warning with `id`, wherever it sits in the ledger.
pub fn remove_by_id(member: &mut Member, id: Uuid) -> Removal {
    match member.warnings.iter().position(|w| w.id == id) {
        Some(idx) => Removal::Removed(member.warnings.remove(idx)),
        None => Removal::NotFound,
    }
}

/// Remove the first warning whose type, reason, date and notes all equal
/// `identity`. Field-identical duplicates are indistinguishable here; only
/// the earliest is removed per call.
pub fn remove_by_identity(member: &mut Member, identity: &WarningIdentity) -> Removal {
    match member.warnings.iter().position(|w| w.matches(identity)) {
        Some(idx) => Removal::Removed(member.warnings.remove(idx)),
        None => Removal::NotFound,
    }
}

/// Number of `warning_type` warnings on `member`.
pub fn count_by_type(member: &Member, warning_type: WarningType) -> usize {
    member
        .warnings
        .iter()
        .filter(|w| w.warning_type == warning_type)
        .count()
}

/// Most frequent warning type across `members`; ties go to the more
/// severe type. `None` when nobody has a warning.
pub fn most_common_type<'a>(members: impl IntoIterator<Item = &'a Member>) -> Option<WarningType> {
    let mut counts: HashMap<WarningType, usize> = HashMap::new();
    for warning in members.into_iter().flat_map(|m| m.warnings.iter()) {
        *counts.entry(warning.warning_type).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|(ty, count)| (*count, *ty))
        .map(|(ty, _)| ty)
}

/// Display order: newest `date` first; equal dates show the later
/// insertion first.
pub fn newest_first(member: &Member) -> Vec<&Warning> {
    let mut ordered: Vec<&Warning> = member.warnings.iter().rev().collect();
    ordered.sort_by(|a, b| b.date.cmp(&a.date));
    ordered
}
