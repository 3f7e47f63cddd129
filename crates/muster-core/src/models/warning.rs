//! Disciplinary warning domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity classification. Variants are declared in ascending severity,
/// so the derived `Ord` ranks `Suspension` highest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WarningType {
    Verbal,
    Written,
    Suspension,
}

/// An immutable entry in a member's disciplinary ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Warning {
    /// Generated when the warning is appended.
    pub id: Uuid,
    pub warning_type: WarningType,
    pub reason: String,
    pub date: DateTime<Utc>,
    pub issued_by: String,
    pub notes: Option<String>,
}

impl Warning {
    pub fn matches(&self, identity: &WarningIdentity) -> bool {
        self.warning_type == identity.warning_type
            && self.reason == identity.reason
            && self.date == identity.date
            && self.notes == identity.notes
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewWarning {
    pub warning_type: WarningType,
    pub reason: String,
    pub date: DateTime<Utc>,
    pub issued_by: String,
    pub notes: Option<String>,
}

impl NewWarning {
    pub fn into_warning(self) -> Warning {
        Warning {
            id: Uuid::new_v4(),
            warning_type: self.warning_type,
            reason: self.reason,
            date: self.date,
            issued_by: self.issued_by,
            notes: self.notes,
        }
    }
}

/// The four fields that identify a warning for legacy field-equality
/// removal. `issued_by` is deliberately not part of the key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WarningIdentity {
    pub warning_type: WarningType,
    pub reason: String,
    pub date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl From<&Warning> for WarningIdentity {
    fn from(w: &Warning) -> Self {
        Self {
            warning_type: w.warning_type,
            reason: w.reason.clone(),
            date: w.date,
            notes: w.notes.clone(),
        }
    }
}
