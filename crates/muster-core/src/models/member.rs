//! Member domain model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::warning::Warning;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MemberStatus {
    Active,
    OnLeave,
    Recruit,
    Departed,
    Other,
}

impl MemberStatus {
    /// `OnLeave`, `Recruit` and `Other` are attribute values inside the
    /// active superstate; only `Departed` leaves it.
    pub fn is_departed(self) -> bool {
        matches!(self, MemberStatus::Departed)
    }
}

/// Qualification flags that gate specific threshold promotions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Certification {
    Training,
    Leadership,
}

/// Yes / no / undefined per certification.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Certifications {
    pub training: Option<bool>,
    pub leadership: Option<bool>,
}

impl Certifications {
    pub fn get(&self, cert: Certification) -> Option<bool> {
        match cert {
            Certification::Training => self.training,
            Certification::Leadership => self.leadership,
        }
    }

    /// Only an explicit `Some(true)` counts as holding the certification.
    pub fn holds(&self, cert: Certification) -> bool {
        self.get(cert) == Some(true)
    }

    pub fn set(&mut self, cert: Certification, value: Option<bool>) {
        match cert {
            Certification::Training => self.training = value,
            Certification::Leadership => self.leadership = value,
        }
    }
}

/// A community member, the aggregate root of the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    /// Rank name. Resolved against the rank catalog; names the catalog
    /// does not know resolve to order 0.
    pub rank: String,
    pub attendance_count: u32,
    pub last_attendance_date: Option<NaiveDate>,
    pub second_last_attendance_date: Option<NaiveDate>,
    pub join_date: Option<NaiveDate>,
    pub departure_date: Option<NaiveDate>,
    pub status: MemberStatus,
    pub departure_notes: Option<String>,
    pub promotion_status_note: Option<String>,
    /// Insertion order; the newest warning is last.
    pub warnings: Vec<Warning>,
    pub certifications: Certifications,
    /// Incremented by the store on every persisted write.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Member {
    pub fn is_departed(&self) -> bool {
        self.status.is_departed()
    }

    /// `status == Departed` exactly when a departure date is recorded.
    pub fn departure_fields_consistent(&self) -> bool {
        self.is_departed() == self.departure_date.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMember {
    pub name: String,
    /// Defaults to the lowest rank in the catalog.
    pub rank: Option<String>,
    /// Defaults to today.
    pub join_date: Option<NaiveDate>,
    /// Defaults to `Active`. `Departed` is rejected.
    pub status: Option<MemberStatus>,
    #[serde(default)]
    pub certifications: Certifications,
}

/// Administrative edit. The only path that may lower `attendance_count`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateMember {
    pub name: Option<String>,
    pub rank: Option<String>,
    pub attendance_count: Option<u32>,
    /// Must stay inside the active superstate; departures go through the
    /// lifecycle transitions.
    pub status: Option<MemberStatus>,
    pub certifications: Option<Certifications>,
    /// `Some(Some(val))` = set, `Some(None)` = clear, `None` = no change.
    pub promotion_status_note: Option<Option<String>>,
}
