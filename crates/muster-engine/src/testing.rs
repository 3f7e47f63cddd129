//! Fixtures shared by the unit tests.

use chrono::Utc;
use muster_core::models::member::{Certifications, Member, MemberStatus};
use uuid::Uuid;

pub fn member(rank: &str, attendance_count: u32) -> Member {
    let now = Utc::now();
    Member {
        id: Uuid::new_v4(),
        name: "Tester".into(),
        rank: rank.into(),
        attendance_count,
        last_attendance_date: None,
        second_last_attendance_date: None,
        join_date: Some(now.date_naive()),
        departure_date: None,
        status: MemberStatus::Active,
        departure_notes: None,
        promotion_status_note: None,
        warnings: Vec::new(),
        certifications: Certifications::default(),
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

/// The stored state after a departure: one version above `member`.
pub fn departed(mut member: Member) -> Member {
    member.status = MemberStatus::Departed;
    member.departure_date = Some(Utc::now().date_naive());
    member.version += 1;
    member
}
