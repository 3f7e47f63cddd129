//! Change-feed notification model.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::member::Member;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A remote mutation of the `member` collection.
///
/// `member` carries the new state for inserts and updates. Deletes only
/// need `member_id`; an insert or update without a payload is malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub op: ChangeOp,
    pub member_id: Uuid,
    pub member: Option<Member>,
}

impl ChangeEvent {
    pub fn inserted(member: Member) -> Self {
        Self {
            op: ChangeOp::Insert,
            member_id: member.id,
            member: Some(member),
        }
    }

    pub fn updated(member: Member) -> Self {
        Self {
            op: ChangeOp::Update,
            member_id: member.id,
            member: Some(member),
        }
    }

    pub fn deleted(member_id: Uuid) -> Self {
        Self {
            op: ChangeOp::Delete,
            member_id,
            member: None,
        }
    }
}
