//! Audit event domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

/// Append-only record of a member or warning mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub description: String,
    /// Entity kind, e.g. `member` or `warning`.
    pub affected_entity: String,
    pub entity_id: Uuid,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAuditEvent {
    pub actor_id: Uuid,
    pub action: AuditAction,
    pub description: String,
    pub affected_entity: String,
    pub entity_id: Uuid,
    pub details: serde_json::Value,
}
