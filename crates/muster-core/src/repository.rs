//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async and request/response from the
//! engine's point of view. Implementations live in `muster-db`.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::MusterResult;
use crate::models::{
    audit::{AuditAction, AuditEvent, CreateAuditEvent},
    change::ChangeEvent,
    member::Member,
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Members
// ---------------------------------------------------------------------------

pub trait MemberRepository: Send + Sync {
    fn get(&self, id: Uuid) -> impl Future<Output = MusterResult<Member>> + Send;

    /// Last-write-wins write of the full member record, warnings included.
    /// The stored `version` is one above the input's.
    fn upsert(&self, member: Member) -> impl Future<Output = MusterResult<Member>> + Send;

    /// Like [`upsert`](Self::upsert) but fails with `Conflict` unless the
    /// stored version still equals `expected_version`.
    fn upsert_if_version(
        &self,
        member: Member,
        expected_version: u64,
    ) -> impl Future<Output = MusterResult<Member>> + Send;

    /// Hard delete. Deleting an absent id is an error.
    fn delete(&self, id: Uuid) -> impl Future<Output = MusterResult<()>> + Send;

    /// Members whose status is anything but `Departed`, oldest first.
    fn list_active(&self) -> impl Future<Output = MusterResult<Vec<Member>>> + Send;

    /// Members with status `Departed`, oldest first.
    fn list_departed(&self) -> impl Future<Output = MusterResult<Vec<Member>>> + Send;
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// Source of insert/update/delete notifications for the member collection.
///
/// Delivery is at-least-once with best-effort ordering.
pub trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

// ---------------------------------------------------------------------------
// Audit (append-only)
// ---------------------------------------------------------------------------

/// Query filters for audit events.
#[derive(Debug, Clone, Default)]
pub struct AuditEventFilter {
    pub actor_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub entity_id: Option<Uuid>,
    pub from: Option<chrono::DateTime<chrono::Utc>>,
    pub to: Option<chrono::DateTime<chrono::Utc>>,
}

pub trait AuditEventRepository: Send + Sync {
    /// Append a new audit event. No update or delete operations exist.
    fn append(
        &self,
        input: CreateAuditEvent,
    ) -> impl Future<Output = MusterResult<AuditEvent>> + Send;
    fn list(
        &self,
        filter: AuditEventFilter,
        pagination: Pagination,
    ) -> impl Future<Output = MusterResult<PaginatedResult<AuditEvent>>> + Send;
}
