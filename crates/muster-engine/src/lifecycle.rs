//! Member lifecycle controller.
//!
//! Every operation reads the current member, computes the new state,
//! writes it back through the [`MemberRepository`] and appends an audit
//! event. Writes are last-write-wins unless optimistic concurrency is
//! enabled in [`EngineConfig`].

use chrono::{NaiveDate, Utc};
use muster_core::error::MusterResult;
use muster_core::models::audit::{AuditAction, CreateAuditEvent};
use muster_core::models::member::{CreateMember, Member, MemberStatus, UpdateMember};
use muster_core::models::warning::{NewWarning, Warning, WarningIdentity};
use muster_core::repository::{AuditEventRepository, MemberRepository};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ledger::{self, Removal};
use crate::promotion::{PromotionEngine, PromotionResult};

const MEMBER_ENTITY: &str = "member";
const WARNING_ENTITY: &str = "warning";

/// The caller as resolved by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub privileged: bool,
}

impl Actor {
    pub fn new(id: Uuid, privileged: bool) -> Self {
        Self { id, privileged }
    }
}

/// Result of a promotion attempt.
#[derive(Debug, Clone)]
pub struct PromotionOutcome {
    pub result: PromotionResult,
    /// The stored member: updated when eligible, unchanged otherwise.
    pub member: Member,
}

impl PromotionOutcome {
    pub fn promoted(&self) -> bool {
        self.result.eligible
    }
}

/// Result of a warning revocation. `NotFound` means nothing was written.
#[derive(Debug, Clone)]
pub enum WarningRevocation {
    Revoked { member: Member, warning: Warning },
    NotFound,
}

/// Orchestrates the Active/Departed state machine and member mutations.
///
/// Generic over repository implementations so the engine has no
/// dependency on the database crate.
pub struct MemberLifecycleController<M: MemberRepository, A: AuditEventRepository> {
    members: M,
    audit: A,
    engine: PromotionEngine,
    optimistic_concurrency: bool,
}

impl<M: MemberRepository, A: AuditEventRepository> MemberLifecycleController<M, A> {
    pub fn new(members: M, audit: A, engine: PromotionEngine) -> Self {
        Self {
            members,
            audit,
            engine,
            optimistic_concurrency: false,
        }
    }

    /// Build the promotion engine from `config` and honour its
    /// concurrency setting.
    pub fn from_config(members: M, audit: A, config: &EngineConfig) -> Result<Self, EngineError> {
        let engine = PromotionEngine::from_config(config)?;
        Ok(Self::new(members, audit, engine).with_optimistic_concurrency(config.optimistic_concurrency))
    }

    pub fn with_optimistic_concurrency(mut self, enabled: bool) -> Self {
        self.optimistic_concurrency = enabled;
        self
    }

    pub fn engine(&self) -> &PromotionEngine {
        &self.engine
    }

    // -----------------------------------------------------------------------
    // Creation and queries
    // -----------------------------------------------------------------------

    /// Create a member on recruitment acceptance.
    pub async fn enlist(&self, actor: &Actor, input: CreateMember) -> MusterResult<Member> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidInput("member name must not be empty".into()).into());
        }
        let rank = match input.rank {
            Some(rank) => self
                .engine
                .catalog()
                .rank_of(&rank)
                .ok_or(EngineError::UnknownRank(rank))?
                .name
                .clone(),
            None => self.engine.catalog().lowest().name.clone(),
        };
        let status = input.status.unwrap_or(MemberStatus::Active);
        if status.is_departed() {
            return Err(EngineError::InvalidInput(
                "new members cannot start in the Departed state".into(),
            )
            .into());
        }

        let now = Utc::now();
        let member = Member {
            id: Uuid::new_v4(),
            name: name.to_string(),
            rank,
            attendance_count: 0,
            last_attendance_date: None,
            second_last_attendance_date: None,
            join_date: Some(input.join_date.unwrap_or_else(|| now.date_naive())),
            departure_date: None,
            status,
            departure_notes: None,
            promotion_status_note: None,
            warnings: Vec::new(),
            certifications: input.certifications,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let member = self.members.upsert(member).await?;
        info!(member_id = %member.id, rank = %member.rank, "Member enlisted");
        self.record(
            actor,
            AuditAction::Create,
            format!("Enlisted {} as {}", member.name, member.rank),
            MEMBER_ENTITY,
            member.id,
            json!({ "rank": member.rank, "status": member.status }),
        )
        .await?;
        Ok(member)
    }

    pub async fn get(&self, member_id: Uuid) -> MusterResult<Member> {
        self.members.get(member_id).await
    }

    pub async fn active_roster(&self) -> MusterResult<Vec<Member>> {
        self.members.list_active().await
    }

    pub async fn departed_roster(&self) -> MusterResult<Vec<Member>> {
        self.members.list_departed().await
    }

    // -----------------------------------------------------------------------
    // Attendance and promotion
    // -----------------------------------------------------------------------

    /// Count one attendance. The caller guarantees at most one call per
    /// member and mission.
    pub async fn record_attendance(
        &self,
        actor: &Actor,
        member_id: Uuid,
        date: NaiveDate,
    ) -> MusterResult<Member> {
        let mut member = self.members.get(member_id).await?;
        if member.is_departed() {
            return Err(EngineError::IllegalTransition {
                member_id,
                action: "record attendance for",
                reason: "member has departed",
            }
            .into());
        }

        member.attendance_count = member.attendance_count.checked_add(1).ok_or_else(|| {
            EngineError::InvalidInput(format!(
                "attendance count of member {member_id} is already at its maximum"
            ))
        })?;
        member.second_last_attendance_date = member.last_attendance_date;
        member.last_attendance_date = Some(date);

        let member = self.persist(member).await?;
        debug!(member_id = %member_id, count = member.attendance_count, "Attendance recorded");
        self.record(
            actor,
            AuditAction::Update,
            format!("Recorded attendance for {} on {date}", member.name),
            MEMBER_ENTITY,
            member.id,
            json!({ "date": date, "attendance_count": member.attendance_count }),
        )
        .await?;
        Ok(member)
    }

    /// Read-only promotion check for a stored member.
    pub async fn evaluate(&self, actor: &Actor, member_id: Uuid) -> MusterResult<PromotionResult> {
        let member = self.members.get(member_id).await?;
        Ok(self.engine.evaluate(&member, actor.privileged))
    }

    /// Evaluate and, when eligible, apply the suggested rank. Nothing is
    /// written when the member is not eligible.
    pub async fn promote(&self, actor: &Actor, member_id: Uuid) -> MusterResult<PromotionOutcome> {
        let mut member = self.members.get(member_id).await?;
        if member.is_departed() {
            return Err(EngineError::IllegalTransition {
                member_id,
                action: "promote",
                reason: "member has departed",
            }
            .into());
        }

        let result = self.engine.evaluate(&member, actor.privileged);
        let Some(target) = result.suggested_rank.clone().filter(|_| result.eligible) else {
            return Ok(PromotionOutcome { result, member });
        };

        let previous = member.rank.clone();
        self.engine.confirm_promotion(&mut member, &target.name)?;
        let member = self.persist(member).await?;
        info!(
            member_id = %member_id,
            from = %previous,
            to = %target.name,
            merit = result.is_merit,
            "Member promoted"
        );
        self.record(
            actor,
            AuditAction::Update,
            format!("Promoted {} from {previous} to {}", member.name, target.name),
            MEMBER_ENTITY,
            member.id,
            json!({
                "from": previous,
                "to": target.name,
                "merit": result.is_merit,
                "attendance_count": member.attendance_count,
            }),
        )
        .await?;
        Ok(PromotionOutcome { result, member })
    }

    // -----------------------------------------------------------------------
    // Lifecycle transitions
    // -----------------------------------------------------------------------

    /// Active -> Departed. Rank, attendance and warnings are untouched.
    pub async fn mark_departed(
        &self,
        actor: &Actor,
        member_id: Uuid,
        departure_date: NaiveDate,
        notes: Option<String>,
    ) -> MusterResult<Member> {
        let mut member = self.members.get(member_id).await?;
        if member.is_departed() {
            return Err(EngineError::IllegalTransition {
                member_id,
                action: "mark departed",
                reason: "member has already departed",
            }
            .into());
        }

        let previous_status = member.status;
        member.status = MemberStatus::Departed;
        member.departure_date = Some(departure_date);
        member.departure_notes = notes;

        let member = self.persist(member).await?;
        info!(member_id = %member_id, date = %departure_date, "Member departed");
        self.record(
            actor,
            AuditAction::Update,
            format!("Marked {} as departed", member.name),
            MEMBER_ENTITY,
            member.id,
            json!({
                "previous_status": previous_status,
                "departure_date": departure_date,
                "departure_notes": member.departure_notes,
            }),
        )
        .await?;
        Ok(member)
    }

    /// Departed -> Active. Clears the departure fields and both attendance
    /// dates but keeps the attendance count, rank and warnings. The cleared
    /// departure notes survive only in the audit event.
    pub async fn rejoin(&self, actor: &Actor, member_id: Uuid) -> MusterResult<Member> {
        let mut member = self.members.get(member_id).await?;
        if !member.is_departed() {
            return Err(EngineError::IllegalTransition {
                member_id,
                action: "rejoin",
                reason: "member has not departed",
            }
            .into());
        }

        let previous_departure_date = member.departure_date.take();
        let previous_departure_notes = member.departure_notes.take();
        member.status = MemberStatus::Active;
        member.last_attendance_date = None;
        member.second_last_attendance_date = None;
        if member.join_date.is_none() {
            member.join_date = Some(Utc::now().date_naive());
        }

        let member = self.persist(member).await?;
        info!(member_id = %member_id, "Member rejoined");
        self.record(
            actor,
            AuditAction::Update,
            format!("{} rejoined", member.name),
            MEMBER_ENTITY,
            member.id,
            json!({
                "previous_departure_date": previous_departure_date,
                "previous_departure_notes": previous_departure_notes,
                "attendance_count": member.attendance_count,
            }),
        )
        .await?;
        Ok(member)
    }

    /// Permanently delete a departed member. Irreversible.
    pub async fn purge_departed(&self, actor: &Actor, member_id: Uuid) -> MusterResult<()> {
        let member = self.members.get(member_id).await?;
        if !member.is_departed() {
            return Err(EngineError::IllegalTransition {
                member_id,
                action: "purge",
                reason: "only departed members can be purged",
            }
            .into());
        }

        self.members.delete(member_id).await?;
        info!(member_id = %member_id, "Departed member purged");
        self.record(
            actor,
            AuditAction::Delete,
            format!("Purged departed member {}", member.name),
            MEMBER_ENTITY,
            member_id,
            json!({
                "rank": member.rank,
                "attendance_count": member.attendance_count,
                "departure_date": member.departure_date,
                "warnings": member.warnings.len(),
            }),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Warnings
    // -----------------------------------------------------------------------

    pub async fn issue_warning(
        &self,
        actor: &Actor,
        member_id: Uuid,
        warning: NewWarning,
    ) -> MusterResult<Member> {
        let mut member = self.members.get(member_id).await?;
        let issued = ledger::append(&mut member, warning).clone();

        let member = self.persist(member).await?;
        info!(
            member_id = %member_id,
            warning_id = %issued.id,
            warning_type = ?issued.warning_type,
            "Warning issued"
        );
        self.record(
            actor,
            AuditAction::Create,
            format!("Issued {:?} warning to {}", issued.warning_type, member.name),
            WARNING_ENTITY,
            issued.id,
            json!({ "member_id": member_id, "warning": issued }),
        )
        .await?;
        Ok(member)
    }

    /// Remove a warning by its stable id.
    pub async fn revoke_warning(
        &self,
        actor: &Actor,
        member_id: Uuid,
        warning_id: Uuid,
    ) -> MusterResult<WarningRevocation> {
        let mut member = self.members.get(member_id).await?;
        let removal = ledger::remove_by_id(&mut member, warning_id);
        self.finish_revocation(actor, member, removal).await
    }

    /// Remove the first warning matching all identity fields. Kept for
    /// records whose warning ids are not known to the caller.
    pub async fn revoke_warning_by_identity(
        &self,
        actor: &Actor,
        member_id: Uuid,
        identity: WarningIdentity,
    ) -> MusterResult<WarningRevocation> {
        let mut member = self.members.get(member_id).await?;
        let removal = ledger::remove_by_identity(&mut member, &identity);
        self.finish_revocation(actor, member, removal).await
    }

    async fn finish_revocation(
        &self,
        actor: &Actor,
        member: Member,
        removal: Removal,
    ) -> MusterResult<WarningRevocation> {
        let warning = match removal {
            Removal::Removed(warning) => warning,
            Removal::NotFound => {
                debug!(member_id = %member.id, "No matching warning to revoke");
                return Ok(WarningRevocation::NotFound);
            }
        };

        let member = self.persist(member).await?;
        info!(member_id = %member.id, warning_id = %warning.id, "Warning revoked");
        self.record(
            actor,
            AuditAction::Delete,
            format!("Revoked {:?} warning from {}", warning.warning_type, member.name),
            WARNING_ENTITY,
            warning.id,
            json!({ "member_id": member.id, "warning": warning }),
        )
        .await?;
        Ok(WarningRevocation::Revoked { member, warning })
    }

    // -----------------------------------------------------------------------
    // Administrative edits
    // -----------------------------------------------------------------------

    /// Direct field edit by a privileged caller. The only operation that
    /// may lower the attendance count.
    pub async fn administrative_edit(
        &self,
        actor: &Actor,
        member_id: Uuid,
        input: UpdateMember,
    ) -> MusterResult<Member> {
        if !actor.privileged {
            return Err(EngineError::PrivilegeRequired("administrative edit").into());
        }

        let mut member = self.members.get(member_id).await?;
        let before = json!({
            "name": member.name,
            "rank": member.rank,
            "attendance_count": member.attendance_count,
            "status": member.status,
        });

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(EngineError::InvalidInput("member name must not be empty".into()).into());
            }
            member.name = name;
        }
        if let Some(rank) = input.rank {
            if self.engine.catalog().rank_of(&rank).is_none() {
                return Err(EngineError::UnknownRank(rank).into());
            }
            member.rank = rank;
        }
        if let Some(count) = input.attendance_count {
            member.attendance_count = count;
        }
        if let Some(status) = input.status {
            if status.is_departed() != member.is_departed() {
                return Err(EngineError::InvalidInput(
                    "use the departure and rejoin transitions to change departed status".into(),
                )
                .into());
            }
            member.status = status;
        }
        if let Some(certifications) = input.certifications {
            member.certifications = certifications;
        }
        if let Some(note) = input.promotion_status_note {
            member.promotion_status_note = note;
        }

        let member = self.persist(member).await?;
        info!(member_id = %member_id, "Member edited by administrator");
        self.record(
            actor,
            AuditAction::Update,
            format!("Administrative edit of {}", member.name),
            MEMBER_ENTITY,
            member.id,
            json!({
                "before": before,
                "after": {
                    "name": member.name,
                    "rank": member.rank,
                    "attendance_count": member.attendance_count,
                    "status": member.status,
                },
            }),
        )
        .await?;
        Ok(member)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn persist(&self, member: Member) -> MusterResult<Member> {
        if self.optimistic_concurrency {
            let expected = member.version;
            self.members.upsert_if_version(member, expected).await
        } else {
            self.members.upsert(member).await
        }
    }

    async fn record(
        &self,
        actor: &Actor,
        action: AuditAction,
        description: String,
        affected_entity: &str,
        entity_id: Uuid,
        details: serde_json::Value,
    ) -> MusterResult<()> {
        self.audit
            .append(CreateAuditEvent {
                actor_id: actor.id,
                action,
                description,
                affected_entity: affected_entity.to_string(),
                entity_id,
                details,
            })
            .await?;
        Ok(())
    }
}
