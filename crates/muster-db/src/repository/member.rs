//! SurrealDB implementation of [`MemberRepository`].
//!
//! A member is stored as one `member` row plus one `warning` row per
//! ledger entry, keyed by the warning id and ordered by `position`.
//! Every write replaces the member's warning rows inside the same
//! transaction and bumps `version` by one. Change notifications come from
//! the store itself, see [`SurrealChangeFeed`](crate::feed::SurrealChangeFeed).

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use muster_core::error::MusterResult;
use muster_core::models::member::{Certifications, Member, MemberStatus};
use muster_core::models::warning::{Warning, WarningType};
use muster_core::repository::MemberRepository;
use serde::Serialize;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbError;

const VERSION_CONFLICT: &str = "member version conflict";

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct MemberRow {
    name: String,
    rank: String,
    attendance_count: u32,
    last_attendance_date: Option<String>,
    second_last_attendance_date: Option<String>,
    join_date: Option<String>,
    departure_date: Option<String>,
    status: String,
    departure_notes: Option<String>,
    promotion_status_note: Option<String>,
    cert_training: Option<bool>,
    cert_leadership: Option<bool>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct MemberRowWithId {
    record_id: String,
    name: String,
    rank: String,
    attendance_count: u32,
    last_attendance_date: Option<String>,
    second_last_attendance_date: Option<String>,
    join_date: Option<String>,
    departure_date: Option<String>,
    status: String,
    departure_notes: Option<String>,
    promotion_status_note: Option<String>,
    cert_training: Option<bool>,
    cert_leadership: Option<bool>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct WarningRow {
    record_id: String,
    member_id: String,
    warning_type: String,
    reason: String,
    date: DateTime<Utc>,
    issued_by: String,
    notes: Option<String>,
}

#[derive(Debug, SurrealValue)]
struct VersionRow {
    version: u64,
}

/// Warning payload bound into the write transaction.
#[derive(Debug, Serialize)]
struct WarningParam {
    id: String,
    position: usize,
    warning_type: &'static str,
    reason: String,
    date: String,
    issued_by: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
}

fn parse_status(s: &str) -> Result<MemberStatus, DbError> {
    match s {
        "Active" => Ok(MemberStatus::Active),
        "OnLeave" => Ok(MemberStatus::OnLeave),
        "Recruit" => Ok(MemberStatus::Recruit),
        "Departed" => Ok(MemberStatus::Departed),
        "Other" => Ok(MemberStatus::Other),
        other => Err(DbError::Decode(format!("unknown member status: {other}"))),
    }
}

fn status_to_string(s: MemberStatus) -> &'static str {
    match s {
        MemberStatus::Active => "Active",
        MemberStatus::OnLeave => "OnLeave",
        MemberStatus::Recruit => "Recruit",
        MemberStatus::Departed => "Departed",
        MemberStatus::Other => "Other",
    }
}

fn parse_warning_type(s: &str) -> Result<WarningType, DbError> {
    match s {
        "Verbal" => Ok(WarningType::Verbal),
        "Written" => Ok(WarningType::Written),
        "Suspension" => Ok(WarningType::Suspension),
        other => Err(DbError::Decode(format!("unknown warning type: {other}"))),
    }
}

fn warning_type_to_string(t: WarningType) -> &'static str {
    match t {
        WarningType::Verbal => "Verbal",
        WarningType::Written => "Written",
        WarningType::Suspension => "Suspension",
    }
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, DbError> {
    value
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|e| DbError::Decode(format!("invalid {field} '{s}': {e}")))
        })
        .transpose()
}

fn date_to_string(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

impl MemberRow {
    fn into_member(self, id: Uuid, warnings: Vec<Warning>) -> Result<Member, DbError> {
        let member = Member {
            id,
            name: self.name,
            rank: self.rank,
            attendance_count: self.attendance_count,
            last_attendance_date: parse_date("last_attendance_date", self.last_attendance_date)?,
            second_last_attendance_date: parse_date(
                "second_last_attendance_date",
                self.second_last_attendance_date,
            )?,
            join_date: parse_date("join_date", self.join_date)?,
            departure_date: parse_date("departure_date", self.departure_date)?,
            status: parse_status(&self.status)?,
            departure_notes: self.departure_notes,
            promotion_status_note: self.promotion_status_note,
            warnings,
            certifications: Certifications {
                training: self.cert_training,
                leadership: self.cert_leadership,
            },
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        if !member.departure_fields_consistent() {
            return Err(DbError::Decode(format!(
                "member {id} has status {:?} but departure date {:?}",
                member.status, member.departure_date
            )));
        }
        Ok(member)
    }
}

impl MemberRowWithId {
    fn split(self) -> Result<(Uuid, MemberRow), DbError> {
        let id = parse_uuid("member", &self.record_id)?;
        Ok((
            id,
            MemberRow {
                name: self.name,
                rank: self.rank,
                attendance_count: self.attendance_count,
                last_attendance_date: self.last_attendance_date,
                second_last_attendance_date: self.second_last_attendance_date,
                join_date: self.join_date,
                departure_date: self.departure_date,
                status: self.status,
                departure_notes: self.departure_notes,
                promotion_status_note: self.promotion_status_note,
                cert_training: self.cert_training,
                cert_leadership: self.cert_leadership,
                version: self.version,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        ))
    }
}

impl WarningRow {
    fn try_into_warning(self) -> Result<Warning, DbError> {
        Ok(Warning {
            id: parse_uuid("warning", &self.record_id)?,
            warning_type: parse_warning_type(&self.warning_type)?,
            reason: self.reason,
            date: self.date,
            issued_by: self.issued_by,
            notes: self.notes,
        })
    }
}

fn warning_params(member: &Member) -> Result<serde_json::Value, DbError> {
    let params: Vec<WarningParam> = member
        .warnings
        .iter()
        .enumerate()
        .map(|(position, w)| WarningParam {
            id: w.id.to_string(),
            position,
            warning_type: warning_type_to_string(w.warning_type),
            reason: w.reason.clone(),
            date: w.date.to_rfc3339(),
            issued_by: w.issued_by.clone(),
            notes: w.notes.clone(),
        })
        .collect();
    serde_json::to_value(params).map_err(|e| DbError::Query(format!("warning encoding: {e}")))
}

const WRITE_MEMBER: &str = "\
UPSERT type::record('member', $id) SET \
    name = $name, rank = $rank, \
    attendance_count = $attendance_count, \
    last_attendance_date = $last_attendance_date, \
    second_last_attendance_date = $second_last_attendance_date, \
    join_date = $join_date, departure_date = $departure_date, \
    status = $status, departure_notes = $departure_notes, \
    promotion_status_note = $promotion_status_note, \
    cert_training = $cert_training, cert_leadership = $cert_leadership, \
    version = $version, created_at = $created_at, \
    updated_at = time::now(); \
DELETE warning WHERE member_id = $id; \
FOR $w IN $warnings { \
    CREATE type::record('warning', $w.id) SET \
        member_id = $id, position = $w.position, \
        warning_type = $w.warning_type, reason = $w.reason, \
        date = <datetime> $w.date, issued_by = $w.issued_by, \
        notes = $w.notes; \
};";

const VERSION_GUARD: &str = "\
LET $current = (SELECT VALUE version FROM ONLY type::record('member', $id)) ?? 0; \
IF $current != $expected { THROW 'member version conflict'; };";

/// SurrealDB implementation of the member repository.
#[derive(Clone)]
pub struct SurrealMemberRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealMemberRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn load_warnings(&self, member_ids: Vec<String>) -> Result<HashMap<Uuid, Vec<Warning>>, DbError> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM warning \
                 WHERE member_id IN $member_ids \
                 ORDER BY member_id ASC, position ASC",
            )
            .bind(("member_ids", member_ids))
            .await?;
        let rows: Vec<WarningRow> = result.take(0)?;

        let mut by_member: HashMap<Uuid, Vec<Warning>> = HashMap::new();
        for row in rows {
            let member_id = parse_uuid("member", &row.member_id)?;
            by_member
                .entry(member_id)
                .or_default()
                .push(row.try_into_warning()?);
        }
        Ok(by_member)
    }

    async fn list_where(&self, departed: bool) -> Result<Vec<Member>, DbError> {
        let filter = if departed {
            "status = 'Departed'"
        } else {
            "status != 'Departed'"
        };
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM member \
             WHERE {filter} ORDER BY created_at ASC"
        );
        let mut result = self.db.query(&query).await?;
        let rows: Vec<MemberRowWithId> = result.take(0)?;
        let rows = rows
            .into_iter()
            .map(MemberRowWithId::split)
            .collect::<Result<Vec<_>, DbError>>()?;

        let ids = rows.iter().map(|(id, _)| id.to_string()).collect();
        let mut warnings = self.load_warnings(ids).await?;

        rows.into_iter()
            .map(|(id, row)| row.into_member(id, warnings.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn current_version(&self, id: Uuid) -> Result<Option<u64>, DbError> {
        let mut result = self
            .db
            .query("SELECT version FROM type::record('member', $id)")
            .bind(("id", id.to_string()))
            .await?;
        let rows: Vec<VersionRow> = result.take(0)?;
        Ok(rows.first().map(|r| r.version))
    }

    async fn write(&self, member: Member, expected_version: Option<u64>) -> Result<Member, DbError> {
        if !member.departure_fields_consistent() {
            return Err(DbError::Query(format!(
                "member {} has status {:?} but departure date {:?}",
                member.id, member.status, member.departure_date
            )));
        }

        let id = member.id;
        let id_str = id.to_string();
        let warnings = warning_params(&member)?;
        let statements = match expected_version {
            Some(_) => format!("BEGIN TRANSACTION; {VERSION_GUARD} {WRITE_MEMBER} COMMIT TRANSACTION;"),
            None => format!("BEGIN TRANSACTION; {WRITE_MEMBER} COMMIT TRANSACTION;"),
        };

        let mut builder = self
            .db
            .query(&statements)
            .bind(("id", id_str.clone()))
            .bind(("name", member.name))
            .bind(("rank", member.rank))
            .bind(("attendance_count", member.attendance_count))
            .bind(("last_attendance_date", date_to_string(member.last_attendance_date)))
            .bind((
                "second_last_attendance_date",
                date_to_string(member.second_last_attendance_date),
            ))
            .bind(("join_date", date_to_string(member.join_date)))
            .bind(("departure_date", date_to_string(member.departure_date)))
            .bind(("status", status_to_string(member.status).to_string()))
            .bind(("departure_notes", member.departure_notes))
            .bind(("promotion_status_note", member.promotion_status_note))
            .bind(("cert_training", member.certifications.training))
            .bind(("cert_leadership", member.certifications.leadership))
            .bind(("version", member.version + 1))
            .bind(("created_at", member.created_at))
            .bind(("warnings", warnings));
        if let Some(expected) = expected_version {
            builder = builder.bind(("expected", expected));
        }

        let result = builder.await?;
        if let Err(e) = result.check() {
            let message = e.to_string();
            return match expected_version {
                Some(expected) if message.contains(VERSION_CONFLICT) => {
                    let found = self.current_version(id).await?.unwrap_or(0);
                    Err(DbError::Conflict {
                        entity: "member".into(),
                        id: id_str,
                        expected,
                        found,
                    })
                }
                _ => Err(DbError::Query(message)),
            };
        }

        let stored = self.fetch(id).await?;
        debug!(member_id = %id, version = stored.version, "Member written");
        Ok(stored)
    }

    /// Read one member with its warnings in ledger order.
    pub(crate) async fn fetch(&self, id: Uuid) -> Result<Member, DbError> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "SELECT * FROM type::record('member', $id); \
                 SELECT meta::id(id) AS record_id, * FROM warning \
                 WHERE member_id = $id ORDER BY position ASC",
            )
            .bind(("id", id_str.clone()))
            .await?;

        let rows: Vec<MemberRow> = result.take(0)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "member".into(),
            id: id_str,
        })?;
        let warning_rows: Vec<WarningRow> = result.take(1)?;
        let warnings = warning_rows
            .into_iter()
            .map(WarningRow::try_into_warning)
            .collect::<Result<Vec<_>, DbError>>()?;

        row.into_member(id, warnings)
    }
}

impl<C: Connection> MemberRepository for SurrealMemberRepository<C> {
    async fn get(&self, id: Uuid) -> MusterResult<Member> {
        Ok(self.fetch(id).await?)
    }

    async fn upsert(&self, member: Member) -> MusterResult<Member> {
        Ok(self.write(member, None).await?)
    }

    async fn upsert_if_version(&self, member: Member, expected_version: u64) -> MusterResult<Member> {
        Ok(self.write(member, Some(expected_version)).await?)
    }

    async fn delete(&self, id: Uuid) -> MusterResult<()> {
        let id_str = id.to_string();
        if self.current_version(id).await?.is_none() {
            return Err(DbError::NotFound {
                entity: "member".into(),
                id: id_str,
            }
            .into());
        }

        self.db
            .query(
                "BEGIN TRANSACTION; \
                 DELETE warning WHERE member_id = $id; \
                 DELETE type::record('member', $id); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id_str))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        debug!(member_id = %id, "Member deleted");
        Ok(())
    }

    async fn list_active(&self) -> MusterResult<Vec<Member>> {
        Ok(self.list_where(false).await?)
    }

    async fn list_departed(&self) -> MusterResult<Vec<Member>> {
        Ok(self.list_where(true).await?)
    }
}
