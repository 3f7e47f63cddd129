//! SurrealDB implementation of [`AuditEventRepository`].

use chrono::{DateTime, Utc};
use muster_core::error::MusterResult;
use muster_core::models::audit::{AuditAction, AuditEvent, CreateAuditEvent};
use muster_core::repository::{AuditEventFilter, AuditEventRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct AuditEventRow {
    actor_id: String,
    action: String,
    description: String,
    affected_entity: String,
    entity_id: String,
    details: serde_json::Value,
    timestamp: DateTime<Utc>,
}

/// DB-side row struct that includes the record ID via `meta::id(id)`.
#[derive(Debug, SurrealValue)]
struct AuditEventRowWithId {
    record_id: String,
    actor_id: String,
    action: String,
    description: String,
    affected_entity: String,
    entity_id: String,
    details: serde_json::Value,
    timestamp: DateTime<Utc>,
}

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_action(s: &str) -> Result<AuditAction, DbError> {
    match s {
        "Create" => Ok(AuditAction::Create),
        "Update" => Ok(AuditAction::Update),
        "Delete" => Ok(AuditAction::Delete),
        other => Err(DbError::Decode(format!("unknown audit action: {other}"))),
    }
}

fn action_to_string(a: AuditAction) -> &'static str {
    match a {
        AuditAction::Create => "Create",
        AuditAction::Update => "Update",
        AuditAction::Delete => "Delete",
    }
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(value).map_err(|e| DbError::Decode(format!("invalid {field} UUID: {e}")))
}

impl AuditEventRow {
    fn into_event(self, id: Uuid) -> Result<AuditEvent, DbError> {
        Ok(AuditEvent {
            id,
            actor_id: parse_uuid("actor", &self.actor_id)?,
            action: parse_action(&self.action)?,
            description: self.description,
            affected_entity: self.affected_entity,
            entity_id: parse_uuid("entity", &self.entity_id)?,
            details: self.details,
            timestamp: self.timestamp,
        })
    }
}

impl AuditEventRowWithId {
    fn try_into_event(self) -> Result<AuditEvent, DbError> {
        let id = parse_uuid("audit event", &self.record_id)?;
        AuditEventRow {
            actor_id: self.actor_id,
            action: self.action,
            description: self.description,
            affected_entity: self.affected_entity,
            entity_id: self.entity_id,
            details: self.details,
            timestamp: self.timestamp,
        }
        .into_event(id)
    }
}

/// SurrealDB implementation of the append-only audit log.
#[derive(Clone)]
pub struct SurrealAuditEventRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditEventRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditEventRepository for SurrealAuditEventRepository<C> {
    async fn append(&self, input: CreateAuditEvent) -> MusterResult<AuditEvent> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let result = self
            .db
            .query(
                "CREATE type::record('audit_event', $id) SET \
                 actor_id = $actor_id, action = $action, \
                 description = $description, \
                 affected_entity = $affected_entity, \
                 entity_id = $entity_id, details = $details",
            )
            .bind(("id", id_str.clone()))
            .bind(("actor_id", input.actor_id.to_string()))
            .bind(("action", action_to_string(input.action).to_string()))
            .bind(("description", input.description))
            .bind(("affected_entity", input.affected_entity))
            .bind(("entity_id", input.entity_id.to_string()))
            .bind(("details", input.details))
            .await
            .map_err(DbError::from)?;

        let mut result = result
            .check()
            .map_err(|e| DbError::Query(e.to_string()))?;

        let rows: Vec<AuditEventRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "audit_event".into(),
            id: id_str,
        })?;

        Ok(row.into_event(id)?)
    }

    async fn list(
        &self,
        filter: AuditEventFilter,
        pagination: Pagination,
    ) -> MusterResult<PaginatedResult<AuditEvent>> {
        let mut conditions = Vec::new();
        if filter.actor_id.is_some() {
            conditions.push("actor_id = $actor_id");
        }
        if filter.action.is_some() {
            conditions.push("action = $action");
        }
        if filter.entity_id.is_some() {
            conditions.push("entity_id = $entity_id");
        }
        if filter.from.is_some() {
            conditions.push("timestamp >= $from");
        }
        if filter.to.is_some() {
            conditions.push("timestamp <= $to");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT count() AS total FROM audit_event {where_clause} GROUP ALL; \
             SELECT meta::id(id) AS record_id, * FROM audit_event {where_clause} \
             ORDER BY timestamp ASC \
             LIMIT $limit START $offset"
        );

        let mut builder = self
            .db
            .query(&query)
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(actor_id) = filter.actor_id {
            builder = builder.bind(("actor_id", actor_id.to_string()));
        }
        if let Some(action) = filter.action {
            builder = builder.bind(("action", action_to_string(action).to_string()));
        }
        if let Some(entity_id) = filter.entity_id {
            builder = builder.bind(("entity_id", entity_id.to_string()));
        }
        if let Some(from) = filter.from {
            builder = builder.bind(("from", from));
        }
        if let Some(to) = filter.to {
            builder = builder.bind(("to", to));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let rows: Vec<AuditEventRowWithId> = result.take(1).map_err(DbError::from)?;
        let items = rows
            .into_iter()
            .map(|row| row.try_into_event())
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
