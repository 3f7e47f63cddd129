//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs and calendar dates are stored as strings. Enums are stored as
//! strings with ASSERT constraints for validation.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct AppliedVersion {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

impl Migration {
    /// Tables this migration defines, for the apply log.
    fn tables(&self) -> Vec<&'static str> {
        self.sql
            .lines()
            .filter_map(|line| line.strip_prefix("DEFINE TABLE "))
            .filter_map(|rest| rest.split_whitespace().next())
            .collect()
    }
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "roster_ordering_indexes",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1: initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Members
-- =======================================================================
DEFINE TABLE member SCHEMAFULL;
DEFINE FIELD name ON TABLE member TYPE string;
DEFINE FIELD rank ON TABLE member TYPE string;
DEFINE FIELD attendance_count ON TABLE member TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD last_attendance_date ON TABLE member TYPE option<string>;
DEFINE FIELD second_last_attendance_date ON TABLE member \
    TYPE option<string>;
DEFINE FIELD join_date ON TABLE member TYPE option<string>;
DEFINE FIELD departure_date ON TABLE member TYPE option<string>;
DEFINE FIELD status ON TABLE member TYPE string \
    ASSERT $value IN ['Active', 'OnLeave', 'Recruit', 'Departed', 'Other'];
DEFINE FIELD departure_notes ON TABLE member TYPE option<string>;
DEFINE FIELD promotion_status_note ON TABLE member TYPE option<string>;
DEFINE FIELD cert_training ON TABLE member TYPE option<bool>;
DEFINE FIELD cert_leadership ON TABLE member TYPE option<bool>;
DEFINE FIELD version ON TABLE member TYPE int DEFAULT 0;
DEFINE FIELD created_at ON TABLE member TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE member TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_member_status ON TABLE member COLUMNS status;

-- =======================================================================
-- Warnings (child rows of member, ordered by position)
-- =======================================================================
DEFINE TABLE warning SCHEMAFULL;
DEFINE FIELD member_id ON TABLE warning TYPE string;
DEFINE FIELD position ON TABLE warning TYPE int;
DEFINE FIELD warning_type ON TABLE warning TYPE string \
    ASSERT $value IN ['Verbal', 'Written', 'Suspension'];
DEFINE FIELD reason ON TABLE warning TYPE string;
DEFINE FIELD date ON TABLE warning TYPE datetime;
DEFINE FIELD issued_by ON TABLE warning TYPE string;
DEFINE FIELD notes ON TABLE warning TYPE option<string>;
DEFINE INDEX idx_warning_member ON TABLE warning COLUMNS member_id;

-- =======================================================================
-- Audit events (append-only)
-- =======================================================================
DEFINE TABLE audit_event SCHEMAFULL;
DEFINE FIELD actor_id ON TABLE audit_event TYPE string;
DEFINE FIELD action ON TABLE audit_event TYPE string \
    ASSERT $value IN ['Create', 'Update', 'Delete'];
DEFINE FIELD description ON TABLE audit_event TYPE string;
DEFINE FIELD affected_entity ON TABLE audit_event TYPE string;
DEFINE FIELD entity_id ON TABLE audit_event TYPE string;
DEFINE FIELD details ON TABLE audit_event TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD timestamp ON TABLE audit_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_entity ON TABLE audit_event COLUMNS entity_id;
DEFINE INDEX idx_audit_actor ON TABLE audit_event COLUMNS actor_id;
";

// -----------------------------------------------------------------------
// Schema v2: indexes backing roster and ledger ordering
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
DEFINE INDEX idx_member_created ON TABLE member COLUMNS created_at;
DEFINE INDEX idx_warning_position ON TABLE warning \
    COLUMNS member_id, position UNIQUE;
DEFINE INDEX idx_audit_timestamp ON TABLE audit_event COLUMNS timestamp;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Bring the muster schema up to date.
///
/// Ensures the `_migration` ledger exists, then applies, in version order,
/// every migration not yet recorded there. Returns how many were applied.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<usize, DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(format!("migration ledger: {e}")))?;

    let mut result = db.query("SELECT version FROM _migration").await?;
    let applied: Vec<AppliedVersion> = result.take(0)?;
    let applied: Vec<u32> = applied.into_iter().map(|r| r.version).collect();

    let mut count = 0;
    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
        let tables = migration.tables();
        info!(
            version = migration.version,
            name = migration.name,
            ?tables,
            "Applying schema migration"
        );

        db.query(migration.sql)
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!("v{} '{}': {e}", migration.version, migration.name))
            })?;
        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!("recording v{}: {e}", migration.version))
            })?;
        count += 1;
    }

    if count == 0 {
        info!(applied = applied.len(), "Schema up to date");
    } else {
        info!(count, "Schema migrations applied");
    }
    Ok(count)
}
