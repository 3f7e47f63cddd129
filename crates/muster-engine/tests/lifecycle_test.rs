//! Integration tests for the member lifecycle controller backed by
//! in-memory SurrealDB repositories.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{NaiveDate, Utc};
use muster_core::error::MusterError;
use muster_core::models::audit::AuditAction;
use muster_core::models::member::{CreateMember, MemberStatus, UpdateMember};
use muster_core::models::warning::{NewWarning, WarningIdentity, WarningType};
use muster_core::repository::{
    AuditEventFilter, AuditEventRepository, MemberRepository, Pagination,
};
use muster_db::SurrealChangeFeed;
use muster_db::repository::{SurrealAuditEventRepository, SurrealMemberRepository};
use muster_engine::{
    Actor, ChangeReconciler, EngineConfig, MemberLifecycleController, RosterView,
    WarningRevocation,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

type Controller = MemberLifecycleController<SurrealMemberRepository<Db>, SurrealAuditEventRepository<Db>>;

struct Harness {
    db: Surreal<Db>,
    controller: Controller,
    members: SurrealMemberRepository<Db>,
    audit: SurrealAuditEventRepository<Db>,
}

/// Helper: spin up in-memory DB, run migrations and wire the controller.
async fn setup_with(config: EngineConfig) -> Harness {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    muster_db::run_migrations(&db).await.unwrap();

    let members = SurrealMemberRepository::new(db.clone());
    let audit = SurrealAuditEventRepository::new(db.clone());
    let controller =
        MemberLifecycleController::from_config(members.clone(), audit.clone(), &config).unwrap();
    Harness {
        db,
        controller,
        members,
        audit,
    }
}

async fn setup() -> Harness {
    setup_with(EngineConfig::default()).await
}

fn officer() -> Actor {
    Actor::new(Uuid::new_v4(), true)
}

fn sergeant() -> Actor {
    Actor::new(Uuid::new_v4(), false)
}

fn recruit(name: &str) -> CreateMember {
    CreateMember {
        name: name.into(),
        rank: None,
        join_date: NaiveDate::from_ymd_opt(2024, 1, 10),
        status: None,
        certifications: Default::default(),
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, d).unwrap()
}

fn new_warning(reason: &str) -> NewWarning {
    NewWarning {
        warning_type: WarningType::Verbal,
        reason: reason.into(),
        date: Utc::now(),
        issued_by: "Sgt. Stone".into(),
        notes: None,
    }
}

#[tokio::test]
async fn enlist_starts_at_lowest_rank() {
    let h = setup().await;
    let member = h.controller.enlist(&sergeant(), recruit("alice")).await.unwrap();

    assert_eq!(member.rank, "Recruit");
    assert_eq!(member.status, MemberStatus::Active);
    assert_eq!(member.attendance_count, 0);
    assert_eq!(member.join_date, NaiveDate::from_ymd_opt(2024, 1, 10));

    let active = h.controller.active_roster().await.unwrap();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn enlist_rejects_unknown_rank_and_blank_name() {
    let h = setup().await;
    let mut input = recruit("bob");
    input.rank = Some("Admiral".into());
    let err = h.controller.enlist(&sergeant(), input).await.unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));

    let err = h.controller.enlist(&sergeant(), recruit("   ")).await.unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));
}

#[tokio::test]
async fn attendance_shifts_dates_and_counts() {
    let h = setup().await;
    let actor = sergeant();
    let member = h.controller.enlist(&actor, recruit("carol")).await.unwrap();

    h.controller.record_attendance(&actor, member.id, day(1)).await.unwrap();
    let updated = h.controller.record_attendance(&actor, member.id, day(8)).await.unwrap();

    assert_eq!(updated.attendance_count, 2);
    assert_eq!(updated.last_attendance_date, Some(day(8)));
    assert_eq!(updated.second_last_attendance_date, Some(day(1)));
}

#[tokio::test]
async fn promotion_follows_attendance_thresholds() {
    let h = setup().await;
    let actor = sergeant();
    let member = h.controller.enlist(&actor, recruit("dave")).await.unwrap();

    for d in 1..=4 {
        h.controller.record_attendance(&actor, member.id, day(d)).await.unwrap();
    }
    let outcome = h.controller.promote(&actor, member.id).await.unwrap();
    assert!(!outcome.promoted());
    assert_eq!(outcome.member.rank, "Recruit");

    h.controller.record_attendance(&actor, member.id, day(5)).await.unwrap();
    let outcome = h.controller.promote(&actor, member.id).await.unwrap();
    assert!(outcome.promoted());
    assert_eq!(outcome.member.rank, "Soldier");
    assert_eq!(outcome.member.attendance_count, 5);
    assert_eq!(outcome.member.promotion_status_note.as_deref(), Some("Promoted to Soldier"));

    let again = h.controller.promote(&actor, member.id).await.unwrap();
    assert!(!again.promoted());
    assert_eq!(again.member.version, outcome.member.version);
}

#[tokio::test]
async fn merit_ranks_require_privilege() {
    let h = setup().await;
    let admin = officer();
    let member = h.controller.enlist(&admin, recruit("erin")).await.unwrap();
    let major = h
        .controller
        .administrative_edit(
            &admin,
            member.id,
            UpdateMember {
                rank: Some("Major".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let denied = h.controller.promote(&sergeant(), member.id).await.unwrap();
    assert!(!denied.promoted());
    assert!(denied.result.suggested_rank.is_none());
    assert_eq!(denied.member.rank, "Major");
    assert_eq!(denied.member.version, major.version);

    let granted = h.controller.promote(&admin, member.id).await.unwrap();
    assert!(granted.promoted());
    assert!(granted.result.is_merit);
    assert_eq!(granted.member.rank, "Lieutenant-Colonel");
}

#[tokio::test]
async fn departure_and_rejoin_are_asymmetric() {
    let h = setup().await;
    let actor = sergeant();
    let member = h.controller.enlist(&actor, recruit("frank")).await.unwrap();
    for d in 1..=3 {
        h.controller.record_attendance(&actor, member.id, day(d)).await.unwrap();
    }

    let departed = h
        .controller
        .mark_departed(&actor, member.id, day(20), Some("moved abroad".into()))
        .await
        .unwrap();
    assert_eq!(departed.status, MemberStatus::Departed);
    assert_eq!(departed.departure_date, Some(day(20)));
    assert_eq!(departed.attendance_count, 3);
    assert!(h.controller.active_roster().await.unwrap().is_empty());
    assert_eq!(h.controller.departed_roster().await.unwrap().len(), 1);

    let rejoined = h.controller.rejoin(&actor, member.id).await.unwrap();
    assert_eq!(rejoined.status, MemberStatus::Active);
    assert_eq!(rejoined.attendance_count, 3);
    assert_eq!(rejoined.rank, departed.rank);
    assert_eq!(rejoined.departure_date, None);
    assert_eq!(rejoined.departure_notes, None);
    assert_eq!(rejoined.last_attendance_date, None);
    assert_eq!(rejoined.second_last_attendance_date, None);
    assert_eq!(rejoined.join_date, member.join_date);

    let history = h
        .audit
        .list(
            AuditEventFilter {
                entity_id: Some(member.id),
                action: Some(AuditAction::Update),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    let rejoin_event = history
        .items
        .iter()
        .find(|e| e.details.get("previous_departure_notes").is_some())
        .expect("rejoin audit event");
    assert_eq!(rejoin_event.details["previous_departure_notes"], "moved abroad");
}

#[tokio::test]
async fn rejoin_without_join_date_starts_today() {
    let h = setup().await;
    let actor = sergeant();
    let member = h.controller.enlist(&actor, recruit("hank")).await.unwrap();
    let mut departed = h
        .controller
        .mark_departed(&actor, member.id, day(5), None)
        .await
        .unwrap();

    // Records imported from older rosters may lack a join date.
    departed.join_date = None;
    h.members.upsert(departed).await.unwrap();

    let before = Utc::now().date_naive();
    let rejoined = h.controller.rejoin(&actor, member.id).await.unwrap();
    let after = Utc::now().date_naive();

    let joined = rejoined.join_date.expect("rejoin sets a join date");
    assert!(before <= joined && joined <= after);
    assert_eq!(h.controller.get(member.id).await.unwrap().join_date, Some(joined));
}

#[tokio::test]
async fn attendance_count_does_not_overflow() {
    let h = setup().await;
    let admin = officer();
    let member = h.controller.enlist(&admin, recruit("iris")).await.unwrap();
    let maxed = h
        .controller
        .administrative_edit(
            &admin,
            member.id,
            UpdateMember {
                attendance_count: Some(u32::MAX),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h
        .controller
        .record_attendance(&admin, member.id, day(3))
        .await
        .unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));

    let stored = h.controller.get(member.id).await.unwrap();
    assert_eq!(stored.attendance_count, u32::MAX);
    assert_eq!(stored.last_attendance_date, None);
    assert_eq!(stored.version, maxed.version);
}

#[tokio::test]
async fn illegal_transitions_are_rejected() {
    let h = setup().await;
    let actor = sergeant();
    let member = h.controller.enlist(&actor, recruit("gina")).await.unwrap();

    let err = h.controller.rejoin(&actor, member.id).await.unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));
    let err = h.controller.purge_departed(&actor, member.id).await.unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));

    h.controller.mark_departed(&actor, member.id, day(2), None).await.unwrap();
    let err = h
        .controller
        .mark_departed(&actor, member.id, day(3), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));
    let err = h
        .controller
        .record_attendance(&actor, member.id, day(4))
        .await
        .unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));

    let unchanged = h.controller.get(member.id).await.unwrap();
    assert_eq!(unchanged.departure_date, Some(day(2)));
    assert_eq!(unchanged.attendance_count, 0);
}

#[tokio::test]
async fn purge_deletes_departed_member() {
    let h = setup().await;
    let actor = officer();
    let member = h.controller.enlist(&actor, recruit("hank")).await.unwrap();
    h.controller.mark_departed(&actor, member.id, day(9), None).await.unwrap();

    h.controller.purge_departed(&actor, member.id).await.unwrap();
    let err = h.controller.get(member.id).await.unwrap_err();
    assert!(matches!(err, MusterError::NotFound { .. }));

    let deletes = h
        .audit
        .list(
            AuditEventFilter {
                action: Some(AuditAction::Delete),
                ..Default::default()
            },
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(deletes.total, 1);
    assert_eq!(deletes.items[0].entity_id, member.id);
}

#[tokio::test]
async fn warnings_issue_and_revoke() {
    let h = setup().await;
    let actor = sergeant();
    let member = h.controller.enlist(&actor, recruit("ivy")).await.unwrap();

    h.controller
        .issue_warning(&actor, member.id, new_warning("late"))
        .await
        .unwrap();
    let member = h
        .controller
        .issue_warning(&actor, member.id, new_warning("spam"))
        .await
        .unwrap();
    assert_eq!(member.warnings.len(), 2);
    let late = member.warnings[0].clone();
    let spam = member.warnings[1].clone();

    match h.controller.revoke_warning(&actor, member.id, late.id).await.unwrap() {
        WarningRevocation::Revoked { member, warning } => {
            assert_eq!(warning.id, late.id);
            assert_eq!(member.warnings.len(), 1);
        }
        WarningRevocation::NotFound => panic!("expected revocation"),
    }
    assert!(matches!(
        h.controller.revoke_warning(&actor, member.id, late.id).await.unwrap(),
        WarningRevocation::NotFound
    ));

    let identity = WarningIdentity::from(&spam);
    assert!(matches!(
        h.controller
            .revoke_warning_by_identity(&actor, member.id, identity.clone())
            .await
            .unwrap(),
        WarningRevocation::Revoked { .. }
    ));
    assert!(matches!(
        h.controller
            .revoke_warning_by_identity(&actor, member.id, identity)
            .await
            .unwrap(),
        WarningRevocation::NotFound
    ));
    assert!(h.controller.get(member.id).await.unwrap().warnings.is_empty());
}

#[tokio::test]
async fn administrative_edit_requires_privilege_and_may_lower_attendance() {
    let h = setup().await;
    let admin = officer();
    let member = h.controller.enlist(&admin, recruit("jack")).await.unwrap();
    for d in 1..=3 {
        h.controller.record_attendance(&admin, member.id, day(d)).await.unwrap();
    }

    let correction = UpdateMember {
        attendance_count: Some(1),
        ..Default::default()
    };
    let err = h
        .controller
        .administrative_edit(&sergeant(), member.id, correction.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));

    let edited = h
        .controller
        .administrative_edit(&admin, member.id, correction)
        .await
        .unwrap();
    assert_eq!(edited.attendance_count, 1);

    let err = h
        .controller
        .administrative_edit(
            &admin,
            member.id,
            UpdateMember {
                status: Some(MemberStatus::Departed),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MusterError::Validation { .. }));
}

#[tokio::test]
async fn optimistic_concurrency_rejects_stale_writes() {
    let config = EngineConfig {
        optimistic_concurrency: true,
        ..Default::default()
    };
    let h = setup_with(config).await;
    let actor = sergeant();
    let member = h.controller.enlist(&actor, recruit("kate")).await.unwrap();

    let updated = h
        .controller
        .record_attendance(&actor, member.id, day(1))
        .await
        .unwrap();
    assert_eq!(updated.version, member.version + 1);

    // A concurrent writer bumps the version behind the controller's back.
    let mut stale = member.clone();
    stale.attendance_count = 9;
    let err = muster_core::repository::MemberRepository::upsert_if_version(
        &h.members,
        stale,
        member.version,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, MusterError::Conflict { .. }));
    assert_eq!(h.controller.get(member.id).await.unwrap().attendance_count, 1);
}

#[tokio::test]
async fn reconcilers_follow_the_member_feed() {
    let h = setup().await;
    let actor = sergeant();
    let active = Arc::new(ChangeReconciler::new(RosterView::Active, StdDuration::from_secs(5)));
    let departed = Arc::new(ChangeReconciler::new(RosterView::Departed, StdDuration::from_secs(5)));
    active.load(h.controller.active_roster().await.unwrap());
    departed.load(h.controller.departed_roster().await.unwrap());
    let feed = SurrealChangeFeed::start(h.db.clone()).await.unwrap();
    let active_task = active.spawn(&feed);
    let departed_task = departed.spawn(&feed);

    // A second controller over its own repositories stands in for another
    // client of the same database.
    let other = MemberLifecycleController::from_config(
        SurrealMemberRepository::new(h.db.clone()),
        SurrealAuditEventRepository::new(h.db.clone()),
        &EngineConfig::default(),
    )
    .unwrap();

    let a = h.controller.enlist(&actor, recruit("leo")).await.unwrap();
    let b = other.enlist(&actor, recruit("mia")).await.unwrap();
    other.mark_departed(&actor, b.id, day(11), None).await.unwrap();

    let deadline = tokio::time::Instant::now() + StdDuration::from_secs(5);
    while (active.len() != 1 || departed.len() != 1) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }

    assert_eq!(active.ids(), vec![a.id]);
    assert_eq!(departed.ids(), vec![b.id]);
    assert!(departed.is_recently_changed(b.id));

    active_task.abort();
    departed_task.abort();
}

#[test]
fn engine_config_parses_from_toml() {
    let config: EngineConfig = toml::from_str(
        r#"
        merit_boundary = "Sergeant"
        optimistic_concurrency = true

        [[ranks]]
        name = "Private"
        order = 1

        [[ranks]]
        name = "Corporal"
        order = 2

        [[ranks]]
        name = "Sergeant"
        order = 3

        [[thresholds]]
        attendance_count = 0
        rank = "Private"

        [[thresholds]]
        attendance_count = 10
        rank = "Corporal"
        requires = "Training"
        "#,
    )
    .unwrap();

    assert!(config.optimistic_concurrency);
    assert_eq!(config.ranks.len(), 3);
    assert_eq!(config.thresholds.len(), 2);
    assert_eq!(config.highlight_window_secs, 5);

    let engine = muster_engine::PromotionEngine::from_config(&config).unwrap();
    assert!(engine.catalog().is_merit_rank("Sergeant"));
    assert!(!engine.catalog().is_merit_rank("Corporal"));
}
