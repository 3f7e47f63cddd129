//! Daemon startup and shutdown.
//!
//! [`Daemon::start`] connects, migrates, opens the member change feed and
//! loads both rosters. The feed is registered before the roster snapshots
//! are read, so no write is lost between the two.

use std::sync::Arc;

use muster_db::repository::{SurrealAuditEventRepository, SurrealMemberRepository};
use muster_db::{DbManager, SurrealChangeFeed};
use muster_engine::{ChangeReconciler, MemberLifecycleController, RosterView, ledger};
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;

pub type Controller =
    MemberLifecycleController<SurrealMemberRepository<Any>, SurrealAuditEventRepository<Any>>;

pub struct Daemon {
    manager: DbManager,
    controller: Controller,
    active: Arc<ChangeReconciler>,
    departed: Arc<ChangeReconciler>,
    tasks: Vec<JoinHandle<()>>,
    _feed: SurrealChangeFeed,
}

impl Daemon {
    pub async fn start(config: &ServerConfig) -> Result<Self, ServerError> {
        let manager = DbManager::connect(&config.db).await?;
        let db = manager.client().clone();
        muster_db::run_migrations(&db).await?;

        let controller = MemberLifecycleController::from_config(
            SurrealMemberRepository::new(db.clone()),
            SurrealAuditEventRepository::new(db.clone()),
            &config.engine,
        )?;

        let feed = SurrealChangeFeed::start(db).await?;
        let active = Arc::new(ChangeReconciler::from_config(RosterView::Active, &config.engine));
        let departed = Arc::new(ChangeReconciler::from_config(RosterView::Departed, &config.engine));
        let tasks = vec![active.spawn(&feed), departed.spawn(&feed)];

        let active_roster = controller.active_roster().await?;
        let departed_roster = controller.departed_roster().await?;
        info!(
            active = active_roster.len(),
            departed = departed_roster.len(),
            ranks = controller.engine().catalog().len(),
            most_common_warning = ?ledger::most_common_type(&active_roster),
            "Rosters loaded"
        );
        active.load(active_roster);
        departed.load(departed_roster);

        Ok(Self {
            manager,
            controller,
            active,
            departed,
            tasks,
            _feed: feed,
        })
    }

    pub fn client(&self) -> &Surreal<Any> {
        self.manager.client()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn active(&self) -> &ChangeReconciler {
        &self.active
    }

    pub fn departed(&self) -> &ChangeReconciler {
        &self.departed
    }

    /// Stop the reconcilers and end the live query.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!(
            active = self.active.len(),
            departed = self.departed.len(),
            "Rosters released"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use muster_core::models::member::CreateMember;
    use muster_db::DbConfig;
    use muster_engine::{Actor, EngineConfig};
    use uuid::Uuid;

    use super::*;

    fn in_memory() -> ServerConfig {
        ServerConfig {
            db: DbConfig::in_memory(),
            engine: EngineConfig::default(),
        }
    }

    async fn wait_for(cond: impl Fn() -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !cond() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn rosters_follow_writes_from_another_client() {
        let daemon = Daemon::start(&in_memory()).await.unwrap();
        assert!(daemon.active().is_empty());

        // Separate repositories on the same store, as an admin tool would hold.
        let db = daemon.client().clone();
        let other = MemberLifecycleController::from_config(
            SurrealMemberRepository::new(db.clone()),
            SurrealAuditEventRepository::new(db),
            &EngineConfig::default(),
        )
        .unwrap();
        let actor = Actor::new(Uuid::new_v4(), true);
        let member = other
            .enlist(
                &actor,
                CreateMember {
                    name: "nora".into(),
                    rank: None,
                    join_date: None,
                    status: None,
                    certifications: Default::default(),
                },
            )
            .await
            .unwrap();

        wait_for(|| daemon.active().len() == 1).await;
        assert_eq!(daemon.active().ids(), vec![member.id]);
        assert!(daemon.active().is_recently_changed(member.id));

        let today = chrono::Utc::now().date_naive();
        other.mark_departed(&actor, member.id, today, None).await.unwrap();

        wait_for(|| daemon.departed().len() == 1 && daemon.active().is_empty()).await;
        assert!(daemon.active().is_empty());
        assert_eq!(daemon.departed().ids(), vec![member.id]);
        assert_eq!(daemon.controller().departed_roster().await.unwrap().len(), 1);

        daemon.shutdown();
    }

    #[tokio::test]
    async fn own_writes_reach_the_roster_in_order() {
        let config = in_memory();
        let daemon = Daemon::start(&config).await.unwrap();
        let actor = Actor::new(Uuid::new_v4(), false);
        for name in ["olga", "pete"] {
            daemon
                .controller()
                .enlist(
                    &actor,
                    CreateMember {
                        name: name.into(),
                        rank: None,
                        join_date: None,
                        status: None,
                        certifications: Default::default(),
                    },
                )
                .await
                .unwrap();
        }

        wait_for(|| daemon.active().len() == 2).await;
        let names: Vec<String> = daemon.active().snapshot().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["olga", "pete"]);
        daemon.shutdown();
    }
}
