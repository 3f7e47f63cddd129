//! Member change feed backed by a SurrealDB live query.
//!
//! One `LIVE SELECT` on the `member` table sees every committed write, from
//! this process or any other client of the same database. Each notification
//! carries only the record id and version; creates and updates are re-read
//! through [`SurrealMemberRepository`] so subscribers always receive the
//! full member with its warnings.

use std::time::Duration;

use futures::StreamExt;
use muster_core::models::change::ChangeEvent;
use muster_core::models::member::Member;
use muster_core::repository::ChangeFeed;
use surrealdb::method::QueryStream;
use surrealdb::types::Action;
use surrealdb::{Connection, Notification, Surreal};
use surrealdb_types::SurrealValue;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbError;
use crate::repository::SurrealMemberRepository;

/// Buffered notifications per subscriber before it starts lagging.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// Re-reads of a member whose stored version trails its notification.
const READ_ATTEMPTS: u32 = 5;
const READ_RETRY_DELAY: Duration = Duration::from_millis(20);

const LIVE_MEMBERS: &str = "LIVE SELECT meta::id(id) AS record_id, version FROM member";

/// Projection of a live `member` notification.
#[derive(Debug, SurrealValue)]
struct MemberNotificationRow {
    record_id: String,
    version: u64,
}

/// Broadcasts member inserts, updates and deletes observed by the store.
///
/// The live query is registered before [`start`](Self::start) returns, so
/// a subscriber that loads a snapshot afterwards misses nothing. Dropping
/// the feed stops the forwarding task and ends the live query.
pub struct SurrealChangeFeed {
    changes: broadcast::Sender<ChangeEvent>,
    task: JoinHandle<()>,
}

impl SurrealChangeFeed {
    pub async fn start<C: Connection>(db: Surreal<C>) -> Result<Self, DbError> {
        let mut response = db.query(LIVE_MEMBERS).await?;
        let stream = response.stream::<Notification<MemberNotificationRow>>(0)?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let members = SurrealMemberRepository::new(db);
        let task = tokio::spawn(forward(members, stream, changes.clone()));
        info!("Member change feed started");

        Ok(Self { changes, task })
    }
}

impl ChangeFeed for SurrealChangeFeed {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

impl Drop for SurrealChangeFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward<C: Connection>(
    members: SurrealMemberRepository<C>,
    mut stream: QueryStream<Notification<MemberNotificationRow>>,
    changes: broadcast::Sender<ChangeEvent>,
) {
    while let Some(item) = stream.next().await {
        let notification = match item {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, "Unreadable member notification");
                continue;
            }
        };
        let Ok(id) = Uuid::parse_str(&notification.data.record_id) else {
            warn!(record_id = %notification.data.record_id, "Member notification with invalid id");
            continue;
        };

        let event = match notification.action {
            Action::Delete => ChangeEvent::deleted(id),
            Action::Create | Action::Update => {
                let Some(member) = read_at_least(&members, id, notification.data.version).await
                else {
                    continue;
                };
                if notification.action == Action::Create {
                    ChangeEvent::inserted(member)
                } else {
                    ChangeEvent::updated(member)
                }
            }
            other => {
                debug!(action = %other, "Ignoring member notification");
                continue;
            }
        };

        debug!(member_id = %id, op = ?event.op, "Forwarding member change");
        // No subscribers is fine.
        let _ = changes.send(event);
    }
    info!("Member change feed ended");
}

/// Read `id` once its stored version reaches `version`. `None` when the
/// member is gone or never catches up; a later notification carries the
/// newer state.
async fn read_at_least<C: Connection>(
    members: &SurrealMemberRepository<C>,
    id: Uuid,
    version: u64,
) -> Option<Member> {
    for _ in 0..READ_ATTEMPTS {
        match members.fetch(id).await {
            Ok(member) if member.version >= version => return Some(member),
            Ok(_) => tokio::time::sleep(READ_RETRY_DELAY).await,
            Err(DbError::NotFound { .. }) => {
                debug!(member_id = %id, "Member deleted before its change was read");
                return None;
            }
            Err(e) => {
                warn!(member_id = %id, error = %e, "Failed to read changed member");
                return None;
            }
        }
    }
    warn!(member_id = %id, version, "Member never reached notified version");
    None
}
