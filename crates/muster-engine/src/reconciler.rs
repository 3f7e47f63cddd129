//! Roster reconciliation.
//!
//! A [`ChangeReconciler`] keeps one roster view (active or departed
//! members) in step with the store's change feed. Remote events may arrive
//! before the initial load, twice, or out of order; every merge is applied
//! under a single lock so readers never observe a half-applied event.
//!
//! Each member's highest seen `version` is remembered even after it leaves
//! the view, so a re-delivered or reordered event never undoes newer state.
//! Deleted ids are kept as tombstones in a bounded FIFO and late inserts or
//! updates for them are dropped.
//!
//! Local edits follow a two-phase protocol: [`apply_local`] shows a
//! tentative state immediately, then [`confirm`] installs the stored
//! result or [`rollback`] restores the last confirmed state.
//!
//! [`apply_local`]: ChangeReconciler::apply_local
//! [`confirm`]: ChangeReconciler::confirm
//! [`rollback`]: ChangeReconciler::rollback

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use muster_core::models::change::{ChangeEvent, ChangeOp};
use muster_core::models::member::Member;
use muster_core::repository::ChangeFeed;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;

/// Deleted ids remembered before the oldest is forgotten.
const TOMBSTONE_CAPACITY: usize = 4096;

/// Which members a roster shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterView {
    /// Everyone not departed.
    Active,
    Departed,
}

impl RosterView {
    pub fn admits(self, member: &Member) -> bool {
        match self {
            RosterView::Active => !member.is_departed(),
            RosterView::Departed => member.is_departed(),
        }
    }
}

/// What a merge did to the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Removed,
    /// Held until the initial snapshot is loaded.
    Queued,
    /// Nothing to do: the event was malformed, older than what was already
    /// seen, or about a deleted member.
    Ignored,
}

#[derive(Debug)]
struct Entry {
    /// Last state known to be stored. `None` for a local insert that the
    /// store has not confirmed yet.
    confirmed: Option<Member>,
    pending: Option<Member>,
}

impl Entry {
    fn confirmed(member: Member) -> Self {
        Self {
            confirmed: Some(member),
            pending: None,
        }
    }

    fn shown(&self) -> Option<&Member> {
        self.pending.as_ref().or(self.confirmed.as_ref())
    }

    fn id(&self) -> Option<Uuid> {
        self.shown().map(|m| m.id)
    }
}

/// Bounded set of deleted member ids, oldest evicted first.
#[derive(Debug, Default)]
struct Tombstones {
    ids: HashSet<Uuid>,
    order: VecDeque<Uuid>,
}

impl Tombstones {
    fn insert(&mut self, id: Uuid) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > TOMBSTONE_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }
}

#[derive(Debug, Default)]
struct RosterState {
    loaded: bool,
    entries: Vec<Entry>,
    queued: Vec<ChangeEvent>,
    highlights: HashMap<Uuid, Instant>,
    /// Highest stored version seen per member, in or out of the view.
    versions: HashMap<Uuid, u64>,
    tombstones: Tombstones,
}

impl RosterState {
    fn position(&self, id: Uuid) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == Some(id))
    }

    /// Record `member`'s version. `false` when it is not newer than the
    /// last one seen.
    fn observe(&mut self, member: &Member) -> bool {
        match self.versions.get(&member.id) {
            Some(&seen) if member.version <= seen => false,
            _ => {
                self.versions.insert(member.id, member.version);
                true
            }
        }
    }

    fn highlight(&mut self, id: Uuid, window: Duration) {
        let now = Instant::now();
        self.highlights.retain(|_, at| now.duration_since(*at) < window);
        self.highlights.insert(id, now);
    }
}

/// Merges change-feed events into an in-memory roster view.
#[derive(Debug)]
pub struct ChangeReconciler {
    view: RosterView,
    highlight_window: Duration,
    state: Mutex<RosterState>,
}

impl ChangeReconciler {
    pub fn new(view: RosterView, highlight_window: Duration) -> Self {
        Self {
            view,
            highlight_window,
            state: Mutex::new(RosterState::default()),
        }
    }

    pub fn from_config(view: RosterView, config: &EngineConfig) -> Self {
        Self::new(view, Duration::from_secs(config.highlight_window_secs))
    }

    pub fn view(&self) -> RosterView {
        self.view
    }

    fn lock(&self) -> MutexGuard<'_, RosterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the initial snapshot, then replay events that arrived
    /// before it, once each.
    ///
    /// Entries with a pending local edit keep that edit; their confirmed
    /// base is replaced by the snapshot.
    pub fn load(&self, snapshot: Vec<Member>) {
        let mut state = self.lock();
        let mut pending: Vec<Entry> = state
            .entries
            .drain(..)
            .filter(|e| e.pending.is_some())
            .collect();

        let mut entries = Vec::with_capacity(snapshot.len());
        for member in snapshot.into_iter().filter(|m| self.view.admits(m)) {
            state.versions.insert(member.id, member.version);
            match pending.iter().position(|e| e.id() == Some(member.id)) {
                Some(idx) => {
                    let mut entry = pending.remove(idx);
                    entry.confirmed = Some(member);
                    entries.push(entry);
                }
                None => entries.push(Entry::confirmed(member)),
            }
        }
        // Local inserts the snapshot does not know yet, in their old order.
        entries.extend(pending);

        state.entries = entries;
        state.loaded = true;

        let queued = std::mem::take(&mut state.queued);
        let replayed = queued.len();
        for event in queued {
            self.merge(&mut state, event);
        }
        info!(
            view = ?self.view,
            members = state.entries.len(),
            replayed,
            "Roster loaded"
        );
    }

    /// Merge one remote event.
    pub fn apply(&self, event: ChangeEvent) -> MergeOutcome {
        let mut state = self.lock();
        if !state.loaded {
            debug!(member_id = %event.member_id, op = ?event.op, "Queueing event until roster loads");
            state.queued.push(event);
            return MergeOutcome::Queued;
        }
        self.merge(&mut state, event)
    }

    fn merge(&self, state: &mut RosterState, event: ChangeEvent) -> MergeOutcome {
        let outcome = match event.op {
            ChangeOp::Delete => {
                state.tombstones.insert(event.member_id);
                state.versions.remove(&event.member_id);
                match state.position(event.member_id) {
                    Some(idx) => {
                        state.entries.remove(idx);
                        state.highlights.remove(&event.member_id);
                        MergeOutcome::Removed
                    }
                    None => MergeOutcome::Ignored,
                }
            }
            ChangeOp::Insert | ChangeOp::Update => {
                let Some(member) = event.member else {
                    warn!(member_id = %event.member_id, op = ?event.op, "Change event without payload");
                    return MergeOutcome::Ignored;
                };
                if member.id != event.member_id {
                    warn!(
                        member_id = %event.member_id,
                        payload_id = %member.id,
                        "Change event id does not match payload"
                    );
                    return MergeOutcome::Ignored;
                }
                self.upsert_remote(state, member)
            }
        };
        debug!(member_id = %event.member_id, op = ?event.op, ?outcome, "Merged change");
        outcome
    }

    fn upsert_remote(&self, state: &mut RosterState, member: Member) -> MergeOutcome {
        let id = member.id;
        if state.tombstones.contains(id) {
            debug!(member_id = %id, "Dropping change for deleted member");
            return MergeOutcome::Ignored;
        }
        if !state.observe(&member) {
            debug!(member_id = %id, version = member.version, "Dropping stale change");
            return MergeOutcome::Ignored;
        }
        let position = state.position(id);

        if !self.view.admits(&member) {
            return match position {
                Some(idx) => {
                    state.entries.remove(idx);
                    state.highlights.remove(&id);
                    MergeOutcome::Removed
                }
                None => MergeOutcome::Ignored,
            };
        }

        let outcome = match position {
            Some(idx) => {
                state.entries[idx].confirmed = Some(member);
                MergeOutcome::Replaced
            }
            None => {
                state.entries.push(Entry::confirmed(member));
                MergeOutcome::Inserted
            }
        };
        state.highlight(id, self.highlight_window);
        outcome
    }

    /// Show a tentative local state until it is confirmed or rolled back.
    pub fn apply_local(&self, member: Member) {
        let mut state = self.lock();
        match state.position(member.id) {
            Some(idx) => state.entries[idx].pending = Some(member),
            None => state.entries.push(Entry {
                confirmed: None,
                pending: Some(member),
            }),
        }
    }

    /// Replace a pending local edit with the state the store accepted.
    pub fn confirm(&self, stored: Member) -> MergeOutcome {
        let mut state = self.lock();
        let id = stored.id;
        if stored.version > state.versions.get(&id).copied().unwrap_or(0) {
            state.versions.insert(id, stored.version);
        }
        let Some(idx) = state.position(id) else {
            if !self.view.admits(&stored) {
                return MergeOutcome::Ignored;
            }
            state.entries.push(Entry::confirmed(stored));
            return MergeOutcome::Inserted;
        };

        if !self.view.admits(&stored) {
            state.entries.remove(idx);
            state.highlights.remove(&id);
            return MergeOutcome::Removed;
        }
        state.entries[idx] = Entry::confirmed(stored);
        MergeOutcome::Replaced
    }

    /// Discard a pending local edit, restoring the last confirmed state.
    /// Returns `false` when there was nothing to roll back.
    pub fn rollback(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        let Some(idx) = state.position(id) else {
            return false;
        };
        if state.entries[idx].pending.take().is_none() {
            return false;
        }
        if state.entries[idx].confirmed.is_none() {
            state.entries.remove(idx);
        }
        true
    }

    /// Current roster in display order, local edits included.
    pub fn snapshot(&self) -> Vec<Member> {
        self.lock()
            .entries
            .iter()
            .filter_map(|e| e.shown().cloned())
            .collect()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.lock().entries.iter().filter_map(Entry::id).collect()
    }

    pub fn get(&self, id: Uuid) -> Option<Member> {
        let state = self.lock();
        state
            .position(id)
            .and_then(|idx| state.entries[idx].shown().cloned())
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_pending(&self, id: Uuid) -> bool {
        let state = self.lock();
        state
            .position(id)
            .is_some_and(|idx| state.entries[idx].pending.is_some())
    }

    /// Whether `id` changed remotely within the highlight window.
    pub fn is_recently_changed(&self, id: Uuid) -> bool {
        self.lock()
            .highlights
            .get(&id)
            .is_some_and(|at| at.elapsed() < self.highlight_window)
    }

    /// Consume events until the channel closes. A lagging receiver skips
    /// the dropped events and keeps going.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<ChangeEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.apply(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(view = ?self.view, skipped, "Change feed lagged; events dropped");
                }
                Err(RecvError::Closed) => {
                    info!(view = ?self.view, "Change feed closed");
                    break;
                }
            }
        }
    }

    /// Subscribe to `feed` and merge its events on a background task.
    pub fn spawn(self: &Arc<Self>, feed: &impl ChangeFeed) -> JoinHandle<()> {
        let events = feed.subscribe();
        tokio::spawn(Arc::clone(self).run(events))
    }
}
