//! Model store
//!
//! The single writer of the model. Every mutation takes the store lock,
//! rebuilds the displayed snapshot (authoritative baseline with optimistic
//! overlays applied), diffs it against the last published one, publishes the
//! new [`ModelView`] and emits the resulting [`ChangeBatch`] before the lock
//! is released. Mutations are memory-only.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::diff::{self, DiffPolicy};
use crate::error::DispatchError;
use crate::events::{ActionId, ActionOutcome, ChangeBatch, Connectivity, Event, EventSender};
use crate::model::{ActionKind, EntityId, EntityKind, LifecycleState};
use crate::snapshot::Snapshot;
use crate::view::{ActionStatus, EntityPhase, ModelView, PendingAction};

/// How long a tombstone outlives the last listing that still reported it
const TOMBSTONE_RETENTION: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
struct Overlay {
    state: LifecycleState,
    action: Option<ActionId>,
}

struct StoreInner {
    version: u64,
    /// Authoritative entities in first-seen order, including ones carried
    /// forward while missing
    baseline: Option<Arc<Snapshot>>,
    misses: HashMap<EntityId, u32>,
    overlays: HashMap<EntityId, Overlay>,
    pending: HashMap<EntityId, PendingAction>,
    next_action: u64,
    /// Open log streams and the session that owns each
    streams: BTreeMap<EntityId, u64>,
    connectivity: Connectivity,
    /// Removed container ids with the last time a listing still reported them
    tombstones: HashMap<EntityId, Instant>,
    /// Stack and service ids removed by an action, with the action's
    /// completion time. Polls started earlier must not bring them back.
    removed_groups: HashMap<EntityId, Instant>,
    /// Last published displayed snapshot
    displayed: Arc<Snapshot>,
}

impl StoreInner {
    fn find_action(&self, action: ActionId) -> Option<EntityId> {
        self.pending
            .values()
            .find(|p| p.id == action)
            .map(|p| p.entity.clone())
    }

    fn drop_overlay_for(&mut self, id: &str, action: ActionId) {
        if self
            .overlays
            .get(id)
            .is_some_and(|o| o.action == Some(action))
        {
            self.overlays.remove(id);
        }
    }

    /// Remove `id` and everything below it from the baseline
    fn remove_subtree(&mut self, id: &str, at: Instant) -> Vec<EntityId> {
        let Some(baseline) = self.baseline.clone() else {
            return Vec::new();
        };

        let mut doomed: HashSet<EntityId> = HashSet::from([id.to_string()]);
        // Parents always precede children in assembled order, so one pass
        // catches the whole subtree.
        for e in baseline.iter() {
            if e.parent.as_ref().is_some_and(|p| doomed.contains(p)) {
                doomed.insert(e.id.clone());
            }
        }

        let mut removed = Vec::new();
        let kept = baseline
            .iter()
            .filter(|e| {
                if doomed.contains(&e.id) {
                    removed.push(e.id.clone());
                    if e.kind == EntityKind::Container {
                        self.tombstones.insert(e.id.clone(), at);
                    } else {
                        self.removed_groups.insert(e.id.clone(), at);
                    }
                    false
                } else {
                    true
                }
            })
            .cloned()
            .collect();

        self.baseline = Some(Arc::new(baseline.with_entities(kept)));
        for gone in &removed {
            self.misses.remove(gone);
            self.overlays.remove(gone);
        }
        removed
    }

    /// Drop entities that must not come back from a listing taken at
    /// `started`, and age out bookkeeping that no longer applies.
    fn screen(&mut self, snapshot: Snapshot) -> Snapshot {
        let started = snapshot.started();
        for e in snapshot.iter() {
            if let Some(seen) = self.tombstones.get_mut(&e.id) {
                *seen = (*seen).max(started);
            }
        }

        let stale_group = |id: &str, groups: &HashMap<EntityId, Instant>| {
            groups.get(id).is_some_and(|at| started < *at)
        };
        let snapshot = if snapshot
            .iter()
            .any(|e| self.tombstones.contains_key(&e.id) || stale_group(e.id.as_str(), &self.removed_groups))
        {
            let alive = snapshot
                .iter()
                .filter(|e| !self.tombstones.contains_key(&e.id) && !stale_group(e.id.as_str(), &self.removed_groups))
                .cloned()
                .collect();
            snapshot.with_entities(alive)
        } else {
            snapshot
        };

        self.removed_groups.retain(|_, at| started < *at);
        self.tombstones
            .retain(|_, seen| started.saturating_duration_since(*seen) <= TOMBSTONE_RETENTION);
        snapshot
    }
}

pub struct ModelStore {
    inner: Mutex<StoreInner>,
    view_tx: watch::Sender<Arc<ModelView>>,
    events: EventSender,
    policy: DiffPolicy,
}

impl ModelStore {
    pub fn new(events: EventSender, policy: DiffPolicy) -> Self {
        let (view_tx, _) = watch::channel(Arc::new(ModelView::empty()));
        Self {
            inner: Mutex::new(StoreInner {
                version: 0,
                baseline: None,
                misses: HashMap::new(),
                overlays: HashMap::new(),
                pending: HashMap::new(),
                next_action: 1,
                streams: BTreeMap::new(),
                connectivity: Connectivity::Connected,
                tombstones: HashMap::new(),
                removed_groups: HashMap::new(),
                displayed: Arc::new(Snapshot::empty()),
            }),
            view_tx,
            events,
            policy,
        }
    }

    pub fn current_view(&self) -> Arc<ModelView> {
        self.view_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ModelView>> {
        self.view_tx.subscribe()
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Merge one poll result into the model.
    pub fn apply_snapshot(&self, snapshot: Snapshot) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.connectivity.is_connected() {
            info!("container runtime reachable again");
            inner.connectivity = Connectivity::Connected;
            self.events.emit(Event::Runtime(Connectivity::Connected));
        }

        let snapshot = inner.screen(snapshot);

        let prev = inner.baseline.clone();
        let raw = diff::diff(prev.as_deref(), &snapshot, &inner.misses, self.policy);

        let removed: Vec<(EntityId, EntityKind)> = raw
            .removed()
            .filter_map(|id| prev.as_deref().and_then(|p| p.get(id)).map(|e| (id.clone(), e.kind)))
            .collect();
        for (id, kind) in &removed {
            debug!(id = %id, "entity removed after missed polls");
            if *kind == EntityKind::Container {
                inner.tombstones.insert(id.clone(), snapshot.started());
            }
            inner.overlays.remove(id);
            if let Some(p) = inner.pending.get_mut(id) {
                p.target_removed = true;
            }
        }
        inner.pending.retain(|_, p| !p.target_removed || p.status.is_active());

        let merged = diff::carry_forward(prev.as_deref(), &snapshot, &raw);
        inner.baseline = Some(Arc::new(snapshot.with_entities(merged)));
        inner.misses = raw.misses;

        let started = snapshot.started();
        let confirmed: Vec<EntityId> = inner
            .pending
            .values()
            .filter(|p| matches!(p.status, ActionStatus::Succeeded { completed_at } if started >= completed_at))
            .map(|p| p.entity.clone())
            .collect();
        for id in &confirmed {
            inner.pending.remove(id);
        }

        let pending = &inner.pending;
        inner.overlays.retain(|id, overlay| match overlay.action {
            None => false,
            Some(action) => pending
                .get(id)
                .is_some_and(|p| p.id == action && !matches!(p.status, ActionStatus::Failed { .. } | ActionStatus::Cancelled)),
        });

        debug!(seq = snapshot.seq(), entities = snapshot.len(), "snapshot applied");
        self.publish(inner);
    }

    /// Record a failed poll. Entity states are frozen and flagged as
    /// unknown-connectivity; no changes are emitted.
    pub fn mark_unavailable(&self, reason: &str) {
        let mut inner = self.inner.lock();
        if !inner.connectivity.is_connected() {
            return;
        }
        warn!(%reason, "container runtime unavailable");
        inner.connectivity = Connectivity::Unavailable {
            reason: reason.to_string(),
        };
        self.events
            .emit(Event::Runtime(inner.connectivity.clone()));
        self.publish(&mut inner);
    }

    /// Show `state` for `id` until the next authoritative snapshot.
    pub fn apply_optimistic(&self, id: &str, state: LifecycleState) -> Result<(), DispatchError> {
        let mut inner = self.inner.lock();
        if !inner.connectivity.is_connected() {
            return Err(DispatchError::RuntimeUnavailable);
        }
        if !inner.baseline.as_ref().is_some_and(|b| b.contains(id)) {
            return Err(DispatchError::InvalidTarget(id.to_string()));
        }
        inner
            .overlays
            .insert(id.to_string(), Overlay { state, action: None });
        self.publish(&mut inner);
        Ok(())
    }

    /// Drop any optimistic state for `id`, restoring the last authoritative
    /// value. Returns false if there was nothing to roll back.
    pub fn rollback(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.overlays.remove(id).is_none() {
            return false;
        }
        self.publish(&mut inner);
        true
    }

    /// Validate and record a new action in one step.
    pub(crate) fn admit(&self, id: &str, kind: ActionKind) -> Result<PendingAction, DispatchError> {
        let mut inner = self.inner.lock();

        if !inner.baseline.as_ref().is_some_and(|b| b.contains(id)) {
            return Err(DispatchError::InvalidTarget(id.to_string()));
        }
        if !inner.connectivity.is_connected() {
            return Err(DispatchError::RuntimeUnavailable);
        }
        if let Some(existing) = inner.pending.get(id).filter(|p| p.status.is_active()) {
            return Err(DispatchError::ActionConflict {
                id: id.to_string(),
                pending: existing.id,
            });
        }

        let action_id = ActionId(inner.next_action);
        inner.next_action += 1;

        let optimistic = kind.optimistic_state();
        let pending = PendingAction {
            id: action_id,
            entity: id.to_string(),
            kind,
            status: ActionStatus::Queued,
            optimistic,
            submitted_at: SystemTime::now(),
            target_removed: false,
        };
        inner.pending.insert(id.to_string(), pending.clone());
        if let Some(state) = optimistic {
            inner.overlays.insert(
                id.to_string(),
                Overlay {
                    state,
                    action: Some(action_id),
                },
            );
        }

        debug!(id = %id, action = %action_id, kind = pending.kind.label(), "action queued");
        self.publish(&mut inner);
        Ok(pending)
    }

    /// Cancel a queued action. In-flight actions cannot be cancelled.
    pub(crate) fn cancel(&self, id: &str) -> Result<ActionId, DispatchError> {
        let mut inner = self.inner.lock();
        let Some(pending) = inner.pending.get(id).filter(|p| p.status.is_active()).cloned() else {
            return Err(DispatchError::NothingToCancel(id.to_string()));
        };
        if pending.status == ActionStatus::InFlight {
            return Err(DispatchError::ActionConflict {
                id: id.to_string(),
                pending: pending.id,
            });
        }

        inner.pending.remove(id);
        inner.drop_overlay_for(id, pending.id);
        self.publish(&mut inner);
        self.events.emit(Event::ActionResult {
            action_id: pending.id,
            entity: pending.entity,
            kind: pending.kind,
            outcome: ActionOutcome::Cancelled,
        });
        Ok(pending.id)
    }

    /// Move a queued action to in-flight. False if it was cancelled.
    pub(crate) fn start_flight(&self, action: ActionId) -> bool {
        let mut inner = self.inner.lock();
        let Some(id) = inner.find_action(action) else {
            return false;
        };
        let Some(pending) = inner.pending.get_mut(&id) else {
            return false;
        };
        if pending.status != ActionStatus::Queued {
            return false;
        }
        pending.status = ActionStatus::InFlight;
        self.publish(&mut inner);
        true
    }

    /// Record the adapter's answer for an in-flight action.
    pub(crate) fn resolve(&self, action: ActionId, result: Result<Option<String>, String>) {
        let mut inner = self.inner.lock();
        let Some(id) = inner.find_action(action) else {
            return;
        };
        let Some(pending) = inner.pending.get(&id).cloned() else {
            return;
        };

        let outcome = match result {
            Ok(output) => {
                if pending.kind == ActionKind::Remove {
                    inner.pending.remove(&id);
                    let removed = inner.remove_subtree(&id, Instant::now());
                    debug!(id = %id, count = removed.len(), "removed by action");
                } else if let Some(p) = inner.pending.get_mut(&id) {
                    p.status = ActionStatus::Succeeded {
                        completed_at: Instant::now(),
                    };
                }
                ActionOutcome::Succeeded { output }
            }
            Err(reason) => {
                inner.pending.remove(&id);
                inner.drop_overlay_for(&id, action);
                ActionOutcome::Failed { reason }
            }
        };

        self.publish(&mut inner);
        self.events.emit(Event::ActionResult {
            action_id: action,
            entity: id,
            kind: pending.kind,
            outcome,
        });
    }

    /// Track whether `session` is the open log stream for `id`. Closing a
    /// session that has already been replaced leaves the newer one alone.
    pub(crate) fn set_stream_open(&self, id: &str, session: u64, open: bool) {
        let mut inner = self.inner.lock();
        let changed = if open {
            inner.streams.insert(id.to_string(), session) != Some(session)
        } else if inner.streams.get(id) == Some(&session) {
            inner.streams.remove(id);
            true
        } else {
            false
        };
        if changed {
            self.publish(&mut inner);
        }
    }

    fn publish(&self, inner: &mut StoreInner) {
        let baseline = inner
            .baseline
            .clone()
            .unwrap_or_else(|| Arc::new(Snapshot::empty()));

        let displayed_entities = baseline
            .iter()
            .map(|e| match inner.overlays.get(&e.id) {
                Some(overlay) => e.clone().with_state(overlay.state),
                None => e.clone(),
            })
            .collect();
        let displayed = Arc::new(baseline.with_entities(displayed_entities));

        let published = diff::diff(
            Some(inner.displayed.as_ref()),
            &displayed,
            &HashMap::new(),
            DiffPolicy::immediate(),
        );

        inner.version += 1;
        inner.displayed = displayed.clone();

        let phases = inner
            .overlays
            .iter()
            .map(|(id, o)| {
                (
                    id.clone(),
                    EntityPhase::Optimistic {
                        state: o.state,
                        action: o.action,
                    },
                )
            })
            .collect();
        let view = ModelView::build(
            inner.version,
            inner.connectivity.clone(),
            displayed,
            &baseline,
            &phases,
            inner.streams.keys().cloned().collect(),
            inner.pending.clone(),
        );
        self.view_tx.send_replace(Arc::new(view));

        if !published.is_empty() {
            self.events.emit(Event::Changes(ChangeBatch {
                version: inner.version,
                changes: published.changes,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ChangeKind;
    use crate::events::{self, EventReceiver};
    use crate::model::Entity;
    use crate::view::Reachability;

    fn container(id: &str, state: LifecycleState) -> Entity {
        Entity::new(id, id, EntityKind::Container).with_state(state)
    }

    fn snap(seq: u64, entities: Vec<Entity>) -> Snapshot {
        Snapshot::new(seq, Instant::now(), entities)
    }

    fn store() -> (ModelStore, EventReceiver) {
        let (tx, rx) = events::channel();
        (ModelStore::new(tx, DiffPolicy::default()), rx)
    }

    fn change_batches(rx: &mut EventReceiver) -> Vec<ChangeBatch> {
        rx.drain()
            .into_iter()
            .filter_map(|e| match e.event {
                Event::Changes(batch) => Some(batch),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_snapshot_adds_all() {
        let (store, mut rx) = store();
        store.apply_snapshot(snap(1, vec![
            container("a", LifecycleState::Running),
            container("b", LifecycleState::Running),
        ]));

        let batches = change_batches(&mut rx);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].changes.len(), 2);
        assert!(batches[0].changes.iter().all(|c| c.kind == ChangeKind::Added));

        let view = store.current_view();
        assert_eq!(view.len(), 2);
        assert_eq!(view.version, batches[0].version);
    }

    #[test]
    fn test_missing_once_is_kept() {
        let (store, mut rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        rx.drain();

        store.apply_snapshot(snap(2, vec![]));
        assert!(change_batches(&mut rx).is_empty());
        assert!(store.current_view().contains("a"));

        store.apply_snapshot(snap(3, vec![]));
        let batches = change_batches(&mut rx);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].changes[0].kind, ChangeKind::Removed);
        assert!(!store.current_view().contains("a"));
    }

    #[test]
    fn test_removed_container_never_resurrects() {
        let (store, _rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        store.apply_snapshot(snap(2, vec![]));
        store.apply_snapshot(snap(3, vec![]));
        store.apply_snapshot(snap(4, vec![container("a", LifecycleState::Running)]));
        assert!(!store.current_view().contains("a"));
    }

    #[test]
    fn test_group_ids_can_return() {
        let (store, _rx) = store();
        let stack = || Entity::new("stack:shop", "shop", EntityKind::Stack);
        store.apply_snapshot(snap(1, vec![stack()]));
        store.apply_snapshot(snap(2, vec![]));
        store.apply_snapshot(snap(3, vec![]));
        store.apply_snapshot(snap(4, vec![stack()]));
        assert!(store.current_view().contains("stack:shop"));
    }

    #[test]
    fn test_unavailable_freezes_without_changes() {
        let (store, mut rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        rx.drain();

        store.mark_unavailable("socket closed");
        store.mark_unavailable("socket closed");

        let events: Vec<Event> = rx.drain().into_iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![Event::Runtime(Connectivity::Unavailable {
                reason: "socket closed".into()
            })]
        );

        let view = store.current_view();
        let a = view.get("a").unwrap();
        assert_eq!(a.entity.state, LifecycleState::Running);
        assert_eq!(a.reachability, Reachability::UnknownConnectivity);

        store.apply_snapshot(snap(2, vec![container("a", LifecycleState::Running)]));
        let events: Vec<Event> = rx.drain().into_iter().map(|e| e.event).collect();
        assert_eq!(events, vec![Event::Runtime(Connectivity::Connected)]);
        assert_eq!(
            store.current_view().get("a").unwrap().reachability,
            Reachability::Live
        );
    }

    #[test]
    fn test_manual_optimistic_and_rollback() {
        let (store, mut rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        rx.drain();

        store
            .apply_optimistic("a", LifecycleState::Restarting)
            .unwrap();
        let view = store.current_view();
        let a = view.get("a").unwrap();
        assert_eq!(a.entity.state, LifecycleState::Restarting);
        assert_eq!(a.observed_state, LifecycleState::Running);
        assert!(a.is_optimistic());

        assert!(store.rollback("a"));
        assert!(!store.rollback("a"));
        assert_eq!(
            store.current_view().get("a").unwrap().entity.state,
            LifecycleState::Running
        );
        assert_eq!(change_batches(&mut rx).len(), 2);

        assert_eq!(
            store.apply_optimistic("nope", LifecycleState::Running),
            Err(DispatchError::InvalidTarget("nope".into()))
        );
    }

    #[test]
    fn test_manual_optimistic_cleared_by_next_snapshot() {
        let (store, _rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        store.apply_optimistic("a", LifecycleState::Exited).unwrap();
        store.apply_snapshot(snap(2, vec![container("a", LifecycleState::Running)]));
        let view = store.current_view();
        assert_eq!(view.get("a").unwrap().entity.state, LifecycleState::Running);
        assert!(!view.get("a").unwrap().is_optimistic());
    }

    #[test]
    fn test_admit_conflict_and_failure_rollback() {
        let (store, mut rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        rx.drain();

        let first = store.admit("a", ActionKind::Stop).unwrap();
        assert_eq!(
            store.admit("a", ActionKind::Start),
            Err(DispatchError::ActionConflict {
                id: "a".into(),
                pending: first.id
            })
        );
        assert_eq!(
            store.current_view().get("a").unwrap().entity.state,
            LifecycleState::Exited
        );

        assert!(store.start_flight(first.id));
        store.resolve(first.id, Err("permission denied".into()));

        let view = store.current_view();
        assert_eq!(view.get("a").unwrap().entity.state, LifecycleState::Running);
        assert!(view.pending_for("a").is_none());

        let results: Vec<ActionOutcome> = rx
            .drain()
            .into_iter()
            .filter_map(|e| match e.event {
                Event::ActionResult { outcome, .. } => Some(outcome),
                _ => None,
            })
            .collect();
        assert_eq!(
            results,
            vec![ActionOutcome::Failed {
                reason: "permission denied".into()
            }]
        );

        assert!(store.admit("a", ActionKind::Start).is_ok());
    }

    #[test]
    fn test_success_waits_for_confirming_snapshot() {
        let (store, _rx) = store();
        let before = Instant::now();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));

        let action = store.admit("a", ActionKind::Restart).unwrap();
        store.start_flight(action.id);
        store.resolve(action.id, Ok(None));

        // Poll that started before the action completed does not clear it
        store.apply_snapshot(Snapshot::new(2, before, vec![container("a", LifecycleState::Running)]));
        assert_eq!(
            store.current_view().get("a").unwrap().entity.state,
            LifecycleState::Restarting
        );

        store.apply_snapshot(snap(3, vec![container("a", LifecycleState::Running)]));
        let view = store.current_view();
        assert_eq!(view.get("a").unwrap().entity.state, LifecycleState::Running);
        assert!(view.pending_for("a").is_none());
    }

    #[test]
    fn test_cancel_queued_only() {
        let (store, mut rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        rx.drain();

        assert_eq!(
            store.cancel("a"),
            Err(DispatchError::NothingToCancel("a".into()))
        );

        let queued = store.admit("a", ActionKind::Stop).unwrap();
        assert_eq!(store.cancel("a"), Ok(queued.id));
        assert!(!store.start_flight(queued.id));
        assert_eq!(
            store.current_view().get("a").unwrap().entity.state,
            LifecycleState::Running
        );

        let flying = store.admit("a", ActionKind::Stop).unwrap();
        assert!(store.start_flight(flying.id));
        assert!(matches!(
            store.cancel("a"),
            Err(DispatchError::ActionConflict { .. })
        ));
    }

    #[test]
    fn test_successful_remove_drops_subtree() {
        let (store, mut rx) = store();
        store.apply_snapshot(snap(1, vec![
            Entity::new("service:s/web", "web", EntityKind::Service),
            container("c1", LifecycleState::Running).with_parent("service:s/web"),
            container("c2", LifecycleState::Running),
        ]));
        rx.drain();

        let action = store.admit("service:s/web", ActionKind::Remove).unwrap();
        store.start_flight(action.id);
        store.resolve(action.id, Ok(None));

        let view = store.current_view();
        assert!(!view.contains("service:s/web"));
        assert!(!view.contains("c1"));
        assert!(view.contains("c2"));

        let removed: Vec<String> = change_batches(&mut rx)
            .into_iter()
            .flat_map(|b| b.changes)
            .filter(|c| c.kind == ChangeKind::Removed)
            .map(|c| c.id)
            .collect();
        assert_eq!(removed, vec!["service:s/web".to_string(), "c1".to_string()]);
    }

    #[test]
    fn test_stream_status_is_published() {
        let (store, _rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        store.set_stream_open("a", 1, true);
        assert!(store.current_view().is_stream_open("a"));
        store.set_stream_open("a", 1, false);
        assert!(!store.current_view().is_stream_open("a"));
    }

    #[test]
    fn test_late_close_of_old_session_keeps_new_stream() {
        let (store, _rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        store.set_stream_open("a", 1, true);
        store.set_stream_open("a", 2, true);
        store.set_stream_open("a", 1, false);
        assert!(store.current_view().is_stream_open("a"));
        store.set_stream_open("a", 2, false);
        assert!(!store.current_view().is_stream_open("a"));
    }

    #[test]
    fn test_removed_stack_not_restored_by_earlier_poll() {
        let (store, _rx) = store();
        let before = Instant::now();
        let listing = || {
            vec![
                Entity::new("stack:shop", "shop", EntityKind::Stack),
                container("c1", LifecycleState::Running).with_parent("stack:shop"),
            ]
        };
        store.apply_snapshot(snap(1, listing()));

        let action = store.admit("stack:shop", ActionKind::Remove).unwrap();
        store.start_flight(action.id);
        store.resolve(action.id, Ok(None));

        // Listing taken while the remove was still running
        store.apply_snapshot(Snapshot::new(2, before, listing()));
        let view = store.current_view();
        assert!(!view.contains("stack:shop"));
        assert!(!view.contains("c1"));

        // A project recreated later may reuse the derived id
        store.apply_snapshot(snap(3, vec![Entity::new("stack:shop", "shop", EntityKind::Stack)]));
        assert!(store.current_view().contains("stack:shop"));
    }

    #[test]
    fn test_tombstones_expire_once_runtime_forgets_the_id() {
        let (store, _rx) = store();
        let start = Instant::now();
        store.apply_snapshot(Snapshot::new(1, start, vec![container("a", LifecycleState::Running)]));
        store.apply_snapshot(Snapshot::new(2, start, vec![]));
        store.apply_snapshot(Snapshot::new(3, start, vec![]));
        assert_eq!(store.inner.lock().tombstones.len(), 1);

        // Still reported: the tombstone stays fresh and keeps filtering
        let later = start + Duration::from_secs(300);
        store.apply_snapshot(Snapshot::new(4, later, vec![container("a", LifecycleState::Running)]));
        assert!(!store.current_view().contains("a"));

        store.apply_snapshot(Snapshot::new(5, later + TOMBSTONE_RETENTION, vec![]));
        assert_eq!(store.inner.lock().tombstones.len(), 1);
        store.apply_snapshot(Snapshot::new(6, later + TOMBSTONE_RETENTION + Duration::from_secs(1), vec![]));
        assert!(store.inner.lock().tombstones.is_empty());
    }

    #[test]
    fn test_actions_rejected_while_runtime_unavailable() {
        let (store, mut rx) = store();
        store.apply_snapshot(snap(1, vec![container("a", LifecycleState::Running)]));
        store.mark_unavailable("down");
        rx.drain();

        assert_eq!(
            store.admit("a", ActionKind::Stop),
            Err(DispatchError::RuntimeUnavailable)
        );
        assert_eq!(
            store.apply_optimistic("a", LifecycleState::Exited),
            Err(DispatchError::RuntimeUnavailable)
        );
        assert!(change_batches(&mut rx).is_empty());
        assert!(store.current_view().pending_for("a").is_none());

        store.apply_snapshot(snap(2, vec![container("a", LifecycleState::Running)]));
        assert!(store.admit("a", ActionKind::Stop).is_ok());
    }
}
