//! Read-only model views
//!
//! A [`ModelView`] is built by the store after every mutation and published
//! whole. Readers never see a view under construction.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::events::{ActionId, Connectivity};
use crate::model::{ActionKind, Entity, EntityId, EntityKind, LifecycleState};
use crate::snapshot::Snapshot;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionStatus {
    Queued,
    InFlight,
    /// Waiting for a snapshot taken after `completed_at` to confirm it
    Succeeded { completed_at: Instant },
    Failed { reason: String },
    Cancelled,
}

impl ActionStatus {
    /// Queued or in flight
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InFlight)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in-flight",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PendingAction {
    pub id: ActionId,
    pub entity: EntityId,
    pub kind: ActionKind,
    pub status: ActionStatus,
    /// State shown while the action is unconfirmed
    pub optimistic: Option<LifecycleState>,
    pub submitted_at: SystemTime,
    /// The target disappeared from the model while this was pending
    pub target_removed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reachability {
    Live,
    UnknownConnectivity,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityPhase {
    Observed,
    Optimistic {
        state: LifecycleState,
        action: Option<ActionId>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntityView {
    /// Displayed entity, optimistic state applied
    pub entity: Entity,
    /// State from the last authoritative snapshot
    pub observed_state: LifecycleState,
    pub phase: EntityPhase,
    pub reachability: Reachability,
}

impl EntityView {
    pub fn is_optimistic(&self) -> bool {
        matches!(self.phase, EntityPhase::Optimistic { .. })
    }
}

/// Counts shown in the dashboard header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub stacks: usize,
    pub containers: usize,
    pub running: usize,
    pub exited: usize,
}

#[derive(Clone, Debug)]
pub struct ModelView {
    pub version: u64,
    pub connectivity: Connectivity,
    displayed: Arc<Snapshot>,
    entries: Vec<EntityView>,
    index: HashMap<EntityId, usize>,
    children: HashMap<EntityId, Vec<EntityId>>,
    roots: Vec<EntityId>,
    open_streams: BTreeSet<EntityId>,
    pending: HashMap<EntityId, PendingAction>,
}

impl ModelView {
    pub fn empty() -> Self {
        Self::build(
            0,
            Connectivity::Connected,
            Arc::new(Snapshot::empty()),
            &Snapshot::empty(),
            &HashMap::new(),
            BTreeSet::new(),
            HashMap::new(),
        )
    }

    /// `overlays` maps entity ids to their optimistic phase; `observed`
    /// holds the authoritative values.
    pub(crate) fn build(
        version: u64,
        connectivity: Connectivity,
        displayed: Arc<Snapshot>,
        observed: &Snapshot,
        overlays: &HashMap<EntityId, EntityPhase>,
        open_streams: BTreeSet<EntityId>,
        pending: HashMap<EntityId, PendingAction>,
    ) -> Self {
        let reachability = if connectivity.is_connected() {
            Reachability::Live
        } else {
            Reachability::UnknownConnectivity
        };

        let mut entries = Vec::with_capacity(displayed.len());
        let mut index = HashMap::with_capacity(displayed.len());
        let mut children: HashMap<EntityId, Vec<EntityId>> = HashMap::new();
        let mut roots = Vec::new();

        for entity in displayed.iter() {
            match &entity.parent {
                Some(parent) if displayed.contains(parent) => {
                    children
                        .entry(parent.clone())
                        .or_default()
                        .push(entity.id.clone());
                }
                _ => roots.push(entity.id.clone()),
            }

            index.insert(entity.id.clone(), entries.len());
            entries.push(EntityView {
                entity: entity.clone(),
                observed_state: observed
                    .get(&entity.id)
                    .map(|e| e.state)
                    .unwrap_or(entity.state),
                phase: overlays
                    .get(&entity.id)
                    .cloned()
                    .unwrap_or(EntityPhase::Observed),
                reachability,
            });
        }

        Self {
            version,
            connectivity,
            displayed,
            entries,
            index,
            children,
            roots,
            open_streams,
            pending,
        }
    }

    pub(crate) fn displayed(&self) -> &Arc<Snapshot> {
        &self.displayed
    }

    pub fn snapshot_seq(&self) -> u64 {
        self.displayed.seq()
    }

    pub fn taken_at(&self) -> SystemTime {
        self.displayed.taken_at()
    }

    pub fn get(&self, id: &str) -> Option<&EntityView> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Entities in display order
    pub fn entities(&self) -> impl Iterator<Item = &EntityView> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn roots(&self) -> &[EntityId] {
        &self.roots
    }

    pub fn children(&self, id: &str) -> &[EntityId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Depth-first walk: each root followed by its descendants, with depth
    pub fn tree(&self) -> Vec<(usize, &EntityView)> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut stack: Vec<(usize, &EntityId)> = self.roots.iter().rev().map(|id| (0, id)).collect();
        while let Some((depth, id)) = stack.pop() {
            if let Some(view) = self.get(id) {
                out.push((depth, view));
            }
            for child in self.children(id).iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }

    /// Find by id, then exact name, then id prefix
    pub fn find(&self, needle: &str) -> Option<&EntityView> {
        self.get(needle)
            .or_else(|| self.entries.iter().find(|e| e.entity.name == needle))
            .or_else(|| {
                let mut matches = self.entries.iter().filter(|e| e.entity.id.starts_with(needle));
                match (matches.next(), matches.next()) {
                    (Some(only), None) => Some(only),
                    _ => None,
                }
            })
    }

    pub fn is_stream_open(&self, id: &str) -> bool {
        self.open_streams.contains(id)
    }

    pub fn open_streams(&self) -> impl Iterator<Item = &EntityId> {
        self.open_streams.iter()
    }

    pub fn pending_for(&self, id: &str) -> Option<&PendingAction> {
        self.pending.get(id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingAction> {
        self.pending.values()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for view in &self.entries {
            match view.entity.kind {
                EntityKind::Stack => summary.stacks += 1,
                EntityKind::Container => {
                    summary.containers += 1;
                    match view.entity.state {
                        LifecycleState::Running => summary.running += 1,
                        LifecycleState::Exited => summary.exited += 1,
                        _ => {}
                    }
                }
                EntityKind::Service => {}
            }
        }
        summary
    }
}
