//! Diff engine
//!
//! Compares two snapshots by identity and produces one [`Change`] per entity
//! whose rendered fields differ. Removals come first, then updates, then
//! additions. Removals and updates follow the previous snapshot's order
//! (first-seen order, since the store keeps its baseline that way) and
//! additions follow the next snapshot's order.
//!
//! An entity must be missing from `removal_misses` consecutive snapshots
//! before it is reported removed. Until then it is carried forward with its
//! last known value.

use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Entity, EntityId, HealthStatus, LifecycleState, ResourceSample};
use crate::snapshot::Snapshot;

/// Fields the dashboard renders. Nothing else produces a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Name,
    State,
    Health,
    Resources,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldValue {
    Name(String),
    State(LifecycleState),
    Health(Option<HealthStatus>),
    Resources(Option<ResourceSample>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDelta {
    pub field: Field,
    pub old: Option<FieldValue>,
    pub new: Option<FieldValue>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Updated,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Change {
    pub id: EntityId,
    pub kind: ChangeKind,
    pub deltas: Vec<FieldDelta>,
}

impl Change {
    pub fn delta(&self, field: Field) -> Option<&FieldDelta> {
        self.deltas.iter().find(|d| d.field == field)
    }

    /// New lifecycle state carried by this change, if the state changed
    pub fn new_state(&self) -> Option<LifecycleState> {
        match self.delta(Field::State)?.new.as_ref()? {
            FieldValue::State(s) => Some(*s),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiffPolicy {
    /// Consecutive snapshots an entity must be missing from before removal.
    /// 1 removes on the first miss.
    pub removal_misses: u32,
}

impl DiffPolicy {
    pub fn immediate() -> Self {
        Self { removal_misses: 1 }
    }
}

impl Default for DiffPolicy {
    fn default() -> Self {
        Self { removal_misses: 2 }
    }
}

/// Result of one diff
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Diff {
    pub changes: Vec<Change>,
    /// Entities missing from `next` but not yet removed, with their running
    /// miss count. Feed this back in as `misses` on the following diff.
    pub misses: HashMap<EntityId, u32>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn removed(&self) -> impl Iterator<Item = &EntityId> {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Removed)
            .map(|c| &c.id)
    }
}

fn values(e: &Entity) -> [FieldValue; 4] {
    [
        FieldValue::Name(e.name.clone()),
        FieldValue::State(e.state),
        FieldValue::Health(e.health),
        FieldValue::Resources(e.resources.clone()),
    ]
}

const FIELDS: [Field; 4] = [Field::Name, Field::State, Field::Health, Field::Resources];

/// Field-level deltas between two versions of the same entity
pub fn field_deltas(old: &Entity, new: &Entity) -> Vec<FieldDelta> {
    let mut out = Vec::new();
    if old.name != new.name {
        out.push(FieldDelta {
            field: Field::Name,
            old: Some(FieldValue::Name(old.name.clone())),
            new: Some(FieldValue::Name(new.name.clone())),
        });
    }
    if old.state != new.state {
        out.push(FieldDelta {
            field: Field::State,
            old: Some(FieldValue::State(old.state)),
            new: Some(FieldValue::State(new.state)),
        });
    }
    if old.health != new.health {
        out.push(FieldDelta {
            field: Field::Health,
            old: Some(FieldValue::Health(old.health)),
            new: Some(FieldValue::Health(new.health)),
        });
    }
    if old.resources != new.resources {
        out.push(FieldDelta {
            field: Field::Resources,
            old: Some(FieldValue::Resources(old.resources.clone())),
            new: Some(FieldValue::Resources(new.resources.clone())),
        });
    }
    out
}

fn added(e: &Entity) -> Change {
    Change {
        id: e.id.clone(),
        kind: ChangeKind::Added,
        deltas: FIELDS
            .into_iter()
            .zip(values(e))
            .map(|(field, v)| FieldDelta {
                field,
                old: None,
                new: Some(v),
            })
            .collect(),
    }
}

fn removed(e: &Entity) -> Change {
    Change {
        id: e.id.clone(),
        kind: ChangeKind::Removed,
        deltas: FIELDS
            .into_iter()
            .zip(values(e))
            .map(|(field, v)| FieldDelta {
                field,
                old: Some(v),
                new: None,
            })
            .collect(),
    }
}

/// Compute the changes from `prev` to `next`.
///
/// Pure: the same inputs always give the same output. `misses` holds the
/// miss counts returned by the previous diff.
pub fn diff(
    prev: Option<&Snapshot>,
    next: &Snapshot,
    misses: &HashMap<EntityId, u32>,
    policy: DiffPolicy,
) -> Diff {
    let mut removals = Vec::new();
    let mut updates = Vec::new();
    let mut additions = Vec::new();
    let mut still_missing = HashMap::new();

    if let Some(prev) = prev {
        for old in prev.iter() {
            match next.get(&old.id) {
                Some(new) => {
                    let deltas = field_deltas(old, new);
                    if !deltas.is_empty() {
                        updates.push(Change {
                            id: old.id.clone(),
                            kind: ChangeKind::Updated,
                            deltas,
                        });
                    }
                }
                None => {
                    let count = misses.get(&old.id).copied().unwrap_or(0) + 1;
                    if count >= policy.removal_misses.max(1) {
                        removals.push(removed(old));
                    } else {
                        still_missing.insert(old.id.clone(), count);
                    }
                }
            }
        }
    }

    for new in next.iter() {
        if !prev.is_some_and(|p| p.contains(&new.id)) {
            additions.push(added(new));
        }
    }

    let mut changes = removals;
    changes.append(&mut updates);
    changes.append(&mut additions);

    Diff {
        changes,
        misses: still_missing,
    }
}

/// The entity list that becomes the new baseline after `diff`: everything
/// in `prev` that survived (updated to its `next` value, or carried forward
/// unchanged while missing), in `prev` order, followed by additions in
/// `next` order.
pub fn carry_forward(prev: Option<&Snapshot>, next: &Snapshot, result: &Diff) -> Vec<Entity> {
    let mut out = Vec::with_capacity(next.len() + result.misses.len());
    if let Some(prev) = prev {
        for old in prev.iter() {
            if let Some(new) = next.get(&old.id) {
                out.push(new.clone());
            } else if result.misses.contains_key(&old.id) {
                out.push(old.clone());
            }
        }
    }
    for new in next.iter() {
        if !prev.is_some_and(|p| p.contains(&new.id)) {
            out.push(new.clone());
        }
    }
    out
}
