use std::collections::HashMap;
use std::time::{Instant, SystemTime};

use crate::model::{Entity, EntityId};

/// One atomic, versioned full-state read.
///
/// Entities keep the order they were given in; ids are unique (later
/// duplicates are dropped). A snapshot is never modified after construction.
#[derive(Clone, Debug)]
pub struct Snapshot {
    seq: u64,
    taken_at: SystemTime,
    started: Instant,
    entities: Vec<Entity>,
    index: HashMap<EntityId, usize>,
}

impl Snapshot {
    /// `started` is when the poll that produced this snapshot began.
    pub fn new(seq: u64, started: Instant, entities: Vec<Entity>) -> Self {
        let mut index = HashMap::with_capacity(entities.len());
        let mut unique = Vec::with_capacity(entities.len());
        for entity in entities {
            if index.contains_key(&entity.id) {
                continue;
            }
            index.insert(entity.id.clone(), unique.len());
            unique.push(entity);
        }

        Self {
            seq,
            taken_at: SystemTime::now(),
            started,
            entities: unique,
            index,
        }
    }

    /// Same seq and timestamps, different entity list
    pub fn with_entities(&self, entities: Vec<Entity>) -> Self {
        let mut derived = Self::new(self.seq, self.started, entities);
        derived.taken_at = self.taken_at;
        derived
    }

    pub fn empty() -> Self {
        Self::new(0, Instant::now(), Vec::new())
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&i| &self.entities[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, LifecycleState};

    #[test]
    fn test_duplicates_keep_first() {
        let snap = Snapshot::new(
            1,
            Instant::now(),
            vec![
                Entity::new("a", "first", EntityKind::Container),
                Entity::new("b", "b", EntityKind::Container),
                Entity::new("a", "second", EntityKind::Container).with_state(LifecycleState::Dead),
            ],
        );

        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get("a").unwrap().name, "first");
        assert_eq!(snap.position("b"), Some(1));
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = Snapshot::empty();
        assert!(snap.is_empty());
        assert!(!snap.contains("a"));
        assert_eq!(snap.seq(), 0);
    }
}
