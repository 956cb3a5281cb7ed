//! Resource history for sparklines
//!
//! A fixed window of recent CPU and memory readings per entity, fed from
//! `Resources` deltas on the event bus. Not a time-series store: old points
//! fall off the front and nothing is persisted.

use std::collections::{HashMap, VecDeque};

use crate::diff::{ChangeKind, Field, FieldValue};
use crate::events::ChangeBatch;
use crate::model::{EntityId, ResourceSample};

/// (t_seconds, value) pairs with fixed capacity
#[derive(Clone, Debug)]
pub struct Series {
    pub cap: usize,
    pub points: VecDeque<(f64, f64)>,
}

impl Series {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            points: VecDeque::with_capacity(cap),
        }
    }

    pub fn push(&mut self, t: f64, v: f64) {
        if self.points.len() >= self.cap {
            self.points.pop_front();
        }
        self.points.push_back((t, v));
    }

    pub fn latest(&self) -> Option<f64> {
        self.points.back().map(|(_, v)| *v)
    }

    pub fn value_bounds(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let values = || self.points.iter().map(|(_, v)| *v);
        Some((
            values().fold(f64::INFINITY, f64::min),
            values().fold(f64::NEG_INFINITY, f64::max),
        ))
    }

    /// Values scaled by `scale` and rounded, for a ratatui `Sparkline`
    pub fn sparkline(&self, scale: f64) -> Vec<u64> {
        self.points
            .iter()
            .map(|(_, v)| (v * scale).max(0.0).round() as u64)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

impl Default for Series {
    fn default() -> Self {
        // 60 polls at the default 2s interval
        Self::new(60)
    }
}

#[derive(Clone, Debug)]
pub struct ResourceHistory {
    cap: usize,
    cpu: HashMap<EntityId, Series>,
    /// Memory in MiB
    mem: HashMap<EntityId, Series>,
}

impl ResourceHistory {
    pub fn new() -> Self {
        Self::with_capacity(60)
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            cap,
            cpu: HashMap::new(),
            mem: HashMap::new(),
        }
    }

    pub fn record(&mut self, t: f64, id: &EntityId, sample: &ResourceSample) {
        if let Some(cpu) = sample.cpu_percent {
            self.cpu
                .entry(id.clone())
                .or_insert_with(|| Series::new(self.cap))
                .push(t, cpu);
        }
        if let Some(used) = sample.memory_used {
            self.mem
                .entry(id.clone())
                .or_insert_with(|| Series::new(self.cap))
                .push(t, used as f64 / (1024.0 * 1024.0));
        }
    }

    /// Fold one batch of changes in. Removed entities are forgotten.
    pub fn apply(&mut self, t: f64, batch: &ChangeBatch) {
        for change in &batch.changes {
            if change.kind == ChangeKind::Removed {
                self.forget(&change.id);
                continue;
            }
            if let Some(delta) = change.delta(Field::Resources) {
                if let Some(FieldValue::Resources(Some(sample))) = &delta.new {
                    self.record(t, &change.id, sample);
                }
            }
        }
    }

    pub fn forget(&mut self, id: &str) {
        self.cpu.remove(id);
        self.mem.remove(id);
    }

    pub fn cpu(&self, id: &str) -> Option<&Series> {
        self.cpu.get(id)
    }

    pub fn mem(&self, id: &str) -> Option<&Series> {
        self.mem.get(id)
    }
}

impl Default for ResourceHistory {
    fn default() -> Self {
        Self::new()
    }
}
