//! Snapshot poller
//!
//! Each tick reads the full entity list plus one stats sample per running
//! container and hands the result to the store as one snapshot. At most one
//! poll runs at a time; a slow poll delays the next tick instead of
//! overlapping it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::adapter::{AdapterError, RuntimeAdapter};
use crate::model::{EntityId, EntityKind, ResourceSample};
use crate::snapshot::Snapshot;
use crate::store::ModelStore;

pub struct SnapshotPoller {
    adapter: Arc<dyn RuntimeAdapter>,
    store: Arc<ModelStore>,
    interval: Duration,
    seq: u64,
    /// Last good sample per container, reused (marked stale) when a read fails
    last_samples: HashMap<EntityId, ResourceSample>,
}

impl SnapshotPoller {
    pub fn new(adapter: Arc<dyn RuntimeAdapter>, store: Arc<ModelStore>, interval: Duration) -> Self {
        Self {
            adapter,
            store,
            interval,
            seq: 0,
            last_samples: HashMap::new(),
        }
    }

    /// Run one poll cycle. Returns the snapshot sequence number, or the
    /// listing error after the store has been told the runtime is gone.
    pub async fn poll_once(&mut self) -> Result<u64, AdapterError> {
        let started = Instant::now();

        let raw = match self.adapter.list_entities().await {
            Ok(raw) => raw,
            Err(err) => {
                self.store.mark_unavailable(&err.to_string());
                return Err(err);
            }
        };

        let running: Vec<&EntityId> = raw
            .iter()
            .filter(|e| e.kind == EntityKind::Container && e.state.is_running())
            .map(|e| &e.id)
            .collect();

        let adapter = &self.adapter;
        let reads = join_all(
            running
                .iter()
                .map(|id| async move { ((*id).clone(), adapter.read_stats(id).await) }),
        )
        .await;

        let mut samples: HashMap<EntityId, ResourceSample> = HashMap::with_capacity(reads.len());
        for (id, read) in reads {
            match read {
                Ok(sample) => {
                    self.last_samples.insert(id.clone(), sample.clone());
                    samples.insert(id, sample);
                }
                Err(err) => {
                    debug!(id = %id, error = %err, "stats read failed");
                    if let Some(prev) = self.last_samples.get(&id) {
                        samples.insert(id, prev.clone().into_stale());
                    }
                }
            }
        }
        self.last_samples.retain(|id, _| samples.contains_key(id));

        // Attribute each container sample to every group above it
        let parents: HashMap<&str, &str> = raw
            .iter()
            .filter_map(|e| e.parent.as_deref().map(|p| (e.id.as_str(), p)))
            .collect();
        let mut group_members: HashMap<&str, Vec<&ResourceSample>> = HashMap::new();
        for (id, sample) in &samples {
            let mut cursor = parents.get(id.as_str()).copied();
            while let Some(group) = cursor {
                group_members.entry(group).or_default().push(sample);
                cursor = parents.get(group).copied();
            }
        }
        let group_samples: HashMap<EntityId, ResourceSample> = group_members
            .into_iter()
            .filter_map(|(id, members)| ResourceSample::aggregate(members).map(|s| (id.to_string(), s)))
            .collect();

        let entities = raw
            .into_iter()
            .map(|e| {
                let resources = match e.kind {
                    EntityKind::Container => samples.get(&e.id).cloned(),
                    EntityKind::Service | EntityKind::Stack => group_samples.get(&e.id).cloned(),
                };
                e.into_entity(resources)
            })
            .collect();

        self.seq += 1;
        let snapshot = Snapshot::new(self.seq, started, entities);
        debug!(
            seq = self.seq,
            entities = snapshot.len(),
            stats = samples.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "poll complete"
        );
        self.store.apply_snapshot(snapshot);
        Ok(self.seq)
    }

    /// Poll on every tick until `shutdown` fires. `poll_now` triggers an
    /// extra poll and restarts the interval. Shutdown is only observed
    /// between polls.
    pub async fn run(mut self, shutdown: CancellationToken, poll_now: Arc<Notify>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately; the session has already
        // taken the initial snapshot.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
                _ = poll_now.notified() => ticker.reset(),
            }
            if shutdown.is_cancelled() {
                break;
            }
            // Failures are reflected in the store
            let _ = self.poll_once().await;
        }
        debug!("poller stopped");
    }
}
