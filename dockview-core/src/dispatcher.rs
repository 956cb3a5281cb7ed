//! Action dispatcher
//!
//! `submit` validates and records the action synchronously, then hands the
//! adapter call to its own task. Calls for different entities run
//! concurrently up to a permit limit; calls for one entity never overlap
//! because the store admits a single active action per entity.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::adapter::RuntimeAdapter;
use crate::error::DispatchError;
use crate::events::ActionId;
use crate::model::ActionKind;
use crate::store::ModelStore;
use crate::view::PendingAction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchSettings {
    pub action_timeout: Duration,
    pub max_concurrent: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            action_timeout: Duration::from_secs(30),
            max_concurrent: 4,
        }
    }
}

pub struct ActionDispatcher {
    adapter: Arc<dyn RuntimeAdapter>,
    store: Arc<ModelStore>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    tracker: TaskTracker,
    /// Wakes the poller after a successful action
    poll_now: Arc<Notify>,
}

impl ActionDispatcher {
    pub fn new(
        adapter: Arc<dyn RuntimeAdapter>,
        store: Arc<ModelStore>,
        settings: DispatchSettings,
        poll_now: Arc<Notify>,
    ) -> Self {
        Self {
            adapter,
            store,
            permits: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            timeout: settings.action_timeout,
            tracker: TaskTracker::new(),
            poll_now,
        }
    }

    /// Queue `kind` against `id`. The optimistic state is visible in the
    /// model before this returns.
    pub fn submit(&self, id: &str, kind: ActionKind) -> Result<PendingAction, DispatchError> {
        if self.tracker.is_closed() {
            return Err(DispatchError::ShuttingDown);
        }

        let pending = self.store.admit(id, kind)?;
        info!(id = %id, action = %pending.id, kind = pending.kind.label(), "action submitted");

        let adapter = self.adapter.clone();
        let store = self.store.clone();
        let permits = self.permits.clone();
        let poll_now = self.poll_now.clone();
        let timeout = self.timeout;
        let action = pending.id;
        let entity = pending.entity.clone();
        let kind = pending.kind.clone();

        self.tracker.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    store.resolve(action, Err("dispatcher closed".to_string()));
                    return;
                }
            };

            if !store.start_flight(action) {
                debug!(action = %action, "action cancelled before it started");
                return;
            }

            let result = match tokio::time::timeout(timeout, adapter.perform_action(&entity, &kind)).await {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(err)) => Err(err.to_string()),
                Err(_) => Err(format!("timed out after {}s", timeout.as_secs_f32())),
            };

            match &result {
                Ok(_) => info!(id = %entity, action = %action, "action succeeded"),
                Err(reason) => warn!(id = %entity, action = %action, %reason, "action failed"),
            }

            let succeeded = result.is_ok();
            store.resolve(action, result);
            if succeeded {
                poll_now.notify_one();
            }
        });

        Ok(pending)
    }

    /// Cancel the queued action for `id`.
    pub fn cancel(&self, id: &str) -> Result<ActionId, DispatchError> {
        let action = self.store.cancel(id)?;
        info!(id = %id, action = %action, "action cancelled");
        Ok(action)
    }

    /// Number of action tasks that have not finished
    pub fn in_progress(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting actions and wait for running calls to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
