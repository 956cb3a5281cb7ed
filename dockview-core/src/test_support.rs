//! In-memory adapter for unit tests

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};

use crate::adapter::{AdapterError, LogByteStream, LogOptions, RawEntity, RuntimeAdapter};
use crate::model::{ActionKind, EntityId, EntityKind, LifecycleState, ResourceSample};

pub type LogFeed = mpsc::UnboundedSender<Result<Vec<u8>, AdapterError>>;

#[derive(Default)]
pub struct ScriptedAdapter {
    listing: Mutex<Option<Result<Vec<RawEntity>, AdapterError>>>,
    stats: Mutex<HashMap<EntityId, Result<ResourceSample, AdapterError>>>,
    logs: Mutex<HashMap<EntityId, mpsc::UnboundedReceiver<Result<Vec<u8>, AdapterError>>>>,
    failures: Mutex<HashMap<EntityId, AdapterError>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    calls: Mutex<Vec<(EntityId, ActionKind)>>,
    log_requests: Mutex<Vec<(EntityId, LogOptions)>>,
}

pub fn raw(id: &str, state: LifecycleState) -> RawEntity {
    RawEntity {
        id: id.to_string(),
        name: id.to_string(),
        kind: EntityKind::Container,
        state,
        health: None,
        parent: None,
        image: None,
        status_text: String::new(),
        config_file: None,
    }
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_listing(&self, entities: Vec<RawEntity>) {
        *self.listing.lock() = Some(Ok(entities));
    }

    pub fn set_unreachable(&self, reason: &str) {
        *self.listing.lock() = Some(Err(AdapterError::RuntimeUnavailable(reason.to_string())));
    }

    pub fn set_stats(&self, id: &str, stats: Result<ResourceSample, AdapterError>) {
        self.stats.lock().insert(id.to_string(), stats);
    }

    /// Sender side of the next log stream opened for `id`
    pub fn log_feed(&self, id: &str) -> LogFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.logs.lock().insert(id.to_string(), rx);
        tx
    }

    pub fn fail_action(&self, id: &str, err: AdapterError) {
        self.failures.lock().insert(id.to_string(), err);
    }

    /// Block every action call until a permit is added to the returned gate
    pub fn hold_actions(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    pub fn action_calls(&self) -> Vec<(EntityId, ActionKind)> {
        self.calls.lock().clone()
    }

    pub fn log_requests(&self) -> Vec<(EntityId, LogOptions)> {
        self.log_requests.lock().clone()
    }
}

#[async_trait]
impl RuntimeAdapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn list_entities(&self) -> Result<Vec<RawEntity>, AdapterError> {
        self.listing.lock().clone().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn read_stats(&self, id: &EntityId) -> Result<ResourceSample, AdapterError> {
        self.stats.lock().get(id).cloned().unwrap_or_else(|| {
            Err(AdapterError::StatsUnavailable {
                id: id.clone(),
                reason: "no stats scripted".into(),
            })
        })
    }

    async fn stream_logs(&self, id: &EntityId, options: &LogOptions) -> Result<LogByteStream, AdapterError> {
        self.log_requests.lock().push((id.clone(), options.clone()));
        let rx = self.logs.lock().remove(id).ok_or_else(|| AdapterError::StreamError {
            id: id.clone(),
            reason: "no log feed scripted".into(),
        })?;
        Ok(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }

    async fn perform_action(&self, id: &EntityId, action: &ActionKind) -> Result<Option<String>, AdapterError> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.calls.lock().push((id.clone(), action.clone()));
        if let Some(err) = self.failures.lock().get(id).cloned() {
            return Err(err);
        }
        match action {
            ActionKind::Exec { command } => Ok(Some(format!("ran {}", command.join(" ")))),
            _ => Ok(None),
        }
    }
}
