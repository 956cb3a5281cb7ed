//! Runtime adapter boundary
//!
//! The adapter is the only component that talks to the container engine.
//! It turns whatever the engine returns into [`RawEntity`] values and raw log
//! bytes, and performs lifecycle actions. It knows nothing about the UI or
//! the model store.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ActionKind, Entity, EntityId, EntityKind, HealthStatus, LifecycleState, ResourceSample};

/// Errors that can cross the adapter boundary
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The engine cannot be reached at all (socket down, daemon stopped)
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    /// Stats could not be read for one entity
    #[error("stats unavailable for {id}: {reason}")]
    StatsUnavailable { id: EntityId, reason: String },
    /// A log stream could not be opened or broke mid-read
    #[error("log stream for {id} failed: {reason}")]
    StreamError { id: EntityId, reason: String },
    /// The engine refused or failed an action; the reason is shown verbatim
    #[error("{0}")]
    ActionError(String),
}

/// An entity exactly as the adapter reports it, before resource stats are
/// attached by the poller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    pub id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub state: LifecycleState,
    pub health: Option<HealthStatus>,
    pub parent: Option<EntityId>,
    pub image: Option<String>,
    pub status_text: String,
    pub config_file: Option<String>,
}

impl RawEntity {
    pub fn into_entity(self, resources: Option<ResourceSample>) -> Entity {
        Entity {
            id: self.id,
            name: self.name,
            kind: self.kind,
            state: self.state,
            health: self.health,
            resources,
            parent: self.parent,
            image: self.image,
            status_text: self.status_text,
            config_file: self.config_file,
        }
    }
}

/// History requested when a log stream opens
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogOptions {
    /// Lines of history to replay before following
    pub tail: usize,
    /// Only replay lines newer than this
    pub since: Option<Duration>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            tail: 200,
            since: Some(Duration::from_secs(15 * 60)),
        }
    }
}

/// Raw log bytes; chunk boundaries do not need to line up with lines.
pub type LogByteStream = BoxStream<'static, Result<Vec<u8>, AdapterError>>;

/// The call contract every runtime backend implements
#[async_trait]
pub trait RuntimeAdapter: Send + Sync {
    /// Human-readable name of this adapter
    fn name(&self) -> &'static str;

    /// Full current entity list. Fails only with `RuntimeUnavailable`.
    async fn list_entities(&self) -> Result<Vec<RawEntity>, AdapterError>;

    /// One resource reading for a container. Fails with `StatsUnavailable`.
    async fn read_stats(&self, id: &EntityId) -> Result<ResourceSample, AdapterError>;

    /// Open a following log stream. The stream is infinite until dropped,
    /// or ends when the entity stops. Fails with `StreamError`.
    async fn stream_logs(
        &self,
        id: &EntityId,
        options: &LogOptions,
    ) -> Result<LogByteStream, AdapterError>;

    /// Perform a lifecycle action. `Exec` returns the command output.
    async fn perform_action(
        &self,
        id: &EntityId,
        action: &ActionKind,
    ) -> Result<Option<String>, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_entity_keeps_fields() {
        let raw = RawEntity {
            id: "abc".into(),
            name: "web-1".into(),
            kind: EntityKind::Container,
            state: LifecycleState::Running,
            health: Some(HealthStatus::Healthy),
            parent: Some("service:shop/web".into()),
            image: Some("nginx:1.27".into()),
            status_text: "Up 2 minutes (healthy)".into(),
            config_file: None,
        };
        let sample = ResourceSample {
            cpu_percent: Some(1.5),
            ..Default::default()
        };

        let entity = raw.into_entity(Some(sample.clone()));
        assert_eq!(entity.id, "abc");
        assert_eq!(entity.state, LifecycleState::Running);
        assert_eq!(entity.parent.as_deref(), Some("service:shop/web"));
        assert_eq!(entity.resources, Some(sample));
    }

    #[test]
    fn test_action_error_shows_reason_verbatim() {
        let err = AdapterError::ActionError("No such container: abc".into());
        assert_eq!(err.to_string(), "No such container: abc");
    }
}
