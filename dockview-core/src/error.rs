use thiserror::Error;

use crate::adapter::AdapterError;
use crate::config::ConfigError;
use crate::events::ActionId;
use crate::model::EntityId;

/// Synchronous rejections from the dispatcher. A rejected action is never
/// enqueued and never touches the model.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("unknown entity: {0}")]
    InvalidTarget(EntityId),

    #[error("action {pending} is already pending for {id}")]
    ActionConflict { id: EntityId, pending: ActionId },

    #[error("container runtime is unavailable")]
    RuntimeUnavailable,

    #[error("no queued action to cancel for {0}")]
    NothingToCancel(EntityId),

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StreamOpenError {
    #[error("unknown entity: {0}")]
    InvalidTarget(EntityId),

    #[error("log manager is shutting down")]
    ShuttingDown,
}

/// Conditions that end a session before it starts
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot reach the container runtime: {0}")]
    RuntimeUnavailable(String),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_messages() {
        let err = DispatchError::ActionConflict {
            id: "web".into(),
            pending: ActionId(3),
        };
        assert_eq!(err.to_string(), "action #3 is already pending for web");
        assert_eq!(
            DispatchError::InvalidTarget("x".into()).to_string(),
            "unknown entity: x"
        );
    }
}
