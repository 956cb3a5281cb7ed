//! Session wiring
//!
//! Builds the store, bus, poller, dispatcher and log manager around one
//! adapter and owns their shutdown.

use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::adapter::{AdapterError, LogOptions, RuntimeAdapter};
use crate::config::DashboardConfig;
use crate::dispatcher::ActionDispatcher;
use crate::error::{DispatchError, SessionError, StreamOpenError};
use crate::events::{self, ActionId, EventReceiver};
use crate::logs::LogLine;
use crate::model::ActionKind;
use crate::poller::SnapshotPoller;
use crate::store::ModelStore;
use crate::stream::{LogStreamManager, StreamHandle};
use crate::view::{ModelView, PendingAction};

pub struct Session {
    store: Arc<ModelStore>,
    dispatcher: ActionDispatcher,
    logs: LogStreamManager,
    poll_now: Arc<Notify>,
    shutdown: CancellationToken,
    poller: Option<JoinHandle<()>>,
}

impl Session {
    /// Take the first snapshot and start background polling. An unreachable
    /// runtime at this point is fatal.
    pub async fn start(
        adapter: Arc<dyn RuntimeAdapter>,
        config: &DashboardConfig,
    ) -> Result<(Self, EventReceiver), SessionError> {
        let stream_settings = config.stream_settings()?;

        let (events, receiver) = events::channel();
        let store = Arc::new(ModelStore::new(events, config.diff_policy()));

        let mut poller = SnapshotPoller::new(adapter.clone(), store.clone(), config.poll_interval());
        match poller.poll_once().await {
            Ok(_) => {}
            Err(AdapterError::RuntimeUnavailable(reason)) => {
                return Err(SessionError::RuntimeUnavailable(reason));
            }
            Err(other) => return Err(other.into()),
        }
        info!(adapter = adapter.name(), entities = store.current_view().len(), "session started");

        let poll_now = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();
        let poller = tokio::spawn(poller.run(shutdown.clone(), poll_now.clone()));

        let dispatcher = ActionDispatcher::new(
            adapter.clone(),
            store.clone(),
            config.dispatch_settings(),
            poll_now.clone(),
        );
        let logs = LogStreamManager::new(adapter, store.clone(), stream_settings);

        Ok((
            Self {
                store,
                dispatcher,
                logs,
                poll_now,
                shutdown,
                poller: Some(poller),
            },
            receiver,
        ))
    }

    pub fn current_view(&self) -> Arc<ModelView> {
        self.store.current_view()
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn submit(&self, id: &str, kind: ActionKind) -> Result<PendingAction, DispatchError> {
        self.dispatcher.submit(id, kind)
    }

    pub fn cancel(&self, id: &str) -> Result<ActionId, DispatchError> {
        self.dispatcher.cancel(id)
    }

    pub fn open_logs(&self, id: &str) -> Result<StreamHandle, StreamOpenError> {
        self.logs.open(id)
    }

    pub fn open_logs_with(&self, id: &str, options: LogOptions) -> Result<StreamHandle, StreamOpenError> {
        self.logs.open_with(id, options)
    }

    /// History window used when none is given
    pub fn log_options(&self) -> LogOptions {
        self.logs.default_options().clone()
    }

    pub fn close_logs(&self, handle: &StreamHandle) -> bool {
        self.logs.close(handle)
    }

    pub fn log_handle(&self, id: &str) -> Option<StreamHandle> {
        self.logs.handle(id)
    }

    pub fn log_lines(&self, id: &str) -> Vec<LogLine> {
        self.logs.lines(id)
    }

    /// Poll now instead of waiting for the next tick
    pub fn refresh(&self) {
        self.poll_now.notify_one();
    }

    /// Signal every worker and wait for each to stop. In-progress adapter
    /// calls are allowed to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        self.logs.shutdown().await;
        self.dispatcher.shutdown().await;
        if let Some(poller) = self.poller.take() {
            let _ = poller.await;
        }
        info!("session stopped");
    }
}
