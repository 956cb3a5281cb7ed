// Data model and adapter boundary
pub mod adapter;
pub mod compose;
pub mod model;
pub mod snapshot;

// Reconciliation
pub mod diff;
pub mod store;
pub mod view;

// Event bus
pub mod events;

// Background workers
pub mod dispatcher;
pub mod logs;
pub mod poller;
pub mod stream;

pub mod config;
pub mod error;
pub mod session;

// Log pane filtering
pub mod log_filter;

// Resource history for sparklines
pub mod metrics;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{AdapterError, LogOptions, RawEntity, RuntimeAdapter};
pub use config::DashboardConfig;
pub use error::{DispatchError, SessionError, StreamOpenError};
pub use events::{Event, EventReceiver};
pub use session::Session;
