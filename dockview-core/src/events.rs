//! Event bus
//!
//! Background producers (store, log readers, dispatcher tasks) send
//! [`Event`]s through an [`EventSender`]; the UI owns the single
//! [`EventReceiver`]. Envelope ids are assigned and sent under one lock, so
//! the receiver sees ids in strictly increasing order and nothing is
//! reordered or dropped.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::diff::Change;
use crate::logs::LogLine;
use crate::model::{ActionKind, EntityId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Changes produced by one store mutation, in computed order
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChangeBatch {
    /// Version of the published view these changes lead to
    pub version: u64,
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum CloseReason {
    EntityRemoved,
    RuntimeError(String),
    ManualClose,
    /// The runtime ended the stream (container stopped)
    Ended,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EntityRemoved => write!(f, "entity removed"),
            Self::RuntimeError(reason) => write!(f, "runtime error: {reason}"),
            Self::ManualClose => write!(f, "closed"),
            Self::Ended => write!(f, "stream ended"),
            Self::Shutdown => write!(f, "shutting down"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// `output` carries exec output when there is any
    Succeeded { output: Option<String> },
    Failed { reason: String },
    Cancelled,
}

impl ActionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Connectivity {
    Connected,
    Unavailable { reason: String },
}

impl Connectivity {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Changes(ChangeBatch),
    LogLines {
        id: EntityId,
        /// Identifies one open/close cycle of the stream
        session: u64,
        lines: Vec<LogLine>,
    },
    StreamClosed {
        id: EntityId,
        session: u64,
        reason: CloseReason,
    },
    ActionResult {
        action_id: ActionId,
        entity: EntityId,
        kind: ActionKind,
        outcome: ActionOutcome,
    },
    Runtime(Connectivity),
}

#[derive(Clone, Debug, Serialize)]
pub struct Envelope {
    pub id: u64,
    pub at: SystemTime,
    pub event: Event,
}

struct SenderInner {
    tx: mpsc::UnboundedSender<Envelope>,
    next_id: Mutex<u64>,
}

#[derive(Clone)]
pub struct EventSender {
    inner: Arc<SenderInner>,
}

impl EventSender {
    /// Returns false once the receiver is gone.
    pub fn emit(&self, event: Event) -> bool {
        let mut next_id = self.inner.next_id.lock();
        let envelope = Envelope {
            id: *next_id,
            at: SystemTime::now(),
            event,
        };
        *next_id += 1;
        self.inner.tx.send(envelope).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_closed()
    }
}

impl fmt::Debug for EventSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSender")
            .field("next_id", &*self.inner.next_id.lock())
            .finish()
    }
}

#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued, oldest first
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = self.rx.try_recv() {
            out.push(env);
        }
        out
    }
}

pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = EventSender {
        inner: Arc::new(SenderInner {
            tx,
            next_id: Mutex::new(1),
        }),
    };
    (sender, EventReceiver { rx })
}
