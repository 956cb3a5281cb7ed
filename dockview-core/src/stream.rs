//! Log stream manager
//!
//! One background reader per open stream. Each reader owns the decoding of
//! its byte stream, appends to the stream's ring buffer and emits
//! `LogLines` events. Whoever removes a stream from the open set (the reader
//! on EOF, error or entity removal; `close`; `shutdown`) emits its single
//! `StreamClosed` event, and no lines are emitted for a session after that.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::adapter::{LogOptions, RuntimeAdapter};
use crate::error::StreamOpenError;
use crate::events::{CloseReason, Event, EventSender};
use crate::logs::{LineDecoder, LogBuffer, LogLine};
use crate::model::EntityId;
use crate::store::ModelStore;
use crate::view::ModelView;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamSettings {
    /// Ring buffer lines per stream
    pub capacity: usize,
    /// Most lines carried by one `LogLines` event
    pub batch_lines: usize,
    pub options: LogOptions,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            capacity: 2000,
            batch_lines: 64,
            options: LogOptions::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    pub id: EntityId,
    pub session: u64,
}

struct OpenStream {
    session: u64,
    buffer: Arc<Mutex<LogBuffer>>,
    cancel: CancellationToken,
}

type StreamMap = Arc<Mutex<HashMap<EntityId, OpenStream>>>;

pub struct LogStreamManager {
    adapter: Arc<dyn RuntimeAdapter>,
    store: Arc<ModelStore>,
    events: EventSender,
    settings: StreamSettings,
    streams: StreamMap,
    next_session: AtomicU64,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl LogStreamManager {
    pub fn new(adapter: Arc<dyn RuntimeAdapter>, store: Arc<ModelStore>, settings: StreamSettings) -> Self {
        let events = store.events().clone();
        Self {
            adapter,
            store,
            events,
            settings,
            streams: Arc::new(Mutex::new(HashMap::new())),
            next_session: AtomicU64::new(1),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Open a stream for `id`, or return the one already open.
    pub fn open(&self, id: &str) -> Result<StreamHandle, StreamOpenError> {
        self.open_with(id, self.settings.options.clone())
    }

    /// History requested by `open`
    pub fn default_options(&self) -> &LogOptions {
        &self.settings.options
    }

    /// Like `open`, with the history window chosen by the caller. An already
    /// open stream is returned as is; close it first to change its window.
    pub fn open_with(&self, id: &str, options: LogOptions) -> Result<StreamHandle, StreamOpenError> {
        if self.shutdown.is_cancelled() {
            return Err(StreamOpenError::ShuttingDown);
        }
        if !self.store.current_view().contains(id) {
            return Err(StreamOpenError::InvalidTarget(id.to_string()));
        }

        let mut streams = self.streams.lock();
        if let Some(open) = streams.get(id) {
            return Ok(StreamHandle {
                id: id.to_string(),
                session: open.session,
            });
        }

        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let view_rx = self.store.subscribe();
        let buffer = Arc::new(Mutex::new(LogBuffer::new(self.settings.capacity)));
        let cancel = self.shutdown.child_token();
        streams.insert(
            id.to_string(),
            OpenStream {
                session,
                buffer: buffer.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(streams);

        self.store.set_stream_open(id, session, true);
        info!(id = %id, session, "log stream opened");

        let reader = Reader {
            id: id.to_string(),
            session,
            adapter: self.adapter.clone(),
            store: self.store.clone(),
            events: self.events.clone(),
            streams: self.streams.clone(),
            buffer,
            cancel,
            options,
            batch_lines: self.settings.batch_lines.max(1),
        };
        self.tracker.spawn(reader.run(view_rx));

        Ok(StreamHandle {
            id: id.to_string(),
            session,
        })
    }

    /// Close a stream. Stale handles are ignored.
    pub fn close(&self, handle: &StreamHandle) -> bool {
        let removed = {
            let mut streams = self.streams.lock();
            if streams
                .get(&handle.id)
                .is_some_and(|s| s.session == handle.session)
            {
                streams.remove(&handle.id)
            } else {
                None
            }
        };
        let Some(stream) = removed else {
            return false;
        };

        stream.cancel.cancel();
        self.store.set_stream_open(&handle.id, handle.session, false);
        self.events.emit(Event::StreamClosed {
            id: handle.id.clone(),
            session: handle.session,
            reason: CloseReason::ManualClose,
        });
        info!(id = %handle.id, session = handle.session, "log stream closed");
        true
    }

    pub fn handle(&self, id: &str) -> Option<StreamHandle> {
        self.streams.lock().get(id).map(|s| StreamHandle {
            id: id.to_string(),
            session: s.session,
        })
    }

    /// Buffered lines of an open stream, oldest first
    pub fn lines(&self, id: &str) -> Vec<LogLine> {
        self.streams
            .lock()
            .get(id)
            .map(|s| s.buffer.lock().lines())
            .unwrap_or_default()
    }

    pub fn open_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Close every stream and wait for all readers to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let drained: Vec<(EntityId, OpenStream)> = self.streams.lock().drain().collect();
        for (id, stream) in drained {
            self.store.set_stream_open(&id, stream.session, false);
            self.events.emit(Event::StreamClosed {
                id,
                session: stream.session,
                reason: CloseReason::Shutdown,
            });
        }
        self.tracker.close();
        self.tracker.wait().await;
    }
}

struct Reader {
    id: EntityId,
    session: u64,
    adapter: Arc<dyn RuntimeAdapter>,
    store: Arc<ModelStore>,
    events: EventSender,
    streams: StreamMap,
    buffer: Arc<Mutex<LogBuffer>>,
    cancel: CancellationToken,
    options: LogOptions,
    batch_lines: usize,
}

enum Step {
    Lines(Vec<String>),
    Closed(CloseReason),
    Cancelled,
}

impl Reader {
    async fn run(self, mut view_rx: watch::Receiver<Arc<ModelView>>) {
        let opened = tokio::select! {
            _ = self.cancel.cancelled() => return,
            res = self.adapter.stream_logs(&self.id, &self.options) => res,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(err) => {
                self.finish(CloseReason::RuntimeError(err.to_string()));
                return;
            }
        };

        let mut decoder = LineDecoder::new();
        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancelled,
                changed = view_rx.changed() => {
                    if changed.is_err() || !view_rx.borrow_and_update().contains(&self.id) {
                        Step::Closed(CloseReason::EntityRemoved)
                    } else {
                        Step::Lines(Vec::new())
                    }
                }
                item = stream.next() => match item {
                    None => {
                        let tail: Vec<String> = decoder.finish().into_iter().collect();
                        if !self.deliver(tail) {
                            return;
                        }
                        Step::Closed(CloseReason::Ended)
                    }
                    Some(Err(err)) => Step::Closed(CloseReason::RuntimeError(err.to_string())),
                    Some(Ok(chunk)) => {
                        let mut lines = decoder.feed(&chunk);
                        let mut closing = None;
                        // Coalesce whatever is already available
                        while lines.len() < self.batch_lines {
                            match stream.next().now_or_never() {
                                Some(Some(Ok(more))) => lines.extend(decoder.feed(&more)),
                                Some(Some(Err(err))) => {
                                    closing = Some(CloseReason::RuntimeError(err.to_string()));
                                    break;
                                }
                                Some(None) => {
                                    lines.extend(decoder.finish());
                                    closing = Some(CloseReason::Ended);
                                    break;
                                }
                                None => break,
                            }
                        }
                        match closing {
                            Some(reason) => {
                                if !self.deliver(lines) {
                                    return;
                                }
                                Step::Closed(reason)
                            }
                            None => Step::Lines(lines),
                        }
                    }
                },
            };

            match step {
                Step::Lines(lines) => {
                    if !self.deliver(lines) {
                        return;
                    }
                }
                Step::Closed(reason) => {
                    self.finish(reason);
                    return;
                }
                Step::Cancelled => return,
            }
        }
    }

    /// Buffer and emit lines. False once this session is no longer open.
    fn deliver(&self, lines: Vec<String>) -> bool {
        let streams = self.streams.lock();
        if !streams.get(&self.id).is_some_and(|s| s.session == self.session) {
            return false;
        }
        if lines.is_empty() {
            return true;
        }

        let mut buffer = self.buffer.lock();
        let mut batch = Vec::with_capacity(lines.len().min(self.batch_lines));
        for text in lines {
            batch.push(buffer.push(text));
            if batch.len() == self.batch_lines {
                self.events.emit(Event::LogLines {
                    id: self.id.clone(),
                    session: self.session,
                    lines: std::mem::take(&mut batch),
                });
            }
        }
        if !batch.is_empty() {
            self.events.emit(Event::LogLines {
                id: self.id.clone(),
                session: self.session,
                lines: batch,
            });
        }
        true
    }

    fn finish(&self, reason: CloseReason) {
        let removed = {
            let mut streams = self.streams.lock();
            if streams.get(&self.id).is_some_and(|s| s.session == self.session) {
                streams.remove(&self.id)
            } else {
                None
            }
        };
        if removed.is_none() {
            return;
        }

        debug!(id = %self.id, session = self.session, %reason, "log stream finished");
        self.store.set_stream_open(&self.id, self.session, false);
        self.events.emit(Event::StreamClosed {
            id: self.id.clone(),
            session: self.session,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::adapter::AdapterError;
    use crate::diff::DiffPolicy;
    use crate::events::{self, EventReceiver};
    use crate::model::{Entity, EntityKind, LifecycleState};
    use crate::snapshot::Snapshot;
    use crate::test_support::ScriptedAdapter;

    fn setup(capacity: usize) -> (LogStreamManager, Arc<ScriptedAdapter>, Arc<ModelStore>, EventReceiver) {
        setup_with(capacity, 64)
    }

    fn setup_with(
        capacity: usize,
        batch_lines: usize,
    ) -> (LogStreamManager, Arc<ScriptedAdapter>, Arc<ModelStore>, EventReceiver) {
        let adapter = Arc::new(ScriptedAdapter::new());
        let (tx, rx) = events::channel();
        let store = Arc::new(ModelStore::new(tx, DiffPolicy::immediate()));
        store.apply_snapshot(Snapshot::new(1, Instant::now(), vec![
            Entity::new("a", "a", EntityKind::Container).with_state(LifecycleState::Running),
        ]));
        let manager = LogStreamManager::new(adapter.clone(), store.clone(), StreamSettings {
            capacity,
            batch_lines,
            options: LogOptions::default(),
        });
        (manager, adapter, store, rx)
    }

    async fn next_event(rx: &mut EventReceiver) -> Event {
        loop {
            let env = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("timed out waiting for event")
                .expect("bus closed");
            match env.event {
                Event::Changes(_) => continue,
                other => return other,
            }
        }
    }

    #[tokio::test]
    async fn test_open_unknown_entity_fails() {
        let (manager, _adapter, _store, mut rx) = setup(10);
        rx.drain();
        assert_eq!(
            manager.open("ghost"),
            Err(StreamOpenError::InvalidTarget("ghost".into()))
        );
        assert!(rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_repeat_open_returns_same_handle() {
        let (manager, adapter, _store, _rx) = setup(10);
        let _feed = adapter.log_feed("a");
        let first = manager.open("a").unwrap();
        let second = manager.open("a").unwrap();
        assert_eq!(first, second);
        assert_eq!(manager.open_count(), 1);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_lines_flow_and_ring_evicts() {
        let (manager, adapter, store, mut rx) = setup(3);
        let feed = adapter.log_feed("a");
        let handle = manager.open("a").unwrap();
        assert!(store.current_view().is_stream_open("a"));

        feed.send(Ok(b"one\ntw".to_vec())).unwrap();
        feed.send(Ok(b"o\nthree\nfour\nfive\n".to_vec())).unwrap();

        let mut texts = Vec::new();
        let mut seqs = Vec::new();
        while texts.len() < 5 {
            if let Event::LogLines { session, lines, .. } = next_event(&mut rx).await {
                assert_eq!(session, handle.session);
                for line in lines {
                    texts.push(line.text);
                    seqs.push(line.seq);
                }
            }
        }
        assert_eq!(texts, vec!["one", "two", "three", "four", "five"]);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));

        let buffered: Vec<String> = manager.lines("a").into_iter().map(|l| l.text).collect();
        assert_eq!(buffered, vec!["three", "four", "five"]);

        assert!(manager.close(&handle));
        assert!(!manager.close(&handle));
        assert!(manager.lines("a").is_empty());
        assert!(!store.current_view().is_stream_open("a"));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_queued_chunks_coalesce_up_to_batch_limit() {
        let (manager, adapter, _store, mut rx) = setup_with(100, 2);
        let feed = adapter.log_feed("a");
        let handle = manager.open("a").unwrap();
        for chunk in ["one\n", "two\n", "three\n", "four\nfive\nsix\n", "seven\n"] {
            feed.send(Ok(chunk.as_bytes().to_vec())).unwrap();
        }

        let mut batches: Vec<Vec<LogLine>> = Vec::new();
        while batches.iter().map(Vec::len).sum::<usize>() < 7 {
            if let Event::LogLines { session, lines, .. } = next_event(&mut rx).await {
                assert_eq!(session, handle.session);
                batches.push(lines);
            }
        }

        assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 2));
        // "one" and "two" arrive as separate chunks but share an event
        assert_eq!(batches[0].iter().map(|l| l.text.as_str()).collect::<Vec<_>>(), vec!["one", "two"]);

        let lines: Vec<&LogLine> = batches.iter().flatten().collect();
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two", "three", "four", "five", "six", "seven"]);
        assert!(lines.windows(2).all(|w| w[0].seq < w[1].seq));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_with_passes_history_window() {
        let (manager, adapter, _store, _rx) = setup(10);
        let _feed = adapter.log_feed("a");
        let options = LogOptions {
            tail: 1600,
            since: Some(Duration::from_secs(3600)),
        };
        manager.open_with("a", options.clone()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while adapter.log_requests().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("reader never asked for logs");
        assert_eq!(adapter.log_requests(), vec![("a".to_string(), options)]);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_eof_closes_with_ended() {
        let (manager, adapter, _store, mut rx) = setup(10);
        let feed = adapter.log_feed("a");
        let handle = manager.open("a").unwrap();
        feed.send(Ok(b"last words".to_vec())).unwrap();
        drop(feed);

        let mut saw_line = false;
        loop {
            match next_event(&mut rx).await {
                Event::LogLines { lines, .. } => {
                    saw_line = lines.iter().any(|l| l.text == "last words");
                }
                Event::StreamClosed { session, reason, .. } => {
                    assert_eq!(session, handle.session);
                    assert_eq!(reason, CloseReason::Ended);
                    break;
                }
                _ => {}
            }
        }
        assert!(saw_line);
        assert_eq!(manager.open_count(), 0);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_stream_error_closes() {
        let (manager, adapter, _store, mut rx) = setup(10);
        let feed = adapter.log_feed("a");
        manager.open("a").unwrap();
        feed.send(Err(AdapterError::StreamError {
            id: "a".into(),
            reason: "connection reset".into(),
        }))
        .unwrap();

        match next_event(&mut rx).await {
            Event::StreamClosed { reason: CloseReason::RuntimeError(msg), .. } => {
                assert!(msg.contains("connection reset"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_entity_removal_closes_stream() {
        let (manager, adapter, store, mut rx) = setup(10);
        let _feed = adapter.log_feed("a");
        manager.open("a").unwrap();
        store.apply_snapshot(Snapshot::new(2, Instant::now(), vec![]));

        match next_event(&mut rx).await {
            Event::StreamClosed { reason, .. } => assert_eq!(reason, CloseReason::EntityRemoved),
            other => panic!("unexpected event {other:?}"),
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_failure_reports_runtime_error() {
        let (manager, _adapter, _store, mut rx) = setup(10);
        manager.open("a").unwrap();
        match next_event(&mut rx).await {
            Event::StreamClosed { reason: CloseReason::RuntimeError(_), .. } => {}
            other => panic!("unexpected event {other:?}"),
        }
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let (manager, adapter, _store, mut rx) = setup(10);
        let _feed = adapter.log_feed("a");
        manager.open("a").unwrap();
        manager.shutdown().await;

        match next_event(&mut rx).await {
            Event::StreamClosed { reason, .. } => assert_eq!(reason, CloseReason::Shutdown),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(manager.open("a"), Err(StreamOpenError::ShuttingDown));
    }
}
