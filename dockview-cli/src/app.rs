//! Dashboard UI state
//!
//! Everything the renderer shows that is not part of the model: selection,
//! the log pane, filters, prompts and toasts. Input and bus events go in,
//! [`Command`]s for the session come out.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use dockview_core::adapter::LogOptions;
use dockview_core::events::{ActionOutcome, CloseReason, Connectivity, Envelope, Event};
use dockview_core::log_filter::LogFilter;
use dockview_core::logs::LogLine;
use dockview_core::metrics::ResourceHistory;
use dockview_core::model::{ActionKind, EntityId, LifecycleState};
use dockview_core::stream::StreamHandle;
use dockview_core::view::{EntityView, ModelView};

const TOAST_TTL: Duration = Duration::from_secs(4);
const PAGE: usize = 10;
const TAIL_CHOICES: [usize; 9] = [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800];
const SINCE_CHOICES_MIN: [u64; 10] = [5, 10, 15, 30, 60, 120, 240, 480, 1440, 2880];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    Submit { id: EntityId, kind: ActionKind },
    Cancel(EntityId),
    /// Close whatever the log pane shows and stream this entity instead
    OpenLogs(EntityId),
    /// Reopen the pane's stream with a new history window
    RestartLogs(EntityId),
    Refresh,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug)]
pub struct Toast {
    pub text: String,
    pub level: ToastLevel,
    pub until: Instant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Prompt {
    Search(String),
    Exec(String),
    ConfirmRemove(EntityId),
}

#[derive(Debug)]
pub struct LogPane {
    pub entity: Option<EntityId>,
    session: Option<u64>,
    pub lines: VecDeque<LogLine>,
    cap: usize,
    pub follow: bool,
    /// Lines scrolled up from the bottom
    pub scroll: usize,
    pub closed: Option<CloseReason>,
    /// Entity was observed running with no action outstanding at the last check
    settled: bool,
}

impl LogPane {
    pub fn new(cap: usize) -> Self {
        Self {
            entity: None,
            session: None,
            lines: VecDeque::new(),
            cap,
            follow: true,
            scroll: 0,
            closed: None,
            settled: false,
        }
    }

    /// Point the pane at a freshly opened stream. The new session replays
    /// its own history, so earlier lines are dropped.
    pub fn attach(&mut self, handle: StreamHandle) {
        let same = self.entity.as_ref() == Some(&handle.id);
        let reopened = same && self.closed.is_some();
        self.lines.clear();
        self.follow = true;
        self.scroll = 0;
        if !same {
            self.settled = false;
        }
        if reopened {
            self.note("--- stream reopened ---");
        }
        self.entity = Some(handle.id);
        self.session = Some(handle.session);
        self.closed = None;
    }

    /// Forget the current stream; returns its handle so the caller can close it
    pub fn detach(&mut self) -> Option<StreamHandle> {
        let handle = self
            .entity
            .clone()
            .zip(self.session.take())
            .map(|(id, session)| StreamHandle { id, session });
        self.entity = None;
        self.closed = None;
        self.settled = false;
        self.lines.clear();
        handle
    }

    pub fn is_streaming(&self) -> bool {
        self.session.is_some()
    }

    fn accepts(&self, id: &str, session: u64) -> bool {
        self.entity.as_deref() == Some(id) && self.session == Some(session)
    }

    fn push(&mut self, line: LogLine) {
        if self.lines.len() >= self.cap {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        if !self.follow {
            // Keep the visible window still while new lines arrive
            self.scroll = self.scroll.saturating_add(1).min(self.lines.len());
        }
    }

    pub fn note(&mut self, text: &str) {
        self.push(LogLine {
            seq: 0,
            at: SystemTime::now(),
            text: text.to_string(),
        });
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.follow = false;
        self.scroll = self.scroll.saturating_add(lines).min(self.lines.len());
    }

    pub fn scroll_down(&mut self, lines: usize) {
        self.scroll = self.scroll.saturating_sub(lines);
        if self.scroll == 0 {
            self.follow = true;
        }
    }

    pub fn toggle_follow(&mut self) {
        self.follow = !self.follow;
        if self.follow {
            self.scroll = 0;
        }
    }
}

pub struct App {
    pub selected: Option<EntityId>,
    pub logs: LogPane,
    pub filter: LogFilter,
    pub history: ResourceHistory,
    pub toast: Option<Toast>,
    pub prompt: Option<Prompt>,
    pub help_open: bool,
    /// History window for streams the pane opens
    pub log_options: LogOptions,
    started: Instant,
}

impl App {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            selected: None,
            logs: LogPane::new(log_capacity),
            filter: LogFilter::new(),
            history: ResourceHistory::new(),
            toast: None,
            prompt: None,
            help_open: false,
            log_options: LogOptions::default(),
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn selected_view<'a>(&self, view: &'a ModelView) -> Option<&'a EntityView> {
        self.selected.as_deref().and_then(|id| view.get(id))
    }

    pub fn report(&mut self, level: ToastLevel, text: impl Into<String>) {
        self.toast = Some(Toast {
            text: text.into(),
            level,
            until: Instant::now() + TOAST_TTL,
        });
    }

    pub fn tick(&mut self, now: Instant) {
        if self.toast.as_ref().is_some_and(|t| t.until <= now) {
            self.toast = None;
        }
    }

    /// Keep the selection on a row that exists. The log pane follows the
    /// selection.
    pub fn sync_selection(&mut self, view: &ModelView) -> Option<Command> {
        if self.selected.as_deref().is_some_and(|id| view.contains(id)) {
            return None;
        }
        self.selected = view.tree().first().map(|(_, e)| e.entity.id.clone());
        self.selected.clone().map(Command::OpenLogs)
    }

    pub fn move_selection(&mut self, view: &ModelView, delta: isize) -> Option<Command> {
        let rows = view.tree();
        if rows.is_empty() {
            return None;
        }
        let current = self
            .selected
            .as_deref()
            .and_then(|id| rows.iter().position(|(_, e)| e.entity.id == id))
            .unwrap_or(0);
        let next = current.saturating_add_signed(delta).min(rows.len() - 1);
        let id = rows[next].1.entity.id.clone();
        if self.selected.as_ref() == Some(&id) {
            return None;
        }
        self.selected = Some(id.clone());
        Some(Command::OpenLogs(id))
    }

    /// Reopen a stream that closed on its own once its entity is running
    /// again. Only authoritative state counts: an optimistic `running` or an
    /// action still awaiting confirmation keeps the pane closed, since
    /// following a container that has not started ends at once.
    pub fn reopen_if_running(&mut self, view: &ModelView) -> Option<Command> {
        let id = self.logs.entity.clone()?;
        let settled = view.get(&id).is_some_and(|e| {
            e.observed_state == LifecycleState::Running && !e.is_optimistic()
        }) && view.pending_for(&id).is_none();
        let was_settled = std::mem::replace(&mut self.logs.settled, settled);

        let closed_early = matches!(
            self.logs.closed,
            Some(CloseReason::Ended | CloseReason::RuntimeError(_) | CloseReason::EntityRemoved)
        );
        (closed_early && settled && !was_settled).then_some(Command::OpenLogs(id))
    }

    /// Step to the next larger tail size, wrapping around.
    pub fn cycle_tail(&mut self) -> Option<Command> {
        let tail = self.log_options.tail;
        self.log_options.tail = TAIL_CHOICES
            .iter()
            .copied()
            .find(|&t| t > tail)
            .unwrap_or(TAIL_CHOICES[0]);
        self.logs.entity.clone().map(Command::RestartLogs)
    }

    /// Step to the next longer history window; past the longest comes "all".
    pub fn cycle_since(&mut self) -> Option<Command> {
        self.log_options.since = match self.log_options.since {
            None => Some(Duration::from_secs(SINCE_CHOICES_MIN[0] * 60)),
            Some(since) => SINCE_CHOICES_MIN
                .iter()
                .map(|m| Duration::from_secs(m * 60))
                .find(|&d| d > since),
        };
        self.logs.entity.clone().map(Command::RestartLogs)
    }

    pub fn handle_event(&mut self, envelope: Envelope, view: &ModelView) -> Option<Command> {
        match envelope.event {
            Event::Changes(batch) => {
                self.history.apply(self.started.elapsed().as_secs_f64(), &batch);
                None
            }
            Event::LogLines { id, session, lines } => {
                if self.logs.accepts(&id, session) {
                    for line in lines {
                        self.logs.push(line);
                    }
                }
                None
            }
            Event::StreamClosed { id, session, reason } => {
                if self.logs.accepts(&id, session) {
                    self.logs.note(&format!("--- {reason} ---"));
                    self.logs.session = None;
                    self.logs.closed = Some(reason);
                }
                None
            }
            Event::ActionResult {
                entity,
                kind,
                outcome,
                ..
            } => {
                let name = view
                    .get(&entity)
                    .map(|e| e.entity.name.clone())
                    .unwrap_or_else(|| entity.clone());
                match outcome {
                    ActionOutcome::Succeeded { output } => {
                        if let (ActionKind::Exec { command }, Some(output)) = (&kind, output) {
                            if self.logs.entity.as_ref() == Some(&entity) {
                                self.logs.note(&format!("$ {}", command.join(" ")));
                                for line in output.lines() {
                                    self.logs.note(line);
                                }
                            }
                        }
                        self.report(ToastLevel::Success, format!("{} {}: done", kind.label(), name));
                    }
                    ActionOutcome::Failed { reason } => {
                        self.report(ToastLevel::Error, format!("{} {} failed: {}", kind.label(), name, reason));
                    }
                    ActionOutcome::Cancelled => {
                        self.report(ToastLevel::Info, format!("{} {}: cancelled", kind.label(), name));
                    }
                }
                None
            }
            Event::Runtime(Connectivity::Unavailable { reason }) => {
                self.report(ToastLevel::Error, format!("runtime unreachable: {reason}"));
                None
            }
            Event::Runtime(Connectivity::Connected) => {
                self.report(ToastLevel::Success, "runtime reconnected");
                None
            }
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, view: &ModelView) -> Option<Command> {
        if self.help_open {
            self.help_open = false;
            return None;
        }
        if let Some(prompt) = self.prompt.take() {
            return self.handle_prompt_key(prompt, key);
        }

        let target = self.selected.clone();
        let submit = |kind: ActionKind| target.clone().map(|id| Command::Submit { id, kind });

        match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Command::Quit),
            (KeyCode::Char('?'), _) => {
                self.help_open = true;
                None
            }
            (KeyCode::Up | KeyCode::Char('k'), _) => self.move_selection(view, -1),
            (KeyCode::Down | KeyCode::Char('j'), _) => self.move_selection(view, 1),
            (KeyCode::PageUp, _) => {
                self.logs.scroll_up(PAGE);
                None
            }
            (KeyCode::PageDown, _) => {
                self.logs.scroll_down(PAGE);
                None
            }
            (KeyCode::Char('f'), _) => {
                self.logs.toggle_follow();
                None
            }
            (KeyCode::Char('s'), _) => submit(ActionKind::Start),
            (KeyCode::Char('x'), _) => submit(ActionKind::Stop),
            (KeyCode::Char('r'), _) => submit(ActionKind::Restart),
            (KeyCode::Char('d'), _) => {
                self.prompt = target.clone().map(Prompt::ConfirmRemove);
                None
            }
            (KeyCode::Char('e'), _) => {
                if target.is_some() {
                    self.prompt = Some(Prompt::Exec(String::new()));
                }
                None
            }
            (KeyCode::Char('c'), _) => target.clone().map(Command::Cancel),
            (KeyCode::Char('/'), _) => {
                self.prompt = Some(Prompt::Search(self.filter.search().unwrap_or_default().to_string()));
                None
            }
            (KeyCode::Char('l'), _) => {
                self.filter.cycle_floor();
                None
            }
            (KeyCode::Char('t'), _) => self.cycle_tail(),
            (KeyCode::Char('w'), _) => self.cycle_since(),
            (KeyCode::Esc, _) => {
                self.filter.clear_search();
                None
            }
            (KeyCode::Char('R') | KeyCode::F(5), _) => Some(Command::Refresh),
            _ => None,
        }
    }

    fn handle_prompt_key(&mut self, prompt: Prompt, key: KeyEvent) -> Option<Command> {
        match prompt {
            Prompt::ConfirmRemove(id) => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => Some(Command::Submit {
                    id,
                    kind: ActionKind::Remove,
                }),
                _ => None,
            },
            Prompt::Search(mut text) => match key.code {
                KeyCode::Esc => None,
                KeyCode::Enter => {
                    self.filter.set_search(&text);
                    None
                }
                KeyCode::Backspace => {
                    text.pop();
                    self.prompt = Some(Prompt::Search(text));
                    None
                }
                KeyCode::Char(ch) => {
                    text.push(ch);
                    self.prompt = Some(Prompt::Search(text));
                    None
                }
                _ => {
                    self.prompt = Some(Prompt::Search(text));
                    None
                }
            },
            Prompt::Exec(mut text) => match key.code {
                KeyCode::Esc => None,
                KeyCode::Enter => {
                    let command: Vec<String> = text.split_whitespace().map(str::to_string).collect();
                    let id = self.selected.clone()?;
                    (!command.is_empty()).then_some(Command::Submit {
                        id,
                        kind: ActionKind::Exec { command },
                    })
                }
                KeyCode::Backspace => {
                    text.pop();
                    self.prompt = Some(Prompt::Exec(text));
                    None
                }
                KeyCode::Char(ch) => {
                    text.push(ch);
                    self.prompt = Some(Prompt::Exec(text));
                    None
                }
                _ => {
                    self.prompt = Some(Prompt::Exec(text));
                    None
                }
            },
        }
    }

    /// Log lines that pass the filter, oldest first
    pub fn visible_lines(&self) -> Vec<&LogLine> {
        self.filter.apply(&self.logs.lines)
    }
}

/// Short description of a history window, e.g. `tail 200, since 15m`
pub fn window_label(options: &LogOptions) -> String {
    let since = match options.since {
        None => "all".to_string(),
        Some(d) if d.as_secs() % 3600 == 0 => format!("{}h", d.as_secs() / 3600),
        Some(d) if d.as_secs() % 60 == 0 => format!("{}m", d.as_secs() / 60),
        Some(d) => format!("{}s", d.as_secs()),
    };
    format!("tail {}, since {}", options.tail, since)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use dockview_core::diff::DiffPolicy;
    use dockview_core::events;
    use dockview_core::model::{Entity, EntityKind};
    use dockview_core::snapshot::Snapshot;
    use dockview_core::store::ModelStore;

    use super::*;

    fn view(ids: &[&str]) -> std::sync::Arc<ModelView> {
        let (tx, _rx) = events::channel();
        let store = ModelStore::new(tx, DiffPolicy::default());
        store.apply_snapshot(Snapshot::new(
            1,
            Instant::now(),
            ids.iter()
                .map(|id| Entity::new(*id, format!("{id}-name"), EntityKind::Container).with_state(LifecycleState::Running))
                .collect(),
        ));
        store.current_view()
    }

    fn envelope(event: Event) -> Envelope {
        Envelope {
            id: 1,
            at: SystemTime::now(),
            event,
        }
    }

    fn line(seq: u64, text: &str) -> LogLine {
        LogLine {
            seq,
            at: SystemTime::now(),
            text: text.into(),
        }
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_selection_moves_and_opens_logs() {
        let view = view(&["a", "b", "c"]);
        let mut app = App::new(100);

        assert_eq!(app.sync_selection(&view), Some(Command::OpenLogs("a".into())));
        assert_eq!(app.sync_selection(&view), None);
        assert_eq!(app.move_selection(&view, 1), Some(Command::OpenLogs("b".into())));
        assert_eq!(app.move_selection(&view, 5), Some(Command::OpenLogs("c".into())));
        assert_eq!(app.move_selection(&view, 1), None);
        assert_eq!(app.move_selection(&view, -9), Some(Command::OpenLogs("a".into())));
    }

    #[test]
    fn test_lines_from_stale_session_are_dropped() {
        let view = view(&["a"]);
        let mut app = App::new(100);
        app.logs.attach(StreamHandle {
            id: "a".into(),
            session: 2,
        });

        app.handle_event(
            envelope(Event::LogLines {
                id: "a".into(),
                session: 1,
                lines: vec![line(1, "old")],
            }),
            &view,
        );
        app.handle_event(
            envelope(Event::LogLines {
                id: "a".into(),
                session: 2,
                lines: vec![line(1, "new")],
            }),
            &view,
        );

        let texts: Vec<&str> = app.logs.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["new"]);
    }

    fn single(state: LifecycleState) -> ModelStore {
        let (tx, _rx) = events::channel();
        let store = ModelStore::new(tx, DiffPolicy::default());
        store.apply_snapshot(Snapshot::new(1, Instant::now(), vec![
            Entity::new("a", "a-name", EntityKind::Container).with_state(state),
        ]));
        store
    }

    fn close_pane(app: &mut App, session: u64, view: &ModelView) {
        app.handle_event(
            envelope(Event::StreamClosed {
                id: "a".into(),
                session,
                reason: CloseReason::Ended,
            }),
            view,
        );
    }

    #[test]
    fn test_reopens_only_after_runtime_confirms_start() {
        let store = single(LifecycleState::Exited);
        let mut app = App::new(100);
        app.logs.attach(StreamHandle {
            id: "a".into(),
            session: 1,
        });
        assert_eq!(app.reopen_if_running(&store.current_view()), None);
        close_pane(&mut app, 1, &store.current_view());
        assert!(!app.logs.is_streaming());

        // Start pressed: displayed running, runtime still reports exited
        store.apply_optimistic("a", LifecycleState::Running).unwrap();
        assert_eq!(app.reopen_if_running(&store.current_view()), None);

        store.apply_snapshot(Snapshot::new(2, Instant::now(), vec![
            Entity::new("a", "a-name", EntityKind::Container).with_state(LifecycleState::Running),
        ]));
        assert_eq!(
            app.reopen_if_running(&store.current_view()),
            Some(Command::OpenLogs("a".into()))
        );
        assert_eq!(app.reopen_if_running(&store.current_view()), None);
    }

    #[test]
    fn test_reopens_after_restart_settles() {
        let store = single(LifecycleState::Running);
        let mut app = App::new(100);
        app.logs.attach(StreamHandle {
            id: "a".into(),
            session: 1,
        });
        assert_eq!(app.reopen_if_running(&store.current_view()), None);

        store.apply_optimistic("a", LifecycleState::Restarting).unwrap();
        close_pane(&mut app, 1, &store.current_view());
        assert_eq!(app.reopen_if_running(&store.current_view()), None);

        store.apply_snapshot(Snapshot::new(2, Instant::now(), vec![
            Entity::new("a", "a-name", EntityKind::Container).with_state(LifecycleState::Running),
        ]));
        assert_eq!(
            app.reopen_if_running(&store.current_view()),
            Some(Command::OpenLogs("a".into()))
        );
    }

    #[test]
    fn test_reattach_drops_previous_session_lines() {
        let view = view(&["a"]);
        let mut app = App::new(100);
        app.logs.attach(StreamHandle {
            id: "a".into(),
            session: 1,
        });
        app.handle_event(
            envelope(Event::LogLines {
                id: "a".into(),
                session: 1,
                lines: vec![line(1, "booting"), line(2, "ready")],
            }),
            &view,
        );
        close_pane(&mut app, 1, &view);

        app.logs.attach(StreamHandle {
            id: "a".into(),
            session: 2,
        });
        app.handle_event(
            envelope(Event::LogLines {
                id: "a".into(),
                session: 2,
                lines: vec![line(1, "ready")],
            }),
            &view,
        );
        let texts: Vec<&str> = app.logs.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["--- stream reopened ---", "ready"]);
    }

    #[test]
    fn test_history_window_keys_restart_stream() {
        let view = view(&["a"]);
        let mut app = App::new(100);
        assert_eq!(app.handle_key(key(KeyCode::Char('t')), &view), None);
        assert_eq!(app.log_options.tail, 400);

        app.logs.attach(StreamHandle {
            id: "a".into(),
            session: 1,
        });
        app.log_options.tail = 12800;
        assert_eq!(
            app.handle_key(key(KeyCode::Char('t')), &view),
            Some(Command::RestartLogs("a".into()))
        );
        assert_eq!(app.log_options.tail, 50);

        app.log_options.since = Some(Duration::from_secs(2880 * 60));
        app.handle_key(key(KeyCode::Char('w')), &view);
        assert_eq!(app.log_options.since, None);
        app.handle_key(key(KeyCode::Char('w')), &view);
        assert_eq!(app.log_options.since, Some(Duration::from_secs(300)));
        assert_eq!(window_label(&app.log_options), "tail 50, since 5m");
    }

    #[test]
    fn test_remove_needs_confirmation() {
        let view = view(&["a"]);
        let mut app = App::new(100);
        app.sync_selection(&view);

        assert_eq!(app.handle_key(key(KeyCode::Char('d')), &view), None);
        assert_eq!(app.prompt, Some(Prompt::ConfirmRemove("a".into())));
        assert_eq!(app.handle_key(key(KeyCode::Char('n')), &view), None);
        assert!(app.prompt.is_none());

        app.handle_key(key(KeyCode::Char('d')), &view);
        assert_eq!(
            app.handle_key(key(KeyCode::Char('y')), &view),
            Some(Command::Submit {
                id: "a".into(),
                kind: ActionKind::Remove
            })
        );
    }

    #[test]
    fn test_exec_prompt_builds_command() {
        let view = view(&["a"]);
        let mut app = App::new(100);
        app.sync_selection(&view);

        app.handle_key(key(KeyCode::Char('e')), &view);
        for ch in "ls -la".chars() {
            app.handle_key(key(KeyCode::Char(ch)), &view);
        }
        assert_eq!(
            app.handle_key(key(KeyCode::Enter), &view),
            Some(Command::Submit {
                id: "a".into(),
                kind: ActionKind::Exec {
                    command: vec!["ls".into(), "-la".into()]
                }
            })
        );
    }

    #[test]
    fn test_search_prompt_sets_filter() {
        let view = view(&["a"]);
        let mut app = App::new(100);
        app.logs.attach(StreamHandle {
            id: "a".into(),
            session: 1,
        });
        app.handle_event(
            envelope(Event::LogLines {
                id: "a".into(),
                session: 1,
                lines: vec![line(1, "GET /health"), line(2, "ERROR db down")],
            }),
            &view,
        );

        app.handle_key(key(KeyCode::Char('/')), &view);
        for ch in "db".chars() {
            app.handle_key(key(KeyCode::Char(ch)), &view);
        }
        app.handle_key(key(KeyCode::Enter), &view);

        let shown: Vec<u64> = app.visible_lines().iter().map(|l| l.seq).collect();
        assert_eq!(shown, vec![2]);
    }

    #[test]
    fn test_failed_action_toast() {
        let view = view(&["a"]);
        let mut app = App::new(100);
        app.handle_event(
            envelope(Event::ActionResult {
                action_id: dockview_core::events::ActionId(1),
                entity: "a".into(),
                kind: ActionKind::Start,
                outcome: ActionOutcome::Failed {
                    reason: "port is already allocated".into(),
                },
            }),
            &view,
        );
        let toast = app.toast.as_ref().unwrap();
        assert_eq!(toast.level, ToastLevel::Error);
        assert_eq!(toast.text, "start a-name failed: port is already allocated");

        app.tick(Instant::now() + TOAST_TTL);
        assert!(app.toast.is_none());
    }
}
