//! Frame layout
//!
//! ```text
//! [ header: summary, connectivity, pending actions ]
//! [ entity tree | details + sparklines           ]
//! [             | logs                            ]
//! [ footer: key hints or prompt ]
//! ```

use std::time::{Duration, SystemTime};

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::Style;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Sparkline, Wrap};

use dockview_core::events::Connectivity;
use dockview_core::log_filter::{LogLevel, detect_level};
use dockview_core::view::{EntityView, ModelView, Reachability};

use super::styles;
use crate::adapters::format_bytes;
use crate::app::{App, Prompt, ToastLevel, window_label};

/// Format a SystemTime as HH:MM:SS (UTC) for log display
fn format_timestamp(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => {
            let secs = duration.as_secs();
            let hours = (secs / 3600) % 24;
            let minutes = (secs / 60) % 60;
            let seconds = secs % 60;
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        }
        Err(_) => "??:??:??".to_string(),
    }
}

fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn level_style(level: LogLevel) -> Style {
    match level {
        LogLevel::Error => styles::error(),
        LogLevel::Warn => styles::warn(),
        LogLevel::Debug => styles::text_muted(),
        LogLevel::Info => styles::text(),
    }
}

pub fn draw(f: &mut Frame, app: &App, view: &ModelView, runtime: &str) {
    let area = f.area();

    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(outer[1]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(3)])
        .split(main[1]);

    draw_header(f, app, view, runtime, outer[0]);
    draw_tree(f, app, view, main[0]);
    draw_details(f, app, view, right[0]);
    draw_logs(f, app, view, right[1]);
    draw_footer(f, app, outer[2]);

    if let Some(toast) = &app.toast {
        let width = (toast.text.chars().count() as u16 + 4).min(area.width);
        let rect = Rect {
            x: area.width.saturating_sub(width),
            y: area.height.saturating_sub(4),
            width,
            height: 3.min(area.height),
        };
        let style = match toast.level {
            ToastLevel::Info => styles::info(),
            ToastLevel::Success => styles::success(),
            ToastLevel::Error => styles::error(),
        };
        f.render_widget(Clear, rect);
        f.render_widget(
            Paragraph::new(toast.text.as_str())
                .style(style)
                .block(Block::default().borders(Borders::ALL).border_style(style)),
            rect,
        );
    }

    if app.help_open {
        draw_help(f, area);
    }
}

fn draw_header(f: &mut Frame, app: &App, view: &ModelView, runtime: &str, area: Rect) {
    let summary = view.summary();
    let connectivity = match &view.connectivity {
        Connectivity::Connected => Span::styled(format!("● {runtime}"), styles::success()),
        Connectivity::Unavailable { .. } => Span::styled(format!("● {runtime} unreachable"), styles::error()),
    };
    let active = view.pending().filter(|p| p.status.is_active()).count();

    let mut spans = vec![
        Span::styled(" dockview ", styles::accent_bold()),
        connectivity,
        Span::raw("  "),
        Span::styled(
            format!(
                "{} Stacks, {} Running, {} Exited",
                summary.stacks, summary.running, summary.exited
            ),
            styles::text(),
        ),
    ];
    if active > 0 {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(format!("{active} pending"), styles::warn()));
    }
    spans.push(Span::raw("  "));
    spans.push(Span::styled(format!("⏱ {}", format_uptime(app.uptime())), styles::text_muted()));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn tree_row<'a>(depth: usize, row: &'a EntityView, view: &ModelView) -> ListItem<'a> {
    let entity = &row.entity;
    let live = row.reachability == Reachability::Live;
    let state_style = if !live {
        styles::text_muted()
    } else if row.is_optimistic() {
        styles::optimistic()
    } else {
        styles::state(entity.state)
    };

    let mut spans = vec![
        Span::raw("  ".repeat(depth)),
        Span::styled(format!("{} ", styles::kind_icon(entity.kind)), styles::text_dim()),
        Span::styled(format!("{} ", styles::state_icon(entity.state)), state_style),
        Span::styled(entity.name.as_str(), if live { styles::text() } else { styles::text_muted() }),
        Span::styled(format!(" [{}]", entity.state.label()), state_style),
    ];

    if let Some(sample) = entity.resources.as_ref().filter(|_| entity.state.is_running()) {
        let style = if sample.stale { styles::text_muted() } else { styles::text_dim() };
        let cpu = sample.cpu_percent.map(|c| format!(" {c:.1}%")).unwrap_or_default();
        let mem = sample.memory_used.map(|m| format!(" {}", format_bytes(m))).unwrap_or_default();
        spans.push(Span::styled(format!("{cpu}{mem}"), style));
    }
    if let Some(health) = entity.health {
        spans.push(Span::raw(" "));
        spans.push(Span::styled(styles::health_icon(health), styles::health(health)));
    }
    if let Some(pending) = view.pending_for(&entity.id).filter(|p| p.status.is_active()) {
        spans.push(Span::styled(
            format!(" ({} {})", pending.kind.label(), pending.status.label()),
            styles::warn(),
        ));
    }
    ListItem::new(Line::from(spans))
}

fn draw_tree(f: &mut Frame, app: &App, view: &ModelView, area: Rect) {
    let rows = view.tree();
    let selected = app
        .selected
        .as_deref()
        .and_then(|id| rows.iter().position(|(_, e)| e.entity.id == id));

    let items: Vec<ListItem> = if rows.is_empty() {
        vec![ListItem::new(Line::styled("No containers.", styles::text_muted()))]
    } else {
        rows.iter().map(|(depth, row)| tree_row(*depth, row, view)).collect()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(styles::border(true))
                .title(format!(" Containers ({}) ", view.summary().containers)),
        )
        .highlight_style(styles::selection());

    let mut state = ListState::default();
    state.select(selected);
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_details(f: &mut Frame, app: &App, view: &ModelView, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(false))
        .title(" Details ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(row) = app.selected_view(view) else {
        f.render_widget(Paragraph::new(Line::styled("Nothing selected", styles::text_muted())), inner);
        return;
    };
    let entity = &row.entity;

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(inner);

    let mut lines = vec![
        Line::from(vec![
            Span::styled(entity.name.as_str(), styles::title()),
            Span::styled(format!("  {}", entity.kind.label()), styles::text_dim()),
        ]),
        Line::styled(entity.status_text.as_str(), styles::state(entity.state)),
    ];
    if let Some(image) = &entity.image {
        lines.push(Line::styled(format!("image {image}"), styles::text_dim()));
    }
    if row.is_optimistic() {
        lines.push(Line::styled(
            format!("observed {}", row.observed_state.label()),
            styles::optimistic(),
        ));
    }
    if let Some(sample) = &entity.resources {
        let net = match (sample.net_rx_bytes, sample.net_tx_bytes) {
            (Some(rx), Some(tx)) => format!("net ↓{} ↑{}", format_bytes(rx), format_bytes(tx)),
            _ => String::new(),
        };
        let mem = sample
            .memory_percent()
            .map(|p| format!("mem {p:.0}%  "))
            .unwrap_or_default();
        lines.push(Line::styled(format!("{mem}{net}"), styles::text_dim()));
    }
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), cols[0]);

    let charts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)])
        .split(cols[1]);

    // Tenths of a percent so small loads still show
    let cpu: Vec<u64> = app.history.cpu(&entity.id).map(|s| s.sparkline(10.0)).unwrap_or_default();
    let mem: Vec<u64> = app.history.mem(&entity.id).map(|s| s.sparkline(1.0)).unwrap_or_default();
    let cpu_title = app
        .history
        .cpu(&entity.id)
        .and_then(|s| s.latest())
        .map(|v| format!("cpu {v:.1}%"))
        .unwrap_or_else(|| "cpu".into());
    let mem_title = app
        .history
        .mem(&entity.id)
        .and_then(|s| s.latest())
        .map(|v| format!("mem {v:.0}MB"))
        .unwrap_or_else(|| "mem".into());

    f.render_widget(
        Sparkline::default()
            .block(Block::default().title(cpu_title))
            .data(&cpu)
            .style(styles::success()),
        charts[0],
    );
    f.render_widget(
        Sparkline::default()
            .block(Block::default().title(mem_title))
            .data(&mem)
            .style(styles::info()),
        charts[1],
    );
}

fn draw_logs(f: &mut Frame, app: &App, view: &ModelView, area: Rect) {
    let pane = &app.logs;
    let name = pane
        .entity
        .as_deref()
        .map(|id| view.get(id).map(|e| e.entity.name.as_str()).unwrap_or(id))
        .unwrap_or("-");
    let mode = if pane.follow { "FOLLOW" } else { "PAUSED" };
    let mut title = format!(
        " Logs: {name} [{mode}] {} ({}) ",
        app.filter.label(),
        window_label(&app.log_options)
    );
    if let Some(reason) = &pane.closed {
        title.push_str(&format!("({reason}) "));
    }

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border(false))
        .title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let visible = app.visible_lines();
    let height = inner.height as usize;
    let end = visible.len().saturating_sub(pane.scroll);
    let start = end.saturating_sub(height);

    let lines: Vec<Line> = visible[start..end]
        .iter()
        .map(|l| {
            Line::from(vec![
                Span::styled(format!("{} ", format_timestamp(l.at)), styles::text_muted()),
                Span::styled(l.text.as_str(), level_style(detect_level(&l.text))),
            ])
        })
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_footer(f: &mut Frame, app: &App, area: Rect) {
    let line = match &app.prompt {
        Some(Prompt::Search(text)) => Line::from(vec![
            Span::styled(" search: ", styles::key_hint()),
            Span::styled(format!("{text}▏"), styles::text()),
        ]),
        Some(Prompt::Exec(text)) => Line::from(vec![
            Span::styled(" exec: ", styles::key_hint()),
            Span::styled(format!("{text}▏"), styles::text()),
        ]),
        Some(Prompt::ConfirmRemove(id)) => Line::from(vec![
            Span::styled(format!(" remove {id}? "), styles::error()),
            Span::styled("y/N", styles::key_hint()),
        ]),
        None => {
            let hints = [
                ("s", "start"),
                ("x", "stop"),
                ("r", "restart"),
                ("d", "remove"),
                ("e", "exec"),
                ("c", "cancel"),
                ("/", "search"),
                ("l", "level"),
                ("f", "follow"),
                ("?", "help"),
                ("q", "quit"),
            ];
            let mut spans = vec![Span::raw(" ")];
            for (key, label) in hints {
                spans.push(Span::styled(key, styles::key_hint()));
                spans.push(Span::styled(format!(" {label}  "), styles::text_dim()));
            }
            Line::from(spans)
        }
    };
    f.render_widget(Paragraph::new(line), area);
}

fn draw_help(f: &mut Frame, area: Rect) {
    let width = 52.min(area.width);
    let height = 18.min(area.height);
    let rect = Rect {
        x: (area.width.saturating_sub(width)) / 2,
        y: (area.height.saturating_sub(height)) / 2,
        width,
        height,
    };
    f.render_widget(Clear, rect);

    let keys = [
        ("↑/↓ j/k", "select entity"),
        ("s / x / r", "start / stop / restart"),
        ("d", "remove (asks first)"),
        ("e", "exec a command in the container"),
        ("c", "cancel a queued action"),
        ("/", "search logs"),
        ("Esc", "clear search"),
        ("l", "cycle level filter"),
        ("t", "cycle history lines"),
        ("w", "cycle history window"),
        ("f", "toggle follow"),
        ("PgUp/PgDn", "scroll logs"),
        ("R / F5", "refresh now"),
        ("q", "quit"),
    ];
    let lines: Vec<Line> = keys
        .iter()
        .map(|(key, what)| {
            Line::from(vec![
                Span::styled(format!(" {key:<12}"), styles::key_hint()),
                Span::styled(*what, styles::text()),
            ])
        })
        .collect();
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(styles::border(true))
                .title(" Keys "),
        ),
        rect,
    );
}
