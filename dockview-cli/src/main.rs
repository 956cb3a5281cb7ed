mod adapters;
mod app;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crossterm::{
    event::{self, Event as CEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dockview_core::events::{Event, EventReceiver};
use dockview_core::{DashboardConfig, RuntimeAdapter, Session};

use adapters::DemoAdapter;
use app::{App, Command, ToastLevel};

#[derive(Parser)]
#[command(name = "dockview")]
#[command(about = "Terminal dashboard for Compose-style container environments", long_about = None)]
struct Cli {
    /// Config file (default: $DOCKVIEW_CONFIG, then dockview.yaml up from the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Poll interval in milliseconds
    #[arg(long, global = true)]
    interval_ms: Option<u64>,

    /// History lines fetched when a log stream opens
    #[arg(long, global = true)]
    log_lines: Option<usize>,

    /// Use a built-in demo runtime instead of Docker
    #[arg(long, global = true)]
    demo: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive dashboard (default)
    Tui,
    /// Print the current entity tree and exit
    Ps {
        #[arg(long)]
        json: bool,
    },
    /// Follow the logs of a container, service or stack
    Logs {
        /// Id, name or unique id prefix
        target: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<DashboardConfig> {
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let cwd = std::env::current_dir().unwrap_or_default();
            let (path, config) = DashboardConfig::discover_or_default(&cwd)?;
            if let Some(path) = path {
                info!(path = %path.display(), "loaded config");
            }
            config
        }
    };

    if let Some(ms) = cli.interval_ms {
        config.poll_interval_ms = ms;
    }
    if let Some(lines) = cli.log_lines {
        config.log.tail = lines;
    }
    config.validate()?;
    Ok(config)
}

/// The terminal belongs to the dashboard, so diagnostics go to a file and
/// only when asked for.
fn init_file_logging() {
    let enabled = std::env::var("DOCKVIEW_DEBUG").is_ok_and(|v| v == "1")
        || std::env::var_os("RUST_LOG").is_some();
    if !enabled {
        return;
    }
    if std::fs::create_dir_all("logs").is_err() {
        return;
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open("logs/dockview.log")
    else {
        return;
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .try_init();
}

fn init_stderr_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(feature = "docker")]
fn runtime_adapter() -> anyhow::Result<Arc<dyn RuntimeAdapter>> {
    let docker = adapters::DockerAdapter::connect().context("cannot connect to the Docker daemon")?;
    Ok(Arc::new(docker))
}

#[cfg(not(feature = "docker"))]
fn runtime_adapter() -> anyhow::Result<Arc<dyn RuntimeAdapter>> {
    bail!("built without Docker support; run with --demo")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Ps { .. }) | Some(Commands::Logs { .. }) => init_stderr_logging(),
        Some(Commands::Tui) | None => init_file_logging(),
    }

    let config = load_config(&cli)?;
    let adapter: Arc<dyn RuntimeAdapter> = if cli.demo {
        Arc::new(DemoAdapter::new())
    } else {
        runtime_adapter()?
    };
    let runtime = adapter.name();

    let (session, events) = Session::start(adapter, &config).await?;

    match cli.command {
        Some(Commands::Ps { json }) => {
            let res = run_ps(&session, json);
            session.shutdown().await;
            res
        }
        Some(Commands::Logs { target }) => run_logs(session, events, &target).await,
        Some(Commands::Tui) | None => run_tui(session, events, config.log.capacity, runtime).await,
    }
}

fn run_ps(session: &Session, json: bool) -> anyhow::Result<()> {
    let view = session.current_view();
    let rows = view.tree();

    if json {
        let out: Vec<serde_json::Value> = rows
            .iter()
            .map(|(depth, row)| {
                serde_json::json!({
                    "depth": depth,
                    "entity": &row.entity,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for (depth, row) in rows {
        let e = &row.entity;
        let cpu = e
            .resources
            .as_ref()
            .and_then(|r| r.cpu_percent)
            .map(|c| format!("{c:.1}%"))
            .unwrap_or_default();
        let mem = e
            .resources
            .as_ref()
            .and_then(|r| r.memory_used)
            .map(adapters::format_bytes)
            .unwrap_or_default();
        println!(
            "{:indent$}{:<width$} {:<10} {:>7} {:>9}  {}",
            "",
            e.name,
            e.state.label(),
            cpu,
            mem,
            e.status_text,
            indent = depth * 2,
            width = 32usize.saturating_sub(depth * 2),
        );
    }
    let summary = view.summary();
    println!(
        "\n{} Stacks, {} Running, {} Exited",
        summary.stacks, summary.running, summary.exited
    );
    Ok(())
}

async fn run_logs(session: Session, mut events: EventReceiver, target: &str) -> anyhow::Result<()> {
    let view = session.current_view();
    let Some(entity) = view.find(target) else {
        session.shutdown().await;
        bail!("no container, service or stack matches '{target}'");
    };
    let id = entity.entity.id.clone();
    let handle = session.open_logs(&id)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            envelope = events.recv() => {
                let Some(envelope) = envelope else { break };
                match envelope.event {
                    Event::LogLines { id, session: s, lines } if id == handle.id && s == handle.session => {
                        for line in lines {
                            println!("{}", line.text);
                        }
                    }
                    Event::StreamClosed { id, session: s, reason } if id == handle.id && s == handle.session => {
                        eprintln!("-- {reason}");
                        break;
                    }
                    Event::Runtime(connectivity) if !connectivity.is_connected() => {
                        warn!(?connectivity, "runtime unreachable");
                    }
                    _ => {}
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

// --- Terminal setup/teardown ---
fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn run_tui(
    session: Session,
    mut events: EventReceiver,
    log_capacity: usize,
    runtime: &'static str,
) -> anyhow::Result<()> {
    let mut terminal = setup_terminal()?;
    let mut app = App::new(log_capacity);
    app.log_options = session.log_options();

    let res = tui_loop(&mut terminal, &session, &mut events, &mut app, runtime).await;
    restore_terminal(terminal)?;
    session.shutdown().await;
    res
}

/// Apply one command; true when the dashboard should exit
fn execute(session: &Session, app: &mut App, command: Command) -> bool {
    match command {
        Command::Quit => return true,
        Command::Submit { id, kind } => {
            if let Err(e) = session.submit(&id, kind) {
                app.report(ToastLevel::Error, e.to_string());
            }
        }
        Command::Cancel(id) => {
            if let Err(e) = session.cancel(&id) {
                app.report(ToastLevel::Error, e.to_string());
            }
        }
        Command::OpenLogs(id) => {
            let same = app.logs.entity.as_deref() == Some(id.as_str());
            if same && app.logs.is_streaming() {
                return false;
            }
            if !same {
                if let Some(old) = app.logs.detach() {
                    session.close_logs(&old);
                }
            }
            match session.open_logs_with(&id, app.log_options.clone()) {
                Ok(handle) => app.logs.attach(handle),
                Err(e) => app.report(ToastLevel::Error, e.to_string()),
            }
        }
        Command::RestartLogs(id) => {
            if let Some(old) = app.logs.detach() {
                session.close_logs(&old);
            }
            match session.open_logs_with(&id, app.log_options.clone()) {
                Ok(handle) => {
                    app.logs.attach(handle);
                    app.logs.note(&format!("--- {} ---", app::window_label(&app.log_options)));
                }
                Err(e) => app.report(ToastLevel::Error, e.to_string()),
            }
        }
        Command::Refresh => session.refresh(),
    }
    false
}

async fn tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: &Session,
    events: &mut EventReceiver,
    app: &mut App,
    runtime: &'static str,
) -> anyhow::Result<()> {
    loop {
        let view = session.current_view();
        let mut commands: Vec<Command> = app.sync_selection(&view).into_iter().collect();
        for envelope in events.drain() {
            commands.extend(app.handle_event(envelope, &view));
        }
        commands.extend(app.reopen_if_running(&view));
        for command in commands {
            if execute(session, app, command) {
                return Ok(());
            }
        }

        app.tick(Instant::now());
        let view = session.current_view();
        terminal.draw(|f| ui::draw(f, app, &view, runtime))?;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let CEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if let Some(command) = app.handle_key(key, &view) {
            if execute(session, app, command) {
                return Ok(());
            }
        }
    }
}
