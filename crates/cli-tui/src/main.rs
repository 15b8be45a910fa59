use anyhow::{Context, Result};
use clap::Parser;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::stdout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use swarmview_core::{Client, StateDirSession};

mod app;
mod settings;
mod ui;

use app::{App, GlyphIcons};
use ui::ui;

/// Terminal client for a torrent daemon's state directory
#[derive(Parser, Debug)]
#[command(name = "swarmtop", author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = swarmview_core::load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let session = StateDirSession::new(cfg.state_dir.clone(), cfg.command_dir());
    let mut app = App::new(Client::new(session, cfg, Arc::new(GlyphIcons)))?;

    // Setup terminal
    crossterm::terminal::enable_raw_mode()?;
    let mut stdout = stdout();
    crossterm::execute!(stdout, crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app, &runtime);

    // Restore terminal
    crossterm::terminal::disable_raw_mode()?;
    crossterm::execute!(
        terminal.backend_mut(),
        crossterm::terminal::LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    result
}

fn run(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
    runtime: &tokio::runtime::Runtime,
) -> Result<()> {
    let mut last_tick: Option<Instant> = None;

    loop {
        // Read each pass; the Settings tab can change it.
        let interval = app.client.config().poll_interval();
        let due = last_tick.map(|t| t.elapsed() >= interval).unwrap_or(true);
        if due || app.client.wants_refresh() {
            runtime.block_on(app.refresh());
            last_tick = Some(Instant::now());
        }
        app.expire_message();

        terminal.draw(|f| ui(f, app))?;

        // Wake up for the next tick, or sooner for input.
        let until_tick = last_tick
            .map(|t| interval.saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);
        let poll_timeout = until_tick.min(Duration::from_millis(250));

        if crossterm::event::poll(poll_timeout)? {
            if let crossterm::event::Event::Key(key) = crossterm::event::read()? {
                if key.kind == crossterm::event::KeyEventKind::Press {
                    if let Some(intent) = app.handle_key(key) {
                        if let Err(e) = runtime.block_on(app.run_intent(intent)) {
                            app.set_message(format!("❌ {:#}", e));
                        }
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}
