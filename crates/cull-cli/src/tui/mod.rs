//! Terminal user interface (TUI) for cull.
//!
//! ## Entry points
//!
//! - [`run_review`]: full-screen triage of the content groups.

pub mod keymap;
mod review;

use anyhow::{Context as _, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use cull_core::ContentDirectory;
use cull_core::location::SessionLocation;
use cull_triage::TriageSession;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cmd::CmdContext;
use review::ReviewView;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

type Term = Terminal<CrosstermBackend<Stdout>>;

fn read_saved_location(path: &Path) -> SessionLocation {
    std::fs::read_to_string(path)
        .map(|raw| SessionLocation::from_query(raw.trim()))
        .unwrap_or_default()
}

/// Rewrite the group and item of the saved location, keeping any other
/// parameters already in the file.
fn save_location(path: &Path, location: &SessionLocation) {
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let query = location.merge_into(existing.trim());
    if let Err(err) = std::fs::write(path, format!("{query}\n")) {
        warn!(path = %path.display(), error = %err, "could not save session location");
    }
}

fn setup_terminal() -> Result<Term> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    // Restore the terminal on panic.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(panic_info);
    }));
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Term) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

async fn event_loop(terminal: &mut Term, view: &mut ReviewView, session_file: &Path) -> Result<()> {
    let mut saved = view.location();
    loop {
        view.drain_finished().await;
        let location = view.location();
        if location != saved {
            save_location(session_file, &location);
            saved = location;
        }

        terminal.draw(|frame| view.render(frame))?;
        if view.should_quit() {
            break;
        }

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    view.handle_key(key).await;
                }
            }
        }
        // Let spawned decision writes run.
        tokio::task::yield_now().await;
    }

    view.settle().await;
    let location = view.location();
    if location != saved {
        save_location(session_file, &location);
    }
    Ok(())
}

/// Open the review screen.
///
/// The session resumes at `at` (a `type=<group>&post=<item>` query) when
/// given, otherwise at the location saved by the previous run.
///
/// # Errors
///
/// Returns an error if no operator resolves, the store cannot be opened, the
/// group list cannot be fetched, or the terminal cannot be driven.
pub async fn run_review(at: Option<&str>, ctx: &CmdContext) -> Result<()> {
    let directory = ctx.open_operator()?;
    let operator = directory.operator().clone();
    let session_file = ctx.paths.session();

    let mut session = TriageSession::open(Arc::clone(&directory) as Arc<dyn ContentDirectory>)
        .await
        .context("open triage session")?;
    let location = at.map_or_else(|| read_saved_location(&session_file), SessionLocation::from_query);
    if !location.is_empty() {
        if let Err(err) = session.restore(&location).await {
            warn!(location = %location, error = %err, "could not restore session location");
        }
    }

    let links = directory.get_link_graph().await.unwrap_or_else(|err| {
        warn!(error = %err, "link graph unavailable");
        cull_core::links::LinkGraph::default()
    });
    let metrics = directory.get_metrics().await.unwrap_or_else(|err| {
        warn!(error = %err, "metrics unavailable");
        cull_core::metrics::MetricsTable::default()
    });

    info!(operator = %operator.name, location = %location, "review started");
    let mut view = ReviewView::new(
        session,
        links,
        metrics,
        ctx.config.project.metrics.clone(),
        operator,
    );

    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, &mut view, &session_file).await;
    restore_terminal(&mut terminal)?;
    info!("review finished");
    result
}
