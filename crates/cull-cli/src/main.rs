#![forbid(unsafe_code)]

mod cmd;
mod operator;
mod output;
mod tui;

use clap::{CommandFactory, Parser, Subcommand};
use cmd::{CmdContext, NotInitialized};
use cull_core::config::ProjectPaths;
use operator::OperatorResolutionError;
use output::{CliError, OutputMode, render_error};
use std::env;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "cull: keyboard-driven content triage",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Override operator identity (skips env resolution).
    #[arg(long, global = true)]
    operator: Option<String>,

    /// Suppress non-essential output.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Output mode for errors raised before configuration is loaded.
    const fn fallback_output(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Text
        }
    }

    fn operator_flag(&self) -> Option<&str> {
        self.operator.as_deref()
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a cull project",
        long_about = "Create the .cull directory, its config file and the triage database.",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    cull init\n\n    # Start over, keeping nothing\n    cull init --force"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Load a content snapshot",
        long_about = "Load groups and items from a JSON content snapshot. Items missing from a later snapshot are marked trashed; their decisions are kept.",
        after_help = "EXAMPLES:\n    # Load an export\n    cull ingest --file site.json\n\n    # Read from stdin\n    export-site | cull ingest --file -"
    )]
    Ingest(cmd::ingest::IngestArgs),

    #[command(
        next_help_heading = "Read",
        about = "List content groups",
        long_about = "List every group with its total, triaged and remaining counts.",
        after_help = "EXAMPLES:\n    # Show progress per group\n    cull groups\n\n    # Emit machine-readable output\n    cull groups --json"
    )]
    Groups,

    #[command(
        next_help_heading = "Read",
        about = "List the items of a group",
        long_about = "List the active items of one group in worklist order.",
        after_help = "EXAMPLES:\n    # Every page\n    cull list --group page\n\n    # Pages nobody has looked at yet\n    cull list --group page --disposition undecided"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show the decision log",
        long_about = "Show recorded decisions, newest first.",
        after_help = "EXAMPLES:\n    # Every decision\n    cull decisions\n\n    # Decisions on posts only\n    cull decisions --group post --json"
    )]
    Decisions(cmd::decisions::DecisionsArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show links to and from an item",
        long_about = "Show which items link to an item and which items it links to.",
        after_help = "EXAMPLES:\n    # Before removing a page, see who links to it\n    cull links 42"
    )]
    Links(cmd::links::LinksArgs),

    #[command(
        next_help_heading = "Triage",
        about = "Record one decision",
        long_about = "Record keep or remove for one item. Remove also moves the item to draft.",
        after_help = "EXAMPLES:\n    # Keep an item\n    cull decide 42 keep\n\n    # Remove an item\n    cull decide 42 remove --operator alice"
    )]
    Decide(cmd::decide::DecideArgs),

    #[command(
        next_help_heading = "Triage",
        about = "Open the review screen",
        long_about = "Open the full-screen review UI. Space keeps, Esc or Delete removes, arrows navigate.",
        after_help = "EXAMPLES:\n    # Resume where you left off\n    cull review\n\n    # Jump to a page\n    cull review --at 'type=page&post=12'"
    )]
    Review(cmd::review::ReviewArgs),

    #[command(
        next_help_heading = "Metrics",
        about = "Import, export and inspect traffic metrics",
        after_help = "EXAMPLES:\n    # Import an analytics export (admin)\n    cull metrics import ga.csv\n\n    # Write it back with removed pages marked\n    cull metrics export --output ga-marked.csv\n\n    # Metrics for one page\n    cull metrics show /about/"
    )]
    Metrics(cmd::metrics::MetricsArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Delete all triage data",
        long_about = "Delete every recorded decision of the active backend and the imported metrics. Admin only.",
        after_help = "EXAMPLES:\n    # Start triage over\n    cull clear --yes"
    )]
    Clear(cmd::clear::ClearArgs),

    #[command(
        next_help_heading = "Project Maintenance",
        about = "Generate shell completion scripts",
        long_about = "Generate shell completion scripts for supported shells.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    cull completions bash\n\n    # Generate zsh completions\n    cull completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

/// Install the tracing subscriber.
///
/// Logs go to stderr, or to `log_file` while the review screen owns the
/// terminal.
fn init_tracing(log_file: Option<&Path>) {
    let filter = EnvFilter::try_from_env("CULL_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "cull=debug,info"
        } else {
            "cull=info,warn"
        })
    });

    let format = env::var("CULL_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);

    if let Some(path) = log_file {
        let writer = OpenOptions::new().create(true).append(true).open(path).ok();
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(writer.map_or_else(
                || Box::new(std::io::sink()) as Box<dyn std::io::Write + Send>,
                |file| Box::new(file) as Box<dyn std::io::Write + Send>,
            )));
        match format.as_str() {
            "json" => registry.with(layer.json()).init(),
            _ => registry.with(layer.compact()).init(),
        }
        return;
    }

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Turn a handler error into the structured form printed on stderr.
fn cli_error(err: &anyhow::Error) -> CliError {
    if let Some(op) = err.downcast_ref::<OperatorResolutionError>() {
        return CliError::with_details(
            op.message.clone(),
            "Pass --operator <name> or set CULL_OPERATOR",
            op.code,
        );
    }
    if let Some(missing) = err.downcast_ref::<NotInitialized>() {
        let code = NotInitialized::CODE;
        return CliError::with_details(
            missing.to_string(),
            code.hint().unwrap_or("Run `cull init`"),
            code.code(),
        );
    }
    CliError::from_anyhow(err)
}

async fn run(cli: &Cli, ctx: &CmdContext) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init(args) => cmd::init::run_init(args, ctx),
        Commands::Ingest(args) => cmd::ingest::run_ingest(args, ctx),
        Commands::Groups => cmd::groups::run_groups(ctx).await,
        Commands::List(args) => cmd::list::run_list(args, ctx).await,
        Commands::Decisions(args) => cmd::decisions::run_decisions(args, ctx).await,
        Commands::Links(args) => cmd::links::run_links(args, ctx).await,
        Commands::Decide(args) => cmd::decide::run_decide(args, ctx).await,
        Commands::Review(args) => cmd::review::run_review(args, ctx).await,
        Commands::Metrics(args) => cmd::metrics::run_metrics(args, ctx).await,
        Commands::Clear(args) => cmd::clear::run_clear(args, ctx).await,
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

fn fail(mode: OutputMode, err: &CliError) -> ExitCode {
    let _ = render_error(mode, err);
    ExitCode::FAILURE
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let project_root = match env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            return fail(
                cli.fallback_output(),
                &CliError::new(format!("cannot read current directory: {err}")),
            );
        }
    };

    let paths = ProjectPaths::new(&project_root);
    let log_file = matches!(cli.command, Commands::Review(_))
        .then(|| paths.log_file())
        .filter(|_| paths.is_initialized());
    init_tracing(log_file.as_deref());

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let ctx = match CmdContext::load(
        &project_root,
        cli.json,
        cli.operator_flag().map(str::to_string),
        cli.quiet,
    ) {
        Ok(ctx) => ctx,
        Err(err) => return fail(cli.fallback_output(), &cli_error(&err)),
    };
    debug!(output = ?ctx.output, "configuration resolved");

    match run(&cli, &ctx).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            debug!(error = ?err, "command failed");
            fail(ctx.output, &cli_error(&err))
        }
    }
}
