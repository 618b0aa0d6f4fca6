#![forbid(unsafe_code)]

//! `st` — collaborative forensic timeline analysis from the terminal.

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::CliContext;
use output::{OutputMode, render_error};
use std::env;
use strata_core::config::{DataDir, StrataConfig};
use strata_core::error::{Result, StrataError};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "strata: collaborative forensic timeline analysis",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging (overrides STRATA_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Acting user identity (falls back to STRATA_USER).
    #[arg(long, global = true)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }

    fn resolve_user(&self) -> Option<String> {
        self.user
            .clone()
            .or_else(|| env::var("STRATA_USER").ok())
            .filter(|user| !user.trim().is_empty())
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Initialize a strata workspace in the current directory")]
    Init(cmd::init::InitArgs),

    #[command(
        about = "Import a timeline from a JSONL file",
        after_help = "EXAMPLES:\n    # Import and wait for completion\n    st import laptop.jsonl --name laptop\n\n    # Fire and forget; watch with `st timelines`\n    st import big.jsonl --no-wait"
    )]
    Import(cmd::import::ImportArgs),

    #[command(about = "List imported timelines")]
    Timelines(cmd::timelines::TimelinesArgs),

    #[command(about = "Create, inspect, share, and compose sketches")]
    Sketch(cmd::sketch::SketchArgs),

    #[command(
        about = "Query a sketch's events",
        after_help = "EXAMPLES:\n    # Full-text search, best match first\n    st explore 1 --query \"psexec OR mimikatz\" --sort relevance\n\n    # Structured filter\n    st explore 1 --filter '{\"kind\":\"field_eq\",\"field\":\"username\",\"value\":\"alice\"}'"
    )]
    Explore(cmd::explore::ExploreArgs),

    #[command(about = "Add or remove event tags")]
    Tag(cmd::annotate::TagArgs),

    #[command(about = "Toggle your star on an event")]
    Star(cmd::annotate::StarArgs),

    #[command(about = "Append a comment to an event")]
    Comment(cmd::annotate::CommentArgs),

    #[command(about = "Show an event's annotations in this sketch")]
    Annotations(cmd::annotate::AnnotationsArgs),

    #[command(about = "List and save sketch-scoped searches")]
    Searches(cmd::searches::SearchesArgs),

    #[command(about = "Run analyzers and list what is registered")]
    Analyze(cmd::analyze::AnalyzeArgs),

    #[command(about = "List a sketch's analyzer runs")]
    Runs(cmd::analyze::RunsArgs),

    #[command(about = "Cancel a pending or started analyzer run")]
    Cancel(cmd::analyze::CancelArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("STRATA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(cli: &Cli, ctx: &CliContext) -> Result<()> {
    match &cli.command {
        Commands::Init(args) => cmd::init::run(ctx, args),
        Commands::Import(args) => cmd::import::run(ctx, args),
        Commands::Timelines(args) => cmd::timelines::run(ctx, args),
        Commands::Sketch(args) => cmd::sketch::run(ctx, args),
        Commands::Explore(args) => cmd::explore::run(ctx, args),
        Commands::Tag(args) => cmd::annotate::run_tag(ctx, args),
        Commands::Star(args) => cmd::annotate::run_star(ctx, args),
        Commands::Comment(args) => cmd::annotate::run_comment(ctx, args),
        Commands::Annotations(args) => cmd::annotate::run_annotations(ctx, args),
        Commands::Searches(args) => cmd::searches::run(ctx, args),
        Commands::Analyze(args) => cmd::analyze::run(ctx, args),
        Commands::Runs(args) => cmd::analyze::run_runs(ctx, args),
        Commands::Cancel(args) => cmd::analyze::run_cancel(ctx, args),
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mode = cli.output_mode();
    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            let err = StrataError::Internal(anyhow::anyhow!("resolve working directory: {err}"));
            std::process::exit(render_error(mode, &err));
        }
    };

    let data = DataDir::under(&cwd);
    let config = match StrataConfig::load(data.root()) {
        Ok(config) => config,
        Err(err) => {
            std::process::exit(render_error(mode, &StrataError::Internal(err)));
        }
    };

    let ctx = CliContext::new(data, config, mode, cli.resolve_user());
    if let Err(err) = dispatch(&cli, &ctx) {
        std::process::exit(render_error(mode, &err));
    }
}
