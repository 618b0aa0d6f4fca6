//! `st analyze`, `st runs`, `st cancel` — analyzer execution commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use std::time::Duration;
use strata_analyze::{AnalyzerEngine, EngineConfig, builtin_registry, load_rules_dir};
use strata_core::db::runs;
use strata_core::error::Result;
use strata_core::model::AnalyzerRun;
use strata_core::time::now_us;

use super::CliContext;
use crate::output::{format_ts, render};

/// Generous upper bound for CLI-side analyzer completion.
const RUN_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    #[command(subcommand)]
    pub command: AnalyzeCommand,
}

#[derive(Subcommand, Debug)]
pub enum AnalyzeCommand {
    /// Run an analyzer against a sketch and wait for it to finish.
    Run(RunArgs),
    /// List registered analyzers.
    List,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Sketch id.
    pub sketch: i64,
    /// Analyzer name (see `st analyze list`).
    pub analyzer: String,

    /// Restrict the run to these attached timelines.
    #[arg(long = "timeline")]
    pub timelines: Vec<i64>,
}

#[derive(Args, Debug)]
pub struct RunsArgs {
    /// Sketch id.
    pub sketch: i64,
}

#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Run id.
    pub run: i64,
}

#[derive(Debug, Serialize)]
struct RunOutput {
    ok: bool,
    run: AnalyzerRun,
}

#[derive(Debug, Serialize)]
struct RunListOutput {
    runs: Vec<AnalyzerRun>,
}

#[derive(Debug, Serialize)]
struct AnalyzerListOutput {
    analyzers: Vec<AnalyzerInfo>,
}

#[derive(Debug, Serialize)]
struct AnalyzerInfo {
    name: String,
    description: String,
}

fn describe(run: &AnalyzerRun) -> String {
    let mut text = format!(
        "run {} '{}' on sketch {} [{}] findings={}",
        run.run_id, run.analyzer, run.sketch_id, run.state, run.finding_count
    );
    if let Some(detail) = &run.error_detail {
        text.push_str(&format!("\n  error: {detail}"));
    }
    if !run.result_summary.is_empty() {
        for line in run.result_summary.lines() {
            text.push_str(&format!("\n  {line}"));
        }
    }
    text
}

fn engine_for(ctx: &CliContext) -> Result<AnalyzerEngine> {
    let rules_dir = ctx.data.rules_dir(&ctx.config);
    let rules = if rules_dir.is_dir() {
        load_rules_dir(&rules_dir)?
    } else {
        Vec::new()
    };
    let registry = builtin_registry(rules)?;
    Ok(AnalyzerEngine::new(
        registry,
        &ctx.data.metadata_db(),
        &ctx.data.events_db(),
        EngineConfig {
            workers: ctx.config.analyze.workers,
            page_size: ctx.config.query.page_size,
        },
    ))
}

pub fn run(ctx: &CliContext, args: &AnalyzeArgs) -> Result<()> {
    match &args.command {
        AnalyzeCommand::Run(run_args) => {
            ctx.meta()?; // fail early if uninitialized
            let engine = engine_for(ctx)?;
            let scope = if run_args.timelines.is_empty() {
                None
            } else {
                Some(run_args.timelines.clone())
            };

            let pending =
                engine.schedule(run_args.sketch, &run_args.analyzer, scope, ctx.user()?)?;
            let finished = engine.wait_for_run(pending.run_id, RUN_TIMEOUT)?;
            render(
                ctx.mode,
                &describe(&finished),
                &RunOutput {
                    ok: true,
                    run: finished,
                },
            );
        }
        AnalyzeCommand::List => {
            let engine = engine_for(ctx)?;
            let analyzers: Vec<AnalyzerInfo> = engine
                .analyzers()
                .into_iter()
                .map(|(name, description)| AnalyzerInfo {
                    name: name.to_string(),
                    description: description.to_string(),
                })
                .collect();
            let human = analyzers
                .iter()
                .map(|a| format!("{:<12} {}", a.name, a.description))
                .collect::<Vec<_>>()
                .join("\n");
            render(ctx.mode, &human, &AnalyzerListOutput { analyzers });
        }
    }
    Ok(())
}

pub fn run_runs(ctx: &CliContext, args: &RunsArgs) -> Result<()> {
    let meta = ctx.meta()?;
    let all = runs::list(&meta, args.sketch, ctx.user()?)?;

    let mut lines = Vec::new();
    for run in &all {
        lines.push(format!(
            "{:>4}  {:<12} {:<8} findings={:<6} {}",
            run.run_id,
            run.analyzer,
            run.state.to_string(),
            run.finding_count,
            format_ts(run.created_at_us),
        ));
    }
    let human = if lines.is_empty() {
        "no analyzer runs".to_string()
    } else {
        lines.join("\n")
    };
    render(ctx.mode, &human, &RunListOutput { runs: all });
    Ok(())
}

/// Cancel by marking the run row. For a run executing in another process
/// the row transition is authoritative: its engine refuses further
/// finalization and its pending pickup is skipped.
pub fn run_cancel(ctx: &CliContext, args: &CancelArgs) -> Result<()> {
    let meta = ctx.meta()?;
    let run = runs::mark_error(
        &meta,
        args.run,
        strata_core::model::run::CANCELLED_DETAIL,
        now_us(),
    )?;
    render(
        ctx.mode,
        &describe(&run),
        &RunOutput { ok: true, run },
    );
    Ok(())
}
