//! `st timelines` — list imported timelines, remove unreferenced ones.

use clap::{Args, Subcommand};
use serde::Serialize;
use strata_core::db::timelines;
use strata_core::error::Result;
use strata_core::model::Timeline;
use strata_search::import::delete_timeline;

use super::CliContext;
use crate::output::{format_ts, render};

#[derive(Args, Debug)]
pub struct TimelinesArgs {
    #[command(subcommand)]
    pub command: Option<TimelinesCommand>,
}

#[derive(Subcommand, Debug)]
pub enum TimelinesCommand {
    /// Remove a timeline and its index documents. Refused while any sketch
    /// references the timeline.
    Rm(RmArgs),
}

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Timeline id.
    pub timeline: i64,
}

#[derive(Debug, Serialize)]
struct TimelinesOutput {
    timelines: Vec<Timeline>,
}

fn list(ctx: &CliContext) -> Result<()> {
    let meta = ctx.meta()?;
    let all = timelines::list(&meta)?;

    let mut lines = Vec::new();
    for timeline in &all {
        lines.push(format!(
            "{:>4}  {:<24} {:<9} {:>8} events  {:>6} malformed  {}",
            timeline.timeline_id,
            timeline.name,
            timeline.status.to_string(),
            timeline.event_count,
            timeline.malformed_count,
            format_ts(timeline.created_at_us),
        ));
    }
    let human = if lines.is_empty() {
        "no timelines imported yet".to_string()
    } else {
        lines.join("\n")
    };

    render(ctx.mode, &human, &TimelinesOutput { timelines: all });
    Ok(())
}

pub fn run(ctx: &CliContext, args: &TimelinesArgs) -> Result<()> {
    match &args.command {
        None => list(ctx),
        Some(TimelinesCommand::Rm(rm)) => {
            let meta = ctx.meta()?;
            let mut store = ctx.store()?;
            let dropped = delete_timeline(&meta, &mut store, rm.timeline)?;
            render(
                ctx.mode,
                &format!("timeline {} removed ({dropped} events dropped)", rm.timeline),
                &serde_json::json!({ "ok": true, "deleted": rm.timeline, "dropped_events": dropped }),
            );
            Ok(())
        }
    }
}
