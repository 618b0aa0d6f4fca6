//! `st import` — register and ingest a timeline from a JSONL file.

use clap::{Args, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use strata_core::error::{Result, StrataError};
use strata_core::model::Timeline;
use strata_search::import::{ImportFormat, start_import};

use super::CliContext;
use crate::output::render;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FormatArg {
    /// Infer from the file extension.
    Auto,
    Jsonl,
    Csv,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSONL or CSV file of normalized events.
    pub file: PathBuf,

    /// Timeline name; defaults to the file stem.
    #[arg(long)]
    pub name: Option<String>,

    /// Source format.
    #[arg(long, value_enum, default_value = "auto")]
    pub format: FormatArg,

    /// Return immediately with the `importing` timeline instead of waiting
    /// for completion.
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Serialize)]
struct ImportOutput {
    ok: bool,
    timeline: Timeline,
}

fn describe(timeline: &Timeline) -> String {
    let mut text = format!(
        "timeline {} '{}' [{}] index={} events={} malformed={}",
        timeline.timeline_id,
        timeline.name,
        timeline.status,
        timeline.index_id,
        timeline.event_count,
        timeline.malformed_count
    );
    if let Some(detail) = &timeline.error_detail {
        text.push_str(&format!("\n  error: {detail}"));
    }
    text
}

pub fn run(ctx: &CliContext, args: &ImportArgs) -> Result<()> {
    ctx.meta()?; // fail early if uninitialized
    let user = ctx.user()?.to_string();

    let name = args.name.clone().unwrap_or_else(|| {
        args.file
            .file_stem()
            .map_or_else(|| "timeline".to_string(), |s| s.to_string_lossy().into_owned())
    });
    if !args.file.exists() {
        return Err(StrataError::Validation(format!(
            "source file {} does not exist",
            args.file.display()
        )));
    }

    let format = match args.format {
        FormatArg::Auto => ImportFormat::from_path(&args.file),
        FormatArg::Jsonl => ImportFormat::Jsonl,
        FormatArg::Csv => ImportFormat::Csv,
    };

    let (pending, handle) = start_import(
        &ctx.data.metadata_db(),
        &ctx.data.events_db(),
        &name,
        &user,
        args.file.clone(),
        format,
        ctx.config.import.batch_size,
    )?;

    let timeline = if args.no_wait { pending } else { handle.join()? };

    render(
        ctx.mode,
        &describe(&timeline),
        &ImportOutput {
            ok: true,
            timeline: timeline.clone(),
        },
    );
    Ok(())
}
