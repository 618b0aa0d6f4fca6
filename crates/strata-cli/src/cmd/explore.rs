//! `st explore` — query a sketch's events.

use clap::{Args, ValueEnum};
use serde::Serialize;
use strata_core::error::{Result, StrataError};
use strata_core::model::Event;
use strata_search::composer::query_sketch;
use strata_search::{FilterExpr, SearchQuery, SortOrder};

use super::CliContext;
use crate::output::{format_ts, render};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    Time,
    Relevance,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Time => Self::Time,
            SortArg::Relevance => Self::Relevance,
        }
    }
}

#[derive(Args, Debug)]
pub struct ExploreArgs {
    /// Sketch id.
    pub sketch: i64,

    /// Full-text query (FTS5 syntax).
    #[arg(long)]
    pub query: Option<String>,

    /// Structured filter as JSON (see the saved-search filter format).
    #[arg(long)]
    pub filter: Option<String>,

    /// Result ordering.
    #[arg(long, value_enum, default_value = "time")]
    pub sort: SortArg,

    /// Maximum events to print.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Restrict to these attached timelines.
    #[arg(long = "timeline")]
    pub timelines: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct ExploreOutput {
    events: Vec<Event>,
    truncated: bool,
}

pub fn run(ctx: &CliContext, args: &ExploreArgs) -> Result<()> {
    let meta = ctx.meta()?;
    let store = ctx.store()?;

    let filter: Option<FilterExpr> = args
        .filter
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|err| StrataError::Validation(format!("bad --filter JSON: {err}")))?;
    let query = SearchQuery {
        text: args.query.clone(),
        filter,
    };

    let scope = if args.timelines.is_empty() {
        None
    } else {
        Some(args.timelines.as_slice())
    };

    let mut cursor = query_sketch(
        &meta,
        &store,
        args.sketch,
        ctx.user()?,
        &query,
        args.sort.into(),
        scope,
        ctx.config.query.page_size,
    )?;

    let mut events = Vec::new();
    let mut truncated = false;
    for event in &mut cursor {
        if events.len() >= args.limit {
            truncated = true;
            break;
        }
        events.push(event?);
    }

    let mut lines: Vec<String> = events
        .iter()
        .map(|event| {
            format!(
                "{}  {}/{}  [{}] {}",
                format_ts(event.ts_us),
                event.index_id,
                event.doc_id,
                event.source_type,
                event.message
            )
        })
        .collect();
    if lines.is_empty() {
        lines.push("no matching events".to_string());
    } else if truncated {
        lines.push(format!("... truncated at {} events", args.limit));
    }

    render(
        ctx.mode,
        &lines.join("\n"),
        &ExploreOutput { events, truncated },
    );
    Ok(())
}
