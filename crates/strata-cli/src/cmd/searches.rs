//! `st searches` — list and save sketch-scoped searches.

use clap::{Args, Subcommand};
use serde::Serialize;
use strata_core::acl::Actor;
use strata_core::db::searches;
use strata_core::error::{Result, StrataError};
use strata_core::model::SavedSearch;
use strata_core::time::now_us;
use strata_search::FilterExpr;

use super::CliContext;
use crate::output::render;

#[derive(Args, Debug)]
pub struct SearchesArgs {
    #[command(subcommand)]
    pub command: SearchesCommand,
}

#[derive(Subcommand, Debug)]
pub enum SearchesCommand {
    /// List a sketch's saved searches.
    List(ListArgs),
    /// Save a named search under a sketch.
    Save(SaveArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Sketch id.
    pub sketch: i64,
}

#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Sketch id.
    pub sketch: i64,
    /// Search name.
    pub name: String,

    /// Full-text query component.
    #[arg(long, default_value = "")]
    pub query: String,

    /// Structured filter component as JSON.
    #[arg(long)]
    pub filter: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchListOutput {
    searches: Vec<SavedSearch>,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    ok: bool,
    search: SavedSearch,
}

fn describe(search: &SavedSearch) -> String {
    let mut text = format!(
        "{:>4}  '{}' by {}",
        search.search_id, search.name, search.created_by
    );
    if !search.query_text.is_empty() {
        text.push_str(&format!("  query: {}", search.query_text));
    }
    if let Some(filter) = &search.filter_json {
        text.push_str(&format!("  filter: {filter}"));
    }
    text
}

pub fn run(ctx: &CliContext, args: &SearchesArgs) -> Result<()> {
    let meta = ctx.meta()?;

    match &args.command {
        SearchesCommand::List(list) => {
            let all = searches::list(&meta, list.sketch, ctx.user()?)?;
            let human = if all.is_empty() {
                "no saved searches".to_string()
            } else {
                all.iter().map(describe).collect::<Vec<_>>().join("\n")
            };
            render(ctx.mode, &human, &SearchListOutput { searches: all });
        }
        SearchesCommand::Save(save) => {
            // Validate the filter JSON before persisting it.
            if let Some(filter) = &save.filter {
                serde_json::from_str::<FilterExpr>(filter).map_err(|err| {
                    StrataError::Validation(format!("bad --filter JSON: {err}"))
                })?;
            }
            let search = searches::create(
                &meta,
                save.sketch,
                &save.name,
                &save.query,
                save.filter.as_deref(),
                Actor::User(ctx.user()?),
                now_us(),
            )?;
            render(
                ctx.mode,
                &describe(&search),
                &SearchOutput { ok: true, search },
            );
        }
    }
    Ok(())
}
