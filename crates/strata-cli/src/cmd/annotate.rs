//! `st tag`, `st star`, `st comment`, `st annotations` — per-event
//! annotation commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use strata_core::acl::Actor;
use strata_core::annotate;
use strata_core::error::Result;
use strata_core::model::{Comment, EventAnnotations, EventRef};
use strata_core::time::now_us;

use super::CliContext;
use crate::output::{format_ts, render};

#[derive(Args, Debug)]
pub struct TagArgs {
    #[command(subcommand)]
    pub command: TagCommand,
}

#[derive(Subcommand, Debug)]
pub enum TagCommand {
    /// Add a tag to an event (idempotent).
    Add(TagOpArgs),
    /// Remove a tag from an event (no-op when absent).
    Rm(TagOpArgs),
}

#[derive(Args, Debug)]
pub struct TagOpArgs {
    /// Sketch id.
    pub sketch: i64,
    /// Index id of the event.
    pub index: String,
    /// Document id of the event.
    pub doc: String,
    /// Tag name.
    pub tag: String,
}

#[derive(Args, Debug)]
pub struct StarArgs {
    /// Sketch id.
    pub sketch: i64,
    /// Index id of the event.
    pub index: String,
    /// Document id of the event.
    pub doc: String,
}

#[derive(Args, Debug)]
pub struct CommentArgs {
    /// Sketch id.
    pub sketch: i64,
    /// Index id of the event.
    pub index: String,
    /// Document id of the event.
    pub doc: String,
    /// Comment body.
    pub body: String,
}

#[derive(Args, Debug)]
pub struct AnnotationsArgs {
    /// Sketch id.
    pub sketch: i64,
    /// Index id of the event.
    pub index: String,
    /// Document id of the event.
    pub doc: String,
}

#[derive(Debug, Serialize)]
struct TagOutput {
    ok: bool,
    changed: bool,
}

#[derive(Debug, Serialize)]
struct StarOutput {
    ok: bool,
    starred: bool,
}

#[derive(Debug, Serialize)]
struct CommentOutput {
    ok: bool,
    comment: Comment,
}

pub fn run_tag(ctx: &CliContext, args: &TagArgs) -> Result<()> {
    let meta = ctx.meta()?;
    let user = ctx.user()?;

    match &args.command {
        TagCommand::Add(op) => {
            let event = EventRef::new(&op.index, &op.doc);
            let changed =
                annotate::add_tag(&meta, op.sketch, &event, &op.tag, Actor::User(user), now_us())?;
            let human = if changed {
                format!("tagged {event} with '{}'", op.tag)
            } else {
                format!("{event} already tagged '{}'", op.tag)
            };
            render(ctx.mode, &human, &TagOutput { ok: true, changed });
        }
        TagCommand::Rm(op) => {
            let event = EventRef::new(&op.index, &op.doc);
            let changed = annotate::remove_tag(&meta, op.sketch, &event, &op.tag, Actor::User(user))?;
            let human = if changed {
                format!("removed '{}' from {event}", op.tag)
            } else {
                format!("{event} did not carry '{}'", op.tag)
            };
            render(ctx.mode, &human, &TagOutput { ok: true, changed });
        }
    }
    Ok(())
}

pub fn run_star(ctx: &CliContext, args: &StarArgs) -> Result<()> {
    let meta = ctx.meta()?;
    let event = EventRef::new(&args.index, &args.doc);
    let starred = annotate::toggle_star(&meta, args.sketch, &event, ctx.user()?, now_us())?;
    let human = if starred {
        format!("starred {event}")
    } else {
        format!("unstarred {event}")
    };
    render(ctx.mode, &human, &StarOutput { ok: true, starred });
    Ok(())
}

pub fn run_comment(ctx: &CliContext, args: &CommentArgs) -> Result<()> {
    let meta = ctx.meta()?;
    let event = EventRef::new(&args.index, &args.doc);
    let comment = annotate::add_comment(
        &meta,
        args.sketch,
        &event,
        &args.body,
        Actor::User(ctx.user()?),
        now_us(),
    )?;
    render(
        ctx.mode,
        &format!("comment #{} added to {event}", comment.seq),
        &CommentOutput { ok: true, comment },
    );
    Ok(())
}

fn describe(annotations: &EventAnnotations) -> String {
    let mut lines = Vec::new();

    let tags = if annotations.tags.is_empty() {
        "none".to_string()
    } else {
        annotations.tags.iter().cloned().collect::<Vec<_>>().join(", ")
    };
    lines.push(format!("tags: {tags}"));

    let stars = if annotations.starred_by.is_empty() {
        "none".to_string()
    } else {
        annotations
            .starred_by
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    lines.push(format!("starred by: {stars}"));

    if annotations.comments.is_empty() {
        lines.push("comments: none".to_string());
    } else {
        lines.push("comments:".to_string());
        for comment in &annotations.comments {
            lines.push(format!(
                "  #{} {} ({}): {}",
                comment.seq,
                comment.author,
                format_ts(comment.created_at_us),
                comment.body
            ));
        }
    }
    lines.join("\n")
}

pub fn run_annotations(ctx: &CliContext, args: &AnnotationsArgs) -> Result<()> {
    let meta = ctx.meta()?;
    let event = EventRef::new(&args.index, &args.doc);
    let annotations = annotate::list(&meta, args.sketch, &event, ctx.user()?)?;
    render(ctx.mode, &describe(&annotations), &annotations);
    Ok(())
}
