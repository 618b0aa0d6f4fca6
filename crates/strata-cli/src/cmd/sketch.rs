//! `st sketch` — workspace CRUD, sharing, and timeline attachment.

use clap::{Args, Subcommand};
use serde::Serialize;
use strata_core::db::sketches;
use strata_core::error::{Result, StrataError};
use strata_core::model::{Sketch, Visibility};
use strata_core::time::now_us;

use super::CliContext;
use crate::output::render;

#[derive(Args, Debug)]
pub struct SketchArgs {
    #[command(subcommand)]
    pub command: SketchCommand,
}

#[derive(Subcommand, Debug)]
pub enum SketchCommand {
    /// Create a new sketch owned by the acting user.
    Create(CreateArgs),
    /// List sketches visible to the acting user.
    List,
    /// Show one sketch with collaborators and timelines.
    Show(ShowArgs),
    /// Attach a ready timeline to a sketch.
    Attach(AttachArgs),
    /// Add collaborators or change visibility. Owner only.
    Share(ShareArgs),
    /// Delete a sketch and everything it owns. Owner only.
    Delete(ShowArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Sketch name.
    pub name: String,

    /// Optional description.
    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Sketch id.
    pub sketch: i64,
}

#[derive(Args, Debug)]
pub struct AttachArgs {
    /// Sketch id.
    pub sketch: i64,
    /// Timeline id; the timeline must be `ready`.
    pub timeline: i64,
}

#[derive(Args, Debug)]
pub struct ShareArgs {
    /// Sketch id.
    pub sketch: i64,

    /// Collaborators to add.
    #[arg(long = "collaborator")]
    pub users: Vec<String>,

    /// New visibility: private, shared, or public.
    #[arg(long)]
    pub visibility: Option<String>,
}

#[derive(Debug, Serialize)]
struct SketchOutput {
    ok: bool,
    sketch: Sketch,
}

#[derive(Debug, Serialize)]
struct SketchListOutput {
    sketches: Vec<Sketch>,
}

fn describe(sketch: &Sketch) -> String {
    let collaborators = if sketch.collaborators.is_empty() {
        "none".to_string()
    } else {
        sketch
            .collaborators
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    };
    let timelines = if sketch.timeline_ids.is_empty() {
        "none".to_string()
    } else {
        sketch
            .timeline_ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "sketch {} '{}' [{}] owner={}\n  collaborators: {collaborators}\n  timelines: {timelines}",
        sketch.sketch_id, sketch.name, sketch.visibility, sketch.owner
    )
}

pub fn run(ctx: &CliContext, args: &SketchArgs) -> Result<()> {
    let meta = ctx.meta()?;

    match &args.command {
        SketchCommand::Create(create) => {
            let sketch = sketches::create(
                &meta,
                &create.name,
                &create.description,
                ctx.user()?,
                now_us(),
            )?;
            render(
                ctx.mode,
                &describe(&sketch),
                &SketchOutput { ok: true, sketch },
            );
        }
        SketchCommand::List => {
            let all = sketches::list_visible(&meta, ctx.user()?)?;
            let human = if all.is_empty() {
                "no sketches visible".to_string()
            } else {
                all.iter().map(describe).collect::<Vec<_>>().join("\n")
            };
            render(ctx.mode, &human, &SketchListOutput { sketches: all });
        }
        SketchCommand::Show(show) => {
            let sketch = sketches::get(&meta, show.sketch)?;
            render(
                ctx.mode,
                &describe(&sketch),
                &SketchOutput { ok: true, sketch },
            );
        }
        SketchCommand::Attach(attach) => {
            sketches::attach_timeline(&meta, attach.sketch, attach.timeline, ctx.user()?, now_us())?;
            let sketch = sketches::get(&meta, attach.sketch)?;
            render(
                ctx.mode,
                &describe(&sketch),
                &SketchOutput { ok: true, sketch },
            );
        }
        SketchCommand::Share(share) => {
            if share.users.is_empty() && share.visibility.is_none() {
                return Err(StrataError::Validation(
                    "share needs --collaborator and/or --visibility".into(),
                ));
            }
            for user in &share.users {
                sketches::add_collaborator(&meta, share.sketch, user, ctx.user()?, now_us())?;
            }
            if let Some(visibility) = &share.visibility {
                let visibility: Visibility = visibility
                    .parse()
                    .map_err(|err| StrataError::Validation(format!("{err}")))?;
                sketches::set_visibility(&meta, share.sketch, visibility, ctx.user()?)?;
            }
            let sketch = sketches::get(&meta, share.sketch)?;
            render(
                ctx.mode,
                &describe(&sketch),
                &SketchOutput { ok: true, sketch },
            );
        }
        SketchCommand::Delete(delete) => {
            sketches::delete(&meta, delete.sketch, ctx.user()?)?;
            render(
                ctx.mode,
                &format!("sketch {} deleted", delete.sketch),
                &serde_json::json!({ "ok": true, "deleted": delete.sketch }),
            );
        }
    }
    Ok(())
}
