//! Access control for sketches.
//!
//! Checks are snapshot-at-call-time: a sharing change applies to subsequent
//! operations, never retroactively to cursors already handed out.

use crate::error::{Result, StrataError};
use crate::model::{Role, Sketch, Visibility};

/// Access level required by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Query events, list annotations.
    Read,
    /// Annotate, save searches, schedule analyzers.
    Write,
    /// Share, change visibility, attach timelines, delete.
    Admin,
}

impl Access {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }
}

/// Who is performing an operation.
///
/// Analyzer runs hold a bounded write capability granted at schedule time
/// (the scheduling user's access was checked then), so they bypass the
/// per-operation role check but still record an attributable author.
#[derive(Debug, Clone, Copy)]
pub enum Actor<'a> {
    User(&'a str),
    Run { analyzer: &'a str, run_id: i64 },
}

impl Actor<'_> {
    /// Author string recorded on annotations created by this actor.
    #[must_use]
    pub fn author(&self) -> String {
        match self {
            Self::User(user) => (*user).to_string(),
            Self::Run { analyzer, run_id } => format!("analyzer:{analyzer}:{run_id}"),
        }
    }
}

/// Check that `user` holds `access` on `sketch`.
///
/// - `Read`: owner, collaborator, or anyone when the sketch is `public`
/// - `Write`: owner or collaborator
/// - `Admin`: owner only
///
/// # Errors
///
/// Returns `Permission` when the check fails.
pub fn require(sketch: &Sketch, user: &str, access: Access) -> Result<()> {
    let role = sketch.role_of(user);
    let allowed = match access {
        Access::Read => role.is_some() || sketch.visibility == Visibility::Public,
        Access::Write => role.is_some(),
        Access::Admin => role == Some(Role::Owner),
    };

    if allowed {
        Ok(())
    } else {
        Err(StrataError::Permission {
            user: user.to_string(),
            needed: access.as_str(),
            sketch_id: sketch.sketch_id,
        })
    }
}

/// Check `actor` for `access`; run actors are pre-authorized.
///
/// # Errors
///
/// Returns `Permission` when a user actor fails the check.
pub fn require_actor(sketch: &Sketch, actor: Actor<'_>, access: Access) -> Result<()> {
    match actor {
        Actor::User(user) => require(sketch, user, access),
        Actor::Run { .. } => Ok(()),
    }
}
