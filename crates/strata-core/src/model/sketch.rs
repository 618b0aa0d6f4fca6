//! Sketches: shared, permissioned workspaces composing one or more
//! timelines with independent annotations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

/// Who can see a sketch beyond its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Owner and collaborators only.
    Private,
    /// Explicitly shared with collaborators; same read set as `private`,
    /// kept distinct so the UI can distinguish "mine" from "shared with me".
    Shared,
    /// Readable by any authenticated user.
    Public,
}

impl Visibility {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Shared => "shared",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = UnknownVisibility;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "shared" => Ok(Self::Shared),
            "public" => Ok(Self::Public),
            other => Err(UnknownVisibility(other.to_string())),
        }
    }
}

/// Unknown visibility string in a stored sketch row.
#[derive(Debug, thiserror::Error)]
#[error("unknown visibility '{0}'")]
pub struct UnknownVisibility(pub String);

/// Role of a user on a specific sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Collaborator,
}

/// A collaborative investigation workspace.
///
/// A sketch never owns event data: `timeline_ids` are non-owning references,
/// ordered by attach position. Every referenced timeline must be `ready`
/// (enforced at attach time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sketch {
    pub sketch_id: i64,
    pub name: String,
    pub description: String,
    pub owner: String,
    pub visibility: Visibility,
    pub collaborators: BTreeSet<String>,
    /// Attached timelines in attach order.
    pub timeline_ids: Vec<i64>,
    pub created_at_us: i64,
}

impl Sketch {
    /// Role of `user` on this sketch, if any.
    #[must_use]
    pub fn role_of(&self, user: &str) -> Option<Role> {
        if self.owner == user {
            Some(Role::Owner)
        } else if self.collaborators.contains(user) {
            Some(Role::Collaborator)
        } else {
            None
        }
    }
}
