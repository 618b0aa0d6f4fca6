//! Command implementations, one module per command group.

pub mod analyze;
pub mod annotate;
pub mod explore;
pub mod import;
pub mod init;
pub mod searches;
pub mod sketch;
pub mod timelines;

use rusqlite::Connection;
use strata_core::config::{DataDir, StrataConfig};
use strata_core::db::open_metadata;
use strata_core::error::{Result, StrataError};
use strata_search::EventStore;

use crate::output::OutputMode;

/// Everything a command needs: workspace layout, config, output mode, and
/// the resolved acting user.
pub struct CliContext {
    pub data: DataDir,
    pub config: StrataConfig,
    pub mode: OutputMode,
    user: Option<String>,
}

impl CliContext {
    pub fn new(data: DataDir, config: StrataConfig, mode: OutputMode, user: Option<String>) -> Self {
        Self {
            data,
            config,
            mode,
            user,
        }
    }

    /// The acting user for permission checks.
    ///
    /// # Errors
    ///
    /// `Validation` when neither `--user` nor `STRATA_USER` is set.
    pub fn user(&self) -> Result<&str> {
        self.user.as_deref().ok_or_else(|| {
            StrataError::Validation("no acting user; pass --user or set STRATA_USER".into())
        })
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.data.is_initialized() {
            Ok(())
        } else {
            Err(StrataError::Validation(format!(
                "no strata workspace at {}; run `st init` first",
                self.data.root().display()
            )))
        }
    }

    /// Open the metadata database.
    ///
    /// # Errors
    ///
    /// `Validation` when the workspace is uninitialized.
    pub fn meta(&self) -> Result<Connection> {
        self.ensure_initialized()?;
        open_metadata(&self.data.metadata_db()).map_err(StrataError::Internal)
    }

    /// Open the event index database.
    ///
    /// # Errors
    ///
    /// `Validation` when the workspace is uninitialized.
    pub fn store(&self) -> Result<EventStore> {
        self.ensure_initialized()?;
        EventStore::open(&self.data.events_db()).map_err(StrataError::Internal)
    }
}
