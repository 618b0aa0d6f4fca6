//! `st init` — create the workspace data directory.

use clap::Args;
use serde::Serialize;
use strata_core::config::StrataConfig;
use strata_core::db::open_metadata;
use strata_core::error::{Result, StrataError};
use strata_search::EventStore;

use super::CliContext;
use crate::output::render;

/// Starter rule corpus written on init so `st analyze run <sketch>
/// signature` works out of the box.
const STARTER_RULES: &str = r"# strata signature rules. One YAML list of rules per file.
- id: proc-psexec
  title: PsExec service execution
  description: Remote execution via the PsExec service binary
  condition:
    kind: contains
    field: message
    value: psexec

- id: ps-encoded-command
  title: Encoded PowerShell command
  tag: attack/encoded-powershell
  condition:
    kind: regex
    field: message
    pattern: 'powershell.*-enc(odedcommand)?\s'
";

#[derive(Args, Debug)]
pub struct InitArgs {}

#[derive(Debug, Serialize)]
struct InitOutput {
    ok: bool,
    root: String,
}

pub fn run(ctx: &CliContext, _args: &InitArgs) -> Result<()> {
    let root = ctx.data.root();
    if ctx.data.is_initialized() {
        return Err(StrataError::Validation(format!(
            "workspace already initialized at {}",
            root.display()
        )));
    }

    std::fs::create_dir_all(root)
        .map_err(|err| StrataError::Internal(anyhow::anyhow!("create {}: {err}", root.display())))?;

    let config = StrataConfig::default();
    config.save(root).map_err(StrataError::Internal)?;

    // Opening both databases applies their migrations.
    open_metadata(&ctx.data.metadata_db()).map_err(StrataError::Internal)?;
    EventStore::open(&ctx.data.events_db()).map_err(StrataError::Internal)?;

    let rules_dir = ctx.data.rules_dir(&config);
    std::fs::create_dir_all(&rules_dir).map_err(|err| {
        StrataError::Internal(anyhow::anyhow!("create {}: {err}", rules_dir.display()))
    })?;
    let starter = rules_dir.join("starter.yml");
    if !starter.exists() {
        std::fs::write(&starter, STARTER_RULES).map_err(|err| {
            StrataError::Internal(anyhow::anyhow!("write {}: {err}", starter.display()))
        })?;
    }

    render(
        ctx.mode,
        &format!("initialized strata workspace at {}", root.display()),
        &InitOutput {
            ok: true,
            root: root.display().to_string(),
        },
    );
    Ok(())
}
