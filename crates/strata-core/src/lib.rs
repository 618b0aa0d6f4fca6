//! strata-core: data model, metadata store, annotations, and access control
//! for collaborative forensic timeline analysis.
//!
//! # Conventions
//!
//! - **Errors**: domain operations return [`error::StrataError`]; internal
//!   plumbing uses `anyhow::Result` with `.context()` at I/O boundaries.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).
//! - **Storage**: SQLite via `rusqlite`, WAL mode, SQL-constant migrations.

pub mod acl;
pub mod annotate;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod time;

pub use error::{ErrorCode, StrataError};
