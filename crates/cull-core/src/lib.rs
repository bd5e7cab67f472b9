//! cull-core library.
//!
//! Data model, error taxonomy, configuration, the [`directory::ContentDirectory`]
//! seam the triage state machine talks to, and the SQLite-backed default
//! implementation of that seam.
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`error::Result`]; configuration
//!   loading uses `anyhow::Result` with file-path context.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod backend;
pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod links;
pub mod location;
pub mod metrics;
pub mod model;
pub mod store;

pub use directory::ContentDirectory;
pub use store::SqliteDirectory;
pub use error::{ErrorClass, ErrorCode, Result, TriageError};
