//! Subcommand handlers.
//!
//! Each handler takes its clap args plus a [`CmdContext`] and renders through
//! [`crate::output`]. Errors bubble up as `anyhow::Error`; `main` turns them
//! into a structured [`crate::output::CliError`].

pub mod clear;
pub mod completions;
pub mod decide;
pub mod decisions;
pub mod groups;
pub mod ingest;
pub mod init;
pub mod links;
pub mod list;
pub mod metrics;
pub mod review;

use anyhow::{Context as _, Result};
use cull_core::SqliteDirectory;
use cull_core::config::{EffectiveConfig, Operator, ProjectPaths, resolve_config};
use cull_core::error::ErrorCode;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::operator;
use crate::output::OutputMode;

/// The project has no store yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotInitialized {
    pub database: PathBuf,
}

impl NotInitialized {
    pub const CODE: ErrorCode = ErrorCode::NotInitialized;
}

impl std::fmt::Display for NotInitialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: no store at {}",
            Self::CODE.message(),
            self.database.display()
        )
    }
}

impl std::error::Error for NotInitialized {}

/// Everything a handler needs besides its own args.
#[derive(Debug)]
pub struct CmdContext {
    pub paths: ProjectPaths,
    pub config: EffectiveConfig,
    pub output: OutputMode,
    pub operator_flag: Option<String>,
    pub quiet: bool,
}

impl CmdContext {
    /// Load project and user config for `project_root`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(
        project_root: &Path,
        json: bool,
        operator_flag: Option<String>,
        quiet: bool,
    ) -> Result<Self> {
        let config = resolve_config(project_root, json).context("load configuration")?;
        Ok(Self {
            paths: ProjectPaths::new(project_root),
            output: OutputMode::from_resolved(&config.resolved_output),
            config,
            operator_flag,
            quiet,
        })
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.paths.is_initialized() {
            return Ok(());
        }
        Err(NotInitialized {
            database: self.paths.database(),
        }
        .into())
    }

    /// Open the store as an anonymous-capable viewer.
    ///
    /// # Errors
    ///
    /// Returns an error if the project is not initialized or the store cannot
    /// be opened.
    pub fn open_viewer(&self) -> Result<Arc<SqliteDirectory>> {
        let operator = operator::viewer(self.operator_flag.as_deref(), &self.config);
        self.open_as(operator)
    }

    /// Open the store for a command that records decisions.
    ///
    /// # Errors
    ///
    /// Returns an error if no operator resolves, the project is not
    /// initialized, or the store cannot be opened.
    pub fn open_operator(&self) -> Result<Arc<SqliteDirectory>> {
        let operator = operator::require_operator(self.operator_flag.as_deref(), &self.config)?;
        self.open_as(operator)
    }

    fn open_as(&self, operator: Operator) -> Result<Arc<SqliteDirectory>> {
        self.ensure_initialized()?;
        let directory = SqliteDirectory::open(&self.paths, &self.config.project, operator)?;
        Ok(Arc::new(directory))
    }
}
