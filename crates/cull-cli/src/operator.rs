//! Operator identity resolution for CLI commands.
//!
//! The resolution chain: `--operator` flag > `CULL_OPERATOR` env > project
//! config `operator.name` > user config `operator` > `USER` env (TTY only).
//! Commands that record decisions need an identity; read-only commands run
//! as an anonymous viewer.

use cull_core::config::{EffectiveConfig, Operator};
use std::env;

/// Name used for read-only commands when no identity resolves.
pub const ANONYMOUS: &str = "anonymous";

/// Errors from operator resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorResolutionError {
    pub message: String,
    pub code: &'static str,
}

impl std::fmt::Display for OperatorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for OperatorResolutionError {}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn resolve_name_with(
    cli_flag: Option<&str>,
    config: &EffectiveConfig,
    env: &dyn EnvReader,
) -> Option<String> {
    non_empty(cli_flag)
        .or_else(|| env.get("CULL_OPERATOR"))
        .or_else(|| non_empty(config.project.operator.name.as_deref()))
        .or_else(|| non_empty(config.user.operator.as_deref()))
        .or_else(|| if env.is_tty() { env.get("USER") } else { None })
}

/// Resolve the operator name, or `None` if nothing in the chain is set.
pub fn resolve_name(cli_flag: Option<&str>, config: &EffectiveConfig) -> Option<String> {
    resolve_name_with(cli_flag, config, &RealEnv)
}

/// Operator for commands that record decisions.
///
/// # Errors
///
/// Returns an error when no identity resolves.
pub fn require_operator(
    cli_flag: Option<&str>,
    config: &EffectiveConfig,
) -> Result<Operator, OperatorResolutionError> {
    resolve_name(cli_flag, config)
        .map(|name| Operator::new(name, config.project.operator.role))
        .ok_or_else(|| OperatorResolutionError {
            message: "Operator identity required for this command. \
                      Set --operator, CULL_OPERATOR, or operator.name in .cull/config.toml."
                .to_string(),
            code: "missing_operator",
        })
}

/// Operator for read-only commands: the resolved identity, or anonymous.
pub fn viewer(cli_flag: Option<&str>, config: &EffectiveConfig) -> Operator {
    Operator::new(
        resolve_name(cli_flag, config).unwrap_or_else(|| ANONYMOUS.to_string()),
        config.project.operator.role,
    )
}
