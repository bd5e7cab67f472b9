use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

/// Name of the per-project state directory.
pub const STATE_DIR: &str = ".cull";

/// Well-known files inside the project state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
}

impl ProjectPaths {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            root: project_root.into(),
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    #[must_use]
    pub fn database(&self) -> PathBuf {
        self.state_dir().join("cull.sqlite3")
    }

    #[must_use]
    pub fn keep_cache(&self) -> PathBuf {
        self.state_dir().join("keep-cache.json")
    }

    #[must_use]
    pub fn session(&self) -> PathBuf {
        self.state_dir().join("session")
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.state_dir().join("cull.log")
    }

    #[must_use]
    pub fn config(&self) -> PathBuf {
        self.state_dir().join("config.toml")
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.database().exists()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Which disposition backend records decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Per-item durable records in the content database.
    #[default]
    Durable,
    /// Legacy mode: only "keep" is remembered, in a local id set.
    KeepCache,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default)]
    pub backend: BackendKind,
    /// Durable mode only: also mirror keep decisions into the local cache.
    #[serde(default)]
    pub mirror_keep_cache: bool,
}

/// Operator rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Editor,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Editor => "editor",
            Self::Admin => "admin",
        }
    }

    /// Clearing triage data and importing metrics need admin rights.
    #[must_use]
    pub const fn can_administer(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The person recording decisions in this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    pub role: Role,
}

impl Operator {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_high_traffic_sessions")]
    pub high_traffic_sessions: f64,
    #[serde(default = "default_sessions_column")]
    pub sessions_column: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            high_traffic_sessions: default_high_traffic_sessions(),
            sessions_column: default_sessions_column(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = ProjectPaths::new(project_root).config();
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("cull/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.clone(), env_format);

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(
    cli_json: bool,
    user_output: Option<String>,
    env_format: Option<String>,
) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.as_deref().and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_high_traffic_sessions() -> f64 {
    75.0
}

fn default_sessions_column() -> String {
    "sessions".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = load_project_config(dir.path()).expect("load should succeed");
        assert_eq!(cfg.persistence.backend, BackendKind::Durable);
        assert!(!cfg.persistence.mirror_keep_cache);
        assert_eq!(cfg.operator.role, Role::Editor);
        assert!(cfg.operator.name.is_none());
        assert!((cfg.metrics.high_traffic_sessions - 75.0).abs() < f64::EPSILON);
        assert_eq!(cfg.metrics.sessions_column, "sessions");
    }

    #[test]
    fn project_config_parses_all_sections() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(dir.path());
        std::fs::create_dir_all(paths.state_dir()).expect("state dir");
        std::fs::write(
            paths.config(),
            r#"
[persistence]
backend = "keep-cache"

[operator]
name = "alice"
role = "admin"

[metrics]
high_traffic_sessions = 120
"#,
        )
        .expect("write config");

        let cfg = load_project_config(dir.path()).expect("parse");
        assert_eq!(cfg.persistence.backend, BackendKind::KeepCache);
        assert_eq!(cfg.operator.name.as_deref(), Some("alice"));
        assert!(cfg.operator.role.can_administer());
        assert!((cfg.metrics.high_traffic_sessions - 120.0).abs() < f64::EPSILON);
        assert_eq!(cfg.metrics.sessions_column, "sessions");
    }

    #[test]
    fn malformed_project_config_names_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(dir.path());
        std::fs::create_dir_all(paths.state_dir()).expect("state dir");
        std::fs::write(paths.config(), "[persistence\nbackend = 1").expect("write config");

        let err = load_project_config(dir.path()).expect_err("must fail");
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn cli_json_overrides_env_and_config() {
        let output = resolve_output(true, Some("pretty".to_string()), Some("text".to_string()));
        assert_eq!(output, "json");
    }

    #[test]
    fn env_beats_user_config_and_aliases_normalize() {
        let output = resolve_output(false, Some("json".to_string()), Some("human".to_string()));
        assert_eq!(output, "pretty");

        let output = resolve_output(false, Some("table".to_string()), Some("bogus".to_string()));
        assert_eq!(output, "text");
    }

    #[test]
    fn project_paths_live_under_state_dir() {
        let paths = ProjectPaths::new("/srv/site");
        assert_eq!(paths.database(), PathBuf::from("/srv/site/.cull/cull.sqlite3"));
        assert_eq!(paths.keep_cache(), PathBuf::from("/srv/site/.cull/keep-cache.json"));
        assert_eq!(paths.session(), PathBuf::from("/srv/site/.cull/session"));
        assert!(!paths.is_initialized());
    }
}
