use std::fmt;
use thiserror::Error;

use crate::model::ItemId;

/// Machine-readable error codes, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    GroupNotFound,
    ItemNotFound,
    InvalidOutcome,
    InvalidKey,
    MalformedCsv,
    EmptySelection,
    DecisionInFlight,
    PartialWrite,
    PermissionDenied,
    StorageUnavailable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::GroupNotFound => "E2001",
            Self::ItemNotFound => "E2002",
            Self::InvalidOutcome => "E3001",
            Self::InvalidKey => "E3002",
            Self::MalformedCsv => "E3003",
            Self::EmptySelection => "E3004",
            Self::DecisionInFlight => "E4001",
            Self::PartialWrite => "E4002",
            Self::PermissionDenied => "E5001",
            Self::StorageUnavailable => "E6001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::GroupNotFound => "Group not found",
            Self::ItemNotFound => "Item not found",
            Self::InvalidOutcome => "Invalid triage outcome",
            Self::InvalidKey => "Invalid identifier",
            Self::MalformedCsv => "Malformed metrics CSV",
            Self::EmptySelection => "Nothing selected",
            Self::DecisionInFlight => "Decision already in flight",
            Self::PartialWrite => "Decision partially written",
            Self::PermissionDenied => "Permission denied",
            Self::StorageUnavailable => "Storage request failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `cull init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .cull/config.toml and retry."),
            Self::GroupNotFound | Self::ItemNotFound => None,
            Self::InvalidOutcome => Some("Use `keep` or `remove`."),
            Self::InvalidKey => Some("Group keys are lowercase [a-z0-9_-]; item ids are positive integers."),
            Self::MalformedCsv => {
                Some("Export the report as comma-separated values with a header row.")
            }
            Self::EmptySelection => Some("Select items with `x` before running a bulk action."),
            Self::DecisionInFlight => Some("Wait for the pending write for this item to finish."),
            Self::PartialWrite => {
                Some("Retry the decision; the store is re-read on the next group load.")
            }
            Self::PermissionDenied => Some("Run as an operator with role = \"admin\"."),
            Self::StorageUnavailable => Some("Retry the command. Check disk space and permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Broad failure classes. The state machine reacts to the class, not the
/// individual variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Referenced group or item is absent. Treated as a no-op.
    NotFound,
    /// Input rejected before any mutation.
    Validation,
    /// Request failed; nothing applied locally, the command can be repeated.
    Transient,
    /// Operator lacks the rights for an administrative operation.
    Permission,
}

/// Errors surfaced by the content directory and the triage state machine.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid {what}: {reason}")]
    Validation {
        what: &'static str,
        reason: String,
        code: ErrorCode,
    },

    #[error("request failed: {0}")]
    Transient(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("a decision for item {0} is already in flight")]
    InFlight(ItemId),

    #[error("no items selected")]
    EmptySelection,

    #[error("item {item}: disposition recorded but status change failed: {source}")]
    PartialWrite {
        item: ItemId,
        #[source]
        source: Box<TriageError>,
    },
}

impl TriageError {
    pub fn validation(what: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            what,
            reason: reason.into(),
            code: ErrorCode::InvalidKey,
        }
    }

    pub fn invalid_outcome(raw: &str) -> Self {
        Self::Validation {
            what: "outcome",
            reason: format!("'{raw}' (expected keep or remove)"),
            code: ErrorCode::InvalidOutcome,
        }
    }

    pub fn malformed_csv(reason: impl Into<String>) -> Self {
        Self::Validation {
            what: "metrics csv",
            reason: reason.into(),
            code: ErrorCode::MalformedCsv,
        }
    }

    pub fn item_not_found(id: ItemId) -> Self {
        Self::NotFound {
            kind: "item",
            id: id.to_string(),
        }
    }

    pub fn group_not_found(id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind: "group",
            id: id.to_string(),
        }
    }

    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Validation { .. } | Self::InFlight(_) | Self::EmptySelection => {
                ErrorClass::Validation
            }
            Self::Transient(_) | Self::PartialWrite { .. } => ErrorClass::Transient,
            Self::PermissionDenied(_) => ErrorClass::Permission,
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { kind: "group", .. } => ErrorCode::GroupNotFound,
            Self::NotFound { .. } => ErrorCode::ItemNotFound,
            Self::Validation { code, .. } => *code,
            Self::Transient(_) => ErrorCode::StorageUnavailable,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::InFlight(_) => ErrorCode::DecisionInFlight,
            Self::EmptySelection => ErrorCode::EmptySelection,
            Self::PartialWrite { .. } => ErrorCode::PartialWrite,
        }
    }
}

impl From<rusqlite::Error> for TriageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Transient(format!("sqlite: {err}"))
    }
}

impl From<std::io::Error> for TriageError {
    fn from(err: std::io::Error) -> Self {
        Self::Transient(format!("io: {err}"))
    }
}

impl From<serde_json::Error> for TriageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transient(format!("json: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, TriageError>;
