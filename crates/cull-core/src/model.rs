//! Core data model: groups, items, dispositions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::{fmt, str::FromStr};

use crate::error::TriageError;

/// Longest accepted group key.
pub const MAX_GROUP_ID_LEN: usize = 64;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identity of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(Self)
            .ok_or_else(|| TriageError::validation("item id", format!("'{s}' is not a positive integer")))
    }
}

/// Key of a group (content type), e.g. `page` or `post`.
///
/// Keys are lowercase ASCII alphanumerics plus `-` and `_`, which keeps them
/// safe to carry in a query string without escaping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupId(String);

impl GroupId {
    /// Validate and wrap a group key.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the key is empty, too long, or contains
    /// characters outside `[a-z0-9_-]`.
    pub fn new(raw: impl Into<String>) -> Result<Self, TriageError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw.len() <= MAX_GROUP_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(TriageError::validation(
                "group id",
                format!("'{raw}' must match [a-z0-9_-]{{1,{MAX_GROUP_ID_LEN}}}"),
            ))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for GroupId {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.trim())
    }
}

impl TryFrom<String> for GroupId {
    type Error = TriageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GroupId> for String {
    fn from(value: GroupId) -> Self {
        value.0
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Publication status of an item in the content store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationStatus {
    #[serde(alias = "publish")]
    Published,
    Draft,
    Pending,
    Private,
    /// Deleted in the content store. Never part of a worklist.
    #[serde(alias = "trash")]
    Trashed,
}

impl PublicationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Trashed => "trashed",
        }
    }

    /// Statuses that participate in triage.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Trashed)
    }
}

/// Triage outcome as projected onto an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    #[default]
    Undecided,
    Keep,
    Remove,
}

impl Disposition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undecided => "undecided",
            Self::Keep => "keep",
            Self::Remove => "remove",
        }
    }

    #[must_use]
    pub const fn is_decided(self) -> bool {
        !matches!(self, Self::Undecided)
    }
}

/// A decision the operator can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Keep,
    Remove,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Remove => "remove",
        }
    }
}

impl From<Outcome> for Disposition {
    fn from(value: Outcome) -> Self {
        match value {
            Outcome::Keep => Self::Keep,
            Outcome::Remove => Self::Remove,
        }
    }
}

impl fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

impl FromStr for PublicationStatus {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "published" | "publish" => Ok(Self::Published),
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "private" => Ok(Self::Private),
            "trashed" | "trash" => Ok(Self::Trashed),
            _ => Err(TriageError::validation("publication status", format!("'{s}'"))),
        }
    }
}

impl FromStr for Disposition {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "undecided" => Ok(Self::Undecided),
            other => other.parse::<Outcome>().map(Self::from),
        }
    }
}

impl FromStr for Outcome {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "keep" => Ok(Self::Keep),
            "remove" | "unpublish" => Ok(Self::Remove),
            _ => Err(TriageError::invalid_outcome(s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A named collection of items sharing a content type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub label: String,
    pub total_count: u32,
    pub triaged_count: u32,
}

impl Group {
    /// Items in this group still waiting for a decision.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.total_count.saturating_sub(self.triaged_count)
    }
}

/// A single content unit under review, as carried in a worklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub publication_status: PublicationStatus,
    pub disposition: Disposition,
}

/// Full metadata for the focused item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDetail {
    pub id: ItemId,
    pub title: String,
    pub group_id: GroupId,
    pub publication_status: PublicationStatus,
    pub categories: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub canonical_url: String,
    pub edit_url: String,
}

/// A persisted decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionRecord {
    pub item_id: ItemId,
    pub outcome: Outcome,
    pub decided_at: DateTime<Utc>,
    pub decided_by: String,
}

/// Acknowledgement returned by `record_disposition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionAck {
    pub item_id: ItemId,
    pub outcome: Outcome,
    /// The backend keeps this outcome, so it shows up in group counters.
    pub remembered: bool,
}

/// Acknowledgement returned by `transition_to_draft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAck {
    pub item_id: ItemId,
    pub new_status: PublicationStatus,
}
