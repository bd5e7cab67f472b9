//! Session location: the active group and focused item as query parameters.
//!
//! The location is written after every cursor or group change so a session
//! can be shared or resumed with `type=<group>&post=<item>`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{GroupId, ItemId};

pub const GROUP_PARAM: &str = "type";
pub const ITEM_PARAM: &str = "post";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLocation {
    pub group: Option<GroupId>,
    pub item: Option<ItemId>,
}

impl SessionLocation {
    #[must_use]
    pub const fn new(group: Option<GroupId>, item: Option<ItemId>) -> Self {
        Self { group, item }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.group.is_none() && self.item.is_none()
    }

    /// Read a location from a query string. A leading `?` is accepted; unknown
    /// parameters and malformed values are ignored.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let mut location = Self::default();
        for (name, value) in pairs(query) {
            match name {
                GROUP_PARAM => location.group = GroupId::new(value).ok(),
                ITEM_PARAM => location.item = value.parse().ok(),
                _ => {}
            }
        }
        location
    }

    /// Render as a query string without the leading `?`.
    #[must_use]
    pub fn to_query(&self) -> String {
        self.merge_into("")
    }

    /// Rewrite `type` and `post` in an existing query string, keeping every
    /// other parameter in its original order.
    #[must_use]
    pub fn merge_into(&self, existing: &str) -> String {
        let mut parts: Vec<String> = pairs(existing)
            .filter(|(name, _)| *name != GROUP_PARAM && *name != ITEM_PARAM)
            .map(|(name, value)| {
                if value.is_empty() {
                    name.to_string()
                } else {
                    format!("{name}={value}")
                }
            })
            .collect();

        if let Some(group) = &self.group {
            parts.push(format!("{GROUP_PARAM}={group}"));
        }
        if let Some(item) = self.item {
            parts.push(format!("{ITEM_PARAM}={item}"));
        }
        parts.join("&")
    }
}

impl fmt::Display for SessionLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query())
    }
}

fn pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query
        .trim()
        .trim_start_matches('?')
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| part.split_once('=').unwrap_or((part, "")))
}
