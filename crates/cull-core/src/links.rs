//! Internal link graph extracted from item content.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::metrics::normalize_key;
use crate::model::ItemId;

static ANCHOR_HREF: OnceLock<Option<Regex>> = OnceLock::new();

fn anchor_href() -> Option<&'static Regex> {
    ANCHOR_HREF
        .get_or_init(|| Regex::new(r#"(?i)<a\s[^>]*href=["']([^"']+)["'][^>]*>"#).ok())
        .as_ref()
}

/// Content of one item as seen by the link scanner.
#[derive(Debug, Clone)]
pub struct LinkSource {
    pub id: ItemId,
    pub canonical_url: String,
    pub content: String,
}

/// Who links to whom. Every scanned item has an entry in both maps, possibly
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkGraph {
    pub outbound: BTreeMap<ItemId, Vec<ItemId>>,
    pub inbound: BTreeMap<ItemId, Vec<ItemId>>,
}

impl LinkGraph {
    #[must_use]
    pub fn outbound_count(&self, id: ItemId) -> usize {
        self.outbound.get(&id).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn inbound_count(&self, id: ItemId) -> usize {
        self.inbound.get(&id).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn outbound_of(&self, id: ItemId) -> &[ItemId] {
        self.outbound.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn inbound_of(&self, id: ItemId) -> &[ItemId] {
        self.inbound.get(&id).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Host part of an absolute or protocol-relative URL, lowercased, without
/// port or credentials.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    let url = url.trim();
    let after_scheme = url
        .find("://")
        .map(|idx| &url[idx + 3..])
        .or_else(|| url.strip_prefix("//"))?;

    let authority = after_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);

    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

fn is_navigable(href: &str) -> bool {
    if href.is_empty() || href.starts_with('#') {
        return false;
    }
    match href.split_once(':') {
        Some((scheme, _)) if !scheme.contains('/') => {
            scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https")
        }
        _ => true,
    }
}

/// Scan every item's HTML for internal links and build both directions of the
/// graph.
///
/// Links to other hosts are ignored, fragments and trailing slashes do not
/// matter, self links and repeated links count once.
#[must_use]
pub fn build_link_graph(sources: &[LinkSource]) -> LinkGraph {
    let mut graph = LinkGraph::default();
    for source in sources {
        graph.outbound.entry(source.id).or_default();
        graph.inbound.entry(source.id).or_default();
    }

    let Some(pattern) = anchor_href() else {
        warn!("anchor pattern failed to compile; link graph is empty");
        return graph;
    };

    let mut by_key: HashMap<String, ItemId> = HashMap::new();
    for source in sources {
        if source.canonical_url.trim().is_empty() {
            continue;
        }
        by_key
            .entry(normalize_key(&source.canonical_url))
            .or_insert(source.id);
    }

    for source in sources {
        let site_host = host_of(&source.canonical_url);
        let mut targets: Vec<ItemId> = Vec::new();

        for capture in pattern.captures_iter(&source.content) {
            let Some(href) = capture.get(1).map(|m| m.as_str().trim()) else {
                continue;
            };
            if !is_navigable(href) {
                continue;
            }
            if let Some(link_host) = host_of(href) {
                if site_host.as_deref() != Some(link_host.as_str()) {
                    continue;
                }
            }

            let Some(&target) = by_key.get(&normalize_key(href)) else {
                continue;
            };
            if target != source.id && !targets.contains(&target) {
                targets.push(target);
            }
        }

        for target in &targets {
            graph.inbound.entry(*target).or_default().push(source.id);
        }
        graph.outbound.insert(source.id, targets);
    }

    debug!(items = sources.len(), "built link graph");
    graph
}
