//! Review signals shown next to the focused item: link counts, traffic and
//! badges.

use cull_core::config::MetricsConfig;
use cull_core::links::LinkGraph;
use cull_core::metrics::{MetricRow, MetricsTable, normalize_key};
use cull_core::model::Disposition;
use serde::Serialize;

use crate::session::TriageSession;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSignals {
    pub inbound: usize,
    pub outbound: usize,
    /// Normalized page key of the focused item, when it has a canonical URL.
    pub key: Option<String>,
    pub metrics: Option<MetricRow>,
    pub sessions: Option<f64>,
    pub high_traffic: bool,
    /// The page sits directly under the site root.
    pub top_level: bool,
    pub kept: bool,
    pub remaining_in_group: u32,
    pub remaining_overall: u32,
}

/// Whether a page key is a direct child of the site root.
#[must_use]
pub fn is_top_level(key: &str) -> bool {
    !key.is_empty() && key != "/" && !key.contains('/')
}

/// Signals for the focused item, or `None` without focus.
#[must_use]
pub fn signals_for(
    session: &TriageSession,
    links: &LinkGraph,
    metrics: &MetricsTable,
    config: &MetricsConfig,
) -> Option<ReviewSignals> {
    let item = session.focused()?;

    let key = session
        .detail()
        .filter(|detail| detail.id == item.id && !detail.canonical_url.trim().is_empty())
        .map(|detail| normalize_key(&detail.canonical_url));

    let metrics_row = key.as_deref().and_then(|k| metrics.row_for(k)).cloned();
    let sessions = key
        .as_deref()
        .and_then(|k| metrics.value(k, &config.sessions_column))
        .and_then(cull_core::metrics::MetricValue::as_number);

    Some(ReviewSignals {
        inbound: links.inbound_count(item.id),
        outbound: links.outbound_count(item.id),
        top_level: key.as_deref().is_some_and(is_top_level),
        key,
        metrics: metrics_row,
        sessions,
        high_traffic: sessions.is_some_and(|s| s >= config.high_traffic_sessions),
        kept: item.disposition == Disposition::Keep,
        remaining_in_group: session.active_group().map_or(0, cull_core::model::Group::remaining),
        remaining_overall: session.remaining_overall(),
    })
}
