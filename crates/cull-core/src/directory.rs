//! The content directory: everything the triage loop reads from or writes to
//! the content repository.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::Result;
use crate::links::LinkGraph;
use crate::metrics::MetricsTable;
use crate::model::{
    DispositionAck, DispositionRecord, Group, GroupId, Item, ItemDetail, ItemId, Outcome,
    StatusAck,
};

/// Narrow data interface between the triage state machine and the content
/// repository.
///
/// Implementations must be safe to call concurrently for different items;
/// bulk decisions issue one `record_disposition` per item at once.
#[async_trait]
pub trait ContentDirectory: Send + Sync {
    /// All groups in display order, with progress counters.
    async fn list_groups(&self) -> Result<Vec<Group>>;

    /// Non-trashed items of a group, title ascending, with their current
    /// disposition.
    async fn list_items(&self, group: &GroupId) -> Result<Vec<Item>>;

    async fn get_item_detail(&self, item: ItemId) -> Result<ItemDetail>;

    /// Record a decision. Repeating the same call is harmless.
    async fn record_disposition(&self, item: ItemId, outcome: Outcome) -> Result<DispositionAck>;

    /// Unpublish an item by moving it to draft.
    async fn transition_to_draft(&self, item: ItemId) -> Result<StatusAck>;

    async fn get_link_graph(&self) -> Result<LinkGraph>;

    async fn get_metrics(&self) -> Result<MetricsTable>;

    /// Parse and persist a metrics report. Needs administrative rights.
    async fn import_metrics_csv(&self, source_name: &str, raw: &str) -> Result<MetricsTable>;

    /// Forget every decision and the stored metrics. Needs administrative
    /// rights. Returns the number of decisions cleared.
    async fn clear_all_triage_data(&self) -> Result<usize>;

    /// Normalized page keys of every item whose disposition is remove.
    async fn list_removed_keys(&self) -> Result<BTreeSet<String>>;

    /// Persisted decisions, optionally limited to one group.
    async fn list_decisions(&self, group: Option<&GroupId>) -> Result<Vec<DispositionRecord>>;
}
