//! Scriptable in-memory content directory for state machine tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use cull_core::ContentDirectory;
use cull_core::error::{Result, TriageError};
use cull_core::links::LinkGraph;
use cull_core::metrics::{MetricsTable, parse_csv};
use cull_core::model::{
    Disposition, DispositionAck, DispositionRecord, Group, GroupId, Item, ItemDetail, ItemId,
    Outcome, PublicationStatus, StatusAck,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct FakeState {
    groups: Vec<(GroupId, String)>,
    items: HashMap<GroupId, Vec<Item>>,
    fail_list: HashSet<GroupId>,
    fail_record: HashSet<ItemId>,
    fail_draft: HashSet<ItemId>,
    detail_fetches: Vec<ItemId>,
    record_calls: Vec<(ItemId, Outcome)>,
    draft_calls: Vec<ItemId>,
    list_calls: usize,
}

#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<FakeState>,
}

pub fn gid(raw: &str) -> GroupId {
    GroupId::new(raw).expect("valid group id")
}

pub fn item(id: i64, title: &str, disposition: Disposition) -> Item {
    Item {
        id: ItemId(id),
        title: title.to_string(),
        publication_status: PublicationStatus::Published,
        disposition,
    }
}

pub fn undecided(id: i64, title: &str) -> Item {
    item(id, title, Disposition::Undecided)
}

pub fn slug(title: &str) -> String {
    title.to_lowercase().replace(' ', "-")
}

impl FakeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake directory lock")
    }

    /// Add a group whose listing returns `items` in the given order.
    pub fn with_group(self, id: &str, label: &str, items: Vec<Item>) -> Self {
        {
            let mut state = self.lock();
            state.groups.push((gid(id), label.to_string()));
            state.items.insert(gid(id), items);
        }
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn fail_listing(&self, group: &str) {
        self.lock().fail_list.insert(gid(group));
    }

    pub fn heal_listing(&self, group: &str) {
        self.lock().fail_list.remove(&gid(group));
    }

    pub fn fail_record(&self, id: i64) {
        self.lock().fail_record.insert(ItemId(id));
    }

    pub fn fail_draft(&self, id: i64) {
        self.lock().fail_draft.insert(ItemId(id));
    }

    pub fn detail_fetches(&self) -> Vec<ItemId> {
        self.lock().detail_fetches.clone()
    }

    pub fn clear_detail_fetches(&self) {
        self.lock().detail_fetches.clear();
    }

    pub fn record_calls(&self) -> Vec<(ItemId, Outcome)> {
        self.lock().record_calls.clone()
    }

    pub fn draft_calls(&self) -> Vec<ItemId> {
        self.lock().draft_calls.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    pub fn stored_disposition(&self, id: i64) -> Disposition {
        self.lock()
            .items
            .values()
            .flatten()
            .find(|item| item.id == ItemId(id))
            .map_or(Disposition::Undecided, |item| item.disposition)
    }

    fn find_mut(state: &mut FakeState, id: ItemId) -> Option<&mut Item> {
        state.items.values_mut().flatten().find(|item| item.id == id)
    }
}

#[async_trait]
impl ContentDirectory for FakeDirectory {
    async fn list_groups(&self) -> Result<Vec<Group>> {
        let state = self.lock();
        Ok(state
            .groups
            .iter()
            .map(|(id, label)| {
                let items = state.items.get(id).map(Vec::as_slice).unwrap_or_default();
                let total = items.len();
                let triaged = items.iter().filter(|i| i.disposition.is_decided()).count();
                Group {
                    id: id.clone(),
                    label: label.clone(),
                    total_count: u32::try_from(total).expect("small"),
                    triaged_count: u32::try_from(triaged).expect("small"),
                }
            })
            .collect())
    }

    async fn list_items(&self, group: &GroupId) -> Result<Vec<Item>> {
        let mut state = self.lock();
        state.list_calls += 1;
        if state.fail_list.contains(group) {
            return Err(TriageError::Transient(format!("listing {group} unavailable")));
        }
        state
            .items
            .get(group)
            .cloned()
            .ok_or_else(|| TriageError::group_not_found(group))
    }

    async fn get_item_detail(&self, id: ItemId) -> Result<ItemDetail> {
        let mut state = self.lock();
        state.detail_fetches.push(id);
        let found = state.items.iter().find_map(|(group, items)| {
            items
                .iter()
                .find(|item| item.id == id)
                .map(|item| (group.clone(), item.clone()))
        });
        let (group_id, item) = found.ok_or_else(|| TriageError::item_not_found(id))?;
        Ok(ItemDetail {
            id,
            title: item.title.clone(),
            group_id,
            publication_status: item.publication_status,
            categories: BTreeSet::new(),
            tags: BTreeSet::new(),
            canonical_url: format!("https://example.com/{}/", slug(&item.title)),
            edit_url: format!("https://example.com/edit/{id}"),
        })
    }

    async fn record_disposition(&self, id: ItemId, outcome: Outcome) -> Result<DispositionAck> {
        let mut state = self.lock();
        state.record_calls.push((id, outcome));
        if state.fail_record.contains(&id) {
            return Err(TriageError::Transient(format!("write for {id} timed out")));
        }
        let item = Self::find_mut(&mut state, id).ok_or_else(|| TriageError::item_not_found(id))?;
        item.disposition = Disposition::from(outcome);
        Ok(DispositionAck {
            item_id: id,
            outcome,
            remembered: true,
        })
    }

    async fn transition_to_draft(&self, id: ItemId) -> Result<StatusAck> {
        let mut state = self.lock();
        state.draft_calls.push(id);
        if state.fail_draft.contains(&id) {
            return Err(TriageError::Transient(format!("status change for {id} failed")));
        }
        let item = Self::find_mut(&mut state, id).ok_or_else(|| TriageError::item_not_found(id))?;
        item.publication_status = PublicationStatus::Draft;
        Ok(StatusAck {
            item_id: id,
            new_status: PublicationStatus::Draft,
        })
    }

    async fn get_link_graph(&self) -> Result<LinkGraph> {
        Ok(LinkGraph::default())
    }

    async fn get_metrics(&self) -> Result<MetricsTable> {
        Ok(MetricsTable::default())
    }

    async fn import_metrics_csv(&self, source_name: &str, raw: &str) -> Result<MetricsTable> {
        Ok(parse_csv(raw)?.with_source(source_name, Utc::now()))
    }

    async fn clear_all_triage_data(&self) -> Result<usize> {
        let mut state = self.lock();
        let mut cleared = 0;
        for item in state.items.values_mut().flatten() {
            if item.disposition.is_decided() {
                item.disposition = Disposition::Undecided;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn list_removed_keys(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .lock()
            .items
            .values()
            .flatten()
            .filter(|item| item.disposition == Disposition::Remove)
            .map(|item| slug(&item.title))
            .collect())
    }

    async fn list_decisions(&self, _group: Option<&GroupId>) -> Result<Vec<DispositionRecord>> {
        Ok(Vec::new())
    }
}
