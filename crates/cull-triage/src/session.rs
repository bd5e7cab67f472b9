//! The triage session: one owned state container for a single operator.
//!
//! All mutation goes through methods on [`TriageSession`]. A failed directory
//! call leaves the worklist and counters as they were.

use cull_core::ContentDirectory;
use cull_core::error::{Result, TriageError};
use cull_core::location::SessionLocation;
use cull_core::model::{
    Disposition, DispositionAck, Group, GroupId, Item, ItemDetail, ItemId, Outcome,
    PublicationStatus,
};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

const JOURNAL_CAPACITY: usize = 128;

/// What the presentation layer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    /// No active group; the operator picks one.
    GroupSelection,
    /// Walking the worklist of the active group.
    Reviewing,
    /// Every item of the active group is decided. The cursor stays on the
    /// worklist for browsing.
    GroupComplete,
    /// Nothing left in this or any later group. No item is focused.
    Done,
}

/// Modal prompt currently open over the review screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    #[default]
    Closed,
    Bulk,
    Permissions,
}

/// A line in the session's operation journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub operation: &'static str,
    pub message: String,
}

/// Result of a completed single decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecisionApplied {
    pub item: ItemId,
    pub outcome: Outcome,
    /// The item was not counted before, so its group counter moved up.
    pub newly_decided: bool,
    /// The decided item was focused and the cursor moved on.
    pub advanced: bool,
}

/// Tally of a bulk decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Successful writes that moved the group counter up.
    pub newly_decided: usize,
}

/// A decision that passed validation and is marked in flight.
///
/// Persisting needs no access to the session, so the operator can keep
/// navigating while the write is outstanding. Hand the result back to
/// [`TriageSession::finish_decision`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "a pending decision stays in flight until finished"]
pub struct PendingDecision {
    item: ItemId,
    outcome: Outcome,
    group: GroupId,
    was_counted: bool,
}

impl PendingDecision {
    #[must_use]
    pub const fn item(&self) -> ItemId {
        self.item
    }

    #[must_use]
    pub const fn outcome(&self) -> Outcome {
        self.outcome
    }

    /// Write the decision. A remove also moves the item to draft.
    ///
    /// # Errors
    ///
    /// Returns the directory error if recording fails, or
    /// [`TriageError::PartialWrite`] if the decision was recorded but the
    /// status change failed.
    pub async fn persist(&self, directory: &dyn ContentDirectory) -> Result<DispositionAck> {
        write_decision(directory, self.item, self.outcome).await
    }
}

async fn write_decision(
    directory: &dyn ContentDirectory,
    item: ItemId,
    outcome: Outcome,
) -> Result<DispositionAck> {
    let ack = directory.record_disposition(item, outcome).await?;
    if outcome == Outcome::Remove {
        directory
            .transition_to_draft(item)
            .await
            .map_err(|source| TriageError::PartialWrite {
                item,
                source: Box::new(source),
            })?;
    }
    Ok(ack)
}

/// State of one review session.
pub struct TriageSession {
    directory: Arc<dyn ContentDirectory>,
    groups: Vec<Group>,
    active: Option<GroupId>,
    worklist: Vec<Item>,
    cursor: Option<usize>,
    selection: BTreeSet<ItemId>,
    detail: Option<ItemDetail>,
    display: DisplayState,
    prompt: Prompt,
    in_flight: HashSet<ItemId>,
    // Decided in this session but not kept by the backend, so not counted.
    uncounted: HashSet<ItemId>,
    journal: VecDeque<JournalEntry>,
}

impl std::fmt::Debug for TriageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageSession")
            .field("active", &self.active)
            .field("cursor", &self.cursor)
            .field("worklist", &self.worklist.len())
            .field("selection", &self.selection)
            .field("display", &self.display)
            .field("prompt", &self.prompt)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl TriageSession {
    /// Start a session: fetch the group list and wait in group selection.
    ///
    /// # Errors
    ///
    /// Returns the directory error if the group list cannot be fetched.
    pub async fn open(directory: Arc<dyn ContentDirectory>) -> Result<Self> {
        let groups = directory.list_groups().await?;
        debug!(groups = groups.len(), "triage session opened");
        Ok(Self {
            directory,
            groups,
            active: None,
            worklist: Vec::new(),
            cursor: None,
            selection: BTreeSet::new(),
            detail: None,
            display: DisplayState::GroupSelection,
            prompt: Prompt::Closed,
            in_flight: HashSet::new(),
            uncounted: HashSet::new(),
            journal: VecDeque::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn directory(&self) -> Arc<dyn ContentDirectory> {
        Arc::clone(&self.directory)
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[must_use]
    pub const fn active_group_id(&self) -> Option<&GroupId> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active_group(&self) -> Option<&Group> {
        let active = self.active.as_ref()?;
        self.groups.iter().find(|g| &g.id == active)
    }

    #[must_use]
    pub fn worklist(&self) -> &[Item] {
        &self.worklist
    }

    #[must_use]
    pub const fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    #[must_use]
    pub fn focused(&self) -> Option<&Item> {
        self.cursor.and_then(|idx| self.worklist.get(idx))
    }

    #[must_use]
    pub const fn detail(&self) -> Option<&ItemDetail> {
        self.detail.as_ref()
    }

    #[must_use]
    pub const fn selection(&self) -> &BTreeSet<ItemId> {
        &self.selection
    }

    #[must_use]
    pub const fn display(&self) -> DisplayState {
        self.display
    }

    #[must_use]
    pub const fn prompt(&self) -> Prompt {
        self.prompt
    }

    #[must_use]
    pub fn is_in_flight(&self, item: ItemId) -> bool {
        self.in_flight.contains(&item)
    }

    pub fn journal(&self) -> impl Iterator<Item = &JournalEntry> {
        self.journal.iter()
    }

    #[must_use]
    pub fn last_note(&self) -> Option<&JournalEntry> {
        self.journal.back()
    }

    /// Items left across all groups.
    #[must_use]
    pub fn remaining_overall(&self) -> u32 {
        self.groups.iter().map(Group::remaining).sum()
    }

    /// Current group and focused item, for sharing or resuming the session.
    #[must_use]
    pub fn location(&self) -> SessionLocation {
        SessionLocation::new(self.active.clone(), self.focused().map(|item| item.id))
    }

    fn note(&mut self, operation: &'static str, message: impl Into<String>) {
        if self.journal.len() == JOURNAL_CAPACITY {
            self.journal.pop_front();
        }
        self.journal.push_back(JournalEntry {
            operation,
            message: message.into(),
        });
    }

    fn index_of(&self, item: ItemId) -> Option<usize> {
        self.worklist.iter().position(|candidate| candidate.id == item)
    }

    fn is_counted(&self, item: &Item) -> bool {
        item.disposition.is_decided() && !self.uncounted.contains(&item.id)
    }

    fn all_decided(&self) -> bool {
        self.worklist.iter().all(|item| item.disposition.is_decided())
    }

    fn browse_state(&self) -> DisplayState {
        if self.all_decided() {
            DisplayState::GroupComplete
        } else {
            DisplayState::Reviewing
        }
    }

    // -----------------------------------------------------------------------
    // Loading and navigation
    // -----------------------------------------------------------------------

    /// Re-fetch the group list and its counters.
    ///
    /// # Errors
    ///
    /// Returns the directory error; the previous list is kept.
    pub async fn refresh_groups(&mut self) -> Result<()> {
        self.groups = self.directory.list_groups().await?;
        Ok(())
    }

    /// Make `group` the active group with a freshly fetched worklist.
    ///
    /// The cursor lands on `focus` when it is part of the worklist, otherwise
    /// on the first undecided item. A fully decided group parks the cursor on
    /// the first item in [`DisplayState::GroupComplete`]. The group counter
    /// is reset to the decisions found in the fetched listing.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for an unknown group, or the directory error
    /// if the item list cannot be fetched. The session is unchanged on error.
    pub async fn load_group(&mut self, group: &GroupId, focus: Option<ItemId>) -> Result<()> {
        if !self.groups.iter().any(|g| &g.id == group) {
            return Err(TriageError::group_not_found(group));
        }

        let fetched = match self.directory.list_items(group).await {
            Ok(items) => items,
            Err(err) => {
                warn!(group = %group, error = %err, "group load failed");
                self.note("load_group", format!("loading {group} failed: {err}"));
                return Err(err);
            }
        };

        let mut seen = HashSet::new();
        let mut decided = HashSet::new();
        let mut worklist: Vec<Item> = Vec::with_capacity(fetched.len());
        for item in fetched {
            self.uncounted.remove(&item.id);
            if item.disposition.is_decided() {
                decided.insert(item.id);
            }
            if !item.publication_status.is_active() {
                continue;
            }
            if seen.insert(item.id) {
                worklist.push(item);
            } else {
                warn!(group = %group, item = %item.id, "duplicate item in group listing dropped");
            }
        }
        worklist.sort_by_cached_key(|item| item.title.to_lowercase());

        let cursor = focus
            .and_then(|id| worklist.iter().position(|item| item.id == id))
            .or_else(|| worklist.iter().position(|item| !item.disposition.is_decided()))
            .or_else(|| (!worklist.is_empty()).then_some(0));

        if let Some(entry) = self.groups.iter_mut().find(|g| &g.id == group) {
            entry.triaged_count = u32::try_from(decided.len()).unwrap_or(u32::MAX);
        }
        self.active = Some(group.clone());
        self.worklist = worklist;
        self.cursor = cursor;
        self.selection.clear();
        self.prompt = Prompt::Closed;
        self.detail = None;
        self.display = self.browse_state();

        debug!(
            group = %group,
            items = self.worklist.len(),
            cursor = ?self.cursor,
            display = ?self.display,
            "group loaded"
        );
        self.fetch_detail().await;
        Ok(())
    }

    async fn fetch_detail(&mut self) {
        let Some(item) = self.focused().map(|item| item.id) else {
            self.detail = None;
            return;
        };

        match self.directory.get_item_detail(item).await {
            Ok(detail) => self.detail = Some(detail),
            Err(err) => {
                warn!(item = %item, error = %err, "detail fetch failed");
                self.detail = None;
                self.note("detail", format!("no detail for {item}: {err}"));
            }
        }
    }

    async fn focus_index(&mut self, idx: usize) {
        self.cursor = Some(idx);
        self.display = self.browse_state();
        self.fetch_detail().await;
    }

    /// Focus the next undecided item after the cursor. When the active group
    /// has none left, load the next group; after the last group, enter
    /// [`DisplayState::Done`].
    ///
    /// # Errors
    ///
    /// Returns the directory error if loading the next group fails; the
    /// current group stays active.
    pub async fn advance_to_next(&mut self) -> Result<()> {
        let Some(active) = self.active.clone() else {
            return Ok(());
        };

        let start = self.cursor.map_or(0, |c| c + 1);
        if let Some(offset) = self
            .worklist
            .iter()
            .skip(start)
            .position(|item| !item.disposition.is_decided())
        {
            self.focus_index(start + offset).await;
            debug!(cursor = ?self.cursor, "advanced within group");
            return Ok(());
        }

        let next = self
            .groups
            .iter()
            .position(|g| g.id == active)
            .and_then(|idx| self.groups.get(idx + 1))
            .map(|g| g.id.clone());

        if let Some(next) = next {
            debug!(from = %active, to = %next, "advancing to next group");
            return self.load_group(&next, None).await;
        }

        self.cursor = None;
        self.detail = None;
        self.display = DisplayState::Done;
        info!("all groups reviewed");
        self.note("advance", "all groups reviewed");
        Ok(())
    }

    /// Move the cursor by `delta`, clamped to the worklist. Does nothing when
    /// the cursor would not move.
    pub async fn step_by(&mut self, delta: isize) {
        if self.worklist.is_empty() {
            return;
        }
        let last = self.worklist.len() - 1;
        let target = match self.cursor {
            Some(current) if delta < 0 => current.saturating_sub(delta.unsigned_abs()),
            Some(current) => current.saturating_add(delta.unsigned_abs()).min(last),
            None if delta > 0 => (delta.unsigned_abs() - 1).min(last),
            None => 0,
        };
        if Some(target) == self.cursor {
            return;
        }
        self.focus_index(target).await;
    }

    /// Focus a specific item of the worklist. Unknown ids are ignored.
    pub async fn focus_item(&mut self, item: ItemId) {
        if let Some(idx) = self.index_of(item) {
            self.focus_index(idx).await;
        }
    }

    /// Leave the active group.
    pub fn return_to_group_selection(&mut self) {
        self.active = None;
        self.worklist.clear();
        self.cursor = None;
        self.selection.clear();
        self.detail = None;
        self.prompt = Prompt::Closed;
        self.display = DisplayState::GroupSelection;
        debug!("returned to group selection");
    }

    /// Load the group after the active one, or the first group when none is
    /// active. Does nothing on the last group.
    ///
    /// # Errors
    ///
    /// Returns the directory error if the group cannot be loaded.
    pub async fn advance_to_next_group(&mut self) -> Result<()> {
        let next = match &self.active {
            Some(active) => self
                .groups
                .iter()
                .position(|g| &g.id == active)
                .and_then(|idx| self.groups.get(idx + 1)),
            None => self.groups.first(),
        }
        .map(|g| g.id.clone());

        match next {
            Some(next) => self.load_group(&next, None).await,
            None => Ok(()),
        }
    }

    /// Apply a saved location. An unknown or missing group leaves the session
    /// in group selection.
    ///
    /// # Errors
    ///
    /// Returns the directory error if the group cannot be loaded.
    pub async fn restore(&mut self, location: &SessionLocation) -> Result<()> {
        let Some(group) = &location.group else {
            return Ok(());
        };
        if !self.groups.iter().any(|g| &g.id == group) {
            self.note("restore", format!("saved group {group} no longer exists"));
            debug!(group = %group, "ignoring saved location for unknown group");
            return Ok(());
        }
        self.load_group(group, location.item).await
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    /// Flip selection of a worklist item. Returns whether it is now selected.
    pub fn toggle(&mut self, item: ItemId) -> bool {
        if self.index_of(item).is_none() {
            return false;
        }
        if self.selection.remove(&item) {
            false
        } else {
            self.selection.insert(item);
            true
        }
    }

    pub fn open_prompt(&mut self, prompt: Prompt) {
        self.prompt = prompt;
    }

    pub fn close_prompt(&mut self) {
        self.prompt = Prompt::Closed;
    }

    // -----------------------------------------------------------------------
    // Decisions
    // -----------------------------------------------------------------------

    /// Validate a decision and mark the item in flight.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if the item is not in the worklist and
    /// [`TriageError::InFlight`] if a decision for it is still outstanding.
    pub fn begin_decision(&mut self, item: ItemId, outcome: Outcome) -> Result<PendingDecision> {
        let Some(group) = self.active.clone() else {
            return Err(TriageError::item_not_found(item));
        };
        let Some(idx) = self.index_of(item) else {
            return Err(TriageError::item_not_found(item));
        };
        if !self.in_flight.insert(item) {
            return Err(TriageError::InFlight(item));
        }
        Ok(PendingDecision {
            item,
            outcome,
            group,
            was_counted: self.is_counted(&self.worklist[idx]),
        })
    }

    /// Apply the result of a persisted decision.
    ///
    /// Success updates the item wherever it is, moves its group counter when
    /// the backend's memory of the item changed, and advances only if the
    /// item is still focused.
    ///
    /// # Errors
    ///
    /// Returns the persistence error unchanged; nothing is applied locally.
    pub async fn finish_decision(
        &mut self,
        pending: PendingDecision,
        result: Result<DispositionAck>,
    ) -> Result<DecisionApplied> {
        let mut applied = self.settle_decision(&pending, result)?;

        let still_focused = self.focused().map(|item| item.id) == Some(pending.item);
        if still_focused {
            match self.advance_to_next().await {
                Ok(()) => applied.advanced = true,
                Err(err) => self.note("advance", format!("could not advance: {err}")),
            }
        }
        Ok(applied)
    }

    fn settle_decision(
        &mut self,
        pending: &PendingDecision,
        result: Result<DispositionAck>,
    ) -> Result<DecisionApplied> {
        self.in_flight.remove(&pending.item);

        let ack = match result {
            Ok(ack) => ack,
            Err(err) => {
                warn!(item = %pending.item, outcome = %pending.outcome, error = %err, "decision failed");
                self.note(
                    "decide",
                    format!("{} for {} failed: {err}", pending.outcome, pending.item),
                );
                return Err(err);
            }
        };

        let delta = self.apply_outcome(pending, ack.remembered);
        self.adjust_triaged(&pending.group, delta);
        let newly_decided = delta > 0;
        info!(
            item = %pending.item,
            outcome = %pending.outcome,
            remembered = ack.remembered,
            newly_decided,
            "decision applied"
        );

        Ok(DecisionApplied {
            item: pending.item,
            outcome: pending.outcome,
            newly_decided,
            advanced: false,
        })
    }

    /// Record `outcome` for `item`, then advance if that item is focused.
    ///
    /// Repeating the same decision writes again but never counts twice.
    ///
    /// # Errors
    ///
    /// Validation, not-found, transient and partial-write errors leave the
    /// session as it was.
    pub async fn decide(&mut self, item: ItemId, outcome: Outcome) -> Result<DecisionApplied> {
        let pending = self.begin_decision(item, outcome)?;
        let directory = Arc::clone(&self.directory);
        let result = pending.persist(directory.as_ref()).await;
        self.finish_decision(pending, result).await
    }

    /// Like [`TriageSession::decide`], but the cursor stays where it is and
    /// nothing else is fetched.
    ///
    /// # Errors
    ///
    /// Same as [`TriageSession::decide`].
    pub async fn decide_in_place(
        &mut self,
        item: ItemId,
        outcome: Outcome,
    ) -> Result<DecisionApplied> {
        let pending = self.begin_decision(item, outcome)?;
        let directory = Arc::clone(&self.directory);
        let result = pending.persist(directory.as_ref()).await;
        self.settle_decision(&pending, result)
    }

    /// Decide the focused item. No-op without focus.
    ///
    /// # Errors
    ///
    /// Same as [`TriageSession::decide`].
    pub async fn decide_focused(&mut self, outcome: Outcome) -> Result<Option<DecisionApplied>> {
        let Some(item) = self.focused().map(|item| item.id) else {
            return Ok(None);
        };
        self.decide(item, outcome).await.map(Some)
    }

    /// Project a persisted outcome onto the worklist. Returns how the group
    /// counter moves: `1` when the backend now remembers an item it did not
    /// count, `-1` when it forgot one it did.
    fn apply_outcome(&mut self, pending: &PendingDecision, remembered: bool) -> i64 {
        let counted_before = match self.index_of(pending.item) {
            Some(idx) => {
                let counted = self.is_counted(&self.worklist[idx]);
                let item = &mut self.worklist[idx];
                item.disposition = Disposition::from(pending.outcome);
                if pending.outcome == Outcome::Remove {
                    item.publication_status = PublicationStatus::Draft;
                }
                let status = item.publication_status;
                if let Some(detail) = self.detail.as_mut().filter(|d| d.id == pending.item) {
                    detail.publication_status = status;
                }
                counted
            }
            // The group was reloaded after the write and the item left the
            // listing, so the fetched counter already reflects the write.
            None if self.active.as_ref() == Some(&pending.group) => {
                self.mark_remembered(pending.item, remembered);
                return 0;
            }
            None => pending.was_counted,
        };
        self.mark_remembered(pending.item, remembered);
        i64::from(remembered) - i64::from(counted_before)
    }

    fn mark_remembered(&mut self, item: ItemId, remembered: bool) {
        if remembered {
            self.uncounted.remove(&item);
        } else {
            self.uncounted.insert(item);
        }
    }

    fn adjust_triaged(&mut self, group: &GroupId, delta: i64) {
        if delta == 0 {
            return;
        }
        if let Some(entry) = self.groups.iter_mut().find(|g| &g.id == group) {
            let next = i64::from(entry.triaged_count).saturating_add(delta).max(0);
            entry.triaged_count = u32::try_from(next).unwrap_or(u32::MAX);
        }
    }

    /// Apply `outcome` to every selected item.
    ///
    /// Writes run concurrently. Items with a decision already in flight are
    /// skipped. Failed writes leave their item untouched. Afterwards the
    /// counter moves once, the selection is cleared, the prompt closes and
    /// the cursor advances once.
    ///
    /// # Errors
    ///
    /// Returns [`TriageError::EmptySelection`] when nothing is selected.
    pub async fn bulk_decide(&mut self, outcome: Outcome) -> Result<BulkReport> {
        if self.selection.is_empty() {
            return Err(TriageError::EmptySelection);
        }
        let Some(group) = self.active.clone() else {
            return Err(TriageError::EmptySelection);
        };

        let targets: Vec<ItemId> = self
            .worklist
            .iter()
            .map(|item| item.id)
            .filter(|id| self.selection.contains(id) && !self.in_flight.contains(id))
            .collect();
        let counted_before: HashSet<ItemId> = self
            .worklist
            .iter()
            .filter(|item| targets.contains(&item.id) && self.is_counted(item))
            .map(|item| item.id)
            .collect();
        self.in_flight.extend(targets.iter().copied());

        let directory = Arc::clone(&self.directory);
        let results = join_all(targets.iter().map(|&item| {
            let directory = Arc::clone(&directory);
            async move { (item, write_decision(directory.as_ref(), item, outcome).await) }
        }))
        .await;

        let mut report = BulkReport {
            requested: targets.len(),
            ..BulkReport::default()
        };
        let mut delta = 0_i64;
        for (item, result) in results {
            self.in_flight.remove(&item);
            match result {
                Ok(ack) => {
                    report.succeeded += 1;
                    let pending = PendingDecision {
                        item,
                        outcome,
                        group: group.clone(),
                        was_counted: counted_before.contains(&item),
                    };
                    let moved = self.apply_outcome(&pending, ack.remembered);
                    if moved > 0 {
                        report.newly_decided += 1;
                    }
                    delta += moved;
                }
                Err(err) => {
                    report.failed += 1;
                    debug!(item = %item, error = %err, "bulk write failed");
                }
            }
        }

        self.adjust_triaged(&group, delta);
        self.selection.clear();
        self.prompt = Prompt::Closed;
        info!(
            outcome = %outcome,
            requested = report.requested,
            succeeded = report.succeeded,
            failed = report.failed,
            "bulk decision finished"
        );
        self.note(
            "bulk",
            format!("{outcome}: {} of {} applied", report.succeeded, report.requested),
        );

        if let Err(err) = self.advance_to_next().await {
            self.note("advance", format!("could not advance: {err}"));
        }
        Ok(report)
    }
}
