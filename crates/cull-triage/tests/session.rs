//! Behavioral tests for the triage session against a scriptable directory.

mod support;

use std::collections::BTreeMap;
use std::sync::Arc;

use cull_core::backend::KeepCache;
use cull_core::config::{MetricsConfig, Operator, Role};
use cull_core::db;
use cull_core::error::{ErrorClass, ErrorCode, TriageError};
use cull_core::links::LinkGraph;
use cull_core::location::SessionLocation;
use cull_core::metrics::parse_csv;
use cull_core::model::{Disposition, ItemId, Outcome, PublicationStatus};
use cull_core::store::ContentSnapshot;
use cull_core::{ContentDirectory, SqliteDirectory};
use cull_triage::{Command, DisplayState, Effect, Prompt, TriageSession, signals_for};

use support::{FakeDirectory, gid, item, undecided};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `page`: Alpha (undecided), Bravo (keep), Charlie (undecided).
/// `post`: Delta (undecided).
fn two_groups() -> Arc<FakeDirectory> {
    FakeDirectory::new()
        .with_group(
            "page",
            "Pages",
            vec![
                undecided(1, "Alpha"),
                item(2, "Bravo", Disposition::Keep),
                undecided(3, "Charlie"),
            ],
        )
        .with_group("post", "Posts", vec![undecided(10, "Delta")])
        .into_arc()
}

async fn open(fake: &Arc<FakeDirectory>) -> TriageSession {
    TriageSession::open(fake.clone()).await.expect("open session")
}

async fn open_page(fake: &Arc<FakeDirectory>) -> TriageSession {
    let mut session = open(fake).await;
    session.load_group(&gid("page"), None).await.expect("load page");
    session
}

fn triaged(session: &TriageSession, group: &str) -> u32 {
    session
        .groups()
        .iter()
        .find(|g| g.id == gid(group))
        .expect("group present")
        .triaged_count
}

fn triaged_total(session: &TriageSession) -> u32 {
    session.groups().iter().map(|g| g.triaged_count).sum()
}

fn focused_id(session: &TriageSession) -> Option<i64> {
    session.focused().map(|item| item.id.0)
}

fn assert_cursor_invariant(session: &TriageSession) {
    if let Some(cursor) = session.cursor() {
        assert!(cursor < session.worklist().len(), "cursor {cursor} out of range");
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn opens_in_group_selection() {
    let fake = two_groups();
    let session = open(&fake).await;

    assert_eq!(session.display(), DisplayState::GroupSelection);
    assert_eq!(session.cursor(), None);
    assert!(session.worklist().is_empty());
    assert_eq!(session.groups().len(), 2);
    assert_eq!(triaged(&session, "page"), 1);
    assert!(fake.detail_fetches().is_empty());
}

#[tokio::test]
async fn load_sorts_by_title_with_ties_in_fetch_order() {
    let fake = FakeDirectory::new()
        .with_group(
            "page",
            "Pages",
            vec![
                undecided(5, "beta"),
                undecided(3, "Alpha"),
                undecided(4, "Beta"),
                undecided(6, "alpha"),
            ],
        )
        .into_arc();
    let session = open_page(&fake).await;

    let order: Vec<i64> = session.worklist().iter().map(|i| i.id.0).collect();
    assert_eq!(order, vec![3, 6, 5, 4]);
    assert_eq!(session.cursor(), Some(0));
    assert_eq!(session.display(), DisplayState::Reviewing);
    assert_eq!(fake.detail_fetches(), vec![ItemId(3)]);
}

#[tokio::test]
async fn load_focuses_first_undecided() {
    let fake = FakeDirectory::new()
        .with_group(
            "page",
            "Pages",
            vec![
                item(1, "Alpha", Disposition::Keep),
                item(2, "Bravo", Disposition::Remove),
                undecided(3, "Charlie"),
            ],
        )
        .into_arc();
    let session = open_page(&fake).await;

    assert_eq!(focused_id(&session), Some(3));
    assert_eq!(session.detail().map(|d| d.id), Some(ItemId(3)));
}

#[tokio::test]
async fn duplicate_ids_in_listing_are_dropped() {
    let fake = FakeDirectory::new()
        .with_group(
            "page",
            "Pages",
            vec![undecided(1, "Alpha"), undecided(1, "Alpha again"), undecided(2, "Bravo")],
        )
        .into_arc();
    let session = open_page(&fake).await;

    let order: Vec<i64> = session.worklist().iter().map(|i| i.id.0).collect();
    assert_eq!(order, vec![1, 2]);
}

#[tokio::test]
async fn fully_decided_group_parks_cursor_at_start() {
    let fake = FakeDirectory::new()
        .with_group(
            "page",
            "Pages",
            vec![item(1, "Alpha", Disposition::Keep), item(2, "Bravo", Disposition::Remove)],
        )
        .into_arc();
    let session = open_page(&fake).await;

    assert_eq!(session.display(), DisplayState::GroupComplete);
    assert_eq!(session.cursor(), Some(0));
    assert_eq!(fake.detail_fetches(), vec![ItemId(1)]);
}

#[tokio::test]
async fn empty_group_has_no_cursor() {
    let fake = FakeDirectory::new().with_group("page", "Pages", vec![]).into_arc();
    let session = open_page(&fake).await;

    assert_eq!(session.cursor(), None);
    assert_eq!(session.display(), DisplayState::GroupComplete);
    assert!(session.detail().is_none());
}

#[tokio::test]
async fn failed_load_leaves_session_untouched() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    session.toggle(ItemId(3));
    fake.fail_listing("post");

    let err = session
        .load_group(&gid("post"), None)
        .await
        .expect_err("listing fails");
    assert_eq!(err.class(), ErrorClass::Transient);
    assert_eq!(session.active_group_id(), Some(&gid("page")));
    assert_eq!(session.worklist().len(), 3);
    assert_eq!(focused_id(&session), Some(1));
    assert!(session.selection().contains(&ItemId(3)));

    fake.heal_listing("post");
    session.load_group(&gid("post"), None).await.expect("retry");
    assert_eq!(focused_id(&session), Some(10));
    assert!(session.selection().is_empty());
}

#[tokio::test]
async fn unknown_group_is_not_found() {
    let fake = two_groups();
    let mut session = open(&fake).await;

    let err = session
        .load_group(&gid("missing"), None)
        .await
        .expect_err("unknown group");
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert_eq!(session.display(), DisplayState::GroupSelection);
    assert_eq!(fake.list_calls(), 0);
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn step_by_clamps_and_fetches_detail_for_any_disposition() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    fake.clear_detail_fetches();

    session.step_by(-1).await;
    assert_eq!(session.cursor(), Some(0));
    assert!(fake.detail_fetches().is_empty(), "unchanged cursor must not refetch");

    session.step_by(1).await;
    assert_eq!(focused_id(&session), Some(2));
    assert_eq!(fake.detail_fetches(), vec![ItemId(2)]);

    session.step_by(10).await;
    assert_eq!(session.cursor(), Some(2));
    session.step_by(-10).await;
    assert_eq!(session.cursor(), Some(0));
    assert_eq!(fake.detail_fetches(), vec![ItemId(2), ItemId(3), ItemId(1)]);
    assert_cursor_invariant(&session);
}

#[tokio::test]
async fn focus_item_ignores_unknown_ids() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    fake.clear_detail_fetches();

    session.focus_item(ItemId(99)).await;
    assert_eq!(focused_id(&session), Some(1));
    assert!(fake.detail_fetches().is_empty());

    session.focus_item(ItemId(3)).await;
    assert_eq!(focused_id(&session), Some(3));
    assert_eq!(session.detail().map(|d| d.id), Some(ItemId(3)));
}

#[tokio::test]
async fn return_to_group_selection_clears_everything() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    session.toggle(ItemId(1));
    session.open_prompt(Prompt::Bulk);

    session.return_to_group_selection();
    assert_eq!(session.display(), DisplayState::GroupSelection);
    assert_eq!(session.active_group_id(), None);
    assert_eq!(session.cursor(), None);
    assert!(session.worklist().is_empty());
    assert!(session.selection().is_empty());
    assert!(session.detail().is_none());
    assert_eq!(session.prompt(), Prompt::Closed);
}

#[tokio::test]
async fn next_group_key_walks_groups_in_order() {
    let fake = two_groups();
    let mut session = open(&fake).await;

    session.advance_to_next_group().await.expect("first group");
    assert_eq!(session.active_group_id(), Some(&gid("page")));

    session.advance_to_next_group().await.expect("second group");
    assert_eq!(session.active_group_id(), Some(&gid("post")));

    session.advance_to_next_group().await.expect("last group");
    assert_eq!(session.active_group_id(), Some(&gid("post")));
}

#[tokio::test]
async fn advancing_past_last_group_is_done() {
    let fake = two_groups();
    let mut session = open(&fake).await;
    session.load_group(&gid("post"), None).await.expect("load post");

    session.decide(ItemId(10), Outcome::Keep).await.expect("decide");
    assert_eq!(session.display(), DisplayState::Done);
    assert_eq!(session.cursor(), None);
    assert!(session.detail().is_none());
    assert_eq!(session.location().item, None);
}

#[tokio::test]
async fn advance_into_fully_decided_group_stops_there() {
    let fake = FakeDirectory::new()
        .with_group("page", "Pages", vec![undecided(1, "Alpha")])
        .with_group("post", "Posts", vec![item(10, "Delta", Disposition::Keep)])
        .with_group("news", "News", vec![undecided(20, "Echo")])
        .into_arc();
    let mut session = open_page(&fake).await;

    session.decide(ItemId(1), Outcome::Keep).await.expect("decide");
    assert_eq!(session.active_group_id(), Some(&gid("post")));
    assert_eq!(session.display(), DisplayState::GroupComplete);
    assert_eq!(session.cursor(), Some(0));
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn decide_skips_already_decided_items() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    fake.clear_detail_fetches();

    let applied = session.decide(ItemId(1), Outcome::Keep).await.expect("decide");
    assert!(applied.newly_decided);
    assert!(applied.advanced);
    assert_eq!(focused_id(&session), Some(3));
    assert_eq!(fake.detail_fetches(), vec![ItemId(3)]);
    assert_eq!(triaged(&session, "page"), 2);
}

#[tokio::test]
async fn remove_moves_item_to_draft() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    session.decide(ItemId(1), Outcome::Remove).await.expect("decide");
    let alpha = &session.worklist()[0];
    assert_eq!(alpha.disposition, Disposition::Remove);
    assert_eq!(alpha.publication_status, PublicationStatus::Draft);
    assert_eq!(fake.draft_calls(), vec![ItemId(1)]);
    assert_eq!(fake.stored_disposition(1), Disposition::Remove);
}

#[tokio::test]
async fn repeated_decision_counts_once() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    session.decide(ItemId(1), Outcome::Keep).await.expect("first");
    let cursor_after_first = session.cursor();
    let counter_after_first = triaged(&session, "page");

    let again = session.decide(ItemId(1), Outcome::Keep).await.expect("second");
    assert!(!again.newly_decided);
    assert!(!again.advanced);
    assert_eq!(session.cursor(), cursor_after_first);
    assert_eq!(triaged(&session, "page"), counter_after_first);
    assert_eq!(
        fake.record_calls(),
        vec![(ItemId(1), Outcome::Keep), (ItemId(1), Outcome::Keep)]
    );
}

#[tokio::test]
async fn changing_a_decision_does_not_count_again() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    session.decide(ItemId(2), Outcome::Remove).await.expect("re-decide kept item");
    assert_eq!(triaged(&session, "page"), 1);
    assert_eq!(session.worklist()[1].disposition, Disposition::Remove);
}

#[tokio::test]
async fn last_item_of_group_advances_to_next_group() {
    let fake = FakeDirectory::new()
        .with_group("post", "Posts", vec![undecided(10, "Only post")])
        .with_group("page", "Pages", vec![undecided(20, "X")])
        .into_arc();
    let mut session = open(&fake).await;
    session.load_group(&gid("post"), None).await.expect("load posts");

    session.decide(ItemId(10), Outcome::Keep).await.expect("decide");
    assert_eq!(session.active_group_id(), Some(&gid("page")));
    assert_eq!(focused_id(&session), Some(20));
    assert_eq!(session.detail().map(|d| d.id), Some(ItemId(20)));
    assert_eq!(triaged(&session, "post"), 1);
}

#[tokio::test]
async fn failed_write_changes_nothing() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    fake.fail_record(1);

    let err = session
        .decide(ItemId(1), Outcome::Keep)
        .await
        .expect_err("write fails");
    assert_eq!(err.class(), ErrorClass::Transient);
    assert_eq!(focused_id(&session), Some(1));
    assert_eq!(session.worklist()[0].disposition, Disposition::Undecided);
    assert_eq!(triaged(&session, "page"), 1);
    assert!(!session.is_in_flight(ItemId(1)));
    assert!(session.last_note().is_some());
}

#[tokio::test]
async fn failed_draft_after_record_is_a_partial_write() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    fake.fail_draft(1);

    let err = session
        .decide(ItemId(1), Outcome::Remove)
        .await
        .expect_err("draft fails");
    assert_eq!(err.code(), ErrorCode::PartialWrite);
    assert!(matches!(err, TriageError::PartialWrite { item, .. } if item == ItemId(1)));

    assert_eq!(session.worklist()[0].disposition, Disposition::Undecided);
    assert_eq!(session.worklist()[0].publication_status, PublicationStatus::Published);
    assert_eq!(focused_id(&session), Some(1));
    assert_eq!(triaged(&session, "page"), 1);
}

#[tokio::test]
async fn unknown_item_is_not_found() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    let err = session
        .decide(ItemId(10), Outcome::Keep)
        .await
        .expect_err("item of another group");
    assert_eq!(err.class(), ErrorClass::NotFound);
    assert!(fake.record_calls().is_empty());
}

#[tokio::test]
async fn second_decision_for_pending_item_is_rejected() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    let pending = session
        .begin_decision(ItemId(1), Outcome::Keep)
        .expect("begin");
    assert!(session.is_in_flight(ItemId(1)));

    let err = session
        .decide(ItemId(1), Outcome::Remove)
        .await
        .expect_err("in flight");
    assert_eq!(err.code(), ErrorCode::DecisionInFlight);

    let result = pending.persist(fake.as_ref()).await;
    session.finish_decision(pending, result).await.expect("finish");
    assert!(!session.is_in_flight(ItemId(1)));
    assert_eq!(fake.record_calls(), vec![(ItemId(1), Outcome::Keep)]);
}

#[tokio::test]
async fn late_response_applies_by_id_without_moving_cursor() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    let pending = session
        .begin_decision(ItemId(1), Outcome::Remove)
        .expect("begin");
    session.step_by(2).await;
    assert_eq!(focused_id(&session), Some(3));

    let result = pending.persist(fake.as_ref()).await;
    let applied = session
        .finish_decision(pending, result)
        .await
        .expect("finish");

    assert!(applied.newly_decided);
    assert!(!applied.advanced);
    assert_eq!(focused_id(&session), Some(3));
    assert_eq!(session.worklist()[0].disposition, Disposition::Remove);
    assert_eq!(triaged(&session, "page"), 2);
}

#[tokio::test]
async fn late_response_after_group_switch_still_counts_for_its_group() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    let pending = session
        .begin_decision(ItemId(1), Outcome::Keep)
        .expect("begin");
    session.load_group(&gid("post"), None).await.expect("switch");

    let result = pending.persist(fake.as_ref()).await;
    session
        .finish_decision(pending, result)
        .await
        .expect("finish");

    assert_eq!(triaged(&session, "page"), 2);
    assert_eq!(triaged(&session, "post"), 0);
    assert_eq!(focused_id(&session), Some(10));
}

async fn listed_triaged(directory: &dyn ContentDirectory, group: &str) -> u32 {
    directory
        .list_groups()
        .await
        .expect("list groups")
        .into_iter()
        .find(|g| g.id == gid(group))
        .expect("group listed")
        .triaged_count
}

#[tokio::test]
async fn reselecting_group_after_write_adopts_listed_counter() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    let pending = session
        .begin_decision(ItemId(1), Outcome::Keep)
        .expect("begin");
    let result = pending.persist(fake.as_ref()).await;
    session.load_group(&gid("page"), None).await.expect("reload");
    let applied = session
        .finish_decision(pending, result)
        .await
        .expect("finish");

    assert!(!applied.newly_decided);
    assert_eq!(triaged(&session, "page"), 2);
    assert_eq!(triaged(&session, "page"), listed_triaged(fake.as_ref(), "page").await);
}

#[tokio::test]
async fn reselecting_group_before_write_still_counts_once() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    let pending = session
        .begin_decision(ItemId(1), Outcome::Keep)
        .expect("begin");
    session.load_group(&gid("page"), None).await.expect("reload");
    let result = pending.persist(fake.as_ref()).await;
    let applied = session
        .finish_decision(pending, result)
        .await
        .expect("finish");

    assert!(applied.newly_decided);
    assert_eq!(triaged(&session, "page"), listed_triaged(fake.as_ref(), "page").await);
}

#[tokio::test]
async fn removed_item_dropped_by_reload_is_not_counted_twice() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    let pending = session
        .begin_decision(ItemId(1), Outcome::Remove)
        .expect("begin");
    let result = pending.persist(fake.as_ref()).await;
    session.load_group(&gid("page"), None).await.expect("reload");
    assert!(session.worklist().iter().all(|item| item.id != ItemId(1)));

    session
        .finish_decision(pending, result)
        .await
        .expect("finish");
    assert_eq!(triaged(&session, "page"), 2);
    assert_eq!(triaged(&session, "page"), listed_triaged(fake.as_ref(), "page").await);
}

#[tokio::test]
async fn decide_in_place_keeps_cursor_and_fetches_nothing() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    fake.clear_detail_fetches();
    let lists = fake.list_calls();

    let applied = session
        .decide_in_place(ItemId(3), Outcome::Keep)
        .await
        .expect("decide");

    assert!(applied.newly_decided);
    assert!(!applied.advanced);
    assert_eq!(focused_id(&session), Some(1));
    assert_eq!(triaged(&session, "page"), 2);
    assert!(fake.detail_fetches().is_empty());
    assert_eq!(fake.list_calls(), lists);
}

#[tokio::test]
async fn counters_grow_by_exactly_the_newly_decided() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    let before = triaged_total(&session);

    session.decide(ItemId(1), Outcome::Keep).await.expect("alpha");
    session.decide(ItemId(1), Outcome::Remove).await.expect("alpha again");
    session.decide(ItemId(2), Outcome::Remove).await.expect("bravo");
    session.decide(ItemId(3), Outcome::Keep).await.expect("charlie");
    session.decide(ItemId(10), Outcome::Keep).await.expect("delta");

    assert_eq!(triaged_total(&session), before + 3);
}

// ---------------------------------------------------------------------------
// Keep cache backend
// ---------------------------------------------------------------------------

const PAGES: &str = r#"{
    "groups": [
        {"id": "page", "label": "Pages", "items": [
            {"id": 1, "title": "Alpha"},
            {"id": 2, "title": "Bravo"},
            {"id": 3, "title": "Charlie"}
        ]}
    ]
}"#;

fn keep_cache_directory(cache: &std::path::Path) -> Arc<SqliteDirectory> {
    let conn = db::open_in_memory().expect("store");
    let directory = SqliteDirectory::from_connection(
        conn,
        Box::new(KeepCache::new(cache)),
        Operator::new("alice", Role::Editor),
    );
    directory
        .ingest(&ContentSnapshot::from_json(PAGES).expect("snapshot"))
        .expect("ingest");
    Arc::new(directory)
}

#[tokio::test]
async fn keep_cache_counts_only_remembered_keeps() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let directory = keep_cache_directory(&tmp.path().join("keep-cache.json"));
    let mut session = TriageSession::open(directory.clone()).await.expect("open");
    session.load_group(&gid("page"), None).await.expect("load page");

    let kept = session.decide(ItemId(1), Outcome::Keep).await.expect("keep alpha");
    assert!(kept.newly_decided);
    assert_eq!(triaged(&session, "page"), 1);

    let removed = session
        .decide(ItemId(2), Outcome::Remove)
        .await
        .expect("remove bravo");
    assert!(!removed.newly_decided);
    assert_eq!(session.worklist()[1].disposition, Disposition::Remove);
    assert_eq!(triaged(&session, "page"), 1);
    assert_eq!(listed_triaged(directory.as_ref(), "page").await, 1);

    session
        .decide(ItemId(1), Outcome::Remove)
        .await
        .expect("remove alpha");
    assert_eq!(triaged(&session, "page"), 0);

    let local = triaged(&session, "page");
    session.refresh_groups().await.expect("refresh");
    assert_eq!(triaged(&session, "page"), local);
}

// ---------------------------------------------------------------------------
// Selection and bulk
// ---------------------------------------------------------------------------

#[tokio::test]
async fn toggle_is_local_and_ignores_foreign_ids() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    assert!(session.toggle(ItemId(1)));
    assert!(!session.toggle(ItemId(1)));
    assert!(!session.toggle(ItemId(10)));
    assert!(session.selection().is_empty());
    assert!(fake.record_calls().is_empty());
}

#[tokio::test]
async fn bulk_remove_decides_all_and_advances_once() {
    let fake = FakeDirectory::new()
        .with_group(
            "page",
            "Pages",
            vec![undecided(1, "Alpha"), undecided(2, "Bravo"), undecided(3, "Charlie")],
        )
        .with_group("post", "Posts", vec![undecided(10, "Delta")])
        .into_arc();
    let mut session = open_page(&fake).await;
    session.toggle(ItemId(1));
    session.toggle(ItemId(2));
    session.open_prompt(Prompt::Bulk);
    fake.clear_detail_fetches();

    let report = session.bulk_decide(Outcome::Remove).await.expect("bulk");
    assert_eq!(report.requested, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.newly_decided, 2);

    for idx in 0..2 {
        assert_eq!(session.worklist()[idx].disposition, Disposition::Remove);
        assert_eq!(session.worklist()[idx].publication_status, PublicationStatus::Draft);
    }
    let mut drafted = fake.draft_calls();
    drafted.sort();
    assert_eq!(drafted, vec![ItemId(1), ItemId(2)]);

    assert_eq!(triaged(&session, "page"), 2);
    assert!(session.selection().is_empty());
    assert_eq!(session.prompt(), Prompt::Closed);
    assert_eq!(session.active_group_id(), Some(&gid("page")));
    assert_eq!(focused_id(&session), Some(3));
    assert_eq!(fake.detail_fetches(), vec![ItemId(3)]);
}

#[tokio::test]
async fn bulk_counts_only_successful_undecided_writes() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    fake.fail_record(3);
    session.toggle(ItemId(1));
    session.toggle(ItemId(2));
    session.toggle(ItemId(3));

    let report = session.bulk_decide(Outcome::Keep).await.expect("bulk");
    assert_eq!(report.requested, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.newly_decided, 1);

    assert_eq!(triaged(&session, "page"), 2);
    assert_eq!(session.worklist()[2].disposition, Disposition::Undecided);
    assert_eq!(focused_id(&session), Some(3));
}

#[tokio::test]
async fn bulk_needs_a_selection() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;

    let err = session
        .bulk_decide(Outcome::Keep)
        .await
        .expect_err("empty selection");
    assert_eq!(err.code(), ErrorCode::EmptySelection);
    assert_eq!(focused_id(&session), Some(1));
}

#[tokio::test]
async fn bulk_skips_items_already_in_flight() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    let pending = session
        .begin_decision(ItemId(1), Outcome::Keep)
        .expect("begin");
    session.toggle(ItemId(1));
    session.toggle(ItemId(3));

    let report = session.bulk_decide(Outcome::Keep).await.expect("bulk");
    assert_eq!(report.requested, 1);
    assert_eq!(fake.record_calls(), vec![(ItemId(3), Outcome::Keep)]);
    assert!(session.is_in_flight(ItemId(1)));

    let result = pending.persist(fake.as_ref()).await;
    session
        .finish_decision(pending, result)
        .await
        .expect("finish");
    assert_eq!(triaged(&session, "page"), 3);
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

#[tokio::test]
async fn location_tracks_group_and_focus() {
    let fake = two_groups();
    let mut session = open_page(&fake).await;
    assert_eq!(session.location().to_query(), "type=page&post=1");

    session.step_by(1).await;
    assert_eq!(session.location().to_query(), "type=page&post=2");

    session.return_to_group_selection();
    assert!(session.location().is_empty());
}

#[tokio::test]
async fn restore_focuses_saved_item_without_other_detail_fetches() {
    let fake = two_groups();
    let mut session = open(&fake).await;

    session
        .restore(&SessionLocation::from_query("type=page&post=3"))
        .await
        .expect("restore");
    assert_eq!(focused_id(&session), Some(3));
    assert_eq!(fake.detail_fetches(), vec![ItemId(3)]);
}

#[tokio::test]
async fn restore_of_missing_item_falls_back_to_first_undecided() {
    let fake = two_groups();
    let mut session = open(&fake).await;

    session
        .restore(&SessionLocation::from_query("type=page&post=999"))
        .await
        .expect("restore");
    assert_eq!(focused_id(&session), Some(1));
}

#[tokio::test]
async fn restore_of_unknown_group_stays_in_selection() {
    let fake = two_groups();
    let mut session = open(&fake).await;

    session
        .restore(&SessionLocation::from_query("type=gone&post=1"))
        .await
        .expect("restore");
    assert_eq!(session.display(), DisplayState::GroupSelection);
    assert_eq!(fake.list_calls(), 0);
}

// ---------------------------------------------------------------------------
// Commands and signals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn commands_drive_the_session() {
    let fake = two_groups();
    let mut session = open(&fake).await;

    session
        .apply_command(Command::SelectGroup(gid("page")))
        .await
        .expect("select");
    let err = session
        .apply_command(Command::OpenBulkPrompt)
        .await
        .expect_err("nothing selected");
    assert_eq!(err.code(), ErrorCode::EmptySelection);
    assert_eq!(session.prompt(), Prompt::Closed);

    let effect = session
        .apply_command(Command::ToggleSelection)
        .await
        .expect("toggle");
    assert_eq!(effect, Effect::Selected { selected: true });

    session
        .apply_command(Command::OpenBulkPrompt)
        .await
        .expect("open prompt");
    assert_eq!(session.prompt(), Prompt::Bulk);

    let effect = session
        .apply_command(Command::BulkDecide(Outcome::Keep))
        .await
        .expect("bulk");
    assert!(matches!(effect, Effect::Bulk(report) if report.succeeded == 1));
    assert_eq!(session.prompt(), Prompt::Closed);

    let effect = session
        .apply_command(Command::Decide(Outcome::Remove))
        .await
        .expect("decide focused");
    assert!(matches!(effect, Effect::Decided(applied) if applied.item == ItemId(3)));

    assert_eq!(
        session.apply_command(Command::Quit).await.expect("quit"),
        Effect::Quit
    );
}

#[tokio::test]
async fn signals_combine_links_metrics_and_badges() {
    let fake = two_groups();
    let session = open_page(&fake).await;

    let graph = LinkGraph {
        outbound: BTreeMap::from([(ItemId(1), vec![ItemId(3)]), (ItemId(3), vec![])]),
        inbound: BTreeMap::from([(ItemId(1), vec![]), (ItemId(3), vec![ItemId(1)])]),
    };
    let metrics = parse_csv("slug,sessions,bounce rate\n/alpha/,120,45%\n").expect("csv");
    let config = MetricsConfig::default();

    let signals = signals_for(&session, &graph, &metrics, &config).expect("focused item");
    assert_eq!(signals.key.as_deref(), Some("alpha"));
    assert_eq!(signals.outbound, 1);
    assert_eq!(signals.inbound, 0);
    assert_eq!(signals.sessions, Some(120.0));
    assert!(signals.high_traffic);
    assert!(signals.top_level);
    assert!(!signals.kept);
    assert_eq!(signals.remaining_in_group, 2);
    assert_eq!(signals.remaining_overall, 3);
    assert!(signals.metrics.is_some_and(|row| row.contains_key("bounce_rate")));
}
