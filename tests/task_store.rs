mod support;

use std::time::Duration;

use questlog::reward::{Point, Rect, RewardNotice};
use questlog::session::{LocalSessionProvider, SessionProvider};
use questlog::store::{MutationKind, MutationOutcome};
use questlog::task::{Category, TaskDraft};
use questlog::view::{self, FilterMode, SortMode};
use questlog::{Error, TaskGateway, TaskStore};

use questlog::events::EventSink;

use support::{at, session, task, ScriptedGateway, SharedBuffer};

const STEVE: &str = "steve@example.com";
const ALEX: &str = "alex@example.com";

async fn store_for(gateway: std::sync::Arc<ScriptedGateway>, email: &str) -> TaskStore {
    let store = TaskStore::new(gateway);
    store.set_session(Some(session(email))).await.unwrap();
    store
}

#[test]
fn pending_filter_is_sound_and_complete() {
    let tasks = vec![
        task("u", "1", "Essay", 0, false),
        task("u", "2", "Lab report", 1, true),
        task("u", "3", "Flashcards", 2, false),
        task("u", "4", "Reading", 3, true),
        task("u", "5", "Problem set", 4, false),
    ];

    let pending = view::derive_tasks(&tasks, FilterMode::Pending, SortMode::DueAscending);

    assert!(pending.iter().all(|task| !task.completed));
    for task in tasks.iter().filter(|task| !task.completed) {
        assert!(pending.iter().any(|kept| kept.id == task.id), "missing {}", task.id);
    }
    assert_eq!(pending.len(), 3);
}

#[test]
fn title_sort_is_ordered_and_stable() {
    let tasks = vec![
        task("u", "1", "banana", 0, false),
        task("u", "2", "Apple", 1, false),
        task("u", "3", "cherry", 2, false),
        task("u", "4", "apple", 3, false),
        task("u", "5", "banana", 4, false),
    ];

    let sorted = view::derive_tasks(&tasks, FilterMode::All, SortMode::TitleAscending);

    for pair in sorted.windows(2) {
        assert_ne!(
            view::compare_titles(&pair[0].title, &pair[1].title),
            std::cmp::Ordering::Greater
        );
    }
    let bananas: Vec<&str> = sorted
        .iter()
        .filter(|task| task.title == "banana")
        .map(|task| task.id.as_str())
        .collect();
    assert_eq!(bananas, vec!["1", "5"]);
}

#[test]
fn level_and_progress_values() {
    assert_eq!(view::level(0), 1);
    assert_eq!(view::level(5), 2);
    assert_eq!(view::level(24), 5);
    assert_eq!(view::progress(0), 0.0);
    assert_eq!(view::progress(4), 80.0);
    assert_eq!(view::progress(5), 0.0);
}

#[tokio::test]
async fn remove_twice_matches_remove_once() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![
        task(&owner, "a", "Essay", 0, false),
        task(&owner, "b", "Quiz", 1, false),
    ]);
    let store = store_for(gateway.clone(), STEVE).await;

    let report = store.remove("a").await.unwrap();
    assert!(report.is_confirmed());
    let after_once = store.tasks();

    let err = store.remove("a").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(store.tasks(), after_once);
    assert!(store.pending_ops().is_empty());
    assert_eq!(gateway.inner.snapshot().await.len(), 1);
}

#[tokio::test]
async fn add_then_load_round_trips_draft_fields() {
    let gateway = ScriptedGateway::new();
    let store = store_for(gateway, STEVE).await;

    let draft = TaskDraft::new("Calculus midterm")
        .with_description("Chapters 3-5")
        .with_due(at(14, 9))
        .with_category(Category::Exam);
    store.add(draft.clone()).await.unwrap();

    store.load().await.unwrap();
    let first = store.tasks();
    let loaded = first
        .iter()
        .find(|task| task.title == draft.title)
        .expect("added task is loaded");
    assert_eq!(loaded.description, draft.description);
    assert_eq!(loaded.due, draft.due);
    assert_eq!(loaded.category, draft.category);
    assert!(!loaded.completed);

    store.load().await.unwrap();
    assert_eq!(store.tasks(), first);
}

#[tokio::test]
async fn sixth_completion_adds_progress_with_one_reward() {
    let owner = questlog::session::identity_for(STEVE);
    let mut seeded: Vec<_> = (0..5)
        .map(|i| task(&owner, &format!("done-{i}"), "Finished", i, true))
        .collect();
    seeded.push(task(&owner, "new", "Boss fight", 9, false));
    let gateway = ScriptedGateway::seeded(seeded);
    let store = store_for(gateway, STEVE).await;
    let mut notices = store.subscribe_rewards();

    let progress = store.progress();
    assert_eq!((progress.level, progress.progress), (2, 0.0));

    let origin = Rect {
        left: 10.0,
        top: 20.0,
        width: 30.0,
        height: 40.0,
    }
    .center();
    let report = store.toggle("new", false, Some(origin)).await.unwrap();

    assert_eq!(report.outcome, MutationOutcome::Confirmed);
    let progress = store.progress();
    assert_eq!(progress.completed, 6);
    assert_eq!(progress.level, 2);
    assert!((progress.progress - 20.0).abs() < f64::EPSILON);

    let active = store.active_rewards();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].origin, Some(Point::new(25.0, 40.0)));
    assert!(matches!(
        notices.try_recv().unwrap(),
        RewardNotice::Spawned(signal) if signal.id == active[0].id
    ));
    assert!(notices.try_recv().is_err());
}

#[tokio::test]
async fn fifth_completion_reaches_level_two_progress_zero() {
    let owner = questlog::session::identity_for(STEVE);
    let mut seeded: Vec<_> = (0..4)
        .map(|i| task(&owner, &format!("done-{i}"), "Finished", i, true))
        .collect();
    seeded.push(task(&owner, "new", "Boss fight", 9, false));
    let store = store_for(ScriptedGateway::seeded(seeded), STEVE).await;

    let report = store.toggle("new", false, None).await.unwrap();

    assert!(report.reward.is_some());
    let progress = store.progress();
    assert_eq!((progress.level, progress.progress), (2, 0.0));
    assert_eq!(store.active_rewards().len(), 1);
}

#[tokio::test]
async fn edit_of_missing_id_is_not_found_and_changes_nothing() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway.clone(), STEVE).await;
    let before = store.tasks();

    let err = store
        .edit("missing", TaskDraft::new("Renamed"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NotFound(id) if id == "missing"));
    assert_eq!(store.tasks(), before);
    assert_eq!(gateway.inner.snapshot().await, before);
}

#[tokio::test]
async fn edit_replaces_every_field() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway, STEVE).await;

    let draft = TaskDraft::new("Final essay")
        .with_description("5 pages")
        .with_due(at(20, 23))
        .with_category(Category::Project);
    let edited = store.edit("a", draft).await.unwrap();

    assert_eq!(store.task("a"), Some(edited.clone()));
    assert_eq!(edited.title, "Final essay");
    assert_eq!(edited.category, Category::Project);
    assert_eq!(edited.due, at(20, 23));
}

#[tokio::test]
async fn failed_toggle_confirmation_matches_fresh_load() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![
        task(&owner, "a", "Essay", 0, false),
        task(&owner, "b", "Quiz", 1, true),
    ]);
    let store = store_for(gateway.clone(), STEVE).await;
    gateway.fail_update(true);

    let report = store.toggle("a", false, None).await.unwrap();

    assert!(report.rollback_reason().unwrap().contains("503"));
    let expected = gateway.fetch_all(&owner).await.unwrap();
    assert_eq!(store.tasks(), expected);
    assert_eq!(store.task("a").map(|task| task.completed), Some(false));
    assert!(store.pending_ops().is_empty());
}

#[tokio::test]
async fn failed_delete_restores_task_by_reload() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway.clone(), STEVE).await;
    gateway.fail_delete(true);

    let report = store.remove("a").await.unwrap();

    assert_eq!(report.kind, MutationKind::Remove);
    assert!(report.rollback_reason().is_some());
    assert!(store.task("a").is_some());
}

#[tokio::test]
async fn failed_add_leaves_collection_unchanged() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway.clone(), STEVE).await;
    let before = store.tasks();
    gateway.fail_create(true);

    let err = store.add(TaskDraft::new("Quiz")).await.unwrap_err();

    assert!(matches!(err, Error::Backend(_)));
    assert_eq!(store.tasks(), before);
}

#[tokio::test]
async fn failed_load_clears_collection() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway.clone(), STEVE).await;
    assert_eq!(store.tasks().len(), 1);
    gateway.fail_fetch(true);

    assert!(store.load().await.is_err());
    assert!(store.tasks().is_empty());
    assert!(!store.is_loading());
}

#[tokio::test]
async fn optimistic_toggle_is_visible_before_confirmation() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway.clone(), STEVE).await;
    gateway.hold_updates(true);

    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.toggle("a", false, None).await }
    });
    gateway.update_parked().await;

    assert_eq!(store.task("a").map(|task| task.completed), Some(true));
    let ops = store.pending_ops();
    assert_eq!(ops.len(), 1);
    assert_eq!(ops[0].kind, MutationKind::Toggle);
    assert_eq!(ops[0].outcome, MutationOutcome::AppliedOptimistically);

    gateway.release_update();
    let report = pending.await.unwrap().unwrap();
    assert!(report.is_confirmed());
    assert!(store.pending_ops().is_empty());
    assert_eq!(store.task("a").map(|task| task.completed), Some(true));
}

#[tokio::test]
async fn overlapping_toggles_settle_on_backend_state() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway.clone(), STEVE).await;
    gateway.hold_updates(true);

    let first = tokio::spawn({
        let store = store.clone();
        async move { store.toggle("a", false, None).await }
    });
    gateway.update_parked().await;
    let second = tokio::spawn({
        let store = store.clone();
        async move { store.toggle("a", true, None).await }
    });
    gateway.update_parked().await;
    assert_eq!(store.pending_ops().len(), 2);

    gateway.fail_update(true);
    gateway.release_update();
    gateway.release_update();
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert!(first.rollback_reason().is_some());
    assert!(second.rollback_reason().is_some());
    assert_eq!(store.tasks(), gateway.fetch_all(&owner).await.unwrap());
}

#[tokio::test]
async fn session_switch_isolates_owners() {
    let steve = questlog::session::identity_for(STEVE);
    let alex = questlog::session::identity_for(ALEX);
    let gateway = ScriptedGateway::seeded(vec![
        task(&steve, "s1", "Steve's essay", 0, false),
        task(&alex, "a1", "Alex's lab", 1, false),
    ]);
    let store = store_for(gateway, STEVE).await;
    assert_eq!(store.tasks().len(), 1);

    store.set_session(Some(session(ALEX))).await.unwrap();

    let ids: Vec<String> = store.tasks().into_iter().map(|task| task.id).collect();
    assert_eq!(ids, vec!["a1".to_string()]);
    assert!(matches!(
        store.toggle("s1", false, None).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn results_from_previous_session_are_discarded() {
    let steve = questlog::session::identity_for(STEVE);
    let alex = questlog::session::identity_for(ALEX);
    let gateway = ScriptedGateway::seeded(vec![
        task(&steve, "s1", "Steve's essay", 0, false),
        task(&alex, "a1", "Alex's lab", 1, false),
    ]);
    let store = store_for(gateway.clone(), STEVE).await;
    gateway.hold_updates(true);

    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.toggle("s1", false, None).await }
    });
    gateway.update_parked().await;

    store.set_session(Some(session(ALEX))).await.unwrap();
    assert!(store.active_rewards().is_empty());
    assert!(store.pending_ops().is_empty());
    let fetches = gateway.fetch_count();

    gateway.fail_update(true);
    gateway.release_update();
    let report = pending.await.unwrap().unwrap();

    assert!(report.rollback_reason().is_some());
    assert_eq!(gateway.fetch_count(), fetches, "stale rollback must not reload");
    assert_eq!(store.owner(), Some(alex));
    let ids: Vec<String> = store.tasks().into_iter().map(|task| task.id).collect();
    assert_eq!(ids, vec!["a1".to_string()]);
}

#[tokio::test]
async fn shutdown_discards_in_flight_results() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway.clone(), STEVE).await;
    gateway.hold_updates(true);
    gateway.fail_update(true);

    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.toggle("a", false, None).await }
    });
    gateway.update_parked().await;
    let fetches = gateway.fetch_count();

    store.shutdown();
    gateway.release_update();
    pending.await.unwrap().unwrap();

    assert_eq!(gateway.fetch_count(), fetches);
    assert!(matches!(store.remove("a").await, Err(Error::StoreClosed)));
}

#[tokio::test]
async fn binding_follows_provider_until_dropped() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = TaskStore::new(gateway);
    let provider = LocalSessionProvider::in_memory();
    let binding = store.bind(&provider);
    let mut revisions = store.subscribe();

    provider.sign_in(STEVE).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.tasks().is_empty() {
            revisions.changed().await.unwrap();
        }
    })
    .await
    .expect("store loads after sign-in");
    assert_eq!(store.owner(), Some(owner.clone()));
    assert!(binding.is_active());

    binding.unbind().await;
    provider.sign_out().await.unwrap();
    tokio::task::yield_now().await;
    assert_eq!(store.owner(), Some(owner));
}

#[tokio::test]
async fn loading_flag_is_set_while_fetch_is_in_flight() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway.clone(), STEVE).await;
    assert!(!store.is_loading());
    gateway.hold_fetches(true);

    let load = tokio::spawn({
        let store = store.clone();
        async move { store.load().await }
    });
    gateway.fetch_parked().await;

    assert!(store.is_loading());

    gateway.release_fetch();
    assert_eq!(load.await.unwrap().unwrap(), 1);
    assert!(!store.is_loading());
}

#[tokio::test]
async fn toggle_writes_event_lines() {
    let owner = questlog::session::identity_for(STEVE);
    let gateway = ScriptedGateway::seeded(vec![task(&owner, "a", "Essay", 0, false)]);
    let store = store_for(gateway, STEVE).await;
    let buffer = SharedBuffer::default();
    store.set_event_sink(EventSink::from_writer(Box::new(buffer.clone())));

    let report = store.toggle("a", false, Some(Point::new(1.0, 2.0))).await.unwrap();

    let lines = buffer.lines();
    let kinds: Vec<&str> = lines
        .iter()
        .map(|line| line["event"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec!["task_toggled", "reward_spawned", "mutation_confirmed"]
    );
    assert_eq!(lines[0]["owner"], owner.as_str());
    assert_eq!(lines[0]["data"]["id"], "a");
    assert_eq!(lines[0]["data"]["completed"], true);
    assert_eq!(
        lines[1]["data"]["id"],
        report.reward.unwrap().to_string().as_str()
    );
    assert_eq!(lines[1]["data"]["origin"]["x"], 1.0);
    assert_eq!(lines[2]["data"]["outcome"]["state"], "confirmed");
}
