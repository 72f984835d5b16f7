use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use statusboard_core::adapter::{AdapterRegistry, RemoteOp};
use statusboard_core::coordinator::{Coordinator, UndoOutcome};
use statusboard_core::goals::{GoalAdapter, GoalStore};
use statusboard_core::item::{Item, ItemId, ListId, Service, week_start};
use statusboard_core::memory::MemoryAdapter;
use statusboard_core::notice::{ChannelPresenter, Severity, UiEvent};
use statusboard_core::undo::UndoStack;
use tempfile::tempdir;
use tokio::sync::mpsc::UnboundedReceiver;

fn error_notices(events: &mut UnboundedReceiver<UiEvent>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let UiEvent::Notice(notice) = event
            && notice.severity == Severity::Error
        {
            out.push(notice.message);
        }
    }
    out
}

#[tokio::test]
async fn goal_mutations_reach_the_store_and_undo_reverts_them() {
    let temp = tempdir().expect("tempdir");
    let seed = GoalStore::open(temp.path()).expect("open store");
    let week = week_start(Local::now().date_naive());
    let now = Utc::now();
    let first = seed.create("Ship the beta", week, now).expect("create");
    let second = seed.create("Write the changelog", week, now).expect("create");

    let adapter = GoalAdapter::new(GoalStore::open(temp.path()).expect("open store"));
    let items = adapter.current_week_items().expect("load goals");
    let (presenter, mut events) = ChannelPresenter::new();
    let mut coordinator = Coordinator::new(
        AdapterRegistry::new().with(Arc::new(adapter)),
        UndoStack::default(),
        Box::new(presenter),
    )
    .with_debounce(Duration::from_millis(20));
    let list = ListId::new("goals");
    coordinator.refresh_list(list.clone(), Service::Goals, items);

    let first_id = ItemId::new(Service::Goals, first.id.to_string());
    let second_id = ItemId::new(Service::Goals, second.id.to_string());

    coordinator.complete(&first_id).expect("complete");
    coordinator.abandon(&second_id).expect("abandon");
    coordinator.settle().await;

    let stored = seed.load_week(week).expect("load week");
    assert!(stored[0].is_completed);
    assert!(stored[1].is_abandoned);

    assert!(matches!(coordinator.undo(), UndoOutcome::Undone(_)));
    coordinator.settle().await;
    let stored = seed.load_week(week).expect("load week");
    assert!(!stored[1].is_abandoned);

    coordinator.move_item(&second_id, -1).expect("move up");
    coordinator.settle().await;
    let stored = seed.load_week(week).expect("load week");
    assert_eq!(stored[0].id, second.id);
    assert_eq!(stored[1].id, first.id);

    assert!(error_notices(&mut events).is_empty());
}

#[tokio::test]
async fn goal_creation_uses_the_store_id() {
    let temp = tempdir().expect("tempdir");
    let adapter = GoalAdapter::new(GoalStore::open(temp.path()).expect("open store"));
    let (presenter, mut events) = ChannelPresenter::new();
    let mut coordinator = Coordinator::new(
        AdapterRegistry::new().with(Arc::new(adapter)),
        UndoStack::default(),
        Box::new(presenter),
    );
    let list = ListId::new("goals");
    coordinator.refresh_list(list.clone(), Service::Goals, vec![]);

    let id = coordinator.create(&list, "Learn tokio").expect("create");
    coordinator.settle().await;

    let remote_id = coordinator
        .board()
        .item(&id)
        .and_then(|item| item.remote_id.clone())
        .expect("remote id assigned");
    let stored = GoalStore::open(temp.path())
        .expect("open store")
        .load_all()
        .expect("load");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id.to_string(), remote_id);

    coordinator.undo();
    coordinator.settle().await;
    let stored = GoalStore::open(temp.path())
        .expect("open store")
        .load_all()
        .expect("load");
    assert!(stored.is_empty());
    assert!(error_notices(&mut events).is_empty());
}

#[tokio::test]
async fn store_rejections_roll_back_like_any_failure() {
    let temp = tempdir().expect("tempdir");
    let seed = GoalStore::open(temp.path()).expect("open store");
    let goal = seed
        .create("Read a book", week_start(Local::now().date_naive()), Utc::now())
        .expect("create");

    let adapter = GoalAdapter::new(seed);
    let (presenter, mut events) = ChannelPresenter::new();
    let mut coordinator = Coordinator::new(
        AdapterRegistry::new().with(Arc::new(adapter)),
        UndoStack::default(),
        Box::new(presenter),
    );
    let list = ListId::new("goals");
    coordinator.refresh_list(
        list.clone(),
        Service::Goals,
        vec![
            Item::new(Service::Goals, goal.id.to_string(), goal.content.clone()),
            Item::new(Service::Goals, "not-a-uuid", "Ghost goal"),
        ],
    );

    let ghost = ItemId::new(Service::Goals, "not-a-uuid");
    coordinator.complete(&ghost).expect("accepted locally");
    coordinator.settle().await;

    assert!(!coordinator.board().item(&ghost).expect("still listed").completed);
    assert_eq!(error_notices(&mut events), vec!["Failed to complete Ghost goal".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_ordinary_failures() {
    let slow = MemoryAdapter::new(Service::Todoist).with_latency(Duration::from_secs(30));
    let observer = slow.clone();
    let (presenter, mut events) = ChannelPresenter::new();
    let mut coordinator = Coordinator::new(
        AdapterRegistry::new()
            .with(Arc::new(slow))
            .with_timeout(Duration::from_secs(10)),
        UndoStack::default(),
        Box::new(presenter),
    );
    let list = ListId::new("todoist");
    coordinator.refresh_list(
        list,
        Service::Todoist,
        vec![Item::new(Service::Todoist, "7", "Pay rent")],
    );
    let id = ItemId::new(Service::Todoist, "7");

    coordinator.complete(&id).expect("complete");
    coordinator.settle().await;

    assert!(!coordinator.board().item(&id).expect("listed").completed);
    assert!(coordinator.undo_stack().is_empty());
    assert_eq!(observer.calls(), vec![RemoteOp::Complete { id: "7".to_string() }]);
    assert_eq!(error_notices(&mut events), vec!["Failed to complete Pay rent".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn a_small_history_forgets_early_actions() {
    let todoist = MemoryAdapter::new(Service::Todoist);
    let (presenter, _events) = ChannelPresenter::new();
    let mut coordinator = Coordinator::new(
        AdapterRegistry::new().with(Arc::new(todoist)),
        UndoStack::new(2),
        Box::new(presenter),
    );
    coordinator.refresh_list(
        ListId::new("todoist"),
        Service::Todoist,
        (1..=3)
            .map(|n| Item::new(Service::Todoist, n.to_string(), format!("Task {n}")))
            .collect(),
    );

    for n in 1..=3 {
        coordinator
            .complete(&ItemId::new(Service::Todoist, n.to_string()))
            .expect("complete");
    }
    coordinator.settle().await;

    assert!(matches!(coordinator.undo(), UndoOutcome::Undone(_)));
    assert!(matches!(coordinator.undo(), UndoOutcome::Undone(_)));
    assert_eq!(coordinator.undo(), UndoOutcome::Empty);

    let first = ItemId::new(Service::Todoist, "1");
    assert!(coordinator.board().item(&first).expect("listed").completed);
}
