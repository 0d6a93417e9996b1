//! Optimistic mutation and cache behaviour of `TodoSync` against an
//! in-memory backend

mod common;

use common::{MockBackend, todo, todos, wait_until};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use todo_sync::assembly::AssembledList;
use todo_sync::config::CacheConfig;
use todo_sync::error::{MutationKind, SyncError};
use todo_sync::filters::FilterQuery;
use todo_sync::models::{NewTodo, Priority, UpdateTodo};
use todo_sync::sync::TodoSync;

fn sync_for(backend: &Arc<MockBackend>) -> Arc<TodoSync<Arc<MockBackend>>> {
    Arc::new(TodoSync::new(Arc::clone(backend), &CacheConfig::default()))
}

// ============================================================================
// Optimistic create
// ============================================================================

#[tokio::test]
async fn test_optimistic_create_round_trip() {
    let backend = MockBackend::new();
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();
    sync.fetch_scroll(&filters, 10).await.unwrap();

    backend.mutation_gate.hold();
    let task = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move {
            sync.create(&NewTodo::new("A").with_priority(Priority::Low))
                .await
        }
    });
    wait_until(|| sync.pending_mutations().len() == 1).await;

    // Visible before the server has answered
    let cached = sync.cached_scroll(&filters, 10).unwrap();
    let shown: Vec<_> = cached.todos().collect();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "A");
    assert!(!shown[0].completed);
    assert_eq!(shown[0].priority, Priority::Low);
    assert!(shown[0].is_optimistic());
    assert!(sync.is_pending(&shown[0].id));

    backend.mutation_gate.release(1);
    let created = task.await.unwrap().unwrap();
    assert_eq!(created.id, "srv-1");

    let pages = sync.fetch_scroll(&filters, 10).await.unwrap();
    let ids: Vec<_> = pages.todos().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["srv-1"]);
    assert!(pages.todos().all(|t| !t.is_optimistic()));
    assert!(sync.pending_mutations().is_empty());
}

#[tokio::test]
async fn test_failed_create_restores_prior_list() {
    let backend = MockBackend::with_todos(todos(3));
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();
    let before = sync.fetch_paged(&filters, 1, 10).await.unwrap();

    backend.mutation_gate.hold();
    backend.fail_mutations.store(true, Ordering::SeqCst);
    let task = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.create(&NewTodo::new("Doomed")).await }
    });
    wait_until(|| !sync.pending_mutations().is_empty()).await;

    let during = sync.cached_paged(&filters, 1, 10).unwrap();
    assert_eq!(during.todos.len(), 4);
    assert_eq!(during.total_todos, 4);
    assert_eq!(during.todos[0].title, "Doomed");

    backend.mutation_gate.release(1);
    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        SyncError::Mutation {
            kind: MutationKind::Create,
            ..
        }
    ));
    assert_eq!(err.status(), Some(500));

    let after = sync.cached_paged(&filters, 1, 10).unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_create_patches_every_cached_list() {
    let backend = MockBackend::with_todos(todos(12));
    let sync = sync_for(&backend);
    let all = FilterQuery::default();
    let high = FilterQuery {
        priority: Some(Priority::High),
        ..Default::default()
    };
    sync.fetch_paged(&all, 1, 10).await.unwrap();
    sync.fetch_paged(&all, 2, 10).await.unwrap();
    sync.fetch_scroll(&high, 10).await.unwrap();

    backend.mutation_gate.hold();
    let task = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.create(&NewTodo::new("Everywhere")).await }
    });
    wait_until(|| !sync.pending_mutations().is_empty()).await;

    assert_eq!(sync.cached_paged(&all, 1, 10).unwrap().todos[0].title, "Everywhere");
    assert_eq!(sync.cached_paged(&all, 2, 10).unwrap().todos[0].title, "Everywhere");
    assert_eq!(sync.cached_paged(&all, 2, 10).unwrap().total_todos, 13);
    assert_eq!(sync.cached_scroll(&high, 10).unwrap().todos().count(), 1);

    backend.mutation_gate.release(1);
    task.await.unwrap().unwrap();
}

// ============================================================================
// Update and delete
// ============================================================================

#[tokio::test]
async fn test_update_patches_in_place_and_keeps_order() {
    let backend = MockBackend::with_todos(todos(3));
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();
    sync.fetch_scroll(&filters, 10).await.unwrap();

    backend.mutation_gate.hold();
    let task = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move {
            let updates = UpdateTodo {
                title: Some("Renamed".to_string()),
                ..UpdateTodo::completed(true)
            };
            sync.update("t2", &updates).await
        }
    });
    wait_until(|| sync.is_pending("t2")).await;

    let cached = sync.cached_scroll(&filters, 10).unwrap();
    let shown: Vec<_> = cached.todos().collect();
    assert_eq!(shown[1].id, "t2");
    assert_eq!(shown[1].title, "Renamed");
    assert!(shown[1].completed);
    assert!(!shown[0].completed);

    backend.mutation_gate.release(1);
    let updated = task.await.unwrap().unwrap();
    assert!(updated.completed);
    assert!(backend.server_todos()[1].completed);
}

#[tokio::test]
async fn test_overlapping_deletes_never_underflow_total() {
    let backend = MockBackend::with_todos(vec![todo("t1", "One"), todo("t2", "Two")]);
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();
    assert_eq!(sync.fetch_paged(&filters, 1, 10).await.unwrap().total_todos, 2);

    backend.mutation_gate.hold();
    let deletes: Vec<_> = ["t1", "t2", "ghost"]
        .into_iter()
        .map(|id| {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.delete(id).await })
        })
        .collect();
    wait_until(|| sync.pending_mutations().len() == 3).await;

    let during = sync.cached_paged(&filters, 1, 10).unwrap();
    assert!(during.todos.is_empty());
    assert_eq!(during.total_todos, 0);

    backend.mutation_gate.release(3);
    let mut failed = 0;
    for delete in deletes {
        if delete.await.unwrap().is_err() {
            failed += 1;
        }
    }
    assert_eq!(failed, 1);

    let refreshed = sync.fetch_paged(&filters, 1, 10).await.unwrap();
    assert_eq!(refreshed.total_todos, 0);
    assert!(refreshed.todos.is_empty());
}

#[tokio::test]
async fn test_repeated_delete_keeps_total_at_zero() {
    let backend = MockBackend::with_todos(vec![todo("t1", "Only")]);
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();
    sync.fetch_paged(&filters, 1, 10).await.unwrap();

    backend.mutation_gate.hold();
    let first = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.delete("t1").await }
    });
    let second = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.delete("t1").await }
    });
    wait_until(|| sync.pending_mutations().len() == 2).await;
    assert_eq!(sync.cached_paged(&filters, 1, 10).unwrap().total_todos, 0);

    backend.mutation_gate.release(2);
    let results = [first.await.unwrap(), second.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(sync.cached_paged(&filters, 1, 10).unwrap().total_todos, 0);
}

#[tokio::test]
async fn test_delete_of_unlisted_todo_still_decrements_total() {
    let backend = MockBackend::with_todos(todos(2));
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();
    sync.fetch_paged(&filters, 1, 10).await.unwrap();

    backend.mutation_gate.hold();
    let task = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.delete("elsewhere").await }
    });
    wait_until(|| sync.is_pending("elsewhere")).await;

    let during = sync.cached_paged(&filters, 1, 10).unwrap();
    assert_eq!(during.todos.len(), 2);
    assert_eq!(during.total_todos, 1);

    backend.mutation_gate.release(1);
    assert!(task.await.unwrap().is_err());
    assert_eq!(sync.cached_paged(&filters, 1, 10).unwrap().total_todos, 2);
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn test_scroll_continuation_follows_cursors() {
    let backend = MockBackend::with_todos(todos(25));
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();

    let pages = sync.fetch_scroll(&filters, 10).await.unwrap();
    let list = AssembledList::from_scroll(&pages, 10);
    assert_eq!(list.count(), 10);
    assert!(list.should_fetch_next(9, false));

    let pages = sync.fetch_next_page(&filters, 10).await.unwrap();
    let list = AssembledList::from_scroll(&pages, 10);
    assert_eq!(list.count(), 20);
    assert_eq!(list.todos[10].id, "t11");
    assert!(list.is_trigger(19));
    assert!(!list.is_trigger(18));

    let pages = sync.fetch_next_page(&filters, 10).await.unwrap();
    assert_eq!(pages.todos().count(), 25);
    assert!(!pages.has_next_page());

    let calls = backend.list_calls();
    sync.fetch_next_page(&filters, 10).await.unwrap();
    assert_eq!(backend.list_calls(), calls);
}

#[tokio::test]
async fn test_stale_scroll_refetches_every_loaded_page() {
    let backend = MockBackend::with_todos(todos(25));
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();
    sync.fetch_scroll(&filters, 10).await.unwrap();
    sync.fetch_next_page(&filters, 10).await.unwrap();
    assert_eq!(backend.list_calls(), 2);

    sync.invalidate();
    let pages = sync.fetch_scroll(&filters, 10).await.unwrap();
    assert_eq!(pages.pages.len(), 2);
    assert_eq!(pages.todos().count(), 20);
    assert_eq!(backend.list_calls(), 4);
}

#[tokio::test]
async fn test_superseded_fetch_is_discarded() {
    let backend = MockBackend::with_todos(todos(2));
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();

    backend.list_gate.hold();
    let fetch = tokio::spawn({
        let sync = Arc::clone(&sync);
        let filters = filters.clone();
        async move { sync.fetch_paged(&filters, 1, 10).await }
    });
    wait_until(|| backend.started_lists.load(Ordering::SeqCst) == 1).await;

    backend.mutation_gate.hold();
    let create = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.create(&NewTodo::new("Third")).await }
    });
    wait_until(|| !sync.pending_mutations().is_empty()).await;

    backend.list_gate.release(1);
    fetch.await.unwrap().unwrap();
    assert!(sync.cached_paged(&filters, 1, 10).is_none());

    backend.mutation_gate.release(1);
    create.await.unwrap().unwrap();
    backend.list_gate.release(1);
    let data = sync.fetch_paged(&filters, 1, 10).await.unwrap();
    assert_eq!(data.total_todos, 3);
    assert_eq!(data.todos[0].title, "Third");
}

#[tokio::test(start_paused = true)]
async fn test_fresh_entries_served_until_stale_time() {
    let backend = MockBackend::with_todos(todos(2));
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();

    sync.fetch_paged(&filters, 1, 10).await.unwrap();
    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    sync.fetch_paged(&filters, 1, 10).await.unwrap();
    assert_eq!(backend.list_calls(), 1);

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    sync.fetch_paged(&filters, 1, 10).await.unwrap();
    assert_eq!(backend.list_calls(), 2);
}

#[tokio::test]
async fn test_list_failure_leaves_cache_untouched() {
    let backend = MockBackend::with_todos(todos(2));
    let sync = sync_for(&backend);
    let filters = FilterQuery::default();
    let before = sync.fetch_paged(&filters, 1, 10).await.unwrap();

    sync.invalidate();
    backend.fail_lists.store(true, Ordering::SeqCst);
    let err = sync.fetch_paged(&filters, 1, 10).await.unwrap_err();
    assert!(matches!(err, SyncError::Api(_)));
    assert_eq!(sync.cached_paged(&filters, 1, 10), Some(before));
}
