//! StateSynchronizer behaviour against a scripted store
//!
//! Covers optimistic apply and rollback, the watched/favorite cross-set rule,
//! per-key serialization and reload ordering.

mod helpers;

use anitodo_common::{AniEvent, EventBus};
use anitodo_sync::{Error, MutationKind, StateSynchronizer, Store};
use helpers::MockStore;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

fn synchronizer(store: &Arc<MockStore>) -> Arc<StateSynchronizer> {
    let store: Arc<dyn Store> = store.clone();
    Arc::new(StateSynchronizer::new(store, EventBus::new(64)))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn test_starts_unloaded_and_reload_populates() {
    let store = MockStore::with_entries(&["Frieren", "Dandadan"]);
    store.add_favorite("Frieren");
    let sync = synchronizer(&store);

    assert!(!sync.is_loaded().await);
    assert!(sync.watched_snapshot().await.is_empty());

    assert!(sync.reload().await.unwrap());

    assert!(sync.is_loaded().await);
    assert!(sync.is_favorite("Frieren").await);
    assert_eq!(sync.today().await[helpers::WEEKDAY].len(), 2);
    assert_eq!(sync.favorite_today().await.len(), 1);
}

#[tokio::test]
async fn test_toggle_watched_success() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    sync.toggle_watched(id).await.unwrap();

    assert!(sync.is_watched(id).await);
    assert!(store.stored_watched().contains(&id));
    assert!(sync.pending_today().await[helpers::WEEKDAY].is_empty());
}

#[tokio::test]
async fn test_toggle_watched_rolls_back_on_failure() {
    let store = MockStore::with_entries(&["Frieren"]);
    store.fail_watch.store(true, Ordering::SeqCst);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();
    let mut events = sync.events().subscribe();

    // Park the store call to observe the optimistic state
    let gate = store.gate.write().await;
    let task = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.toggle_watched(id).await })
    };
    settle().await;
    assert!(sync.is_watched(id).await, "watched must apply before the store confirms");
    assert!(sync.watch_in_flight(id));

    drop(gate);
    let result = task.await.unwrap();

    match result {
        Err(Error::Mutation { kind, key, .. }) => {
            assert_eq!(kind, MutationKind::Watch);
            assert_eq!(key, id.to_string());
        }
        other => panic!("expected watch mutation failure, got {:?}", other),
    }
    assert!(!sync.is_watched(id).await);
    assert!(!sync.watch_in_flight(id));

    let mut rolled_back = false;
    while let Ok(event) = events.try_recv() {
        if let AniEvent::MutationRolledBack { key, .. } = event {
            assert_eq!(key, format!("watch:{}", id));
            rolled_back = true;
        }
    }
    assert!(rolled_back);
}

#[tokio::test]
async fn test_failed_rewatch_keeps_confirmed_watch() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    sync.toggle_watched(id).await.unwrap();
    store.fail_watch.store(true, Ordering::SeqCst);
    assert!(sync.toggle_watched(id).await.is_err());

    // The earlier confirmed watch is not undone by a later failure
    assert!(sync.is_watched(id).await);
}

#[tokio::test]
async fn test_toggle_favorite_flips_and_persists() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    assert!(sync.toggle_favorite(id, "Frieren").await.unwrap());
    assert!(sync.is_favorite("Frieren").await);
    assert_eq!(store.stored_favorites(), vec!["Frieren".to_string()]);

    assert!(!sync.toggle_favorite(id, "Frieren").await.unwrap());
    assert!(!sync.is_favorite("Frieren").await);
    assert!(store.stored_favorites().is_empty());
}

#[tokio::test]
async fn test_toggle_favorite_rolls_back_on_failure() {
    let store = MockStore::with_entries(&["Frieren"]);
    store.fail_collect.store(true, Ordering::SeqCst);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    let err = sync.toggle_favorite(id, "Frieren").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Mutation { kind: MutationKind::Collect, ref key, .. } if key == "Frieren"
    ));
    assert!(!sync.is_favorite("Frieren").await);
}

#[tokio::test]
async fn test_unfollow_failure_restores_favorite() {
    let store = MockStore::with_entries(&["Frieren"]);
    store.add_favorite("Frieren");
    store.fail_uncollect.store(true, Ordering::SeqCst);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    assert!(sync.toggle_favorite(id, "Frieren").await.is_err());
    assert!(sync.is_favorite("Frieren").await);
}

#[tokio::test]
async fn test_favorite_survives_id_change() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let old_id = store.id_of("Frieren").unwrap();

    sync.toggle_favorite(old_id, "Frieren").await.unwrap();

    store.renumber();
    sync.reload().await.unwrap();
    let new_id = store.id_of("Frieren").unwrap();

    assert_ne!(old_id, new_id);
    assert!(sync.is_favorite("Frieren").await);
    assert_eq!(sync.favorite_today().await[0].id, Some(new_id));
}

#[tokio::test]
async fn test_watching_a_favorite_unfollows_it() {
    let store = MockStore::with_entries(&["Frieren", "Dandadan"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    sync.toggle_favorite(id, "Frieren").await.unwrap();
    sync.toggle_watched(id).await.unwrap();

    assert!(sync.is_watched(id).await);
    assert!(!sync.is_favorite("Frieren").await);
    assert!(store.stored_favorites().is_empty());
    assert_eq!(
        store.calls(),
        vec![
            "collect:Frieren".to_string(),
            format!("watch:{}", id),
            "uncollect:Frieren".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_watching_unfollowed_entry_does_not_uncollect() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    sync.toggle_watched(id).await.unwrap();

    assert_eq!(store.calls(), vec![format!("watch:{}", id)]);
}

#[tokio::test]
async fn test_unfollow_failure_after_watch_is_reported() {
    let store = MockStore::with_entries(&["Frieren"]);
    store.add_favorite("Frieren");
    store.fail_uncollect.store(true, Ordering::SeqCst);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    let err = sync.toggle_watched(id).await.unwrap_err();

    assert!(matches!(err, Error::Mutation { kind: MutationKind::Uncollect, .. }));
    // Two independent writes: the watch stands, the follow is restored
    assert!(sync.is_watched(id).await);
    assert!(sync.is_favorite("Frieren").await);
}

#[tokio::test]
async fn test_same_key_toggles_are_serialized() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    let gate = store.gate.write().await;
    let first = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.toggle_favorite(id, "Frieren").await })
    };
    settle().await;
    let second = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.toggle_favorite(id, "Frieren").await })
    };
    settle().await;

    // Second toggle has not reached the store while the first is parked
    assert_eq!(store.calls(), vec!["collect:Frieren".to_string()]);
    assert!(sync.favorite_in_flight("Frieren"));

    drop(gate);
    assert!(first.await.unwrap().unwrap());
    assert!(!second.await.unwrap().unwrap());

    assert_eq!(
        store.calls(),
        vec!["collect:Frieren".to_string(), "uncollect:Frieren".to_string()]
    );
    assert!(!sync.is_favorite("Frieren").await);
    assert!(store.stored_favorites().is_empty());
}

#[tokio::test]
async fn test_different_keys_proceed_concurrently() {
    let store = MockStore::with_entries(&["Frieren", "Dandadan"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let a = store.id_of("Frieren").unwrap();
    let b = store.id_of("Dandadan").unwrap();

    let gate = store.gate.write().await;
    let tasks: Vec<_> = [a, b]
        .into_iter()
        .map(|id| {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.toggle_watched(id).await })
        })
        .collect();
    settle().await;

    // Both writes are inside the store at once
    assert_eq!(store.calls().len(), 2);

    drop(gate);
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(sync.watched_snapshot().await.len(), 2);
}

#[tokio::test]
async fn test_failed_reload_keeps_state() {
    let store = MockStore::with_entries(&["Frieren"]);
    store.add_favorite("Frieren");
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();

    store.fail_queries.store(true, Ordering::SeqCst);
    let err = sync.reload().await.unwrap_err();

    assert!(matches!(err, Error::Query { .. }));
    assert!(sync.is_loaded().await);
    assert!(sync.is_favorite("Frieren").await);
    assert_eq!(sync.today().await[helpers::WEEKDAY].len(), 1);
}

#[tokio::test]
async fn test_stale_reload_is_discarded() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);

    let (release, hold) = oneshot::channel();
    *store.hold_next_today.lock().unwrap() = Some(hold);

    let slow = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.reload().await })
    };
    settle().await;

    store.add_favorite("Dandadan");
    assert!(sync.reload().await.unwrap(), "newer reload applies");

    release.send(()).unwrap();
    assert!(!slow.await.unwrap().unwrap(), "older reload is discarded");

    assert!(sync.is_favorite("Dandadan").await);
}

#[tokio::test]
async fn test_history_failure_is_query_error() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);

    let page = sync.history(1, 10).await.unwrap();
    assert_eq!(page.total, 1);

    let err = sync.history(0, 10).await.unwrap_err();
    assert!(matches!(err, Error::Query { query: "query_ani_history_list", .. }));
}

#[tokio::test]
async fn test_reload_during_in_flight_toggles_keeps_confirmed_changes() {
    let store = MockStore::with_entries(&["Frieren", "Dandadan"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let watch_id = store.id_of("Dandadan").unwrap();
    let follow_id = store.id_of("Frieren").unwrap();

    let gate = store.gate.write().await;
    let watch = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.toggle_watched(watch_id).await })
    };
    let follow = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.toggle_favorite(follow_id, "Frieren").await })
    };
    settle().await;
    assert!(sync.is_watched(watch_id).await);
    assert!(sync.is_favorite("Frieren").await);

    // The store has not written either change yet, so a reload clears them
    assert!(sync.reload().await.unwrap());
    assert!(!sync.is_watched(watch_id).await);
    assert!(!sync.is_favorite("Frieren").await);

    drop(gate);
    watch.await.unwrap().unwrap();
    assert!(follow.await.unwrap().unwrap());

    let stored_favorites: HashSet<String> = store.stored_favorites().into_iter().collect();
    assert_eq!(sync.watched_snapshot().await, store.stored_watched());
    assert_eq!(sync.favorite_snapshot().await, stored_favorites);
    assert!(sync.is_watched(watch_id).await);
    assert!(sync.is_favorite("Frieren").await);
}

#[tokio::test]
async fn test_watch_unfollows_a_follow_still_in_flight_after_reload() {
    let store = MockStore::with_entries(&["Frieren"]);
    let sync = synchronizer(&store);
    sync.reload().await.unwrap();
    let id = store.id_of("Frieren").unwrap();

    let gate = store.gate.write().await;
    let watch = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.toggle_watched(id).await })
    };
    settle().await;
    let follow = {
        let sync = Arc::clone(&sync);
        tokio::spawn(async move { sync.toggle_favorite(id, "Frieren").await })
    };
    settle().await;

    // Drops the optimistic follow while the collect is still parked
    sync.reload().await.unwrap();
    assert!(!sync.is_favorite("Frieren").await);

    drop(gate);
    watch.await.unwrap().unwrap();
    assert!(follow.await.unwrap().unwrap());

    // Watched and followed never both stand
    assert!(sync.is_watched(id).await);
    assert!(!sync.is_favorite("Frieren").await);
    assert!(store.stored_favorites().is_empty());
    assert_eq!(store.calls().last(), Some(&"uncollect:Frieren".to_string()));
}
