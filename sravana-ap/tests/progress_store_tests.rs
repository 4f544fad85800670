//! SQLite progress store

use sravana_ap::db::{init_database, ProgressStore, SqliteProgressStore};
use tempfile::TempDir;
use uuid::Uuid;

async fn store() -> (SqliteProgressStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("nested").join("progress.db"))
        .await
        .unwrap();
    (SqliteProgressStore::new(pool), dir)
}

#[tokio::test]
async fn test_upsert_replaces_single_row() {
    let (store, _dir) = store().await;
    let (user, track) = (Uuid::new_v4(), Uuid::new_v4());

    assert!(store.fetch_progress(user, track).await.unwrap().is_none());

    store.upsert_progress(user, track, 1, 42.5, false).await.unwrap();
    let first = store.fetch_progress(user, track).await.unwrap().unwrap();
    assert_eq!(first.current_chapter, 1);
    assert_eq!(first.current_position_seconds, 42.5);
    assert!(!first.is_completed);

    store.upsert_progress(user, track, 7, 3599.0, true).await.unwrap();
    let second = store.fetch_progress(user, track).await.unwrap().unwrap();
    assert_eq!(second.user_id, user);
    assert_eq!(second.track_id, track);
    assert_eq!(second.current_chapter, 7);
    assert_eq!(second.current_position_seconds, 3599.0);
    assert!(second.is_completed);
    assert!(second.last_played_at >= first.last_played_at);
}

#[tokio::test]
async fn test_rows_are_per_user_and_track() {
    let (store, _dir) = store().await;
    let track = Uuid::new_v4();
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    store.upsert_progress(alice, track, 1, 10.0, false).await.unwrap();
    store.upsert_progress(bob, track, 2, 20.0, false).await.unwrap();

    let a = store.fetch_progress(alice, track).await.unwrap().unwrap();
    let b = store.fetch_progress(bob, track).await.unwrap().unwrap();
    assert_eq!(a.current_position_seconds, 10.0);
    assert_eq!(b.current_position_seconds, 20.0);
    assert!(store.fetch_progress(alice, Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_progress_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("progress.db");
    let (user, track) = (Uuid::new_v4(), Uuid::new_v4());

    {
        let store = SqliteProgressStore::new(init_database(&path).await.unwrap());
        store.upsert_progress(user, track, 3, 123.0, false).await.unwrap();
    }

    let store = SqliteProgressStore::new(init_database(&path).await.unwrap());
    let record = store.fetch_progress(user, track).await.unwrap().unwrap();
    assert_eq!(record.current_chapter, 3);
}
