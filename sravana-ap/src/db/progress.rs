//! Progress store
//!
//! One row per `(user_id, track_id)`, written by full upserts. Rows are
//! never deleted here.

use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sravana_common::ProgressRecord;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Durable listening-position storage
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Insert or fully replace the record for `(user_id, track_id)`
    async fn upsert_progress(
        &self,
        user_id: Uuid,
        track_id: Uuid,
        chapter: u32,
        position_seconds: f64,
        completed: bool,
    ) -> Result<(), StorageError>;

    async fn fetch_progress(
        &self,
        user_id: Uuid,
        track_id: Uuid,
    ) -> Result<Option<ProgressRecord>, StorageError>;
}

/// SQLite-backed store (`listening_progress` table)
#[derive(Clone)]
pub struct SqliteProgressStore {
    pool: SqlitePool,
}

impl SqliteProgressStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|e| StorageError::Transient(format!("corrupt uuid '{}': {}", raw, e)))
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn upsert_progress(
        &self,
        user_id: Uuid,
        track_id: Uuid,
        chapter: u32,
        position_seconds: f64,
        completed: bool,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO listening_progress
                (user_id, track_id, current_chapter, current_position_seconds, last_played_at, is_completed)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, track_id) DO UPDATE SET
                current_chapter = excluded.current_chapter,
                current_position_seconds = excluded.current_position_seconds,
                last_played_at = excluded.last_played_at,
                is_completed = excluded.is_completed
            "#,
        )
        .bind(user_id.to_string())
        .bind(track_id.to_string())
        .bind(chapter as i64)
        .bind(position_seconds)
        .bind(Utc::now())
        .bind(completed)
        .execute(&self.pool)
        .await?;

        debug!(
            "Upserted progress user={} track={} chapter={} position={:.1}",
            user_id, track_id, chapter, position_seconds
        );
        Ok(())
    }

    async fn fetch_progress(
        &self,
        user_id: Uuid,
        track_id: Uuid,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let row: Option<(String, String, i64, f64, DateTime<Utc>, bool)> = sqlx::query_as(
            r#"
            SELECT user_id, track_id, current_chapter, current_position_seconds, last_played_at, is_completed
            FROM listening_progress
            WHERE user_id = ? AND track_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(track_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(user, track, chapter, position, last_played_at, completed)| {
            Ok(ProgressRecord {
                user_id: parse_uuid(&user)?,
                track_id: parse_uuid(&track)?,
                current_chapter: u32::try_from(chapter).unwrap_or(1),
                current_position_seconds: position,
                last_played_at,
                is_completed: completed,
            })
        })
        .transpose()
    }
}

/// In-process store for tests and storage-less deployments
#[derive(Default)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<(Uuid, Uuid), ProgressRecord>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn upsert_progress(
        &self,
        user_id: Uuid,
        track_id: Uuid,
        chapter: u32,
        position_seconds: f64,
        completed: bool,
    ) -> Result<(), StorageError> {
        let record = ProgressRecord {
            user_id,
            track_id,
            current_chapter: chapter,
            current_position_seconds: position_seconds,
            last_played_at: Utc::now(),
            is_completed: completed,
        };
        self.records
            .lock()
            .map_err(|_| StorageError::Transient("progress map poisoned".to_string()))?
            .insert((user_id, track_id), record);
        Ok(())
    }

    async fn fetch_progress(
        &self,
        user_id: Uuid,
        track_id: Uuid,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        Ok(self
            .records
            .lock()
            .map_err(|_| StorageError::Transient("progress map poisoned".to_string()))?
            .get(&(user_id, track_id))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_upsert_replaces() {
        let store = MemoryProgressStore::new();
        let (user, track) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.fetch_progress(user, track).await.unwrap().is_none());

        store.upsert_progress(user, track, 1, 10.0, false).await.unwrap();
        store.upsert_progress(user, track, 3, 950.0, true).await.unwrap();

        let record = store.fetch_progress(user, track).await.unwrap().unwrap();
        assert_eq!(record.current_chapter, 3);
        assert_eq!(record.current_position_seconds, 950.0);
        assert!(record.is_completed);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_keys_by_user_and_track() {
        let store = MemoryProgressStore::new();
        let track = Uuid::new_v4();
        store.upsert_progress(Uuid::new_v4(), track, 1, 1.0, false).await.unwrap();
        store.upsert_progress(Uuid::new_v4(), track, 2, 2.0, false).await.unwrap();
        assert_eq!(store.len(), 2);
    }
}
