//! Database initialization
//!
//! Opens (creating if needed) the SQLite file, enables WAL and a busy
//! timeout, and creates the `listening_progress` table. Idempotent.

use crate::error::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Open the progress database at `db_path`
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Checkpoint writes and API reads overlap; WAL keeps readers unblocked
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_listening_progress_table(&pool).await?;

    Ok(pool)
}

async fn create_listening_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS listening_progress (
            user_id TEXT NOT NULL,
            track_id TEXT NOT NULL,
            current_chapter INTEGER NOT NULL DEFAULT 1,
            current_position_seconds REAL NOT NULL DEFAULT 0,
            last_played_at TIMESTAMP NOT NULL,
            is_completed INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (user_id, track_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_listening_progress_user \
         ON listening_progress (user_id, last_played_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
