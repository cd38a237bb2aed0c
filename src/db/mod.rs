//! Database module for SQLite persistence.
//!
//! SQLite holds bindings, field schemas and post metadata. Forum content itself
//! lives on the host platform.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    // A company may keep many disabled rows but only one enabled one.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS forum_bindings (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL,
            forum_id TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (company_id, forum_id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_forum_bindings_active
            ON forum_bindings(company_id) WHERE enabled = 1;
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS company_post_field_schemas (
            company_id TEXT PRIMARY KEY,
            schema_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS post_metadata (
            id TEXT PRIMARY KEY,
            post_id TEXT NOT NULL,
            company_id TEXT NOT NULL,
            created_by_user_id TEXT NOT NULL,
            data_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_forum_bindings_forum_id ON forum_bindings(forum_id);
        CREATE INDEX IF NOT EXISTS idx_post_metadata_post_id ON post_metadata(post_id);
        CREATE INDEX IF NOT EXISTS idx_post_metadata_company_id ON post_metadata(company_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
