use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the record store schema. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // One row per (bulletin date, category, item, page); `id` is derived from
    // those so re-ingesting a bulletin overwrites its rows.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS price_records (
            id TEXT PRIMARY KEY,
            category TEXT,
            date TEXT,
            item TEXT NOT NULL,
            average TEXT NOT NULL,
            range_min INTEGER NOT NULL,
            range_max INTEGER NOT NULL,
            page INTEGER NOT NULL,
            ingested_on TEXT NOT NULL,
            source_link TEXT NOT NULL,
            body_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_price_records_date ON price_records(date DESC)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_price_records_category ON price_records(category)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
