use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates all tables and indexes. Safe to run repeatedly.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // One row per file being (or having been) produced
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS status_tracking (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path_to_create TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL CHECK (status IN ('INPROGRESS', 'FAILED', 'SUCCEEDED')),
            job_definition TEXT,
            ingestion_date INTEGER,
            CHECK ((status = 'SUCCEEDED') = (ingestion_date IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per file present in storage
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS file_catalog (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL UNIQUE,
            instrument TEXT NOT NULL,
            data_level TEXT NOT NULL,
            descriptor TEXT NOT NULL,
            start_date INTEGER NOT NULL,
            end_date INTEGER NOT NULL,
            version TEXT NOT NULL,
            extension TEXT NOT NULL,
            status_tracking_id INTEGER,
            FOREIGN KEY (status_tracking_id) REFERENCES status_tracking(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pre_processing_dependency (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            primary_instrument TEXT NOT NULL,
            primary_data_level TEXT NOT NULL,
            primary_descriptor TEXT NOT NULL,
            dependent_instrument TEXT NOT NULL,
            dependent_data_level TEXT NOT NULL,
            dependent_descriptor TEXT NOT NULL,
            relationship TEXT NOT NULL CHECK (relationship IN ('HARD', 'SOFT')),
            direction TEXT NOT NULL CHECK (direction IN ('UPSTREAM', 'DOWNSTREAM'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_dependency_primary ON pre_processing_dependency(primary_instrument, primary_data_level, primary_descriptor)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catalog_instrument ON file_catalog(instrument, data_level)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_catalog_dates ON file_catalog(start_date, end_date)")
        .execute(pool)
        .await?;

    Ok(())
}
