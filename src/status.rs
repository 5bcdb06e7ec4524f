//! Status tracking for files being produced.
//!
//! Each target path has at most one `status_tracking` row. Writes are a
//! single `INSERT ... ON CONFLICT DO UPDATE` keyed by the path, so two
//! concurrent notifications for the same path serialize on the unique
//! constraint and the last committed write wins. `ingestion_date` is written
//! in the same statement as `status`, never separately.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use tracing::debug;

use crate::db;
use crate::error::{IngestError, Result};
use crate::models::{Status, StatusTracking};

/// Requested state for a tracked path.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub file_path_to_create: String,
    pub status: Status,
    pub job_definition: Option<String>,
    /// Overrides the ingestion time recorded for a SUCCEEDED update.
    /// Ignored for other statuses.
    pub ingestion_date: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn new(file_path_to_create: impl Into<String>, status: Status) -> Self {
        Self {
            file_path_to_create: file_path_to_create.into(),
            status,
            job_definition: None,
            ingestion_date: None,
        }
    }

    pub fn with_job_definition(mut self, job_definition: Option<String>) -> Self {
        self.job_definition = job_definition;
        self
    }
}

/// Inserts or overwrites the tracking row for `update.file_path_to_create`.
pub async fn update_status_table(
    conn: &mut SqliteConnection,
    update: &StatusUpdate,
) -> Result<StatusTracking> {
    if update.file_path_to_create.trim().is_empty() {
        return Err(IngestError::validation("file_path_to_create must not be empty"));
    }

    let ingestion_date = match update.status {
        Status::Succeeded => Some(update.ingestion_date.unwrap_or_else(Utc::now).timestamp()),
        Status::InProgress | Status::Failed => None,
    };

    let row = sqlx::query(
        r#"
        INSERT INTO status_tracking (file_path_to_create, status, job_definition, ingestion_date)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(file_path_to_create) DO UPDATE SET
            status = excluded.status,
            job_definition = excluded.job_definition,
            ingestion_date = excluded.ingestion_date
        RETURNING id, file_path_to_create, status, job_definition, ingestion_date
        "#,
    )
    .bind(&update.file_path_to_create)
    .bind(update.status.as_str())
    .bind(&update.job_definition)
    .bind(ingestion_date)
    .fetch_one(&mut *conn)
    .await?;

    let tracking = row_to_status(&row)?;
    debug!(
        path = %tracking.file_path_to_create,
        status = %tracking.status,
        id = tracking.id,
        "status row upserted"
    );
    Ok(tracking)
}

/// Current tracking row for a path, if any.
pub async fn get_status(conn: &mut SqliteConnection, path: &str) -> Result<Option<StatusTracking>> {
    let row = sqlx::query(
        r#"
        SELECT id, file_path_to_create, status, job_definition, ingestion_date
        FROM status_tracking
        WHERE file_path_to_create = ?
        "#,
    )
    .bind(path)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => Ok(Some(row_to_status(&row)?)),
        None => Ok(None),
    }
}

fn row_to_status(row: &SqliteRow) -> std::result::Result<StatusTracking, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let ingestion_date: Option<i64> = row.try_get("ingestion_date")?;
    Ok(StatusTracking {
        id: row.try_get("id")?,
        file_path_to_create: row.try_get("file_path_to_create")?,
        status: Status::from_str(&status).map_err(|e| sqlx::Error::Decode(e.into()))?,
        job_definition: row.try_get("job_definition")?,
        ingestion_date: ingestion_date.and_then(db::ts_to_datetime),
    })
}
