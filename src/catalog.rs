//! File catalog: the searchable record of files that have landed in storage.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use tracing::info;

use crate::config::IngestConfig;
use crate::db;
use crate::error::Result;
use crate::filename::{ParseError, ScienceFilename};
use crate::models::FileCatalog;

/// Storage-side context delivered with an arrival notification.
#[derive(Debug, Clone, Default)]
pub struct ArrivalMetadata {
    pub bucket: String,
    pub reason: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

/// Parses `file_path` and upserts its catalog row.
///
/// The row is linked to the tracking row for the same path when one exists;
/// the lookup and the write are one statement. A repeated arrival for the
/// same path overwrites every field. On a parse error nothing is written.
pub async fn record_arrival(
    conn: &mut SqliteConnection,
    file_path: &str,
    meta: &ArrivalMetadata,
    ingest: &IngestConfig,
) -> Result<FileCatalog> {
    let parsed = ScienceFilename::from_path(file_path)?;

    if parsed.mission != ingest.mission {
        return Err(ParseError::InvalidMission {
            expected: ingest.mission.clone(),
            found: parsed.mission,
        }
        .into());
    }
    if !ingest.accepted_levels().contains(&parsed.data_level) {
        return Err(ParseError::InvalidDataLevel(parsed.data_level.to_string()).into());
    }

    let row = sqlx::query(
        r#"
        INSERT INTO file_catalog (file_path, instrument, data_level, descriptor, start_date, end_date, version, extension, status_tracking_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?,
                (SELECT id FROM status_tracking WHERE file_path_to_create = ?))
        ON CONFLICT(file_path) DO UPDATE SET
            instrument = excluded.instrument,
            data_level = excluded.data_level,
            descriptor = excluded.descriptor,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            version = excluded.version,
            extension = excluded.extension,
            status_tracking_id = excluded.status_tracking_id
        RETURNING id, file_path, instrument, data_level, descriptor, start_date, end_date, version, extension, status_tracking_id
        "#,
    )
    .bind(file_path)
    .bind(&parsed.instrument)
    .bind(parsed.data_level.as_str())
    .bind(&parsed.descriptor)
    .bind(db::date_to_ts(parsed.start_date))
    .bind(db::date_to_ts(parsed.end_date))
    .bind(&parsed.version)
    .bind(&parsed.extension)
    .bind(file_path)
    .fetch_one(&mut *conn)
    .await?;

    let entry = row_to_catalog(&row)?;
    info!(
        path = %entry.file_path,
        bucket = %meta.bucket,
        reason = meta.reason.as_deref().unwrap_or("-"),
        arrived = ?meta.time,
        id = entry.id,
        "file cataloged"
    );
    Ok(entry)
}

pub(crate) fn row_to_catalog(row: &SqliteRow) -> std::result::Result<FileCatalog, sqlx::Error> {
    let start_date: i64 = row.try_get("start_date")?;
    let end_date: i64 = row.try_get("end_date")?;
    Ok(FileCatalog {
        id: row.try_get("id")?,
        file_path: row.try_get("file_path")?,
        instrument: row.try_get("instrument")?,
        data_level: row.try_get("data_level")?,
        descriptor: row.try_get("descriptor")?,
        start_date: db::ts_to_date(start_date),
        end_date: db::ts_to_date(end_date),
        version: row.try_get("version")?,
        extension: row.try_get("extension")?,
        status_tracking_id: row.try_get("status_tracking_id")?,
    })
}
