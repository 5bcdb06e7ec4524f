//! Catalog query service.
//!
//! Translates a flat map of filter parameters into a catalog search. Used by
//! the `sds query` CLI command and the `GET /query` HTTP endpoint.
//!
//! `start_date` and `end_date` select records whose date range overlaps the
//! bound; every other field is an exact match. Filters combine with AND and
//! results come back in catalog insertion order.

use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, error};

use crate::catalog::row_to_catalog;
use crate::db;
use crate::error::{IngestError, Result};
use crate::filename::parse_date;
use crate::models::FileCatalog;

/// Recognized filter fields, in the order reported to callers.
pub const QUERY_FIELDS: [&str; 8] = [
    "file_path",
    "instrument",
    "data_level",
    "descriptor",
    "start_date",
    "end_date",
    "version",
    "extension",
];

/// Serialized catalog row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRecord {
    pub id: i64,
    pub file_path: String,
    pub instrument: String,
    pub data_level: String,
    pub descriptor: String,
    pub start_date: String, // %Y-%m-%dT%H:%M:%S
    pub end_date: String,
    pub version: String,
    pub extension: String,
    pub status_tracking_id: Option<i64>,
}

impl From<FileCatalog> for CatalogRecord {
    fn from(row: FileCatalog) -> Self {
        Self {
            id: row.id,
            file_path: row.file_path,
            instrument: row.instrument,
            data_level: row.data_level,
            descriptor: row.descriptor,
            start_date: format_date(row.start_date),
            end_date: format_date(row.end_date),
            version: row.version,
            extension: row.extension,
            status_tracking_id: row.status_tracking_id,
        }
    }
}

/// Status code plus JSON body: an array of records on success, a JSON
/// string on error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub status_code: u16,
    pub body: String,
}

impl QueryResponse {
    fn error(status_code: u16, message: &str) -> Self {
        Self {
            status_code,
            body: serde_json::Value::String(message.to_string()).to_string(),
        }
    }
}

/// Runs a query and folds every outcome into a [`QueryResponse`].
pub async fn query(pool: &SqlitePool, filters: &BTreeMap<String, String>) -> QueryResponse {
    match search_catalog(pool, filters).await {
        Ok(rows) => {
            let records: Vec<CatalogRecord> = rows.into_iter().map(CatalogRecord::from).collect();
            match serde_json::to_string(&records) {
                Ok(body) => QueryResponse {
                    status_code: 200,
                    body,
                },
                Err(e) => QueryResponse::error(500, &e.to_string()),
            }
        }
        Err(err) => {
            if err.status_code() >= 500 {
                error!(error = %err, "catalog query failed");
            }
            QueryResponse::error(err.status_code(), &err.to_string())
        }
    }
}

/// Validates `filters` and returns the matching catalog rows.
pub async fn search_catalog(
    pool: &SqlitePool,
    filters: &BTreeMap<String, String>,
) -> Result<Vec<FileCatalog>> {
    if let Some(unknown) = filters.keys().find(|k| !QUERY_FIELDS.contains(&k.as_str())) {
        return Err(IngestError::validation(format!(
            "{} is not a valid query parameter. Valid query parameters are: {}",
            unknown,
            field_list()
        )));
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, file_path, instrument, data_level, descriptor, start_date, end_date, version, extension, status_tracking_id FROM file_catalog WHERE 1 = 1",
    );

    for field in QUERY_FIELDS {
        let Some(value) = filters.get(field) else {
            continue;
        };
        match field {
            "start_date" => {
                let date = parse_date(value).map_err(|e| IngestError::validation(e.to_string()))?;
                qb.push(" AND end_date >= ").push_bind(db::date_to_ts(date));
            }
            "end_date" => {
                let date = parse_date(value).map_err(|e| IngestError::validation(e.to_string()))?;
                qb.push(" AND start_date <= ").push_bind(db::date_to_ts(date));
            }
            column => {
                qb.push(" AND ")
                    .push(column)
                    .push(" = ")
                    .push_bind(value.clone());
            }
        }
    }
    qb.push(" ORDER BY id ASC");

    let rows = qb.build().fetch_all(pool).await?;
    debug!(filters = filters.len(), matches = rows.len(), "catalog query");

    rows.iter()
        .map(|row| row_to_catalog(row).map_err(IngestError::from))
        .collect()
}

/// `['file_path', 'instrument', ...]`
fn field_list() -> String {
    let quoted: Vec<String> = QUERY_FIELDS.iter().map(|f| format!("'{}'", f)).collect();
    format!("[{}]", quoted.join(", "))
}

fn format_date(date: chrono::NaiveDate) -> String {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
        .unwrap_or_else(|| date.to_string())
}
