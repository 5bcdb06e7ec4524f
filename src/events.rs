//! Inbound notification shapes.
//!
//! Notifications arrive as JSON envelopes discriminated by `source` and
//! `detail-type`. [`Notification::classify`] turns an envelope into one of a
//! closed set of variants, each carrying a validated payload, so the router
//! never inspects raw fields.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::{IngestError, Result};
use crate::models::Status;

/// Source used by the compute platform for job lifecycle events.
pub const SOURCE_BATCH: &str = "aws.batch";
/// Source used by the object store for arrival events.
pub const SOURCE_STORAGE: &str = "aws.s3";

pub const DETAIL_JOB_STARTED: &str = "Job Started";
pub const DETAIL_BATCH_STATE_CHANGE: &str = "Batch Job State Change";
pub const DETAIL_OBJECT_CREATED: &str = "Object Created";

/// A classified inbound notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    JobStarted(JobStarted),
    JobStateChange(JobStateChange),
    ObjectCreated(ObjectCreated),
}

/// A processing job has been scheduled to create `file_path_to_create`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStarted {
    pub file_path_to_create: String,
    pub job_definition: Option<String>,
    /// Input files keyed by instrument.
    pub dependency: BTreeMap<String, String>,
}

/// A processing job reached a terminal state.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStateChange {
    pub job_name: Option<String>,
    pub job_definition: Option<String>,
    /// Always [`Status::Failed`] or [`Status::Succeeded`].
    pub status: Status,
    pub status_reason: Option<String>,
    pub file_path_to_create: String,
}

/// An object landed in storage.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCreated {
    pub bucket: String,
    pub key: String,
    pub reason: Option<String>,
    pub time: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct JobStartedDetail {
    file_path_to_create: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    job_definition: Option<String>,
    #[serde(default)]
    dependency: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchDetail {
    #[serde(default)]
    job_name: Option<String>,
    #[serde(default)]
    job_definition: Option<String>,
    status: String,
    #[serde(default)]
    status_reason: Option<String>,
    container: BatchContainer,
}

#[derive(Deserialize)]
struct BatchContainer {
    #[serde(default)]
    #[allow(dead_code)]
    image: Option<String>,
    #[serde(default)]
    command: Vec<String>,
}

#[derive(Deserialize)]
struct StorageDetail {
    bucket: StorageBucket,
    object: StorageObject,
}

#[derive(Deserialize)]
struct StorageBucket {
    name: String,
}

#[derive(Deserialize)]
struct StorageObject {
    key: String,
    #[serde(default)]
    reason: Option<String>,
}

impl Notification {
    /// Classifies an inbound envelope. `internal_source` is the source name
    /// this deployment uses for its own events.
    pub fn classify(event: &Value, internal_source: &str) -> Result<Self> {
        let source = event.get("source").and_then(Value::as_str).unwrap_or_default();
        let detail_type = event
            .get("detail-type")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let known_source =
            source == internal_source || source == SOURCE_BATCH || source == SOURCE_STORAGE;
        if !known_source {
            return Err(IngestError::UnknownSource);
        }

        match (source, detail_type) {
            (s, DETAIL_JOB_STARTED) if s == internal_source => {
                let detail: JobStartedDetail = detail(event)?;
                if let Some(status) = detail.status.as_deref() {
                    if status != Status::InProgress.as_str() {
                        return Err(IngestError::validation(format!(
                            "Job Started status must be INPROGRESS, got {}",
                            status
                        )));
                    }
                }
                Ok(Notification::JobStarted(JobStarted {
                    file_path_to_create: non_empty(detail.file_path_to_create, "file_path_to_create")?,
                    job_definition: detail.job_definition,
                    dependency: detail.dependency,
                }))
            }
            (SOURCE_BATCH, DETAIL_BATCH_STATE_CHANGE) => {
                let detail: BatchDetail = detail(event)?;
                let status = match Status::from_str(&detail.status) {
                    Ok(s @ (Status::Failed | Status::Succeeded)) => s,
                    _ => {
                        return Err(IngestError::validation(format!(
                            "Unsupported batch job status: {}",
                            detail.status
                        )))
                    }
                };
                let file_path_to_create = extract_file_path(&detail.container.command)
                    .ok_or_else(|| {
                        IngestError::validation("Batch job command is missing --file_path")
                    })?;
                Ok(Notification::JobStateChange(JobStateChange {
                    job_name: detail.job_name,
                    job_definition: detail.job_definition,
                    status,
                    status_reason: detail.status_reason,
                    file_path_to_create,
                }))
            }
            (SOURCE_STORAGE, DETAIL_OBJECT_CREATED) => {
                let detail: StorageDetail = detail(event)?;
                let time = event
                    .get("time")
                    .and_then(Value::as_str)
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc));
                Ok(Notification::ObjectCreated(ObjectCreated {
                    bucket: detail.bucket.name,
                    key: non_empty(detail.object.key, "object.key")?,
                    reason: detail.object.reason,
                    time,
                }))
            }
            _ => Err(IngestError::validation(format!(
                "Unsupported detail-type '{}' for source '{}'",
                detail_type, source
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::JobStarted(_) => "job_started",
            Notification::JobStateChange(_) => "job_state_change",
            Notification::ObjectCreated(_) => "object_created",
        }
    }
}

fn detail<T: DeserializeOwned>(event: &Value) -> Result<T> {
    let detail = event
        .get("detail")
        .ok_or_else(|| IngestError::validation("Missing detail"))?;
    serde_json::from_value(detail.clone())
        .map_err(|e| IngestError::validation(format!("Invalid detail: {}", e)))
}

fn non_empty(value: String, field: &str) -> Result<String> {
    if value.trim().is_empty() {
        Err(IngestError::validation(format!("{} must not be empty", field)))
    } else {
        Ok(value)
    }
}

/// Finds the value following `--file_path` in a job's command line.
///
/// The value may be quoted with `'` or `"` (and may then run straight into
/// the next flag), or bare and terminated by whitespace. The flag and value
/// may be separate command elements or share one. Longer flags that merely
/// start with `--file_path` are skipped.
pub fn extract_file_path(command: &[String]) -> Option<String> {
    const FLAG: &str = "--file_path";

    let line = command.join(" ");
    let start = line
        .match_indices(FLAG)
        .map(|(i, _)| i + FLAG.len())
        .find(|&end| {
            line[end..]
                .chars()
                .next()
                .map_or(true, |c| c.is_whitespace() || matches!(c, '=' | '\'' | '"'))
        })?;
    let rest = line[start..].trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim_start();

    let mut chars = rest.chars();
    let value = match chars.next()? {
        q @ ('\'' | '"') => {
            let body = &rest[1..];
            let end = body.find(q)?;
            &body[..end]
        }
        _ => rest.split_whitespace().next()?,
    };

    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
