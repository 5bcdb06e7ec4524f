//! Core data models stored in the catalog database.
//!
//! These types represent the tracking rows, catalog rows, and dependency
//! edges that flow through the ingest path and the query service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a file being produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    InProgress,
    Failed,
    Succeeded,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::InProgress => "INPROGRESS",
            Status::Failed => "FAILED",
            Status::Succeeded => "SUCCEEDED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INPROGRESS" => Ok(Status::InProgress),
            "FAILED" => Ok(Status::Failed),
            "SUCCEEDED" => Ok(Status::Succeeded),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Strength of a dependency edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relationship {
    Hard,
    Soft,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::Hard => "HARD",
            Relationship::Soft => "SOFT",
        }
    }
}

impl FromStr for Relationship {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HARD" => Ok(Relationship::Hard),
            "SOFT" => Ok(Relationship::Soft),
            _ => Err(format!("unknown relationship: {} (expected HARD or SOFT)", s)),
        }
    }
}

/// Direction of a dependency edge relative to its primary triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Upstream,
    Downstream,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Upstream => "UPSTREAM",
            Direction::Downstream => "DOWNSTREAM",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "UPSTREAM" => Ok(Direction::Upstream),
            "DOWNSTREAM" => Ok(Direction::Downstream),
            _ => Err(format!(
                "unknown direction: {} (expected UPSTREAM or DOWNSTREAM)",
                s
            )),
        }
    }
}

/// One directed edge in the processing dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreProcessingDependency {
    pub primary_instrument: String,
    pub primary_data_level: String,
    pub primary_descriptor: String,
    pub dependent_instrument: String,
    pub dependent_data_level: String,
    pub dependent_descriptor: String,
    pub relationship: Relationship,
    pub direction: Direction,
}

/// Tracking row for a file that is or was being produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTracking {
    pub id: i64,
    pub file_path_to_create: String,
    pub status: Status,
    pub job_definition: Option<String>,
    /// Set only when `status` is [`Status::Succeeded`].
    pub ingestion_date: Option<DateTime<Utc>>,
}

/// A file known to exist in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCatalog {
    pub id: i64,
    pub file_path: String,
    pub instrument: String,
    pub data_level: String,
    pub descriptor: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub version: String,
    pub extension: String,
    pub status_tracking_id: Option<i64>,
}
