//! Notification router.
//!
//! [`Indexer::handle_event`] is the single entry point for inbound
//! notifications. It classifies the envelope, runs the matching handler
//! inside one database transaction, publishes any outbound event before the
//! commit, and always returns an [`IndexerResponse`]:
//!
//! | Notification | Effect |
//! |--------------|--------|
//! | `Job Started` (internal) | tracking row set to INPROGRESS |
//! | `Batch Job State Change` | tracking row set to FAILED/SUCCEEDED; SUCCEEDED publishes one `Processed File` event |
//! | `Object Created` | filename parsed and cataloged |
//! | anything else | 400 `Unknown event source` |
//!
//! Caller-correctable problems become 400 responses. Database and publish
//! faults become 500 responses; the transaction is rolled back when the
//! handler or the publish fails, so no partial writes are left behind.

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::catalog::{self, ArrivalMetadata};
use crate::config::{Config, IngestConfig};
use crate::db;
use crate::dependency::DependencyGraph;
use crate::error::{IngestError, Result};
use crate::events::{JobStarted, JobStateChange, Notification, ObjectCreated};
use crate::filename::{ParseError, ScienceFilename};
use crate::models::{Direction, Status};
use crate::publisher::{self, DownstreamProduct, EventPublisher, OutboundEvent};
use crate::status::{self, StatusUpdate};

/// Body returned when an arrival carries an unknown or non-ingestible level.
pub const INVALID_DATA_LEVEL: &str = "Invalid data level";

/// Uniform result of handling one notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl IndexerResponse {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: None,
        }
    }

    pub fn error(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            body: Some(body.into()),
        }
    }
}

impl From<IngestError> for IndexerResponse {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Parse(ParseError::InvalidDataLevel(_)) => {
                IndexerResponse::error(400, INVALID_DATA_LEVEL)
            }
            other => IndexerResponse::error(other.status_code(), other.to_string()),
        }
    }
}

/// Handles inbound notifications against the catalog database.
#[derive(Clone)]
pub struct Indexer {
    pool: SqlitePool,
    graph: Arc<DependencyGraph>,
    publisher: Arc<dyn EventPublisher>,
    ingest: IngestConfig,
    source: String,
}

impl Indexer {
    pub fn new(
        pool: SqlitePool,
        graph: Arc<DependencyGraph>,
        publisher: Arc<dyn EventPublisher>,
        config: &Config,
    ) -> Self {
        Self {
            pool,
            graph,
            publisher,
            ingest: config.ingest.clone(),
            source: config.events.source.clone(),
        }
    }

    /// Connects to the database, loads the dependency graph, and builds the
    /// configured publisher.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let graph = DependencyGraph::load(&pool)
            .await
            .context("Failed to load dependency table")?;
        let publisher = publisher::create_publisher(&config.events)?;
        info!(
            edges = graph.len(),
            publisher = publisher.name(),
            "indexer ready"
        );
        Ok(Self::new(pool, Arc::new(graph), publisher, config))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Processes one notification. Never fails; errors are folded into the
    /// response.
    pub async fn handle_event(&self, event: &Value) -> IndexerResponse {
        match self.process(event).await {
            Ok(()) => IndexerResponse::ok(),
            Err(err) => {
                if err.status_code() >= 500 {
                    error!(error = %err, "notification failed");
                } else {
                    warn!(error = %err, "notification rejected");
                }
                IndexerResponse::from(err)
            }
        }
    }

    async fn process(&self, event: &Value) -> Result<()> {
        let notification = Notification::classify(event, &self.source)?;
        debug!(kind = notification.kind(), "notification classified");

        let mut tx = self.pool.begin().await?;
        let outbound = match &notification {
            Notification::JobStarted(job) => {
                self.on_job_started(&mut *tx, job).await?;
                None
            }
            Notification::JobStateChange(change) => self.on_job_state_change(&mut *tx, change).await?,
            Notification::ObjectCreated(object) => {
                self.on_object_created(&mut *tx, object).await?;
                None
            }
        };

        // Published while the transaction is open: a failed publish drops
        // `tx` and rolls the status change back.
        if let Some(event) = &outbound {
            self.publisher.publish(event).await?;
            info!(
                path = %event.detail.file_path,
                downstream = event.detail.downstream.len(),
                "processed-file event published"
            );
        }

        tx.commit().await?;
        Ok(())
    }

    async fn on_job_started(&self, conn: &mut SqliteConnection, job: &JobStarted) -> Result<()> {
        let update = StatusUpdate::new(&job.file_path_to_create, Status::InProgress)
            .with_job_definition(job.job_definition.clone());
        let row = status::update_status_table(conn, &update).await?;

        // Inputs are recorded in the log only; fan-out on job start is not wired.
        for (instrument, input) in &job.dependency {
            debug!(path = %row.file_path_to_create, instrument = %instrument, input = %input, "job input");
        }
        info!(path = %row.file_path_to_create, id = row.id, "job started");
        Ok(())
    }

    async fn on_job_state_change(
        &self,
        conn: &mut SqliteConnection,
        change: &JobStateChange,
    ) -> Result<Option<OutboundEvent>> {
        let update = StatusUpdate::new(&change.file_path_to_create, change.status)
            .with_job_definition(change.job_definition.clone());
        let row = status::update_status_table(conn, &update).await?;

        info!(
            path = %row.file_path_to_create,
            status = %row.status,
            job = change.job_name.as_deref().unwrap_or("-"),
            reason = change.status_reason.as_deref().unwrap_or("-"),
            "job finished"
        );

        if row.status != Status::Succeeded {
            return Ok(None);
        }

        Ok(Some(OutboundEvent::processed_file(
            &self.source,
            &row.file_path_to_create,
            self.downstream_of(&row.file_path_to_create),
        )))
    }

    async fn on_object_created(&self, conn: &mut SqliteConnection, object: &ObjectCreated) -> Result<()> {
        let meta = ArrivalMetadata {
            bucket: object.bucket.clone(),
            reason: object.reason.clone(),
            time: object.time,
        };
        catalog::record_arrival(conn, &object.key, &meta, &self.ingest).await?;
        Ok(())
    }

    /// Products consuming `path`, or none when the path is not a science file.
    fn downstream_of(&self, path: &str) -> Vec<DownstreamProduct> {
        match ScienceFilename::from_path(path) {
            Ok(f) => self
                .graph
                .dependents(
                    &f.instrument,
                    f.data_level.as_str(),
                    &f.descriptor,
                    Direction::Downstream,
                )
                .into_iter()
                .map(DownstreamProduct::from)
                .collect(),
            Err(e) => {
                debug!(path, error = %e, "produced path is not a science filename");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_maps_to_fixed_body() {
        let resp = IndexerResponse::from(IngestError::from(ParseError::InvalidDataLevel("l1a".into())));
        assert_eq!(resp, IndexerResponse::error(400, "Invalid data level"));
    }

    #[test]
    fn unknown_source_maps_to_400() {
        let resp = IndexerResponse::from(IngestError::UnknownSource);
        assert_eq!(resp.status_code, 400);
        assert_eq!(resp.body.as_deref(), Some("Unknown event source"));
    }

    #[test]
    fn persistence_maps_to_500() {
        let resp = IndexerResponse::from(IngestError::Persistence(sqlx::Error::PoolTimedOut));
        assert_eq!(resp.status_code, 500);
    }

    #[test]
    fn ok_response_omits_body() {
        let value = serde_json::to_value(IndexerResponse::ok()).unwrap();
        assert_eq!(value, serde_json::json!({"statusCode": 200}));
    }
}
