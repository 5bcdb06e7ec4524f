//! Outbound event publishing.
//!
//! When a job finishes successfully the indexer announces the produced file
//! on the event transport. Publishers implement [`EventPublisher`]; the
//! configured one is chosen by [`create_publisher`].
//!
//! | Publisher | Behavior |
//! |-----------|----------|
//! | `log` | Emits the event as a structured log line |
//! | `http` | POSTs the event as JSON to `[events].endpoint` |
//! | memory | Collects events in-process (tests, embedding) |

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use crate::config::EventsConfig;
use crate::error::{IngestError, Result};
use crate::models::PreProcessingDependency;

pub const DETAIL_PROCESSED_FILE: &str = "Processed File";

/// Event announcing a newly produced file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    pub id: String,
    pub source: String,
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub detail: ProcessedFileDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedFileDetail {
    pub file_path: String,
    /// Products that consume this file.
    pub downstream: Vec<DownstreamProduct>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownstreamProduct {
    pub instrument: String,
    pub data_level: String,
    pub descriptor: String,
    pub relationship: String,
}

impl From<&PreProcessingDependency> for DownstreamProduct {
    fn from(edge: &PreProcessingDependency) -> Self {
        Self {
            instrument: edge.dependent_instrument.clone(),
            data_level: edge.dependent_data_level.clone(),
            descriptor: edge.dependent_descriptor.clone(),
            relationship: edge.relationship.as_str().to_string(),
        }
    }
}

impl OutboundEvent {
    pub fn processed_file(
        source: &str,
        file_path: &str,
        downstream: Vec<DownstreamProduct>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            detail_type: DETAIL_PROCESSED_FILE.to_string(),
            detail: ProcessedFileDetail {
                file_path: file_path.to_string(),
                downstream,
            },
        }
    }
}

/// Delivers outbound events to the event transport.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, event: &OutboundEvent) -> Result<()>;
}

/// Writes events to the log instead of a transport.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        let body = serde_json::to_string(event).map_err(|e| IngestError::Publish(e.to_string()))?;
        info!(event = %body, "outbound event");
        Ok(())
    }
}

/// POSTs events as JSON to an HTTP endpoint.
pub struct HttpPublisher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPublisher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Publish(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EventPublisher for HttpPublisher {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(event)
            .send()
            .await
            .map_err(|e| IngestError::Publish(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(IngestError::Publish(format!(
                "{} returned {}",
                self.endpoint,
                resp.status()
            )));
        }
        Ok(())
    }
}

/// Keeps published events in memory.
#[derive(Default, Clone)]
pub struct MemoryPublisher {
    events: Arc<Mutex<Vec<OutboundEvent>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, event: &OutboundEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|e| IngestError::Publish(e.to_string()))?
            .push(event.clone());
        Ok(())
    }
}

/// Builds the publisher named in `[events].publisher`.
pub fn create_publisher(config: &EventsConfig) -> anyhow::Result<Arc<dyn EventPublisher>> {
    match config.publisher.as_str() {
        "log" => Ok(Arc::new(LogPublisher)),
        "http" => {
            let endpoint = config
                .endpoint
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("events.endpoint must be set for http publisher"))?;
            Ok(Arc::new(HttpPublisher::new(
                endpoint,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        other => anyhow::bail!("Unknown event publisher: '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_event_shape() {
        let event = OutboundEvent::processed_file(
            "imap.lambda",
            "imap/hit/l2/2024/01/x.cdf",
            vec![DownstreamProduct {
                instrument: "glows".into(),
                data_level: "l3".into(),
                descriptor: "sci".into(),
                relationship: "HARD".into(),
            }],
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["source"], "imap.lambda");
        assert_eq!(value["detail-type"], "Processed File");
        assert_eq!(value["detail"]["file_path"], "imap/hit/l2/2024/01/x.cdf");
        assert_eq!(value["detail"]["downstream"][0]["instrument"], "glows");
        assert!(!event.id.is_empty());
    }

    #[tokio::test]
    async fn memory_publisher_collects() {
        let publisher = MemoryPublisher::new();
        let event = OutboundEvent::processed_file("imap.lambda", "a.cdf", vec![]);
        publisher.publish(&event).await.unwrap();
        publisher.publish(&event).await.unwrap();
        assert_eq!(publisher.events().len(), 2);
    }

    #[test]
    fn create_publisher_by_name() {
        let config = EventsConfig::default();
        assert_eq!(create_publisher(&config).unwrap().name(), "log");

        let config = EventsConfig {
            publisher: "http".into(),
            endpoint: Some("http://127.0.0.1:9/events".into()),
            ..EventsConfig::default()
        };
        assert_eq!(create_publisher(&config).unwrap().name(), "http");

        let config = EventsConfig {
            publisher: "sns".into(),
            ..EventsConfig::default()
        };
        assert!(create_publisher(&config).is_err());
    }
}
