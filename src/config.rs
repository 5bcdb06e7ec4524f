use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::filename::DataLevel;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_mission")]
    pub mission: String,
    /// Data levels accepted from storage-arrival notifications. Higher levels
    /// are cataloged through job completions instead.
    #[serde(default = "default_arrival_levels")]
    pub arrival_levels: Vec<String>,
    /// Optional dependency table loaded by `sds init`.
    #[serde(default)]
    pub dependencies: Option<PathBuf>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            mission: default_mission(),
            arrival_levels: default_arrival_levels(),
            dependencies: None,
        }
    }
}

fn default_mission() -> String {
    "imap".to_string()
}
fn default_arrival_levels() -> Vec<String> {
    vec!["l0".to_string()]
}

impl IngestConfig {
    /// Parsed form of `arrival_levels`. Unknown names were rejected by
    /// [`load_config`], so they are skipped here.
    pub fn accepted_levels(&self) -> Vec<DataLevel> {
        self.arrival_levels
            .iter()
            .filter_map(|l| DataLevel::from_str(l).ok())
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EventsConfig {
    #[serde(default = "default_publisher")]
    pub publisher: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            publisher: default_publisher(),
            endpoint: None,
            source: default_source(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_publisher() -> String {
    "log".to_string()
}
fn default_source() -> String {
    "imap.lambda".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.ingest.mission.trim().is_empty() {
        anyhow::bail!("ingest.mission must not be empty");
    }

    for level in &config.ingest.arrival_levels {
        if DataLevel::from_str(level).is_err() {
            anyhow::bail!("ingest.arrival_levels: unknown data level '{}'", level);
        }
    }

    match config.events.publisher.as_str() {
        "log" => {}
        "http" => {
            if config.events.endpoint.is_none() {
                anyhow::bail!("events.endpoint must be set when publisher is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown event publisher: '{}'. Must be log or http.",
            other
        ),
    }

    if config.events.timeout_secs == 0 {
        anyhow::bail!("events.timeout_secs must be > 0");
    }

    Ok(())
}
