//! # SDS CLI (`sds`)
//!
//! The `sds` binary is the operator interface for the indexer. It creates the
//! database, loads the dependency table, replays notifications, queries the
//! catalog, and runs the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! sds --config ./config/sds.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sds init` | Create the SQLite database and run schema migrations |
//! | `sds deps load <file>` | Replace the dependency table from a TOML file |
//! | `sds deps show <instrument> <level> <descriptor>` | Print matching dependency edges |
//! | `sds handle <event.json>` | Process one notification (`-` reads stdin) |
//! | `sds query --filter k=v` | Search the file catalog |
//! | `sds status <path>` | Show the tracking row for a path |
//! | `sds serve` | Start the HTTP server |

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use sds_indexer::config::{self, Config};
use sds_indexer::dependency::{self, DependencyGraph};
use sds_indexer::indexer::Indexer;
use sds_indexer::models::{Direction, Relationship};
use sds_indexer::{db, logging, migrate, query, server, status};

/// SDS indexer: event-driven ingestion, status tracking, and cataloging
/// for science data pipelines.
#[derive(Parser)]
#[command(name = "sds", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/sds.toml")]
    config: PathBuf,

    /// Enable debug logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database and the status_tracking, file_catalog,
    /// and pre_processing_dependency tables. Loads `[ingest].dependencies`
    /// when set. Idempotent.
    Init,

    /// Manage the processing dependency table.
    Deps {
        #[command(subcommand)]
        action: DepsAction,
    },

    /// Process one notification read from a JSON file (`-` for stdin).
    ///
    /// Prints the `{statusCode, body}` result. Exits non-zero unless the
    /// status code is 200.
    Handle {
        /// Notification JSON file.
        event: String,
    },

    /// Search the file catalog.
    Query {
        /// Filter as `field=value`; repeatable. Fields: file_path, instrument,
        /// data_level, descriptor, start_date, end_date, version, extension.
        #[arg(long = "filter", short = 'f')]
        filters: Vec<String>,
    },

    /// Show the tracking row for a target file path.
    Status {
        path: String,
    },

    /// Start the HTTP server.
    Serve,
}

#[derive(Subcommand)]
enum DepsAction {
    /// Replace the stored dependency table with the contents of a TOML file.
    Load {
        file: PathBuf,
    },

    /// Print the edges matching a primary triple.
    Show {
        instrument: String,
        data_level: String,
        descriptor: String,

        /// UPSTREAM or DOWNSTREAM.
        #[arg(long, default_value = "DOWNSTREAM")]
        direction: String,

        /// HARD or SOFT.
        #[arg(long, default_value = "HARD")]
        relationship: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => run_init(&cfg).await?,
        Commands::Deps { action } => match action {
            DepsAction::Load { file } => run_deps_load(&cfg, &file).await?,
            DepsAction::Show {
                instrument,
                data_level,
                descriptor,
                direction,
                relationship,
            } => {
                run_deps_show(
                    &cfg,
                    &instrument,
                    &data_level,
                    &descriptor,
                    &direction,
                    &relationship,
                )
                .await?
            }
        },
        Commands::Handle { event } => run_handle(&cfg, &event).await?,
        Commands::Query { filters } => run_query(&cfg, &filters).await?,
        Commands::Status { path } => run_status(&cfg, &path).await?,
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}

async fn run_init(cfg: &Config) -> Result<()> {
    migrate::run_migrations(cfg).await?;
    println!("database initialized at {}", cfg.db.path.display());

    if let Some(ref path) = cfg.ingest.dependencies {
        run_deps_load(cfg, path).await?;
    }
    Ok(())
}

async fn run_deps_load(cfg: &Config, file: &std::path::Path) -> Result<()> {
    let edges = dependency::load_table(file)?;
    let pool = db::connect(cfg).await?;
    dependency::store_table(&pool, &edges).await?;
    pool.close().await;
    println!("loaded {} dependency edges", edges.len());
    Ok(())
}

async fn run_deps_show(
    cfg: &Config,
    instrument: &str,
    data_level: &str,
    descriptor: &str,
    direction: &str,
    relationship: &str,
) -> Result<()> {
    let direction = Direction::from_str(direction).map_err(anyhow::Error::msg)?;
    let relationship = Relationship::from_str(relationship).map_err(anyhow::Error::msg)?;

    let pool = db::connect(cfg).await?;
    let graph = DependencyGraph::load(&pool).await?;
    pool.close().await;

    let edges = graph.get_dependency(instrument, data_level, descriptor, direction, relationship);
    if edges.is_empty() {
        println!("No dependencies.");
        return Ok(());
    }
    for edge in edges {
        println!(
            "{} {} {} -> {} {} {} ({}, {})",
            edge.primary_instrument,
            edge.primary_data_level,
            edge.primary_descriptor,
            edge.dependent_instrument,
            edge.dependent_data_level,
            edge.dependent_descriptor,
            edge.relationship.as_str(),
            edge.direction.as_str()
        );
    }
    Ok(())
}

async fn run_handle(cfg: &Config, source: &str) -> Result<()> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("Failed to read event file: {}", source))?
    };
    let event: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| "Event is not valid JSON")?;

    let indexer = Indexer::from_config(cfg).await?;
    let resp = indexer.handle_event(&event).await;
    indexer.pool().close().await;

    println!("{}", serde_json::to_string(&resp)?);
    if resp.status_code != 200 {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_query(cfg: &Config, filters: &[String]) -> Result<()> {
    let mut params = BTreeMap::new();
    for f in filters {
        let (k, v) = f
            .split_once('=')
            .with_context(|| format!("Invalid filter '{}': expected field=value", f))?;
        params.insert(k.to_string(), v.to_string());
    }

    let pool = db::connect(cfg).await?;
    let resp = query::query(&pool, &params).await;
    pool.close().await;

    println!("{}", resp.body);
    if resp.status_code != 200 {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_status(cfg: &Config, path: &str) -> Result<()> {
    let pool = db::connect(cfg).await?;
    let mut conn = pool.acquire().await?;
    let row = status::get_status(&mut *conn, path).await?;
    drop(conn);
    pool.close().await;

    match row {
        Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
        None => {
            eprintln!("Error: no status tracked for {}", path);
            std::process::exit(1);
        }
    }
    Ok(())
}
