//! # SDS Indexer
//!
//! Event-driven ingestion and cataloging backend for a science data pipeline.
//!
//! The indexer receives notifications when files land in storage or when
//! processing jobs start and finish, tracks the status of every file being
//! produced, catalogs files that exist, and announces finished products to
//! downstream processing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────────┐
//! │ Notifications│──▶│   Indexer   │──▶│    SQLite     │
//! │ job/storage  │   │  (router)   │   │ status+catalog│
//! └──────────────┘   └──────┬──────┘   └───────┬───────┘
//!                           │                  │
//!                           ▼                  ▼
//!                    ┌────────────┐      ┌──────────┐
//!                    │ Publisher  │      │  Query   │
//!                    │ (outbound) │      │ service  │
//!                    └────────────┘      └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sds init                                  # create database
//! sds deps load ./config/dependencies.toml  # load dependency table
//! sds handle ./event.json                   # process one notification
//! sds query --filter instrument=hit
//! sds serve                                 # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`filename`] | Science filename parser |
//! | [`dependency`] | Processing dependency graph |
//! | [`status`] | Status tracking upserts |
//! | [`catalog`] | File catalog |
//! | [`events`] | Inbound notification shapes |
//! | [`indexer`] | Notification router |
//! | [`publisher`] | Outbound events |
//! | [`query`] | Catalog query service |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod catalog;
pub mod config;
pub mod db;
pub mod dependency;
pub mod error;
pub mod events;
pub mod filename;
pub mod indexer;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod publisher;
pub mod query;
pub mod server;
pub mod status;
