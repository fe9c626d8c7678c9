//! projdash-core - Core library for projdash
//!
//! This crate provides the inventory engine shared by the projdash CLI and
//! projdash-server:
//!
//! - **scan**: Filesystem discovery and per-project fact collection
//! - **scoring**: Deterministic status, hygiene, momentum and health
//! - **db**: SQLite storage for the five project layers
//! - **merge**: Layer precedence into a single project view
//! - **github**: Issue, PR and CI data through the `gh` CLI
//! - **enrich**: Optional LLM enrichment backends
//! - **pipeline**: The refresh run with progress events and cancellation
//! - **client**: Progress reducer and before/after deltas
//! - **attention**: Rules that flag neglected projects
//! - **export**: Markdown inventory

pub mod attention;
pub mod client;
pub mod config;
pub mod db;
pub mod enrich;
pub mod error;
pub mod export;
pub mod github;
pub mod merge;
pub mod pipeline;
pub mod scan;
pub mod scoring;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use merge::MergedView;
pub use pipeline::{Orchestrator, PipelineEvent, RunOutcome, RunSummary};
