//! JRDB Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads fixed-width JRDB horse-racing files into PostgreSQL.
//!
//! # Pipeline
//!
//! - **Decode**: slice each Shift_JIS line at the byte offsets of its layout
//! - **Transform**: parse cells by kind, compute derived fields, settle
//!   repeated race-level values by consensus, route values to entities
//! - **Load**: upsert entities in dependency order (program, race, horse,
//!   jockey, trainer, contender) keyed by natural keys, resolving surrogate
//!   ids for the children
//!
//! # Example
//!
//! ```no_run
//! use jrdb_ingest::config::IngestConfig;
//! use jrdb_ingest::formats::FormatRegistry;
//! use jrdb_ingest::{db, pipeline};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let pool = db::create_pool(&config.database).await?;
//!     let registry = FormatRegistry::builtin()?;
//!
//!     let path = Path::new("SED080126.txt");
//!     let parsed = pipeline::parse(path, &registry)?;
//!     let schema = registry.for_path(path)?;
//!     let outcome = pipeline::ingest_parsed(&pool, schema, &parsed, &config.load).await?;
//!     println!("{} rows written", outcome.load.rows_written());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod db;
pub mod decoder;
pub mod entity;
pub mod error;
pub mod formats;
pub mod loader;
pub mod lookup;
pub mod pipeline;
pub mod schema;
pub mod transform;

pub use error::{IngestError, Result};
