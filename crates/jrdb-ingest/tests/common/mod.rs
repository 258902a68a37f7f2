//! Common test utilities for JRDB ingest integration tests
//!
//! Provides a PostgreSQL container with migrations applied and builders for
//! fixed-width JRDB lines.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use jrdb_common::text;
use jrdb_ingest::config::LoadConfig;
use jrdb_ingest::formats::FormatRegistry;
use jrdb_ingest::pipeline::{self, FileOutcome};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use testcontainers::{runners::AsyncRunner, ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tracing::{debug, info};

// ============================================================================
// PostgreSQL Test Container
// ============================================================================

/// PostgreSQL test container with migrations applied
pub struct TestPostgres {
    _container: ContainerAsync<Postgres>,
    pool: PgPool,
}

impl TestPostgres {
    pub async fn start() -> Result<Self> {
        info!("Starting PostgreSQL test container...");

        let container = Postgres::default()
            .with_tag("16-alpine")
            .start()
            .await
            .context("Failed to start PostgreSQL container")?;

        let host = container
            .get_host()
            .await
            .context("Failed to get container host")?;
        let port = container
            .get_host_port_ipv4(5432)
            .await
            .context("Failed to get container port")?;

        let connection_string =
            format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);
        debug!("PostgreSQL connection: {}", connection_string);

        let pool = PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        jrdb_ingest::db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            _container: container,
            pool,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn count(&self, table: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,jrdb_ingest=debug,sqlx=warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Fixed-width lines
// ============================================================================

/// Builds one Shift_JIS line of a fixed width, blank-padded
pub struct LineBuilder {
    bytes: Vec<u8>,
}

impl LineBuilder {
    pub fn new(width: usize) -> Self {
        Self {
            bytes: vec![b' '; width],
        }
    }

    /// Write `value` at the 1-based byte offset `start`
    pub fn put(mut self, start: usize, value: &str) -> Self {
        let encoded = text::encode(value).expect("test text is Shift_JIS encodable");
        let from = start - 1;
        self.bytes[from..from + encoded.len()].copy_from_slice(&encoded);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// CRLF-terminated file content
pub fn file_bytes(lines: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(line);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// First eight bytes of a race-level line
pub fn race_key(venue: &str, year: u32, round: u32, day: &str, race: u32) -> String {
    format!("{}{:02}{}{}{:02}", venue, year, round, day, race)
}

/// One SED (race result) line for venue `01`, 2008 round 1 day 1
pub struct SedLine<'a> {
    pub venue: &'a str,
    pub race: u32,
    pub contender: u32,
    pub pedigree: &'a str,
    pub race_date: &'a str,
    pub horse_name: &'a str,
    pub track_variant: i32,
    pub pace: &'a str,
    pub finish_time: &'a str,
}

impl Default for SedLine<'_> {
    fn default() -> Self {
        Self {
            venue: "01",
            race: 1,
            contender: 1,
            pedigree: "00101001",
            race_date: "20080126",
            horse_name: "Horse",
            track_variant: 10,
            pace: "M",
            finish_time: "1345",
        }
    }
}

impl SedLine<'_> {
    pub fn build(&self) -> Vec<u8> {
        LineBuilder::new(90)
            .put(1, &race_key(self.venue, 8, 1, "1", self.race))
            .put(9, &format!("{:02}", self.contender))
            .put(11, self.pedigree)
            .put(19, self.race_date)
            .put(27, self.horse_name)
            .put(63, "1600")
            .put(67, "1")
            .put(68, "10")
            .put(70, &format!("{:02}", self.contender))
            .put(72, self.finish_time)
            .put(76, "570")
            .put(79, "000035")
            .put(85, "01")
            .put(87, &format!("{:>3}", self.track_variant))
            .put(90, self.pace)
            .build()
    }
}

/// One KYI (pre-race) line for venue `01`, 2008 round 1 day 1
pub fn kyi_line(race: u32, contender: u32, pedigree: &str, jockey: &str, trainer: &str) -> Vec<u8> {
    LineBuilder::new(103)
        .put(1, &race_key("01", 8, 1, "1", race))
        .put(9, &format!("{:02}", contender))
        .put(11, pedigree)
        .put(19, "Horse")
        .put(55, "00523")
        .put(60, "00100")
        .put(65, jockey)
        .put(70, "Jockey")
        .put(82, trainer)
        .put(87, "Trainer")
        .put(99, "570")
        .put(102, "0")
        .put(103, "1")
        .build()
}

/// One UKC (horse master) line
pub fn ukc_line(pedigree: &str, name: &str, data_as_of: &str) -> Vec<u8> {
    LineBuilder::new(61)
        .put(1, pedigree)
        .put(9, name)
        .put(45, "1")
        .put(46, "20050301")
        .put(54, data_as_of)
        .build()
}

// ============================================================================
// Loading
// ============================================================================

/// Write `lines` to `dir/name`
pub fn write_file(dir: &Path, name: &str, lines: &[Vec<u8>]) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, file_bytes(lines))?;
    Ok(path)
}

/// Parse and load one file end to end
pub async fn ingest(pool: &PgPool, path: &Path) -> Result<FileOutcome> {
    ingest_with(pool, path, &LoadConfig::default()).await
}

/// Parse and load one file with explicit upsert settings
pub async fn ingest_with(pool: &PgPool, path: &Path, config: &LoadConfig) -> Result<FileOutcome> {
    let registry = FormatRegistry::builtin()?;
    let parsed = pipeline::parse(path, &registry)?;
    let schema = registry.for_path(path)?;
    let outcome = pipeline::ingest_parsed(pool, schema, &parsed, config).await?;
    Ok(outcome)
}
