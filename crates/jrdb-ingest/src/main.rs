//! JRDB Ingest - load JRDB files into PostgreSQL

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use jrdb_common::logging::{init_logging, LogConfig, LogLevel};
use jrdb_ingest::config::IngestConfig;
use jrdb_ingest::decoder::ParsedFile;
use jrdb_ingest::formats::FormatRegistry;
use jrdb_ingest::lookup::{MemoryLookup, PgReferenceLookup, ReferenceLookup};
use jrdb_ingest::pipeline::{self, FileOutcome};
use jrdb_ingest::{db, IngestError};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "jrdb-ingest")]
#[command(author, version, about = "Load JRDB fixed-width files into PostgreSQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Load files into the database
    Load {
        /// Files or directories (non-recursive, *.txt)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Files processed in parallel
        #[arg(short, long, env = "JRDB_WORKERS")]
        workers: Option<usize>,

        /// Apply migrations before loading
        #[arg(long)]
        migrate: bool,

        /// Write per-file outcomes as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Decode and transform files without writing to the database
    Check {
        /// Files or directories (non-recursive, *.txt)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Resolve reference codes against the configured database. Without
        /// it every reference is reported unresolved.
        #[arg(long)]
        resolve: bool,
    },

    /// Apply migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("jrdb-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let registry = Arc::new(FormatRegistry::builtin().context("Built-in layouts are invalid")?);

    match cli.command {
        Command::Load {
            paths,
            workers,
            migrate,
            report,
        } => {
            let mut config = IngestConfig::from_env()?;
            if let Some(workers) = workers {
                config.workers = workers;
                config.validate()?;
            }

            let pool = db::create_pool(&config.database).await?;
            db::health_check(&pool).await?;
            if migrate {
                db::run_migrations(&pool).await?;
            }

            let files = discover(&paths)?;
            load_all(pool, registry, Arc::new(config), files, report.as_deref()).await
        }
        Command::Check { paths, resolve } => {
            let pool = if resolve {
                let config = IngestConfig::from_env()?;
                Some(db::create_pool(&config.database).await?)
            } else {
                None
            };
            let files = discover(&paths)?;
            check_all(&registry, &files, pool.as_ref()).await
        }
        Command::Migrate => {
            let config = IngestConfig::from_env()?;
            let pool = db::create_pool(&config.database).await?;
            db::run_migrations(&pool).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Expand directories into their `*.txt` files, sorted by name
fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && has_txt_extension(p))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    info!(files = files.len(), "Discovered input files");
    Ok(files)
}

fn has_txt_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("txt"))
}

async fn load_all(
    pool: PgPool,
    registry: Arc<FormatRegistry>,
    config: Arc<IngestConfig>,
    files: Vec<PathBuf>,
    report: Option<&Path>,
) -> Result<ExitCode> {
    let workers = config.workers;
    let total = files.len();

    let results: Vec<(PathBuf, std::result::Result<FileOutcome, IngestError>)> = stream::iter(files)
        .map(|path| {
            let pool = pool.clone();
            let registry = Arc::clone(&registry);
            let config = Arc::clone(&config);
            tokio::spawn(async move {
                let result = load_with_retry(&pool, &registry, &config, &path).await;
                (path, result)
            })
        })
        .buffer_unordered(workers)
        .filter_map(|joined| async move {
            match joined {
                Ok(result) => Some(result),
                Err(e) => {
                    error!(error = %e, "File worker panicked");
                    None
                }
            }
        })
        .collect()
        .await;

    let mut failed = total - results.len();
    let mut rows_written = 0;
    for (path, result) in &results {
        match result {
            Ok(outcome) if outcome.is_success() => rows_written += outcome.load.rows_written(),
            Ok(outcome) => {
                failed += 1;
                rows_written += outcome.load.rows_written();
                error!(
                    file = %path.display(),
                    failed_batches = outcome.load.failed().count(),
                    "File loaded with failed batches"
                );
            }
            Err(e) => {
                failed += 1;
                error!(file = %path.display(), error = %e, "File failed");
            }
        }
    }

    info!(
        files = total,
        failed = failed,
        rows_written = rows_written,
        "Ingestion complete"
    );

    if let Some(path) = report {
        write_report(path, &results)?;
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// One entry of the `--report` file
#[derive(Serialize)]
struct FileReport<'a> {
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    outcome: Option<&'a FileOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn write_report(
    path: &Path,
    results: &[(PathBuf, std::result::Result<FileOutcome, IngestError>)],
) -> Result<()> {
    let entries: Vec<FileReport<'_>> = results
        .iter()
        .map(|(file, result)| FileReport {
            path: file,
            outcome: result.as_ref().ok(),
            error: result.as_ref().err().map(ToString::to_string),
        })
        .collect();

    let json = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    info!(report = %path.display(), "Report written");
    Ok(())
}

/// Parse, transform and load one file, retrying the whole file when the
/// failure may be transient. Reloading is idempotent.
async fn load_with_retry(
    pool: &PgPool,
    registry: &Arc<FormatRegistry>,
    config: &IngestConfig,
    path: &Path,
) -> std::result::Result<FileOutcome, IngestError> {
    let parsed = parse_blocking(Arc::clone(registry), path.to_path_buf()).await?;
    let schema = registry.for_path(path)?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match pipeline::ingest_parsed(pool, schema, &parsed, &config.load).await {
            Ok(outcome) if outcome.is_success() || attempt >= config.file_max_attempts => {
                return Ok(outcome)
            }
            Ok(outcome) => {
                warn!(
                    file = %path.display(),
                    attempt = attempt,
                    failed_batches = outcome.load.failed().count(),
                    "Retrying file with failed batches"
                );
            }
            Err(e) if e.is_retryable() && attempt < config.file_max_attempts => {
                warn!(file = %path.display(), attempt = attempt, error = %e, "Retrying file");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decoding is CPU-bound, keep it off the async workers
async fn parse_blocking(
    registry: Arc<FormatRegistry>,
    path: PathBuf,
) -> std::result::Result<ParsedFile, IngestError> {
    let display = path.clone();
    tokio::task::spawn_blocking(move || pipeline::parse(&path, &registry))
        .await
        .map_err(|e| IngestError::Io {
            path: display,
            source: std::io::Error::other(e),
        })?
}

/// Dry run: decode and transform, resolving references only when a pool is
/// given
async fn check_all(
    registry: &FormatRegistry,
    files: &[PathBuf],
    pool: Option<&PgPool>,
) -> Result<ExitCode> {
    let mut failed = 0;

    for path in files {
        let parsed = match pipeline::parse(path, registry) {
            Ok(parsed) => parsed,
            Err(e) => {
                failed += 1;
                error!(file = %path.display(), error = %e, "File failed");
                continue;
            }
        };
        let Some(schema) = registry.get(parsed.format) else {
            continue;
        };
        let lookup: Box<dyn ReferenceLookup> = match pool {
            Some(pool) => {
                Box::new(PgReferenceLookup::prefetch(pool, schema, &parsed.records).await?)
            }
            None => Box::new(MemoryLookup::new()),
        };
        let batches = pipeline::transform(&parsed.records, schema, lookup.as_ref());

        let entities: Vec<String> = batches
            .iter()
            .map(|b| format!("{}={}", b.entity, b.len()))
            .collect();
        info!(
            file = %path.display(),
            format = parsed.format,
            records = parsed.records.len(),
            decode_errors = parsed.stats.decode_errors,
            field_errors = batches.report.field_errors,
            unresolved = batches.report.unresolved_references,
            consensus_rewrites = batches.report.consensus_rewrites,
            rows = %entities.join(" "),
            "Checked file"
        );

        if parsed.stats.decode_errors > 0 {
            failed += 1;
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
