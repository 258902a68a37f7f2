//! Orchestrator-facing operations
//!
//! `parse` → `transform` → `load`, one file at a time. Each step is
//! independent so a caller can run them separately (a dry run stops after
//! `transform`). Files can be processed in parallel: nothing here is shared
//! between calls except the connection pool.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::LoadConfig;
use crate::decoder::{self, ParseStats, ParsedFile};
use crate::error::{LoadError, Result};
use crate::formats::FormatRegistry;
use crate::loader::{prepare, EntityLoadOutcome, EntityLoader, LoadStatus, ResolvedRows};
use crate::lookup::PgReferenceLookup;
use crate::schema::SchemaSet;
use crate::transform::{EntityBatches, TransformReport};

pub use crate::transform::transform;

/// Read and decode one file, picking the layout from its name
pub fn parse(path: &Path, registry: &FormatRegistry) -> Result<ParsedFile> {
    let schema = registry.for_path(path)?;
    decoder::parse_file(path, schema)
}

/// Per-entity outcomes of loading one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub entities: Vec<EntityLoadOutcome>,
}

impl LoadReport {
    pub fn failed(&self) -> impl Iterator<Item = &EntityLoadOutcome> {
        self.entities
            .iter()
            .filter(|o| o.status == LoadStatus::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn rows_written(&self) -> usize {
        self.entities.iter().map(|o| o.written).sum()
    }

    pub fn rows_skipped(&self) -> usize {
        self.entities
            .iter()
            .map(|o| o.skipped_missing_parent + o.skipped_null_key)
            .sum()
    }
}

/// Persist the batches of one file in dependency order.
///
/// The whole file shares one transaction. A batch that keeps failing is
/// reported as failed, its savepoint rolled back, and its children lose their
/// link to it; the other batches still commit. Only connectivity failures
/// abort the file.
pub async fn load(
    pool: &PgPool,
    batches: &EntityBatches,
    config: &LoadConfig,
) -> Result<LoadReport> {
    let loader = EntityLoader::new(config.clone());
    let mut resolved = ResolvedRows::default();
    let mut report = LoadReport::default();
    let mut tx = pool.begin().await?;

    for batch in batches.iter() {
        let prepared = prepare(batch, &resolved);

        if prepared.rows.is_empty() {
            resolved.record(&prepared, &Default::default());
            report
                .entities
                .push(EntityLoadOutcome::new(&prepared, LoadStatus::Empty));
            continue;
        }

        let mut outcome = EntityLoadOutcome::new(&prepared, LoadStatus::Loaded);
        match loader.load(&mut tx, &prepared).await {
            Ok(write) => {
                outcome.written = prepared.rows.len();
                outcome.resolved = write.ids.len();
                outcome.attempts = write.attempts;
                resolved.record(&prepared, &write.ids);
            }
            Err(LoadError::Unavailable(e)) => return Err(e.into()),
            Err(e) => {
                warn!(
                    entity = %prepared.entity,
                    rows = prepared.rows.len(),
                    error = %e,
                    "Entity batch failed, dependent rows will be skipped"
                );
                outcome.status = LoadStatus::Failed;
                outcome.attempts = match &e {
                    LoadError::ConflictExhausted { attempts, .. } => *attempts,
                    _ => 1,
                };
                outcome.error = Some(e.to_string());
            }
        }
        report.entities.push(outcome);
    }

    tx.commit().await?;
    Ok(report)
}

/// Everything that happened to one file
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub format: &'static str,
    pub parse: ParseStats,
    pub transform: TransformReport,
    pub load: LoadReport,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.load.is_success()
    }
}

/// Resolve references, transform and load an already parsed file
pub async fn ingest_parsed(
    pool: &PgPool,
    schema: &SchemaSet,
    parsed: &ParsedFile,
    config: &LoadConfig,
) -> Result<FileOutcome> {
    let lookup = PgReferenceLookup::prefetch(pool, schema, &parsed.records).await?;
    let batches = transform(&parsed.records, schema, &lookup);
    let load_report = load(pool, &batches, config).await?;

    info!(
        file = %parsed.path.display(),
        format = parsed.format,
        records = parsed.records.len(),
        decode_errors = parsed.stats.decode_errors,
        field_errors = batches.report.field_errors,
        written = load_report.rows_written(),
        skipped = load_report.rows_skipped(),
        failed_batches = load_report.failed().count(),
        "File loaded"
    );

    Ok(FileOutcome {
        path: parsed.path.clone(),
        format: parsed.format,
        parse: parsed.stats.clone(),
        transform: batches.report,
        load: load_report,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    fn outcome(entity: EntityKind, status: LoadStatus, written: usize) -> EntityLoadOutcome {
        EntityLoadOutcome {
            entity,
            status,
            input_rows: written,
            duplicates_dropped: 0,
            skipped_missing_parent: 1,
            skipped_null_key: 0,
            written,
            resolved: written,
            attempts: 1,
            error: None,
        }
    }

    #[test]
    fn test_report_success_requires_no_failed_batch() {
        let mut report = LoadReport {
            entities: vec![
                outcome(EntityKind::Program, LoadStatus::Loaded, 1),
                outcome(EntityKind::Race, LoadStatus::Empty, 0),
            ],
        };
        assert!(report.is_success());
        assert_eq!(report.rows_written(), 1);
        assert_eq!(report.rows_skipped(), 2);

        report
            .entities
            .push(outcome(EntityKind::Contender, LoadStatus::Failed, 0));
        assert!(!report.is_success());
    }

    #[test]
    fn test_outcome_serializes_for_reports() {
        let mut failed = outcome(EntityKind::Contender, LoadStatus::Failed, 0);
        failed.error = Some("store rejected the batch".to_string());
        let file = FileOutcome {
            path: PathBuf::from("SED080126.txt"),
            format: "SED",
            parse: ParseStats::default(),
            transform: TransformReport::default(),
            load: LoadReport {
                entities: vec![outcome(EntityKind::Race, LoadStatus::Loaded, 2), failed],
            },
        };

        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["format"], "SED");
        assert_eq!(json["load"]["entities"][0]["entity"], "race");
        assert_eq!(json["load"]["entities"][0].get("error"), None);
        assert_eq!(json["load"]["entities"][1]["status"], "failed");
    }

    #[test]
    fn test_parse_rejects_unknown_format() {
        let registry = FormatRegistry::builtin().unwrap();
        let err = parse(Path::new("XYZ080126.txt"), &registry);
        assert!(matches!(err, Err(crate::error::IngestError::UnknownFormat { .. })));
    }
}
