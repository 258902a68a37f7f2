//! Reference lookups for foreign-key fields
//!
//! The transform step is pure, so reference rows are fetched up front: one
//! `= ANY($1)` query per referenced table covering every distinct code in the
//! file, held in an in-memory snapshot for the rest of the run.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use sqlx::{PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use jrdb_common::text::trim_padding;

use crate::decoder::{RawCell, Record};
use crate::schema::{FieldKind, SchemaSet};

/// Resolves natural codes of reference rows to surrogate ids
pub trait ReferenceLookup: Send + Sync {
    fn lookup(&self, table: &str, code: &str) -> Option<Uuid>;
}

/// Lookup table held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLookup {
    entries: HashMap<(String, String), Uuid>,
}

impl MemoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: &str, code: &str, id: Uuid) {
        self.entries.insert((table.to_string(), code.to_string()), id);
    }

    pub fn with(mut self, table: &str, code: &str, id: Uuid) -> Self {
        self.insert(table, code, id);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ReferenceLookup for MemoryLookup {
    fn lookup(&self, table: &str, code: &str) -> Option<Uuid> {
        self.entries
            .get(&(table.to_string(), code.to_string()))
            .copied()
    }
}

/// Snapshot of the reference rows a file refers to
#[derive(Debug, Clone, Default)]
pub struct PgReferenceLookup {
    snapshot: MemoryLookup,
}

impl PgReferenceLookup {
    /// Fetch every reference row the records of one file mention
    pub async fn prefetch(
        pool: &PgPool,
        schema: &SchemaSet,
        records: &[Record],
    ) -> Result<Self, sqlx::Error> {
        let mut wanted: BTreeMap<(&'static str, &'static str), BTreeSet<String>> = BTreeMap::new();

        for (idx, field) in schema.fields().iter().enumerate() {
            let FieldKind::ForeignKey { table, natural_key } = field.kind else {
                continue;
            };
            let codes = wanted.entry((table, natural_key)).or_default();
            for record in records {
                if let Some(RawCell::Scalar(raw)) = record.cell(idx) {
                    let code = trim_padding(raw);
                    if !code.is_empty() {
                        codes.insert(code.to_string());
                    }
                }
            }
        }

        let mut snapshot = MemoryLookup::new();
        for ((table, natural_key), codes) in wanted {
            if codes.is_empty() {
                continue;
            }
            let sql = format!(
                r#"SELECT id, "{key}" FROM "{table}" WHERE "{key}" = ANY($1)"#,
                key = natural_key,
                table = table
            );
            let codes: Vec<String> = codes.into_iter().collect();
            let rows = sqlx::query(&sql).bind(&codes).fetch_all(pool).await?;

            debug!(
                table = table,
                requested = codes.len(),
                found = rows.len(),
                "Prefetched reference rows"
            );

            for row in rows {
                let id: Uuid = row.try_get(0)?;
                let code: String = row.try_get(1)?;
                snapshot.insert(table, &code, id);
            }
        }

        Ok(Self { snapshot })
    }

    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}

impl ReferenceLookup for PgReferenceLookup {
    fn lookup(&self, table: &str, code: &str) -> Option<Uuid> {
        self.snapshot.lookup(table, code)
    }
}
