//! Entity resolver and upsert loader
//!
//! Batches are written inside the file's transaction, one savepoint per
//! entity batch. A batch is first prepared in memory: parent surrogate ids
//! are stamped onto each row, rows that cannot be keyed are dropped, and
//! duplicates collapse to the last occurrence. The remaining rows are
//! upserted in key order and their surrogate ids read back for the children.

pub mod sql;

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use sqlx::{PgConnection, Postgres, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::LoadConfig;
use crate::entity::EntityKind;
use crate::error::{is_transient_conflict, LoadError};
use crate::schema::{NaturalKey, Value, ValueType};
use crate::transform::{BatchColumn, EntityBatch};

const SAVEPOINT: &str = "entity_batch";

/// Natural key to surrogate id, for every row of a batch that resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SurrogateIdMap {
    ids: HashMap<NaturalKey, Uuid>,
}

impl SurrogateIdMap {
    pub fn get(&self, key: &NaturalKey) -> Option<Uuid> {
        self.ids.get(key).copied()
    }

    pub fn insert(&mut self, key: NaturalKey, id: Uuid) {
        self.ids.insert(key, id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Surrogate ids already resolved in the current file, per entity and
/// source record
#[derive(Debug, Clone, Default)]
pub struct ResolvedRows {
    ids: HashMap<EntityKind, HashMap<usize, Uuid>>,
}

impl ResolvedRows {
    pub fn get(&self, entity: EntityKind, source_row: usize) -> Option<Uuid> {
        self.ids.get(&entity)?.get(&source_row).copied()
    }

    /// Whether `entity` was loaded for this file at all
    pub fn has(&self, entity: EntityKind) -> bool {
        self.ids.contains_key(&entity)
    }

    pub fn insert(&mut self, entity: EntityKind, source_row: usize, id: Uuid) {
        self.ids.entry(entity).or_default().insert(source_row, id);
    }

    /// Map every source record of `batch` to the id its key resolved to
    pub fn record(&mut self, batch: &PreparedBatch, ids: &SurrogateIdMap) {
        let rows = self.ids.entry(batch.entity).or_default();
        for (source_row, key) in &batch.source_keys {
            if let Some(id) = ids.get(key) {
                rows.insert(*source_row, id);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRow {
    pub key: NaturalKey,
    pub line: usize,
    pub values: Vec<Value>,
}

/// Rows of one entity ready to be written: parent ids stamped, keyed,
/// deduplicated and sorted by key
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedBatch {
    pub entity: EntityKind,
    pub columns: Vec<BatchColumn>,
    pub rows: Vec<PreparedRow>,
    /// Key of every source record that survived preparation
    pub source_keys: Vec<(usize, NaturalKey)>,
    pub input_rows: usize,
    pub duplicates_dropped: usize,
    pub skipped_missing_parent: usize,
    pub skipped_null_key: usize,
}

/// Stamp parent ids onto the rows of `batch` and collapse it to one row per
/// natural key, the last occurrence winning
pub fn prepare(batch: &EntityBatch, resolved: &ResolvedRows) -> PreparedBatch {
    let def = batch.entity.def();

    // Links to parents this file never wrote are left out so that existing
    // links survive the update
    let links: Vec<_> = def
        .parents
        .iter()
        .filter(|link| link.required || resolved.has(link.parent))
        .collect();

    let mut columns: Vec<BatchColumn> = links
        .iter()
        .map(|link| BatchColumn {
            name: link.column,
            value_type: ValueType::Uuid,
        })
        .collect();
    columns.extend(batch.columns.iter().copied());

    let key_idx: Option<Vec<usize>> = def
        .key
        .iter()
        .map(|k| columns.iter().position(|c| c.name == *k))
        .collect();

    let mut prepared = PreparedBatch {
        entity: batch.entity,
        columns,
        rows: Vec::new(),
        source_keys: Vec::new(),
        input_rows: batch.rows.len(),
        duplicates_dropped: 0,
        skipped_missing_parent: 0,
        skipped_null_key: 0,
    };
    let mut positions: HashMap<NaturalKey, usize> = HashMap::new();

    'rows: for row in &batch.rows {
        let mut values = Vec::with_capacity(prepared.columns.len());
        for link in &links {
            match resolved.get(link.parent, row.source_row) {
                Some(id) => values.push(Value::Id(id)),
                None if link.required => {
                    prepared.skipped_missing_parent += 1;
                    debug!(
                        entity = %batch.entity,
                        parent = %link.parent,
                        line = row.line,
                        "Skipping row without parent"
                    );
                    continue 'rows;
                }
                None => values.push(Value::Null),
            }
        }
        values.extend(row.values.iter().cloned());

        let key = key_idx
            .as_ref()
            .and_then(|idx| NaturalKey::from_values(idx.iter().map(|i| &values[*i])));
        let Some(key) = key else {
            prepared.skipped_null_key += 1;
            debug!(
                entity = %batch.entity,
                line = row.line,
                "Skipping row with incomplete natural key"
            );
            continue;
        };

        prepared.source_keys.push((row.source_row, key.clone()));
        let row = PreparedRow {
            key: key.clone(),
            line: row.line,
            values,
        };
        match positions.get(&key) {
            Some(pos) => {
                prepared.rows[*pos] = row;
                prepared.duplicates_dropped += 1;
            }
            None => {
                positions.insert(key, prepared.rows.len());
                prepared.rows.push(row);
            }
        }
    }

    // Consistent lock order across concurrent loads
    prepared.rows.sort_by(|a, b| a.key.cmp(&b.key));
    prepared
}

/// Successful write of one batch
#[derive(Debug, Clone)]
pub struct BatchWrite {
    pub ids: SurrogateIdMap,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Loaded,
    /// Nothing left to write after preparation
    Empty,
    Failed,
}

/// Per-entity outcome of loading one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityLoadOutcome {
    pub entity: EntityKind,
    pub status: LoadStatus,
    pub input_rows: usize,
    pub duplicates_dropped: usize,
    pub skipped_missing_parent: usize,
    pub skipped_null_key: usize,
    /// Distinct rows sent to the store
    pub written: usize,
    /// Rows whose surrogate id was read back
    pub resolved: usize,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntityLoadOutcome {
    pub fn new(batch: &PreparedBatch, status: LoadStatus) -> Self {
        Self {
            entity: batch.entity,
            status,
            input_rows: batch.input_rows,
            duplicates_dropped: batch.duplicates_dropped,
            skipped_missing_parent: batch.skipped_missing_parent,
            skipped_null_key: batch.skipped_null_key,
            written: 0,
            resolved: 0,
            attempts: 0,
            error: None,
        }
    }
}

/// Writes prepared batches with bounded retry on transient conflicts
#[derive(Debug, Clone)]
pub struct EntityLoader {
    config: LoadConfig,
}

impl EntityLoader {
    pub fn new(config: LoadConfig) -> Self {
        Self { config }
    }

    /// Upsert `batch` and read back the surrogate id of every key
    pub async fn load(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        batch: &PreparedBatch,
    ) -> Result<BatchWrite, LoadError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            sqlx::query(&format!("SAVEPOINT {}", SAVEPOINT))
                .execute(&mut **tx)
                .await
                .map_err(LoadError::Unavailable)?;

            match self.write(&mut **tx, batch).await {
                Ok(ids) => {
                    sqlx::query(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))
                        .execute(&mut **tx)
                        .await
                        .map_err(LoadError::Unavailable)?;
                    return Ok(BatchWrite {
                        ids,
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT))
                        .execute(&mut **tx)
                        .await
                        .map_err(LoadError::Unavailable)?;

                    if is_transient_conflict(&e) && attempt < self.config.upsert_max_attempts {
                        let backoff_ms = self.config.retry_backoff_ms * 2_u64.pow(attempt - 1);
                        warn!(
                            entity = %batch.entity,
                            attempt = attempt,
                            backoff_ms = backoff_ms,
                            error = %e,
                            "Transient conflict, retrying batch"
                        );
                        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                        continue;
                    }

                    return Err(LoadError::from_attempt(e, attempt));
                }
            }
        }
    }

    async fn write(
        &self,
        conn: &mut PgConnection,
        batch: &PreparedBatch,
    ) -> Result<SurrogateIdMap, sqlx::Error> {
        let def = batch.entity.def();
        let mut ids = SurrogateIdMap::default();

        let per_statement = sql::rows_per_statement(batch.columns.len(), self.config.chunk_rows);
        for chunk in batch.rows.chunks(per_statement) {
            sql::upsert_query(def, &batch.columns, chunk)
                .build()
                .execute(&mut *conn)
                .await?;
        }

        let keys: Vec<&NaturalKey> = batch.rows.iter().map(|r| &r.key).collect();
        let per_lookup = sql::rows_per_statement(def.key.len(), self.config.chunk_rows);
        for chunk in keys.chunks(per_lookup) {
            let rows = sql::resolve_query(def, chunk)
                .build()
                .fetch_all(&mut *conn)
                .await?;
            for row in rows {
                let id: Uuid = sqlx::Row::try_get(&row, 0)?;
                ids.insert(sql::row_key(&row, def, &batch.columns)?, id);
            }
        }

        debug!(
            entity = %batch.entity,
            rows = batch.rows.len(),
            resolved = ids.len(),
            "Upserted batch"
        );

        Ok(ids)
    }
}
