//! Statement builders for batched upserts and key resolution

use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::entity::EntityDef;
use crate::schema::{KeyPart, NaturalKey, Value, ValueType};
use crate::transform::BatchColumn;

use super::PreparedRow;

/// Postgres accepts at most this many bind parameters per statement
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Largest row count per statement that stays under the bind limit
pub fn rows_per_statement(columns: usize, configured: usize) -> usize {
    let by_params = MAX_BIND_PARAMS / columns.max(1);
    configured.min(by_params).max(1)
}

/// `INSERT .. ON CONFLICT (natural key) DO UPDATE` for one chunk of rows
pub fn upsert_query(
    def: &EntityDef,
    columns: &[BatchColumn],
    rows: &[PreparedRow],
) -> QueryBuilder<'static, Postgres> {
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    let mut qb = QueryBuilder::new(format!(
        "INSERT INTO {} AS t ({}) ",
        def.table,
        names.join(", ")
    ));

    qb.push_values(rows, |mut b, row| {
        for (column, value) in columns.iter().zip(&row.values) {
            bind_value(&mut b, column.value_type, value);
        }
    });

    qb.push(conflict_clause(def, columns));
    qb
}

/// Conflict handling for an entity. Rows whose stored recency marker is
/// newer than the incoming one are left untouched.
pub fn conflict_clause(def: &EntityDef, columns: &[BatchColumn]) -> String {
    let keys = def.key.join(", ");
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !def.is_key_column(c.name))
        .map(|c| format!("{0} = EXCLUDED.{0}", c.name))
        .collect();

    if updates.is_empty() {
        return format!(" ON CONFLICT ({}) DO NOTHING", keys);
    }

    let mut clause = format!(
        " ON CONFLICT ({}) DO UPDATE SET {}, updated_at = NOW()",
        keys,
        updates.join(", ")
    );
    if let Some(marker) = def.recency_column {
        clause.push_str(&format!(
            " WHERE t.{0} IS NULL OR (EXCLUDED.{0} IS NOT NULL AND t.{0} <= EXCLUDED.{0})",
            marker
        ));
    }
    clause
}

/// `SELECT id, <key columns> .. WHERE (<key columns>) IN (..)`
pub fn resolve_query(def: &EntityDef, keys: &[&NaturalKey]) -> QueryBuilder<'static, Postgres> {
    let key_list = def.key.join(", ");
    let mut qb = QueryBuilder::new(format!(
        "SELECT id, {0} FROM {1} WHERE ({0}) IN (",
        key_list, def.table
    ));

    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push("(");
        let mut parts = qb.separated(", ");
        for part in &key.0 {
            bind_key_part(&mut parts, part);
        }
        parts.push_unseparated(")");
    }
    qb.push(")");
    qb
}

/// Read the natural key back from a row returned by [`resolve_query`]
pub fn row_key(
    row: &PgRow,
    def: &EntityDef,
    columns: &[BatchColumn],
) -> Result<NaturalKey, sqlx::Error> {
    let mut parts = Vec::with_capacity(def.key.len());
    for (i, name) in def.key.iter().enumerate() {
        let idx = i + 1;
        let value_type = columns
            .iter()
            .find(|c| c.name == *name)
            .map(|c| c.value_type)
            .ok_or_else(|| sqlx::Error::ColumnNotFound(name.to_string()))?;

        let part = match value_type {
            ValueType::BigInt => KeyPart::Int(row.try_get::<i64, _>(idx)?),
            ValueType::Text => KeyPart::Text(row.try_get::<String, _>(idx)?),
            ValueType::Date => KeyPart::Date(row.try_get::<NaiveDate, _>(idx)?),
            ValueType::Bool => KeyPart::Bool(row.try_get::<bool, _>(idx)?),
            ValueType::Uuid => KeyPart::Id(row.try_get::<Uuid, _>(idx)?),
            other => {
                return Err(sqlx::Error::Protocol(format!(
                    "key column {}.{} has non-key type {:?}",
                    def.table, name, other
                )))
            }
        };
        parts.push(part);
    }
    Ok(NaturalKey(parts))
}

/// Bind a value as its column type so nulls carry the right type
fn bind_value(
    b: &mut Separated<'_, '_, Postgres, &'static str>,
    value_type: ValueType,
    value: &Value,
) {
    match value_type {
        ValueType::BigInt => {
            b.push_bind(value.as_i64());
        }
        ValueType::Double => {
            b.push_bind(value.as_f64());
        }
        ValueType::Text => {
            b.push_bind(value.as_text().map(str::to_owned));
        }
        ValueType::Date => {
            b.push_bind(value.as_date());
        }
        ValueType::Bool => {
            b.push_bind(value.as_bool());
        }
        ValueType::Uuid => {
            b.push_bind(value.as_uuid());
        }
        ValueType::BigIntArray => {
            b.push_bind(list(value, Value::as_i64));
        }
        ValueType::DoubleArray => {
            b.push_bind(list(value, Value::as_f64));
        }
        ValueType::TextArray => {
            b.push_bind(list(value, |v| v.as_text().map(str::to_owned)));
        }
    }
}

fn list<T>(value: &Value, element: impl Fn(&Value) -> Option<T>) -> Option<Vec<Option<T>>> {
    value
        .as_list()
        .map(|items| items.iter().map(element).collect())
}

fn bind_key_part(b: &mut Separated<'_, '_, Postgres, &'static str>, part: &KeyPart) {
    match part {
        KeyPart::Int(v) => {
            b.push_bind(*v);
        }
        KeyPart::Text(v) => {
            b.push_bind(v.clone());
        }
        KeyPart::Date(v) => {
            b.push_bind(*v);
        }
        KeyPart::Bool(v) => {
            b.push_bind(*v);
        }
        KeyPart::Id(v) => {
            b.push_bind(*v);
        }
    }
}
