//! Entity batches produced by the transform step

use std::collections::BTreeMap;

use crate::entity::EntityKind;
use crate::schema::{SchemaSet, Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchColumn {
    pub name: &'static str,
    pub value_type: ValueType,
}

/// Values one source record contributes to one entity
#[derive(Debug, Clone, PartialEq)]
pub struct TypedRow {
    /// Index of the record in the file, shared by every entity it fed
    pub source_row: usize,
    /// 1-based line number, for diagnostics
    pub line: usize,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityBatch {
    pub entity: EntityKind,
    pub columns: Vec<BatchColumn>,
    pub rows: Vec<TypedRow>,
}

impl EntityBatch {
    pub fn key_attributes(&self) -> &'static [&'static str] {
        self.entity.def().key
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value of `attribute` in `row`, where `attribute` is either bare
    /// (`num`) or entity-qualified (`race.num`)
    pub fn get<'a>(&self, row: &'a TypedRow, attribute: &str) -> Option<&'a Value> {
        let bare = match attribute.split_once('.') {
            Some((entity, name)) if entity == self.entity.name() => name,
            Some(_) => return None,
            None => attribute,
        };
        self.column_index(bare).and_then(|idx| row.values.get(idx))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Group typed columns into one batch per entity the layout writes.
/// Rows whose values for an entity are all null contribute nothing to it.
pub(crate) fn group(
    schema: &SchemaSet,
    columns: &[Vec<Value>],
    lines: &[usize],
) -> BTreeMap<EntityKind, EntityBatch> {
    let mut batches = BTreeMap::new();

    for entity in schema.entities() {
        let fields: Vec<(usize, BatchColumn)> = schema
            .targets(entity)
            .filter_map(|(idx, field)| {
                field.target.map(|t| {
                    (
                        idx,
                        BatchColumn {
                            name: t.attribute,
                            value_type: field.value_type(),
                        },
                    )
                })
            })
            .collect();

        let rows = lines
            .iter()
            .enumerate()
            .filter_map(|(source_row, line)| {
                let values: Vec<Value> = fields
                    .iter()
                    .map(|(idx, _)| columns[*idx][source_row].clone())
                    .collect();
                let keep = values.iter().any(has_content);
                keep.then_some(TypedRow {
                    source_row,
                    line: *line,
                    values,
                })
            })
            .collect();

        batches.insert(
            entity,
            EntityBatch {
                entity,
                columns: fields.into_iter().map(|(_, c)| c).collect(),
                rows,
            },
        );
    }

    batches
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::List(items) => items.iter().any(has_content),
        _ => true,
    }
}
