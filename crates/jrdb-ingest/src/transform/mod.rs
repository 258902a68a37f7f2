//! Typed transform pipeline
//!
//! Turns decoded records into typed entity batches in four steps:
//! 1. parse every raw field by kind (bad cells become null and are counted)
//! 2. compute derived fields in declaration order
//! 3. apply consensus rules per group
//! 4. route values to their target entities
//!
//! The step is pure. Foreign keys resolve against a [`ReferenceLookup`]
//! snapshot taken before the call.

mod batch;
mod clean;
mod consensus;
pub mod derived;

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

pub use batch::{BatchColumn, EntityBatch, TypedRow};
pub use clean::{encode_fixed_point, parse_cell, parse_scalar, CellIssue, Parsed};
pub use consensus::mode;

use crate::decoder::Record;
use crate::entity::EntityKind;
use crate::lookup::ReferenceLookup;
use crate::schema::{FieldKind, SchemaSet, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub records: usize,
    /// Cells that did not match their declared kind
    pub field_errors: usize,
    /// Foreign-key codes with no reference row
    pub unresolved_references: usize,
    /// Cells rewritten by consensus
    pub consensus_rewrites: usize,
}

/// Typed rows of one file, one batch per entity, keyed in load order
#[derive(Debug, Clone, Default)]
pub struct EntityBatches {
    pub batches: BTreeMap<EntityKind, EntityBatch>,
    pub report: TransformReport,
}

impl EntityBatches {
    pub fn get(&self, entity: EntityKind) -> Option<&EntityBatch> {
        self.batches.get(&entity)
    }

    /// Batches in dependency order
    pub fn iter(&self) -> impl Iterator<Item = &EntityBatch> {
        EntityKind::LOAD_ORDER
            .into_iter()
            .filter_map(|kind| self.batches.get(&kind))
    }
}

/// Transform decoded records of one file into typed entity batches
pub fn transform(
    records: &[Record],
    schema: &SchemaSet,
    lookup: &dyn ReferenceLookup,
) -> EntityBatches {
    let mut report = TransformReport {
        records: records.len(),
        ..Default::default()
    };
    let mut columns: Vec<Vec<Value>> = Vec::with_capacity(schema.fields().len());

    for (idx, field) in schema.fields().iter().enumerate() {
        let column = match &field.kind {
            FieldKind::Derived {
                inputs, compute, ..
            } => {
                let input_columns: Vec<&[Value]> = inputs
                    .iter()
                    .filter_map(|label| schema.position(label))
                    .map(|pos| columns[pos].as_slice())
                    .collect();
                let mut derived = compute(&input_columns);
                derived.resize(records.len(), Value::Null);
                derived
            }
            kind => records
                .iter()
                .map(|record| {
                    let parsed = record
                        .cell(idx)
                        .map(|cell| parse_cell(kind, cell, lookup))
                        .unwrap_or(Parsed {
                            value: Value::Null,
                            issues: Vec::new(),
                        });
                    for issue in &parsed.issues {
                        record_issue(&mut report, schema, field.label, record.line, issue);
                    }
                    parsed.value
                })
                .collect(),
        };
        columns.push(column);
    }

    report.consensus_rewrites = consensus::apply(schema, &mut columns);

    let lines: Vec<usize> = records.iter().map(|r| r.line).collect();
    let batches = batch::group(schema, &columns, &lines);

    debug!(
        format = schema.code(),
        records = report.records,
        field_errors = report.field_errors,
        unresolved = report.unresolved_references,
        entities = batches.len(),
        "Transformed records"
    );

    EntityBatches { batches, report }
}

fn record_issue(
    report: &mut TransformReport,
    schema: &SchemaSet,
    label: &str,
    line: usize,
    issue: &CellIssue,
) {
    match issue {
        CellIssue::Parse(e) => {
            report.field_errors += 1;
            warn!(
                format = schema.code(),
                field = label,
                line = line,
                error = %e,
                "Invalid field value, storing null"
            );
        }
        CellIssue::Unresolved(e) => {
            report.unresolved_references += 1;
            debug!(
                format = schema.code(),
                field = label,
                line = line,
                error = %e,
                "Unresolved reference, storing null"
            );
        }
    }
}
