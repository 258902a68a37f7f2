//! Mode consensus over grouped rows
//!
//! Some per-race attributes are repeated on every contender line and
//! occasionally disagree. For each group of rows sharing the same key the
//! most frequent non-null value wins and is written back to every row of the
//! group. Ties go to the value seen first in file order.

use std::collections::HashMap;

use tracing::debug;

use crate::schema::{ConsensusRule, KeyPart, SchemaSet, Value};

/// Most frequent non-null value, first-seen on ties. `None` when every value
/// is null.
pub fn mode<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<&'a Value> {
    // Linear tally keeps floats comparable without hashing them
    let mut tally: Vec<(&Value, usize)> = Vec::new();
    for value in values.into_iter().filter(|v| !v.is_null()) {
        match tally.iter_mut().find(|(seen, _)| *seen == value) {
            Some((_, count)) => *count += 1,
            None => tally.push((value, 1)),
        }
    }

    let mut best: Option<(&Value, usize)> = None;
    for (value, count) in tally {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

/// Apply every consensus rule of `schema` to the typed columns in place.
/// Returns how many cells were rewritten.
pub fn apply(schema: &SchemaSet, columns: &mut [Vec<Value>]) -> usize {
    schema
        .consensus()
        .iter()
        .map(|rule| apply_rule(schema, rule, columns))
        .sum()
}

fn apply_rule(schema: &SchemaSet, rule: &ConsensusRule, columns: &mut [Vec<Value>]) -> usize {
    let group_cols: Vec<usize> = rule
        .group_by
        .iter()
        .filter_map(|label| schema.position(label))
        .collect();
    let target_cols: Vec<usize> = rule
        .fields
        .iter()
        .filter_map(|label| schema.position(label))
        .collect();

    let rows = columns.first().map_or(0, Vec::len);
    let mut order: Vec<Vec<KeyPart>> = Vec::new();
    let mut groups: HashMap<Vec<KeyPart>, Vec<usize>> = HashMap::new();

    for row in 0..rows {
        // Rows with an incomplete group key are left as they are
        let Some(key) = group_cols
            .iter()
            .map(|col| KeyPart::from_value(&columns[*col][row]))
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }

    let mut rewritten = 0;
    for key in &order {
        let Some(members) = groups.get(key) else {
            continue;
        };
        for col in &target_cols {
            let column = &mut columns[*col];
            let Some(winner) = mode(members.iter().map(|row| &column[*row])).cloned() else {
                continue;
            };
            for row in members {
                if column[*row] != winner {
                    column[*row] = winner.clone();
                    rewritten += 1;
                }
            }
        }
    }

    if rewritten > 0 {
        debug!(
            format = schema.code(),
            groups = order.len(),
            rewritten = rewritten,
            "Applied consensus"
        );
    }

    rewritten
}
