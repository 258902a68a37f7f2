//! Built-in computations for derived fields
//!
//! Each function receives the typed input columns of a file and returns the
//! derived column, so computations may look across rows.

use crate::schema::Value;

/// Fill nulls with zero, but only when at least one row carries a value.
/// A column that is blank throughout stays null.
pub fn zero_when_blank_if_any(inputs: &[&[Value]]) -> Vec<Value> {
    let Some(column) = inputs.first() else {
        return Vec::new();
    };

    let zero = match column.iter().find(|v| !v.is_null()) {
        Some(Value::Float(_)) => Value::Float(0.0),
        Some(_) => Value::Int(0),
        None => return column.to_vec(),
    };

    column
        .iter()
        .map(|v| if v.is_null() { zero.clone() } else { v.clone() })
        .collect()
}

/// Same values under another attribute
pub fn copy(inputs: &[&[Value]]) -> Vec<Value> {
    inputs.first().map(|c| c.to_vec()).unwrap_or_default()
}

/// `MSST` integers (minutes, seconds, tenths) to seconds, e.g. 1345 is 94.5
pub fn minutes_seconds_tenths(inputs: &[&[Value]]) -> Vec<Value> {
    let Some(column) = inputs.first() else {
        return Vec::new();
    };

    column
        .iter()
        .map(|v| match v.as_i64() {
            Some(raw) if raw > 0 => {
                let minutes = raw / 1000;
                let tenths = raw % 1000;
                Value::Float(minutes as f64 * 60.0 + tenths as f64 / 10.0)
            }
            _ => Value::Null,
        })
        .collect()
}
