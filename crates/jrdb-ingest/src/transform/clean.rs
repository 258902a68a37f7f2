//! Per-kind cell parsing

use chrono::NaiveDate;

use jrdb_common::text::trim_padding;

use crate::decoder::RawCell;
use crate::error::{FieldParseError, ForeignKeyUnresolved};
use crate::lookup::ReferenceLookup;
use crate::schema::{FieldKind, Value};

/// Why a non-empty cell ended up null
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellIssue {
    Parse(FieldParseError),
    Unresolved(ForeignKeyUnresolved),
}

/// Outcome of parsing one cell: the value plus any issues met on the way.
/// Arrays can carry several issues, one per bad sub-cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub value: Value,
    pub issues: Vec<CellIssue>,
}

impl Parsed {
    fn ok(value: Value) -> Self {
        Self {
            value,
            issues: Vec::new(),
        }
    }
}

/// Parse a raw cell according to its field kind
pub fn parse_cell(kind: &FieldKind, cell: &RawCell, lookup: &dyn ReferenceLookup) -> Parsed {
    match (kind, cell) {
        (
            FieldKind::Array {
                element, count, ..
            },
            RawCell::List(items),
        ) => {
            let mut issues = Vec::new();
            let mut values = Vec::with_capacity(*count);
            for item in items {
                match parse_scalar(element, item, lookup) {
                    Ok(v) => values.push(v),
                    Err(issue) => {
                        issues.push(issue);
                        values.push(Value::Null);
                    }
                }
            }
            Parsed {
                value: Value::List(values),
                issues,
            }
        }
        (_, RawCell::Scalar(raw)) => match parse_scalar(kind, raw, lookup) {
            Ok(v) => Parsed::ok(v),
            Err(issue) => Parsed {
                value: Value::Null,
                issues: vec![issue],
            },
        },
        _ => Parsed::ok(Value::Null),
    }
}

/// Parse one scalar cell. Blank cells are null for every kind.
pub fn parse_scalar(
    kind: &FieldKind,
    raw: &str,
    lookup: &dyn ReferenceLookup,
) -> Result<Value, CellIssue> {
    let trimmed = trim_padding(raw);
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    match kind {
        FieldKind::Integer => parse_integer(trimmed).map(Value::Int).map_err(CellIssue::Parse),
        FieldKind::Float { scale } => parse_fixed_point(trimmed, *scale)
            .map(Value::Float)
            .map_err(CellIssue::Parse),
        FieldKind::String => Ok(Value::Text(trimmed.to_string())),
        FieldKind::Date { format } => NaiveDate::parse_from_str(trimmed, format)
            .map(Value::Date)
            .map_err(|_| {
                CellIssue::Parse(FieldParseError::Date {
                    raw: trimmed.to_string(),
                    format: *format,
                })
            }),
        FieldKind::Boolean {
            true_literal,
            false_literal,
        } => {
            if trimmed == *true_literal {
                Ok(Value::Bool(true))
            } else if trimmed == *false_literal {
                Ok(Value::Bool(false))
            } else {
                Err(CellIssue::Parse(FieldParseError::Boolean {
                    raw: trimmed.to_string(),
                    true_literal: *true_literal,
                    false_literal: *false_literal,
                }))
            }
        }
        FieldKind::Choice { codes } => codes
            .iter()
            .find(|(code, _)| *code == trimmed)
            .map(|(_, symbol)| Value::Text(symbol.to_string()))
            .ok_or_else(|| {
                CellIssue::Parse(FieldParseError::Choice {
                    raw: trimmed.to_string(),
                })
            }),
        FieldKind::ForeignKey { table, natural_key } => lookup
            .lookup(table, trimmed)
            .map(Value::Id)
            .ok_or_else(|| {
                CellIssue::Unresolved(ForeignKeyUnresolved {
                    entity: *table,
                    natural_key: *natural_key,
                    code: trimmed.to_string(),
                })
            }),
        // Validation keeps these out of scalar positions
        FieldKind::Array { .. } | FieldKind::Derived { .. } => Ok(Value::Null),
    }
}

fn parse_integer(trimmed: &str) -> Result<i64, FieldParseError> {
    trimmed.parse::<i64>().map_err(|_| FieldParseError::Integer {
        raw: trimmed.to_string(),
    })
}

/// Digits carry `scale` implied decimals unless the cell spells out a point
fn parse_fixed_point(trimmed: &str, scale: u32) -> Result<f64, FieldParseError> {
    let err = || FieldParseError::Float {
        raw: trimmed.to_string(),
    };

    if trimmed.contains('.') {
        let value = trimmed.parse::<f64>().map_err(|_| err())?;
        return if value.is_finite() { Ok(value) } else { Err(err()) };
    }

    let digits = trimmed.parse::<i64>().map_err(|_| err())?;
    Ok(digits as f64 / 10f64.powi(scale as i32))
}

/// Render a value the way a fixed-point cell of `width` bytes stores it:
/// zero-padded digits with `scale` implied decimals. `None` when the value
/// does not fit.
pub fn encode_fixed_point(value: f64, scale: u32, width: usize) -> Option<String> {
    let scaled = (value * 10f64.powi(scale as i32)).round();
    if !scaled.is_finite() {
        return None;
    }
    let text = format!("{:0width$}", scaled as i64, width = width);
    (text.len() == width).then_some(text)
}
