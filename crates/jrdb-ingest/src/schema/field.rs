//! Field declarations

use std::fmt;

use crate::entity::EntityKind;

use super::value::{Value, ValueType};

/// Column-wise computation for derived fields. Receives the already typed
/// input columns (same length, one entry per record) and returns the output
/// column.
pub type DeriveFn = fn(&[&[Value]]) -> Vec<Value>;

/// Largest supported implied-decimal scale
pub const MAX_SCALE: u32 = 9;

#[derive(Clone)]
pub enum FieldKind {
    Integer,
    /// Fixed-point number. Digits without a decimal point carry `scale`
    /// implied decimals ("123" with scale 1 is 12.3).
    Float {
        scale: u32,
    },
    String,
    Date {
        format: &'static str,
    },
    Boolean {
        true_literal: &'static str,
        false_literal: &'static str,
    },
    /// Closed code table mapping raw codes to symbolic values
    Choice {
        codes: &'static [(&'static str, &'static str)],
    },
    /// Natural code resolved to the surrogate id of a reference row
    ForeignKey {
        table: &'static str,
        natural_key: &'static str,
    },
    Array {
        element: &'static FieldKind,
        element_width: usize,
        count: usize,
    },
    /// Computed from earlier fields, reads no bytes
    Derived {
        inputs: &'static [&'static str],
        output: ValueType,
        compute: DeriveFn,
    },
}

impl FieldKind {
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Float { .. } => "float",
            FieldKind::String => "string",
            FieldKind::Date { .. } => "date",
            FieldKind::Boolean { .. } => "boolean",
            FieldKind::Choice { .. } => "choice",
            FieldKind::ForeignKey { .. } => "foreign_key",
            FieldKind::Array { .. } => "array",
            FieldKind::Derived { .. } => "derived",
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            FieldKind::Integer => ValueType::BigInt,
            FieldKind::Float { .. } => ValueType::Double,
            FieldKind::String | FieldKind::Choice { .. } => ValueType::Text,
            FieldKind::Date { .. } => ValueType::Date,
            FieldKind::Boolean { .. } => ValueType::Bool,
            FieldKind::ForeignKey { .. } => ValueType::Uuid,
            FieldKind::Array { element, .. } => element
                .value_type()
                .array_of()
                .unwrap_or(ValueType::TextArray),
            FieldKind::Derived { output, .. } => *output,
        }
    }

    /// Scalar kinds are the ones allowed as array elements
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldKind::Integer | FieldKind::Float { .. } | FieldKind::String
        )
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Float { scale } => write!(f, "Float(scale={})", scale),
            FieldKind::Date { format } => write!(f, "Date({})", format),
            FieldKind::Array {
                element,
                element_width,
                count,
            } => write!(f, "Array({:?} x {} @ {})", element, count, element_width),
            FieldKind::ForeignKey { table, natural_key } => {
                write!(f, "ForeignKey({}.{})", table, natural_key)
            }
            FieldKind::Derived { inputs, output, .. } => {
                write!(f, "Derived({:?} -> {:?})", inputs, output)
            }
            other => f.write_str(other.name()),
        }
    }
}

/// Entity-qualified attribute a field writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    pub entity: EntityKind,
    pub attribute: &'static str,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.attribute)
    }
}

#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub label: &'static str,
    /// 0-based byte offset into the encoded line
    pub byte_start: usize,
    pub byte_width: usize,
    pub kind: FieldKind,
    pub target: Option<Target>,
    declared_start: usize,
}

impl FieldSchema {
    /// `start` is the 1-based byte position printed in the layout documents
    pub fn new(label: &'static str, start: usize, width: usize, kind: FieldKind) -> Self {
        Self {
            label,
            byte_start: start.saturating_sub(1),
            byte_width: width,
            kind,
            target: None,
            declared_start: start,
        }
    }

    /// Repeated fixed-width sub-cells. The total width follows from the
    /// element width and count.
    pub fn array(
        label: &'static str,
        start: usize,
        element: &'static FieldKind,
        element_width: usize,
        count: usize,
    ) -> Self {
        Self::new(
            label,
            start,
            element_width * count,
            FieldKind::Array {
                element,
                element_width,
                count,
            },
        )
    }

    pub fn derived(
        label: &'static str,
        inputs: &'static [&'static str],
        output: ValueType,
        compute: DeriveFn,
    ) -> Self {
        Self {
            label,
            byte_start: 0,
            byte_width: 0,
            kind: FieldKind::Derived {
                inputs,
                output,
                compute,
            },
            target: None,
            declared_start: 0,
        }
    }

    /// Route the field's value to `entity.attribute`
    pub fn to(mut self, entity: EntityKind, attribute: &'static str) -> Self {
        self.target = Some(Target { entity, attribute });
        self
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.kind, FieldKind::Derived { .. })
    }

    pub fn end(&self) -> usize {
        self.byte_start + self.byte_width
    }

    pub fn repeat_count(&self) -> Option<usize> {
        match self.kind {
            FieldKind::Array { count, .. } => Some(count),
            _ => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        self.kind.value_type()
    }

    pub(crate) fn declared_start(&self) -> usize {
        self.declared_start
    }
}
