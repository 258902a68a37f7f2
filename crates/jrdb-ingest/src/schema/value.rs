//! Typed cell values

use chrono::NaiveDate;
use uuid::Uuid;

/// Storage type of a column, used to bind typed nulls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    BigInt,
    Double,
    Text,
    Date,
    Bool,
    Uuid,
    BigIntArray,
    DoubleArray,
    TextArray,
}

impl ValueType {
    /// Whether values of this type can take part in a natural key
    pub fn is_keyable(self) -> bool {
        matches!(
            self,
            ValueType::BigInt
                | ValueType::Text
                | ValueType::Date
                | ValueType::Bool
                | ValueType::Uuid
        )
    }

    pub fn array_of(self) -> Option<ValueType> {
        match self {
            ValueType::BigInt => Some(ValueType::BigIntArray),
            ValueType::Double => Some(ValueType::DoubleArray),
            ValueType::Text => Some(ValueType::TextArray),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
    Id(Uuid),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Value::Id(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }
}

/// Hashable, ordered component of a natural key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Int(i64),
    Text(String),
    Date(NaiveDate),
    Bool(bool),
    Id(Uuid),
}

impl KeyPart {
    /// `None` for nulls and for values that cannot identify a row
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(KeyPart::Int(*v)),
            Value::Text(v) => Some(KeyPart::Text(v.clone())),
            Value::Date(v) => Some(KeyPart::Date(*v)),
            Value::Bool(v) => Some(KeyPart::Bool(*v)),
            Value::Id(v) => Some(KeyPart::Id(*v)),
            Value::Null | Value::Float(_) | Value::List(_) => None,
        }
    }
}

/// Ordered tuple of key parts identifying one row of an entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(pub Vec<KeyPart>);

impl NaturalKey {
    /// Builds a key only when every part is present
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Self> {
        values
            .into_iter()
            .map(KeyPart::from_value)
            .collect::<Option<Vec<_>>>()
            .map(NaturalKey)
    }
}
