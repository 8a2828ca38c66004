//! Mapped data types and runtime values shared across the translation pipeline.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The mapped type of a property, selection, or bind parameter.
///
/// Types are resolved during semantic analysis; SQL generation never sees an
/// unresolved type. Entity-valued expressions (a whole mapped object, or an
/// association endpoint) carry the entity name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Integer,
    Long,
    Double,
    Decimal,
    Text,
    Date,
    Time,
    Timestamp,
    Bytea,
    /// A mapped entity (or to-one association endpoint).
    Entity(String),
}

impl DataType {
    /// Whether a value of `self` may be assigned to a slot of type `target`
    /// without an explicit cast. Numeric widening is allowed; everything else
    /// requires an exact match.
    pub fn assignable_to(&self, target: &DataType) -> bool {
        use DataType::*;
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (Integer, Long)
                | (Integer, Double)
                | (Integer, Decimal)
                | (Long, Double)
                | (Long, Decimal)
                | (Double, Decimal)
        )
    }

    /// Whether the type is numeric (participates in arithmetic).
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::Integer | DataType::Long | DataType::Double | DataType::Decimal
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "boolean"),
            DataType::Integer => write!(f, "integer"),
            DataType::Long => write!(f, "long"),
            DataType::Double => write!(f, "double"),
            DataType::Decimal => write!(f, "decimal"),
            DataType::Text => write!(f, "text"),
            DataType::Date => write!(f, "date"),
            DataType::Time => write!(f, "time"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::Bytea => write!(f, "bytea"),
            DataType::Entity(name) => write!(f, "entity({name})"),
        }
    }
}

/// A runtime value: filter-parameter arguments and folded query constants.
///
/// The translator never evaluates expressions; values only flow through it as
/// opaque constants that eventually render as SQL literals or bind arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    Decimal(Decimal),
    Str(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// The mapped type of the value, or `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Bool),
            Value::Integer(_) => Some(DataType::Long),
            Value::Double(_) => Some(DataType::Double),
            Value::Decimal(_) => Some(DataType::Decimal),
            Value::Str(_) => Some(DataType::Text),
            Value::Date(_) => Some(DataType::Date),
            Value::Time(_) => Some(DataType::Time),
            Value::Timestamp(_) => Some(DataType::Timestamp),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Double(d) => write!(f, "{d}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Str(s) => write!(f, "'{s}'"),
            Value::Date(d) => write!(f, "'{d}'"),
            Value::Time(t) => write!(f, "'{t}'"),
            Value::Timestamp(ts) => write!(f, "'{ts}'"),
        }
    }
}
