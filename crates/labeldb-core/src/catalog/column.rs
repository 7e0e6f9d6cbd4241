//! Column definitions and typed value conversion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Boolean.
    Boolean,
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 text.
    Text,
    /// Binary data.
    Bytes,
}

impl ColumnType {
    /// Convert a value for storage in a column of this type.
    ///
    /// Null passes through; nullability is checked separately. Returns
    /// `None` if the value cannot be represented.
    pub fn convert(&self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (ColumnType::Boolean, v @ Value::Bool(_)) => Some(v),
            (ColumnType::Int64, v @ Value::Int64(_)) => Some(v),
            (ColumnType::Float64, v @ Value::Float64(_)) => Some(v),
            (ColumnType::Float64, Value::Int64(i)) => Some(Value::Float64(i as f64)),
            (ColumnType::Text, v @ Value::String(_)) => Some(v),
            (ColumnType::Bytes, v @ Value::Bytes(_)) => Some(v),
            _ => None,
        }
    }

    /// Parse a textual literal into a value of this type.
    ///
    /// The literal `NULL` (any case) yields `Value::Null`.
    pub fn parse_literal(&self, literal: &str) -> Option<Value> {
        if literal.eq_ignore_ascii_case("null") {
            return Some(Value::Null);
        }
        match self {
            ColumnType::Boolean => literal.parse::<bool>().ok().map(Value::Bool),
            ColumnType::Int64 => literal.parse::<i64>().ok().map(Value::Int64),
            ColumnType::Float64 => literal.parse::<f64>().ok().map(Value::Float64),
            ColumnType::Text => Some(Value::String(literal.to_string())),
            ColumnType::Bytes => {
                let digits = literal.strip_prefix("0x").unwrap_or(literal);
                hex::decode(digits).ok().map(Value::Bytes)
            }
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Text => "text",
            ColumnType::Bytes => "bytes",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(ColumnType::Boolean),
            "int" | "integer" | "bigint" | "long" | "int64" => Ok(ColumnType::Int64),
            "float" | "double" | "real" | "float64" => Ok(ColumnType::Float64),
            "text" | "string" | "varchar" => Ok(ColumnType::Text),
            "bytes" | "binary" | "blob" => Ok(ColumnType::Bytes),
            other => Err(format!("unknown column type '{}'", other)),
        }
    }
}

fn default_nullable() -> bool {
    true
}

/// A column definition within a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub column_type: ColumnType,
    /// Whether null is accepted.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    /// Value written when an insert omits the column.
    #[serde(default)]
    pub default: Option<Value>,
    /// Column takes the row id assigned on insert.
    #[serde(default)]
    pub identity: bool,
}

impl ColumnDef {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
            identity: false,
        }
    }

    /// Mark the column as non-nullable.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Mark the column as an identity column. Identity columns are non-nullable.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self
    }
}
