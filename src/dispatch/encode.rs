//! JSON encoding of dispatched results
//!
//! Tables are emitted either as a list of row mappings (`rows`, the default)
//! or as a mapping of column name to values (`columns`). Masked entries become
//! `null`. With strict encoding off, values that have no JSON form fall back
//! to their repr instead of failing the call.

use serde_json::{Map, Number, Value};
use thiserror::Error;

use super::args::ArgValue;
use super::value::{ApiValue, Table};

/// Shape selector for tabular results
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Rows,
    Columns,
    /// Anything else; only an error once a table is actually encoded
    Invalid(String),
}

impl TableFormat {
    /// Interpret the `table_format` request argument; falsy means default
    pub fn from_arg(arg: Option<&ArgValue>) -> Self {
        match arg {
            None => Self::Rows,
            Some(a) if !a.is_truthy() => Self::Rows,
            Some(ArgValue::Str(s)) if s == "rows" => Self::Rows,
            Some(ArgValue::Str(s)) if s == "columns" => Self::Columns,
            Some(ArgValue::Str(s)) => Self::Invalid(s.clone()),
            Some(other) => Self::Invalid(other.to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("Object of type {0} is not JSON serializable")]
    NotSerializable(String),

    #[error("'utf-8' codec can't decode byte string: {0}")]
    InvalidUtf8(String),

    #[error("table_format={0} not allowed")]
    TableFormat(String),
}

/// Converts [`ApiValue`]s to JSON under one request's encoding options
#[derive(Debug, Clone)]
pub struct Encoder {
    table_format: TableFormat,
    strict: bool,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(TableFormat::Rows, true)
    }
}

impl Encoder {
    pub const fn new(table_format: TableFormat, strict: bool) -> Self {
        Self {
            table_format,
            strict,
        }
    }

    pub fn encode(&self, value: &ApiValue) -> Result<Value, EncodeError> {
        Ok(match value {
            ApiValue::Null => Value::Null,
            ApiValue::Bool(b) => Value::Bool(*b),
            ApiValue::Int(i) => Value::from(*i),
            ApiValue::Float(x) => float(*x),
            ApiValue::Str(s) => Value::String(s.clone()),
            ApiValue::Bytes(bytes) => Value::String(
                String::from_utf8(bytes.clone())
                    .map_err(|e| EncodeError::InvalidUtf8(e.to_string()))?,
            ),
            ApiValue::List(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.encode(item))
                    .collect::<Result<_, _>>()?,
            ),
            ApiValue::Map(entries) => {
                let mut out = Map::with_capacity(entries.len());
                for (key, item) in entries {
                    out.insert(key.clone(), self.encode(item)?);
                }
                Value::Object(out)
            }
            ApiValue::Masked(masked) => {
                let data = masked
                    .data()
                    .iter()
                    .zip(masked.mask())
                    .map(|(item, &hidden)| {
                        if hidden {
                            Ok(Value::Null)
                        } else {
                            self.encode(item)
                        }
                    })
                    .collect::<Result<_, _>>()?;
                let mut out = Map::with_capacity(2);
                out.insert("data".to_string(), Value::Array(data));
                out.insert(
                    "mask".to_string(),
                    Value::Array(masked.mask().iter().map(|&m| Value::Bool(m)).collect()),
                );
                Value::Object(out)
            }
            ApiValue::Table(table) => self.encode_table(table)?,
            ApiValue::Opaque { type_name, repr } => {
                if self.strict {
                    return Err(EncodeError::NotSerializable(type_name.clone()));
                }
                Value::String(repr.clone())
            }
        })
    }

    fn encode_table(&self, table: &Table) -> Result<Value, EncodeError> {
        match &self.table_format {
            TableFormat::Columns => {
                let mut out = Map::with_capacity(table.columns().len());
                for column in table.columns() {
                    let cells = (0..table.len())
                        .map(|row| self.encode(&column.cell(row)))
                        .collect::<Result<_, _>>()?;
                    out.insert(column.name.clone(), Value::Array(cells));
                }
                Ok(Value::Object(out))
            }
            TableFormat::Rows => {
                let mut rows = Vec::with_capacity(table.len());
                for row in 0..table.len() {
                    let mut out = Map::with_capacity(table.columns().len());
                    for column in table.columns() {
                        out.insert(column.name.clone(), self.encode(&column.cell(row))?);
                    }
                    rows.push(Value::Object(out));
                }
                Ok(Value::Array(rows))
            }
            TableFormat::Invalid(name) => Err(EncodeError::TableFormat(name.clone())),
        }
    }
}

/// JSON has no NaN or infinity; those become null
fn float(x: f64) -> Value {
    Number::from_f64(x).map_or(Value::Null, Value::Number)
}
