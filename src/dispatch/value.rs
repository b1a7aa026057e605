//! Return-value model for dispatched functions
//!
//! Functions behind the allow-list hand back an [`ApiValue`]. Most variants
//! map straight onto JSON; tables, masked arrays, byte strings and opaque
//! objects need the encoder's rules to become JSON.

use std::fmt;

/// Value returned by a registered function
#[derive(Debug, Clone, PartialEq)]
pub enum ApiValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Byte string, emitted as UTF-8 text
    Bytes(Vec<u8>),
    /// Lists, tuples and n-d arrays (nested, row-major)
    List(Vec<ApiValue>),
    /// Mapping with insertion order preserved
    Map(Vec<(String, ApiValue)>),
    Masked(MaskedArray),
    Table(Table),
    /// Object with no JSON form, only a type name and a repr
    Opaque { type_name: String, repr: String },
}

/// One-dimensional array where `mask[i]` hides `data[i]`
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedArray {
    data: Vec<ApiValue>,
    mask: Vec<bool>,
}

impl MaskedArray {
    pub fn new(data: Vec<ApiValue>, mask: Vec<bool>) -> Result<Self, ShapeError> {
        if data.len() != mask.len() {
            return Err(ShapeError::MaskLength {
                name: None,
                expected: data.len(),
                found: mask.len(),
            });
        }
        Ok(Self { data, mask })
    }

    pub fn data(&self) -> &[ApiValue] {
        &self.data
    }

    pub fn mask(&self) -> &[bool] {
        &self.mask
    }
}

/// Named table column, optionally masked
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<ApiValue>,
    pub mask: Option<Vec<bool>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<ApiValue>) -> Self {
        Self {
            name: name.into(),
            values,
            mask: None,
        }
    }

    #[must_use]
    pub fn with_mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Cell value with masked entries read as null
    pub fn cell(&self, row: usize) -> ApiValue {
        let masked = self
            .mask
            .as_ref()
            .is_some_and(|m| m.get(row).copied().unwrap_or(false));
        if masked {
            ApiValue::Null
        } else {
            self.values.get(row).cloned().unwrap_or(ApiValue::Null)
        }
    }
}

/// Column-oriented table; every column has the same length
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    len: usize,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Result<Self, ShapeError> {
        let len = columns.first().map_or(0, |c| c.values.len());
        for column in &columns {
            if column.values.len() != len {
                return Err(ShapeError::ColumnLength {
                    name: column.name.clone(),
                    expected: len,
                    found: column.values.len(),
                });
            }
            if let Some(mask) = &column.mask {
                if mask.len() != len {
                    return Err(ShapeError::MaskLength {
                        name: Some(column.name.clone()),
                        expected: len,
                        found: mask.len(),
                    });
                }
            }
        }
        Ok(Self { columns, len })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub const fn len(&self) -> usize {
        self.len
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("column {name} has {found} values, expected {expected}")]
    ColumnLength {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("mask{} has {found} entries, expected {expected}", .name.as_ref().map(|n| format!(" of {n}")).unwrap_or_default())]
    MaskLength {
        name: Option<String>,
        expected: usize,
        found: usize,
    },
}

impl From<serde_json::Value> for ApiValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or(f64::NAN)), Self::Int),
            Value::String(s) => Self::Str(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

impl fmt::Display for ApiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque { repr, .. } => f.write_str(repr),
            Self::Table(t) => write!(f, "<Table length={}>", t.len()),
            other => write!(f, "{other:?}"),
        }
    }
}
