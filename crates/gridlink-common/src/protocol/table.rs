//! Tagged-column result table.
//!
//! Procedure results and the client's statistics views are both expressed as
//! tables with a fixed, typed schema. Rows are validated against the schema
//! on insertion, so a table that deserialized successfully can be consumed
//! without per-cell type checks.

use serde::{Deserialize, Serialize};

use super::error::{GridlinkError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    BigInt,
    Integer,
    String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ColumnValue {
    BigInt(i64),
    Integer(i32),
    String(String),
}

impl ColumnValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnValue::BigInt(_) => ColumnType::BigInt,
            ColumnValue::Integer(_) => ColumnType::Integer,
            ColumnValue::String(_) => ColumnType::String,
        }
    }

    /// Numeric view of the cell; `None` for string cells.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::BigInt(v) => Some(*v),
            ColumnValue::Integer(v) => Some(i64::from(*v)),
            ColumnValue::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::BigInt(v)
    }
}

impl From<i32> for ColumnValue {
    fn from(v: i32) -> Self {
        ColumnValue::Integer(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::String(v.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::String(v)
    }
}

/// A table with a fixed column schema and schema-checked rows.
///
/// # Example
///
/// ```
/// use gridlink_common::{ColumnInfo, ColumnType, ResultTable};
///
/// let mut table = ResultTable::new(vec![
///     ColumnInfo::new("NAME", ColumnType::String),
///     ColumnInfo::new("COUNT", ColumnType::BigInt),
/// ]);
/// table.add_row(vec!["Vote".into(), 12i64.into()]).unwrap();
/// assert_eq!(table.row_count(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<Vec<ColumnValue>>,
}

impl ResultTable {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<ColumnValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(GridlinkError::Schema(format!(
                "expected {} columns, row has {}",
                self.columns.len(),
                row.len()
            )));
        }
        for (value, column) in row.iter().zip(&self.columns) {
            if value.column_type() != column.column_type {
                return Err(GridlinkError::Schema(format!(
                    "column {} expects {:?}, got {:?}",
                    column.name,
                    column.column_type,
                    value.column_type()
                )));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<ColumnValue>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Cell lookup by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&ColumnValue> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }
}
