//! Result encoder - typed cells and boundary-safe result sets.
//!
//! Query results are materialized fully before they cross the boundary and
//! serialized as a self-describing JSON payload. Cells are tagged with
//! their type so the host side can reconstruct exactly what the kernel
//! returned, including blobs and column order.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// A single typed cell value.
///
/// Mirrors the kernel's value domain: 64-bit integers, doubles, UTF-8
/// text, raw blobs, and SQL NULL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<libsql::Value> for CellValue {
    fn from(value: libsql::Value) -> Self {
        match value {
            libsql::Value::Null => CellValue::Null,
            libsql::Value::Integer(i) => CellValue::Integer(i),
            libsql::Value::Real(r) => CellValue::Real(r),
            libsql::Value::Text(s) => CellValue::Text(s),
            libsql::Value::Blob(b) => CellValue::Blob(b),
        }
    }
}

/// A fully materialized query result.
///
/// `columns` preserves statement column order; every row holds exactly
/// `columns.len()` cells in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    /// Column names in statement order
    pub columns: Vec<String>,
    /// Row-major cell values
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    /// Create an empty result set with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    /// Number of rows in the set.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Serialize to the boundary JSON payload.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Encode(e.to_string()))
    }

    /// Parse a boundary JSON payload back into a result set.
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| Error::Encode(e.to_string()))
    }
}
