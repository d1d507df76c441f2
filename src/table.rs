//! Columnar table abstraction
//!
//! Survey datasets are held in memory as ordered, equal-length named columns.
//! Every harmonisation stage reads whole columns, computes row-wise, and writes
//! whole columns back, so there is no row-level mutation API.

use crate::error::HarmoniseError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Values of a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(values) => values.len(),
            ColumnData::Text(values) => values.len(),
        }
    }

    fn reorder(&mut self, order: &[usize]) {
        match self {
            ColumnData::Numeric(values) => {
                *values = order.iter().map(|&i| values[i]).collect();
            }
            ColumnData::Text(values) => {
                *values = order.iter().map(|&i| values[i].clone()).collect();
            }
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// Ordered collection of equal-length named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Create an empty table with a fixed row count
    pub fn new(rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            rows,
        }
    }

    /// Build a table from numeric columns, in the given order
    pub fn from_numeric<S: Into<String>>(
        columns: Vec<(S, Vec<Option<f64>>)>,
    ) -> Result<Self, HarmoniseError> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut table = Table::new(rows);
        for (name, values) in columns {
            table.push_column(name.into(), ColumnData::Numeric(values))?;
        }
        Ok(table)
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.position(name).map(|i| &self.columns[i])
    }

    /// Append a column; an existing column with the same name is replaced in place
    pub fn push_column(&mut self, name: String, data: ColumnData) -> Result<(), HarmoniseError> {
        if self.columns.is_empty() && self.rows == 0 {
            self.rows = data.len();
        }
        if data.len() != self.rows {
            return Err(HarmoniseError::ParseError(format!(
                "column {} has {} rows, table has {}",
                name,
                data.len(),
                self.rows
            )));
        }
        match self.position(&name) {
            Some(i) => self.columns[i].data = data,
            None => self.columns.push(Column { name, data }),
        }
        Ok(())
    }

    /// Borrow a numeric column
    pub fn numeric(&self, name: &str) -> Result<&[Option<f64>], HarmoniseError> {
        match self.column(name) {
            Some(Column {
                data: ColumnData::Numeric(values),
                ..
            }) => Ok(values),
            Some(_) => Err(HarmoniseError::ColumnType {
                column: name.to_string(),
                expected: "numeric".to_string(),
            }),
            None => Err(HarmoniseError::MissingColumn(name.to_string())),
        }
    }

    /// Owned copy of a numeric column, or an all-null column if it does not exist yet
    pub fn numeric_or_null(&self, name: &str) -> Result<Vec<Option<f64>>, HarmoniseError> {
        if self.contains(name) {
            Ok(self.numeric(name)?.to_vec())
        } else {
            Ok(vec![None; self.rows])
        }
    }

    /// Single numeric cell; absent columns and text columns read as null
    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        match self.column(name) {
            Some(Column {
                data: ColumnData::Numeric(values),
                ..
            }) => values.get(row).copied().flatten(),
            _ => None,
        }
    }

    /// Replace (or append) a numeric column
    pub fn set_numeric(&mut self, name: &str, values: Vec<Option<f64>>) -> Result<(), HarmoniseError> {
        if let Some(Column {
            data: ColumnData::Text(_),
            ..
        }) = self.column(name)
        {
            return Err(HarmoniseError::ColumnType {
                column: name.to_string(),
                expected: "numeric".to_string(),
            });
        }
        self.push_column(name.to_string(), ColumnData::Numeric(values))
    }

    /// Remove columns by name, returning the names that were actually present
    pub fn drop_columns(&mut self, names: &[String]) -> Vec<String> {
        let mut dropped = Vec::new();
        self.columns.retain(|c| {
            if names.contains(&c.name) {
                dropped.push(c.name.clone());
                false
            } else {
                true
            }
        });
        dropped
    }

    /// Rename columns, returning the number of columns renamed
    pub fn rename_columns(&mut self, renames: &BTreeMap<String, String>) -> usize {
        let mut renamed = 0;
        for column in &mut self.columns {
            if let Some(new_name) = renames.get(&column.name) {
                column.name = new_name.clone();
                renamed += 1;
            }
        }
        renamed
    }

    /// Stable sort of all rows by one column; nulls sort last
    pub fn sort_by_key(&mut self, name: &str) -> Result<(), HarmoniseError> {
        let key = self
            .column(name)
            .ok_or_else(|| HarmoniseError::MissingColumn(name.to_string()))?
            .data
            .clone();

        let mut order: Vec<usize> = (0..self.rows).collect();
        match &key {
            ColumnData::Numeric(values) => order.sort_by(|&a, &b| {
                compare_nullable(values[a], values[b], |x, y| {
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                })
            }),
            ColumnData::Text(values) => order.sort_by(|&a, &b| {
                compare_nullable(values[a].as_ref(), values[b].as_ref(), |x, y| x.cmp(y))
            }),
        }

        for column in &mut self.columns {
            column.data.reorder(&order);
        }
        Ok(())
    }

    /// Human-readable identifier of a row, used in validation reports
    pub fn row_key(&self, key_column: &str, row: usize) -> Option<String> {
        match &self.column(key_column)?.data {
            ColumnData::Numeric(values) => values.get(row).copied().flatten().map(format_number),
            ColumnData::Text(values) => values.get(row).cloned().flatten(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

fn compare_nullable<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(T, T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Render integral values without a trailing `.0`
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
