//! Dataset persistence
//!
//! The engine only needs two operations from storage: load a named dataset as
//! a table plus its metadata dictionary, and write one back. [`DatasetStore`]
//! is that seam; [`JsonDatasetStore`] keeps datasets as JSON documents:
//!
//! ```json
//! {
//!   "columns": ["ID", "G126_IPAQ_VIG_W"],
//!   "metadata": { "G126_IPAQ_VIG_W": { "label": "...", ... } },
//!   "records": [ { "ID": 1, "G126_IPAQ_VIG_W": 1 } ]
//! }
//! ```
//!
//! Record keys absent from `columns` are appended after the listed columns.

use crate::error::HarmoniseError;
use crate::metadata::MetadataMap;
use crate::table::{ColumnData, Table};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Load and persist datasets
pub trait DatasetStore {
    /// Load dataset file `name` from directory `location`
    fn load(&self, name: &str, location: &Path) -> Result<(Table, MetadataMap), HarmoniseError>;

    /// Persist a table and its metadata to `destination`
    fn write(
        &self,
        destination: &Path,
        table: &Table,
        metadata: &MetadataMap,
    ) -> Result<(), HarmoniseError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DatasetDocument {
    #[serde(default)]
    columns: Vec<String>,
    #[serde(default)]
    metadata: MetadataMap,
    #[serde(default)]
    records: Vec<Map<String, Value>>,
}

/// JSON-backed dataset store
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDatasetStore;

impl JsonDatasetStore {
    pub fn path(name: &str, location: &Path) -> PathBuf {
        location.join(name)
    }

    /// Decode a dataset document
    pub fn from_json(json: &str) -> Result<(Table, MetadataMap), HarmoniseError> {
        let document: DatasetDocument = serde_json::from_str(json)?;

        let mut names = document.columns;
        if names.is_empty() {
            if let Some(first) = document.records.first() {
                names = first.keys().cloned().collect();
            }
        }

        let mut unlisted: Vec<String> = Vec::new();
        for key in document.records.iter().flat_map(|r| r.keys()) {
            if !names.contains(key) && !unlisted.contains(key) {
                unlisted.push(key.clone());
            }
        }
        if !unlisted.is_empty() {
            warn!(columns = ?unlisted, "record keys missing from the column list, appending them");
            names.extend(unlisted);
        }

        let mut table = Table::new(document.records.len());
        for name in names {
            let data = decode_column(&name, &document.records)?;
            table.push_column(name, data)?;
        }
        Ok((table, document.metadata))
    }

    /// Encode a dataset document
    pub fn to_json(table: &Table, metadata: &MetadataMap) -> Result<String, HarmoniseError> {
        let records = (0..table.row_count())
            .map(|row| {
                table
                    .columns()
                    .iter()
                    .map(|column| (column.name.clone(), encode_cell(&column.data, row)))
                    .collect()
            })
            .collect();
        let document = DatasetDocument {
            columns: table.column_names().map(str::to_string).collect(),
            metadata: metadata.clone(),
            records,
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }
}

impl DatasetStore for JsonDatasetStore {
    fn load(&self, name: &str, location: &Path) -> Result<(Table, MetadataMap), HarmoniseError> {
        let path = Self::path(name, location);
        debug!(path = %path.display(), "loading dataset");
        let json = std::fs::read_to_string(&path)?;
        Self::from_json(&json)
    }

    fn write(
        &self,
        destination: &Path,
        table: &Table,
        metadata: &MetadataMap,
    ) -> Result<(), HarmoniseError> {
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = Self::to_json(table, metadata)?;
        std::fs::write(destination, json)?;
        debug!(
            path = %destination.display(),
            rows = table.row_count(),
            columns = table.column_count(),
            "dataset written"
        );
        Ok(())
    }
}

static NULL: Value = Value::Null;

fn decode_column(name: &str, records: &[Map<String, Value>]) -> Result<ColumnData, HarmoniseError> {
    let cells: Vec<&Value> = records
        .iter()
        .map(|r| r.get(name).unwrap_or(&NULL))
        .collect();

    let mixed = || HarmoniseError::ColumnType {
        column: name.to_string(),
        expected: "numbers or strings, not both".to_string(),
    };

    if cells.iter().any(|v| v.is_string()) {
        let values = cells
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(Some(s.clone())),
                Value::Null => Ok(None),
                _ => Err(mixed()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(ColumnData::Text(values));
    }

    let values = cells
        .iter()
        .map(|v| match v {
            Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| {
                HarmoniseError::ParseError(format!("{}: number out of range", name))
            }),
            Value::Null => Ok(None),
            other => Err(HarmoniseError::ParseError(format!(
                "{}: unsupported value {}",
                name, other
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ColumnData::Numeric(values))
}

fn encode_cell(data: &ColumnData, row: usize) -> Value {
    match data {
        ColumnData::Numeric(values) => match values[row] {
            Some(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => Value::Number(Number::from(v as i64)),
            Some(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
            None => Value::Null,
        },
        ColumnData::Text(values) => values[row].clone().map(Value::String).unwrap_or(Value::Null),
    }
}
