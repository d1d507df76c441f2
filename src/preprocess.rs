//! Interim preprocessing
//!
//! Reconciles a source dataset with the canonical schema before the harmoniser
//! sees it: legacy columns are dropped, legacy names are mapped to canonical
//! ones (in the table and in the metadata dictionary) and rows are sorted by
//! the record identifier.

use crate::config::DatasetConfig;
use crate::error::HarmoniseError;
use crate::metadata::MetadataMap;
use crate::table::Table;
use tracing::{debug, info};

/// Record identifier column
pub const ID_COLUMN: &str = "ID";

/// Summary of one preprocessing run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreprocessSummary {
    pub dropped: Vec<String>,
    pub renamed: usize,
    pub sorted: bool,
}

/// Apply a dataset's delete and rename lists and sort by [`ID_COLUMN`]
pub fn preprocess(
    table: &mut Table,
    metadata: &mut MetadataMap,
    dataset: &DatasetConfig,
) -> Result<PreprocessSummary, HarmoniseError> {
    let dropped = table.drop_columns(&dataset.delete);
    for name in dataset.delete.iter().filter(|n| !dropped.contains(n)) {
        debug!(dataset = %dataset.name, column = %name, "column to delete is absent");
    }
    for name in &dropped {
        metadata.remove(name);
    }

    for (legacy, canonical) in &dataset.rename {
        if !table.contains(legacy) {
            debug!(dataset = %dataset.name, column = %legacy, "column to rename is absent");
        } else if table.contains(canonical) {
            return Err(HarmoniseError::InvalidConfig(format!(
                "{}: renaming {} would overwrite existing column {}",
                dataset.name, legacy, canonical
            )));
        }
    }
    let renamed = table.rename_columns(&dataset.rename);
    *metadata = std::mem::take(metadata)
        .into_iter()
        .map(|(name, descriptor)| match dataset.rename.get(&name) {
            Some(canonical) => (canonical.clone(), descriptor),
            None => (name, descriptor),
        })
        .collect();

    let sorted = table.contains(ID_COLUMN);
    if sorted {
        table.sort_by_key(ID_COLUMN)?;
    } else {
        debug!(dataset = %dataset.name, "no ID column, row order kept");
    }

    info!(
        dataset = %dataset.name,
        dropped = dropped.len(),
        renamed,
        "interim dataset prepared"
    );
    Ok(PreprocessSummary {
        dropped,
        renamed,
        sorted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Layout;
    use crate::metadata::{FieldDescriptor, FieldType, MeasureLevel};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn dataset() -> DatasetConfig {
        let mut rename = BTreeMap::new();
        rename.insert("G126_VIG_MET".to_string(), "G126_IPAQ_VIG_MET".to_string());
        rename.insert("G126_GONE".to_string(), "G126_IPAQ_GONE".to_string());
        DatasetConfig {
            name: "G126".to_string(),
            prefix: "G126".to_string(),
            file: "G126.json".to_string(),
            layout: Layout::Wide,
            repair_sitting: true,
            rename,
            delete: vec!["G126_SIT_WD_TRUNC".to_string(), "G126_ABSENT".to_string()],
        }
    }

    fn descriptor(label: &str) -> FieldDescriptor {
        FieldDescriptor {
            label: label.to_string(),
            field_type: FieldType::Numeric,
            value_labels: BTreeMap::new(),
            width: 5,
            decimals: 2,
            measure: MeasureLevel::Scale,
        }
    }

    #[test]
    fn test_drop_rename_and_sort() {
        let mut table = Table::from_numeric(vec![
            ("ID", vec![Some(20.0), Some(10.0)]),
            ("G126_VIG_MET", vec![Some(480.0), Some(0.0)]),
            ("G126_SIT_WD_TRUNC", vec![Some(300.0), Some(200.0)]),
        ])
        .unwrap();
        let mut metadata = MetadataMap::new();
        metadata.insert("G126_VIG_MET".to_string(), descriptor("vig"));
        metadata.insert("G126_SIT_WD_TRUNC".to_string(), descriptor("sit"));

        let summary = preprocess(&mut table, &mut metadata, &dataset()).unwrap();

        assert_eq!(summary.dropped, vec!["G126_SIT_WD_TRUNC".to_string()]);
        assert_eq!(summary.renamed, 1);
        assert!(summary.sorted);
        assert_eq!(
            table.column_names().collect::<Vec<_>>(),
            vec!["ID", "G126_IPAQ_VIG_MET"]
        );
        assert_eq!(table.numeric("ID").unwrap(), &[Some(10.0), Some(20.0)]);
        assert_eq!(table.numeric("G126_IPAQ_VIG_MET").unwrap(), &[Some(0.0), Some(480.0)]);
        assert_eq!(metadata.keys().collect::<Vec<_>>(), vec!["G126_IPAQ_VIG_MET"]);
    }

    #[test]
    fn test_rename_onto_existing_column_fails() {
        let mut table = Table::from_numeric(vec![
            ("G126_VIG_MET", vec![Some(1.0)]),
            ("G126_IPAQ_VIG_MET", vec![Some(2.0)]),
        ])
        .unwrap();
        let mut metadata = MetadataMap::new();
        assert!(matches!(
            preprocess(&mut table, &mut metadata, &dataset()),
            Err(HarmoniseError::InvalidConfig(_))
        ));
    }
}
