//! Field metadata
//!
//! Every dataset travels with a dictionary of per-column descriptors (label,
//! value coding, display width and precision, measurement level). Harmonised
//! columns get their descriptor from a curated catalog keyed by column
//! basename; all other columns keep the descriptor they arrived with.

use crate::catalog::Catalog;
use crate::derivation::ActivityLevel;
use crate::fields::{field_basename, strip_prefix, FieldKind};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column name -> descriptor
pub type MetadataMap = BTreeMap<String, FieldDescriptor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Numeric,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureLevel {
    Nominal,
    Ordinal,
    Scale,
}

/// Descriptor of one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub label: String,
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value_labels: BTreeMap<i64, String>,
    pub width: u16,
    pub decimals: u8,
    pub measure: MeasureLevel,
}

impl FieldDescriptor {
    fn numeric(label: String, width: u16, decimals: u8, measure: MeasureLevel) -> Self {
        Self {
            label,
            field_type: FieldType::Numeric,
            value_labels: BTreeMap::new(),
            width,
            decimals,
            measure,
        }
    }

    fn with_values(mut self, values: &[(i64, &str)]) -> Self {
        self.value_labels = values.iter().map(|(k, v)| (*k, v.to_string())).collect();
        self
    }

    fn yes_no(label: String) -> Self {
        Self::numeric(label, 1, 0, MeasureLevel::Nominal).with_values(&[(0, "No"), (1, "Yes")])
    }
}

/// Curated descriptors of every harmonised column of a layout, keyed by basename
pub fn curated_descriptors(catalog: &Catalog) -> MetadataMap {
    let met_decimals = catalog.met_decimals.min(u8::MAX as u32) as u8;
    let met = |label: String| FieldDescriptor::numeric(label, 5, met_decimals, MeasureLevel::Scale);
    let basename = |code: &str, kind| field_basename(catalog.layout, code, kind);
    let mut map = MetadataMap::new();

    for category in &catalog.categories {
        let label = category.label;
        let hours = format!("IPAQ - {} number of hours per day", label);
        let minutes = format!("IPAQ - {} number of minutes per day", label);
        map.insert(
            basename(category.code, FieldKind::HoursPerDay),
            FieldDescriptor::numeric(hours, 2, 0, MeasureLevel::Scale),
        );
        map.insert(
            basename(category.code, FieldKind::MinutesPerDay),
            FieldDescriptor::numeric(minutes, 2, 0, MeasureLevel::Scale),
        );

        if !category.is_activity() {
            let total = format!("IPAQ - {} total minutes per day - truncated <= 960mins", label);
            map.insert(
                basename(category.code, FieldKind::Truncated),
                FieldDescriptor::numeric(total, 3, 0, MeasureLevel::Scale),
            );
            continue;
        }

        map.insert(
            basename(category.code, FieldKind::Weekly),
            FieldDescriptor::yes_no(format!("IPAQ - {} in the last 7 days", label)),
        );
        map.insert(
            basename(category.code, FieldKind::Days),
            FieldDescriptor::numeric(
                format!("IPAQ - {} number of days", label),
                1,
                0,
                MeasureLevel::Ordinal,
            ),
        );
        if catalog.policy.persist_minutes {
            map.insert(
                basename(category.code, FieldKind::Minutes),
                FieldDescriptor::numeric(
                    format!("IPAQ - {} total minutes per day", label),
                    3,
                    0,
                    MeasureLevel::Scale,
                ),
            );
        }
        if category.contributes_met() {
            map.insert(
                basename(category.code, FieldKind::Met),
                met(format!("IPAQ - {} MET minutes per week", label)),
            );
        }
    }

    for total in &catalog.domain_totals {
        map.insert(
            format!("IPAQ_{}", total.name),
            met(format!("IPAQ {} - Total MET minutes per week", total.label)),
        );
    }
    for group in &catalog.intensity {
        if let Some(column) = group.column {
            map.insert(
                format!("IPAQ_{}", column),
                met(format!("IPAQ - {} MET minutes per week", group.intensity.label())),
            );
        }
    }
    for gate in &catalog.gates {
        map.insert(
            format!("IPAQ_{}", gate.flag),
            FieldDescriptor::yes_no(format!("IPAQ - {}", gate.label)),
        );
    }

    map.insert(
        "IPAQ_TOT_MET".to_string(),
        met("IPAQ - Total MET minutes per week".to_string()),
    );
    let levels = [ActivityLevel::Low, ActivityLevel::Moderate, ActivityLevel::High]
        .map(|level| (level as i64, level.label()));
    map.insert(
        "IPAQ_CAT".to_string(),
        FieldDescriptor::numeric(
            "IPAQ - Physical activity category".to_string(),
            1,
            0,
            MeasureLevel::Nominal,
        )
        .with_values(&levels),
    );
    map
}

/// Descriptor dictionary for a harmonised table
///
/// Columns with a curated descriptor get it; other columns keep their source
/// descriptor. Descriptors of columns no longer in the table are dropped.
pub fn merge_metadata(
    table: &Table,
    source: &MetadataMap,
    prefix: &str,
    catalog: &Catalog,
) -> MetadataMap {
    let curated = curated_descriptors(catalog);
    table
        .column_names()
        .filter_map(|name| {
            let descriptor = strip_prefix(prefix, name)
                .and_then(|basename| curated.get(basename))
                .or_else(|| source.get(name))?;
            Some((name.to_string(), descriptor.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wide_curated_descriptors() {
        let curated = curated_descriptors(&Catalog::wide());

        let weekly = &curated["IPAQ_VIG_W"];
        assert_eq!(weekly.width, 1);
        assert_eq!(weekly.value_labels.get(&1).map(String::as_str), Some("Yes"));

        assert_eq!(curated["IPAQ_VIG_D"].measure, MeasureLevel::Ordinal);
        assert_eq!(curated["IPAQ_WALK_MINS"].width, 3);
        assert_eq!(curated["IPAQ_MOD_MET"].decimals, 2);
        assert_eq!(curated["IPAQ_SIT_WE_TRUNC"].width, 3);
        assert_eq!(curated["IPAQ_CAT"].value_labels.len(), 3);
        assert_eq!(curated["IPAQ_CAT"].value_labels.get(&2).map(String::as_str), Some("High"));
        assert!(!curated.contains_key("IPAQ_VIG_TRUNC"));
    }

    #[test]
    fn test_domain_curated_descriptors() {
        let curated = curated_descriptors(&Catalog::domain());

        assert!(curated.contains_key("IPAQ_JOB"));
        assert!(curated.contains_key("IPAQ_JOB_VIG"));
        assert!(curated.contains_key("IPAQ_TOT_LSR_MET"));
        assert!(curated.contains_key("IPAQ_MOD_MET"));
        assert!(curated.contains_key("IPAQ_LYING_WE_TRUNC"));
        assert!(!curated.contains_key("IPAQ_JOB_VIG_MINS"));
        assert!(!curated.contains_key("IPAQ_TRANS_MV_MET"));
        assert_eq!(
            curated["IPAQ_TOT_WORK_MET"].label,
            "IPAQ Work - Total MET minutes per week"
        );
    }

    #[test]
    fn test_merge_prefers_curated_and_drops_removed_columns() {
        let table = Table::from_numeric(vec![
            ("ID", vec![Some(1.0)]),
            ("G126_IPAQ_VIG_MET", vec![Some(480.0)]),
            ("G126_AGE", vec![Some(41.0)]),
        ])
        .unwrap();

        let stale = FieldDescriptor::numeric("old".to_string(), 8, 0, MeasureLevel::Scale);
        let mut source = MetadataMap::new();
        source.insert("ID".to_string(), stale.clone());
        source.insert("G126_IPAQ_VIG_MET".to_string(), stale.clone());
        source.insert("G126_SIT_WD_TRUNC".to_string(), stale.clone());

        let merged = merge_metadata(&table, &source, "G126", &Catalog::wide());

        assert_eq!(merged.len(), 2);
        assert_eq!(merged["ID"], stale);
        assert_eq!(
            merged["G126_IPAQ_VIG_MET"].label,
            "IPAQ - Vigorous activity MET minutes per week"
        );
        assert!(!merged.contains_key("G126_AGE"));
        assert!(!merged.contains_key("G126_SIT_WD_TRUNC"));
    }
}
