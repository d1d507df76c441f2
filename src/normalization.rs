//! Zero-activity normalization
//!
//! Runs after derivation and applies two "no activity" rules in order:
//! - a category whose weekly flag is 0 is a confirmed zero: its MET (and stored
//!   minutes) become 0, its answers become null or 0 depending on the layout
//! - a record with no usable weekly flag on any MET category has an unknown
//!   activity profile: every derived field of the record becomes null

use crate::catalog::{Catalog, InactiveFill};
use crate::derivation::has_activity;
use crate::error::HarmoniseError;
use crate::fields::{CategoryFields, FieldRegistry};
use crate::table::Table;
use tracing::debug;

/// Counters reported by [`ZeroActivityNormalizer::normalize`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationStats {
    /// Category answers confirmed as "no activity"
    pub inactive_answers: usize,
    /// Records without any usable weekly flag
    pub records_without_activity: usize,
}

/// Zero-activity normalization over a whole table
pub struct ZeroActivityNormalizer;

impl ZeroActivityNormalizer {
    pub fn normalize(
        table: &mut Table,
        fields: &FieldRegistry,
        catalog: &Catalog,
    ) -> Result<NormalizationStats, HarmoniseError> {
        let mut stats = NormalizationStats::default();

        for category in fields.activity_categories() {
            stats.inactive_answers += normalize_inactive(table, category, catalog.policy.inactive_fill)?;
        }

        let unknown: Vec<bool> = (0..table.row_count())
            .map(|row| !has_activity(fields, table, row))
            .collect();
        stats.records_without_activity = unknown.iter().filter(|u| **u).count();

        if stats.records_without_activity > 0 {
            for column in record_columns(fields) {
                if !table.contains(column) {
                    continue;
                }
                let values = table
                    .numeric(column)?
                    .iter()
                    .zip(&unknown)
                    .map(|(&v, &unknown)| if unknown { None } else { v })
                    .collect();
                table.set_numeric(column, values)?;
            }
        }

        debug!(
            inactive_answers = stats.inactive_answers,
            records_without_activity = stats.records_without_activity,
            "normalization complete"
        );
        Ok(stats)
    }
}

/// Apply the weekly-flag-is-0 rule to one category
fn normalize_inactive(
    table: &mut Table,
    category: &CategoryFields,
    fill: InactiveFill,
) -> Result<usize, HarmoniseError> {
    let Some(weekly_col) = category.weekly.as_deref() else {
        return Ok(0);
    };
    let inactive: Vec<bool> = table
        .numeric(weekly_col)?
        .iter()
        .map(|w| *w == Some(0.0))
        .collect();
    let count = inactive.iter().filter(|i| **i).count();
    if count == 0 {
        return Ok(0);
    }

    let answer_value = match fill {
        InactiveFill::Null => None,
        InactiveFill::Zero => Some(0.0),
    };
    let answers = [category.days.as_deref(), Some(category.hours.as_str()), Some(category.minutes.as_str())];
    let derived = [category.total_minutes.as_deref(), category.met.as_deref()];

    for (column, value) in answers
        .into_iter()
        .flatten()
        .map(|c| (c, answer_value))
        .chain(derived.into_iter().flatten().map(|c| (c, Some(0.0))))
    {
        if !table.contains(column) {
            continue;
        }
        let values = table
            .numeric(column)?
            .iter()
            .zip(&inactive)
            .map(|(&v, &inactive)| if inactive { value } else { v })
            .collect();
        table.set_numeric(column, values)?;
    }
    Ok(count)
}

/// Every column the record-wide rule nulls
fn record_columns(fields: &FieldRegistry) -> Vec<&str> {
    let mut columns: Vec<&str> = fields
        .activity_categories()
        .flat_map(|c| c.answers_and_derived())
        .collect();
    columns.extend(fields.domain_totals.iter().map(|t| t.column.as_str()));
    columns.extend(fields.intensity.iter().map(|t| t.column.as_str()));
    columns.push(&fields.total_met);
    columns.push(&fields.classification);
    columns.sort_unstable();
    columns.dedup();
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derivation::Deriver;
    use pretty_assertions::assert_eq;

    fn wide_record(values: [Option<f64>; 12]) -> Table {
        let names = [
            "G1_IPAQ_VIG_W", "G1_IPAQ_VIG_D", "G1_IPAQ_VIG_HPD", "G1_IPAQ_VIG_MPD",
            "G1_IPAQ_MOD_W", "G1_IPAQ_MOD_D", "G1_IPAQ_MOD_HPD", "G1_IPAQ_MOD_MPD",
            "G1_IPAQ_WALK_W", "G1_IPAQ_WALK_D", "G1_IPAQ_WALK_HPD", "G1_IPAQ_WALK_MPD",
        ];
        let columns: Vec<(&str, Vec<Option<f64>>)> =
            names.iter().zip(values).map(|(n, v)| (*n, vec![v])).collect();
        Table::from_numeric(columns).unwrap()
    }

    fn run(table: &mut Table, catalog: &Catalog) -> NormalizationStats {
        let fields = FieldRegistry::new("G1", catalog);
        Deriver::derive(table, &fields, catalog, false).unwrap();
        ZeroActivityNormalizer::normalize(table, &fields, catalog).unwrap()
    }

    #[test]
    fn test_inactive_category_is_a_valid_zero() {
        let catalog = Catalog::wide();
        let mut table = wide_record([
            Some(0.0), None, Some(2.0), Some(15.0),
            Some(1.0), Some(2.0), Some(0.0), Some(30.0),
            None, None, None, None,
        ]);
        let stats = run(&mut table, &catalog);

        assert_eq!(stats.inactive_answers, 1);
        assert_eq!(table.value(0, "G1_IPAQ_VIG_D"), None);
        assert_eq!(table.value(0, "G1_IPAQ_VIG_HPD"), None);
        assert_eq!(table.value(0, "G1_IPAQ_VIG_MPD"), None);
        assert_eq!(table.value(0, "G1_IPAQ_VIG_MINS"), Some(0.0));
        assert_eq!(table.value(0, "G1_IPAQ_VIG_MET"), Some(0.0));
        assert_eq!(table.value(0, "G1_IPAQ_MOD_MET"), Some(240.0));
        assert_eq!(table.value(0, "G1_IPAQ_TOT_MET"), Some(240.0));
    }

    #[test]
    fn test_record_without_flags_is_fully_null() {
        let catalog = Catalog::wide();
        let mut table = wide_record([
            None, Some(3.0), Some(1.0), Some(20.0),
            Some(7.0), Some(3.0), Some(1.0), None,
            Some(999.0), Some(2.0), None, Some(30.0),
        ]);
        // flags of 7 and 999 were sanitized by cleaning; emulate that here
        table.set_numeric("G1_IPAQ_MOD_W", vec![None]).unwrap();
        table.set_numeric("G1_IPAQ_WALK_W", vec![None]).unwrap();

        let stats = run(&mut table, &catalog);

        assert_eq!(stats.records_without_activity, 1);
        for name in [
            "G1_IPAQ_VIG_D", "G1_IPAQ_VIG_HPD", "G1_IPAQ_VIG_MPD", "G1_IPAQ_VIG_MINS",
            "G1_IPAQ_VIG_MET", "G1_IPAQ_WALK_D", "G1_IPAQ_WALK_MPD", "G1_IPAQ_TOT_MET",
            "G1_IPAQ_CAT",
        ] {
            assert_eq!(table.value(0, name), None, "{}", name);
        }
    }

    #[test]
    fn test_domain_inactive_fill_is_zero() {
        let catalog = Catalog::domain();
        let fields = FieldRegistry::new("G217", &catalog);
        let mut columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();
        for category in fields.activity_categories() {
            for column in category.inputs() {
                columns.push((column.to_string(), vec![None]));
            }
        }
        let mut table = Table::from_numeric(columns).unwrap();
        table.set_numeric("G217_IPAQ_LSR_WALK", vec![Some(0.0)]).unwrap();
        table.set_numeric("G217_IPAQ_LSR_WALK_HPD", vec![Some(2.0)]).unwrap();

        Deriver::derive(&mut table, &fields, &catalog, true).unwrap();
        ZeroActivityNormalizer::normalize(&mut table, &fields, &catalog).unwrap();

        assert_eq!(table.value(0, "G217_IPAQ_LSR_WALK_D"), Some(0.0));
        assert_eq!(table.value(0, "G217_IPAQ_LSR_WALK_HPD"), Some(0.0));
        assert_eq!(table.value(0, "G217_IPAQ_LSR_WALK_MPD"), Some(0.0));
        assert_eq!(table.value(0, "G217_IPAQ_LSR_WALK_MET"), Some(0.0));
        assert_eq!(table.value(0, "G217_IPAQ_WALK_MET"), Some(0.0));
        assert_eq!(table.value(0, "G217_IPAQ_TOT_MET"), Some(0.0));
        assert_eq!(table.value(0, "G217_IPAQ_CAT"), Some(0.0));
        // other categories had no flag at all
        assert_eq!(table.value(0, "G217_IPAQ_VIG_MET"), None);
    }
}
