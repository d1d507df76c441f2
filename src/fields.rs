//! Canonical field naming
//!
//! Every harmonised column is named `{prefix}_IPAQ_{category}_{kind}`, e.g.
//! `G126_IPAQ_VIG_MET`. The one irregularity is the weekly flag of the domain
//! layout, which carries no suffix (`G217_IPAQ_JOB_VIG`). Aggregates are named
//! `{prefix}_IPAQ_{name}`.
//!
//! [`FieldRegistry`] resolves all names once per run so the stages work with
//! typed per-category accessors instead of formatting strings on the fly.

use crate::catalog::{Catalog, Layout};
use crate::error::HarmoniseError;
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// Kind of per-category field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Weekly,
    Days,
    HoursPerDay,
    MinutesPerDay,
    Minutes,
    Met,
    Truncated,
}

impl FieldKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            FieldKind::Weekly => "W",
            FieldKind::Days => "D",
            FieldKind::HoursPerDay => "HPD",
            FieldKind::MinutesPerDay => "MPD",
            FieldKind::Minutes => "MINS",
            FieldKind::Met => "MET",
            FieldKind::Truncated => "TRUNC",
        }
    }
}

/// Column basename (without the dataset prefix) of a category field
pub fn field_basename(layout: Layout, category: &str, kind: FieldKind) -> String {
    match (layout, kind) {
        (Layout::Domain, FieldKind::Weekly) => format!("IPAQ_{}", category),
        _ => format!("IPAQ_{}_{}", category, kind.suffix()),
    }
}

/// Full column name of a category field
pub fn field_name(prefix: &str, layout: Layout, category: &str, kind: FieldKind) -> String {
    format!("{}_{}", prefix, field_basename(layout, category, kind))
}

/// Full column name of an aggregate such as `TOT_MET`
pub fn aggregate_name(prefix: &str, name: &str) -> String {
    format!("{}_IPAQ_{}", prefix, name)
}

/// Strip the dataset prefix from a column name
pub fn strip_prefix<'a>(prefix: &str, column: &'a str) -> Option<&'a str> {
    column
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
}

/// Resolved column names for one category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryFields {
    pub code: &'static str,
    pub factor: Option<f64>,
    pub weekly: Option<String>,
    pub days: Option<String>,
    pub hours: String,
    pub minutes: String,
    pub total_minutes: Option<String>,
    pub met: Option<String>,
    pub truncated: Option<String>,
}

impl CategoryFields {
    /// Raw answer columns the harmoniser reads
    pub fn inputs(&self) -> impl Iterator<Item = &str> {
        [self.weekly.as_deref(), self.days.as_deref()]
            .into_iter()
            .flatten()
            .chain([self.hours.as_str(), self.minutes.as_str()])
    }

    /// Reported and derived columns, i.e. everything except the weekly flag
    pub fn answers_and_derived(&self) -> impl Iterator<Item = &str> {
        [
            self.days.as_deref(),
            Some(self.hours.as_str()),
            Some(self.minutes.as_str()),
            self.total_minutes.as_deref(),
            self.met.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// Resolved column name of a stored aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateField {
    pub name: &'static str,
    pub column: String,
    /// Indices into [`FieldRegistry::categories`]
    pub members: Vec<usize>,
}

/// Resolved column name of a screening flag
#[derive(Debug, Clone, PartialEq)]
pub struct GateField {
    pub column: String,
    pub members: Vec<usize>,
}

/// All column names of one dataset, resolved from a prefix and a catalog
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRegistry {
    pub prefix: String,
    pub layout: Layout,
    pub categories: Vec<CategoryFields>,
    pub domain_totals: Vec<AggregateField>,
    /// Intensity buckets in vigorous, moderate, walking order; `column` is the
    /// category MET column when the bucket has no dedicated total
    pub intensity: Vec<AggregateField>,
    pub gates: Vec<GateField>,
    pub total_met: String,
    pub classification: String,
}

impl FieldRegistry {
    pub fn new(prefix: &str, catalog: &Catalog) -> Self {
        let layout = catalog.layout;
        let categories: Vec<CategoryFields> = catalog
            .categories
            .iter()
            .map(|category| {
                let name = |kind| field_name(prefix, layout, category.code, kind);
                let activity = category.is_activity();
                CategoryFields {
                    code: category.code,
                    factor: category.factor,
                    weekly: activity.then(|| name(FieldKind::Weekly)),
                    days: activity.then(|| name(FieldKind::Days)),
                    hours: name(FieldKind::HoursPerDay),
                    minutes: name(FieldKind::MinutesPerDay),
                    total_minutes: (activity && catalog.policy.persist_minutes)
                        .then(|| name(FieldKind::Minutes)),
                    met: category.factor.map(|_| name(FieldKind::Met)),
                    truncated: (!activity).then(|| name(FieldKind::Truncated)),
                }
            })
            .collect();

        let index_of = |codes: &[&'static str]| -> Vec<usize> {
            codes
                .iter()
                .filter_map(|code| categories.iter().position(|c| c.code == *code))
                .collect()
        };

        let domain_totals = catalog
            .domain_totals
            .iter()
            .map(|aggregate| AggregateField {
                name: aggregate.name,
                column: aggregate_name(prefix, aggregate.name),
                members: index_of(&aggregate.members),
            })
            .collect();

        let intensity = catalog
            .intensity
            .iter()
            .map(|group| {
                let members = index_of(&group.members);
                let column = match group.column {
                    Some(name) => aggregate_name(prefix, name),
                    None => members
                        .first()
                        .and_then(|&i| categories[i].met.clone())
                        .unwrap_or_default(),
                };
                AggregateField {
                    name: group.column.unwrap_or(group.members[0]),
                    column,
                    members,
                }
            })
            .collect();

        let gates = catalog
            .gates
            .iter()
            .map(|gate| GateField {
                column: aggregate_name(prefix, gate.flag),
                members: index_of(&gate.members),
            })
            .collect();

        Self {
            prefix: prefix.to_string(),
            layout,
            categories,
            domain_totals,
            intensity,
            gates,
            total_met: aggregate_name(prefix, "TOT_MET"),
            classification: aggregate_name(prefix, "CAT"),
        }
    }

    pub fn category(&self, code: &str) -> Option<&CategoryFields> {
        self.categories.iter().find(|c| c.code == code)
    }

    pub fn activity_categories(&self) -> impl Iterator<Item = &CategoryFields> {
        self.categories.iter().filter(|c| c.weekly.is_some())
    }

    pub fn met_categories(&self) -> impl Iterator<Item = &CategoryFields> {
        self.categories.iter().filter(|c| c.met.is_some())
    }

    pub fn sedentary_categories(&self) -> impl Iterator<Item = &CategoryFields> {
        self.categories.iter().filter(|c| c.weekly.is_none())
    }

    /// Check that every raw answer column of the activity categories exists
    ///
    /// Sedentary columns are optional: not every wave asked about sitting.
    pub fn verify(&self, table: &Table) -> Result<(), HarmoniseError> {
        for category in self.activity_categories() {
            for column in category.inputs() {
                if !table.contains(column) {
                    return Err(HarmoniseError::MissingColumn(column.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Sedentary categories whose hours and minutes columns are both present
    pub fn present_sedentary(&self, table: &Table) -> Vec<&CategoryFields> {
        self.sedentary_categories()
            .filter(|c| table.contains(&c.hours) && table.contains(&c.minutes))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wide_names() {
        let registry = FieldRegistry::new("G126", &Catalog::wide());
        let vig = registry.category("VIG").unwrap();

        assert_eq!(vig.weekly.as_deref(), Some("G126_IPAQ_VIG_W"));
        assert_eq!(vig.days.as_deref(), Some("G126_IPAQ_VIG_D"));
        assert_eq!(vig.hours, "G126_IPAQ_VIG_HPD");
        assert_eq!(vig.total_minutes.as_deref(), Some("G126_IPAQ_VIG_MINS"));
        assert_eq!(vig.met.as_deref(), Some("G126_IPAQ_VIG_MET"));
        assert_eq!(registry.total_met, "G126_IPAQ_TOT_MET");
        assert_eq!(registry.intensity[0].column, "G126_IPAQ_VIG_MET");

        let sit = registry.category("SIT_WD").unwrap();
        assert_eq!(sit.weekly, None);
        assert_eq!(sit.truncated.as_deref(), Some("G126_IPAQ_SIT_WD_TRUNC"));
    }

    #[test]
    fn test_domain_names() {
        let registry = FieldRegistry::new("G217", &Catalog::domain());
        let bike = registry.category("TRANS_BIKE").unwrap();

        assert_eq!(bike.weekly.as_deref(), Some("G217_IPAQ_TRANS_BIKE"));
        assert_eq!(bike.total_minutes, None);
        assert_eq!(registry.gates[0].column, "G217_IPAQ_JOB");
        assert_eq!(registry.domain_totals[0].column, "G217_IPAQ_TOT_WORK_MET");
        assert_eq!(registry.intensity[1].column, "G217_IPAQ_MOD_MET");
        assert_eq!(registry.intensity[1].members.len(), 6);

        let mv = registry.category("TRANS_MV").unwrap();
        assert_eq!(mv.met, None);
        assert!(mv.days.is_some());
    }

    #[test]
    fn test_strip_prefix() {
        assert_eq!(strip_prefix("G126", "G126_IPAQ_CAT"), Some("IPAQ_CAT"));
        assert_eq!(strip_prefix("G126", "G1260_IPAQ_CAT"), None);
        assert_eq!(strip_prefix("G126", "ID"), None);
    }

    #[test]
    fn test_verify_reports_first_missing_column() {
        let registry = FieldRegistry::new("G1", &Catalog::wide());
        let table = Table::from_numeric(vec![("G1_IPAQ_VIG_W", vec![Some(1.0)])]).unwrap();
        match registry.verify(&table) {
            Err(HarmoniseError::MissingColumn(name)) => assert_eq!(name, "G1_IPAQ_VIG_D"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
