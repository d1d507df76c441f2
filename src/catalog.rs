//! Activity category catalogs
//!
//! A [`Catalog`] is the immutable description of one questionnaire layout: which
//! activity categories exist, their MET intensity factors, how category METs
//! roll up into domain and intensity totals, and the layout-specific cleaning
//! policies. One catalog is built per harmonisation run and passed explicitly to
//! every stage and to the validator.

use serde::{Deserialize, Serialize};

/// Daily activity credit is capped at three hours per category
pub const MINUTES_CAP: f64 = 180.0;

/// Sedentary time (sitting, standing, lying) is capped at sixteen hours per day
pub const SEDENTARY_CAP: f64 = 960.0;

/// Largest hours-per-day answer accepted without repair
pub const MAX_HOURS_PER_DAY: f64 = 16.0;

/// Missing/refused code used by legacy sitting-time fields
pub const SITTING_SENTINEL: f64 = 999.0;

/// Questionnaire layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Short form: vigorous / moderate / walking plus sitting
    Wide,
    /// Long form: activity split by job, transport, home and leisure domains
    Domain,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Wide => "wide",
            Layout::Domain => "domain",
        }
    }
}

/// Intensity bucket a category contributes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Vigorous,
    Moderate,
    Walking,
}

impl Intensity {
    pub fn label(&self) -> &'static str {
        match self {
            Intensity::Vigorous => "Vigorous activity",
            Intensity::Moderate => "Moderate activity",
            Intensity::Walking => "Walking",
        }
    }
}

/// Whether a category describes activity or sedentary time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    /// Has a weekly flag and a day count
    Activity,
    /// Hours/minutes per day only, summarised by a truncated total
    Sedentary,
}

/// One activity category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub code: &'static str,
    pub label: &'static str,
    pub kind: CategoryKind,
    /// MET intensity factor; `None` for categories that do not contribute to MET totals
    pub factor: Option<f64>,
}

impl Category {
    const fn activity(code: &'static str, label: &'static str, factor: Option<f64>) -> Self {
        Self {
            code,
            label,
            kind: CategoryKind::Activity,
            factor,
        }
    }

    const fn sedentary(code: &'static str, label: &'static str) -> Self {
        Self {
            code,
            label,
            kind: CategoryKind::Sedentary,
            factor: None,
        }
    }

    pub fn is_activity(&self) -> bool {
        self.kind == CategoryKind::Activity
    }

    pub fn contributes_met(&self) -> bool {
        self.factor.is_some()
    }
}

/// A fixed sum of category METs stored in its own column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    /// Column basename, e.g. `TOT_WORK_MET`
    pub name: &'static str,
    pub label: &'static str,
    pub members: Vec<&'static str>,
}

/// Categories counted towards one intensity bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntensityGroup {
    pub intensity: Intensity,
    /// Dedicated total column; `None` when the bucket is a single category
    /// whose own MET column already is the total
    pub column: Option<&'static str>,
    pub members: Vec<&'static str>,
}

/// A screening question that, when answered "no", voids a set of categories
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gate {
    /// Column basename of the screening flag, e.g. `JOB`
    pub flag: &'static str,
    pub label: &'static str,
    pub members: Vec<&'static str>,
}

/// What reported fields become when a category's weekly flag is 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InactiveFill {
    Null,
    Zero,
}

/// What happens to minutes-per-day answers below ten minutes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortMinutes {
    Drop,
    Floor,
}

/// How the moderate/walking branch of the MODERATE classification is evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerateWalkingRule {
    /// Moderate or walking alone, or both together, each meeting the minutes floor
    PerCategory,
    /// Combined moderate + walking days and minutes
    Combined,
}

/// Layout-dependent behaviour of the cleaning, derivation and normalization stages
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutPolicy {
    /// Day count (and hours/minutes) for a weekly flag of 0
    pub inactive_fill: InactiveFill,
    pub short_minutes: ShortMinutes,
    /// Split `1.5` hours into one hour and thirty minutes
    pub split_fractional_hours: bool,
    /// Minutes are only derived when the weekly flag is 1
    pub minutes_require_weekly_flag: bool,
    /// Whether a `MINS` column is written for activity categories
    pub persist_minutes: bool,
    /// Derived minutes a category needs before it earns MET credit
    pub minimum_bout_minutes: f64,
    pub moderate_walking_rule: ModerateWalkingRule,
    /// Sedentary hours/minutes go through the same repair as activity answers
    /// and their truncated totals are always recomputed
    pub repair_sedentary: bool,
}

/// Classification thresholds
///
/// `vigorous_high_minutes` is the per-day vigorous minutes required by the first
/// HIGH branch. Implementations of the scoring protocol disagree between 10 and
/// 20, so it is configurable; the default is 10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub vigorous_high_minutes: f64,
    pub high_vigorous_days: f64,
    pub high_vigorous_met: f64,
    pub high_total_days: f64,
    pub high_total_met: f64,
    pub moderate_vigorous_minutes: f64,
    pub moderate_walking_days: f64,
    pub moderate_walking_minutes: f64,
    pub moderate_total_days: f64,
    pub moderate_total_met: f64,
}

pub const DEFAULT_VIGOROUS_HIGH_MINUTES: f64 = 10.0;

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            vigorous_high_minutes: DEFAULT_VIGOROUS_HIGH_MINUTES,
            high_vigorous_days: 3.0,
            high_vigorous_met: 1500.0,
            high_total_days: 7.0,
            high_total_met: 3000.0,
            moderate_vigorous_minutes: 20.0,
            moderate_walking_days: 5.0,
            moderate_walking_minutes: 30.0,
            moderate_total_days: 5.0,
            moderate_total_met: 600.0,
        }
    }
}

/// Complete description of one layout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Catalog {
    pub layout: Layout,
    pub categories: Vec<Category>,
    pub domain_totals: Vec<Aggregate>,
    pub intensity: Vec<IntensityGroup>,
    pub gates: Vec<Gate>,
    pub policy: LayoutPolicy,
    pub thresholds: Thresholds,
    /// Decimal places MET values are rounded to
    pub met_decimals: u32,
}

impl Catalog {
    pub fn for_layout(layout: Layout) -> Self {
        match layout {
            Layout::Wide => Self::wide(),
            Layout::Domain => Self::domain(),
        }
    }

    /// Short-form catalog
    pub fn wide() -> Self {
        Self {
            layout: Layout::Wide,
            categories: vec![
                Category::activity("VIG", "Vigorous activity", Some(8.0)),
                Category::activity("MOD", "Moderate activity", Some(4.0)),
                Category::activity("WALK", "Walking", Some(3.3)),
                Category::sedentary("SIT_WD", "Sitting on a weekday"),
                Category::sedentary("SIT_WE", "Sitting on a weekend day"),
            ],
            domain_totals: Vec::new(),
            intensity: vec![
                IntensityGroup {
                    intensity: Intensity::Vigorous,
                    column: None,
                    members: vec!["VIG"],
                },
                IntensityGroup {
                    intensity: Intensity::Moderate,
                    column: None,
                    members: vec!["MOD"],
                },
                IntensityGroup {
                    intensity: Intensity::Walking,
                    column: None,
                    members: vec!["WALK"],
                },
            ],
            gates: Vec::new(),
            policy: LayoutPolicy {
                inactive_fill: InactiveFill::Null,
                short_minutes: ShortMinutes::Drop,
                split_fractional_hours: false,
                minutes_require_weekly_flag: true,
                persist_minutes: true,
                minimum_bout_minutes: 0.0,
                moderate_walking_rule: ModerateWalkingRule::PerCategory,
                repair_sedentary: false,
            },
            thresholds: Thresholds::default(),
            met_decimals: 2,
        }
    }

    /// Long-form (job / transport / home / leisure) catalog
    pub fn domain() -> Self {
        Self {
            layout: Layout::Domain,
            categories: vec![
                Category::activity("JOB_VIG", "Work - Vigorous", Some(8.0)),
                Category::activity("JOB_MOD", "Work - Moderate", Some(4.0)),
                Category::activity("JOB_WALK", "Work - Walking", Some(3.3)),
                Category::activity("TRANS_MV", "Transport - Motor vehicle", None),
                Category::activity("TRANS_BIKE", "Transport - Bike", Some(6.0)),
                Category::activity("TRANS_WALK", "Transport - Walking", Some(3.3)),
                Category::activity("HOME_OUT_VIG", "Home - Vigorous outside", Some(5.5)),
                Category::activity("HOME_OUT_MOD", "Home - Moderate outside", Some(4.0)),
                Category::activity("HOME_IN_MOD", "Home - Moderate inside", Some(3.0)),
                Category::activity("LSR_VIG", "Leisure - Vigorous", Some(8.0)),
                Category::activity("LSR_MOD", "Leisure - Moderate", Some(4.0)),
                Category::activity("LSR_WALK", "Leisure - Walking", Some(3.3)),
                Category::sedentary("SIT_WD", "Sitting on a weekday"),
                Category::sedentary("SIT_WE", "Sitting on a weekend day"),
                Category::sedentary("STAND_WD", "Standing on a weekday"),
                Category::sedentary("STAND_WE", "Standing on a weekend day"),
                Category::sedentary("LYING_WD", "Lying down on a weekday"),
                Category::sedentary("LYING_WE", "Lying down on a weekend day"),
            ],
            domain_totals: vec![
                Aggregate {
                    name: "TOT_WORK_MET",
                    label: "Work",
                    members: vec!["JOB_VIG", "JOB_MOD", "JOB_WALK"],
                },
                Aggregate {
                    name: "TOT_TRANS_MET",
                    label: "Transport",
                    members: vec!["TRANS_WALK", "TRANS_BIKE"],
                },
                Aggregate {
                    name: "TOT_HOME_MET",
                    label: "Home",
                    members: vec!["HOME_OUT_VIG", "HOME_OUT_MOD", "HOME_IN_MOD"],
                },
                Aggregate {
                    name: "TOT_LSR_MET",
                    label: "Leisure",
                    members: vec!["LSR_VIG", "LSR_MOD", "LSR_WALK"],
                },
            ],
            // Cycling and vigorous yard work are scored as moderate intensity.
            intensity: vec![
                IntensityGroup {
                    intensity: Intensity::Vigorous,
                    column: Some("VIG_MET"),
                    members: vec!["JOB_VIG", "LSR_VIG"],
                },
                IntensityGroup {
                    intensity: Intensity::Moderate,
                    column: Some("MOD_MET"),
                    members: vec![
                        "JOB_MOD",
                        "TRANS_BIKE",
                        "HOME_OUT_VIG",
                        "HOME_OUT_MOD",
                        "HOME_IN_MOD",
                        "LSR_MOD",
                    ],
                },
                IntensityGroup {
                    intensity: Intensity::Walking,
                    column: Some("WALK_MET"),
                    members: vec!["JOB_WALK", "TRANS_WALK", "LSR_WALK"],
                },
            ],
            gates: vec![Gate {
                flag: "JOB",
                label: "Has a job or does unpaid work outside the home",
                members: vec!["JOB_VIG", "JOB_MOD", "JOB_WALK"],
            }],
            policy: LayoutPolicy {
                inactive_fill: InactiveFill::Zero,
                short_minutes: ShortMinutes::Floor,
                split_fractional_hours: true,
                minutes_require_weekly_flag: false,
                persist_minutes: false,
                minimum_bout_minutes: 10.0,
                moderate_walking_rule: ModerateWalkingRule::Combined,
                repair_sedentary: true,
            },
            thresholds: Thresholds::default(),
            met_decimals: 2,
        }
    }

    /// Override the vigorous-minutes floor of the HIGH classification branch
    pub fn with_vigorous_high_minutes(mut self, minutes: f64) -> Self {
        self.thresholds.vigorous_high_minutes = minutes;
        self
    }

    pub fn with_met_decimals(mut self, decimals: u32) -> Self {
        self.met_decimals = decimals;
        self
    }

    pub fn category(&self, code: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.code == code)
    }

    pub fn activity_categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.is_activity())
    }

    /// Activity categories with a MET factor
    pub fn met_categories(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.contributes_met())
    }

    pub fn sedentary_categories(&self) -> impl Iterator<Item = &Category> {
        self.categories
            .iter()
            .filter(|c| c.kind == CategoryKind::Sedentary)
    }

    pub fn intensity_group(&self, intensity: Intensity) -> Option<&IntensityGroup> {
        self.intensity.iter().find(|g| g.intensity == intensity)
    }

    /// Round a MET value to the catalog's precision
    pub fn round_met(&self, value: f64) -> f64 {
        round_to(value, self.met_decimals)
    }
}

/// Round half away from zero to a number of decimal places
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_aggregate_member_is_a_met_category() {
        for catalog in [Catalog::wide(), Catalog::domain()] {
            let members = catalog
                .domain_totals
                .iter()
                .flat_map(|a| a.members.iter())
                .chain(catalog.intensity.iter().flat_map(|g| g.members.iter()));
            for code in members {
                let category = catalog.category(code).unwrap();
                assert!(category.contributes_met(), "{} has no factor", code);
            }
        }
    }

    #[test]
    fn test_intensity_groups_partition_met_categories() {
        for catalog in [Catalog::wide(), Catalog::domain()] {
            let mut grouped: Vec<&str> = catalog
                .intensity
                .iter()
                .flat_map(|g| g.members.iter().copied())
                .collect();
            grouped.sort_unstable();
            let mut all: Vec<&str> = catalog.met_categories().map(|c| c.code).collect();
            all.sort_unstable();
            assert_eq!(grouped, all);
        }
    }

    #[test]
    fn test_bike_counts_as_moderate() {
        let catalog = Catalog::domain();
        let moderate = catalog.intensity_group(Intensity::Moderate).unwrap();
        assert!(moderate.members.contains(&"TRANS_BIKE"));
        assert_eq!(catalog.category("TRANS_BIKE").unwrap().factor, Some(6.0));
    }

    #[test]
    fn test_threshold_override() {
        let catalog = Catalog::wide().with_vigorous_high_minutes(20.0);
        assert_eq!(catalog.thresholds.vigorous_high_minutes, 20.0);
        assert_eq!(Catalog::wide().thresholds.vigorous_high_minutes, 10.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(3.0 * 45.0 * 3.3, 2), 445.5);
        assert_eq!(round_to(1.005 * 1000.0, 0), 1005.0);
        assert_eq!(round_to(-2.345, 1), -2.3);
    }
}
