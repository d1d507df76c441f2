//! Derivation stage
//!
//! Computes the scored fields from cleaned answers:
//! - minutes per day, capped at three hours
//! - MET-minutes per week for every category with an intensity factor
//! - domain and intensity totals, the grand total and the activity level
//! - truncated sedentary totals

use crate::catalog::{
    Catalog, InactiveFill, LayoutPolicy, ModerateWalkingRule, Thresholds, MINUTES_CAP,
    SEDENTARY_CAP,
};
use crate::error::HarmoniseError;
use crate::fields::{AggregateField, FieldRegistry};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Three-tier activity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Low = 0,
    Moderate = 1,
    High = 2,
}

impl ActivityLevel {
    pub fn code(&self) -> f64 {
        *self as u8 as f64
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityLevel::Low => "Low",
            ActivityLevel::Moderate => "Moderate",
            ActivityLevel::High => "High",
        }
    }
}

/// Per-record inputs of the classification
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassificationInputs {
    pub total_met: Option<f64>,
    pub vigorous_days: Option<f64>,
    pub vigorous_minutes: Option<f64>,
    pub moderate_days: Option<f64>,
    pub moderate_minutes: Option<f64>,
    pub walking_days: Option<f64>,
    pub walking_minutes: Option<f64>,
    /// Day counts of every MET category summed, null as 0
    pub total_days: f64,
}

/// Daily minutes: `min(180, hours * 60 + minutes)`, null only when both answers are missing
pub fn daily_minutes(hours: Option<f64>, minutes: Option<f64>) -> Option<f64> {
    if hours.is_none() && minutes.is_none() {
        return None;
    }
    Some((hours.unwrap_or(0.0) * 60.0 + minutes.unwrap_or(0.0)).min(MINUTES_CAP))
}

/// Daily minutes for a category, honoring the layout's weekly-flag requirement
pub fn category_minutes(
    weekly: Option<f64>,
    hours: Option<f64>,
    minutes: Option<f64>,
    policy: &LayoutPolicy,
) -> Option<f64> {
    if policy.minutes_require_weekly_flag && weekly != Some(1.0) {
        return None;
    }
    daily_minutes(hours, minutes)
}

/// MET-minutes per week for one category
pub fn category_met(
    weekly: Option<f64>,
    days: Option<f64>,
    minutes: Option<f64>,
    factor: f64,
    catalog: &Catalog,
) -> Option<f64> {
    if weekly == Some(0.0) && catalog.policy.inactive_fill == InactiveFill::Zero {
        return Some(0.0);
    }
    if weekly != Some(1.0) {
        return None;
    }
    let days = days.filter(|d| (1.0..=7.0).contains(d))?;
    let minutes = minutes
        .filter(|m| (0.0..=MINUTES_CAP).contains(m))
        .filter(|m| *m >= catalog.policy.minimum_bout_minutes)?;
    Some(catalog.round_met(days * minutes * factor))
}

/// Sum of the present values; null only when every value is null
pub fn sum_present(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    values
        .into_iter()
        .fold(None, |acc, v| match (acc, v) {
            (Some(a), Some(b)) => Some(a + b),
            (None, Some(b)) => Some(b),
            (acc, None) => acc,
        })
}

/// Truncated sedentary minutes per day
pub fn sedentary_total(hours: Option<f64>, minutes: Option<f64>) -> Option<f64> {
    if hours.is_none() && minutes.is_none() {
        return None;
    }
    Some((hours.unwrap_or(0.0) * 60.0 + minutes.unwrap_or(0.0)).min(SEDENTARY_CAP))
}

fn at_least(value: Option<f64>, threshold: f64) -> bool {
    value.map_or(false, |v| v >= threshold)
}

/// Classify one record; first matching tier wins
pub fn classify(
    inputs: &ClassificationInputs,
    thresholds: &Thresholds,
    rule: ModerateWalkingRule,
) -> Option<ActivityLevel> {
    let total_met = inputs.total_met?;
    let t = thresholds;

    let vigorous_days_met = at_least(inputs.vigorous_days, t.high_vigorous_days);
    let high = (vigorous_days_met
        && at_least(inputs.vigorous_minutes, t.vigorous_high_minutes)
        && total_met >= t.high_vigorous_met)
        || (inputs.total_days >= t.high_total_days && total_met >= t.high_total_met);
    if high {
        return Some(ActivityLevel::High);
    }

    let vigorous = vigorous_days_met && at_least(inputs.vigorous_minutes, t.moderate_vigorous_minutes);
    let moderate_walking = match rule {
        ModerateWalkingRule::PerCategory => {
            let combined_days =
                inputs.moderate_days.unwrap_or(0.0) + inputs.walking_days.unwrap_or(0.0);
            (at_least(inputs.moderate_days, t.moderate_walking_days)
                && at_least(inputs.moderate_minutes, t.moderate_walking_minutes))
                || (at_least(inputs.walking_days, t.moderate_walking_days)
                    && at_least(inputs.walking_minutes, t.moderate_walking_minutes))
                || (combined_days >= t.moderate_walking_days
                    && at_least(inputs.moderate_minutes, t.moderate_walking_minutes)
                    && at_least(inputs.walking_minutes, t.moderate_walking_minutes))
        }
        ModerateWalkingRule::Combined => {
            let days = inputs.moderate_days.unwrap_or(0.0) + inputs.walking_days.unwrap_or(0.0);
            let minutes =
                inputs.moderate_minutes.unwrap_or(0.0) + inputs.walking_minutes.unwrap_or(0.0);
            days >= t.moderate_walking_days && minutes >= t.moderate_walking_minutes
        }
    };
    let total = inputs.total_days >= t.moderate_total_days && total_met >= t.moderate_total_met;

    if vigorous || moderate_walking || total {
        Some(ActivityLevel::Moderate)
    } else {
        Some(ActivityLevel::Low)
    }
}

/// Whether any MET category has a usable weekly flag
pub fn has_activity(fields: &FieldRegistry, table: &Table, row: usize) -> bool {
    fields
        .met_categories()
        .filter_map(|c| c.weekly.as_deref())
        .any(|w| table.value(row, w).is_some())
}

/// Counters reported by [`Deriver::derive`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivationStats {
    pub records_with_activity: usize,
    pub low: usize,
    pub moderate: usize,
    pub high: usize,
}

/// Derivation stage over a whole table
pub struct Deriver;

impl Deriver {
    /// Write all derived columns; `recompute_sedentary` also writes the
    /// truncated sedentary totals
    pub fn derive(
        table: &mut Table,
        fields: &FieldRegistry,
        catalog: &Catalog,
        recompute_sedentary: bool,
    ) -> Result<DerivationStats, HarmoniseError> {
        let rows = table.row_count();
        let policy = &catalog.policy;

        // Daily minutes are kept per category for the classification even when
        // the layout does not store them.
        let mut minutes: Vec<Vec<Option<f64>>> = Vec::with_capacity(fields.categories.len());
        let mut mets: Vec<Vec<Option<f64>>> = Vec::with_capacity(fields.categories.len());
        for category in &fields.categories {
            let Some(weekly_col) = category.weekly.as_deref() else {
                minutes.push(vec![None; rows]);
                mets.push(vec![None; rows]);
                continue;
            };
            let weekly = table.numeric(weekly_col)?;
            let hours = table.numeric(&category.hours)?;
            let mpd = table.numeric(&category.minutes)?;
            let category_mins: Vec<Option<f64>> = (0..rows)
                .map(|r| category_minutes(weekly[r], hours[r], mpd[r], policy))
                .collect();

            let category_mets = match (category.factor, category.days.as_deref()) {
                (Some(factor), Some(days_col)) => {
                    let days = table.numeric(days_col)?;
                    (0..rows)
                        .map(|r| category_met(weekly[r], days[r], category_mins[r], factor, catalog))
                        .collect()
                }
                _ => vec![None; rows],
            };

            minutes.push(category_mins);
            mets.push(category_mets);
        }

        for (category, (mins, met)) in fields.categories.iter().zip(minutes.iter().zip(&mets)) {
            if let Some(column) = &category.total_minutes {
                table.set_numeric(column, mins.clone())?;
            }
            if let Some(column) = &category.met {
                table.set_numeric(column, met.clone())?;
            }
        }

        for total in &fields.domain_totals {
            table.set_numeric(&total.column, aggregate(total, &mets, rows, catalog))?;
        }

        let mut intensity_totals = Vec::with_capacity(fields.intensity.len());
        for group in &fields.intensity {
            let values = aggregate(group, &mets, rows, catalog);
            if !is_category_column(fields, group) {
                table.set_numeric(&group.column, values.clone())?;
            }
            intensity_totals.push(values);
        }

        let mut stats = DerivationStats::default();
        let mut total_met = Vec::with_capacity(rows);
        let mut levels = Vec::with_capacity(rows);
        for row in 0..rows {
            let total = if has_activity(fields, table, row) {
                stats.records_with_activity += 1;
                let sum: f64 = intensity_totals.iter().map(|t| t[row].unwrap_or(0.0)).sum();
                Some(catalog.round_met(sum))
            } else {
                None
            };
            let inputs = classification_inputs(table, fields, &minutes, total, row);
            let level = classify(&inputs, &catalog.thresholds, policy.moderate_walking_rule);
            match level {
                Some(ActivityLevel::Low) => stats.low += 1,
                Some(ActivityLevel::Moderate) => stats.moderate += 1,
                Some(ActivityLevel::High) => stats.high += 1,
                None => {}
            }
            total_met.push(total);
            levels.push(level.map(|l| l.code()));
        }
        table.set_numeric(&fields.total_met, total_met)?;
        table.set_numeric(&fields.classification, levels)?;

        if recompute_sedentary {
            for category in fields.present_sedentary(table) {
                let Some(column) = &category.truncated else {
                    continue;
                };
                let hours = table.numeric(&category.hours)?;
                let mpd = table.numeric(&category.minutes)?;
                let values = hours
                    .iter()
                    .zip(mpd)
                    .map(|(&h, &m)| sedentary_total(h, m))
                    .collect();
                table.set_numeric(column, values)?;
            }
        }

        debug!(
            records_with_activity = stats.records_with_activity,
            low = stats.low,
            moderate = stats.moderate,
            high = stats.high,
            "derivation complete"
        );
        Ok(stats)
    }
}

fn is_category_column(fields: &FieldRegistry, group: &AggregateField) -> bool {
    fields
        .categories
        .iter()
        .any(|c| c.met.as_deref() == Some(group.column.as_str()))
}

fn aggregate(
    total: &AggregateField,
    mets: &[Vec<Option<f64>>],
    rows: usize,
    catalog: &Catalog,
) -> Vec<Option<f64>> {
    (0..rows)
        .map(|r| sum_present(total.members.iter().map(|&i| mets[i][r])).map(|v| catalog.round_met(v)))
        .collect()
}

fn classification_inputs(
    table: &Table,
    fields: &FieldRegistry,
    minutes: &[Vec<Option<f64>>],
    total_met: Option<f64>,
    row: usize,
) -> ClassificationInputs {
    let days_of = |i: usize| {
        fields.categories[i]
            .days
            .as_deref()
            .and_then(|d| table.value(row, d))
    };
    let active_minutes_of = |i: usize| {
        let weekly = fields.categories[i]
            .weekly
            .as_deref()
            .and_then(|w| table.value(row, w));
        if weekly == Some(1.0) {
            minutes[i][row]
        } else {
            None
        }
    };
    let bucket = |position: usize| -> (Option<f64>, Option<f64>) {
        match fields.intensity.get(position) {
            Some(group) => (
                sum_present(group.members.iter().map(|&i| days_of(i))),
                sum_present(group.members.iter().map(|&i| active_minutes_of(i))),
            ),
            None => (None, None),
        }
    };

    let (vigorous_days, vigorous_minutes) = bucket(0);
    let (moderate_days, moderate_minutes) = bucket(1);
    let (walking_days, walking_minutes) = bucket(2);
    let total_days = fields
        .categories
        .iter()
        .enumerate()
        .filter(|(_, c)| c.met.is_some())
        .map(|(i, _)| days_of(i).unwrap_or(0.0))
        .sum();

    ClassificationInputs {
        total_met,
        vigorous_days,
        vigorous_minutes,
        moderate_days,
        moderate_minutes,
        walking_days,
        walking_minutes,
        total_days,
    }
}
