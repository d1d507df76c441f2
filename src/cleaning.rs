//! Cleaning stage
//!
//! Enforces per-field validity and repairs common data-entry errors:
//! - weekly flags outside {0, 1} become null
//! - day counts are bounded to 1-7 for active categories
//! - hours typed into the minutes field (and vice versa) are transposed back
//! - legacy sitting fields lose their 999 missing code
//!
//! Every category is cleaned on its own. Anything that does not match a known
//! pattern becomes null; no plausible-looking value is ever invented.

use crate::catalog::{InactiveFill, LayoutPolicy, ShortMinutes, MAX_HOURS_PER_DAY, SITTING_SENTINEL};
use crate::error::HarmoniseError;
use crate::fields::{CategoryFields, FieldRegistry};
use crate::table::Table;
use tracing::debug;

/// Hours and minutes reported for one day
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DailyTime {
    pub hours: Option<f64>,
    pub minutes: Option<f64>,
}

impl DailyTime {
    pub fn new(hours: Option<f64>, minutes: Option<f64>) -> Self {
        Self { hours, minutes }
    }
}

/// Counters reported by [`Cleaner::clean`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleaningStats {
    /// Weekly flags that were neither 0 nor 1
    pub invalid_flags: usize,
    /// Day counts nulled or zeroed
    pub days_changed: usize,
    /// Hours/minutes cells changed by the repair rules
    pub time_changed: usize,
    /// Rows whose gated categories were voided
    pub gated_rows: usize,
    /// Sitting cells holding the missing code
    pub sentinels: usize,
}

/// Keep 0 and 1, null everything else
pub fn sanitize_flag(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v == 0.0 || *v == 1.0)
}

/// Day count for a (sanitized) weekly flag
///
/// Active categories keep 1-7. An inactive category gets a null or a zero
/// depending on the layout, and an unknown flag always yields null.
pub fn bound_days(weekly: Option<f64>, days: Option<f64>, fill: InactiveFill) -> Option<f64> {
    match weekly {
        Some(w) if w == 1.0 => days.filter(|d| (1.0..=7.0).contains(d)),
        Some(_) => match fill {
            InactiveFill::Null => None,
            InactiveFill::Zero => Some(0.0),
        },
        None => None,
    }
}

fn is_blank(value: Option<f64>) -> bool {
    value.map_or(true, |v| v == 0.0)
}

fn is_multiple_of_five(value: f64) -> bool {
    value % 5.0 == 0.0
}

/// Repair the hours answer
///
/// Accepted as-is: 0-16 (whole numbers only when fractional hours are split).
/// 20-55 in steps of five with no competing minutes is a minutes value typed
/// into the hours field and moves across. A fractional hour below 17 with no
/// competing minutes is split into whole hours and rounded minutes when the
/// layout allows it.
pub fn repair_hours(time: DailyTime, policy: &LayoutPolicy) -> DailyTime {
    let Some(hours) = time.hours else {
        return time;
    };
    let whole = hours.fract() == 0.0;
    let minutes_free = is_blank(time.minutes);

    if (0.0..=MAX_HOURS_PER_DAY).contains(&hours) && (whole || !policy.split_fractional_hours) {
        return time;
    }
    if (20.0..60.0).contains(&hours) && is_multiple_of_five(hours) && minutes_free {
        return DailyTime::new(Some(0.0), Some(hours));
    }
    if policy.split_fractional_hours
        && !whole
        && hours > 0.0
        && hours.trunc() <= MAX_HOURS_PER_DAY
        && minutes_free
    {
        return DailyTime::new(Some(hours.trunc()), Some((hours.fract() * 60.0).round()));
    }
    DailyTime::new(None, time.minutes)
}

/// Repair the minutes answer; must run after [`repair_hours`]
///
/// 10-59 is accepted. Whole hours typed into the minutes field (a multiple of
/// five, at least 60, no competing hours) move to the hours field and the
/// remainder is discarded. Answers under ten minutes are dropped or floored to
/// zero depending on the layout.
pub fn repair_minutes(time: DailyTime, policy: &LayoutPolicy) -> DailyTime {
    let Some(minutes) = time.minutes else {
        return time;
    };

    if (0.0..10.0).contains(&minutes) {
        let minutes = match policy.short_minutes {
            ShortMinutes::Drop => None,
            ShortMinutes::Floor => Some(0.0),
        };
        return DailyTime::new(time.hours, minutes);
    }
    if (10.0..60.0).contains(&minutes) {
        return time;
    }
    let hours = (minutes / 60.0).floor();
    if minutes >= 60.0
        && is_multiple_of_five(minutes)
        && is_blank(time.hours)
        && hours <= MAX_HOURS_PER_DAY
    {
        return DailyTime::new(Some(hours), Some(0.0));
    }
    DailyTime::new(time.hours, None)
}

/// Full hours/minutes repair in the required order
pub fn repair_daily_time(time: DailyTime, policy: &LayoutPolicy) -> DailyTime {
    repair_minutes(repair_hours(time, policy), policy)
}

/// Null the legacy missing code
pub fn drop_sentinel(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != SITTING_SENTINEL)
}

/// Cleaning stage over a whole table
pub struct Cleaner;

impl Cleaner {
    /// Clean every category of the table in place
    ///
    /// `repair_sitting` enables the missing-code repair of legacy sitting fields.
    pub fn clean(
        table: &mut Table,
        fields: &FieldRegistry,
        policy: &LayoutPolicy,
        repair_sitting: bool,
    ) -> Result<CleaningStats, HarmoniseError> {
        let mut stats = CleaningStats::default();

        for gate in &fields.gates {
            if !table.contains(&gate.column) {
                debug!(column = %gate.column, "gate flag absent, skipping");
                continue;
            }
            let members: Vec<&CategoryFields> =
                gate.members.iter().map(|&i| &fields.categories[i]).collect();
            stats.gated_rows += apply_gate(table, &gate.column, &members)?;
        }

        for category in fields.activity_categories() {
            clean_activity(table, category, policy, &mut stats)?;
        }

        for category in fields.present_sedentary(table) {
            if repair_sitting {
                stats.sentinels += strip_sentinels(table, category)?;
            }
            if policy.repair_sedentary {
                stats.time_changed += repair_time_columns(table, category, policy)?;
            }
        }

        debug!(
            invalid_flags = stats.invalid_flags,
            days_changed = stats.days_changed,
            time_changed = stats.time_changed,
            gated_rows = stats.gated_rows,
            sentinels = stats.sentinels,
            "cleaning complete"
        );
        Ok(stats)
    }
}

/// Sanitize a screening flag and void its categories where it is 0
fn apply_gate(
    table: &mut Table,
    flag: &str,
    members: &[&CategoryFields],
) -> Result<usize, HarmoniseError> {
    let values: Vec<Option<f64>> = table.numeric(flag)?.iter().map(|&v| sanitize_flag(v)).collect();
    let closed: Vec<bool> = values.iter().map(|v| *v == Some(0.0)).collect();
    table.set_numeric(flag, values)?;

    for category in members {
        for column in category.inputs() {
            let nulled: Vec<Option<f64>> = table
                .numeric(column)?
                .iter()
                .zip(&closed)
                .map(|(&v, &closed)| if closed { None } else { v })
                .collect();
            table.set_numeric(column, nulled)?;
        }
    }
    Ok(closed.iter().filter(|c| **c).count())
}

fn clean_activity(
    table: &mut Table,
    category: &CategoryFields,
    policy: &LayoutPolicy,
    stats: &mut CleaningStats,
) -> Result<(), HarmoniseError> {
    let (Some(weekly_col), Some(days_col)) = (&category.weekly, &category.days) else {
        return Ok(());
    };

    let raw_weekly = table.numeric(weekly_col)?;
    let weekly: Vec<Option<f64>> = raw_weekly.iter().map(|&v| sanitize_flag(v)).collect();
    stats.invalid_flags += raw_weekly
        .iter()
        .zip(&weekly)
        .filter(|(raw, clean)| raw != clean)
        .count();

    let raw_days = table.numeric(days_col)?;
    let days: Vec<Option<f64>> = raw_days
        .iter()
        .zip(&weekly)
        .map(|(&d, &w)| bound_days(w, d, policy.inactive_fill))
        .collect();
    stats.days_changed += raw_days.iter().zip(&days).filter(|(a, b)| a != b).count();

    table.set_numeric(weekly_col, weekly)?;
    table.set_numeric(days_col, days)?;
    stats.time_changed += repair_time_columns(table, category, policy)?;
    Ok(())
}

fn repair_time_columns(
    table: &mut Table,
    category: &CategoryFields,
    policy: &LayoutPolicy,
) -> Result<usize, HarmoniseError> {
    let hours = table.numeric(&category.hours)?;
    let minutes = table.numeric(&category.minutes)?;

    let mut changed = 0;
    let mut new_hours = Vec::with_capacity(hours.len());
    let mut new_minutes = Vec::with_capacity(minutes.len());
    for (&h, &m) in hours.iter().zip(minutes) {
        let repaired = repair_daily_time(DailyTime::new(h, m), policy);
        changed += usize::from(repaired.hours != h) + usize::from(repaired.minutes != m);
        new_hours.push(repaired.hours);
        new_minutes.push(repaired.minutes);
    }

    table.set_numeric(&category.hours, new_hours)?;
    table.set_numeric(&category.minutes, new_minutes)?;
    Ok(changed)
}

fn strip_sentinels(table: &mut Table, category: &CategoryFields) -> Result<usize, HarmoniseError> {
    let mut found = 0;
    for column in [&category.hours, &category.minutes] {
        let values = table.numeric(column)?;
        found += values.iter().filter(|v| **v == Some(SITTING_SENTINEL)).count();
        let cleaned = values.iter().map(|&v| drop_sentinel(v)).collect();
        table.set_numeric(column, cleaned)?;
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use pretty_assertions::assert_eq;

    fn wide() -> LayoutPolicy {
        Catalog::wide().policy
    }

    fn domain() -> LayoutPolicy {
        Catalog::domain().policy
    }

    fn repaired(hours: Option<f64>, minutes: Option<f64>, policy: &LayoutPolicy) -> (Option<f64>, Option<f64>) {
        let time = repair_daily_time(DailyTime::new(hours, minutes), policy);
        (time.hours, time.minutes)
    }

    #[test]
    fn test_sanitize_flag() {
        assert_eq!(sanitize_flag(Some(1.0)), Some(1.0));
        assert_eq!(sanitize_flag(Some(0.0)), Some(0.0));
        assert_eq!(sanitize_flag(Some(999.0)), None);
        assert_eq!(sanitize_flag(Some(2.0)), None);
        assert_eq!(sanitize_flag(None), None);
    }

    #[test]
    fn test_bound_days_by_layout() {
        assert_eq!(bound_days(Some(1.0), Some(7.0), InactiveFill::Null), Some(7.0));
        assert_eq!(bound_days(Some(1.0), Some(8.0), InactiveFill::Null), None);
        assert_eq!(bound_days(Some(1.0), Some(0.0), InactiveFill::Zero), None);
        assert_eq!(bound_days(Some(0.0), Some(3.0), InactiveFill::Null), None);
        assert_eq!(bound_days(Some(0.0), Some(3.0), InactiveFill::Zero), Some(0.0));
        assert_eq!(bound_days(None, Some(3.0), InactiveFill::Zero), None);
    }

    #[test]
    fn test_hours_typed_as_minutes_move_across() {
        for policy in [wide(), domain()] {
            assert_eq!(repaired(Some(25.0), None, &policy), (Some(0.0), Some(25.0)));
            assert_eq!(repaired(Some(30.0), Some(0.0), &policy), (Some(0.0), Some(30.0)));
            // competing minutes: hours cannot be trusted
            assert_eq!(repaired(Some(30.0), Some(15.0), &policy), (None, Some(15.0)));
            // not a multiple of five
            assert_eq!(repaired(Some(23.0), None, &policy), (None, None));
            assert_eq!(repaired(Some(60.0), None, &policy), (None, None));
            assert_eq!(repaired(Some(999.0), None, &policy), (None, None));
        }
    }

    #[test]
    fn test_minutes_typed_as_hours_move_across() {
        for policy in [wide(), domain()] {
            assert_eq!(repaired(None, Some(90.0), &policy), (Some(1.0), Some(0.0)));
            assert_eq!(repaired(Some(0.0), Some(120.0), &policy), (Some(2.0), Some(0.0)));
            assert_eq!(repaired(Some(2.0), Some(120.0), &policy), (Some(2.0), None));
            assert_eq!(repaired(None, Some(999.0), &policy), (None, None));
            assert_eq!(repaired(None, Some(1200.0), &policy), (None, None));
        }
    }

    #[test]
    fn test_hours_repair_does_not_retrigger_minutes_repair() {
        // 45 moved into minutes stays there instead of being read back as hours
        assert_eq!(repaired(Some(45.0), None, &wide()), (Some(0.0), Some(45.0)));
    }

    #[test]
    fn test_short_minutes_by_layout() {
        assert_eq!(repaired(Some(1.0), Some(5.0), &wide()), (Some(1.0), None));
        assert_eq!(repaired(Some(1.0), Some(5.0), &domain()), (Some(1.0), Some(0.0)));
        assert_eq!(repaired(Some(1.0), Some(30.0), &wide()), (Some(1.0), Some(30.0)));
    }

    #[test]
    fn test_fractional_hours() {
        assert_eq!(repaired(Some(1.5), None, &domain()), (Some(1.0), Some(30.0)));
        assert_eq!(repaired(Some(1.5), Some(20.0), &domain()), (None, Some(20.0)));
        assert_eq!(repaired(Some(1.5), None, &wide()), (Some(1.5), None));
    }

    #[test]
    fn test_fractional_hours_round_to_whole_minutes() {
        assert_eq!(repaired(Some(1.3), None, &domain()), (Some(1.0), Some(18.0)));
        assert_eq!(repaired(Some(16.5), Some(0.0), &domain()), (Some(16.0), Some(30.0)));
        assert_eq!(repaired(Some(17.5), None, &domain()), (None, None));
        assert_eq!(repaired(Some(16.5), None, &wide()), (None, None));
    }

    #[test]
    fn test_negative_answers_are_nulled() {
        assert_eq!(repaired(Some(-1.0), Some(-5.0), &wide()), (None, None));
    }

    #[test]
    fn test_clean_table_with_gate() {
        let catalog = Catalog::domain();
        let fields = FieldRegistry::new("G217", &catalog);
        let mut columns = vec![("G217_IPAQ_JOB".to_string(), vec![Some(0.0), Some(1.0)])];
        for category in fields.activity_categories() {
            for column in category.inputs() {
                columns.push((column.to_string(), vec![Some(1.0), Some(1.0)]));
            }
        }
        let mut table = Table::from_numeric(columns).unwrap();

        let stats = Cleaner::clean(&mut table, &fields, &catalog.policy, false).unwrap();

        assert_eq!(stats.gated_rows, 1);
        assert_eq!(table.numeric("G217_IPAQ_JOB_VIG").unwrap(), &[None, Some(1.0)]);
        assert_eq!(table.numeric("G217_IPAQ_JOB_VIG_HPD").unwrap(), &[None, Some(1.0)]);
        assert_eq!(table.numeric("G217_IPAQ_LSR_VIG_D").unwrap(), &[Some(1.0), Some(1.0)]);
        // one minute floors to zero
        assert_eq!(table.numeric("G217_IPAQ_LSR_VIG_MPD").unwrap(), &[Some(0.0), Some(0.0)]);
    }

    #[test]
    fn test_sitting_sentinel_only_on_request() {
        let catalog = Catalog::wide();
        let fields = FieldRegistry::new("G222", &catalog);
        let mut columns: Vec<(String, Vec<Option<f64>>)> = Vec::new();
        for category in fields.activity_categories() {
            for column in category.inputs() {
                columns.push((column.to_string(), vec![None]));
            }
        }
        columns.push(("G222_IPAQ_SIT_WD_HPD".to_string(), vec![Some(999.0)]));
        columns.push(("G222_IPAQ_SIT_WD_MPD".to_string(), vec![Some(30.0)]));
        let table = Table::from_numeric(columns).unwrap();

        let mut untouched = table.clone();
        Cleaner::clean(&mut untouched, &fields, &catalog.policy, false).unwrap();
        assert_eq!(untouched.value(0, "G222_IPAQ_SIT_WD_HPD"), Some(999.0));

        let mut repaired = table;
        let stats = Cleaner::clean(&mut repaired, &fields, &catalog.policy, true).unwrap();
        assert_eq!(stats.sentinels, 1);
        assert_eq!(repaired.value(0, "G222_IPAQ_SIT_WD_HPD"), None);
        assert_eq!(repaired.value(0, "G222_IPAQ_SIT_WD_MPD"), Some(30.0));
    }
}
