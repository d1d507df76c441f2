//! Reconciliation suites for the two layouts
//!
//! A suite is built against a concrete table: recomputed expectations are
//! materialised per row when the suite is built, then every check is evaluated
//! against the stored columns.

use crate::catalog::{Catalog, Layout, SEDENTARY_CAP};
use crate::error::HarmoniseError;
use crate::fields::{CategoryFields, FieldRegistry};
use crate::table::Table;
use crate::validation::check::{Assertion, Check, NULL_SEGMENT};
use crate::validation::recompute::{self, Bucket};

const FLAG_VALUES: [Option<f64>; 3] = [Some(0.0), Some(1.0), None];

/// Suite for the table's layout
pub fn suite(table: &Table, fields: &FieldRegistry, catalog: &Catalog) -> Result<Vec<Check>, HarmoniseError> {
    match catalog.layout {
        Layout::Wide => wide_suite(table, fields, catalog),
        Layout::Domain => domain_suite(table, fields, catalog),
    }
}

/// Short-form suite: per-category recomputes and segment bounds, totals and class
pub fn wide_suite(
    table: &Table,
    fields: &FieldRegistry,
    catalog: &Catalog,
) -> Result<Vec<Check>, HarmoniseError> {
    let mut checks = Vec::new();

    for category in fields.activity_categories() {
        let (Some(weekly), Some(days)) = (category.weekly.as_deref(), category.days.as_deref()) else {
            continue;
        };
        let hours = table.numeric_or_null(&category.hours)?;
        let mpd = table.numeric_or_null(&category.minutes)?;

        if let Some(mins) = &category.total_minutes {
            let expected = hours
                .iter()
                .zip(&mpd)
                .map(|(&h, &m)| recompute::minutes_per_day(h, m))
                .collect();
            checks.push(
                Check::new(
                    format!("{} minutes/day equal min(180, HPD*60 + MPD)", category.code),
                    vec![mins.as_str()],
                    Assertion::EqualsExpected(expected),
                )
                .na_pass(),
            );

            if let (Some(met), Some(factor)) = (&category.met, category.factor) {
                let stored_mins = table.numeric_or_null(mins)?;
                let stored_days = table.numeric_or_null(days)?;
                let expected = stored_mins
                    .iter()
                    .zip(&stored_days)
                    .map(|(&m, &d)| Some(recompute::met_from_minutes(m, d, factor, catalog.met_decimals)))
                    .collect();
                checks.push(
                    Check::new(
                        format!("{} MET equals D * MINS * {}", category.code, factor),
                        vec![met.as_str()],
                        Assertion::EqualsExpected(expected),
                    )
                    .fill_null(),
                );
            }
        }

        checks.push(flag_check(category, weekly));
        checks.extend(active_bounds(category, weekly, false));
        if let Some(mins) = &category.total_minutes {
            checks.push(
                Check::new(
                    format!("{} minutes/day within the daily cap", category.code),
                    vec![mins.as_str()],
                    Assertion::Between(0.0, 180.0),
                )
                .segment(weekly, 1.0)
                .na_pass(),
            );
        }

        checks.push(
            Check::new(
                format!("{} answers are null when the weekly flag is 0", category.code),
                vec![days, category.hours.as_str(), category.minutes.as_str()],
                Assertion::Null,
            )
            .segment(weekly, 0.0),
        );
        let derived: Vec<&str> = [category.total_minutes.as_deref(), category.met.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        checks.push(
            Check::new(
                format!("{} minutes and MET are 0 when the weekly flag is 0", category.code),
                derived,
                Assertion::EqualsValue(0.0),
            )
            .segment(weekly, 0.0),
        );
        checks.push(
            Check::new(
                format!("{} fields are null when the weekly flag is missing", category.code),
                category.answers_and_derived().collect::<Vec<_>>(),
                Assertion::Null,
            )
            .segment(weekly, NULL_SEGMENT),
        );
    }

    let total_met = expected_total_met(table, fields, catalog)?;
    checks.push(total_met_check(&total_met, fields));
    checks.push(classification_check(table, fields, catalog, &total_met));
    checks.extend(sedentary_checks(table, fields, catalog.policy.repair_sedentary)?);
    Ok(checks)
}

/// Long-form suite: screening gate, per-category bounds, domain and intensity
/// totals recomputed from the answers, grand total, class and sedentary time
pub fn domain_suite(
    table: &Table,
    fields: &FieldRegistry,
    catalog: &Catalog,
) -> Result<Vec<Check>, HarmoniseError> {
    let mut checks = Vec::new();

    for gate in &fields.gates {
        checks.push(Check::new(
            format!("{} is 0, 1 or null", gate.column),
            vec![gate.column.as_str()],
            Assertion::InSet(FLAG_VALUES.to_vec()),
        ));
        let voided: Vec<&str> = gate
            .members
            .iter()
            .flat_map(|&i| {
                let c = &fields.categories[i];
                c.weekly.as_deref().into_iter().chain(c.answers_and_derived())
            })
            .collect();
        checks.push(
            Check::new(
                format!("Gated categories are null when {} is 0", gate.column),
                voided,
                Assertion::Null,
            )
            .segment(gate.column.as_str(), 0.0),
        );
    }

    let mut category_mets: Vec<Vec<Option<f64>>> = Vec::with_capacity(fields.categories.len());
    for category in &fields.categories {
        let Some(weekly) = category.weekly.as_deref() else {
            category_mets.push(vec![None; table.row_count()]);
            continue;
        };

        checks.push(flag_check(category, weekly));
        checks.push(
            Check::new(
                format!("{} answers are 0 when the weekly flag is 0", category.code),
                category.answers_and_derived().collect::<Vec<_>>(),
                Assertion::EqualsValue(0.0),
            )
            .segment(weekly, 0.0)
            .na_pass(),
        );
        checks.extend(active_bounds(category, weekly, true));

        let mets = answer_mets(table, category, catalog)?;
        if let Some(met) = &category.met {
            checks.push(
                Check::new(
                    format!("{} MET recomputed from D, HPD and MPD", category.code),
                    vec![met.as_str()],
                    Assertion::EqualsExpected(mets.clone()),
                )
                .na_pass(),
            );
        }
        category_mets.push(mets);
    }

    for aggregate in fields.domain_totals.iter().chain(&fields.intensity) {
        let expected = (0..table.row_count())
            .map(|row| {
                let members: Vec<Option<f64>> =
                    aggregate.members.iter().map(|&i| category_mets[i][row]).collect();
                recompute::total(&members, catalog.met_decimals)
            })
            .collect();
        checks.push(
            Check::new(
                format!("{} equals the sum of its member categories", aggregate.name),
                vec![aggregate.column.as_str()],
                Assertion::EqualsExpected(expected),
            )
            .na_pass(),
        );
    }

    let total_met = expected_total_met(table, fields, catalog)?;
    checks.push(total_met_check(&total_met, fields));
    checks.push(classification_check(table, fields, catalog, &total_met));
    checks.extend(sedentary_checks(table, fields, catalog.policy.repair_sedentary)?);
    Ok(checks)
}

fn flag_check(category: &CategoryFields, weekly: &str) -> Check {
    Check::new(
        format!("{} weekly flag is 0, 1 or null", category.code),
        vec![weekly],
        Assertion::InSet(FLAG_VALUES.to_vec()),
    )
}

/// Bounds on the answers of respondents who reported the activity
fn active_bounds(category: &CategoryFields, weekly: &str, whole_hours: bool) -> Vec<Check> {
    let mut checks = Vec::new();
    if let Some(days) = category.days.as_deref() {
        checks.push(
            Check::new(
                format!("{} days per week within 1-7", category.code),
                vec![days],
                Assertion::Between(1.0, 7.0),
            )
            .segment(weekly, 1.0)
            .na_pass(),
        );
    }
    checks.push(
        Check::new(
            format!("{} hours per day within 0-16", category.code),
            vec![category.hours.as_str()],
            Assertion::Between(0.0, 16.0),
        )
        .segment(weekly, 1.0)
        .na_pass(),
    );
    if whole_hours {
        checks.push(
            Check::new(
                format!("{} hours per day is a whole number", category.code),
                vec![category.hours.as_str()],
                Assertion::WholeNumber,
            )
            .fill_null(),
        );
    }
    checks.push(
        Check::new(
            format!("{} minutes per day within 0-60", category.code),
            vec![category.minutes.as_str()],
            Assertion::Between(0.0, 60.0),
        )
        .segment(weekly, 1.0)
        .na_pass(),
    );
    checks.push(
        Check::new(
            format!("{} minutes per day not within 1-9", category.code),
            vec![category.minutes.as_str()],
            Assertion::Outside(1.0, 9.0),
        )
        .segment(weekly, 1.0)
        .na_pass(),
    );
    checks
}

fn answer_mets(
    table: &Table,
    category: &CategoryFields,
    catalog: &Catalog,
) -> Result<Vec<Option<f64>>, HarmoniseError> {
    let (Some(weekly), Some(days), Some(factor)) =
        (category.weekly.as_deref(), category.days.as_deref(), category.factor)
    else {
        return Ok(vec![None; table.row_count()]);
    };
    let weekly = table.numeric_or_null(weekly)?;
    let days = table.numeric_or_null(days)?;
    let hours = table.numeric_or_null(&category.hours)?;
    let minutes = table.numeric_or_null(&category.minutes)?;
    Ok((0..table.row_count())
        .map(|r| recompute::met_from_answers(weekly[r], days[r], hours[r], minutes[r], factor, catalog))
        .collect())
}

/// Expected grand total per row: null when no MET category has a weekly
/// flag, otherwise the intensity totals with null read as 0
fn expected_total_met(
    table: &Table,
    fields: &FieldRegistry,
    catalog: &Catalog,
) -> Result<Vec<Option<f64>>, HarmoniseError> {
    let intensity = fields
        .intensity
        .iter()
        .map(|group| table.numeric_or_null(&group.column))
        .collect::<Result<Vec<_>, _>>()?;
    let flags = fields
        .met_categories()
        .filter_map(|c| c.weekly.as_deref())
        .map(|w| table.numeric_or_null(w))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((0..table.row_count())
        .map(|row| {
            if flags.iter().all(|flag| flag[row].is_none()) {
                return None;
            }
            let values: Vec<Option<f64>> = intensity.iter().map(|c| Some(c[row].unwrap_or(0.0))).collect();
            recompute::total(&values, catalog.met_decimals)
        })
        .collect())
}

fn total_met_check(expected: &[Option<f64>], fields: &FieldRegistry) -> Check {
    Check::new(
        "TOT_MET equals the sum of the vigorous, moderate and walking totals",
        vec![fields.total_met.as_str()],
        Assertion::EqualsExpected(expected.to_vec()),
    )
}

fn classification_check(
    table: &Table,
    fields: &FieldRegistry,
    catalog: &Catalog,
    total_met: &[Option<f64>],
) -> Check {
    let mut expected = Vec::with_capacity(table.row_count());

    for row in 0..table.row_count() {
        let bucket = |position: usize| -> Bucket {
            let Some(group) = fields.intensity.get(position) else {
                return Bucket::default();
            };
            let members = || group.members.iter().map(|&i| &fields.categories[i]);
            let days: Vec<Option<f64>> = members()
                .map(|c| c.days.as_deref().and_then(|d| table.value(row, d)))
                .collect();
            let minutes: Vec<Option<f64>> = members()
                .map(|c| reported_minutes(table, c, row))
                .collect();
            Bucket {
                days: present_sum(&days),
                minutes: present_sum(&minutes),
            }
        };
        let total_days: f64 = fields
            .met_categories()
            .filter_map(|c| c.days.as_deref())
            .filter_map(|d| table.value(row, d))
            .sum();

        expected.push(recompute::activity_level(
            total_met[row],
            bucket(0),
            bucket(1),
            bucket(2),
            total_days,
            &catalog.thresholds,
            catalog.policy.moderate_walking_rule,
        ));
    }

    Check::new(
        "CAT follows the IPAQ scoring protocol",
        vec![fields.classification.as_str()],
        Assertion::EqualsExpected(expected),
    )
}

/// Daily minutes of a category the respondent reported doing
fn reported_minutes(table: &Table, category: &CategoryFields, row: usize) -> Option<f64> {
    let weekly = category.weekly.as_deref().and_then(|w| table.value(row, w));
    if weekly != Some(1.0) {
        return None;
    }
    match category.total_minutes.as_deref() {
        Some(mins) => table.value(row, mins),
        None => recompute::minutes_per_day(table.value(row, &category.hours), table.value(row, &category.minutes)),
    }
}

fn present_sum(values: &[Option<f64>]) -> Option<f64> {
    values.iter().flatten().copied().reduce(|a, b| a + b)
}

/// Truncated totals wherever they are stored; answer bounds only when the
/// layout repairs sedentary answers
fn sedentary_checks(
    table: &Table,
    fields: &FieldRegistry,
    repaired: bool,
) -> Result<Vec<Check>, HarmoniseError> {
    let mut checks = Vec::new();
    for category in fields.present_sedentary(table) {
        if let Some(truncated) = category.truncated.as_deref().filter(|t| table.contains(t)) {
            let hours = table.numeric(&category.hours)?;
            let minutes = table.numeric(&category.minutes)?;
            let expected = hours
                .iter()
                .zip(minutes)
                .map(|(&h, &m)| recompute::truncated_sedentary(h, m))
                .collect();
            checks.push(
                Check::new(
                    format!("{} equals min({}, HPD*60 + MPD)", truncated, SEDENTARY_CAP),
                    vec![truncated],
                    Assertion::EqualsExpected(expected),
                )
                .na_pass(),
            );
        }
        if !repaired {
            continue;
        }

        let max_hours = if category.code.starts_with("LYING") { 24.0 } else { 16.0 };
        checks.push(
            Check::new(
                format!("{} hours per day within 0-{}", category.code, max_hours),
                vec![category.hours.as_str()],
                Assertion::Between(0.0, max_hours),
            )
            .na_pass(),
        );
        checks.push(
            Check::new(
                format!("{} hours per day is a whole number", category.code),
                vec![category.hours.as_str()],
                Assertion::WholeNumber,
            )
            .fill_null(),
        );
        checks.push(
            Check::new(
                format!("{} minutes per day within 0-60", category.code),
                vec![category.minutes.as_str()],
                Assertion::Between(0.0, 60.0),
            )
            .na_pass(),
        );
    }
    Ok(checks)
}
