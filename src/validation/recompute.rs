//! Independent recomputation of derived values
//!
//! The validator's own copy of the scoring formulas; nothing here calls into
//! the derivation stage.

use crate::catalog::{round_to, Catalog, ModerateWalkingRule, Thresholds, MINUTES_CAP, SEDENTARY_CAP};

fn capped_total(hours: Option<f64>, minutes: Option<f64>, cap: f64) -> Option<f64> {
    match (hours, minutes) {
        (None, None) => None,
        (h, m) => Some(f64::min(cap, h.unwrap_or(0.0) * 60.0 + m.unwrap_or(0.0))),
    }
}

/// `min(180, HPD*60 + MPD)`, null when both answers are missing
pub fn minutes_per_day(hours: Option<f64>, minutes: Option<f64>) -> Option<f64> {
    capped_total(hours, minutes, MINUTES_CAP)
}

/// `min(960, HPD*60 + MPD)`, null when both answers are missing
pub fn truncated_sedentary(hours: Option<f64>, minutes: Option<f64>) -> Option<f64> {
    capped_total(hours, minutes, SEDENTARY_CAP)
}

/// MET from stored minutes and days, nulls read as 0
pub fn met_from_minutes(minutes: Option<f64>, days: Option<f64>, factor: f64, decimals: u32) -> f64 {
    round_to(days.unwrap_or(0.0) * minutes.unwrap_or(0.0) * factor, decimals)
}

/// MET of one category recomputed from its answers
///
/// A weekly flag of 0 is a confirmed zero. Otherwise the flag must be 1, the
/// day count within a week and the daily minutes within the protocol cap and
/// at least the layout's minimum bout.
pub fn met_from_answers(
    weekly: Option<f64>,
    days: Option<f64>,
    hours: Option<f64>,
    minutes: Option<f64>,
    factor: f64,
    catalog: &Catalog,
) -> Option<f64> {
    match weekly {
        Some(w) if w == 0.0 => return Some(0.0),
        Some(w) if w == 1.0 => {}
        _ => return None,
    }
    let days = days?;
    let daily = minutes_per_day(hours, minutes)?;
    if !(1.0..=7.0).contains(&days) || daily < catalog.policy.minimum_bout_minutes {
        return None;
    }
    Some(round_to(days * daily * factor, catalog.met_decimals))
}

/// Rounded sum of the present values; null when none is present
pub fn total(values: &[Option<f64>], decimals: u32) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(round_to(present.iter().fold(0.0, |acc, v| acc + v), decimals))
}

/// Days and daily minutes reported for one intensity bucket
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bucket {
    pub days: Option<f64>,
    pub minutes: Option<f64>,
}

fn reaches(value: Option<f64>, threshold: f64) -> bool {
    matches!(value, Some(v) if v >= threshold)
}

/// Expected activity level code (0, 1 or 2); null when the total is null
pub fn activity_level(
    total_met: Option<f64>,
    vigorous: Bucket,
    moderate: Bucket,
    walking: Bucket,
    total_days: f64,
    thresholds: &Thresholds,
    rule: ModerateWalkingRule,
) -> Option<f64> {
    let met = total_met?;
    let t = thresholds;
    let vigorous_days = reaches(vigorous.days, t.high_vigorous_days);

    if vigorous_days && reaches(vigorous.minutes, t.vigorous_high_minutes) && met >= t.high_vigorous_met {
        return Some(2.0);
    }
    if total_days >= t.high_total_days && met >= t.high_total_met {
        return Some(2.0);
    }

    if vigorous_days && reaches(vigorous.minutes, t.moderate_vigorous_minutes) {
        return Some(1.0);
    }
    let days = t.moderate_walking_days;
    let minutes = t.moderate_walking_minutes;
    let combined_days = moderate.days.unwrap_or(0.0) + walking.days.unwrap_or(0.0);
    let moderate_or_walking = match rule {
        ModerateWalkingRule::Combined => {
            combined_days >= days
                && moderate.minutes.unwrap_or(0.0) + walking.minutes.unwrap_or(0.0) >= minutes
        }
        ModerateWalkingRule::PerCategory => {
            [moderate, walking]
                .iter()
                .any(|b| reaches(b.days, days) && reaches(b.minutes, minutes))
                || (combined_days >= days
                    && reaches(moderate.minutes, minutes)
                    && reaches(walking.minutes, minutes))
        }
    };
    if moderate_or_walking || (total_days >= t.moderate_total_days && met >= t.moderate_total_met) {
        return Some(1.0);
    }
    Some(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minutes_and_truncation() {
        assert_eq!(minutes_per_day(None, None), None);
        assert_eq!(minutes_per_day(Some(5.0), None), Some(180.0));
        assert_eq!(truncated_sedentary(Some(20.0), Some(0.0)), Some(960.0));
        assert_eq!(truncated_sedentary(None, Some(45.0)), Some(45.0));
    }

    #[test]
    fn test_met_from_answers() {
        let domain = Catalog::domain();
        assert_eq!(met_from_answers(Some(0.0), None, None, None, 8.0, &domain), Some(0.0));
        assert_eq!(met_from_answers(None, Some(3.0), Some(1.0), None, 8.0, &domain), None);
        assert_eq!(
            met_from_answers(Some(1.0), Some(3.0), Some(0.0), Some(45.0), 3.3, &domain),
            Some(445.5)
        );
        // below the ten-minute bout of the domain layout
        assert_eq!(met_from_answers(Some(1.0), Some(3.0), None, Some(0.0), 8.0, &domain), None);
        assert_eq!(met_from_answers(Some(1.0), Some(8.0), Some(1.0), None, 8.0, &domain), None);
    }

    #[test]
    fn test_total_keeps_null_for_empty_groups() {
        assert_eq!(total(&[None, None], 2), None);
        assert_eq!(total(&[Some(445.5), None, Some(0.0)], 2), Some(445.5));
    }

    #[test]
    fn test_activity_level_branches() {
        let t = Thresholds::default();
        let none = Bucket::default();
        let vig = Bucket {
            days: Some(3.0),
            minutes: Some(60.0),
        };
        let rule = ModerateWalkingRule::PerCategory;

        assert_eq!(activity_level(None, vig, none, none, 3.0, &t, rule), None);
        assert_eq!(activity_level(Some(1440.0), vig, none, none, 3.0, &t, rule), Some(1.0));
        assert_eq!(activity_level(Some(1500.0), vig, none, none, 3.0, &t, rule), Some(2.0));
        assert_eq!(activity_level(Some(3000.0), none, none, none, 7.0, &t, rule), Some(2.0));
        assert_eq!(activity_level(Some(2999.0), none, none, none, 7.0, &t, rule), Some(1.0));
        assert_eq!(activity_level(Some(100.0), none, none, none, 2.0, &t, rule), Some(0.0));

        let moderate = Bucket {
            days: Some(3.0),
            minutes: Some(20.0),
        };
        let walking = Bucket {
            days: Some(2.0),
            minutes: Some(15.0),
        };
        assert_eq!(activity_level(Some(300.0), none, moderate, walking, 5.0, &t, rule), Some(0.0));
        assert_eq!(
            activity_level(Some(300.0), none, moderate, walking, 5.0, &t, ModerateWalkingRule::Combined),
            Some(1.0)
        );
    }
}
