//! Check vocabulary
//!
//! A [`Check`] asserts something about one or more columns, optionally only on
//! the rows of a segment (rows where a controlling column holds one value).
//! Checks never modify the table.

use crate::table::{format_number, Table};
use crate::validation::report::{CheckOutcome, CheckStatus, Violation};

/// Segment value that selects rows where the controlling column is null
pub const NULL_SEGMENT: f64 = -1.0;

/// What a check asserts about each tested value
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    /// Equal to an independently recomputed value of the same row
    EqualsExpected(Vec<Option<f64>>),
    EqualsValue(f64),
    /// Inclusive range
    Between(f64, f64),
    /// Strictly below the left bound or strictly above the right bound
    Outside(f64, f64),
    Null,
    InSet(Vec<Option<f64>>),
    WholeNumber,
}

impl Assertion {
    pub fn name(&self) -> &'static str {
        match self {
            Assertion::EqualsExpected(_) => "equals_expected",
            Assertion::EqualsValue(_) => "equals_value",
            Assertion::Between(..) => "between",
            Assertion::Outside(..) => "outside",
            Assertion::Null => "null",
            Assertion::InSet(_) => "in_set",
            Assertion::WholeNumber => "whole_number",
        }
    }

    fn expected(&self, row: usize, fill_null: bool) -> Option<f64> {
        match self {
            Assertion::EqualsExpected(values) => fill(values.get(row).copied().flatten(), fill_null),
            Assertion::EqualsValue(v) => Some(*v),
            _ => None,
        }
    }

    fn describe(&self, row: usize, fill_null: bool) -> String {
        match self {
            Assertion::EqualsExpected(_) => format_value(self.expected(row, fill_null)),
            Assertion::EqualsValue(v) => format_number(*v),
            Assertion::Between(l, r) => format!("in [{}, {}]", format_number(*l), format_number(*r)),
            Assertion::Outside(l, r) => {
                format!("outside [{}, {}]", format_number(*l), format_number(*r))
            }
            Assertion::Null => "null".to_string(),
            Assertion::InSet(values) => format!(
                "one of {{{}}}",
                values.iter().map(|v| format_value(*v)).collect::<Vec<_>>().join(", ")
            ),
            Assertion::WholeNumber => "whole number".to_string(),
        }
    }

    fn holds(&self, actual: Option<f64>, row: usize, na_pass: bool, fill_null: bool) -> bool {
        let actual = fill(actual, fill_null);
        match (self, actual) {
            (Assertion::EqualsExpected(_), _) => {
                let expected = self.expected(row, fill_null);
                if na_pass && (actual.is_none() || expected.is_none()) {
                    return true;
                }
                actual == expected
            }
            (Assertion::Null, _) => actual.is_none(),
            (Assertion::InSet(values), _) => values.contains(&actual),
            (_, None) => na_pass,
            (Assertion::EqualsValue(v), Some(a)) => a == *v,
            (Assertion::Between(l, r), Some(a)) => a >= *l && a <= *r,
            (Assertion::Outside(l, r), Some(a)) => a < *l || a > *r,
            (Assertion::WholeNumber, Some(a)) => a.fract() == 0.0,
        }
    }
}

fn fill(value: Option<f64>, fill_null: bool) -> Option<f64> {
    if fill_null {
        value.or(Some(0.0))
    } else {
        value
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "null".to_string(), format_number)
}

/// Rows where `column` equals `value`; [`NULL_SEGMENT`] also selects nulls
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub column: String,
    pub value: f64,
}

impl Segment {
    fn selects(&self, value: Option<f64>) -> bool {
        value.unwrap_or(NULL_SEGMENT) == self.value
    }

    fn describe(&self) -> String {
        if self.value == NULL_SEGMENT {
            format!("{} is null", self.column)
        } else {
            format!("{} = {}", self.column, format_number(self.value))
        }
    }
}

/// One reconciliation rule
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub brief: String,
    pub columns: Vec<String>,
    pub assertion: Assertion,
    pub segment: Option<Segment>,
    /// A null on either side counts as a pass
    pub na_pass: bool,
    /// Both sides read null as 0 before comparing
    pub fill_null: bool,
}

impl Check {
    pub fn new<S: Into<String>>(brief: impl Into<String>, columns: Vec<S>, assertion: Assertion) -> Self {
        Self {
            brief: brief.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            assertion,
            segment: None,
            na_pass: false,
            fill_null: false,
        }
    }

    pub fn segment(mut self, column: impl Into<String>, value: f64) -> Self {
        self.segment = Some(Segment {
            column: column.into(),
            value,
        });
        self
    }

    pub fn na_pass(mut self) -> Self {
        self.na_pass = true;
        self
    }

    pub fn fill_null(mut self) -> Self {
        self.fill_null = true;
        self
    }

    /// Evaluate the check over the whole table
    ///
    /// Every (row, column) pair in the segment is one test unit. Checks whose
    /// columns are missing are skipped rather than failed.
    pub fn evaluate(&self, table: &Table, key_column: &str, max_violations: usize) -> CheckOutcome {
        let mut outcome = CheckOutcome {
            assertion: self.assertion.name().to_string(),
            brief: self.brief.clone(),
            columns: self.columns.clone(),
            segment: self.segment.as_ref().map(Segment::describe),
            status: CheckStatus::Passed,
            tested: 0,
            failed: 0,
            violations: Vec::new(),
            note: None,
        };

        let mut required = self.columns.iter().chain(self.segment.iter().map(|s| &s.column));
        if let Some(missing) = required.find(|c| table.numeric(c).is_err()) {
            outcome.status = CheckStatus::Skipped;
            outcome.note = Some(format!("column {} is missing or not numeric", missing));
            return outcome;
        }

        for row in 0..table.row_count() {
            if let Some(segment) = &self.segment {
                if !segment.selects(table.value(row, &segment.column)) {
                    continue;
                }
            }
            for column in &self.columns {
                outcome.tested += 1;
                let actual = table.value(row, column);
                if self.assertion.holds(actual, row, self.na_pass, self.fill_null) {
                    continue;
                }
                outcome.failed += 1;
                if outcome.violations.len() < max_violations {
                    outcome.violations.push(Violation {
                        row,
                        key: table.row_key(key_column, row),
                        column: column.clone(),
                        expected: self.assertion.describe(row, self.fill_null),
                        actual,
                    });
                }
            }
        }

        if outcome.failed > 0 {
            outcome.status = CheckStatus::Failed;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table() -> Table {
        Table::from_numeric(vec![
            ("ID", vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)]),
            ("W", vec![Some(1.0), Some(1.0), Some(0.0), None]),
            ("D", vec![Some(3.0), Some(9.0), None, None]),
            ("MET", vec![Some(10.0), None, Some(0.0), None]),
        ])
        .unwrap()
    }

    #[test]
    fn test_segmented_between_reports_violation() {
        let check = Check::new("days", vec!["D"], Assertion::Between(1.0, 7.0))
            .segment("W", 1.0)
            .na_pass();
        let outcome = check.evaluate(&table(), "ID", 10);

        assert_eq!(outcome.status, CheckStatus::Failed);
        assert_eq!(outcome.tested, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(
            outcome.violations,
            vec![Violation {
                row: 1,
                key: Some("2".to_string()),
                column: "D".to_string(),
                expected: "in [1, 7]".to_string(),
                actual: Some(9.0),
            }]
        );
        assert_eq!(outcome.segment.as_deref(), Some("W = 1"));
    }

    #[test]
    fn test_null_segment_selects_missing_flags() {
        let check = Check::new("unknown", vec!["D", "MET"], Assertion::Null).segment("W", NULL_SEGMENT);
        let outcome = check.evaluate(&table(), "ID", 10);
        assert_eq!(outcome.tested, 2);
        assert_eq!(outcome.status, CheckStatus::Passed);
    }

    #[test]
    fn test_na_pass_and_fill_null() {
        let expected = vec![Some(10.0), Some(5.0), None, None];
        let strict = Check::new("met", vec!["MET"], Assertion::EqualsExpected(expected.clone()));
        assert_eq!(strict.evaluate(&table(), "ID", 10).failed, 2);

        let lenient = strict.clone().na_pass();
        assert_eq!(lenient.evaluate(&table(), "ID", 10).failed, 0);

        // row 1 compares 5 with 0 once nulls are filled; row 2 compares 0 with 0
        let filled = strict.fill_null();
        let outcome = filled.evaluate(&table(), "ID", 10);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.violations[0].expected, "5");
    }

    #[test]
    fn test_in_set_outside_and_whole_number() {
        let t = Table::from_numeric(vec![("X", vec![Some(0.0), Some(5.0), None, Some(1.5)])]).unwrap();

        let in_set = Check::new("x", vec!["X"], Assertion::InSet(vec![Some(0.0), Some(1.0), None]));
        assert_eq!(in_set.evaluate(&t, "ID", 10).failed, 2);

        let outside = Check::new("x", vec!["X"], Assertion::Outside(1.0, 9.0)).na_pass();
        assert_eq!(outside.evaluate(&t, "ID", 10).failed, 2);

        let whole = Check::new("x", vec!["X"], Assertion::WholeNumber).fill_null();
        let outcome = whole.evaluate(&t, "ID", 10);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.violations[0].key, None);
    }

    #[test]
    fn test_missing_column_skips_and_caps_violations() {
        let skipped = Check::new("x", vec!["NOPE"], Assertion::Null).evaluate(&table(), "ID", 10);
        assert_eq!(skipped.status, CheckStatus::Skipped);
        assert_eq!(skipped.tested, 0);

        let capped = Check::new("w", vec!["W"], Assertion::EqualsValue(5.0)).evaluate(&table(), "ID", 1);
        assert_eq!(capped.failed, 4);
        assert_eq!(capped.violations.len(), 1);
    }
}
