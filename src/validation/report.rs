//! Validation reports

use crate::catalog::Layout;
use crate::error::HarmoniseError;
use crate::table::format_number;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passed,
    Failed,
    Skipped,
}

/// One row/column pair that broke a check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub row: usize,
    /// Record identifier of the row, when the table has one
    pub key: Option<String>,
    pub column: String,
    pub expected: String,
    pub actual: Option<f64>,
}

/// Result of evaluating one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub assertion: String,
    pub brief: String,
    pub columns: Vec<String>,
    pub segment: Option<String>,
    pub status: CheckStatus,
    pub tested: usize,
    pub failed: usize,
    pub violations: Vec<Violation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Report of one validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub dataset: String,
    pub layout: Layout,
    pub total_checks: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<CheckOutcome>,
}

impl ValidationReport {
    pub fn new(dataset: &str, layout: Layout, outcomes: Vec<CheckOutcome>) -> Self {
        let count = |status| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            dataset: dataset.to_string(),
            layout,
            total_checks: outcomes.len(),
            passed: count(CheckStatus::Passed),
            failed: count(CheckStatus::Failed),
            skipped: count(CheckStatus::Skipped),
            outcomes,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| o.status == CheckStatus::Failed)
    }

    /// Write the report as pretty JSON into `dir`, returning the file path
    pub fn save(&self, dir: &Path) -> Result<PathBuf, HarmoniseError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}_validation.json", self.dataset));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Plain-text rendering for terminals
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Validation Report");
        let _ = writeln!(out, "=================");
        let _ = writeln!(out, "Dataset:  {} ({})", self.dataset, self.layout.as_str());
        let _ = writeln!(out, "Run:      {}", self.run_id);
        let _ = writeln!(out, "Checks:   {}", self.total_checks);
        let _ = writeln!(out, "Passed:   {}", self.passed);
        let _ = writeln!(out, "Failed:   {}", self.failed);
        let _ = writeln!(out, "Skipped:  {}", self.skipped);

        if self.failed > 0 {
            let _ = writeln!(out, "\nFailures:");
            for outcome in self.failures() {
                let scope = outcome
                    .segment
                    .as_deref()
                    .map(|s| format!(" where {}", s))
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "  - {} [{}{}]: {} of {} failed",
                    outcome.brief,
                    outcome.assertion,
                    scope,
                    outcome.failed,
                    outcome.tested
                );
                for v in &outcome.violations {
                    let _ = writeln!(
                        out,
                        "      row {} (id {}): {} = {}, expected {}",
                        v.row,
                        v.key.as_deref().unwrap_or("-"),
                        v.column,
                        v.actual.map_or_else(|| "null".to_string(), format_number),
                        v.expected
                    );
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn outcome(status: CheckStatus, failed: usize) -> CheckOutcome {
        CheckOutcome {
            assertion: "between".to_string(),
            brief: "Days per week".to_string(),
            columns: vec!["G1_IPAQ_VIG_D".to_string()],
            segment: Some("G1_IPAQ_VIG_W = 1".to_string()),
            status,
            tested: 4,
            failed,
            violations: (0..failed)
                .map(|row| Violation {
                    row,
                    key: Some(format!("{}", row + 100)),
                    column: "G1_IPAQ_VIG_D".to_string(),
                    expected: "in [1, 7]".to_string(),
                    actual: Some(9.0),
                })
                .collect(),
            note: None,
        }
    }

    #[test]
    fn test_counts_and_text() {
        let report = ValidationReport::new(
            "G1",
            Layout::Wide,
            vec![
                outcome(CheckStatus::Passed, 0),
                outcome(CheckStatus::Failed, 1),
                outcome(CheckStatus::Skipped, 0),
            ],
        );

        assert_eq!(report.total_checks, 3);
        assert_eq!((report.passed, report.failed, report.skipped), (1, 1, 1));
        assert!(!report.is_success());

        let text = report.to_text();
        assert!(text.contains("Days per week [between where G1_IPAQ_VIG_W = 1]: 1 of 4 failed"));
        assert!(text.contains("row 0 (id 100): G1_IPAQ_VIG_D = 9, expected in [1, 7]"));
    }

    #[test]
    fn test_json_shape() {
        let report = ValidationReport::new("G1", Layout::Domain, vec![outcome(CheckStatus::Passed, 0)]);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["layout"], "domain");
        assert_eq!(value["outcomes"][0]["status"], "passed");
        assert!(value["outcomes"][0].get("note").is_none());
        assert_eq!(value["run_id"].as_str().map(str::len), Some(36));
    }

    #[test]
    fn test_save_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let report = ValidationReport::new("G126", Layout::Wide, vec![outcome(CheckStatus::Failed, 2)]);
        let path = report.save(&dir.path().join("reports")).unwrap();

        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("G126_validation.json"));
        let saved: ValidationReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved, report);
    }
}
