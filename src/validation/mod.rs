//! Reconciliation engine
//!
//! The validator re-derives every harmonised value from the stored answers and
//! compares it with the stored column, using segmented and null-aware checks.
//! It only reads the table and reports; it never repairs anything.

pub mod check;
pub mod recompute;
pub mod report;
pub mod suites;

pub use check::{Assertion, Check, Segment, NULL_SEGMENT};
pub use report::{CheckOutcome, CheckStatus, ValidationReport, Violation};

use crate::catalog::Catalog;
use crate::config::{DatasetConfig, EngineConfig, PathConfig, Stage};
use crate::error::HarmoniseError;
use crate::fields::FieldRegistry;
use crate::preprocess::ID_COLUMN;
use crate::store::DatasetStore;
use crate::table::Table;
use tracing::{debug, info, warn};

/// Runs the reconciliation suite of one layout against dataset tables
pub struct Validator {
    catalog: Catalog,
    fields: FieldRegistry,
    max_violations: usize,
}

impl Validator {
    pub fn new(prefix: &str, catalog: Catalog, max_violations: usize) -> Self {
        let fields = FieldRegistry::new(prefix, &catalog);
        Self {
            catalog,
            fields,
            max_violations,
        }
    }

    /// Build the suite for `table` and evaluate every check
    pub fn validate(&self, table: &Table, dataset: &str) -> Result<ValidationReport, HarmoniseError> {
        let checks = suites::suite(table, &self.fields, &self.catalog)?;
        debug!(dataset, checks = checks.len(), "reconciliation suite built");

        let outcomes: Vec<CheckOutcome> = checks
            .iter()
            .map(|check| check.evaluate(table, ID_COLUMN, self.max_violations))
            .collect();

        for outcome in outcomes.iter().filter(|o| o.status == CheckStatus::Failed) {
            warn!(
                dataset,
                check = %outcome.brief,
                failed = outcome.failed,
                tested = outcome.tested,
                "reconciliation check failed"
            );
        }

        let report = ValidationReport::new(dataset, self.catalog.layout, outcomes);
        info!(
            dataset,
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            "validation complete"
        );
        Ok(report)
    }
}

/// Load a configured dataset from one stage directory and validate it
pub fn validate_dataset(
    store: &dyn DatasetStore,
    paths: &PathConfig,
    dataset: &DatasetConfig,
    engine: &EngineConfig,
    stage: Stage,
) -> Result<ValidationReport, HarmoniseError> {
    let (table, _) = store.load(&dataset.file, paths.dir(stage))?;
    let validator = Validator::new(
        &dataset.prefix,
        engine.catalog(dataset.layout),
        engine.max_reported_violations,
    );
    validator.validate(&table, &dataset.name)
}
