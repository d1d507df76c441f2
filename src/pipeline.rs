//! Pipeline orchestration
//!
//! This module provides the public API for the harmoniser.
//! It runs the fixed stage sequence over one dataset table.

use crate::catalog::{Catalog, Layout};
use crate::cleaning::{Cleaner, CleaningStats};
use crate::config::{DatasetConfig, EngineConfig, PathConfig, Stage};
use crate::derivation::{DerivationStats, Deriver};
use crate::error::HarmoniseError;
use crate::fields::FieldRegistry;
use crate::metadata::merge_metadata;
use crate::normalization::{NormalizationStats, ZeroActivityNormalizer};
use crate::store::{DatasetStore, JsonDatasetStore};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Per-dataset switches of the harmoniser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarmoniseOptions {
    /// Null the 999 code on sitting answers and recompute sitting totals
    pub repair_sitting: bool,
}

impl From<&DatasetConfig> for HarmoniseOptions {
    fn from(dataset: &DatasetConfig) -> Self {
        Self {
            repair_sitting: dataset.repair_sitting,
        }
    }
}

/// Counters of one harmoniser run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageStats {
    pub cleaning: CleaningStats,
    pub derivation: DerivationStats,
    pub normalization: NormalizationStats,
}

/// Harmonisation engine for one dataset prefix and layout
pub struct Harmoniser {
    catalog: Catalog,
    fields: FieldRegistry,
    options: HarmoniseOptions,
}

impl Harmoniser {
    pub fn new(prefix: &str, catalog: Catalog, options: HarmoniseOptions) -> Self {
        let fields = FieldRegistry::new(prefix, &catalog);
        Self {
            catalog,
            fields,
            options,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    /// Harmonise a table, returning a new table; the input is left untouched.
    ///
    /// Pipeline stages:
    /// 1. FieldRegistry::verify - Check every activity answer column exists
    /// 2. Cleaner - Sanitize flags, bound days, repair hours/minutes
    /// 3. Deriver - Minutes, MET, totals, classification, sedentary totals
    /// 4. ZeroActivityNormalizer - Confirmed zeros and unknown records
    pub fn harmonise(&self, input: &Table) -> Result<(Table, StageStats), HarmoniseError> {
        // Stage 1: Fail fast on a schema mismatch
        self.fields.verify(input)?;

        let mut table = input.clone();
        let policy = &self.catalog.policy;

        // Stage 2: Clean raw answers
        let cleaning = Cleaner::clean(&mut table, &self.fields, policy, self.options.repair_sitting)?;

        // Stage 3: Derive scored fields
        let recompute_sedentary = policy.repair_sedentary || self.options.repair_sitting;
        let derivation = Deriver::derive(&mut table, &self.fields, &self.catalog, recompute_sedentary)?;

        // Stage 4: Apply the no-activity rules
        let normalization = ZeroActivityNormalizer::normalize(&mut table, &self.fields, &self.catalog)?;

        Ok((
            table,
            StageStats {
                cleaning,
                derivation,
                normalization,
            },
        ))
    }
}

/// Outcome of harmonising one configured dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarmoniseSummary {
    pub dataset: String,
    pub layout: Layout,
    pub rows: usize,
    pub columns: usize,
    pub records_with_activity: usize,
    pub records_without_activity: usize,
    pub low: usize,
    pub moderate: usize,
    pub high: usize,
    pub unclassified: usize,
    pub output: PathBuf,
}

/// Load a dataset from the interim directory, harmonise it and write it with
/// merged metadata to the processed directory.
pub fn harmonise_dataset(
    store: &dyn DatasetStore,
    paths: &PathConfig,
    dataset: &DatasetConfig,
    engine: &EngineConfig,
) -> Result<HarmoniseSummary, HarmoniseError> {
    let (table, metadata) = store.load(&dataset.file, paths.dir(Stage::Interim))?;

    let harmoniser = Harmoniser::new(
        &dataset.prefix,
        engine.catalog(dataset.layout),
        HarmoniseOptions::from(dataset),
    );
    let (harmonised, stats) = harmoniser.harmonise(&table)?;
    let metadata = merge_metadata(&harmonised, &metadata, &dataset.prefix, harmoniser.catalog());

    let output = JsonDatasetStore::path(&dataset.file, paths.dir(Stage::Processed));
    store.write(&output, &harmonised, &metadata)?;

    let derivation = &stats.derivation;
    let classified = derivation.low + derivation.moderate + derivation.high;
    let summary = HarmoniseSummary {
        dataset: dataset.name.clone(),
        layout: dataset.layout,
        rows: harmonised.row_count(),
        columns: harmonised.column_count(),
        records_with_activity: derivation.records_with_activity,
        records_without_activity: stats.normalization.records_without_activity,
        low: derivation.low,
        moderate: derivation.moderate,
        high: derivation.high,
        unclassified: harmonised.row_count().saturating_sub(classified),
        output,
    };

    info!(
        dataset = %summary.dataset,
        layout = summary.layout.as_str(),
        rows = summary.rows,
        records_without_activity = summary.records_without_activity,
        low = summary.low,
        moderate = summary.moderate,
        high = summary.high,
        "dataset harmonised"
    );
    Ok(summary)
}
