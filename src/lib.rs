//! IPAQ Harmonise - Rule-based harmonisation engine for IPAQ survey waves
//!
//! Turns heterogeneous physical-activity survey datasets into one canonical,
//! scored schema through a deterministic pipeline: interim preprocessing →
//! cleaning → derivation → zero-activity normalization, and cross-checks the
//! result with an independent reconciliation engine.
//!
//! ## Modules
//!
//! - **Harmoniser**: [`pipeline::Harmoniser`] runs the stages over one table
//! - **Validator**: [`validation::Validator`] recomputes every derived value and
//!   reports disagreements

pub mod catalog;
pub mod cleaning;
pub mod config;
pub mod derivation;
pub mod error;
pub mod fields;
pub mod metadata;
pub mod normalization;
pub mod pipeline;
pub mod preprocess;
pub mod store;
pub mod table;
pub mod validation;

pub use catalog::{Catalog, Layout, Thresholds};
pub use config::{DatasetConfig, EngineConfig, PathConfig, ProjectConfig, Stage};
pub use derivation::ActivityLevel;
pub use error::HarmoniseError;
pub use fields::FieldRegistry;
pub use metadata::{FieldDescriptor, MetadataMap};
pub use pipeline::{harmonise_dataset, HarmoniseOptions, HarmoniseSummary, Harmoniser};
pub use preprocess::{preprocess, PreprocessSummary};
pub use store::{DatasetStore, JsonDatasetStore};
pub use table::Table;
pub use validation::{validate_dataset, ValidationReport, Validator};

/// Crate version, reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
