//! Project configuration
//!
//! Loaded from a TOML file (default `ipaq.toml`):
//!
//! ```toml
//! [paths]
//! raw = "data/raw"
//! interim = "data/interim"
//! processed = "data/processed"
//! reports = "reports"
//!
//! [engine]
//! vigorous_high_minutes = 10
//!
//! [[datasets]]
//! name = "G217_TeenQ"
//! prefix = "G217"
//! file = "G217_TeenQ.json"
//! layout = "domain"
//! delete = ["G217_SIT_WD_TRUNC"]
//!
//! [datasets.rename]
//! G217_WRK = "G217_IPAQ_JOB"
//! ```

use crate::catalog::{Catalog, Layout, DEFAULT_VIGOROUS_HIGH_MINUTES};
use crate::error::HarmoniseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "ipaq.toml";

/// Beyond this an f64 carries no further decimal digits
pub const MAX_MET_DECIMALS: u32 = 15;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub paths: PathConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

/// Data directories, relative paths resolve against the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default = "default_raw")]
    pub raw: PathBuf,
    #[serde(default = "default_interim")]
    pub interim: PathBuf,
    #[serde(default = "default_processed")]
    pub processed: PathBuf,
    #[serde(default = "default_reports")]
    pub reports: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            raw: default_raw(),
            interim: default_interim(),
            processed: default_processed(),
            reports: default_reports(),
        }
    }
}

/// Which pipeline stage a dataset file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Raw,
    Interim,
    Processed,
}

impl PathConfig {
    pub fn dir(&self, stage: Stage) -> &Path {
        match stage {
            Stage::Raw => &self.raw,
            Stage::Interim => &self.interim,
            Stage::Processed => &self.processed,
        }
    }

    fn resolve_against(&mut self, base: &Path) {
        for dir in [&mut self.raw, &mut self.interim, &mut self.processed, &mut self.reports] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Daily vigorous minutes required by the first HIGH branch
    #[serde(default = "default_vigorous_high_minutes")]
    pub vigorous_high_minutes: f64,

    /// Decimal places of MET values
    #[serde(default = "default_met_decimals")]
    pub met_decimals: u32,

    /// Violations listed per failed check in validation reports
    #[serde(default = "default_max_reported_violations")]
    pub max_reported_violations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vigorous_high_minutes: default_vigorous_high_minutes(),
            met_decimals: default_met_decimals(),
            max_reported_violations: default_max_reported_violations(),
        }
    }
}

impl EngineConfig {
    /// Build the category catalog for a layout with this engine's settings
    pub fn catalog(&self, layout: Layout) -> Catalog {
        Catalog::for_layout(layout)
            .with_vigorous_high_minutes(self.vigorous_high_minutes)
            .with_met_decimals(self.met_decimals)
    }
}

/// One source dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Dataset name, e.g. `G217_TeenQ`
    pub name: String,

    /// Column prefix, e.g. `G217`
    pub prefix: String,

    /// File name, identical in every stage directory
    pub file: String,

    #[serde(default = "default_layout")]
    pub layout: Layout,

    /// Null the 999 code on sitting answers and recompute sitting totals
    #[serde(default)]
    pub repair_sitting: bool,

    /// Legacy column name -> canonical column name
    #[serde(default)]
    pub rename: BTreeMap<String, String>,

    /// Legacy columns dropped before renaming
    #[serde(default)]
    pub delete: Vec<String>,
}

// Defaults
fn default_raw() -> PathBuf { PathBuf::from("data/raw") }
fn default_interim() -> PathBuf { PathBuf::from("data/interim") }
fn default_processed() -> PathBuf { PathBuf::from("data/processed") }
fn default_reports() -> PathBuf { PathBuf::from("reports") }
fn default_vigorous_high_minutes() -> f64 { DEFAULT_VIGOROUS_HIGH_MINUTES }
fn default_met_decimals() -> u32 { 2 }
fn default_max_reported_violations() -> usize { 25 }
fn default_layout() -> Layout { Layout::Wide }

impl ProjectConfig {
    /// Parse a configuration document; paths stay as written
    pub fn from_toml(text: &str) -> Result<Self, HarmoniseError> {
        let config: ProjectConfig = toml::from_str(text)?;
        config.check()?;
        Ok(config)
    }

    /// Load a configuration file, resolving relative paths against its directory
    pub fn load(path: &Path) -> Result<Self, HarmoniseError> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml(&text)?;
        if let Some(base) = path.parent() {
            config.paths.resolve_against(base);
        }
        Ok(config)
    }

    /// Look up a dataset by name or by prefix
    pub fn dataset(&self, name: &str) -> Result<&DatasetConfig, HarmoniseError> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .or_else(|| self.datasets.iter().find(|d| d.prefix == name))
            .ok_or_else(|| HarmoniseError::UnknownDataset(name.to_string()))
    }

    fn check(&self) -> Result<(), HarmoniseError> {
        if self.engine.vigorous_high_minutes < 0.0 {
            return Err(HarmoniseError::InvalidConfig(
                "engine.vigorous_high_minutes must not be negative".to_string(),
            ));
        }
        if self.engine.met_decimals > MAX_MET_DECIMALS {
            return Err(HarmoniseError::InvalidConfig(format!(
                "engine.met_decimals must be at most {}",
                MAX_MET_DECIMALS
            )));
        }
        for (i, dataset) in self.datasets.iter().enumerate() {
            if dataset.prefix.is_empty() {
                return Err(HarmoniseError::InvalidConfig(format!(
                    "dataset {} has an empty prefix",
                    dataset.name
                )));
            }
            if self.datasets[..i].iter().any(|d| d.name == dataset.name) {
                return Err(HarmoniseError::InvalidConfig(format!(
                    "dataset {} is configured twice",
                    dataset.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[paths]
raw = "raw"

[engine]
vigorous_high_minutes = 20

[[datasets]]
name = "G217_TeenQ"
prefix = "G217"
file = "G217_TeenQ.json"
layout = "domain"
delete = ["G217_SIT_WD_TRUNC"]

[datasets.rename]
G217_WRK = "G217_IPAQ_JOB"

[[datasets]]
name = "G222"
prefix = "G222"
file = "G222.json"
repair_sitting = true
"#;

    #[test]
    fn test_parse_with_defaults() {
        let config = ProjectConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.paths.raw, PathBuf::from("raw"));
        assert_eq!(config.paths.interim, PathBuf::from("data/interim"));
        assert_eq!(config.engine.vigorous_high_minutes, 20.0);
        assert_eq!(config.engine.met_decimals, 2);
        assert_eq!(config.engine.max_reported_violations, 25);

        let teen = config.dataset("G217").unwrap();
        assert_eq!(teen.name, "G217_TeenQ");
        assert_eq!(teen.layout, Layout::Domain);
        assert_eq!(teen.rename.get("G217_WRK").map(String::as_str), Some("G217_IPAQ_JOB"));

        let g222 = config.dataset("G222").unwrap();
        assert_eq!(g222.layout, Layout::Wide);
        assert!(g222.repair_sitting);
        assert!(g222.delete.is_empty());
    }

    #[test]
    fn test_unknown_dataset() {
        let config = ProjectConfig::from_toml(SAMPLE).unwrap();
        assert!(matches!(
            config.dataset("G999"),
            Err(HarmoniseError::UnknownDataset(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_dataset() {
        let text = r#"
[[datasets]]
name = "G1"
prefix = "G1"
file = "a.json"

[[datasets]]
name = "G1"
prefix = "G1"
file = "b.json"
"#;
        assert!(matches!(
            ProjectConfig::from_toml(text),
            Err(HarmoniseError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_excessive_met_decimals() {
        let text = "[engine]\nmet_decimals = 400\n";
        assert!(matches!(
            ProjectConfig::from_toml(text),
            Err(HarmoniseError::InvalidConfig(_))
        ));
        let text = "[engine]\nmet_decimals = 15\n";
        assert_eq!(ProjectConfig::from_toml(text).unwrap().engine.met_decimals, 15);
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ipaq.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.paths.raw, dir.path().join("raw"));
        assert_eq!(config.paths.dir(Stage::Processed), dir.path().join("data/processed"));
    }

    #[test]
    fn test_engine_catalog_applies_overrides() {
        let engine = EngineConfig {
            vigorous_high_minutes: 20.0,
            met_decimals: 1,
            ..Default::default()
        };
        let catalog = engine.catalog(Layout::Domain);
        assert_eq!(catalog.layout, Layout::Domain);
        assert_eq!(catalog.thresholds.vigorous_high_minutes, 20.0);
        assert_eq!(catalog.met_decimals, 1);
    }

    #[test]
    fn test_project_file_parses() {
        let config = ProjectConfig::from_toml(include_str!("../ipaq.toml")).unwrap();
        assert_eq!(config.datasets.len(), 6);

        let teen = config.dataset("G217_TeenQ").unwrap();
        assert_eq!(teen.layout, Layout::Domain);
        assert_eq!(
            teen.rename.get("G217_TOT_LEIS_MET").map(String::as_str),
            Some("G217_IPAQ_TOT_LSR_MET")
        );
        assert!(config.dataset("G126").unwrap().repair_sitting);
    }
}
