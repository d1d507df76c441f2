//! IPAQ CLI - Command-line interface for IPAQ Harmonise
//!
//! Commands:
//! - interim: Apply per-dataset rename/delete lists (raw → interim)
//! - harmonise: Run the harmonisation pipeline (interim → processed)
//! - validate: Reconcile a dataset against independently recomputed values
//! - catalog: Print the category catalog of a layout
//! - doctor: Diagnose configuration, directories and dataset files

use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ipaq_harmonise::config::DEFAULT_CONFIG_FILE;
use ipaq_harmonise::store::{DatasetStore, JsonDatasetStore};
use ipaq_harmonise::{
    harmonise_dataset, preprocess, validate_dataset, DatasetConfig, HarmoniseError,
    HarmoniseSummary, Layout, ProjectConfig, Stage, VERSION,
};

/// IPAQ Harmonise - Harmonise and validate IPAQ physical-activity survey waves
#[derive(Parser)]
#[command(name = "ipaq")]
#[command(version = VERSION)]
#[command(about = "Harmonise and validate IPAQ survey datasets", long_about = None)]
struct Cli {
    /// Project configuration file
    #[arg(short, long, global = true, env = "IPAQ_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Override the daily vigorous minutes of the first HIGH branch
    #[arg(long, global = true)]
    vigorous_high_minutes: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply rename/delete preprocessing (raw → interim)
    Interim {
        /// Dataset name or prefix (default: every configured dataset)
        dataset: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the harmonisation pipeline (interim → processed)
    Harmonise {
        /// Dataset name or prefix (default: every configured dataset)
        dataset: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Reconcile a dataset against independently recomputed values
    Validate {
        /// Dataset name or prefix
        dataset: String,

        /// Pipeline stage to read the dataset from
        #[arg(long, value_enum, default_value = "processed")]
        stage: StageArg,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,

        /// Also write the JSON report to the reports directory
        #[arg(long)]
        save: bool,
    },

    /// Print the category catalog of a layout
    Catalog {
        #[arg(value_enum)]
        layout: LayoutArg,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration, directories and dataset files
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StageArg {
    Raw,
    Interim,
    Processed,
}

impl From<StageArg> for Stage {
    fn from(stage: StageArg) -> Self {
        match stage {
            StageArg::Raw => Stage::Raw,
            StageArg::Interim => Stage::Interim,
            StageArg::Processed => Stage::Processed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum LayoutArg {
    /// Short form (vigorous / moderate / walking)
    Wide,
    /// Long form (job / transport / home / leisure)
    Domain,
}

impl From<LayoutArg> for Layout {
    fn from(layout: LayoutArg) -> Self {
        match layout {
            LayoutArg::Wide => Layout::Wide,
            LayoutArg::Domain => Layout::Domain,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ipaq_harmonise=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string()));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), IpaqCliError> {
    match cli.command {
        Commands::Interim { ref dataset, json } => {
            let config = load_config(&cli)?;
            cmd_interim(&config, dataset.as_deref(), json)
        }
        Commands::Harmonise { ref dataset, json } => {
            let config = load_config(&cli)?;
            cmd_harmonise(&config, dataset.as_deref(), json)
        }
        Commands::Validate {
            ref dataset,
            stage,
            json,
            save,
        } => {
            let config = load_config(&cli)?;
            cmd_validate(&config, dataset, stage.into(), json, save)
        }
        Commands::Catalog { layout, json } => {
            // the catalog is printable without a project file
            let mut config = if cli.config.exists() {
                ProjectConfig::load(&cli.config)?
            } else {
                ProjectConfig::default()
            };
            apply_overrides(&cli, &mut config)?;
            cmd_catalog(&config, layout.into(), json)
        }
        Commands::Doctor { json } => cmd_doctor(&cli.config, json),
    }
}

fn load_config(cli: &Cli) -> Result<ProjectConfig, IpaqCliError> {
    let mut config = ProjectConfig::load(&cli.config)?;
    apply_overrides(cli, &mut config)?;
    Ok(config)
}

fn apply_overrides(cli: &Cli, config: &mut ProjectConfig) -> Result<(), IpaqCliError> {
    if let Some(minutes) = cli.vigorous_high_minutes {
        if minutes < 0.0 {
            return Err(HarmoniseError::InvalidConfig(
                "--vigorous-high-minutes must not be negative".to_string(),
            )
            .into());
        }
        config.engine.vigorous_high_minutes = minutes;
    }
    Ok(())
}

fn selected_datasets<'a>(
    config: &'a ProjectConfig,
    name: Option<&str>,
) -> Result<Vec<&'a DatasetConfig>, IpaqCliError> {
    let datasets = match name {
        Some(name) => vec![config.dataset(name)?],
        None => config.datasets.iter().collect(),
    };
    if datasets.is_empty() {
        return Err(IpaqCliError::NoDatasets);
    }
    Ok(datasets)
}

fn cmd_interim(config: &ProjectConfig, name: Option<&str>, json: bool) -> Result<(), IpaqCliError> {
    let store = JsonDatasetStore;
    let mut reports = Vec::new();

    for dataset in selected_datasets(config, name)? {
        let (mut table, mut metadata) = store.load(&dataset.file, config.paths.dir(Stage::Raw))?;
        let summary = preprocess(&mut table, &mut metadata, dataset)?;
        let output = JsonDatasetStore::path(&dataset.file, config.paths.dir(Stage::Interim));
        store.write(&output, &table, &metadata)?;

        reports.push(InterimReport {
            dataset: dataset.name.clone(),
            rows: table.row_count(),
            dropped: summary.dropped,
            renamed: summary.renamed,
            sorted: summary.sorted,
            output,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("Interim Report");
        println!("==============");
        for report in &reports {
            println!(
                "  {}: {} rows, {} dropped, {} renamed{} -> {}",
                report.dataset,
                report.rows,
                report.dropped.len(),
                report.renamed,
                if report.sorted { ", sorted by ID" } else { "" },
                report.output.display()
            );
        }
    }
    Ok(())
}

fn cmd_harmonise(config: &ProjectConfig, name: Option<&str>, json: bool) -> Result<(), IpaqCliError> {
    let store = JsonDatasetStore;
    let summaries = selected_datasets(config, name)?
        .into_iter()
        .map(|dataset| harmonise_dataset(&store, &config.paths, dataset, &config.engine))
        .collect::<Result<Vec<HarmoniseSummary>, _>>()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        println!("Harmonisation Report");
        println!("====================");
        for s in &summaries {
            println!("{} ({})", s.dataset, s.layout.as_str());
            println!("  Rows:                {}", s.rows);
            println!("  Columns:             {}", s.columns);
            println!("  With activity:       {}", s.records_with_activity);
            println!("  Without activity:    {}", s.records_without_activity);
            println!(
                "  Low/Moderate/High:   {}/{}/{} ({} unclassified)",
                s.low, s.moderate, s.high, s.unclassified
            );
            println!("  Output:              {}", s.output.display());
        }
    }
    Ok(())
}

fn cmd_validate(
    config: &ProjectConfig,
    name: &str,
    stage: Stage,
    json: bool,
    save: bool,
) -> Result<(), IpaqCliError> {
    let dataset = config.dataset(name)?;
    let report = validate_dataset(&JsonDatasetStore, &config.paths, dataset, &config.engine, stage)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_text());
    }

    if save {
        let path = report.save(&config.paths.reports)?;
        if !json {
            println!("\nReport saved to {}", path.display());
        }
    }

    if report.is_success() {
        Ok(())
    } else {
        Err(IpaqCliError::ValidationFailed {
            dataset: report.dataset.clone(),
            failed: report.failed,
        })
    }
}

fn cmd_catalog(config: &ProjectConfig, layout: Layout, json: bool) -> Result<(), IpaqCliError> {
    let catalog = config.engine.catalog(layout);

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    println!("Catalog: {} layout", layout.as_str());
    println!();
    println!("Categories:");
    for category in &catalog.categories {
        let factor = category
            .factor
            .map(|f| format!("{} MET", f))
            .unwrap_or_else(|| "no MET".to_string());
        println!("  {:<14} {:<32} {}", category.code, category.label, factor);
    }

    if !catalog.domain_totals.is_empty() {
        println!();
        println!("Domain totals:");
        for total in &catalog.domain_totals {
            println!("  {:<14} = {}", total.name, total.members.join(" + "));
        }
    }

    println!();
    println!("Intensity totals:");
    for group in &catalog.intensity {
        println!(
            "  {:<14} = {}",
            group.column.unwrap_or(group.intensity.label()),
            group.members.join(" + ")
        );
    }

    for gate in &catalog.gates {
        println!();
        println!("Gate {} ({}): voids {}", gate.flag, gate.label, gate.members.join(", "));
    }

    let t = &catalog.thresholds;
    println!();
    println!("Classification:");
    println!(
        "  High:     >= {} vigorous days of >= {} min and >= {} MET, or >= {} days and >= {} MET",
        t.high_vigorous_days, t.vigorous_high_minutes, t.high_vigorous_met, t.high_total_days, t.high_total_met
    );
    println!(
        "  Moderate: >= {} vigorous days of >= {} min, or >= {} moderate/walking days of >= {} min, or >= {} days and >= {} MET",
        t.high_vigorous_days,
        t.moderate_vigorous_minutes,
        t.moderate_walking_days,
        t.moderate_walking_minutes,
        t.moderate_total_days,
        t.moderate_total_met
    );
    Ok(())
}

fn cmd_doctor(config_path: &Path, json: bool) -> Result<(), IpaqCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("ipaq-harmonise version {}", VERSION),
    });

    let config = match ProjectConfig::load(config_path) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{} ({} datasets configured)",
                    config_path.display(),
                    config.datasets.len()
                ),
            });
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Cannot load {}: {}", config_path.display(), e),
            });
            None
        }
    };

    if let Some(config) = &config {
        let paths = &config.paths;
        for (name, dir) in [
            ("raw_dir", &paths.raw),
            ("interim_dir", &paths.interim),
            ("processed_dir", &paths.processed),
            ("reports_dir", &paths.reports),
        ] {
            checks.push(if dir.is_dir() {
                DoctorCheck {
                    name: name.to_string(),
                    status: CheckStatus::Ok,
                    message: dir.display().to_string(),
                }
            } else {
                DoctorCheck {
                    name: name.to_string(),
                    status: CheckStatus::Warning,
                    message: format!("{} does not exist yet", dir.display()),
                }
            });
        }

        for dataset in &config.datasets {
            let found: Vec<&str> = [Stage::Raw, Stage::Interim, Stage::Processed]
                .into_iter()
                .filter(|stage| JsonDatasetStore::path(&dataset.file, paths.dir(*stage)).is_file())
                .map(|stage| match stage {
                    Stage::Raw => "raw",
                    Stage::Interim => "interim",
                    Stage::Processed => "processed",
                })
                .collect();
            checks.push(if found.is_empty() {
                DoctorCheck {
                    name: format!("dataset:{}", dataset.name),
                    status: CheckStatus::Error,
                    message: format!("{} not found in any stage directory", dataset.file),
                }
            } else {
                DoctorCheck {
                    name: format!("dataset:{}", dataset.name),
                    status: CheckStatus::Ok,
                    message: format!("{} layout, present in {}", dataset.layout.as_str(), found.join(", ")),
                }
            });
        }
    }

    // Reports on stdout stay machine-readable when piped
    let stdout_check = if atty::is(atty::Stream::Stdout) {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a TTY (text reports)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdout".to_string(),
            status: CheckStatus::Ok,
            message: "stdout is a pipe (use --json for machine-readable reports)".to_string(),
        }
    };
    checks.push(stdout_check);

    let report = DoctorReport {
        version: VERSION.to_string(),
        config: config_path.to_path_buf(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("IPAQ Doctor Report");
        println!("==================");
        println!("Version: {}", report.version);
        println!("Config:  {}", report.config.display());
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(IpaqCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum IpaqCliError {
    Io(io::Error),
    Harmonise(HarmoniseError),
    Json(serde_json::Error),
    NoDatasets,
    ValidationFailed { dataset: String, failed: usize },
    DoctorFailed,
}

impl From<io::Error> for IpaqCliError {
    fn from(e: io::Error) -> Self {
        IpaqCliError::Io(e)
    }
}

impl From<HarmoniseError> for IpaqCliError {
    fn from(e: HarmoniseError) -> Self {
        IpaqCliError::Harmonise(e)
    }
}

impl From<serde_json::Error> for IpaqCliError {
    fn from(e: serde_json::Error) -> Self {
        IpaqCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<IpaqCliError> for CliError {
    fn from(e: IpaqCliError) -> Self {
        match e {
            IpaqCliError::Io(e) | IpaqCliError::Harmonise(HarmoniseError::Io(e)) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions; 'ipaq doctor' lists missing files".to_string()),
            },
            IpaqCliError::Harmonise(e @ (HarmoniseError::Config(_) | HarmoniseError::InvalidConfig(_))) => {
                CliError {
                    code: "CONFIG_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some("Check the project configuration file".to_string()),
                }
            }
            IpaqCliError::Harmonise(e @ HarmoniseError::UnknownDataset(_)) => CliError {
                code: "UNKNOWN_DATASET".to_string(),
                message: e.to_string(),
                hint: Some("Use a dataset name or prefix listed in the configuration".to_string()),
            },
            IpaqCliError::Harmonise(e @ (HarmoniseError::MissingColumn(_) | HarmoniseError::ColumnType { .. })) => {
                CliError {
                    code: "SCHEMA_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some("Run 'ipaq interim' and check the dataset's rename list".to_string()),
                }
            }
            IpaqCliError::Harmonise(e) => CliError {
                code: "DATA_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check that the dataset file is a valid dataset document".to_string()),
            },
            IpaqCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            IpaqCliError::NoDatasets => CliError {
                code: "NO_DATASETS".to_string(),
                message: "No datasets configured".to_string(),
                hint: Some("Add [[datasets]] entries to the configuration file".to_string()),
            },
            IpaqCliError::ValidationFailed { dataset, failed } => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} checks failed for {}", failed, dataset),
                hint: Some("Review the validation report for the violating rows".to_string()),
            },
            IpaqCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct InterimReport {
    dataset: String,
    rows: usize,
    dropped: Vec<String>,
    renamed: usize,
    sorted: bool,
    output: PathBuf,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    config: PathBuf,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
