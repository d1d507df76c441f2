//! Error types for IPAQ harmonisation

use thiserror::Error;

/// Errors that can occur while loading, harmonising or persisting a dataset.
///
/// Invalid survey answers are never errors: the cleaning stage turns them into
/// nulls. These variants cover schema, configuration and I/O failures only.
#[derive(Debug, Error)]
pub enum HarmoniseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Column {column} is not {expected}")]
    ColumnType { column: String, expected: String },

    #[error("Failed to parse dataset: {0}")]
    ParseError(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
