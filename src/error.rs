// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Result type for extraction, layout and rendering.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors surfaced to the caller.
///
/// Per-record problems (a malformed number, a journal entry without a
/// header) are not errors: they are logged with `warn!` where they happen
/// and the batch continues.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The database directory, the journal or a required table is missing.
    #[error("storage unavailable: {path}")]
    StorageUnavailable { path: PathBuf },

    /// A document kind's line table could not be sampled.
    #[error("cannot infer field roles for kind {kind}: {reason}")]
    SchemaInference { kind: String, reason: String },

    /// The file exists but is not a readable DBF table.
    #[error("invalid table {path}: {reason}")]
    InvalidTable { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("failed to edit configuration: {0}")]
    ConfigEdit(#[from] toml_edit::TomlError),

    #[error("render error: {0}")]
    Render(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
}

impl ExportError {
    pub fn storage_unavailable(path: impl Into<PathBuf>) -> Self {
        Self::StorageUnavailable { path: path.into() }
    }

    pub fn invalid_table(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidTable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
