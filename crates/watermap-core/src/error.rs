//! Error types for Watermap

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatermapError {
    // Argument validation errors
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // File errors
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported file format: .{extension}. Supported formats: {}", .supported.join(", "))]
    UnsupportedFormat {
        extension: String,
        supported: Vec<String>,
    },

    #[error("{format} error: {message}")]
    FormatError { format: String, message: String },

    #[error("Layer '{layer}' not found. Available layers: {}", .available.join(", "))]
    LayerNotFound {
        layer: String,
        available: Vec<String>,
    },

    // CRS errors
    #[error("Unknown coordinate reference system: EPSG:{code}")]
    UnknownCrs { code: u32 },

    #[error("CRS mismatch: {left} does not match {right}")]
    CrsMismatch { left: String, right: String },

    #[error("Failed to reproject from {from} to {to}: {reason}")]
    Projection {
        from: String,
        to: String,
        reason: String,
    },

    // Tabular errors
    #[error("Column '{column}' not found in {source_name}")]
    MissingColumn { column: String, source_name: String },

    // Configuration errors
    #[error("Missing required configuration: {key}")]
    ConfigMissing { key: String },

    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl WatermapError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        WatermapError::InvalidArgument { reason: reason.into() }
    }

    /// True for errors raised when a reader cannot make sense of a file.
    pub fn is_unrecognized_format(&self) -> bool {
        matches!(self, WatermapError::UnsupportedFormat { .. } | WatermapError::FormatError { .. })
    }
}

pub type Result<T> = std::result::Result<T, WatermapError>;
