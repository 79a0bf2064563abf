//! Format abstraction layer for vector and tabular inputs
//!
//! Each vector format implements the `FormatReader` trait, and the `FormatRegistry`
//! handles format detection and dispatching to the appropriate reader. Readers
//! return features in the file's native CRS; reprojection happens downstream.

use std::path::Path;

use crate::error::{Result, WatermapError};
use crate::models::FeatureCollection;

pub mod csv;
pub mod geojson;
pub mod geopackage;
pub mod shapefile;
pub mod validation;

use validation::{verify_file_exists, FormatValidator};

/// Format reader trait that all vector format implementations must implement
pub trait FormatReader: Send + Sync {
    /// Read one layer from the given path
    ///
    /// # Arguments
    /// * `path` - Path to the file to read
    /// * `layer` - Layer to read; None selects the default (first) layer
    fn read(&self, path: &Path, layer: Option<&str>) -> Result<FeatureCollection>;

    /// Names of the layers the file contains
    fn layer_names(&self, path: &Path) -> Result<Vec<String>>;

    /// Get supported file extensions (e.g., ["shp"])
    fn supported_extensions(&self) -> &[&str];

    /// Get human-readable format name (e.g., "Shapefile", "GeoJSON")
    fn format_name(&self) -> &str;

    /// Validate file structure without full read
    fn validate(&self, path: &Path) -> FormatValidation {
        FormatValidator::validate_file_exists(path)
    }
}

/// Result of format validation
#[derive(Debug, Clone, Default)]
pub struct FormatValidation {
    /// Validation errors that prevent reading
    pub errors: Vec<String>,

    /// Warnings that don't prevent reading but indicate potential issues
    pub warnings: Vec<String>,
}

impl FormatValidation {
    /// Check if validation passed (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Single-layer formats expose exactly one layer; any other name is an error.
pub(crate) fn check_single_layer(requested: Option<&str>, layer_name: &str) -> Result<()> {
    match requested {
        Some(layer) if layer != layer_name => Err(WatermapError::LayerNotFound {
            layer: layer.to_string(),
            available: vec![layer_name.to_string()],
        }),
        _ => Ok(()),
    }
}

/// Layer name for single-layer files: the file stem
pub(crate) fn file_stem_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unnamed")
        .to_string()
}

/// Central registry for format readers
///
/// The registry maintains a collection of format readers and provides
/// format detection based on file extensions.
pub struct FormatRegistry {
    readers: Vec<Box<dyn FormatReader>>,
}

impl FormatRegistry {
    /// Create a new empty format registry
    pub fn new() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    /// Registry with GeoJSON, Shapefile and GeoPackage readers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(geojson::GeoJsonReader));
        registry.register(Box::new(shapefile::ShapefileFormatReader));
        registry.register(Box::new(geopackage::GeoPackageReader));
        registry
    }

    /// Register a format reader
    pub fn register(&mut self, reader: Box<dyn FormatReader>) {
        self.readers.push(reader);
    }

    /// Detect format and return appropriate reader
    pub fn detect_format(&self, path: &Path) -> Result<&dyn FormatReader> {
        let extension = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            WatermapError::UnsupportedFormat {
                extension: "none".to_string(),
                supported: self.supported_formats(),
            }
        })?;

        self.readers
            .iter()
            .find(|r| {
                r.supported_extensions()
                    .iter()
                    .any(|ext| ext.eq_ignore_ascii_case(extension))
            })
            .map(|r| r.as_ref())
            .ok_or_else(|| WatermapError::UnsupportedFormat {
                extension: extension.to_string(),
                supported: self.supported_formats(),
            })
    }

    /// Read a layer, validating the file first
    pub fn read(&self, path: &Path, layer: Option<&str>) -> Result<FeatureCollection> {
        verify_file_exists(path)?;
        let reader = self.detect_format(path)?;

        let validation = reader.validate(path);
        for warning in &validation.warnings {
            tracing::warn!("{}: {}", path.display(), warning);
        }
        FormatValidator::validation_to_result(&validation, reader.format_name())?;

        tracing::debug!(
            "Reading {} as {} (layer: {})",
            path.display(),
            reader.format_name(),
            layer.unwrap_or("<default>")
        );
        let collection = reader.read(path, layer)?;
        tracing::debug!(
            "Read {} features from {} in {}",
            collection.len(),
            path.display(),
            collection.crs
        );

        Ok(collection)
    }

    /// List the layers of a file
    pub fn layer_names(&self, path: &Path) -> Result<Vec<String>> {
        verify_file_exists(path)?;
        self.detect_format(path)?.layer_names(path)
    }

    /// Get list of all supported format extensions
    pub fn supported_formats(&self) -> Vec<String> {
        self.readers
            .iter()
            .flat_map(|r| r.supported_extensions())
            .map(|s| s.to_string())
            .collect()
    }

    /// Get all registered readers
    pub fn readers(&self) -> &[Box<dyn FormatReader>] {
        &self.readers
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
