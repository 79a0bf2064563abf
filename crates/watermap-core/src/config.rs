use crate::error::{Result, WatermapError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// NAD83(2011) / Mississippi West (metres), the zone covering Jackson
pub const DEFAULT_EPSG: u32 = 6509;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Set programmatically by the caller
    Override,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Override => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for a processing run
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// Working CRS as an EPSG code
    pub crs: ConfigValue<u32>,
    /// Base GeoPackage
    pub geopackage: ConfigValue<Option<PathBuf>>,
    /// Vector file holding the city boundary
    pub mask: ConfigValue<Option<PathBuf>>,
    /// Layer of the mask file to read
    pub mask_layer: ConfigValue<Option<String>>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            crs: ConfigValue::new(DEFAULT_EPSG, ConfigSource::Default),
            geopackage: ConfigValue::new(None, ConfigSource::Default),
            mask: ConfigValue::new(None, ConfigSource::Default),
            mask_layer: ConfigValue::new(None, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| WatermapError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| WatermapError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        if let Some(crs) = file_config.crs {
            self.crs.update(crs, ConfigSource::File);
        }

        if let Some(geopackage) = file_config.geopackage {
            self.geopackage.update(Some(geopackage), ConfigSource::File);
        }

        if let Some(mask) = file_config.mask {
            self.mask.update(Some(mask), ConfigSource::File);
        }

        if let Some(mask_layer) = file_config.mask_layer {
            self.mask_layer.update(Some(mask_layer), ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        // WATERMAP_CRS
        if let Ok(crs_str) = env::var("WATERMAP_CRS") {
            match parse_epsg(&crs_str) {
                Ok(crs) => self.crs.update(crs, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid WATERMAP_CRS value '{}': expected an EPSG code such as 6509 or EPSG:6509",
                    crs_str
                ),
            }
        }

        // WATERMAP_GEOPACKAGE
        if let Ok(path) = env::var("WATERMAP_GEOPACKAGE") {
            self.geopackage.update(Some(PathBuf::from(path)), ConfigSource::Environment);
        }

        // WATERMAP_MASK
        if let Ok(path) = env::var("WATERMAP_MASK") {
            self.mask.update(Some(PathBuf::from(path)), ConfigSource::Environment);
        }

        // WATERMAP_MASK_LAYER
        if let Ok(layer) = env::var("WATERMAP_MASK_LAYER") {
            self.mask_layer.update(Some(layer), ConfigSource::Environment);
        }

        self
    }

    /// Apply caller-supplied overrides
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(crs) = overrides.crs {
            self.crs.update(crs, ConfigSource::Override);
        }

        if let Some(geopackage) = overrides.geopackage {
            self.geopackage.update(Some(geopackage), ConfigSource::Override);
        }

        if let Some(mask) = overrides.mask {
            self.mask.update(Some(mask), ConfigSource::Override);
        }

        if let Some(mask_layer) = overrides.mask_layer {
            self.mask_layer.update(Some(mask_layer), ConfigSource::Override);
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert("crs".to_string(), (format!("EPSG:{}", self.crs.value), self.crs.source));

        map.insert(
            "geopackage".to_string(),
            (display_path(self.geopackage.value.as_deref()), self.geopackage.source),
        );

        map.insert(
            "mask".to_string(),
            (display_path(self.mask.value.as_deref()), self.mask.source),
        );

        map.insert(
            "mask_layer".to_string(),
            (
                self.mask_layer.value.clone().unwrap_or_else(|| "<none>".to_string()),
                self.mask_layer.source,
            ),
        );

        map
    }
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "<none>".to_string())
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    crs: Option<u32>,
    geopackage: Option<PathBuf>,
    mask: Option<PathBuf>,
    mask_layer: Option<String>,
}

/// Programmatic configuration overrides
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub crs: Option<u32>,
    pub geopackage: Option<PathBuf>,
    pub mask: Option<PathBuf>,
    pub mask_layer: Option<String>,
}

/// Parse an EPSG code from `6509`, `EPSG:6509` or `epsg:6509`
pub fn parse_epsg(s: &str) -> Result<u32> {
    let trimmed = s.trim();
    let code = trimmed
        .get(..5)
        .filter(|prefix| prefix.eq_ignore_ascii_case("epsg:"))
        .map(|_| &trimmed[5..])
        .unwrap_or(trimmed);

    code.parse::<u32>().map_err(|_| WatermapError::ConfigInvalid {
        key: "crs".to_string(),
        reason: format!("Invalid EPSG code: {}", s),
    })
}
