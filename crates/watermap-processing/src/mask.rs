//! Mask inputs and the mask flag used when loading features

use std::path::PathBuf;

use watermap_core::error::{Result, WatermapError};
use watermap_core::models::FeatureCollection;

/// Where the city boundary comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MaskSource {
    /// A vector file, optionally naming the layer to read
    File { path: PathBuf, layer: Option<String> },

    /// Features already in memory, in any CRS
    InMemory(FeatureCollection),
}

impl MaskSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        MaskSource::File {
            path: path.into(),
            layer: None,
        }
    }

    pub fn file_layer(path: impl Into<PathBuf>, layer: impl Into<String>) -> Self {
        MaskSource::File {
            path: path.into(),
            layer: Some(layer.into()),
        }
    }
}

impl From<FeatureCollection> for MaskSource {
    fn from(collection: FeatureCollection) -> Self {
        MaskSource::InMemory(collection)
    }
}

/// Whether a load is constrained to the mask extent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    Apply,
    Ignore,
}

impl From<bool> for MaskMode {
    fn from(apply: bool) -> Self {
        if apply {
            MaskMode::Apply
        } else {
            MaskMode::Ignore
        }
    }
}

/// A missing flag is rejected instead of defaulting either way.
impl TryFrom<Option<bool>> for MaskMode {
    type Error = WatermapError;

    fn try_from(flag: Option<bool>) -> Result<Self> {
        flag.map(MaskMode::from)
            .ok_or_else(|| WatermapError::invalid_argument("mask flag must be true or false"))
    }
}
