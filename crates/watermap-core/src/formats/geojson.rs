//! GeoJSON format reader implementation

use std::fs;
use std::path::Path;

use crate::error::{Result, WatermapError};
use crate::formats::validation::FormatValidator;
use crate::formats::{check_single_layer, file_stem_name, FormatReader, FormatValidation};
use crate::models::{Crs, Feature, FeatureCollection};

/// GeoJSON format reader
pub struct GeoJsonReader;

impl FormatReader for GeoJsonReader {
    fn read(&self, path: &Path, layer: Option<&str>) -> Result<FeatureCollection> {
        let geojson = self.parse(path)?;
        let name = layer_name(&geojson).unwrap_or_else(|| file_stem_name(path));
        check_single_layer(layer, &name)?;

        let (features, epsg) = self.extract_features_and_crs(geojson)?;
        Ok(FeatureCollection::new(name, Crs::from_epsg(epsg)?, features))
    }

    fn layer_names(&self, path: &Path) -> Result<Vec<String>> {
        let geojson = self.parse(path)?;
        Ok(vec![layer_name(&geojson).unwrap_or_else(|| file_stem_name(path))])
    }

    fn supported_extensions(&self) -> &[&str] {
        &["geojson", "json"]
    }

    fn format_name(&self) -> &str {
        "GeoJSON"
    }

    fn validate(&self, path: &Path) -> FormatValidation {
        let validation = FormatValidator::validate_file_exists(path);
        if !validation.is_valid() {
            return validation;
        }

        let mut json_validation = FormatValidation::default();
        match fs::read_to_string(path) {
            Ok(content) => {
                if let Err(e) = serde_json::from_str::<serde_json::Value>(&content) {
                    json_validation.errors.push(format!("Invalid JSON structure: {}", e));
                }
            }
            Err(e) => json_validation.errors.push(format!("Cannot read file: {}", e)),
        }

        FormatValidator::merge_validations(vec![validation, json_validation])
    }
}

impl GeoJsonReader {
    fn parse(&self, path: &Path) -> Result<geojson::GeoJson> {
        let content = fs::read_to_string(path)?;
        content.parse().map_err(|e| WatermapError::FormatError {
            format: "GeoJSON".to_string(),
            message: format!("Failed to parse GeoJSON: {}", e),
        })
    }

    /// Extract features and EPSG code (WGS 84 unless a `crs` member says otherwise)
    fn extract_features_and_crs(&self, geojson: geojson::GeoJson) -> Result<(Vec<Feature>, u32)> {
        match geojson {
            geojson::GeoJson::FeatureCollection(fc) => {
                let epsg = fc
                    .foreign_members
                    .as_ref()
                    .and_then(|fm| fm.get("crs"))
                    .and_then(extract_epsg_from_crs)
                    .unwrap_or(4326);

                let features = fc
                    .features
                    .into_iter()
                    .enumerate()
                    .map(|(idx, feature)| convert_feature(feature, idx))
                    .collect::<Result<Vec<_>>>()?;

                Ok((features, epsg))
            }
            geojson::GeoJson::Feature(feature) => Ok((vec![convert_feature(feature, 0)?], 4326)),
            geojson::GeoJson::Geometry(geometry) => {
                Ok((vec![Feature::new("0", Some(convert_geometry(geometry)?))], 4326))
            }
        }
    }
}

/// Layer name written by GDAL as a top-level `name` member
fn layer_name(geojson: &geojson::GeoJson) -> Option<String> {
    match geojson {
        geojson::GeoJson::FeatureCollection(fc) => fc
            .foreign_members
            .as_ref()
            .and_then(|fm| fm.get("name"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        _ => None,
    }
}

fn convert_feature(feature: geojson::Feature, idx: usize) -> Result<Feature> {
    let id = feature
        .id
        .map(|id| match id {
            geojson::feature::Id::String(s) => s,
            geojson::feature::Id::Number(n) => n.to_string(),
        })
        .unwrap_or_else(|| idx.to_string());

    let geometry = feature.geometry.map(convert_geometry).transpose()?;

    let properties = feature
        .properties
        .map(|props| props.into_iter().collect())
        .unwrap_or_default();

    Ok(Feature {
        id,
        geometry,
        properties,
    })
}

fn convert_geometry(geometry: geojson::Geometry) -> Result<geo::Geometry<f64>> {
    geo::Geometry::<f64>::try_from(geometry.value).map_err(|e| WatermapError::FormatError {
        format: "GeoJSON".to_string(),
        message: format!("Unsupported geometry: {}", e),
    })
}

/// Extract EPSG code from a legacy CRS member
fn extract_epsg_from_crs(crs: &serde_json::Value) -> Option<u32> {
    // "EPSG:4326" or "urn:ogc:def:crs:EPSG::4326"
    let name = crs.get("properties")?.get("name")?.as_str()?;
    if name.ends_with("CRS84") {
        return Some(4326);
    }
    name.rsplit(':').next()?.parse().ok()
}
