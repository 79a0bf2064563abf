//! Shapefile format reader implementation
//!
//! Shapefiles consist of multiple component files (.shp, .shx, .dbf, .prj)
//! that must all be present for proper reading. A shapefile holds a single
//! layer named after the file stem.

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde_json::Value;
use shapefile::dbase::FieldValue as DbaseFieldValue;
use shapefile::{PolygonRing, Reader as ShapefileReader, Shape};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, WatermapError};
use crate::formats::validation::{has_extension, FormatValidator};
use crate::formats::{check_single_layer, file_stem_name, FormatReader, FormatValidation};
use crate::models::crs::{epsg_from_wkt, esri_name_to_epsg};
use crate::models::{Crs, Feature, FeatureCollection};

/// Shapefile format reader
pub struct ShapefileFormatReader;

impl FormatReader for ShapefileFormatReader {
    fn read(&self, path: &Path, layer: Option<&str>) -> Result<FeatureCollection> {
        let name = file_stem_name(path);
        check_single_layer(layer, &name)?;

        let crs = Crs::from_epsg(self.extract_crs(path)?)?;

        let mut reader = ShapefileReader::from_path(path).map_err(|e| WatermapError::FormatError {
            format: "Shapefile".to_string(),
            message: format!("Failed to open Shapefile: {}", e),
        })?;

        let mut features = Vec::new();
        for result in reader.iter_shapes_and_records() {
            let (shape, record) = result.map_err(|e| WatermapError::FormatError {
                format: "Shapefile".to_string(),
                message: format!("Failed to read feature: {}", e),
            })?;

            let mut feature = Feature::new(features.len().to_string(), shape_to_geometry(shape)?);
            feature.properties = extract_properties(record);
            features.push(feature);
        }

        Ok(FeatureCollection::new(name, crs, features))
    }

    fn layer_names(&self, path: &Path) -> Result<Vec<String>> {
        Ok(vec![file_stem_name(path)])
    }

    fn supported_extensions(&self) -> &[&str] {
        &["shp"]
    }

    fn format_name(&self) -> &str {
        "Shapefile"
    }

    fn validate(&self, path: &Path) -> FormatValidation {
        let mut validation = FormatValidator::validate_file_exists(path);
        if !validation.is_valid() {
            return validation;
        }

        let base = match shapefile_base(path) {
            Ok(b) => b,
            Err(e) => {
                validation.errors.push(format!("Invalid Shapefile path: {}", e));
                return validation;
            }
        };

        let component_validation =
            FormatValidator::validate_component_files(&base, &["shp", "shx", "dbf"], &["prj"]);

        FormatValidator::merge_validations(vec![validation, component_validation])
    }
}

impl ShapefileFormatReader {
    /// Extract the EPSG code from the .prj file.
    ///
    /// Only a missing .prj defaults to EPSG:4326. A .prj that names a
    /// system we cannot identify is an error.
    fn extract_crs(&self, path: &Path) -> Result<u32> {
        let prj_path = shapefile_base(path)?.with_extension("prj");

        if !prj_path.exists() {
            tracing::warn!("{} has no .prj file, assuming EPSG:4326", path.display());
            return Ok(4326);
        }

        let prj_content = fs::read_to_string(&prj_path).map_err(|e| WatermapError::FormatError {
            format: "Shapefile".to_string(),
            message: format!("Failed to read .prj file: {}", e),
        })?;

        epsg_from_wkt(&prj_content)
            .or_else(|| esri_name_to_epsg(&prj_content))
            .ok_or_else(|| WatermapError::FormatError {
                format: "Shapefile".to_string(),
                message: format!(
                    "Could not identify the coordinate system in {}: {}",
                    prj_path.display(),
                    prj_content.trim()
                ),
            })
    }
}

/// Get the base path for a Shapefile (without extension)
fn shapefile_base(path: &Path) -> Result<PathBuf> {
    if !has_extension(path, "shp") {
        return Err(WatermapError::InvalidArgument {
            reason: format!("{} is not a Shapefile (.shp)", path.display()),
        });
    }

    Ok(path.with_extension(""))
}

/// Collect the XY part of shapefile points (any of Point, PointM, PointZ)
macro_rules! xy {
    ($points:expr) => {
        $points.iter().map(|p| Coord { x: p.x, y: p.y }).collect::<Vec<_>>()
    };
}

/// Convert a shapefile Shape to a geo Geometry. Z and M values are dropped.
pub(crate) fn shape_to_geometry(shape: Shape) -> Result<Option<Geometry<f64>>> {
    let geometry = match shape {
        Shape::NullShape => return Ok(None),
        Shape::Point(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointM(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointZ(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::Polyline(line) => lines(line.parts().iter().map(|part| xy!(part)).collect()),
        Shape::PolylineM(line) => lines(line.parts().iter().map(|part| xy!(part)).collect()),
        Shape::PolylineZ(line) => lines(line.parts().iter().map(|part| xy!(part)).collect()),
        Shape::Polygon(polygon) => polygons(
            polygon
                .rings()
                .iter()
                .map(|ring| (matches!(ring, PolygonRing::Outer(_)), xy!(ring.points())))
                .collect(),
        ),
        Shape::PolygonM(polygon) => polygons(
            polygon
                .rings()
                .iter()
                .map(|ring| (matches!(ring, PolygonRing::Outer(_)), xy!(ring.points())))
                .collect(),
        ),
        Shape::PolygonZ(polygon) => polygons(
            polygon
                .rings()
                .iter()
                .map(|ring| (matches!(ring, PolygonRing::Outer(_)), xy!(ring.points())))
                .collect(),
        ),
        Shape::Multipoint(mp) => Geometry::MultiPoint(MultiPoint::from(xy!(mp.points()))),
        Shape::MultipointM(mp) => Geometry::MultiPoint(MultiPoint::from(xy!(mp.points()))),
        Shape::MultipointZ(mp) => Geometry::MultiPoint(MultiPoint::from(xy!(mp.points()))),
        Shape::Multipatch(_) => {
            return Err(WatermapError::FormatError {
                format: "Shapefile".to_string(),
                message: "Multipatch geometry type is not supported".to_string(),
            })
        }
    };

    Ok(Some(geometry))
}

fn lines(parts: Vec<Vec<Coord<f64>>>) -> Geometry<f64> {
    let mut parts: Vec<LineString<f64>> = parts.into_iter().map(LineString::new).collect();
    if parts.len() == 1 {
        Geometry::LineString(parts.remove(0))
    } else {
        Geometry::MultiLineString(MultiLineString::new(parts))
    }
}

/// Group rings into polygons: each outer ring opens a polygon, inner rings
/// attach to the most recent outer ring.
fn polygons(rings: Vec<(bool, Vec<Coord<f64>>)>) -> Geometry<f64> {
    let mut grouped: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();

    for (is_outer, coords) in rings {
        let ring = LineString::new(coords);
        if !is_outer {
            if let Some((_, interiors)) = grouped.last_mut() {
                interiors.push(ring);
                continue;
            }
        }
        grouped.push((ring, Vec::new()));
    }

    let mut polygons: Vec<Polygon<f64>> = grouped
        .into_iter()
        .map(|(exterior, interiors)| Polygon::new(exterior, interiors))
        .collect();

    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon::new(polygons))
    }
}

fn extract_properties(record: shapefile::dbase::Record) -> HashMap<String, Value> {
    record
        .into_iter()
        .map(|(name, value)| (name, convert_dbase_value(value)))
        .collect()
}

/// Convert dBase field value to JSON value
fn convert_dbase_value(value: DbaseFieldValue) -> Value {
    match value {
        DbaseFieldValue::Character(Some(s)) => Value::String(s.trim_end().to_string()),
        DbaseFieldValue::Character(None) => Value::Null,
        DbaseFieldValue::Numeric(n) => n.map(number).unwrap_or(Value::Null),
        DbaseFieldValue::Float(f) => f.map(|f| number(f as f64)).unwrap_or(Value::Null),
        DbaseFieldValue::Double(d) => number(d),
        DbaseFieldValue::Integer(i) => Value::Number(i.into()),
        DbaseFieldValue::Logical(b) => b.map(Value::Bool).unwrap_or(Value::Null),
        DbaseFieldValue::Date(Some(date)) => {
            Value::String(format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day()))
        }
        DbaseFieldValue::Date(None) => Value::Null,
        DbaseFieldValue::Memo(s) => Value::String(s),
        other => Value::String(format!("{:?}", other)),
    }
}

fn number(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
