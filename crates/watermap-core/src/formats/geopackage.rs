//! GeoPackage format reader implementation
//!
//! A GeoPackage is an SQLite database. Feature layers are listed in
//! `gpkg_contents`, their geometry column and SRS in `gpkg_geometry_columns`,
//! and each geometry is stored as a GeoPackage binary header followed by WKB.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::Path;

use crate::error::{Result, WatermapError};
use crate::formats::validation::FormatValidator;
use crate::formats::{FormatReader, FormatValidation};
use crate::models::crs::epsg_from_wkt;
use crate::models::{Crs, Feature, FeatureCollection};

const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

/// GeoPackage format reader
pub struct GeoPackageReader;

impl FormatReader for GeoPackageReader {
    fn read(&self, path: &Path, layer: Option<&str>) -> Result<FeatureCollection> {
        let conn = open(path)?;
        let layers = feature_layers(&conn)?;

        let table = match layer {
            Some(name) => layers
                .iter()
                .find(|l| l.as_str() == name)
                .cloned()
                .ok_or_else(|| WatermapError::LayerNotFound {
                    layer: name.to_string(),
                    available: layers.clone(),
                })?,
            None => layers.first().cloned().ok_or_else(|| WatermapError::FormatError {
                format: "GeoPackage".to_string(),
                message: format!("{} contains no feature layers", path.display()),
            })?,
        };

        let (geometry_column, srs_id) = geometry_column(&conn, &table)?;
        let crs = Crs::from_epsg(resolve_srs(&conn, srs_id)?)?;
        let features = read_features(&conn, &table, &geometry_column)?;

        Ok(FeatureCollection::new(table, crs, features))
    }

    fn layer_names(&self, path: &Path) -> Result<Vec<String>> {
        feature_layers(&open(path)?)
    }

    fn supported_extensions(&self) -> &[&str] {
        &["gpkg"]
    }

    fn format_name(&self) -> &str {
        "GeoPackage"
    }

    fn validate(&self, path: &Path) -> FormatValidation {
        let validation = FormatValidator::validate_file_exists(path);
        if !validation.is_valid() {
            return validation;
        }

        let magic = FormatValidator::validate_magic(path, SQLITE_MAGIC, "GeoPackage");
        FormatValidator::merge_validations(vec![validation, magic])
    }
}

fn sql_error(e: rusqlite::Error) -> WatermapError {
    WatermapError::FormatError {
        format: "GeoPackage".to_string(),
        message: e.to_string(),
    }
}

fn open(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(sql_error)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Feature layer names in registration order
fn feature_layers(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY rowid")
        .map_err(sql_error)?;

    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(sql_error)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(sql_error)?;

    Ok(names)
}

fn geometry_column(conn: &Connection, table: &str) -> Result<(String, i64)> {
    conn.query_row(
        "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
        [table],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
    )
    .map_err(sql_error)
}

/// Resolve a GeoPackage srs_id to an EPSG code
fn resolve_srs(conn: &Connection, srs_id: i64) -> Result<u32> {
    // -1 and 0 are the undefined cartesian and geographic systems
    if srs_id <= 0 {
        tracing::warn!("GeoPackage layer has undefined SRS {}, assuming EPSG:4326", srs_id);
        return Ok(4326);
    }

    let (organization, code, definition): (String, i64, String) = conn
        .query_row(
            "SELECT organization, organization_coordsys_id, definition \
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            [srs_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .map_err(sql_error)?;

    if organization.eq_ignore_ascii_case("EPSG") {
        if let Ok(code) = u32::try_from(code) {
            return Ok(code);
        }
    }

    epsg_from_wkt(&definition).ok_or_else(|| WatermapError::FormatError {
        format: "GeoPackage".to_string(),
        message: format!("Unrecognized spatial reference system {} ({})", srs_id, organization),
    })
}

fn primary_key(conn: &Connection, table: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk LIMIT 1",
        [table],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(sql_error)
}

fn read_features(conn: &Connection, table: &str, geometry_column: &str) -> Result<Vec<Feature>> {
    let pk = primary_key(conn, table)?;

    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {}", quote_identifier(table)))
        .map_err(sql_error)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([]).map_err(sql_error)?;
    let mut features = Vec::new();

    while let Some(row) = rows.next().map_err(sql_error)? {
        let mut feature = Feature::new(features.len().to_string(), None);

        for (idx, column) in columns.iter().enumerate() {
            let value = row.get_ref(idx).map_err(sql_error)?;

            if column == geometry_column {
                feature.geometry = match value {
                    ValueRef::Blob(blob) => decode_geometry(blob)?,
                    ValueRef::Null => None,
                    _ => {
                        return Err(WatermapError::FormatError {
                            format: "GeoPackage".to_string(),
                            message: format!("Column {} does not hold geometry blobs", column),
                        })
                    }
                };
            } else if pk.as_deref() == Some(column.as_str()) {
                feature.id = match value {
                    ValueRef::Integer(i) => i.to_string(),
                    other => value_to_json(other).to_string(),
                };
            } else {
                feature.properties.insert(column.clone(), value_to_json(value));
            }
        }

        features.push(feature);
    }

    Ok(features)
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Decode a GeoPackage geometry blob: `GP` magic, version, flags, srs_id,
/// optional envelope, then standard WKB.
pub(crate) fn decode_geometry(blob: &[u8]) -> Result<Option<geo::Geometry<f64>>> {
    let invalid = |message: &str| WatermapError::FormatError {
        format: "GeoPackage".to_string(),
        message: message.to_string(),
    };

    if blob.len() < 8 || &blob[0..2] != b"GP" {
        return Err(invalid("Geometry blob is missing the GP header"));
    }

    let flags = blob[3];
    if flags & 0b0010_0000 != 0 {
        return Err(invalid("Extended GeoPackage geometry types are not supported"));
    }
    if flags & 0b0001_0000 != 0 {
        return Ok(None);
    }

    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        _ => return Err(invalid("Invalid envelope indicator in geometry header")),
    };

    let offset = 8 + envelope_len;
    if blob.len() <= offset {
        return Err(invalid("Geometry blob is truncated"));
    }

    let mut wkb_bytes = &blob[offset..];
    wkb::wkb_to_geom(&mut wkb_bytes)
        .map(Some)
        .map_err(|e| invalid(&format!("Invalid WKB geometry: {:?}", e)))
}
