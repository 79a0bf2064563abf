//! CRS transformation and normalization

use geo::{BoundingRect, Coord, Densify, Euclidean, Geometry, MapCoords, Rect};
use proj::Proj;
use watermap_core::error::{Result, WatermapError};
use watermap_core::models::{Crs, Feature, FeatureCollection};

/// Check if two CRS are the same
pub fn crs_match(crs1: &Crs, crs2: &Crs) -> bool {
    crs1.epsg == crs2.epsg
}

/// Detect CRS mismatch and return error if they don't match
pub fn check_crs_mismatch(left: &Crs, right: &Crs) -> Result<()> {
    if !crs_match(left, right) {
        return Err(WatermapError::CrsMismatch {
            left: left.to_string(),
            right: right.to_string(),
        });
    }
    Ok(())
}

/// Build a PROJ transformation between two EPSG codes.
///
/// Axis order is normalized so x is easting/longitude and y is northing/latitude.
fn projection(from_crs: &Crs, to_crs: &Crs) -> Result<Proj> {
    Proj::new_known_crs(&from_crs.authority(), &to_crs.authority(), None).map_err(|e| {
        WatermapError::Projection {
            from: from_crs.authority(),
            to: to_crs.authority(),
            reason: format!("Failed to create projection: {}", e),
        }
    })
}

fn apply(proj: &Proj, geometry: &Geometry<f64>, from_crs: &Crs, to_crs: &Crs) -> Result<Geometry<f64>> {
    geometry
        .try_map_coords(|coord| proj.convert((coord.x, coord.y)).map(|(x, y)| Coord { x, y }))
        .map_err(|e| WatermapError::Projection {
            from: from_crs.authority(),
            to: to_crs.authority(),
            reason: e.to_string(),
        })
}

/// Reproject a geometry from one CRS to another
pub fn reproject_geometry(
    geometry: &Geometry<f64>,
    from_crs: &Crs,
    to_crs: &Crs,
) -> Result<Geometry<f64>> {
    // If CRS are the same, no transformation needed
    if crs_match(from_crs, to_crs) {
        return Ok(geometry.clone());
    }

    let proj = projection(from_crs, to_crs)?;
    apply(&proj, geometry, from_crs, to_crs)
}

/// Reproject every feature of a collection into `target`.
///
/// A single PROJ transformation is built per collection. Properties and ids
/// are carried over unchanged.
pub fn reproject_collection(collection: &FeatureCollection, target: &Crs) -> Result<FeatureCollection> {
    if crs_match(&collection.crs, target) {
        return Ok(collection.clone());
    }

    let proj = projection(&collection.crs, target)?;
    let features = collection
        .features
        .iter()
        .map(|feature| {
            let geometry = feature
                .geometry
                .as_ref()
                .map(|g| apply(&proj, g, &collection.crs, target))
                .transpose()?;

            Ok(Feature {
                id: feature.id.clone(),
                geometry,
                properties: feature.properties.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(
        "Reprojected {} features of '{}' from {} to {}",
        features.len(),
        collection.name,
        collection.crs,
        target
    );

    Ok(FeatureCollection::new(collection.name.clone(), target.clone(), features))
}

/// Points per rectangle edge when transforming an extent
const EXTENT_EDGE_SAMPLES: f64 = 32.0;

/// Transform a rectangle and return the bounding rectangle of the result.
///
/// Edges are densified first, since straight edges can bow outward in the
/// target CRS and the corners alone would understate the extent.
pub fn reproject_rect(rect: &Rect<f64>, from_crs: &Crs, to_crs: &Crs) -> Result<Rect<f64>> {
    if crs_match(from_crs, to_crs) {
        return Ok(*rect);
    }

    let outline = rect.to_polygon();
    let step = rect.width().max(rect.height()) / EXTENT_EDGE_SAMPLES;
    let outline = if step > 0.0 {
        Euclidean.densify(&outline, step)
    } else {
        outline
    };

    let transformed = reproject_geometry(&Geometry::Polygon(outline), from_crs, to_crs)?;
    transformed.bounding_rect().ok_or_else(|| WatermapError::Projection {
        from: from_crs.authority(),
        to: to_crs.authority(),
        reason: "transformed extent is empty".to_string(),
    })
}
