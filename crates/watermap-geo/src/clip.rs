//! Clipping feature collections to a polygon mask

use geo::{BooleanOps, Geometry, Intersects, LineString, MultiLineString, MultiPoint, MultiPolygon, Polygon};
use watermap_core::error::Result;
use watermap_core::models::{Feature, FeatureCollection};

use crate::transform::check_crs_mismatch;

/// Union of all polygonal geometries of the mask
pub fn mask_area(mask: &FeatureCollection) -> MultiPolygon<f64> {
    mask.geometries()
        .flat_map(polygons_of)
        .fold(MultiPolygon::new(Vec::new()), |acc, polygon| {
            if acc.0.is_empty() {
                MultiPolygon::new(vec![polygon])
            } else {
                acc.union(&polygon)
            }
        })
}

fn polygons_of(geometry: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(polygons_of).collect(),
        _ => Vec::new(),
    }
}

/// Cut a geometry to the mask area. None when nothing is left.
pub fn clip_geometry(geometry: &Geometry<f64>, area: &MultiPolygon<f64>) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(p) => area.intersects(p).then(|| Geometry::Point(*p)),
        Geometry::MultiPoint(mp) => {
            let kept: Vec<_> = mp.iter().filter(|p| area.intersects(*p)).copied().collect();
            match kept.len() {
                0 => None,
                1 => Some(Geometry::Point(kept[0])),
                _ => Some(Geometry::MultiPoint(MultiPoint::new(kept))),
            }
        }
        Geometry::Line(line) => clip_lines(vec![LineString::from(vec![line.start, line.end])], area),
        Geometry::LineString(ls) => clip_lines(vec![ls.clone()], area),
        Geometry::MultiLineString(mls) => clip_lines(mls.0.clone(), area),
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            let subject = MultiPolygon::new(polygons_of(geometry));
            let clipped = subject.intersection(area);
            match clipped.0.len() {
                0 => None,
                1 => clipped.0.into_iter().next().map(Geometry::Polygon),
                _ => Some(Geometry::MultiPolygon(clipped)),
            }
        }
        Geometry::GeometryCollection(gc) => {
            let parts: Vec<_> = gc.iter().filter_map(|g| clip_geometry(g, area)).collect();
            (!parts.is_empty()).then(|| Geometry::GeometryCollection(geo::GeometryCollection(parts)))
        }
    }
}

fn clip_lines(lines: Vec<LineString<f64>>, area: &MultiPolygon<f64>) -> Option<Geometry<f64>> {
    let clipped = area.clip(&MultiLineString::new(lines), false);
    match clipped.0.len() {
        0 => None,
        1 => clipped.0.into_iter().next().map(Geometry::LineString),
        _ => Some(Geometry::MultiLineString(clipped)),
    }
}

/// Clip every feature of `collection` to the polygons of `mask`.
///
/// Features left empty (or stored without geometry) are dropped. Ids and
/// properties of the kept features are unchanged.
pub fn clip_collection(collection: &FeatureCollection, mask: &FeatureCollection) -> Result<FeatureCollection> {
    check_crs_mismatch(&collection.crs, &mask.crs)?;

    let area = mask_area(mask);
    let features: Vec<Feature> = collection
        .iter()
        .filter_map(|feature| {
            let clipped = feature.geometry.as_ref().and_then(|g| clip_geometry(g, &area))?;
            Some(Feature {
                id: feature.id.clone(),
                geometry: Some(clipped),
                properties: feature.properties.clone(),
            })
        })
        .collect();

    tracing::debug!(
        "Clipped '{}' to '{}': kept {} of {} features",
        collection.name,
        mask.name,
        features.len(),
        collection.len()
    );

    Ok(FeatureCollection::new(collection.name.clone(), collection.crs.clone(), features))
}
