use geo::{BoundingRect, Rect};
use watermap_core::models::FeatureCollection;

/// Check if two bounding boxes intersect
pub fn bounding_boxes_intersect(bbox1: &Rect<f64>, bbox2: &Rect<f64>) -> bool {
    // Two rectangles intersect if they overlap in both x and y dimensions
    let x_overlap = bbox1.min().x <= bbox2.max().x && bbox1.max().x >= bbox2.min().x;
    let y_overlap = bbox1.min().y <= bbox2.max().y && bbox1.max().y >= bbox2.min().y;

    x_overlap && y_overlap
}

/// Keep the features whose bounding box intersects `extent`.
///
/// Features without a geometry never match. The collection's name and CRS
/// are kept; `extent` must be expressed in that CRS.
pub fn filter_by_extent(collection: &FeatureCollection, extent: &Rect<f64>) -> FeatureCollection {
    let features = collection
        .features
        .iter()
        .filter(|feature| {
            feature
                .geometry
                .as_ref()
                .and_then(|g| g.bounding_rect())
                .map(|bbox| bounding_boxes_intersect(&bbox, extent))
                .unwrap_or(false)
        })
        .cloned()
        .collect::<Vec<_>>();

    tracing::debug!(
        "Extent filter kept {} of {} features from '{}'",
        features.len(),
        collection.len(),
        collection.name
    );

    FeatureCollection::new(collection.name.clone(), collection.crs.clone(), features)
}
