//! Spatial joins between feature collections

use watermap_core::error::Result;
use watermap_core::models::{Feature, FeatureCollection};

use crate::index::SpatialIndex;
use crate::transform::check_crs_mismatch;

/// One row of a spatial join
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JoinRow<'a> {
    pub right: &'a Feature,

    /// Matching feature of the left collection, None when nothing intersects
    pub left: Option<&'a Feature>,
}

/// Right join on the `intersects` predicate.
///
/// Every feature of `right` appears at least once: once per intersecting left
/// feature, or once with `left: None`. Rows follow the order of `right`, then
/// the order of `left`. Right features without a geometry never match.
pub fn spatial_join_right<'a>(
    left: &'a FeatureCollection,
    right: &'a FeatureCollection,
) -> Result<Vec<JoinRow<'a>>> {
    check_crs_mismatch(&left.crs, &right.crs)?;

    let index = SpatialIndex::from_collection(left);
    let mut rows = Vec::with_capacity(right.len());

    for feature in right.iter() {
        let matches = feature
            .geometry
            .as_ref()
            .map(|g| index.query_intersects(g))
            .unwrap_or_default();

        if matches.is_empty() {
            rows.push(JoinRow {
                right: feature,
                left: None,
            });
            continue;
        }

        rows.extend(matches.into_iter().map(|id| JoinRow {
            right: feature,
            left: Some(&left.features[id]),
        }));
    }

    tracing::debug!(
        "Joined '{}' ({} features) onto '{}' ({} features): {} rows",
        left.name,
        left.len(),
        right.name,
        right.len(),
        rows.len()
    );

    Ok(rows)
}
