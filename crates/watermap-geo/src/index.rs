use geo::{BoundingRect, Geometry, Intersects, Rect};
use rstar::{RTree, RTreeObject, AABB};
use watermap_core::models::FeatureCollection;

/// Indexed geometry with its position in the source collection
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedGeometry {
    /// Index of the feature in the collection the index was built from
    pub id: usize,

    pub geometry: Geometry<f64>,

    envelope: AABB<[f64; 2]>,
}

impl IndexedGeometry {
    /// None for geometries without an extent (empty collections)
    pub fn new(id: usize, geometry: Geometry<f64>) -> Option<Self> {
        let rect = geometry.bounding_rect()?;
        Some(Self {
            id,
            geometry,
            envelope: envelope_of(&rect),
        })
    }
}

impl RTreeObject for IndexedGeometry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn envelope_of(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// R-tree over the geometries of a feature collection
pub struct SpatialIndex {
    tree: RTree<IndexedGeometry>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self { tree: RTree::new() }
    }

    /// Bulk-load every feature that has a geometry with an extent
    pub fn from_collection(collection: &FeatureCollection) -> Self {
        let indexed: Vec<IndexedGeometry> = collection
            .features
            .iter()
            .enumerate()
            .filter_map(|(id, feature)| {
                feature
                    .geometry
                    .clone()
                    .and_then(|g| IndexedGeometry::new(id, g))
            })
            .collect();

        Self {
            tree: RTree::bulk_load(indexed),
        }
    }

    pub fn insert(&mut self, id: usize, geometry: Geometry<f64>) {
        if let Some(indexed) = IndexedGeometry::new(id, geometry) {
            self.tree.insert(indexed);
        }
    }

    /// Entries whose envelope intersects `rect`
    pub fn query_bbox(&self, rect: &Rect<f64>) -> Vec<&IndexedGeometry> {
        self.tree
            .locate_in_envelope_intersecting(&envelope_of(rect))
            .collect()
    }

    /// Ids of entries whose geometry intersects `geometry`, in ascending order
    pub fn query_intersects(&self, geometry: &Geometry<f64>) -> Vec<usize> {
        let Some(rect) = geometry.bounding_rect() else {
            return Vec::new();
        };

        let mut ids: Vec<usize> = self
            .query_bbox(&rect)
            .into_iter()
            .filter(|indexed| indexed.geometry.intersects(geometry))
            .map(|indexed| indexed.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl Default for SpatialIndex {
    fn default() -> Self {
        Self::new()
    }
}
