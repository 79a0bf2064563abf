//! Watermap Geo - CRS transformation and spatial operations
//!
//! This crate reprojects feature collections with PROJ and provides the
//! extent filter, R-tree index, spatial join and clipping used by the
//! processing crate.

pub mod clip;
pub mod index;
pub mod join;
pub mod spatial;
pub mod transform;

pub use clip::clip_collection;
pub use index::SpatialIndex;
pub use join::{spatial_join_right, JoinRow};
pub use spatial::filter_by_extent;
pub use transform::{crs_match, reproject_collection};
