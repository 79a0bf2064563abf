pub mod crs;
pub mod feature;
pub mod table;

pub use crs::{Crs, CrsKind};
pub use feature::{Feature, FeatureCollection, FeatureId};
pub use table::Table;
