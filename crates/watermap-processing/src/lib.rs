//! Watermap Processing - the GeoProcessor
//!
//! Ties the readers and geometry operations together: a processor bound to a
//! GeoPackage, a city mask and a projected working CRS loads masked layers,
//! clips collections to the city and computes water distribution sites per
//! capita by ZIP code.

pub mod mask;
pub mod per_capita;
pub mod processor;

pub use mask::{MaskMode, MaskSource};
pub use per_capita::{PerCapitaRate, PerCapitaRecord, PerCapitaStats, PerCapitaTable};
pub use processor::{validate_geopackage_path, validate_projected_crs, GeoProcessor};
