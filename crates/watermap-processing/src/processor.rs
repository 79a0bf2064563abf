//! The processor bound to one GeoPackage, one city mask and one working CRS

use std::fmt;
use std::path::{Path, PathBuf};

use watermap_core::config::LayeredConfig;
use watermap_core::error::{Result, WatermapError};
use watermap_core::formats::csv::read_csv_table;
use watermap_core::formats::validation::has_extension;
use watermap_core::formats::FormatRegistry;
use watermap_core::models::{Crs, FeatureCollection};
use watermap_geo::transform::reproject_rect;
use watermap_geo::{clip_collection, crs_match, filter_by_extent, reproject_collection};

use crate::mask::{MaskMode, MaskSource};
use crate::per_capita::{per_capita_table, PerCapitaTable};

/// Census population exports carry one metadata row above the header
const POPULATION_METADATA_ROWS: usize = 1;

const CONVERT_HINT: &str = "Try converting the file to a different vector filetype such as .shp";

/// Check that a path names a GeoPackage (`.gpkg`, any case)
pub fn validate_geopackage_path(path: &Path) -> Result<PathBuf> {
    if has_extension(path, "gpkg") {
        Ok(path.to_path_buf())
    } else {
        Err(WatermapError::invalid_argument(format!(
            "{} must be a geopackage (.gpkg) file",
            path.display()
        )))
    }
}

/// Resolve an EPSG code and require a projected CRS
pub fn validate_projected_crs(epsg: u32) -> Result<Crs> {
    let crs = Crs::from_epsg(epsg)?;
    if crs.is_projected() {
        Ok(crs)
    } else {
        Err(WatermapError::invalid_argument(format!(
            "{} is not a projected coordinate system",
            crs
        )))
    }
}

/// Load the mask and bring it into `crs`
fn resolve_mask(
    registry: &FormatRegistry,
    source: MaskSource,
    layer: Option<&str>,
    crs: &Crs,
) -> Result<FeatureCollection> {
    let mask = match source {
        MaskSource::File { path, .. } => registry.read(&path, layer).map_err(|e| {
            if e.is_unrecognized_format() {
                WatermapError::invalid_argument(format!(
                    "{} was not recognized as a vector file ({}). {}",
                    path.display(),
                    e,
                    CONVERT_HINT
                ))
            } else {
                e
            }
        })?,
        MaskSource::InMemory(collection) => collection,
    };

    if crs_match(&mask.crs, crs) {
        return Ok(mask);
    }

    tracing::info!("Mask '{}' is in {}. Converting to {}", mask.name, mask.crs, crs);
    reproject_collection(&mask, crs)
}

/// Loads, masks and reprojects the layers of a city-scale water study.
///
/// The mask is always stored in the working CRS, and the working CRS is
/// always projected.
pub struct GeoProcessor {
    geopackage_path: PathBuf,
    crs: Crs,
    mask: FeatureCollection,
    mask_layer_name: Option<String>,
    registry: FormatRegistry,
}

impl GeoProcessor {
    /// Validate the GeoPackage path and CRS, then load and normalize the mask
    pub fn new(geopackage_path: impl AsRef<Path>, mask: MaskSource, epsg: u32) -> Result<Self> {
        let geopackage_path = validate_geopackage_path(geopackage_path.as_ref())?;
        let crs = validate_projected_crs(epsg)?;
        let registry = FormatRegistry::with_defaults();

        let mask_layer_name = match &mask {
            MaskSource::File { layer, .. } => layer.clone(),
            MaskSource::InMemory(_) => None,
        };
        let mask = resolve_mask(&registry, mask, mask_layer_name.as_deref(), &crs)?;

        tracing::debug!(
            "Processor ready: {} in {}, mask '{}' with {} features",
            geopackage_path.display(),
            crs,
            mask.name,
            mask.len()
        );

        Ok(Self {
            geopackage_path,
            crs,
            mask,
            mask_layer_name,
            registry,
        })
    }

    /// Build from layered configuration. The geopackage and mask must be set.
    pub fn from_config(config: &LayeredConfig) -> Result<Self> {
        let geopackage = config
            .geopackage
            .value
            .as_ref()
            .ok_or_else(|| WatermapError::ConfigMissing {
                key: "geopackage".to_string(),
            })?;
        let mask = config
            .mask
            .value
            .as_ref()
            .ok_or_else(|| WatermapError::ConfigMissing {
                key: "mask".to_string(),
            })?;

        let source = MaskSource::File {
            path: mask.clone(),
            layer: config.mask_layer.value.clone(),
        };
        Self::new(geopackage, source, config.crs.value)
    }

    pub fn geopackage_path(&self) -> &Path {
        &self.geopackage_path
    }

    pub fn set_geopackage_path(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.geopackage_path = validate_geopackage_path(path.as_ref())?;
        Ok(())
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    /// Change the working CRS. The stored mask is reprojected along with it.
    pub fn set_crs(&mut self, epsg: u32) -> Result<()> {
        let crs = validate_projected_crs(epsg)?;
        let mask = reproject_collection(&self.mask, &crs)?;
        self.crs = crs;
        self.mask = mask;
        Ok(())
    }

    pub fn mask(&self) -> &FeatureCollection {
        &self.mask
    }

    /// Replace the mask. A file source without a layer falls back to
    /// the stored mask layer name.
    pub fn set_mask(&mut self, source: MaskSource) -> Result<()> {
        let layer = match &source {
            MaskSource::File { layer: Some(layer), .. } => Some(layer.clone()),
            MaskSource::File { layer: None, .. } => self.mask_layer_name.clone(),
            MaskSource::InMemory(_) => None,
        };
        let explicit_layer = matches!(source, MaskSource::File { layer: Some(_), .. });

        let mask = resolve_mask(&self.registry, source, layer.as_deref(), &self.crs)?;
        self.mask = mask;
        if explicit_layer {
            self.mask_layer_name = layer;
        }
        Ok(())
    }

    pub fn mask_layer_name(&self) -> Option<&str> {
        self.mask_layer_name.as_deref()
    }

    /// Takes effect on the next file-based `set_mask`
    pub fn set_mask_layer_name(&mut self, layer: Option<String>) {
        self.mask_layer_name = layer;
    }

    /// Feature layers of the base GeoPackage
    pub fn list_layers(&self) -> Result<Vec<String>> {
        self.registry.layer_names(&self.geopackage_path)
    }

    /// Read one layer, optionally keep only features within the mask
    /// extent, and bring the result into the working CRS.
    pub fn load_features(&self, path: &Path, layer: Option<&str>, mode: MaskMode) -> Result<FeatureCollection> {
        let collection = self.registry.read(path, layer)?;

        let collection = match mode {
            MaskMode::Apply => match self.mask.bounding_rect() {
                Some(extent) => {
                    let native_extent = reproject_rect(&extent, &self.crs, &collection.crs)?;
                    filter_by_extent(&collection, &native_extent)
                }
                None => {
                    tracing::warn!(
                        "Mask '{}' has no extent; no features of {} are kept",
                        self.mask.name,
                        path.display()
                    );
                    FeatureCollection::new(collection.name, collection.crs, Vec::new())
                }
            },
            MaskMode::Ignore => collection,
        };

        if crs_match(&collection.crs, &self.crs) {
            return Ok(collection);
        }

        tracing::info!(
            "{} was projected in {}. Converting to {}",
            path.display(),
            collection.crs,
            self.crs
        );
        reproject_collection(&collection, &self.crs)
    }

    /// Read a layer of the base GeoPackage
    pub fn load_layer(&self, layer: &str, mode: MaskMode) -> Result<FeatureCollection> {
        self.load_features(&self.geopackage_path, Some(layer), mode)
    }

    /// True when both collections carry the same CRS
    pub fn check_same_crs(a: &FeatureCollection, b: &FeatureCollection) -> bool {
        crs_match(&a.crs, &b.crs)
    }

    /// True when the collection's CRS is projected
    pub fn check_if_projected(collection: &FeatureCollection) -> bool {
        collection.crs.is_projected()
    }

    /// Building footprints within the mask extent
    pub fn mask_buildings(&self, path: &Path) -> Result<FeatureCollection> {
        self.load_features(path, None, MaskMode::Apply)
    }

    /// Road lines within the mask extent
    pub fn mask_roads(&self, path: &Path, layer: Option<&str>) -> Result<FeatureCollection> {
        self.load_features(path, layer, MaskMode::Apply)
    }

    /// ZIP code tabulation areas within the mask extent
    pub fn mask_zip(&self, path: &Path, layer: Option<&str>) -> Result<FeatureCollection> {
        self.load_features(path, layer, MaskMode::Apply)
    }

    /// Water distribution sites per 10,000 people for every ZCTA near the city.
    ///
    /// ZCTAs are masked. Sites are not, so that sites in a ZCTA which
    /// extends past the city boundary are still counted.
    pub fn water_distribution_by_tiger_zip_per_capita(
        &self,
        zip_path: &Path,
        population_csv: &Path,
        water_path: &Path,
        water_layer: Option<&str>,
    ) -> Result<PerCapitaTable> {
        let zips = self.load_features(zip_path, None, MaskMode::Apply)?;
        let sites = self.load_features(water_path, water_layer, MaskMode::Ignore)?;
        let population = read_csv_table(population_csv, POPULATION_METADATA_ROWS)?;

        per_capita_table(&zips, &sites, &population)
    }

    /// Cut a collection to the mask geometry.
    ///
    /// Input in another CRS is reprojected first.
    pub fn clip_to_city(&self, collection: &FeatureCollection) -> Result<FeatureCollection> {
        if crs_match(&collection.crs, &self.crs) {
            return clip_collection(collection, &self.mask);
        }

        tracing::info!(
            "'{}' was projected in {}. Converting to {} before clipping",
            collection.name,
            collection.crs,
            self.crs
        );
        clip_collection(&reproject_collection(collection, &self.crs)?, &self.mask)
    }
}

impl fmt::Debug for GeoProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoProcessor")
            .field("geopackage_path", &self.geopackage_path)
            .field("crs", &self.crs)
            .field("mask", &format_args!("{} ({} features)", self.mask.name, self.mask.len()))
            .field("mask_layer_name", &self.mask_layer_name)
            .field("formats", &self.registry.supported_formats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, Geometry};
    use proptest::prelude::*;
    use std::fs;
    use watermap_core::models::Feature;

    fn city_mask() -> FeatureCollection {
        FeatureCollection::new(
            "city_boundary",
            Crs::from_epsg(6509).unwrap(),
            vec![Feature::new(
                "jackson",
                Some(Geometry::Polygon(polygon![
                    (x: 0.0, y: 0.0),
                    (x: 100.0, y: 0.0),
                    (x: 100.0, y: 100.0),
                    (x: 0.0, y: 100.0),
                ])),
            )],
        )
    }

    fn processor() -> GeoProcessor {
        GeoProcessor::new("jackson.gpkg", MaskSource::InMemory(city_mask()), 6509).unwrap()
    }

    #[test]
    fn test_geopackage_extension() {
        assert!(validate_geopackage_path(Path::new("data/jackson.gpkg")).is_ok());
        assert!(validate_geopackage_path(Path::new("data/JACKSON.GPKG")).is_ok());
        assert!(matches!(
            validate_geopackage_path(Path::new("data/jackson.shp")),
            Err(WatermapError::InvalidArgument { .. })
        ));
        assert!(validate_geopackage_path(Path::new("data/jackson")).is_err());
    }

    #[test]
    fn test_projected_crs_required() {
        assert!(validate_projected_crs(6509).unwrap().is_projected());
        assert!(matches!(validate_projected_crs(4326), Err(WatermapError::InvalidArgument { .. })));
        assert!(matches!(validate_projected_crs(999_999), Err(WatermapError::UnknownCrs { .. })));
    }

    #[test]
    fn test_new_rejects_bad_configuration() {
        let bad_path = GeoProcessor::new("jackson.shp", MaskSource::InMemory(city_mask()), 6509);
        assert!(matches!(bad_path, Err(WatermapError::InvalidArgument { .. })));

        let bad_crs = GeoProcessor::new("jackson.gpkg", MaskSource::InMemory(city_mask()), 4269);
        assert!(matches!(bad_crs, Err(WatermapError::InvalidArgument { .. })));
    }

    #[test]
    fn test_setters_revalidate() {
        let mut processor = processor();

        assert!(processor.set_geopackage_path("other.txt").is_err());
        assert_eq!(processor.geopackage_path(), Path::new("jackson.gpkg"));

        processor.set_geopackage_path("other.GPKG").unwrap();
        assert_eq!(processor.geopackage_path(), Path::new("other.GPKG"));

        assert!(processor.set_crs(4326).is_err());
        assert_eq!(processor.crs().epsg, 6509);
        assert_eq!(processor.mask().crs.epsg, 6509);
    }

    #[test]
    fn test_unrecognized_mask_file_is_invalid_argument() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boundary.kml");
        fs::write(&path, "<kml/>").unwrap();

        match GeoProcessor::new("jackson.gpkg", MaskSource::file(&path), 6509) {
            Err(WatermapError::InvalidArgument { reason }) => assert!(reason.contains(".shp")),
            other => panic!("expected InvalidArgument, got {:?}", other),
        }

        let broken = dir.path().join("boundary.geojson");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            GeoProcessor::new("jackson.gpkg", MaskSource::file(&broken), 6509),
            Err(WatermapError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_missing_mask_file_is_not_translated() {
        let result = GeoProcessor::new("jackson.gpkg", MaskSource::file("/nonexistent/boundary.shp"), 6509);
        assert!(matches!(result, Err(WatermapError::FileNotFound { .. })));
    }

    #[test]
    fn test_check_helpers() {
        let mask = city_mask();
        let wgs84 = FeatureCollection::new("pts", Crs::wgs84(), vec![]);

        assert!(GeoProcessor::check_same_crs(&mask, &mask));
        assert!(!GeoProcessor::check_same_crs(&mask, &wgs84));
        assert!(GeoProcessor::check_if_projected(&mask));
        assert!(!GeoProcessor::check_if_projected(&wgs84));
    }

    #[test]
    fn test_clip_to_city() {
        let processor = processor();
        let sites = FeatureCollection::new(
            "sites",
            Crs::from_epsg(6509).unwrap(),
            vec![
                Feature::new("in", Some(Geometry::Point(point!(x: 50.0, y: 50.0)))),
                Feature::new("out", Some(Geometry::Point(point!(x: 150.0, y: 50.0)))),
            ],
        );

        let clipped = processor.clip_to_city(&sites).unwrap();
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped.features[0].id, "in");
    }

    #[test]
    fn test_mask_layer_name_from_source() {
        let processor = processor();
        assert_eq!(processor.mask_layer_name(), None);
        assert!(format!("{:?}", processor).contains("city_boundary"));
    }

    proptest! {
        #[test]
        fn prop_utm_zones_are_accepted(zone in 32601u32..=32660) {
            prop_assert!(validate_projected_crs(zone).is_ok());
        }

        #[test]
        fn prop_geographic_codes_are_rejected(
            code in prop::sample::select(vec![4326u32, 4269, 4258, 4283])
        ) {
            let is_invalid_argument = matches!(
                validate_projected_crs(code),
                Err(WatermapError::InvalidArgument { .. })
            );
            prop_assert!(is_invalid_argument);
        }

        #[test]
        fn prop_non_gpkg_extensions_are_rejected(stem in "[a-z]{1,8}", ext in "[a-z]{1,5}") {
            prop_assume!(!ext.eq_ignore_ascii_case("gpkg"));
            let path = PathBuf::from(format!("{}.{}", stem, ext));
            prop_assert!(validate_geopackage_path(&path).is_err());
        }
    }
}
