//! End-to-end tests for the GeoProcessor against on-disk fixtures
//!
//! Fixtures are written in EPSG:6509 (NAD83(2011) / Mississippi West, metres)
//! unless a test exercises reprojection:
//! - a GeoPackage with `water_sites` (points) and `roads` (lines)
//! - GeoJSON ZCTA polygons and building footprints
//! - a census population extract with its metadata row

use std::fs;
use std::path::{Path, PathBuf};

use geo::{point, polygon, BoundingRect, Geometry, LineString};
use rusqlite::Connection;
use tempfile::TempDir;
use watermap_core::config::{ConfigOverrides, LayeredConfig};
use watermap_core::models::{Crs, Feature, FeatureCollection};
use watermap_core::WatermapError;
use watermap_geo::reproject_collection;
use watermap_processing::{GeoProcessor, MaskMode, MaskSource, PerCapitaRate};

const X0: f64 = 560_000.0;
const Y0: f64 = 1_010_000.0;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn nad83_ms_west() -> Crs {
    Crs::from_epsg(6509).unwrap()
}

fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Geometry<f64> {
    Geometry::Polygon(polygon![
        (x: min_x, y: min_y),
        (x: max_x, y: min_y),
        (x: max_x, y: max_y),
        (x: min_x, y: max_y),
    ])
}

fn write_geojson(dir: &TempDir, name: &str, collection: &FeatureCollection) -> PathBuf {
    let path = dir.path().join(name);
    let geojson = geojson::GeoJson::from(collection.to_geojson());
    fs::write(&path, geojson.to_string()).unwrap();
    path
}

/// City boundary: a 10 km square
fn city_boundary() -> FeatureCollection {
    FeatureCollection::new(
        "city_boundary",
        nad83_ms_west(),
        vec![Feature::new("jackson", Some(rect(X0, Y0, X0 + 10_000.0, Y0 + 10_000.0)))],
    )
}

fn zcta(label: &str, geometry: Geometry<f64>) -> Feature {
    Feature::new(label, Some(geometry))
        .with_property("ZCTA5CE20", label)
        .with_property("GEOIDFQ20", format!("860Z200US{}", label))
        .with_property("ALAND20", 25_000_000)
}

fn zip_codes() -> FeatureCollection {
    FeatureCollection::new(
        "tl_2020_us_zcta520",
        nad83_ms_west(),
        vec![
            // Extends west and south past the city boundary
            zcta("39201", rect(X0 - 5_000.0, Y0 - 5_000.0, X0 + 5_000.0, Y0 + 5_000.0)),
            zcta("39202", rect(X0 + 5_000.0, Y0 - 5_000.0, X0 + 15_000.0, Y0 + 5_000.0)),
            zcta("39203", rect(X0, Y0 + 5_000.0, X0 + 10_000.0, Y0 + 15_000.0)),
            // Far from the city
            zcta("39299", rect(X0 + 140_000.0, Y0 + 190_000.0, X0 + 150_000.0, Y0 + 200_000.0)),
        ],
    )
}

const POPULATION_CSV: &str = "GEO_ID,NAME,P1_001N\n\
                              Geography,Geographic Area Name, !!Total\n\
                              860Z200US39201,ZCTA5 39201,5000\n\
                              860Z200US39202,ZCTA5 39202,0\n\
                              860Z200US39203,ZCTA5 39203,2500\n\
                              860Z200US39299,ZCTA5 39299,100\n";

fn gp_header() -> Vec<u8> {
    let mut blob = vec![b'G', b'P', 0, 0b0000_0001];
    blob.extend_from_slice(&6509i32.to_le_bytes());
    blob
}

fn gpkg_point(x: f64, y: f64) -> Vec<u8> {
    let mut blob = gp_header();
    blob.push(1);
    blob.extend_from_slice(&1u32.to_le_bytes());
    blob.extend_from_slice(&x.to_le_bytes());
    blob.extend_from_slice(&y.to_le_bytes());
    blob
}

fn gpkg_line(coords: &[(f64, f64)]) -> Vec<u8> {
    let mut blob = gp_header();
    blob.push(1);
    blob.extend_from_slice(&2u32.to_le_bytes());
    blob.extend_from_slice(&(coords.len() as u32).to_le_bytes());
    for (x, y) in coords {
        blob.extend_from_slice(&x.to_le_bytes());
        blob.extend_from_slice(&y.to_le_bytes());
    }
    blob
}

/// GeoPackage with water distribution sites and roads
fn write_geopackage(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("jackson.gpkg");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE gpkg_spatial_ref_sys (srs_name TEXT, srs_id INTEGER PRIMARY KEY,
            organization TEXT, organization_coordsys_id INTEGER, definition TEXT, description TEXT);
        CREATE TABLE gpkg_contents (table_name TEXT PRIMARY KEY, data_type TEXT, identifier TEXT,
            srs_id INTEGER);
        CREATE TABLE gpkg_geometry_columns (table_name TEXT, column_name TEXT,
            geometry_type_name TEXT, srs_id INTEGER, z INTEGER, m INTEGER);
        INSERT INTO gpkg_spatial_ref_sys VALUES
            ('NAD83(2011) / Mississippi West', 6509, 'EPSG', 6509, 'undefined', NULL);
        INSERT INTO gpkg_contents VALUES ('water_sites', 'features', 'water_sites', 6509);
        INSERT INTO gpkg_contents VALUES ('roads', 'features', 'roads', 6509);
        INSERT INTO gpkg_geometry_columns VALUES ('water_sites', 'geom', 'POINT', 6509, 0, 0);
        INSERT INTO gpkg_geometry_columns VALUES ('roads', 'geom', 'LINESTRING', 6509, 0, 0);
        CREATE TABLE water_sites (fid INTEGER PRIMARY KEY AUTOINCREMENT, geom BLOB, SITE_NAME TEXT);
        CREATE TABLE roads (fid INTEGER PRIMARY KEY AUTOINCREMENT, geom BLOB, FULLNAME TEXT);
        "#,
    )
    .unwrap();

    let sites = [
        // In 39201 but outside the city boundary
        ("Byram Fire Station", X0 - 4_000.0, Y0 - 4_000.0),
        ("Capitol Street Tank", X0 + 2_000.0, Y0 + 2_000.0),
        ("Fondren Well", X0 + 12_000.0, Y0 + 2_000.0),
        ("Memphis Depot", X0 + 145_000.0, Y0 + 195_000.0),
    ];
    for (name, x, y) in sites {
        conn.execute(
            "INSERT INTO water_sites (geom, SITE_NAME) VALUES (?1, ?2)",
            rusqlite::params![gpkg_point(x, y), name],
        )
        .unwrap();
    }

    let roads = [
        ("Pearl St", vec![(X0 - 2_000.0, Y0 + 5_000.0), (X0 + 12_000.0, Y0 + 5_000.0)]),
        ("Far Rd", vec![(X0 + 100_000.0, Y0 + 100_000.0), (X0 + 110_000.0, Y0 + 100_000.0)]),
    ];
    for (name, coords) in roads {
        conn.execute(
            "INSERT INTO roads (geom, FULLNAME) VALUES (?1, ?2)",
            rusqlite::params![gpkg_line(&coords), name],
        )
        .unwrap();
    }

    path
}

struct Fixture {
    dir: TempDir,
    geopackage: PathBuf,
    zips: PathBuf,
    population: PathBuf,
    boundary: PathBuf,
}

fn fixture() -> Fixture {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let geopackage = write_geopackage(&dir);
    let zips = write_geojson(&dir, "tl_2020_us_zcta520.geojson", &zip_codes());
    let boundary = write_geojson(&dir, "city_boundary.geojson", &city_boundary());
    let population = dir.path().join("DECENNIALDHC2020.P1-Data.csv");
    fs::write(&population, POPULATION_CSV).unwrap();

    Fixture {
        dir,
        geopackage,
        zips,
        population,
        boundary,
    }
}

fn processor(fixture: &Fixture) -> GeoProcessor {
    GeoProcessor::new(&fixture.geopackage, MaskSource::file(&fixture.boundary), 6509).unwrap()
}

fn within_city(geometry: &Geometry<f64>) -> bool {
    let tolerance = 1e-6;
    let bbox = geometry.bounding_rect().unwrap();
    bbox.min().x >= X0 - tolerance
        && bbox.min().y >= Y0 - tolerance
        && bbox.max().x <= X0 + 10_000.0 + tolerance
        && bbox.max().y <= Y0 + 10_000.0 + tolerance
}

#[test]
fn test_mask_loaded_from_file() {
    let fixture = fixture();
    let processor = processor(&fixture);

    assert_eq!(processor.mask().name, "city_boundary");
    assert_eq!(processor.mask().crs, *processor.crs());
    assert_eq!(processor.mask().len(), 1);
}

#[test]
fn test_list_layers() {
    let fixture = fixture();
    let processor = processor(&fixture);

    assert_eq!(processor.list_layers().unwrap(), vec!["water_sites", "roads"]);
}

#[test]
fn test_mask_zip_drops_distant_zctas() {
    let fixture = fixture();
    let processor = processor(&fixture);

    let zips = processor.mask_zip(&fixture.zips, None).unwrap();
    let labels: Vec<String> = zips.iter().filter_map(|f| f.property_str("ZCTA5CE20")).collect();

    assert_eq!(labels, vec!["39201", "39202", "39203"]);
    assert!(GeoProcessor::check_same_crs(&zips, processor.mask()));
    assert!(GeoProcessor::check_if_projected(&zips));
}

#[test]
fn test_mask_roads_by_layer_name() {
    let fixture = fixture();
    let processor = processor(&fixture);

    let roads = processor.mask_roads(&fixture.geopackage, Some("roads")).unwrap();
    assert_eq!(roads.len(), 1);
    assert_eq!(roads.features[0].property_str("FULLNAME").as_deref(), Some("Pearl St"));

    let missing = processor.mask_roads(&fixture.geopackage, Some("hydrants"));
    assert!(matches!(missing, Err(WatermapError::LayerNotFound { .. })));
}

#[test]
fn test_load_layer_without_mask() {
    let fixture = fixture();
    let processor = processor(&fixture);

    let masked = processor.load_layer("water_sites", MaskMode::Apply).unwrap();
    let unmasked = processor
        .load_layer("water_sites", MaskMode::try_from(Some(false)).unwrap())
        .unwrap();

    // Only the downtown tank lies within the city extent
    assert_eq!(masked.len(), 1);
    assert_eq!(masked.features[0].property_str("SITE_NAME").as_deref(), Some("Capitol Street Tank"));
    assert_eq!(unmasked.len(), 4);
}

#[test]
fn test_mask_buildings_then_clip() {
    let fixture = fixture();
    let processor = processor(&fixture);

    let buildings = FeatureCollection::new(
        "buildings",
        nad83_ms_west(),
        vec![
            Feature::new("city_hall", Some(rect(X0 + 1_000.0, Y0 + 1_000.0, X0 + 1_200.0, Y0 + 1_200.0))),
            Feature::new("straddling", Some(rect(X0 + 9_900.0, Y0 + 500.0, X0 + 10_100.0, Y0 + 700.0))),
            Feature::new("suburb", Some(rect(X0 + 50_000.0, Y0, X0 + 50_200.0, Y0 + 200.0))),
        ],
    );
    let path = write_geojson(&fixture.dir, "buildings.geojson", &buildings);

    let masked = processor.mask_buildings(&path).unwrap();
    assert_eq!(masked.len(), 2);

    let clipped = processor.clip_to_city(&masked).unwrap();
    assert_eq!(clipped.len(), 2);
    assert!(clipped.geometries().all(within_city));
}

#[test]
fn test_clip_roads_to_city() {
    let fixture = fixture();
    let processor = processor(&fixture);

    let roads = processor.mask_roads(&fixture.geopackage, Some("roads")).unwrap();
    let clipped = processor.clip_to_city(&roads).unwrap();

    assert_eq!(clipped.len(), 1);
    let geometry = clipped.features[0].geometry.as_ref().unwrap();
    assert!(within_city(geometry));
    let bbox = geometry.bounding_rect().unwrap();
    assert!((bbox.width() - 10_000.0).abs() < 1e-6);
}

#[test]
fn test_per_capita_from_files() {
    let fixture = fixture();
    let processor = processor(&fixture);

    let table = processor
        .water_distribution_by_tiger_zip_per_capita(
            &fixture.zips,
            &fixture.population,
            &fixture.geopackage,
            Some("water_sites"),
        )
        .unwrap();

    assert_eq!(table.len(), 3);
    assert!(table.records_for("860Z200US39299").next().is_none());

    let stats = |geoid: &str| {
        table
            .records_for(geoid)
            .next()
            .and_then(|r| r.stats.clone())
            .unwrap()
    };

    // Both sites count, including the one outside the city boundary
    let downtown = stats("860Z200US39201");
    assert_eq!(downtown.count, 2);
    assert_eq!(downtown.per_10000_ppl, PerCapitaRate::Value(4.0));

    let unpopulated = stats("860Z200US39202");
    assert_eq!(unpopulated.count, 1);
    assert_eq!(unpopulated.per_10000_ppl, PerCapitaRate::Unknown);

    let no_sites = stats("860Z200US39203");
    assert_eq!(no_sites.count, 0);
    assert_eq!(no_sites.per_10000_ppl, PerCapitaRate::Value(0.0));

    let features = table.to_feature_collection();
    assert_eq!(features.crs.epsg, 6509);
    assert_eq!(features.features[0].property_str("Geography").as_deref(), Some("860Z200US39201"));
}

#[test]
fn test_per_capita_missing_population_file() {
    let fixture = fixture();
    let processor = processor(&fixture);

    let result = processor.water_distribution_by_tiger_zip_per_capita(
        &fixture.zips,
        Path::new("/nonexistent/population.csv"),
        &fixture.geopackage,
        Some("water_sites"),
    );
    assert!(matches!(result, Err(WatermapError::FileNotFound { .. })));
}

#[test]
fn test_set_mask_replaces_and_reuses_layer() {
    let fixture = fixture();
    let mut processor = processor(&fixture);

    let smaller = FeatureCollection::new(
        "downtown",
        nad83_ms_west(),
        vec![Feature::new("core", Some(rect(X0, Y0, X0 + 1_000.0, Y0 + 1_000.0)))],
    );
    processor.set_mask(MaskSource::InMemory(smaller)).unwrap();
    assert_eq!(processor.mask().name, "downtown");

    processor.set_mask(MaskSource::file_layer(&fixture.geopackage, "roads")).unwrap();
    assert_eq!(processor.mask_layer_name(), Some("roads"));
    assert_eq!(processor.mask().name, "roads");

    // A failed assignment leaves the previous mask in place
    assert!(processor.set_mask(MaskSource::file("/nonexistent/boundary.shp")).is_err());
    assert_eq!(processor.mask().name, "roads");
}

#[test]
fn test_from_config() {
    let fixture = fixture();

    let mut config = LayeredConfig::with_defaults();
    assert!(matches!(
        GeoProcessor::from_config(&config),
        Err(WatermapError::ConfigMissing { .. })
    ));

    config.apply_overrides(ConfigOverrides {
        geopackage: Some(fixture.geopackage.clone()),
        mask: Some(fixture.boundary.clone()),
        ..Default::default()
    });

    let processor = GeoProcessor::from_config(&config).unwrap();
    assert_eq!(processor.crs().epsg, 6509);
    assert_eq!(processor.geopackage_path(), fixture.geopackage.as_path());
}

#[test]
fn test_geographic_mask_is_reprojected() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let geopackage = write_geopackage(&dir);

    let lon_lat = FeatureCollection::new(
        "city_boundary",
        Crs::wgs84(),
        vec![Feature::new("jackson", Some(rect(-90.30, 32.22, -90.10, 32.42)))],
    );
    let processor = GeoProcessor::new(&geopackage, MaskSource::InMemory(lon_lat.clone()), 6509).unwrap();

    assert_eq!(processor.mask().crs.epsg, 6509);
    let expected = reproject_collection(&lon_lat, &nad83_ms_west()).unwrap();
    assert_eq!(processor.mask(), &expected);

    // Metres, not degrees
    let bbox = processor.mask().bounding_rect().unwrap();
    assert!(bbox.min().x > 100_000.0);
    assert!(bbox.min().y > 100_000.0);
}

#[test]
fn test_geographic_features_are_filtered_then_reprojected() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let geopackage = write_geopackage(&dir);

    let lon_lat_mask = FeatureCollection::new(
        "city_boundary",
        Crs::wgs84(),
        vec![Feature::new("jackson", Some(rect(-90.30, 32.22, -90.10, 32.42)))],
    );
    let processor = GeoProcessor::new(&geopackage, MaskSource::InMemory(lon_lat_mask), 6509).unwrap();

    let hydrants = FeatureCollection::new(
        "hydrants",
        Crs::wgs84(),
        vec![
            Feature::new("jackson", Some(Geometry::Point(point!(x: -90.18, y: 32.30)))),
            Feature::new("memphis", Some(Geometry::Point(point!(x: -90.05, y: 35.15)))),
        ],
    );
    let path = write_geojson(&dir, "hydrants.geojson", &hydrants);

    let loaded = processor.load_features(&path, None, MaskMode::Apply).unwrap();
    assert_eq!(loaded.crs.epsg, 6509);
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.features[0].id, "jackson");

    let everything = processor.load_features(&path, None, MaskMode::Ignore).unwrap();
    assert_eq!(everything.len(), 2);
}

#[test]
fn test_set_crs_reprojects_mask() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let geopackage = write_geopackage(&dir);

    let lon_lat = FeatureCollection::new(
        "city_boundary",
        Crs::wgs84(),
        vec![Feature::new(
            "jackson",
            Some(Geometry::LineString(LineString::from(vec![(-90.30, 32.22), (-90.10, 32.42)]))),
        )],
    );
    let mut processor = GeoProcessor::new(&geopackage, MaskSource::InMemory(lon_lat), 6509).unwrap();

    // WGS 84 / UTM zone 15N
    processor.set_crs(32615).unwrap();
    assert_eq!(processor.crs().epsg, 32615);
    assert_eq!(processor.mask().crs.epsg, 32615);
}
