//! Water distribution sites per 10,000 residents, by ZIP code tabulation area.
//!
//! Sites are counted per ZCTA through a spatial join against the ZCTA
//! polygons, merged with census population totals, and attached back onto
//! the ZCTA geometries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use geo::Geometry;
use serde_json::Value;
use watermap_core::error::Result;
use watermap_core::models::{Crs, Feature, FeatureCollection, Table};
use watermap_geo::spatial_join_right;

/// Fully qualified ZCTA identifier, the join key
pub const ZIP_ID_COLUMN: &str = "GEOIDFQ20";
/// Five digit ZIP code label
pub const ZIP_LABEL_COLUMN: &str = "ZCTA5CE20";
/// Identifier column of the census population table
pub const GEOGRAPHY_COLUMN: &str = "Geography";
/// Total population column of the census table (note the leading space)
pub const POPULATION_COLUMN: &str = " !!Total";
pub const RATE_COLUMN: &str = "Per_10000_ppl";
pub const COUNT_COLUMN: &str = "count";

const PER_PEOPLE: f64 = 10_000.0;

/// Sites per 10,000 people
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerCapitaRate {
    Value(f64),
    /// Population is zero or unavailable
    Unknown,
}

impl PerCapitaRate {
    pub fn compute(count: u64, population: Option<f64>) -> Self {
        match population {
            Some(population) => {
                let rate = count as f64 / population * PER_PEOPLE;
                if rate.is_finite() {
                    PerCapitaRate::Value(rate)
                } else {
                    PerCapitaRate::Unknown
                }
            }
            None => PerCapitaRate::Unknown,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            PerCapitaRate::Value(v) => Some(*v),
            PerCapitaRate::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PerCapitaRate::Unknown)
    }

    fn to_json(self) -> Value {
        self.value()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

impl fmt::Display for PerCapitaRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerCapitaRate::Value(v) => write!(f, "{}", v),
            PerCapitaRate::Unknown => write!(f, "unknown"),
        }
    }
}

/// Population row merged with the site count for its ZCTA
#[derive(Debug, Clone, PartialEq)]
pub struct PerCapitaStats {
    /// Value of the `Geography` column
    pub geography: String,
    /// Sites inside the ZCTA, zero when none were joined
    pub count: u64,
    /// `None` when the population cell is empty or not numeric
    pub population: Option<f64>,
    pub per_10000_ppl: PerCapitaRate,
    /// Remaining population table columns, verbatim
    pub attributes: BTreeMap<String, String>,
}

/// One ZCTA geometry with its statistics
#[derive(Debug, Clone, PartialEq)]
pub struct PerCapitaRecord {
    pub zcta5ce20: Option<String>,
    pub geoidfq20: Option<String>,
    pub geometry: Option<Geometry<f64>>,
    /// None when the population table has no row for this ZCTA
    pub stats: Option<PerCapitaStats>,
}

/// Result of the per-capita statistic, one record per ZCTA geometry and
/// matching population row
#[derive(Debug, Clone, PartialEq)]
pub struct PerCapitaTable {
    pub crs: Crs,
    pub rows: Vec<PerCapitaRecord>,
}

impl PerCapitaTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PerCapitaRecord> {
        self.rows.iter()
    }

    /// Records for a fully qualified ZCTA identifier
    pub fn records_for<'a>(&'a self, geoidfq20: &'a str) -> impl Iterator<Item = &'a PerCapitaRecord> + 'a {
        self.rows
            .iter()
            .filter(move |r| r.geoidfq20.as_deref() == Some(geoidfq20))
    }

    /// Flatten into features with the census column names as properties
    pub fn to_feature_collection(&self) -> FeatureCollection {
        let features = self
            .rows
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let mut feature = Feature::new(idx.to_string(), record.geometry.clone())
                    .with_property(ZIP_LABEL_COLUMN, optional_text(record.zcta5ce20.as_deref()))
                    .with_property(ZIP_ID_COLUMN, optional_text(record.geoidfq20.as_deref()));

                match &record.stats {
                    Some(stats) => {
                        feature = feature
                            .with_property(GEOGRAPHY_COLUMN, stats.geography.as_str())
                            .with_property(COUNT_COLUMN, stats.count)
                            .with_property(
                                POPULATION_COLUMN,
                                stats
                                    .population
                                    .and_then(serde_json::Number::from_f64)
                                    .map(Value::Number)
                                    .unwrap_or(Value::Null),
                            )
                            .with_property(RATE_COLUMN, stats.per_10000_ppl.to_json());
                        for (key, value) in &stats.attributes {
                            feature = feature.with_property(key.as_str(), value.as_str());
                        }
                    }
                    None => {
                        for column in [GEOGRAPHY_COLUMN, COUNT_COLUMN, POPULATION_COLUMN, RATE_COLUMN] {
                            feature = feature.with_property(column, Value::Null);
                        }
                    }
                }
                feature
            })
            .collect();

        FeatureCollection::new("water_distribution_per_capita", self.crs.clone(), features)
    }
}

fn optional_text(value: Option<&str>) -> Value {
    value.map(|s| Value::String(s.to_string())).unwrap_or(Value::Null)
}

/// Number of sites intersecting each ZCTA, keyed by `GEOIDFQ20`.
///
/// A site on a shared edge counts for every ZCTA it touches. Sites outside
/// all ZCTAs are not counted.
pub fn site_counts(zips: &FeatureCollection, sites: &FeatureCollection) -> Result<BTreeMap<String, u64>> {
    let mut counts = BTreeMap::new();
    let mut unmatched = 0usize;

    for row in spatial_join_right(zips, sites)? {
        match row.left.and_then(|zip| zip.property_str(ZIP_ID_COLUMN)) {
            Some(geoid) => *counts.entry(geoid).or_insert(0) += 1,
            None => unmatched += 1,
        }
    }

    if unmatched > 0 {
        tracing::debug!("{} of {} sites fall outside every ZCTA", unmatched, sites.len());
    }

    Ok(counts)
}

/// Outer merge of site counts and population rows
struct MergedRow {
    geography: Option<String>,
    count: u64,
    population: Option<f64>,
    attributes: BTreeMap<String, String>,
}

fn outer_merge(counts: &BTreeMap<String, u64>, population: &Table) -> Result<Vec<MergedRow>> {
    let geography_idx = population.column_index(GEOGRAPHY_COLUMN)?;
    let total_idx = population.column_index(POPULATION_COLUMN)?;

    let mut merged = Vec::with_capacity(population.len());
    let mut matched_keys = HashSet::new();

    for row in 0..population.len() {
        let geography = population.value(row, geography_idx).map(|s| s.to_string());
        let count = geography
            .as_deref()
            .and_then(|g| counts.get(g).copied())
            .unwrap_or(0);
        if let Some(g) = geography.as_deref() {
            if counts.contains_key(g) {
                matched_keys.insert(g.to_string());
            }
        }

        let attributes = population
            .columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| *idx != geography_idx && *idx != total_idx)
            .filter_map(|(idx, column)| population.value(row, idx).map(|v| (column.clone(), v.to_string())))
            .collect();

        merged.push(MergedRow {
            population: parse_population(population.value(row, total_idx), geography.as_deref()),
            geography,
            count,
            attributes,
        });
    }

    // Counted ZCTAs without a population row have no Geography value and
    // cannot match a geometry later on
    let orphans: Vec<(&String, &u64)> = counts
        .iter()
        .filter(|(key, _)| !matched_keys.contains(*key))
        .collect();
    if !orphans.is_empty() {
        tracing::debug!(
            "{} ZCTAs with sites have no row in {}: {:?}",
            orphans.len(),
            population.source_name,
            orphans.iter().map(|(key, _)| key.as_str()).collect::<Vec<_>>()
        );
    }
    merged.extend(orphans.into_iter().map(|(_, count)| MergedRow {
        geography: None,
        count: *count,
        population: None,
        attributes: BTreeMap::new(),
    }));

    Ok(merged)
}

fn parse_population(cell: Option<&str>, geography: Option<&str>) -> Option<f64> {
    let cell = cell?;
    match cell.trim().replace(',', "").parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                "Population '{}' for {} is not numeric; rate will be unknown",
                cell,
                geography.unwrap_or("<no geography>")
            );
            None
        }
    }
}

/// Build the per-capita table from already loaded and reprojected inputs.
///
/// `zips` must carry `ZCTA5CE20` and `GEOIDFQ20`; `population` must carry
/// `Geography` and ` !!Total`. Every ZCTA geometry yields one record per
/// population row whose `Geography` equals its `GEOIDFQ20`, or one record
/// without statistics.
pub fn per_capita_table(
    zips: &FeatureCollection,
    sites: &FeatureCollection,
    population: &Table,
) -> Result<PerCapitaTable> {
    let zips = zips.select(&[ZIP_LABEL_COLUMN, ZIP_ID_COLUMN])?;
    let counts = site_counts(&zips, sites)?;
    let merged = outer_merge(&counts, population)?;

    let mut by_geography: HashMap<&str, Vec<&MergedRow>> = HashMap::new();
    for row in &merged {
        if let Some(geography) = row.geography.as_deref() {
            by_geography.entry(geography).or_default().push(row);
        }
    }

    let mut rows = Vec::with_capacity(zips.len());
    for zip in zips.iter() {
        let zcta5ce20 = zip.property_str(ZIP_LABEL_COLUMN);
        let geoidfq20 = zip.property_str(ZIP_ID_COLUMN);

        let matches = geoidfq20
            .as_deref()
            .and_then(|id| by_geography.get(id))
            .map(|found| found.as_slice())
            .unwrap_or_default();

        if matches.is_empty() {
            rows.push(PerCapitaRecord {
                zcta5ce20,
                geoidfq20,
                geometry: zip.geometry.clone(),
                stats: None,
            });
            continue;
        }

        for merged_row in matches {
            let geography = merged_row.geography.clone().unwrap_or_default();
            rows.push(PerCapitaRecord {
                zcta5ce20: zcta5ce20.clone(),
                geoidfq20: geoidfq20.clone(),
                geometry: zip.geometry.clone(),
                stats: Some(PerCapitaStats {
                    geography,
                    count: merged_row.count,
                    population: merged_row.population,
                    per_10000_ppl: PerCapitaRate::compute(merged_row.count, merged_row.population),
                    attributes: merged_row.attributes.clone(),
                }),
            });
        }
    }

    tracing::debug!(
        "Per-capita table: {} records for {} ZCTAs, {} counted, {} population rows",
        rows.len(),
        zips.len(),
        counts.len(),
        population.len()
    );

    Ok(PerCapitaTable {
        crs: zips.crs.clone(),
        rows,
    })
}
