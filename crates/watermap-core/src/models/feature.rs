//! Features and feature collections.
//!
//! A `FeatureCollection` is the unit every reader produces and every
//! geometry operation consumes: features sharing one CRS.

use geo::{BoundingRect, Coord, Geometry, Rect};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Result, WatermapError};
use crate::models::crs::Crs;

pub type FeatureId = String;

/// A single vector feature with attribute properties
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,

    /// Geometry, None for features stored with a null shape
    pub geometry: Option<Geometry<f64>>,

    pub properties: HashMap<String, Value>,
}

impl Feature {
    pub fn new(id: impl Into<FeatureId>, geometry: Option<Geometry<f64>>) -> Self {
        Self {
            id: id.into(),
            geometry,
            properties: HashMap::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Property rendered as text. Null and missing properties yield None.
    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Features sharing a single coordinate reference system
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    /// Layer or dataset name
    pub name: String,
    pub crs: Crs,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(name: impl Into<String>, crs: Crs, features: Vec<Feature>) -> Self {
        Self {
            name: name.into(),
            crs,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.features.iter().filter_map(|f| f.geometry.as_ref())
    }

    /// Total extent of all geometries, None when nothing has an extent
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.geometries()
            .filter_map(|g| g.bounding_rect())
            .reduce(|acc, rect| {
                Rect::new(
                    Coord {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    Coord {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                )
            })
    }

    /// Project onto a subset of properties. Geometry and id are always kept.
    ///
    /// Fails with `MissingColumn` if no feature carries one of the requested columns.
    pub fn select(&self, columns: &[&str]) -> Result<FeatureCollection> {
        for column in columns {
            let present = self.features.iter().any(|f| f.properties.contains_key(*column));
            if !present && !self.features.is_empty() {
                return Err(WatermapError::MissingColumn {
                    column: column.to_string(),
                    source_name: self.name.clone(),
                });
            }
        }

        let features = self
            .features
            .iter()
            .map(|f| Feature {
                id: f.id.clone(),
                geometry: f.geometry.clone(),
                properties: columns
                    .iter()
                    .filter_map(|c| f.properties.get(*c).map(|v| (c.to_string(), v.clone())))
                    .collect(),
            })
            .collect();

        Ok(FeatureCollection::new(self.name.clone(), self.crs.clone(), features))
    }

    /// Convert into a GeoJSON FeatureCollection carrying a named `crs` member
    pub fn to_geojson(&self) -> geojson::FeatureCollection {
        let features = self
            .features
            .iter()
            .map(|f| geojson::Feature {
                bbox: None,
                geometry: f
                    .geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: Some(geojson::feature::Id::String(f.id.clone())),
                properties: Some(f.properties.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
                foreign_members: None,
            })
            .collect();

        let mut foreign_members = serde_json::Map::new();
        foreign_members.insert("name".to_string(), Value::String(self.name.clone()));
        foreign_members.insert(
            "crs".to_string(),
            serde_json::json!({
                "type": "name",
                "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", self.crs.epsg) }
            }),
        );

        geojson::FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        }
    }
}
