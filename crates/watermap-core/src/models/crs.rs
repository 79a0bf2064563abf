//! Coordinate reference systems identified by EPSG code.
//!
//! Definitions come from the EPSG registry bundled with `crs-definitions`, so a
//! CRS can be classified as projected or geographic without touching PROJ.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Result, WatermapError};

/// Broad classification of a coordinate reference system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrsKind {
    /// Planar coordinates in linear units (meters, US survey feet, ...)
    Projected,
    /// Angular coordinates (longitude/latitude in degrees)
    Geographic,
    /// Earth-centered cartesian coordinates
    Geocentric,
}

impl CrsKind {
    /// Classify a PROJ.4 definition string
    pub fn from_proj4(definition: &str) -> Self {
        let proj = definition
            .split_whitespace()
            .find_map(|token| token.strip_prefix("+proj="))
            .unwrap_or_default();

        match proj {
            "longlat" | "latlong" | "lonlat" | "latlon" => CrsKind::Geographic,
            "geocent" | "cart" => CrsKind::Geocentric,
            _ => CrsKind::Projected,
        }
    }
}

/// Coordinate Reference System identified by EPSG code
///
/// Two values are equal when they carry the same EPSG code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Crs {
    pub epsg: u32,
    pub name: String,
    pub kind: CrsKind,
}

impl Crs {
    /// Resolve an EPSG code against the registry
    pub fn from_epsg(code: u32) -> Result<Self> {
        let def = u16::try_from(code)
            .ok()
            .and_then(crs_definitions::from_code)
            .ok_or(WatermapError::UnknownCrs { code })?;

        let name = wkt_name(def.wkt).unwrap_or_else(|| format!("EPSG:{}", code));

        Ok(Self {
            epsg: code,
            name,
            kind: CrsKind::from_proj4(def.proj4),
        })
    }

    /// WGS 84 (EPSG:4326)
    pub fn wgs84() -> Self {
        Self {
            epsg: 4326,
            name: "WGS 84".to_string(),
            kind: CrsKind::Geographic,
        }
    }

    pub fn is_projected(&self) -> bool {
        self.kind == CrsKind::Projected
    }

    pub fn is_geographic(&self) -> bool {
        self.kind == CrsKind::Geographic
    }

    /// Authority string understood by PROJ, e.g. `EPSG:6509`
    pub fn authority(&self) -> String {
        format!("EPSG:{}", self.epsg)
    }
}

impl PartialEq for Crs {
    fn eq(&self, other: &Self) -> bool {
        self.epsg == other.epsg
    }
}

impl Eq for Crs {}

impl Hash for Crs {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.epsg.hash(state);
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name == self.authority() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "EPSG:{} ({})", self.epsg, self.name)
        }
    }
}

/// First quoted string of a WKT definition, which is the CRS name.
///
/// The bundled registry writes `"unnamed"` for many newer codes.
fn wkt_name(wkt: &str) -> Option<String> {
    let start = wkt.find('"')? + 1;
    let end = wkt[start..].find('"')?;
    let name = &wkt[start..start + end];
    (!name.is_empty() && !name.eq_ignore_ascii_case("unnamed")).then(|| name.to_string())
}

/// Extract the EPSG code of the outermost CRS from a WKT1 or WKT2 string.
///
/// Nested datums and ellipsoids carry their own authority codes, the CRS code
/// is the last one in the string.
pub fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    let compact: String = wkt.chars().filter(|c| !c.is_whitespace()).collect();

    // WKT1: AUTHORITY["EPSG","6509"]
    let wkt1 = compact.rfind("AUTHORITY[\"EPSG\",").and_then(|start| {
        leading_code(&compact[start + "AUTHORITY[\"EPSG\",".len()..])
            .map(|code| (start, code))
    });

    // WKT2: ID["EPSG",6509]
    let wkt2 = compact.rfind("ID[\"EPSG\",").and_then(|start| {
        leading_code(&compact[start + "ID[\"EPSG\",".len()..]).map(|code| (start, code))
    });

    match (wkt1, wkt2) {
        (Some((a, code_a)), Some((b, code_b))) => Some(if a > b { code_a } else { code_b }),
        (Some((_, code)), None) | (None, Some((_, code))) => Some(code),
        (None, None) => compact
            .find("EPSG:")
            .and_then(|start| leading_code(&compact[start + "EPSG:".len()..])),
    }
}

/// Map well-known ESRI CRS names (as written in `.prj` files) to EPSG codes
pub fn esri_name_to_epsg(wkt: &str) -> Option<u32> {
    const KNOWN: &[(&str, u32)] = &[
        ("GCS_North_American_1983", 4269),
        ("GCS_WGS_1984", 4326),
        ("WGS_1984_Web_Mercator_Auxiliary_Sphere", 3857),
        ("GCS_NAD_1983_2011", 6318),
        ("NAD_1983_2011_StatePlane_Mississippi_East_FIPS_2301", 6506),
        ("NAD_1983_2011_StatePlane_Mississippi_East_FIPS_2301_Ft_US", 6507),
        ("NAD_1983_2011_Mississippi_TM", 6508),
        ("NAD_1983_2011_StatePlane_Mississippi_West_FIPS_2302", 6509),
        ("NAD_1983_2011_StatePlane_Mississippi_West_FIPS_2302_Ft_US", 6510),
        ("NAD_1983_StatePlane_Mississippi_East_FIPS_2301_Feet", 2254),
        ("NAD_1983_StatePlane_Mississippi_West_FIPS_2302_Feet", 2255),
    ];

    let name = wkt_name(wkt)?;
    KNOWN.iter().find(|(known, _)| *known == name).map(|(_, code)| *code)
}

fn leading_code(s: &str) -> Option<u32> {
    let digits: String = s
        .trim_start_matches('"')
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}
