use serde::{Deserialize, Serialize};

use crate::features::FeatureRow;
use crate::hex::HexCoord;

/// Spatial id of a hexagonal cell, unique within its city.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(String);

impl CellId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CellId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Haversine great-circle distance between two points in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();
    EARTH_RADIUS_M * c
}

/// One hexagonal cell of a city tessellation: geometry, raw features, and
/// the smoothed features derived from its neighborhood.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub id: CellId,
    /// City slug (e.g. "madrid"). Ids are only unique within a city.
    pub city: String,
    pub centroid: GeoPoint,
    /// Boundary ring of the hexagon. May be empty when geometry was not
    /// materialized upstream; nothing in the pipeline requires it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub boundary: Vec<GeoPoint>,
    /// Axial grid coordinate. None means no adjacency data — the cell still
    /// smooths, using only itself (ring 0).
    #[serde(default)]
    pub grid: Option<HexCoord>,
    /// Optional upstream zone classification (e.g. a structurally declining
    /// area label). Absent for cities without that signal.
    #[serde(default)]
    pub area_class: Option<String>,
    pub raw: FeatureRow,
    #[serde(default)]
    pub smoothed: FeatureRow,
}

/// A known successful site: the ground truth the profile is learned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLocation {
    pub city: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

impl ReferenceLocation {
    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lon,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_madrid_to_valencia() {
        // Madrid to Valencia is ~302km
        let madrid = GeoPoint {
            lat: 40.4168,
            lng: -3.7038,
        };
        let valencia = GeoPoint {
            lat: 39.4699,
            lng: -0.3763,
        };
        let dist = haversine_m(madrid, valencia);
        assert!(
            (dist - 302_000.0).abs() < 5_000.0,
            "Madrid to Valencia should be ~302km, got {dist}m"
        );
    }

    #[test]
    fn haversine_same_point_is_zero() {
        let p = GeoPoint {
            lat: 40.4287,
            lng: -3.7020,
        };
        assert!(haversine_m(p, p) < 0.001);
    }

    #[test]
    fn haversine_short_range() {
        // ~0.01348 degrees of latitude is ~1500m
        let a = GeoPoint {
            lat: 40.4287,
            lng: -3.7020,
        };
        let b = GeoPoint {
            lat: 40.4287 + 0.013477,
            lng: -3.7020,
        };
        let dist = haversine_m(a, b);
        assert!(
            (dist - 1_500.0).abs() < 5.0,
            "expected ~1500m, got {dist}m"
        );
    }
}
