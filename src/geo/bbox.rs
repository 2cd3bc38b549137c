//! Rectangular bounding box around a point

use serde::{Deserialize, Serialize};

/// Fixed approximation used for both latitude and (scaled) longitude
pub const APPROX_MILES_PER_DEGREE: f64 = 69.0;

/// Latitude / longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Box extending `miles` in each direction from `center`.
    ///
    /// Longitude spread is widened by `1 / |cos(lat)|`, so the box degenerates
    /// at the poles. Callers validate that `miles` is positive.
    pub fn around(center: LatLon, miles: f64) -> Self {
        let lon_delta = miles / (center.lat.to_radians().cos() * APPROX_MILES_PER_DEGREE).abs();
        let lat_delta = miles / APPROX_MILES_PER_DEGREE;
        Self {
            lat_min: center.lat - lat_delta,
            lat_max: center.lat + lat_delta,
            lon_min: center.lon - lon_delta,
            lon_max: center.lon + lon_delta,
        }
    }

    /// Inclusive on all four edges, like SQL `BETWEEN`
    pub fn contains(&self, point: LatLon) -> bool {
        point.lat >= self.lat_min
            && point.lat <= self.lat_max
            && point.lon >= self.lon_min
            && point.lon <= self.lon_max
    }

    /// True when the box cannot be expressed as a longitude range: a bound is
    /// not finite, or the longitude span covers the whole globe. Near the
    /// poles the `1 / |cos(lat)|` widening drives the span past 360 degrees.
    pub fn is_degenerate(&self) -> bool {
        let finite = self.lat_min.is_finite()
            && self.lat_max.is_finite()
            && self.lon_min.is_finite()
            && self.lon_max.is_finite();
        !finite || self.lon_max - self.lon_min >= 360.0
    }
}
