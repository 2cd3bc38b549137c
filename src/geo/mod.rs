//! Postal code geolocation
//!
//! This module provides:
//! - `Geocoder`, the call contract every provider implements
//! - Google and GeoNames HTTP providers
//! - `FallbackGeocoder`, which tries providers in fixed order
//! - Bounding box math for radius searches

pub mod bbox;
pub mod fallback;
pub mod geonames;
pub mod google;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::GeocodeError;

pub use bbox::{BoundingBox, LatLon, APPROX_MILES_PER_DEGREE};
pub use fallback::FallbackGeocoder;
pub use geonames::GeoNamesGeocoder;
pub use google::GoogleGeocoder;

/// Resolves a postal code to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Short provider name for logs and errors
    fn name(&self) -> &'static str;

    async fn resolve(&self, postal_code: &str) -> Result<LatLon, GeocodeError>;
}

/// Fixed lookup table, for tests and offline use
#[derive(Debug, Default, Clone)]
pub struct StaticGeocoder {
    locations: HashMap<String, LatLon>,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, postal_code: &str, location: LatLon) -> Self {
        self.locations.insert(postal_code.to_string(), location);
        self
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn resolve(&self, postal_code: &str) -> Result<LatLon, GeocodeError> {
        self.locations
            .get(postal_code)
            .copied()
            .ok_or_else(|| GeocodeError::NoResult {
                provider: self.name(),
                postal_code: postal_code.to_string(),
            })
    }
}
