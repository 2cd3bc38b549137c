//! Primary provider with a single fallback attempt

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::{Geocoder, LatLon};
use crate::error::GeocodeError;

/// Tries `primary`, then `secondary`. The secondary's error is the one reported.
pub struct FallbackGeocoder {
    primary: Arc<dyn Geocoder>,
    secondary: Arc<dyn Geocoder>,
}

impl FallbackGeocoder {
    pub fn new(primary: Arc<dyn Geocoder>, secondary: Arc<dyn Geocoder>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl Geocoder for FallbackGeocoder {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn resolve(&self, postal_code: &str) -> Result<LatLon, GeocodeError> {
        match self.primary.resolve(postal_code).await {
            Ok(location) => Ok(location),
            Err(e) => {
                warn!(
                    provider = self.primary.name(),
                    fallback = self.secondary.name(),
                    postal_code,
                    error = %e,
                    "Primary geocoder failed, trying fallback"
                );
                self.secondary.resolve(postal_code).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::StaticGeocoder;

    #[tokio::test]
    async fn test_primary_wins() {
        let geocoder = FallbackGeocoder::new(
            Arc::new(StaticGeocoder::new().with("10001", LatLon::new(1.0, 1.0))),
            Arc::new(StaticGeocoder::new().with("10001", LatLon::new(2.0, 2.0))),
        );
        assert_eq!(geocoder.resolve("10001").await.unwrap(), LatLon::new(1.0, 1.0));
    }

    #[tokio::test]
    async fn test_falls_back_once() {
        let geocoder = FallbackGeocoder::new(
            Arc::new(StaticGeocoder::new()),
            Arc::new(StaticGeocoder::new().with("10001", LatLon::new(2.0, 2.0))),
        );
        assert_eq!(geocoder.resolve("10001").await.unwrap(), LatLon::new(2.0, 2.0));
    }

    #[tokio::test]
    async fn test_both_fail() {
        let geocoder = FallbackGeocoder::new(
            Arc::new(StaticGeocoder::new()),
            Arc::new(StaticGeocoder::new()),
        );
        assert!(geocoder.resolve("10001").await.is_err());
    }
}
