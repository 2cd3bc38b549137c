//! Google Geocoding API provider

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Geocoder, LatLon};
use crate::error::GeocodeError;

const GOOGLE_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const PROVIDER: &str = "google";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Debug, Deserialize)]
struct Location {
    lat: Option<f64>,
    lng: Option<f64>,
}

pub struct GoogleGeocoder {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleGeocoder {
    pub fn new(api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(GOOGLE_GEOCODE_URL.to_string(), api_key, timeout)
    }

    pub fn with_base_url(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    async fn fetch(&self, postal_code: &str) -> anyhow::Result<String> {
        let mut query = vec![("address", postal_code.to_string())];
        if let Some(key) = &self.api_key {
            query.push(("key", key.clone()));
        }

        self.http
            .get(&self.base_url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to geocode {}", postal_code))?
            .text()
            .await
            .context("Failed to read geocode response body")
    }
}

/// Extract the first result's coordinates from a Google geocode body
fn parse_body(postal_code: &str, body: &str) -> Result<LatLon, GeocodeError> {
    let response: GeocodeResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

    if response.status != "OK" {
        return Err(GeocodeError::Malformed {
            provider: PROVIDER,
            message: format!("status {}", response.status),
        });
    }

    response
        .results
        .first()
        .and_then(|r| match (r.geometry.location.lat, r.geometry.location.lng) {
            (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)),
            _ => None,
        })
        .ok_or_else(|| GeocodeError::NoResult {
            provider: PROVIDER,
            postal_code: postal_code.to_string(),
        })
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn resolve(&self, postal_code: &str) -> Result<LatLon, GeocodeError> {
        let body = self
            .fetch(postal_code)
            .await
            .map_err(|source| GeocodeError::Transport {
                provider: PROVIDER,
                source,
            })?;
        let location = parse_body(postal_code, &body)?;
        debug!(provider = PROVIDER, postal_code, lat = location.lat, lon = location.lon, "Resolved postal code");
        Ok(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok_body() {
        let body = r#"{
            "status": "OK",
            "results": [{"geometry": {"location": {"lat": 40.75, "lng": -73.99}}}]
        }"#;
        let location = parse_body("10001", body).unwrap();
        assert_eq!(location, LatLon::new(40.75, -73.99));
    }

    #[test]
    fn test_parse_zero_results_status() {
        let body = r#"{"status": "ZERO_RESULTS", "results": []}"#;
        assert!(matches!(
            parse_body("00000", body),
            Err(GeocodeError::Malformed { .. })
        ));
    }

    #[test]
    fn test_parse_missing_coordinates() {
        let body = r#"{"status": "OK", "results": [{"geometry": {"location": {"lat": 40.75}}}]}"#;
        assert!(matches!(
            parse_body("10001", body),
            Err(GeocodeError::NoResult { .. })
        ));
    }

    #[test]
    fn test_parse_not_json() {
        assert!(matches!(
            parse_body("10001", "<html>"),
            Err(GeocodeError::Malformed { .. })
        ));
    }
}
