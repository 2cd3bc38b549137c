//! GeoNames postal code search provider

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{Geocoder, LatLon};
use crate::error::GeocodeError;

const GEONAMES_URL: &str = "http://api.geonames.org/postalCodeSearchJSON";
const PROVIDER: &str = "geonames";

#[derive(Debug, Deserialize)]
struct PostalCodeResponse {
    #[serde(rename = "postalCodes", default)]
    postal_codes: Vec<PostalCode>,
}

#[derive(Debug, Deserialize)]
struct PostalCode {
    lat: Option<f64>,
    lng: Option<f64>,
}

pub struct GeoNamesGeocoder {
    http: Client,
    base_url: String,
    username: String,
}

impl GeoNamesGeocoder {
    pub fn new(username: String, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(GEONAMES_URL.to_string(), username, timeout)
    }

    pub fn with_base_url(base_url: String, username: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url,
            username,
        })
    }

    async fn fetch(&self, postal_code: &str) -> anyhow::Result<String> {
        self.http
            .get(&self.base_url)
            .query(&[
                ("postalcode", postal_code),
                ("maxRows", "1"),
                ("username", self.username.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to search postal code {}", postal_code))?
            .text()
            .await
            .context("Failed to read postal code response body")
    }
}

fn parse_body(postal_code: &str, body: &str) -> Result<LatLon, GeocodeError> {
    let response: PostalCodeResponse =
        serde_json::from_str(body).map_err(|e| GeocodeError::Malformed {
            provider: PROVIDER,
            message: e.to_string(),
        })?;

    response
        .postal_codes
        .first()
        .and_then(|p| match (p.lat, p.lng) {
            (Some(lat), Some(lon)) => Some(LatLon::new(lat, lon)),
            _ => None,
        })
        .ok_or_else(|| GeocodeError::NoResult {
            provider: PROVIDER,
            postal_code: postal_code.to_string(),
        })
}

#[async_trait]
impl Geocoder for GeoNamesGeocoder {
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
        debug!(provider = PROVIDER, postal_code, "Resolved postal code");
        Ok(location)
    }
}
