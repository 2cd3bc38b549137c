//! Configuration
//!
//! `CompilerConfig` holds the knobs of the compilation itself and loads from
//! YAML. `SearchConfig` gathers collaborator settings from the environment
//! (a `.env` file is honoured when present).

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::geo::{FallbackGeocoder, GeoNamesGeocoder, Geocoder, GoogleGeocoder};

/// Settings that shape the compiled template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// `subscription_status` value required unless the request bypasses it
    pub subscribed_status: String,
    /// Token standing in for the runtime identifier set
    pub placeholder: String,
    /// Identifier known not to exist, used by sentinel capture
    pub sentinel_id: i64,
    /// Project phone, name and profile fields besides the id
    pub report_columns: bool,
    pub http_timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            subscribed_status: "subscribed".to_string(),
            placeholder: "{{ user_ids }}".to_string(),
            sentinel_id: -9999,
            report_columns: true,
            http_timeout_secs: 30,
        }
    }
}

impl CompilerConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read compiler config {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: CompilerConfig =
            serde_yaml::from_str(content).context("Failed to parse compiler config")?;
        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Credentials for the ActionKit REST API
#[derive(Debug, Clone)]
pub struct ActionKitConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

/// Collaborator settings read from the environment
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    pub google_api_key: Option<String>,
    pub geonames_username: Option<String>,
    pub actionkit: Option<ActionKitConfig>,
    pub compiler: CompilerConfig,
}

impl SearchConfig {
    /// Read `.env` (if present) and the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let compiler = match env_var("USERSEARCH_COMPILER_CONFIG") {
            Some(path) => {
                info!(path = %path, "Loading compiler config");
                CompilerConfig::from_file(&path)?
            }
            None => CompilerConfig::default(),
        };

        let actionkit = match (
            env_var("ACTIONKIT_BASE_URL"),
            env_var("ACTIONKIT_USERNAME"),
            env_var("ACTIONKIT_PASSWORD"),
        ) {
            (Some(base_url), Some(username), Some(password)) => Some(ActionKitConfig {
                base_url,
                username,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            google_api_key: env_var("GOOGLE_GEOCODE_API_KEY"),
            geonames_username: env_var("GEONAMES_API_USERNAME"),
            actionkit,
            compiler,
        })
    }

    /// Google first, then GeoNames when a username is configured
    pub fn geocoder(&self) -> anyhow::Result<Arc<dyn Geocoder>> {
        let timeout = self.compiler.http_timeout();
        let google: Arc<dyn Geocoder> =
            Arc::new(GoogleGeocoder::new(self.google_api_key.clone(), timeout)?);

        match &self.geonames_username {
            Some(username) => {
                let geonames: Arc<dyn Geocoder> =
                    Arc::new(GeoNamesGeocoder::new(username.clone(), timeout)?);
                Ok(Arc::new(FallbackGeocoder::new(google, geonames)))
            }
            None => {
                warn!("GEONAMES_API_USERNAME not set, geocoding has no fallback provider");
                Ok(google)
            }
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.placeholder, "{{ user_ids }}");
        assert_eq!(config.sentinel_id, -9999);
        assert!(config.report_columns);
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
placeholder: "__IDS__"
report_columns: false
"#;
        let config = CompilerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.placeholder, "__IDS__");
        assert!(!config.report_columns);
        assert_eq!(config.subscribed_status, "subscribed");
        assert_eq!(config.sentinel_id, -9999);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(CompilerConfig::from_yaml("sentinel_id: [1, 2]").is_err());
    }

    #[test]
    fn test_geocoder_without_fallback() {
        let config = SearchConfig::default();
        let geocoder = config.geocoder().unwrap();
        assert_eq!(geocoder.name(), "google");
    }

    #[test]
    fn test_geocoder_with_fallback() {
        let config = SearchConfig {
            geonames_username: Some("demo".to_string()),
            ..SearchConfig::default()
        };
        assert_eq!(config.geocoder().unwrap().name(), "fallback");
    }
}
