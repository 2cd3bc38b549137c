//! ActionKit REST reporting client
//!
//! Creates query reports and queues background runs. Both endpoints answer
//! `201 Created` with the new resource in the `Location` header.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::LOCATION, Client, Response};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::{JobHandle, ReportHandle, ReportService};
use crate::config::ActionKitConfig;

const QUERY_REPORT_PATH: &str = "/rest/v1/queryreport/";
const BACKGROUND_PATH: &str = "/rest/v1/report/background/";

#[derive(Debug, Serialize)]
struct NewQueryReport<'a> {
    name: &'a str,
    short_name: &'a str,
    description: &'a str,
    sql: &'a str,
}

pub struct ActionKitReportService {
    http: Client,
    base_url: String,
    username: String,
    password: String,
}

impl ActionKitReportService {
    pub fn new(config: &ActionKitConfig, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to POST {}", path))?;

        created_location(response, path).await
    }
}

/// The `Location` of a successful create, or the error body
async fn created_location(response: Response, path: &str) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!(
            "ActionKit API error {} for {}: {}",
            status,
            path,
            body.chars().take(200).collect::<String>()
        ));
    }

    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("ActionKit response for {} has no Location header", path))
}

/// Trailing path segment of a resource URI, e.g. `.../queryreport/42/` -> `42`
fn resource_id(location: &str) -> Option<&str> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Background run body: output format and recipient, plus any extra payload fields
fn background_body(notify_address: &str, payload: Option<&Value>) -> Value {
    let mut body = json!({
        "format": "csv",
        "email_to": notify_address,
    });
    if let (Some(Value::Object(extra)), Value::Object(target)) = (payload, &mut body) {
        for (key, value) in extra {
            target.insert(key.clone(), value.clone());
        }
    }
    body
}

#[async_trait]
impl ReportService for ActionKitReportService {
    async fn create_report(
        &self,
        sql: &str,
        description: &str,
        identifier: &str,
    ) -> Result<ReportHandle> {
        let location = self
            .post(
                QUERY_REPORT_PATH,
                &NewQueryReport {
                    name: identifier,
                    short_name: identifier,
                    description,
                    sql,
                },
            )
            .await?;

        let id = resource_id(&location)
            .and_then(|id| id.parse::<i64>().ok())
            .ok_or_else(|| anyhow!("Unexpected report location '{}'", location))?;

        info!(report_id = id, short_name = identifier, "Created query report");

        Ok(ReportHandle {
            id,
            short_name: identifier.to_string(),
        })
    }

    async fn run_report(
        &self,
        report: &ReportHandle,
        notify_address: &str,
        payload: Option<&Value>,
    ) -> Result<JobHandle> {
        let path = format!("{}{}/", BACKGROUND_PATH, report.short_name);
        let location = self
            .post(&path, &background_body(notify_address, payload))
            .await?;

        let task_id = resource_id(&location)
            .ok_or_else(|| anyhow!("Unexpected background task location '{}'", location))?
            .to_string();

        info!(short_name = %report.short_name, task_id = %task_id, "Queued background report");

        Ok(JobHandle { task_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id() {
        assert_eq!(
            resource_id("https://act.example.org/rest/v1/queryreport/42/"),
            Some("42")
        );
        assert_eq!(resource_id("/rest/v1/backgroundtask/abc-123"), Some("abc-123"));
        assert_eq!(resource_id("/"), None);
    }

    #[test]
    fn test_background_body_merges_payload() {
        let payload = json!({"user_ids": [1, 2], "format": "tsv"});
        let body = background_body("ops@example.org", Some(&payload));
        assert_eq!(body["email_to"], "ops@example.org");
        assert_eq!(body["format"], "tsv");
        assert_eq!(body["user_ids"], json!([1, 2]));

        let plain = background_body("ops@example.org", None);
        assert_eq!(plain, json!({"format": "csv", "email_to": "ops@example.org"}));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let config = ActionKitConfig {
            base_url: "https://act.example.org/".to_string(),
            username: "api".to_string(),
            password: "secret".to_string(),
        };
        let service = ActionKitReportService::new(&config, Duration::from_secs(5)).unwrap();
        assert_eq!(service.base_url, "https://act.example.org");
    }
}
