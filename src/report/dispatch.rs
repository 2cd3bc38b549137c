use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use super::ReportService;
use crate::compiler::CompiledQuery;
use crate::error::{Result, SearchError};

/// Identifiers of a dispatched report run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchReceipt {
    pub report_id: i64,
    pub short_name: String,
    pub task_id: String,
}

/// Report identifier: hex SHA-256 of the template and the dispatch time
pub fn report_slug(sql_template: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sql_template.as_bytes());
    hasher.update(at.to_rfc3339_opts(SecondsFormat::Micros, true).as_bytes());
    hex::encode(hasher.finalize())
}

/// Hands compiled queries to the reporting service
pub struct ReportDispatcher {
    service: Arc<dyn ReportService>,
}

impl ReportDispatcher {
    pub fn new(service: Arc<dyn ReportService>) -> Self {
        Self { service }
    }

    /// Create a report for `compiled` and queue a run of it
    pub async fn dispatch(
        &self,
        compiled: &CompiledQuery,
        notify_address: &str,
        payload: Option<&serde_json::Value>,
    ) -> Result<DispatchReceipt> {
        self.dispatch_at(compiled, notify_address, payload, Utc::now())
            .await
    }

    pub async fn dispatch_at(
        &self,
        compiled: &CompiledQuery,
        notify_address: &str,
        payload: Option<&serde_json::Value>,
        at: DateTime<Utc>,
    ) -> Result<DispatchReceipt> {
        let slug = report_slug(&compiled.sql_template, at);

        let report = self
            .service
            .create_report(&compiled.sql_template, &compiled.human_query, &slug)
            .await
            .map_err(SearchError::Report)?;

        let job = self
            .service
            .run_report(&report, notify_address, payload)
            .await
            .map_err(SearchError::Report)?;

        info!(
            report_id = report.id,
            short_name = %report.short_name,
            task_id = %job.task_id,
            "Dispatched user search report"
        );

        Ok(DispatchReceipt {
            report_id: report.id,
            short_name: report.short_name,
            task_id: job.task_id,
        })
    }
}
