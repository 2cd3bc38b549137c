//! Report dispatch boundary
//!
//! The compiled template and its description are handed to an external
//! batch-reporting service, which substitutes the real identifier set and
//! runs the report asynchronously. The compiler's work ends at the handoff.

pub mod actionkit;
pub mod dispatch;

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use actionkit::ActionKitReportService;
pub use dispatch::{report_slug, DispatchReceipt, ReportDispatcher};

/// A report definition created on the reporting service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHandle {
    pub id: i64,
    pub short_name: String,
}

/// A queued asynchronous run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub task_id: String,
}

#[async_trait]
pub trait ReportService: Send + Sync {
    /// Register `sql` as a report named by `identifier`
    async fn create_report(
        &self,
        sql: &str,
        description: &str,
        identifier: &str,
    ) -> anyhow::Result<ReportHandle>;

    /// Queue a run of `report`, mailing the result to `notify_address`
    async fn run_report(
        &self,
        report: &ReportHandle,
        notify_address: &str,
        payload: Option<&serde_json::Value>,
    ) -> anyhow::Result<JobHandle>;
}

/// Request seen by `RecordingReportService`
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Create {
        sql: String,
        description: String,
        identifier: String,
    },
    Run {
        short_name: String,
        notify_address: String,
        payload: Option<serde_json::Value>,
    },
}

/// In-memory service that records calls and hands out sequential handles
#[derive(Debug, Default)]
pub struct RecordingReportService {
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingReportService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: RecordedCall) -> usize {
        match self.calls.lock() {
            Ok(mut calls) => {
                calls.push(call);
                calls.len()
            }
            Err(_) => 0,
        }
    }
}

#[async_trait]
impl ReportService for RecordingReportService {
    async fn create_report(
        &self,
        sql: &str,
        description: &str,
        identifier: &str,
    ) -> anyhow::Result<ReportHandle> {
        let n = self.record(RecordedCall::Create {
            sql: sql.to_string(),
            description: description.to_string(),
            identifier: identifier.to_string(),
        });
        Ok(ReportHandle {
            id: n as i64,
            short_name: identifier.to_string(),
        })
    }

    async fn run_report(
        &self,
        report: &ReportHandle,
        notify_address: &str,
        payload: Option<&serde_json::Value>,
    ) -> anyhow::Result<JobHandle> {
        let n = self.record(RecordedCall::Run {
            short_name: report.short_name.clone(),
            notify_address: notify_address.to_string(),
            payload: payload.cloned(),
        });
        Ok(JobHandle {
            task_id: format!("task-{}", n),
        })
    }
}
