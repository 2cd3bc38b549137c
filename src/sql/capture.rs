//! Sentinel statement capture
//!
//! Alternative template strategy for execution layers that can only report
//! SQL after running it: the plan is executed with a sentinel id against a
//! backend that refuses any statement mentioning that id, the failed
//! statement is read back from the backend's log, and the identifier
//! restriction holding the sentinel is swapped for the placeholder form.

use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{debug, error};

use super::render::{identifier_set_sql, IdentifierSet, SqlRenderer};
use crate::error::CaptureError;
use crate::plan::QueryPlan;

/// Execution layer with a statement log
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Run a statement, returning the number of rows produced
    async fn execute(&self, sql: &str) -> anyhow::Result<usize>;

    /// Most recent statement text seen by `execute`
    fn last_statement(&self) -> Option<String>;
}

/// Backend that logs every statement and rejects those containing the sentinel
#[derive(Debug)]
pub struct RejectingBackend {
    sentinel: String,
    log: Mutex<Vec<String>>,
}

impl RejectingBackend {
    pub fn new(sentinel_id: i64) -> Self {
        Self {
            sentinel: sentinel_id.to_string(),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn statements(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CaptureBackend for RejectingBackend {
    async fn execute(&self, sql: &str) -> anyhow::Result<usize> {
        if let Ok(mut log) = self.log.lock() {
            log.push(sql.to_string());
        }
        if sql.contains(&self.sentinel) {
            return Err(anyhow!("refusing statement referencing sentinel id {}", self.sentinel));
        }
        Ok(0)
    }

    fn last_statement(&self) -> Option<String> {
        self.log.lock().ok().and_then(|log| log.last().cloned())
    }
}

pub struct SentinelCapture {
    sentinel_id: i64,
    placeholder: String,
}

impl SentinelCapture {
    pub fn new(sentinel_id: i64, placeholder: impl Into<String>) -> Self {
        Self {
            sentinel_id,
            placeholder: placeholder.into(),
        }
    }

    /// Capture the template for `plan` through `backend`.
    ///
    /// A backend that returns rows is an invariant violation and aborts.
    /// Only the rendered identifier restriction is rewritten; the sentinel
    /// digits inside user-supplied literals are left alone.
    pub async fn extract(
        &self,
        plan: &QueryPlan,
        backend: &dyn CaptureBackend,
    ) -> Result<String, CaptureError> {
        let sentinel = [self.sentinel_id];
        let statement = SqlRenderer::render(plan, IdentifierSet::Literal(&sentinel));

        match backend.execute(&statement).await {
            Ok(rows) => {
                error!(rows, "Sentinel query unexpectedly succeeded");
                Err(CaptureError::UnexpectedSuccess { rows })
            }
            Err(e) => {
                debug!(error = %e, "Sentinel query failed as expected");
                let captured = backend
                    .last_statement()
                    .ok_or(CaptureError::NoStatementRecorded)?;
                let fragment = identifier_set_sql(&self.sentinel_id.to_string());
                match captured.matches(&fragment).count() {
                    0 => Err(CaptureError::SentinelMissing { fragment }),
                    1 => Ok(captured.replacen(&fragment, &identifier_set_sql(&self.placeholder), 1)),
                    occurrences => {
                        error!(occurrences, "Sentinel fragment is not unique in captured statement");
                        Err(CaptureError::AmbiguousSentinel {
                            fragment,
                            occurrences,
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{Predicate, UserColumn};

    /// Execution layer that happily returns rows
    struct PermissiveBackend {
        last: Mutex<Option<String>>,
    }

    #[async_trait]
    impl CaptureBackend for PermissiveBackend {
        async fn execute(&self, sql: &str) -> anyhow::Result<usize> {
            *self.last.lock().unwrap() = Some(sql.to_string());
            Ok(3)
        }

        fn last_statement(&self) -> Option<String> {
            self.last.lock().unwrap().clone()
        }
    }

    /// Fails without logging anything
    struct SilentBackend;

    #[async_trait]
    impl CaptureBackend for SilentBackend {
        async fn execute(&self, _sql: &str) -> anyhow::Result<usize> {
            Err(anyhow!("connection refused"))
        }

        fn last_statement(&self) -> Option<String> {
            None
        }
    }

    /// Fails after logging a rewritten version of the statement
    struct RewritingBackend {
        rewrite: fn(&str) -> String,
        last: Mutex<Option<String>>,
    }

    impl RewritingBackend {
        fn new(rewrite: fn(&str) -> String) -> Self {
            Self {
                rewrite,
                last: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CaptureBackend for RewritingBackend {
        async fn execute(&self, sql: &str) -> anyhow::Result<usize> {
            *self.last.lock().unwrap() = Some((self.rewrite)(sql));
            Err(anyhow!("syntax error"))
        }

        fn last_statement(&self) -> Option<String> {
            self.last.lock().unwrap().clone()
        }
    }

    fn plan() -> QueryPlan {
        QueryPlan::baseline()
            .filter(Predicate::ColumnIn {
                column: UserColumn::Country,
                values: vec!["US".to_string()],
            })
            .distinct()
    }

    #[tokio::test]
    async fn test_capture_matches_direct_rendering() {
        let capture = SentinelCapture::new(-9999, "{{ user_ids }}");
        let backend = RejectingBackend::new(-9999);

        let captured = capture.extract(&plan(), &backend).await.unwrap();
        let rendered = SqlRenderer::render(&plan(), IdentifierSet::Placeholder("{{ user_ids }}"));

        assert_eq!(captured, rendered);
        assert!(!captured.contains("-9999"));
        assert_eq!(backend.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_sentinel_digits_in_values_are_kept() {
        let plan = QueryPlan::baseline().filter(Predicate::ColumnEquals {
            column: UserColumn::Zip,
            value: "20500-9999".to_string(),
        });
        let capture = SentinelCapture::new(-9999, "{{ user_ids }}");

        let captured = capture
            .extract(&plan, &RejectingBackend::new(-9999))
            .await
            .unwrap();

        assert!(captured.contains("'20500-9999'"));
        assert_eq!(captured.matches("{{ user_ids }}").count(), 1);
        assert_eq!(
            captured,
            SqlRenderer::render(&plan, IdentifierSet::Placeholder("{{ user_ids }}"))
        );
    }

    #[tokio::test]
    async fn test_repeated_fragment_is_rejected() {
        let capture = SentinelCapture::new(-9999, "{{ user_ids }}");
        let backend = RewritingBackend::new(|sql| format!("{} UNION {}", sql, sql));

        let err = capture.extract(&plan(), &backend).await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::AmbiguousSentinel { occurrences: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_fragment_is_rejected() {
        let capture = SentinelCapture::new(-9999, "{{ user_ids }}");
        let backend = RewritingBackend::new(|_| "SELECT 1".to_string());

        let err = capture.extract(&plan(), &backend).await.unwrap_err();
        assert!(matches!(err, CaptureError::SentinelMissing { .. }));
    }

    #[tokio::test]
    async fn test_unexpected_success_is_fatal() {
        let capture = SentinelCapture::new(-9999, "{{ user_ids }}");
        let backend = PermissiveBackend {
            last: Mutex::new(None),
        };

        let err = capture.extract(&plan(), &backend).await.unwrap_err();
        assert!(matches!(err, CaptureError::UnexpectedSuccess { rows: 3 }));
    }

    #[tokio::test]
    async fn test_failure_without_statement_log() {
        let capture = SentinelCapture::new(-9999, "{{ user_ids }}");
        let err = capture.extract(&plan(), &SilentBackend).await.unwrap_err();
        assert!(matches!(err, CaptureError::NoStatementRecorded));
    }
}
