//! Contact history lookup
//!
//! Contact records live outside the user store, so contact filters resolve
//! them to a concrete list of user ids at compile time.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Which contact records to look for. Both constraints are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactCriteria {
    /// Completed strictly after this instant
    pub since: Option<NaiveDateTime>,
    /// Completed by this staff identity
    pub contacted_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    /// User id of the contacted member
    pub akid: i64,
    pub completed_at: NaiveDateTime,
    pub contacted_by: String,
}

impl ContactRecord {
    fn matches(&self, criteria: &ContactCriteria) -> bool {
        criteria
            .since
            .map(|since| self.completed_at > since)
            .unwrap_or(true)
            && criteria
                .contacted_by
                .as_deref()
                .map(|who| self.contacted_by == who)
                .unwrap_or(true)
    }
}

#[async_trait]
pub trait ContactLog: Send + Sync {
    /// Distinct ids of users with a matching contact record, ascending
    async fn contacted_user_ids(&self, criteria: &ContactCriteria) -> anyhow::Result<Vec<i64>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryContactLog {
    records: Vec<ContactRecord>,
}

impl MemoryContactLog {
    pub fn new(records: Vec<ContactRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ContactLog for MemoryContactLog {
    async fn contacted_user_ids(&self, criteria: &ContactCriteria) -> anyhow::Result<Vec<i64>> {
        let ids: BTreeSet<i64> = self
            .records
            .iter()
            .filter(|r| r.matches(criteria))
            .map(|r| r.akid)
            .collect();
        Ok(ids.into_iter().collect())
    }
}

#[cfg(feature = "database")]
pub use pg::PgContactLog;

#[cfg(feature = "database")]
mod pg {
    use anyhow::Context;
    use async_trait::async_trait;
    use sqlx::PgPool;

    use super::{ContactCriteria, ContactLog};

    /// Reads the `contact_record` table
    pub struct PgContactLog {
        pool: PgPool,
    }

    impl PgContactLog {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl ContactLog for PgContactLog {
        async fn contacted_user_ids(
            &self,
            criteria: &ContactCriteria,
        ) -> anyhow::Result<Vec<i64>> {
            let mut query_builder =
                sqlx::QueryBuilder::new("SELECT DISTINCT akid FROM contact_record WHERE 1=1");

            if let Some(since) = criteria.since {
                query_builder.push(" AND completed_at > ");
                query_builder.push_bind(since);
            }

            if let Some(who) = &criteria.contacted_by {
                query_builder.push(" AND contacted_by = ");
                query_builder.push_bind(who);
            }

            query_builder.push(" ORDER BY akid");

            let ids = query_builder
                .build_query_scalar::<i64>()
                .fetch_all(&self.pool)
                .await
                .context("Failed to look up contact records")?;

            Ok(ids)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn log() -> MemoryContactLog {
        MemoryContactLog::new(vec![
            ContactRecord {
                akid: 2,
                completed_at: dt("2021-03-01 10:00:00"),
                contacted_by: "alice".to_string(),
            },
            ContactRecord {
                akid: 1,
                completed_at: dt("2021-05-01 10:00:00"),
                contacted_by: "bob".to_string(),
            },
            ContactRecord {
                akid: 2,
                completed_at: dt("2021-06-01 10:00:00"),
                contacted_by: "bob".to_string(),
            },
        ])
    }

    #[tokio::test]
    async fn test_since_is_strict() {
        let ids = log()
            .contacted_user_ids(&ContactCriteria {
                since: Some(dt("2021-05-01 10:00:00")),
                contacted_by: None,
            })
            .await
            .unwrap();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn test_by_identity_distinct_sorted() {
        let ids = log()
            .contacted_user_ids(&ContactCriteria {
                since: None,
                contacted_by: Some("bob".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_no_matches_is_empty() {
        let ids = log()
            .contacted_user_ids(&ContactCriteria {
                since: Some(dt("2030-01-01 00:00:00")),
                contacted_by: Some("alice".to_string()),
            })
            .await
            .unwrap();
        assert!(ids.is_empty());
    }
}
