//! User rows and plan execution
//!
//! `MemoryUserStore` evaluates a `QueryPlan` against in-memory rows and is
//! what the tests observe result sets through. `PgUserStore` runs the
//! rendered statement against Postgres for a concrete identifier set.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geo::LatLon;
use crate::plan::{Aggregate, LikeTarget, Predicate, QueryPlan, Relation, Threshold, UserColumn};

/// Order status counted by donation filters
pub const COMPLETED: &str = "completed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserField {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: i64,
    pub page_id: i64,
    /// Tags of the page the action was taken on
    pub page_tag_ids: Vec<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRecord {
    pub id: i64,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub total: Decimal,
    pub status: String,
    pub created_at: NaiveDateTime,
}

/// A user row with the related rows filters can reach
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub country: String,
    pub region: String,
    pub state: String,
    pub city: String,
    pub zip: String,
    pub source: String,
    pub lang_id: Option<i64>,
    pub subscription_status: String,
    pub created_at: NaiveDateTime,
    pub location: Option<LatLon>,
    pub phones: Vec<String>,
    pub fields: Vec<UserField>,
    pub actions: Vec<ActionRecord>,
    pub opens: Vec<OpenRecord>,
    pub orders: Vec<OrderRecord>,
}

impl UserRecord {
    pub fn new(id: i64, first_name: &str, last_name: &str, email: &str) -> Self {
        Self {
            id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            subscription_status: "subscribed".to_string(),
            ..Self::default()
        }
    }

    fn column(&self, column: UserColumn) -> String {
        match column {
            UserColumn::Country => self.country.clone(),
            UserColumn::Region => self.region.clone(),
            UserColumn::State => self.state.clone(),
            UserColumn::City => self.city.clone(),
            UserColumn::Zip => self.zip.clone(),
            UserColumn::Source => self.source.clone(),
            UserColumn::Language => self.lang_id.map(|id| id.to_string()).unwrap_or_default(),
            UserColumn::SubscriptionStatus => self.subscription_status.clone(),
        }
    }

    fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    fn related_values(&self, relation: &Relation) -> Vec<String> {
        match relation {
            Relation::ActionPage => self.actions.iter().map(|a| a.page_id.to_string()).collect(),
            Relation::ActionPageTag => self
                .actions
                .iter()
                .flat_map(|a| a.page_tag_ids.iter().map(|t| t.to_string()))
                .collect(),
            Relation::UserField(name) => self
                .fields
                .iter()
                .filter(|f| &f.name == name)
                .map(|f| f.value.clone())
                .collect(),
            Relation::Phone => self.phones.clone(),
        }
    }

    fn aggregate(&self, aggregate: &Aggregate) -> Decimal {
        let since_ok = |since: &Option<NaiveDateTime>, at: &NaiveDateTime| {
            since.map(|s| *at >= s).unwrap_or(true)
        };
        match aggregate {
            Aggregate::DistinctOpens { since } => {
                let ids: BTreeSet<i64> = self
                    .opens
                    .iter()
                    .filter(|o| since_ok(since, &o.created_at))
                    .map(|o| o.id)
                    .collect();
                Decimal::from(ids.len() as i64)
            }
            Aggregate::DistinctActions { since } => {
                let ids: BTreeSet<i64> = self
                    .actions
                    .iter()
                    .filter(|a| since_ok(since, &a.created_at))
                    .map(|a| a.id)
                    .collect();
                Decimal::from(ids.len() as i64)
            }
            Aggregate::CompletedOrderTotal { since } => self
                .completed_orders(since)
                .map(|o| o.total)
                .sum(),
            Aggregate::CompletedOrderCount { since } => {
                let ids: BTreeSet<i64> = self.completed_orders(since).map(|o| o.id).collect();
                Decimal::from(ids.len() as i64)
            }
        }
    }

    fn completed_orders<'a>(
        &'a self,
        since: &'a Option<NaiveDateTime>,
    ) -> impl Iterator<Item = &'a OrderRecord> + 'a {
        self.orders.iter().filter(move |o| {
            o.status == COMPLETED && since.map(|s| o.created_at >= s).unwrap_or(true)
        })
    }
}

/// Case-insensitive SQL `LIKE` with `%` and `_` wildcards
pub fn like_matches(pattern: &str, text: &str) -> bool {
    like_regex(pattern).map(|re| re.is_match(text)).unwrap_or(false)
}

/// Anchored regex equivalent of a `LIKE` pattern
fn like_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    let mut expr = String::with_capacity(pattern.len() + 2);
    expr.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '%' => expr.push_str(".*"),
            '_' => expr.push('.'),
            c => expr.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    expr.push('$');
    RegexBuilder::new(&expr)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
}

/// Evaluate a predicate against one row
pub fn evaluate(predicate: &Predicate, user: &UserRecord) -> bool {
    match predicate {
        Predicate::All => true,
        Predicate::Nothing => false,
        Predicate::ColumnIn { column, values } => values.contains(&user.column(*column)),
        Predicate::ColumnEquals { column, value } => &user.column(*column) == value,
        Predicate::CreatedAt { op, at } => op.holds(&user.created_at, at),
        Predicate::WithinBox(bbox) => user.location.map(|l| bbox.contains(l)).unwrap_or(false),
        Predicate::Related { relation, values } => {
            let related = user.related_values(relation);
            match values {
                Some(values) => related.iter().any(|v| values.contains(v)),
                None => !related.is_empty(),
            }
        }
        Predicate::IdIn(ids) => ids.contains(&user.id),
        Predicate::Aggregate {
            aggregate,
            op,
            threshold,
        } => {
            let value = user.aggregate(aggregate);
            let threshold = match threshold {
                Threshold::Count(n) => Decimal::from(*n),
                Threshold::Amount(amount) => *amount,
            };
            op.holds(&value, &threshold)
        }
        Predicate::Like { target, pattern } => match target {
            LikeTarget::FullName => like_matches(pattern, &user.full_name()),
            LikeTarget::Email => like_matches(pattern, &user.email),
        },
        Predicate::And(parts) => parts.iter().all(|p| evaluate(p, user)),
        Predicate::Or(parts) => parts.iter().any(|p| evaluate(p, user)),
        Predicate::Not(inner) => !evaluate(inner, user),
    }
}

/// Executes a plan and returns matching user ids, ascending and distinct
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn select_ids(&self, plan: &QueryPlan) -> Result<Vec<i64>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: Vec<UserRecord>,
}

impl MemoryUserStore {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &[UserRecord] {
        &self.users
    }

    /// Synchronous evaluation, for tests and tooling
    pub fn matching_ids(&self, plan: &QueryPlan) -> Vec<i64> {
        let ids: BTreeSet<i64> = self
            .users
            .iter()
            .filter(|u| evaluate(&plan.selection, u))
            .map(|u| u.id)
            .collect();
        ids.into_iter().collect()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn select_ids(&self, plan: &QueryPlan) -> Result<Vec<i64>> {
        Ok(self.matching_ids(plan))
    }
}

#[cfg(feature = "database")]
pub use pg::PgUserStore;

#[cfg(feature = "database")]
mod pg {
    use async_trait::async_trait;
    use sqlx::{PgPool, Row};
    use tracing::debug;

    use super::UserStore;
    use crate::error::Result;
    use crate::plan::QueryPlan;
    use crate::sql::{IdentifierSet, SqlRenderer};

    /// Runs rendered plans against `core_user`
    pub struct PgUserStore {
        pool: PgPool,
    }

    impl PgUserStore {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }

        /// Run the plan restricted to `ids`
        pub async fn select_ids_within(&self, plan: &QueryPlan, ids: &[i64]) -> Result<Vec<i64>> {
            let sql = SqlRenderer::render(plan, IdentifierSet::Literal(ids));
            self.fetch_ids(&sql).await
        }

        async fn fetch_ids(&self, sql: &str) -> Result<Vec<i64>> {
            debug!(sql, "Executing user search statement");
            let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
            rows.iter()
                .map(|row| row.try_get::<i64, _>("id").map_err(Into::into))
                .collect()
        }
    }

    #[async_trait]
    impl UserStore for PgUserStore {
        async fn select_ids(&self, plan: &QueryPlan) -> Result<Vec<i64>> {
            let sql = SqlRenderer::render(plan, IdentifierSet::Unbounded);
            self.fetch_ids(&sql).await
        }
    }
}
