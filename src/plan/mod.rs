//! Query plan: the predicate tree assembled for one compilation
//!
//! A `QueryPlan` is a pure value. Builders never mutate a plan in place;
//! they return a new predicate combined with the current one. The same tree
//! is rendered to SQL (`crate::sql`) and evaluated in memory
//! (`crate::store::MemoryUserStore`).

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::geo::BoundingBox;

/// Scalar column on the user row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserColumn {
    Country,
    Region,
    State,
    City,
    Zip,
    Source,
    Language,
    SubscriptionStatus,
}

impl UserColumn {
    /// Column name on `core_user`
    pub fn column_name(&self) -> &'static str {
        match self {
            UserColumn::Country => "country",
            UserColumn::Region => "region",
            UserColumn::State => "state",
            UserColumn::City => "city",
            UserColumn::Zip => "zip",
            UserColumn::Source => "source",
            UserColumn::Language => "lang_id",
            UserColumn::SubscriptionStatus => "subscription_status",
        }
    }
}

/// One-to-many relation reached through an existence join
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// Page the user took an action on
    ActionPage,
    /// Tag of a page the user took an action on
    ActionPageTag,
    /// Custom user field with the given name
    UserField(String),
    /// Phone number on file
    Phone,
}

/// Per-user aggregate compared against a threshold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregate {
    /// Distinct email open events, optionally since a date
    DistinctOpens { since: Option<NaiveDateTime> },
    /// Distinct actions taken, optionally since a date
    DistinctActions { since: Option<NaiveDateTime> },
    /// Sum of completed order totals, optionally since a date
    CompletedOrderTotal { since: Option<NaiveDateTime> },
    /// Number of completed orders, optionally since a date
    CompletedOrderCount { since: Option<NaiveDateTime> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Gt,
    Gte,
    Lte,
}

impl Comparison {
    pub fn holds<T: PartialOrd>(&self, left: &T, right: &T) -> bool {
        match self {
            Comparison::Gt => left > right,
            Comparison::Gte => left >= right,
            Comparison::Lte => left <= right,
        }
    }
}

/// Right-hand side of an aggregate comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Threshold {
    Count(i64),
    Amount(Decimal),
}

/// Free-text target of a case-insensitive LIKE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LikeTarget {
    /// `first_name || ' ' || last_name`
    FullName,
    Email,
}

/// Predicate tree over user rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every row
    All,
    /// Matches no row
    Nothing,
    ColumnIn {
        column: UserColumn,
        values: Vec<String>,
    },
    ColumnEquals {
        column: UserColumn,
        value: String,
    },
    CreatedAt {
        op: Comparison,
        at: NaiveDateTime,
    },
    /// User location falls inside the box
    WithinBox(BoundingBox),
    /// At least one related row exists; when `values` is set, its value must be in the set
    Related {
        relation: Relation,
        values: Option<Vec<String>>,
    },
    /// Row id is one of the given ids. An empty list matches nothing.
    IdIn(Vec<i64>),
    Aggregate {
        aggregate: Aggregate,
        op: Comparison,
        threshold: Threshold,
    },
    Like {
        target: LikeTarget,
        pattern: String,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Conjunction. `All` is the identity and nested conjunctions are flattened.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(right)) => {
                let mut parts = vec![p];
                parts.extend(right);
                Predicate::And(parts)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    /// Disjunction. `Nothing` is the identity and nested disjunctions are flattened.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::Nothing, p) | (p, Predicate::Nothing) => p,
            (Predicate::Or(mut left), Predicate::Or(right)) => {
                left.extend(right);
                Predicate::Or(left)
            }
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (p, Predicate::Or(right)) => {
                let mut parts = vec![p];
                parts.extend(right);
                Predicate::Or(parts)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }

    /// Negation of exactly the same condition
    pub fn negate(self) -> Predicate {
        match self {
            Predicate::All => Predicate::Nothing,
            Predicate::Nothing => Predicate::All,
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// Include or exclude rows matching this predicate
    pub fn toggled(self, include: bool) -> Predicate {
        if include {
            self
        } else {
            self.negate()
        }
    }

    /// True when the predicate does not narrow the row set at all
    pub fn is_unfiltered(&self) -> bool {
        matches!(self, Predicate::All)
    }
}

/// Output column of the compiled statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputColumn {
    Id,
    /// First normalized phone number on file
    Phone,
    /// `first_name || ' ' || last_name`
    FullName,
    /// First value of a custom user field
    UserField(String),
}

impl OutputColumn {
    pub fn alias(&self) -> &str {
        match self {
            OutputColumn::Id => "id",
            OutputColumn::Phone => "phone",
            OutputColumn::FullName => "name",
            OutputColumn::UserField(name) => name,
        }
    }
}

/// The cumulative query assembled for one compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub selection: Predicate,
    pub columns: Vec<OutputColumn>,
    pub distinct: bool,
}

impl QueryPlan {
    /// Every user row, ordered by id, projecting only the id
    pub fn baseline() -> Self {
        Self {
            selection: Predicate::All,
            columns: vec![OutputColumn::Id],
            distinct: false,
        }
    }

    /// Conjoin a predicate onto the selection
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.selection = self.selection.and(predicate);
        self
    }

    /// Same shape, empty result
    pub fn none(mut self) -> Self {
        self.selection = Predicate::Nothing;
        self
    }

    pub fn with_columns(mut self, columns: impl IntoIterator<Item = OutputColumn>) -> Self {
        for column in columns {
            if !self.columns.contains(&column) {
                self.columns.push(column);
            }
        }
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
}
