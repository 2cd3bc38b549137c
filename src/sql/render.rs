//! QueryPlan → Postgres statement text
//!
//! Statements are assembled with `sea_query` and printed with values inlined,
//! so the output is a self-contained template rather than a statement with
//! bind parameters. The runtime identifier set is the one custom fragment.

use chrono::NaiveDateTime;
use sea_query::{
    Alias, Cond, Expr, ExprTrait, Func, Order, PostgresQueryBuilder, Query, SelectStatement,
    SimpleExpr,
};

use crate::plan::{
    Aggregate, Comparison, LikeTarget, OutputColumn, Predicate, QueryPlan, Relation, Threshold,
    UserColumn,
};
use crate::store::COMPLETED;

const USER_TABLE: &str = "core_user";

/// `core_user.id` as `PostgresQueryBuilder` prints it
const USER_ID_SQL: &str = r#""core_user"."id""#;

/// How the runtime identifier set is written into the statement
#[derive(Debug, Clone, Copy)]
pub enum IdentifierSet<'a> {
    /// No identifier restriction
    Unbounded,
    /// A token substituted later by the reporting service
    Placeholder(&'a str),
    /// Concrete ids
    Literal(&'a [i64]),
}

/// Statement fragment restricting rows to `list`
///
/// Both the placeholder and literal forms go through here, so a statement
/// rendered with a sentinel id contains exactly this text once.
pub fn identifier_set_sql(list: &str) -> String {
    format!("{} IN ({})", USER_ID_SQL, list)
}

pub struct SqlRenderer;

impl SqlRenderer {
    /// Render the full `SELECT` for a plan
    pub fn render(plan: &QueryPlan, ids: IdentifierSet<'_>) -> String {
        let mut query = Query::select();

        if plan.distinct {
            query.distinct();
        }
        for column in &plan.columns {
            add_column(&mut query, column);
        }
        query
            .from(Alias::new(USER_TABLE))
            .and_where(Self::condition(&plan.selection));

        match ids {
            IdentifierSet::Unbounded => {}
            IdentifierSet::Placeholder(token) => {
                query.and_where(Expr::cust(identifier_set_sql(token)));
            }
            IdentifierSet::Literal(&[]) => {
                query.and_where(Expr::cust("FALSE"));
            }
            IdentifierSet::Literal(ids) => {
                let list = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
                query.and_where(Expr::cust(identifier_set_sql(&list)));
            }
        }

        query.order_by((Alias::new(USER_TABLE), Alias::new("id")), Order::Asc);
        query.to_string(PostgresQueryBuilder)
    }

    /// Condition expression for a predicate tree
    pub fn condition(predicate: &Predicate) -> SimpleExpr {
        match predicate {
            Predicate::All => Expr::cust("TRUE"),
            Predicate::Nothing => Expr::cust("FALSE"),
            Predicate::ColumnIn { column, values } => {
                column_expr(*column).is_in(values.iter().cloned())
            }
            Predicate::ColumnEquals { column, value } => column_expr(*column).eq(value.clone()),
            Predicate::CreatedAt { op, at } => {
                compare(col(USER_TABLE, "created_at"), *op, Expr::val(timestamp(at)).into())
            }
            Predicate::WithinBox(bbox) => {
                let mut located = Query::select();
                located
                    .expr(Expr::val(1))
                    .from(Alias::new("core_location"))
                    .and_where(owned_by("core_location", "user_id"))
                    .and_where(col("core_location", "latitude").between(bbox.lat_min, bbox.lat_max))
                    .and_where(col("core_location", "longitude").between(bbox.lon_min, bbox.lon_max));
                Expr::exists(located)
            }
            Predicate::Related { relation, values } => related_expr(relation, values.as_deref()),
            Predicate::IdIn(ids) if ids.is_empty() => Expr::cust("FALSE"),
            Predicate::IdIn(ids) => col(USER_TABLE, "id").is_in(ids.iter().copied()),
            Predicate::Aggregate {
                aggregate,
                op,
                threshold,
            } => {
                let threshold: SimpleExpr = match threshold {
                    Threshold::Count(n) => Expr::val(*n).into(),
                    Threshold::Amount(amount) => Expr::val(*amount).into(),
                };
                compare(aggregate_expr(aggregate), *op, threshold)
            }
            Predicate::Like { target, pattern } => {
                let text = match target {
                    LikeTarget::FullName => full_name_expr(),
                    LikeTarget::Email => col(USER_TABLE, "email"),
                };
                SimpleExpr::from(Func::lower(text)).like(pattern.to_lowercase())
            }
            Predicate::And(parts) if parts.is_empty() => Expr::cust("TRUE"),
            Predicate::And(parts) => parts
                .iter()
                .fold(Cond::all(), |cond, part| cond.add(Self::condition(part)))
                .into(),
            Predicate::Or(parts) if parts.is_empty() => Expr::cust("FALSE"),
            Predicate::Or(parts) => parts
                .iter()
                .fold(Cond::any(), |cond, part| cond.add(Self::condition(part)))
                .into(),
            Predicate::Not(inner) => Cond::all().not().add(Self::condition(inner)).into(),
        }
    }
}

fn col(table: &'static str, column: &'static str) -> SimpleExpr {
    Expr::col((Alias::new(table), Alias::new(column))).into()
}

/// `<table>.<foreign_key> = core_user.id`
fn owned_by(table: &'static str, foreign_key: &'static str) -> SimpleExpr {
    Expr::col((Alias::new(table), Alias::new(foreign_key)))
        .equals((Alias::new(USER_TABLE), Alias::new("id")))
        .into()
}

fn as_text(expr: SimpleExpr) -> SimpleExpr {
    expr.cast_as(Alias::new("text"))
}

fn timestamp(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Parenthesised scalar subquery
fn scalar(query: SelectStatement) -> SimpleExpr {
    Expr::cust(format!("({})", query.to_string(PostgresQueryBuilder)))
}

fn compare(left: SimpleExpr, op: Comparison, right: SimpleExpr) -> SimpleExpr {
    match op {
        Comparison::Gt => left.gt(right),
        Comparison::Gte => left.gte(right),
        Comparison::Lte => left.lte(right),
    }
}

fn column_expr(column: UserColumn) -> SimpleExpr {
    match column {
        // nullable integer compared as text, so NULL behaves like ''
        UserColumn::Language => Func::coalesce([
            as_text(col(USER_TABLE, "lang_id")),
            Expr::val("").into(),
        ])
        .into(),
        other => col(USER_TABLE, other.column_name()),
    }
}

fn full_name_expr() -> SimpleExpr {
    Func::cust(Alias::new("CONCAT"))
        .args([
            col(USER_TABLE, "first_name"),
            Expr::val(" ").into(),
            col(USER_TABLE, "last_name"),
        ])
        .into()
}

/// First value of a per-user child row, ordered by the child's id
fn first_related(table: &'static str, value: &'static str, foreign_key: &'static str) -> SelectStatement {
    let mut query = Query::select();
    query
        .column((Alias::new(table), Alias::new(value)))
        .from(Alias::new(table))
        .and_where(owned_by(table, foreign_key))
        .order_by((Alias::new(table), Alias::new("id")), Order::Asc)
        .limit(1);
    query
}

fn add_column(query: &mut SelectStatement, column: &OutputColumn) {
    let alias = Alias::new(column.alias().to_string());
    match column {
        OutputColumn::Id => {
            query.column((Alias::new(USER_TABLE), Alias::new("id")));
        }
        OutputColumn::Phone => {
            let phone = first_related("core_phone", "normalized_phone", "user_id");
            query.expr_as(scalar(phone), alias);
        }
        OutputColumn::FullName => {
            query.expr_as(full_name_expr(), alias);
        }
        OutputColumn::UserField(name) => {
            let mut field = first_related("core_userfield", "value", "parent_id");
            field.and_where(col("core_userfield", "name").eq(name.clone()));
            query.expr_as(scalar(field), alias);
        }
    }
}

fn related_expr(relation: &Relation, values: Option<&[String]>) -> SimpleExpr {
    let mut related = Query::select();
    related.expr(Expr::val(1));

    let value_column = match relation {
        Relation::ActionPage => {
            related
                .from(Alias::new("core_action"))
                .and_where(owned_by("core_action", "user_id"));
            as_text(col("core_action", "page_id"))
        }
        Relation::ActionPageTag => {
            related
                .from(Alias::new("core_action"))
                .inner_join(
                    Alias::new("core_page_tags"),
                    Expr::col((Alias::new("core_page_tags"), Alias::new("page_id")))
                        .equals((Alias::new("core_action"), Alias::new("page_id"))),
                )
                .and_where(owned_by("core_action", "user_id"));
            as_text(col("core_page_tags", "tag_id"))
        }
        Relation::UserField(name) => {
            related
                .from(Alias::new("core_userfield"))
                .and_where(owned_by("core_userfield", "parent_id"))
                .and_where(col("core_userfield", "name").eq(name.clone()));
            col("core_userfield", "value")
        }
        Relation::Phone => {
            related
                .from(Alias::new("core_phone"))
                .and_where(owned_by("core_phone", "user_id"));
            col("core_phone", "normalized_phone")
        }
    };

    if let Some(values) = values {
        related.and_where(value_column.is_in(values.iter().cloned()));
    }
    Expr::exists(related)
}

fn aggregate_expr(aggregate: &Aggregate) -> SimpleExpr {
    let (measure, table, since): (SimpleExpr, &'static str, _) = match aggregate {
        Aggregate::DistinctOpens { since } => (
            Expr::col((Alias::new("core_open"), Alias::new("id"))).count().into(),
            "core_open",
            since,
        ),
        Aggregate::DistinctActions { since } => (
            Expr::col((Alias::new("core_action"), Alias::new("id"))).count().into(),
            "core_action",
            since,
        ),
        Aggregate::CompletedOrderTotal { since } => (
            Func::coalesce([
                SimpleExpr::from(Expr::col((Alias::new("core_order"), Alias::new("total"))).sum()),
                Expr::val(0).into(),
            ])
            .into(),
            "core_order",
            since,
        ),
        Aggregate::CompletedOrderCount { since } => (
            Expr::col((Alias::new("core_order"), Alias::new("id"))).count().into(),
            "core_order",
            since,
        ),
    };

    let mut query = Query::select();
    query
        .expr(measure)
        .from(Alias::new(table))
        .and_where(owned_by(table, "user_id"));
    if table == "core_order" {
        query.and_where(col("core_order", "status").eq(COMPLETED));
    }
    if let Some(since) = since {
        query.and_where(col(table, "created_at").gte(timestamp(since)));
    }
    scalar(query)
}
