//! Predicate builders
//!
//! One builder per `BuilderKind`. Each takes the group's current predicate,
//! the item's values, companions and toggle, and returns the narrowed
//! predicate plus a human-readable fragment. Excluding an item negates the
//! exact same condition it would have included.

mod contact;
mod engagement;
mod location;
pub mod values;

use chrono::NaiveDateTime;

use crate::catalog::{BuilderKind, DateDirection, FieldPath, FilterSpec};
use crate::contacts::ContactLog;
use crate::error::{Result, ValidationError};
use crate::geo::Geocoder;
use crate::parser::FilterItem;
use crate::plan::{Comparison, Predicate};

/// Collaborators a builder may consult
#[derive(Clone, Copy)]
pub struct BuildContext<'a> {
    pub geocoder: &'a dyn Geocoder,
    pub contacts: &'a dyn ContactLog,
}

/// Condition produced for a single item, before it is combined
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPredicate {
    pub predicate: Predicate,
    pub human: String,
}

impl ItemPredicate {
    fn new(predicate: Predicate, human: impl Into<String>) -> Self {
        Self {
            predicate,
            human: human.into(),
        }
    }

    /// Negate unless `include`, prefixing the human text with `not `
    fn toggled(self, include: bool) -> Self {
        if include {
            self
        } else {
            Self {
                predicate: self.predicate.negate(),
                human: format!("not {}", self.human),
            }
        }
    }
}

/// Narrow `current` by `item`, returning the new predicate and its description
pub async fn apply(
    ctx: BuildContext<'_>,
    current: Predicate,
    spec: &FilterSpec,
    item: &FilterItem,
) -> Result<(Predicate, String)> {
    let built = build_item(ctx, spec, item).await?;
    Ok((current.and(built.predicate), built.human))
}

/// Condition for one item on its own
pub async fn build_item(
    ctx: BuildContext<'_>,
    spec: &FilterSpec,
    item: &FilterItem,
) -> Result<ItemPredicate> {
    match spec.builder {
        BuilderKind::Membership => Ok(membership(spec, item)?),
        BuilderKind::CreatedDate(direction) => Ok(created_date(direction, item)?),
        BuilderKind::PostalRadius => location::postal_radius(ctx.geocoder, item).await,
        BuilderKind::ContactedSince => contact::contacted_since(ctx.contacts, item).await,
        BuilderKind::ContactedBy => contact::contacted_by(ctx.contacts, item).await,
        BuilderKind::EmailsOpened => Ok(engagement::emails_opened(item)?),
        BuilderKind::MoreActions => Ok(engagement::more_actions(item)?),
        BuilderKind::DonatedMore => Ok(engagement::donated_more(item)?),
        BuilderKind::DonatedTimes => Ok(engagement::donated_times(item)?),
    }
}

fn first_value(item: &FilterItem) -> std::result::Result<&str, ValidationError> {
    item.values
        .first()
        .map(|v| v.as_str())
        .ok_or_else(|| ValidationError::MissingValue {
            filter: item.name.clone(),
        })
}

/// Optional `since` style companion, parsed as a date
fn companion_date(
    item: &FilterItem,
    key: &str,
) -> std::result::Result<Option<NaiveDateTime>, ValidationError> {
    item.aux(key)
        .map(|raw| values::parse_date(&item.name, raw))
        .transpose()
}

fn membership(spec: &FilterSpec, item: &FilterItem) -> std::result::Result<ItemPredicate, ValidationError> {
    first_value(item)?;
    let values = item.values.clone();
    let listed = values.join(", ");

    let predicate = match &spec.field {
        Some(FieldPath::Column(column)) => Predicate::ColumnIn {
            column: *column,
            values,
        },
        Some(FieldPath::Related(relation)) => Predicate::Related {
            relation: relation.clone(),
            values: Some(values),
        },
        None => {
            return Err(ValidationError::UnknownFilter {
                name: spec.name.clone(),
            })
        }
    };

    // Membership reads "is not in" rather than a leading "not"
    let human = if item.include {
        format!("{} is in ({})", item.name, listed)
    } else {
        format!("{} is not in ({})", item.name, listed)
    };

    Ok(ItemPredicate::new(predicate.toggled(item.include), human))
}

fn created_date(
    direction: DateDirection,
    item: &FilterItem,
) -> std::result::Result<ItemPredicate, ValidationError> {
    let raw = first_value(item)?;
    let at = values::parse_date(&item.name, raw)?;

    let (op, label) = match direction {
        DateDirection::Before => (Comparison::Lte, "created before"),
        DateDirection::After => (Comparison::Gte, "created after"),
    };

    Ok(ItemPredicate::new(
        Predicate::CreatedAt { op, at },
        format!("{} {}", label, raw.trim()),
    )
    .toggled(item.include))
}
