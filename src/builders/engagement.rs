//! Aggregate thresholds over opens, actions and completed orders

use super::{companion_date, first_value, values, ItemPredicate};
use crate::catalog::SINCE;
use crate::error::ValidationError;
use crate::parser::FilterItem;
use crate::plan::{Aggregate, Comparison, Predicate, Threshold};

type BuildResult = Result<ItemPredicate, ValidationError>;

fn since_suffix(item: &FilterItem) -> String {
    item.aux(SINCE)
        .map(|raw| format!(" since {}", raw.trim()))
        .unwrap_or_default()
}

fn aggregate(aggregate: Aggregate, op: Comparison, threshold: Threshold) -> Predicate {
    Predicate::Aggregate {
        aggregate,
        op,
        threshold,
    }
}

/// At least N distinct opens
pub(super) fn emails_opened(item: &FilterItem) -> BuildResult {
    let n = values::parse_count(&item.name, first_value(item)?)?;
    let since = companion_date(item, SINCE)?;

    Ok(ItemPredicate::new(
        aggregate(Aggregate::DistinctOpens { since }, Comparison::Gte, Threshold::Count(n)),
        format!("opened at least {} emails{}", n, since_suffix(item)),
    )
    .toggled(item.include))
}

/// Strictly more than N distinct actions
pub(super) fn more_actions(item: &FilterItem) -> BuildResult {
    let n = values::parse_count(&item.name, first_value(item)?)?;
    let since = companion_date(item, SINCE)?;

    Ok(ItemPredicate::new(
        aggregate(Aggregate::DistinctActions { since }, Comparison::Gt, Threshold::Count(n)),
        format!("more than {} actions{}", n, since_suffix(item)),
    )
    .toggled(item.include))
}

/// Completed order total of at least X
pub(super) fn donated_more(item: &FilterItem) -> BuildResult {
    let raw = first_value(item)?.trim();
    let amount = values::parse_amount(&item.name, raw)?;
    let since = companion_date(item, SINCE)?;

    Ok(donation(
        item,
        aggregate(
            Aggregate::CompletedOrderTotal { since },
            Comparison::Gte,
            Threshold::Amount(amount),
        ),
        format!("donated more than {}{}", raw, since_suffix(item)),
    ))
}

/// At least N completed orders
pub(super) fn donated_times(item: &FilterItem) -> BuildResult {
    let n = values::parse_count(&item.name, first_value(item)?)?;
    let since = companion_date(item, SINCE)?;

    Ok(donation(
        item,
        aggregate(
            Aggregate::CompletedOrderCount { since },
            Comparison::Gte,
            Threshold::Count(n),
        ),
        format!("donated more than {} times{}", n, since_suffix(item)),
    ))
}

/// Donation filters read "has donated" / "has not donated"
fn donation(item: &FilterItem, predicate: Predicate, phrase: String) -> ItemPredicate {
    let verb = if item.include { "has" } else { "has not" };
    ItemPredicate::new(predicate.toggled(item.include), format!("{} {}", verb, phrase))
}
