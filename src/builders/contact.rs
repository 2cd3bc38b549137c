use tracing::debug;

use super::{companion_date, first_value, values, ItemPredicate};
use crate::catalog::{CONTACTED_BY, CONTACTED_SINCE};
use crate::contacts::{ContactCriteria, ContactLog};
use crate::error::{Result, SearchError};
use crate::parser::FilterItem;
use crate::plan::Predicate;

pub(super) async fn contacted_since(contacts: &dyn ContactLog, item: &FilterItem) -> Result<ItemPredicate> {
    let raw_since = first_value(item)?.trim();
    let since = values::parse_date(&item.name, raw_since)?;
    let contacted_by = item.aux(CONTACTED_BY).map(|who| who.trim().to_string());

    let mut human = format!("contacted since {}", raw_since);
    if let Some(who) = &contacted_by {
        human.push_str(&format!(" by {}", who));
    }

    let criteria = ContactCriteria {
        since: Some(since),
        contacted_by,
    };
    let predicate = contacted_ids(contacts, &criteria).await?;

    Ok(ItemPredicate::new(predicate, human).toggled(item.include))
}

pub(super) async fn contacted_by(contacts: &dyn ContactLog, item: &FilterItem) -> Result<ItemPredicate> {
    let who = first_value(item)?.trim().to_string();
    let since = companion_date(item, CONTACTED_SINCE)?;

    let mut human = format!("contacted by {}", who);
    if let Some(raw) = item.aux(CONTACTED_SINCE) {
        human.push_str(&format!(" since {}", raw.trim()));
    }

    let criteria = ContactCriteria {
        since,
        contacted_by: Some(who),
    };
    let predicate = contacted_ids(contacts, &criteria).await?;

    Ok(ItemPredicate::new(predicate, human).toggled(item.include))
}

/// Membership in the contacted set. An empty set yields an id list that matches nothing.
async fn contacted_ids(contacts: &dyn ContactLog, criteria: &ContactCriteria) -> Result<Predicate> {
    let ids = contacts
        .contacted_user_ids(criteria)
        .await
        .map_err(SearchError::ContactLookup)?;

    debug!(
        count = ids.len(),
        since = ?criteria.since,
        contacted_by = ?criteria.contacted_by,
        "Resolved contacted users"
    );

    Ok(Predicate::IdIn(ids))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::contacts::{ContactRecord, MemoryContactLog};

    fn record(akid: i64, at: &str, who: &str) -> ContactRecord {
        ContactRecord {
            akid,
            completed_at: NaiveDateTime::parse_from_str(at, "%Y-%m-%d %H:%M:%S").unwrap(),
            contacted_by: who.to_string(),
        }
    }

    fn log() -> MemoryContactLog {
        MemoryContactLog::new(vec![
            record(3, "2021-02-01 09:00:00", "alice"),
            record(1, "2021-04-01 09:00:00", "bob"),
            record(3, "2021-04-02 09:00:00", "bob"),
        ])
    }

    #[tokio::test]
    async fn test_contacted_since_with_identity() {
        let item = FilterItem::new("contacted_since", &["2021-03-01"]).with_auxiliary(CONTACTED_BY, "bob");
        let built = contacted_since(&log(), &item).await.unwrap();
        assert_eq!(built.human, "contacted since 2021-03-01 by bob");
        assert_eq!(built.predicate, Predicate::IdIn(vec![1, 3]));
    }

    #[tokio::test]
    async fn test_contacted_by_with_since() {
        let item = FilterItem::new("contacted_by", &["alice"]).with_auxiliary(CONTACTED_SINCE, "2021-01-01");
        let built = contacted_by(&log(), &item).await.unwrap();
        assert_eq!(built.human, "contacted by alice since 2021-01-01");
        assert_eq!(built.predicate, Predicate::IdIn(vec![3]));
    }

    #[tokio::test]
    async fn test_empty_contact_set_matches_nothing() {
        let item = FilterItem::new("contacted_by", &["carol"]);
        let built = contacted_by(&log(), &item).await.unwrap();
        assert_eq!(built.predicate, Predicate::IdIn(vec![]));
    }

    #[tokio::test]
    async fn test_excluded_contacts() {
        let item = FilterItem::new("contacted_since", &["2021-01-01"]).excluded();
        let built = contacted_since(&log(), &item).await.unwrap();
        assert_eq!(built.human, "not contacted since 2021-01-01");
        assert_eq!(built.predicate, Predicate::IdIn(vec![1, 3]).negate());
    }
}
