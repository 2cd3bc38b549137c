//! Filter catalog
//!
//! Immutable registry of filter types, built once at startup and handed to
//! the compiler. Each `FilterSpec` names the field it reads, the predicate
//! builder that turns its values into a condition, and the companion
//! parameters it consumes.

use std::collections::{BTreeSet, HashMap};

use crate::plan::{Relation, UserColumn};

/// Companion carrying the radius in miles for `zipcode`
pub const DISTANCE: &str = "distance";
/// Companion carrying the contacting identity for `contacted_since`
pub const CONTACTED_BY: &str = "contacted_by";
/// Companion carrying the cutoff date for `contacted_by`
pub const CONTACTED_SINCE: &str = "contacted_since";
/// Companion carrying a cutoff date for engagement and donation filters
pub const SINCE: &str = "since";

/// Separator between a primary item name and its companion
pub const COMPANION_SEPARATOR: &str = "__";

/// Where a membership filter looks for its values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPath {
    Column(UserColumn),
    Related(Relation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateDirection {
    /// created at or before the date
    Before,
    /// created at or after the date
    After,
}

/// Predicate builder variants. Closed set, resolved at catalog construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderKind {
    Membership,
    CreatedDate(DateDirection),
    PostalRadius,
    ContactedSince,
    ContactedBy,
    EmailsOpened,
    MoreActions,
    DonatedMore,
    DonatedTimes,
}

#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub name: String,
    /// Field read by membership filters; builders with their own logic leave it empty
    pub field: Option<FieldPath>,
    pub builder: BuilderKind,
    /// Companion parameter names consumed by this filter only
    pub auxiliary_keys: BTreeSet<String>,
}

impl FilterSpec {
    fn new(name: &str, field: Option<FieldPath>, builder: BuilderKind, auxiliary: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            field,
            builder,
            auxiliary_keys: auxiliary.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn membership(name: &str, field: FieldPath) -> Self {
        Self::new(name, Some(field), BuilderKind::Membership, &[])
    }

    fn user_field(name: &str) -> Self {
        Self::membership(name, FieldPath::Related(Relation::UserField(name.to_string())))
    }
}

/// Registry of filter specs keyed by name, in declaration order
#[derive(Debug, Clone, Default)]
pub struct FilterCatalog {
    specs: Vec<FilterSpec>,
    by_name: HashMap<String, usize>,
}

impl FilterCatalog {
    pub fn new(specs: Vec<FilterSpec>) -> Self {
        let by_name = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), i))
            .collect();
        Self { specs, by_name }
    }

    /// The location, activity and profile filters offered by the search page
    pub fn standard() -> Self {
        use BuilderKind::*;

        Self::new(vec![
            // Location
            FilterSpec::membership("country", FieldPath::Column(UserColumn::Country)),
            FilterSpec::membership("region", FieldPath::Column(UserColumn::Region)),
            FilterSpec::membership("state", FieldPath::Column(UserColumn::State)),
            FilterSpec::membership("city", FieldPath::Column(UserColumn::City)),
            FilterSpec::new("zipcode", None, PostalRadius, &[DISTANCE]),
            // Activity
            FilterSpec::membership("action", FieldPath::Related(Relation::ActionPage)),
            FilterSpec::membership("source", FieldPath::Column(UserColumn::Source)),
            FilterSpec::membership("tag", FieldPath::Related(Relation::ActionPageTag)),
            FilterSpec::new("contacted_since", None, ContactedSince, &[CONTACTED_BY]),
            FilterSpec::new("contacted_by", None, ContactedBy, &[CONTACTED_SINCE]),
            FilterSpec::new("emails_opened", None, EmailsOpened, &[SINCE]),
            FilterSpec::new("more_actions", None, MoreActions, &[SINCE]),
            FilterSpec::new("donated_more", None, DonatedMore, &[SINCE]),
            FilterSpec::new("donated_times", None, DonatedTimes, &[SINCE]),
            // About
            FilterSpec::user_field("campus"),
            FilterSpec::user_field("skills"),
            FilterSpec::user_field("engagement_level"),
            FilterSpec::membership("language", FieldPath::Column(UserColumn::Language)),
            FilterSpec::user_field("student"),
            FilterSpec::user_field("affiliation"),
            FilterSpec::new("created_before", None, CreatedDate(DateDirection::Before), &[]),
            FilterSpec::new("created_after", None, CreatedDate(DateDirection::After), &[]),
        ])
    }

    pub fn get(&self, name: &str) -> Option<&FilterSpec> {
        self.by_name.get(name).map(|&i| &self.specs[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FilterSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Whether `item` names a companion of another filter, e.g. `zipcode__distance`.
    ///
    /// Companion items ride along with their primary and are never built on their own.
    pub fn is_companion_item(&self, item: &str) -> bool {
        item.split_once(COMPANION_SEPARATOR)
            .and_then(|(primary, companion)| {
                self.get(primary)
                    .map(|spec| spec.auxiliary_keys.contains(companion))
            })
            .unwrap_or(false)
    }
}
