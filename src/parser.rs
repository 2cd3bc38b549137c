//! Group/parameter parser
//!
//! Turns the flat parameter map into ordered filter groups:
//!
//! - `include:<n>` lists the item names of group `n`
//! - `<n>_<item>` carries the item's values
//! - `<n>_<item>_istoggle` selects include (1, default) or exclude (0)
//! - `<n>_<item>__<companion>` carries a companion value for the item
//!
//! Item keys may also be prefixed with the full marker (`include:<n>_<item>`),
//! which is what the search page form submits.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::catalog::{FilterCatalog, COMPANION_SEPARATOR};
use crate::error::ValidationError;
use crate::params::QueryParams;

const TOGGLE_SUFFIX: &str = "_istoggle";

static GROUP_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^include:(\d+)$").unwrap());

/// One filter within a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterItem {
    /// Catalog name of the filter
    pub name: String,
    pub values: Vec<String>,
    /// true = match rows meeting the condition, false = rows not meeting it
    pub include: bool,
    /// Companion values keyed by companion name
    pub auxiliary: BTreeMap<String, String>,
}

impl FilterItem {
    pub fn new(name: &str, values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
            include: true,
            auxiliary: BTreeMap::new(),
        }
    }

    pub fn excluded(mut self) -> Self {
        self.include = false;
        self
    }

    pub fn with_auxiliary(mut self, key: &str, value: &str) -> Self {
        self.auxiliary.insert(key.to_string(), value.to_string());
        self
    }

    pub fn aux(&self, key: &str) -> Option<&str> {
        self.auxiliary.get(key).map(|s| s.as_str())
    }
}

/// Items combined by conjunction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterGroup {
    /// Group marker key, e.g. `include:1`
    pub key: String,
    pub items: Vec<FilterItem>,
}

/// Parse every group in first-appearance order.
///
/// Groups whose items all lack values are returned empty; the assembler drops them.
pub fn parse_groups(
    params: &QueryParams,
    catalog: &FilterCatalog,
) -> Result<Vec<FilterGroup>, ValidationError> {
    let mut groups = Vec::new();

    for key in params.keys() {
        let Some(number) = GROUP_KEY_RE
            .captures(key)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
        else {
            continue;
        };
        match params.get(key) {
            Some(marker) if !marker.is_empty() && !marker.ends_with(TOGGLE_SUFFIX) => {}
            _ => continue,
        }

        let items = parse_items(params, catalog, key, number)?;
        groups.push(FilterGroup {
            key: key.to_string(),
            items,
        });
    }

    Ok(groups)
}

fn parse_items(
    params: &QueryParams,
    catalog: &FilterCatalog,
    group_key: &str,
    number: &str,
) -> Result<Vec<FilterItem>, ValidationError> {
    let mut items = Vec::new();

    for name in params.get_list(group_key) {
        if catalog.is_companion_item(name) {
            continue;
        }

        // Short `<n>_` prefix wins; the full marker prefix is the form's spelling
        let prefix = if params.contains_key(&format!("{}_{}", number, name)) {
            number
        } else {
            group_key
        };

        let values: Vec<String> = params
            .get_list(&format!("{}_{}", prefix, name))
            .into_iter()
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            debug!(group = group_key, item = name, "Item has no values, skipping");
            continue;
        }

        let spec = catalog
            .get(name)
            .ok_or_else(|| ValidationError::UnknownFilter {
                name: name.to_string(),
            })?;

        let include = params
            .get(&format!("{}_{}{}", prefix, name, TOGGLE_SUFFIX))
            .map(parse_toggle)
            .unwrap_or(true);

        let auxiliary = spec
            .auxiliary_keys
            .iter()
            .filter_map(|companion| {
                let key = format!("{}_{}{}{}", prefix, name, COMPANION_SEPARATOR, companion);
                params
                    .get_non_empty(&key)
                    .map(|v| (companion.clone(), v.to_string()))
            })
            .collect();

        items.push(FilterItem {
            name: name.to_string(),
            values,
            include,
            auxiliary,
        });
    }

    Ok(items)
}

/// Integer-valued boolean; anything unparsable means include
fn parse_toggle(raw: &str) -> bool {
    raw.trim().parse::<i64>().map(|n| n != 0).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(qs: &str) -> Result<Vec<FilterGroup>, ValidationError> {
        parse_groups(&QueryParams::parse(qs), &FilterCatalog::standard())
    }

    #[test]
    fn test_single_group_single_item() {
        let groups = parse("include:1=country&include:1_country=US").unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "include:1");
        assert_eq!(groups[0].items, vec![FilterItem::new("country", &["US"])]);
    }

    #[test]
    fn test_short_group_prefix() {
        let groups = parse("include:1=country&1_country=US&1_country_istoggle=0").unwrap();
        assert_eq!(groups[0].items, vec![FilterItem::new("country", &["US"]).excluded()]);
    }

    #[test]
    fn test_groups_keep_first_appearance_order() {
        let groups = parse(
            "include:2=state&include:2_state=NY&include:1=country&include:1_country=US",
        )
        .unwrap();
        let keys: Vec<_> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["include:2", "include:1"]);
    }

    #[test]
    fn test_rejects_non_group_keys() {
        let groups = parse("include:x=country&include:=country&includes:1=country").unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_skips_empty_and_toggle_markers() {
        let groups = parse("include:1=&include:2=country_istoggle").unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_item_without_values_is_dropped() {
        let groups = parse("include:1=country&include:1=state&include:1_state=NY&include:1_country=").unwrap();
        assert_eq!(groups[0].items, vec![FilterItem::new("state", &["NY"])]);
    }

    #[test]
    fn test_toggle_parsing() {
        let groups = parse(
            "include:1=country&include:1_country=US&include:1_country_istoggle=0\
             &include:1=state&include:1_state=NY&include:1_state_istoggle=bogus\
             &include:1=city&include:1_city=Albany&include:1_city_istoggle=2",
        )
        .unwrap();
        let toggles: Vec<_> = groups[0].items.iter().map(|i| i.include).collect();
        assert_eq!(toggles, vec![false, true, true]);
    }

    #[test]
    fn test_companions_fold_into_primary() {
        let groups = parse(
            "include:1=zipcode&include:1=zipcode__distance\
             &include:1_zipcode=10001&include:1_zipcode__distance=25",
        )
        .unwrap();
        assert_eq!(
            groups[0].items,
            vec![FilterItem::new("zipcode", &["10001"]).with_auxiliary("distance", "25")]
        );
    }

    #[test]
    fn test_contact_companions_both_directions() {
        let groups = parse(
            "include:1=contacted_since&include:1=contacted_since__contacted_by\
             &include:1_contacted_since=2020-01-01&include:1_contacted_since__contacted_by=alice\
             &include:2=contacted_by&include:2_contacted_by=bob\
             &include:2_contacted_by__contacted_since=2021-06-01",
        )
        .unwrap();
        assert_eq!(groups[0].items[0].aux("contacted_by"), Some("alice"));
        assert_eq!(groups[1].items[0].aux("contacted_since"), Some("2021-06-01"));
    }

    #[test]
    fn test_empty_companion_means_no_constraint() {
        let groups = parse(
            "include:1=emails_opened&include:1_emails_opened=3&include:1_emails_opened__since=",
        )
        .unwrap();
        assert!(groups[0].items[0].auxiliary.is_empty());
    }

    #[test]
    fn test_unknown_filter_with_values_is_rejected() {
        let err = parse("include:1=shoe_size&include:1_shoe_size=11").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownFilter {
                name: "shoe_size".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_filter_without_values_is_ignored() {
        let groups = parse("include:1=shoe_size").unwrap();
        assert!(groups[0].items.is_empty());
    }
}
