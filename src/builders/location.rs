use tracing::{debug, warn};

use super::{first_value, values, ItemPredicate};
use crate::catalog::DISTANCE;
use crate::error::{GeocodeError, Result, SearchError, ValidationError};
use crate::geo::{BoundingBox, Geocoder};
use crate::parser::FilterItem;
use crate::plan::{Predicate, UserColumn};

/// Radius search when a distance is given, exact postal code match otherwise.
///
/// An unresolvable postal code fails the compilation instead of matching nothing.
pub(super) async fn postal_radius(geocoder: &dyn Geocoder, item: &FilterItem) -> Result<ItemPredicate> {
    let zip = first_value(item)?.trim().to_string();

    let Some(raw_distance) = item.aux(DISTANCE) else {
        return Ok(ItemPredicate::new(
            Predicate::ColumnEquals {
                column: UserColumn::Zip,
                value: zip.clone(),
            },
            format!("in zip code {}", zip),
        )
        .toggled(item.include));
    };

    let miles = values::parse_distance(raw_distance)?;

    let center = match geocoder.resolve(&zip).await {
        Ok(center) => center,
        Err(GeocodeError::NoResult { provider, .. }) | Err(GeocodeError::Malformed { provider, .. }) => {
            warn!(provider, postal_code = %zip, "Postal code could not be resolved");
            return Err(ValidationError::UnresolvedPostalCode { postal_code: zip }.into());
        }
        Err(e) => return Err(SearchError::Geocode(e)),
    };

    let bbox = BoundingBox::around(center, miles);
    if bbox.is_degenerate() {
        return Err(ValidationError::DegenerateBoundingBox {
            lat: center.lat,
            lon: center.lon,
        }
        .into());
    }
    debug!(postal_code = %zip, miles, ?bbox, "Resolved radius search");

    Ok(ItemPredicate::new(
        Predicate::WithinBox(bbox),
        format!("within {} miles of {}", raw_distance.trim(), zip),
    )
    .toggled(item.include))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{LatLon, StaticGeocoder};

    fn geocoder() -> StaticGeocoder {
        StaticGeocoder::new()
            .with("10001", LatLon::new(40.0, -74.0))
            .with("H0H0H0", LatLon::new(90.0, 0.0))
    }

    #[tokio::test]
    async fn test_exact_zip_without_distance() {
        let built = postal_radius(&geocoder(), &FilterItem::new("zipcode", &["02139"]))
            .await
            .unwrap();
        assert_eq!(built.human, "in zip code 02139");
        assert_eq!(
            built.predicate,
            Predicate::ColumnEquals {
                column: UserColumn::Zip,
                value: "02139".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_radius_builds_box() {
        let item = FilterItem::new("zipcode", &["10001"]).with_auxiliary(DISTANCE, "10");
        let built = postal_radius(&geocoder(), &item).await.unwrap();

        assert_eq!(built.human, "within 10 miles of 10001");
        match built.predicate {
            Predicate::WithinBox(bbox) => {
                assert!(bbox.contains(LatLon::new(40.0, -74.0)));
                assert!(!bbox.contains(LatLon::new(41.0, -74.0)));
            }
            other => panic!("expected WithinBox, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_excluded_radius() {
        let item = FilterItem::new("zipcode", &["10001"])
            .with_auxiliary(DISTANCE, "5")
            .excluded();
        let built = postal_radius(&geocoder(), &item).await.unwrap();
        assert_eq!(built.human, "not within 5 miles of 10001");
        assert!(matches!(built.predicate, Predicate::Not(_)));
    }

    #[tokio::test]
    async fn test_unresolved_zip_is_validation_error() {
        let item = FilterItem::new("zipcode", &["99999"]).with_auxiliary(DISTANCE, "10");
        let err = postal_radius(&geocoder(), &item).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Validation(ValidationError::UnresolvedPostalCode { ref postal_code })
                if postal_code == "99999"
        ));
    }

    #[tokio::test]
    async fn test_radius_at_the_pole_is_rejected() {
        let item = FilterItem::new("zipcode", &["H0H0H0"]).with_auxiliary(DISTANCE, "10");
        let err = postal_radius(&geocoder(), &item).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Validation(ValidationError::DegenerateBoundingBox { lat, .. }) if lat == 90.0
        ));
    }

    #[tokio::test]
    async fn test_non_positive_distance() {
        let item = FilterItem::new("zipcode", &["10001"]).with_auxiliary(DISTANCE, "0");
        let err = postal_radius(&geocoder(), &item).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Validation(ValidationError::InvalidDistance { .. })
        ));
    }
}
