//! Value parsing shared by the predicate builders

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::error::ValidationError;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y"];

/// Parse a user-entered date or timestamp. Offsets are normalized to UTC.
pub fn parse_date(filter: &str, raw: &str) -> Result<NaiveDateTime, ValidationError> {
    let value = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(dt);
        }
    }

    for format in DATE_FORMATS {
        if let Some(dt) = NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
        {
            return Ok(dt);
        }
    }

    Err(ValidationError::InvalidDate {
        filter: filter.to_string(),
        value: raw.to_string(),
    })
}

pub fn parse_count(filter: &str, raw: &str) -> Result<i64, ValidationError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ValidationError::InvalidNumber {
            filter: filter.to_string(),
            value: raw.to_string(),
        })
}

pub fn parse_amount(filter: &str, raw: &str) -> Result<Decimal, ValidationError> {
    Decimal::from_str(raw.trim()).map_err(|_| ValidationError::InvalidNumber {
        filter: filter.to_string(),
        value: raw.to_string(),
    })
}

/// Radius in miles; must be a finite positive number
pub fn parse_distance(raw: &str) -> Result<f64, ValidationError> {
    match raw.trim().parse::<f64>() {
        Ok(miles) if miles.is_finite() && miles > 0.0 => Ok(miles),
        _ => Err(ValidationError::InvalidDistance {
            value: raw.to_string(),
        }),
    }
}
