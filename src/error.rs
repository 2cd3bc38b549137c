//! Error types for the user search compiler
//!
//! Validation problems abort a compilation before any template is produced.
//! Collaborator failures (geocoding, contact lookup, report service) are
//! wrapped so callers can tell them apart from malformed input.

use thiserror::Error;

/// Main error type for a compilation or dispatch
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Geocoding error: {0}")]
    Geocode(#[from] GeocodeError),

    #[error("Template capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Contact lookup failed: {0}")]
    ContactLookup(#[source] anyhow::Error),

    #[error("Extension column catalog failed: {0}")]
    ColumnCatalog(#[source] anyhow::Error),

    #[error("Report service error: {0}")]
    Report(#[source] anyhow::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Malformed or unusable request parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Unknown filter '{name}'")]
    UnknownFilter { name: String },

    #[error("Invalid date '{value}' for '{filter}'")]
    InvalidDate { filter: String, value: String },

    #[error("Invalid number '{value}' for '{filter}'")]
    InvalidNumber { filter: String, value: String },

    #[error("Bad distance '{value}': radius must be a positive number of miles")]
    InvalidDistance { value: String },

    #[error("No location found for postal code '{postal_code}'")]
    UnresolvedPostalCode { postal_code: String },

    #[error("Radius around ({lat}, {lon}) does not form a usable bounding box")]
    DegenerateBoundingBox { lat: f64, lon: f64 },

    #[error("Invalid id '{value}' in user id list")]
    InvalidUserId { value: String },

    #[error("Filter '{filter}' requires a value")]
    MissingValue { filter: String },

    #[error("Unknown extension column kind '{kind}' for column '{column}'")]
    UnknownColumnKind { column: String, kind: String },

    #[error("Invalid parameters '{parameters}' for extension column '{column}'")]
    InvalidColumnParameters { column: String, parameters: String },
}

/// Postal code resolution failures
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("Provider '{provider}' returned no usable result for '{postal_code}'")]
    NoResult {
        provider: &'static str,
        postal_code: String,
    },

    #[error("Provider '{provider}' returned a malformed response: {message}")]
    Malformed {
        provider: &'static str,
        message: String,
    },

    #[error("Provider '{provider}' request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Failures of the sentinel statement-capture technique
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The backend returned rows for a statement that references the sentinel id.
    /// The captured statement cannot be trusted, so the compilation aborts.
    #[error("Sentinel query was expected to fail but returned {rows} row(s)")]
    UnexpectedSuccess { rows: usize },

    #[error("Backend failed but recorded no statement")]
    NoStatementRecorded,

    #[error("Captured statement does not contain sentinel fragment '{fragment}'")]
    SentinelMissing { fragment: String },

    /// The sentinel fragment also appears outside the identifier restriction,
    /// e.g. inside a user-supplied literal
    #[error("Captured statement contains sentinel fragment '{fragment}' {occurrences} times")]
    AmbiguousSentinel { fragment: String, occurrences: usize },
}

pub type Result<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_converts_into_search_error() {
        let err: SearchError = ValidationError::InvalidDistance {
            value: "-3".to_string(),
        }
        .into();
        assert!(matches!(err, SearchError::Validation(_)));
        assert!(err.to_string().contains("positive number of miles"));
    }

    #[test]
    fn test_unexpected_success_message() {
        let err: SearchError = CaptureError::UnexpectedSuccess { rows: 2 }.into();
        assert_eq!(
            err.to_string(),
            "Template capture error: Sentinel query was expected to fail but returned 2 row(s)"
        );
    }
}
