use std::io;

use thiserror::Error;

/// Enumerates high-level errors returned by this library.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Represents an SQL error.
    #[error("SQLx error")]
    Sqlx { source: sqlx::Error },

    /// Represents an identifier in a path that isn't numeric.
    #[error("Please provide a numeric ID, got: {0}")]
    InvalidId(String),

    /// Represents an identifier that doesn't exist in the store.
    #[error("No record with ID {0}")]
    NonExistentId(i32),

    /// Represents a date parameter that couldn't be parsed.
    #[error("Failed to parse {0} as a date or date range, please provide dates as 'YYYY-MM-DD' or optionally as a range 'YYYY-MM-DD/YYYY-MM-DD'")]
    InvalidDate(String),

    /// Represents a date range whose end precedes its start.
    #[error("The date range {start}/{end} ends before it starts")]
    InvertedDateRange { start: String, end: String },

    /// Represents a date range too long to project.
    #[error("The date range {start}/{end} is longer than {max} days")]
    DateRangeTooLong { start: String, end: String, max: i64 },

    /// Represents a timestamp that couldn't be parsed.
    #[error("Failed to parse {0} as an RFC 3339 timestamp")]
    InvalidTimestamp(String),

    /// Represents a recurrence kind outside the closed set.
    #[error("{value} is not a valid interval. Valid values: {valid}")]
    InvalidRecurrenceKind { value: String, valid: String },

    /// Represents a genre outside the closed set.
    #[error("{value} is not a valid genre. Valid values: {valid}")]
    InvalidGenre { value: String, valid: String },

    /// Represents a backline item outside the closed set.
    #[error("{value} is not a valid backline option. Valid values: {valid}")]
    InvalidBackline { value: String, valid: String },

    /// Represents a rating outside the accepted range.
    #[error("Ratings must be between 1 and 5, got {0}")]
    InvalidRating(i16),

    /// Represents query parameters that aren't understood.
    #[error("The following query parameters are not recognised: {}", .0.join(","))]
    UnrecognizedQueryParameters(Vec<String>),

    /// Represents a request body that couldn't be parsed.
    #[error("Couldn't parse payload: {0}")]
    MalformedPayload(#[source] serde_json::Error),

    /// Represents a required field that's absent from a payload.
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    /// Represents a change to the recurrence that doesn't restate it fully.
    #[error("Changing 'interval' or 'start_time_utc' requires both fields to be provided")]
    IncompleteRecurrence,

    /// Represents an unknown table in a `dbcli` command.
    #[error("Available tables: {valid}, got {table}")]
    InvalidTable { table: String, valid: &'static str },

    /// Represents the geocoding service being down or failing.
    #[error("Geocoding service unavailable (status {status:?}): {body}")]
    GeocodingUnavailable { status: Option<u16>, body: String },

    /// Represents an address that the geocoding service can't place.
    #[error("No location found for {address}")]
    NoGeocodingMatch { address: String },

    /// Represents a failure to serialize a payload.
    #[error("Serialization error")]
    Serialization { source: serde_json::Error },

    /// Represents a failure to write to the review queue.
    #[error("Review queue error")]
    QueueWriteFailed { source: io::Error },
}

impl BackendError {
    /// Whether the error originates inside the service rather than in
    /// the request. The details of these aren't shown to callers.
    pub fn is_internal(&self) -> bool {
        use BackendError::*;

        matches!(self, Sqlx { .. } | Serialization { .. } | QueueWriteFailed { .. })
    }
}

impl From<sqlx::Error> for BackendError {
    fn from(source: sqlx::Error) -> Self {
        BackendError::Sqlx { source }
    }
}
