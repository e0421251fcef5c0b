//! Parsing and formatting of calendar dates and UTC timestamps.

use time::{Date, Format, OffsetDateTime, UtcOffset};

use crate::errors::BackendError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<Date, BackendError> {
    let bytes = s.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes.iter().enumerate().all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());

    if !well_formed {
        return Err(BackendError::InvalidDate(s.to_owned()));
    }

    Date::parse(s, DATE_FORMAT).map_err(|_| BackendError::InvalidDate(s.to_owned()))
}

/// Formats a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
}

/// Parses an RFC 3339 timestamp and normalizes it to UTC. Fractional
/// seconds are accepted and truncated.
pub fn parse_timestamp(s: &str) -> Result<OffsetDateTime, BackendError> {
    let invalid = || BackendError::InvalidTimestamp(s.to_owned());

    let parsed = match OffsetDateTime::parse(s, Format::Rfc3339) {
        Ok(parsed) => parsed,
        Err(_) => {
            let stripped = strip_fraction(s).ok_or_else(invalid)?;
            OffsetDateTime::parse(&stripped, Format::Rfc3339).map_err(|_| invalid())?
        }
    };

    Ok(parsed.to_offset(UtcOffset::UTC))
}

/// Formats a timestamp as RFC 3339 in UTC.
pub fn format_timestamp(timestamp: OffsetDateTime) -> String {
    timestamp.to_offset(UtcOffset::UTC).format(TIMESTAMP_FORMAT)
}

/// Removes the fractional seconds from `2024-01-01T19:30:00.123Z`.
fn strip_fraction(s: &str) -> Option<String> {
    let dot = s.find('.')?;
    let rest = &s[dot + 1..];
    let digits = rest.chars().take_while(char::is_ascii_digit).count();

    if digits == 0 {
        return None;
    }

    Some(format!("{}{}", &s[..dot], &rest[digits..]))
}

/// Serde adapter for `OffsetDateTime` as RFC 3339 strings.
pub mod rfc3339 {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_timestamp(&s).map_err(serde::de::Error::custom)
    }

    /// The same for optional fields.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use time::OffsetDateTime;

        pub fn serialize<S: Serializer>(
            value: &Option<OffsetDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<OffsetDateTime>, D::Error> {
            let s: Option<String> = Option::deserialize(deserializer)?;

            s.map(|s| crate::dates::parse_timestamp(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
