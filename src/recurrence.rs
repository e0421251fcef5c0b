use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, UtcOffset, Weekday};

use crate::errors::BackendError;

/// Which week of the month a monthly session falls in.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Nth {
    First,
    Second,
    Third,
    Fourth,
}

impl Nth {
    /// The 1-based week index.
    pub fn index(self) -> u8 {
        match self {
            Nth::First => 1,
            Nth::Second => 2,
            Nth::Third => 3,
            Nth::Fourth => 4,
        }
    }
}

/// How often a session repeats.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecurrenceKind {
    Once,
    Daily,
    Weekly,
    Fortnightly,
    NthWeekdayOfMonth(Nth),
    LastWeekdayOfMonth,
}

impl RecurrenceKind {
    pub const ALL: &'static [RecurrenceKind] = &[
        RecurrenceKind::Once,
        RecurrenceKind::Daily,
        RecurrenceKind::Weekly,
        RecurrenceKind::Fortnightly,
        RecurrenceKind::NthWeekdayOfMonth(Nth::First),
        RecurrenceKind::NthWeekdayOfMonth(Nth::Second),
        RecurrenceKind::NthWeekdayOfMonth(Nth::Third),
        RecurrenceKind::NthWeekdayOfMonth(Nth::Fourth),
        RecurrenceKind::LastWeekdayOfMonth,
    ];

    pub fn as_str(&self) -> &'static str {
        use RecurrenceKind::*;

        match self {
            Once => "Once",
            Daily => "Daily",
            Weekly => "Weekly",
            Fortnightly => "Fortnightly",
            NthWeekdayOfMonth(Nth::First) => "FirstOfMonth",
            NthWeekdayOfMonth(Nth::Second) => "SecondOfMonth",
            NthWeekdayOfMonth(Nth::Third) => "ThirdOfMonth",
            NthWeekdayOfMonth(Nth::Fourth) => "FourthOfMonth",
            LastWeekdayOfMonth => "LastOfMonth",
        }
    }
}

impl FromStr for RecurrenceKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| BackendError::InvalidRecurrenceKind {
                value: s.to_owned(),
                valid: Self::ALL
                    .iter()
                    .map(|kind| kind.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

impl TryFrom<String> for RecurrenceKind {
    type Error = BackendError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RecurrenceKind> for String {
    fn from(kind: RecurrenceKind) -> String {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for RecurrenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurrence kind together with the first real occurrence. The
/// anchor's weekday drives every weekly and monthly kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecurrenceRule {
    kind: RecurrenceKind,
    anchor: OffsetDateTime,
}

impl RecurrenceRule {
    pub fn new(kind: RecurrenceKind, anchor: OffsetDateTime) -> Self {
        RecurrenceRule {
            kind,
            anchor: anchor.to_offset(UtcOffset::UTC),
        }
    }

    /// Builds a rule from the symbolic kind stored with a session.
    pub fn parse(kind: &str, anchor: OffsetDateTime) -> Result<Self, BackendError> {
        Ok(Self::new(kind.parse()?, anchor))
    }

    pub fn kind(&self) -> RecurrenceKind {
        self.kind
    }

    pub fn anchor(&self) -> OffsetDateTime {
        self.anchor
    }

    /// The calendar date of the first occurrence, in UTC.
    pub fn anchor_date(&self) -> Date {
        self.anchor.date()
    }

    pub fn weekday(&self) -> Weekday {
        self.anchor_date().weekday()
    }
}

#[cfg(test)]
mod tests {
    use time::{Date, Weekday};

    use super::*;
    use crate::dates::parse_timestamp;

    #[test]
    fn wire_names_round_trip() {
        for kind in RecurrenceKind::ALL {
            assert_eq!(kind.as_str().parse::<RecurrenceKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn unknown_kinds_are_rejected() {
        for input in &["weekly", "FifthOfMonth", "IrregularWeekly", ""] {
            match input.parse::<RecurrenceKind>() {
                Err(BackendError::InvalidRecurrenceKind { value, valid }) => {
                    assert_eq!(&value, input);
                    assert!(valid.contains("LastOfMonth"));
                }
                other => panic!("expected InvalidRecurrenceKind for {:?}, got {:?}", input, other),
            }
        }
    }

    #[test]
    fn kinds_deserialize_from_their_wire_names() {
        let kind: RecurrenceKind = serde_json::from_str(r#""ThirdOfMonth""#).unwrap();
        assert_eq!(kind, RecurrenceKind::NthWeekdayOfMonth(Nth::Third));

        assert!(serde_json::from_str::<RecurrenceKind>(r#""Biweekly""#).is_err());
        assert_eq!(
            serde_json::to_string(&RecurrenceKind::LastWeekdayOfMonth).unwrap(),
            r#""LastOfMonth""#
        );
    }

    #[test]
    fn anchor_is_reduced_to_its_utc_date() {
        let anchor = parse_timestamp("2024-08-18T23:30:00-02:00").unwrap();
        let rule = RecurrenceRule::parse("Weekly", anchor).unwrap();

        assert_eq!(rule.anchor_date(), Date::try_from_ymd(2024, 8, 19).unwrap());
        assert_eq!(rule.weekday(), Weekday::Monday);
    }
}
