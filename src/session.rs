use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::dates;
use crate::errors::BackendError;
use crate::normalization;
use crate::rating;
use crate::recurrence::{RecurrenceKind, RecurrenceRule};
use crate::tags::Genre;
use crate::venue::{required, Venue, VenueFields};

/// A session as stored, along with the raw values of its ratings.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub id: i32,
    pub name: String,
    pub venue_id: i32,
    pub description: String,
    pub genres: Vec<Genre>,
    pub duration_minutes: i16,
    pub recurrence: RecurrenceRule,
    pub website: Option<String>,
    pub updated_at: OffsetDateTime,
    pub ratings: Vec<i16>,
}

impl Session {
    /// The display rating.
    pub fn rating(&self) -> Option<f64> {
        rating::aggregate(&self.ratings)
    }

    /// Applies a patch, replacing every field present in it. Callers
    /// must have checked the patch with [`SessionFields::validate_patch`].
    pub fn apply(&mut self, fields: SessionFields, updated_at: OffsetDateTime) {
        if let (Some(kind), Some(anchor)) = (fields.interval, fields.start_time_utc) {
            self.recurrence = RecurrenceRule::new(kind, anchor);
        }

        if let Some(name) = fields.name {
            self.name = name;
        }
        if let Some(venue_id) = fields.venue {
            self.venue_id = venue_id;
        }
        if let Some(description) = fields.description {
            self.description = description;
        }
        if let Some(genres) = fields.genres {
            self.genres = genres;
        }
        if let Some(duration_minutes) = fields.duration_minutes {
            self.duration_minutes = duration_minutes;
        }
        if let Some(website) = fields.website {
            self.website = Some(website);
        }

        self.updated_at = updated_at;
    }
}

/// A session joined with its venue, as returned by every session read.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionWithVenue {
    pub session: Session,
    pub venue: Venue,
}

/// Session fields as submitted, every one optional.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SessionFields {
    #[serde(
        rename = "session_name",
        default,
        deserialize_with = "normalization::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<Genre>>,
    #[serde(default, with = "dates::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub start_time_utc: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<RecurrenceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i16>,
    #[serde(rename = "session_website", default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl SessionFields {
    /// The recurrence is replaced as a whole or not at all.
    pub fn validate_patch(&self) -> Result<(), BackendError> {
        match (&self.interval, &self.start_time_utc) {
            (Some(_), None) | (None, Some(_)) => Err(BackendError::IncompleteRecurrence),
            _ => Ok(()),
        }
    }

    /// Checks the fields a new session needs. The venue may be left
    /// out when a new venue is proposed along with the session.
    pub fn validate_insert(&self, with_new_venue: bool) -> Result<(), BackendError> {
        required(&self.name, "session_name")?;
        required(&self.interval, "interval")?;
        required(&self.start_time_utc, "start_time_utc")?;
        required(&self.duration_minutes, "duration_minutes")?;

        if !with_new_venue {
            required(&self.venue, "venue")?;
        }

        Ok(())
    }
}

/// A validated session ready to be inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewSession {
    pub name: String,
    pub venue_id: i32,
    pub description: String,
    pub genres: Vec<Genre>,
    pub duration_minutes: i16,
    pub recurrence: RecurrenceRule,
    pub website: Option<String>,
}

impl NewSession {
    pub fn from_fields(fields: SessionFields) -> Result<Self, BackendError> {
        fields.validate_insert(false)?;

        Ok(NewSession {
            name: required(&fields.name, "session_name")?,
            venue_id: required(&fields.venue, "venue")?,
            description: fields.description.unwrap_or_default(),
            genres: fields.genres.unwrap_or_default(),
            duration_minutes: required(&fields.duration_minutes, "duration_minutes")?,
            recurrence: RecurrenceRule::new(
                required(&fields.interval, "interval")?,
                required(&fields.start_time_utc, "start_time_utc")?,
            ),
            website: fields.website,
        })
    }

    pub fn into_session(self, id: i32, updated_at: OffsetDateTime) -> Session {
        Session {
            id,
            name: self.name,
            venue_id: self.venue_id,
            description: self.description,
            genres: self.genres,
            duration_minutes: self.duration_minutes,
            recurrence: self.recurrence,
            website: self.website,
            updated_at,
            ratings: vec![],
        }
    }
}

/// The body of a session proposal: the session, optionally a new venue
/// to create along with it, and notes for the reviewer.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionSubmission {
    #[serde(flatten)]
    pub session: SessionFields,
    #[serde(flatten)]
    pub venue: VenueFields,
    #[serde(default)]
    pub submission_notes: Option<String>,
    #[serde(default)]
    pub submission_email: Option<String>,
}

impl SessionSubmission {
    /// Whether the submission proposes a new venue.
    pub fn has_new_venue(&self) -> bool {
        !self.venue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::parse_timestamp;
    use crate::recurrence::Nth;

    #[test]
    fn fields_use_the_wire_names() {
        let fields: SessionFields = serde_json::from_str(
            r#"{"session_name":"Monday Jam","venue":3,"genres":["Jazz-Funk"],"start_time_utc":"2024-08-19T19:30:00Z","interval":"ThirdOfMonth","duration_minutes":180}"#,
        )
        .unwrap();

        assert_eq!(fields.interval, Some(RecurrenceKind::NthWeekdayOfMonth(Nth::Third)));
        assert_eq!(fields.venue, Some(3));

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["start_time_utc"], "2024-08-19T19:30:00Z");
        assert_eq!(json["interval"], "ThirdOfMonth");
        assert!(json.get("description").is_none());
    }

    #[test]
    fn invalid_intervals_fail_to_parse() {
        let result = serde_json::from_str::<SessionFields>(r#"{"interval":"Monthly"}"#);

        assert!(result.is_err());
    }

    #[test]
    fn patches_must_restate_the_whole_recurrence() {
        let only_interval = SessionFields {
            interval: Some(RecurrenceKind::Weekly),
            ..Default::default()
        };
        assert!(matches!(
            only_interval.validate_patch(),
            Err(BackendError::IncompleteRecurrence)
        ));

        let both = SessionFields {
            start_time_utc: Some(parse_timestamp("2024-08-19T19:30:00Z").unwrap()),
            ..only_interval
        };
        assert!(both.validate_patch().is_ok());
        assert!(SessionFields::default().validate_patch().is_ok());
    }

    #[test]
    fn submissions_split_session_and_venue_fields() {
        let submission: SessionSubmission = serde_json::from_str(
            r#"{"session_name":"Jam","interval":"Weekly","start_time_utc":"2024-08-18T19:30:00Z","duration_minutes":120,"venue_name":"The Harrison","address_first_line":"28 Harrison Street","city":"London","postcode":"WC1H 8JF","submission_notes":"Runs every Sunday","submission_email":"host@example.com"}"#,
        )
        .unwrap();

        assert!(submission.has_new_venue());
        assert_eq!(submission.venue.name.as_deref(), Some("The Harrison"));
        assert_eq!(submission.session.name.as_deref(), Some("Jam"));
        assert!(submission.session.validate_insert(true).is_ok());
        assert!(matches!(
            submission.session.validate_insert(false),
            Err(BackendError::MissingField("venue"))
        ));
        assert_eq!(submission.submission_notes.as_deref(), Some("Runs every Sunday"));
    }

    #[test]
    fn new_sessions_start_without_ratings() {
        let fields = SessionFields {
            name: Some("Jam".to_owned()),
            venue: Some(1),
            interval: Some(RecurrenceKind::Daily),
            start_time_utc: Some(parse_timestamp("2024-08-19T19:30:00Z").unwrap()),
            duration_minutes: Some(90),
            ..Default::default()
        };

        let session = NewSession::from_fields(fields)
            .unwrap()
            .into_session(7, OffsetDateTime::unix_epoch());

        assert_eq!(session.id, 7);
        assert_eq!(session.rating(), None);
        assert_eq!(session.recurrence.kind(), RecurrenceKind::Daily);
    }
}
