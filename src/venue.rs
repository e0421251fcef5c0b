use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::errors::BackendError;
use crate::normalization;
use crate::tags::Backline;

/// A WGS84 coordinate pair.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Point {
    pub longitude: f64,
    pub latitude: f64,
}

impl Point {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Point {
            longitude,
            latitude,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Address {
    pub first_line: String,
    pub second_line: Option<String>,
    pub city: String,
    pub postcode: String,
}

impl Address {
    /// The street part of the address as a single line.
    pub fn street(&self) -> String {
        match &self.second_line {
            Some(second_line) => format!("{}, {}", self.first_line, second_line),
            None => self.first_line.clone(),
        }
    }

    /// Overlays the components present in `fields` onto this address.
    pub fn merge(&self, fields: &VenueFields) -> Address {
        Address {
            first_line: fields
                .address_first_line
                .clone()
                .unwrap_or_else(|| self.first_line.clone()),
            second_line: fields
                .address_second_line
                .clone()
                .or_else(|| self.second_line.clone()),
            city: fields.city.clone().unwrap_or_else(|| self.city.clone()),
            postcode: fields.postcode.clone().unwrap_or_else(|| self.postcode.clone()),
        }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}, {}", self.street(), self.city, self.postcode)
    }
}

/// A venue as stored.
#[derive(Clone, Debug, PartialEq)]
pub struct Venue {
    pub id: i32,
    pub name: String,
    pub address: Address,
    pub location: Option<Point>,
    pub website: Option<String>,
    pub backline: Vec<Backline>,
    pub comments: Vec<String>,
    pub updated_at: OffsetDateTime,
}

impl Venue {
    /// Applies a patch, replacing every field present in it. The
    /// location is taken from the patch when it carries one.
    pub fn apply(&mut self, fields: VenueFields, updated_at: OffsetDateTime) {
        self.address = self.address.merge(&fields);

        if let Some(name) = fields.name {
            self.name = name;
        }
        if let Some(website) = fields.website {
            self.website = Some(website);
        }
        if let Some(backline) = fields.backline {
            self.backline = backline;
        }
        if let Some(comments) = fields.comments {
            self.comments = comments;
        }
        if let Some(location) = fields.location {
            self.location = Some(location);
        }

        self.updated_at = updated_at;
    }
}

/// Venue fields as submitted, every one optional. Used both for
/// proposals and for the payloads embedded in review scripts.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct VenueFields {
    #[serde(
        rename = "venue_name",
        default,
        deserialize_with = "normalization::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_first_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_second_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    #[serde(rename = "venue_website", default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backline: Option<Vec<Backline>>,
    #[serde(rename = "venue_comments", default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Point>,
}

impl VenueFields {
    /// Whether any address component is present.
    pub fn touches_address(&self) -> bool {
        self.address_first_line.is_some()
            || self.address_second_line.is_some()
            || self.city.is_some()
            || self.postcode.is_some()
    }

    pub fn is_empty(&self) -> bool {
        *self == VenueFields::default()
    }

    /// The complete address, for new venues.
    pub fn address(&self) -> Result<Address, BackendError> {
        Ok(Address {
            first_line: required(&self.address_first_line, "address_first_line")?,
            second_line: self.address_second_line.clone(),
            city: required(&self.city, "city")?,
            postcode: required(&self.postcode, "postcode")?,
        })
    }

    /// Checks that a new venue can be built from these fields.
    pub fn validate_insert(&self) -> Result<(), BackendError> {
        required(&self.name, "venue_name")?;
        self.address()?;

        Ok(())
    }
}

/// A validated venue ready to be inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct NewVenue {
    pub name: String,
    pub address: Address,
    pub location: Option<Point>,
    pub website: Option<String>,
    pub backline: Vec<Backline>,
    pub comments: Vec<String>,
}

impl NewVenue {
    pub fn from_fields(fields: VenueFields) -> Result<Self, BackendError> {
        let address = fields.address()?;

        Ok(NewVenue {
            name: required(&fields.name, "venue_name")?,
            address,
            location: fields.location,
            website: fields.website,
            backline: fields.backline.unwrap_or_default(),
            comments: fields.comments.unwrap_or_default(),
        })
    }

    pub fn into_venue(self, id: i32, updated_at: OffsetDateTime) -> Venue {
        Venue {
            id,
            name: self.name,
            address: self.address,
            location: self.location,
            website: self.website,
            backline: self.backline,
            comments: self.comments,
            updated_at,
        }
    }
}

pub(crate) fn required<T: Clone>(field: &Option<T>, name: &'static str) -> Result<T, BackendError> {
    field.clone().ok_or(BackendError::MissingField(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            first_line: "47 Frith Street".to_owned(),
            second_line: None,
            city: "London".to_owned(),
            postcode: "W1D 4HT".to_owned(),
        }
    }

    #[test]
    fn fields_use_the_wire_names() {
        let fields: VenueFields = serde_json::from_str(
            r#"{"venue_name":"  Ronnie Scott's ","address_first_line":"47 Frith Street","city":"London","postcode":"W1D 4HT","backline":["PA","Drums"],"venue_comments":["Sign up at the start"]}"#,
        )
        .unwrap();

        assert_eq!(fields.name.as_deref(), Some("Ronnie Scott's"));
        assert_eq!(fields.backline, Some(vec![Backline::Pa, Backline::Drums]));
        assert!(fields.touches_address());

        let json = serde_json::to_value(&fields).unwrap();
        assert_eq!(json["venue_name"], "Ronnie Scott's");
        assert!(json.get("venue_website").is_none());
    }

    #[test]
    fn new_venues_need_a_name_and_a_full_address() {
        let fields = VenueFields {
            name: Some("The Harrison".to_owned()),
            address_first_line: Some("28 Harrison Street".to_owned()),
            city: Some("London".to_owned()),
            ..Default::default()
        };

        match NewVenue::from_fields(fields.clone()) {
            Err(BackendError::MissingField("postcode")) => {}
            other => panic!("expected missing postcode, got {:?}", other),
        }

        let fields = VenueFields {
            postcode: Some("WC1H 8JF".to_owned()),
            ..fields
        };
        let venue = NewVenue::from_fields(fields).unwrap();
        assert_eq!(venue.address.street(), "28 Harrison Street");
        assert!(venue.backline.is_empty());
    }

    #[test]
    fn merging_keeps_components_missing_from_the_patch() {
        let patch = VenueFields {
            address_second_line: Some("Soho".to_owned()),
            postcode: Some("W1D 4HS".to_owned()),
            ..Default::default()
        };

        let merged = address().merge(&patch);

        assert_eq!(merged.street(), "47 Frith Street, Soho");
        assert_eq!(merged.city, "London");
        assert_eq!(merged.postcode, "W1D 4HS");
        assert_eq!(merged.to_string(), "47 Frith Street, Soho, London, W1D 4HS");
    }

    #[test]
    fn patches_replace_present_fields_only() {
        let mut venue = NewVenue {
            name: "Old name".to_owned(),
            address: address(),
            location: None,
            website: None,
            backline: vec![Backline::Pa],
            comments: vec![],
        }
        .into_venue(1, OffsetDateTime::unix_epoch());

        let now = OffsetDateTime::now_utc();
        venue.apply(
            VenueFields {
                name: Some("New name".to_owned()),
                location: Some(Point::new(-0.132, 51.513)),
                ..Default::default()
            },
            now,
        );

        assert_eq!(venue.name, "New name");
        assert_eq!(venue.backline, vec![Backline::Pa]);
        assert_eq!(venue.location, Some(Point::new(-0.132, 51.513)));
        assert_eq!(venue.updated_at, now);
    }
}
