//! GeoJSON views of venues and sessions.

use serde::Serialize;
use time::OffsetDateTime;

use crate::dates;
use crate::matcher::MatchedSession;
use crate::recurrence::RecurrenceKind;
use crate::tags::{Backline, Genre};
use crate::venue::{Point, Venue};

#[derive(Debug, Serialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    kind: &'static str,
    coordinates: [f64; 2],
}

impl From<Point> for Geometry {
    fn from(point: Point) -> Self {
        Geometry {
            kind: "Point",
            coordinates: [point.longitude, point.latitude],
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Feature<P> {
    #[serde(rename = "type")]
    kind: &'static str,
    properties: P,
    geometry: Option<Geometry>,
}

impl<P> Feature<P> {
    fn new(properties: P, location: Option<Point>) -> Self {
        Feature {
            kind: "Feature",
            properties,
            geometry: location.map(Geometry::from),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeatureCollection<P> {
    #[serde(rename = "type")]
    kind: &'static str,
    features: Vec<Feature<P>>,
}

impl<P> FeatureCollection<P> {
    fn new(features: Vec<Feature<P>>) -> Self {
        FeatureCollection {
            kind: "FeatureCollection",
            features,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VenueProperties<'a> {
    venue_id: i32,
    venue_name: &'a str,
    address_first_line: &'a str,
    address_second_line: Option<&'a str>,
    city: &'a str,
    postcode: &'a str,
    venue_website: Option<&'a str>,
    backline: &'a [Backline],
    venue_comments: &'a [String],
    #[serde(with = "dates::rfc3339")]
    venue_dt_updated_utc: OffsetDateTime,
}

impl<'a> From<&'a Venue> for VenueProperties<'a> {
    fn from(venue: &'a Venue) -> Self {
        VenueProperties {
            venue_id: venue.id,
            venue_name: &venue.name,
            address_first_line: &venue.address.first_line,
            address_second_line: venue.address.second_line.as_deref(),
            city: &venue.address.city,
            postcode: &venue.address.postcode,
            venue_website: venue.website.as_deref(),
            backline: &venue.backline,
            venue_comments: &venue.comments,
            venue_dt_updated_utc: venue.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionProperties<'a> {
    session_id: i32,
    session_name: &'a str,
    venue: i32,
    description: &'a str,
    genres: &'a [Genre],
    #[serde(with = "dates::rfc3339")]
    start_time_utc: OffsetDateTime,
    interval: RecurrenceKind,
    duration_minutes: i16,
    session_website: Option<&'a str>,
    #[serde(with = "dates::rfc3339")]
    dt_updated_utc: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dates: Option<Vec<String>>,
    #[serde(flatten)]
    venue_properties: VenueProperties<'a>,
}

impl<'a> From<&'a MatchedSession> for SessionProperties<'a> {
    fn from(matched: &'a MatchedSession) -> Self {
        let session = &matched.session.session;

        SessionProperties {
            session_id: session.id,
            session_name: &session.name,
            venue: session.venue_id,
            description: &session.description,
            genres: &session.genres,
            start_time_utc: session.recurrence.anchor(),
            interval: session.recurrence.kind(),
            duration_minutes: session.duration_minutes,
            session_website: session.website.as_deref(),
            dt_updated_utc: session.updated_at,
            rating: session.rating(),
            dates: matched
                .dates
                .as_ref()
                .map(|dates| dates.iter().copied().map(dates::format_date).collect()),
            venue_properties: VenueProperties::from(&matched.session.venue),
        }
    }
}

pub fn venue_feature(venue: &Venue) -> Feature<VenueProperties<'_>> {
    Feature::new(VenueProperties::from(venue), venue.location)
}

pub fn venue_collection(venues: &[Venue]) -> FeatureCollection<VenueProperties<'_>> {
    FeatureCollection::new(venues.iter().map(venue_feature).collect())
}

pub fn session_feature(matched: &MatchedSession) -> Feature<SessionProperties<'_>> {
    Feature::new(
        SessionProperties::from(matched),
        matched.session.venue.location,
    )
}

pub fn session_collection(matched: &[MatchedSession]) -> FeatureCollection<SessionProperties<'_>> {
    FeatureCollection::new(matched.iter().map(session_feature).collect())
}
