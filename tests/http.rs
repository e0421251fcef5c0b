use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;

use jamsessions::dates::parse_timestamp;
use jamsessions::db::memory::MemoryDb;
use jamsessions::db::Db;
use jamsessions::environment::{Config, Environment};
use jamsessions::errors::BackendError;
use jamsessions::geocoding::Geocoder;
use jamsessions::queue::DirectoryQueue;
use jamsessions::recurrence::RecurrenceRule;
use jamsessions::routes;
use jamsessions::session::NewSession;
use jamsessions::tags::{Backline, Genre};
use jamsessions::venue::{Address, NewVenue, Point};

const LOCATION: [f64; 2] = [-0.1318, 51.5133];

enum StubGeocoder {
    Found,
    Unavailable,
    NoMatch,
}

impl Geocoder for StubGeocoder {
    fn geocode<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<Point, BackendError>> {
        let result = match self {
            StubGeocoder::Found => Ok(Point::new(LOCATION[0], LOCATION[1])),
            StubGeocoder::Unavailable => Err(BackendError::GeocodingUnavailable {
                status: Some(503),
                body: "down for maintenance".to_owned(),
            }),
            StubGeocoder::NoMatch => Err(BackendError::NoGeocodingMatch {
                address: address.to_string(),
            }),
        };

        future::ready(result).boxed()
    }
}

struct Harness {
    environment: Environment,
    directory: TempDir,
    venues: Vec<i32>,
    sessions: Vec<i32>,
}

impl Harness {
    async fn new(geocoder: StubGeocoder) -> Self {
        let directory = tempfile::tempdir().expect("create temporary directory");
        let db = Arc::new(MemoryDb::new());

        let mut venues = vec![];
        for (name, backline) in &[
            ("The Harrison", vec![Backline::Pa, Backline::Drums]),
            ("The Oxford", vec![Backline::Pa]),
        ] {
            venues.push(db.insert_venue(new_venue(name, backline.clone())).await.unwrap());
        }

        let mut sessions = vec![];
        for (name, kind, anchor, genres, venue) in vec![
            ("Sunday", "Weekly", "2024-08-18T19:30:00Z", vec![Genre::StraightAhead], venues[0]),
            ("Monday", "ThirdOfMonth", "2024-08-19T20:00:00Z", vec![Genre::Funk], venues[1]),
            ("Saturday", "LastOfMonth", "2024-08-24T21:00:00Z", vec![Genre::Blues, Genre::Funk], venues[0]),
        ] {
            let session = NewSession {
                name: name.to_owned(),
                venue_id: venue,
                description: String::new(),
                genres,
                duration_minutes: 180,
                recurrence: RecurrenceRule::parse(kind, parse_timestamp(anchor).unwrap()).unwrap(),
                website: None,
            };
            sessions.push(db.insert_session(session).await.unwrap());
        }

        let queue = Arc::new(DirectoryQueue::new(
            directory.path().join("scripts"),
            directory.path().join("suggestions"),
            "dbcli",
        ));

        let environment = Environment::new(
            Arc::new(log::discard_logger()),
            db,
            queue,
            Arc::new(geocoder),
            Config::new(true),
        );

        Harness {
            environment,
            directory,
            venues,
            sessions,
        }
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = warp::test::request().method(method).path(path);

        if let Some(body) = body {
            request = request.body(Bytes::from(body.to_string()));
        }

        let response = request
            .reply(&routes::make_api_routes(self.environment.clone()))
            .await;

        let status = response.status();
        let body = if response.body().is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(response.body()).expect("parse response body as JSON")
        };

        (status, body)
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.request("GET", path, None).await
    }

    fn scripts(&self) -> Vec<String> {
        read_all(&self.directory.path().join("scripts"))
    }

    fn suggestions(&self) -> Vec<String> {
        read_all(&self.directory.path().join("suggestions"))
    }
}

fn new_venue(name: &str, backline: Vec<Backline>) -> NewVenue {
    NewVenue {
        name: name.to_owned(),
        address: Address {
            first_line: "28 Harrison Street".to_owned(),
            second_line: None,
            city: "London".to_owned(),
            postcode: "WC1H 8JF".to_owned(),
        },
        location: Some(Point::new(-0.1208, 51.5284)),
        website: None,
        backline,
        comments: vec![],
    }
}

/// The contents of every file in `directory`, in file name order.
fn read_all(directory: &Path) -> Vec<String> {
    if !directory.exists() {
        return vec![];
    }

    let mut paths: Vec<_> = fs::read_dir(directory)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    paths.sort();

    paths.into_iter().map(|path| fs::read_to_string(path).unwrap()).collect()
}

/// The double-quoted payload at the end of a script line, as bash would
/// pass it after unescaping and expanding `variables`.
fn shell_payload(line: &str, variables: &[(&str, &str)]) -> String {
    let quoted = &line[line.find('"').unwrap() + 1..line.rfind('"').unwrap()];
    let mut output = String::new();
    let mut chars = quoted.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some('\\') | Some('"') | Some('$') | Some('`')) => {
                output.extend(chars.next());
            }
            '$' => {
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }

                let (_, value) = variables
                    .iter()
                    .find(|(n, _)| *n == name)
                    .unwrap_or_else(|| panic!("unbound variable {}", name));
                output.push_str(value);
            }
            _ => output.push(c),
        }
    }

    output
}

fn session_names(collection: &Value) -> Vec<String> {
    collection["features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["properties"]["session_name"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test]
async fn venues_are_listed_as_geojson() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let response = warp::test::request()
        .path("/v1/venues")
        .reply(&routes::make_api_routes(harness.environment.clone()))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["server-timing"]
        .to_str()
        .unwrap()
        .starts_with("handler;dur="));

    let body: Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(body["type"], "FeatureCollection");
    assert_eq!(body["features"].as_array().unwrap().len(), 2);
    assert_eq!(body["features"][0]["geometry"]["coordinates"], json!([-0.1208, 51.5284]));
}

#[tokio::test]
async fn single_records_are_found_by_id() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let (status, venue) = harness.get(&format!("/v1/venues/{}", harness.venues[1])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(venue["properties"]["venue_name"], "The Oxford");

    let (status, session) = harness.get(&format!("/v1/jamsessions/{}", harness.sessions[0])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["properties"]["session_name"], "Sunday");
    assert_eq!(session["properties"]["venue_name"], "The Harrison");
    assert!(session["properties"].get("dates").is_none());

    let (status, at_venue) = harness
        .get(&format!("/v1/venues/{}/jamsessions", harness.venues[0]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session_names(&at_venue), vec!["Sunday", "Saturday"]);
}

#[tokio::test]
async fn bad_and_missing_ids_are_reported() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let (status, body) = harness.get("/v1/venues/abc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"venue_id": "abc", "message": "Please provide a numeric ID, got: abc"}));

    let (status, _) = harness.get("/v1/venues/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = harness.get("/v1/jamsessions/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = harness.get("/v1/jamsessions/999/comments").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_filters_compose() {
    let harness = Harness::new(StubGeocoder::Found).await;
    let all: BTreeSet<&str> = ["Sunday", "Monday", "Saturday"].iter().copied().collect();
    let order = ["Sunday", "Monday", "Saturday"];

    let dates: Vec<(Option<&str>, BTreeSet<&str>)> = vec![
        (None, all.clone()),
        (Some("2024-11-17"), ["Sunday"].iter().copied().collect()),
        (Some("2024-11-16/2024-11-22"), ["Sunday", "Monday"].iter().copied().collect()),
    ];
    let genre: BTreeSet<&str> = ["Monday", "Saturday"].iter().copied().collect();
    let backline: BTreeSet<&str> = ["Sunday", "Saturday"].iter().copied().collect();

    for (date, by_date) in &dates {
        for &with_genre in &[false, true] {
            for &with_backline in &[false, true] {
                let mut params = vec![];
                let mut expected = by_date.clone();

                if let Some(date) = date {
                    params.push(format!("date={}", date));
                }
                if with_genre {
                    params.push("genre=Funk".to_owned());
                    expected = expected.intersection(&genre).copied().collect();
                }
                if with_backline {
                    params.push("backline=Drums".to_owned());
                    expected = expected.intersection(&backline).copied().collect();
                }

                let path = if params.is_empty() {
                    "/v1/jamsessions".to_owned()
                } else {
                    format!("/v1/jamsessions?{}", params.join("&"))
                };

                let (status, body) = harness.get(&path).await;
                assert_eq!(status, StatusCode::OK, "{}", path);

                let expected: Vec<&str> = order.iter().copied().filter(|n| expected.contains(n)).collect();
                assert_eq!(session_names(&body), expected, "{}", path);

                for feature in body["features"].as_array().unwrap() {
                    assert_eq!(feature["properties"].get("dates").is_some(), date.is_some(), "{}", path);
                }
            }
        }
    }
}

#[tokio::test]
async fn projected_dates_are_attached() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let (_, body) = harness.get("/v1/jamsessions?date=2024-11-01/2024-11-30").await;

    assert_eq!(session_names(&body), vec!["Sunday", "Monday", "Saturday"]);
    assert_eq!(
        body["features"][0]["properties"]["dates"],
        json!(["2024-11-03", "2024-11-10", "2024-11-17", "2024-11-24"])
    );
    assert_eq!(body["features"][1]["properties"]["dates"], json!(["2024-11-18"]));
    assert_eq!(body["features"][2]["properties"]["dates"], json!(["2024-11-30"]));
}

#[tokio::test]
async fn bad_queries_are_rejected() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let (status, body) = harness.get("/v1/jamsessions?when=today&date=2024-11-17").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "The following query parameters are not recognised: when");

    for query in &["date=2024-11-22/2024-11-16", "date=tomorrow", "genre=Polka", "backline=Theremin"] {
        let (status, _) = harness.get(&format!("/v1/jamsessions?{}", query)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", query);
    }

    let (status, body) = harness.get("/v1/jamsessions?date=2000-01-01/2099-12-31").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "The date range 2000-01-01/2099-12-31 is longer than 366 days");
}

#[tokio::test]
async fn cross_origin_requests_are_allowed() {
    let harness = Harness::new(StubGeocoder::Found).await;
    let routes = routes::make_api_routes(harness.environment.clone());

    let preflight = warp::test::request()
        .method("OPTIONS")
        .path("/v1/jamsessions")
        .header("origin", "https://jamsessions.example")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .reply(&routes)
        .await;

    assert_eq!(preflight.status(), StatusCode::OK);
    assert!(preflight.headers().contains_key("access-control-allow-origin"));
    let methods = preflight.headers()["access-control-allow-methods"].to_str().unwrap().to_owned();
    assert!(methods.contains("PATCH"), "{}", methods);

    let response = warp::test::request()
        .path("/v1/venues/999")
        .header("origin", "https://jamsessions.example")
        .reply(&routes)
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn the_version_root_lists_the_resources() {
    let harness = Harness::new(StubGeocoder::Found).await;

    for path in &["/v1", "/v1/"] {
        let (status, body) = harness.get(path).await;

        assert_eq!(status, StatusCode::OK, "{}", path);
        assert_eq!(body["resources"], json!(["/v1/venues", "/v1/jamsessions"]));
    }
}

#[tokio::test]
async fn venue_proposals_are_geocoded_and_queued() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let (status, body) = harness
        .request(
            "POST",
            "/v1/venues",
            Some(json!({
                "venue_name": "Ronnie Scott's",
                "address_first_line": "47 Frith Street",
                "city": "London",
                "postcode": "W1D 4HT",
                "backline": ["PA"]
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "insert_venue_Ronnie_Scott_s");

    let scripts = harness.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].starts_with("#!/usr/bin/env bash\nset -euo pipefail\n"));
    assert!(scripts[0].contains("dbcli insert venue \"{"));
    assert!(scripts[0].contains("\\\"location\\\":{\\\"longitude\\\":-0.1318,\\\"latitude\\\":51.5133}"));
}

#[tokio::test]
async fn unavailable_geocoding_writes_nothing() {
    let harness = Harness::new(StubGeocoder::Unavailable).await;

    let (status, body) = harness
        .request(
            "POST",
            "/v1/venues",
            Some(json!({
                "venue_name": "Ronnie Scott's",
                "address_first_line": "47 Frith Street",
                "city": "London",
                "postcode": "W1D 4HT"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["venue_name"], "Ronnie Scott's");
    assert!(harness.scripts().is_empty());
}

#[tokio::test]
async fn unplaceable_addresses_are_unprocessable() {
    let harness = Harness::new(StubGeocoder::NoMatch).await;

    let (status, _) = harness
        .request(
            "PATCH",
            &format!("/v1/venues/{}", harness.venues[0]),
            Some(json!({"postcode": "ZZ9 9ZZ"})),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(harness.scripts().is_empty());
}

#[tokio::test]
async fn incomplete_venue_proposals_are_rejected() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let (status, body) = harness
        .request("POST", "/v1/venues", Some(json!({"venue_name": "Nowhere"})))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing required field 'address_first_line'");

    let (status, _) = harness.request("POST", "/v1/venues", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sessions_with_new_venues_capture_the_venue_id() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let (status, _) = harness
        .request(
            "POST",
            "/v1/jamsessions",
            Some(json!({
                "session_name": "Late Late Show",
                "start_time_utc": "2024-08-18T23:00:00Z",
                "interval": "Weekly",
                "duration_minutes": 120,
                "genres": ["Straight-Ahead_Jazz"],
                "venue_name": "Ronnie Scott's",
                "address_first_line": "47 Frith Street",
                "city": "London",
                "postcode": "W1D 4HT",
                "submission_notes": "Runs late,\nbring ears",
                "submission_email": "ella@example.com"
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);

    let scripts = harness.scripts();
    assert_eq!(scripts.len(), 1);

    let lines: Vec<&str> = scripts[0].lines().collect();
    assert!(lines.iter().any(|l| l.starts_with("new_venue_id=$(dbcli insert venue \"")));
    assert!(lines
        .iter()
        .any(|l| l.starts_with("dbcli insert session \"") && l.ends_with("\\\"venue\\\":$new_venue_id}\"")));
    assert!(lines.contains(&"# submission notes: Runs late, bring ears"));
    assert!(lines.contains(&"# email: ella@example.com"));
}

#[tokio::test]
async fn sessions_at_unknown_venues_are_not_found() {
    let harness = Harness::new(StubGeocoder::Found).await;

    let (status, _) = harness
        .request(
            "POST",
            "/v1/jamsessions",
            Some(json!({
                "session_name": "Ghost Jam",
                "venue": 999,
                "start_time_utc": "2024-08-18T23:00:00Z",
                "interval": "Weekly",
                "duration_minutes": 120
            })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(harness.scripts().is_empty());
}

#[tokio::test]
async fn recurrence_changes_must_be_complete() {
    let harness = Harness::new(StubGeocoder::Found).await;
    let path = format!("/v1/jamsessions/{}", harness.sessions[0]);

    let (status, body) = harness
        .request("PATCH", &path, Some(json!({"interval": "Daily"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["session_id"], harness.sessions[0].to_string());

    let (status, _) = harness
        .request(
            "PATCH",
            &path,
            Some(json!({"interval": "Daily", "start_time_utc": "2024-09-01T20:00:00Z"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let scripts = harness.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains(&format!("dbcli update session {} \"", harness.sessions[0])));
}

#[tokio::test]
async fn comments_with_ratings_link_the_two() {
    let harness = Harness::new(StubGeocoder::Found).await;
    let session = harness.sessions[1];

    let (status, _) = harness
        .request(
            "POST",
            &format!("/v1/jamsessions/{}/comments", session),
            Some(json!({"author": "Ella", "content": "A \"proper\" jam", "rating": 5})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = harness
        .request(
            "POST",
            &format!("/v1/jamsessions/{}/comments", session),
            Some(json!({"author": "Ella", "content": "Again", "rating": 9})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let scripts = harness.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains("new_comment_id=$(dbcli insert comment \""));
    assert!(scripts[0].contains("A \\\\\\\"proper\\\\\\\" jam"));

    let rating_line = scripts[0]
        .lines()
        .find(|line| line.starts_with("dbcli insert rating "))
        .expect("rating step");
    let rating: Value =
        serde_json::from_str(&shell_payload(rating_line, &[("new_comment_id", "41")])).unwrap();
    assert_eq!(rating, json!({"session": session, "rating": 5, "comment": 41}));
}

#[tokio::test]
async fn suggestions_are_filed_separately() {
    let harness = Harness::new(StubGeocoder::Found).await;
    let session = harness.sessions[2];

    let (status, _) = harness
        .request(
            "POST",
            &format!("/v1/jamsessions/{}/suggestions", session),
            Some(json!({"content": "Moved to the first Saturday"})),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(harness.scripts().is_empty());
    assert_eq!(
        harness.suggestions(),
        vec![format!("Session {}: Moved to the first Saturday\n", session)]
    );
}

#[tokio::test]
async fn deletions_are_queued_not_applied() {
    let harness = Harness::new(StubGeocoder::Found).await;
    let session = harness.sessions[0];

    let (status, _) = harness
        .request("DELETE", &format!("/v1/jamsessions/{}", session), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness.get(&format!("/v1/jamsessions/{}", session)).await;
    assert_eq!(status, StatusCode::OK);

    let scripts = harness.scripts();
    assert_eq!(scripts.len(), 1);
    assert!(scripts[0].contains(&format!("\ndbcli delete session {}\n", session)));
}
