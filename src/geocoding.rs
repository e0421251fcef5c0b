//! Address lookup against a Nominatim instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt};
use log::{debug, warn, Logger};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use crate::errors::BackendError;
use crate::venue::{Address, Point};

pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org/";

/// Nominatim's usage policy allows one request per second.
const MIN_INTERVAL: Duration = Duration::from_secs(1);
const TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_USER_AGENT: &str = concat!("jamsessions/", env!("CARGO_PKG_VERSION"));
const COUNTRY: &str = "UK";

/// Resolves addresses to coordinates.
pub trait Geocoder {
    fn geocode<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<Point, BackendError>>;
}

/// Spaces out calls so that consecutive ones start at least
/// `min_interval` apart.
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    features: Vec<SearchFeature>,
}

#[derive(Debug, Deserialize)]
struct SearchFeature {
    geometry: SearchGeometry,
}

#[derive(Debug, Deserialize)]
struct SearchGeometry {
    coordinates: Vec<f64>,
}

pub struct NominatimClient {
    client: Client,
    base_url: Url,
    limiter: RateLimiter,
    logger: Arc<Logger>,
}

impl NominatimClient {
    pub fn new(base_url: Url, user_agent: &str, logger: Arc<Logger>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(TIMEOUT)
            .build()
            .map_err(unavailable)?;

        Ok(Self {
            client,
            base_url,
            limiter: RateLimiter::new(MIN_INTERVAL),
            logger,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url.join(path).map_err(|e| BackendError::GeocodingUnavailable {
            status: None,
            body: e.to_string(),
        })
    }

    fn search_url(&self, address: &Address) -> Result<Url, BackendError> {
        let mut url = self.endpoint("search")?;

        url.query_pairs_mut()
            .append_pair("street", &address.street())
            .append_pair("city", &address.city)
            .append_pair("country", COUNTRY)
            .append_pair("postcode", &address.postcode)
            .append_pair("format", "geojson")
            .append_pair("limit", "1");

        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<String, BackendError> {
        self.limiter.wait().await;

        let response = self.client.get(url).send().await.map_err(unavailable)?;
        let status = response.status();
        let body = response.text().await.map_err(unavailable)?;

        if status != StatusCode::OK {
            return Err(BackendError::GeocodingUnavailable {
                status: Some(status.as_u16()),
                body,
            });
        }

        Ok(body)
    }

    async fn lookup(&self, address: &Address) -> Result<Point, BackendError> {
        let status = self.endpoint("status")?;
        self.get(status).await?;

        let url = self.search_url(address)?;
        debug!(self.logger, "Geocoding address"; "url" => url.as_str());

        let body = self.get(url).await?;
        let point = parse_search_response(&body, address);

        if let Err(e) = &point {
            warn!(self.logger, "Geocoding failed"; "address" => address.to_string(), "error" => e.to_string());
        }

        point
    }
}

impl Geocoder for NominatimClient {
    fn geocode<'a>(&'a self, address: &'a Address) -> BoxFuture<'a, Result<Point, BackendError>> {
        self.lookup(address).boxed()
    }
}

fn unavailable(e: reqwest::Error) -> BackendError {
    BackendError::GeocodingUnavailable {
        status: e.status().map(|s| s.as_u16()),
        body: e.to_string(),
    }
}

/// Takes the first feature of a GeoJSON search result. Coordinates
/// come longitude first.
fn parse_search_response(body: &str, address: &Address) -> Result<Point, BackendError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| BackendError::GeocodingUnavailable {
            status: Some(StatusCode::OK.as_u16()),
            body: e.to_string(),
        })?;

    response
        .features
        .into_iter()
        .find_map(|feature| match feature.geometry.coordinates[..] {
            [longitude, latitude, ..] => Some(Point::new(longitude, latitude)),
            _ => None,
        })
        .ok_or_else(|| BackendError::NoGeocodingMatch {
            address: address.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            first_line: "47 Frith Street".to_owned(),
            second_line: Some("Soho".to_owned()),
            city: "London".to_owned(),
            postcode: "W1D 4HT".to_owned(),
        }
    }

    fn client() -> NominatimClient {
        NominatimClient::new(
            Url::parse("http://localhost:8088/nominatim/").unwrap(),
            DEFAULT_USER_AGENT,
            Arc::new(log::discard_logger()),
        )
        .unwrap()
    }

    #[test]
    fn first_feature_gives_the_location() {
        let body = r#"{
            "type": "FeatureCollection",
            "licence": "ODbL",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [-0.1318, 51.5133]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}}
            ]
        }"#;

        assert_eq!(
            parse_search_response(body, &address()).unwrap(),
            Point::new(-0.1318, 51.5133)
        );
    }

    #[test]
    fn no_features_is_no_match() {
        let body = r#"{"type": "FeatureCollection", "features": []}"#;

        match parse_search_response(body, &address()) {
            Err(BackendError::NoGeocodingMatch { address }) => {
                assert_eq!(address, "47 Frith Street, Soho, London, W1D 4HT")
            }
            other => panic!("expected NoGeocodingMatch, got {:?}", other),
        }
    }

    #[test]
    fn malformed_responses_mean_the_service_is_broken() {
        assert!(matches!(
            parse_search_response("<html>", &address()),
            Err(BackendError::GeocodingUnavailable { status: Some(200), .. })
        ));
    }

    #[test]
    fn search_urls_carry_the_address() {
        let url = client().search_url(&address()).unwrap();

        assert_eq!(url.path(), "/nominatim/search");

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("street".to_owned(), "47 Frith Street, Soho".to_owned()),
                ("city".to_owned(), "London".to_owned()),
                ("country".to_owned(), "UK".to_owned()),
                ("postcode".to_owned(), "W1D 4HT".to_owned()),
                ("format".to_owned(), "geojson".to_owned()),
                ("limit".to_owned(), "1".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_services_are_unavailable() {
        let client = NominatimClient::new(
            Url::parse("http://127.0.0.1:9/").unwrap(),
            DEFAULT_USER_AGENT,
            Arc::new(log::discard_logger()),
        )
        .unwrap();

        assert!(matches!(
            client.geocode(&address()).await,
            Err(BackendError::GeocodingUnavailable { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn limiter_spaces_out_calls() {
        let interval = Duration::from_millis(50);
        let limiter = RateLimiter::new(interval);
        let start = Instant::now();

        limiter.wait().await;
        assert!(start.elapsed() < interval);

        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= interval * 2);
    }
}
