use std::sync::Arc;

use log::Logger;

use crate::db::Db;
use crate::geocoding::Geocoder;
use crate::queue::ReviewQueue;

#[derive(Clone)]
pub struct Environment {
    pub logger: Arc<Logger>,
    pub db: Arc<dyn Db + Send + Sync>,
    pub queue: Arc<dyn ReviewQueue + Send + Sync>,
    pub geocoder: Arc<dyn Geocoder + Send + Sync>,
    pub config: Config,
}

impl Environment {
    pub fn new(
        logger: Arc<Logger>,
        db: Arc<dyn Db + Send + Sync>,
        queue: Arc<dyn ReviewQueue + Send + Sync>,
        geocoder: Arc<dyn Geocoder + Send + Sync>,
        config: Config,
    ) -> Self {
        Self {
            logger,
            db,
            queue,
            geocoder,
            config,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Whether venue proposals are geocoded before they're queued.
    pub(crate) geocode_proposals: bool,
}

impl Config {
    pub fn new(geocode_proposals: bool) -> Self {
        Self { geocode_proposals }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(true)
    }
}
