pub mod apply;
pub mod comment;
pub mod config;
pub mod dates;
pub mod db;
pub mod environment;
pub mod errors;
pub mod geocoding;
pub mod geojson;
pub mod matcher;
pub mod normalization;
pub mod projection;
pub mod queue;
pub mod rating;
pub mod recurrence;
pub mod routes;
pub mod session;
pub mod tags;
pub mod venue;
