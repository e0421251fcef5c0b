use std::sync::Arc;

use log::{error, Logger};
use warp::http::StatusCode;
use warp::reject;
use warp::reply::{json, with_status, Json, Reply, WithStatus};
use warp::Filter;

use crate::environment::Environment;
use crate::errors::BackendError;

pub mod admin;
mod handlers;
mod query;
mod rejection;
mod response;

pub use internal::*;

/// The largest request body to accept. Submissions are small JSON
/// documents, so anything bigger is a mistake.
const MAX_CONTENT_LENGTH: u64 = 64 * 1024;

pub async fn format_rejection(
    logger: Arc<Logger>,
    rej: reject::Rejection,
) -> Result<WithStatus<Json>, reject::Rejection> {
    if let Some(r) = rej.find::<rejection::Rejection>() {
        let e = &r.error;
        error!(logger, "Backend error"; "context" => ?r.context, "error" => ?r.error, "status" => %status_code_for(e), "message" => %r.error);
        let flattened = r.flatten();

        return Ok(with_status(json(&flattened), status_code_for(e)));
    }

    Err(rej)
}

fn status_code_for(e: &BackendError) -> StatusCode {
    use BackendError::*;

    match e {
        InvalidId(..)
        | InvalidDate(..)
        | InvertedDateRange { .. }
        | DateRangeTooLong { .. }
        | InvalidTimestamp(..)
        | InvalidRecurrenceKind { .. }
        | InvalidGenre { .. }
        | InvalidBackline { .. }
        | InvalidRating(..)
        | UnrecognizedQueryParameters(..)
        | MalformedPayload(..)
        | MissingField(..)
        | IncompleteRecurrence
        | InvalidTable { .. } => StatusCode::BAD_REQUEST,
        NonExistentId(..) => StatusCode::NOT_FOUND,
        NoGeocodingMatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        GeocodingUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Sqlx { .. } | Serialization { .. } | QueueWriteFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Every route of the public API, with errors formatted as JSON.
pub fn make_api_routes(
    environment: Environment,
) -> impl Filter<Extract = (impl Reply,), Error = reject::Rejection> + Clone {
    let logger = environment.logger.clone();

    make_index_route(environment.clone())
        .or(make_venues_route(environment.clone()))
        .or(make_venue_route(environment.clone()))
        .or(make_venue_sessions_route(environment.clone()))
        .or(make_propose_venue_route(environment.clone()))
        .or(make_update_venue_route(environment.clone()))
        .or(make_delete_venue_route(environment.clone()))
        .or(make_sessions_route(environment.clone()))
        .or(make_session_route(environment.clone()))
        .or(make_propose_session_route(environment.clone()))
        .or(make_update_session_route(environment.clone()))
        .or(make_delete_session_route(environment.clone()))
        .or(make_comments_route(environment.clone()))
        .or(make_propose_comment_route(environment.clone()))
        .or(make_suggestion_route(environment))
        .recover(move |r| format_rejection(logger.clone(), r))
        .with(cors())
}

/// The web frontend is served from a different origin.
fn cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "POST", "PATCH", "DELETE"])
        .allow_header("content-type")
}

mod internal {
    use std::collections::HashMap;

    use warp::body::{bytes, content_length_limit};
    use warp::filters::BoxedFilter;
    use warp::path::end;
    use warp::Filter;
    use warp::Reply;
    use warp::{delete, get as g, patch, path as p, path::param as par, post, query};

    use super::{handlers, MAX_CONTENT_LENGTH};
    use crate::environment::Environment;

    type Route = BoxedFilter<(Box<dyn Reply>,)>;

    const API_PREFIX: &str = "v1";

    macro_rules! route_filter {
    ($route_variable:ident; $first:expr) => (let $route_variable = $route_variable.and($first););
    ($route_variable:ident; $first:expr, $($rest:expr),+) => (
        let $route_variable = $route_variable.and($first);
        route_filter!($route_variable; $($rest),+);
    )
}

    macro_rules! route {
    ($name:ident => $handler:ident, $route_variable:ident; $($filters:expr),+) => (
        pub fn $name(environment: Environment) -> Route {
            let $route_variable = warp::any()
                .map(move || environment.clone())
                .and(p(API_PREFIX));

            route_filter!($route_variable; $($filters),+);

            $route_variable.and_then(handlers::$handler)
                .boxed()
        }
    );
}

    route!(make_index_route => index, rt; end(), g());
    route!(make_venues_route => venues, rt; p("venues"), end(), g());
    route!(make_venue_route => venue, rt; p("venues"), par::<String>(), end(), g());
    route!(make_venue_sessions_route => venue_sessions, rt; p("venues"), par::<String>(), p("jamsessions"), end(), g());
    route!(make_propose_venue_route => propose_venue, rt; p("venues"), end(), post(), content_length_limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_update_venue_route => update_venue, rt; p("venues"), par::<String>(), end(), patch(), content_length_limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_delete_venue_route => delete_venue, rt; p("venues"), par::<String>(), end(), delete());
    route!(make_sessions_route => sessions, rt; p("jamsessions"), end(), g(), query::<HashMap<String, String>>());
    route!(make_session_route => session, rt; p("jamsessions"), par::<String>(), end(), g());
    route!(make_propose_session_route => propose_session, rt; p("jamsessions"), end(), post(), content_length_limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_update_session_route => update_session, rt; p("jamsessions"), par::<String>(), end(), patch(), content_length_limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_delete_session_route => delete_session, rt; p("jamsessions"), par::<String>(), end(), delete());
    route!(make_comments_route => comments, rt; p("jamsessions"), par::<String>(), p("comments"), end(), g());
    route!(make_propose_comment_route => propose_comment, rt; p("jamsessions"), par::<String>(), p("comments"), end(), post(), content_length_limit(MAX_CONTENT_LENGTH), bytes());
    route!(make_suggestion_route => suggest, rt; p("jamsessions"), par::<String>(), p("suggestions"), end(), post(), content_length_limit(MAX_CONTENT_LENGTH), bytes());
}
