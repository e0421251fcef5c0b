use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, info, o};
use serde::de::DeserializeOwned;
use warp::hyper::body::Bytes;
use warp::{
    http::StatusCode,
    reject,
    reply::{json, with_header, with_status, Reply},
};

use crate::comment::{CommentSubmission, NewComment, NewRating, Suggestion};
use crate::environment::Environment;
use crate::errors::BackendError;
use crate::geojson;
use crate::matcher::{self, MatchedSession};
use crate::queue::{Script, Table};
use crate::routes::{
    query,
    rejection::{Context, Rejection},
    response::SuccessResponse,
};
use crate::session::{SessionFields, SessionSubmission};
use crate::venue::VenueFields;

const SERVER_TIMING_HEADER: &str = "server-timing";
const RESOURCES: &[&str] = &["/v1/venues", "/v1/jamsessions"];
type RouteResult = Result<Box<dyn Reply>, reject::Rejection>;

macro_rules! timed {
    ($($expression:stmt);+) => {
        let start = Instant::now();

        let result = { $($expression)+ };

        Ok(Box::new(with_header(
            result,
            SERVER_TIMING_HEADER,
            format_server_timing(start.elapsed()),
        )) as Box<dyn Reply>)
    };
}

pub async fn index(_environment: Environment) -> RouteResult {
    timed! {
        json(&SuccessResponse::Index {
            message: "Please use one of the versioned resources below.",
            resources: RESOURCES,
        })
    }
}

pub async fn venues(environment: Environment) -> RouteResult {
    timed! {
        let venues = environment
            .db
            .venues()
            .await
            .map_err(|e| Rejection::new(Context::venues(), e))?;

        json(&geojson::venue_collection(&venues))
    }
}

pub async fn venue(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::venue(id.clone()), e);

        let venue_id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Retrieving venue..."; "venue_id" => venue_id);

        let venue = environment
            .db
            .venue(venue_id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentId(venue_id)))?;

        json(&geojson::venue_feature(&venue))
    }
}

pub async fn venue_sessions(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::venue_sessions(id.clone()), e);

        let venue_id = parse_id(&id).map_err(error_handler)?;
        require_venue(&environment, venue_id).await.map_err(error_handler)?;

        let sessions = environment
            .db
            .sessions_by_venue(venue_id)
            .await
            .map_err(error_handler)?;
        let matched: Vec<MatchedSession> = sessions.into_iter().map(MatchedSession::unfiltered).collect();

        json(&geojson::session_collection(&matched))
    }
}

pub async fn propose_venue(environment: Environment, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::propose_venue(None), e);

        let mut fields: VenueFields = parse_body(&body).map_err(error_handler)?;

        let venue_name = fields.name.clone();
        let error_handler = |e: BackendError| Rejection::new(Context::propose_venue(venue_name.clone()), e);
        fields.validate_insert().map_err(error_handler)?;

        if fields.location.is_none() && environment.config.geocode_proposals {
            let address = fields.address().map_err(error_handler)?;
            fields.location = Some(environment.geocoder.geocode(&address).await.map_err(error_handler)?);
        };

        let name = venue_name.clone().unwrap_or_default();

        let mut script = Script::new(format!("insert_venue_{}", name));
        script.insert(Table::Venue, &fields).map_err(error_handler)?;

        queue(&environment, script, StatusCode::CREATED).await.map_err(error_handler)?
    }
}

pub async fn update_venue(environment: Environment, id: String, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::update_venue(id.clone()), e);

        let venue_id = parse_id(&id).map_err(error_handler)?;
        let mut fields: VenueFields = parse_body(&body).map_err(error_handler)?;

        if fields.is_empty() {
            return Err(error_handler(BackendError::MissingField("venue fields")).into());
        };

        let venue = environment
            .db
            .venue(venue_id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentId(venue_id)))?;

        if fields.touches_address() && fields.location.is_none() && environment.config.geocode_proposals {
            let address = venue.address.merge(&fields);
            fields.location = Some(environment.geocoder.geocode(&address).await.map_err(error_handler)?);
        };

        let mut script = Script::new(format!("update_venue_{}", venue_id));
        script.update(Table::Venue, venue_id, &fields).map_err(error_handler)?;

        queue(&environment, script, StatusCode::OK).await.map_err(error_handler)?
    }
}

pub async fn delete_venue(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::delete_venue(id.clone()), e);

        let venue_id = parse_id(&id).map_err(error_handler)?;
        require_venue(&environment, venue_id).await.map_err(error_handler)?;

        let mut script = Script::new(format!("delete_venue_{}", venue_id));
        script.delete(Table::Venue, venue_id);

        queue(&environment, script, StatusCode::OK).await.map_err(error_handler)?
    }
}

pub async fn sessions(environment: Environment, params: HashMap<String, String>) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::sessions(), e);

        let filter = query::session_filter(&params).map_err(error_handler)?;
        debug!(environment.logger, "Filtering sessions..."; "filter" => ?filter);

        let sessions = environment.db.sessions().await.map_err(error_handler)?;
        let matched = matcher::apply(sessions, &filter);

        json(&geojson::session_collection(&matched))
    }
}

pub async fn session(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::session(id.clone()), e);

        let session_id = parse_id(&id).map_err(error_handler)?;
        debug!(environment.logger, "Retrieving session..."; "session_id" => session_id);

        let session = environment
            .db
            .session(session_id)
            .await
            .map_err(error_handler)?
            .ok_or_else(|| error_handler(BackendError::NonExistentId(session_id)))?;

        json(&geojson::session_feature(&MatchedSession::unfiltered(session)))
    }
}

pub async fn propose_session(environment: Environment, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::propose_session(None), e);

        let mut submission: SessionSubmission = parse_body(&body).map_err(error_handler)?;

        let session_name = submission.session.name.clone();
        let error_handler = |e: BackendError| Rejection::new(Context::propose_session(session_name.clone()), e);

        let with_new_venue = submission.has_new_venue();
        submission.session.validate_insert(with_new_venue).map_err(error_handler)?;
        let name = session_name.clone().unwrap_or_default();

        let logger = environment.logger.new(o!("session_name" => name.clone()));

        let mut script = if with_new_venue {
            let venue = &mut submission.venue;
            venue.validate_insert().map_err(error_handler)?;

            if venue.location.is_none() && environment.config.geocode_proposals {
                let address = venue.address().map_err(error_handler)?;
                venue.location = Some(environment.geocoder.geocode(&address).await.map_err(error_handler)?);
            };

            let venue_name = venue.name.clone().unwrap_or_default();
            info!(logger, "Proposing session with a new venue"; "venue_name" => &venue_name);

            let mut script = Script::new(format!("insert_venue_{}_session_{}", venue_name, name));
            let captured = script.insert_captured(Table::Venue, &submission.venue).map_err(error_handler)?;
            script
                .insert_referencing(Table::Session, &submission.session, "venue", &captured)
                .map_err(error_handler)?;
            script
        } else {
            let venue_id = submission.session.venue.unwrap_or_default();
            require_venue(&environment, venue_id).await.map_err(error_handler)?;
            info!(logger, "Proposing session"; "venue" => venue_id);

            let mut script = Script::new(format!("insert_session_{}", name));
            script.insert(Table::Session, &submission.session).map_err(error_handler)?;
            script
        };

        if let Some(notes) = &submission.submission_notes {
            script.note("submission notes", notes);
        };
        if let Some(email) = &submission.submission_email {
            script.note("email", email);
        };

        queue(&environment, script, StatusCode::CREATED).await.map_err(error_handler)?
    }
}

pub async fn update_session(environment: Environment, id: String, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::update_session(id.clone()), e);

        let session_id = parse_id(&id).map_err(error_handler)?;
        let fields: SessionFields = parse_body(&body).map_err(error_handler)?;

        if fields == SessionFields::default() {
            return Err(error_handler(BackendError::MissingField("session fields")).into());
        };

        fields.validate_patch().map_err(error_handler)?;
        require_session(&environment, session_id).await.map_err(error_handler)?;

        if let Some(venue_id) = fields.venue {
            require_venue(&environment, venue_id).await.map_err(error_handler)?;
        };

        let mut script = Script::new(format!("update_session_{}", session_id));
        script.update(Table::Session, session_id, &fields).map_err(error_handler)?;

        queue(&environment, script, StatusCode::OK).await.map_err(error_handler)?
    }
}

pub async fn delete_session(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::delete_session(id.clone()), e);

        let session_id = parse_id(&id).map_err(error_handler)?;
        require_session(&environment, session_id).await.map_err(error_handler)?;

        let mut script = Script::new(format!("delete_session_{}", session_id));
        script.delete(Table::Session, session_id);

        queue(&environment, script, StatusCode::OK).await.map_err(error_handler)?
    }
}

pub async fn comments(environment: Environment, id: String) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::comments(id.clone()), e);

        let session_id = parse_id(&id).map_err(error_handler)?;
        require_session(&environment, session_id).await.map_err(error_handler)?;

        let comments = environment
            .db
            .comments(session_id)
            .await
            .map_err(error_handler)?;

        json(&comments)
    }
}

pub async fn propose_comment(environment: Environment, id: String, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::propose_comment(id.clone()), e);

        let session_id = parse_id(&id).map_err(error_handler)?;
        let submission: CommentSubmission = parse_body(&body).map_err(error_handler)?;
        require_session(&environment, session_id).await.map_err(error_handler)?;

        let comment = NewComment {
            session: session_id,
            author: submission.author,
            content: submission.content,
        };

        let mut script = Script::new(format!("insert_comment_session_{}", session_id));

        match submission.rating {
            Some(rating) => {
                let captured = script.insert_captured(Table::Comment, &comment).map_err(error_handler)?;
                let rating = NewRating {
                    session: session_id,
                    rating,
                    comment: None,
                };
                script
                    .insert_referencing(Table::Rating, &rating, "comment", &captured)
                    .map_err(error_handler)?;
            }
            None => script.insert(Table::Comment, &comment).map_err(error_handler)?,
        };

        queue(&environment, script, StatusCode::CREATED).await.map_err(error_handler)?
    }
}

pub async fn suggest(environment: Environment, id: String, body: Bytes) -> RouteResult {
    timed! {
        let error_handler = |e: BackendError| Rejection::new(Context::suggest(id.clone()), e);

        let session_id = parse_id(&id).map_err(error_handler)?;
        let suggestion: Suggestion = parse_body(&body).map_err(error_handler)?;
        require_session(&environment, session_id).await.map_err(error_handler)?;

        let path = environment
            .queue
            .suggest(session_id, suggestion)
            .await
            .map_err(error_handler)?;
        debug!(environment.logger, "Wrote suggestion"; "path" => %path.display());

        with_status(json(&SuccessResponse::queued(&format!("suggestion_session_{}", session_id))), StatusCode::CREATED)
    }
}

fn parse_id(id: &str) -> Result<i32, BackendError> {
    id.parse().map_err(|_| BackendError::InvalidId(id.to_owned()))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, BackendError> {
    serde_json::from_slice(body).map_err(BackendError::MalformedPayload)
}

async fn require_venue(environment: &Environment, venue_id: i32) -> Result<(), BackendError> {
    match environment.db.venue(venue_id).await? {
        Some(_) => Ok(()),
        None => Err(BackendError::NonExistentId(venue_id)),
    }
}

async fn require_session(environment: &Environment, session_id: i32) -> Result<(), BackendError> {
    match environment.db.session(session_id).await? {
        Some(_) => Ok(()),
        None => Err(BackendError::NonExistentId(session_id)),
    }
}

/// Writes a script to the review queue and acknowledges it with
/// `status`.
async fn queue(
    environment: &Environment,
    script: Script,
    status: StatusCode,
) -> Result<warp::reply::WithStatus<warp::reply::Json>, BackendError> {
    let title = script.title().to_owned();
    let path = environment.queue.submit(script).await?;

    info!(environment.logger, "Queued change for review"; "title" => &title, "path" => %path.display());

    Ok(with_status(json(&SuccessResponse::queued(&title)), status))
}

fn format_server_timing(seconds: Duration) -> String {
    format!("handler;dur={}", seconds.as_secs_f64() * 1000.0)
}
