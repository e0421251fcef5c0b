use serde::Serialize;
use warp::reject;

use crate::errors::BackendError;

#[derive(Debug)]
pub struct Rejection {
    pub(crate) context: Context,
    pub(crate) error: BackendError,
}

impl Rejection {
    pub fn new(context: Context, error: BackendError) -> Self {
        Rejection { context, error }
    }

    pub fn flatten(&self) -> FlattenedRejection {
        let message = if self.error.is_internal() {
            "An unknown error occurred".to_owned()
        } else {
            format!("{}", self.error)
        };

        FlattenedRejection {
            context: self.context.clone(),
            message,
        }
    }
}

impl reject::Reject for Rejection {}

#[derive(Debug, Serialize)]
pub struct FlattenedRejection {
    #[serde(flatten)]
    pub(crate) context: Context,
    pub(crate) message: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum Context {
    Venues,
    Venue { venue_id: String },
    VenueSessions { venue_id: String },
    ProposeVenue { venue_name: Option<String> },
    UpdateVenue { venue_id: String },
    DeleteVenue { venue_id: String },
    Sessions,
    Session { session_id: String },
    ProposeSession { session_name: Option<String> },
    UpdateSession { session_id: String },
    DeleteSession { session_id: String },
    Comments { session_id: String },
    ProposeComment { session_id: String },
    Suggest { session_id: String },
}

impl Context {
    pub fn venues() -> Context {
        Context::Venues
    }

    pub fn venue(venue_id: String) -> Context {
        Context::Venue { venue_id }
    }

    pub fn venue_sessions(venue_id: String) -> Context {
        Context::VenueSessions { venue_id }
    }

    pub fn propose_venue(venue_name: Option<String>) -> Context {
        Context::ProposeVenue { venue_name }
    }

    pub fn update_venue(venue_id: String) -> Context {
        Context::UpdateVenue { venue_id }
    }

    pub fn delete_venue(venue_id: String) -> Context {
        Context::DeleteVenue { venue_id }
    }

    pub fn sessions() -> Context {
        Context::Sessions
    }

    pub fn session(session_id: String) -> Context {
        Context::Session { session_id }
    }

    pub fn propose_session(session_name: Option<String>) -> Context {
        Context::ProposeSession { session_name }
    }

    pub fn update_session(session_id: String) -> Context {
        Context::UpdateSession { session_id }
    }

    pub fn delete_session(session_id: String) -> Context {
        Context::DeleteSession { session_id }
    }

    pub fn comments(session_id: String) -> Context {
        Context::Comments { session_id }
    }

    pub fn propose_comment(session_id: String) -> Context {
        Context::ProposeComment { session_id }
    }

    pub fn suggest(session_id: String) -> Context {
        Context::Suggest { session_id }
    }
}
