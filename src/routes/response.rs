use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SuccessResponse<'a> {
    Healthz {
        revision: Option<&'a str>,
        timestamp: Option<&'a str>,
        version: &'a str,
    },
    Index {
        message: &'a str,
        resources: &'a [&'a str],
    },
    /// A change that was written to the review queue.
    Queued { title: &'a str, message: &'a str },
}

impl<'a> SuccessResponse<'a> {
    pub fn queued(title: &'a str) -> Self {
        SuccessResponse::Queued {
            title,
            message: "Thanks! Your submission will be reviewed shortly.",
        }
    }
}
