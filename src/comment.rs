use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::dates;
use crate::normalization;
use crate::rating::Rating;

/// A comment on a session, with the rating posted along with it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Comment {
    #[serde(rename = "comment_id")]
    pub id: i32,
    pub session: i32,
    pub author: String,
    pub content: String,
    #[serde(rename = "dt_posted", with = "dates::rfc3339")]
    pub posted_at: OffsetDateTime,
    pub rating: Option<i16>,
}

/// The body of a comment proposal.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommentSubmission {
    #[serde(deserialize_with = "normalization::deserialize")]
    pub author: String,
    pub content: String,
    #[serde(default)]
    pub rating: Option<Rating>,
}

/// The payload of a comment insert.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NewComment {
    pub session: i32,
    pub author: String,
    pub content: String,
}

/// The payload of a rating insert. The comment is filled in by the
/// review script when the rating came with one.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NewRating {
    pub session: i32,
    pub rating: Rating,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<i32>,
}

/// The body of a free-text suggestion about a session.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Suggestion {
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submissions_validate_the_rating() {
        let submission: CommentSubmission =
            serde_json::from_str(r#"{"author":" Ella ","content":"Great \"house band\"","rating":5}"#)
                .unwrap();

        assert_eq!(submission.author, "Ella");
        assert_eq!(submission.rating.map(Rating::value), Some(5));

        assert!(serde_json::from_str::<CommentSubmission>(
            r#"{"author":"Ella","content":"Meh","rating":9}"#
        )
        .is_err());
    }

    #[test]
    fn ratings_omit_an_absent_comment() {
        let rating = NewRating {
            session: 4,
            rating: Rating::new(3).unwrap(),
            comment: None,
        };

        assert_eq!(
            serde_json::to_string(&rating).unwrap(),
            r#"{"session":4,"rating":3}"#
        );
    }
}
