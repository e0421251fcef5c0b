use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::errors::BackendError;

pub const MIN_RATING: i16 = 1;
pub const MAX_RATING: i16 = 5;

/// A single score given to a session.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct Rating(i16);

impl Rating {
    pub fn new(value: i16) -> Result<Self, BackendError> {
        if (MIN_RATING..=MAX_RATING).contains(&value) {
            Ok(Rating(value))
        } else {
            Err(BackendError::InvalidRating(value))
        }
    }

    pub fn value(self) -> i16 {
        self.0
    }
}

impl TryFrom<i16> for Rating {
    type Error = BackendError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for i16 {
    fn from(rating: Rating) -> i16 {
        rating.0
    }
}

/// The mean of a session's ratings, or `None` if it has none.
pub fn aggregate(ratings: &[i16]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }

    let sum: f64 = ratings.iter().map(|&r| f64::from(r)).sum();

    Some(sum / ratings.len() as f64)
}
