//! Filtering of sessions by date, genre and backline.
//!
//! Each axis of a [`SessionFilter`] is an independent predicate. Axes
//! left unset match everything, and the ones that are set are combined
//! with a logical AND.

use time::Date;

use crate::projection::DateWindow;
use crate::session::SessionWithVenue;
use crate::tags::{Backline, Genre};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionFilter {
    window: Option<DateWindow>,
    genres: Option<Vec<Genre>>,
    backline: Option<Vec<Backline>>,
}

impl SessionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps sessions that occur at least once in the window.
    pub fn window(mut self, window: DateWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Keeps sessions tagged with any of `genres`.
    pub fn genres(mut self, genres: Vec<Genre>) -> Self {
        self.genres = Some(genres);
        self
    }

    /// Keeps sessions whose venue provides all of `backline`.
    pub fn backline(mut self, backline: Vec<Backline>) -> Self {
        self.backline = Some(backline);
        self
    }

    pub fn has_window(&self) -> bool {
        self.window.is_some()
    }

    fn matches_genres(&self, candidate: &SessionWithVenue) -> bool {
        match &self.genres {
            Some(genres) => genres
                .iter()
                .any(|genre| candidate.session.genres.contains(genre)),
            None => true,
        }
    }

    fn matches_backline(&self, candidate: &SessionWithVenue) -> bool {
        match &self.backline {
            Some(backline) => backline
                .iter()
                .all(|item| candidate.venue.backline.contains(item)),
            None => true,
        }
    }

    /// The occurrences of a session in the window, or `Some(None)` when
    /// no window was requested. `None` means the session doesn't occur.
    fn occurrences(&self, candidate: &SessionWithVenue) -> Option<Option<Vec<Date>>> {
        match &self.window {
            Some(window) => {
                let dates = window.project(&candidate.session.recurrence);

                if dates.is_empty() {
                    None
                } else {
                    Some(Some(dates))
                }
            }
            None => Some(None),
        }
    }
}

/// A session that passed a filter, with its occurrences in the
/// requested window.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedSession {
    pub session: SessionWithVenue,
    pub dates: Option<Vec<Date>>,
}

impl MatchedSession {
    /// Wraps a session that wasn't filtered by date.
    pub fn unfiltered(session: SessionWithVenue) -> Self {
        MatchedSession {
            session,
            dates: None,
        }
    }
}

/// Keeps the sessions that match `filter`, in their original order.
pub fn apply(sessions: Vec<SessionWithVenue>, filter: &SessionFilter) -> Vec<MatchedSession> {
    sessions
        .into_iter()
        .filter(|candidate| filter.matches_genres(candidate) && filter.matches_backline(candidate))
        .filter_map(|candidate| {
            let dates = filter.occurrences(&candidate)?;

            Some(MatchedSession {
                session: candidate,
                dates,
            })
        })
        .collect()
}
