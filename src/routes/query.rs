use std::collections::HashMap;

use crate::dates::parse_date;
use crate::errors::BackendError;
use crate::matcher::SessionFilter;
use crate::projection::DateWindow;
use crate::tags::parse_list;

const DATE: &str = "date";
const GENRE: &str = "genre";
const BACKLINE: &str = "backline";

const RECOGNIZED: &[&str] = &[DATE, GENRE, BACKLINE];

/// The longest date range a query may ask for.
const MAX_WINDOW_DAYS: i64 = 366;

/// Builds a session filter from the query string of `/jamsessions`.
pub fn session_filter(query: &HashMap<String, String>) -> Result<SessionFilter, BackendError> {
    let mut unrecognized: Vec<String> = query
        .keys()
        .filter(|key| !RECOGNIZED.contains(&key.as_str()))
        .cloned()
        .collect();

    if !unrecognized.is_empty() {
        unrecognized.sort();
        return Err(BackendError::UnrecognizedQueryParameters(unrecognized));
    }

    let mut filter = SessionFilter::new();

    if let Some(value) = query.get(DATE) {
        filter = filter.window(parse_window(value)?);
    }

    if let Some(value) = query.get(GENRE) {
        filter = filter.genres(parse_list(value)?);
    }

    if let Some(value) = query.get(BACKLINE) {
        filter = filter.backline(parse_list(value)?);
    }

    Ok(filter)
}

/// Parses `YYYY-MM-DD` or `YYYY-MM-DD/YYYY-MM-DD`.
fn parse_window(value: &str) -> Result<DateWindow, BackendError> {
    let invalid = |_| BackendError::InvalidDate(value.to_owned());
    let parts: Vec<&str> = value.split('/').collect();

    match parts[..] {
        [date] => Ok(DateWindow::single(parse_date(date).map_err(invalid)?)),
        [start, end] => {
            let window = DateWindow::new(
                parse_date(start).map_err(invalid)?,
                parse_date(end).map_err(invalid)?,
            );

            if window.start > window.end {
                return Err(BackendError::InvertedDateRange {
                    start: start.to_owned(),
                    end: end.to_owned(),
                });
            }

            if window.days() > MAX_WINDOW_DAYS {
                return Err(BackendError::DateRangeTooLong {
                    start: start.to_owned(),
                    end: end.to_owned(),
                    max: MAX_WINDOW_DAYS,
                });
            }

            Ok(window)
        }
        _ => Err(BackendError::InvalidDate(value.to_owned())),
    }
}
