//! Projection of recurrence rules onto calendar windows.
//!
//! Every function here is pure: the same rule and window always yield
//! the same dates, in ascending order, with both bounds inclusive.

use std::cmp;

use time::{Date, Duration, Weekday};

use crate::recurrence::{Nth, RecurrenceKind, RecurrenceRule};

/// An inclusive range of calendar dates.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DateWindow {
    pub start: Date,
    pub end: Date,
}

impl DateWindow {
    pub fn new(start: Date, end: Date) -> Self {
        DateWindow { start, end }
    }

    pub fn single(date: Date) -> Self {
        DateWindow {
            start: date,
            end: date,
        }
    }

    /// The number of days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).whole_days() + 1
    }

    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn project(&self, rule: &RecurrenceRule) -> Vec<Date> {
        project(rule, self.start, self.end)
    }
}

/// Returns the dates in `[start, end]` on which `rule` occurs. Nothing
/// before the anchor's date is ever returned, and an inverted window
/// is empty.
pub fn project(rule: &RecurrenceRule, start: Date, end: Date) -> Vec<Date> {
    if start > end {
        return vec![];
    }

    let anchor = rule.anchor_date();

    match rule.kind() {
        RecurrenceKind::Once => {
            if start <= anchor && anchor <= end {
                vec![anchor]
            } else {
                vec![]
            }
        }
        RecurrenceKind::Daily => step(anchor, 1, start, end),
        RecurrenceKind::Weekly => step(anchor, 7, start, end),
        RecurrenceKind::Fortnightly => step(anchor, 14, start, end),
        RecurrenceKind::NthWeekdayOfMonth(n) => {
            monthly(anchor, start, end, |year, month| nth_weekday(year, month, anchor.weekday(), n))
        }
        RecurrenceKind::LastWeekdayOfMonth => {
            monthly(anchor, start, end, |year, month| last_weekday(year, month, anchor.weekday()))
        }
    }
}

/// Walks from the first multiple of `interval` days after the anchor
/// that lies in the window.
fn step(anchor: Date, interval: i64, start: Date, end: Date) -> Vec<Date> {
    let from = cmp::max(anchor, start);
    let offset = (from - anchor).whole_days();
    let steps = (offset + interval - 1) / interval;

    let mut date = anchor + Duration::days(steps * interval);
    let mut dates = vec![];

    while date <= end {
        dates.push(date);
        date = date + Duration::days(interval);
    }

    dates
}

/// Evaluates `candidate` once per month overlapping the window and
/// keeps the results that are in the window and not before the anchor.
fn monthly(
    anchor: Date,
    start: Date,
    end: Date,
    candidate: impl Fn(i32, u8) -> Option<Date>,
) -> Vec<Date> {
    let lower = cmp::max(anchor, start);

    if lower > end {
        return vec![];
    }

    let mut dates = vec![];
    let (mut year, mut month) = (lower.year(), lower.month());

    while (year, month) <= (end.year(), end.month()) {
        if let Some(date) = candidate(year, month) {
            if lower <= date && date <= end {
                dates.push(date);
            }
        }

        let (next_year, next_month) = next_month(year, month);
        year = next_year;
        month = next_month;
    }

    dates
}

fn next_month(year: i32, month: u8) -> (i32, u8) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Days forward from `from` to the next `to`, between 0 and 6.
fn days_until(from: Weekday, to: Weekday) -> u8 {
    (7 + to.number_days_from_monday() - from.number_days_from_monday()) % 7
}

/// The `n`th `weekday` of the month, or `None` if the month is too short.
pub fn nth_weekday(year: i32, month: u8, weekday: Weekday, n: Nth) -> Option<Date> {
    let first = Date::try_from_ymd(year, month, 1).ok()?;
    let day = 1 + days_until(first.weekday(), weekday) + 7 * (n.index() - 1);

    Date::try_from_ymd(year, month, day).ok()
}

/// The last `weekday` of the month.
pub fn last_weekday(year: i32, month: u8, weekday: Weekday) -> Option<Date> {
    let (next_year, next_month) = next_month(year, month);
    let last = Date::try_from_ymd(next_year, next_month, 1).ok()?.previous_day();
    let back = days_until(weekday, last.weekday());

    Some(last - Duration::days(i64::from(back)))
}
