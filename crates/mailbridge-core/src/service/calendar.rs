//! Calendar listing and event creation.

use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::dates::ParsedDate;
use super::{MailService, ServiceError};
use crate::store::{Calendar, CalendarEvent, EventTime, MailStore, StoreError};

/// A calendar listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSummary {
    /// Calendar ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Provider type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Whether the calendar rejects new items.
    pub read_only: bool,
}

impl From<Calendar> for CalendarSummary {
    fn from(calendar: Calendar) -> Self {
        Self {
            id: calendar.id,
            name: calendar.name,
            kind: calendar.kind,
            read_only: calendar.read_only,
        }
    }
}

/// Arguments of `createEvent`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventParams {
    /// Event title.
    pub title: String,
    /// Start, ISO-8601.
    pub start_date: String,
    /// End, ISO-8601.
    #[serde(default)]
    pub end_date: Option<String>,
    /// Location.
    #[serde(default)]
    pub location: Option<String>,
    /// Description.
    #[serde(default)]
    pub description: Option<String>,
    /// Target calendar; the first writable calendar when absent.
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// Create an all-day event.
    #[serde(default)]
    pub all_day: Option<bool>,
}

/// Result of a successful `createEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventOutcome {
    /// Always `true`.
    pub success: bool,
    /// Human-readable summary.
    pub message: String,
}

fn parse_date(field: &'static str, value: &str) -> Result<ParsedDate, ServiceError> {
    ParsedDate::parse(value).ok_or_else(|| ServiceError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.is_empty()).cloned()
}

fn event_span(
    start: ParsedDate,
    end: Option<ParsedDate>,
    all_day: bool,
) -> (EventTime, EventTime) {
    if all_day {
        let start = start.local_date();
        let end = match end.map(ParsedDate::local_date) {
            // DTEND of an all-day event is exclusive.
            Some(end) if end <= start => next_day(end),
            Some(end) => end,
            None => next_day(start),
        };
        return (EventTime::AllDay(start), EventTime::AllDay(end));
    }

    let start = start.to_utc().fixed_offset();
    let end = end.map_or_else(
        || start + TimeDelta::hours(1),
        |end| end.to_utc().fixed_offset(),
    );
    (EventTime::Timed(start), EventTime::Timed(end))
}

impl<S: MailStore> MailService<S> {
    fn calendar_list(&self) -> Result<Vec<Calendar>, ServiceError> {
        self.store.calendars().map_err(|err| match err {
            StoreError::Unavailable(_) => ServiceError::CalendarUnavailable,
            other => other.into(),
        })
    }

    /// Lists calendars.
    ///
    /// # Errors
    ///
    /// Returns an error if the calendar subsystem is unavailable.
    pub fn list_calendars(&self) -> Result<Vec<CalendarSummary>, ServiceError> {
        Ok(self
            .calendar_list()?
            .into_iter()
            .map(CalendarSummary::from)
            .collect())
    }

    /// Opens a pre-filled event editor for the user to review.
    ///
    /// # Errors
    ///
    /// Returns an error if a date is invalid, the calendar subsystem is
    /// unavailable, or no suitable writable calendar exists.
    pub fn create_event(&self, params: &CreateEventParams) -> Result<EventOutcome, ServiceError> {
        let calendars = self.calendar_list()?;
        let start = parse_date("startDate", &params.start_date)?;
        let end = match params.end_date.as_deref().filter(|s| !s.is_empty()) {
            Some(value) => Some(parse_date("endDate", value)?),
            None => None,
        };

        let calendar = match params.calendar_id.as_deref().filter(|s| !s.is_empty()) {
            Some(id) => {
                let calendar = calendars
                    .into_iter()
                    .find(|c| c.id == id)
                    .ok_or_else(|| ServiceError::CalendarNotFound(id.to_string()))?;
                if calendar.read_only {
                    return Err(ServiceError::CalendarReadOnly(calendar.name));
                }
                calendar
            }
            None => calendars
                .into_iter()
                .find(|c| !c.read_only)
                .ok_or(ServiceError::NoWritableCalendar)?,
        };

        let (start, end) = event_span(start, end, params.all_day.unwrap_or(false));
        debug!(calendar = %calendar.id, ?start, ?end, "Creating event");

        self.store.open_event_editor(CalendarEvent {
            title: params.title.clone(),
            start,
            end,
            location: non_empty(params.location.as_ref()),
            description: non_empty(params.description.as_ref()),
            calendar_id: calendar.id,
        })?;

        Ok(EventOutcome {
            success: true,
            message: format!(
                "Event dialog opened for \"{}\" on calendar \"{}\"",
                params.title, calendar.name
            ),
        })
    }
}
