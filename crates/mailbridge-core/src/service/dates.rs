//! Loose ISO-8601 date parsing for tool arguments.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// A parsed date argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedDate {
    /// An instant with a time component.
    Instant(DateTime<FixedOffset>),
    /// A bare calendar date.
    Date(NaiveDate),
}

impl ParsedDate {
    /// Parses RFC 3339, a local date-time without offset, or a bare date.
    ///
    /// Date-times without an offset are interpreted in the local time zone.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
            return Some(Self::Instant(instant));
        }
        for format in LOCAL_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
                return local_instant(naive).map(Self::Instant);
            }
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .map(Self::Date)
    }

    /// The instant this value denotes. Bare dates are midnight UTC.
    pub fn to_utc(self) -> DateTime<Utc> {
        match self {
            Self::Instant(instant) => instant.with_timezone(&Utc),
            Self::Date(date) => date.and_time(chrono::NaiveTime::MIN).and_utc(),
        }
    }

    /// Calendar date of this value in local time.
    pub fn local_date(self) -> NaiveDate {
        match self {
            Self::Instant(instant) => instant.with_timezone(&Local).date_naive(),
            Self::Date(date) => date,
        }
    }
}

fn local_instant(naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.fixed_offset())
}
