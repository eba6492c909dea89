//! Event types.
//!
//! [`RawEvent`] mirrors the JSON records printed by the fetch script. It is
//! converted into the canonical [`Event`] by [`crate::normalize`].

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A scalar the wire format may also send as a sequence.
///
/// Only the first element is meaningful for scalar fields.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::One(v) => Some(v),
            OneOrMany::Many(vs) => vs.first(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(v) => std::slice::from_ref(v).iter(),
            OneOrMany::Many(vs) => vs.iter(),
        }
    }
}

/// An event record as printed by the data source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawEvent {
    #[serde(default, alias = "Name", alias = "calendar")]
    pub name: Option<String>,
    #[serde(default, alias = "Summary")]
    pub summary: Option<String>,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
    #[serde(default, alias = "Start")]
    pub start: Option<String>,
    #[serde(default, alias = "End")]
    pub end: Option<String>,
    #[serde(default, alias = "Datestamp")]
    pub datestamp: Option<String>,
    /// Occurrence length as `HH:MM:SS`
    #[serde(default, alias = "Duration")]
    pub duration: Option<String>,
    #[serde(default, alias = "Rrule", alias = "RRule")]
    pub rrule: Option<RawRecurrence>,
}

/// Recurrence block of a [`RawEvent`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecurrence {
    #[serde(default, alias = "Freq")]
    pub freq: Option<OneOrMany<String>>,
    #[serde(default, alias = "Until")]
    pub until: Option<OneOrMany<String>>,
    #[serde(default, alias = "ByDay", alias = "Byday")]
    pub byday: Option<OneOrMany<String>>,
    #[serde(default, alias = "Interval")]
    pub interval: Option<OneOrMany<i64>>,
    #[serde(default, alias = "Duration")]
    pub duration: Option<String>,
}

/// A calendar event with absolute, timezone-corrected instants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub recurrence: Option<Recurrence>,
}

impl Event {
    /// Both start and end lie before `now`.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.start < now && self.end < now
    }

    pub fn is_today(&self, now: DateTime<Utc>) -> bool {
        self.start.date_naive() == now.date_naive()
    }

    /// Identity used to suppress rescheduling across poll cycles.
    pub fn dedup_key(&self) -> String {
        format!("{}{}", self.summary, self.start.to_rfc3339())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Unknown(String),
}

impl Frequency {
    pub fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Frequency::Daily,
            "WEEKLY" => Frequency::Weekly,
            "MONTHLY" => Frequency::Monthly,
            "YEARLY" => Frequency::Yearly,
            _ => Frequency::Unknown(token.to_string()),
        }
    }
}

/// Resolved recurrence rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Recurrence {
    pub frequency: Frequency,
    /// Always at least 1
    pub interval: u32,
    pub until: Option<DateTime<Utc>>,
    /// Only consulted for weekly rules
    pub weekdays: HashSet<Weekday>,
    pub duration: Duration,
}

/// Parse a two-letter iCalendar weekday code (`MO`, `TU`, ...).
pub fn parse_weekday(token: &str) -> Option<Weekday> {
    match token.trim().to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}
