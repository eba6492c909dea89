//! Conversion of raw records into canonical events.
//!
//! The fetch script prints naive local wall-clock times. They are parsed as if
//! they were UTC and then shifted back by the zone offset.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::warn;

use crate::clock::Clock;
use crate::error::{NotifyError, NotifyResult};
use crate::event::{Event, Frequency, RawEvent, RawRecurrence, Recurrence, parse_weekday};

/// Date-time layout of every timestamp the fetch script prints.
/// Single-digit months and days are accepted when parsing.
pub const TIME_FORMAT: &str = "%m/%d/%Y %H:%M";

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIME_FORMAT).ok()
}

/// Parse an `HH:MM:SS` duration.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let parts: Vec<i64> = value
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<i64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match parts.as_slice() {
        [h, m, s] if *h >= 0 && (0..60).contains(m) && (0..60).contains(s) => {
            Some(Duration::hours(*h) + Duration::minutes(*m) + Duration::seconds(*s))
        }
        _ => None,
    }
}

/// Build a canonical [`Event`] from a raw record.
///
/// A zero `offset` means "not configured": the clock's local offset is used
/// instead. The offset is subtracted from every parsed timestamp.
pub fn normalize(raw: RawEvent, offset: Duration, clock: &dyn Clock) -> NotifyResult<Event> {
    let offset = if offset.is_zero() {
        clock.local_offset()
    } else {
        offset
    };
    let shift = |naive: NaiveDateTime| naive.and_utc() - offset;

    let start_str = raw.start.unwrap_or_default();
    let start = parse_timestamp(&start_str)
        .map(shift)
        .ok_or(NotifyError::InvalidTimestamp {
            field: "start",
            value: start_str,
        })?;

    let end = raw.end.as_deref().and_then(parse_timestamp).map(shift);
    let created_at = raw
        .datestamp
        .as_deref()
        .and_then(parse_timestamp)
        .map(shift)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    let span = end.map(|end| end - start).filter(|d| *d >= Duration::zero());
    let recurrence = raw.rrule.as_ref().map(|rrule| {
        let fallback = raw.duration.as_deref().and_then(parse_duration).or(span);
        resolve_recurrence(rrule, fallback, offset)
    });

    Ok(Event {
        name: raw.name.unwrap_or_default(),
        summary: raw.summary.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        start,
        end: end.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        created_at,
        recurrence,
    })
}

/// Resolve a wire recurrence block.
///
/// `fallback_duration` is used when the block carries no usable duration of
/// its own. Intervals below 1 (including an absent interval) become 1.
pub fn resolve_recurrence(
    rrule: &RawRecurrence,
    fallback_duration: Option<Duration>,
    offset: Duration,
) -> Recurrence {
    let frequency = rrule
        .freq
        .as_ref()
        .and_then(|f| f.first())
        .map(|token| Frequency::from_token(token))
        .unwrap_or_else(|| Frequency::Unknown(String::new()));

    let interval = rrule
        .interval
        .as_ref()
        .and_then(|i| i.first())
        .and_then(|i| u32::try_from(*i).ok())
        .filter(|i| *i > 0)
        .unwrap_or(1);

    let until = rrule.until.as_ref().and_then(|u| u.first()).and_then(|value| {
        let parsed = parse_timestamp(value).map(|naive| naive.and_utc() - offset);
        if parsed.is_none() {
            warn!(until = %value, "ignoring unparsable recurrence until");
        }
        parsed
    });

    let weekdays: HashSet<_> = rrule
        .byday
        .as_ref()
        .map(|days| days.iter().filter_map(|d| parse_weekday(d)).collect())
        .unwrap_or_default();

    let duration = rrule
        .duration
        .as_deref()
        .and_then(parse_duration)
        .or(fallback_duration)
        .unwrap_or_else(Duration::zero);

    Recurrence {
        frequency,
        interval,
        until,
        weekdays,
        duration,
    }
}
