//! Occurrence resolution for recurring events.
//!
//! Only answers "does this event occur today?". When it does, the event's
//! start/end are moved onto today's date at the original time of day. There is
//! no enumeration of past or future occurrences: the poller asks again on
//! every cycle.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::event::{Event, Frequency, Recurrence};

/// Move a recurring event onto today's occurrence, if there is one.
///
/// Returns the event unchanged when it has no recurrence, when the
/// recurrence ended before `now`, or when today is not an occurrence day.
pub fn resolve_occurrence(mut event: Event, now: DateTime<Utc>) -> Event {
    let Some(recurrence) = &event.recurrence else {
        return event;
    };

    if recurrence.until.is_some_and(|until| until < now) {
        return event;
    }

    let today = now.date_naive();
    if !matches_today(recurrence, event.start, today) {
        return event;
    }

    let start = today.and_time(event.start.time()).and_utc();
    let end = start + recurrence.duration;
    event.start = start;
    event.end = end;
    event
}

/// Whether `today` is an occurrence day of a series that began at
/// `original_start`.
///
/// The cycle checks compare calendar fields (ISO week, day of month, month,
/// year) rather than elapsed time, so they do not model wraparound across
/// month or year boundaries.
pub fn matches_today(recurrence: &Recurrence, original_start: DateTime<Utc>, today: NaiveDate) -> bool {
    let interval = i64::from(recurrence.interval.max(1));
    let on_cycle = |original: i64, current: i64| (original - current).rem_euclid(interval) == 0;

    match recurrence.frequency {
        Frequency::Weekly => {
            recurrence.weekdays.contains(&today.weekday())
                && on_cycle(
                    i64::from(original_start.iso_week().week()),
                    i64::from(today.iso_week().week()),
                )
        }
        Frequency::Daily => on_cycle(i64::from(original_start.day()), i64::from(today.day())),
        Frequency::Monthly => on_cycle(i64::from(original_start.month()), i64::from(today.month())),
        Frequency::Yearly => on_cycle(i64::from(original_start.year()), i64::from(today.year())),
        Frequency::Unknown(_) => false,
    }
}
