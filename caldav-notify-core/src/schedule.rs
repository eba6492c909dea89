//! Deduplication and per-event notification timers.
//!
//! The [`Scheduler`] remembers every occurrence it has already planned and
//! spawns one tokio task per new occurrence. Each task sleeps until the lead
//! time before the event's start and then sends the event to the sink.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::event::Event;

const OFFSET_HINT: &str = "if the event is in the future, the server timezone probably differs from \
                           this machine's; set CALDAV_SERVER_OFFSET_HOURS";

/// How long a finished event's key is remembered. Upstream may still report
/// the same occurrence with a changed end during this window.
const RETENTION: Duration = Duration::days(2);

#[derive(Debug)]
struct PlannedEntry {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    timer: Option<AbortHandle>,
}

/// Occurrences that already have a timer, keyed by [`Event::dedup_key`].
#[derive(Debug, Default)]
pub struct Planned {
    entries: HashMap<String, PlannedEntry>,
}

impl Planned {
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, key: String, event: &Event, timer: Option<AbortHandle>) {
        self.entries.insert(
            key,
            PlannedEntry {
                start: event.start,
                end: event.end,
                timer,
            },
        );
    }

    /// Forget entries whose start and recorded end both lie more than
    /// [`RETENTION`] before `now`.
    pub fn prune_past(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - RETENTION;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| !(entry.start < cutoff && entry.end < cutoff));
        before - self.entries.len()
    }

    /// Abort pending timers whose key was not seen in the latest cycle.
    fn cancel_unseen(&mut self, seen: &HashSet<String>) -> usize {
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(key, entry)| {
                !seen.contains(*key)
                    && entry
                        .timer
                        .as_ref()
                        .is_some_and(|timer| !timer.is_finished())
            })
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            if let Some(PlannedEntry {
                timer: Some(timer), ..
            }) = self.entries.remove(key)
            {
                timer.abort();
                info!(key = %key, "cancelled timer for event no longer reported");
            }
        }
        stale.len()
    }
}

/// Plans one notification timer per new, still-relevant event.
pub struct Scheduler {
    planned: Planned,
    lead: Duration,
    sink: mpsc::Sender<Event>,
    clock: Arc<dyn Clock>,
    cancel_removed: bool,
    /// Keys already warned about as past today
    hinted: HashSet<String>,
    hinted_day: Option<NaiveDate>,
}

impl Scheduler {
    pub fn new(lead: Duration, sink: mpsc::Sender<Event>, clock: Arc<dyn Clock>) -> Self {
        Scheduler {
            planned: Planned::default(),
            lead,
            sink,
            clock,
            cancel_removed: false,
            hinted: HashSet::new(),
            hinted_day: None,
        }
    }

    /// Abort timers whose event disappears from a later poll.
    pub fn cancel_removed(mut self, enabled: bool) -> Self {
        self.cancel_removed = enabled;
        self
    }

    pub fn planned(&self) -> &Planned {
        &self.planned
    }

    /// Spawn a timer for every event that is neither past nor already
    /// planned. Returns how many timers were spawned.
    pub fn schedule_new(&mut self, events: Vec<Event>) -> usize {
        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut scheduled = 0;

        for event in events {
            if event.is_past(now) {
                if event.is_today(now) {
                    self.hint_offset(&event, now);
                }
                continue;
            }

            let key = event.dedup_key();
            seen.insert(key.clone());
            if self.planned.contains(&key) {
                continue;
            }

            info!(summary = %event.summary, start = %event.start, "planned event");
            let handle = tokio::spawn(notify_at(
                event.clone(),
                self.lead,
                self.sink.clone(),
                Arc::clone(&self.clock),
            ));
            let timer = self.cancel_removed.then(|| handle.abort_handle());
            self.planned.insert(key, &event, timer);
            scheduled += 1;
        }

        if self.cancel_removed {
            let cancelled = self.planned.cancel_unseen(&seen);
            if cancelled > 0 {
                warn!(cancelled, "events disappeared from the calendar");
            }
        }
        let pruned = self.planned.prune_past(now);
        if pruned > 0 {
            debug!(pruned, remaining = self.planned.len(), "forgot finished events");
        }

        scheduled
    }

    /// Warn once per key about a same-day event that already looks past.
    fn hint_offset(&mut self, event: &Event, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.hinted_day != Some(today) {
            self.hinted.clear();
            self.hinted_day = Some(today);
        }
        if self.hinted.insert(event.dedup_key()) {
            warn!(summary = %event.summary, start = %event.start, "skipping event from past; {OFFSET_HINT}");
        }
    }
}

/// Wait until `lead` before the event starts, then deliver it.
///
/// Events whose notification moment has already passed are delivered
/// immediately. The send waits for the sink to accept the event.
pub async fn notify_at(
    event: Event,
    lead: Duration,
    sink: mpsc::Sender<Event>,
    clock: Arc<dyn Clock>,
) {
    let delay = (event.start - clock.now()) - lead;
    if let Ok(delay) = delay.to_std() {
        if !delay.is_zero() {
            debug!(
                summary = %event.summary,
                delay = %humantime::format_duration(delay),
                "sleeping until notification"
            );
            tokio::time::sleep(delay).await;
        }
    }

    let summary = event.summary.clone();
    match sink.send(event).await {
        Ok(()) => info!(summary = %summary, "notified for event"),
        Err(_) => debug!(summary = %summary, "delivery channel closed, dropping notification"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// A clock the test can move forward.
    struct SteppedClock(Mutex<DateTime<Utc>>);

    impl SteppedClock {
        fn set(&self, now: DateTime<Utc>) {
            *self.0.lock().unwrap() = now;
        }
    }

    impl Clock for SteppedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }

        fn local_offset(&self) -> Duration {
            Duration::zero()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).unwrap()
    }

    fn event(summary: &str, start: DateTime<Utc>) -> Event {
        Event {
            name: "Work".into(),
            summary: summary.into(),
            description: "Room 4".into(),
            start,
            end: start + Duration::hours(1),
            created_at: now() - Duration::days(3),
            recurrence: None,
        }
    }

    fn scheduler(capacity: usize) -> (Scheduler, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::utc(now()));
        (Scheduler::new(Duration::minutes(5), tx, clock), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_event_is_scheduled_once() {
        let (mut scheduler, mut rx) = scheduler(4);
        let standup = event("Standup", now() + Duration::minutes(30));

        assert_eq!(scheduler.schedule_new(vec![standup.clone()]), 1);
        assert_eq!(scheduler.schedule_new(vec![standup.clone()]), 0);
        assert_eq!(scheduler.planned().len(), 1);

        assert_eq!(rx.recv().await, Some(standup));
        let second = tokio::time::timeout(std::time::Duration::from_secs(3600), rx.recv()).await;
        assert!(second.is_err(), "Should not deliver a duplicate");
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_events_are_never_scheduled() {
        let (mut scheduler, _rx) = scheduler(1);
        let old = event("Retro", now() - Duration::hours(3));

        assert_eq!(scheduler.schedule_new(vec![old]), 0);
        assert!(scheduler.planned().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ongoing_event_is_delivered_immediately() {
        let (mut scheduler, mut rx) = scheduler(1);
        let ongoing = event("Workshop", now() - Duration::minutes(10));

        assert_eq!(scheduler.schedule_new(vec![ongoing.clone()]), 1);
        let delivered = tokio::time::timeout(std::time::Duration::from_millis(1), rx.recv()).await;
        assert_eq!(delivered.ok().flatten(), Some(ongoing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_lead_time_before_start() {
        let (tx, mut rx) = mpsc::channel(1);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::utc(now()));
        let planning = event("Planning", now() + Duration::minutes(20));

        tokio::spawn(notify_at(planning.clone(), Duration::minutes(5), tx, clock));

        // 15 minutes until the notification moment
        let early = tokio::time::timeout(std::time::Duration::from_secs(15 * 60 - 1), rx.recv()).await;
        assert!(early.is_err(), "Should not fire before start - lead");

        let on_time = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv()).await;
        assert_eq!(on_time.ok().flatten(), Some(planning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_start_instant_is_a_new_key() {
        let (mut scheduler, _rx) = scheduler(4);
        let monday = event("Gym", now() + Duration::hours(6));
        let mut wednesday = monday.clone();
        wednesday.start += Duration::days(2);
        wednesday.end += Duration::days(2);

        assert_eq!(scheduler.schedule_new(vec![monday]), 1);
        assert_eq!(scheduler.schedule_new(vec![wednesday]), 1);
        assert_eq!(scheduler.planned().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_removed_aborts_pending_timer() {
        let (tx, mut rx) = mpsc::channel(1);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::utc(now()));
        let mut scheduler = Scheduler::new(Duration::minutes(5), tx, clock).cancel_removed(true);
        let call = event("Call", now() + Duration::hours(2));

        assert_eq!(scheduler.schedule_new(vec![call.clone()]), 1);
        assert_eq!(scheduler.schedule_new(vec![]), 0);
        assert!(!scheduler.planned().contains(&call.dedup_key()));

        drop(scheduler);
        // Aborted timer dropped its sender, so the channel closes without delivering
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_prune_keeps_recently_finished_events() {
        let mut planned = Planned::default();
        let old = event("Old", now() - Duration::days(3));
        let done = event("Done", now() - Duration::hours(2));
        let running = event("Running", now() - Duration::minutes(30));
        planned.insert(old.dedup_key(), &old, None);
        planned.insert(done.dedup_key(), &done, None);
        planned.insert(running.dedup_key(), &running, None);

        assert_eq!(planned.prune_past(now()), 1);
        assert!(!planned.contains(&old.dedup_key()));
        assert!(planned.contains(&done.dedup_key()));
        assert!(planned.contains(&running.dedup_key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extended_event_is_not_replanned_after_it_ended() {
        let start = Utc.with_ymd_and_hms(2025, 6, 10, 10, 0, 0).unwrap();
        let clock = Arc::new(SteppedClock(Mutex::new(start - Duration::hours(1))));
        let (tx, mut rx) = mpsc::channel(4);
        let mut scheduler = Scheduler::new(Duration::minutes(5), tx, clock.clone());

        let mut meeting = event("Meeting", start);
        meeting.end = start + Duration::minutes(30);
        assert_eq!(scheduler.schedule_new(vec![meeting.clone()]), 1);
        assert_eq!(rx.recv().await, Some(meeting.clone()));

        // Meeting is over; a cycle with nothing new runs the prune
        clock.set(start + Duration::minutes(35));
        assert_eq!(scheduler.schedule_new(vec![]), 0);

        // Upstream extends it: same summary and start, later end
        meeting.end = start + Duration::hours(1);
        assert_eq!(scheduler.schedule_new(vec![meeting]), 0);
        let duplicate = tokio::time::timeout(std::time::Duration::from_secs(60), rx.recv()).await;
        assert!(duplicate.is_err(), "Should not deliver the meeting twice");
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_hint_is_logged_once_per_event() {
        let (mut scheduler, _rx) = scheduler(1);
        let missed = event("Missed", now() - Duration::hours(2));

        assert_eq!(scheduler.schedule_new(vec![missed.clone()]), 0);
        assert_eq!(scheduler.schedule_new(vec![missed.clone()]), 0);
        assert_eq!(scheduler.hinted.len(), 1);
        assert!(scheduler.hinted.contains(&missed.dedup_key()));
    }
}
