//! The poll loop: fetch, normalize, resolve, schedule, sleep, repeat.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{debug, error, warn};

use crate::clock::Clock;
use crate::error::NotifyResult;
use crate::event::Event;
use crate::normalize::normalize;
use crate::recurrence::resolve_occurrence;
use crate::schedule::Scheduler;
use crate::source::EventSource;

pub struct Poller<S> {
    source: S,
    scheduler: Scheduler,
    clock: Arc<dyn Clock>,
    /// Server offset override; zero means "use the local zone"
    offset: Duration,
    refresh_period: StdDuration,
}

impl<S: EventSource> Poller<S> {
    pub fn new(
        source: S,
        scheduler: Scheduler,
        clock: Arc<dyn Clock>,
        offset: Duration,
        refresh_period: StdDuration,
    ) -> Self {
        Poller {
            source,
            scheduler,
            clock,
            offset,
            refresh_period,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Run a single fetch cycle. Returns the number of newly planned events.
    ///
    /// Malformed records are logged and skipped; only a failure of the source
    /// itself is returned as an error.
    pub async fn poll_once(&mut self) -> NotifyResult<usize> {
        let raw = self.source.fetch().await?;
        let now = self.clock.now();
        let fetched = raw.len();

        let events: Vec<Event> = raw
            .into_iter()
            .filter_map(|record| match normalize(record, self.offset, self.clock.as_ref()) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "skipping malformed event");
                    None
                }
            })
            .map(|event| resolve_occurrence(event, now))
            .collect();

        let planned = self.scheduler.schedule_new(events);
        debug!(fetched, planned, "poll cycle complete");
        Ok(planned)
    }

    /// Poll forever. Returns only when a cycle fails with a fatal error.
    pub async fn run(mut self) -> NotifyResult<()> {
        loop {
            match self.poll_once().await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => error!(error = %e, "poll cycle failed, retrying next cycle"),
            }
            tokio::time::sleep(self.refresh_period).await;
        }
    }
}
