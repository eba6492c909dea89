//! Core of the caldav-notify daemon.
//!
//! This crate turns the raw records printed by a calendar fetch program into
//! timed reminders:
//! - `normalize` converts records into timezone-corrected `Event`s
//! - `recurrence` decides whether a recurring event occurs today
//! - `schedule` deduplicates occurrences and runs one timer per event
//! - `poller` drives the whole thing on a fixed refresh period

pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod normalize;
pub mod poller;
pub mod recurrence;
pub mod schedule;
pub mod source;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::NotifyConfig;
pub use error::{NotifyError, NotifyResult};
pub use event::*;
pub use poller::Poller;
pub use schedule::Scheduler;
pub use source::{CommandSource, EventSource};
