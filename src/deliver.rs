//! Delivery sinks: where due events end up.

use caldav_notify_core::{Event, NotifyConfig};
use clap::ValueEnum;
use notify_rust::Notification;
use tokio::sync::mpsc;
use tracing::warn;

const APP_NAME: &str = "caldav-notify";
const ALERT_SOUND: &str = "message-new-instant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Desktop notification popups
    Desktop,
    /// One JSON line per event on stdout
    Stdout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sink {
    Desktop { icon: String, sound: bool },
    Stdout,
}

impl Sink {
    pub fn new(kind: SinkKind, config: &NotifyConfig) -> Self {
        match kind {
            SinkKind::Desktop => Sink::Desktop {
                icon: config.notify_icon.clone(),
                sound: config.notify_with_sound,
            },
            SinkKind::Stdout => Sink::Stdout,
        }
    }

    pub async fn announce_start(&self) {
        if let Sink::Desktop { icon, .. } = self {
            show(Self::notification("caldav-notify", "notification daemon started", icon, false)).await;
        }
    }

    pub async fn deliver(&self, event: Event) {
        match self {
            Sink::Desktop { icon, sound } => {
                show(Self::notification(&event.summary, &event.description, icon, *sound)).await;
            }
            Sink::Stdout => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, summary = %event.summary, "failed to serialize event"),
            },
        }
    }

    fn notification(summary: &str, body: &str, icon: &str, sound: bool) -> Notification {
        let mut notification = Notification::new();
        notification.appname(APP_NAME).summary(summary).body(body);
        if !icon.is_empty() {
            notification.icon(icon);
        }
        if sound {
            notification.sound_name(ALERT_SOUND);
        }
        notification
    }
}

/// Show a desktop notification without blocking the runtime.
async fn show(notification: Notification) {
    let shown = tokio::task::spawn_blocking(move || notification.show().map(|_| ())).await;
    match shown {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "failed to show notification"),
        Err(e) => warn!(error = %e, "notification task panicked"),
    }
}

/// Deliver events until every sender is gone.
pub async fn run(sink: Sink, mut events: mpsc::Receiver<Event>) {
    while let Some(event) = events.recv().await {
        sink.deliver(event).await;
    }
}
