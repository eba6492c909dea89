mod deliver;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use caldav_notify_core::{Clock, NotifyConfig, Poller, Scheduler, SystemClock};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::deliver::{Sink, SinkKind};

#[derive(Parser)]
#[command(name = "caldav-notify")]
#[command(about = "Poll your calendar and pop up a reminder before each event")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/caldav-notify/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where to deliver reminders
    #[arg(long, value_enum, default_value_t = SinkKind::Desktop)]
    sink: SinkKind,

    /// Poll once, wait for that cycle's reminders, then exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides the default filter
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("caldav_notify=info,caldav_notify_core=info")
        }))
        .init();

    let cli = Cli::parse();
    let config = NotifyConfig::load(cli.config.as_deref())?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    log_timezone(&config, clock.as_ref());

    let sink = Sink::new(cli.sink, &config);
    let (tx, rx) = mpsc::channel(1);
    let scheduler = Scheduler::new(config.lead_time(), tx, Arc::clone(&clock))
        .cancel_removed(config.cancel_removed);
    let mut poller = Poller::new(
        config.command_source(),
        scheduler,
        clock,
        config.server_offset(),
        config.refresh_period(),
    );

    info!(
        fetch_command = %config.fetch_command,
        lead_minutes = config.notify_before_minutes,
        refresh_minutes = config.refresh_period_minutes,
        "notification daemon started"
    );
    sink.announce_start().await;

    if cli.once {
        let planned = poller.poll_once().await?;
        info!(planned, "waiting for this cycle's reminders");
        // Timers hold the remaining senders; delivery ends when the last one fires
        drop(poller);
        deliver::run(sink, rx).await;
        return Ok(());
    }

    tokio::select! {
        result = poller.run() => result?,
        _ = deliver::run(sink, rx) => {}
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    Ok(())
}

fn log_timezone(config: &NotifyConfig, clock: &dyn Clock) {
    if config.server_offset_hours != 0 {
        info!(offset_hours = config.server_offset_hours, "using configured server offset");
        return;
    }

    let zone = iana_time_zone::get_timezone().unwrap_or_else(|_| "unknown".to_string());
    info!(
        zone = %zone,
        offset_minutes = clock.local_offset().num_minutes(),
        "assuming the calendar server shares this machine's timezone"
    );
}
