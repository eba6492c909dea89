//! Calendar data sources.
//!
//! The daemon does not talk CalDAV itself. It runs an external fetch program
//! (by default `caldav-fetch.py`) once per poll cycle and reads a JSON array
//! of [`RawEvent`] records from its stdout.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{NotifyError, NotifyResult};
use crate::event::RawEvent;

pub const DEFAULT_FETCH_COMMAND: &str = "caldav-fetch.py";
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Marker the fetch script's diagnostics carry on credential failures.
const UNAUTHORIZED_MARKER: &str = "Unauthorized";

/// Something that can produce this cycle's raw event records.
pub trait EventSource {
    fn fetch(&self) -> impl Future<Output = NotifyResult<Vec<RawEvent>>> + Send;
}

/// Runs an external program and decodes the events it prints.
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        CommandSource {
            program: program.into(),
            args,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn binary_path(&self) -> NotifyResult<PathBuf> {
        let expanded = shellexpand::tilde(&self.program).into_owned();
        which::which(&expanded).map_err(|_| NotifyError::SourceNotFound(self.program.clone()))
    }

    async fn run(&self) -> NotifyResult<Vec<u8>> {
        let binary_path = self.binary_path()?;

        let child = Command::new(&binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NotifyError::SourceSpawn {
                command: binary_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| NotifyError::SourceTimeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(
                &self.program,
                output.status.code().unwrap_or(-1),
                &stderr,
            ));
        }

        Ok(output.stdout)
    }
}

impl EventSource for CommandSource {
    async fn fetch(&self) -> NotifyResult<Vec<RawEvent>> {
        let stdout = self.run().await?;
        let events = decode_events(&stdout)?;
        debug!(count = events.len(), command = %self.program, "fetched events");
        Ok(events)
    }
}

/// Turn a non-zero exit into the matching error.
pub fn classify_failure(command: &str, status: i32, stderr: &str) -> NotifyError {
    if stderr.contains(UNAUTHORIZED_MARKER) {
        NotifyError::Unauthorized(stderr.trim().to_string())
    } else {
        NotifyError::SourceFailed {
            command: command.to_string(),
            status,
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Decode the fetch program's stdout. Empty output means no events.
pub fn decode_events(stdout: &[u8]) -> NotifyResult<Vec<RawEvent>> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(stdout).map_err(|e| NotifyError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_stderr_is_classified() {
        let err = classify_failure(
            "caldav-fetch.py",
            1,
            "caldav.lib.error.AuthorizationError: 401 Unauthorized\n",
        );
        assert!(matches!(err, NotifyError::Unauthorized(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_other_failure_keeps_diagnostic() {
        let err = classify_failure("caldav-fetch.py", 2, "ConnectionRefusedError\n");
        assert!(err.is_fatal());
        assert!(err.to_string().contains("ConnectionRefusedError"));
        assert!(err.to_string().contains("exit status 2"));
    }

    #[test]
    fn test_decode_events() {
        assert!(decode_events(b"  \n").unwrap().is_empty());

        let events = decode_events(br#"[{"summary": "Dentist", "start": "6/12/2025 08:30"}]"#)
            .unwrap();
        assert_eq!(events[0].summary.as_deref(), Some("Dentist"));

        let err = decode_events(b"Traceback (most recent call last):").unwrap_err();
        assert!(matches!(err, NotifyError::Decode(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_program_is_reported() {
        let source = CommandSource::new("caldav-notify-definitely-missing-fetcher", vec![]);
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, NotifyError::SourceNotFound(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unauthorized_process_is_not_decoded() {
        let source = CommandSource::new(
            "sh",
            vec![
                "-c".into(),
                "echo 'not json'; echo '401 Unauthorized' >&2; exit 1".into(),
            ],
        );
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, NotifyError::Unauthorized(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_output_is_decoded() {
        let source = CommandSource::new(
            "sh",
            vec![
                "-c".into(),
                r#"echo '[{"summary": "Standup", "start": "06/10/2025 09:00", "rrule": {"freq": ["DAILY"]}}]'"#.into(),
            ],
        );
        let events = source.fetch().await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].rrule.is_some());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let source = CommandSource::new("sh", vec!["-c".into(), "sleep 5".into()])
            .with_timeout(Duration::from_millis(100));
        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, NotifyError::SourceTimeout(_)));
    }
}
