//! Interprets `mongod` structured log output during startup.
//!
//! Each stdout or stderr line is an independent JSON object. Lines that do not
//! parse, or parse but carry no startup signal, are forwarded at `debug` and
//! otherwise ignored. The first qualifying line decides the outcome; later
//! lines are still forwarded but never produce a second event.

use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::debug;

use crate::observability::SERVER_LOG_TARGET;

const READY_MESSAGE: &str = "Waiting for connections";

/// Outcome reported by the first qualifying log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupEvent {
    /// The server accepts connections on this port.
    Listening(u16),
    /// The server logged an error or fatal line with this message.
    Failed(String),
}

/// Where the parser stands in the startup sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartupState {
    /// No qualifying line has been seen.
    #[default]
    Running,
    /// A readiness line has been seen.
    Succeeded,
    /// A failure line has been seen.
    Failed,
}

#[derive(Debug, Deserialize)]
struct LogRecord {
    #[serde(rename = "s")]
    severity: String,
    #[serde(rename = "msg")]
    message: String,
    #[serde(default)]
    attr: Option<Map<String, Value>>,
}

impl LogRecord {
    fn startup_event(&self) -> Option<StartupEvent> {
        match self.severity.as_str() {
            "E" | "F" => Some(StartupEvent::Failed(self.message.clone())),
            "I" if self.message == READY_MESSAGE => Some(self.listening_port().map_or_else(
                || StartupEvent::Failed(format!("{READY_MESSAGE} reported without a valid port")),
                StartupEvent::Listening,
            )),
            _ => None,
        }
    }

    fn listening_port(&self) -> Option<u16> {
        self.attr
            .as_ref()?
            .get("port")?
            .as_u64()
            .and_then(|port| u16::try_from(port).ok())
    }
}

/// Turns log lines into at most one [`StartupEvent`].
#[derive(Debug, Default)]
pub struct StartupLogParser {
    state: StartupState,
}

impl StartupLogParser {
    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> StartupState {
        self.state
    }

    /// Feeds one output line, returning an event only for the first
    /// qualifying line.
    pub fn observe(&mut self, line: &str) -> Option<StartupEvent> {
        debug!(target: SERVER_LOG_TARGET, line, "mongod output");
        if self.state != StartupState::Running {
            return None;
        }
        let record = serde_json::from_str::<LogRecord>(line).ok()?;
        let event = record.startup_event()?;
        self.state = match event {
            StartupEvent::Listening(_) => StartupState::Succeeded,
            StartupEvent::Failed(_) => StartupState::Failed,
        };
        Some(event)
    }
}

/// Reads both output streams until they close, delivering the first startup
/// event through `events`.
///
/// Dropping `events` unsent, which happens when both streams close first,
/// tells the receiver that the process exited before it became ready.
pub(crate) async fn monitor_output<O, E>(stdout: O, stderr: E, events: oneshot::Sender<StartupEvent>)
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let out_lines = LinesStream::new(BufReader::new(stdout).lines());
    let err_lines = LinesStream::new(BufReader::new(stderr).lines());
    let mut merged = out_lines.merge(err_lines);
    let mut parser = StartupLogParser::default();
    let mut pending = Some(events);

    while let Some(next) = merged.next().await {
        let line = match next {
            Ok(line) => line,
            Err(err) => {
                debug!(target: SERVER_LOG_TARGET, error = %err, "mongod output unreadable");
                continue;
            }
        };
        if let Some(event) = parser.observe(&line)
            && let Some(sender) = pending.take()
            && sender.send(event).is_err()
        {
            debug!(target: SERVER_LOG_TARGET, "startup event arrived after the supervisor gave up");
        }
    }
}
