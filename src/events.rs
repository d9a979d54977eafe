//! Event output for external integrations.
//!
//! Collection notifications are emitted as JSON lines to stdout or a file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::collect::{CollectObserver, Progress};
use crate::error::{Error, Result};
use crate::log_parser::CommitRecord;
use crate::task::GroupKey;

pub const EVENT_SCHEMA_VERSION: &str = "worklog.event.v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

/// Event kinds, one per collector notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LogCollected,
    TaskFailed,
    Progress,
    RunFinished,
}

/// A structured event with optional payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub schema_version: &'static str,
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Event {
    pub fn new(event: EventKind) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
            timestamp: Utc::now(),
            data: None,
        }
    }

    /// Attach a serializable payload to the event.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl EventSink {
    /// Emit events to stdout.
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    /// Emit events to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct LogCollectedData<'a> {
    #[serde(flatten)]
    key: &'a GroupKey,
    commits: &'a [CommitRecord],
}

#[derive(Serialize)]
struct TaskFailedData<'a> {
    message: &'a str,
}

/// Collector observer that mirrors every notification into an [`EventSink`].
///
/// Write failures are logged and otherwise ignored so a broken pipe never
/// aborts a run.
pub struct EventObserver {
    sink: Mutex<EventSink>,
}

impl EventObserver {
    pub fn new(sink: EventSink) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }

    fn emit(&self, kind: EventKind, data: Option<Result<Event>>) {
        let event = match data {
            Some(Ok(event)) => event,
            Some(Err(err)) => {
                warn!(event = ?kind, error = %err, "failed to build event");
                return;
            }
            None => Event::new(kind),
        };
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = sink.emit(&event) {
            warn!(event = ?kind, error = %err, "failed to write event");
        }
    }
}

impl CollectObserver for EventObserver {
    fn on_log_collected(&self, key: &GroupKey, records: &[CommitRecord]) {
        let kind = EventKind::LogCollected;
        self.emit(
            kind,
            Some(Event::new(kind).with_data(LogCollectedData {
                key,
                commits: records,
            })),
        );
    }

    fn on_error(&self, message: &str) {
        let kind = EventKind::TaskFailed;
        self.emit(kind, Some(Event::new(kind).with_data(TaskFailedData { message })));
    }

    fn on_progress(&self, progress: Progress) {
        let kind = EventKind::Progress;
        self.emit(kind, Some(Event::new(kind).with_data(progress)));
    }

    fn on_finished(&self) {
        self.emit(EventKind::RunFinished, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn lines(buffer: &SharedBuffer) -> Vec<serde_json::Value> {
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn destination_parsing() {
        assert_eq!(EventDestination::parse(None), None);
        assert_eq!(EventDestination::parse(Some("  ")), None);
        assert_eq!(EventDestination::parse(Some("-")), Some(EventDestination::Stdout));
        assert_eq!(
            EventDestination::parse(Some("out.jsonl")),
            Some(EventDestination::File(PathBuf::from("out.jsonl")))
        );
    }

    #[test]
    fn observer_writes_one_line_per_notification() {
        let buffer = SharedBuffer::default();
        let observer = EventObserver::new(EventSink::from_writer(Box::new(buffer.clone())));

        let key = GroupKey::new("demo", "origin/main", "alice");
        observer.on_log_collected(
            &key,
            &[CommitRecord::new("abc1234", "2024-05-01 10:00:00 +0000", "Fix login")],
        );
        observer.on_error("demo branch dev failed: boom");
        observer.on_progress(Progress {
            completed: 2,
            total: 2,
        });
        observer.on_finished();

        let events = lines(&buffer);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0]["schema_version"], EVENT_SCHEMA_VERSION);
        assert_eq!(events[0]["event"], "log_collected");
        assert_eq!(events[0]["data"]["branch"], "origin/main");
        assert_eq!(events[0]["data"]["commits"][0]["message"], "Fix login");
        assert_eq!(events[1]["event"], "task_failed");
        assert_eq!(events[1]["data"]["message"], "demo branch dev failed: boom");
        assert_eq!(events[2]["data"]["completed"], 2);
        assert_eq!(events[3]["event"], "run_finished");
        assert!(events[3].get("data").is_none());
    }

    #[test]
    fn file_sink_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        for _ in 0..2 {
            let mut sink = EventDestination::File(path.clone()).open().unwrap();
            sink.emit(&Event::new(EventKind::RunFinished)).unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
