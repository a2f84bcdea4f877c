//! Append-only structured event stream.
//!
//! Every pipeline step appends an event, mirrors it through `tracing`, and
//! broadcasts it to any subscribed presentation layer. The log is an output
//! of the core, never an input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::phase::PipelinePhase;

/// Event severity, for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One structured log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub timestamp: DateTime<Utc>,
    pub phase: PipelinePhase,
    pub message: String,
    pub severity: Severity,
}

/// Append-only event log with a broadcast side-channel.
///
/// Subscribers that lag simply miss events (the broadcast buffer is
/// bounded); the full history stays in the log itself.
pub struct EventLog {
    events: Vec<PipelineEvent>,
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { events: Vec::new(), tx }
    }

    /// Subscribe to live events. Each subscriber gets every event appended
    /// after the call.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn append(&mut self, phase: PipelinePhase, severity: Severity, message: impl Into<String>) {
        let event = PipelineEvent {
            timestamp: Utc::now(),
            phase,
            message: message.into(),
            severity,
        };
        match severity {
            Severity::Info => tracing::info!(phase = %phase, "{}", event.message),
            Severity::Warning => tracing::warn!(phase = %phase, "{}", event.message),
            Severity::Error => tracing::error!(phase = %phase, "{}", event.message),
        }
        // Send failures just mean nobody is listening
        let _ = self.tx.send(event.clone());
        self.events.push(event);
    }

    pub fn info(&mut self, phase: PipelinePhase, message: impl Into<String>) {
        self.append(phase, Severity::Info, message);
    }

    pub fn warn(&mut self, phase: PipelinePhase, message: impl Into<String>) {
        self.append(phase, Severity::Warning, message);
    }

    pub fn error(&mut self, phase: PipelinePhase, message: impl Into<String>) {
        self.append(phase, Severity::Error, message);
    }

    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    /// Serialize the full history for the run directory.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_preserves_order() {
        let mut log = EventLog::new();
        log.info(PipelinePhase::Planning, "plan requested");
        log.warn(PipelinePhase::Generating, "retrying");
        log.error(PipelinePhase::Error, "gave up");

        let events = log.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "plan requested");
        assert_eq!(events[1].severity, Severity::Warning);
        assert_eq!(events[2].phase, PipelinePhase::Error);
        assert!(events[0].timestamp <= events[2].timestamp);
    }

    #[tokio::test]
    async fn subscribers_receive_appended_events() {
        let mut log = EventLog::new();
        let mut rx = log.subscribe();
        log.info(PipelinePhase::Assembling, "attaching crown");

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "attaching crown");
        assert_eq!(received.phase, PipelinePhase::Assembling);
    }

    #[test]
    fn appending_without_subscribers_does_not_fail() {
        let mut log = EventLog::new();
        log.info(PipelinePhase::Idle, "nobody is listening");
        assert_eq!(log.events().len(), 1);
    }

    #[test]
    fn to_json_round_trips() {
        let mut log = EventLog::new();
        log.info(PipelinePhase::Completed, "done");
        let json = log.to_json().unwrap();
        let parsed: Vec<PipelineEvent> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].message, "done");
    }
}
