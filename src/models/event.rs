//! Test run lifecycle events
//!
//! One `Event` describes one occurrence in a run. The payload each event
//! carries is fixed by its kind, so an event can never hold a field that its
//! type does not allow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::summary::Summary;

/// Closed set of event types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunStarted,
    RunEnded,
    RunStopped,
    TestStarted,
    TestFailure,
    TestError,
    TestEnded,
    SuiteStarted,
    SuiteEnded,
    /// Server to client only
    RunStop,
}

impl EventType {
    /// Stable numeric code
    pub fn code(&self) -> u8 {
        match self {
            EventType::RunStarted => 0,
            EventType::RunEnded => 1,
            EventType::RunStopped => 2,
            EventType::TestStarted => 3,
            EventType::TestFailure => 4,
            EventType::TestError => 5,
            EventType::TestEnded => 6,
            EventType::SuiteStarted => 7,
            EventType::SuiteEnded => 8,
            EventType::RunStop => 9,
        }
    }

    /// Wire name
    pub fn name(&self) -> &'static str {
        match self {
            EventType::RunStarted => "RUN_STARTED",
            EventType::RunEnded => "RUN_ENDED",
            EventType::RunStopped => "RUN_STOPPED",
            EventType::TestStarted => "TEST_STARTED",
            EventType::TestFailure => "TEST_FAILURE",
            EventType::TestError => "TEST_ERROR",
            EventType::TestEnded => "TEST_ENDED",
            EventType::SuiteStarted => "SUITE_STARTED",
            EventType::SuiteEnded => "SUITE_ENDED",
            EventType::RunStop => "RUN_STOP",
        }
    }

    pub fn all() -> Vec<EventType> {
        vec![
            EventType::RunStarted,
            EventType::RunEnded,
            EventType::RunStopped,
            EventType::TestStarted,
            EventType::TestFailure,
            EventType::TestError,
            EventType::TestEnded,
            EventType::SuiteStarted,
            EventType::SuiteEnded,
            EventType::RunStop,
        ]
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of a test failure or error
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// What went wrong, e.g. `panic` or `error`
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub stack_trace: String,
}

impl ErrorInfo {
    pub fn new(
        kind: impl Into<String>,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            stack_trace: stack_trace.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Event payload, one variant per event type
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    RunStarted,
    RunEnded {
        properties: BTreeMap<String, String>,
        summary: Summary,
    },
    RunStopped {
        properties: BTreeMap<String, String>,
        summary: Summary,
    },
    TestStarted {
        name: String,
    },
    TestFailure {
        name: String,
        error: ErrorInfo,
    },
    TestError {
        name: String,
        error: ErrorInfo,
    },
    TestEnded {
        name: String,
    },
    SuiteStarted {
        name: String,
    },
    SuiteEnded {
        name: String,
        summary: Summary,
    },
    RunStop,
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::RunStarted => EventType::RunStarted,
            EventKind::RunEnded { .. } => EventType::RunEnded,
            EventKind::RunStopped { .. } => EventType::RunStopped,
            EventKind::TestStarted { .. } => EventType::TestStarted,
            EventKind::TestFailure { .. } => EventType::TestFailure,
            EventKind::TestError { .. } => EventType::TestError,
            EventKind::TestEnded { .. } => EventType::TestEnded,
            EventKind::SuiteStarted { .. } => EventType::SuiteStarted,
            EventKind::SuiteEnded { .. } => EventType::SuiteEnded,
            EventKind::RunStop => EventType::RunStop,
        }
    }
}

/// One lifecycle occurrence in a test run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    kind: EventKind,
    correlation_id: Uuid,
    timestamp: DateTime<Utc>,
}

impl Event {
    /// Build an event stamped with the current time
    pub fn new(correlation_id: Uuid, kind: EventKind) -> Self {
        Self {
            kind,
            correlation_id,
            timestamp: Utc::now(),
        }
    }

    pub fn run_started(correlation_id: Uuid) -> Self {
        Self::new(correlation_id, EventKind::RunStarted)
    }

    pub fn run_ended(
        correlation_id: Uuid,
        properties: BTreeMap<String, String>,
        summary: Summary,
    ) -> Self {
        Self::new(
            correlation_id,
            EventKind::RunEnded {
                properties,
                summary,
            },
        )
    }

    pub fn run_stopped(
        correlation_id: Uuid,
        properties: BTreeMap<String, String>,
        summary: Summary,
    ) -> Self {
        Self::new(
            correlation_id,
            EventKind::RunStopped {
                properties,
                summary,
            },
        )
    }

    pub fn test_started(correlation_id: Uuid, name: impl Into<String>) -> Self {
        Self::new(correlation_id, EventKind::TestStarted { name: name.into() })
    }

    pub fn test_failure(correlation_id: Uuid, name: impl Into<String>, error: ErrorInfo) -> Self {
        Self::new(
            correlation_id,
            EventKind::TestFailure {
                name: name.into(),
                error,
            },
        )
    }

    pub fn test_error(correlation_id: Uuid, name: impl Into<String>, error: ErrorInfo) -> Self {
        Self::new(
            correlation_id,
            EventKind::TestError {
                name: name.into(),
                error,
            },
        )
    }

    pub fn test_ended(correlation_id: Uuid, name: impl Into<String>) -> Self {
        Self::new(correlation_id, EventKind::TestEnded { name: name.into() })
    }

    pub fn suite_started(correlation_id: Uuid, name: impl Into<String>) -> Self {
        Self::new(correlation_id, EventKind::SuiteStarted { name: name.into() })
    }

    pub fn suite_ended(correlation_id: Uuid, name: impl Into<String>, summary: Summary) -> Self {
        Self::new(
            correlation_id,
            EventKind::SuiteEnded {
                name: name.into(),
                summary,
            },
        )
    }

    pub fn run_stop(correlation_id: Uuid) -> Self {
        Self::new(correlation_id, EventKind::RunStop)
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Test or suite name, for the types that carry one
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            EventKind::TestStarted { name }
            | EventKind::TestFailure { name, .. }
            | EventKind::TestError { name, .. }
            | EventKind::TestEnded { name }
            | EventKind::SuiteStarted { name }
            | EventKind::SuiteEnded { name, .. } => Some(name),
            EventKind::RunStarted
            | EventKind::RunEnded { .. }
            | EventKind::RunStopped { .. }
            | EventKind::RunStop => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match &self.kind {
            EventKind::TestFailure { error, .. } | EventKind::TestError { error, .. } => {
                Some(error)
            }
            _ => None,
        }
    }

    pub fn properties(&self) -> Option<&BTreeMap<String, String>> {
        match &self.kind {
            EventKind::RunEnded { properties, .. } | EventKind::RunStopped { properties, .. } => {
                Some(properties)
            }
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&Summary> {
        match &self.kind {
            EventKind::RunEnded { summary, .. }
            | EventKind::RunStopped { summary, .. }
            | EventKind::SuiteEnded { summary, .. } => Some(summary),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_type())?;
        if let Some(name) = self.name() {
            write!(f, " {name}")?;
        }
        if let Some(error) = self.error() {
            write!(f, " ({error})")?;
        }
        if let Some(summary) = self.summary() {
            write!(f, " [{summary}]")?;
        }
        Ok(())
    }
}
