//! Events emitted by a run.
//!
//! Serialized as `{"type": "...", "payload": ...}`. A run emits any number of
//! `log` and `stats` events followed by exactly one terminal event.

use serde::{Deserialize, Serialize};

use crate::monitor::MonitorSnapshot;
use crate::registry::RunRecord;

/// Category of a run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// The request itself was invalid.
    Input,
    /// The dataset could not be loaded, detected or split.
    Data,
    /// The engine failed while training.
    Engine,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Input => write!(f, "input"),
            ErrorKind::Data => write!(f, "data"),
            ErrorKind::Engine => write!(f, "engine"),
        }
    }
}

/// Terminal payload of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompleted {
    pub record: RunRecord,
    /// Whether the record reached the results registry.
    pub persisted: bool,
}

/// Terminal payload of a run the engine declined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSkipped {
    pub dataset: String,
    pub tool: String,
    pub reason: String,
}

/// Terminal payload of a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum RunEvent {
    /// Human-readable progress narration.
    Log(String),
    /// Resource snapshot taken while the engine trains.
    Stats(MonitorSnapshot),
    Result(RunCompleted),
    Skipped(RunSkipped),
    Error(RunFailure),
}

impl RunEvent {
    pub fn log(message: impl Into<String>) -> Self {
        RunEvent::Log(message.into())
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        RunEvent::Error(RunFailure {
            kind,
            message: message.into(),
        })
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunEvent::Result(_) | RunEvent::Skipped(_) | RunEvent::Error(_)
        )
    }

    /// Event type tag, as serialized.
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::Log(_) => "log",
            RunEvent::Stats(_) => "stats",
            RunEvent::Result(_) => "result",
            RunEvent::Skipped(_) => "skipped",
            RunEvent::Error(_) => "error",
        }
    }
}
