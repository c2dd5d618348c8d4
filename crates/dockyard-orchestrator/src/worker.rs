use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Telemetry,
    Logs,
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerKind::Telemetry => f.write_str("telemetry"),
            WorkerKind::Logs => f.write_str("logs"),
        }
    }
}

/// Why an ingestion worker stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum WorkerEnd {
    /// The engine closed the stream, e.g. because the container stopped.
    StreamClosed,
    StreamFailed(String),
    SinkFailed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub kind: WorkerKind,
    pub container_id: String,
    /// Samples written or log lines forwarded.
    pub items: u64,
    pub end: WorkerEnd,
}

impl WorkerReport {
    pub fn new(kind: WorkerKind, container_id: impl Into<String>, items: u64, end: WorkerEnd) -> Self {
        Self {
            kind,
            container_id: container_id.into(),
            items,
            end,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.end == WorkerEnd::Cancelled
    }
}
