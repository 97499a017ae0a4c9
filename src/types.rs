use serde::{Deserialize, Serialize};

/// Lifecycle marker of a logged operation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    End,
}

impl Phase {
    /// The marker written into rendered records.
    pub fn marker(self) -> &'static str {
        match self {
            Phase::Start => "ini",
            Phase::End => "fin",
        }
    }

    /// The wire method that submits an event of this phase.
    pub fn method(self) -> &'static str {
        match self {
            Phase::Start => "logStart",
            Phase::End => "logEnd",
        }
    }
}

/// A structured event as submitted by a caller.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Caller-supplied logical timestamp, usually epoch milliseconds.
    pub timestamp: i64,
    pub source_id: String,
    pub operation: String,
    #[serde(default)]
    pub details: Vec<String>,
}

impl LogEvent {
    pub fn new(
        timestamp: i64,
        source_id: impl Into<String>,
        operation: impl Into<String>,
        details: Vec<String>,
    ) -> Self {
        Self {
            timestamp,
            source_id: source_id.into(),
            operation: operation.into(),
            details,
        }
    }
}

/// A single request line of the bridge protocol.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "method")]
pub enum Request {
    #[serde(rename = "logStart")]
    LogStart(LogEvent),
    #[serde(rename = "logEnd")]
    LogEnd(LogEvent),
    #[serde(rename = "getAllLogs")]
    GetAllLogs,
    #[serde(rename = "getLogsFor", rename_all = "camelCase")]
    GetLogsFor { source_id: String },
    #[serde(rename = "clearLogs")]
    ClearLogs,
}

impl Request {
    pub fn log(phase: Phase, event: LogEvent) -> Self {
        match phase {
            Phase::Start => Request::LogStart(event),
            Phase::End => Request::LogEnd(event),
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::LogStart(_) => Phase::Start.method(),
            Request::LogEnd(_) => Phase::End.method(),
            Request::GetAllLogs => "getAllLogs",
            Request::GetLogsFor { .. } => "getLogsFor",
            Request::ClearLogs => "clearLogs",
        }
    }

    /// Whether the request reads or wipes history rather than appending to it.
    pub fn is_query(&self) -> bool {
        !matches!(self, Request::LogStart(_) | Request::LogEnd(_))
    }
}

/// A single response line of the bridge protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ok,
    Logs(Vec<String>),
    Error(String),
}
