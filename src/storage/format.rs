//! This module renders structured events into the canonical one-line record
//! format shared by the in-memory history and the durable file.
use crate::types::{LogEvent, Phase};
use chrono::{DateTime, Local};

/// Format of the ingestion time prefix, e.g. `2024-05-01 13:37:00.042`.
pub const WALL_CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Renders the body of a record: everything after the wall-clock prefix.
///
/// Blank details are skipped so that optional trailing fields never leave
/// dangling separators behind.
///
/// # Arguments
///
/// * `timestamp` - The caller-supplied logical timestamp.
/// * `phase` - Whether the operation started or ended.
/// * `source_id` - The entity the operation belongs to.
/// * `operation` - The operation name.
/// * `details` - Free-form trailing fields, in order.
pub fn format_event(
    timestamp: i64,
    phase: Phase,
    source_id: &str,
    operation: &str,
    details: &[String],
) -> String {
    let mut line = format!(
        "timestamp({}), {}, {}, {}",
        timestamp,
        phase.marker(),
        source_id,
        operation
    );

    for detail in details.iter().filter(|d| !d.trim().is_empty()) {
        line.push_str(", ");
        line.push_str(detail);
    }

    line
}

/// Formats an ingestion time for the record prefix.
pub fn wall_clock(now: DateTime<Local>) -> String {
    now.format(WALL_CLOCK_FORMAT).to_string()
}

/// An immutable, fully stamped record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub wall_clock: String,
    pub phase: Phase,
    pub event: LogEvent,
}

impl LogRecord {
    /// Stamps an event with the given ingestion time.
    pub fn stamped(now: DateTime<Local>, phase: Phase, event: LogEvent) -> Self {
        Self {
            wall_clock: wall_clock(now),
            phase,
            event,
        }
    }

    /// Renders the canonical line, without a trailing newline.
    pub fn render(&self) -> String {
        format!(
            "[{}] {}",
            self.wall_clock,
            format_event(
                self.event.timestamp,
                self.phase,
                &self.event.source_id,
                &self.event.operation,
                &self.event.details,
            )
        )
    }
}
