//! This module defines the remote logging endpoint: the operations callers
//! use to submit and query events, independent of how they reach it.
pub mod local;

pub use local::LocalLoggingService;

use crate::types::{LogEvent, Phase};
use async_trait::async_trait;
use thiserror::Error;

/// Failures of the channel between a caller and the record history, as
/// opposed to failures of the request itself.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("logging service unavailable: {0}")]
    Unavailable(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// The operations exposed by the logging endpoint.
///
/// Every call is one-shot; no session state is kept between calls.
#[async_trait]
pub trait LoggingService: Send + Sync {
    /// Records the start of an operation.
    ///
    /// # Errors
    ///
    /// This function will return an error if the service cannot be reached.
    async fn log_start(&self, event: LogEvent) -> ServiceResult<()>;

    /// Records the end of an operation.
    ///
    /// # Errors
    ///
    /// This function will return an error if the service cannot be reached.
    async fn log_end(&self, event: LogEvent) -> ServiceResult<()>;

    /// Returns every record in insertion order.
    ///
    /// # Errors
    ///
    /// This function will return an error if the service cannot be reached.
    async fn get_all_logs(&self) -> ServiceResult<Vec<String>>;

    /// Returns the records whose rendered line contains `source_id`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the service cannot be reached.
    async fn get_logs_for(&self, source_id: &str) -> ServiceResult<Vec<String>>;

    /// Wipes the in-memory history and marks the wipe durably.
    ///
    /// # Errors
    ///
    /// This function will return an error if the service cannot be reached.
    async fn clear_logs(&self) -> ServiceResult<()>;

    /// Records an event of the given phase.
    ///
    /// # Errors
    ///
    /// This function will return an error if the service cannot be reached.
    async fn log(&self, phase: Phase, event: LogEvent) -> ServiceResult<()> {
        match phase {
            Phase::Start => self.log_start(event).await,
            Phase::End => self.log_end(event).await,
        }
    }
}
