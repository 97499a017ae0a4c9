//! This module provides the in-process implementation of the logging
//! endpoint, backed directly by a `LogStore`.
use super::{LoggingService, ServiceError, ServiceResult};
use crate::storage::LogStore;
use crate::types::{LogEvent, Phase};
use async_trait::async_trait;
use std::sync::Arc;

/// A `LoggingService` that owns the process-wide `LogStore`.
///
/// Store calls perform blocking file I/O, so they run on the blocking pool
/// rather than on the connection tasks.
#[derive(Clone)]
pub struct LocalLoggingService {
    store: Arc<LogStore>,
}

impl LocalLoggingService {
    /// Creates a new `LocalLoggingService`.
    ///
    /// # Arguments
    ///
    /// * `store` - The store every operation reads from and appends to.
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    async fn with_store<T, F>(&self, op: F) -> ServiceResult<T>
    where
        F: FnOnce(&LogStore) -> T + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store.as_ref()))
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))
    }

    async fn append(&self, phase: Phase, event: LogEvent) -> ServiceResult<()> {
        self.with_store(move |store| {
            store.append(phase, event);
        })
        .await
    }
}

#[async_trait]
impl LoggingService for LocalLoggingService {
    async fn log_start(&self, event: LogEvent) -> ServiceResult<()> {
        self.append(Phase::Start, event).await
    }

    async fn log_end(&self, event: LogEvent) -> ServiceResult<()> {
        self.append(Phase::End, event).await
    }

    async fn get_all_logs(&self) -> ServiceResult<Vec<String>> {
        self.with_store(|store| store.all_records()).await
    }

    async fn get_logs_for(&self, source_id: &str) -> ServiceResult<Vec<String>> {
        let source_id = source_id.to_string();
        self.with_store(move |store| store.records_matching(&source_id))
            .await
    }

    async fn clear_logs(&self) -> ServiceResult<()> {
        self.with_store(|store| store.clear()).await
    }
}
