//! This module provides a client for the bridge protocol.
//!
//! Events submitted while the bridge is unreachable are kept in a local queue
//! and replayed, in order, the next time the client connects.
pub mod retry;

pub use retry::RetryPolicy;

use crate::bridge::protocol::{decode_response, encode_request, ProtocolError};
use crate::types::{LogEvent, Phase, Request, Response};
use chrono::Utc;
use std::collections::VecDeque;
use std::io;
use std::path::Path;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Errors returned by `BridgeClient`.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected to bridge at {0}")]
    NotConnected(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error("bridge rejected request: {0}")]
    Rejected(String),
}

/// What happened to a submitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The bridge acknowledged the event.
    Sent,
    /// The bridge could not be reached; the event waits in the local queue.
    Queued,
    /// The bridge answered with an error. The event is dropped.
    Rejected(String),
}

struct ClientConnection {
    writer: OwnedWriteHalf,
    lines: Lines<BufReader<OwnedReadHalf>>,
}

impl ClientConnection {
    async fn open(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, writer) = stream.into_split();
        Ok(Self {
            writer,
            lines: BufReader::new(read_half).lines(),
        })
    }

    async fn call(&mut self, request: &Request) -> Result<Response, ClientError> {
        let mut line = encode_request(request)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;

        match self.lines.next_line().await? {
            Some(reply) => Ok(decode_response(&reply)?),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "bridge closed the connection",
            )
            .into()),
        }
    }
}

/// A client connection to a bridge, with an offline queue.
pub struct BridgeClient {
    addr: String,
    connection: Option<ClientConnection>,
    pending: VecDeque<Request>,
}

impl BridgeClient {
    /// Creates a disconnected client for the bridge at `addr` (`host:port`).
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connection: None,
            pending: VecDeque::new(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of events waiting to be sent.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Connects to the bridge and replays any queued events.
    ///
    /// # Errors
    ///
    /// This function will return an error if the bridge cannot be reached.
    /// Queued events are kept in that case.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        let connection = ClientConnection::open(&self.addr).await?;
        if self.is_connected() {
            debug!("Replacing the existing connection to {}", self.addr);
        }
        self.connection = Some(connection);
        info!("Connected to bridge at {}", self.addr);

        self.flush_pending().await;
        Ok(())
    }

    /// Retries `connect` according to `policy`.
    ///
    /// # Errors
    ///
    /// This function will return the last connection error once every attempt
    /// has failed.
    pub async fn reconnect(&mut self, policy: &RetryPolicy) -> Result<(), ClientError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("Reconnect attempt {}/{}", attempt, policy.max_attempts);

            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= policy.max_attempts => {
                    warn!("Giving up on bridge at {}: {}", self.addr, e);
                    return Err(e);
                }
                Err(e) => {
                    debug!("Reconnect failed: {}", e);
                    sleep(policy.exponential_backoff_with_jitter(attempt - 1)).await;
                }
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.connection.take().is_some() {
            info!("Disconnected from bridge at {}", self.addr);
        }
    }

    /// Records the start of an operation, stamped with the current time.
    pub async fn log_start(
        &mut self,
        source_id: &str,
        operation: &str,
        details: Vec<String>,
    ) -> Delivery {
        self.send_event(Phase::Start, now_event(source_id, operation, details))
            .await
    }

    /// Records the end of an operation, stamped with the current time.
    pub async fn log_end(
        &mut self,
        source_id: &str,
        operation: &str,
        details: Vec<String>,
    ) -> Delivery {
        self.send_event(Phase::End, now_event(source_id, operation, details))
            .await
    }

    /// Sends an event, or queues it if the bridge is unreachable.
    pub async fn send_event(&mut self, phase: Phase, event: LogEvent) -> Delivery {
        let request = Request::log(phase, event);

        let Some(connection) = self.connection.as_mut() else {
            return self.enqueue(request);
        };

        match connection.call(&request).await {
            Ok(Response::Ok) => {
                debug!("Event sent: {}", request.method());
                Delivery::Sent
            }
            Ok(Response::Error(reason)) => {
                warn!("Bridge rejected {}: {}", request.method(), reason);
                Delivery::Rejected(reason)
            }
            Ok(Response::Logs(_)) => {
                warn!("Unexpected record list in reply to {}", request.method());
                Delivery::Rejected("unexpected record list".to_string())
            }
            Err(e) => {
                warn!("Failed to send event: {}", e);
                self.disconnect();
                self.enqueue(request)
            }
        }
    }

    /// Writes the queued events to `path` as a JSON array.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file cannot be written.
    pub fn save_pending(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let json = serde_json::to_string_pretty(&self.pending)?;
        std::fs::write(path.as_ref(), json)?;
        info!(
            "Saved {} pending event(s) to {}",
            self.pending.len(),
            path.as_ref().display()
        );
        Ok(())
    }

    /// Fetches every record held by the bridge.
    ///
    /// # Errors
    ///
    /// This function will return an error if the client is not connected, the
    /// call fails, or the bridge refuses the query.
    pub async fn get_all_logs(&mut self) -> Result<Vec<String>, ClientError> {
        match self.query(Request::GetAllLogs).await? {
            Response::Logs(lines) => Ok(lines),
            other => Err(unexpected(other)),
        }
    }

    /// Fetches the records whose line contains `source_id`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the client is not connected, the
    /// call fails, or the bridge refuses the query.
    pub async fn get_logs_for(&mut self, source_id: &str) -> Result<Vec<String>, ClientError> {
        let request = Request::GetLogsFor {
            source_id: source_id.to_string(),
        };
        match self.query(request).await? {
            Response::Logs(lines) => Ok(lines),
            other => Err(unexpected(other)),
        }
    }

    /// Wipes the bridge's in-memory history.
    ///
    /// # Errors
    ///
    /// This function will return an error if the client is not connected, the
    /// call fails, or the bridge refuses the request.
    pub async fn clear_logs(&mut self) -> Result<(), ClientError> {
        match self.query(Request::ClearLogs).await? {
            Response::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn query(&mut self, request: Request) -> Result<Response, ClientError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ClientError::NotConnected(self.addr.clone()))?;

        match connection.call(&request).await {
            Ok(Response::Error(reason)) => Err(ClientError::Rejected(reason)),
            Ok(response) => Ok(response),
            Err(e) => {
                self.disconnect();
                Err(e)
            }
        }
    }

    fn enqueue(&mut self, request: Request) -> Delivery {
        debug!("Event queued locally: {}", request.method());
        self.pending.push_back(request);
        Delivery::Queued
    }

    /// Replays queued events in order, stopping at the first one that fails.
    async fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        info!("Sending {} pending event(s)", self.pending.len());

        while let Some(request) = self.pending.front() {
            let Some(connection) = self.connection.as_mut() else {
                return;
            };

            match connection.call(request).await {
                Ok(Response::Ok) => {
                    self.pending.pop_front();
                }
                Ok(other) => {
                    warn!("Pending event not accepted: {:?}", other);
                    return;
                }
                Err(e) => {
                    warn!("Failed to send pending event: {}", e);
                    self.disconnect();
                    return;
                }
            }
        }

        info!("All pending events sent");
    }
}

fn now_event(source_id: &str, operation: &str, details: Vec<String>) -> LogEvent {
    LogEvent::new(Utc::now().timestamp_millis(), source_id, operation, details)
}

fn unexpected(response: Response) -> ClientError {
    ProtocolError::UnexpectedResponse(format!("{:?}", response)).into()
}
