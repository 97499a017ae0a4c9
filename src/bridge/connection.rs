//! This module drives a single client connection: read a request line,
//! dispatch it, write the response line, repeat until the stream ends.
use super::protocol::{decode_request, encode_response, ProtocolError};
use super::BridgeError;
use crate::service::LoggingService;
use crate::types::{Phase, Request, Response};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tracing::{debug, error, trace, warn};

/// Everything a connection worker needs, shared by all workers.
pub struct ConnectionContext {
    pub service: Arc<dyn LoggingService>,
    pub max_line_bytes: usize,
    pub expose_queries: bool,
}

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reading,
    Dispatching,
    Closed,
}

/// Outcome of reading one request line.
enum LineRead {
    Line,
    TooLong,
    Eof,
}

/// A single client connection.
pub struct Connection<S> {
    id: u64,
    peer: SocketAddr,
    stream: S,
    state: ConnectionState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite,
{
    pub fn new(id: u64, peer: SocketAddr, stream: S) -> Self {
        Self {
            id,
            peer,
            stream,
            state: ConnectionState::Connected,
        }
    }

    /// Serves requests until the client closes the stream or an I/O error
    /// occurs. Request-level failures are answered and never end the loop.
    ///
    /// Returns the final state, which is always `Closed`.
    pub async fn run(self, ctx: &ConnectionContext) -> ConnectionState {
        let Connection {
            id,
            peer,
            stream,
            mut state,
        } = self;
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(read_half);

        match serve_requests(id, &mut state, &mut reader, &mut writer, ctx).await {
            Ok(()) => debug!("Client disconnected: {} (connection {})", peer, id),
            Err(e) => debug!("Connection {} to {} closed on I/O error: {}", id, peer, e),
        }

        transition(id, &mut state, ConnectionState::Closed);
        state
    }
}

async fn serve_requests<R, W>(
    id: u64,
    state: &mut ConnectionState,
    reader: &mut R,
    writer: &mut W,
    ctx: &ConnectionContext,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();

    loop {
        transition(id, state, ConnectionState::Reading);
        let response = match read_line(reader, &mut buf, ctx.max_line_bytes).await? {
            LineRead::Eof => return Ok(()),
            LineRead::TooLong => {
                warn!("Connection {}: request line too long", id);
                Response::Error(ProtocolError::LineTooLong(ctx.max_line_bytes).to_string())
            }
            LineRead::Line if buf.iter().all(u8::is_ascii_whitespace) => continue,
            LineRead::Line => {
                transition(id, state, ConnectionState::Dispatching);
                dispatch(ctx, &buf).await
            }
        };

        let mut line = encode_response(&response);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
}

fn transition(id: u64, state: &mut ConnectionState, next: ConnectionState) {
    if *state != next {
        trace!("Connection {}: {:?} -> {:?}", id, state, next);
        *state = next;
    }
}

/// Reads one `\n`-terminated line into `buf`, without its terminator.
///
/// A line longer than `max` bytes, terminator excluded, is discarded up to and
/// including its terminator so that the next read starts on a fresh request.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    // Room for the content plus a `\r\n` terminator.
    let limit = (max as u64).saturating_add(2);
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(LineRead::Eof);
    }

    let terminated = buf.last() == Some(&b'\n');
    if terminated {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    if buf.len() <= max {
        return Ok(LineRead::Line);
    }

    if !terminated && read as u64 == limit {
        skip_line(reader).await?;
    }
    Ok(LineRead::TooLong)
}

async fn skip_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}

/// Decodes one request line and runs it against the service.
async fn dispatch(ctx: &ConnectionContext, line: &[u8]) -> Response {
    match handle_request(ctx, line).await {
        Ok(response) => response,
        Err(BridgeError::Protocol(e)) => {
            debug!("Rejected request: {}", e);
            Response::Error(e.to_string())
        }
        Err(BridgeError::Service(e)) => {
            error!("Request failed: {}", e);
            Response::Error(e.to_string())
        }
    }
}

async fn handle_request(ctx: &ConnectionContext, line: &[u8]) -> Result<Response, BridgeError> {
    let request = decode_request(line)?;
    if request.is_query() && !ctx.expose_queries {
        return Err(ProtocolError::NotExposed(request.method().to_string()).into());
    }

    debug!("Dispatching {}", request.method());

    let response = match request {
        Request::LogStart(event) => {
            ctx.service.log(Phase::Start, event).await?;
            Response::Ok
        }
        Request::LogEnd(event) => {
            ctx.service.log(Phase::End, event).await?;
            Response::Ok
        }
        Request::GetAllLogs => Response::Logs(ctx.service.get_all_logs().await?),
        Request::GetLogsFor { source_id } => {
            Response::Logs(ctx.service.get_logs_for(&source_id).await?)
        }
        Request::ClearLogs => {
            ctx.service.clear_logs().await?;
            Response::Ok
        }
    };

    Ok(response)
}
