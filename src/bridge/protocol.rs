//! This module defines the line protocol spoken by the bridge: one JSON
//! request object per line in, one status line per request out.
use crate::types::{LogEvent, Request, Response};
use serde::Deserialize;
use thiserror::Error;

/// Literal status of a successful request.
pub const OK: &str = "OK";
/// Prefix of every failure line.
pub const ERROR_PREFIX: &str = "ERROR:";

/// Errors raised while decoding or validating a request line.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("method not exposed: {0}")]
    NotExposed(String),
    #[error("request line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// The loosely typed shape of a request line, before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    method: Option<String>,
    timestamp: Option<i64>,
    #[serde(alias = "gameId")]
    source_id: Option<String>,
    operation: Option<String>,
    details: Option<Vec<String>>,
}

/// Decodes and validates a single request line.
///
/// The line must not include its terminator. `gameId` is accepted as an
/// alias of `sourceId`, and `details` may be absent or `null`.
///
/// # Errors
///
/// This function will return an error if the line is not a JSON object of
/// the expected shape, names an unknown method, or lacks a field the method
/// requires.
pub fn decode_request(line: &[u8]) -> Result<Request, ProtocolError> {
    let RawRequest {
        method,
        timestamp,
        source_id,
        operation,
        details,
    } = serde_json::from_slice(line)?;

    let method = method.ok_or(ProtocolError::MissingField("method"))?;

    match method.as_str() {
        "logStart" => Ok(Request::LogStart(log_event(
            timestamp, source_id, operation, details,
        )?)),
        "logEnd" => Ok(Request::LogEnd(log_event(
            timestamp, source_id, operation, details,
        )?)),
        "getAllLogs" => Ok(Request::GetAllLogs),
        "getLogsFor" => Ok(Request::GetLogsFor {
            source_id: source_id.ok_or(ProtocolError::MissingField("sourceId"))?,
        }),
        "clearLogs" => Ok(Request::ClearLogs),
        _ => Err(ProtocolError::UnknownMethod(method)),
    }
}

fn log_event(
    timestamp: Option<i64>,
    source_id: Option<String>,
    operation: Option<String>,
    details: Option<Vec<String>>,
) -> Result<LogEvent, ProtocolError> {
    Ok(LogEvent {
        timestamp: timestamp.ok_or(ProtocolError::MissingField("timestamp"))?,
        source_id: source_id.ok_or(ProtocolError::MissingField("sourceId"))?,
        operation: operation.ok_or(ProtocolError::MissingField("operation"))?,
        details: details.unwrap_or_default(),
    })
}

/// Encodes a request as a single line, without its terminator.
///
/// # Errors
///
/// This function will return an error if the request cannot be serialized.
pub fn encode_request(request: &Request) -> serde_json::Result<String> {
    serde_json::to_string(request)
}

/// Encodes a response as a single line, without its terminator.
///
/// Record lists are JSON encoded so that newlines embedded in details cannot
/// be confused with the line terminator.
pub fn encode_response(response: &Response) -> String {
    match response {
        Response::Ok => OK.to_string(),
        Response::Logs(lines) => match serde_json::to_string(lines) {
            Ok(json) => format!("{} {}", OK, json),
            Err(e) => encode_response(&Response::Error(e.to_string())),
        },
        Response::Error(reason) => {
            let reason = reason.replace(['\r', '\n'], " ");
            format!("{} {}", ERROR_PREFIX, reason)
        }
    }
}

/// Decodes a response line as written by `encode_response`.
///
/// # Errors
///
/// This function will return an error if the line is neither an `OK` nor an
/// `ERROR:` line, or if an attached record list is not valid JSON.
pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line == OK {
        return Ok(Response::Ok);
    }
    if let Some(payload) = line.strip_prefix("OK ") {
        return Ok(Response::Logs(serde_json::from_str(payload)?));
    }
    if let Some(reason) = line.strip_prefix(ERROR_PREFIX) {
        return Ok(Response::Error(reason.trim().to_string()));
    }

    Err(ProtocolError::UnexpectedResponse(line.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_log_start_with_details() {
        let request = decode_request(
            br#"{"method":"logStart","timestamp":1000,"sourceId":"game-7","operation":"move","details":["e2e4"]}"#,
        )
        .unwrap();

        assert_eq!(
            request,
            Request::LogStart(LogEvent::new(1000, "game-7", "move", vec!["e2e4".into()]))
        );
    }

    #[test]
    fn accepts_game_id_alias_and_null_details() {
        let request = decode_request(
            br#"{"method":"logEnd","timestamp":5,"gameId":"g","operation":"fin-juego","details":null}"#,
        )
        .unwrap();

        assert_eq!(
            request,
            Request::LogEnd(LogEvent::new(5, "g", "fin-juego", Vec::new()))
        );
    }

    #[test]
    fn missing_fields_are_named() {
        let err = decode_request(br#"{"method":"logStart","sourceId":"g","operation":"x"}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("timestamp")));

        let err = decode_request(br#"{"timestamp":1}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("method")));

        let err = decode_request(br#"{"method":"getLogsFor"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("sourceId")));
    }

    #[test]
    fn unknown_method_is_reported_by_name() {
        let err = decode_request(br#"{"method":"logMiddle","timestamp":1}"#).unwrap_err();
        assert_eq!(err.to_string(), "unknown method: logMiddle");
    }

    #[test]
    fn rejects_non_json_and_wrong_types() {
        assert!(matches!(
            decode_request(b"hello there").unwrap_err(),
            ProtocolError::Malformed(_)
        ));
        let text_timestamp =
            br#"{"method":"logStart","timestamp":"soon","sourceId":"g","operation":"o"}"#;
        assert!(matches!(
            decode_request(text_timestamp).unwrap_err(),
            ProtocolError::Malformed(_)
        ));
        let numeric_detail =
            br#"{"method":"logStart","timestamp":1,"sourceId":"g","operation":"o","details":[1]}"#;
        assert!(matches!(
            decode_request(numeric_detail).unwrap_err(),
            ProtocolError::Malformed(_)
        ));
    }

    #[test]
    fn encoded_requests_decode_to_the_same_request() {
        let request = Request::LogStart(LogEvent::new(
            42,
            "game-1",
            "lanza-dado",
            vec!["team-a".into(), "6".into()],
        ));
        let line = encode_request(&request).unwrap();

        assert!(line.contains(r#""method":"logStart""#));
        assert!(line.contains(r#""sourceId":"game-1""#));
        assert_eq!(decode_request(line.as_bytes()).unwrap(), request);

        let query = Request::GetLogsFor {
            source_id: "game-1".into(),
        };
        let line = encode_request(&query).unwrap();
        assert_eq!(line, r#"{"method":"getLogsFor","sourceId":"game-1"}"#);
    }

    #[test]
    fn record_lists_survive_embedded_newlines() {
        let lines = vec!["first\nsecond".to_string(), "third".to_string()];
        let encoded = encode_response(&Response::Logs(lines.clone()));

        assert!(!encoded.contains('\n'));
        assert_eq!(decode_response(&encoded).unwrap(), Response::Logs(lines));
    }

    #[test]
    fn error_lines_stay_on_one_line() {
        let encoded = encode_response(&Response::Error("bad\nthing".into()));
        assert_eq!(encoded, "ERROR: bad thing");
        assert_eq!(
            decode_response(&encoded).unwrap(),
            Response::Error("bad thing".into())
        );
    }

    #[test]
    fn unexpected_response_lines_are_rejected() {
        assert_eq!(decode_response("OK\r\n").unwrap(), Response::Ok);
        assert!(matches!(
            decode_response("MAYBE").unwrap_err(),
            ProtocolError::UnexpectedResponse(_)
        ));
    }
}
