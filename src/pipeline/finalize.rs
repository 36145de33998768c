//! Terminal status policy and body serialization.
//!
//! # Responsibilities
//! - Resolve envelope payloads into status, headers and body
//! - Force empty bodies for bodyless statuses
//! - Serialize structured data through the configured [`Serializer`]
//! - Attach the reader of stream bodies, enforcing lock/consumption checks
//! - Build the structured error response substituted on failure
//!
//! # Design Decisions
//! - Nothing is committed until the whole triple is resolved
//! - Default content types are only added when the reply has none
//! - Error responses use JSON regardless of the configured serializer

use std::sync::Arc;

use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pipeline::envelope::{extract, is_bodyless, Extracted};
use crate::pipeline::error::ReplyError;
use crate::pipeline::payload::Payload;
use crate::pipeline::reply::ReplyHead;
use crate::pipeline::stream::ByteStream;
use crate::pipeline::transport::{FinalResponse, ResponseBody};

const OCTET_STREAM: HeaderValue = HeaderValue::from_static("application/octet-stream");
const TEXT_PLAIN: HeaderValue = HeaderValue::from_static("text/plain; charset=utf-8");
const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json; charset=utf-8");

/// Serializer for structured payloads.
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &Value) -> Result<Bytes, ReplyError>;

    fn content_type(&self) -> HeaderValue {
        APPLICATION_JSON
    }
}

/// Default serializer: compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<Bytes, ReplyError> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }
}

/// Body of the structured error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub status_code: u16,
    pub code: String,
    pub error: String,
    pub message: String,
}

enum Settled {
    Empty,
    Bytes(Bytes, HeaderValue),
    Structured(Value),
    Stream(ByteStream),
}

/// Turns a settled payload into the response committed to the transport.
#[derive(Clone)]
pub struct Finalizer {
    serializer: Arc<dyn Serializer>,
}

impl Default for Finalizer {
    fn default() -> Self {
        Self::new(Arc::new(JsonSerializer))
    }
}

impl Finalizer {
    pub fn new(serializer: Arc<dyn Serializer>) -> Self {
        Self { serializer }
    }

    /// Resolve `payload` against the reply head.
    pub fn finalize(&self, head: &ReplyHead, payload: Payload) -> Result<FinalResponse, ReplyError> {
        let own = || (head.status(), head.headers().clone());

        let (status, mut headers, body) = match payload {
            Payload::Envelope(envelope) => {
                let Extracted {
                    status,
                    headers,
                    body,
                } = extract(envelope, head.headers())?;
                (status, headers, body.map_or(Settled::Empty, Settled::Stream))
            }
            Payload::Empty => {
                let (status, headers) = own();
                (status, headers, Settled::Empty)
            }
            Payload::Buffer(bytes) => {
                let (status, headers) = own();
                (status, headers, Settled::Bytes(bytes, OCTET_STREAM))
            }
            Payload::Text(text) => {
                let (status, headers) = own();
                (status, headers, Settled::Bytes(Bytes::from(text), TEXT_PLAIN))
            }
            Payload::Structured(value) => {
                let (status, headers) = own();
                (status, headers, Settled::Structured(value))
            }
            Payload::Stream(stream) => {
                let (status, headers) = own();
                (status, headers, Settled::Stream(stream))
            }
        };

        if is_bodyless(status) {
            if !matches!(body, Settled::Empty) {
                tracing::debug!(status = %status, "Dropping body for bodyless status");
            }
            headers.remove(CONTENT_LENGTH);
            headers.remove(TRANSFER_ENCODING);
            return Ok(FinalResponse {
                status,
                headers,
                body: ResponseBody::empty(),
            });
        }

        let body = match body {
            Settled::Empty => fixed(&mut headers, Bytes::new(), None),
            Settled::Bytes(bytes, content_type) => fixed(&mut headers, bytes, Some(content_type)),
            Settled::Structured(value) => {
                let bytes = self.serializer.serialize(&value)?;
                fixed(&mut headers, bytes, Some(self.serializer.content_type()))
            }
            Settled::Stream(stream) => {
                stream.ensure_readable()?;
                headers.entry(CONTENT_TYPE).or_insert(OCTET_STREAM);
                ResponseBody::Stream(stream.attach_reader()?)
            }
        };

        Ok(FinalResponse {
            status,
            headers,
            body,
        })
    }

    /// Structured error response for `err`.
    ///
    /// Status: the user error's own status, else the reply's pending status when
    /// it is already an error status, else 500.
    pub fn error_response(&self, head: &ReplyHead, err: &ReplyError) -> FinalResponse {
        let status = err
            .status_hint()
            .filter(is_error_status)
            .or_else(|| Some(head.status()).filter(is_error_status))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorBody {
            status_code: status.as_u16(),
            code: err.code().to_string(),
            error: status.canonical_reason().unwrap_or("Unknown Error").to_string(),
            message: err.message(),
        };
        let bytes = serde_json::to_vec(&body).map(Bytes::from).unwrap_or_default();

        let mut headers = head.headers().clone();
        headers.remove(TRANSFER_ENCODING);
        headers.insert(CONTENT_TYPE, APPLICATION_JSON);
        let body = fixed(&mut headers, bytes, None);

        FinalResponse {
            status,
            headers,
            body,
        }
    }
}

fn is_error_status(status: &StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

fn fixed(headers: &mut HeaderMap, bytes: Bytes, content_type: Option<HeaderValue>) -> ResponseBody {
    if let Some(content_type) = content_type {
        headers.entry(CONTENT_TYPE).or_insert(content_type);
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
    ResponseBody::Full(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::envelope::Envelope;
    use crate::pipeline::error::{AppError, StreamError};
    use axum::http::HeaderName;
    use serde_json::json;

    fn full_body(response: &FinalResponse) -> &[u8] {
        match &response.body {
            ResponseBody::Full(bytes) => bytes,
            ResponseBody::Stream(_) => panic!("expected a full body"),
        }
    }

    fn stream(data: &'static [u8]) -> ByteStream {
        ByteStream::from_chunks(vec![Bytes::from_static(data)])
    }

    #[test]
    fn test_text_defaults() {
        let f = Finalizer::default();
        let out = f.finalize(&ReplyHead::default(), Payload::classify("hello")).unwrap();
        assert_eq!(out.status, StatusCode::OK);
        assert_eq!(out.headers.get(CONTENT_TYPE).unwrap(), "text/plain; charset=utf-8");
        assert_eq!(out.headers.get(CONTENT_LENGTH).unwrap(), "5");
        assert_eq!(full_body(&out), b"hello");
    }

    #[test]
    fn test_existing_content_type_kept() {
        let f = Finalizer::default();
        let mut head = ReplyHead::default();
        head.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
        let out = f.finalize(&head, Payload::classify("<p>hi</p>")).unwrap();
        assert_eq!(out.headers.get(CONTENT_TYPE).unwrap(), "text/html");
    }

    #[test]
    fn test_structured_serialized() {
        let f = Finalizer::default();
        let out = f.finalize(&ReplyHead::default(), json!({"ok": true}).into()).unwrap();
        assert_eq!(out.headers.get(CONTENT_TYPE).unwrap(), "application/json; charset=utf-8");
        assert_eq!(full_body(&out), br#"{"ok":true}"#);
    }

    #[test]
    fn test_empty_payload() {
        let f = Finalizer::default();
        let out = f.finalize(&ReplyHead::default(), Payload::Empty).unwrap();
        assert_eq!(out.headers.get(CONTENT_LENGTH).unwrap(), "0");
        assert!(full_body(&out).is_empty());
    }

    #[test]
    fn test_stream_attached() {
        let f = Finalizer::default();
        let s = stream(b"data");
        let out = f.finalize(&ReplyHead::default(), s.clone().into()).unwrap();
        assert!(matches!(out.body, ResponseBody::Stream(_)));
        assert!(s.is_locked());
        assert!(out.headers.get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_locked_stream_rejected() {
        let f = Finalizer::default();
        let s = stream(b"data");
        let _reader = s.attach_reader().unwrap();
        let err = f.finalize(&ReplyHead::default(), s.into()).unwrap_err();
        assert_eq!(err.code(), "StreamLockedError");
    }

    #[test]
    fn test_bodyless_reply_status_drops_payload() {
        let f = Finalizer::default();
        let mut head = ReplyHead::default();
        head.set_status(StatusCode::NOT_MODIFIED);
        head.headers_mut().insert("etag", HeaderValue::from_static("\"v1\""));
        let s = stream(b"never read");
        let out = f.finalize(&head, s.clone().into()).unwrap();
        assert_eq!(out.status, StatusCode::NOT_MODIFIED);
        assert!(full_body(&out).is_empty());
        assert_eq!(out.headers.get("etag").unwrap(), "\"v1\"");
        assert!(!s.is_locked());
    }

    #[test]
    fn test_envelope_204() {
        let f = Finalizer::default();
        let env = Envelope::new(StatusCode::NO_CONTENT)
            .header(HeaderName::from_static("hello"), HeaderValue::from_static("world"))
            .body(stream(b"discarded"));
        let out = f.finalize(&ReplyHead::default(), env.into()).unwrap();
        assert_eq!(out.status, StatusCode::NO_CONTENT);
        assert_eq!(out.headers.get("hello").unwrap(), "world");
        assert!(out.headers.get(CONTENT_LENGTH).is_none());
        assert!(full_body(&out).is_empty());
    }

    #[test]
    fn test_envelope_without_body() {
        let f = Finalizer::default();
        let out = f.finalize(&ReplyHead::default(), Envelope::new(StatusCode::ACCEPTED).into()).unwrap();
        assert_eq!(out.status, StatusCode::ACCEPTED);
        assert!(full_body(&out).is_empty());
    }

    #[test]
    fn test_error_response_defaults_to_500() {
        let f = Finalizer::default();
        let err = ReplyError::from(StreamError::Consumed);
        let out = f.error_response(&ReplyHead::default(), &err);
        assert_eq!(out.status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = serde_json::from_slice(full_body(&out)).unwrap();
        assert_eq!(body.code, "StreamConsumedError");
        assert_eq!(body.status_code, 500);
        assert_eq!(body.error, "Internal Server Error");
    }

    #[test]
    fn test_error_response_keeps_error_status() {
        let f = Finalizer::default();
        let mut head = ReplyHead::default();
        head.set_status(StatusCode::BAD_REQUEST);
        let out = f.error_response(&head, &ReplyError::from(StreamError::Locked));
        assert_eq!(out.status, StatusCode::BAD_REQUEST);

        let err = ReplyError::HookChain {
            hook: "auth".into(),
            source: AppError::new("no token").with_status(StatusCode::UNAUTHORIZED),
        };
        let out = f.error_response(&head, &err);
        assert_eq!(out.status, StatusCode::UNAUTHORIZED);
        let body: ErrorBody = serde_json::from_slice(full_body(&out)).unwrap();
        assert_eq!(body.message, "no token");
        assert_eq!(body.code, "HookChainError");
    }
}
