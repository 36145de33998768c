//! Hand-off of the finalized response to the transport collaborator.
//!
//! # Design Decisions
//! - `Transport::deliver` consumes the transport, so a second hand-off cannot be expressed
//! - Stream bodies are handed over with their reader already attached
//! - Wire formatting and socket I/O stay with the transport (hyper via axum)

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use tokio::sync::oneshot;

use crate::pipeline::error::StreamError;
use crate::pipeline::stream::StreamReader;

/// Settled body of a response.
#[derive(Debug)]
pub enum ResponseBody {
    /// Fully materialized bytes (possibly empty).
    Full(Bytes),
    /// Streamed chunk by chunk from an attached reader.
    Stream(StreamReader),
}

impl ResponseBody {
    pub fn empty() -> Self {
        ResponseBody::Full(Bytes::new())
    }
}

/// The `{status, headers, body}` triple committed for a request.
#[derive(Debug)]
pub struct FinalResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
}

impl FinalResponse {
    /// Convert into an axum response, streaming the body if needed.
    pub fn into_http(self) -> Response {
        let body = match self.body {
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Stream(reader) => Body::from_stream(reader.into_stream()),
        };
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// Read the whole body into memory.
    pub async fn materialize(self) -> Result<(StatusCode, HeaderMap, Bytes), StreamError> {
        let body = match self.body {
            ResponseBody::Full(bytes) => bytes,
            ResponseBody::Stream(reader) => {
                let mut sink: Vec<u8> = Vec::new();
                reader.pipe_to(&mut sink).await?;
                Bytes::from(sink)
            }
        };
        Ok((self.status, self.headers, body))
    }
}

/// Receiver of the finalized response. Used exactly once per request.
pub trait Transport: Send {
    fn deliver(self: Box<Self>, response: FinalResponse);
}

impl Transport for oneshot::Sender<FinalResponse> {
    fn deliver(self: Box<Self>, response: FinalResponse) {
        if (*self).send(response).is_err() {
            tracing::debug!("Response receiver dropped before delivery");
        }
    }
}
