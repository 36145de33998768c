//! Response envelopes: status, headers and body bundled in one value.
//!
//! # Responsibilities
//! - Carry an immutable `{status, headers, body}` snapshot built by handler code
//! - Reconcile the envelope with the reply's own metadata on extraction
//!
//! # Design Decisions
//! - The envelope status always overwrites the reply's pending status
//! - Any header key the envelope sets replaces all of the reply's values for it
//! - Bodyless statuses (1xx, 204, 304) drop the body without reading it

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::pipeline::error::StreamError;
use crate::pipeline::stream::ByteStream;

/// A full response value bundling status, headers and an optional stream body.
#[derive(Debug, Clone)]
pub struct Envelope {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<ByteStream>,
}

impl Envelope {
    /// Envelope with the given status, no headers and no body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Append a header value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replace the whole header map.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Attach a stream body.
    pub fn body(mut self, body: ByteStream) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn stream(&self) -> Option<&ByteStream> {
        self.body.as_ref()
    }
}

/// Result of reconciling an envelope with the reply.
#[derive(Debug)]
pub struct Extracted {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Option<ByteStream>,
}

/// True for statuses that must not carry a body.
pub fn is_bodyless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Merge `reply_headers` under `envelope.headers`, envelope values winning per key.
fn merge_headers(reply_headers: &HeaderMap, envelope_headers: &HeaderMap) -> HeaderMap {
    let mut merged = reply_headers.clone();
    for name in envelope_headers.keys() {
        merged.remove(name);
    }
    for (name, value) in envelope_headers {
        merged.append(name.clone(), value.clone());
    }
    merged
}

/// Produce the final status, headers and body for an envelope payload.
pub fn extract(envelope: Envelope, reply_headers: &HeaderMap) -> Result<Extracted, StreamError> {
    let Envelope {
        status,
        headers,
        body,
    } = envelope;

    let headers = merge_headers(reply_headers, &headers);

    let body = if is_bodyless(status) {
        if body.is_some() {
            tracing::debug!(status = %status, "Discarding envelope body for bodyless status");
        }
        None
    } else {
        if let Some(stream) = &body {
            stream.ensure_readable()?;
        }
        body
    };

    Ok(Extracted {
        status,
        headers,
        body,
    })
}
