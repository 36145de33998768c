//! Request context handed to handlers and hooks.
//!
//! # Responsibilities
//! - Carry the request ID assigned at the edge (or generate one)
//! - Expose method, URI and headers read-only
//!
//! # Design Decisions
//! - Request body parsing is not part of this crate
//! - The ID comes from `x-request-id`, which the server layer sets when missing

use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Uri};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Read-only view of the incoming request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub id: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RequestContext {
    /// Context with a fresh request ID and no headers.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }

    /// Context from the parts of an incoming request.
    pub fn from_parts(parts: &Parts) -> Self {
        let id = parts
            .headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            id,
            method: parts.method.clone(),
            uri: parts.uri.clone(),
            headers: parts.headers.clone(),
        }
    }

    /// Add a request header. The request ID follows `x-request-id` when set here.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        if name == X_REQUEST_ID {
            if let Ok(id) = value.to_str() {
                self.id = id.to_string();
            }
        }
        self.headers.append(name, value);
        self
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}
