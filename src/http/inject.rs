//! In-process request injection for tests.
//!
//! Runs the same dispatch and reply pipeline as the server, then materializes
//! the committed body instead of writing it to a socket.

use std::borrow::Cow;

use axum::http::uri::InvalidUri;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::http::app::App;
use crate::http::handler::{dispatch, Handler, NotFound};
use crate::http::request::RequestContext;
use crate::pipeline::error::StreamError;

/// Errors raised while injecting a request.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("invalid uri: {0}")]
    Uri(#[from] InvalidUri),

    /// The committed stream body failed while being read.
    #[error("body read failed: {0}")]
    Body(#[from] StreamError),
}

/// A fully materialized response.
#[derive(Debug, Clone)]
pub struct InjectedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InjectedResponse {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Parse the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Stand-in transport that never opens a socket.
#[derive(Clone)]
pub struct Injector {
    app: App,
}

impl Injector {
    pub fn new(app: App) -> Self {
        Self { app }
    }

    /// Inject a request with no headers.
    pub async fn inject(&self, method: Method, uri: &str) -> Result<InjectedResponse, InjectError> {
        let uri: Uri = uri.parse()?;
        self.inject_request(RequestContext::new(method, uri)).await
    }

    /// Inject a prepared request, routed by exact method and path.
    pub async fn inject_request(&self, request: RequestContext) -> Result<InjectedResponse, InjectError> {
        let route = self
            .app
            .find(&request.method, request.path())
            .map(|r| r.handler.clone());

        match route {
            Some(handler) => self.inject_with(handler.as_ref(), request).await,
            None => self.inject_with(&NotFound, request).await,
        }
    }

    /// Run a specific handler against the app's pipeline.
    pub async fn inject_with(
        &self,
        handler: &dyn Handler,
        request: RequestContext,
    ) -> Result<InjectedResponse, InjectError> {
        let response = dispatch(handler, request, self.app.pipeline()).await;
        let (status, headers, body) = response.materialize().await?;
        Ok(InjectedResponse {
            status,
            headers,
            body,
        })
    }
}
