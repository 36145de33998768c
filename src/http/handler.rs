//! Handler contract and per-request dispatch.
//!
//! # Responsibilities
//! - Run a handler against a fresh [`Reply`]
//! - Treat a returned value exactly like an explicit `send`
//! - Guarantee one response per request, whatever the handler does
//!
//! # Design Decisions
//! - A handler that neither sends nor returns a value gets an empty 200
//! - A handler error before sending becomes a structured error response
//! - Anything a handler does after sending is logged, never delivered

use std::future::Future;

use async_trait::async_trait;
use axum::http::StatusCode;
use tokio::sync::oneshot;

use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::pipeline::error::{AppError, ReplyError};
use crate::pipeline::payload::{IntoPayload, Payload};
use crate::pipeline::reply::{Pipeline, Reply, ReplyHead};
use crate::pipeline::transport::FinalResponse;

/// `Ok(Some(value))` is sent as if passed to [`Reply::send`].
pub type HandlerResult = Result<Option<Payload>, AppError>;

/// A request handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: &RequestContext, reply: &mut Reply) -> HandlerResult;
}

/// Handler backed by an async closure returning any payload-like value.
///
/// The closure only sees the request. Implement [`Handler`] to set status or
/// headers on the [`Reply`] or to send explicitly.
pub struct FnHandler<F> {
    f: F,
}

/// Build a handler from a closure.
pub fn handler_fn<F, Fut, P>(f: F) -> FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, AppError>> + Send + 'static,
    P: IntoPayload + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut, P> Handler for FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, AppError>> + Send + 'static,
    P: IntoPayload + Send + 'static,
{
    async fn handle(&self, request: &RequestContext, _reply: &mut Reply) -> HandlerResult {
        let value = (self.f)(request.clone()).await?;
        Ok(Some(Payload::classify(value)))
    }
}

/// Fallback for requests no route matched.
pub struct NotFound;

#[async_trait]
impl Handler for NotFound {
    async fn handle(&self, request: &RequestContext, _reply: &mut Reply) -> HandlerResult {
        Err(AppError::new(format!("Route {}:{} not found", request.method, request.path()))
            .with_status(StatusCode::NOT_FOUND)
            .with_code("RouteNotFound"))
    }
}

/// Run `handler` for one request and return the single committed response.
pub async fn dispatch(handler: &dyn Handler, request: RequestContext, pipeline: &Pipeline) -> FinalResponse {
    let (tx, rx) = oneshot::channel();
    let mut reply = Reply::new(request.clone(), pipeline.clone(), Box::new(tx));

    match handler.handle(&request, &mut reply).await {
        Ok(value) if reply.is_sent() => {
            if value.is_some() {
                tracing::warn!(
                    request_id = %request.id,
                    "Handler returned a payload after sending; ignoring it"
                );
                metrics::record_double_send();
            }
        }
        Ok(value) => {
            if let Err(err) = reply.send(value).await {
                tracing::warn!(request_id = %request.id, error = %err, "Send failed");
            }
        }
        Err(err) if reply.is_sent() => {
            tracing::error!(
                request_id = %request.id,
                error = %err,
                "Handler failed after sending"
            );
        }
        Err(err) => {
            if let Err(send_err) = reply.send_error(ReplyError::Handler(err)) {
                tracing::warn!(request_id = %request.id, error = %send_err, "Send failed");
            }
        }
    }
    drop(reply);

    match rx.await {
        Ok(response) => response,
        Err(_) => {
            let err = ReplyError::Handler(AppError::new("reply dropped without a response"));
            pipeline.finalizer.error_response(&ReplyHead::default(), &err)
        }
    }
}
