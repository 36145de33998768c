//! Per-request reply state and the `send` entry point.

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::pipeline::error::ReplyError;
use crate::pipeline::finalize::Finalizer;
use crate::pipeline::hooks::HookChain;
use crate::pipeline::payload::{IntoPayload, Payload, PayloadKind};
use crate::pipeline::transport::{FinalResponse, Transport};

/// Status and headers of a reply, editable until it is sent.
#[derive(Debug, Clone)]
pub struct ReplyHead {
    status: StatusCode,
    headers: HeaderMap,
}

impl Default for ReplyHead {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }
}

impl ReplyHead {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }
}

/// Process-wide pipeline configuration shared by every reply.
#[derive(Clone, Default)]
pub struct Pipeline {
    pub hooks: HookChain,
    pub finalizer: Finalizer,
}

impl Pipeline {
    pub fn new(hooks: HookChain, finalizer: Finalizer) -> Self {
        Self { hooks, finalizer }
    }
}

/// The outgoing reply of one request.
///
/// Exclusively owned by the request's handling flow. The transport is taken
/// on hand-off, after which every mutation fails with [`ReplyError::DoubleSend`].
pub struct Reply {
    request: RequestContext,
    head: ReplyHead,
    pipeline: Pipeline,
    transport: Option<Box<dyn Transport>>,
    sent_kind: Option<PayloadKind>,
}

impl Reply {
    pub fn new(request: RequestContext, pipeline: Pipeline, transport: Box<dyn Transport>) -> Self {
        Self {
            request,
            head: ReplyHead::default(),
            pipeline,
            transport: Some(transport),
            sent_kind: None,
        }
    }

    /// True once the response was handed to the transport.
    pub fn is_sent(&self) -> bool {
        self.transport.is_none()
    }

    /// Kind of the payload that was committed, after every hook ran.
    ///
    /// `None` before sending and after [`Reply::send_error`].
    pub fn sent_kind(&self) -> Option<PayloadKind> {
        self.sent_kind
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn head(&self) -> &ReplyHead {
        &self.head
    }

    pub fn status_code(&self) -> StatusCode {
        self.head.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.head.headers()
    }

    /// Set the pending status code.
    pub fn set_status(&mut self, status: StatusCode) -> Result<&mut Self, ReplyError> {
        self.ensure_open()?;
        self.head.set_status(status);
        Ok(self)
    }

    /// Set a header, replacing existing values for the same name.
    pub fn header(&mut self, name: HeaderName, value: HeaderValue) -> Result<&mut Self, ReplyError> {
        self.ensure_open()?;
        self.head.headers_mut().insert(name, value);
        Ok(self)
    }

    /// Append a header value, keeping existing ones.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<&mut Self, ReplyError> {
        self.ensure_open()?;
        self.head.headers_mut().append(name, value);
        Ok(self)
    }

    pub fn remove_header(&mut self, name: &HeaderName) -> Result<&mut Self, ReplyError> {
        self.ensure_open()?;
        self.head.headers_mut().remove(name);
        Ok(self)
    }

    /// Classify `value`, run the onSend hooks and hand the result to the transport.
    ///
    /// Pipeline failures substitute a structured error response; either way the
    /// transport receives exactly one response. Only a repeated send is returned
    /// as an error, since nothing is delivered in that case.
    pub async fn send(&mut self, value: impl IntoPayload) -> Result<(), ReplyError> {
        let Some(transport) = self.transport.take() else {
            return Err(self.double_send());
        };

        let payload = Payload::classify(value);

        let settled = match self
            .pipeline
            .hooks
            .run(&self.request, &mut self.head, payload)
            .await
        {
            Ok(payload) => {
                let kind = payload.kind();
                self.pipeline
                    .finalizer
                    .finalize(&self.head, payload)
                    .map(|response| (response, kind))
            }
            Err(err) => Err(err),
        };

        let (response, label) = match settled {
            Ok((response, kind)) => {
                self.sent_kind = Some(kind);
                (response, kind.as_str())
            }
            Err(err) => (self.substitute(&err), "error"),
        };

        self.commit(&response);
        metrics::record_response(response.status.as_u16(), label);
        tracing::debug!(
            request_id = %self.request.id,
            status = response.status.as_u16(),
            kind = label,
            "Reply committed"
        );
        transport.deliver(response);
        Ok(())
    }

    /// Send the structured error response for `err`, bypassing the hooks.
    pub fn send_error(&mut self, err: ReplyError) -> Result<(), ReplyError> {
        let Some(transport) = self.transport.take() else {
            return Err(self.double_send());
        };
        let response = self.substitute(&err);
        self.commit(&response);
        metrics::record_response(response.status.as_u16(), "error");
        transport.deliver(response);
        Ok(())
    }

    fn substitute(&self, err: &ReplyError) -> FinalResponse {
        tracing::error!(
            request_id = %self.request.id,
            code = err.code(),
            error = %err,
            "Reply pipeline failed, sending error response"
        );
        metrics::record_pipeline_error(err.code());
        self.pipeline.finalizer.error_response(&self.head, err)
    }

    /// Mirror the committed status and headers into the head.
    fn commit(&mut self, response: &FinalResponse) {
        self.head.set_status(response.status);
        *self.head.headers_mut() = response.headers.clone();
    }

    fn ensure_open(&self) -> Result<(), ReplyError> {
        if self.is_sent() {
            return Err(self.double_send());
        }
        Ok(())
    }

    fn double_send(&self) -> ReplyError {
        tracing::warn!(request_id = %self.request.id, "Reply already sent");
        metrics::record_double_send();
        ReplyError::DoubleSend
    }
}
