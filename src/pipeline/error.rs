//! Error taxonomy for the reply pipeline.
//!
//! Every error carries a stable machine-readable code which ends up in the
//! `code` field of the structured error body.

use std::borrow::Cow;

use axum::http::StatusCode;
use thiserror::Error;

/// Errors raised by the byte-stream adapter.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A reader is already attached to the stream.
    #[error("stream is locked: a reader is already attached")]
    Locked,

    /// The stream was already drained once.
    #[error("response body already consumed")]
    Consumed,

    /// The underlying source failed mid-read.
    #[error("stream source failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::Locked => "StreamLockedError",
            StreamError::Consumed => "StreamConsumedError",
            StreamError::Io(_) => "StreamReadError",
        }
    }
}

/// An error produced by user code (a handler or an onSend hook).
///
/// It may carry its own status and code, which take precedence over the
/// pipeline defaults when the error is turned into a response.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    status: Option<StatusCode>,
    code: Option<Cow<'static, str>>,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create an error with a message and no status or code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Status to respond with.
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Machine-readable code to respond with.
    pub fn with_code(mut self, code: impl Into<Cow<'static, str>>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        let status = match err.kind() {
            std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            std::io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(err.to_string())
            .with_status(status)
            .with_source(err)
    }
}

/// Terminal errors for a single request's reply.
#[derive(Debug, Error)]
pub enum ReplyError {
    /// Stream lock or consumption violation, or a failed stream source.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// An onSend hook signalled a terminal error.
    #[error("onSend hook `{hook}` failed: {source}")]
    HookChain {
        hook: String,
        #[source]
        source: AppError,
    },

    /// The handler failed before anything was sent.
    #[error("handler failed: {0}")]
    Handler(#[source] AppError),

    /// Structured data could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A pipeline entry point was used after the reply was handed off.
    #[error("reply was already sent")]
    DoubleSend,
}

impl ReplyError {
    /// Stable error code, preferring the user error's own code.
    pub fn code(&self) -> &str {
        match self {
            ReplyError::Stream(e) => e.code(),
            ReplyError::HookChain { source, .. } => source.code().unwrap_or("HookChainError"),
            ReplyError::Handler(e) => e.code().unwrap_or("HandlerError"),
            ReplyError::Serialize(_) => "SerializationError",
            ReplyError::DoubleSend => "DoubleSendError",
        }
    }

    /// Status explicitly requested by a user error, if any.
    pub fn status_hint(&self) -> Option<StatusCode> {
        match self {
            ReplyError::HookChain { source, .. } | ReplyError::Handler(source) => source.status(),
            _ => None,
        }
    }

    /// Message for the error body. User errors are reported verbatim.
    pub fn message(&self) -> String {
        match self {
            ReplyError::HookChain { source, .. } | ReplyError::Handler(source) => {
                source.message().to_string()
            }
            other => other.to_string(),
        }
    }
}
