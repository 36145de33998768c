//! onSend hook registration and the sequential hook chain.
//!
//! # Data Flow
//! ```text
//! Pending(0, payload)
//!     → Running(i)            hook i awaited; nothing else runs for this request
//!     → Advancing(i + 1)      hook kept the payload
//!     → Replaced(i + 1, p')   hook returned a replacement (re-classified)
//!     → Failed(error)         hook returned an error; chain aborts
//! Pending(len) → Completed(payload)
//! ```
//!
//! # Design Decisions
//! - Hooks are registered at setup time, then frozen into a shared immutable list
//! - No timeout here; cancellation belongs to whoever drives the request future

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::http::request::RequestContext;
use crate::observability::metrics;
use crate::pipeline::error::{AppError, ReplyError};
use crate::pipeline::payload::{IntoPayload, Payload};
use crate::pipeline::reply::ReplyHead;

/// Outcome of a hook: `Ok(None)` keeps the payload, `Ok(Some(p))` replaces it.
pub type HookResult = Result<Option<Payload>, AppError>;

/// A transform run on every payload before it is finalized.
#[async_trait]
pub trait OnSendHook: Send + Sync {
    async fn on_send(
        &self,
        request: &RequestContext,
        reply: &mut ReplyHead,
        payload: &Payload,
    ) -> HookResult;

    /// Name used in logs and metrics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Hook backed by an async closure over owned copies of the request and payload.
///
/// Payload-only: the closure never sees the reply head. Use [`head_hook_fn`]
/// or implement [`OnSendHook`] to change status or headers.
pub struct FnHook<F> {
    name: String,
    f: F,
}

/// Build a hook from a closure.
pub fn hook_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHook<F>
where
    F: Fn(RequestContext, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    FnHook {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> OnSendHook for FnHook<F>
where
    F: Fn(RequestContext, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    async fn on_send(
        &self,
        request: &RequestContext,
        _reply: &mut ReplyHead,
        payload: &Payload,
    ) -> HookResult {
        (self.f)(request.clone(), payload.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Hook backed by a synchronous closure that may edit the reply head.
pub struct HeadHook<F> {
    name: String,
    f: F,
}

/// Build a hook that can set status and headers before finalization.
pub fn head_hook_fn<F>(name: impl Into<String>, f: F) -> HeadHook<F>
where
    F: Fn(&RequestContext, &mut ReplyHead, &Payload) -> HookResult + Send + Sync + 'static,
{
    HeadHook {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> OnSendHook for HeadHook<F>
where
    F: Fn(&RequestContext, &mut ReplyHead, &Payload) -> HookResult + Send + Sync + 'static,
{
    async fn on_send(&self, request: &RequestContext, reply: &mut ReplyHead, payload: &Payload) -> HookResult {
        (self.f)(request, reply, payload)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Append-only list of hooks, filled during setup.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn OnSendHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook. Hooks run in registration order.
    pub fn register(&mut self, hook: impl OnSendHook + 'static) -> &mut Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Freeze the list for request handling.
    pub fn freeze(self) -> HookChain {
        HookChain {
            hooks: self.hooks.into(),
        }
    }
}

/// State of a chain run.
enum ChainState {
    Pending { index: usize, payload: Payload },
    Advancing { next: usize, payload: Payload },
    Replaced { next: usize, payload: Payload },
    Failed { index: usize, error: AppError },
}

/// Frozen, shareable list of onSend hooks.
#[derive(Clone)]
pub struct HookChain {
    hooks: Arc<[Arc<dyn OnSendHook>]>,
}

impl Default for HookChain {
    fn default() -> Self {
        HookRegistry::new().freeze()
    }
}

impl HookChain {
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in order, returning the settled payload.
    pub async fn run(
        &self,
        request: &RequestContext,
        reply: &mut ReplyHead,
        payload: Payload,
    ) -> Result<Payload, ReplyError> {
        let mut state = ChainState::Pending { index: 0, payload };

        loop {
            state = match state {
                ChainState::Pending { index, payload } => {
                    let Some(hook) = self.hooks.get(index) else {
                        return Ok(payload);
                    };

                    tracing::trace!(
                        request_id = %request.id,
                        hook = hook.name(),
                        index,
                        kind = payload.kind().as_str(),
                        "Running onSend hook"
                    );

                    let started = Instant::now();
                    let outcome = hook.on_send(request, reply, &payload).await;
                    metrics::record_hook(hook.name(), started);

                    match outcome {
                        Ok(None) => ChainState::Advancing {
                            next: index + 1,
                            payload,
                        },
                        Ok(Some(replacement)) => ChainState::Replaced {
                            next: index + 1,
                            payload: replacement.into_payload(),
                        },
                        Err(error) => ChainState::Failed { index, error },
                    }
                }
                ChainState::Advancing { next, payload } => ChainState::Pending {
                    index: next,
                    payload,
                },
                ChainState::Replaced { next, payload } => {
                    tracing::debug!(
                        request_id = %request.id,
                        index = next - 1,
                        kind = payload.kind().as_str(),
                        "onSend hook replaced payload"
                    );
                    ChainState::Pending {
                        index: next,
                        payload,
                    }
                }
                ChainState::Failed { index, error } => {
                    let hook = self.hooks[index].name().to_string();
                    tracing::warn!(
                        request_id = %request.id,
                        hook = %hook,
                        error = %error,
                        "onSend hook failed"
                    );
                    return Err(ReplyError::HookChain {
                        hook,
                        source: error,
                    });
                }
            };
        }
    }
}
