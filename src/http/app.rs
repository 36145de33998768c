//! Application setup: routes, onSend hooks and the serializer.
//!
//! Everything here happens before requests are served. `build()` freezes the
//! hook list, so dispatch only ever reads it.

use std::sync::Arc;

use axum::http::Method;

use crate::http::handler::Handler;
use crate::pipeline::finalize::{Finalizer, Serializer};
use crate::pipeline::hooks::{HookRegistry, OnSendHook};
use crate::pipeline::reply::Pipeline;

/// A handler bound to a method and path.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub handler: Arc<dyn Handler>,
}

/// Collects routes and hooks during setup.
#[derive(Default)]
pub struct AppBuilder {
    hooks: HookRegistry,
    serializer: Option<Arc<dyn Serializer>>,
    routes: Vec<Route>,
}

impl AppBuilder {
    /// Register an onSend hook. Hooks run in registration order.
    pub fn on_send(mut self, hook: impl OnSendHook + 'static) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn route(mut self, method: Method, path: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.routes.push(Route {
            method,
            path: path.into(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Replace the serializer used for structured payloads.
    pub fn serializer(mut self, serializer: impl Serializer + 'static) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    pub fn build(self) -> App {
        tracing::debug!(
            routes = self.routes.len(),
            hooks = self.hooks.len(),
            "Application built"
        );
        let finalizer = self
            .serializer
            .map(Finalizer::new)
            .unwrap_or_default();
        App {
            pipeline: Pipeline::new(self.hooks.freeze(), finalizer),
            routes: self.routes.into(),
        }
    }
}

/// Frozen application: routes plus the shared reply pipeline.
#[derive(Clone)]
pub struct App {
    pipeline: Pipeline,
    routes: Arc<[Route]>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Exact method and path lookup.
    pub fn find(&self, method: &Method, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.method == *method && r.path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::handler_fn;
    use crate::pipeline::error::AppError;
    use crate::pipeline::hooks::hook_fn;

    #[test]
    fn test_builder_collects_routes_and_hooks() {
        let app = App::builder()
            .on_send(hook_fn("noop", |_req, _payload| async { Ok(None) }))
            .route(Method::GET, "/a", handler_fn(|_req| async { Ok::<_, AppError>("a") }))
            .route(Method::POST, "/a", handler_fn(|_req| async { Ok::<_, AppError>("post a") }))
            .build();

        assert_eq!(app.routes().len(), 2);
        assert_eq!(app.pipeline().hooks.len(), 1);
        assert!(app.find(&Method::POST, "/a").is_some());
        assert!(app.find(&Method::DELETE, "/a").is_none());
        assert!(app.find(&Method::GET, "/b").is_none());
    }
}
