//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router from the application's routes
//! - Wire up middleware (tracing, timeout, request ID)
//! - Dispatch each request through the reply pipeline
//! - Serve until the shutdown signal fires

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Body,
    http::Request,
    response::Response,
    routing::{MethodFilter, MethodRouter},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::http::app::{App, Route};
use crate::http::handler::{dispatch, NotFound};
use crate::http::request::RequestContext;
use crate::pipeline::reply::Pipeline;

/// HTTP server serving an [`App`].
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServerConfig, app: App) -> Self {
        let router = Self::build_router(&config, &app);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, app: &App) -> Router {
        let mut by_path: BTreeMap<&str, MethodRouter> = BTreeMap::new();

        for route in app.routes() {
            let filter = match MethodFilter::try_from(route.method.clone()) {
                Ok(filter) => filter,
                Err(e) => {
                    tracing::warn!(method = %route.method, path = %route.path, error = %e, "Skipping route");
                    continue;
                }
            };
            let handler = route_handler(route.clone(), app.pipeline().clone());
            let entry = by_path.remove(route.path.as_str()).unwrap_or_else(MethodRouter::new);
            by_path.insert(route.path.as_str(), entry.on(filter, handler));
        }

        let mut router = Router::new();
        for (path, method_router) in by_path {
            router = router.route(path, method_router);
        }

        let pipeline = app.pipeline().clone();
        router
            .fallback(move |request: Request<Body>| {
                let pipeline = pipeline.clone();
                async move {
                    let (parts, _body) = request.into_parts();
                    let ctx = RequestContext::from_parts(&parts);
                    dispatch(&NotFound, ctx, &pipeline).await.into_http()
                }
            })
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Router for in-process use (e.g. `tower::ServiceExt::oneshot`).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

fn route_handler(
    route: Route,
    pipeline: Pipeline,
) -> impl Fn(Request<Body>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
       + Clone
       + Send
       + Sync
       + 'static {
    move |request: Request<Body>| {
        let handler = route.handler.clone();
        let pipeline = pipeline.clone();
        Box::pin(async move {
            let (parts, _body) = request.into_parts();
            let ctx = RequestContext::from_parts(&parts);
            tracing::debug!(request_id = %ctx.id, method = %ctx.method, path = %ctx.path(), "Dispatching request");
            dispatch(handler.as_ref(), ctx, &pipeline).await.into_http()
        })
    }
}
