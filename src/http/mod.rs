//! HTTP framework surface around the reply pipeline.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, route table)
//!     → request.rs (RequestContext with request ID)
//!     → handler.rs (dispatch: handler runs against a fresh Reply)
//!     → pipeline (hooks, finalize, single hand-off)
//!     → Send to client
//!
//! Tests:
//!     inject.rs → handler.rs → pipeline → materialized body
//! ```

pub mod app;
pub mod handler;
pub mod inject;
pub mod request;
pub mod server;

pub use app::{App, AppBuilder, Route};
pub use handler::{dispatch, handler_fn, Handler, HandlerResult, NotFound};
pub use inject::{InjectError, InjectedResponse, Injector};
pub use request::{RequestContext, X_REQUEST_ID};
pub use server::HttpServer;
