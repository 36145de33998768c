//! Reply construction pipeline for an async HTTP framework.
//!
//! A handler produces a value, onSend hooks may inspect or replace it, and
//! the finalizer turns the result into exactly one response on the wire.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;

pub use config::schema::ServerConfig;
pub use http::{App, HttpServer, Injector, RequestContext};
pub use lifecycle::Shutdown;
pub use pipeline::{ByteStream, Envelope, Payload, Reply};
