//! Reply-construction pipeline.
//!
//! # Data Flow
//! ```text
//! handler result / reply.send(value)
//!     → payload.rs   (classify into Empty | Buffer | Text | Structured | Stream | Envelope)
//!     → hooks.rs     (onSend hooks, in order; each may replace the payload)
//!     → envelope.rs  (if the settled payload is an envelope: status/header precedence)
//!     → finalize.rs  (bodyless policy, serialization, stream reader attach)
//!     → transport.rs (exactly one {status, headers, body} hand-off)
//! ```
//!
//! # Design Decisions
//! - Payloads are a closed sum type; downstream code pattern-matches
//! - Stream reuse is detected through monotonic `locked`/`consumed` flags
//! - Any failure before the hand-off is replaced by a structured error response
//! - The hook list is frozen before requests are served and only read afterwards

pub mod envelope;
pub mod error;
pub mod finalize;
pub mod hooks;
pub mod payload;
pub mod reply;
pub mod stream;
pub mod transport;

pub use envelope::{is_bodyless, Envelope};
pub use error::{AppError, ReplyError, StreamError};
pub use finalize::{ErrorBody, Finalizer, JsonSerializer, Serializer};
pub use hooks::{head_hook_fn, hook_fn, HookChain, HookRegistry, HookResult, OnSendHook};
pub use payload::{IntoPayload, Payload, PayloadKind};
pub use reply::{Pipeline, Reply, ReplyHead};
pub use stream::{ByteStream, StreamReader};
pub use transport::{FinalResponse, ResponseBody, Transport};
