//! Payload classification.
//!
//! Every value a handler or hook produces is normalized into one [`Payload`]
//! variant so the rest of the pipeline pattern-matches instead of inspecting
//! shapes at runtime.

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

use crate::pipeline::envelope::Envelope;
use crate::pipeline::stream::ByteStream;

/// Tag of a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Empty,
    Buffer,
    Text,
    StructuredData,
    ByteStream,
    Envelope,
}

impl PayloadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Empty => "empty",
            PayloadKind::Buffer => "buffer",
            PayloadKind::Text => "text",
            PayloadKind::StructuredData => "structured",
            PayloadKind::ByteStream => "stream",
            PayloadKind::Envelope => "envelope",
        }
    }
}

/// A response body (or full envelope) moving through the pipeline.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Buffer(Bytes),
    Text(String),
    Structured(Value),
    Stream(ByteStream),
    Envelope(Envelope),
}

impl Payload {
    /// Classify any payload-like value.
    pub fn classify(value: impl IntoPayload) -> Payload {
        value.into_payload()
    }

    /// Structured payload from any serializable value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Payload, serde_json::Error> {
        serde_json::to_value(value).map(Payload::classify)
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Empty => PayloadKind::Empty,
            Payload::Buffer(_) => PayloadKind::Buffer,
            Payload::Text(_) => PayloadKind::Text,
            Payload::Structured(_) => PayloadKind::StructuredData,
            Payload::Stream(_) => PayloadKind::ByteStream,
            Payload::Envelope(_) => PayloadKind::Envelope,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// Conversion into a classified [`Payload`].
pub trait IntoPayload {
    fn into_payload(self) -> Payload;
}

impl IntoPayload for Payload {
    fn into_payload(self) -> Payload {
        // Replacements from hooks may carry a JSON null built by hand.
        match self {
            Payload::Structured(Value::Null) => Payload::Empty,
            other => other,
        }
    }
}

impl IntoPayload for () {
    fn into_payload(self) -> Payload {
        Payload::Empty
    }
}

impl<T: IntoPayload> IntoPayload for Option<T> {
    fn into_payload(self) -> Payload {
        match self {
            Some(value) => value.into_payload(),
            None => Payload::Empty,
        }
    }
}

impl IntoPayload for Envelope {
    fn into_payload(self) -> Payload {
        Payload::Envelope(self)
    }
}

impl IntoPayload for ByteStream {
    fn into_payload(self) -> Payload {
        Payload::Stream(self)
    }
}

impl IntoPayload for Value {
    fn into_payload(self) -> Payload {
        match self {
            Value::Null => Payload::Empty,
            other => Payload::Structured(other),
        }
    }
}

impl IntoPayload for Bytes {
    fn into_payload(self) -> Payload {
        Payload::Buffer(self)
    }
}

impl IntoPayload for Vec<u8> {
    fn into_payload(self) -> Payload {
        Payload::Buffer(Bytes::from(self))
    }
}

impl IntoPayload for &'static [u8] {
    fn into_payload(self) -> Payload {
        Payload::Buffer(Bytes::from_static(self))
    }
}

impl IntoPayload for String {
    fn into_payload(self) -> Payload {
        Payload::Text(self)
    }
}

impl IntoPayload for &'static str {
    fn into_payload(self) -> Payload {
        Payload::Text(self.to_string())
    }
}

macro_rules! payload_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Payload {
                fn from(value: $ty) -> Self {
                    value.into_payload()
                }
            }
        )*
    };
}

payload_from!(Envelope, ByteStream, Value, Bytes, Vec<u8>, &'static [u8], String, &'static str);
