use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Failure to map between a typed domain event and its stored `(kind, payload)` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventCodecError {
    /// The stored kind is not one this aggregate's fold knows about.
    #[error("unknown event kind '{kind}'")]
    UnknownKind { kind: String },

    /// The payload does not match the schema of its kind.
    #[error("malformed payload for '{kind}': {message}")]
    Payload { kind: String, message: String },
}

/// A domain event with a stable, persisted representation.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - identified in storage by a dotted `kind` (e.g. `assets.area.removed`)
/// - stored as a JSON payload whose schema is fixed per kind
///
/// `decode` is the inverse of `(kind, encode)` and must reject kinds it does not know,
/// so that a replay never silently skips history.
pub trait DomainEvent: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event kind identifier.
    fn kind(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Serialize the event body (without the kind tag).
    fn encode(&self) -> Result<JsonValue, EventCodecError>;

    /// Rebuild a typed event from a stored kind + payload.
    fn decode(kind: &str, payload: &JsonValue) -> Result<Self, EventCodecError>;
}

pub fn encode_payload<T: Serialize>(kind: &str, body: &T) -> Result<JsonValue, EventCodecError> {
    serde_json::to_value(body).map_err(|e| EventCodecError::Payload {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}

pub fn decode_payload<T: DeserializeOwned>(
    kind: &str,
    payload: &JsonValue,
) -> Result<T, EventCodecError> {
    T::deserialize(payload).map_err(|e| EventCodecError::Payload {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}

/// Implement [`DomainEvent`] for an enum whose variants each wrap one payload struct.
///
/// Every payload struct must carry an `occurred_at: DateTime<Utc>` field.
///
/// ```ignore
/// impl_domain_event!(FarmEvent {
///     Created(FarmCreated) => FARM_CREATED,
///     NameChanged(FarmNameChanged) => FARM_NAME_CHANGED,
/// });
/// ```
#[macro_export]
macro_rules! impl_domain_event {
    ($enum:ident { $($variant:ident($payload:ty) => $kind:expr),+ $(,)? }) => {
        impl $crate::DomainEvent for $enum {
            fn kind(&self) -> &'static str {
                match self {
                    $( $enum::$variant(_) => $kind, )+
                }
            }

            fn occurred_at(&self) -> $crate::DateTime<$crate::Utc> {
                match self {
                    $( $enum::$variant(e) => e.occurred_at, )+
                }
            }

            fn encode(&self) -> Result<$crate::JsonValue, $crate::EventCodecError> {
                match self {
                    $( $enum::$variant(e) => $crate::encode_payload($kind, e), )+
                }
            }

            fn decode(
                kind: &str,
                payload: &$crate::JsonValue,
            ) -> Result<Self, $crate::EventCodecError> {
                $(
                    if kind == $kind {
                        let body: $payload = $crate::decode_payload(kind, payload)?;
                        return Ok($enum::$variant(body));
                    }
                )+
                Err($crate::EventCodecError::UnknownKind { kind: kind.to_string() })
            }
        }
    };
}
