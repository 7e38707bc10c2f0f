//! Domain events, the event record, and the in-process event bus.

pub mod bus;
pub mod event;
pub mod in_memory_bus;
pub mod integration;
pub mod projection;
pub mod record;

pub use bus::{EventBus, EventHandler, HandlerFailure, PublishReport};
pub use event::{DomainEvent, EventCodecError, decode_payload, encode_payload};
pub use in_memory_bus::{InMemoryEventBus, SubscriptionTable, SubscriptionTableBuilder};
pub use projection::{ForeignProjector, ProjectionError, Projector, RowChange};
pub use record::{EventRecord, NewEvent};

pub use chrono::{DateTime, Utc};
pub use serde_json::Value as JsonValue;
