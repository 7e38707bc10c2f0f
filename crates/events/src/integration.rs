//! Integration contract between bounded contexts.
//!
//! A consuming context may only depend on the kinds listed here and on the payload
//! fields read by [`reference_fact`]. Everything else in a producer's payloads is
//! private to the producer and may change freely.

use serde_json::Value as JsonValue;

use crate::event::EventCodecError;
use crate::record::EventRecord;

pub const AREA_CREATED: &str = "assets.area.created";
pub const AREA_NAME_CHANGED: &str = "assets.area.name_changed";
pub const AREA_REMOVED: &str = "assets.area.removed";

pub const RESERVOIR_CREATED: &str = "assets.reservoir.created";
pub const RESERVOIR_NAME_CHANGED: &str = "assets.reservoir.name_changed";
pub const RESERVOIR_REMOVED: &str = "assets.reservoir.removed";

pub const MATERIAL_CREATED: &str = "assets.material.created";
pub const MATERIAL_NAME_CHANGED: &str = "assets.material.name_changed";
pub const MATERIAL_REMOVED: &str = "assets.material.removed";

pub const CROP_BATCH_CREATED: &str = "growth.crop.batch_created";
pub const CROP_BATCH_ARCHIVED: &str = "growth.crop.batch_archived";

/// Kinds a context mirroring areas subscribes to.
pub const AREA_REFERENCE_KINDS: &[&str] = &[AREA_CREATED, AREA_NAME_CHANGED, AREA_REMOVED];

/// Kinds a context mirroring any task-assignable asset subscribes to.
pub const ASSET_REFERENCE_KINDS: &[&str] = &[
    AREA_CREATED,
    AREA_NAME_CHANGED,
    AREA_REMOVED,
    RESERVOIR_CREATED,
    RESERVOIR_NAME_CHANGED,
    RESERVOIR_REMOVED,
    MATERIAL_CREATED,
    MATERIAL_NAME_CHANGED,
    MATERIAL_REMOVED,
    CROP_BATCH_CREATED,
    CROP_BATCH_ARCHIVED,
];

/// What an integration event says about the referenced aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceFact {
    Created { name: String },
    Renamed { name: String },
    /// Removed (assets) or archived (crops); the aggregate rejects every further command.
    Retired,
}

/// Whether `kind` ends the life of the aggregate that emitted it.
pub fn is_retirement(kind: &str) -> bool {
    matches!(
        kind,
        AREA_REMOVED | RESERVOIR_REMOVED | MATERIAL_REMOVED | CROP_BATCH_ARCHIVED
    )
}

/// Tolerant reader over the integration kinds.
///
/// Returns `Ok(None)` for kinds outside the contract; only the documented fields are
/// read, unknown fields are ignored.
pub fn reference_fact(record: &EventRecord) -> Result<Option<ReferenceFact>, EventCodecError> {
    let kind = record.kind();
    let fact = match kind {
        AREA_CREATED | RESERVOIR_CREATED | MATERIAL_CREATED => ReferenceFact::Created {
            name: string_field(kind, record.payload(), "name")?,
        },
        CROP_BATCH_CREATED => ReferenceFact::Created {
            name: string_field(kind, record.payload(), "batch_id")?,
        },
        AREA_NAME_CHANGED | RESERVOIR_NAME_CHANGED | MATERIAL_NAME_CHANGED => {
            ReferenceFact::Renamed {
                name: string_field(kind, record.payload(), "name")?,
            }
        }
        _ if is_retirement(kind) => ReferenceFact::Retired,
        _ => return Ok(None),
    };
    Ok(Some(fact))
}

fn string_field(kind: &str, payload: &JsonValue, field: &str) -> Result<String, EventCodecError> {
    payload
        .get(field)
        .and_then(JsonValue::as_str)
        .map(str::to_owned)
        .ok_or_else(|| EventCodecError::Payload {
            kind: kind.to_string(),
            message: format!("missing string field '{field}'"),
        })
}
