//! Projection implementations (read model builders).
//!
//! Projections consume domain events and build query-optimized read models.
//! All projections are:
//! - **Rebuildable**: rows can be reconstructed from the event log
//! - **Pure**: a projector only computes the next row; the read store does the rest
//! - **Idempotent**: safe for at-least-once delivery (high-water-marks)

use tania_events::{DomainEvent, EventRecord, ProjectionError};

pub mod assets;
pub mod growth;
pub mod references;
pub mod tasks;
pub mod users;

pub use assets::{
    AreaProjector, AreaRow, FarmProjector, FarmRow, MaterialProjector, MaterialRow,
    ReservoirProjector, ReservoirRow,
};
pub use growth::{
    AreaMention, AreaReferenceMarker, CropActivity, CropActivityKind, CropActivityProjector,
    CropActivityRow, CropAreaRow, CropProjector, CropRow,
};
pub use references::{ReferenceProjector, ReferenceRow};
pub use tasks::{AssetReferenceMarker, TaskAsset, TaskProjector, TaskRow};
pub use users::{UserProjector, UserRow};

/// View names, also used as the `view` column of the Postgres row table.
pub mod views {
    pub const FARMS: &str = "farms";
    pub const AREAS: &str = "areas";
    pub const RESERVOIRS: &str = "reservoirs";
    pub const MATERIALS: &str = "materials";
    pub const CROPS: &str = "crops";
    pub const CROP_ACTIVITIES: &str = "crop_activities";
    pub const AREA_REFS: &str = "area_refs";
    pub const TASKS: &str = "tasks";
    pub const ASSET_REFS: &str = "asset_refs";
    pub const USERS: &str = "users";
}

pub(crate) fn decode<E: DomainEvent>(record: &EventRecord) -> Result<E, ProjectionError> {
    Ok(record.decode::<E>()?)
}

/// An update arrived for a row that was never created.
pub(crate) fn missing_row(record: &EventRecord) -> ProjectionError {
    ProjectionError::Inconsistent {
        aggregate_id: record.aggregate_id(),
        message: format!("'{}' applied before creation", record.kind()),
    }
}
