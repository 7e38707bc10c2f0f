//! Growth read models: crop batches and their activity log.
//!
//! Both views join crop events with area names taken from the growth context's own
//! `area_refs` mirror. Names are resolved when a row is written and patched by
//! [`AreaReferenceMarker`] when an area changes later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_assets::{AreaId, FarmId, MaterialId};
use tania_core::{AggregateType, Note};
use tania_events::{EventRecord, ForeignProjector, ProjectionError, Projector, RowChange};
use tania_growth::{
    ContainerType, CropContainer, CropEvent, CropId, CropStatus, CropType, HarvestType,
};

use super::references::{ReferenceRow, lookup, mirrored};
use super::{decode, missing_row};
use crate::read_model::ReadStore;

// ─────────────────────────────────────────────────────────────────────────────
// Crop rows
// ─────────────────────────────────────────────────────────────────────────────

/// Plants of a batch currently in one area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropAreaRow {
    pub area_id: AreaId,
    /// `None` until the area shows up in the mirror.
    pub area_name: Option<String>,
    pub quantity: u32,
    pub last_watered: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRow {
    pub crop_id: CropId,
    pub farm_id: FarmId,
    pub batch_id: String,
    pub crop_type: CropType,
    pub container: CropContainer,
    pub material_id: MaterialId,
    pub initial_area_id: AreaId,
    pub initial_quantity: u32,
    /// Areas holding at least one plant.
    pub areas: Vec<CropAreaRow>,
    pub harvested: u32,
    pub dumped: u32,
    pub notes: Vec<Note>,
    pub status: CropStatus,
    /// One of the areas holding plants has been removed.
    pub dependency_removed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CropRow {
    pub fn current_quantity(&self) -> u32 {
        self.areas.iter().map(|a| a.quantity).sum()
    }

    pub fn is_in(&self, area_id: AreaId) -> bool {
        self.areas.iter().any(|a| a.area_id == area_id)
    }

    fn add_to(&mut self, area_id: AreaId, quantity: u32) {
        match self.areas.iter_mut().find(|a| a.area_id == area_id) {
            Some(area) => area.quantity += quantity,
            None => self.areas.push(CropAreaRow {
                area_id,
                area_name: None,
                quantity,
                last_watered: None,
            }),
        }
    }

    fn take_from(&mut self, area_id: AreaId, quantity: u32) {
        if let Some(area) = self.areas.iter_mut().find(|a| a.area_id == area_id) {
            area.quantity = area.quantity.saturating_sub(quantity);
        }
        self.areas.retain(|a| a.quantity > 0);
    }
}

/// Maintains `crops` from crop events.
pub struct CropProjector {
    area_refs: ReadStore<ReferenceRow>,
}

impl CropProjector {
    pub fn new(area_refs: ReadStore<ReferenceRow>) -> Self {
        Self { area_refs }
    }

    /// Copy names and the removal state of every current area from the mirror.
    fn resolve_areas(&self, row: &mut CropRow) -> Result<(), ProjectionError> {
        let mut removed = false;
        for area in &mut row.areas {
            if let Some(reference) = lookup(&self.area_refs, area.area_id.aggregate_id())? {
                area.area_name = Some(reference.name);
                removed |= reference.retired;
            }
        }
        row.dependency_removed = removed;
        Ok(())
    }
}

impl Projector<CropRow> for CropProjector {
    fn sources(&self) -> &[AggregateType] {
        &[AggregateType::Crop]
    }

    fn project(
        &self,
        current: Option<&CropRow>,
        record: &EventRecord,
    ) -> Result<RowChange<CropRow>, ProjectionError> {
        let event: CropEvent = decode(record)?;

        let mut row = match (event, current) {
            (CropEvent::BatchCreated(e), _) => CropRow {
                crop_id: e.crop_id,
                farm_id: e.farm_id,
                batch_id: e.batch_id,
                crop_type: e.crop_type,
                container: e.container,
                material_id: e.material_id,
                initial_area_id: e.area_id,
                initial_quantity: e.quantity,
                areas: vec![CropAreaRow {
                    area_id: e.area_id,
                    area_name: None,
                    quantity: e.quantity,
                    last_watered: None,
                }],
                harvested: 0,
                dumped: 0,
                notes: Vec::new(),
                status: CropStatus::Active,
                dependency_removed: false,
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
            },
            (_, None) => return Err(missing_row(record)),
            (event, Some(row)) => {
                let mut row = row.clone();
                match event {
                    CropEvent::BatchCreated(_) => {}
                    CropEvent::BatchMoved(e) => {
                        row.take_from(e.source_area_id, e.quantity);
                        row.add_to(e.destination_area_id, e.quantity);
                    }
                    CropEvent::BatchWatered(e) => {
                        if let Some(area) = row.areas.iter_mut().find(|a| a.area_id == e.area_id) {
                            area.last_watered = Some(e.occurred_at);
                        }
                    }
                    CropEvent::BatchHarvested(e) => {
                        row.take_from(e.area_id, e.quantity);
                        row.harvested += e.quantity;
                    }
                    CropEvent::BatchDumped(e) => {
                        row.take_from(e.area_id, e.quantity);
                        row.dumped += e.quantity;
                    }
                    CropEvent::NoteAdded(e) => row.notes.push(Note {
                        id: e.note_id,
                        content: e.content,
                        created_at: e.occurred_at,
                    }),
                    CropEvent::NoteRemoved(e) => row.notes.retain(|n| n.id != e.note_id),
                    CropEvent::BatchArchived(_) => row.status = CropStatus::Archived,
                }
                row.updated_at = record.occurred_at();
                row
            }
        };

        self.resolve_areas(&mut row)?;
        Ok(RowChange::Upsert(row))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Crop activity log
// ─────────────────────────────────────────────────────────────────────────────

/// An area as named when the activity was recorded (kept current by the marker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaMention {
    pub area_id: AreaId,
    pub area_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum CropActivityKind {
    Seeded {
        area: AreaMention,
        quantity: u32,
        container_type: ContainerType,
    },
    Moved {
        source: AreaMention,
        destination: AreaMention,
        quantity: u32,
    },
    Watered {
        area: AreaMention,
    },
    Harvested {
        area: AreaMention,
        harvest_type: HarvestType,
        quantity: u32,
    },
    Dumped {
        area: AreaMention,
        quantity: u32,
    },
    Archived,
}

impl CropActivityKind {
    fn mentions_mut(&mut self) -> Vec<&mut AreaMention> {
        match self {
            CropActivityKind::Seeded { area, .. }
            | CropActivityKind::Watered { area }
            | CropActivityKind::Harvested { area, .. }
            | CropActivityKind::Dumped { area, .. } => vec![area],
            CropActivityKind::Moved {
                source,
                destination,
                ..
            } => vec![source, destination],
            CropActivityKind::Archived => vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropActivity {
    /// Sequence of the crop event that produced the activity.
    pub sequence: u64,
    pub occurred_at: DateTime<Utc>,
    pub kind: CropActivityKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropActivityRow {
    pub crop_id: CropId,
    pub batch_id: String,
    /// Oldest first.
    pub activities: Vec<CropActivity>,
}

/// Maintains `crop_activities` from crop events. Notes are not activities.
pub struct CropActivityProjector {
    area_refs: ReadStore<ReferenceRow>,
}

impl CropActivityProjector {
    pub fn new(area_refs: ReadStore<ReferenceRow>) -> Self {
        Self { area_refs }
    }

    fn mention(&self, area_id: AreaId) -> Result<AreaMention, ProjectionError> {
        Ok(AreaMention {
            area_id,
            area_name: lookup(&self.area_refs, area_id.aggregate_id())?.map(|r| r.name),
        })
    }
}

impl Projector<CropActivityRow> for CropActivityProjector {
    fn sources(&self) -> &[AggregateType] {
        &[AggregateType::Crop]
    }

    fn project(
        &self,
        current: Option<&CropActivityRow>,
        record: &EventRecord,
    ) -> Result<RowChange<CropActivityRow>, ProjectionError> {
        let event: CropEvent = decode(record)?;

        let (mut row, kind) = match (event, current) {
            (CropEvent::BatchCreated(e), _) => {
                let row = CropActivityRow {
                    crop_id: e.crop_id,
                    batch_id: e.batch_id,
                    activities: Vec::new(),
                };
                let kind = CropActivityKind::Seeded {
                    area: self.mention(e.area_id)?,
                    quantity: e.quantity,
                    container_type: e.container.container_type,
                };
                (row, kind)
            }
            (_, None) => return Err(missing_row(record)),
            (event, Some(row)) => {
                let kind = match event {
                    CropEvent::BatchCreated(_)
                    | CropEvent::NoteAdded(_)
                    | CropEvent::NoteRemoved(_) => return Ok(RowChange::Unchanged),
                    CropEvent::BatchMoved(e) => CropActivityKind::Moved {
                        source: self.mention(e.source_area_id)?,
                        destination: self.mention(e.destination_area_id)?,
                        quantity: e.quantity,
                    },
                    CropEvent::BatchWatered(e) => CropActivityKind::Watered {
                        area: self.mention(e.area_id)?,
                    },
                    CropEvent::BatchHarvested(e) => CropActivityKind::Harvested {
                        area: self.mention(e.area_id)?,
                        harvest_type: e.harvest_type,
                        quantity: e.quantity,
                    },
                    CropEvent::BatchDumped(e) => CropActivityKind::Dumped {
                        area: self.mention(e.area_id)?,
                        quantity: e.quantity,
                    },
                    CropEvent::BatchArchived(_) => CropActivityKind::Archived,
                };
                (row.clone(), kind)
            }
        };

        row.activities.push(CropActivity {
            sequence: record.sequence(),
            occurred_at: record.occurred_at(),
            kind,
        });
        Ok(RowChange::Upsert(row))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Area changes seen by growth rows
// ─────────────────────────────────────────────────────────────────────────────

/// Patches crop and activity rows when an area they mention is renamed or removed.
///
/// The fact is the mirror's current row for the area, so re-delivered area events
/// leave the rows as they are.
#[derive(Debug, Clone)]
pub struct AreaReferenceMarker {
    area_refs: ReadStore<ReferenceRow>,
}

impl AreaReferenceMarker {
    pub fn new(area_refs: ReadStore<ReferenceRow>) -> Self {
        Self { area_refs }
    }
}

impl ForeignProjector<CropRow> for AreaReferenceMarker {
    type Fact = ReferenceRow;

    fn interpret(&self, record: &EventRecord) -> Result<Option<ReferenceRow>, ProjectionError> {
        mirrored(&self.area_refs, record)
    }

    fn project(&self, row: &CropRow, area: &ReferenceRow) -> RowChange<CropRow> {
        let area_id = AreaId::new(area.id);
        if !row.is_in(area_id) {
            return RowChange::Unchanged;
        }

        let mut next = row.clone();
        for current in next.areas.iter_mut().filter(|a| a.area_id == area_id) {
            current.area_name = Some(area.name.clone());
        }
        if area.retired {
            next.dependency_removed = true;
        }

        if &next == row {
            RowChange::Unchanged
        } else {
            RowChange::Upsert(next)
        }
    }
}

impl ForeignProjector<CropActivityRow> for AreaReferenceMarker {
    type Fact = ReferenceRow;

    fn interpret(&self, record: &EventRecord) -> Result<Option<ReferenceRow>, ProjectionError> {
        mirrored(&self.area_refs, record)
    }

    fn project(&self, row: &CropActivityRow, area: &ReferenceRow) -> RowChange<CropActivityRow> {
        let area_id = AreaId::new(area.id);

        let mut next = row.clone();
        let mut changed = false;
        for activity in &mut next.activities {
            for mention in activity.kind.mentions_mut() {
                if mention.area_id == area_id && mention.area_name.as_deref() != Some(area.name.as_str()) {
                    mention.area_name = Some(area.name.clone());
                    changed = true;
                }
            }
        }

        if changed {
            RowChange::Upsert(next)
        } else {
            RowChange::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use tania_events::integration::{AREA_CREATED, AREA_NAME_CHANGED, AREA_REMOVED};
    use tania_events::NewEvent;
    use tania_growth::{CropBatchCreated, CropBatchMoved, CropBatchWatered, CropNoteAdded};

    use super::*;
    use crate::projections::ReferenceProjector;
    use crate::read_model::InMemoryRowStore;

    struct Fixture {
        area_refs: ReadStore<ReferenceRow>,
        crops: ReadStore<CropRow>,
        activities: ReadStore<CropActivityRow>,
    }

    fn fixture() -> Fixture {
        let area_refs = ReadStore::new(
            "area_refs",
            Arc::new(InMemoryRowStore::new()),
            Arc::new(ReferenceProjector::new([AggregateType::Area])),
        );
        let crops = ReadStore::new(
            "crops",
            Arc::new(InMemoryRowStore::new()),
            Arc::new(CropProjector::new(area_refs.clone())),
        );
        let activities = ReadStore::new(
            "crop_activities",
            Arc::new(InMemoryRowStore::new()),
            Arc::new(CropActivityProjector::new(area_refs.clone())),
        );
        Fixture {
            area_refs,
            crops,
            activities,
        }
    }

    fn area_record(area_id: AreaId, sequence: u64, kind: &str, name: &str) -> EventRecord {
        EventRecord::new(
            AggregateType::Area,
            area_id.aggregate_id(),
            sequence,
            NewEvent::new(kind, json!({ "name": name }), Utc::now()),
        )
    }

    fn crop_record(crop_id: CropId, sequence: u64, event: &CropEvent) -> EventRecord {
        EventRecord::new(
            AggregateType::Crop,
            crop_id.aggregate_id(),
            sequence,
            NewEvent::from_domain(event).unwrap(),
        )
    }

    fn planted(crop_id: CropId, area_id: AreaId) -> CropEvent {
        CropEvent::BatchCreated(CropBatchCreated {
            crop_id,
            farm_id: FarmId::generate(),
            batch_id: "tom-19oct".into(),
            crop_type: CropType::Nursery,
            container: CropContainer {
                container_type: ContainerType::Tray { cells: 24 },
                quantity: 2,
            },
            material_id: MaterialId::generate(),
            area_id,
            quantity: 48,
            occurred_at: Utc::now(),
        })
    }

    impl Fixture {
        fn area(&self, record: &EventRecord) {
            self.area_refs.apply(record).unwrap();
            let marker = AreaReferenceMarker::new(self.area_refs.clone());
            self.crops.apply_foreign(record, &marker).unwrap();
            self.activities.apply_foreign(record, &marker).unwrap();
        }

        fn crop(&self, record: &EventRecord) {
            self.crops.apply(record).unwrap();
            self.activities.apply(record).unwrap();
        }
    }

    #[test]
    fn crop_row_resolves_area_names_from_the_mirror() {
        let f = fixture();
        let area_id = AreaId::generate();
        let crop_id = CropId::generate();

        f.area(&area_record(area_id, 1, AREA_CREATED, "Bench A"));
        f.crop(&crop_record(crop_id, 1, &planted(crop_id, area_id)));

        let row = f.crops.find(crop_id.aggregate_id()).unwrap();
        assert_eq!(row.areas[0].area_name.as_deref(), Some("Bench A"));
        assert!(!row.dependency_removed);

        f.area(&area_record(area_id, 2, AREA_NAME_CHANGED, "Bench North"));
        let row = f.crops.find(crop_id.aggregate_id()).unwrap();
        assert_eq!(row.areas[0].area_name.as_deref(), Some("Bench North"));

        let log = f.activities.find(crop_id.aggregate_id()).unwrap();
        let CropActivityKind::Seeded { area, quantity, .. } = &log.activities[0].kind else {
            panic!("expected a seeding activity");
        };
        assert_eq!(area.area_name.as_deref(), Some("Bench North"));
        assert_eq!(*quantity, 48);
    }

    #[test]
    fn removing_an_area_flags_the_crops_in_it() {
        let f = fixture();
        let area_id = AreaId::generate();
        let crop_id = CropId::generate();

        f.area(&area_record(area_id, 1, AREA_CREATED, "Bench A"));
        f.crop(&crop_record(crop_id, 1, &planted(crop_id, area_id)));
        f.area(&EventRecord::new(
            AggregateType::Area,
            area_id.aggregate_id(),
            2,
            NewEvent::new(AREA_REMOVED, json!({}), Utc::now()),
        ));

        assert!(f.crops.find(crop_id.aggregate_id()).unwrap().dependency_removed);

        // Later crop events keep the flag: it is recomputed from the mirror.
        let watered = CropEvent::BatchWatered(CropBatchWatered {
            area_id,
            occurred_at: Utc::now(),
        });
        f.crop(&crop_record(crop_id, 2, &watered));
        assert!(f.crops.find(crop_id.aggregate_id()).unwrap().dependency_removed);
    }

    #[test]
    fn moving_every_plant_out_of_an_area_drops_it() {
        let f = fixture();
        let (a, b) = (AreaId::generate(), AreaId::generate());
        let crop_id = CropId::generate();
        f.area(&area_record(a, 1, AREA_CREATED, "Seeding"));
        f.area(&area_record(b, 1, AREA_CREATED, "Growing"));
        f.crop(&crop_record(crop_id, 1, &planted(crop_id, a)));

        let moved = CropEvent::BatchMoved(CropBatchMoved {
            source_area_id: a,
            destination_area_id: b,
            quantity: 48,
            occurred_at: Utc::now(),
        });
        f.crop(&crop_record(crop_id, 2, &moved));

        let row = f.crops.find(crop_id.aggregate_id()).unwrap();
        assert_eq!(row.areas.len(), 1);
        assert_eq!(row.areas[0].area_id, b);
        assert_eq!(row.areas[0].area_name.as_deref(), Some("Growing"));
        assert_eq!(row.current_quantity(), 48);

        let log = f.activities.find(crop_id.aggregate_id()).unwrap();
        assert_eq!(log.activities.len(), 2);
        assert_eq!(log.activities[1].sequence, 2);
    }

    #[test]
    fn notes_advance_the_log_without_an_activity() {
        let f = fixture();
        let area_id = AreaId::generate();
        let crop_id = CropId::generate();
        f.crop(&crop_record(crop_id, 1, &planted(crop_id, area_id)));

        let noted = CropEvent::NoteAdded(CropNoteAdded {
            note_id: tania_core::NoteId::new(),
            content: "leaf curl".into(),
            occurred_at: Utc::now(),
        });
        f.crop(&crop_record(crop_id, 2, &noted));

        assert_eq!(f.crops.find(crop_id.aggregate_id()).unwrap().notes.len(), 1);
        let log = f.activities.find(crop_id.aggregate_id()).unwrap();
        assert_eq!(log.activities.len(), 1);
        let (_, stored) = f.activities.stored_rows().unwrap().remove(0);
        assert_eq!(stored.last_applied_sequence, 2);
    }

    #[test]
    fn unknown_area_leaves_the_name_empty() {
        let f = fixture();
        let crop_id = CropId::generate();
        f.crop(&crop_record(crop_id, 1, &planted(crop_id, AreaId::generate())));

        let row = f.crops.find(crop_id.aggregate_id()).unwrap();
        assert_eq!(row.areas[0].area_name, None);
        assert!(!row.dependency_removed);
    }

    #[test]
    fn late_area_events_do_not_roll_names_back() {
        let f = fixture();
        let area_id = AreaId::generate();
        let crop_id = CropId::generate();
        let created = area_record(area_id, 1, AREA_CREATED, "Bench A");

        f.area(&created);
        f.crop(&crop_record(crop_id, 1, &planted(crop_id, area_id)));
        f.area(&area_record(area_id, 2, AREA_NAME_CHANGED, "Bench North"));
        let before = f.crops.find(crop_id.aggregate_id()).unwrap();

        f.area(&created);

        assert_eq!(f.crops.find(crop_id.aggregate_id()).unwrap(), before);
        assert_eq!(before.areas[0].area_name.as_deref(), Some("Bench North"));
    }
}
