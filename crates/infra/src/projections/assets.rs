//! Assets read models: farms, areas, reservoirs and materials.
//!
//! One row per aggregate. Removed areas, reservoirs and materials leave a tombstone
//! (the row disappears from queries but keeps its high-water-mark).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tania_assets::{
    AreaEvent, AreaId, AreaLocation, AreaSize, AreaType, FarmEvent, FarmId, Geolocation,
    MaterialEvent, MaterialId, MaterialQuantity, MaterialType, Price, Region, ReservoirEvent,
    ReservoirId, WaterSource,
};
use tania_core::{AggregateType, Note};
use tania_events::{EventRecord, ProjectionError, Projector, RowChange};

use super::{decode, missing_row};

// ─────────────────────────────────────────────────────────────────────────────
// Farms
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmRow {
    pub farm_id: FarmId,
    pub name: String,
    pub farm_type: String,
    pub geolocation: Option<Geolocation>,
    pub region: Option<Region>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FarmProjector;

impl Projector<FarmRow> for FarmProjector {
    fn sources(&self) -> &[AggregateType] {
        &[AggregateType::Farm]
    }

    fn project(
        &self,
        current: Option<&FarmRow>,
        record: &EventRecord,
    ) -> Result<RowChange<FarmRow>, ProjectionError> {
        let event: FarmEvent = decode(record)?;

        if let FarmEvent::Created(e) = event {
            return Ok(RowChange::Upsert(FarmRow {
                farm_id: e.farm_id,
                name: e.name,
                farm_type: e.farm_type,
                geolocation: e.geolocation,
                region: e.region,
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
            }));
        }

        let mut row = current.cloned().ok_or_else(|| missing_row(record))?;
        match event {
            FarmEvent::Created(_) => {}
            FarmEvent::NameChanged(e) => row.name = e.name,
            FarmEvent::TypeChanged(e) => row.farm_type = e.farm_type,
            FarmEvent::GeolocationChanged(e) => row.geolocation = Some(e.geolocation),
            FarmEvent::RegionChanged(e) => row.region = Some(e.region),
        }
        row.updated_at = record.occurred_at();
        Ok(RowChange::Upsert(row))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Areas
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaRow {
    pub area_id: AreaId,
    pub farm_id: FarmId,
    pub name: String,
    pub size: AreaSize,
    pub area_type: AreaType,
    pub location: AreaLocation,
    pub reservoir_id: Option<ReservoirId>,
    pub notes: Vec<Note>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AreaProjector;

impl Projector<AreaRow> for AreaProjector {
    fn sources(&self) -> &[AggregateType] {
        &[AggregateType::Area]
    }

    fn project(
        &self,
        current: Option<&AreaRow>,
        record: &EventRecord,
    ) -> Result<RowChange<AreaRow>, ProjectionError> {
        let event: AreaEvent = decode(record)?;

        if let AreaEvent::Created(e) = event {
            return Ok(RowChange::Upsert(AreaRow {
                area_id: e.area_id,
                farm_id: e.farm_id,
                name: e.name,
                size: e.size,
                area_type: e.area_type,
                location: e.location,
                reservoir_id: e.reservoir_id,
                notes: Vec::new(),
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
            }));
        }

        let mut row = current.cloned().ok_or_else(|| missing_row(record))?;
        match event {
            AreaEvent::Created(_) => {}
            AreaEvent::NameChanged(e) => row.name = e.name,
            AreaEvent::SizeChanged(e) => row.size = e.size,
            AreaEvent::TypeChanged(e) => row.area_type = e.area_type,
            AreaEvent::LocationChanged(e) => row.location = e.location,
            AreaEvent::ReservoirChanged(e) => row.reservoir_id = e.reservoir_id,
            AreaEvent::NoteAdded(e) => row.notes.push(Note {
                id: e.note_id,
                content: e.content,
                created_at: e.occurred_at,
            }),
            AreaEvent::NoteRemoved(e) => row.notes.retain(|n| n.id != e.note_id),
            AreaEvent::Removed(_) => return Ok(RowChange::Remove),
        }
        row.updated_at = record.occurred_at();
        Ok(RowChange::Upsert(row))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reservoirs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirRow {
    pub reservoir_id: ReservoirId,
    pub farm_id: FarmId,
    pub name: String,
    pub water_source: WaterSource,
    pub notes: Vec<Note>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReservoirProjector;

impl Projector<ReservoirRow> for ReservoirProjector {
    fn sources(&self) -> &[AggregateType] {
        &[AggregateType::Reservoir]
    }

    fn project(
        &self,
        current: Option<&ReservoirRow>,
        record: &EventRecord,
    ) -> Result<RowChange<ReservoirRow>, ProjectionError> {
        let event: ReservoirEvent = decode(record)?;

        if let ReservoirEvent::Created(e) = event {
            return Ok(RowChange::Upsert(ReservoirRow {
                reservoir_id: e.reservoir_id,
                farm_id: e.farm_id,
                name: e.name,
                water_source: e.water_source,
                notes: Vec::new(),
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
            }));
        }

        let mut row = current.cloned().ok_or_else(|| missing_row(record))?;
        match event {
            ReservoirEvent::Created(_) => {}
            ReservoirEvent::NameChanged(e) => row.name = e.name,
            ReservoirEvent::WaterSourceChanged(e) => row.water_source = e.water_source,
            ReservoirEvent::NoteAdded(e) => row.notes.push(Note {
                id: e.note_id,
                content: e.content,
                created_at: e.occurred_at,
            }),
            ReservoirEvent::NoteRemoved(e) => row.notes.retain(|n| n.id != e.note_id),
            ReservoirEvent::Removed(_) => return Ok(RowChange::Remove),
        }
        row.updated_at = record.occurred_at();
        Ok(RowChange::Upsert(row))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Materials
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRow {
    pub material_id: MaterialId,
    pub name: String,
    pub material_type: MaterialType,
    pub price: Price,
    pub quantity: MaterialQuantity,
    pub expiration_date: Option<NaiveDate>,
    pub produced_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MaterialProjector;

impl Projector<MaterialRow> for MaterialProjector {
    fn sources(&self) -> &[AggregateType] {
        &[AggregateType::Material]
    }

    fn project(
        &self,
        current: Option<&MaterialRow>,
        record: &EventRecord,
    ) -> Result<RowChange<MaterialRow>, ProjectionError> {
        let event: MaterialEvent = decode(record)?;

        if let MaterialEvent::Created(e) = event {
            return Ok(RowChange::Upsert(MaterialRow {
                material_id: e.material_id,
                name: e.name,
                material_type: e.material_type,
                price: e.price,
                quantity: e.quantity,
                expiration_date: e.expiration_date,
                produced_by: e.produced_by,
                notes: e.notes,
                created_at: e.occurred_at,
                updated_at: e.occurred_at,
            }));
        }

        let mut row = current.cloned().ok_or_else(|| missing_row(record))?;
        match event {
            MaterialEvent::Created(_) => {}
            MaterialEvent::NameChanged(e) => row.name = e.name,
            MaterialEvent::PriceChanged(e) => row.price = e.price,
            MaterialEvent::QuantityChanged(e) => row.quantity = e.quantity,
            MaterialEvent::ExpirationChanged(e) => row.expiration_date = e.expiration_date,
            MaterialEvent::Removed(_) => return Ok(RowChange::Remove),
        }
        row.updated_at = record.occurred_at();
        Ok(RowChange::Upsert(row))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use tania_assets::{
        AreaCreated, AreaNameChanged, AreaRemoved, AreaUnit, FarmCreated, FarmNameChanged,
    };
    use tania_core::{AggregateId, NoteId};
    use tania_events::{DomainEvent, NewEvent};

    use super::*;

    fn record<E: DomainEvent>(
        aggregate_type: AggregateType,
        id: AggregateId,
        sequence: u64,
        event: &E,
    ) -> EventRecord {
        EventRecord::new(
            aggregate_type,
            id,
            sequence,
            NewEvent::from_domain(event).unwrap(),
        )
    }

    fn area_created(area_id: AreaId) -> AreaEvent {
        AreaEvent::Created(AreaCreated {
            area_id,
            farm_id: FarmId::generate(),
            name: "Nursery bench".into(),
            size: AreaSize {
                value: 12.5,
                unit: AreaUnit::SquareMeter,
            },
            area_type: AreaType::Seeding,
            location: AreaLocation::Indoor,
            reservoir_id: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn farm_row_tracks_renames() {
        let farm_id = FarmId::generate();
        let created = FarmEvent::Created(FarmCreated {
            farm_id,
            name: "Hillside".into(),
            farm_type: "organic".into(),
            geolocation: None,
            region: None,
            occurred_at: Utc::now(),
        });
        let renamed = FarmEvent::NameChanged(FarmNameChanged {
            name: "Hillside East".into(),
            occurred_at: Utc::now(),
        });

        let id = farm_id.aggregate_id();
        let row = match FarmProjector
            .project(None, &record(AggregateType::Farm, id, 1, &created))
            .unwrap()
        {
            RowChange::Upsert(row) => row,
            other => panic!("unexpected change: {other:?}"),
        };
        let next = FarmProjector
            .project(Some(&row), &record(AggregateType::Farm, id, 2, &renamed))
            .unwrap();

        match next {
            RowChange::Upsert(next) => {
                assert_eq!(next.name, "Hillside East");
                assert_eq!(next.created_at, row.created_at);
            }
            other => panic!("unexpected change: {other:?}"),
        }
    }

    #[test]
    fn area_removal_becomes_a_tombstone() {
        let area_id = AreaId::generate();
        let id = area_id.aggregate_id();
        let created = record(AggregateType::Area, id, 1, &area_created(area_id));
        let RowChange::Upsert(row) = AreaProjector.project(None, &created).unwrap() else {
            panic!("expected upsert");
        };

        let removed = AreaEvent::Removed(AreaRemoved {
            occurred_at: Utc::now(),
        });
        assert_eq!(
            AreaProjector
                .project(Some(&row), &record(AggregateType::Area, id, 2, &removed))
                .unwrap(),
            RowChange::Remove
        );
    }

    #[test]
    fn area_notes_are_added_and_removed() {
        let area_id = AreaId::generate();
        let id = area_id.aggregate_id();
        let note_id = NoteId::new();
        let RowChange::Upsert(row) = AreaProjector
            .project(None, &record(AggregateType::Area, id, 1, &area_created(area_id)))
            .unwrap()
        else {
            panic!("expected upsert");
        };

        let added = AreaEvent::NoteAdded(tania_assets::AreaNoteAdded {
            note_id,
            content: "check drainage".into(),
            occurred_at: Utc::now(),
        });
        let RowChange::Upsert(row) = AreaProjector
            .project(Some(&row), &record(AggregateType::Area, id, 2, &added))
            .unwrap()
        else {
            panic!("expected upsert");
        };
        assert_eq!(row.notes.len(), 1);

        let removed = AreaEvent::NoteRemoved(tania_assets::AreaNoteRemoved {
            note_id,
            occurred_at: Utc::now(),
        });
        let RowChange::Upsert(row) = AreaProjector
            .project(Some(&row), &record(AggregateType::Area, id, 3, &removed))
            .unwrap()
        else {
            panic!("expected upsert");
        };
        assert!(row.notes.is_empty());
    }

    #[test]
    fn update_before_create_is_inconsistent() {
        let id = AggregateId::new();
        let renamed = AreaEvent::NameChanged(AreaNameChanged {
            name: "Orphan".into(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            AreaProjector.project(None, &record(AggregateType::Area, id, 2, &renamed)),
            Err(ProjectionError::Inconsistent { .. })
        ));
    }
}
