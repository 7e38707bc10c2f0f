use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_assets::{AreaId, AreaLink, AreaType, FarmId, MaterialId, MaterialLink};
use tania_core::note::{ensure_note_exists, validate_note};
use tania_core::{
    Aggregate, AggregateId, AggregateRoot, AggregateType, DomainError, Note, NoteId, ValueObject,
    typed_aggregate_id,
};
use tania_events::impl_domain_event;
use tania_events::integration::{CROP_BATCH_ARCHIVED, CROP_BATCH_CREATED};

use crate::batch_id::generate_batch_id;

typed_aggregate_id!(
    /// Crop batch identifier.
    CropId
);

pub const CROP_BATCH_MOVED: &str = "growth.crop.batch_moved";
pub const CROP_BATCH_WATERED: &str = "growth.crop.batch_watered";
pub const CROP_BATCH_HARVESTED: &str = "growth.crop.batch_harvested";
pub const CROP_BATCH_DUMPED: &str = "growth.crop.batch_dumped";
pub const CROP_NOTE_ADDED: &str = "growth.crop.note_added";
pub const CROP_NOTE_REMOVED: &str = "growth.crop.note_removed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropType {
    /// Seedlings raised in a seeding area before being moved out.
    Nursery,
    Growing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContainerType {
    Tray { cells: u32 },
    Pot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropContainer {
    pub container_type: ContainerType,
    /// Number of trays or pots.
    pub quantity: u32,
}

impl ValueObject for CropContainer {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestType {
    Partial,
    /// Harvest everything in the area; the requested quantity is ignored.
    All,
}

/// Plants of this batch currently in one area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropArea {
    pub area_id: AreaId,
    pub quantity: u32,
    pub last_watered: Option<DateTime<Utc>>,
}

/// Aggregate root: Crop batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
    id: CropId,
    farm_id: Option<FarmId>,
    batch_id: String,
    crop_type: CropType,
    container: CropContainer,
    material_id: Option<MaterialId>,
    initial_area_id: Option<AreaId>,
    initial_quantity: u32,
    areas: Vec<CropArea>,
    harvested: u32,
    dumped: u32,
    notes: Vec<Note>,
    status: CropStatus,
    version: u64,
    created: bool,
}

impl Crop {
    pub fn id_typed(&self) -> CropId {
        self.id
    }

    pub fn farm_id(&self) -> Option<FarmId> {
        self.farm_id
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn crop_type(&self) -> CropType {
        self.crop_type
    }

    pub fn container(&self) -> CropContainer {
        self.container
    }

    pub fn material_id(&self) -> Option<MaterialId> {
        self.material_id
    }

    pub fn initial_area_id(&self) -> Option<AreaId> {
        self.initial_area_id
    }

    pub fn initial_quantity(&self) -> u32 {
        self.initial_quantity
    }

    /// Areas that currently hold plants of this batch, in planting order.
    pub fn areas(&self) -> &[CropArea] {
        &self.areas
    }

    pub fn quantity_in(&self, area_id: AreaId) -> u32 {
        self.areas
            .iter()
            .find(|a| a.area_id == area_id)
            .map_or(0, |a| a.quantity)
    }

    pub fn harvested(&self) -> u32 {
        self.harvested
    }

    pub fn dumped(&self) -> u32 {
        self.dumped
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn status(&self) -> CropStatus {
        self.status
    }

    fn add_to_area(&mut self, area_id: AreaId, quantity: u32) {
        match self.areas.iter_mut().find(|a| a.area_id == area_id) {
            Some(area) => area.quantity += quantity,
            None => self.areas.push(CropArea {
                area_id,
                quantity,
                last_watered: None,
            }),
        }
    }

    fn take_from_area(&mut self, area_id: AreaId, quantity: u32) {
        if let Some(area) = self.areas.iter_mut().find(|a| a.area_id == area_id) {
            area.quantity = area.quantity.saturating_sub(quantity);
        }
        self.areas.retain(|a| a.quantity > 0);
    }
}

impl AggregateRoot for Crop {
    type Id = CropId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlantCrop (creates the batch).
///
/// `area` and `material` are snapshots replayed by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlantCrop {
    pub area: AreaLink,
    pub material: MaterialLink,
    pub crop_type: CropType,
    pub container: CropContainer,
    /// Number of plants (or seeds) in the batch.
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCrop {
    pub source_area_id: AreaId,
    pub destination: AreaLink,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterCrop {
    pub area_id: AreaId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestCrop {
    pub area_id: AreaId,
    pub harvest_type: HarvestType,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpCrop {
    pub area_id: AreaId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCropNote {
    pub note_id: NoteId,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveCropNote {
    pub note_id: NoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveCrop {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropCommand {
    Plant(PlantCrop),
    Move(MoveCrop),
    Water(WaterCrop),
    Harvest(HarvestCrop),
    Dump(DumpCrop),
    AddNote(AddCropNote),
    RemoveNote(RemoveCropNote),
    Archive(ArchiveCrop),
}

/// Event: CropBatchCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBatchCreated {
    pub crop_id: CropId,
    pub farm_id: FarmId,
    pub batch_id: String,
    pub crop_type: CropType,
    pub container: CropContainer,
    pub material_id: MaterialId,
    pub area_id: AreaId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBatchMoved {
    pub source_area_id: AreaId,
    pub destination_area_id: AreaId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBatchWatered {
    pub area_id: AreaId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBatchHarvested {
    pub area_id: AreaId,
    pub harvest_type: HarvestType,
    /// Plants actually taken out of the area.
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBatchDumped {
    pub area_id: AreaId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropNoteAdded {
    pub note_id: NoteId,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropNoteRemoved {
    pub note_id: NoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBatchArchived {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropEvent {
    BatchCreated(CropBatchCreated),
    BatchMoved(CropBatchMoved),
    BatchWatered(CropBatchWatered),
    BatchHarvested(CropBatchHarvested),
    BatchDumped(CropBatchDumped),
    NoteAdded(CropNoteAdded),
    NoteRemoved(CropNoteRemoved),
    BatchArchived(CropBatchArchived),
}

impl_domain_event!(CropEvent {
    BatchCreated(CropBatchCreated) => CROP_BATCH_CREATED,
    BatchMoved(CropBatchMoved) => CROP_BATCH_MOVED,
    BatchWatered(CropBatchWatered) => CROP_BATCH_WATERED,
    BatchHarvested(CropBatchHarvested) => CROP_BATCH_HARVESTED,
    BatchDumped(CropBatchDumped) => CROP_BATCH_DUMPED,
    NoteAdded(CropNoteAdded) => CROP_NOTE_ADDED,
    NoteRemoved(CropNoteRemoved) => CROP_NOTE_REMOVED,
    BatchArchived(CropBatchArchived) => CROP_BATCH_ARCHIVED,
});

impl Aggregate for Crop {
    type Command = CropCommand;
    type Event = CropEvent;
    type Error = DomainError;

    const TYPE: AggregateType = AggregateType::Crop;

    fn initial(id: AggregateId) -> Self {
        Self {
            id: CropId::new(id),
            farm_id: None,
            batch_id: String::new(),
            crop_type: CropType::Growing,
            container: CropContainer {
                container_type: ContainerType::Pot,
                quantity: 0,
            },
            material_id: None,
            initial_area_id: None,
            initial_quantity: 0,
            areas: Vec::new(),
            harvested: 0,
            dumped: 0,
            notes: Vec::new(),
            status: CropStatus::Active,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            CropEvent::BatchCreated(e) => {
                self.id = e.crop_id;
                self.farm_id = Some(e.farm_id);
                self.batch_id = e.batch_id.clone();
                self.crop_type = e.crop_type;
                self.container = e.container;
                self.material_id = Some(e.material_id);
                self.initial_area_id = Some(e.area_id);
                self.initial_quantity = e.quantity;
                self.areas = vec![CropArea {
                    area_id: e.area_id,
                    quantity: e.quantity,
                    last_watered: None,
                }];
                self.status = CropStatus::Active;
                self.created = true;
            }
            CropEvent::BatchMoved(e) => {
                self.take_from_area(e.source_area_id, e.quantity);
                self.add_to_area(e.destination_area_id, e.quantity);
            }
            CropEvent::BatchWatered(e) => {
                if let Some(area) = self.areas.iter_mut().find(|a| a.area_id == e.area_id) {
                    area.last_watered = Some(e.occurred_at);
                }
            }
            CropEvent::BatchHarvested(e) => {
                self.take_from_area(e.area_id, e.quantity);
                self.harvested += e.quantity;
            }
            CropEvent::BatchDumped(e) => {
                self.take_from_area(e.area_id, e.quantity);
                self.dumped += e.quantity;
            }
            CropEvent::NoteAdded(e) => self.notes.push(Note {
                id: e.note_id,
                content: e.content.clone(),
                created_at: e.occurred_at,
            }),
            CropEvent::NoteRemoved(e) => self.notes.retain(|n| n.id != e.note_id),
            CropEvent::BatchArchived(_) => self.status = CropStatus::Archived,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CropCommand::Plant(cmd) => self.handle_plant(cmd),
            other => {
                self.ensure_active()?;
                Ok(vec![self.handle_update(other)?])
            }
        }
    }
}

impl Crop {
    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.status == CropStatus::Archived {
            return Err(DomainError::validation("crop batch has been archived"));
        }
        Ok(())
    }

    /// Quantity must be positive and available in `area_id`.
    fn check_available(&self, area_id: AreaId, quantity: u32) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        let available = self.quantity_in(area_id);
        if available == 0 {
            return Err(DomainError::validation(format!(
                "crop batch has no plants in area {area_id}"
            )));
        }
        if quantity > available {
            return Err(DomainError::validation(format!(
                "quantity {quantity} exceeds the {available} plants in area {area_id}"
            )));
        }
        Ok(())
    }

    fn handle_plant(&self, cmd: &PlantCrop) -> Result<Vec<CropEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("crop batch already exists"));
        }
        if cmd.area.removed {
            return Err(DomainError::validation("area has been removed"));
        }
        if cmd.crop_type == CropType::Nursery && cmd.area.area_type != AreaType::Seeding {
            return Err(DomainError::invariant(
                "nursery crops can only be planted in a seeding area",
            ));
        }
        if cmd.material.removed {
            return Err(DomainError::validation("material has been removed"));
        }
        if !cmd.material.material_type.is_plantable() {
            return Err(DomainError::validation(
                "crops can only be planted from seed or plant materials",
            ));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        if cmd.container.quantity == 0 {
            return Err(DomainError::validation(
                "container quantity must be greater than zero",
            ));
        }
        if let ContainerType::Tray { cells: 0 } = cmd.container.container_type {
            return Err(DomainError::validation("tray must have at least one cell"));
        }

        Ok(vec![CropEvent::BatchCreated(CropBatchCreated {
            crop_id: self.id,
            farm_id: cmd.area.farm_id,
            batch_id: generate_batch_id(&cmd.material.name, cmd.occurred_at),
            crop_type: cmd.crop_type,
            container: cmd.container,
            material_id: cmd.material.material_id,
            area_id: cmd.area.area_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, command: &CropCommand) -> Result<CropEvent, DomainError> {
        let event = match command {
            CropCommand::Plant(_) => {
                return Err(DomainError::conflict("crop batch already exists"));
            }
            CropCommand::Move(cmd) => {
                self.check_available(cmd.source_area_id, cmd.quantity)?;
                let destination = &cmd.destination;
                if destination.area_id == cmd.source_area_id {
                    return Err(DomainError::validation(
                        "source and destination areas must differ",
                    ));
                }
                if destination.removed {
                    return Err(DomainError::validation("destination area has been removed"));
                }
                if Some(destination.farm_id) != self.farm_id {
                    return Err(DomainError::invariant(
                        "destination area belongs to a different farm",
                    ));
                }
                CropEvent::BatchMoved(CropBatchMoved {
                    source_area_id: cmd.source_area_id,
                    destination_area_id: destination.area_id,
                    quantity: cmd.quantity,
                    occurred_at: cmd.occurred_at,
                })
            }
            CropCommand::Water(cmd) => {
                if self.quantity_in(cmd.area_id) == 0 {
                    return Err(DomainError::validation(format!(
                        "crop batch has no plants in area {}",
                        cmd.area_id
                    )));
                }
                CropEvent::BatchWatered(CropBatchWatered {
                    area_id: cmd.area_id,
                    occurred_at: cmd.occurred_at,
                })
            }
            CropCommand::Harvest(cmd) => {
                let quantity = match cmd.harvest_type {
                    HarvestType::All => self.quantity_in(cmd.area_id),
                    HarvestType::Partial => cmd.quantity,
                };
                self.check_available(cmd.area_id, quantity)?;
                CropEvent::BatchHarvested(CropBatchHarvested {
                    area_id: cmd.area_id,
                    harvest_type: cmd.harvest_type,
                    quantity,
                    occurred_at: cmd.occurred_at,
                })
            }
            CropCommand::Dump(cmd) => {
                self.check_available(cmd.area_id, cmd.quantity)?;
                CropEvent::BatchDumped(CropBatchDumped {
                    area_id: cmd.area_id,
                    quantity: cmd.quantity,
                    occurred_at: cmd.occurred_at,
                })
            }
            CropCommand::AddNote(cmd) => CropEvent::NoteAdded(CropNoteAdded {
                note_id: cmd.note_id,
                content: validate_note(&cmd.content)?,
                occurred_at: cmd.occurred_at,
            }),
            CropCommand::RemoveNote(cmd) => {
                ensure_note_exists(&self.notes, cmd.note_id)?;
                CropEvent::NoteRemoved(CropNoteRemoved {
                    note_id: cmd.note_id,
                    occurred_at: cmd.occurred_at,
                })
            }
            CropCommand::Archive(cmd) => CropEvent::BatchArchived(CropBatchArchived {
                occurred_at: cmd.occurred_at,
            }),
        };
        Ok(event)
    }
}
