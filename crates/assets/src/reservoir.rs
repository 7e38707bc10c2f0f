use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_core::note::{ensure_note_exists, validate_note};
use tania_core::{
    Aggregate, AggregateId, AggregateRoot, AggregateType, DomainError, Note, NoteId, ValueObject,
    typed_aggregate_id, validate_name,
};
use tania_events::impl_domain_event;
use tania_events::integration::{RESERVOIR_CREATED, RESERVOIR_NAME_CHANGED, RESERVOIR_REMOVED};

use crate::farm::FarmId;

typed_aggregate_id!(
    /// Reservoir identifier.
    ReservoirId
);

pub const RESERVOIR_WATER_SOURCE_CHANGED: &str = "assets.reservoir.water_source_changed";
pub const RESERVOIR_NOTE_ADDED: &str = "assets.reservoir.note_added";
pub const RESERVOIR_NOTE_REMOVED: &str = "assets.reservoir.note_removed";

/// Where the reservoir's water comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaterSource {
    /// A container of fixed capacity, in litres.
    Bucket { capacity: f64 },
    Tap,
}

impl ValueObject for WaterSource {}

impl WaterSource {
    fn validate(&self) -> Result<(), DomainError> {
        match self {
            WaterSource::Bucket { capacity } if !(*capacity > 0.0) => Err(
                DomainError::validation("bucket capacity must be greater than zero"),
            ),
            _ => Ok(()),
        }
    }
}

/// Snapshot of a reservoir, replayed by the caller, for commands of other
/// aggregates that point at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirLink {
    pub reservoir_id: ReservoirId,
    pub farm_id: FarmId,
    pub removed: bool,
}

/// Aggregate root: Reservoir.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservoir {
    id: ReservoirId,
    farm_id: Option<FarmId>,
    name: String,
    water_source: WaterSource,
    notes: Vec<Note>,
    removed: bool,
    version: u64,
    created: bool,
}

impl Reservoir {
    pub fn id_typed(&self) -> ReservoirId {
        self.id
    }

    pub fn farm_id(&self) -> Option<FarmId> {
        self.farm_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn water_source(&self) -> WaterSource {
        self.water_source
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// `None` until the reservoir has been created.
    pub fn link(&self) -> Option<ReservoirLink> {
        Some(ReservoirLink {
            reservoir_id: self.id,
            farm_id: self.farm_id?,
            removed: self.removed,
        })
    }
}

impl AggregateRoot for Reservoir {
    type Id = ReservoirId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateReservoir.
///
/// The caller has already verified that `farm_id` refers to an existing farm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateReservoir {
    pub farm_id: FarmId,
    pub name: String,
    pub water_source: WaterSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReservoirName {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeWaterSource {
    pub water_source: WaterSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReservoirNote {
    pub note_id: NoteId,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveReservoirNote {
    pub note_id: NoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveReservoir {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReservoirCommand {
    Create(CreateReservoir),
    ChangeName(ChangeReservoirName),
    ChangeWaterSource(ChangeWaterSource),
    AddNote(AddReservoirNote),
    RemoveNote(RemoveReservoirNote),
    Remove(RemoveReservoir),
}

/// Event: ReservoirCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirCreated {
    pub reservoir_id: ReservoirId,
    pub farm_id: FarmId,
    pub name: String,
    pub water_source: WaterSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirNameChanged {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterSourceChanged {
    pub water_source: WaterSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirNoteAdded {
    pub note_id: NoteId,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirNoteRemoved {
    pub note_id: NoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirRemoved {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReservoirEvent {
    Created(ReservoirCreated),
    NameChanged(ReservoirNameChanged),
    WaterSourceChanged(WaterSourceChanged),
    NoteAdded(ReservoirNoteAdded),
    NoteRemoved(ReservoirNoteRemoved),
    Removed(ReservoirRemoved),
}

impl_domain_event!(ReservoirEvent {
    Created(ReservoirCreated) => RESERVOIR_CREATED,
    NameChanged(ReservoirNameChanged) => RESERVOIR_NAME_CHANGED,
    WaterSourceChanged(WaterSourceChanged) => RESERVOIR_WATER_SOURCE_CHANGED,
    NoteAdded(ReservoirNoteAdded) => RESERVOIR_NOTE_ADDED,
    NoteRemoved(ReservoirNoteRemoved) => RESERVOIR_NOTE_REMOVED,
    Removed(ReservoirRemoved) => RESERVOIR_REMOVED,
});

impl Aggregate for Reservoir {
    type Command = ReservoirCommand;
    type Event = ReservoirEvent;
    type Error = DomainError;

    const TYPE: AggregateType = AggregateType::Reservoir;

    fn initial(id: AggregateId) -> Self {
        Self {
            id: ReservoirId::new(id),
            farm_id: None,
            name: String::new(),
            water_source: WaterSource::Tap,
            notes: Vec::new(),
            removed: false,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReservoirEvent::Created(e) => {
                self.id = e.reservoir_id;
                self.farm_id = Some(e.farm_id);
                self.name = e.name.clone();
                self.water_source = e.water_source;
                self.created = true;
            }
            ReservoirEvent::NameChanged(e) => self.name = e.name.clone(),
            ReservoirEvent::WaterSourceChanged(e) => self.water_source = e.water_source,
            ReservoirEvent::NoteAdded(e) => self.notes.push(Note {
                id: e.note_id,
                content: e.content.clone(),
                created_at: e.occurred_at,
            }),
            ReservoirEvent::NoteRemoved(e) => self.notes.retain(|n| n.id != e.note_id),
            ReservoirEvent::Removed(_) => self.removed = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReservoirCommand::Create(cmd) => self.handle_create(cmd),
            other => {
                self.ensure_active()?;
                Ok(vec![self.handle_update(other)?])
            }
        }
    }
}

impl Reservoir {
    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.removed {
            return Err(DomainError::validation("reservoir has been removed"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateReservoir) -> Result<Vec<ReservoirEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("reservoir already exists"));
        }
        let name = validate_name("reservoir name", &cmd.name)?;
        cmd.water_source.validate()?;

        Ok(vec![ReservoirEvent::Created(ReservoirCreated {
            reservoir_id: self.id,
            farm_id: cmd.farm_id,
            name,
            water_source: cmd.water_source,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, command: &ReservoirCommand) -> Result<ReservoirEvent, DomainError> {
        let event = match command {
            ReservoirCommand::Create(_) => {
                return Err(DomainError::conflict("reservoir already exists"));
            }
            ReservoirCommand::ChangeName(cmd) => {
                ReservoirEvent::NameChanged(ReservoirNameChanged {
                    name: validate_name("reservoir name", &cmd.name)?,
                    occurred_at: cmd.occurred_at,
                })
            }
            ReservoirCommand::ChangeWaterSource(cmd) => {
                cmd.water_source.validate()?;
                ReservoirEvent::WaterSourceChanged(WaterSourceChanged {
                    water_source: cmd.water_source,
                    occurred_at: cmd.occurred_at,
                })
            }
            ReservoirCommand::AddNote(cmd) => ReservoirEvent::NoteAdded(ReservoirNoteAdded {
                note_id: cmd.note_id,
                content: validate_note(&cmd.content)?,
                occurred_at: cmd.occurred_at,
            }),
            ReservoirCommand::RemoveNote(cmd) => {
                ensure_note_exists(&self.notes, cmd.note_id)?;
                ReservoirEvent::NoteRemoved(ReservoirNoteRemoved {
                    note_id: cmd.note_id,
                    occurred_at: cmd.occurred_at,
                })
            }
            ReservoirCommand::Remove(cmd) => ReservoirEvent::Removed(ReservoirRemoved {
                occurred_at: cmd.occurred_at,
            }),
        };
        Ok(event)
    }
}
