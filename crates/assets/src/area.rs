use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_core::note::{ensure_note_exists, validate_note};
use tania_core::{
    Aggregate, AggregateId, AggregateRoot, AggregateType, DomainError, Note, NoteId, ValueObject,
    typed_aggregate_id, validate_name,
};
use tania_events::impl_domain_event;
use tania_events::integration::{AREA_CREATED, AREA_NAME_CHANGED, AREA_REMOVED};

use crate::farm::FarmId;
use crate::reservoir::{ReservoirId, ReservoirLink};

typed_aggregate_id!(
    /// Area identifier.
    AreaId
);

pub const AREA_SIZE_CHANGED: &str = "assets.area.size_changed";
pub const AREA_TYPE_CHANGED: &str = "assets.area.type_changed";
pub const AREA_LOCATION_CHANGED: &str = "assets.area.location_changed";
pub const AREA_RESERVOIR_CHANGED: &str = "assets.area.reservoir_changed";
pub const AREA_NOTE_ADDED: &str = "assets.area.note_added";
pub const AREA_NOTE_REMOVED: &str = "assets.area.note_removed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaUnit {
    SquareMeter,
    Hectare,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaSize {
    pub value: f64,
    pub unit: AreaUnit,
}

impl ValueObject for AreaSize {}

impl AreaSize {
    fn validate(&self) -> Result<(), DomainError> {
        if !(self.value > 0.0) || !self.value.is_finite() {
            return Err(DomainError::validation("area size must be greater than zero"));
        }
        Ok(())
    }
}

/// What an area is used for. Nursery crops may only be seeded in `Seeding` areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaType {
    Seeding,
    Growing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaLocation {
    Outdoor,
    Indoor,
}

/// Snapshot of an area, replayed by the caller, for commands of other aggregates
/// that point at it (crop batches).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaLink {
    pub area_id: AreaId,
    pub farm_id: FarmId,
    pub name: String,
    pub area_type: AreaType,
    pub removed: bool,
}

/// Aggregate root: Area.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    id: AreaId,
    farm_id: Option<FarmId>,
    name: String,
    size: AreaSize,
    area_type: AreaType,
    location: AreaLocation,
    reservoir_id: Option<ReservoirId>,
    notes: Vec<Note>,
    removed: bool,
    version: u64,
    created: bool,
}

impl Area {
    pub fn id_typed(&self) -> AreaId {
        self.id
    }

    pub fn farm_id(&self) -> Option<FarmId> {
        self.farm_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> AreaSize {
        self.size
    }

    pub fn area_type(&self) -> AreaType {
        self.area_type
    }

    pub fn location(&self) -> AreaLocation {
        self.location
    }

    pub fn reservoir_id(&self) -> Option<ReservoirId> {
        self.reservoir_id
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// `None` until the area has been created.
    pub fn link(&self) -> Option<AreaLink> {
        Some(AreaLink {
            area_id: self.id,
            farm_id: self.farm_id?,
            name: self.name.clone(),
            area_type: self.area_type,
            removed: self.removed,
        })
    }
}

impl AggregateRoot for Area {
    type Id = AreaId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateArea.
///
/// `farm_id` must refer to an existing farm (checked by the caller); `reservoir`
/// is the replayed state of the reservoir watering this area, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateArea {
    pub farm_id: FarmId,
    pub name: String,
    pub size: AreaSize,
    pub area_type: AreaType,
    pub location: AreaLocation,
    pub reservoir: Option<ReservoirLink>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAreaName {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeAreaSize {
    pub size: AreaSize,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAreaType {
    pub area_type: AreaType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAreaLocation {
    pub location: AreaLocation,
    pub occurred_at: DateTime<Utc>,
}

/// Point the area at another reservoir, or at none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeAreaReservoir {
    pub reservoir: Option<ReservoirLink>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddAreaNote {
    pub note_id: NoteId,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveAreaNote {
    pub note_id: NoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveArea {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AreaCommand {
    Create(CreateArea),
    ChangeName(ChangeAreaName),
    ChangeSize(ChangeAreaSize),
    ChangeType(ChangeAreaType),
    ChangeLocation(ChangeAreaLocation),
    ChangeReservoir(ChangeAreaReservoir),
    AddNote(AddAreaNote),
    RemoveNote(RemoveAreaNote),
    Remove(RemoveArea),
}

/// Event: AreaCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaCreated {
    pub area_id: AreaId,
    pub farm_id: FarmId,
    pub name: String,
    pub size: AreaSize,
    pub area_type: AreaType,
    pub location: AreaLocation,
    pub reservoir_id: Option<ReservoirId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaNameChanged {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSizeChanged {
    pub size: AreaSize,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaTypeChanged {
    pub area_type: AreaType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaLocationChanged {
    pub location: AreaLocation,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaReservoirChanged {
    pub reservoir_id: Option<ReservoirId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaNoteAdded {
    pub note_id: NoteId,
    pub content: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaNoteRemoved {
    pub note_id: NoteId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaRemoved {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AreaEvent {
    Created(AreaCreated),
    NameChanged(AreaNameChanged),
    SizeChanged(AreaSizeChanged),
    TypeChanged(AreaTypeChanged),
    LocationChanged(AreaLocationChanged),
    ReservoirChanged(AreaReservoirChanged),
    NoteAdded(AreaNoteAdded),
    NoteRemoved(AreaNoteRemoved),
    Removed(AreaRemoved),
}

impl_domain_event!(AreaEvent {
    Created(AreaCreated) => AREA_CREATED,
    NameChanged(AreaNameChanged) => AREA_NAME_CHANGED,
    SizeChanged(AreaSizeChanged) => AREA_SIZE_CHANGED,
    TypeChanged(AreaTypeChanged) => AREA_TYPE_CHANGED,
    LocationChanged(AreaLocationChanged) => AREA_LOCATION_CHANGED,
    ReservoirChanged(AreaReservoirChanged) => AREA_RESERVOIR_CHANGED,
    NoteAdded(AreaNoteAdded) => AREA_NOTE_ADDED,
    NoteRemoved(AreaNoteRemoved) => AREA_NOTE_REMOVED,
    Removed(AreaRemoved) => AREA_REMOVED,
});

impl Aggregate for Area {
    type Command = AreaCommand;
    type Event = AreaEvent;
    type Error = DomainError;

    const TYPE: AggregateType = AggregateType::Area;

    fn initial(id: AggregateId) -> Self {
        Self {
            id: AreaId::new(id),
            farm_id: None,
            name: String::new(),
            size: AreaSize {
                value: 0.0,
                unit: AreaUnit::SquareMeter,
            },
            area_type: AreaType::Growing,
            location: AreaLocation::Outdoor,
            reservoir_id: None,
            notes: Vec::new(),
            removed: false,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AreaEvent::Created(e) => {
                self.id = e.area_id;
                self.farm_id = Some(e.farm_id);
                self.name = e.name.clone();
                self.size = e.size;
                self.area_type = e.area_type;
                self.location = e.location;
                self.reservoir_id = e.reservoir_id;
                self.created = true;
            }
            AreaEvent::NameChanged(e) => self.name = e.name.clone(),
            AreaEvent::SizeChanged(e) => self.size = e.size,
            AreaEvent::TypeChanged(e) => self.area_type = e.area_type,
            AreaEvent::LocationChanged(e) => self.location = e.location,
            AreaEvent::ReservoirChanged(e) => self.reservoir_id = e.reservoir_id,
            AreaEvent::NoteAdded(e) => self.notes.push(Note {
                id: e.note_id,
                content: e.content.clone(),
                created_at: e.occurred_at,
            }),
            AreaEvent::NoteRemoved(e) => self.notes.retain(|n| n.id != e.note_id),
            AreaEvent::Removed(_) => self.removed = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AreaCommand::Create(cmd) => self.handle_create(cmd),
            other => {
                self.ensure_active()?;
                Ok(vec![self.handle_update(other)?])
            }
        }
    }
}

impl Area {
    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.removed {
            return Err(DomainError::validation("area has been removed"));
        }
        Ok(())
    }

    fn check_reservoir(
        farm_id: FarmId,
        reservoir: Option<&ReservoirLink>,
    ) -> Result<Option<ReservoirId>, DomainError> {
        let Some(reservoir) = reservoir else {
            return Ok(None);
        };
        if reservoir.removed {
            return Err(DomainError::validation("reservoir has been removed"));
        }
        if reservoir.farm_id != farm_id {
            return Err(DomainError::invariant(
                "reservoir belongs to a different farm",
            ));
        }
        Ok(Some(reservoir.reservoir_id))
    }

    fn handle_create(&self, cmd: &CreateArea) -> Result<Vec<AreaEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("area already exists"));
        }
        let name = validate_name("area name", &cmd.name)?;
        cmd.size.validate()?;
        let reservoir_id = Self::check_reservoir(cmd.farm_id, cmd.reservoir.as_ref())?;

        Ok(vec![AreaEvent::Created(AreaCreated {
            area_id: self.id,
            farm_id: cmd.farm_id,
            name,
            size: cmd.size,
            area_type: cmd.area_type,
            location: cmd.location,
            reservoir_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, command: &AreaCommand) -> Result<AreaEvent, DomainError> {
        let event = match command {
            AreaCommand::Create(_) => return Err(DomainError::conflict("area already exists")),
            AreaCommand::ChangeName(cmd) => AreaEvent::NameChanged(AreaNameChanged {
                name: validate_name("area name", &cmd.name)?,
                occurred_at: cmd.occurred_at,
            }),
            AreaCommand::ChangeSize(cmd) => {
                cmd.size.validate()?;
                AreaEvent::SizeChanged(AreaSizeChanged {
                    size: cmd.size,
                    occurred_at: cmd.occurred_at,
                })
            }
            AreaCommand::ChangeType(cmd) => AreaEvent::TypeChanged(AreaTypeChanged {
                area_type: cmd.area_type,
                occurred_at: cmd.occurred_at,
            }),
            AreaCommand::ChangeLocation(cmd) => AreaEvent::LocationChanged(AreaLocationChanged {
                location: cmd.location,
                occurred_at: cmd.occurred_at,
            }),
            AreaCommand::ChangeReservoir(cmd) => {
                let farm_id = self.farm_id.ok_or_else(DomainError::not_found)?;
                AreaEvent::ReservoirChanged(AreaReservoirChanged {
                    reservoir_id: Self::check_reservoir(farm_id, cmd.reservoir.as_ref())?,
                    occurred_at: cmd.occurred_at,
                })
            }
            AreaCommand::AddNote(cmd) => AreaEvent::NoteAdded(AreaNoteAdded {
                note_id: cmd.note_id,
                content: validate_note(&cmd.content)?,
                occurred_at: cmd.occurred_at,
            }),
            AreaCommand::RemoveNote(cmd) => {
                ensure_note_exists(&self.notes, cmd.note_id)?;
                AreaEvent::NoteRemoved(AreaNoteRemoved {
                    note_id: cmd.note_id,
                    occurred_at: cmd.occurred_at,
                })
            }
            AreaCommand::Remove(cmd) => AreaEvent::Removed(AreaRemoved {
                occurred_at: cmd.occurred_at,
            }),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use tania_core::fold;

    use super::*;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn test_farm_id() -> FarmId {
        "0190a8a0-0000-7000-8000-000000000001".parse().unwrap()
    }

    fn create_cmd(reservoir: Option<ReservoirLink>) -> CreateArea {
        CreateArea {
            farm_id: test_farm_id(),
            name: "Greenhouse A".into(),
            size: AreaSize {
                value: 120.0,
                unit: AreaUnit::SquareMeter,
            },
            area_type: AreaType::Seeding,
            location: AreaLocation::Indoor,
            reservoir,
            occurred_at: test_time(),
        }
    }

    fn created_area() -> (Area, Vec<AreaEvent>) {
        let mut area = Area::initial(AggregateId::new());
        let events = area.handle(&AreaCommand::Create(create_cmd(None))).unwrap();
        area.apply(&events[0]);
        (area, events)
    }

    #[test]
    fn create_area_with_reservoir_of_same_farm() {
        let area = Area::initial(AggregateId::new());
        let reservoir = ReservoirLink {
            reservoir_id: ReservoirId::generate(),
            farm_id: test_farm_id(),
            removed: false,
        };

        let events = area
            .handle(&AreaCommand::Create(create_cmd(Some(reservoir))))
            .unwrap();
        match &events[0] {
            AreaEvent::Created(e) => {
                assert_eq!(e.reservoir_id, Some(reservoir.reservoir_id));
                assert_eq!(e.area_type, AreaType::Seeding);
            }
            _ => panic!("Expected Created event"),
        }
    }

    #[test]
    fn create_area_rejects_reservoir_of_other_farm() {
        let area = Area::initial(AggregateId::new());
        let reservoir = ReservoirLink {
            reservoir_id: ReservoirId::generate(),
            farm_id: FarmId::generate(),
            removed: false,
        };

        let err = area
            .handle(&AreaCommand::Create(create_cmd(Some(reservoir))))
            .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("different farm") => {}
            _ => panic!("Expected InvariantViolation for foreign reservoir"),
        }
    }

    #[test]
    fn create_area_rejects_removed_reservoir() {
        let area = Area::initial(AggregateId::new());
        let reservoir = ReservoirLink {
            reservoir_id: ReservoirId::generate(),
            farm_id: test_farm_id(),
            removed: true,
        };

        let err = area
            .handle(&AreaCommand::Create(create_cmd(Some(reservoir))))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn create_area_rejects_non_positive_size() {
        let area = Area::initial(AggregateId::new());
        let mut cmd = create_cmd(None);
        cmd.size.value = 0.0;
        let err = area.handle(&AreaCommand::Create(cmd)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn removed_area_rejects_every_command() {
        let (mut area, _) = created_area();
        let events = area
            .handle(&AreaCommand::Remove(RemoveArea {
                occurred_at: test_time(),
            }))
            .unwrap();
        area.apply(&events[0]);

        assert!(area.is_removed());
        assert!(area.link().unwrap().removed);
        for cmd in [
            AreaCommand::ChangeName(ChangeAreaName {
                name: "B".into(),
                occurred_at: test_time(),
            }),
            AreaCommand::Remove(RemoveArea {
                occurred_at: test_time(),
            }),
        ] {
            let err = area.handle(&cmd).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let (area, _) = created_area();
        let before = area.clone();
        let _ = area.handle(&AreaCommand::ChangeType(ChangeAreaType {
            area_type: AreaType::Growing,
            occurred_at: test_time(),
        }));
        assert_eq!(area, before);
    }

    #[test]
    fn replay_reproduces_state() {
        let (mut area, mut history) = created_area();
        for cmd in [
            AreaCommand::ChangeSize(ChangeAreaSize {
                size: AreaSize {
                    value: 1.5,
                    unit: AreaUnit::Hectare,
                },
                occurred_at: test_time(),
            }),
            AreaCommand::AddNote(AddAreaNote {
                note_id: NoteId::new(),
                content: "drip line installed".into(),
                occurred_at: test_time(),
            }),
        ] {
            let events = area.handle(&cmd).unwrap();
            for event in &events {
                area.apply(event);
            }
            history.extend(events);
        }

        let replayed: Area = fold(area.id().aggregate_id(), &history);
        assert_eq!(replayed, area);
        assert_eq!(replayed.version(), 3);
        assert_eq!(replayed.size().unit, AreaUnit::Hectare);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: positive sizes are accepted, the rest rejected.
            #[test]
            fn size_validation_matches_sign(value in -1.0e6f64..1.0e6f64) {
                let area = Area::initial(AggregateId::new());
                let mut cmd = create_cmd(None);
                cmd.size.value = value;
                let result = area.handle(&AreaCommand::Create(cmd));
                prop_assert_eq!(result.is_ok(), value > 0.0);
            }

            /// Property: version equals the number of applied events.
            #[test]
            fn version_counts_applied_events(renames in proptest::collection::vec("[A-Za-z][A-Za-z0-9 ]{0,30}", 0..10)) {
                let (mut area, _) = created_area();
                for name in &renames {
                    let events = area.handle(&AreaCommand::ChangeName(ChangeAreaName {
                        name: name.clone(),
                        occurred_at: test_time(),
                    })).unwrap();
                    for event in &events {
                        area.apply(event);
                    }
                }
                prop_assert_eq!(area.version(), 1 + renames.len() as u64);
            }
        }
    }
}
