use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tania_core::{
    Aggregate, AggregateId, AggregateRoot, AggregateType, DomainError, ValueObject,
    typed_aggregate_id, validate_name,
};
use tania_events::impl_domain_event;

typed_aggregate_id!(
    /// Farm identifier.
    FarmId
);

pub const FARM_CREATED: &str = "assets.farm.created";
pub const FARM_NAME_CHANGED: &str = "assets.farm.name_changed";
pub const FARM_TYPE_CHANGED: &str = "assets.farm.type_changed";
pub const FARM_GEOLOCATION_CHANGED: &str = "assets.farm.geolocation_changed";
pub const FARM_REGION_CHANGED: &str = "assets.farm.region_changed";

/// Position of the farm in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl ValueObject for Geolocation {}

impl Geolocation {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DomainError::validation("latitude must be between -90 and 90"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DomainError::validation(
                "longitude must be between -180 and 180",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub country: String,
    pub city: String,
}

impl ValueObject for Region {}

impl Region {
    fn normalized(&self) -> Result<Self, DomainError> {
        Ok(Self {
            country: validate_name("country", &self.country)?,
            city: validate_name("city", &self.city)?,
        })
    }
}

/// Aggregate root: Farm.
#[derive(Debug, Clone, PartialEq)]
pub struct Farm {
    id: FarmId,
    name: String,
    farm_type: String,
    geolocation: Option<Geolocation>,
    region: Option<Region>,
    version: u64,
    created: bool,
}

impl Farm {
    pub fn id_typed(&self) -> FarmId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn farm_type(&self) -> &str {
        &self.farm_type
    }

    pub fn geolocation(&self) -> Option<Geolocation> {
        self.geolocation
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }
}

impl AggregateRoot for Farm {
    type Id = FarmId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateFarm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFarm {
    pub name: String,
    pub farm_type: String,
    pub geolocation: Option<Geolocation>,
    pub region: Option<Region>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFarmName {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFarmType {
    pub farm_type: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeFarmGeolocation {
    pub geolocation: Geolocation,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeFarmRegion {
    pub region: Region,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FarmCommand {
    Create(CreateFarm),
    ChangeName(ChangeFarmName),
    ChangeType(ChangeFarmType),
    ChangeGeolocation(ChangeFarmGeolocation),
    ChangeRegion(ChangeFarmRegion),
}

/// Event: FarmCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmCreated {
    pub farm_id: FarmId,
    pub name: String,
    pub farm_type: String,
    pub geolocation: Option<Geolocation>,
    pub region: Option<Region>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmNameChanged {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmTypeChanged {
    pub farm_type: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmGeolocationChanged {
    pub geolocation: Geolocation,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FarmRegionChanged {
    pub region: Region,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FarmEvent {
    Created(FarmCreated),
    NameChanged(FarmNameChanged),
    TypeChanged(FarmTypeChanged),
    GeolocationChanged(FarmGeolocationChanged),
    RegionChanged(FarmRegionChanged),
}

impl_domain_event!(FarmEvent {
    Created(FarmCreated) => FARM_CREATED,
    NameChanged(FarmNameChanged) => FARM_NAME_CHANGED,
    TypeChanged(FarmTypeChanged) => FARM_TYPE_CHANGED,
    GeolocationChanged(FarmGeolocationChanged) => FARM_GEOLOCATION_CHANGED,
    RegionChanged(FarmRegionChanged) => FARM_REGION_CHANGED,
});

impl Aggregate for Farm {
    type Command = FarmCommand;
    type Event = FarmEvent;
    type Error = DomainError;

    const TYPE: AggregateType = AggregateType::Farm;

    fn initial(id: AggregateId) -> Self {
        Self {
            id: FarmId::new(id),
            name: String::new(),
            farm_type: String::new(),
            geolocation: None,
            region: None,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            FarmEvent::Created(e) => {
                self.id = e.farm_id;
                self.name = e.name.clone();
                self.farm_type = e.farm_type.clone();
                self.geolocation = e.geolocation;
                self.region = e.region.clone();
                self.created = true;
            }
            FarmEvent::NameChanged(e) => self.name = e.name.clone(),
            FarmEvent::TypeChanged(e) => self.farm_type = e.farm_type.clone(),
            FarmEvent::GeolocationChanged(e) => self.geolocation = Some(e.geolocation),
            FarmEvent::RegionChanged(e) => self.region = Some(e.region.clone()),
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            FarmCommand::Create(cmd) => self.handle_create(cmd),
            FarmCommand::ChangeName(cmd) => {
                self.ensure_created()?;
                let name = validate_name("farm name", &cmd.name)?;
                if name == self.name {
                    return Ok(vec![]);
                }
                Ok(vec![FarmEvent::NameChanged(FarmNameChanged {
                    name,
                    occurred_at: cmd.occurred_at,
                })])
            }
            FarmCommand::ChangeType(cmd) => {
                self.ensure_created()?;
                let farm_type = validate_name("farm type", &cmd.farm_type)?;
                Ok(vec![FarmEvent::TypeChanged(FarmTypeChanged {
                    farm_type,
                    occurred_at: cmd.occurred_at,
                })])
            }
            FarmCommand::ChangeGeolocation(cmd) => {
                self.ensure_created()?;
                cmd.geolocation.validate()?;
                Ok(vec![FarmEvent::GeolocationChanged(FarmGeolocationChanged {
                    geolocation: cmd.geolocation,
                    occurred_at: cmd.occurred_at,
                })])
            }
            FarmCommand::ChangeRegion(cmd) => {
                self.ensure_created()?;
                Ok(vec![FarmEvent::RegionChanged(FarmRegionChanged {
                    region: cmd.region.normalized()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Farm {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateFarm) -> Result<Vec<FarmEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("farm already exists"));
        }
        let name = validate_name("farm name", &cmd.name)?;
        let farm_type = validate_name("farm type", &cmd.farm_type)?;
        if let Some(geolocation) = &cmd.geolocation {
            geolocation.validate()?;
        }
        let region = cmd.region.as_ref().map(Region::normalized).transpose()?;

        Ok(vec![FarmEvent::Created(FarmCreated {
            farm_id: self.id,
            name,
            farm_type,
            geolocation: cmd.geolocation,
            region,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use tania_core::fold;
    use tania_events::DomainEvent;

    use super::*;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn create_cmd() -> CreateFarm {
        CreateFarm {
            name: " Lembang ".to_string(),
            farm_type: "organic".to_string(),
            geolocation: Some(Geolocation {
                latitude: -6.81,
                longitude: 107.61,
            }),
            region: Some(Region {
                country: "Indonesia".to_string(),
                city: "Bandung".to_string(),
            }),
            occurred_at: test_time(),
        }
    }

    fn created_farm() -> Farm {
        let mut farm = Farm::initial(AggregateId::new());
        let events = farm.handle(&FarmCommand::Create(create_cmd())).unwrap();
        farm.apply(&events[0]);
        farm
    }

    #[test]
    fn create_farm_emits_created_event_with_trimmed_name() {
        let farm = Farm::initial(AggregateId::new());
        let events = farm.handle(&FarmCommand::Create(create_cmd())).unwrap();

        assert_eq!(events.len(), 1);
        match &events[0] {
            FarmEvent::Created(e) => {
                assert_eq!(e.farm_id, *farm.id());
                assert_eq!(e.name, "Lembang");
                assert_eq!(e.farm_type, "organic");
            }
            _ => panic!("Expected Created event"),
        }
    }

    #[test]
    fn create_farm_rejects_out_of_range_geolocation() {
        let farm = Farm::initial(AggregateId::new());
        let mut cmd = create_cmd();
        cmd.geolocation = Some(Geolocation {
            latitude: 91.0,
            longitude: 0.0,
        });

        let err = farm.handle(&FarmCommand::Create(cmd)).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("latitude") => {}
            _ => panic!("Expected Validation error for latitude"),
        }
    }

    #[test]
    fn create_farm_rejects_duplicate_creation() {
        let farm = created_farm();
        let err = farm.handle(&FarmCommand::Create(create_cmd())).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn rename_requires_existing_farm() {
        let farm = Farm::initial(AggregateId::new());
        let err = farm
            .handle(&FarmCommand::ChangeName(ChangeFarmName {
                name: "Other".into(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn rename_to_same_name_is_a_no_op() {
        let farm = created_farm();
        let events = farm
            .handle(&FarmCommand::ChangeName(ChangeFarmName {
                name: "Lembang".into(),
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn replay_reproduces_state_and_version() {
        let mut farm = created_farm();
        let mut history = vec![FarmEvent::Created(FarmCreated {
            farm_id: *farm.id(),
            name: "Lembang".into(),
            farm_type: "organic".into(),
            geolocation: farm.geolocation(),
            region: farm.region().cloned(),
            occurred_at: test_time(),
        })];

        let events = farm
            .handle(&FarmCommand::ChangeType(ChangeFarmType {
                farm_type: "hydroponic".into(),
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            farm.apply(event);
        }
        history.extend(events);

        let replayed: Farm = fold(farm.id().aggregate_id(), &history);
        assert_eq!(replayed, farm);
        assert_eq!(replayed.version(), 2);
        assert_eq!(replayed.farm_type(), "hydroponic");
    }

    #[test]
    fn events_decode_from_their_stored_form() {
        let event = FarmEvent::RegionChanged(FarmRegionChanged {
            region: Region {
                country: "Indonesia".into(),
                city: "Garut".into(),
            },
            occurred_at: test_time(),
        });
        let payload = event.encode().unwrap();
        let decoded = FarmEvent::decode(event.kind(), &payload).unwrap();
        assert_eq!(decoded, event);
        assert!(FarmEvent::decode("assets.farm.sold", &payload).is_err());
    }
}
