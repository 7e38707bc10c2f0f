use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use tania_core::{
    Aggregate, AggregateId, AggregateRoot, AggregateType, DomainError, ValueObject,
    typed_aggregate_id, validate_name,
};
use tania_events::impl_domain_event;
use tania_events::integration::{MATERIAL_CREATED, MATERIAL_NAME_CHANGED, MATERIAL_REMOVED};

typed_aggregate_id!(
    /// Material (inventory item) identifier.
    MaterialId
);

pub const MATERIAL_PRICE_CHANGED: &str = "assets.material.price_changed";
pub const MATERIAL_QUANTITY_CHANGED: &str = "assets.material.quantity_changed";
pub const MATERIAL_EXPIRATION_CHANGED: &str = "assets.material.expiration_changed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialType {
    Seed,
    Plant,
    Fertilizer,
    Pesticide,
    GrowingMedium,
    Agrochemical,
    SeedingContainer,
    PostHarvestSupply,
    Other,
}

impl MaterialType {
    /// Whether crop batches can be planted from this material.
    pub fn is_plantable(self) -> bool {
        matches!(self, MaterialType::Seed | MaterialType::Plant)
    }
}

/// Price per unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the smallest currency unit (e.g. cents).
    pub amount: u64,
    /// ISO 4217 code, e.g. "IDR".
    pub currency: String,
}

impl ValueObject for Price {}

impl Price {
    fn normalized(&self) -> Result<Self, DomainError> {
        let currency = self.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(
                "currency must be a three-letter ISO code",
            ));
        }
        Ok(Self {
            amount: self.amount,
            currency,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialQuantity {
    pub value: f64,
    /// Free-form unit ("seeds", "kg", "packet").
    pub unit: String,
}

impl ValueObject for MaterialQuantity {}

impl MaterialQuantity {
    fn normalized(&self) -> Result<Self, DomainError> {
        if !(self.value >= 0.0) || !self.value.is_finite() {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        Ok(Self {
            value: self.value,
            unit: validate_name("quantity unit", &self.unit)?,
        })
    }
}

/// Snapshot of a material, replayed by the caller, for crop batch commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialLink {
    pub material_id: MaterialId,
    pub name: String,
    pub material_type: MaterialType,
    pub removed: bool,
}

/// Aggregate root: Material.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    id: MaterialId,
    name: String,
    material_type: MaterialType,
    price: Price,
    quantity: MaterialQuantity,
    expiration_date: Option<NaiveDate>,
    produced_by: Option<String>,
    notes: Option<String>,
    removed: bool,
    version: u64,
    created: bool,
}

impl Material {
    pub fn id_typed(&self) -> MaterialId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn material_type(&self) -> MaterialType {
        self.material_type
    }

    pub fn price(&self) -> &Price {
        &self.price
    }

    pub fn quantity(&self) -> &MaterialQuantity {
        &self.quantity
    }

    pub fn expiration_date(&self) -> Option<NaiveDate> {
        self.expiration_date
    }

    pub fn produced_by(&self) -> Option<&str> {
        self.produced_by.as_deref()
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// `None` until the material has been created.
    pub fn link(&self) -> Option<MaterialLink> {
        self.created.then(|| MaterialLink {
            material_id: self.id,
            name: self.name.clone(),
            material_type: self.material_type,
            removed: self.removed,
        })
    }
}

impl AggregateRoot for Material {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateMaterial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMaterial {
    pub name: String,
    pub material_type: MaterialType,
    pub price: Price,
    pub quantity: MaterialQuantity,
    pub expiration_date: Option<NaiveDate>,
    pub produced_by: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMaterialName {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMaterialPrice {
    pub price: Price,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMaterialQuantity {
    pub quantity: MaterialQuantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMaterialExpiration {
    pub expiration_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveMaterial {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaterialCommand {
    Create(CreateMaterial),
    ChangeName(ChangeMaterialName),
    ChangePrice(ChangeMaterialPrice),
    ChangeQuantity(ChangeMaterialQuantity),
    ChangeExpiration(ChangeMaterialExpiration),
    Remove(RemoveMaterial),
}

/// Event: MaterialCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialCreated {
    pub material_id: MaterialId,
    pub name: String,
    pub material_type: MaterialType,
    pub price: Price,
    pub quantity: MaterialQuantity,
    pub expiration_date: Option<NaiveDate>,
    pub produced_by: Option<String>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialNameChanged {
    pub name: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialPriceChanged {
    pub price: Price,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialQuantityChanged {
    pub quantity: MaterialQuantity,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialExpirationChanged {
    pub expiration_date: Option<NaiveDate>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRemoved {
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MaterialEvent {
    Created(MaterialCreated),
    NameChanged(MaterialNameChanged),
    PriceChanged(MaterialPriceChanged),
    QuantityChanged(MaterialQuantityChanged),
    ExpirationChanged(MaterialExpirationChanged),
    Removed(MaterialRemoved),
}

impl_domain_event!(MaterialEvent {
    Created(MaterialCreated) => MATERIAL_CREATED,
    NameChanged(MaterialNameChanged) => MATERIAL_NAME_CHANGED,
    PriceChanged(MaterialPriceChanged) => MATERIAL_PRICE_CHANGED,
    QuantityChanged(MaterialQuantityChanged) => MATERIAL_QUANTITY_CHANGED,
    ExpirationChanged(MaterialExpirationChanged) => MATERIAL_EXPIRATION_CHANGED,
    Removed(MaterialRemoved) => MATERIAL_REMOVED,
});

impl Aggregate for Material {
    type Command = MaterialCommand;
    type Event = MaterialEvent;
    type Error = DomainError;

    const TYPE: AggregateType = AggregateType::Material;

    fn initial(id: AggregateId) -> Self {
        Self {
            id: MaterialId::new(id),
            name: String::new(),
            material_type: MaterialType::Other,
            price: Price {
                amount: 0,
                currency: String::new(),
            },
            quantity: MaterialQuantity {
                value: 0.0,
                unit: String::new(),
            },
            expiration_date: None,
            produced_by: None,
            notes: None,
            removed: false,
            version: 0,
            created: false,
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            MaterialEvent::Created(e) => {
                self.id = e.material_id;
                self.name = e.name.clone();
                self.material_type = e.material_type;
                self.price = e.price.clone();
                self.quantity = e.quantity.clone();
                self.expiration_date = e.expiration_date;
                self.produced_by = e.produced_by.clone();
                self.notes = e.notes.clone();
                self.created = true;
            }
            MaterialEvent::NameChanged(e) => self.name = e.name.clone(),
            MaterialEvent::PriceChanged(e) => self.price = e.price.clone(),
            MaterialEvent::QuantityChanged(e) => self.quantity = e.quantity.clone(),
            MaterialEvent::ExpirationChanged(e) => self.expiration_date = e.expiration_date,
            MaterialEvent::Removed(_) => self.removed = true,
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            MaterialCommand::Create(cmd) => self.handle_create(cmd),
            other => {
                self.ensure_active()?;
                Ok(vec![self.handle_update(other)?])
            }
        }
    }
}

impl Material {
    fn ensure_active(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.removed {
            return Err(DomainError::validation("material has been removed"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateMaterial) -> Result<Vec<MaterialEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("material already exists"));
        }
        let produced_by = cmd
            .produced_by
            .as_deref()
            .map(|p| validate_name("produced by", p))
            .transpose()?;
        let notes = cmd
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned);

        Ok(vec![MaterialEvent::Created(MaterialCreated {
            material_id: self.id,
            name: validate_name("material name", &cmd.name)?,
            material_type: cmd.material_type,
            price: cmd.price.normalized()?,
            quantity: cmd.quantity.normalized()?,
            expiration_date: cmd.expiration_date,
            produced_by,
            notes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, command: &MaterialCommand) -> Result<MaterialEvent, DomainError> {
        let event = match command {
            MaterialCommand::Create(_) => {
                return Err(DomainError::conflict("material already exists"));
            }
            MaterialCommand::ChangeName(cmd) => MaterialEvent::NameChanged(MaterialNameChanged {
                name: validate_name("material name", &cmd.name)?,
                occurred_at: cmd.occurred_at,
            }),
            MaterialCommand::ChangePrice(cmd) => {
                MaterialEvent::PriceChanged(MaterialPriceChanged {
                    price: cmd.price.normalized()?,
                    occurred_at: cmd.occurred_at,
                })
            }
            MaterialCommand::ChangeQuantity(cmd) => {
                MaterialEvent::QuantityChanged(MaterialQuantityChanged {
                    quantity: cmd.quantity.normalized()?,
                    occurred_at: cmd.occurred_at,
                })
            }
            MaterialCommand::ChangeExpiration(cmd) => {
                MaterialEvent::ExpirationChanged(MaterialExpirationChanged {
                    expiration_date: cmd.expiration_date,
                    occurred_at: cmd.occurred_at,
                })
            }
            MaterialCommand::Remove(cmd) => MaterialEvent::Removed(MaterialRemoved {
                occurred_at: cmd.occurred_at,
            }),
        };
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-19T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn create_cmd() -> CreateMaterial {
        CreateMaterial {
            name: "Tomato".into(),
            material_type: MaterialType::Seed,
            price: Price {
                amount: 12_500,
                currency: "idr".into(),
            },
            quantity: MaterialQuantity {
                value: 300.0,
                unit: "seeds".into(),
            },
            expiration_date: NaiveDate::from_ymd_opt(2027, 1, 31),
            produced_by: Some("Benih Prima".into()),
            notes: Some("   ".into()),
            occurred_at: test_time(),
        }
    }

    fn created_material() -> Material {
        let mut material = Material::initial(AggregateId::new());
        let events = material
            .handle(&MaterialCommand::Create(create_cmd()))
            .unwrap();
        material.apply(&events[0]);
        material
    }

    #[test]
    fn create_material_normalizes_currency_and_notes() {
        let material = created_material();
        assert_eq!(material.price().currency, "IDR");
        assert_eq!(material.notes, None);
        assert!(material.material_type().is_plantable());
        assert_eq!(material.link().unwrap().name, "Tomato");
    }

    #[test]
    fn create_material_rejects_negative_quantity() {
        let material = Material::initial(AggregateId::new());
        let mut cmd = create_cmd();
        cmd.quantity.value = -1.0;
        let err = material.handle(&MaterialCommand::Create(cmd)).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("negative") => {}
            _ => panic!("Expected Validation error for quantity"),
        }
    }

    #[test]
    fn create_material_rejects_bad_currency() {
        let material = Material::initial(AggregateId::new());
        let mut cmd = create_cmd();
        cmd.price.currency = "rupiah".into();
        assert!(matches!(
            material.handle(&MaterialCommand::Create(cmd)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn removed_material_rejects_price_change() {
        let mut material = created_material();
        let events = material
            .handle(&MaterialCommand::Remove(RemoveMaterial {
                occurred_at: test_time(),
            }))
            .unwrap();
        material.apply(&events[0]);

        let err = material
            .handle(&MaterialCommand::ChangePrice(ChangeMaterialPrice {
                price: Price {
                    amount: 1,
                    currency: "IDR".into(),
                },
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(material.link().unwrap().removed);
    }

    #[test]
    fn commands_on_missing_material_are_not_found() {
        let material = Material::initial(AggregateId::new());
        let err = material
            .handle(&MaterialCommand::Remove(RemoveMaterial {
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
        assert!(material.link().is_none());
    }
}
