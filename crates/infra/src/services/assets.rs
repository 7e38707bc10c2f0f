use chrono::{DateTime, Utc};

use tania_assets::{
    AddAreaNote, AddReservoirNote, Area, AreaCommand, AreaId, AreaLocation, AreaSize, AreaType,
    ChangeAreaLocation, ChangeAreaName, ChangeAreaReservoir, ChangeAreaSize, ChangeAreaType,
    ChangeFarmGeolocation, ChangeFarmName, ChangeFarmRegion, ChangeFarmType,
    ChangeMaterialExpiration, ChangeMaterialName, ChangeMaterialPrice, ChangeMaterialQuantity,
    ChangeReservoirName, ChangeWaterSource, CreateArea, CreateFarm, CreateMaterial,
    CreateReservoir, Farm, FarmCommand, FarmId, Material, MaterialCommand, MaterialId,
    MaterialType, RemoveArea, RemoveAreaNote, RemoveMaterial, RemoveReservoir,
    RemoveReservoirNote, Reservoir, ReservoirCommand, ReservoirId, ReservoirLink,
};

use super::{CommandError, committed_row, ensure_projected};
use crate::projections::{AreaRow, FarmRow, MaterialRow, ReservoirRow};
use crate::read_model::ReadStore;
use crate::repository::Repository;

/// Area creation as submitted by a caller; the service resolves the reservoir.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateAreaRequest {
    pub farm_id: FarmId,
    pub name: String,
    pub size: AreaSize,
    pub area_type: AreaType,
    pub location: AreaLocation,
    pub reservoir_id: Option<ReservoirId>,
    pub occurred_at: DateTime<Utc>,
}

/// Farms, areas, reservoirs and materials.
#[derive(Debug, Clone)]
pub struct AssetsService {
    repository: Repository,
    farms: ReadStore<FarmRow>,
    areas: ReadStore<AreaRow>,
    reservoirs: ReadStore<ReservoirRow>,
    materials: ReadStore<MaterialRow>,
}

impl AssetsService {
    pub fn new(
        repository: Repository,
        farms: ReadStore<FarmRow>,
        areas: ReadStore<AreaRow>,
        reservoirs: ReadStore<ReservoirRow>,
        materials: ReadStore<MaterialRow>,
    ) -> Self {
        Self {
            repository,
            farms,
            areas,
            reservoirs,
            materials,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Farms
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_farm(&self, cmd: CreateFarm) -> Result<FarmRow, CommandError> {
        let id = FarmId::generate().aggregate_id();
        let done = self.repository.create::<Farm>(id, &FarmCommand::Create(cmd))?;
        committed_row(&self.farms, id, &done.report)
    }

    pub fn rename_farm(&self, farm_id: FarmId, cmd: ChangeFarmName) -> Result<FarmRow, CommandError> {
        self.farm_command(farm_id, FarmCommand::ChangeName(cmd))
    }

    pub fn change_farm_type(&self, farm_id: FarmId, cmd: ChangeFarmType) -> Result<FarmRow, CommandError> {
        self.farm_command(farm_id, FarmCommand::ChangeType(cmd))
    }

    pub fn change_farm_geolocation(
        &self,
        farm_id: FarmId,
        cmd: ChangeFarmGeolocation,
    ) -> Result<FarmRow, CommandError> {
        self.farm_command(farm_id, FarmCommand::ChangeGeolocation(cmd))
    }

    pub fn change_farm_region(&self, farm_id: FarmId, cmd: ChangeFarmRegion) -> Result<FarmRow, CommandError> {
        self.farm_command(farm_id, FarmCommand::ChangeRegion(cmd))
    }

    fn farm_command(&self, farm_id: FarmId, cmd: FarmCommand) -> Result<FarmRow, CommandError> {
        let id = farm_id.aggregate_id();
        let done = self.repository.execute::<Farm>(id, &cmd)?;
        committed_row(&self.farms, id, &done.report)
    }

    fn ensure_farm_exists(&self, farm_id: FarmId) -> Result<(), CommandError> {
        self.repository.load::<Farm>(farm_id.aggregate_id())?;
        Ok(())
    }

    pub fn farm(&self, farm_id: FarmId) -> Result<FarmRow, CommandError> {
        Ok(self.farms.find(farm_id.aggregate_id())?)
    }

    pub fn farms(&self) -> Result<Vec<FarmRow>, CommandError> {
        Ok(self.farms.all()?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reservoirs
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_reservoir(&self, cmd: CreateReservoir) -> Result<ReservoirRow, CommandError> {
        self.ensure_farm_exists(cmd.farm_id)?;
        let id = ReservoirId::generate().aggregate_id();
        let done = self
            .repository
            .create::<Reservoir>(id, &ReservoirCommand::Create(cmd))?;
        committed_row(&self.reservoirs, id, &done.report)
    }

    pub fn rename_reservoir(
        &self,
        reservoir_id: ReservoirId,
        cmd: ChangeReservoirName,
    ) -> Result<ReservoirRow, CommandError> {
        self.reservoir_command(reservoir_id, ReservoirCommand::ChangeName(cmd))
    }

    pub fn change_water_source(
        &self,
        reservoir_id: ReservoirId,
        cmd: ChangeWaterSource,
    ) -> Result<ReservoirRow, CommandError> {
        self.reservoir_command(reservoir_id, ReservoirCommand::ChangeWaterSource(cmd))
    }

    pub fn add_reservoir_note(
        &self,
        reservoir_id: ReservoirId,
        cmd: AddReservoirNote,
    ) -> Result<ReservoirRow, CommandError> {
        self.reservoir_command(reservoir_id, ReservoirCommand::AddNote(cmd))
    }

    pub fn remove_reservoir_note(
        &self,
        reservoir_id: ReservoirId,
        cmd: RemoveReservoirNote,
    ) -> Result<ReservoirRow, CommandError> {
        self.reservoir_command(reservoir_id, ReservoirCommand::RemoveNote(cmd))
    }

    pub fn remove_reservoir(&self, reservoir_id: ReservoirId, cmd: RemoveReservoir) -> Result<(), CommandError> {
        let id = reservoir_id.aggregate_id();
        let done = self
            .repository
            .execute::<Reservoir>(id, &ReservoirCommand::Remove(cmd))?;
        ensure_projected(self.reservoirs.view(), id, &done.report)
    }

    fn reservoir_command(
        &self,
        reservoir_id: ReservoirId,
        cmd: ReservoirCommand,
    ) -> Result<ReservoirRow, CommandError> {
        let id = reservoir_id.aggregate_id();
        let done = self.repository.execute::<Reservoir>(id, &cmd)?;
        committed_row(&self.reservoirs, id, &done.report)
    }

    fn reservoir_link(&self, reservoir_id: ReservoirId) -> Result<ReservoirLink, CommandError> {
        let (reservoir, _) = self.repository.load::<Reservoir>(reservoir_id.aggregate_id())?;
        reservoir
            .link()
            .ok_or_else(|| CommandError::NotFound(format!("reservoir {reservoir_id}")))
    }

    pub fn reservoir(&self, reservoir_id: ReservoirId) -> Result<ReservoirRow, CommandError> {
        Ok(self.reservoirs.find(reservoir_id.aggregate_id())?)
    }

    pub fn reservoirs_of_farm(&self, farm_id: FarmId) -> Result<Vec<ReservoirRow>, CommandError> {
        Ok(self.reservoirs.find_by(|r| r.farm_id == farm_id)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Areas
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_area(&self, request: CreateAreaRequest) -> Result<AreaRow, CommandError> {
        self.ensure_farm_exists(request.farm_id)?;
        let reservoir = request
            .reservoir_id
            .map(|reservoir_id| self.reservoir_link(reservoir_id))
            .transpose()?;

        let cmd = CreateArea {
            farm_id: request.farm_id,
            name: request.name,
            size: request.size,
            area_type: request.area_type,
            location: request.location,
            reservoir,
            occurred_at: request.occurred_at,
        };
        let id = AreaId::generate().aggregate_id();
        let done = self.repository.create::<Area>(id, &AreaCommand::Create(cmd))?;
        committed_row(&self.areas, id, &done.report)
    }

    pub fn rename_area(&self, area_id: AreaId, cmd: ChangeAreaName) -> Result<AreaRow, CommandError> {
        self.area_command(area_id, AreaCommand::ChangeName(cmd))
    }

    pub fn change_area_size(&self, area_id: AreaId, cmd: ChangeAreaSize) -> Result<AreaRow, CommandError> {
        self.area_command(area_id, AreaCommand::ChangeSize(cmd))
    }

    pub fn change_area_type(&self, area_id: AreaId, cmd: ChangeAreaType) -> Result<AreaRow, CommandError> {
        self.area_command(area_id, AreaCommand::ChangeType(cmd))
    }

    pub fn change_area_location(
        &self,
        area_id: AreaId,
        cmd: ChangeAreaLocation,
    ) -> Result<AreaRow, CommandError> {
        self.area_command(area_id, AreaCommand::ChangeLocation(cmd))
    }

    /// Point the area at another reservoir of its farm, or at none.
    pub fn change_area_reservoir(
        &self,
        area_id: AreaId,
        reservoir_id: Option<ReservoirId>,
        occurred_at: DateTime<Utc>,
    ) -> Result<AreaRow, CommandError> {
        let reservoir = reservoir_id
            .map(|reservoir_id| self.reservoir_link(reservoir_id))
            .transpose()?;
        self.area_command(
            area_id,
            AreaCommand::ChangeReservoir(ChangeAreaReservoir {
                reservoir,
                occurred_at,
            }),
        )
    }

    pub fn add_area_note(&self, area_id: AreaId, cmd: AddAreaNote) -> Result<AreaRow, CommandError> {
        self.area_command(area_id, AreaCommand::AddNote(cmd))
    }

    pub fn remove_area_note(&self, area_id: AreaId, cmd: RemoveAreaNote) -> Result<AreaRow, CommandError> {
        self.area_command(area_id, AreaCommand::RemoveNote(cmd))
    }

    /// Crops still holding plants in the area are not a blocker; their rows show
    /// `dependency_removed`.
    pub fn remove_area(&self, area_id: AreaId, cmd: RemoveArea) -> Result<(), CommandError> {
        let id = area_id.aggregate_id();
        let done = self.repository.execute::<Area>(id, &AreaCommand::Remove(cmd))?;
        ensure_projected(self.areas.view(), id, &done.report)
    }

    fn area_command(&self, area_id: AreaId, cmd: AreaCommand) -> Result<AreaRow, CommandError> {
        let id = area_id.aggregate_id();
        let done = self.repository.execute::<Area>(id, &cmd)?;
        committed_row(&self.areas, id, &done.report)
    }

    pub fn area(&self, area_id: AreaId) -> Result<AreaRow, CommandError> {
        Ok(self.areas.find(area_id.aggregate_id())?)
    }

    pub fn areas_of_farm(&self, farm_id: FarmId) -> Result<Vec<AreaRow>, CommandError> {
        Ok(self.areas.find_by(|a| a.farm_id == farm_id)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Materials
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_material(&self, cmd: CreateMaterial) -> Result<MaterialRow, CommandError> {
        let id = MaterialId::generate().aggregate_id();
        let done = self
            .repository
            .create::<Material>(id, &MaterialCommand::Create(cmd))?;
        committed_row(&self.materials, id, &done.report)
    }

    pub fn rename_material(
        &self,
        material_id: MaterialId,
        cmd: ChangeMaterialName,
    ) -> Result<MaterialRow, CommandError> {
        self.material_command(material_id, MaterialCommand::ChangeName(cmd))
    }

    pub fn change_material_price(
        &self,
        material_id: MaterialId,
        cmd: ChangeMaterialPrice,
    ) -> Result<MaterialRow, CommandError> {
        self.material_command(material_id, MaterialCommand::ChangePrice(cmd))
    }

    pub fn change_material_quantity(
        &self,
        material_id: MaterialId,
        cmd: ChangeMaterialQuantity,
    ) -> Result<MaterialRow, CommandError> {
        self.material_command(material_id, MaterialCommand::ChangeQuantity(cmd))
    }

    pub fn change_material_expiration(
        &self,
        material_id: MaterialId,
        cmd: ChangeMaterialExpiration,
    ) -> Result<MaterialRow, CommandError> {
        self.material_command(material_id, MaterialCommand::ChangeExpiration(cmd))
    }

    pub fn remove_material(&self, material_id: MaterialId, cmd: RemoveMaterial) -> Result<(), CommandError> {
        let id = material_id.aggregate_id();
        let done = self
            .repository
            .execute::<Material>(id, &MaterialCommand::Remove(cmd))?;
        ensure_projected(self.materials.view(), id, &done.report)
    }

    fn material_command(
        &self,
        material_id: MaterialId,
        cmd: MaterialCommand,
    ) -> Result<MaterialRow, CommandError> {
        let id = material_id.aggregate_id();
        let done = self.repository.execute::<Material>(id, &cmd)?;
        committed_row(&self.materials, id, &done.report)
    }

    pub fn material(&self, material_id: MaterialId) -> Result<MaterialRow, CommandError> {
        Ok(self.materials.find(material_id.aggregate_id())?)
    }

    pub fn materials(&self) -> Result<Vec<MaterialRow>, CommandError> {
        Ok(self.materials.all()?)
    }

    pub fn materials_of_type(&self, material_type: MaterialType) -> Result<Vec<MaterialRow>, CommandError> {
        Ok(self.materials.find_by(|m| m.material_type == material_type)?)
    }
}
