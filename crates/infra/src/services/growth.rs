use chrono::{DateTime, Utc};

use tania_assets::{Area, AreaId, AreaLink, FarmId, Material, MaterialId, MaterialLink};
use tania_growth::{
    AddCropNote, ArchiveCrop, Crop, CropCommand, CropContainer, CropId, CropStatus, CropType,
    DumpCrop, HarvestCrop, MoveCrop, PlantCrop, RemoveCropNote, WaterCrop,
};

use super::{CommandError, committed_row};
use crate::projections::{CropActivityRow, CropRow};
use crate::read_model::ReadStore;
use crate::repository::Repository;

/// Planting as submitted by a caller; the service replays the area and material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlantCropRequest {
    pub area_id: AreaId,
    pub material_id: MaterialId,
    pub crop_type: CropType,
    pub container: CropContainer,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCropRequest {
    pub source_area_id: AreaId,
    pub destination_area_id: AreaId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Crop batches and their activity log.
#[derive(Debug, Clone)]
pub struct GrowthService {
    repository: Repository,
    crops: ReadStore<CropRow>,
    activities: ReadStore<CropActivityRow>,
}

impl GrowthService {
    pub fn new(
        repository: Repository,
        crops: ReadStore<CropRow>,
        activities: ReadStore<CropActivityRow>,
    ) -> Self {
        Self {
            repository,
            crops,
            activities,
        }
    }

    pub fn plant_crop(&self, request: PlantCropRequest) -> Result<CropRow, CommandError> {
        let cmd = PlantCrop {
            area: self.area_link(request.area_id)?,
            material: self.material_link(request.material_id)?,
            crop_type: request.crop_type,
            container: request.container,
            quantity: request.quantity,
            occurred_at: request.occurred_at,
        };
        let id = CropId::generate().aggregate_id();
        let done = self.repository.create::<Crop>(id, &CropCommand::Plant(cmd))?;
        committed_row(&self.crops, id, &done.report)
    }

    pub fn move_crop(&self, crop_id: CropId, request: MoveCropRequest) -> Result<CropRow, CommandError> {
        let cmd = MoveCrop {
            source_area_id: request.source_area_id,
            destination: self.area_link(request.destination_area_id)?,
            quantity: request.quantity,
            occurred_at: request.occurred_at,
        };
        self.crop_command(crop_id, CropCommand::Move(cmd))
    }

    pub fn water_crop(&self, crop_id: CropId, cmd: WaterCrop) -> Result<CropRow, CommandError> {
        self.crop_command(crop_id, CropCommand::Water(cmd))
    }

    pub fn harvest_crop(&self, crop_id: CropId, cmd: HarvestCrop) -> Result<CropRow, CommandError> {
        self.crop_command(crop_id, CropCommand::Harvest(cmd))
    }

    pub fn dump_crop(&self, crop_id: CropId, cmd: DumpCrop) -> Result<CropRow, CommandError> {
        self.crop_command(crop_id, CropCommand::Dump(cmd))
    }

    pub fn add_crop_note(&self, crop_id: CropId, cmd: AddCropNote) -> Result<CropRow, CommandError> {
        self.crop_command(crop_id, CropCommand::AddNote(cmd))
    }

    pub fn remove_crop_note(&self, crop_id: CropId, cmd: RemoveCropNote) -> Result<CropRow, CommandError> {
        self.crop_command(crop_id, CropCommand::RemoveNote(cmd))
    }

    pub fn archive_crop(&self, crop_id: CropId, cmd: ArchiveCrop) -> Result<CropRow, CommandError> {
        self.crop_command(crop_id, CropCommand::Archive(cmd))
    }

    fn crop_command(&self, crop_id: CropId, cmd: CropCommand) -> Result<CropRow, CommandError> {
        let id = crop_id.aggregate_id();
        let done = self.repository.execute::<Crop>(id, &cmd)?;
        committed_row(&self.crops, id, &done.report)
    }

    fn area_link(&self, area_id: AreaId) -> Result<AreaLink, CommandError> {
        let (area, _) = self.repository.load::<Area>(area_id.aggregate_id())?;
        area.link()
            .ok_or_else(|| CommandError::NotFound(format!("area {area_id}")))
    }

    fn material_link(&self, material_id: MaterialId) -> Result<MaterialLink, CommandError> {
        let (material, _) = self.repository.load::<Material>(material_id.aggregate_id())?;
        material
            .link()
            .ok_or_else(|| CommandError::NotFound(format!("material {material_id}")))
    }

    pub fn crop(&self, crop_id: CropId) -> Result<CropRow, CommandError> {
        Ok(self.crops.find(crop_id.aggregate_id())?)
    }

    pub fn crops_of_farm(&self, farm_id: FarmId) -> Result<Vec<CropRow>, CommandError> {
        Ok(self.crops.find_by(|c| c.farm_id == farm_id)?)
    }

    /// Crops with plants currently in `area_id`.
    pub fn crops_in_area(&self, area_id: AreaId) -> Result<Vec<CropRow>, CommandError> {
        Ok(self.crops.find_by(|c| c.is_in(area_id))?)
    }

    pub fn archived_crops(&self, farm_id: FarmId) -> Result<Vec<CropRow>, CommandError> {
        Ok(self
            .crops
            .find_by(|c| c.farm_id == farm_id && c.status == CropStatus::Archived)?)
    }

    pub fn crop_activities(&self, crop_id: CropId) -> Result<CropActivityRow, CommandError> {
        Ok(self.activities.find(crop_id.aggregate_id())?)
    }
}
