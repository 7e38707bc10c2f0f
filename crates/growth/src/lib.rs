//! Growth domain module (event-sourced).
//!
//! Crop batches: planting, moving between areas, watering, harvesting, dumping and
//! archiving. Rules that involve areas or materials are checked against snapshots
//! the caller replays from the assets streams.

pub mod batch_id;
pub mod crop;

pub use batch_id::generate_batch_id;
pub use crop::{
    AddCropNote, ArchiveCrop, ContainerType, Crop, CropArea, CropBatchArchived, CropBatchCreated,
    CropBatchDumped, CropBatchHarvested, CropBatchMoved, CropBatchWatered, CropCommand,
    CropContainer, CropEvent, CropId, CropNoteAdded, CropNoteRemoved, CropStatus, CropType,
    DumpCrop, HarvestCrop, HarvestType, MoveCrop, PlantCrop, RemoveCropNote, WaterCrop,
};
