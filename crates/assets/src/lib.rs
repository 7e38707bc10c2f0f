//! Assets domain module (event-sourced).
//!
//! Farms and the physical assets that belong to them: growing areas, water
//! reservoirs, and the material inventory. Pure deterministic domain logic (no IO,
//! no HTTP, no storage).

pub mod area;
pub mod farm;
pub mod material;
pub mod reservoir;

pub use area::{
    AddAreaNote, Area, AreaCommand, AreaCreated, AreaEvent, AreaId, AreaLink, AreaLocation,
    AreaLocationChanged, AreaNameChanged, AreaNoteAdded, AreaNoteRemoved, AreaRemoved,
    AreaReservoirChanged, AreaSize, AreaSizeChanged, AreaType, AreaTypeChanged, AreaUnit,
    ChangeAreaLocation, ChangeAreaName, ChangeAreaReservoir, ChangeAreaSize, ChangeAreaType,
    CreateArea, RemoveArea, RemoveAreaNote,
};
pub use farm::{
    ChangeFarmGeolocation, ChangeFarmName, ChangeFarmRegion, ChangeFarmType, CreateFarm, Farm,
    FarmCommand, FarmCreated, FarmEvent, FarmGeolocationChanged, FarmId, FarmNameChanged,
    FarmRegionChanged, FarmTypeChanged, Geolocation, Region,
};
pub use material::{
    ChangeMaterialExpiration, ChangeMaterialName, ChangeMaterialPrice, ChangeMaterialQuantity,
    CreateMaterial, Material, MaterialCommand, MaterialCreated, MaterialEvent,
    MaterialExpirationChanged, MaterialId, MaterialLink, MaterialNameChanged,
    MaterialPriceChanged, MaterialQuantity, MaterialQuantityChanged, MaterialRemoved,
    MaterialType, Price, RemoveMaterial,
};
pub use reservoir::{
    AddReservoirNote, ChangeReservoirName, ChangeWaterSource, CreateReservoir, RemoveReservoir,
    RemoveReservoirNote, Reservoir, ReservoirCommand, ReservoirCreated, ReservoirEvent,
    ReservoirId, ReservoirLink, ReservoirNameChanged, ReservoirNoteAdded, ReservoirNoteRemoved,
    ReservoirRemoved, WaterSource, WaterSourceChanged,
};
