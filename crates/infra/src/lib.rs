//! Infrastructure layer: event store, read stores, projections, services, config.

pub mod composition;
pub mod config;
pub mod db;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod repository;
pub mod services;
