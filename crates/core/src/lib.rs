//! `tania-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod note;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, AggregateType, ExpectedVersion, fold};
pub use entity::Entity;
pub use error::{DomainError, DomainResult, validate_name};
pub use id::{AggregateId, NoteId};
pub use note::Note;
pub use value_object::ValueObject;
