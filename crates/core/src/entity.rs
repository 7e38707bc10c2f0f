//! Entity trait: identity + continuity across state changes.

/// Domain object identified by an id rather than by its values.
///
/// Entities live inside an aggregate (e.g. the notes of an area or a crop batch) and
/// are only ever changed through events of their owning aggregate.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Find an entity by id in a slice.
pub fn find_by_id<'a, E: Entity>(entities: &'a [E], id: &E::Id) -> Option<&'a E> {
    entities.iter().find(|e| e.id() == id)
}
