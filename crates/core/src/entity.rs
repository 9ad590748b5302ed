//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Compartments and assets are entities: two values with the same id describe the
/// same thing even when their slots or quantities differ.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;
}

/// Find an entity by id in a slice.
pub fn find_by_id<E: Entity>(entities: &[E], id: E::Id) -> Option<&E> {
    entities.iter().find(|e| e.id() == id)
}
