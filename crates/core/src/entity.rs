//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Every relational record the sagas write is an entity; the id is what
/// compensations use to target exactly the row a forward step created.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
