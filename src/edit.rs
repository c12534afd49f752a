use crate::value::CellValue;

/// External collaborator that applies inline cell edits to the entity store.
///
/// Both updates are fire-and-forget: the model never applies the edit to its
/// own snapshot and waits for a change notification instead.
pub trait EditTarget<R> {
    /// Key of the entity owning a row's reference (e.g. the activity that
    /// outputs an exchange).
    type EntityKey;

    fn owning_entity(&self, reference: &R) -> Self::EntityKey;

    /// Writes a whitelisted field of the referenced object itself.
    fn update_field(&mut self, reference: &R, field: &str, value: CellValue);

    /// Writes a field of the owning entity.
    fn update_entity(&mut self, entity: Self::EntityKey, field: &str, value: CellValue);
}

/// Where an edit was forwarded to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditRoute {
    /// `update_field` with the store field name.
    Field(String),
    /// `update_entity` with the store field name.
    Entity(String),
}
