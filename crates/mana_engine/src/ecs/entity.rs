//! Entity identifiers

slotmap::new_key_type! {
    /// Generational entity handle; stale handles never alias new entities
    pub struct Entity;
}

/// Bookkeeping the world keeps per entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct EntityInfo {
    pub(super) name: String,
    pub(super) enabled: bool,
}
