//! Component trait and typed storage

use std::any::Any;

use slotmap::SecondaryMap;

use super::Entity;

/// Marker trait for components
pub trait Component: 'static + Send + Sync {}

/// Type erased view of a storage, for removing every component of an entity
pub(super) trait AnyStorage: Send + Sync {
    fn remove_entity(&mut self, entity: Entity);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Components of one type keyed by entity
pub(super) struct Storage<T: Component> {
    pub(super) components: SecondaryMap<Entity, T>,
}

impl<T: Component> Storage<T> {
    pub(super) fn new() -> Self {
        Self {
            components: SecondaryMap::new(),
        }
    }
}

impl<T: Component> AnyStorage for Storage<T> {
    fn remove_entity(&mut self, entity: Entity) {
        self.components.remove(entity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
