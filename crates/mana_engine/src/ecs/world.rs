//! ECS World implementation

use std::any::TypeId;
use std::collections::HashMap;

use log::trace;
use slotmap::SlotMap;
use thiserror::Error;

use super::component::{AnyStorage, Storage};
use super::entity::EntityInfo;
use super::{Component, Entity};

/// World errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// The entity was destroyed or never existed
    #[error("Entity {0:?} does not exist")]
    NoSuchEntity(Entity),
}

/// Entities with an enabled flag and typed component storages
#[derive(Default)]
pub struct World {
    entities: SlotMap<Entity, EntityInfo>,
    storages: HashMap<TypeId, Box<dyn AnyStorage>>,
}

impl World {
    /// Create an empty world
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an enabled entity without components
    pub fn create_entity(&mut self) -> Entity {
        self.create_named("")
    }

    /// Create an enabled entity with a display name
    pub fn create_named(&mut self, name: impl Into<String>) -> Entity {
        let entity = self.entities.insert(EntityInfo {
            name: name.into(),
            enabled: true,
        });
        trace!("Created entity {:?}", entity);
        entity
    }

    /// Destroy an entity and all its components, returning whether it existed
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if self.entities.remove(entity).is_none() {
            return false;
        }
        for storage in self.storages.values_mut() {
            storage.remove_entity(entity);
        }
        true
    }

    /// Whether the entity exists
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(entity)
    }

    /// Number of entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the world has no entities
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// All entities, enabled or not
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.keys()
    }

    /// Display name of an entity
    pub fn name(&self, entity: Entity) -> Option<&str> {
        self.entities.get(entity).map(|info| info.name.as_str())
    }

    /// Whether the entity exists and is enabled
    pub fn is_enabled(&self, entity: Entity) -> bool {
        self.entities.get(entity).is_some_and(|info| info.enabled)
    }

    /// Enable or disable an entity; disabled entities are skipped by queries
    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) -> Result<(), EcsError> {
        let info = self.entities.get_mut(entity).ok_or(EcsError::NoSuchEntity(entity))?;
        info.enabled = enabled;
        Ok(())
    }

    /// Attach a component, returning the one it replaces
    pub fn insert<T: Component>(&mut self, entity: Entity, component: T) -> Result<Option<T>, EcsError> {
        if !self.contains(entity) {
            return Err(EcsError::NoSuchEntity(entity));
        }
        let storage = self
            .storages
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Storage::<T>::new()));
        let previous = storage
            .as_any_mut()
            .downcast_mut::<Storage<T>>()
            .and_then(|storage| storage.components.insert(entity, component));
        Ok(previous)
    }

    /// Detach a component
    pub fn remove<T: Component>(&mut self, entity: Entity) -> Option<T> {
        self.storage_mut::<T>()?.components.remove(entity)
    }

    /// Component of an entity
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.storage::<T>()?.components.get(entity)
    }

    /// Mutable component of an entity
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.storage_mut::<T>()?.components.get_mut(entity)
    }

    /// Whether the entity has a component of type `T`
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.get::<T>(entity).is_some()
    }

    /// Enabled entities with a `T` component
    pub fn query<T: Component>(&self) -> impl Iterator<Item = (Entity, &T)> + '_ {
        self.storage::<T>()
            .into_iter()
            .flat_map(|storage| storage.components.iter())
            .filter(|(entity, _)| self.is_enabled(*entity))
    }

    fn storage<T: Component>(&self) -> Option<&Storage<T>> {
        self.storages.get(&TypeId::of::<T>())?.as_any().downcast_ref()
    }

    fn storage_mut<T: Component>(&mut self) -> Option<&mut Storage<T>> {
        self.storages.get_mut(&TypeId::of::<T>())?.as_any_mut().downcast_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    #[derive(Debug, PartialEq)]
    struct Tag;
    impl Component for Tag {}

    #[test]
    fn test_insert_get_remove() {
        let mut world = World::new();
        let entity = world.create_named("player");
        assert_eq!(world.name(entity), Some("player"));

        assert_eq!(world.insert(entity, Health(10)).unwrap(), None);
        assert_eq!(world.insert(entity, Health(20)).unwrap(), Some(Health(10)));
        world.get_mut::<Health>(entity).unwrap().0 += 1;
        assert_eq!(world.get::<Health>(entity), Some(&Health(21)));
        assert!(!world.has::<Tag>(entity));

        assert_eq!(world.remove::<Health>(entity), Some(Health(21)));
        assert_eq!(world.get::<Health>(entity), None);
    }

    #[test]
    fn test_query_skips_disabled_entities() {
        let mut world = World::new();
        let a = world.create_entity();
        let b = world.create_entity();
        let c = world.create_entity();
        world.insert(a, Health(1)).unwrap();
        world.insert(b, Health(2)).unwrap();
        world.insert(c, Tag).unwrap();

        world.set_enabled(b, false).unwrap();
        let found: Vec<Entity> = world.query::<Health>().map(|(entity, _)| entity).collect();
        assert_eq!(found, vec![a]);
        assert_eq!(world.query::<Tag>().count(), 1);

        world.set_enabled(b, true).unwrap();
        assert_eq!(world.query::<Health>().count(), 2);
    }

    #[test]
    fn test_destroyed_entities_lose_components() {
        let mut world = World::new();
        let entity = world.create_entity();
        world.insert(entity, Health(5)).unwrap();

        assert!(world.destroy_entity(entity));
        assert!(!world.destroy_entity(entity));
        assert!(world.is_empty());
        assert_eq!(world.query::<Health>().count(), 0);
        assert_eq!(world.insert(entity, Tag), Err(EcsError::NoSuchEntity(entity)));
        assert!(world.set_enabled(entity, false).is_err());

        // A new entity never revives the stale handle
        let fresh = world.create_entity();
        assert_ne!(fresh, entity);
        assert!(world.get::<Health>(entity).is_none());
    }
}
