//! Transform component with optional parenting

use log::warn;

use crate::ecs::{Component, Entity, World};
use crate::foundation::math::{Mat4, Quat, Transform, Vec3};

/// Placement of an entity relative to its parent (or the world)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransformComponent {
    /// Local transform
    pub transform: Transform,
    /// Entity this transform is relative to
    pub parent: Option<Entity>,
}

impl Component for TransformComponent {}

impl TransformComponent {
    /// Root transform at `position`
    pub fn from_position(position: Vec3) -> Self {
        Self {
            transform: Transform::from_position(position),
            parent: None,
        }
    }

    /// Root transform from a full local transform
    pub const fn new(transform: Transform) -> Self {
        Self { transform, parent: None }
    }

    /// Builder pattern: set rotation
    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.transform.rotation = rotation;
        self
    }

    /// Builder pattern: set scale
    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.transform.scale = scale;
        self
    }

    /// Builder pattern: set parent
    #[must_use]
    pub fn with_parent(mut self, parent: Entity) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// World transform of `entity`, combining the chain of parents
///
/// Entities without a transform sit at the origin. A parent without a
/// transform ends the chain, a parent loop is cut where it closes.
pub fn world_transform(world: &World, entity: Entity) -> Transform {
    let mut chain = Vec::new();
    let mut current = Some(entity);
    while let Some(id) = current {
        let Some(component) = world.get::<TransformComponent>(id) else {
            break;
        };
        if chain.len() > world.len() {
            warn!("Transform parent loop through {:?}", id);
            break;
        }
        chain.push(component.transform);
        current = component.parent;
    }
    chain
        .iter()
        .rev()
        .fold(Transform::identity(), |parent, local| parent.combine(local))
}

/// Model matrix of `entity`
pub fn world_matrix(world: &World, entity: Entity) -> Mat4 {
    world_transform(world, entity).to_matrix()
}
