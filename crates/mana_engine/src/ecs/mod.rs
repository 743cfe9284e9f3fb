//! Entity-Component-System implementation
//!
//! A [`World`] of generational entities with typed component storages, plus
//! the components and systems that turn a world into rendered frames.

pub mod component;
pub mod components;
pub mod entity;
pub mod systems;
pub mod world;

pub use component::Component;
pub use entity::Entity;
pub use world::{EcsError, World};
