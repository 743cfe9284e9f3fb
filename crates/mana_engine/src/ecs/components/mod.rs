//! ECS Components module
//!
//! Plain data read by the render system.

pub mod lighting;
pub mod renderable;
pub mod transform;

pub use lighting::{CameraComponent, LightComponent};
pub use renderable::{MeshRenderComponent, Outline, SkyboxComponent};
pub use transform::{world_matrix, world_transform, TransformComponent};
