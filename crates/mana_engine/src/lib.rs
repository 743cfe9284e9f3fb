//! # Mana Engine
//!
//! Deferred rendering core of the Mana 3D engine.
//!
//! ## Features
//!
//! - **Deferred Rendering**: G-buffer passes, Phong and Blinn lighting, a
//!   forward pass for custom programs and a layered compositor
//! - **Backend Abstraction**: the pipeline only talks to a small set of traits;
//!   a CPU rasterizer ships as the reference backend
//! - **Asset Bundles**: OBJ, PNG, WAV and JSON bundle descriptions decoded on
//!   a worker pool and shared between callers
//! - **ECS**: a slotmap world whose render system turns entities into frames
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use mana_engine::prelude::*;
//! use mana_engine::render::backends::software::SoftwareDevice;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ApplicationConfig::load_or_default("mana.toml")?;
//!     mana_engine::foundation::logging::init_with_level(&config.engine.log_level);
//!
//!     let mut device = SoftwareDevice::new();
//!     let importer = Arc::new(AssetImporter::from_config(&config.assets));
//!     let mut system = RenderSystem::new(&mut device, importer, &config.renderer)?;
//!
//!     let mut world = World::new();
//!     let cube = world.create_named("cube");
//!     world.insert(cube, TransformComponent::default())?;
//!     world.insert(
//!         cube,
//!         MeshRenderComponent::new(AssetPath::new("cube.obj", ""), AssetPath::new("materials.json", "Red")),
//!     )?;
//!
//!     let size = Vec2i::new(640, 320);
//!     let mut screen = device.allocator().create_render_target(size, 1)?;
//!     let color = device
//!         .allocator()
//!         .create_texture_buffer(TextureAttributes::new(size, ColorFormat::Rgba))?;
//!     screen.attach_color(0, color.as_ref())?;
//!
//!     system.update(&world, &mut device, screen.as_mut())?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod assets;
pub mod config;
pub mod core;
pub mod ecs;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{AssetBundle, AssetError, AssetImporter, AssetPath},
        config::Config,
        core::config::{ApplicationConfig, AssetConfig, EngineConfig, RendererConfig},
        ecs::{
            components::{CameraComponent, LightComponent, MeshRenderComponent, SkyboxComponent, TransformComponent},
            Component, Entity, World,
            systems::RenderSystem,
        },
        foundation::math::{Mat4, Quat, Transform, Vec2i, Vec3},
        render::{
            api::{ColorFormat, TextureAttributes},
            BackendResult, Camera, ColorRGBA, Light, Material, Mesh, RenderDevice, RenderError, RenderScene,
            RenderTarget, Renderer3D, TextureBuffer,
        },
    };
}
