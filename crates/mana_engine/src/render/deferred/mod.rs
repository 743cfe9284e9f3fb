//! # Deferred Pipeline
//!
//! A [`Renderer3D`] owns a [`GeometryBuffer`], an ordered list of
//! [`RenderPass`] values and a [`Compositor`]. Every frame it resizes the
//! buffer to the screen, runs the passes against a [`RenderScene`], presents
//! the compositor layers and finally copies the scene depth to the screen so
//! later drawing can depth test against it.

pub mod compositor;
pub mod geometry_buffer;
pub mod layer_tree;
pub mod passes;
pub mod render_pass;
pub mod render_scene;
pub mod renderer3d;

pub use compositor::{Compositor, Layer};
pub use geometry_buffer::{names, GeometryBuffer};
pub use layer_tree::{LayerItem, LayerTree, LayerTreeError};
pub use passes::{CompositePass, DebugPass, DebugRenderer, ForwardPass, GeometryPass, LightingPass, PhongShadePass};
#[cfg(feature = "imgui")]
pub use passes::{ImGuiPass, UiContext, UiHandle, Widget};
pub use render_pass::RenderPass;
pub use render_scene::{DeferredCommand, ForwardCommand, RenderScene, SceneMaterial};
pub use renderer3d::{check_pass_dependencies, default_layers, Renderer3D};
