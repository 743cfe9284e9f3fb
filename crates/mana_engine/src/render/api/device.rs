//! Render device: command submission plus resource allocation
//!
//! A backend implements the three traits here. Resources created by one
//! backend's allocator are only accepted by the same backend; handing a
//! foreign resource to a backend is a `ForeignResource` error.

use super::mesh_buffer::MeshBuffer;
use super::render_command::{RenderCommand, RenderOptions};
use super::render_target::RenderTarget;
use super::shader_program::{ShaderProgram, ShaderSource};
use super::texture_buffer::{TextureAttributes, TextureBuffer};
use crate::foundation::math::{Mat4, Vec2i};
use crate::render::primitives::Mesh;
use crate::render::BackendResult;

/// Command submission
///
/// A frame step is `render_begin`, any number of `add_command`, then
/// `render_finish`. Commands draw into the target bound at `render_begin`.
pub trait Renderer {
    /// Bind `target`, set the viewport and clear per `options`
    fn render_begin(&mut self, target: &dyn RenderTarget, options: &RenderOptions) -> BackendResult<()>;

    /// Draw one command into the bound target
    fn add_command(&mut self, command: &RenderCommand<'_>) -> BackendResult<()>;

    /// Finish the current step and release the target
    fn render_finish(&mut self) -> BackendResult<()>;
}

/// Resource factory
pub trait RenderAllocator {
    /// Framebuffer of `size` with no attachments
    fn create_render_target(&mut self, size: Vec2i, samples: u32) -> BackendResult<Box<dyn RenderTarget>>;

    /// Texture with `attributes`, contents undefined until uploaded
    fn create_texture_buffer(&mut self, attributes: TextureAttributes) -> BackendResult<Box<dyn TextureBuffer>>;

    /// Upload `mesh`. Only `Tri` meshes are accepted.
    fn create_mesh_buffer(&mut self, mesh: &Mesh) -> BackendResult<Box<dyn MeshBuffer>>;

    /// Upload `mesh` with one instance per transform
    fn create_instanced_mesh_buffer(
        &mut self,
        mesh: &Mesh,
        instances: &[Mat4],
    ) -> BackendResult<Box<dyn MeshBuffer>>;

    /// Link a program from its stages
    fn create_shader_program(
        &mut self,
        vertex: &ShaderSource,
        fragment: &ShaderSource,
        geometry: Option<&ShaderSource>,
    ) -> BackendResult<Box<dyn ShaderProgram>>;
}

/// A graphics backend
pub trait RenderDevice {
    /// Command submission
    fn renderer(&mut self) -> &mut dyn Renderer;

    /// Resource factory
    fn allocator(&mut self) -> &mut dyn RenderAllocator;
}
