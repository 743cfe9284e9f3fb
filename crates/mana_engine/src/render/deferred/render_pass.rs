//! Render pass interface

use std::any::Any;

use super::geometry_buffer::GeometryBuffer;
use super::render_scene::RenderScene;
use crate::render::api::RenderDevice;
use crate::render::BackendResult;

/// One step of the deferred pipeline
///
/// `prepare_buffer` runs once when the pipeline is built and registers every
/// slot the pass touches. `render` runs every frame and binds the exact
/// subset of slots it draws to; no binding is assumed to survive from an
/// earlier pass.
///
/// `reads` and `writes` declare the slot names the pass samples and draws
/// to. The pipeline rejects a pass list where a slot is read before any
/// earlier pass writes it.
pub trait RenderPass: Any {
    /// Name used in logs and dependency errors
    fn name(&self) -> &str;

    /// Register the slots this pass uses
    fn prepare_buffer(&mut self, gbuffer: &mut GeometryBuffer) -> BackendResult<()>;

    /// Slots sampled by `render`
    fn reads(&self) -> &[&'static str] {
        &[]
    }

    /// Slots drawn to by `render`
    fn writes(&self) -> &[&'static str];

    /// Draw one frame
    fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        gbuffer: &mut GeometryBuffer,
        scene: &RenderScene<'_>,
    ) -> BackendResult<()>;

    /// Concrete pass type
    fn as_any(&self) -> &dyn Any;

    /// Concrete pass type
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
