//! Composite pass
//!
//! Per pixel choice between the deferred result (the three Phong terms
//! summed), the forward result and the skybox, by comparing `depth` with
//! `forward_depth`. The winning depth goes to `composite_depth` so the
//! compositor can depth test later layers against the scene.

use std::any::Any;

use crate::render::api::{
    ColorFormat, DepthTestMode, RenderCommand, RenderDevice, RenderOptions, RenderProperties, ShaderProgram,
    ShaderSource,
};
use crate::render::deferred::geometry_buffer::{names, GeometryBuffer};
use crate::render::deferred::render_pass::RenderPass;
use crate::render::deferred::render_scene::RenderScene;
use crate::render::BackendResult;

const READS: [&str; 7] = [
    names::DEPTH,
    names::PHONG_AMBIENT,
    names::PHONG_DIFFUSE,
    names::PHONG_SPECULAR,
    names::FORWARD,
    names::FORWARD_DEPTH,
    names::SKYBOX,
];

const WRITES: [&str; 2] = [names::COMPOSITE, names::COMPOSITE_DEPTH];

/// Merges deferred, forward and skybox results
pub struct CompositePass {
    program: Box<dyn ShaderProgram>,
}

impl CompositePass {
    /// Link the composite program
    pub fn new(device: &mut dyn RenderDevice) -> BackendResult<Self> {
        let program = device.allocator().create_shader_program(
            &ShaderSource::vertex("screen"),
            &ShaderSource::fragment("composite"),
            None,
        )?;
        Ok(Self { program })
    }
}

impl RenderPass for CompositePass {
    fn name(&self) -> &str {
        "Composite"
    }

    fn prepare_buffer(&mut self, gbuffer: &mut GeometryBuffer) -> BackendResult<()> {
        gbuffer.add_buffer(names::COMPOSITE, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::COMPOSITE_DEPTH, ColorFormat::DepthStencil)
    }

    fn reads(&self) -> &[&'static str] {
        &READS
    }

    fn writes(&self) -> &[&'static str] {
        &WRITES
    }

    fn render(
        &mut self,
        device: &mut dyn RenderDevice,
        gbuffer: &mut GeometryBuffer,
        _scene: &RenderScene<'_>,
    ) -> BackendResult<()> {
        gbuffer.attach_color(&[names::COMPOSITE])?;
        gbuffer.attach_depth_stencil(names::COMPOSITE_DEPTH)?;

        for (unit, name) in READS.iter().enumerate() {
            self.program.set_texture(name, unit);
        }
        let properties = RenderProperties {
            enable_depth_test: true,
            depth_test_write: true,
            depth_test_mode: DepthTestMode::Always,
            ..RenderProperties::screen()
        };
        let command = RenderCommand::new(self.program.as_ref(), vec![gbuffer.screen_quad()])
            .with_textures(gbuffer.buffers(&READS)?)
            .with_properties(properties);

        let renderer = device.renderer();
        renderer.render_begin(gbuffer.render_target(), &RenderOptions::new(gbuffer.size()))?;
        renderer.add_command(&command)?;
        renderer.render_finish()?;

        gbuffer.detach_depth_stencil();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
