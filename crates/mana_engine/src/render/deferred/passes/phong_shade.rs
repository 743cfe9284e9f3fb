//! Phong shading of the geometry buffer
//!
//! Splits the lit result into ambient, diffuse and specular slots plus their
//! sum, so the composite pass and debug layers can show each term alone.

use std::any::Any;

use log::trace;

use crate::core::config::RendererConfig;
use crate::render::api::uniforms;
use crate::render::api::{
    ColorFormat, RenderCommand, RenderDevice, RenderOptions, RenderProperties, ShaderProgram, ShaderSource,
};
use crate::render::deferred::geometry_buffer::{names, GeometryBuffer};
use crate::render::deferred::render_pass::RenderPass;
use crate::render::deferred::render_scene::RenderScene;
use crate::render::BackendResult;

const READS: [&str; 6] = [
    names::POSITION,
    names::NORMAL,
    names::DIFFUSE,
    names::SPECULAR,
    names::SHININESS,
    names::DEPTH,
];

const WRITES: [&str; 4] = [
    names::PHONG_AMBIENT,
    names::PHONG_DIFFUSE,
    names::PHONG_SPECULAR,
    names::PHONG_COMBINED,
];

/// Deferred Phong lighting
pub struct PhongShadePass {
    program: Box<dyn ShaderProgram>,
    max_lights: usize,
}

impl PhongShadePass {
    /// Link the shading program
    pub fn new(device: &mut dyn RenderDevice, config: &RendererConfig) -> BackendResult<Self> {
        let program = device.allocator().create_shader_program(
            &ShaderSource::vertex("screen"),
            &ShaderSource::fragment("phong_shade"),
            None,
        )?;
        Ok(Self {
            program,
            max_lights: config.max_lights,
        })
    }
}

impl RenderPass for PhongShadePass {
    fn name(&self) -> &str {
        "PhongShade"
    }

    fn prepare_buffer(&mut self, gbuffer: &mut GeometryBuffer) -> BackendResult<()> {
        for name in WRITES {
            gbuffer.add_buffer(name, ColorFormat::Rgba)?;
        }
        Ok(())
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
        scene: &RenderScene<'_>,
    ) -> BackendResult<()> {
        trace!("Phong shading {} lights", scene.lights.len());
        gbuffer.detach_depth_stencil();
        gbuffer.attach_color(&WRITES)?;

        let view_position = scene.camera.position();
        uniforms::upload_lights(self.program.as_mut(), &scene.lights, &view_position, self.max_lights);
        for (unit, name) in READS.iter().enumerate() {
            self.program.set_texture(name, unit);
        }

        let textures = gbuffer.buffers(&READS)?;
        let command = RenderCommand::new(self.program.as_ref(), vec![gbuffer.screen_quad()])
            .with_textures(textures)
            .with_properties(RenderProperties::screen());

        let renderer = device.renderer();
        renderer.render_begin(gbuffer.render_target(), &RenderOptions::new(gbuffer.size()))?;
        renderer.add_command(&command)?;
        renderer.render_finish()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
