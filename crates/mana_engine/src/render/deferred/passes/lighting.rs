//! Single slot deferred lighting
//!
//! Lighter alternative to [`super::PhongShadePass`]: writes the combined
//! Phong result to `lighting` and passes the raw diffuse color through where
//! the id mask shows no deferred object.

use std::any::Any;

use crate::core::config::RendererConfig;
use crate::render::api::uniforms;
use crate::render::api::{
    ColorFormat, RenderCommand, RenderDevice, RenderOptions, RenderProperties, ShaderProgram, ShaderSource,
};
use crate::render::deferred::geometry_buffer::{names, GeometryBuffer};
use crate::render::deferred::render_pass::RenderPass;
use crate::render::deferred::render_scene::RenderScene;
use crate::render::BackendResult;

const READS: [&str; 7] = [
    names::POSITION,
    names::NORMAL,
    names::DIFFUSE,
    names::SPECULAR,
    names::SHININESS,
    names::DEPTH,
    names::ID,
];

const WRITES: [&str; 1] = [names::LIGHTING];

/// Deferred lighting into one slot
pub struct LightingPass {
    program: Box<dyn ShaderProgram>,
    max_lights: usize,
}

impl LightingPass {
    /// Link the lighting program
    pub fn new(device: &mut dyn RenderDevice, config: &RendererConfig) -> BackendResult<Self> {
        let program = device.allocator().create_shader_program(
            &ShaderSource::vertex("screen"),
            &ShaderSource::fragment("lighting"),
            None,
        )?;
        Ok(Self {
            program,
            max_lights: config.max_lights,
        })
    }
}

impl RenderPass for LightingPass {
    fn name(&self) -> &str {
        "Lighting"
    }

    fn prepare_buffer(&mut self, gbuffer: &mut GeometryBuffer) -> BackendResult<()> {
        gbuffer.add_buffer(names::LIGHTING, ColorFormat::Rgba)
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
        gbuffer.detach_depth_stencil();
        gbuffer.attach_color(&WRITES)?;

        uniforms::upload_lights(self.program.as_mut(), &scene.lights, &scene.camera.position(), self.max_lights);
        for (unit, name) in READS.iter().enumerate() {
            self.program.set_texture(name, unit);
        }

        let command = RenderCommand::new(self.program.as_ref(), vec![gbuffer.screen_quad()])
            .with_textures(gbuffer.buffers(&READS)?)
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Transform, Vec2i, Vec3};
    use crate::render::backends::software::SoftwareDevice;
    use crate::render::deferred::passes::GeometryPass;
    use crate::render::deferred::render_scene::{DeferredCommand, SceneMaterial};
    use crate::render::primitives::{Camera, ColorRGBA, Light, Mesh};

    #[test]
    fn test_lit_object_and_empty_background() {
        let mut device = SoftwareDevice::new();
        let config = RendererConfig::default();
        let mut geometry = GeometryPass::new(&mut device, &config).unwrap();
        let mut lighting = LightingPass::new(&mut device, &config).unwrap();

        let mut gbuffer = GeometryBuffer::new(device.allocator(), Vec2i::new(8, 8)).unwrap();
        geometry.prepare_buffer(&mut gbuffer).unwrap();
        lighting.prepare_buffer(&mut gbuffer).unwrap();
        gbuffer.allocate(device.allocator()).unwrap();

        let cube = device.allocator().create_mesh_buffer(&Mesh::cube()).unwrap();
        let mut scene = RenderScene::new(Camera::perspective(Vec3::new(0.0, 0.0, 5.0)).with_aspect(1.0));
        scene.deferred.push(DeferredCommand::new(
            Transform::identity(),
            SceneMaterial::flat(ColorRGBA::new(0, 255, 0, 255)),
            cube.as_ref(),
        ));
        scene.lights.push(
            Light::directional(Vec3::new(0.0, 0.0, -1.0)).with_colors(Vec3::zeros(), Vec3::repeat(1.0), Vec3::zeros()),
        );

        geometry.render(&mut device, &mut gbuffer, &scene).unwrap();
        lighting.render(&mut device, &mut gbuffer, &scene).unwrap();

        let image = gbuffer.buffer(names::LIGHTING).unwrap().download_rgba().unwrap();
        assert_eq!(image.get(4, 4), Some(&ColorRGBA::new(0, 255, 0, 255)));
        assert_eq!(image.get(0, 0), Some(&ColorRGBA::TRANSPARENT));
    }
}
