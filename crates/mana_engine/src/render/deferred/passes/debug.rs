//! Debug overlay pass
//!
//! Draws vertex normals of the deferred objects and light caster gizmos into
//! `debug`, depth tested against the scene depth without writing it.

use std::any::Any;

use crate::core::config::RendererConfig;
use crate::render::api::{
    ClearFlags, ColorFormat, RenderCommand, RenderDevice, RenderOptions, RenderProperties, ShaderProgram,
    ShaderSource, TextureBuffer,
};
use crate::render::deferred::geometry_buffer::{names, GeometryBuffer};
use crate::render::deferred::render_pass::RenderPass;
use crate::render::deferred::render_scene::RenderScene;
use crate::render::BackendResult;

use super::debug_renderer::DebugRenderer;

const READS: [&str; 1] = [names::DEPTH];
const WRITES: [&str; 1] = [names::DEBUG];

/// Normals and light gizmos
pub struct DebugPass {
    normals_program: Box<dyn ShaderProgram>,
    lines: DebugRenderer,
    draw_normals: bool,
    draw_light_casters: bool,
    normal_scale: f32,
}

impl DebugPass {
    /// Link the programs, toggles and normal length come from `config`
    pub fn new(device: &mut dyn RenderDevice, config: &RendererConfig) -> BackendResult<Self> {
        let normals_program = device.allocator().create_shader_program(
            &ShaderSource::vertex("debug"),
            &ShaderSource::fragment("debug_line"),
            Some(&ShaderSource::geometry("normals")),
        )?;
        Ok(Self {
            normals_program,
            lines: DebugRenderer::new(device)?,
            draw_normals: config.debug_normals,
            draw_light_casters: config.debug_light_casters,
            normal_scale: config.normal_scale,
        })
    }

    /// Toggle the normal, tangent and bitangent segments
    pub fn set_draw_normals(&mut self, enabled: bool) {
        self.draw_normals = enabled;
    }

    /// Toggle the light gizmos
    pub fn set_draw_light_casters(&mut self, enabled: bool) {
        self.draw_light_casters = enabled;
    }

    /// Length of the normal segments
    pub fn set_normal_scale(&mut self, scale: f32) {
        self.normal_scale = scale;
    }

    /// Line collector drawn at the end of the pass, for custom debug lines
    pub fn lines_mut(&mut self) -> &mut DebugRenderer {
        &mut self.lines
    }

    fn render_normals(
        &mut self,
        device: &mut dyn RenderDevice,
        gbuffer: &GeometryBuffer,
        scene: &RenderScene<'_>,
    ) -> BackendResult<()> {
        let camera = &scene.camera;
        let program = self.normals_program.as_mut();
        program.set_mat4("VIEW", camera.view());
        program.set_mat4("PROJECTION", camera.projection());
        program.set_float("scale", self.normal_scale);

        let properties = RenderProperties {
            depth_test_write: false,
            enable_face_culling: false,
            ..RenderProperties::default()
        };

        let renderer = device.renderer();
        renderer.render_begin(gbuffer.render_target(), &RenderOptions::new(gbuffer.size()).with_clear(ClearFlags::COLOR))?;
        if self.draw_normals {
            for command in &scene.deferred {
                program.set_mat4("MODEL", command.transform.to_matrix());
                let textures: Vec<&dyn TextureBuffer> = match command.material.normal_texture {
                    Some(normal) => {
                        program.set_bool("hasNormalTexture", true);
                        program.set_texture("normal", 0);
                        vec![normal]
                    }
                    None => {
                        program.set_bool("hasNormalTexture", false);
                        Vec::new()
                    }
                };
                let draw = RenderCommand::new(&*program, vec![command.mesh])
                    .with_textures(textures)
                    .with_properties(properties);
                renderer.add_command(&draw)?;
            }
        }
        renderer.render_finish()
    }
}

impl RenderPass for DebugPass {
    fn name(&self) -> &str {
        "Debug"
    }

    fn prepare_buffer(&mut self, gbuffer: &mut GeometryBuffer) -> BackendResult<()> {
        gbuffer.add_buffer(names::DEBUG, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::DEPTH, ColorFormat::DepthStencil)
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
        gbuffer.attach_color(&[names::DEBUG])?;
        gbuffer.attach_depth_stencil(names::DEPTH)?;

        self.render_normals(device, gbuffer, scene)?;
        if self.draw_light_casters {
            for light in &scene.lights {
                self.lines.draw_light(light);
            }
        }
        self.lines.render(device, gbuffer.render_target(), &scene.camera)?;

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
