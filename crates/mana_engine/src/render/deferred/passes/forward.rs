//! Forward pass
//!
//! Draws the forward commands with their own programs into `forward` and
//! `forward_depth`, plus the outline hulls of outlined deferred objects. The
//! composite pass later keeps whichever of the deferred and forward results
//! is nearer per pixel.

use std::any::Any;

use log::trace;

use crate::core::config::RendererConfig;
use crate::foundation::math::Mat4;
use crate::render::api::uniforms;
use crate::render::api::{
    ColorFormat, FaceCullingMode, RenderCommand, RenderDevice, RenderOptions, RenderProperties, Renderer,
    ShaderProgram, ShaderSource,
};
use crate::render::deferred::geometry_buffer::{names, GeometryBuffer};
use crate::render::deferred::render_pass::RenderPass;
use crate::render::deferred::render_scene::RenderScene;
use crate::render::{BackendResult, RenderError};

const WRITES: [&str; 2] = [names::FORWARD, names::FORWARD_DEPTH];

/// Forward shaded objects and outlines
pub struct ForwardPass {
    outline_program: Box<dyn ShaderProgram>,
    max_lights: usize,
}

impl ForwardPass {
    /// Link the outline program
    pub fn new(device: &mut dyn RenderDevice, config: &RendererConfig) -> BackendResult<Self> {
        let outline_program = device.allocator().create_shader_program(
            &ShaderSource::vertex("mesh"),
            &ShaderSource::fragment("unlit"),
            None,
        )?;
        Ok(Self {
            outline_program,
            max_lights: config.max_lights,
        })
    }

    fn draw_forward(&self, renderer: &mut dyn Renderer, scene: &RenderScene<'_>) -> BackendResult<()> {
        let camera = &scene.camera;
        let (view, projection, camera_position) = (camera.view(), camera.projection(), camera.position());

        for command in &scene.forward {
            let mut shader = command
                .shader
                .try_borrow_mut()
                .map_err(|_| RenderError::RenderingFailed("forward shader is borrowed elsewhere".to_string()))?;
            let program: &mut dyn ShaderProgram = &mut **shader;
            uniforms::upload_matrices(program, &command.transform.to_matrix(), &view, &projection, &camera_position);
            uniforms::upload_lights(program, &scene.lights, &camera_position, self.max_lights);

            let draw = RenderCommand::new(&*program, command.meshes.clone())
                .with_textures(command.textures.clone())
                .with_properties(command.properties);
            renderer.add_command(&draw)?;
        }
        Ok(())
    }

    /// Inverted hull: the scaled mesh with its front faces culled
    fn draw_outlines(&mut self, renderer: &mut dyn Renderer, scene: &RenderScene<'_>) -> BackendResult<()> {
        let camera = &scene.camera;
        let properties = RenderProperties {
            face_culling_mode: FaceCullingMode::Front,
            ..RenderProperties::default()
        };

        for command in scene.deferred.iter().filter(|command| command.outline) {
            let model = command.transform.to_matrix() * Mat4::new_scaling(command.outline_scale);
            uniforms::upload_matrices(
                self.outline_program.as_mut(),
                &model,
                &camera.view(),
                &camera.projection(),
                &camera.position(),
            );
            self.outline_program.set_vec4("color", command.outline_color.to_vec4());

            let draw = RenderCommand::new(self.outline_program.as_ref(), vec![command.mesh]).with_properties(properties);
            renderer.add_command(&draw)?;
        }
        Ok(())
    }
}

impl RenderPass for ForwardPass {
    fn name(&self) -> &str {
        "Forward"
    }

    fn prepare_buffer(&mut self, gbuffer: &mut GeometryBuffer) -> BackendResult<()> {
        gbuffer.add_buffer(names::FORWARD, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::FORWARD_DEPTH, ColorFormat::DepthStencil)
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
        trace!("Forward pass: {} commands", scene.forward.len());
        gbuffer.attach_color(&[names::FORWARD])?;
        gbuffer.attach_depth_stencil(names::FORWARD_DEPTH)?;

        let renderer = device.renderer();
        renderer.render_begin(gbuffer.render_target(), &RenderOptions::new(gbuffer.size()))?;
        self.draw_forward(renderer, scene)?;
        self.draw_outlines(renderer, scene)?;
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

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::foundation::math::{Transform, Vec2i, Vec3, Vec4};
    use crate::render::backends::software::SoftwareDevice;
    use crate::render::deferred::render_scene::{DeferredCommand, ForwardCommand, SceneMaterial};
    use crate::render::primitives::{Camera, ColorRGBA, Light, Mesh};

    fn prepared(device: &mut SoftwareDevice) -> (ForwardPass, GeometryBuffer) {
        let mut pass = ForwardPass::new(device, &RendererConfig::default()).unwrap();
        let mut gbuffer = GeometryBuffer::new(device.allocator(), Vec2i::new(8, 8)).unwrap();
        pass.prepare_buffer(&mut gbuffer).unwrap();
        gbuffer.allocate(device.allocator()).unwrap();
        (pass, gbuffer)
    }

    fn camera() -> Camera {
        Camera::perspective(Vec3::new(0.0, 0.0, 5.0)).with_aspect(1.0)
    }

    #[test]
    fn test_forward_command_is_lit_with_scene_lights() {
        let mut device = SoftwareDevice::new();
        let (mut pass, mut gbuffer) = prepared(&mut device);
        let cube = device.allocator().create_mesh_buffer(&Mesh::cube()).unwrap();

        let shader = RefCell::new(
            device
                .allocator()
                .create_shader_program(&ShaderSource::vertex("mesh"), &ShaderSource::fragment("forward"), None)
                .unwrap(),
        );
        {
            let mut program = shader.borrow_mut();
            program.set_vec4("diffuseColor", Vec4::new(1.0, 0.0, 0.0, 1.0));
            program.set_vec4("specularColor", Vec4::zeros());
            program.set_float("shininessValue", 1.0);
        }

        let mut scene = RenderScene::new(camera());
        scene.forward.push(ForwardCommand::new(Transform::identity(), &shader, vec![cube.as_ref()]));
        scene.lights.push(
            Light::directional(Vec3::new(0.0, 0.0, -1.0)).with_colors(Vec3::zeros(), Vec3::repeat(1.0), Vec3::zeros()),
        );
        pass.render(&mut device, &mut gbuffer, &scene).unwrap();

        let image = gbuffer.buffer(names::FORWARD).unwrap().download_rgba().unwrap();
        assert_eq!(image.get(4, 4), Some(&ColorRGBA::new(255, 0, 0, 255)));
        assert_eq!(image.get(0, 0), Some(&ColorRGBA::TRANSPARENT));
    }

    #[test]
    fn test_borrowed_shader_is_an_error() {
        let mut device = SoftwareDevice::new();
        let (mut pass, mut gbuffer) = prepared(&mut device);
        let cube = device.allocator().create_mesh_buffer(&Mesh::cube()).unwrap();
        let shader = RefCell::new(
            device
                .allocator()
                .create_shader_program(&ShaderSource::vertex("mesh"), &ShaderSource::fragment("unlit"), None)
                .unwrap(),
        );

        let mut scene = RenderScene::new(camera());
        scene.forward.push(ForwardCommand::new(Transform::identity(), &shader, vec![cube.as_ref()]));
        let _held = shader.borrow();
        let result = pass.render(&mut device, &mut gbuffer, &scene);
        assert!(matches!(result, Err(RenderError::RenderingFailed(_))));
    }

    #[test]
    fn test_outline_hull_shows_behind_object() {
        let mut device = SoftwareDevice::new();
        let (mut pass, mut gbuffer) = prepared(&mut device);
        let cube = device.allocator().create_mesh_buffer(&Mesh::cube()).unwrap();

        let mut scene = RenderScene::new(camera());
        let yellow = ColorRGBA::new(255, 255, 0, 255);
        scene.deferred.push(
            DeferredCommand::new(Transform::identity(), SceneMaterial::default(), cube.as_ref()).with_outline(yellow, 1.2),
        );
        pass.render(&mut device, &mut gbuffer, &scene).unwrap();

        let image = gbuffer.buffer(names::FORWARD).unwrap().download_rgba().unwrap();
        assert_eq!(image.get(4, 4), Some(&yellow));

        // Only the far side of the hull is drawn, behind the object itself
        let depth = gbuffer.buffer(names::FORWARD_DEPTH).unwrap().download_float().unwrap();
        let far_side = *depth.get(4, 4).unwrap();
        assert!(far_side < 1.0);
        assert!(far_side > projected_depth(6.0) - 1e-3);
    }

    /// Window depth of a point `distance` in front of the test camera
    fn projected_depth(distance: f32) -> f32 {
        let clip = camera().projection() * Vec4::new(0.0, 0.0, -distance, 1.0);
        (clip.z / clip.w).mul_add(0.5, 0.5)
    }
}
