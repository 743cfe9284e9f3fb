//! Geometry pass
//!
//! Draws the skybox into its own slot, then rasterizes every deferred
//! command into the material slots: world position, normal, the five
//! material channels and an object id mask. `depth` holds the scene depth
//! afterwards.

use std::any::Any;

use log::trace;

use crate::core::config::RendererConfig;
use crate::foundation::math::{Mat4, Vec2i, Vec4};
use crate::render::api::uniforms;
use crate::render::api::{
    upload_cube_color, ColorFormat, MeshBuffer, RenderCommand, RenderDevice, RenderOptions,
    RenderProperties, ShaderProgram, ShaderSource, TextureAttributes, TextureBuffer, TextureType,
};
use crate::render::deferred::geometry_buffer::{names, GeometryBuffer};
use crate::render::deferred::render_pass::RenderPass;
use crate::render::deferred::render_scene::{DeferredCommand, RenderScene, SceneMaterial};
use crate::render::primitives::{ColorRGBA, Image, Mesh};
use crate::render::{BackendResult, RenderError};

const OUTPUTS: [&str; 8] = [
    names::POSITION,
    names::NORMAL,
    names::DIFFUSE,
    names::AMBIENT,
    names::SPECULAR,
    names::SHININESS,
    names::EMISSIVE,
    names::ID,
];

const WRITES: [&str; 10] = [
    names::POSITION,
    names::NORMAL,
    names::DIFFUSE,
    names::AMBIENT,
    names::SPECULAR,
    names::SHININESS,
    names::EMISSIVE,
    names::ID,
    names::SKYBOX,
    names::DEPTH,
];

/// Sampler names of the material channels, in texture unit order
const CHANNELS: [(&str, &str); 5] = [
    ("diffuse", "diffuseColor"),
    ("ambient", "ambientColor"),
    ("specular", "specularColor"),
    ("shininess", "shininessValue"),
    ("emissive", "emissiveColor"),
];

const NORMAL_UNIT: usize = CHANNELS.len();

/// Fills the geometry buffer from the deferred commands
pub struct GeometryPass {
    skybox_program: Box<dyn ShaderProgram>,
    program: Box<dyn ShaderProgram>,
    normal_map_program: Box<dyn ShaderProgram>,
    cube: Box<dyn MeshBuffer>,
    default_skybox: Box<dyn TextureBuffer>,
    default_texture: Box<dyn TextureBuffer>,
}

impl GeometryPass {
    /// Link the programs and create the fallback textures
    pub fn new(device: &mut dyn RenderDevice, config: &RendererConfig) -> BackendResult<Self> {
        let allocator = device.allocator();
        let skybox_program = allocator.create_shader_program(
            &ShaderSource::vertex("skybox"),
            &ShaderSource::fragment("skybox"),
            None,
        )?;
        let program = allocator.create_shader_program(
            &ShaderSource::vertex("mesh"),
            &ShaderSource::fragment("geometry"),
            None,
        )?;
        let normal_map_program = allocator.create_shader_program(
            &ShaderSource::vertex("mesh"),
            &ShaderSource::fragment("geometry_normal_map"),
            None,
        )?;
        let cube = allocator.create_mesh_buffer(&Mesh::cube())?;

        let unit = Vec2i::new(1, 1);
        let mut default_skybox =
            allocator.create_texture_buffer(TextureAttributes::cube_map(unit, ColorFormat::Rgba))?;
        upload_cube_color(default_skybox.as_mut(), config.skybox_color)?;
        let mut default_texture = allocator.create_texture_buffer(TextureAttributes::new(unit, ColorFormat::Rgba))?;
        default_texture.upload_rgba(&Image::solid(1, 1, ColorRGBA::TRANSPARENT))?;

        Ok(Self {
            skybox_program,
            program,
            normal_map_program,
            cube,
            default_skybox,
            default_texture,
        })
    }

    /// Color of the skybox drawn when the scene has none
    pub fn set_skybox_color(&mut self, color: ColorRGBA) -> BackendResult<()> {
        upload_cube_color(self.default_skybox.as_mut(), color)
    }

    fn render_skybox(
        &mut self,
        device: &mut dyn RenderDevice,
        gbuffer: &mut GeometryBuffer,
        scene: &RenderScene<'_>,
    ) -> BackendResult<()> {
        let skybox = match scene.skybox {
            Some(skybox) if skybox.attributes().texture_type != TextureType::CubeMap => {
                return Err(RenderError::InvalidFormat("skybox texture is not a cube map".to_string()));
            }
            Some(skybox) => skybox,
            None => self.default_skybox.as_ref(),
        };

        gbuffer.detach_depth_stencil();
        gbuffer.attach_color(&[names::SKYBOX])?;

        let camera = &scene.camera;
        uniforms::upload_matrices(
            self.skybox_program.as_mut(),
            &Mat4::identity(),
            &camera.view(),
            &camera.projection(),
            &camera.position(),
        );
        self.skybox_program.set_texture("skybox", 0);

        let command = RenderCommand::new(self.skybox_program.as_ref(), vec![self.cube.as_ref()])
            .with_textures(vec![skybox])
            .with_properties(RenderProperties::screen());

        let renderer = device.renderer();
        renderer.render_begin(gbuffer.render_target(), &RenderOptions::new(gbuffer.size()))?;
        renderer.add_command(&command)?;
        renderer.render_finish()
    }

    fn render_deferred(
        &mut self,
        device: &mut dyn RenderDevice,
        gbuffer: &mut GeometryBuffer,
        scene: &RenderScene<'_>,
    ) -> BackendResult<()> {
        gbuffer.attach_color(&OUTPUTS)?;
        gbuffer.attach_depth_stencil(names::DEPTH)?;

        let camera = &scene.camera;
        let (view, projection, camera_position) = (camera.view(), camera.projection(), camera.position());

        let renderer = device.renderer();
        renderer.render_begin(gbuffer.render_target(), &RenderOptions::new(gbuffer.size()))?;
        for command in &scene.deferred {
            let program = if command.material.normal_texture.is_some() {
                self.normal_map_program.as_mut()
            } else {
                self.program.as_mut()
            };
            uniforms::upload_matrices(program, &command.transform.to_matrix(), &view, &projection, &camera_position);
            let textures = bind_material(program, &command.material, self.default_texture.as_ref());
            let draw = RenderCommand::new(&*program, vec![command.mesh]).with_textures(textures);
            renderer.add_command(&draw)?;
        }
        renderer.render_finish()?;

        gbuffer.detach_depth_stencil();
        Ok(())
    }
}

/// Bind every material channel to a texture unit and write the flat values
///
/// A channel with a texture samples it with a zero flat value; a channel
/// without one samples the transparent fallback and uses its flat value.
fn bind_material<'a>(
    program: &mut dyn ShaderProgram,
    material: &SceneMaterial<'a>,
    fallback: &'a dyn TextureBuffer,
) -> Vec<&'a dyn TextureBuffer> {
    let channels = [
        (material.diffuse_texture, material.diffuse.to_vec4()),
        (material.ambient_texture, material.ambient.to_vec4()),
        (material.specular_texture, material.specular.to_vec4()),
        (material.shininess_texture, Vec4::new(material.shininess, 0.0, 0.0, 0.0)),
        (material.emissive_texture, material.emissive.to_vec4()),
    ];

    let mut textures = Vec::with_capacity(CHANNELS.len() + 1);
    for (unit, ((sampler, flat_name), (texture, flat))) in CHANNELS.iter().zip(channels).enumerate() {
        program.set_texture(sampler, unit);
        let flat = if texture.is_some() { Vec4::zeros() } else { flat };
        if *flat_name == "shininessValue" {
            program.set_float(flat_name, flat.x);
        } else {
            program.set_vec4(flat_name, flat);
        }
        textures.push(texture.unwrap_or(fallback));
    }

    if let Some(normal) = material.normal_texture {
        program.set_texture("normal", NORMAL_UNIT);
        textures.push(normal);
    }
    textures
}

impl RenderPass for GeometryPass {
    fn name(&self) -> &str {
        "Geometry"
    }

    fn prepare_buffer(&mut self, gbuffer: &mut GeometryBuffer) -> BackendResult<()> {
        gbuffer.add_buffer(names::POSITION, ColorFormat::Rgba32F)?;
        gbuffer.add_buffer(names::NORMAL, ColorFormat::Rgba32F)?;
        gbuffer.add_buffer(names::DIFFUSE, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::AMBIENT, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::SPECULAR, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::SHININESS, ColorFormat::R32F)?;
        gbuffer.add_buffer(names::EMISSIVE, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::ID, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::SKYBOX, ColorFormat::Rgba)?;
        gbuffer.add_buffer(names::DEPTH, ColorFormat::DepthStencil)
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
        trace!("Geometry pass: {} deferred commands", scene.deferred.len());
        self.render_skybox(device, gbuffer, scene)?;
        self.render_deferred(device, gbuffer, scene)
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
    use crate::foundation::math::{Transform, Vec3};
    use crate::render::backends::software::SoftwareDevice;
    use crate::render::primitives::Camera;

    fn prepared(device: &mut SoftwareDevice, size: Vec2i) -> (GeometryPass, GeometryBuffer) {
        let config = RendererConfig::default().with_skybox_color(ColorRGBA::new(0, 0, 255, 255));
        let mut pass = GeometryPass::new(device, &config).unwrap();
        let mut gbuffer = GeometryBuffer::new(device.allocator(), size).unwrap();
        pass.prepare_buffer(&mut gbuffer).unwrap();
        gbuffer.allocate(device.allocator()).unwrap();
        (pass, gbuffer)
    }

    #[test]
    fn test_flat_cube_fills_material_slots() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(8, 8);
        let (mut pass, mut gbuffer) = prepared(&mut device, size);
        let cube = device.allocator().create_mesh_buffer(&Mesh::cube()).unwrap();

        let mut scene = RenderScene::new(Camera::perspective(Vec3::new(0.0, 0.0, 5.0)).with_aspect(1.0));
        scene.deferred.push(DeferredCommand::new(
            Transform::identity(),
            SceneMaterial::flat(ColorRGBA::new(255, 0, 0, 255)),
            cube.as_ref(),
        ));
        pass.render(&mut device, &mut gbuffer, &scene).unwrap();

        let diffuse = gbuffer.buffer(names::DIFFUSE).unwrap().download_rgba().unwrap();
        assert_eq!(diffuse.get(4, 4), Some(&ColorRGBA::new(255, 0, 0, 255)));
        assert_eq!(diffuse.get(0, 0), Some(&ColorRGBA::TRANSPARENT));

        let id = gbuffer.buffer(names::ID).unwrap().download_rgba().unwrap();
        assert_eq!(id.get(4, 4), Some(&ColorRGBA::new(255, 0, 0, 255)));
        assert_eq!(id.get(0, 0), Some(&ColorRGBA::TRANSPARENT));

        let depth = gbuffer.buffer(names::DEPTH).unwrap().download_float().unwrap();
        assert!(*depth.get(4, 4).unwrap() < 1.0);
        assert!((*depth.get(0, 0).unwrap() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_instanced_cube_draws_every_instance() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(32, 32);
        let (mut pass, mut gbuffer) = prepared(&mut device, size);
        let instances = [
            Transform::from_position(Vec3::new(-3.0, 0.0, 0.0)).to_matrix(),
            Transform::from_position(Vec3::new(3.0, 0.0, 0.0)).to_matrix(),
        ];
        let cubes = device
            .allocator()
            .create_instanced_mesh_buffer(&Mesh::cube(), &instances)
            .unwrap();

        let mut scene = RenderScene::new(Camera::perspective(Vec3::new(0.0, 0.0, 10.0)).with_aspect(1.0));
        scene.deferred.push(DeferredCommand::new(
            Transform::identity(),
            SceneMaterial::flat(ColorRGBA::new(0, 255, 0, 255)),
            cubes.as_ref(),
        ));
        pass.render(&mut device, &mut gbuffer, &scene).unwrap();

        let green = ColorRGBA::new(0, 255, 0, 255);
        let diffuse = gbuffer.buffer(names::DIFFUSE).unwrap().download_rgba().unwrap();
        assert_eq!(diffuse.get(6, 16), Some(&green));
        assert_eq!(diffuse.get(25, 16), Some(&green));
        assert_eq!(diffuse.get(16, 16), Some(&ColorRGBA::TRANSPARENT));
    }

    #[test]
    fn test_empty_instanced_mesh_draws_nothing() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(8, 8);
        let (mut pass, mut gbuffer) = prepared(&mut device, size);
        let cubes = device.allocator().create_instanced_mesh_buffer(&Mesh::cube(), &[]).unwrap();

        let mut scene = RenderScene::new(Camera::perspective(Vec3::new(0.0, 0.0, 5.0)).with_aspect(1.0));
        scene.deferred.push(DeferredCommand::new(
            Transform::identity(),
            SceneMaterial::flat(ColorRGBA::new(255, 0, 0, 255)),
            cubes.as_ref(),
        ));
        pass.render(&mut device, &mut gbuffer, &scene).unwrap();

        let diffuse = gbuffer.buffer(names::DIFFUSE).unwrap().download_rgba().unwrap();
        assert!(diffuse.pixels().iter().all(|p| *p == ColorRGBA::TRANSPARENT));
        let depth = gbuffer.buffer(names::DEPTH).unwrap().download_float().unwrap();
        assert!(depth.pixels().iter().all(|d| (*d - 1.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_default_skybox_uses_configured_color() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(4, 4);
        let (mut pass, mut gbuffer) = prepared(&mut device, size);

        let scene = RenderScene::new(Camera::perspective(Vec3::zeros()).with_aspect(1.0));
        pass.render(&mut device, &mut gbuffer, &scene).unwrap();

        let skybox = gbuffer.buffer(names::SKYBOX).unwrap().download_rgba().unwrap();
        assert!(skybox.pixels().iter().all(|p| *p == ColorRGBA::new(0, 0, 255, 255)));
    }

    #[test]
    fn test_flat_skybox_texture_is_rejected() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(4, 4);
        let (mut pass, mut gbuffer) = prepared(&mut device, size);
        let flat = device
            .allocator()
            .create_texture_buffer(TextureAttributes::new(Vec2i::new(1, 1), ColorFormat::Rgba))
            .unwrap();

        let scene = RenderScene::new(Camera::default()).with_skybox(flat.as_ref());
        let result = pass.render(&mut device, &mut gbuffer, &scene);
        assert!(matches!(result, Err(RenderError::InvalidFormat(_))));
    }
}
