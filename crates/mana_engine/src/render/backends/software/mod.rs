//! # Software Backend
//!
//! CPU implementation of the render device. Every pass and the compositor
//! run unchanged on it, which makes the whole pipeline testable without a
//! GPU.
//!
//! ## Organization
//!
//! - **texture**: texel storage, format quantization and sampling
//! - **target**: framebuffers and blits
//! - **mesh**: triangle lists and instance transforms
//! - **shader**: linked programs and their uniform tables
//! - **programs**: the built-in stage catalogue
//! - **raster**: clipping, triangle setup, depth test and blending
//!
//! Resources are shared with the targets they are attached to through
//! `Rc<RefCell<_>>`. Sampling a texture that is also bound for writing in the
//! same draw is reported as `RenderingFailed` instead of reading stale data.

pub mod mesh;
pub mod programs;
pub mod raster;
pub mod shader;
pub mod target;
pub mod texture;

pub use mesh::SoftwareMeshBuffer;
pub use shader::SoftwareShaderProgram;
pub use target::SoftwareRenderTarget;
pub use texture::SoftwareTexture;

use std::cell::{Cell, Ref};
use std::rc::Rc;

use log::{debug, trace};

use self::programs::{Assembled, FragmentKernel, GeometryKernel, Samplers, VertexKernel};
use self::raster::{ColorSink, DepthSink, Frame, Rasterizer, Viewport};
use self::target::Attachment;
use self::texture::{software_texture, TextureData};
use crate::foundation::math::{Mat4, Vec2i};
use crate::render::api::{
    ClearFlags, RenderAllocator, RenderCommand, RenderDevice, RenderOptions, RenderTarget, Renderer,
    ShaderProgram, ShaderSource, TextureAttributes, TextureBuffer, MeshBuffer,
};
use crate::render::primitives::Mesh;
use crate::render::{BackendResult, RenderError};

/// Target bound between `render_begin` and `render_finish`
struct BoundTarget {
    size: Vec2i,
    viewport: Viewport,
    colors: Vec<(usize, Attachment)>,
    depth: Option<Attachment>,
}

/// Command submission on the CPU
#[derive(Default)]
pub struct SoftwareRenderer {
    bound: Option<BoundTarget>,
}

impl SoftwareRenderer {
    /// Renderer with nothing bound
    pub fn new() -> Self {
        Self::default()
    }

    fn clear(target: &SoftwareRenderTarget, options: &RenderOptions) -> BackendResult<()> {
        let busy = |_| RenderError::RenderingFailed("cleared attachment is borrowed".to_string());
        if options.clear.contains(ClearFlags::COLOR) {
            let color = options.clear_color.to_vec4();
            for (_, attachment) in target.drawn_colors() {
                attachment.data.try_borrow_mut().map_err(busy)?.clear(attachment.face, &color);
            }
        }
        if options.clear.contains(ClearFlags::DEPTH) {
            if let Some(depth) = &target.depth {
                depth.data.try_borrow_mut().map_err(busy)?.clear_depth(depth.face, options.clear_depth);
            }
        }
        if options.clear.contains(ClearFlags::STENCIL) {
            if let Some(stencil) = &target.stencil {
                stencil
                    .data
                    .try_borrow_mut()
                    .map_err(busy)?
                    .clear_stencil(stencil.face, options.clear_stencil);
            }
        }
        Ok(())
    }

    /// Borrow every attachment of the bound target for writing
    fn frame(bound: &BoundTarget) -> BackendResult<Frame<'_>> {
        let busy = || RenderError::RenderingFailed("attachment is bound twice or sampled by the draw".to_string());
        let mut colors = Vec::with_capacity(bound.colors.len());
        for (output, attachment) in &bound.colors {
            colors.push(ColorSink {
                output: *output,
                face: attachment.face,
                data: attachment.data.try_borrow_mut().map_err(|_| busy())?,
            });
        }
        let depth = match &bound.depth {
            Some(attachment) => Some(DepthSink {
                face: attachment.face,
                data: attachment.data.try_borrow_mut().map_err(|_| busy())?,
            }),
            None => None,
        };
        Ok(Frame {
            size: bound.size,
            viewport: bound.viewport,
            colors,
            depth,
        })
    }
}

fn check_attachment_size(attachment: &Attachment, size: Vec2i) -> BackendResult<()> {
    let attached = attachment
        .data
        .try_borrow()
        .map_err(|_| RenderError::RenderingFailed("attachment is borrowed".to_string()))?
        .size();
    if attached != size {
        return Err(RenderError::IncompleteTarget(format!(
            "attachment resized to {}x{}, target is {}x{}",
            attached.x, attached.y, size.x, size.y
        )));
    }
    Ok(())
}

impl Renderer for SoftwareRenderer {
    fn render_begin(&mut self, target: &dyn RenderTarget, options: &RenderOptions) -> BackendResult<()> {
        let target = target
            .as_any()
            .downcast_ref::<SoftwareRenderTarget>()
            .ok_or_else(|| RenderError::ForeignResource("render target".to_string()))?;
        let size = target.size();

        let colors: Vec<(usize, Attachment)> = target
            .drawn_colors()
            .map(|(index, attachment)| (index, attachment.clone()))
            .collect();
        for (_, attachment) in &colors {
            check_attachment_size(attachment, size)?;
        }
        if let Some(depth) = &target.depth {
            check_attachment_size(depth, size)?;
        }

        Self::clear(target, options)?;
        trace!(
            "Render begin {}x{} with {} color attachments{}",
            size.x,
            size.y,
            colors.len(),
            if target.depth.is_some() { " and depth" } else { "" }
        );

        self.bound = Some(BoundTarget {
            size,
            viewport: Viewport {
                offset: options.viewport_offset,
                size: options.viewport_size,
            },
            colors,
            depth: target.depth.clone(),
        });
        Ok(())
    }

    fn add_command(&mut self, command: &RenderCommand<'_>) -> BackendResult<()> {
        let bound = self
            .bound
            .as_ref()
            .ok_or_else(|| RenderError::RenderingFailed("add_command outside render_begin".to_string()))?;

        let program = command
            .shader
            .as_any()
            .downcast_ref::<SoftwareShaderProgram>()
            .ok_or_else(|| RenderError::ForeignResource("shader program".to_string()))?;
        let meshes = command
            .meshes
            .iter()
            .map(|mesh| {
                mesh.as_any()
                    .downcast_ref::<SoftwareMeshBuffer>()
                    .ok_or_else(|| RenderError::ForeignResource("mesh buffer".to_string()))
            })
            .collect::<BackendResult<Vec<_>>>()?;
        let textures = command
            .textures
            .iter()
            .map(|texture| software_texture(*texture))
            .collect::<BackendResult<Vec<_>>>()?;

        let vertex = VertexKernel::prepare(program);
        let geometry = program
            .geometry
            .map(|stage| GeometryKernel::prepare(stage, program, textures.len()))
            .transpose()?;
        let fragment = FragmentKernel::prepare(program, textures.len())?;

        let mut frame = Self::frame(bound)?;
        let sampled = textures
            .iter()
            .map(|texture| texture.data.try_borrow())
            .collect::<Result<Vec<Ref<'_, TextureData>>, _>>()
            .map_err(|_| RenderError::RenderingFailed("draw samples a texture it writes to".to_string()))?;
        let samplers = Samplers::new(sampled);

        let mut rasterizer = Rasterizer {
            frame: &mut frame,
            properties: command.properties,
            fragment: &fragment,
            samplers: &samplers,
        };
        let mut assembled = Vec::new();
        for mesh in meshes {
            for instance in mesh.instance_transforms() {
                let kernel = vertex.for_instance(&instance);
                let transformed: Vec<_> = mesh.vertices.iter().map(|v| kernel.run(v)).collect();
                for [a, b, c] in &mesh.triangles {
                    let triangle = [transformed[*a], transformed[*b], transformed[*c]];
                    match &geometry {
                        Some(geometry) => {
                            assembled.clear();
                            geometry.run(&triangle, &samplers, &mut assembled);
                            for primitive in &assembled {
                                match primitive {
                                    Assembled::Triangle(triangle) => rasterizer.triangle(triangle),
                                    Assembled::Line(line) => rasterizer.line(line),
                                }
                            }
                        }
                        None => rasterizer.triangle(&triangle),
                    }
                }
            }
        }
        Ok(())
    }

    fn render_finish(&mut self) -> BackendResult<()> {
        self.bound
            .take()
            .map(|_| ())
            .ok_or_else(|| RenderError::RenderingFailed("render_finish without render_begin".to_string()))
    }
}

/// Resource factory on the CPU
pub struct SoftwareAllocator {
    next_program: u64,
    active_program: Rc<Cell<u64>>,
}

impl Default for SoftwareAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareAllocator {
    /// Allocator with no programs linked
    pub fn new() -> Self {
        Self {
            next_program: 1,
            active_program: Rc::new(Cell::new(0)),
        }
    }
}

fn check_size(size: Vec2i, what: &str) -> BackendResult<()> {
    if size.x < 0 || size.y < 0 {
        return Err(RenderError::ResourceCreationFailed(format!(
            "{what} size {}x{} is negative",
            size.x, size.y
        )));
    }
    Ok(())
}

impl RenderAllocator for SoftwareAllocator {
    fn create_render_target(&mut self, size: Vec2i, samples: u32) -> BackendResult<Box<dyn RenderTarget>> {
        check_size(size, "render target")?;
        if samples > 1 {
            debug!("Software render targets are single sampled, ignoring {samples} samples");
        }
        Ok(Box::new(SoftwareRenderTarget::new(size)))
    }

    fn create_texture_buffer(&mut self, attributes: TextureAttributes) -> BackendResult<Box<dyn TextureBuffer>> {
        check_size(attributes.size, "texture")?;
        trace!(
            "Creating {:?} {:?} texture {}x{}",
            attributes.texture_type,
            attributes.format,
            attributes.size.x,
            attributes.size.y
        );
        Ok(Box::new(SoftwareTexture::new(attributes)))
    }

    fn create_mesh_buffer(&mut self, mesh: &Mesh) -> BackendResult<Box<dyn MeshBuffer>> {
        Ok(Box::new(SoftwareMeshBuffer::new(mesh)?))
    }

    fn create_instanced_mesh_buffer(
        &mut self,
        mesh: &Mesh,
        instances: &[Mat4],
    ) -> BackendResult<Box<dyn MeshBuffer>> {
        Ok(Box::new(SoftwareMeshBuffer::instanced(mesh, instances)?))
    }

    fn create_shader_program(
        &mut self,
        vertex: &ShaderSource,
        fragment: &ShaderSource,
        geometry: Option<&ShaderSource>,
    ) -> BackendResult<Box<dyn ShaderProgram>> {
        let id = self.next_program;
        self.next_program += 1;
        let program = SoftwareShaderProgram::link(id, Rc::clone(&self.active_program), vertex, fragment, geometry)?;
        Ok(Box::new(program))
    }
}

/// The CPU render device
#[derive(Default)]
pub struct SoftwareDevice {
    renderer: SoftwareRenderer,
    allocator: SoftwareAllocator,
}

impl SoftwareDevice {
    /// Device with an idle renderer and an empty allocator
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderDevice for SoftwareDevice {
    fn renderer(&mut self) -> &mut dyn Renderer {
        &mut self.renderer
    }

    fn allocator(&mut self) -> &mut dyn RenderAllocator {
        &mut self.allocator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{RenderProperties, TextureFiltering, ColorFormat};
    use crate::render::primitives::{ColorRGBA, Vertex};

    fn color_target(device: &mut SoftwareDevice, size: i32) -> (Box<dyn RenderTarget>, Box<dyn TextureBuffer>) {
        let size = Vec2i::new(size, size);
        let allocator = device.allocator();
        let mut target = allocator.create_render_target(size, 1).unwrap();
        let texture = allocator
            .create_texture_buffer(TextureAttributes::new(size, ColorFormat::Rgba).with_filter(TextureFiltering::Nearest))
            .unwrap();
        target.attach_color(0, texture.as_ref()).unwrap();
        (target, texture)
    }

    fn unlit(device: &mut SoftwareDevice, color: ColorRGBA) -> Box<dyn ShaderProgram> {
        let mut program = device
            .allocator()
            .create_shader_program(&ShaderSource::vertex("screen"), &ShaderSource::fragment("unlit"), None)
            .unwrap();
        program.set_vec4("color", color.to_vec4());
        program
    }

    struct ForeignMesh;

    impl MeshBuffer for ForeignMesh {
        fn primitive(&self) -> crate::render::primitives::Primitive {
            crate::render::primitives::Primitive::Tri
        }

        fn element_count(&self) -> usize {
            0
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_screen_quad_fills_target() {
        let mut device = SoftwareDevice::new();
        let (target, texture) = color_target(&mut device, 4);
        let quad = device.allocator().create_mesh_buffer(&Mesh::screen_quad()).unwrap();
        let program = unlit(&mut device, ColorRGBA::new(255, 0, 0, 255));

        let renderer = device.renderer();
        renderer.render_begin(target.as_ref(), &RenderOptions::new(target.size())).unwrap();
        let command = RenderCommand::new(program.as_ref(), vec![quad.as_ref()])
            .with_properties(RenderProperties::screen());
        renderer.add_command(&command).unwrap();
        renderer.render_finish().unwrap();

        let image = texture.download_rgba().unwrap();
        assert!(image.pixels().iter().all(|p| *p == ColorRGBA::new(255, 0, 0, 255)));
    }

    #[test]
    fn test_blending_on_shared_diagonal_is_not_doubled() {
        let mut device = SoftwareDevice::new();
        let (target, texture) = color_target(&mut device, 4);
        let quad = device.allocator().create_mesh_buffer(&Mesh::screen_quad()).unwrap();
        let program = unlit(&mut device, ColorRGBA::new(64, 64, 64, 255));

        let properties = RenderProperties {
            enable_blending: true,
            blend_source_mode: crate::render::api::BlendMode::One,
            blend_destination_mode: crate::render::api::BlendMode::One,
            ..RenderProperties::screen()
        };
        let renderer = device.renderer();
        renderer.render_begin(target.as_ref(), &RenderOptions::new(target.size())).unwrap();
        renderer
            .add_command(&RenderCommand::new(program.as_ref(), vec![quad.as_ref()]).with_properties(properties))
            .unwrap();
        renderer.render_finish().unwrap();

        let image = texture.download_rgba().unwrap();
        assert!(image.pixels().iter().all(|p| p.r == 64));
    }

    #[test]
    fn test_back_faces_are_culled() {
        let mut device = SoftwareDevice::new();
        let (target, texture) = color_target(&mut device, 4);
        let clockwise = Mesh::new(
            vec![
                Vertex::new([-1.0, -1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
                Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]),
                Vertex::new([1.0, -1.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
            ],
            vec![0, 1, 2],
        );
        let mesh = device.allocator().create_mesh_buffer(&clockwise).unwrap();
        let program = unlit(&mut device, ColorRGBA::WHITE);

        let properties = RenderProperties {
            enable_depth_test: false,
            ..RenderProperties::default()
        };
        let renderer = device.renderer();
        renderer.render_begin(target.as_ref(), &RenderOptions::new(target.size())).unwrap();
        renderer
            .add_command(&RenderCommand::new(program.as_ref(), vec![mesh.as_ref()]).with_properties(properties))
            .unwrap();
        renderer.render_finish().unwrap();

        let image = texture.download_rgba().unwrap();
        assert!(image.pixels().iter().all(|p| *p == ColorRGBA::TRANSPARENT));
    }

    #[test]
    fn test_add_command_requires_begin() {
        let mut device = SoftwareDevice::new();
        let quad = device.allocator().create_mesh_buffer(&Mesh::screen_quad()).unwrap();
        let program = unlit(&mut device, ColorRGBA::WHITE);
        let result = device
            .renderer()
            .add_command(&RenderCommand::new(program.as_ref(), vec![quad.as_ref()]));
        assert!(matches!(result, Err(RenderError::RenderingFailed(_))));
    }

    #[test]
    fn test_foreign_mesh_is_rejected() {
        let mut device = SoftwareDevice::new();
        let (target, _texture) = color_target(&mut device, 2);
        let program = unlit(&mut device, ColorRGBA::WHITE);
        let foreign = ForeignMesh;

        let renderer = device.renderer();
        renderer.render_begin(target.as_ref(), &RenderOptions::new(target.size())).unwrap();
        let result = renderer.add_command(&RenderCommand::new(program.as_ref(), vec![&foreign as &dyn MeshBuffer]));
        assert!(matches!(result, Err(RenderError::ForeignResource(_))));
    }

    #[test]
    fn test_sampling_a_bound_attachment_fails() {
        let mut device = SoftwareDevice::new();
        let (target, texture) = color_target(&mut device, 2);
        let quad = device.allocator().create_mesh_buffer(&Mesh::screen_quad()).unwrap();
        let mut program = device
            .allocator()
            .create_shader_program(&ShaderSource::vertex("screen"), &ShaderSource::fragment("ui"), None)
            .unwrap();
        program.set_texture("texture", 0);

        let renderer = device.renderer();
        renderer.render_begin(target.as_ref(), &RenderOptions::new(target.size())).unwrap();
        let command = RenderCommand::new(program.as_ref(), vec![quad.as_ref()])
            .with_textures(vec![texture.as_ref()])
            .with_properties(RenderProperties::screen());
        assert!(matches!(renderer.add_command(&command), Err(RenderError::RenderingFailed(_))));
    }

    #[test]
    fn test_render_begin_clears_depth() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(2, 2);
        let allocator = device.allocator();
        let mut target = allocator.create_render_target(size, 1).unwrap();
        let depth = allocator
            .create_texture_buffer(TextureAttributes::new(size, ColorFormat::DepthStencil))
            .unwrap();
        target.attach_depth_stencil(depth.as_ref()).unwrap();

        let mut options = RenderOptions::new(size);
        options.clear_depth = 0.25;
        device.renderer().render_begin(target.as_ref(), &options).unwrap();
        device.renderer().render_finish().unwrap();

        let image = depth.download_float().unwrap();
        assert!(image.pixels().iter().all(|d| (*d - 0.25).abs() < 1e-6));
    }
}
