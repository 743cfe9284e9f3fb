//! Dear ImGui overlay pass
//!
//! Runs one ImGui frame per render and rasterizes its draw lists into the
//! `imgui` slot. Input is fed by the application through the shared
//! [`UiHandle`]; widgets are boxed [`Widget`] values owned by the pass.
//!
//! Only the font atlas texture is bound, every draw list samples it.
//! Clip rectangles are ignored.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use imgui::{DrawCmd, DrawCmdParams, DrawData, DrawVert};
use log::{debug, trace};

use crate::foundation::math::{Mat4, Vec2i};
use crate::render::api::uniforms;
use crate::render::api::{
    ColorFormat, RenderCommand, RenderDevice, RenderOptions, RenderProperties, ShaderProgram, ShaderSource,
    TextureAttributes, TextureBuffer,
};
use crate::render::deferred::geometry_buffer::{names, GeometryBuffer};
use crate::render::deferred::render_pass::RenderPass;
use crate::render::deferred::render_scene::RenderScene;
use crate::render::primitives::{ColorRGBA, Image, ImageRGBA, Mesh, Vertex};
use crate::render::{BackendResult, RenderError};

const WRITES: [&str; 1] = [names::IMGUI];

/// ImGui context plus its baked font atlas
pub struct UiContext {
    context: imgui::Context,
    font_atlas: ImageRGBA,
}

/// Context shared between the application (input) and the pass (drawing)
pub type UiHandle = Rc<RefCell<UiContext>>;

impl UiContext {
    /// Fresh context without an ini file, with the default font baked
    pub fn new() -> BackendResult<Self> {
        let mut context = imgui::Context::create();
        context.set_ini_filename(None);

        let fonts = context.fonts();
        let texture = fonts.build_rgba32_texture();
        let pixels = texture
            .data
            .chunks_exact(4)
            .map(|texel| ColorRGBA::new(texel[0], texel[1], texel[2], texel[3]))
            .collect();
        let font_atlas = Image::from_pixels(texture.width, texture.height, pixels)
            .ok_or_else(|| RenderError::ResourceCreationFailed("ImGui font atlas has an invalid size".to_string()))?;
        fonts.tex_id = imgui::TextureId::new(0);
        debug!("Baked ImGui font atlas {}x{}", font_atlas.width(), font_atlas.height());

        Ok(Self { context, font_atlas })
    }

    /// Wrap into a shared handle
    pub fn into_handle(self) -> UiHandle {
        Rc::new(RefCell::new(self))
    }

    /// The ImGui context, for feeding input
    pub fn context_mut(&mut self) -> &mut imgui::Context {
        &mut self.context
    }

    /// RGBA image of the font atlas
    pub const fn font_atlas(&self) -> &ImageRGBA {
        &self.font_atlas
    }
}

/// Something drawn into the ImGui frame every render
pub trait Widget {
    /// Emit the widget's ImGui calls
    fn draw(&mut self, ui: &imgui::Ui, scene: &RenderScene<'_>);
}

/// Rasterizes ImGui draw lists
pub struct ImGuiPass {
    ui: UiHandle,
    widgets: Vec<Box<dyn Widget>>,
    program: Box<dyn ShaderProgram>,
    font: Box<dyn TextureBuffer>,
}

impl ImGuiPass {
    /// Link the ui program and upload the font atlas of `ui`
    pub fn new(device: &mut dyn RenderDevice, ui: UiHandle) -> BackendResult<Self> {
        let allocator = device.allocator();
        let program =
            allocator.create_shader_program(&ShaderSource::vertex("ui"), &ShaderSource::fragment("ui"), None)?;

        let font = {
            let context = ui
                .try_borrow()
                .map_err(|_| RenderError::ResourceCreationFailed("ImGui context is borrowed".to_string()))?;
            let atlas = context.font_atlas();
            let size = Vec2i::new(atlas.width() as i32, atlas.height() as i32);
            let mut font = allocator.create_texture_buffer(TextureAttributes::new(size, ColorFormat::Rgba))?;
            font.upload_rgba(atlas)?;
            font
        };

        Ok(Self {
            ui,
            widgets: Vec::new(),
            program,
            font,
        })
    }

    /// Add a widget drawn every frame after the existing ones
    pub fn add_widget(&mut self, widget: Box<dyn Widget>) {
        self.widgets.push(widget);
    }

    /// Remove every widget
    pub fn clear_widgets(&mut self) {
        self.widgets.clear();
    }

    /// Shared context
    pub fn ui(&self) -> &UiHandle {
        &self.ui
    }
}

/// One mesh per draw list plus the projection of the display rectangle
fn draw_data_meshes(draw_data: &DrawData) -> (Vec<Mesh>, Mat4) {
    let [left, top] = draw_data.display_pos;
    let [width, height] = draw_data.display_size;
    let projection = Mat4::new_orthographic(left, left + width, top + height, top, -1.0, 1.0);

    let meshes = draw_data
        .draw_lists()
        .filter_map(|list| {
            let vertices: Vec<Vertex> = list.vtx_buffer().iter().map(ui_vertex).collect();
            let source = list.idx_buffer();
            let mut indices = Vec::with_capacity(source.len());
            for command in list.commands() {
                if let DrawCmd::Elements {
                    count,
                    cmd_params: DrawCmdParams { vtx_offset, idx_offset, .. },
                } = command
                {
                    let range = idx_offset..(idx_offset + count).min(source.len());
                    indices.extend(source[range].iter().map(|index| u32::from(*index) + vtx_offset as u32));
                }
            }
            (!indices.is_empty()).then(|| Mesh::new(vertices, indices))
        })
        .collect();
    (meshes, projection)
}

/// Vertex color travels in the normal (rgb) and the first tangent component (alpha)
fn ui_vertex(vertex: &DrawVert) -> Vertex {
    let [r, g, b, a] = vertex.col.map(|channel| f32::from(channel) / 255.0);
    let mut out = Vertex::new([vertex.pos[0], vertex.pos[1], 0.0], [r, g, b], vertex.uv);
    out.tangent[0] = a;
    out
}

impl RenderPass for ImGuiPass {
    fn name(&self) -> &str {
        "ImGui"
    }

    fn prepare_buffer(&mut self, gbuffer: &mut GeometryBuffer) -> BackendResult<()> {
        gbuffer.add_buffer(names::IMGUI, ColorFormat::Rgba)
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
        let size = gbuffer.size();
        let (meshes, projection) = {
            let mut handle = self
                .ui
                .try_borrow_mut()
                .map_err(|_| RenderError::RenderingFailed("ImGui context is borrowed".to_string()))?;
            let context = handle.context_mut();
            context.io_mut().display_size = [size.x as f32, size.y as f32];
            let frame = context.new_frame();
            for widget in &mut self.widgets {
                widget.draw(frame, scene);
            }
            draw_data_meshes(context.render())
        };
        trace!("ImGui frame with {} draw lists", meshes.len());

        let allocator = device.allocator();
        let buffers = meshes
            .iter()
            .map(|mesh| allocator.create_mesh_buffer(mesh))
            .collect::<BackendResult<Vec<_>>>()?;

        gbuffer.detach_depth_stencil();
        gbuffer.attach_color(&WRITES)?;

        self.program.set_mat4(uniforms::PROJECTION, projection);
        self.program.set_texture("texture", 0);
        let properties = RenderProperties {
            enable_blending: true,
            ..RenderProperties::screen()
        };
        let command = RenderCommand::new(self.program.as_ref(), buffers.iter().map(|buffer| buffer.as_ref()).collect())
            .with_textures(vec![self.font.as_ref()])
            .with_properties(properties);

        let renderer = device.renderer();
        renderer.render_begin(gbuffer.render_target(), &RenderOptions::new(size))?;
        if !buffers.is_empty() {
            renderer.add_command(&command)?;
        }
        renderer.render_finish()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
