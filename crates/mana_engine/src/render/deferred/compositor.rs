//! # Compositor
//!
//! Merges named geometry buffer slots into the screen target. Each [`Layer`]
//! is one screen quad draw: its color slots are summed, its optional depth
//! slot becomes the fragment depth, and the result is blended over what the
//! earlier layers left on screen.

use log::trace;

use super::geometry_buffer::GeometryBuffer;
use crate::render::api::uniforms::{self, MAX_LAYER_COLORS};
use crate::render::api::{
    BlendMode, ClearFlags, DepthTestMode, RenderAllocator, RenderCommand, RenderDevice, RenderOptions,
    RenderProperties, RenderTarget, ShaderProgram, ShaderSource,
};
use crate::render::primitives::ColorRGBA;
use crate::render::{BackendResult, RenderError};

/// Group of slots drawn to the screen in one step
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Display name
    pub name: String,
    /// Color slots, summed
    pub color: Vec<String>,
    /// Depth slot used as fragment depth; depth 1 when `None`
    pub depth: Option<String>,
    /// Test against the depth of earlier layers
    pub depth_test_mode: DepthTestMode,
    /// Blend factor of the layer color
    pub blend_source: BlendMode,
    /// Blend factor of the screen color
    pub blend_destination: BlendMode,
}

impl Layer {
    /// Alpha blended layer over `color`, depth tested with `Less`
    pub fn new(name: impl Into<String>, color: &[&str]) -> Self {
        Self {
            name: name.into(),
            color: color.iter().map(|name| (*name).to_string()).collect(),
            depth: None,
            depth_test_mode: DepthTestMode::Less,
            blend_source: BlendMode::SourceAlpha,
            blend_destination: BlendMode::OneMinusSourceAlpha,
        }
    }

    /// Use slot `depth` as the layer depth
    #[must_use]
    pub fn with_depth(mut self, depth: impl Into<String>) -> Self {
        self.depth = Some(depth.into());
        self
    }

    /// Replace the depth test
    #[must_use]
    pub const fn with_depth_test(mut self, mode: DepthTestMode) -> Self {
        self.depth_test_mode = mode;
        self
    }

    /// Replace the blend factors
    #[must_use]
    pub const fn with_blend(mut self, source: BlendMode, destination: BlendMode) -> Self {
        self.blend_source = source;
        self.blend_destination = destination;
        self
    }

    fn check(&self) -> BackendResult<()> {
        if self.color.len() > MAX_LAYER_COLORS {
            return Err(RenderError::TooManyLayerColors {
                layer: self.name.clone(),
                count: self.color.len(),
                max: MAX_LAYER_COLORS,
            });
        }
        Ok(())
    }
}

/// Draws layers onto the screen target
pub struct Compositor {
    clear_color: ColorRGBA,
    layers: Vec<Layer>,
    program: Box<dyn ShaderProgram>,
}

impl Compositor {
    /// Compositor drawing `layers` in order
    pub fn new(allocator: &mut dyn RenderAllocator, layers: Vec<Layer>) -> BackendResult<Self> {
        let program = allocator.create_shader_program(
            &ShaderSource::vertex("screen"),
            &ShaderSource::fragment("compositor"),
            None,
        )?;
        Ok(Self {
            clear_color: ColorRGBA::BLACK,
            layers,
            program,
        })
    }

    /// Layers in draw order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Replace the layers
    pub fn set_layers(&mut self, layers: Vec<Layer>) {
        self.layers = layers;
    }

    /// Color the screen is cleared with before the first layer
    pub const fn clear_color(&self) -> ColorRGBA {
        self.clear_color
    }

    /// Replace the clear color
    pub fn set_clear_color(&mut self, color: ColorRGBA) {
        self.clear_color = color;
    }

    /// Clear `screen` and draw every layer onto it
    pub fn present_layers(
        &mut self,
        device: &mut dyn RenderDevice,
        screen: &dyn RenderTarget,
        gbuffer: &GeometryBuffer,
    ) -> BackendResult<()> {
        for layer in &self.layers {
            layer.check()?;
        }

        let renderer = device.renderer();
        renderer.render_begin(screen, &RenderOptions::new(screen.size()).with_clear_color(self.clear_color))?;
        renderer.render_finish()?;

        for layer in &self.layers {
            Self::draw_layer(self.program.as_mut(), device, screen, gbuffer, layer)?;
        }
        Ok(())
    }

    fn draw_layer(
        program: &mut dyn ShaderProgram,
        device: &mut dyn RenderDevice,
        screen: &dyn RenderTarget,
        gbuffer: &GeometryBuffer,
        layer: &Layer,
    ) -> BackendResult<()> {
        trace!("Compositing layer {} from {:?}", layer.name, layer.color);

        let mut textures = Vec::with_capacity(layer.color.len() + 1);
        program.set_int(uniforms::LAYER_COLOR_COUNT, layer.color.len() as i32);
        for (index, name) in layer.color.iter().enumerate() {
            program.set_texture(&uniforms::layer_color(index), textures.len());
            textures.push(gbuffer.buffer(name)?);
        }
        program.set_bool(uniforms::LAYER_HAS_DEPTH, layer.depth.is_some());
        if let Some(depth) = &layer.depth {
            program.set_texture(uniforms::LAYER_DEPTH, textures.len());
            textures.push(gbuffer.buffer(depth)?);
        }

        let properties = RenderProperties {
            enable_depth_test: true,
            depth_test_write: true,
            depth_test_mode: layer.depth_test_mode,
            enable_blending: true,
            blend_source_mode: layer.blend_source,
            blend_destination_mode: layer.blend_destination,
            ..RenderProperties::screen()
        };
        let command = RenderCommand::new(&*program, vec![gbuffer.screen_quad()])
            .with_textures(textures)
            .with_properties(properties);

        let renderer = device.renderer();
        renderer.render_begin(screen, &RenderOptions::new(screen.size()).with_clear(ClearFlags::empty()))?;
        renderer.add_command(&command)?;
        renderer.render_finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec2i;
    use crate::render::api::{ColorFormat, TextureAttributes, TextureBuffer};
    use crate::render::backends::software::SoftwareDevice;
    use crate::render::primitives::Image;

    struct Screen {
        target: Box<dyn RenderTarget>,
        color: Box<dyn TextureBuffer>,
    }

    fn screen(device: &mut SoftwareDevice, size: Vec2i) -> Screen {
        let allocator = device.allocator();
        let mut target = allocator.create_render_target(size, 1).unwrap();
        let color = allocator.create_texture_buffer(TextureAttributes::new(size, ColorFormat::Rgba)).unwrap();
        target.attach_color(0, color.as_ref()).unwrap();
        Screen { target, color }
    }

    fn filled_gbuffer(device: &mut SoftwareDevice, size: Vec2i, slots: &[(&str, ColorRGBA)]) -> GeometryBuffer {
        let mut gbuffer = GeometryBuffer::new(device.allocator(), size).unwrap();
        for (name, _) in slots {
            gbuffer.add_buffer(name, ColorFormat::Rgba).unwrap();
        }
        gbuffer.allocate(device.allocator()).unwrap();
        for (name, color) in slots {
            let image = Image::solid(size.x as u32, size.y as u32, *color);
            gbuffer.attach_color(&[name]).unwrap();
            let renderer = device.renderer();
            renderer
                .render_begin(gbuffer.render_target(), &RenderOptions::new(size).with_clear_color(*color))
                .unwrap();
            renderer.render_finish().unwrap();
            assert_eq!(gbuffer.buffer(name).unwrap().download_rgba().unwrap(), image);
        }
        gbuffer.detach_color();
        gbuffer
    }

    #[test]
    fn test_layer_colors_are_summed() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(2, 2);
        let gbuffer = filled_gbuffer(
            &mut device,
            size,
            &[("a", ColorRGBA::new(100, 0, 0, 255)), ("b", ColorRGBA::new(0, 50, 0, 255))],
        );
        let screen = screen(&mut device, size);

        let mut compositor = Compositor::new(device.allocator(), vec![Layer::new("sum", &["a", "b"])]).unwrap();
        compositor.present_layers(&mut device, screen.target.as_ref(), &gbuffer).unwrap();

        let image = screen.color.download_rgba().unwrap();
        assert!(image.pixels().iter().all(|p| *p == ColorRGBA::new(100, 50, 0, 255)));
    }

    #[test]
    fn test_transparent_layer_keeps_clear_color() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(2, 2);
        let gbuffer = filled_gbuffer(&mut device, size, &[("overlay", ColorRGBA::TRANSPARENT)]);
        let screen = screen(&mut device, size);

        let mut compositor = Compositor::new(device.allocator(), vec![Layer::new("overlay", &["overlay"])]).unwrap();
        compositor.set_clear_color(ColorRGBA::new(0, 0, 255, 255));
        compositor.present_layers(&mut device, screen.target.as_ref(), &gbuffer).unwrap();

        let image = screen.color.download_rgba().unwrap();
        assert!(image.pixels().iter().all(|p| *p == ColorRGBA::new(0, 0, 255, 255)));
    }

    #[test]
    fn test_too_many_layer_colors() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(1, 1);
        let gbuffer = filled_gbuffer(&mut device, size, &[("a", ColorRGBA::WHITE)]);
        let screen = screen(&mut device, size);

        let names = vec!["a"; MAX_LAYER_COLORS + 1];
        let mut compositor = Compositor::new(device.allocator(), vec![Layer::new("wide", &names)]).unwrap();
        let result = compositor.present_layers(&mut device, screen.target.as_ref(), &gbuffer);
        assert!(matches!(result, Err(RenderError::TooManyLayerColors { count: 16, .. })));
    }

    #[test]
    fn test_unknown_slot_is_an_error() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(1, 1);
        let gbuffer = filled_gbuffer(&mut device, size, &[("a", ColorRGBA::WHITE)]);
        let screen = screen(&mut device, size);

        let mut compositor = Compositor::new(device.allocator(), vec![Layer::new("bad", &["missing"])]).unwrap();
        let result = compositor.present_layers(&mut device, screen.target.as_ref(), &gbuffer);
        assert!(matches!(result, Err(RenderError::InvalidBuffer(_))));
    }
}
