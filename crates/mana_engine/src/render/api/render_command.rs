//! Draw commands and per-frame render options

use bitflags::bitflags;

use super::mesh_buffer::MeshBuffer;
use super::shader_program::ShaderProgram;
use super::texture_buffer::TextureBuffer;
use crate::foundation::math::{Vec2i, Vec4};
use crate::render::primitives::ColorRGBA;

/// Depth comparison between an incoming fragment and the stored depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthTestMode {
    /// Always pass
    Always,
    /// Never pass
    Never,
    /// Pass if closer
    #[default]
    Less,
    /// Pass if equal
    Equal,
    /// Pass if closer or equal
    LessOrEqual,
    /// Pass if farther
    Greater,
    /// Pass if not equal
    NotEqual,
    /// Pass if farther or equal
    GreaterOrEqual,
}

impl DepthTestMode {
    /// Whether `incoming` passes against `stored`
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::Equal => (incoming - stored).abs() <= f32::EPSILON,
            Self::LessOrEqual => incoming <= stored,
            Self::Greater => incoming > stored,
            Self::NotEqual => (incoming - stored).abs() > f32::EPSILON,
            Self::GreaterOrEqual => incoming >= stored,
        }
    }
}

/// Blend factor applied to the source or destination color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    /// 0
    Zero,
    /// 1
    One,
    /// Source color
    SourceColor,
    /// 1 - source color
    OneMinusSourceColor,
    /// Source alpha
    SourceAlpha,
    /// 1 - source alpha
    OneMinusSourceAlpha,
    /// Destination color
    DestinationColor,
    /// 1 - destination color
    OneMinusDestinationColor,
    /// Destination alpha
    DestinationAlpha,
    /// 1 - destination alpha
    OneMinusDestinationAlpha,
}

impl BlendMode {
    /// Per channel factor for a source/destination pair
    pub fn factor(self, source: &Vec4, destination: &Vec4) -> Vec4 {
        let one = Vec4::repeat(1.0);
        match self {
            Self::Zero => Vec4::zeros(),
            Self::One => one,
            Self::SourceColor => *source,
            Self::OneMinusSourceColor => one - source,
            Self::SourceAlpha => Vec4::repeat(source.w),
            Self::OneMinusSourceAlpha => Vec4::repeat(1.0 - source.w),
            Self::DestinationColor => *destination,
            Self::OneMinusDestinationColor => one - destination,
            Self::DestinationAlpha => Vec4::repeat(destination.w),
            Self::OneMinusDestinationAlpha => Vec4::repeat(1.0 - destination.w),
        }
    }
}

/// Which faces are culled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaceCullingMode {
    /// Cull clockwise triangles
    #[default]
    Back,
    /// Cull counter-clockwise triangles
    Front,
    /// Cull everything
    FrontAndBack,
}

/// Fixed function state of a draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderProperties {
    /// Compare against the depth attachment
    pub enable_depth_test: bool,
    /// Write passing depths
    pub depth_test_write: bool,
    /// Depth comparison
    pub depth_test_mode: DepthTestMode,
    /// Cull faces
    pub enable_face_culling: bool,
    /// Faces to cull
    pub face_culling_mode: FaceCullingMode,
    /// Blend with the destination color
    pub enable_blending: bool,
    /// Source factor
    pub blend_source_mode: BlendMode,
    /// Destination factor
    pub blend_destination_mode: BlendMode,
}

impl Default for RenderProperties {
    fn default() -> Self {
        Self {
            enable_depth_test: true,
            depth_test_write: true,
            depth_test_mode: DepthTestMode::Less,
            enable_face_culling: true,
            face_culling_mode: FaceCullingMode::Back,
            enable_blending: false,
            blend_source_mode: BlendMode::SourceAlpha,
            blend_destination_mode: BlendMode::OneMinusSourceAlpha,
        }
    }
}

impl RenderProperties {
    /// Full screen pass state: no depth test, no culling, no blending
    pub fn screen() -> Self {
        Self {
            enable_depth_test: false,
            depth_test_write: false,
            enable_face_culling: false,
            ..Self::default()
        }
    }
}

/// One draw: a program, its meshes and its texture units
pub struct RenderCommand<'a> {
    /// Program, with uniforms already written
    pub shader: &'a dyn ShaderProgram,
    /// Meshes drawn with the program
    pub meshes: Vec<&'a dyn MeshBuffer>,
    /// Texture units in order; sampler uniforms index into this list
    pub textures: Vec<&'a dyn TextureBuffer>,
    /// Fixed function state
    pub properties: RenderProperties,
}

impl<'a> RenderCommand<'a> {
    /// Command drawing `meshes` with `shader` and default properties
    pub fn new(shader: &'a dyn ShaderProgram, meshes: Vec<&'a dyn MeshBuffer>) -> Self {
        Self {
            shader,
            meshes,
            textures: Vec::new(),
            properties: RenderProperties::default(),
        }
    }

    /// Replace the texture units
    #[must_use]
    pub fn with_textures(mut self, textures: Vec<&'a dyn TextureBuffer>) -> Self {
        self.textures = textures;
        self
    }

    /// Replace the fixed function state
    #[must_use]
    pub fn with_properties(mut self, properties: RenderProperties) -> Self {
        self.properties = properties;
        self
    }
}

bitflags! {
    /// Attachments cleared by `render_begin`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        /// Clear color attachments
        const COLOR = 0b001;
        /// Clear depth
        const DEPTH = 0b010;
        /// Clear stencil
        const STENCIL = 0b100;
    }
}

/// Viewport and clear state of a render pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    /// Viewport lower left corner
    pub viewport_offset: Vec2i,
    /// Viewport size
    pub viewport_size: Vec2i,
    /// Color written by a color clear
    pub clear_color: ColorRGBA,
    /// Depth written by a depth clear
    pub clear_depth: f32,
    /// Stencil written by a stencil clear
    pub clear_stencil: u8,
    /// Attachments to clear
    pub clear: ClearFlags,
}

impl RenderOptions {
    /// Viewport covering `size`, clearing everything to transparent black and depth 1
    pub fn new(size: Vec2i) -> Self {
        Self {
            viewport_offset: Vec2i::zeros(),
            viewport_size: size,
            clear_color: ColorRGBA::TRANSPARENT,
            clear_depth: 1.0,
            clear_stencil: 0,
            clear: ClearFlags::all(),
        }
    }

    /// Replace the clear color
    #[must_use]
    pub fn with_clear_color(mut self, color: ColorRGBA) -> Self {
        self.clear_color = color;
        self
    }

    /// Replace the set of cleared attachments
    #[must_use]
    pub fn with_clear(mut self, clear: ClearFlags) -> Self {
        self.clear = clear;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_modes() {
        assert!(DepthTestMode::Less.passes(0.2, 0.5));
        assert!(!DepthTestMode::Less.passes(0.5, 0.5));
        assert!(DepthTestMode::LessOrEqual.passes(0.5, 0.5));
        assert!(DepthTestMode::Always.passes(1.0, 0.0));
        assert!(!DepthTestMode::Never.passes(0.0, 1.0));
        assert!(DepthTestMode::GreaterOrEqual.passes(0.5, 0.4));
    }

    #[test]
    fn test_blend_factors() {
        let source = Vec4::new(1.0, 0.0, 0.0, 0.25);
        let destination = Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert_eq!(BlendMode::SourceAlpha.factor(&source, &destination), Vec4::repeat(0.25));
        assert_eq!(
            BlendMode::OneMinusSourceAlpha.factor(&source, &destination),
            Vec4::repeat(0.75)
        );
        assert_eq!(BlendMode::DestinationColor.factor(&source, &destination), destination);
    }

    #[test]
    fn test_options_clear_everything_by_default() {
        let options = RenderOptions::new(Vec2i::new(2, 2));
        assert_eq!(options.clear, ClearFlags::COLOR | ClearFlags::DEPTH | ClearFlags::STENCIL);
        let options = options.with_clear(ClearFlags::empty());
        assert!(options.clear.is_empty());
    }
}
