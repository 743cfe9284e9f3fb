//! Per-frame scene description consumed by the passes
//!
//! A [`RenderScene`] only borrows GPU resources. Whoever builds it (usually
//! the render system) owns the meshes, textures and forward programs and
//! keeps them alive for the frame.

use std::cell::RefCell;

use crate::foundation::math::Transform;
use crate::render::api::{MeshBuffer, RenderProperties, ShaderProgram, TextureBuffer};
use crate::render::primitives::{Camera, ColorRGBA, Light};

/// Material with its textures resolved to GPU resources
///
/// A channel whose texture is `None` uses the flat color.
#[derive(Clone, Copy)]
pub struct SceneMaterial<'a> {
    /// Flat diffuse color
    pub diffuse: ColorRGBA,
    /// Flat ambient color
    pub ambient: ColorRGBA,
    /// Flat specular color
    pub specular: ColorRGBA,
    /// Flat emissive color
    pub emissive: ColorRGBA,
    /// Flat specular exponent
    pub shininess: f32,
    /// Diffuse map
    pub diffuse_texture: Option<&'a dyn TextureBuffer>,
    /// Ambient map
    pub ambient_texture: Option<&'a dyn TextureBuffer>,
    /// Specular map
    pub specular_texture: Option<&'a dyn TextureBuffer>,
    /// Shininess map, sampled from the first channel
    pub shininess_texture: Option<&'a dyn TextureBuffer>,
    /// Emissive map
    pub emissive_texture: Option<&'a dyn TextureBuffer>,
    /// Tangent space normal map
    pub normal_texture: Option<&'a dyn TextureBuffer>,
}

impl Default for SceneMaterial<'_> {
    fn default() -> Self {
        Self {
            diffuse: ColorRGBA::WHITE,
            ambient: ColorRGBA::new(25, 25, 25, 255),
            specular: ColorRGBA::new(128, 128, 128, 255),
            emissive: ColorRGBA::TRANSPARENT,
            shininess: 32.0,
            diffuse_texture: None,
            ambient_texture: None,
            specular_texture: None,
            shininess_texture: None,
            emissive_texture: None,
            normal_texture: None,
        }
    }
}

impl SceneMaterial<'_> {
    /// Untextured material with `diffuse` as its flat color
    pub fn flat(diffuse: ColorRGBA) -> Self {
        Self {
            diffuse,
            ..Self::default()
        }
    }
}

/// Object shaded by the deferred passes
#[derive(Clone, Copy)]
pub struct DeferredCommand<'a> {
    /// Object transform
    pub transform: Transform,
    /// Resolved material
    pub material: SceneMaterial<'a>,
    /// Geometry
    pub mesh: &'a dyn MeshBuffer,
    /// Draw a silhouette outline around the object
    pub outline: bool,
    /// Outline color
    pub outline_color: ColorRGBA,
    /// Scale of the outline hull relative to the object
    pub outline_scale: f32,
}

impl<'a> DeferredCommand<'a> {
    /// Command without an outline
    pub fn new(transform: Transform, material: SceneMaterial<'a>, mesh: &'a dyn MeshBuffer) -> Self {
        Self {
            transform,
            material,
            mesh,
            outline: false,
            outline_color: ColorRGBA::WHITE,
            outline_scale: 1.1,
        }
    }

    /// Enable the outline with `color` and hull `scale`
    #[must_use]
    pub fn with_outline(mut self, color: ColorRGBA, scale: f32) -> Self {
        self.outline = true;
        self.outline_color = color;
        self.outline_scale = scale;
        self
    }
}

/// Object drawn by the forward pass with its own program
///
/// The forward pass writes the matrix and light uniforms into `shader`
/// before drawing; every other uniform is the caller's.
pub struct ForwardCommand<'a> {
    /// Object transform
    pub transform: Transform,
    /// Program, shared between commands drawing with the same shader
    pub shader: &'a RefCell<Box<dyn ShaderProgram>>,
    /// Geometry
    pub meshes: Vec<&'a dyn MeshBuffer>,
    /// Textures in unit order
    pub textures: Vec<&'a dyn TextureBuffer>,
    /// Fixed function state
    pub properties: RenderProperties,
}

impl<'a> ForwardCommand<'a> {
    /// Command drawing `meshes` with `shader` and default properties
    pub fn new(
        transform: Transform,
        shader: &'a RefCell<Box<dyn ShaderProgram>>,
        meshes: Vec<&'a dyn MeshBuffer>,
    ) -> Self {
        Self {
            transform,
            shader,
            meshes,
            textures: Vec::new(),
            properties: RenderProperties::default(),
        }
    }

    /// Replace the bound textures
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

/// Everything the passes draw in one frame
pub struct RenderScene<'a> {
    /// Viewpoint
    pub camera: Camera,
    /// Cube map drawn behind everything, the configured color when `None`
    pub skybox: Option<&'a dyn TextureBuffer>,
    /// Deferred shaded objects
    pub deferred: Vec<DeferredCommand<'a>>,
    /// Forward shaded objects
    pub forward: Vec<ForwardCommand<'a>>,
    /// Light sources
    pub lights: Vec<Light>,
}

impl<'a> RenderScene<'a> {
    /// Empty scene seen through `camera`
    pub const fn new(camera: Camera) -> Self {
        Self {
            camera,
            skybox: None,
            deferred: Vec::new(),
            forward: Vec::new(),
            lights: Vec::new(),
        }
    }

    /// Replace the skybox
    #[must_use]
    pub fn with_skybox(mut self, skybox: &'a dyn TextureBuffer) -> Self {
        self.skybox = Some(skybox);
        self
    }
}
