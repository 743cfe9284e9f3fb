//! Components consumed by the render system

use crate::assets::AssetPath;
use crate::ecs::Component;
use crate::render::api::CubeMapFace;
use crate::render::primitives::ColorRGBA;

/// Outline drawn around a deferred mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outline {
    /// Outline color
    pub color: ColorRGBA,
    /// Scale of the outline hull relative to the mesh
    pub scale: f32,
}

impl Default for Outline {
    fn default() -> Self {
        Self {
            color: ColorRGBA::WHITE,
            scale: 1.1,
        }
    }
}

/// A mesh drawn with a material
///
/// Without a forward shader the mesh goes through the deferred passes; with
/// one it is drawn by the forward pass using the named shader program.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshRenderComponent {
    /// Mesh asset
    pub mesh: AssetPath,
    /// Material asset
    pub material: AssetPath,
    /// Logical name of a forward shader program
    pub forward_shader: Option<String>,
    /// Outline, deferred meshes only
    pub outline: Option<Outline>,
}

impl Component for MeshRenderComponent {}

impl MeshRenderComponent {
    /// Deferred mesh
    pub const fn new(mesh: AssetPath, material: AssetPath) -> Self {
        Self {
            mesh,
            material,
            forward_shader: None,
            outline: None,
        }
    }

    /// Draw through the forward pass with `shader`
    #[must_use]
    pub fn with_forward_shader(mut self, shader: impl Into<String>) -> Self {
        self.forward_shader = Some(shader.into());
        self
    }

    /// Draw an outline
    #[must_use]
    pub fn with_outline(mut self, outline: Outline) -> Self {
        self.outline = Some(outline);
        self
    }

    /// Bundles the component needs
    pub fn bundles(&self) -> [&str; 2] {
        [self.mesh.bundle.as_str(), self.material.bundle.as_str()]
    }
}

/// Cube map skybox assembled from six images
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SkyboxComponent {
    /// Face images in [`CubeMapFace::ALL`] order
    pub faces: [AssetPath; 6],
}

impl Component for SkyboxComponent {}

impl SkyboxComponent {
    /// Skybox from six face images
    pub const fn new(faces: [AssetPath; 6]) -> Self {
        Self { faces }
    }

    /// Face images with their faces
    pub fn faces(&self) -> impl Iterator<Item = (CubeMapFace, &AssetPath)> {
        CubeMapFace::ALL.into_iter().zip(&self.faces)
    }

    /// Bundles the component needs
    pub fn bundles(&self) -> impl Iterator<Item = &str> {
        self.faces.iter().map(|face| face.bundle.as_str())
    }
}
