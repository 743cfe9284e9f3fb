//! Decoded contents of one bundle file

use serde::{Deserialize, Serialize};

use super::{AssetError, AssetKind, AssetPath};
use crate::render::api::TextureAttributes;
use crate::render::primitives::{ImageRGBA, Material, Mesh};

#[cfg(feature = "audio")]
use super::audio_loader::AudioClip;

/// Texture asset: an image reference plus sampling attributes
///
/// The size and format of `attributes` are replaced by the image's when the
/// texture is uploaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureAsset {
    /// Image the texture is created from
    pub image: AssetPath,
    /// Sampling attributes
    #[serde(default)]
    pub attributes: TextureAttributes,
}

/// Named assets of one kind in insertion order
#[derive(Debug, Clone)]
struct Entries<T> {
    kind: AssetKind,
    items: Vec<(String, T)>,
}

impl<T> Entries<T> {
    const fn new(kind: AssetKind) -> Self {
        Self {
            kind,
            items: Vec::new(),
        }
    }

    fn insert(&mut self, name: String, value: T) -> Result<(), AssetError> {
        if self.items.iter().any(|(existing, _)| *existing == name) {
            return Err(AssetError::DuplicateAsset { kind: self.kind, name });
        }
        self.items.push((name, value));
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&T, AssetError> {
        let found = if name.is_empty() {
            self.items.first()
        } else {
            self.items.iter().find(|(existing, _)| existing == name)
        };
        found.map(|(_, value)| value).ok_or_else(|| AssetError::MissingAsset {
            kind: self.kind,
            name: name.to_string(),
        })
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(name, _)| name.as_str())
    }
}

/// Named meshes, materials, textures, images (and audio) of one bundle
///
/// Lookups with an empty name return the first asset of the kind.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    meshes: Entries<Mesh>,
    materials: Entries<Material>,
    textures: Entries<TextureAsset>,
    images: Entries<ImageRGBA>,
    #[cfg(feature = "audio")]
    audio: Entries<AudioClip>,
}

impl Default for AssetBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetBundle {
    /// Empty bundle
    pub const fn new() -> Self {
        Self {
            meshes: Entries::new(AssetKind::Mesh),
            materials: Entries::new(AssetKind::Material),
            textures: Entries::new(AssetKind::Texture),
            images: Entries::new(AssetKind::Image),
            #[cfg(feature = "audio")]
            audio: Entries::new(AssetKind::Audio),
        }
    }

    /// Add a mesh, `DuplicateAsset` if the name is taken
    pub fn insert_mesh(&mut self, name: impl Into<String>, mesh: Mesh) -> Result<(), AssetError> {
        self.meshes.insert(name.into(), mesh)
    }

    /// Add a material
    pub fn insert_material(&mut self, name: impl Into<String>, material: Material) -> Result<(), AssetError> {
        self.materials.insert(name.into(), material)
    }

    /// Add a texture
    pub fn insert_texture(&mut self, name: impl Into<String>, texture: TextureAsset) -> Result<(), AssetError> {
        self.textures.insert(name.into(), texture)
    }

    /// Add an image
    pub fn insert_image(&mut self, name: impl Into<String>, image: ImageRGBA) -> Result<(), AssetError> {
        self.images.insert(name.into(), image)
    }

    /// Add an audio clip
    #[cfg(feature = "audio")]
    pub fn insert_audio(&mut self, name: impl Into<String>, clip: AudioClip) -> Result<(), AssetError> {
        self.audio.insert(name.into(), clip)
    }

    /// Mesh by name
    pub fn get_mesh(&self, name: &str) -> Result<&Mesh, AssetError> {
        self.meshes.get(name)
    }

    /// Material by name
    pub fn get_material(&self, name: &str) -> Result<&Material, AssetError> {
        self.materials.get(name)
    }

    /// Texture by name
    pub fn get_texture(&self, name: &str) -> Result<&TextureAsset, AssetError> {
        self.textures.get(name)
    }

    /// Image by name
    pub fn get_image(&self, name: &str) -> Result<&ImageRGBA, AssetError> {
        self.images.get(name)
    }

    /// Audio clip by name
    #[cfg(feature = "audio")]
    pub fn get_audio(&self, name: &str) -> Result<&AudioClip, AssetError> {
        self.audio.get(name)
    }

    /// Names of the assets of `kind` in insertion order
    pub fn names(&self, kind: AssetKind) -> Vec<&str> {
        match kind {
            AssetKind::Mesh => self.meshes.names().collect(),
            AssetKind::Material => self.materials.names().collect(),
            AssetKind::Texture => self.textures.names().collect(),
            AssetKind::Image => self.images.names().collect(),
            #[cfg(feature = "audio")]
            AssetKind::Audio => self.audio.names().collect(),
            #[cfg(not(feature = "audio"))]
            AssetKind::Audio => Vec::new(),
        }
    }

    /// Whether the bundle holds no asset at all
    pub fn is_empty(&self) -> bool {
        [
            AssetKind::Mesh,
            AssetKind::Material,
            AssetKind::Texture,
            AssetKind::Image,
            AssetKind::Audio,
        ]
        .into_iter()
        .all(|kind| self.names(kind).is_empty())
    }
}
