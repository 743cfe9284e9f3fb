//! Material description
//!
//! A [`Material`] is the bundle form: flat colors plus optional references
//! to texture assets. Texture references are resolved to GPU textures by the
//! render system before the material reaches a pass.

use serde::{Deserialize, Serialize};

use super::color::ColorRGBA;
use crate::assets::AssetPath;

/// Phong material with optional texture maps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Material {
    /// Flat diffuse color
    pub diffuse: ColorRGBA,
    /// Flat ambient color
    pub ambient: ColorRGBA,
    /// Flat specular color
    pub specular: ColorRGBA,
    /// Flat emissive color
    pub emissive: ColorRGBA,
    /// Specular exponent
    pub shininess: f32,

    /// Diffuse texture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffuse_texture: Option<AssetPath>,
    /// Ambient texture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambient_texture: Option<AssetPath>,
    /// Specular texture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specular_texture: Option<AssetPath>,
    /// Emissive texture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emissive_texture: Option<AssetPath>,
    /// Shininess texture
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shininess_texture: Option<AssetPath>,
    /// Tangent space normal map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal_texture: Option<AssetPath>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: ColorRGBA::TRANSPARENT,
            ambient: ColorRGBA::TRANSPARENT,
            specular: ColorRGBA::TRANSPARENT,
            emissive: ColorRGBA::TRANSPARENT,
            shininess: 32.0,
            diffuse_texture: None,
            ambient_texture: None,
            specular_texture: None,
            emissive_texture: None,
            shininess_texture: None,
            normal_texture: None,
        }
    }
}

impl Material {
    /// Material with a flat diffuse color
    pub fn flat(diffuse: ColorRGBA) -> Self {
        Self {
            diffuse,
            ..Self::default()
        }
    }

    /// Every texture reference that is set
    pub fn texture_paths(&self) -> impl Iterator<Item = &AssetPath> {
        [
            &self.diffuse_texture,
            &self.ambient_texture,
            &self.specular_texture,
            &self.emissive_texture,
            &self.shininess_texture,
            &self.normal_texture,
        ]
        .into_iter()
        .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_camel_case() {
        let json = r#"{
            "diffuse": {"r": 255, "g": 0, "b": 0, "a": 255},
            "diffuseTexture": {"bundle": "tex.json", "asset": "Brick"},
            "shininess": 16.0
        }"#;
        let material: Material = serde_json::from_str(json).unwrap();
        assert_eq!(material.diffuse, ColorRGBA::new(255, 0, 0, 255));
        assert_eq!(material.shininess, 16.0);
        assert_eq!(
            material.diffuse_texture,
            Some(AssetPath::new("tex.json", "Brick"))
        );
        assert!(material.normal_texture.is_none());
    }

    #[test]
    fn test_texture_paths() {
        let mut material = Material::flat(ColorRGBA::WHITE);
        assert_eq!(material.texture_paths().count(), 0);
        material.normal_texture = Some(AssetPath::new("n.png", ""));
        material.specular_texture = Some(AssetPath::new("s.png", ""));
        assert_eq!(material.texture_paths().count(), 2);
    }
}
