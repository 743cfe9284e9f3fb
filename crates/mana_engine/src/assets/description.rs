//! JSON bundle descriptions
//!
//! A description file assembles a bundle out of other bundles:
//!
//! ```json
//! {
//!   "meshes":    [{ "name": "Cube", "bundle": "cube.obj", "asset": "" }],
//!   "materials": [{ "name": "Red", "diffuse": {"r":255,"g":0,"b":0,"a":255} }],
//!   "textures":  [{ "name": "Brick", "image": {"bundle": "brick.png", "asset": ""} }],
//!   "images":    [{ "name": "Brick", "bundle": "brick.png", "asset": "" }]
//! }
//! ```
//!
//! Mesh and image entries copy an asset out of the referenced bundle.
//! Materials and textures are stored as written; the asset paths inside them
//! are resolved by the render system.

use serde::{Deserialize, Serialize};

use super::bundle::TextureAsset;
use super::AssetPath;
use crate::render::primitives::Material;

/// Asset copied from another bundle under a new name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetReference {
    /// Name inside the described bundle
    pub name: String,
    /// Source of the asset
    #[serde(flatten)]
    pub source: AssetPath,
}

/// Material entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialEntry {
    /// Material name
    pub name: String,
    /// Material fields
    #[serde(flatten)]
    pub material: Material,
}

/// Texture entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextureEntry {
    /// Texture name
    pub name: String,
    /// Image reference and sampling
    #[serde(flatten)]
    pub texture: TextureAsset,
}

/// Parsed bundle description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleDescription {
    /// Meshes copied from other bundles
    pub meshes: Vec<AssetReference>,
    /// Materials
    pub materials: Vec<MaterialEntry>,
    /// Textures
    pub textures: Vec<TextureEntry>,
    /// Images copied from other bundles
    pub images: Vec<AssetReference>,
}

impl BundleDescription {
    /// Parse description JSON
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Bundles whose assets are copied in
    pub fn referenced_bundles(&self) -> impl Iterator<Item = &str> {
        self.meshes
            .iter()
            .chain(&self.images)
            .map(|reference| reference.source.bundle.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{TextureFiltering, TextureWrapping};
    use crate::render::primitives::ColorRGBA;

    const DESCRIPTION: &str = r#"{
        "meshes":    [{ "name": "Cube", "bundle": "cube.obj", "asset": "" }],
        "materials": [{ "name": "Red", "diffuse": {"r":255,"g":0,"b":0,"a":255},
                        "diffuseTexture": {"bundle": "tex.json", "asset": "Brick"},
                        "shininess": 32.0 }],
        "textures":  [{ "name": "Brick", "image": {"bundle": "brick.png", "asset": ""},
                        "attributes": { "wrapping": "ClampToEdge", "filterMin": "Nearest",
                                        "filterMag": "Linear" } }],
        "images":    [{ "name": "Brick", "bundle": "brick.png", "asset": "" }]
    }"#;

    #[test]
    fn test_parse_description() {
        let description = BundleDescription::from_json(DESCRIPTION.as_bytes()).unwrap();

        assert_eq!(description.meshes[0].name, "Cube");
        assert_eq!(description.meshes[0].source, AssetPath::new("cube.obj", ""));

        let red = &description.materials[0];
        assert_eq!(red.name, "Red");
        assert_eq!(red.material.diffuse, ColorRGBA::new(255, 0, 0, 255));
        assert_eq!(red.material.diffuse_texture, Some(AssetPath::new("tex.json", "Brick")));

        let brick = &description.textures[0].texture;
        assert_eq!(brick.image, AssetPath::new("brick.png", ""));
        assert_eq!(brick.attributes.wrapping, TextureWrapping::ClampToEdge);
        assert_eq!(brick.attributes.filter_min, TextureFiltering::Nearest);

        let referenced: Vec<&str> = description.referenced_bundles().collect();
        assert_eq!(referenced, ["cube.obj", "brick.png"]);
    }

    #[test]
    fn test_sections_are_optional() {
        let description = BundleDescription::from_json(br#"{"images": []}"#).unwrap();
        assert_eq!(description, BundleDescription::default());
        assert!(BundleDescription::from_json(b"[1, 2]").is_err());
    }
}
