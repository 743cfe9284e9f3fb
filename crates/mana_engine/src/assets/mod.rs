//! # Asset System
//!
//! Bundles of decoded assets loaded asynchronously from an [`Archive`].
//!
//! A bundle is whatever one source file decodes to: a Wavefront OBJ gives
//! meshes, a PNG gives one image, a JSON bundle description gives meshes,
//! materials, textures and images (see [`description`]). Assets inside a
//! bundle are addressed by an [`AssetPath`].
//!
//! ## Loading
//!
//! ```text
//! import(path) ──► ThreadPool task ──► decode by extension ──► AssetBundle
//!                     ▲                                             │
//!   get_bundle(path) ─┴── waits on the task ◄────────────────────────┘
//! ```
//!
//! Duplicate imports of one path share one task.

pub mod archive;
#[cfg(feature = "audio")]
pub mod audio_loader;
pub mod bundle;
pub mod description;
pub mod image_loader;
pub mod importer;
pub mod obj_loader;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use archive::{Archive, DirectoryArchive, MemoryArchive};
pub use bundle::{AssetBundle, TextureAsset};
pub use description::BundleDescription;
pub use importer::AssetImporter;

/// Asset loading errors
#[derive(Error, Debug)]
pub enum AssetError {
    /// IO error while reading from an archive
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive has no file at this path
    #[error("Asset file not found: {0}")]
    NotFound(String),

    /// No decoder handles the file extension
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The file content could not be decoded
    #[error("Failed to decode {path}: {reason}")]
    Decode {
        /// Bundle path
        path: String,
        /// Decoder message
        reason: String,
    },

    /// Two assets of one kind share a name inside a bundle
    #[error("Duplicate {kind} asset {name}")]
    DuplicateAsset {
        /// Asset kind
        kind: AssetKind,
        /// Asset name
        name: String,
    },

    /// A bundle has no asset of this kind and name
    #[error("Missing {kind} asset \"{name}\"")]
    MissingAsset {
        /// Asset kind
        kind: AssetKind,
        /// Asset name, empty for "first of this kind"
        name: String,
    },

    /// A bundle load failed earlier or its task died
    #[error("Failed to load bundle: {0}")]
    LoadFailed(String),

    /// Bundle descriptions reference each other in a loop
    #[error("Bundle reference cycle through {0}")]
    BundleCycle(String),
}

/// Kind of asset stored in a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    /// Triangle mesh
    Mesh,
    /// Phong material
    Material,
    /// Texture description referencing an image
    Texture,
    /// Decoded RGBA image
    Image,
    /// Decoded audio samples
    Audio,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mesh => "mesh",
            Self::Material => "material",
            Self::Texture => "texture",
            Self::Image => "image",
            Self::Audio => "audio",
        };
        f.write_str(name)
    }
}

/// Decoder selected for a bundle file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleFormat {
    /// JSON bundle description
    Description,
    /// Wavefront OBJ
    Obj,
    /// PNG image
    Png,
    /// WAV audio
    Wav,
}

impl BundleFormat {
    /// Select the decoder from the file extension
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for unknown or missing extensions.
    pub fn from_path(path: &str) -> Result<Self, AssetError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| AssetError::UnsupportedFormat(path.to_string()))?;
        match extension.as_str() {
            "json" => Ok(Self::Description),
            "obj" => Ok(Self::Obj),
            "png" => Ok(Self::Png),
            "wav" => Ok(Self::Wav),
            _ => Err(AssetError::UnsupportedFormat(path.to_string())),
        }
    }

    /// Extension the format is selected by
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Description => "json",
            Self::Obj => "obj",
            Self::Png => "png",
            Self::Wav => "wav",
        }
    }
}

/// Address of an asset: the bundle file plus the asset name inside it
///
/// An empty asset name means the first asset of the requested kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetPath {
    /// Bundle path inside the archive
    pub bundle: String,
    /// Asset name inside the bundle
    pub asset: String,
}

impl AssetPath {
    /// Create an asset path
    pub fn new(bundle: impl Into<String>, asset: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
            asset: asset.into(),
        }
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.bundle, self.asset)
    }
}

/// Name of a single-asset bundle's asset: the file stem
pub(crate) fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_follows_extension() {
        assert_eq!(BundleFormat::from_path("meshes/cube.obj").unwrap(), BundleFormat::Obj);
        assert_eq!(BundleFormat::from_path("scene.JSON").unwrap(), BundleFormat::Description);
        assert_eq!(BundleFormat::from_path("brick.png").unwrap(), BundleFormat::Png);
        assert!(matches!(
            BundleFormat::from_path("brick.tga"),
            Err(AssetError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            BundleFormat::from_path("README"),
            Err(AssetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_asset_path_serde() {
        let path: AssetPath = serde_json::from_str(r#"{"bundle": "cube.obj"}"#).unwrap();
        assert_eq!(path, AssetPath::new("cube.obj", ""));
        assert_eq!(AssetPath::new("tex.json", "Brick").to_string(), "tex.json:Brick");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("textures/brick.png"), "brick");
        assert_eq!(file_stem(""), "");
    }
}
