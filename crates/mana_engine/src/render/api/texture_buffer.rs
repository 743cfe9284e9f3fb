//! Texture buffer capability and its attributes

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec2i;
use crate::render::primitives::{ColorRGB, ColorRGBA, Image, ImageRGBA};
use crate::render::BackendResult;

/// Dimensionality of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureType {
    /// Single 2D image
    #[default]
    Texture2D,
    /// Six square faces sampled by direction
    CubeMap,
}

/// Storage format of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorFormat {
    /// 8-bit RGB
    Rgb,
    /// 8-bit RGBA
    #[default]
    Rgba,
    /// 32-bit float depth
    Depth,
    /// 24-bit depth with 8-bit stencil
    DepthStencil,
    /// 32-bit float RGBA
    Rgba32F,
    /// 32-bit float single channel
    R32F,
    /// 8-bit unsigned integer single channel
    R8UI,
    /// Block compressed RGB
    RgbCompressed,
    /// Block compressed RGBA
    RgbaCompressed,
}

impl ColorFormat {
    /// Whether the format is block compressed
    pub const fn is_compressed(self) -> bool {
        matches!(self, Self::RgbCompressed | Self::RgbaCompressed)
    }

    /// Whether the format stores depth
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth | Self::DepthStencil)
    }
}

/// Behavior of texture coordinates outside `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureWrapping {
    /// Tile the texture
    #[default]
    Repeat,
    /// Tile the texture, mirroring every other tile
    RepeatMirrored,
    /// Clamp to the edge texel
    ClampToEdge,
    /// Clamp to the border color (transparent black)
    ClampToBorder,
}

/// Sampling filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFiltering {
    /// Closest texel
    Nearest,
    /// Bilinear interpolation of the four closest texels
    #[default]
    Linear,
}

/// Filter between mip levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MipMapFiltering {
    /// Closest level, nearest texel
    NearestMipmapNearest,
    /// Closest level, linear texel
    LinearMipmapNearest,
    /// Blend levels, nearest texel
    NearestMipmapLinear,
    /// Blend levels, linear texel
    #[default]
    LinearMipmapLinear,
}

/// Face of a cube map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CubeMapFace {
    /// +X
    PositiveX,
    /// -X
    NegativeX,
    /// +Y
    PositiveY,
    /// -Y
    NegativeY,
    /// +Z
    PositiveZ,
    /// -Z
    NegativeZ,
}

impl CubeMapFace {
    /// All faces in storage order
    pub const ALL: [Self; 6] = [
        Self::PositiveX,
        Self::NegativeX,
        Self::PositiveY,
        Self::NegativeY,
        Self::PositiveZ,
        Self::NegativeZ,
    ];

    /// Storage index of the face
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Creation parameters of a texture buffer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextureAttributes {
    /// Size in texels (per face for cube maps)
    pub size: Vec2i,
    /// Storage format
    pub format: ColorFormat,
    /// Texture dimensionality
    pub texture_type: TextureType,
    /// Coordinate wrapping
    pub wrapping: TextureWrapping,
    /// Minification filter
    pub filter_min: TextureFiltering,
    /// Magnification filter
    pub filter_mag: TextureFiltering,
    /// Generate mip levels on upload
    pub generate_mipmap: bool,
    /// Filter between mip levels
    pub mipmap_filter: MipMapFiltering,
}

impl Default for TextureAttributes {
    fn default() -> Self {
        Self {
            size: Vec2i::new(1, 1),
            format: ColorFormat::Rgba,
            texture_type: TextureType::Texture2D,
            wrapping: TextureWrapping::Repeat,
            filter_min: TextureFiltering::Linear,
            filter_mag: TextureFiltering::Linear,
            generate_mipmap: false,
            mipmap_filter: MipMapFiltering::LinearMipmapLinear,
        }
    }
}

impl TextureAttributes {
    /// 2D texture of `size` and `format` with default sampling
    pub fn new(size: Vec2i, format: ColorFormat) -> Self {
        Self {
            size,
            format,
            ..Self::default()
        }
    }

    /// Cube map with square faces of `size`
    pub fn cube_map(size: Vec2i, format: ColorFormat) -> Self {
        Self {
            size,
            format,
            texture_type: TextureType::CubeMap,
            wrapping: TextureWrapping::ClampToEdge,
            ..Self::default()
        }
    }

    /// Replace the sampling filter for both minification and magnification
    #[must_use]
    pub fn with_filter(mut self, filter: TextureFiltering) -> Self {
        self.filter_min = filter;
        self.filter_mag = filter;
        self
    }

    /// Replace the coordinate wrapping
    #[must_use]
    pub fn with_wrapping(mut self, wrapping: TextureWrapping) -> Self {
        self.wrapping = wrapping;
        self
    }
}

/// GPU resident image created by a `RenderAllocator`
///
/// Uploading replaces the contents and takes the size of the uploaded image.
/// Uploading into a compressed format from an uncompressed image is an
/// `InvalidFormat` error, as is a face upload into a 2D texture.
pub trait TextureBuffer: Any {
    /// Current attributes
    fn attributes(&self) -> &TextureAttributes;

    /// Size in texels
    fn size(&self) -> Vec2i {
        self.attributes().size
    }

    /// Upload an 8-bit RGBA image
    fn upload_rgba(&mut self, image: &ImageRGBA) -> BackendResult<()>;

    /// Upload an 8-bit RGB image
    fn upload_rgb(&mut self, image: &Image<ColorRGB>) -> BackendResult<()>;

    /// Upload a single channel float image into the first channel
    fn upload_float(&mut self, image: &Image<f32>) -> BackendResult<()>;

    /// Upload one face of a cube map
    fn upload_cube_face(&mut self, face: CubeMapFace, image: &ImageRGBA) -> BackendResult<()>;

    /// Read back a 2D texture as 8-bit RGBA
    fn download_rgba(&self) -> BackendResult<ImageRGBA>;

    /// Read back the first channel of a 2D texture
    fn download_float(&self) -> BackendResult<Image<f32>>;

    /// Concrete backend type
    fn as_any(&self) -> &dyn Any;
}

/// Fill every face of a cube map with one color
pub fn upload_cube_color(texture: &mut dyn TextureBuffer, color: ColorRGBA) -> BackendResult<()> {
    let image = Image::solid(1, 1, color);
    for face in CubeMapFace::ALL {
        texture.upload_cube_face(face, &image)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_defaults() {
        let attributes = TextureAttributes::default();
        assert_eq!(attributes.size, Vec2i::new(1, 1));
        assert_eq!(attributes.format, ColorFormat::Rgba);
        assert_eq!(attributes.texture_type, TextureType::Texture2D);
    }

    #[test]
    fn test_attributes_from_partial_json() {
        let json = r#"{ "wrapping": "ClampToEdge", "filterMin": "Nearest" }"#;
        let attributes: TextureAttributes = serde_json::from_str(json).unwrap();
        assert_eq!(attributes.wrapping, TextureWrapping::ClampToEdge);
        assert_eq!(attributes.filter_min, TextureFiltering::Nearest);
        assert_eq!(attributes.filter_mag, TextureFiltering::Linear);
    }

    #[test]
    fn test_format_classes() {
        assert!(ColorFormat::RgbaCompressed.is_compressed());
        assert!(!ColorFormat::Rgba.is_compressed());
        assert!(ColorFormat::DepthStencil.is_depth());
        assert!(!ColorFormat::R32F.is_depth());
    }
}
