//! 8-bit color values
//!
//! Colors are stored as bytes the way they appear in bundle descriptions and
//! images. Shading code converts them to normalized [`Vec4`] values.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{Vec3, Vec4};

/// RGB color with 8 bits per channel
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
pub struct ColorRGB {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
}

impl ColorRGB {
    /// Create a color from its channels
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Normalized channels
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(unorm(self.r), unorm(self.g), unorm(self.b))
    }
}

/// RGBA color with 8 bits per channel
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[derive(bytemuck::Pod, bytemuck::Zeroable)]
pub struct ColorRGBA {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel
    #[serde(default = "opaque")]
    pub a: u8,
}

const fn opaque() -> u8 {
    255
}

impl ColorRGBA {
    /// Opaque white
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    /// Opaque black
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    /// Fully transparent black
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Create a color from its channels
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Normalized channels
    pub fn to_vec4(self) -> Vec4 {
        Vec4::new(unorm(self.r), unorm(self.g), unorm(self.b), unorm(self.a))
    }

    /// Quantize normalized channels, clamping to `[0, 1]`
    pub fn from_vec4(value: &Vec4) -> Self {
        Self::new(snorm_byte(value.x), snorm_byte(value.y), snorm_byte(value.z), snorm_byte(value.w))
    }

    /// Drop the alpha channel
    pub const fn rgb(self) -> ColorRGB {
        ColorRGB::new(self.r, self.g, self.b)
    }
}

impl From<ColorRGB> for ColorRGBA {
    fn from(color: ColorRGB) -> Self {
        Self::new(color.r, color.g, color.b, 255)
    }
}

fn unorm(value: u8) -> f32 {
    f32::from(value) / 255.0
}

/// Normalized float to byte, rounding to nearest
pub(crate) fn snorm_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec4_conversion_is_exact_for_every_byte() {
        for value in 0..=255u8 {
            let color = ColorRGBA::new(value, 255 - value, value / 2, 255);
            assert_eq!(ColorRGBA::from_vec4(&color.to_vec4()), color);
        }
    }

    #[test]
    fn test_from_vec4_clamps() {
        let color = ColorRGBA::from_vec4(&Vec4::new(2.0, -1.0, 0.5, 1.0));
        assert_eq!(color, ColorRGBA::new(255, 0, 128, 255));
    }

    #[test]
    fn test_missing_alpha_deserializes_opaque() {
        let color: ColorRGBA = serde_json::from_str(r#"{"r":10,"g":20,"b":30}"#).unwrap();
        assert_eq!(color, ColorRGBA::new(10, 20, 30, 255));
    }

    #[test]
    fn test_cast_to_bytes() {
        let colors = [ColorRGBA::new(1, 2, 3, 4), ColorRGBA::new(5, 6, 7, 8)];
        let bytes: &[u8] = bytemuck::cast_slice(&colors);
        assert_eq!(bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
