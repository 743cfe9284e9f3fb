//! Image decoding through the `image` crate

use image::ImageFormat;
use log::debug;

use super::AssetError;
use crate::render::primitives::{ColorRGBA, Image, ImageRGBA};

/// Decode a PNG into 8-bit RGBA, rows top to bottom
pub fn decode_png(bytes: &[u8], path: &str) -> Result<ImageRGBA, AssetError> {
    let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)
        .map_err(|e| AssetError::Decode {
            path: path.to_string(),
            reason: e.to_string(),
        })?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    let pixels = decoded
        .pixels()
        .map(|pixel| ColorRGBA::new(pixel[0], pixel[1], pixel[2], pixel[3]))
        .collect();

    debug!("Decoded {}x{} image {}", width, height, path);
    Image::from_pixels(width, height, pixels).ok_or_else(|| AssetError::Decode {
        path: path.to_string(),
        reason: "pixel count does not match the image size".to_string(),
    })
}

/// Encode an RGBA image as PNG
pub fn encode_png(image: &ImageRGBA) -> Result<Vec<u8>, AssetError> {
    let buffer = image::RgbaImage::from_raw(image.width(), image.height(), image.as_bytes().to_vec())
        .ok_or_else(|| AssetError::Decode {
            path: String::new(),
            reason: "pixel count does not match the image size".to_string(),
        })?;
    let mut bytes = std::io::Cursor::new(Vec::new());
    buffer
        .write_to(&mut bytes, ImageFormat::Png)
        .map_err(|e| AssetError::Decode {
            path: String::new(),
            reason: e.to_string(),
        })?;
    Ok(bytes.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_decodes_to_rgba() {
        let mut image = ImageRGBA::solid(3, 2, ColorRGBA::WHITE);
        image.set(2, 1, ColorRGBA::new(255, 0, 0, 128));
        let bytes = encode_png(&image).unwrap();

        let decoded = decode_png(&bytes, "test.png").unwrap();
        assert_eq!(decoded.width(), 3);
        assert_eq!(decoded.height(), 2);
        assert_eq!(decoded.get(2, 1), Some(&ColorRGBA::new(255, 0, 0, 128)));
        assert_eq!(decoded.get(0, 0), Some(&ColorRGBA::WHITE));
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(
            decode_png(b"not a png", "broken.png"),
            Err(AssetError::Decode { .. })
        ));
    }
}
