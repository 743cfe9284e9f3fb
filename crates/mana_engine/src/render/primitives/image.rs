//! CPU side images
//!
//! An [`Image`] is a row-major grid of pixels. Row zero is the first row of
//! the buffer; textures sample it at `v = 0`.

use super::color::ColorRGBA;

/// Row-major pixel buffer of `width * height` elements
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: u32,
    height: u32,
    pixels: Vec<T>,
}

impl<T: Clone> Image<T> {
    /// Image filled with one value
    pub fn solid(width: u32, height: u32, value: T) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; (width as usize) * (height as usize)],
        }
    }

    /// Pixel at `(x, y)`, `None` outside the image
    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        self.index(x, y).map(|i| &self.pixels[i])
    }

    /// Overwrite the pixel at `(x, y)`. Returns `false` outside the image.
    pub fn set(&mut self, x: u32, y: u32, value: T) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.pixels[i] = value;
                true
            }
            None => false,
        }
    }
}

impl<T> Image<T> {
    /// Wrap an existing pixel buffer.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<T>) -> Option<Self> {
        ((width as usize) * (height as usize) == pixels.len()).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Width in pixels
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// All pixels, row by row
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    /// Whether the image holds no pixels
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize) * (self.width as usize) + (x as usize))
    }
}

/// 8-bit RGBA image, the format decoded bundles carry
pub type ImageRGBA = Image<ColorRGBA>;

impl Image<ColorRGBA> {
    /// Raw bytes in RGBA order
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_get_set() {
        let mut image = Image::solid(3, 2, 0u8);
        assert_eq!(image.pixels().len(), 6);
        assert!(image.set(2, 1, 9));
        assert_eq!(image.get(2, 1), Some(&9));
        assert_eq!(image.pixels()[5], 9);
        assert!(!image.set(3, 0, 1));
        assert_eq!(image.get(0, 2), None);
    }

    #[test]
    fn test_from_pixels_checks_length() {
        assert!(Image::from_pixels(2, 2, vec![0u8; 3]).is_none());
        assert!(Image::from_pixels(2, 2, vec![0u8; 4]).is_some());
    }

    #[test]
    fn test_rgba_bytes() {
        let image = Image::solid(1, 2, ColorRGBA::new(1, 2, 3, 4));
        assert_eq!(image.as_bytes(), &[1, 2, 3, 4, 1, 2, 3, 4]);
    }
}
