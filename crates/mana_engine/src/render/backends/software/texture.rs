//! CPU texture storage and sampling
//!
//! Every texel is kept as a `Vec4` and quantized to the texture format when
//! written, so reads observe exactly what the format can hold. Row zero is
//! the bottom row; `v = 0` samples it.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::foundation::math::{Vec2, Vec2i, Vec3, Vec4};
use crate::render::api::{
    ColorFormat, CubeMapFace, TextureAttributes, TextureBuffer, TextureFiltering, TextureType,
    TextureWrapping,
};
use crate::render::primitives::{color::snorm_byte, ColorRGB, ColorRGBA, Image, ImageRGBA};
use crate::render::{BackendResult, RenderError};

/// Texel storage shared between a texture and the targets it is attached to
#[derive(Debug, Clone)]
pub(crate) struct TextureData {
    pub(crate) attributes: TextureAttributes,
    /// One face for 2D textures, six for cube maps
    pub(crate) faces: Vec<Vec<Vec4>>,
}

impl TextureData {
    pub(crate) fn new(attributes: TextureAttributes) -> Self {
        let face_count = match attributes.texture_type {
            TextureType::Texture2D => 1,
            TextureType::CubeMap => 6,
        };
        let clear = initial_texel(attributes.format);
        let texels = texel_count(attributes.size);
        Self {
            attributes,
            faces: vec![vec![clear; texels]; face_count],
        }
    }

    pub(crate) fn size(&self) -> Vec2i {
        self.attributes.size
    }

    pub(crate) fn format(&self) -> ColorFormat {
        self.attributes.format
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        let size = self.attributes.size;
        (x >= 0 && y >= 0 && x < size.x && y < size.y)
            .then(|| (y as usize) * (size.x as usize) + (x as usize))
    }

    /// Raw texel fetch, `None` outside the face
    pub(crate) fn fetch(&self, face: usize, x: i32, y: i32) -> Option<Vec4> {
        let index = self.index(x, y)?;
        self.faces.get(face).map(|texels| texels[index])
    }

    /// Quantize and store one texel. Out of range writes are dropped.
    pub(crate) fn store(&mut self, face: usize, x: i32, y: i32, value: &Vec4) {
        let format = self.attributes.format;
        if let Some(index) = self.index(x, y) {
            if let Some(face_texels) = self.faces.get_mut(face) {
                face_texels[index] = quantize(format, value);
            }
        }
    }

    /// Overwrite only the stencil component of a depth-stencil texel
    pub(crate) fn store_stencil(&mut self, face: usize, x: i32, y: i32, stencil: f32) {
        if let Some(index) = self.index(x, y) {
            if let Some(face_texels) = self.faces.get_mut(face) {
                face_texels[index].y = stencil.clamp(0.0, 255.0).round();
            }
        }
    }

    /// Fill a whole face
    pub(crate) fn clear(&mut self, face: usize, value: &Vec4) {
        let texel = quantize(self.attributes.format, value);
        if let Some(face_texels) = self.faces.get_mut(face) {
            face_texels.fill(texel);
        }
    }

    /// Fill the depth of a face, keeping stencil
    pub(crate) fn clear_depth(&mut self, face: usize, depth: f32) {
        if let Some(face_texels) = self.faces.get_mut(face) {
            for texel in face_texels {
                texel.x = depth.clamp(0.0, 1.0);
            }
        }
    }

    /// Fill the stencil of a face, keeping depth
    pub(crate) fn clear_stencil(&mut self, face: usize, stencil: u8) {
        if let Some(face_texels) = self.faces.get_mut(face) {
            for texel in face_texels {
                texel.y = f32::from(stencil);
            }
        }
    }

    fn reshape(&mut self, size: Vec2i) {
        if self.attributes.size != size {
            let clear = initial_texel(self.attributes.format);
            self.attributes.size = size;
            for face in &mut self.faces {
                *face = vec![clear; texel_count(size)];
            }
        }
    }

    /// Sample a 2D face at `uv` with the texture's wrapping and filter
    pub(crate) fn sample(&self, face: usize, uv: &Vec2) -> Vec4 {
        let size = self.attributes.size;
        if size.x <= 0 || size.y <= 0 {
            return Vec4::zeros();
        }
        let x = uv.x * size.x as f32;
        let y = uv.y * size.y as f32;
        match self.attributes.filter_mag {
            TextureFiltering::Nearest => self.wrapped(face, x.floor() as i32, y.floor() as i32),
            TextureFiltering::Linear => {
                let (fx, fy) = (x - 0.5, y - 0.5);
                let (x0, y0) = (fx.floor(), fy.floor());
                let (tx, ty) = (fx - x0, fy - y0);
                let (x0, y0) = (x0 as i32, y0 as i32);
                let bottom = self.wrapped(face, x0, y0).lerp(&self.wrapped(face, x0 + 1, y0), tx);
                let top = self
                    .wrapped(face, x0, y0 + 1)
                    .lerp(&self.wrapped(face, x0 + 1, y0 + 1), tx);
                bottom.lerp(&top, ty)
            }
        }
    }

    /// Sample a cube map by direction
    pub(crate) fn sample_cube(&self, direction: &Vec3) -> Vec4 {
        let (face, uv) = cube_face_uv(direction);
        let face = if self.faces.len() == 6 { face.index() } else { 0 };
        self.sample(face, &uv)
    }

    fn wrapped(&self, face: usize, x: i32, y: i32) -> Vec4 {
        let size = self.attributes.size;
        match self.attributes.wrapping {
            TextureWrapping::ClampToBorder => self.fetch(face, x, y).unwrap_or_else(Vec4::zeros),
            wrapping => {
                let x = wrap_coordinate(wrapping, x, size.x);
                let y = wrap_coordinate(wrapping, y, size.y);
                self.fetch(face, x, y).unwrap_or_else(Vec4::zeros)
            }
        }
    }
}

fn texel_count(size: Vec2i) -> usize {
    (size.x.max(0) as usize) * (size.y.max(0) as usize)
}

fn initial_texel(format: ColorFormat) -> Vec4 {
    match format {
        ColorFormat::Depth | ColorFormat::DepthStencil => Vec4::new(1.0, 0.0, 0.0, 1.0),
        _ => Vec4::zeros(),
    }
}

fn wrap_coordinate(wrapping: TextureWrapping, value: i32, extent: i32) -> i32 {
    match wrapping {
        TextureWrapping::Repeat => value.rem_euclid(extent),
        TextureWrapping::RepeatMirrored => {
            let period = value.rem_euclid(extent * 2);
            if period < extent {
                period
            } else {
                extent * 2 - 1 - period
            }
        }
        TextureWrapping::ClampToEdge | TextureWrapping::ClampToBorder => value.clamp(0, extent - 1),
    }
}

/// Cube face and face coordinates hit by `direction`
pub(crate) fn cube_face_uv(direction: &Vec3) -> (CubeMapFace, Vec2) {
    let (ax, ay, az) = (direction.x.abs(), direction.y.abs(), direction.z.abs());
    let (face, sc, tc, ma) = if ax >= ay && ax >= az {
        if direction.x >= 0.0 {
            (CubeMapFace::PositiveX, -direction.z, -direction.y, ax)
        } else {
            (CubeMapFace::NegativeX, direction.z, -direction.y, ax)
        }
    } else if ay >= az {
        if direction.y >= 0.0 {
            (CubeMapFace::PositiveY, direction.x, direction.z, ay)
        } else {
            (CubeMapFace::NegativeY, direction.x, -direction.z, ay)
        }
    } else if direction.z >= 0.0 {
        (CubeMapFace::PositiveZ, direction.x, -direction.y, az)
    } else {
        (CubeMapFace::NegativeZ, -direction.x, -direction.y, az)
    };

    if ma <= f32::EPSILON {
        return (face, Vec2::new(0.5, 0.5));
    }
    (face, Vec2::new((sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5))
}

/// Reduce `value` to what `format` can store
pub(crate) fn quantize(format: ColorFormat, value: &Vec4) -> Vec4 {
    let unorm8 = |v: f32| f32::from(snorm_byte(v)) / 255.0;
    match format {
        ColorFormat::Rgba | ColorFormat::RgbaCompressed => {
            Vec4::new(unorm8(value.x), unorm8(value.y), unorm8(value.z), unorm8(value.w))
        }
        ColorFormat::Rgb | ColorFormat::RgbCompressed => {
            Vec4::new(unorm8(value.x), unorm8(value.y), unorm8(value.z), 1.0)
        }
        ColorFormat::Rgba32F => *value,
        ColorFormat::R32F => Vec4::new(value.x, 0.0, 0.0, 1.0),
        ColorFormat::R8UI => Vec4::new(value.x.clamp(0.0, 255.0).round(), 0.0, 0.0, 1.0),
        ColorFormat::Depth => Vec4::new(value.x.clamp(0.0, 1.0), 0.0, 0.0, 1.0),
        ColorFormat::DepthStencil => {
            Vec4::new(value.x.clamp(0.0, 1.0), value.y.clamp(0.0, 255.0).round(), 0.0, 1.0)
        }
    }
}

/// The software texture behind `texture`, or `ForeignResource`
pub(crate) fn software_texture(texture: &dyn TextureBuffer) -> BackendResult<&SoftwareTexture> {
    texture
        .as_any()
        .downcast_ref::<SoftwareTexture>()
        .ok_or_else(|| RenderError::ForeignResource("texture buffer".to_string()))
}

/// Texture created by the software allocator
pub struct SoftwareTexture {
    attributes: TextureAttributes,
    pub(crate) data: Rc<RefCell<TextureData>>,
}

impl SoftwareTexture {
    pub(crate) fn new(attributes: TextureAttributes) -> Self {
        Self {
            attributes,
            data: Rc::new(RefCell::new(TextureData::new(attributes))),
        }
    }

    /// Raw texel of face 0, `None` outside the texture
    ///
    /// Values are what the format stores: normalized for 8-bit formats,
    /// integers for `R8UI`, depth in `x` and stencil in `y` for depth formats.
    pub fn texel(&self, x: i32, y: i32) -> Option<Vec4> {
        self.data.try_borrow().ok()?.fetch(0, x, y)
    }

    fn data_mut(&self) -> BackendResult<std::cell::RefMut<'_, TextureData>> {
        self.data
            .try_borrow_mut()
            .map_err(|_| RenderError::RenderingFailed("texture is in use by a draw".to_string()))
    }

    fn data(&self) -> BackendResult<std::cell::Ref<'_, TextureData>> {
        self.data
            .try_borrow()
            .map_err(|_| RenderError::RenderingFailed("texture is in use by a draw".to_string()))
    }

    fn check_uploadable(&self, kind: &str) -> BackendResult<()> {
        let format = self.attributes.format;
        if format.is_compressed() {
            return Err(RenderError::InvalidFormat(format!(
                "cannot upload {kind} image into compressed format {format:?}"
            )));
        }
        Ok(())
    }

    fn upload_2d(&mut self, width: u32, height: u32, texels: impl Iterator<Item = Vec4>) -> BackendResult<()> {
        if self.attributes.texture_type != TextureType::Texture2D {
            return Err(RenderError::InvalidFormat(
                "2D upload into a cube map, upload faces instead".to_string(),
            ));
        }
        let size = Vec2i::new(width as i32, height as i32);
        let mut data = self.data_mut()?;
        data.reshape(size);
        let format = data.attributes.format;
        for (slot, value) in data.faces[0].iter_mut().zip(texels) {
            *slot = quantize(format, &value);
        }
        drop(data);
        self.attributes.size = size;
        Ok(())
    }

    fn color_texel(&self, color: ColorRGBA) -> Vec4 {
        match self.attributes.format {
            ColorFormat::R8UI => Vec4::new(f32::from(color.r), 0.0, 0.0, 1.0),
            _ => color.to_vec4(),
        }
    }

    fn check_color_format(&self, kind: &str) -> BackendResult<()> {
        self.check_uploadable(kind)?;
        if self.attributes.format.is_depth() {
            return Err(RenderError::InvalidFormat(format!(
                "cannot upload {kind} image into depth format {:?}",
                self.attributes.format
            )));
        }
        Ok(())
    }
}

impl TextureBuffer for SoftwareTexture {
    fn attributes(&self) -> &TextureAttributes {
        &self.attributes
    }

    fn upload_rgba(&mut self, image: &ImageRGBA) -> BackendResult<()> {
        self.check_color_format("RGBA")?;
        let texels: Vec<Vec4> = image.pixels().iter().map(|c| self.color_texel(*c)).collect();
        self.upload_2d(image.width(), image.height(), texels.into_iter())
    }

    fn upload_rgb(&mut self, image: &Image<ColorRGB>) -> BackendResult<()> {
        self.check_color_format("RGB")?;
        let texels: Vec<Vec4> = image
            .pixels()
            .iter()
            .map(|c| self.color_texel(ColorRGBA::from(*c)))
            .collect();
        self.upload_2d(image.width(), image.height(), texels.into_iter())
    }

    fn upload_float(&mut self, image: &Image<f32>) -> BackendResult<()> {
        self.check_uploadable("float")?;
        let texels = image.pixels().iter().map(|v| Vec4::new(*v, 0.0, 0.0, 1.0));
        self.upload_2d(image.width(), image.height(), texels)
    }

    fn upload_cube_face(&mut self, face: CubeMapFace, image: &ImageRGBA) -> BackendResult<()> {
        self.check_color_format("cube face")?;
        if self.attributes.texture_type != TextureType::CubeMap {
            return Err(RenderError::InvalidFormat(
                "cube face upload into a 2D texture".to_string(),
            ));
        }
        let size = Vec2i::new(image.width() as i32, image.height() as i32);
        let texels: Vec<Vec4> = image.pixels().iter().map(|c| self.color_texel(*c)).collect();
        let mut data = self.data_mut()?;
        data.reshape(size);
        let format = data.attributes.format;
        for (slot, value) in data.faces[face.index()].iter_mut().zip(texels) {
            *slot = quantize(format, &value);
        }
        drop(data);
        self.attributes.size = size;
        Ok(())
    }

    fn download_rgba(&self) -> BackendResult<ImageRGBA> {
        if self.attributes.format.is_compressed() || self.attributes.texture_type != TextureType::Texture2D {
            return Err(RenderError::InvalidFormat(format!(
                "cannot download {:?} {:?} texture as RGBA",
                self.attributes.texture_type, self.attributes.format
            )));
        }
        let data = self.data()?;
        let size = data.size();
        let format = data.format();
        let pixels = data.faces[0]
            .iter()
            .map(|texel| match format {
                ColorFormat::Depth | ColorFormat::DepthStencil => {
                    ColorRGBA::from_vec4(&Vec4::new(texel.x, texel.x, texel.x, 1.0))
                }
                ColorFormat::R8UI => ColorRGBA::new(texel.x as u8, 0, 0, 255),
                _ => ColorRGBA::from_vec4(texel),
            })
            .collect();
        Image::from_pixels(size.x as u32, size.y as u32, pixels)
            .ok_or_else(|| RenderError::RenderingFailed("texture storage does not match its size".to_string()))
    }

    fn download_float(&self) -> BackendResult<Image<f32>> {
        if self.attributes.format.is_compressed() || self.attributes.texture_type != TextureType::Texture2D {
            return Err(RenderError::InvalidFormat(format!(
                "cannot download {:?} {:?} texture as float",
                self.attributes.texture_type, self.attributes.format
            )));
        }
        let data = self.data()?;
        let size = data.size();
        let pixels = data.faces[0].iter().map(|texel| texel.x).collect();
        Image::from_pixels(size.x as u32, size.y as u32, pixels)
            .ok_or_else(|| RenderError::RenderingFailed("texture storage does not match its size".to_string()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn rgba(size: i32) -> SoftwareTexture {
        SoftwareTexture::new(TextureAttributes::new(Vec2i::new(size, size), ColorFormat::Rgba))
    }

    #[test]
    fn test_rgba_round_trip() {
        let mut image = Image::solid(3, 2, ColorRGBA::new(10, 20, 30, 40));
        image.set(2, 1, ColorRGBA::new(255, 0, 128, 7));
        let mut texture = rgba(1);
        texture.upload_rgba(&image).unwrap();
        assert_eq!(texture.size(), Vec2i::new(3, 2));
        assert_eq!(texture.download_rgba().unwrap(), image);
    }

    #[test]
    fn test_compressed_upload_rejected() {
        let mut texture = SoftwareTexture::new(TextureAttributes::new(
            Vec2i::new(1, 1),
            ColorFormat::RgbaCompressed,
        ));
        let result = texture.upload_rgba(&Image::solid(1, 1, ColorRGBA::WHITE));
        assert!(matches!(result, Err(RenderError::InvalidFormat(_))));
    }

    #[test]
    fn test_float_upload_into_r32f() {
        let mut texture = SoftwareTexture::new(TextureAttributes::new(Vec2i::new(1, 1), ColorFormat::R32F));
        texture.upload_float(&Image::solid(2, 2, 32.5)).unwrap();
        let image = texture.download_float().unwrap();
        assert_eq!(image.get(1, 1), Some(&32.5));
    }

    #[test]
    fn test_face_upload_requires_cube_map() {
        let mut texture = rgba(1);
        let result = texture.upload_cube_face(CubeMapFace::PositiveX, &Image::solid(1, 1, ColorRGBA::WHITE));
        assert!(matches!(result, Err(RenderError::InvalidFormat(_))));
    }

    #[test]
    fn test_cube_sampling_picks_face() {
        let mut texture = SoftwareTexture::new(TextureAttributes::cube_map(Vec2i::new(1, 1), ColorFormat::Rgba));
        for (i, face) in CubeMapFace::ALL.iter().enumerate() {
            texture
                .upload_cube_face(*face, &Image::solid(1, 1, ColorRGBA::new(i as u8 * 40, 0, 0, 255)))
                .unwrap();
        }
        let data = texture.data.borrow();
        let sample = data.sample_cube(&Vec3::new(0.0, -1.0, 0.1));
        assert_relative_eq!(sample.x, 120.0 / 255.0, epsilon = 1e-6);
        let sample = data.sample_cube(&Vec3::new(0.2, 0.1, -3.0));
        assert_relative_eq!(sample.x, 200.0 / 255.0, epsilon = 1e-6);
    }

    #[test]
    fn test_linear_sampling_at_texel_center_is_exact() {
        let mut texture = rgba(1);
        let mut image = Image::solid(2, 1, ColorRGBA::BLACK);
        image.set(1, 0, ColorRGBA::WHITE);
        texture.upload_rgba(&image).unwrap();
        let data = texture.data.borrow();
        assert_relative_eq!(data.sample(0, &Vec2::new(0.75, 0.5)).x, 1.0);
        assert_relative_eq!(data.sample(0, &Vec2::new(0.5, 0.5)).x, 0.5);
    }

    #[test]
    fn test_wrapping_modes() {
        assert_eq!(wrap_coordinate(TextureWrapping::Repeat, -1, 4), 3);
        assert_eq!(wrap_coordinate(TextureWrapping::RepeatMirrored, 4, 4), 3);
        assert_eq!(wrap_coordinate(TextureWrapping::ClampToEdge, 9, 4), 3);
    }

    #[test]
    fn test_quantize_formats() {
        let v = Vec4::new(0.5, 2.0, -1.0, 0.25);
        assert_eq!(quantize(ColorFormat::R32F, &v), Vec4::new(0.5, 0.0, 0.0, 1.0));
        assert_eq!(quantize(ColorFormat::R8UI, &Vec4::new(1.2, 0.0, 0.0, 0.0)).x, 1.0);
        assert_eq!(quantize(ColorFormat::Depth, &v).x, 0.5);
        assert_eq!(quantize(ColorFormat::Rgba32F, &v), v);
    }
}
