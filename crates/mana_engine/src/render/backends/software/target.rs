//! CPU render targets
//!
//! A target only records which texture storage is bound where. Drawing
//! borrows the storage through the recorded attachments.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use super::texture::{software_texture, TextureData};
use crate::foundation::math::{Vec2i, Vec4};
use crate::render::api::{
    validate_blit, BlitRect, ColorFormat, CubeMapFace, RenderTarget, TextureBuffer,
    TextureFiltering, TextureType,
};
use crate::render::{BackendResult, RenderError};

/// A bound texture and the face drawn to
#[derive(Debug, Clone)]
pub(crate) struct Attachment {
    pub(crate) data: Rc<RefCell<TextureData>>,
    pub(crate) face: usize,
}

impl Attachment {
    pub(crate) fn same_storage(&self, other: &Attachment) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

/// Framebuffer created by the software allocator
#[derive(Debug)]
pub struct SoftwareRenderTarget {
    size: Vec2i,
    pub(crate) colors: Vec<Option<Attachment>>,
    color_count: usize,
    pub(crate) depth: Option<Attachment>,
    pub(crate) stencil: Option<Attachment>,
}

impl SoftwareRenderTarget {
    pub(crate) fn new(size: Vec2i) -> Self {
        Self {
            size,
            colors: Vec::new(),
            color_count: 0,
            depth: None,
            stencil: None,
        }
    }

    /// Color attachments drawn to, indexed by fragment output
    pub(crate) fn drawn_colors(&self) -> impl Iterator<Item = (usize, &Attachment)> {
        self.colors
            .iter()
            .take(self.color_count)
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|attachment| (index, attachment)))
    }

    fn attachment(
        &self,
        texture: &dyn TextureBuffer,
        face: Option<CubeMapFace>,
        slot: &str,
    ) -> BackendResult<Attachment> {
        let texture = software_texture(texture)?;
        let attributes = texture.attributes();
        if attributes.size != self.size {
            return Err(RenderError::IncompleteTarget(format!(
                "{slot} attachment is {}x{}, target is {}x{}",
                attributes.size.x, attributes.size.y, self.size.x, self.size.y
            )));
        }
        let face = match (face, attributes.texture_type) {
            (None, TextureType::Texture2D) => 0,
            (Some(face), TextureType::CubeMap) => face.index(),
            (None, TextureType::CubeMap) => {
                return Err(RenderError::InvalidFormat(format!(
                    "{slot} attachment of a cube map needs a face"
                )))
            }
            (Some(_), TextureType::Texture2D) => {
                return Err(RenderError::InvalidFormat(format!(
                    "{slot} face attachment of a 2D texture"
                )))
            }
        };
        Ok(Attachment {
            data: Rc::clone(&texture.data),
            face,
        })
    }

    fn color_attachment(
        &mut self,
        index: usize,
        texture: &dyn TextureBuffer,
        face: Option<CubeMapFace>,
    ) -> BackendResult<()> {
        if texture.attributes().format.is_depth() {
            return Err(RenderError::InvalidFormat(format!(
                "color slot {index} cannot hold a {:?} texture",
                texture.attributes().format
            )));
        }
        let attachment = self.attachment(texture, face, "color")?;
        if self.colors.len() <= index {
            self.colors.resize(index + 1, None);
        }
        self.colors[index] = Some(attachment);
        self.color_count = self.color_count.max(index + 1);
        trace!("Attached color slot {index}");
        Ok(())
    }

    fn depth_attachment(
        &self,
        texture: &dyn TextureBuffer,
        face: Option<CubeMapFace>,
        require_stencil: bool,
    ) -> BackendResult<Attachment> {
        let format = texture.attributes().format;
        let accepted = if require_stencil {
            format == ColorFormat::DepthStencil
        } else {
            format.is_depth()
        };
        if !accepted {
            return Err(RenderError::InvalidFormat(format!(
                "{format:?} texture in a {} slot",
                if require_stencil { "stencil" } else { "depth" }
            )));
        }
        self.attachment(texture, face, "depth")
    }

    fn source(source: &dyn RenderTarget) -> BackendResult<&SoftwareRenderTarget> {
        source
            .as_any()
            .downcast_ref::<SoftwareRenderTarget>()
            .ok_or_else(|| RenderError::ForeignResource("render target".to_string()))
    }
}

/// Texels of `rect` in `attachment`, read before any write so a target can
/// blit onto itself
fn read_rect(attachment: &Attachment, rect: &BlitRect) -> BackendResult<Vec<Vec4>> {
    let data = attachment
        .data
        .try_borrow()
        .map_err(|_| RenderError::RenderingFailed("blit source is being drawn".to_string()))?;
    let mut texels = Vec::with_capacity((rect.size.x * rect.size.y).max(0) as usize);
    for y in 0..rect.size.y {
        for x in 0..rect.size.x {
            let texel = data
                .fetch(attachment.face, rect.offset.x + x, rect.offset.y + y)
                .unwrap_or_else(Vec4::zeros);
            texels.push(texel);
        }
    }
    Ok(texels)
}

/// Sample a rect read by `read_rect` at continuous coordinates
fn sample_rect(texels: &[Vec4], size: Vec2i, x: f32, y: f32, filter: TextureFiltering) -> Vec4 {
    let fetch = |x: i32, y: i32| {
        let x = x.clamp(0, size.x - 1);
        let y = y.clamp(0, size.y - 1);
        texels[(y * size.x + x) as usize]
    };
    match filter {
        TextureFiltering::Nearest => fetch(x.floor() as i32, y.floor() as i32),
        TextureFiltering::Linear => {
            let (fx, fy) = (x - 0.5, y - 0.5);
            let (x0, y0) = (fx.floor(), fy.floor());
            let (tx, ty) = (fx - x0, fy - y0);
            let (x0, y0) = (x0 as i32, y0 as i32);
            let bottom = fetch(x0, y0).lerp(&fetch(x0 + 1, y0), tx);
            let top = fetch(x0, y0 + 1).lerp(&fetch(x0 + 1, y0 + 1), tx);
            bottom.lerp(&top, ty)
        }
    }
}

/// Scale `source_rect` onto `target_rect`, writing through `write`
fn blit(
    source: &Attachment,
    source_rect: &BlitRect,
    target_rect: &BlitRect,
    filter: TextureFiltering,
    mut write: impl FnMut(i32, i32, Vec4),
) -> BackendResult<()> {
    if source_rect.size.x == 0 || source_rect.size.y == 0 {
        return Ok(());
    }
    let texels = read_rect(source, source_rect)?;
    let scale_x = source_rect.size.x as f32 / target_rect.size.x.max(1) as f32;
    let scale_y = source_rect.size.y as f32 / target_rect.size.y.max(1) as f32;
    for y in 0..target_rect.size.y {
        for x in 0..target_rect.size.x {
            let sx = (x as f32 + 0.5) * scale_x;
            let sy = (y as f32 + 0.5) * scale_y;
            let value = sample_rect(&texels, source_rect.size, sx, sy, filter);
            write(target_rect.offset.x + x, target_rect.offset.y + y, value);
        }
    }
    Ok(())
}

fn borrow_target(attachment: &Attachment) -> BackendResult<std::cell::RefMut<'_, TextureData>> {
    attachment
        .data
        .try_borrow_mut()
        .map_err(|_| RenderError::RenderingFailed("blit target is being drawn".to_string()))
}

impl RenderTarget for SoftwareRenderTarget {
    fn size(&self) -> Vec2i {
        self.size
    }

    fn attach_color(&mut self, index: usize, texture: &dyn TextureBuffer) -> BackendResult<()> {
        self.color_attachment(index, texture, None)
    }

    fn attach_color_cube_face(
        &mut self,
        index: usize,
        texture: &dyn TextureBuffer,
        face: CubeMapFace,
    ) -> BackendResult<()> {
        self.color_attachment(index, texture, Some(face))
    }

    fn detach_color(&mut self, index: usize) {
        if let Some(slot) = self.colors.get_mut(index) {
            *slot = None;
        }
    }

    fn set_color_attachment_count(&mut self, count: usize) {
        self.color_count = count;
    }

    fn color_attachment_count(&self) -> usize {
        self.color_count
    }

    fn attach_depth(&mut self, texture: &dyn TextureBuffer) -> BackendResult<()> {
        self.depth = Some(self.depth_attachment(texture, None, false)?);
        Ok(())
    }

    fn attach_stencil(&mut self, texture: &dyn TextureBuffer) -> BackendResult<()> {
        self.stencil = Some(self.depth_attachment(texture, None, true)?);
        Ok(())
    }

    fn attach_depth_stencil(&mut self, texture: &dyn TextureBuffer) -> BackendResult<()> {
        let attachment = self.depth_attachment(texture, None, true)?;
        self.depth = Some(attachment.clone());
        self.stencil = Some(attachment);
        Ok(())
    }

    fn attach_depth_cube_face(
        &mut self,
        texture: &dyn TextureBuffer,
        face: CubeMapFace,
    ) -> BackendResult<()> {
        self.depth = Some(self.depth_attachment(texture, Some(face), false)?);
        Ok(())
    }

    fn detach_depth(&mut self) {
        self.depth = None;
    }

    fn detach_stencil(&mut self) {
        self.stencil = None;
    }

    fn blit_color(
        &mut self,
        source: &dyn RenderTarget,
        source_rect: BlitRect,
        target_rect: BlitRect,
        filter: TextureFiltering,
    ) -> BackendResult<()> {
        let source = Self::source(source)?;
        validate_blit(source.size, self.size, &source_rect, &target_rect)?;
        let from = source
            .colors
            .first()
            .and_then(Option::as_ref)
            .ok_or_else(|| RenderError::IncompleteTarget("blit source has no color attachment 0".to_string()))?;
        for (_, to) in self.drawn_colors() {
            let texels = {
                let mut staged = Vec::new();
                blit(from, &source_rect, &target_rect, filter, |x, y, value| staged.push((x, y, value)))?;
                staged
            };
            let mut data = borrow_target(to)?;
            for (x, y, value) in texels {
                data.store(to.face, x, y, &value);
            }
        }
        Ok(())
    }

    fn blit_depth(
        &mut self,
        source: &dyn RenderTarget,
        source_rect: BlitRect,
        target_rect: BlitRect,
    ) -> BackendResult<()> {
        let source = Self::source(source)?;
        validate_blit(source.size, self.size, &source_rect, &target_rect)?;
        let (from, to) = match (&source.depth, &self.depth) {
            (Some(from), Some(to)) => (from, to),
            _ => return Err(RenderError::IncompleteTarget("depth blit needs depth on both targets".to_string())),
        };
        let mut staged = Vec::new();
        blit(from, &source_rect, &target_rect, TextureFiltering::Nearest, |x, y, value| {
            staged.push((x, y, value.x))
        })?;
        let mut data = borrow_target(to)?;
        for (x, y, depth) in staged {
            let stencil = data.fetch(to.face, x, y).map_or(0.0, |texel| texel.y);
            data.store(to.face, x, y, &Vec4::new(depth, stencil, 0.0, 1.0));
        }
        Ok(())
    }

    fn blit_stencil(
        &mut self,
        source: &dyn RenderTarget,
        source_rect: BlitRect,
        target_rect: BlitRect,
    ) -> BackendResult<()> {
        let source = Self::source(source)?;
        validate_blit(source.size, self.size, &source_rect, &target_rect)?;
        let (from, to) = match (&source.stencil, &self.stencil) {
            (Some(from), Some(to)) => (from, to),
            _ => {
                return Err(RenderError::IncompleteTarget(
                    "stencil blit needs stencil on both targets".to_string(),
                ))
            }
        };
        let mut staged = Vec::new();
        blit(from, &source_rect, &target_rect, TextureFiltering::Nearest, |x, y, value| {
            staged.push((x, y, value.y))
        })?;
        let mut data = borrow_target(to)?;
        for (x, y, stencil) in staged {
            data.store_stencil(to.face, x, y, stencil);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::TextureAttributes;
    use crate::render::backends::software::texture::SoftwareTexture;
    use crate::render::primitives::{ColorRGBA, Image};

    fn texture(size: i32, format: ColorFormat) -> SoftwareTexture {
        SoftwareTexture::new(
            TextureAttributes::new(Vec2i::new(size, size), format).with_filter(TextureFiltering::Nearest),
        )
    }

    #[test]
    fn test_attach_rejects_size_mismatch() {
        let mut target = SoftwareRenderTarget::new(Vec2i::new(4, 4));
        let result = target.attach_color(0, &texture(2, ColorFormat::Rgba));
        assert!(matches!(result, Err(RenderError::IncompleteTarget(_))));
    }

    #[test]
    fn test_attach_color_extends_count() {
        let mut target = SoftwareRenderTarget::new(Vec2i::new(2, 2));
        target.attach_color(2, &texture(2, ColorFormat::Rgba)).unwrap();
        assert_eq!(target.color_attachment_count(), 3);
        assert_eq!(target.drawn_colors().count(), 1);
        target.set_color_attachment_count(1);
        assert_eq!(target.drawn_colors().count(), 0);
    }

    #[test]
    fn test_depth_stencil_needs_matching_format() {
        let mut target = SoftwareRenderTarget::new(Vec2i::new(2, 2));
        let result = target.attach_depth_stencil(&texture(2, ColorFormat::Depth));
        assert!(matches!(result, Err(RenderError::InvalidFormat(_))));
        target.attach_depth_stencil(&texture(2, ColorFormat::DepthStencil)).unwrap();
        assert!(target.depth.is_some() && target.stencil.is_some());
        target.detach_depth_stencil();
        assert!(target.depth.is_none() && target.stencil.is_none());
    }

    #[test]
    fn test_color_blit_scales_source() {
        let mut small = texture(1, ColorFormat::Rgba);
        small.upload_rgba(&Image::solid(1, 1, ColorRGBA::new(0, 255, 0, 255))).unwrap();
        let mut source = SoftwareRenderTarget::new(Vec2i::new(1, 1));
        source.attach_color(0, &small).unwrap();

        let large = texture(4, ColorFormat::Rgba);
        let mut target = SoftwareRenderTarget::new(Vec2i::new(4, 4));
        target.attach_color(0, &large).unwrap();
        target
            .blit_color(
                &source,
                BlitRect::full(Vec2i::new(1, 1)),
                BlitRect::full(Vec2i::new(4, 4)),
                TextureFiltering::Linear,
            )
            .unwrap();
        assert_eq!(large.texel(3, 3), Some(Vec4::new(0.0, 1.0, 0.0, 1.0)));
    }

    #[test]
    fn test_blit_rejects_negative_offset() {
        let mut source = SoftwareRenderTarget::new(Vec2i::new(2, 2));
        source.attach_color(0, &texture(2, ColorFormat::Rgba)).unwrap();
        let mut target = SoftwareRenderTarget::new(Vec2i::new(2, 2));
        let result = target.blit_color(
            &source,
            BlitRect::new(Vec2i::new(-1, 0), Vec2i::new(1, 1)),
            BlitRect::full(Vec2i::new(1, 1)),
            TextureFiltering::Nearest,
        );
        assert!(matches!(result, Err(RenderError::InvalidBlit(_))));
    }

    #[test]
    fn test_depth_blit_requires_depth() {
        let source = SoftwareRenderTarget::new(Vec2i::new(2, 2));
        let mut target = SoftwareRenderTarget::new(Vec2i::new(2, 2));
        let full = BlitRect::full(Vec2i::new(2, 2));
        let result = target.blit_depth(&source, full, full);
        assert!(matches!(result, Err(RenderError::IncompleteTarget(_))));
    }
}
