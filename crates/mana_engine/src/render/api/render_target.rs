//! Render target capability
//!
//! A render target is a framebuffer: a size plus texture attachments at
//! indexed color slots and a depth, stencil or combined depth-stencil slot.
//! Attached textures must match the target size.

use std::any::Any;

use super::texture_buffer::{CubeMapFace, TextureBuffer, TextureFiltering};
use crate::foundation::math::Vec2i;
use crate::render::{BackendResult, RenderError};

/// Region of a blit: offset and extent in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitRect {
    /// Lower left corner
    pub offset: Vec2i,
    /// Width and height
    pub size: Vec2i,
}

impl BlitRect {
    /// Region at `offset` of `size`
    pub const fn new(offset: Vec2i, size: Vec2i) -> Self {
        Self { offset, size }
    }

    /// Region covering a whole target of `size`
    pub fn full(size: Vec2i) -> Self {
        Self::new(Vec2i::zeros(), size)
    }
}

/// Framebuffer created by a `RenderAllocator`
pub trait RenderTarget: Any {
    /// Size in pixels
    fn size(&self) -> Vec2i;

    /// Bind `texture` to color slot `index`
    fn attach_color(&mut self, index: usize, texture: &dyn TextureBuffer) -> BackendResult<()>;

    /// Bind one face of a cube map to color slot `index`
    fn attach_color_cube_face(
        &mut self,
        index: usize,
        texture: &dyn TextureBuffer,
        face: CubeMapFace,
    ) -> BackendResult<()>;

    /// Unbind color slot `index`
    fn detach_color(&mut self, index: usize);

    /// Number of color slots drawn to; slots past the count are dropped
    fn set_color_attachment_count(&mut self, count: usize);

    /// Number of color slots drawn to
    fn color_attachment_count(&self) -> usize;

    /// Bind a depth texture
    fn attach_depth(&mut self, texture: &dyn TextureBuffer) -> BackendResult<()>;

    /// Bind a depth texture using only its stencil
    fn attach_stencil(&mut self, texture: &dyn TextureBuffer) -> BackendResult<()>;

    /// Bind a depth-stencil texture to both slots
    fn attach_depth_stencil(&mut self, texture: &dyn TextureBuffer) -> BackendResult<()>;

    /// Bind one face of a depth cube map
    fn attach_depth_cube_face(
        &mut self,
        texture: &dyn TextureBuffer,
        face: CubeMapFace,
    ) -> BackendResult<()>;

    /// Unbind the depth slot
    fn detach_depth(&mut self);

    /// Unbind the stencil slot
    fn detach_stencil(&mut self);

    /// Unbind depth and stencil
    fn detach_depth_stencil(&mut self) {
        self.detach_depth();
        self.detach_stencil();
    }

    /// Copy color from `source` attachment 0 into every color attachment
    fn blit_color(
        &mut self,
        source: &dyn RenderTarget,
        source_rect: BlitRect,
        target_rect: BlitRect,
        filter: TextureFiltering,
    ) -> BackendResult<()>;

    /// Copy depth from `source`
    fn blit_depth(
        &mut self,
        source: &dyn RenderTarget,
        source_rect: BlitRect,
        target_rect: BlitRect,
    ) -> BackendResult<()>;

    /// Copy stencil from `source`
    fn blit_stencil(
        &mut self,
        source: &dyn RenderTarget,
        source_rect: BlitRect,
        target_rect: BlitRect,
    ) -> BackendResult<()>;

    /// Concrete backend type
    fn as_any(&self) -> &dyn Any;
}

/// Check a blit against both target sizes
///
/// Offsets and sizes must be non-negative and every rect must lie inside its
/// target.
pub fn validate_blit(
    source_size: Vec2i,
    target_size: Vec2i,
    source_rect: &BlitRect,
    target_rect: &BlitRect,
) -> BackendResult<()> {
    check_rect("source", source_size, source_rect)?;
    check_rect("target", target_size, target_rect)
}

fn check_rect(side: &str, bounds: Vec2i, rect: &BlitRect) -> BackendResult<()> {
    if rect.offset.x < 0 || rect.offset.y < 0 {
        return Err(RenderError::InvalidBlit(format!(
            "negative {side} offset {}x{}",
            rect.offset.x, rect.offset.y
        )));
    }
    if rect.size.x < 0 || rect.size.y < 0 {
        return Err(RenderError::InvalidBlit(format!(
            "negative {side} rect {}x{}",
            rect.size.x, rect.size.y
        )));
    }
    if rect.offset.x + rect.size.x > bounds.x || rect.offset.y + rect.size.y > bounds.y {
        return Err(RenderError::InvalidBlit(format!(
            "{side} rect {}x{} at {}x{} exceeds {}x{}",
            rect.size.x, rect.size.y, rect.offset.x, rect.offset.y, bounds.x, bounds.y
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_blit_accepts_full_rect() {
        let size = Vec2i::new(4, 4);
        assert!(validate_blit(size, size, &BlitRect::full(size), &BlitRect::full(size)).is_ok());
    }

    #[test]
    fn test_validate_blit_rejects_negative_offset() {
        let size = Vec2i::new(4, 4);
        let source = BlitRect::new(Vec2i::new(-1, 0), Vec2i::new(2, 2));
        let result = validate_blit(size, size, &source, &BlitRect::full(size));
        assert!(matches!(result, Err(RenderError::InvalidBlit(_))));
    }

    #[test]
    fn test_validate_blit_rejects_overflow() {
        let size = Vec2i::new(4, 4);
        let target = BlitRect::new(Vec2i::new(3, 0), Vec2i::new(2, 2));
        let result = validate_blit(size, size, &BlitRect::full(Vec2i::new(2, 2)), &target);
        assert!(matches!(result, Err(RenderError::InvalidBlit(_))));
    }
}
