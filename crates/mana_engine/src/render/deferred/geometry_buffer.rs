//! # Geometry Buffer
//!
//! Named texture slots backed by one render target. Passes register the slots
//! they need in `prepare_buffer`, then bind a named subset before each draw:
//!
//! ```text
//! add_buffer("diffuse", Rgba) ──► allocate / set_size ──► attach_color(&["diffuse", ..])
//! ```
//!
//! Only one color list and one depth slot are bound at a time. Resizing
//! reallocates every slot and the target, then rebinds whatever was bound, so
//! a pass never sees attachments of the old size.

use std::collections::BTreeMap;

use log::{debug, trace};

use crate::foundation::math::Vec2i;
use crate::render::api::{
    ColorFormat, MeshBuffer, RenderAllocator, RenderTarget, TextureAttributes, TextureBuffer,
    TextureFiltering, TextureWrapping,
};
use crate::render::primitives::Mesh;
use crate::render::{BackendResult, RenderError};

/// Slot names shared by the built-in passes
pub mod names {
    /// World space position
    pub const POSITION: &str = "position";
    /// World space normal
    pub const NORMAL: &str = "normal";
    /// Material diffuse color
    pub const DIFFUSE: &str = "diffuse";
    /// Material ambient color
    pub const AMBIENT: &str = "ambient";
    /// Material specular color
    pub const SPECULAR: &str = "specular";
    /// Material shininess
    pub const SHININESS: &str = "shininess";
    /// Material emissive color
    pub const EMISSIVE: &str = "emissive";
    /// Nonzero where deferred geometry was drawn
    pub const ID: &str = "id";
    /// Skybox color
    pub const SKYBOX: &str = "skybox";
    /// Deferred depth and stencil
    pub const DEPTH: &str = "depth";
    /// Phong ambient term
    pub const PHONG_AMBIENT: &str = "phong_ambient";
    /// Phong diffuse term
    pub const PHONG_DIFFUSE: &str = "phong_diffuse";
    /// Phong specular term
    pub const PHONG_SPECULAR: &str = "phong_specular";
    /// Sum of the phong terms
    pub const PHONG_COMBINED: &str = "phong_combined";
    /// Single output of the lighting pass
    pub const LIGHTING: &str = "lighting";
    /// Forward shaded color
    pub const FORWARD: &str = "forward";
    /// Forward depth and stencil
    pub const FORWARD_DEPTH: &str = "forward_depth";
    /// Skybox, deferred and forward merged by depth
    pub const COMPOSITE: &str = "composite";
    /// Depth of the merged image
    pub const COMPOSITE_DEPTH: &str = "composite_depth";
    /// Debug overlay
    pub const DEBUG: &str = "debug";
    /// UI overlay
    pub const IMGUI: &str = "imgui";
}

struct Slot {
    format: ColorFormat,
    texture: Option<Box<dyn TextureBuffer>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DepthBinding {
    Depth(String),
    DepthStencil(String),
}

/// Off-screen multi attachment target used by the deferred passes
pub struct GeometryBuffer {
    size: Vec2i,
    render_target: Box<dyn RenderTarget>,
    buffers: BTreeMap<String, Slot>,
    bound_colors: Vec<String>,
    bound_depth: Option<DepthBinding>,
    screen_quad: Box<dyn MeshBuffer>,
}

fn slot_attributes(size: Vec2i, format: ColorFormat) -> TextureAttributes {
    TextureAttributes::new(size, format)
        .with_filter(TextureFiltering::Nearest)
        .with_wrapping(TextureWrapping::ClampToEdge)
}

fn texture<'b>(buffers: &'b BTreeMap<String, Slot>, name: &str) -> BackendResult<&'b dyn TextureBuffer> {
    let slot = buffers
        .get(name)
        .ok_or_else(|| RenderError::InvalidBuffer(name.to_string()))?;
    slot.texture
        .as_deref()
        .ok_or_else(|| RenderError::BufferNotAllocated(name.to_string()))
}

impl GeometryBuffer {
    /// Empty geometry buffer of `size` with its screen quad
    pub fn new(allocator: &mut dyn RenderAllocator, size: Vec2i) -> BackendResult<Self> {
        Ok(Self {
            size,
            render_target: allocator.create_render_target(size, 1)?,
            buffers: BTreeMap::new(),
            bound_colors: Vec::new(),
            bound_depth: None,
            screen_quad: allocator.create_mesh_buffer(&Mesh::screen_quad())?,
        })
    }

    /// Register slot `name`
    ///
    /// Registering the same name with the same format again does nothing; a
    /// different format is a `BufferFormatConflict`. The backing texture is
    /// created by the next [`allocate`](Self::allocate) or
    /// [`set_size`](Self::set_size).
    pub fn add_buffer(&mut self, name: &str, format: ColorFormat) -> BackendResult<()> {
        if let Some(slot) = self.buffers.get(name) {
            if slot.format == format {
                return Ok(());
            }
            return Err(RenderError::BufferFormatConflict { name: name.to_string() });
        }
        trace!("Registering geometry buffer slot {name} as {format:?}");
        self.buffers.insert(name.to_string(), Slot { format, texture: None });
        Ok(())
    }

    /// Whether `name` was registered
    pub fn has_buffer(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    /// Registered slot names in sorted order
    pub fn buffer_names(&self) -> impl Iterator<Item = &str> {
        self.buffers.keys().map(String::as_str)
    }

    /// Create the textures of slots registered since the last allocation
    pub fn allocate(&mut self, allocator: &mut dyn RenderAllocator) -> BackendResult<()> {
        for (name, slot) in &mut self.buffers {
            if slot.texture.is_none() {
                debug!("Allocating geometry buffer slot {name} at {}x{}", self.size.x, self.size.y);
                slot.texture = Some(allocator.create_texture_buffer(slot_attributes(self.size, slot.format))?);
            }
        }
        Ok(())
    }

    /// Texture of slot `name`
    pub fn buffer(&self, name: &str) -> BackendResult<&dyn TextureBuffer> {
        texture(&self.buffers, name)
    }

    /// Textures of several slots, in the order given
    pub fn buffers(&self, names: &[&str]) -> BackendResult<Vec<&dyn TextureBuffer>> {
        names.iter().map(|name| self.buffer(name)).collect()
    }

    /// Current size
    pub const fn size(&self) -> Vec2i {
        self.size
    }

    /// Resize every slot and the render target
    ///
    /// Unchanged size with every slot allocated is a no-op. Otherwise the
    /// target is recreated, all slots are reallocated at `size` and the bound
    /// color list and depth slot are attached again. A failed allocation
    /// leaves the buffer at its previous size and bindings.
    pub fn set_size(&mut self, allocator: &mut dyn RenderAllocator, size: Vec2i) -> BackendResult<()> {
        let allocated = self.buffers.values().all(|slot| slot.texture.is_some());
        if size == self.size && allocated {
            return Ok(());
        }
        debug!(
            "Resizing geometry buffer from {}x{} to {}x{}",
            self.size.x, self.size.y, size.x, size.y
        );

        let textures = self
            .buffers
            .values()
            .map(|slot| allocator.create_texture_buffer(slot_attributes(size, slot.format)))
            .collect::<BackendResult<Vec<_>>>()?;
        let render_target = allocator.create_render_target(size, 1)?;

        let colors = std::mem::take(&mut self.bound_colors);
        let depth = self.bound_depth.take();
        self.detach_color();
        self.render_target.detach_depth_stencil();

        self.size = size;
        for (slot, texture) in self.buffers.values_mut().zip(textures) {
            slot.texture = Some(texture);
        }
        self.render_target = render_target;

        match depth {
            Some(DepthBinding::Depth(name)) => self.attach_depth(&name)?,
            Some(DepthBinding::DepthStencil(name)) => self.attach_depth_stencil(&name)?,
            None => {}
        }
        let colors: Vec<&str> = colors.iter().map(String::as_str).collect();
        self.attach_color(&colors)
    }

    /// Bind exactly `names` as the color attachments, slot index = list index
    ///
    /// Every name is checked before anything is rebound; on error the
    /// previous binding is left intact.
    pub fn attach_color(&mut self, names: &[&str]) -> BackendResult<()> {
        for name in names {
            let texture = texture(&self.buffers, name)?;
            if texture.attributes().format.is_depth() {
                return Err(RenderError::InvalidFormat(format!("{name} is a depth buffer")));
            }
        }

        self.detach_color();
        self.render_target.set_color_attachment_count(names.len());
        for (index, name) in names.iter().enumerate() {
            self.render_target.attach_color(index, texture(&self.buffers, name)?)?;
        }
        self.bound_colors = names.iter().map(|name| (*name).to_string()).collect();
        trace!("Geometry buffer colors bound: {names:?}");
        Ok(())
    }

    /// Unbind every color attachment
    pub fn detach_color(&mut self) {
        for index in 0..self.render_target.color_attachment_count() {
            self.render_target.detach_color(index);
        }
        self.render_target.set_color_attachment_count(0);
        self.bound_colors.clear();
    }

    /// Bind a `DepthStencil` slot to the depth and stencil attachment points
    pub fn attach_depth_stencil(&mut self, name: &str) -> BackendResult<()> {
        let texture = texture(&self.buffers, name)?;
        if texture.attributes().format != ColorFormat::DepthStencil {
            return Err(RenderError::InvalidFormat(format!("{name} is not a depth-stencil buffer")));
        }
        self.render_target.detach_depth_stencil();
        self.render_target.attach_depth_stencil(texture)?;
        self.bound_depth = Some(DepthBinding::DepthStencil(name.to_string()));
        trace!("Geometry buffer depth-stencil bound: {name}");
        Ok(())
    }

    /// Bind a depth slot to the depth attachment point only
    pub fn attach_depth(&mut self, name: &str) -> BackendResult<()> {
        let texture = texture(&self.buffers, name)?;
        self.render_target.detach_depth_stencil();
        self.render_target.attach_depth(texture)?;
        self.bound_depth = Some(DepthBinding::Depth(name.to_string()));
        trace!("Geometry buffer depth bound: {name}");
        Ok(())
    }

    /// Unbind depth and stencil
    pub fn detach_depth_stencil(&mut self) {
        self.render_target.detach_depth_stencil();
        self.bound_depth = None;
    }

    /// Names currently bound as color attachments
    pub fn bound_colors(&self) -> &[String] {
        &self.bound_colors
    }

    /// The backing render target
    pub fn render_target(&self) -> &dyn RenderTarget {
        self.render_target.as_ref()
    }

    /// Full-screen quad for screen space passes
    pub fn screen_quad(&self) -> &dyn MeshBuffer {
        self.screen_quad.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::RenderDevice;
    use crate::render::backends::software::SoftwareDevice;

    fn gbuffer(device: &mut SoftwareDevice, size: Vec2i) -> GeometryBuffer {
        let mut gbuffer = GeometryBuffer::new(device.allocator(), size).unwrap();
        gbuffer.add_buffer(names::DIFFUSE, ColorFormat::Rgba).unwrap();
        gbuffer.add_buffer(names::POSITION, ColorFormat::Rgba32F).unwrap();
        gbuffer.add_buffer(names::DEPTH, ColorFormat::DepthStencil).unwrap();
        gbuffer.allocate(device.allocator()).unwrap();
        gbuffer
    }

    #[test]
    fn test_attached_color_matches_buffer_size() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(8, 4);
        let mut gbuffer = gbuffer(&mut device, size);

        for name in [names::DIFFUSE, names::POSITION] {
            gbuffer.attach_color(&[name]).unwrap();
            assert_eq!(gbuffer.render_target().size(), gbuffer.size());
            assert_eq!(gbuffer.render_target().color_attachment_count(), 1);
        }
    }

    #[test]
    fn test_failed_resize_keeps_previous_state() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(4, 4);
        let mut gbuffer = gbuffer(&mut device, size);
        gbuffer.attach_color(&[names::DIFFUSE, names::POSITION]).unwrap();

        let result = gbuffer.set_size(device.allocator(), Vec2i::new(-1, 4));
        assert!(matches!(result, Err(RenderError::ResourceCreationFailed(_))));

        assert_eq!(gbuffer.size(), size);
        assert_eq!(gbuffer.render_target().size(), size);
        assert_eq!(gbuffer.render_target().color_attachment_count(), 2);
        for name in [names::DIFFUSE, names::POSITION, names::DEPTH] {
            assert_eq!(gbuffer.buffer(name).unwrap().size(), size);
        }
    }

    #[test]
    fn test_resize_reallocates_every_slot() {
        let mut device = SoftwareDevice::new();
        let mut gbuffer = gbuffer(&mut device, Vec2i::new(4, 4));
        gbuffer.attach_color(&[names::DIFFUSE, names::POSITION]).unwrap();
        gbuffer.attach_depth_stencil(names::DEPTH).unwrap();

        let size = Vec2i::new(16, 9);
        gbuffer.set_size(device.allocator(), size).unwrap();

        assert_eq!(gbuffer.size(), size);
        assert_eq!(gbuffer.render_target().size(), size);
        for name in [names::DIFFUSE, names::POSITION, names::DEPTH] {
            assert_eq!(gbuffer.buffer(name).unwrap().size(), size);
        }
        assert_eq!(gbuffer.bound_colors(), &[names::DIFFUSE.to_string(), names::POSITION.to_string()]);
        assert_eq!(gbuffer.render_target().color_attachment_count(), 2);
    }

    #[test]
    fn test_resize_to_same_size_keeps_textures() {
        let mut device = SoftwareDevice::new();
        let size = Vec2i::new(4, 4);
        let mut gbuffer = gbuffer(&mut device, size);
        let before = gbuffer.buffer(names::DIFFUSE).unwrap() as *const dyn TextureBuffer as *const u8;
        gbuffer.set_size(device.allocator(), size).unwrap();
        let after = gbuffer.buffer(names::DIFFUSE).unwrap() as *const dyn TextureBuffer as *const u8;
        assert_eq!(before, after);
    }

    #[test]
    fn test_add_buffer_is_idempotent() {
        let mut device = SoftwareDevice::new();
        let mut gbuffer = gbuffer(&mut device, Vec2i::new(2, 2));
        gbuffer.add_buffer(names::DIFFUSE, ColorFormat::Rgba).unwrap();
        assert_eq!(gbuffer.buffer_names().filter(|name| *name == names::DIFFUSE).count(), 1);

        let conflict = gbuffer.add_buffer(names::DIFFUSE, ColorFormat::R32F);
        assert!(matches!(conflict, Err(RenderError::BufferFormatConflict { .. })));
    }

    #[test]
    fn test_unknown_and_unallocated_names() {
        let mut device = SoftwareDevice::new();
        let mut gbuffer = gbuffer(&mut device, Vec2i::new(2, 2));
        assert!(matches!(gbuffer.attach_color(&["missing"]), Err(RenderError::InvalidBuffer(_))));

        gbuffer.add_buffer(names::EMISSIVE, ColorFormat::Rgba).unwrap();
        assert!(matches!(
            gbuffer.attach_color(&[names::EMISSIVE]),
            Err(RenderError::BufferNotAllocated(_))
        ));
    }

    #[test]
    fn test_failed_attach_keeps_previous_binding() {
        let mut device = SoftwareDevice::new();
        let mut gbuffer = gbuffer(&mut device, Vec2i::new(2, 2));
        gbuffer.attach_color(&[names::DIFFUSE]).unwrap();
        assert!(gbuffer.attach_color(&[names::POSITION, "missing"]).is_err());
        assert_eq!(gbuffer.bound_colors(), &[names::DIFFUSE.to_string()]);
    }

    #[test]
    fn test_depth_stencil_requires_format() {
        let mut device = SoftwareDevice::new();
        let mut gbuffer = gbuffer(&mut device, Vec2i::new(2, 2));
        assert!(matches!(
            gbuffer.attach_depth_stencil(names::DIFFUSE),
            Err(RenderError::InvalidFormat(_))
        ));
        assert!(matches!(gbuffer.attach_color(&[names::DEPTH]), Err(RenderError::InvalidFormat(_))));
        gbuffer.attach_depth_stencil(names::DEPTH).unwrap();
    }
}
