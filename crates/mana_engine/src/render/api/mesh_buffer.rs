//! Mesh buffer capability

use std::any::Any;

use crate::render::primitives::Primitive;

/// GPU resident vertex and index data created by a `RenderAllocator`
///
/// Instanced buffers carry one model matrix per instance; plain buffers
/// report a single instance.
pub trait MeshBuffer: Any {
    /// Primitive assembly, always `Tri` for buffers created by an allocator
    fn primitive(&self) -> Primitive;

    /// Number of elements drawn per instance
    fn element_count(&self) -> usize;

    /// Number of instances drawn
    fn instance_count(&self) -> usize {
        1
    }

    /// Whether the buffer carries a per-instance transform buffer
    fn is_instanced(&self) -> bool {
        false
    }

    /// Concrete backend type
    fn as_any(&self) -> &dyn Any;
}
