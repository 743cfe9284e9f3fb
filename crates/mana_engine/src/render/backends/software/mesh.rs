//! CPU mesh buffers

use std::any::Any;

use crate::foundation::math::Mat4;
use crate::render::api::MeshBuffer;
use crate::render::primitives::{Mesh, Primitive, Vertex};
use crate::render::{BackendResult, RenderError};

/// Triangle list assembled from a [`Mesh`] at creation time
#[derive(Debug, Clone)]
pub struct SoftwareMeshBuffer {
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) triangles: Vec<[usize; 3]>,
    element_count: usize,
    /// Per-instance model matrices, `None` for plain buffers
    pub(crate) instances: Option<Vec<Mat4>>,
}

impl SoftwareMeshBuffer {
    /// Plain buffer drawn once with the command's model matrix
    pub(crate) fn new(mesh: &Mesh) -> BackendResult<Self> {
        Self::build(mesh, None)
    }

    /// Buffer drawn once per transform; no transforms draw nothing
    pub(crate) fn instanced(mesh: &Mesh, instances: &[Mat4]) -> BackendResult<Self> {
        Self::build(mesh, Some(instances.to_vec()))
    }

    fn build(mesh: &Mesh, instances: Option<Vec<Mat4>>) -> BackendResult<Self> {
        if mesh.primitive != Primitive::Tri {
            return Err(RenderError::UnsupportedPrimitive(format!(
                "{:?}, mesh buffers only accept Tri",
                mesh.primitive
            )));
        }
        if mesh.element_count() % 3 != 0 {
            return Err(RenderError::ResourceCreationFailed(format!(
                "{} elements do not form whole triangles",
                mesh.element_count()
            )));
        }

        let triangles = mesh.triangles();
        let vertex_count = mesh.vertices.len();
        if let Some(bad) = triangles.iter().flatten().find(|index| **index >= vertex_count) {
            return Err(RenderError::ResourceCreationFailed(format!(
                "index {bad} out of range for {vertex_count} vertices"
            )));
        }

        Ok(Self {
            vertices: mesh.vertices.clone(),
            triangles,
            element_count: mesh.element_count(),
            instances,
        })
    }

    /// Model matrices the buffer is drawn with, identity for plain buffers
    pub(crate) fn instance_transforms(&self) -> Vec<Mat4> {
        self.instances.clone().unwrap_or_else(|| vec![Mat4::identity()])
    }
}

impl MeshBuffer for SoftwareMeshBuffer {
    fn primitive(&self) -> Primitive {
        Primitive::Tri
    }

    fn element_count(&self) -> usize {
        self.element_count
    }

    fn instance_count(&self) -> usize {
        self.instances.as_ref().map_or(1, Vec::len)
    }

    fn is_instanced(&self) -> bool {
        self.instances.is_some()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_triangle_mesh() {
        let mesh = Mesh::from_vertices(Primitive::Line, vec![Vertex::default(); 2]);
        let result = SoftwareMeshBuffer::new(&mesh);
        assert!(matches!(result, Err(RenderError::UnsupportedPrimitive(_))));
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let mesh = Mesh::new(vec![Vertex::default(); 3], vec![0, 1, 3]);
        let result = SoftwareMeshBuffer::new(&mesh);
        assert!(matches!(result, Err(RenderError::ResourceCreationFailed(_))));
    }

    #[test]
    fn test_instance_counts() {
        let mesh = Mesh::cube();
        let plain = SoftwareMeshBuffer::new(&mesh).unwrap();
        assert_eq!(plain.instance_count(), 1);
        assert!(!plain.is_instanced());
        assert_eq!(plain.element_count(), 36);

        let instanced = SoftwareMeshBuffer::instanced(&mesh, &[Mat4::identity(); 4]).unwrap();
        assert_eq!(instanced.instance_count(), 4);
        assert!(instanced.is_instanced());
    }

    #[test]
    fn test_zero_instances_draw_nothing() {
        let empty = SoftwareMeshBuffer::instanced(&Mesh::cube(), &[]).unwrap();
        assert!(empty.is_instanced());
        assert_eq!(empty.instance_count(), 0);
        assert!(empty.instance_transforms().is_empty());

        let plain = SoftwareMeshBuffer::new(&Mesh::cube()).unwrap();
        assert_eq!(plain.instance_transforms(), vec![Mat4::identity()]);
    }
}
