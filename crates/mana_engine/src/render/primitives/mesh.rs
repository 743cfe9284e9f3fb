//! Mesh and vertex data structures
//!
//! Backend-agnostic geometry. A [`Mesh`] is plain CPU data; the render
//! allocator turns it into a `MeshBuffer` for drawing.

use crate::foundation::math::{utils, Vec2, Vec3};

/// Vertex layout shared by every mesh buffer
///
/// All fields are `f32` arrays so the struct is `Pod` and can be handed to
/// upload code with `bytemuck::cast_slice`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 3],
    /// Normal vector
    pub normal: [f32; 3],
    /// Texture coordinates
    pub uv: [f32; 2],
    /// Tangent for normal mapping
    pub tangent: [f32; 3],
    /// Bitangent for normal mapping
    pub bitangent: [f32; 3],
}

impl Vertex {
    /// Create a vertex without a tangent basis
    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
        }
    }

    /// Position as a vector
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    /// Normal as a vector
    pub fn normal(&self) -> Vec3 {
        Vec3::from(self.normal)
    }

    /// Texture coordinates as a vector
    pub fn uv(&self) -> Vec2 {
        Vec2::from(self.uv)
    }
}

/// How vertices are assembled into primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// One vertex per point
    Point,
    /// Two vertices per line
    Line,
    /// Three vertices per triangle
    Tri,
    /// Four vertices per quad
    Quad,
}

impl Primitive {
    /// Vertices per primitive
    pub const fn vertex_count(self) -> usize {
        match self {
            Self::Point => 1,
            Self::Line => 2,
            Self::Tri => 3,
            Self::Quad => 4,
        }
    }
}

/// Geometry made of vertices and optional indices
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Primitive assembly
    pub primitive: Primitive,
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Index data, `None` for non-indexed meshes
    pub indices: Option<Vec<u32>>,
}

impl Mesh {
    /// Create an indexed triangle mesh
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            primitive: Primitive::Tri,
            vertices,
            indices: Some(indices),
        }
    }

    /// Create a non-indexed mesh of the given primitive
    pub fn from_vertices(primitive: Primitive, vertices: Vec<Vertex>) -> Self {
        Self {
            primitive,
            vertices,
            indices: None,
        }
    }

    /// Whether the mesh is drawn through its index list
    pub const fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Number of elements drawn: the index count, or the vertex count
    pub fn element_count(&self) -> usize {
        self.indices.as_ref().map_or(self.vertices.len(), Vec::len)
    }

    /// Vertex indices of every triangle.
    ///
    /// Trailing elements that do not form a whole triangle are ignored.
    pub fn triangles(&self) -> Vec<[usize; 3]> {
        match &self.indices {
            Some(indices) => indices
                .chunks_exact(3)
                .map(|t| [t[0] as usize, t[1] as usize, t[2] as usize])
                .collect(),
            None => (0..self.vertices.len() / 3)
                .map(|t| [t * 3, t * 3 + 1, t * 3 + 2])
                .collect(),
        }
    }

    /// Generate per-vertex tangents and bitangents from positions and UVs
    ///
    /// Contributions of every triangle sharing a vertex are accumulated and
    /// orthogonalized against the vertex normal. Vertices without usable UVs
    /// get an arbitrary basis perpendicular to their normal.
    pub fn compute_tangents(&mut self) {
        let vertex_count = self.vertices.len();
        let mut tangents = vec![Vec3::zeros(); vertex_count];
        let mut bitangents = vec![Vec3::zeros(); vertex_count];

        for [a, b, c] in self.triangles() {
            if a >= vertex_count || b >= vertex_count || c >= vertex_count {
                continue;
            }
            let (v0, v1, v2) = (&self.vertices[a], &self.vertices[b], &self.vertices[c]);
            let edge1 = v1.position() - v0.position();
            let edge2 = v2.position() - v0.position();
            let duv1 = v1.uv() - v0.uv();
            let duv2 = v2.uv() - v0.uv();

            let det = duv1.x * duv2.y - duv2.x * duv1.y;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let f = 1.0 / det;
            let tangent = (edge1 * duv2.y - edge2 * duv1.y) * f;
            let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * f;

            for i in [a, b, c] {
                tangents[i] += tangent;
                bitangents[i] += bitangent;
            }
        }

        for (i, vertex) in self.vertices.iter_mut().enumerate() {
            let normal = vertex.normal();
            let mut tangent = tangents[i] - normal * normal.dot(&tangents[i]);
            if tangent.norm_squared() < f32::EPSILON {
                tangent = if normal.norm_squared() < f32::EPSILON {
                    Vec3::x()
                } else {
                    utils::arbitrary_perpendicular(&normal)
                };
            }
            let tangent = tangent.normalize();

            let mut bitangent = normal.cross(&tangent);
            if bitangent.dot(&bitangents[i]) < 0.0 {
                bitangent = -bitangent;
            }

            vertex.tangent = tangent.into();
            vertex.bitangent = bitangent.into();
        }
    }

    /// Full-screen quad in normalized device coordinates, facing +Z
    pub fn screen_quad() -> Self {
        let normal = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex::new([-1.0, -1.0, 0.0], normal, [0.0, 0.0]),
            Vertex::new([1.0, -1.0, 0.0], normal, [1.0, 0.0]),
            Vertex::new([1.0, 1.0, 0.0], normal, [1.0, 1.0]),
            Vertex::new([-1.0, 1.0, 0.0], normal, [0.0, 1.0]),
        ];
        let mut mesh = Self::new(vertices, vec![0, 1, 2, 2, 3, 0]);
        mesh.compute_tangents();
        mesh
    }

    /// Unit cube centered at the origin with extents of ±1 on each axis
    ///
    /// Every face has its own four vertices so normals and UVs stay flat per
    /// face. Winding is counter-clockwise seen from outside.
    pub fn cube() -> Self {
        // (normal, u axis, v axis)
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u_axis, v_axis) in faces {
            let (n, u, v) = (Vec3::from(normal), Vec3::from(u_axis), Vec3::from(v_axis));
            let base = vertices.len() as u32;
            for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = n + u * du + v * dv;
                vertices.push(Vertex::new(
                    position.into(),
                    normal,
                    [(du + 1.0) * 0.5, (dv + 1.0) * 0.5],
                ));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        let mut mesh = Self::new(vertices, indices);
        mesh.compute_tangents();
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 14 * 4);
    }

    #[test]
    fn test_triangles_indexed_and_flat() {
        let quad = Mesh::screen_quad();
        assert_eq!(quad.triangles(), vec![[0, 1, 2], [2, 3, 0]]);

        let flat = Mesh::from_vertices(Primitive::Tri, vec![Vertex::default(); 7]);
        assert_eq!(flat.triangles().len(), 2);
        assert_eq!(flat.element_count(), 7);
        assert!(!flat.is_indexed());
    }

    #[test]
    fn test_tangents_follow_uv_axes() {
        let quad = Mesh::screen_quad();
        for vertex in &quad.vertices {
            assert_relative_eq!(Vec3::from(vertex.tangent), Vec3::x(), epsilon = 1e-5);
            assert_relative_eq!(Vec3::from(vertex.bitangent), Vec3::y(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_cube_faces_point_outward() {
        let cube = Mesh::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.element_count(), 36);
        for [a, b, c] in cube.triangles() {
            let (p0, p1, p2) = (
                cube.vertices[a].position(),
                cube.vertices[b].position(),
                cube.vertices[c].position(),
            );
            let face_normal = (p1 - p0).cross(&(p2 - p0)).normalize();
            assert_relative_eq!(face_normal, cube.vertices[a].normal(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_degenerate_uvs_get_perpendicular_basis() {
        let mut mesh = Mesh::new(
            vec![
                Vertex::new([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
                Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
                Vertex::new([0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [0.0, 0.0]),
            ],
            vec![0, 1, 2],
        );
        mesh.compute_tangents();
        for vertex in &mesh.vertices {
            let tangent = Vec3::from(vertex.tangent);
            assert_relative_eq!(tangent.norm(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(tangent.dot(&vertex.normal()), 0.0, epsilon = 1e-5);
        }
    }
}
