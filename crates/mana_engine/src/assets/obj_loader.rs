//! Wavefront OBJ reader
//!
//! Supports `v`, `vt`, `vn`, `f` (polygons are fan triangulated, negative
//! indices count from the end) and `o` / `g` to split the file into named
//! meshes. Everything else is ignored.

use std::io::BufRead;

use log::debug;

use super::AssetError;
use crate::render::primitives::{Mesh, Vertex};

#[derive(Default)]
struct ObjectBuilder {
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl ObjectBuilder {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    fn finish(self, meshes: &mut Vec<(String, Mesh)>) {
        if self.indices.is_empty() {
            return;
        }
        let mut mesh = Mesh::new(self.vertices, self.indices);
        mesh.compute_tangents();
        meshes.push((self.name, mesh));
    }
}

struct Parser<'a> {
    path: &'a str,
    line: usize,
}

impl Parser<'_> {
    fn error(&self, reason: impl std::fmt::Display) -> AssetError {
        AssetError::Decode {
            path: self.path.to_string(),
            reason: format!("line {}: {reason}", self.line),
        }
    }

    fn floats<const N: usize>(&self, parts: &[&str]) -> Result<[f32; N], AssetError> {
        let mut out = [0.0; N];
        if parts.len() < N {
            return Err(self.error(format!("expected {N} components")));
        }
        for (value, part) in out.iter_mut().zip(parts) {
            *value = part.parse().map_err(|_| self.error(format!("invalid number {part}")))?;
        }
        Ok(out)
    }

    /// Resolve a 1-based (or negative, relative) index into a list of `len`
    fn index(&self, token: &str, len: usize) -> Result<usize, AssetError> {
        let value: i64 = token.parse().map_err(|_| self.error(format!("invalid index {token}")))?;
        let resolved = if value < 0 { len as i64 + value } else { value - 1 };
        if resolved < 0 || resolved >= len as i64 {
            return Err(self.error(format!("index {token} out of range")));
        }
        Ok(resolved as usize)
    }
}

/// Read every object of an OBJ file
///
/// Objects are named by their `o` / `g` statement; geometry before the first
/// one is named `default_name`. Objects without faces are dropped.
pub fn load_obj(reader: impl BufRead, path: &str, default_name: &str) -> Result<Vec<(String, Mesh)>, AssetError> {
    let mut parser = Parser { path, line: 0 };
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();

    let mut meshes = Vec::new();
    let mut current = ObjectBuilder::named(default_name.to_string());

    for line in reader.lines() {
        parser.line += 1;
        let line = line?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((keyword, args)) = parts.split_first() else {
            continue;
        };

        match *keyword {
            "v" => positions.push(parser.floats(args)?),
            "vn" => normals.push(parser.floats(args)?),
            "vt" => uvs.push(parser.floats(args)?),
            "o" | "g" => {
                let name = args.join(" ");
                let previous = std::mem::replace(&mut current, ObjectBuilder::named(name));
                previous.finish(&mut meshes);
            }
            "f" => {
                if args.len() < 3 {
                    return Err(parser.error("face with fewer than three vertices"));
                }
                let mut corners = Vec::with_capacity(args.len());
                for corner in args {
                    let mut fields = corner.split('/');
                    let position = parser.index(fields.next().unwrap_or_default(), positions.len())?;
                    let uv = match fields.next() {
                        Some(token) if !token.is_empty() => uvs[parser.index(token, uvs.len())?],
                        _ => [0.0, 0.0],
                    };
                    let normal = match fields.next() {
                        Some(token) if !token.is_empty() => normals[parser.index(token, normals.len())?],
                        _ => [0.0, 1.0, 0.0],
                    };
                    corners.push(current.vertices.len() as u32);
                    current.vertices.push(Vertex::new(positions[position], normal, uv));
                }
                for i in 1..corners.len() - 1 {
                    current.indices.extend_from_slice(&[corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => {}
        }
    }
    current.finish(&mut meshes);

    if meshes.is_empty() {
        return Err(AssetError::Decode {
            path: path.to_string(),
            reason: "no faces".to_string(),
        });
    }
    debug!("Read {} meshes from {}", meshes.len(), path);
    Ok(meshes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const QUAD: &str = "\
# quad
v -1 -1 0
v 1 -1 0
v 1 1 0
v -1 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    #[test]
    fn test_quad_is_fan_triangulated() {
        let meshes = load_obj(QUAD.as_bytes(), "quad.obj", "quad").unwrap();
        assert_eq!(meshes.len(), 1);
        let (name, mesh) = &meshes[0];
        assert_eq!(name, "quad");
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, Some(vec![0, 1, 2, 0, 2, 3]));
        assert_eq!(mesh.vertices[2].uv, [1.0, 1.0]);
        // Tangent follows +u
        assert_relative_eq!(mesh.vertices[0].tangent[0], 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_objects_are_split_by_name() {
        let source = "\
v 0 0 0
v 1 0 0
v 0 1 0
o First
f 1 2 3
o Empty
o Second
f -3 -2 -1
";
        let meshes = load_obj(source.as_bytes(), "two.obj", "two").unwrap();
        let names: Vec<&str> = meshes.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["First", "Second"]);
        // Missing normals default to +Y
        assert_eq!(meshes[1].1.vertices[0].normal, [0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_invalid_files() {
        let out_of_range = "v 0 0 0\nf 1 2 3\n";
        assert!(matches!(
            load_obj(out_of_range.as_bytes(), "bad.obj", "bad"),
            Err(AssetError::Decode { .. })
        ));
        assert!(load_obj("v 0 0 zero\n".as_bytes(), "bad.obj", "bad").is_err());
        assert!(load_obj("v 0 0 0\n".as_bytes(), "empty.obj", "empty").is_err());
    }
}
