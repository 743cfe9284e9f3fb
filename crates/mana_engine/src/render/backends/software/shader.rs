//! Linked CPU shader programs
//!
//! Stages are looked up by logical name in the built-in catalogue of
//! `programs`. Linking merges the uniforms every stage declares into one
//! table; values live in the program until the next write.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use super::programs::{FragmentStage, GeometryStage, VertexStage};
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::api::{ShaderProgram, ShaderSource, ShaderStage, UniformLocation, UniformValue};
use crate::render::{BackendResult, RenderError};

/// Program linked by the software allocator
pub struct SoftwareShaderProgram {
    id: u64,
    active: Rc<Cell<u64>>,
    pub(crate) vertex: VertexStage,
    pub(crate) geometry: Option<GeometryStage>,
    pub(crate) fragment: FragmentStage,
    locations: HashMap<String, UniformLocation>,
    values: Vec<Option<UniformValue>>,
}

impl SoftwareShaderProgram {
    pub(crate) fn link(
        id: u64,
        active: Rc<Cell<u64>>,
        vertex: &ShaderSource,
        fragment: &ShaderSource,
        geometry: Option<&ShaderSource>,
    ) -> BackendResult<Self> {
        check_stage(vertex, ShaderStage::Vertex)?;
        check_stage(fragment, ShaderStage::Fragment)?;
        let vertex_stage = VertexStage::from_name(&vertex.name).ok_or_else(|| unknown(vertex))?;
        let fragment_stage = FragmentStage::from_name(&fragment.name).ok_or_else(|| unknown(fragment))?;
        let geometry_stage = match geometry {
            Some(source) => {
                check_stage(source, ShaderStage::Geometry)?;
                Some(GeometryStage::from_name(&source.name).ok_or_else(|| unknown(source))?)
            }
            None => None,
        };

        let mut locations = HashMap::new();
        let declared = vertex_stage
            .uniforms()
            .into_iter()
            .chain(geometry_stage.iter().flat_map(|stage| stage.uniforms()))
            .chain(fragment_stage.uniforms());
        for name in declared {
            let next = UniformLocation(locations.len());
            locations.entry(name).or_insert(next);
        }
        debug!(
            "Linked program {}/{}{} with {} uniforms",
            vertex.name,
            fragment.name,
            geometry.map(|g| format!("/{}", g.name)).unwrap_or_default(),
            locations.len()
        );

        let values = vec![None; locations.len()];
        Ok(Self {
            id,
            active,
            vertex: vertex_stage,
            geometry: geometry_stage,
            fragment: fragment_stage,
            locations,
            values,
        })
    }

    /// Whether this program is the one the device last activated
    pub fn is_active(&self) -> bool {
        self.active.get() == self.id
    }

    /// Current value of the uniform called `name`
    pub fn value(&self, name: &str) -> Option<UniformValue> {
        self.locations
            .get(name)
            .and_then(|location| self.uniform(*location))
    }

    pub(crate) fn mat4(&self, name: &str) -> Mat4 {
        match self.value(name) {
            Some(UniformValue::Mat4(m)) => m,
            _ => Mat4::identity(),
        }
    }

    pub(crate) fn vec4(&self, name: &str) -> Vec4 {
        match self.value(name) {
            Some(UniformValue::Vec4(v)) => v,
            Some(UniformValue::Vec3(v)) => v.push(1.0),
            _ => Vec4::zeros(),
        }
    }

    pub(crate) fn vec3(&self, name: &str) -> Vec3 {
        match self.value(name) {
            Some(UniformValue::Vec3(v)) => v,
            Some(UniformValue::Vec4(v)) => v.xyz(),
            _ => Vec3::zeros(),
        }
    }

    pub(crate) fn float(&self, name: &str) -> f32 {
        self.value(name).and_then(|v| v.as_float()).unwrap_or(0.0)
    }

    pub(crate) fn int(&self, name: &str) -> i32 {
        self.value(name).and_then(|v| v.as_int()).unwrap_or(0)
    }

    pub(crate) fn flag(&self, name: &str) -> bool {
        self.value(name).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Texture unit bound to sampler `name`
    pub(crate) fn sampler(&self, name: &str) -> Option<usize> {
        match self.value(name) {
            Some(UniformValue::Texture(unit)) => Some(unit),
            Some(UniformValue::Int(unit)) if unit >= 0 => Some(unit as usize),
            _ => None,
        }
    }
}

fn check_stage(source: &ShaderSource, expected: ShaderStage) -> BackendResult<()> {
    if source.stage != expected {
        return Err(RenderError::ShaderLink(format!(
            "{} is a {} stage, expected {}",
            source.name, source.stage, expected
        )));
    }
    Ok(())
}

fn unknown(source: &ShaderSource) -> RenderError {
    RenderError::ShaderLink(format!("no {} stage named {}", source.stage, source.name))
}

impl ShaderProgram for SoftwareShaderProgram {
    fn activate(&mut self) {
        self.active.set(self.id);
    }

    fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.locations.get(name).copied()
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> bool {
        match self.values.get_mut(location.0) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    fn uniform(&self, location: UniformLocation) -> Option<UniformValue> {
        self.values.get(location.0).copied().flatten()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(vertex: &str, fragment: &str) -> BackendResult<SoftwareShaderProgram> {
        SoftwareShaderProgram::link(
            1,
            Rc::new(Cell::new(0)),
            &ShaderSource::vertex(vertex),
            &ShaderSource::fragment(fragment),
            None,
        )
    }

    #[test]
    fn test_unknown_stage_fails_to_link() {
        assert!(matches!(link("mesh", "nope"), Err(RenderError::ShaderLink(_))));
    }

    #[test]
    fn test_wrong_stage_kind_fails_to_link() {
        let result = SoftwareShaderProgram::link(
            1,
            Rc::new(Cell::new(0)),
            &ShaderSource::fragment("mesh"),
            &ShaderSource::fragment("unlit"),
            None,
        );
        assert!(matches!(result, Err(RenderError::ShaderLink(_))));
    }

    #[test]
    fn test_set_unknown_uniform_returns_false() {
        let mut program = link("mesh", "unlit").unwrap();
        assert!(!program.set_float("doesNotExist", 1.0));
        assert!(program.set_vec4("color", Vec4::new(1.0, 0.0, 0.0, 1.0)));
        assert_eq!(program.vec4("color"), Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn test_setters_activate_program() {
        let active = Rc::new(Cell::new(0));
        let source = (ShaderSource::vertex("mesh"), ShaderSource::fragment("unlit"));
        let mut a = SoftwareShaderProgram::link(1, Rc::clone(&active), &source.0, &source.1, None).unwrap();
        let mut b = SoftwareShaderProgram::link(2, Rc::clone(&active), &source.0, &source.1, None).unwrap();
        a.set_mat4("MANA_M", Mat4::identity());
        assert!(a.is_active());
        b.activate();
        b.activate();
        assert!(b.is_active() && !a.is_active());
    }

    #[test]
    fn test_uniform_table_is_merged_across_stages() {
        let program = SoftwareShaderProgram::link(
            1,
            Rc::new(Cell::new(0)),
            &ShaderSource::vertex("debug"),
            &ShaderSource::fragment("debug_line"),
            Some(&ShaderSource::geometry("normals")),
        )
        .unwrap();
        assert!(program.uniform_location("MODEL").is_some());
        assert!(program.uniform_location("scale").is_some());
    }
}
