//! Shader program capability
//!
//! Programs are linked from [`ShaderSource`] stages identified by a logical
//! name. The uniform table of a program is resolved once at link time; named
//! setters look up the [`UniformLocation`] and write through
//! [`ShaderProgram::set_uniform`].

use std::any::Any;
use std::fmt;

use crate::foundation::math::{Mat4, Vec2, Vec3, Vec4};

/// Size of the per light type uniform arrays every lighting program declares
pub const MAX_LIGHTS: usize = 20;

/// Pipeline stage of a shader source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Per vertex stage
    Vertex,
    /// Per primitive stage emitting new primitives
    Geometry,
    /// Per fragment stage
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Geometry => write!(f, "geometry"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// One stage of a program
///
/// `name` is the logical program name a backend links against. `source`
/// carries backend specific text and may be empty for backends that ship
/// their own programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    /// Logical name of the stage
    pub name: String,
    /// Pipeline stage
    pub stage: ShaderStage,
    /// Backend specific source text
    pub source: String,
}

impl ShaderSource {
    /// Source for `stage` named `name` with no text
    pub fn new(name: impl Into<String>, stage: ShaderStage) -> Self {
        Self {
            name: name.into(),
            stage,
            source: String::new(),
        }
    }

    /// Vertex stage named `name`
    pub fn vertex(name: impl Into<String>) -> Self {
        Self::new(name, ShaderStage::Vertex)
    }

    /// Geometry stage named `name`
    pub fn geometry(name: impl Into<String>) -> Self {
        Self::new(name, ShaderStage::Geometry)
    }

    /// Fragment stage named `name`
    pub fn fragment(name: impl Into<String>) -> Self {
        Self::new(name, ShaderStage::Fragment)
    }

    /// Attach backend specific source text
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Value stored in a uniform slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i32),
    /// Float
    Float(f32),
    /// 2 component vector
    Vec2(Vec2),
    /// 3 component vector
    Vec3(Vec3),
    /// 4 component vector
    Vec4(Vec4),
    /// 4x4 matrix
    Mat4(Mat4),
    /// Texture unit, an index into the command's texture list
    Texture(usize),
}

impl UniformValue {
    /// Value as a float, converting integers and booleans
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            Self::Float(v) => Some(v),
            Self::Int(v) => Some(v as f32),
            Self::Bool(v) => Some(if v { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Value as an integer, converting booleans
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            Self::Int(v) => Some(v),
            Self::Bool(v) => Some(i32::from(v)),
            _ => None,
        }
    }

    /// Value as a boolean, nonzero integers are true
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Self::Bool(v) => Some(v),
            Self::Int(v) => Some(v != 0),
            _ => None,
        }
    }
}

/// Index of a uniform in a program's link-time table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation(pub usize);

/// Linked shader program
pub trait ShaderProgram: Any {
    /// Make this the active program. Activating an active program is a no-op.
    fn activate(&mut self);

    /// Location of `name` in the uniform table
    fn uniform_location(&self, name: &str) -> Option<UniformLocation>;

    /// Write a uniform by location. Returns `false` for an unknown location.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> bool;

    /// Current value of a uniform, `None` if never written
    fn uniform(&self, location: UniformLocation) -> Option<UniformValue>;

    /// Concrete backend type
    fn as_any(&self) -> &dyn Any;

    /// Write a uniform by name, activating the program first.
    ///
    /// Returns `false` if the program has no uniform called `name`.
    fn set_value(&mut self, name: &str, value: UniformValue) -> bool {
        match self.uniform_location(name) {
            Some(location) => {
                self.activate();
                self.set_uniform(location, value)
            }
            None => false,
        }
    }

    /// Set a boolean uniform
    fn set_bool(&mut self, name: &str, value: bool) -> bool {
        self.set_value(name, UniformValue::Bool(value))
    }

    /// Set an integer uniform
    fn set_int(&mut self, name: &str, value: i32) -> bool {
        self.set_value(name, UniformValue::Int(value))
    }

    /// Set a float uniform
    fn set_float(&mut self, name: &str, value: f32) -> bool {
        self.set_value(name, UniformValue::Float(value))
    }

    /// Set a 2 component vector uniform
    fn set_vec2(&mut self, name: &str, value: Vec2) -> bool {
        self.set_value(name, UniformValue::Vec2(value))
    }

    /// Set a 3 component vector uniform
    fn set_vec3(&mut self, name: &str, value: Vec3) -> bool {
        self.set_value(name, UniformValue::Vec3(value))
    }

    /// Set a 4 component vector uniform
    fn set_vec4(&mut self, name: &str, value: Vec4) -> bool {
        self.set_value(name, UniformValue::Vec4(value))
    }

    /// Set a matrix uniform
    fn set_mat4(&mut self, name: &str, value: Mat4) -> bool {
        self.set_value(name, UniformValue::Mat4(value))
    }

    /// Bind a sampler uniform to a texture unit
    fn set_texture(&mut self, name: &str, unit: usize) -> bool {
        self.set_value(name, UniformValue::Texture(unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(UniformValue::Int(3).as_float(), Some(3.0));
        assert_eq!(UniformValue::Bool(true).as_int(), Some(1));
        assert_eq!(UniformValue::Int(0).as_bool(), Some(false));
        assert_eq!(UniformValue::Vec2(Vec2::zeros()).as_float(), None);
    }

    #[test]
    fn test_source_builders() {
        let source = ShaderSource::fragment("composite").with_source("void main() {}");
        assert_eq!(source.stage, ShaderStage::Fragment);
        assert_eq!(source.name, "composite");
        assert_eq!(source.source, "void main() {}");
        assert_eq!(ShaderStage::Geometry.to_string(), "geometry");
    }
}
