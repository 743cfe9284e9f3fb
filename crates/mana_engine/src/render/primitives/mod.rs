//! Backend-agnostic rendering primitives

pub mod camera;
pub mod color;
pub mod image;
pub mod light;
pub mod material;
pub mod mesh;

pub use camera::{Camera, Projection};
pub use color::{ColorRGB, ColorRGBA};
pub use image::{Image, ImageRGBA};
pub use light::{Attenuation, Light, LightKind, Shading, Surface};
pub use material::Material;
pub use mesh::{Mesh, Primitive, Vertex};
