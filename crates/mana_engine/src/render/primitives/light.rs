//! Light sources and Phong shading
//!
//! The shading functions here are the CPU form of the lighting used by the
//! deferred and forward passes. Every light contributes an ambient, diffuse and
//! specular term; point and spot lights are attenuated by distance and spot
//! lights fade between their inner and outer cone.

use crate::foundation::math::{utils, Vec3, Vec4};

/// Distance attenuation `1 / (constant + linear * d + quadratic * d^2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attenuation {
    /// Constant term
    pub constant: f32,
    /// Linear term
    pub linear: f32,
    /// Quadratic term
    pub quadratic: f32,
}

impl Attenuation {
    /// Create an attenuation from its three coefficients
    pub const fn new(constant: f32, linear: f32, quadratic: f32) -> Self {
        Self { constant, linear, quadratic }
    }

    /// Attenuation factor at `distance`
    pub fn factor(&self, distance: f32) -> f32 {
        1.0 / (self.constant + self.linear * distance + self.quadratic * distance * distance)
    }
}

/// Type specific light parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Parallel rays along `direction`
    Directional {
        /// Direction the light travels in
        direction: Vec3,
    },
    /// Omnidirectional light at `position`
    Point {
        /// World position
        position: Vec3,
        /// Distance falloff
        attenuation: Attenuation,
    },
    /// Cone of light at `position` pointing along `direction`
    Spot {
        /// World position
        position: Vec3,
        /// Direction the cone points in
        direction: Vec3,
        /// Inner cone angle in degrees
        cut_off: f32,
        /// Outer cone angle in degrees
        outer_cut_off: f32,
        /// Distance falloff
        attenuation: Attenuation,
    },
}

/// A light source with Phong colors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Ambient color
    pub ambient: Vec3,
    /// Diffuse color
    pub diffuse: Vec3,
    /// Specular color
    pub specular: Vec3,
    /// Type specific parameters
    pub kind: LightKind,
}

/// Everything a light needs to know about the surface it shades
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    /// World position of the fragment
    pub position: Vec3,
    /// Surface normal, need not be normalized
    pub normal: Vec3,
    /// Diffuse material color
    pub diffuse: Vec4,
    /// Specular material color
    pub specular: Vec4,
    /// Specular exponent
    pub shininess: f32,
}

/// Phong terms produced by one or more lights
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shading {
    /// Ambient term
    pub ambient: Vec3,
    /// Diffuse term
    pub diffuse: Vec3,
    /// Specular term
    pub specular: Vec3,
}

impl Shading {
    /// Sum of the three terms
    pub fn combined(&self) -> Vec3 {
        self.ambient + self.diffuse + self.specular
    }
}

impl std::ops::AddAssign for Shading {
    fn add_assign(&mut self, rhs: Self) {
        self.ambient += rhs.ambient;
        self.diffuse += rhs.diffuse;
        self.specular += rhs.specular;
    }
}

impl Light {
    /// Directional light with ambient 0.1 and full diffuse/specular
    pub fn directional(direction: Vec3) -> Self {
        Self {
            ambient: Vec3::repeat(0.1),
            diffuse: Vec3::repeat(1.0),
            specular: Vec3::repeat(1.0),
            kind: LightKind::Directional { direction },
        }
    }

    /// Point light with unit attenuation coefficients
    pub fn point(position: Vec3) -> Self {
        Self {
            ambient: Vec3::repeat(0.1),
            diffuse: Vec3::repeat(1.0),
            specular: Vec3::repeat(1.0),
            kind: LightKind::Point {
                position,
                attenuation: Attenuation::new(1.0, 1.0, 1.0),
            },
        }
    }

    /// Spot light pointing down with a 10/14 degree cone
    pub fn spot(position: Vec3) -> Self {
        Self {
            ambient: Vec3::repeat(0.1),
            diffuse: Vec3::repeat(1.0),
            specular: Vec3::repeat(1.0),
            kind: LightKind::Spot {
                position,
                direction: Vec3::new(0.0, -1.0, 0.0),
                cut_off: 10.0,
                outer_cut_off: 14.0,
                attenuation: Attenuation::new(0.1, 0.1, 0.1),
            },
        }
    }

    /// Replace the three colors
    #[must_use]
    pub fn with_colors(mut self, ambient: Vec3, diffuse: Vec3, specular: Vec3) -> Self {
        self.ambient = ambient;
        self.diffuse = diffuse;
        self.specular = specular;
        self
    }

    /// Phong contribution of this light to `surface` seen from `view_position`
    pub fn shade(&self, surface: &Surface, view_position: &Vec3) -> Shading {
        let normal = safe_normalize(surface.normal);
        let to_light = match self.kind {
            LightKind::Directional { direction } => safe_normalize(-direction),
            LightKind::Point { position, .. } | LightKind::Spot { position, .. } => {
                safe_normalize(position - surface.position)
            }
        };

        let ambient = self.ambient.component_mul(&surface.diffuse.xyz());

        let diff = normal.dot(&to_light).max(0.0);
        let mut diffuse = self.diffuse.component_mul(&(surface.diffuse.xyz() * diff));

        let view_dir = safe_normalize(view_position - surface.position);
        let reflect_dir = reflect(&-to_light, &normal);
        let spec = view_dir.dot(&reflect_dir).max(0.0).powf(surface.shininess);
        let mut specular = self.specular.component_mul(&(surface.specular.xyz() * spec));

        match self.kind {
            LightKind::Directional { .. } => Shading { ambient, diffuse, specular },
            LightKind::Point { position, attenuation } => {
                let factor = attenuation.factor((position - surface.position).norm());
                Shading {
                    ambient: ambient * factor,
                    diffuse: diffuse * factor,
                    specular: specular * factor,
                }
            }
            LightKind::Spot { position, direction, cut_off, outer_cut_off, attenuation } => {
                let intensity = spot_intensity(&to_light, &direction, cut_off, outer_cut_off);
                let factor = attenuation.factor((position - surface.position).norm());
                diffuse *= intensity * factor;
                specular *= intensity * factor;
                Shading { ambient, diffuse, specular }
            }
        }
    }
}

/// Soft cone falloff, 1 inside `cut_off`, 0 outside `outer_cut_off` (degrees)
pub fn spot_intensity(to_light: &Vec3, direction: &Vec3, cut_off: f32, outer_cut_off: f32) -> f32 {
    let theta = to_light.dot(&safe_normalize(-direction));
    let inner = utils::deg_to_rad(cut_off).cos();
    let outer = utils::deg_to_rad(outer_cut_off).cos();
    let epsilon = inner - outer;
    if epsilon.abs() < f32::EPSILON {
        return if theta >= inner { 1.0 } else { 0.0 };
    }
    ((theta - outer) / epsilon).clamp(0.0, 1.0)
}

/// Accumulated contribution of every light
pub fn shade_all<'a>(
    lights: impl IntoIterator<Item = &'a Light>,
    surface: &Surface,
    view_position: &Vec3,
) -> Shading {
    let mut total = Shading::default();
    for light in lights {
        total += light.shade(surface, view_position);
    }
    total
}

fn reflect(incident: &Vec3, normal: &Vec3) -> Vec3 {
    incident - normal * (2.0 * normal.dot(incident))
}

fn safe_normalize(v: Vec3) -> Vec3 {
    v.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros)
}
