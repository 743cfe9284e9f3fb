//! Light and camera components
//!
//! Both are placed by the entity's world transform: positions are moved by
//! it and directions rotated.

use crate::ecs::Component;
use crate::foundation::math::{Point3, Transform, Vec3};
use crate::render::primitives::{Camera, Light, LightKind, Projection};

/// Light source in entity space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightComponent {
    /// Light with entity space position and direction
    pub light: Light,
}

impl Component for LightComponent {}

impl LightComponent {
    /// Wrap a light
    pub const fn new(light: Light) -> Self {
        Self { light }
    }

    /// The light placed by `transform`
    pub fn world_light(&self, transform: &Transform) -> Light {
        let matrix = transform.to_matrix();
        let place = |position: Vec3| matrix.transform_point(&Point3::from(position)).coords;
        let orient = |direction: Vec3| transform.rotation * direction;

        let kind = match self.light.kind {
            LightKind::Directional { direction } => LightKind::Directional {
                direction: orient(direction),
            },
            LightKind::Point { position, attenuation } => LightKind::Point {
                position: place(position),
                attenuation,
            },
            LightKind::Spot {
                position,
                direction,
                cut_off,
                outer_cut_off,
                attenuation,
            } => LightKind::Spot {
                position: place(position),
                direction: orient(direction),
                cut_off,
                outer_cut_off,
                attenuation,
            },
        };
        Light { kind, ..self.light }
    }
}

/// Camera viewing from the entity
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CameraComponent {
    /// Projection parameters
    pub projection: Projection,
}

impl Component for CameraComponent {}

impl CameraComponent {
    /// Camera with a projection
    pub const fn new(projection: Projection) -> Self {
        Self { projection }
    }

    /// Camera placed by `transform`, scale ignored
    pub fn camera(&self, transform: &Transform) -> Camera {
        Camera {
            transform: Transform::from_position_rotation(transform.position, transform.rotation),
            projection: self.projection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;
    use approx::assert_relative_eq;

    #[test]
    fn test_lights_follow_transform() {
        let rotation = Quat::from_axis_angle(&Vec3::x_axis(), std::f32::consts::FRAC_PI_2);
        let transform = Transform::from_position_rotation(Vec3::new(0.0, 0.0, 3.0), rotation);

        let spot = LightComponent::new(Light::spot(Vec3::new(0.0, 1.0, 0.0))).world_light(&transform);
        let LightKind::Spot { position, direction, .. } = spot.kind else {
            panic!("kind changed");
        };
        assert_relative_eq!(position, Vec3::new(0.0, 0.0, 4.0), epsilon = 1e-5);
        // Down rotated a quarter turn around +X points along -Z
        assert_relative_eq!(direction, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);

        let point = LightComponent::new(Light::point(Vec3::zeros())).world_light(&transform);
        assert!(matches!(point.kind, LightKind::Point { position, .. } if position == Vec3::new(0.0, 0.0, 3.0)));
    }

    #[test]
    fn test_camera_ignores_scale() {
        let transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0)).with_scale(Vec3::repeat(4.0));
        let camera = CameraComponent::default().camera(&transform);
        assert_eq!(camera.transform.scale, Vec3::repeat(1.0));
        assert_relative_eq!(camera.view().transform_point(&Point3::new(1.0, 2.0, 3.0)).coords, Vec3::zeros());
    }
}
