//! # 3D Camera
//!
//! A camera is a transform plus a projection. View space is right-handed with
//! the camera looking down -Z; projections map to normalized device
//! coordinates in `[-1, 1]` on every axis.

use crate::foundation::math::{utils, Mat4, Transform, Vec3};

/// Projection parameters, perspective or orthographic
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in degrees
        fov: f32,
        /// Width divided by height
        aspect: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        /// Left clip plane
        left: f32,
        /// Right clip plane
        right: f32,
        /// Top clip plane
        top: f32,
        /// Bottom clip plane
        bottom: f32,
        /// Near clip distance
        near: f32,
        /// Far clip distance
        far: f32,
    },
}

impl Projection {
    /// Perspective projection with a 60 degree field of view and 4:3 aspect
    pub const fn perspective() -> Self {
        Self::Perspective {
            fov: 60.0,
            aspect: 4.0 / 3.0,
            near: 0.1,
            far: 100.0,
        }
    }

    /// Orthographic projection covering ±10 units
    pub const fn orthographic() -> Self {
        Self::Orthographic {
            left: -10.0,
            right: 10.0,
            top: 10.0,
            bottom: -10.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::perspective()
    }
}

/// Camera placed in the world by a [`Transform`]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Camera {
    /// World placement; scale is ignored
    pub transform: Transform,
    /// Projection parameters
    pub projection: Projection,
}

impl Camera {
    /// Perspective camera at `position` looking down -Z
    pub fn perspective(position: Vec3) -> Self {
        Self {
            transform: Transform::from_position(position),
            projection: Projection::perspective(),
        }
    }

    /// Orthographic camera at `position` looking down -Z
    pub fn orthographic(position: Vec3) -> Self {
        Self {
            transform: Transform::from_position(position),
            projection: Projection::orthographic(),
        }
    }

    /// Replace the aspect ratio of a perspective camera
    ///
    /// Orthographic cameras are returned unchanged.
    #[must_use]
    pub fn with_aspect(mut self, aspect_ratio: f32) -> Self {
        if let Projection::Perspective { aspect, .. } = &mut self.projection {
            *aspect = aspect_ratio;
        }
        self
    }

    /// World to view matrix
    ///
    /// Moves the world by the negated camera position, then applies the
    /// inverse camera rotation.
    pub fn view(&self) -> Mat4 {
        self.transform.rotation.inverse().to_homogeneous()
            * Mat4::new_translation(&-self.transform.position)
    }

    /// View to clip matrix
    pub fn projection(&self) -> Mat4 {
        match self.projection {
            Projection::Perspective { fov, aspect, near, far } => {
                Mat4::new_perspective(aspect, utils::deg_to_rad(fov), near, far)
            }
            Projection::Orthographic { left, right, top, bottom, near, far } => {
                Mat4::new_orthographic(left, right, bottom, top, near, far)
            }
        }
    }

    /// Camera position in world space
    pub const fn position(&self) -> Vec3 {
        self.transform.position
    }
}
