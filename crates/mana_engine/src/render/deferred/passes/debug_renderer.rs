//! Immediate mode debug lines
//!
//! Segments are collected on the CPU, grouped by color and drawn in one
//! command per color. Each segment becomes a degenerate triangle `(a, b, b)`
//! which the `lines` geometry stage turns back into a line.

use log::trace;

use crate::foundation::math::{utils, Mat4, Vec3};
use crate::render::api::{
    ClearFlags, RenderCommand, RenderDevice, RenderOptions, RenderProperties, RenderTarget,
    ShaderProgram, ShaderSource,
};
use crate::render::primitives::{Camera, ColorRGBA, Light, LightKind, Mesh, Vertex};
use crate::render::BackendResult;

/// Segments around the base circle of a spot light cone
pub const CONE_SEGMENTS: usize = 16;

/// Line segments sharing one color
#[derive(Debug, Clone, PartialEq)]
pub struct LineBatch {
    /// Color of every segment
    pub color: ColorRGBA,
    /// Start and end points in world space
    pub segments: Vec<[Vec3; 2]>,
}

impl LineBatch {
    /// Mesh of degenerate triangles, one per segment
    pub fn to_mesh(&self) -> Mesh {
        let mut vertices = Vec::with_capacity(self.segments.len() * 2);
        let mut indices = Vec::with_capacity(self.segments.len() * 3);
        for (i, [start, end]) in self.segments.iter().enumerate() {
            let base = (i * 2) as u32;
            vertices.push(Vertex::new((*start).into(), [0.0; 3], [0.0; 2]));
            vertices.push(Vertex::new((*end).into(), [0.0; 3], [0.0; 2]));
            indices.extend_from_slice(&[base, base + 1, base + 1]);
        }
        Mesh::new(vertices, indices)
    }
}

/// Collects debug lines and draws them into a target
pub struct DebugRenderer {
    program: Box<dyn ShaderProgram>,
    batches: Vec<LineBatch>,
}

impl DebugRenderer {
    /// Link the line program
    pub fn new(device: &mut dyn RenderDevice) -> BackendResult<Self> {
        let program = device.allocator().create_shader_program(
            &ShaderSource::vertex("debug"),
            &ShaderSource::fragment("debug_line"),
            Some(&ShaderSource::geometry("lines")),
        )?;
        Ok(Self {
            program,
            batches: Vec::new(),
        })
    }

    /// Pending segments grouped by color
    pub fn batches(&self) -> &[LineBatch] {
        &self.batches
    }

    /// Drop every pending segment
    pub fn clear(&mut self) {
        self.batches.clear();
    }

    /// Queue a segment
    pub fn draw_line(&mut self, start: Vec3, end: Vec3, color: ColorRGBA) {
        match self.batches.iter_mut().find(|batch| batch.color == color) {
            Some(batch) => batch.segments.push([start, end]),
            None => self.batches.push(LineBatch {
                color,
                segments: vec![[start, end]],
            }),
        }
    }

    /// Shaft from `origin` along `direction` with a two stroke head
    pub fn draw_arrow(&mut self, origin: Vec3, direction: Vec3, length: f32, color: ColorRGBA) {
        let Some(direction) = direction.try_normalize(f32::EPSILON) else {
            return;
        };
        let tip = origin + direction * length;
        let side = utils::arbitrary_perpendicular(&direction).normalize();
        let head = length * 0.2;
        self.draw_line(origin, tip, color);
        self.draw_line(tip, tip - direction * head + side * head * 0.5, color);
        self.draw_line(tip, tip - direction * head - side * head * 0.5, color);
    }

    /// Three axis aligned segments crossing at `center`
    pub fn draw_cross(&mut self, center: Vec3, size: f32, color: ColorRGBA) {
        let half = size * 0.5;
        for axis in [Vec3::x(), Vec3::y(), Vec3::z()] {
            self.draw_line(center - axis * half, center + axis * half, color);
        }
    }

    /// Cone from `apex` along `direction`, opening by `angle` degrees off the axis
    pub fn draw_cone(&mut self, apex: Vec3, direction: Vec3, length: f32, angle: f32, color: ColorRGBA) {
        let Some(direction) = direction.try_normalize(f32::EPSILON) else {
            return;
        };
        let tangent = utils::arbitrary_perpendicular(&direction).normalize();
        let bitangent = direction.cross(&tangent);
        let center = apex + direction * length;
        let radius = length * utils::deg_to_rad(angle).tan();

        let rim: Vec<Vec3> = (0..CONE_SEGMENTS)
            .map(|i| {
                let phi = std::f32::consts::TAU * i as f32 / CONE_SEGMENTS as f32;
                center + (tangent * phi.cos() + bitangent * phi.sin()) * radius
            })
            .collect();
        for (i, point) in rim.iter().enumerate() {
            self.draw_line(*point, rim[(i + 1) % rim.len()], color);
        }
        for point in rim.iter().step_by(CONE_SEGMENTS / 4) {
            self.draw_line(apex, *point, color);
        }
    }

    /// Gizmo for a light caster in the light's diffuse color
    ///
    /// Directional lights get an arrow from the origin, point lights a cross
    /// and spot lights their outer cone.
    pub fn draw_light(&mut self, light: &Light) {
        let color = ColorRGBA::from_vec4(&light.diffuse.push(1.0));
        match light.kind {
            LightKind::Directional { direction } => self.draw_arrow(Vec3::zeros(), direction, 1.0, color),
            LightKind::Point { position, .. } => self.draw_cross(position, 0.5, color),
            LightKind::Spot { position, direction, outer_cut_off, .. } => {
                self.draw_cone(position, direction, 1.0, outer_cut_off, color);
            }
        }
    }

    /// Draw and drop the pending segments
    ///
    /// Nothing on `target` is cleared. Lines are depth tested against the
    /// target's depth attachment without writing to it.
    pub fn render(&mut self, device: &mut dyn RenderDevice, target: &dyn RenderTarget, camera: &Camera) -> BackendResult<()> {
        if self.batches.is_empty() {
            return Ok(());
        }
        trace!("Drawing {} debug line batches", self.batches.len());

        let allocator = device.allocator();
        let meshes = self
            .batches
            .iter()
            .map(|batch| allocator.create_mesh_buffer(&batch.to_mesh()))
            .collect::<BackendResult<Vec<_>>>()?;

        self.program.set_mat4("MODEL", Mat4::identity());
        self.program.set_mat4("VIEW", camera.view());
        self.program.set_mat4("PROJECTION", camera.projection());
        let properties = RenderProperties {
            depth_test_write: false,
            enable_face_culling: false,
            ..RenderProperties::default()
        };

        let renderer = device.renderer();
        renderer.render_begin(target, &RenderOptions::new(target.size()).with_clear(ClearFlags::empty()))?;
        for (batch, mesh) in self.batches.iter().zip(&meshes) {
            self.program.set_vec4("color", batch.color.to_vec4());
            let command = RenderCommand::new(self.program.as_ref(), vec![mesh.as_ref()]).with_properties(properties);
            renderer.add_command(&command)?;
        }
        renderer.render_finish()?;

        self.batches.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::foundation::math::Vec2i;
    use crate::render::api::{ColorFormat, TextureAttributes};
    use crate::render::backends::software::SoftwareDevice;

    fn renderer() -> (SoftwareDevice, DebugRenderer) {
        let mut device = SoftwareDevice::new();
        let renderer = DebugRenderer::new(&mut device).unwrap();
        (device, renderer)
    }

    #[test]
    fn test_lines_are_grouped_by_color() {
        let (_device, mut lines) = renderer();
        let red = ColorRGBA::new(255, 0, 0, 255);
        lines.draw_line(Vec3::zeros(), Vec3::x(), red);
        lines.draw_line(Vec3::zeros(), Vec3::y(), ColorRGBA::WHITE);
        lines.draw_line(Vec3::zeros(), Vec3::z(), red);

        assert_eq!(lines.batches().len(), 2);
        assert_eq!(lines.batches()[0].segments.len(), 2);
        assert_eq!(lines.batches()[1].color, ColorRGBA::WHITE);
    }

    #[test]
    fn test_batch_mesh_uses_degenerate_triangles() {
        let batch = LineBatch {
            color: ColorRGBA::WHITE,
            segments: vec![[Vec3::zeros(), Vec3::x()], [Vec3::y(), Vec3::z()]],
        };
        let mesh = batch.to_mesh();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, Some(vec![0, 1, 1, 2, 3, 3]));
    }

    #[test]
    fn test_light_gizmos() {
        let (_device, mut lines) = renderer();
        lines.draw_light(&Light::directional(Vec3::new(0.0, -1.0, 0.0)));
        assert_eq!(lines.batches()[0].segments.len(), 3);
        assert_relative_eq!(lines.batches()[0].segments[0][1], Vec3::new(0.0, -1.0, 0.0));

        lines.clear();
        lines.draw_light(&Light::point(Vec3::new(1.0, 2.0, 3.0)));
        assert_eq!(lines.batches()[0].segments.len(), 3);

        lines.clear();
        let spot = Light::spot(Vec3::zeros());
        lines.draw_light(&spot);
        let segments = &lines.batches()[0].segments;
        assert_eq!(segments.len(), CONE_SEGMENTS + 4);
        // Rim points lie on the base circle of the outer cone
        let radius = (segments[0][0] - Vec3::new(0.0, -1.0, 0.0)).norm();
        assert_relative_eq!(radius, 14.0_f32.to_radians().tan(), epsilon = 1e-5);
    }

    #[test]
    fn test_render_draws_and_clears_batches() {
        let (mut device, mut lines) = renderer();
        let size = Vec2i::new(8, 8);
        let allocator = device.allocator();
        let mut target = allocator.create_render_target(size, 1).unwrap();
        let color = allocator.create_texture_buffer(TextureAttributes::new(size, ColorFormat::Rgba)).unwrap();
        target.attach_color(0, color.as_ref()).unwrap();

        let camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0)).with_aspect(1.0);
        lines.draw_line(Vec3::new(-2.0, 0.1, 0.0), Vec3::new(2.0, 0.1, 0.0), ColorRGBA::WHITE);
        lines.render(&mut device, target.as_ref(), &camera).unwrap();

        assert!(lines.batches().is_empty());
        let image = color.download_rgba().unwrap();
        assert!(image.pixels().iter().any(|p| *p == ColorRGBA::WHITE));
    }
}
