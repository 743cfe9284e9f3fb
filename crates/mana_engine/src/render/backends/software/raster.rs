//! Triangle and line rasterization
//!
//! Clip space in, quantized texels out. Triangles are clipped against the
//! near plane, mapped through the viewport and filled at pixel centers with
//! a top-left fill rule, so two triangles sharing an edge never both cover a
//! pixel. Varyings are interpolated perspective correct; depth is linear in
//! screen space.

use std::cell::RefMut;

use super::programs::{ClipVertex, FragmentKernel, FragmentOutput, Samplers, Varyings};
use super::texture::TextureData;
use crate::foundation::math::{Vec2, Vec2i, Vec4};
use crate::render::api::{FaceCullingMode, RenderProperties};

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Viewport {
    pub(crate) offset: Vec2i,
    pub(crate) size: Vec2i,
}

/// A color texture bound for writing and the fragment output it receives
pub(crate) struct ColorSink<'a> {
    pub(crate) output: usize,
    pub(crate) face: usize,
    pub(crate) data: RefMut<'a, TextureData>,
}

/// Depth texture bound for testing and writing
pub(crate) struct DepthSink<'a> {
    pub(crate) face: usize,
    pub(crate) data: RefMut<'a, TextureData>,
}

/// Everything one draw writes into
pub(crate) struct Frame<'a> {
    pub(crate) size: Vec2i,
    pub(crate) viewport: Viewport,
    pub(crate) colors: Vec<ColorSink<'a>>,
    pub(crate) depth: Option<DepthSink<'a>>,
}

/// Vertex after the perspective divide and viewport mapping
#[derive(Debug, Clone, Copy)]
struct ScreenVertex {
    position: Vec2,
    depth: f32,
    inv_w: f32,
    varyings: Varyings,
}

/// Per draw state shared by every primitive
pub(crate) struct Rasterizer<'f, 'a, 's> {
    pub(crate) frame: &'f mut Frame<'a>,
    pub(crate) properties: RenderProperties,
    pub(crate) fragment: &'f FragmentKernel,
    pub(crate) samplers: &'f Samplers<'s>,
}

impl Rasterizer<'_, '_, '_> {
    pub(crate) fn triangle(&mut self, triangle: &[ClipVertex; 3]) {
        let polygon = clip_near(triangle);
        if polygon.len() < 3 {
            return;
        }
        let screen: Vec<ScreenVertex> = polygon.iter().map(|v| self.to_screen(v)).collect();
        for i in 1..screen.len() - 1 {
            self.fill([screen[0], screen[i], screen[i + 1]]);
        }
    }

    pub(crate) fn line(&mut self, line: &[ClipVertex; 2]) {
        let [mut a, mut b] = *line;
        let (da, db) = (near_distance(&a), near_distance(&b));
        if da < 0.0 && db < 0.0 {
            return;
        }
        if da < 0.0 {
            a = a.lerp(&b, da / (da - db));
        } else if db < 0.0 {
            b = b.lerp(&a, db / (db - da));
        }

        let (a, b) = (self.to_screen(&a), self.to_screen(&b));
        let delta = b.position - a.position;
        let steps = delta.x.abs().max(delta.y.abs()).ceil().max(1.0) as usize;
        for step in 0..=steps {
            let t = step as f32 / steps as f32;
            let point = a.position + delta * t;
            let (x, y) = (point.x.floor() as i32, point.y.floor() as i32);
            let depth = a.depth + (b.depth - a.depth) * t;
            let wa = (1.0 - t) * a.inv_w;
            let wb = t * b.inv_w;
            let sum = wa + wb;
            if sum <= 0.0 {
                continue;
            }
            let varyings = a.varyings * (wa / sum) + b.varyings * (wb / sum);
            self.shade_pixel(x, y, depth, &varyings);
        }
    }

    fn to_screen(&self, vertex: &ClipVertex) -> ScreenVertex {
        let w = if vertex.clip.w.abs() < f32::EPSILON {
            f32::EPSILON
        } else {
            vertex.clip.w
        };
        let ndc = vertex.clip.xyz() / w;
        let viewport = &self.frame.viewport;
        ScreenVertex {
            position: Vec2::new(
                viewport.offset.x as f32 + (ndc.x * 0.5 + 0.5) * viewport.size.x as f32,
                viewport.offset.y as f32 + (ndc.y * 0.5 + 0.5) * viewport.size.y as f32,
            ),
            depth: ndc.z * 0.5 + 0.5,
            inv_w: 1.0 / w,
            varyings: vertex.varyings,
        }
    }

    fn fill(&mut self, vertices: [ScreenVertex; 3]) {
        let [a, b, c] = vertices;
        let area = edge(&a.position, &b.position, &c.position);
        if area.abs() <= f32::EPSILON {
            return;
        }
        let front_facing = area > 0.0;
        if self.properties.enable_face_culling {
            let culled = match self.properties.face_culling_mode {
                FaceCullingMode::Back => !front_facing,
                FaceCullingMode::Front => front_facing,
                FaceCullingMode::FrontAndBack => true,
            };
            if culled {
                return;
            }
        }

        // Rewind clockwise triangles so every edge has the interior on its left
        let (a, b, c, area) = if front_facing { (a, b, c, area) } else { (a, c, b, -area) };

        let bounds = self.bounds(&[a.position, b.position, c.position]);
        let Some((min, max)) = bounds else {
            return;
        };
        let edges = [(b, c), (c, a), (a, b)];
        for y in min.y..max.y {
            for x in min.x..max.x {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let mut weights = [0.0f32; 3];
                let mut inside = true;
                for (weight, (from, to)) in weights.iter_mut().zip(&edges) {
                    let e = edge(&from.position, &to.position, &p);
                    if e < 0.0 || (e == 0.0 && !is_top_left(&from.position, &to.position)) {
                        inside = false;
                        break;
                    }
                    *weight = e / area;
                }
                if !inside {
                    continue;
                }

                let depth = weights[0] * a.depth + weights[1] * b.depth + weights[2] * c.depth;
                let perspective = [
                    weights[0] * a.inv_w,
                    weights[1] * b.inv_w,
                    weights[2] * c.inv_w,
                ];
                let sum: f32 = perspective.iter().sum();
                if sum <= 0.0 {
                    continue;
                }
                let varyings = a.varyings * (perspective[0] / sum)
                    + b.varyings * (perspective[1] / sum)
                    + c.varyings * (perspective[2] / sum);
                self.shade_pixel(x, y, depth, &varyings);
            }
        }
    }

    /// Pixel rectangle `[min, max)` covering `points`, clipped to the viewport
    /// and the frame
    fn bounds(&self, points: &[Vec2]) -> Option<(Vec2i, Vec2i)> {
        let viewport = &self.frame.viewport;
        let lo = Vec2i::new(
            viewport.offset.x.max(0),
            viewport.offset.y.max(0),
        );
        let hi = Vec2i::new(
            (viewport.offset.x + viewport.size.x).min(self.frame.size.x),
            (viewport.offset.y + viewport.size.y).min(self.frame.size.y),
        );
        let (mut min, mut max) = (Vec2::repeat(f32::MAX), Vec2::repeat(f32::MIN));
        for p in points {
            min = min.inf(p);
            max = max.sup(p);
        }
        let min = Vec2i::new((min.x.floor() as i32).max(lo.x), (min.y.floor() as i32).max(lo.y));
        let max = Vec2i::new((max.x.ceil() as i32).min(hi.x), (max.y.ceil() as i32).min(hi.y));
        (min.x < max.x && min.y < max.y).then_some((min, max))
    }

    fn inside_viewport(&self, x: i32, y: i32) -> bool {
        let viewport = &self.frame.viewport;
        x >= viewport.offset.x.max(0)
            && y >= viewport.offset.y.max(0)
            && x < (viewport.offset.x + viewport.size.x).min(self.frame.size.x)
            && y < (viewport.offset.y + viewport.size.y).min(self.frame.size.y)
    }

    fn shade_pixel(&mut self, x: i32, y: i32, depth: f32, varyings: &Varyings) {
        if !self.inside_viewport(x, y) || !(0.0..=1.0).contains(&depth) {
            return;
        }
        let output = self.fragment.shade(varyings, self.samplers);
        let depth = output.depth.unwrap_or(depth);
        if !self.depth_test(x, y, depth) {
            return;
        }
        self.write_colors(x, y, &output);
    }

    fn depth_test(&mut self, x: i32, y: i32, depth: f32) -> bool {
        let properties = self.properties;
        if !properties.enable_depth_test {
            return true;
        }
        let Some(sink) = self.frame.depth.as_mut() else {
            return true;
        };
        let Some(stored) = sink.data.fetch(sink.face, x, y) else {
            return false;
        };
        if !properties.depth_test_mode.passes(depth, stored.x) {
            return false;
        }
        if properties.depth_test_write {
            sink.data.store(sink.face, x, y, &Vec4::new(depth, stored.y, 0.0, 1.0));
        }
        true
    }

    fn write_colors(&mut self, x: i32, y: i32, output: &FragmentOutput) {
        let properties = self.properties;
        for sink in &mut self.frame.colors {
            let Some(source) = output.color(sink.output) else {
                continue;
            };
            let value = if properties.enable_blending {
                let destination = sink.data.fetch(sink.face, x, y).unwrap_or_else(Vec4::zeros);
                let source_factor = properties.blend_source_mode.factor(source, &destination);
                let destination_factor = properties.blend_destination_mode.factor(source, &destination);
                source.component_mul(&source_factor) + destination.component_mul(&destination_factor)
            } else {
                *source
            };
            sink.data.store(sink.face, x, y, &value);
        }
    }
}

/// Signed distance to the near plane in clip space, negative behind it
fn near_distance(vertex: &ClipVertex) -> f32 {
    vertex.clip.z + vertex.clip.w
}

/// Sutherland-Hodgman against `z > -w`
fn clip_near(triangle: &[ClipVertex; 3]) -> Vec<ClipVertex> {
    let mut polygon = Vec::with_capacity(4);
    for i in 0..3 {
        let current = &triangle[i];
        let next = &triangle[(i + 1) % 3];
        let (dc, dn) = (near_distance(current), near_distance(next));
        if dc >= 0.0 {
            polygon.push(*current);
        }
        if (dc >= 0.0) != (dn >= 0.0) {
            polygon.push(current.lerp(next, dc / (dc - dn)));
        }
    }
    polygon
}

/// Twice the signed area of `(a, b, p)`, positive when `p` is left of `a -> b`
fn edge(a: &Vec2, b: &Vec2, p: &Vec2) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Top and left edges own the pixels exactly on them
fn is_top_left(from: &Vec2, to: &Vec2) -> bool {
    let d = to - from;
    (d.y == 0.0 && d.x < 0.0) || d.y < 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32, z: f32, w: f32) -> ClipVertex {
        ClipVertex {
            clip: Vec4::new(x, y, z, w),
            varyings: Varyings::default(),
        }
    }

    #[test]
    fn test_near_clip_keeps_visible_triangle() {
        let triangle = [vertex(0.0, 0.0, 0.0, 1.0), vertex(1.0, 0.0, 0.0, 1.0), vertex(0.0, 1.0, 0.0, 1.0)];
        assert_eq!(clip_near(&triangle).len(), 3);
    }

    #[test]
    fn test_near_clip_splits_crossing_triangle() {
        let triangle = [vertex(0.0, 0.0, -2.0, 1.0), vertex(1.0, 0.0, 0.0, 1.0), vertex(0.0, 1.0, 0.0, 1.0)];
        let polygon = clip_near(&triangle);
        assert_eq!(polygon.len(), 4);
        assert!(polygon.iter().all(|v| near_distance(v) >= -1e-6));
    }

    #[test]
    fn test_near_clip_drops_hidden_triangle() {
        let triangle = [vertex(0.0, 0.0, -2.0, 1.0), vertex(1.0, 0.0, -3.0, 1.0), vertex(0.0, 1.0, -2.0, 1.0)];
        assert!(clip_near(&triangle).is_empty());
    }

    #[test]
    fn test_shared_edge_is_owned_once() {
        // Diagonal of a square through pixel centers
        let (a, b, c, d) = (
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
        );
        let p = Vec2::new(0.5, 0.5);
        let owned_by_first = edge(&c, &a, &p) == 0.0 && is_top_left(&c, &a);
        let owned_by_second = edge(&a, &c, &p) == 0.0 && is_top_left(&a, &c);
        assert!(owned_by_first != owned_by_second);
        assert!(edge(&a, &b, &c) > 0.0 && edge(&a, &c, &d) > 0.0);
    }
}
