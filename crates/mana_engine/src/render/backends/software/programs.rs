//! Built-in program catalogue
//!
//! The software backend does not compile shader text. Each logical stage name
//! maps to a kernel written in Rust that follows the same uniform contract as
//! the GPU programs. Before a draw the program's uniforms are read once into a
//! prepared kernel so the per-vertex and per-fragment paths never touch the
//! uniform table.
//!
//! | stage    | names                                                         |
//! |----------|---------------------------------------------------------------|
//! | vertex   | `mesh`, `skybox`, `screen`, `ui`, `debug`                     |
//! | geometry | `lines`, `normals`                                            |
//! | fragment | `geometry`, `geometry_normal_map`, `skybox`, `phong_shade`,   |
//! |          | `lighting`, `forward`, `unlit`, `composite`, `compositor`,    |
//! |          | `debug_line`, `ui`                                            |

use std::cell::Ref;
use std::ops::{Add, Mul};

use super::shader::SoftwareShaderProgram;
use super::texture::TextureData;
use crate::foundation::math::{Mat3, Mat4, Vec2, Vec3, Vec4};
use crate::render::api::uniforms::{self, MAX_LAYER_COLORS};
use crate::render::primitives::light::shade_all;
use crate::render::primitives::{Light, Shading, Surface, Vertex};
use crate::render::{BackendResult, RenderError};

/// Most color outputs a fragment kernel writes
pub(crate) const MAX_OUTPUTS: usize = 8;

/// Values interpolated across a primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Varyings {
    pub(crate) world: Vec3,
    pub(crate) normal: Vec3,
    pub(crate) uv: Vec2,
    pub(crate) tangent: Vec3,
    pub(crate) bitangent: Vec3,
    pub(crate) color: Vec4,
}

impl Default for Varyings {
    fn default() -> Self {
        Self {
            world: Vec3::zeros(),
            normal: Vec3::zeros(),
            uv: Vec2::zeros(),
            tangent: Vec3::zeros(),
            bitangent: Vec3::zeros(),
            color: Vec4::zeros(),
        }
    }
}

impl Add for Varyings {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            world: self.world + rhs.world,
            normal: self.normal + rhs.normal,
            uv: self.uv + rhs.uv,
            tangent: self.tangent + rhs.tangent,
            bitangent: self.bitangent + rhs.bitangent,
            color: self.color + rhs.color,
        }
    }
}

impl Mul<f32> for Varyings {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self {
            world: self.world * rhs,
            normal: self.normal * rhs,
            uv: self.uv * rhs,
            tangent: self.tangent * rhs,
            bitangent: self.bitangent * rhs,
            color: self.color * rhs,
        }
    }
}

/// Output of the vertex stage
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ClipVertex {
    pub(crate) clip: Vec4,
    pub(crate) varyings: Varyings,
}

impl ClipVertex {
    pub(crate) fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            clip: self.clip.lerp(&other.clip, t),
            varyings: self.varyings * (1.0 - t) + other.varyings * t,
        }
    }
}

/// Primitive handed to the rasterizer
#[derive(Debug, Clone, Copy)]
pub(crate) enum Assembled {
    Triangle([ClipVertex; 3]),
    Line([ClipVertex; 2]),
}

/// Textures of the current command, borrowed for the whole draw
pub(crate) struct Samplers<'a> {
    textures: Vec<Ref<'a, TextureData>>,
}

impl<'a> Samplers<'a> {
    pub(crate) fn new(textures: Vec<Ref<'a, TextureData>>) -> Self {
        Self { textures }
    }

    fn sample(&self, unit: Option<usize>, uv: &Vec2) -> Vec4 {
        unit.and_then(|unit| self.textures.get(unit))
            .map_or_else(Vec4::zeros, |texture| texture.sample(0, uv))
    }

    fn sample_cube(&self, unit: Option<usize>, direction: &Vec3) -> Vec4 {
        unit.and_then(|unit| self.textures.get(unit))
            .map_or_else(Vec4::zeros, |texture| texture.sample_cube(direction))
    }
}

/// Texture unit bound to sampler `name`, checked against the command
fn bind(program: &SoftwareShaderProgram, name: &str, units: usize) -> BackendResult<Option<usize>> {
    match program.sampler(name) {
        Some(unit) if unit >= units => Err(RenderError::RenderingFailed(format!(
            "sampler {name} uses texture unit {unit} but the command has {units} textures"
        ))),
        unit => Ok(unit),
    }
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|name| (*name).to_string()).collect()
}

fn normalized(v: Vec3) -> Vec3 {
    v.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::zeros)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VertexStage {
    /// Model transform with normal and tangent basis
    Mesh,
    /// Cube around the camera, varyings carry the sample direction
    Skybox,
    /// Positions already in clip space
    Screen,
    /// Pixel positions with vertex color packed in normal and tangent
    Ui,
    /// Mesh transform under debug uniform names
    Debug,
}

impl VertexStage {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "mesh" => Some(Self::Mesh),
            "skybox" => Some(Self::Skybox),
            "screen" => Some(Self::Screen),
            "ui" => Some(Self::Ui),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub(crate) fn uniforms(self) -> Vec<String> {
        match self {
            Self::Mesh => names(&[
                uniforms::MODEL,
                uniforms::VIEW,
                uniforms::PROJECTION,
                uniforms::MODEL_VIEW_PROJECTION,
                uniforms::MODEL_INVERSE,
            ]),
            Self::Skybox => names(&[uniforms::VIEW, uniforms::PROJECTION, uniforms::VIEW_TRANSLATION]),
            Self::Screen => Vec::new(),
            Self::Ui => names(&[uniforms::PROJECTION]),
            Self::Debug => names(&["MODEL", "VIEW", "PROJECTION"]),
        }
    }
}

pub(crate) struct VertexKernel {
    stage: VertexStage,
    model: Mat4,
    normal_matrix: Mat3,
    view_projection: Mat4,
}

impl VertexKernel {
    pub(crate) fn prepare(program: &SoftwareShaderProgram) -> Self {
        let (model, view_projection) = match program.vertex {
            VertexStage::Mesh => (
                program.mat4(uniforms::MODEL),
                program.mat4(uniforms::PROJECTION) * program.mat4(uniforms::VIEW),
            ),
            VertexStage::Skybox => (
                Mat4::identity(),
                program.mat4(uniforms::PROJECTION)
                    * program.mat4(uniforms::VIEW)
                    * program.mat4(uniforms::VIEW_TRANSLATION),
            ),
            VertexStage::Screen => (Mat4::identity(), Mat4::identity()),
            VertexStage::Ui => (Mat4::identity(), program.mat4(uniforms::PROJECTION)),
            VertexStage::Debug => (
                program.mat4("MODEL"),
                program.mat4("PROJECTION") * program.mat4("VIEW"),
            ),
        };
        Self {
            stage: program.vertex,
            model,
            normal_matrix: normal_matrix(&model),
            view_projection,
        }
    }

    /// Kernel for one instance of an instanced draw
    pub(crate) fn for_instance(&self, instance: &Mat4) -> Self {
        let model = match self.stage {
            VertexStage::Mesh | VertexStage::Debug => self.model * instance,
            _ => self.model,
        };
        Self {
            stage: self.stage,
            model,
            normal_matrix: normal_matrix(&model),
            view_projection: self.view_projection,
        }
    }

    pub(crate) fn run(&self, vertex: &Vertex) -> ClipVertex {
        let position = vertex.position();
        match self.stage {
            VertexStage::Mesh | VertexStage::Debug => {
                let world = self.model * position.push(1.0);
                let linear = self.model.fixed_view::<3, 3>(0, 0).into_owned();
                ClipVertex {
                    clip: self.view_projection * world,
                    varyings: Varyings {
                        world: world.xyz(),
                        normal: normalized(self.normal_matrix * vertex.normal()),
                        uv: vertex.uv(),
                        tangent: normalized(linear * Vec3::from(vertex.tangent)),
                        bitangent: normalized(linear * Vec3::from(vertex.bitangent)),
                        color: Vec4::zeros(),
                    },
                }
            }
            VertexStage::Skybox => ClipVertex {
                clip: self.view_projection * position.push(1.0),
                varyings: Varyings {
                    world: position,
                    ..Varyings::default()
                },
            },
            VertexStage::Screen => ClipVertex {
                clip: position.push(1.0),
                varyings: Varyings {
                    uv: vertex.uv(),
                    ..Varyings::default()
                },
            },
            VertexStage::Ui => ClipVertex {
                clip: self.view_projection * position.push(1.0),
                varyings: Varyings {
                    uv: vertex.uv(),
                    color: vertex.normal().push(vertex.tangent[0]),
                    ..Varyings::default()
                },
            },
        }
    }
}

fn normal_matrix(model: &Mat4) -> Mat3 {
    let linear: Mat3 = model.fixed_view::<3, 3>(0, 0).into_owned();
    linear
        .try_inverse()
        .map_or_else(Mat3::identity, |inverse| inverse.transpose())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GeometryStage {
    /// Degenerate triangles `(a, b, b)` become the segment `a -> b`
    Lines,
    /// Normal, tangent and bitangent segments at every vertex
    Normals,
}

impl GeometryStage {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "lines" => Some(Self::Lines),
            "normals" => Some(Self::Normals),
            _ => None,
        }
    }

    pub(crate) fn uniforms(self) -> Vec<String> {
        match self {
            Self::Lines => names(&["color"]),
            Self::Normals => names(&["scale", "hasNormalTexture", "normal", "VIEW", "PROJECTION"]),
        }
    }
}

pub(crate) enum GeometryKernel {
    Lines {
        color: Vec4,
    },
    Normals {
        scale: f32,
        normal_map: Option<usize>,
        view_projection: Mat4,
    },
}

const NORMAL_COLOR: Vec4 = Vec4::new(0.0, 0.0, 1.0, 1.0);
const TANGENT_COLOR: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);
const BITANGENT_COLOR: Vec4 = Vec4::new(0.0, 1.0, 0.0, 1.0);
const MAPPED_NORMAL_COLOR: Vec4 = Vec4::new(1.0, 1.0, 0.0, 1.0);

impl GeometryKernel {
    pub(crate) fn prepare(
        stage: GeometryStage,
        program: &SoftwareShaderProgram,
        units: usize,
    ) -> BackendResult<Self> {
        Ok(match stage {
            GeometryStage::Lines => Self::Lines {
                color: program.vec4("color"),
            },
            GeometryStage::Normals => Self::Normals {
                scale: program.float("scale"),
                normal_map: if program.flag("hasNormalTexture") {
                    bind(program, "normal", units)?
                } else {
                    None
                },
                view_projection: program.mat4("PROJECTION") * program.mat4("VIEW"),
            },
        })
    }

    pub(crate) fn run(&self, triangle: &[ClipVertex; 3], samplers: &Samplers<'_>, out: &mut Vec<Assembled>) {
        match self {
            Self::Lines { color } => {
                let mut ends = [triangle[0], triangle[1]];
                for end in &mut ends {
                    end.varyings.color = *color;
                }
                out.push(Assembled::Line(ends));
            }
            Self::Normals { scale, normal_map, view_projection } => {
                let segment = |origin: &Varyings, direction: Vec3, color: Vec4| {
                    let tip = origin.world + direction * *scale;
                    let end = |point: Vec3| ClipVertex {
                        clip: view_projection * point.push(1.0),
                        varyings: Varyings { color, ..*origin },
                    };
                    Assembled::Line([end(origin.world), end(tip)])
                };
                for vertex in triangle {
                    let v = &vertex.varyings;
                    if normal_map.is_some() {
                        let mapped = perturbed_normal(v, &samplers.sample(*normal_map, &v.uv));
                        out.push(segment(v, mapped, MAPPED_NORMAL_COLOR));
                    } else {
                        out.push(segment(v, v.normal, NORMAL_COLOR));
                        out.push(segment(v, v.tangent, TANGENT_COLOR));
                        out.push(segment(v, v.bitangent, BITANGENT_COLOR));
                    }
                }
            }
        }
    }
}

/// Tangent space normal map sample moved into world space through the TBN basis
fn perturbed_normal(varyings: &Varyings, sample: &Vec4) -> Vec3 {
    let tn = sample.xyz() * 2.0 - Vec3::repeat(1.0);
    normalized(
        normalized(varyings.tangent) * tn.x
            + normalized(varyings.bitangent) * tn.y
            + normalized(varyings.normal) * tn.z,
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FragmentStage {
    Geometry,
    GeometryNormalMap,
    Skybox,
    PhongShade,
    Lighting,
    Forward,
    Unlit,
    Composite,
    Compositor,
    DebugLine,
    Ui,
}

const MATERIAL_SAMPLERS: [&str; 5] = ["diffuse", "ambient", "specular", "shininess", "emissive"];
const MATERIAL_COLORS: [&str; 5] = [
    "diffuseColor",
    "ambientColor",
    "specularColor",
    "shininessValue",
    "emissiveColor",
];
const GBUFFER_SAMPLERS: [&str; 6] = ["position", "normal", "diffuse", "specular", "shininess", "depth"];
const COMPOSITE_SAMPLERS: [&str; 7] = [
    "depth",
    "phong_ambient",
    "phong_diffuse",
    "phong_specular",
    "forward",
    "forward_depth",
    "skybox",
];

impl FragmentStage {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "geometry" => Some(Self::Geometry),
            "geometry_normal_map" => Some(Self::GeometryNormalMap),
            "skybox" => Some(Self::Skybox),
            "phong_shade" => Some(Self::PhongShade),
            "lighting" => Some(Self::Lighting),
            "forward" => Some(Self::Forward),
            "unlit" => Some(Self::Unlit),
            "composite" => Some(Self::Composite),
            "compositor" => Some(Self::Compositor),
            "debug_line" => Some(Self::DebugLine),
            "ui" => Some(Self::Ui),
            _ => None,
        }
    }

    pub(crate) fn uniforms(self) -> Vec<String> {
        match self {
            Self::Geometry => names(&MATERIAL_SAMPLERS).into_iter().chain(names(&MATERIAL_COLORS)).collect(),
            Self::GeometryNormalMap => names(&MATERIAL_SAMPLERS)
                .into_iter()
                .chain(names(&MATERIAL_COLORS))
                .chain(names(&["normal"]))
                .collect(),
            Self::Skybox => names(&["skybox"]),
            Self::PhongShade => names(&GBUFFER_SAMPLERS)
                .into_iter()
                .chain(uniforms::light_uniform_names())
                .collect(),
            Self::Lighting => names(&GBUFFER_SAMPLERS)
                .into_iter()
                .chain(names(&["id"]))
                .chain(uniforms::light_uniform_names())
                .collect(),
            Self::Forward => names(&["diffuse", "diffuseColor", "specularColor", "shininessValue"])
                .into_iter()
                .chain(uniforms::light_uniform_names())
                .collect(),
            Self::Unlit => names(&["color"]),
            Self::Composite => names(&COMPOSITE_SAMPLERS),
            Self::Compositor => {
                let mut list = names(&[
                    uniforms::LAYER_COLOR_COUNT,
                    uniforms::LAYER_HAS_DEPTH,
                    uniforms::LAYER_DEPTH,
                ]);
                list.extend((0..MAX_LAYER_COLORS).map(uniforms::layer_color));
                list
            }
            Self::DebugLine => Vec::new(),
            Self::Ui => names(&["texture"]),
        }
    }
}

/// Colors and optional depth written by a fragment
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct FragmentOutput {
    pub(crate) colors: [Vec4; MAX_OUTPUTS],
    pub(crate) count: usize,
    pub(crate) depth: Option<f32>,
}

impl FragmentOutput {
    fn new(colors: &[Vec4]) -> Self {
        let mut output = Self {
            colors: [Vec4::zeros(); MAX_OUTPUTS],
            count: colors.len().min(MAX_OUTPUTS),
            depth: None,
        };
        output.colors[..output.count].copy_from_slice(&colors[..output.count]);
        output
    }

    fn with_depth(mut self, depth: f32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Color written to output `index`, `None` past the kernel's outputs
    pub(crate) fn color(&self, index: usize) -> Option<&Vec4> {
        self.colors[..self.count].get(index)
    }
}

/// Material input of the geometry kernels: a texture unit plus a flat value
#[derive(Debug, Clone, Copy)]
pub(crate) struct MaterialInput {
    unit: Option<usize>,
    flat: Vec4,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct GBufferInputs {
    position: Option<usize>,
    normal: Option<usize>,
    diffuse: Option<usize>,
    specular: Option<usize>,
    shininess: Option<usize>,
    depth: Option<usize>,
}

impl GBufferInputs {
    fn bind(program: &SoftwareShaderProgram, units: usize) -> BackendResult<Self> {
        Ok(Self {
            position: bind(program, "position", units)?,
            normal: bind(program, "normal", units)?,
            diffuse: bind(program, "diffuse", units)?,
            specular: bind(program, "specular", units)?,
            shininess: bind(program, "shininess", units)?,
            depth: bind(program, "depth", units)?,
        })
    }

    fn surface(&self, samplers: &Samplers<'_>, uv: &Vec2) -> Surface {
        Surface {
            position: samplers.sample(self.position, uv).xyz(),
            normal: samplers.sample(self.normal, uv).xyz(),
            diffuse: samplers.sample(self.diffuse, uv),
            specular: samplers.sample(self.specular, uv),
            shininess: samplers.sample(self.shininess, uv).x,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LightInputs {
    lights: Vec<Light>,
    view_position: Vec3,
}

impl LightInputs {
    fn read(program: &SoftwareShaderProgram) -> Self {
        Self {
            lights: uniforms::read_lights(program),
            view_position: program.vec3(uniforms::VIEW_POSITION),
        }
    }

    fn shade(&self, surface: &Surface) -> Shading {
        shade_all(&self.lights, surface, &self.view_position)
    }
}

pub(crate) enum FragmentKernel {
    Geometry {
        /// diffuse, ambient, specular, shininess, emissive
        material: [MaterialInput; 5],
        normal_map: Option<usize>,
    },
    Skybox {
        cube: Option<usize>,
    },
    PhongShade {
        gbuffer: GBufferInputs,
        lights: LightInputs,
    },
    Lighting {
        gbuffer: GBufferInputs,
        id: Option<usize>,
        lights: LightInputs,
    },
    Forward {
        diffuse: MaterialInput,
        specular: Vec4,
        shininess: f32,
        lights: LightInputs,
    },
    Unlit {
        color: Vec4,
    },
    Composite {
        units: [Option<usize>; 7],
    },
    Compositor {
        colors: Vec<usize>,
        depth: Option<usize>,
    },
    DebugLine,
    Ui {
        texture: Option<usize>,
    },
}

impl FragmentKernel {
    pub(crate) fn prepare(program: &SoftwareShaderProgram, units: usize) -> BackendResult<Self> {
        Ok(match program.fragment {
            FragmentStage::Geometry | FragmentStage::GeometryNormalMap => {
                let mut material = [MaterialInput { unit: None, flat: Vec4::zeros() }; 5];
                for (slot, (sampler, flat)) in material.iter_mut().zip(MATERIAL_SAMPLERS.iter().zip(MATERIAL_COLORS)) {
                    slot.unit = bind(program, sampler, units)?;
                    slot.flat = match program.value(flat).and_then(|v| v.as_float()) {
                        Some(value) => Vec4::new(value, 0.0, 0.0, 0.0),
                        None => program.vec4(flat),
                    };
                }
                let normal_map = if program.fragment == FragmentStage::GeometryNormalMap {
                    bind(program, "normal", units)?
                } else {
                    None
                };
                Self::Geometry { material, normal_map }
            }
            FragmentStage::Skybox => Self::Skybox {
                cube: bind(program, "skybox", units)?,
            },
            FragmentStage::PhongShade => Self::PhongShade {
                gbuffer: GBufferInputs::bind(program, units)?,
                lights: LightInputs::read(program),
            },
            FragmentStage::Lighting => Self::Lighting {
                gbuffer: GBufferInputs::bind(program, units)?,
                id: bind(program, "id", units)?,
                lights: LightInputs::read(program),
            },
            FragmentStage::Forward => Self::Forward {
                diffuse: MaterialInput {
                    unit: bind(program, "diffuse", units)?,
                    flat: program.vec4("diffuseColor"),
                },
                specular: program.vec4("specularColor"),
                shininess: program.float("shininessValue"),
                lights: LightInputs::read(program),
            },
            FragmentStage::Unlit => Self::Unlit {
                color: program.vec4("color"),
            },
            FragmentStage::Composite => {
                let mut bound = [None; 7];
                for (slot, name) in bound.iter_mut().zip(COMPOSITE_SAMPLERS) {
                    *slot = bind(program, name, units)?;
                }
                Self::Composite { units: bound }
            }
            FragmentStage::Compositor => {
                let count = (program.int(uniforms::LAYER_COLOR_COUNT).max(0) as usize).min(MAX_LAYER_COLORS);
                let mut colors = Vec::with_capacity(count);
                for index in 0..count {
                    if let Some(unit) = bind(program, &uniforms::layer_color(index), units)? {
                        colors.push(unit);
                    }
                }
                let depth = if program.flag(uniforms::LAYER_HAS_DEPTH) {
                    bind(program, uniforms::LAYER_DEPTH, units)?
                } else {
                    None
                };
                Self::Compositor { colors, depth }
            }
            FragmentStage::DebugLine => Self::DebugLine,
            FragmentStage::Ui => Self::Ui {
                texture: bind(program, "texture", units)?,
            },
        })
    }

    pub(crate) fn shade(&self, input: &Varyings, samplers: &Samplers<'_>) -> FragmentOutput {
        let uv = &input.uv;
        match self {
            Self::Geometry { material, normal_map } => {
                let [diffuse, ambient, specular, shininess, emissive] =
                    material.map(|m| samplers.sample(m.unit, uv) + m.flat);
                let normal = match normal_map {
                    Some(_) => perturbed_normal(input, &samplers.sample(*normal_map, uv)),
                    None => normalized(input.normal),
                };
                FragmentOutput::new(&[
                    input.world.push(1.0),
                    normal.push(1.0),
                    diffuse,
                    ambient,
                    specular,
                    Vec4::new(shininess.x, 0.0, 0.0, 1.0),
                    emissive,
                    Vec4::new(1.0, 0.0, 0.0, 1.0),
                ])
            }
            Self::Skybox { cube } => FragmentOutput::new(&[samplers.sample_cube(*cube, &input.world)]),
            Self::PhongShade { gbuffer, lights } => {
                let covered = samplers.sample(gbuffer.depth, uv).x < 1.0;
                if !covered {
                    return FragmentOutput::new(&[Vec4::zeros(); 4]);
                }
                let shading = lights.shade(&gbuffer.surface(samplers, uv));
                FragmentOutput::new(&[
                    shading.ambient.push(1.0),
                    shading.diffuse.push(1.0),
                    shading.specular.push(1.0),
                    shading.combined().push(1.0),
                ])
            }
            Self::Lighting { gbuffer, id, lights } => {
                let surface = gbuffer.surface(samplers, uv);
                if samplers.sample(*id, uv).x == 0.0 {
                    return FragmentOutput::new(&[surface.diffuse]);
                }
                let shading = lights.shade(&surface);
                FragmentOutput::new(&[shading.combined().push(surface.diffuse.w)])
            }
            Self::Forward { diffuse, specular, shininess, lights } => {
                let diffuse = samplers.sample(diffuse.unit, uv) + diffuse.flat;
                let surface = Surface {
                    position: input.world,
                    normal: normalized(input.normal),
                    diffuse,
                    specular: *specular,
                    shininess: *shininess,
                };
                FragmentOutput::new(&[lights.shade(&surface).combined().push(diffuse.w)])
            }
            Self::Unlit { color } => FragmentOutput::new(&[*color]),
            Self::Composite { units } => {
                let [depth, ambient, diffuse, specular, forward, forward_depth, skybox] =
                    units.map(|unit| samplers.sample(unit, uv));
                let (deferred_depth, forward_depth) = (depth.x, forward_depth.x);
                if deferred_depth >= 1.0 && forward_depth >= 1.0 {
                    FragmentOutput::new(&[skybox]).with_depth(1.0)
                } else if deferred_depth < forward_depth {
                    let color = (ambient + diffuse + specular).xyz().push(1.0);
                    FragmentOutput::new(&[color]).with_depth(deferred_depth)
                } else {
                    FragmentOutput::new(&[forward]).with_depth(forward_depth)
                }
            }
            Self::Compositor { colors, depth } => {
                let mut color = colors
                    .iter()
                    .fold(Vec4::zeros(), |sum, unit| sum + samplers.sample(Some(*unit), uv));
                color.w = if color.w > 0.0 { 1.0 } else { 0.0 };
                let depth = match depth {
                    Some(_) => samplers.sample(*depth, uv).x,
                    None => 1.0,
                };
                FragmentOutput::new(&[color]).with_depth(depth)
            }
            Self::DebugLine => FragmentOutput::new(&[input.color]),
            Self::Ui { texture } => {
                let sample = match texture {
                    Some(_) => samplers.sample(*texture, uv),
                    None => Vec4::repeat(1.0),
                };
                FragmentOutput::new(&[input.color.component_mul(&sample)])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_catalogue_lookup() {
        assert_eq!(VertexStage::from_name("skybox"), Some(VertexStage::Skybox));
        assert_eq!(GeometryStage::from_name("normals"), Some(GeometryStage::Normals));
        assert_eq!(FragmentStage::from_name("phong_shade"), Some(FragmentStage::PhongShade));
        assert_eq!(FragmentStage::from_name("missing"), None);
    }

    #[test]
    fn test_compositor_declares_every_layer_slot() {
        let declared = FragmentStage::Compositor.uniforms();
        assert!(declared.contains(&"globals.layer.color[14]".to_string()));
        assert!(!declared.contains(&"globals.layer.color[15]".to_string()));
    }

    #[test]
    fn test_varyings_interpolate() {
        let a = ClipVertex {
            clip: Vec4::new(0.0, 0.0, 0.0, 1.0),
            varyings: Varyings { uv: Vec2::new(0.0, 0.0), ..Varyings::default() },
        };
        let b = ClipVertex {
            clip: Vec4::new(2.0, 0.0, 0.0, 1.0),
            varyings: Varyings { uv: Vec2::new(1.0, 1.0), ..Varyings::default() },
        };
        let mid = a.lerp(&b, 0.5);
        assert_relative_eq!(mid.clip.x, 1.0);
        assert_relative_eq!(mid.varyings.uv, Vec2::new(0.5, 0.5));
    }

    #[test]
    fn test_flat_normal_map_keeps_normal() {
        let varyings = Varyings {
            normal: Vec3::z(),
            tangent: Vec3::x(),
            bitangent: Vec3::y(),
            ..Varyings::default()
        };
        let flat = Vec4::new(0.5, 0.5, 1.0, 1.0);
        assert_relative_eq!(perturbed_normal(&varyings, &flat), Vec3::z(), epsilon = 1e-6);
    }

    #[test]
    fn test_fragment_output_slots() {
        let output = FragmentOutput::new(&[Vec4::x(), Vec4::y()]);
        assert_eq!(output.color(1), Some(&Vec4::y()));
        assert_eq!(output.color(2), None);
        assert_eq!(output.depth, None);
    }
}
