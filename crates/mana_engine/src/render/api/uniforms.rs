//! Uniform naming contract shared by passes and backends
//!
//! Lighting programs declare three fixed size arrays of light structs, one
//! per light type, plus a count per type. Each type has its own index space:
//! the second point light is `MANA_LIGHTS_POINT[1]` no matter how many
//! directional lights precede it. Spot cut-off angles are uploaded as the
//! cosine of the angle.

use log::warn;

use super::shader_program::{ShaderProgram, UniformValue, MAX_LIGHTS};
use crate::foundation::math::{utils, Mat4, Vec3};
use crate::render::primitives::{Attenuation, Light, LightKind};

/// Model matrix
pub const MODEL: &str = "MANA_M";
/// View matrix
pub const VIEW: &str = "MANA_V";
/// Projection matrix
pub const PROJECTION: &str = "MANA_P";
/// Projection * view * model
pub const MODEL_VIEW_PROJECTION: &str = "MANA_MVP";
/// Inverse of the model matrix
pub const MODEL_INVERSE: &str = "MANA_M_INVERT";
/// Translation by the camera position, cancels the view translation
pub const VIEW_TRANSLATION: &str = "MANA_VIEW_TRANSLATION";
/// Camera position in world space
pub const VIEW_POSITION: &str = "MANA_VIEWPOS";

/// Most color textures one compositor layer can sum
pub const MAX_LAYER_COLORS: usize = 15;
/// Number of color samplers of the layer being composited
pub const LAYER_COLOR_COUNT: &str = "globals.layer.num_color";
/// Whether the layer has a depth texture
pub const LAYER_HAS_DEPTH: &str = "globals.layer.has_depth";
/// Depth sampler of the layer
pub const LAYER_DEPTH: &str = "globals.layer.depth";

/// Name of the `index`th color sampler of a compositor layer
pub fn layer_color(index: usize) -> String {
    format!("globals.layer.color[{index}]")
}

const DIRECTIONAL: &str = "DIRECTIONAL";
const POINT: &str = "POINT";
const SPOT: &str = "SPOT";

/// Name of a light count uniform, `kind` is `DIRECTIONAL`, `POINT` or `SPOT`
pub fn light_count(kind: &str) -> String {
    format!("MANA_LIGHT_COUNT_{kind}")
}

/// Name of one field of one light in a light array
pub fn light_field(kind: &str, index: usize, field: &str) -> String {
    format!("MANA_LIGHTS_{kind}[{index}].{field}")
}

const COLOR_FIELDS: [&str; 3] = ["ambient", "diffuse", "specular"];
const ATTENUATION_FIELDS: [&str; 3] = ["constantValue", "linearValue", "quadraticValue"];

/// Every uniform a lighting program declares
pub fn light_uniform_names() -> Vec<String> {
    let mut names = vec![
        VIEW_POSITION.to_string(),
        light_count(DIRECTIONAL),
        light_count(POINT),
        light_count(SPOT),
    ];
    for index in 0..MAX_LIGHTS {
        let mut push = |kind: &str, fields: &[&str]| {
            for field in fields {
                names.push(light_field(kind, index, field));
            }
        };
        push(DIRECTIONAL, &["direction"]);
        push(DIRECTIONAL, &COLOR_FIELDS);
        push(POINT, &["position"]);
        push(POINT, &COLOR_FIELDS);
        push(POINT, &ATTENUATION_FIELDS);
        push(SPOT, &["position", "direction", "cutOff", "outerCutOff"]);
        push(SPOT, &COLOR_FIELDS);
        push(SPOT, &ATTENUATION_FIELDS);
    }
    names
}

/// Write the matrix uniforms of a draw
pub fn upload_matrices(program: &mut dyn ShaderProgram, model: &Mat4, view: &Mat4, projection: &Mat4, camera_position: &Vec3) {
    program.set_mat4(MODEL, *model);
    program.set_mat4(VIEW, *view);
    program.set_mat4(PROJECTION, *projection);
    program.set_mat4(MODEL_VIEW_PROJECTION, projection * view * model);
    program.set_mat4(MODEL_INVERSE, model.try_inverse().unwrap_or_else(Mat4::identity));
    program.set_mat4(VIEW_TRANSLATION, Mat4::new_translation(camera_position));
    program.set_vec3(VIEW_POSITION, *camera_position);
}

/// Write `lights` into the light arrays of `program`
///
/// At most `limit` lights of each type are written (never more than
/// [`MAX_LIGHTS`]); the rest are dropped with a warning.
pub fn upload_lights(program: &mut dyn ShaderProgram, lights: &[Light], view_position: &Vec3, limit: usize) {
    let limit = limit.min(MAX_LIGHTS);
    let (mut directional, mut point, mut spot) = (0usize, 0usize, 0usize);
    let mut dropped = 0usize;

    for light in lights {
        let (kind, counter) = match light.kind {
            LightKind::Directional { .. } => (DIRECTIONAL, &mut directional),
            LightKind::Point { .. } => (POINT, &mut point),
            LightKind::Spot { .. } => (SPOT, &mut spot),
        };
        if *counter >= limit {
            dropped += 1;
            continue;
        }
        let index = *counter;
        *counter += 1;

        program.set_vec3(&light_field(kind, index, "ambient"), light.ambient);
        program.set_vec3(&light_field(kind, index, "diffuse"), light.diffuse);
        program.set_vec3(&light_field(kind, index, "specular"), light.specular);
        match light.kind {
            LightKind::Directional { direction } => {
                program.set_vec3(&light_field(kind, index, "direction"), direction);
            }
            LightKind::Point { position, attenuation } => {
                program.set_vec3(&light_field(kind, index, "position"), position);
                set_attenuation(program, kind, index, &attenuation);
            }
            LightKind::Spot { position, direction, cut_off, outer_cut_off, attenuation } => {
                program.set_vec3(&light_field(kind, index, "position"), position);
                program.set_vec3(&light_field(kind, index, "direction"), direction);
                program.set_float(&light_field(kind, index, "cutOff"), utils::deg_to_rad(cut_off).cos());
                program.set_float(
                    &light_field(kind, index, "outerCutOff"),
                    utils::deg_to_rad(outer_cut_off).cos(),
                );
                set_attenuation(program, kind, index, &attenuation);
            }
        }
    }

    if dropped > 0 {
        warn!("Dropped {dropped} lights over the per type limit of {limit}");
    }
    program.set_int(&light_count(DIRECTIONAL), directional as i32);
    program.set_int(&light_count(POINT), point as i32);
    program.set_int(&light_count(SPOT), spot as i32);
    program.set_vec3(VIEW_POSITION, *view_position);
}

fn set_attenuation(program: &mut dyn ShaderProgram, kind: &str, index: usize, attenuation: &Attenuation) {
    program.set_float(&light_field(kind, index, "constantValue"), attenuation.constant);
    program.set_float(&light_field(kind, index, "linearValue"), attenuation.linear);
    program.set_float(&light_field(kind, index, "quadraticValue"), attenuation.quadratic);
}

/// Rebuild the lights written by [`upload_lights`]
pub fn read_lights(program: &dyn ShaderProgram) -> Vec<Light> {
    let get = |name: &str| program.uniform_location(name).and_then(|l| program.uniform(l));
    let vec3 = |name: String| match get(&name) {
        Some(UniformValue::Vec3(v)) => v,
        _ => Vec3::zeros(),
    };
    let float = |name: String| get(&name).and_then(|v| v.as_float()).unwrap_or(0.0);
    let count = |kind: &str| {
        let count = get(&light_count(kind)).and_then(|v| v.as_int()).unwrap_or(0);
        (count.max(0) as usize).min(MAX_LIGHTS)
    };
    let attenuation = |kind: &str, index: usize| {
        Attenuation::new(
            float(light_field(kind, index, "constantValue")),
            float(light_field(kind, index, "linearValue")),
            float(light_field(kind, index, "quadraticValue")),
        )
    };
    let colors = |light: Light, kind: &str, index: usize| {
        light.with_colors(
            vec3(light_field(kind, index, "ambient")),
            vec3(light_field(kind, index, "diffuse")),
            vec3(light_field(kind, index, "specular")),
        )
    };
    let degrees = |cosine: f32| cosine.clamp(-1.0, 1.0).acos().to_degrees();

    let mut lights = Vec::new();
    for index in 0..count(DIRECTIONAL) {
        let light = Light::directional(vec3(light_field(DIRECTIONAL, index, "direction")));
        lights.push(colors(light, DIRECTIONAL, index));
    }
    for index in 0..count(POINT) {
        let light = Light {
            kind: LightKind::Point {
                position: vec3(light_field(POINT, index, "position")),
                attenuation: attenuation(POINT, index),
            },
            ..Light::point(Vec3::zeros())
        };
        lights.push(colors(light, POINT, index));
    }
    for index in 0..count(SPOT) {
        let light = Light {
            kind: LightKind::Spot {
                position: vec3(light_field(SPOT, index, "position")),
                direction: vec3(light_field(SPOT, index, "direction")),
                cut_off: degrees(float(light_field(SPOT, index, "cutOff"))),
                outer_cut_off: degrees(float(light_field(SPOT, index, "outerCutOff"))),
                attenuation: attenuation(SPOT, index),
            },
            ..Light::spot(Vec3::zeros())
        };
        lights.push(colors(light, SPOT, index));
    }
    lights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{ShaderSource, RenderAllocator};
    use crate::render::backends::software::SoftwareAllocator;
    use approx::assert_relative_eq;

    fn lit_program() -> Box<dyn ShaderProgram> {
        SoftwareAllocator::new()
            .create_shader_program(&ShaderSource::vertex("mesh"), &ShaderSource::fragment("forward"), None)
            .unwrap()
    }

    #[test]
    fn test_field_names() {
        assert_eq!(light_field("POINT", 3, "position"), "MANA_LIGHTS_POINT[3].position");
        assert_eq!(light_count("SPOT"), "MANA_LIGHT_COUNT_SPOT");
    }

    #[test]
    fn test_indices_are_per_type() {
        let mut program = lit_program();
        let lights = [
            Light::directional(-Vec3::y()),
            Light::point(Vec3::new(1.0, 0.0, 0.0)),
            Light::directional(Vec3::x()),
            Light::point(Vec3::new(2.0, 0.0, 0.0)),
        ];
        upload_lights(program.as_mut(), &lights, &Vec3::zeros(), MAX_LIGHTS);

        let get = |name: &str| program.uniform(program.uniform_location(name).unwrap());
        assert_eq!(get("MANA_LIGHT_COUNT_DIRECTIONAL"), Some(UniformValue::Int(2)));
        assert_eq!(get("MANA_LIGHT_COUNT_POINT"), Some(UniformValue::Int(2)));
        assert_eq!(
            get("MANA_LIGHTS_POINT[1].position"),
            Some(UniformValue::Vec3(Vec3::new(2.0, 0.0, 0.0)))
        );
        assert_eq!(get("MANA_LIGHTS_DIRECTIONAL[1].direction"), Some(UniformValue::Vec3(Vec3::x())));
    }

    #[test]
    fn test_lights_over_limit_are_dropped() {
        let mut program = lit_program();
        let lights = vec![Light::point(Vec3::zeros()); 3];
        upload_lights(program.as_mut(), &lights, &Vec3::zeros(), 2);
        assert_eq!(read_lights(program.as_ref()).len(), 2);
    }

    #[test]
    fn test_spot_cutoff_round_trips_through_cosine() {
        let mut program = lit_program();
        let spot = Light::spot(Vec3::new(0.0, 3.0, 0.0));
        upload_lights(program.as_mut(), &[spot], &Vec3::zeros(), MAX_LIGHTS);

        let location = program.uniform_location("MANA_LIGHTS_SPOT[0].cutOff").unwrap();
        let cosine = program.uniform(location).and_then(|v| v.as_float()).unwrap();
        assert_relative_eq!(cosine, 10.0_f32.to_radians().cos(), epsilon = 1e-6);

        let read = read_lights(program.as_ref());
        match read[0].kind {
            LightKind::Spot { cut_off, outer_cut_off, .. } => {
                assert_relative_eq!(cut_off, 10.0, epsilon = 1e-3);
                assert_relative_eq!(outer_cut_off, 14.0, epsilon = 1e-3);
            }
            _ => panic!("expected a spot light"),
        }
    }
}
