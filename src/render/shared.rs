use bytemuck::{Pod, Zeroable};

pub(crate) const SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    // x: hue, y: time, z: phase
    params: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

@group(2) @binding(0)
var normal_map: texture_2d<f32>;
@group(2) @binding(1)
var surface_map: texture_2d<f32>;
@group(2) @binding(2)
var material_sampler: sampler;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    out.uv = input.uv;
    return out;
}

fn hsv_to_rgb(c: vec3<f32>) -> vec3<f32> {
    let k = vec4<f32>(1.0, 2.0 / 3.0, 1.0 / 3.0, 3.0);
    let p = abs(fract(c.xxx + k.xyz) * 6.0 - k.www);
    return c.z * mix(k.xxx, clamp(p - k.xxx, vec3<f32>(0.0), vec3<f32>(1.0)), c.y);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let perturb = textureSample(normal_map, material_sampler, input.uv).xyz * 2.0 - 1.0;
    let normal = normalize(normalize(input.normal) + perturb * 0.35);
    let view_dir = normalize(globals.camera_position.xyz - input.world_pos);
    let fresnel = pow(1.0 - max(dot(normal, view_dir), 0.0), 2.0);
    let surface = textureSample(surface_map, material_sampler, input.uv).rgb;
    let tint = hsv_to_rgb(vec3<f32>(object.params.x, 0.45, 1.0));
    let color = surface * tint * (0.35 + 0.65 * fresnel) + vec3<f32>(fresnel * 0.4);
    return vec4<f32>(color, 0.6 + 0.4 * fresnel);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct GlobalUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct ObjectConstants {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    pub params: [f32; 4],
}
