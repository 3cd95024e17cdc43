//! WGSL shader sources for the matte overlay renderers.
//!
//! Kept as string constants so they can be embedded directly into the
//! binary and shared between the GPU backends without a build step.

/// Instanced overlay shader for the modern backend.
///
/// Each instance is one subtitle mask: a destination rectangle in surface
/// pixels, a packed color with its alpha byte still inverted, and the layer
/// of the shared `texture_2d_array` holding the coverage mask. Output is
/// premultiplied alpha.
pub const OVERLAY_ARRAY_WGSL: &str = r#"
struct OverlayUniforms {
    color_matrix: mat3x3<f32>,
    resolution: vec2<f32>,
};

@group(0) @binding(0) var<uniform> uni: OverlayUniforms;
@group(0) @binding(1) var masks: texture_2d_array<f32>;

struct MaskInstance {
    @location(0) rect: vec4<f32>,
    @location(1) color: vec4<f32>,
    @location(2) layer: u32,
};

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) local: vec2<f32>,
    @location(1) @interpolate(flat) color: vec4<f32>,
    @location(2) @interpolate(flat) layer: u32,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32, inst: MaskInstance) -> VsOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[vi];
    let local = corner * inst.rect.zw;
    let px = inst.rect.xy + local;
    let ndc = vec2<f32>(
        px.x / uni.resolution.x * 2.0 - 1.0,
        1.0 - px.y / uni.resolution.y * 2.0,
    );

    var out: VsOut;
    out.pos = vec4<f32>(ndc, 0.0, 1.0);
    out.local = local;
    out.color = inst.color;
    out.layer = inst.layer;
    return out;
}

@fragment
fn fs_main(inp: VsOut) -> @location(0) vec4<f32> {
    // local stays inside the mask rectangle, so no clamp is needed here
    let texel = vec2<i32>(floor(inp.local));
    let coverage = textureLoad(masks, texel, i32(inp.layer), 0).r;
    // color.a is the inverted alpha byte from the packed cue color
    let alpha = (1.0 - inp.color.a) * coverage;
    let rgb = uni.color_matrix * inp.color.rgb;
    return vec4<f32>(rgb * alpha, alpha);
}
"#;

/// One-quad-per-draw overlay shader for the legacy backend.
///
/// Same math as the array shader, but the destination rectangle and color
/// arrive through a per-quad uniform and every mask gets its own bound
/// `texture_2d`. Runs on devices without instancing or texture arrays.
pub const OVERLAY_QUAD_WGSL: &str = r#"
struct SharedUniforms {
    color_matrix: mat3x3<f32>,
    resolution: vec2<f32>,
};

struct QuadData {
    rect: vec4<f32>,
    color: vec4<f32>,
};

@group(0) @binding(0) var<uniform> uni: SharedUniforms;
@group(1) @binding(0) var<uniform> quad: QuadData;
@group(1) @binding(1) var mask: texture_2d<f32>;

struct VsOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) local: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32) -> VsOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 0.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(1.0, 1.0),
    );
    let corner = corners[vi];
    let local = corner * quad.rect.zw;
    let px = quad.rect.xy + local;
    let ndc = vec2<f32>(
        px.x / uni.resolution.x * 2.0 - 1.0,
        1.0 - px.y / uni.resolution.y * 2.0,
    );

    var out: VsOut;
    out.pos = vec4<f32>(ndc, 0.0, 1.0);
    out.local = local;
    return out;
}

@fragment
fn fs_main(inp: VsOut) -> @location(0) vec4<f32> {
    let coverage = textureLoad(mask, vec2<i32>(floor(inp.local)), 0).r;
    let alpha = (1.0 - quad.color.a) * coverage;
    let rgb = uni.color_matrix * quad.color.rgb;
    return vec4<f32>(rgb * alpha, alpha);
}
"#;
