//! WGSL sources. Every program shares the `Uniforms` block at group 0 and
//! remaps GL clip depth (-w..w) to wgpu's 0..w in `to_clip`.

macro_rules! uniforms_wgsl {
    () => {
        r#"
struct Uniforms {
    model_view: mat4x4<f32>,
    projection: mat4x4<f32>,
    origin_shift: vec2<f32>,
    z_order: f32,
    point_size: f32,
    color: vec4<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

fn to_clip(p: vec3<f32>) -> vec4<f32> {
    let c = u.projection * u.model_view * vec4<f32>(p.xy + u.origin_shift, p.z, 1.0);
    return vec4<f32>(c.x, c.y, (c.z + c.w) * 0.5, c.w);
}

fn shade(n: vec3<f32>) -> f32 {
    let len = length(n);
    if (len < 1e-6) {
        return 1.0;
    }
    return 0.6 + 0.4 * abs(dot(n / len, vec3<f32>(0.0, 0.0, 1.0)));
}
"#
    };
}

macro_rules! color_map_wgsl {
    () => {
        r#"
@group(1) @binding(0) var color_map: texture_2d<f32>;

fn lookup(t: f32) -> vec3<f32> {
    let i = i32(clamp(t, 0.0, 1.0) * 255.0);
    return textureLoad(color_map, vec2<i32>(i, 0), 0).rgb;
}

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) value: f32,
    @location(2) picked: f32,
    @location(3) filtered: f32,
    @location(4) discard_range: vec2<f32>,
    @location(5) uv: vec2<f32>,
};

fn base_color(in: VsOut) -> vec3<f32> {
    var color = lookup(in.value);
    if (in.value < 0.0) {
        color = vec3<f32>(0.75, 0.75, 0.75);
    }
    if (in.picked > 0.5) {
        color = u.color.rgb;
    }
    if (in.filtered < 0.5) {
        color = mix(color, vec3<f32>(0.85, 0.85, 0.85), 0.8);
    }
    return color;
}

fn discarded(in: VsOut) -> bool {
    return in.discard_range.x != -1.0
        && in.value >= in.discard_range.x
        && in.value <= in.discard_range.y;
}
"#
    };
}

pub const FLAT_COLOR: &str = concat!(
    uniforms_wgsl!(),
    r#"
@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return to_clip(position);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return u.color;
}
"#
);

pub const SMOOTH_COLOR: &str = concat!(
    uniforms_wgsl!(),
    r#"
struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.normal = (u.model_view * vec4<f32>(normal, 0.0)).xyz;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return vec4<f32>(u.color.rgb * shade(in.normal), 1.0);
}
"#
);

pub const FLAT_COLOR_MAP: &str = concat!(
    uniforms_wgsl!(),
    color_map_wgsl!(),
    r#"
@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(2) value: f32,
    @location(3) picked: f32,
    @location(4) filtered: f32,
    @location(5) discard_range: vec2<f32>,
) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.normal = vec3<f32>(0.0, 0.0, 0.0);
    out.value = value;
    out.picked = picked;
    out.filtered = filtered;
    out.discard_range = discard_range;
    out.uv = vec2<f32>(0.0, 0.0);
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    if (discarded(in)) {
        discard;
    }
    return vec4<f32>(base_color(in), 1.0);
}
"#
);

pub const SMOOTH_COLOR_MAP: &str = concat!(
    uniforms_wgsl!(),
    color_map_wgsl!(),
    r#"
@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) value: f32,
    @location(3) picked: f32,
    @location(4) filtered: f32,
    @location(5) discard_range: vec2<f32>,
) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.normal = (u.model_view * vec4<f32>(normal, 0.0)).xyz;
    out.value = value;
    out.picked = picked;
    out.filtered = filtered;
    out.discard_range = discard_range;
    out.uv = vec2<f32>(0.0, 0.0);
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    if (discarded(in)) {
        discard;
    }
    return vec4<f32>(base_color(in) * shade(in.normal), 1.0);
}
"#
);

pub const SMOOTH_COLOR_MAP_TEX: &str = concat!(
    uniforms_wgsl!(),
    color_map_wgsl!(),
    r#"
@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) value: f32,
    @location(3) picked: f32,
    @location(4) filtered: f32,
    @location(5) discard_range: vec2<f32>,
    @location(6) uv: vec2<f32>,
) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.normal = (u.model_view * vec4<f32>(normal, 0.0)).xyz;
    out.value = value;
    out.picked = picked;
    out.filtered = filtered;
    out.discard_range = discard_range;
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    if (discarded(in)) {
        discard;
    }
    // Darken section borders along the wall parametrization.
    let edge = min(min(in.uv.x, 1.0 - in.uv.x), min(in.uv.y, 1.0 - in.uv.y));
    let band = select(1.0, 0.85, edge < 0.02);
    return vec4<f32>(base_color(in) * shade(in.normal) * band, 1.0);
}
"#
);

pub const OUTLINE: &str = concat!(
    uniforms_wgsl!(),
    r#"
struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) width: f32,
    @location(2) filtered: f32,
};

@vertex
fn vs_main(
    @location(0) position: vec3<f32>,
    @location(1) uv: vec2<f32>,
    @location(2) width: f32,
    @location(3) filtered: f32,
) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.uv = uv;
    out.width = width;
    out.filtered = filtered;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let edge = min(min(in.uv.x, 1.0 - in.uv.x), min(in.uv.y, 1.0 - in.uv.y));
    if (edge > in.width || in.filtered < 0.5) {
        discard;
    }
    return u.color;
}
"#
);

pub const ABSTRACT_SURFACE: &str = concat!(
    uniforms_wgsl!(),
    r#"
@group(1) @binding(0) var image: texture_2d<f32>;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.uv = uv;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    let dims = vec2<f32>(textureDimensions(image));
    let texel = clamp(vec2<i32>(in.uv * dims), vec2<i32>(0, 0), vec2<i32>(dims) - vec2<i32>(1, 1));
    let c = textureLoad(image, texel, 0);
    if (c.a < 0.01) {
        discard;
    }
    return c;
}
"#
);

pub const PICKING: &str = concat!(
    uniforms_wgsl!(),
    r#"
struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) @interpolate(flat) id: vec4<f32>,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) id: vec4<f32>) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.id = id;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    return in.id;
}
"#
);

pub const COLOR_POINTS: &str = concat!(
    uniforms_wgsl!(),
    r#"
@group(1) @binding(0) var color_map: texture_2d<f32>;

struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) value: f32,
};

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(2) value: f32) -> VsOut {
    var out: VsOut;
    out.clip = to_clip(position);
    out.value = value;
    return out;
}

@fragment
fn fs_main(in: VsOut) -> @location(0) vec4<f32> {
    if (in.value < 0.0) {
        return vec4<f32>(0.75, 0.75, 0.75, 1.0);
    }
    let i = i32(clamp(in.value, 0.0, 1.0) * 255.0);
    return vec4<f32>(textureLoad(color_map, vec2<i32>(i, 0), 0).rgb, 1.0);
}
"#
);
