//! GLSL sources of every pass.
//!
//! All fragment stages share one convention: `v_uv` is the texel centre in
//! field space with `y` pointing up, the uniform block lives at set 0 binding 0,
//! and each `texture2D` named `<field>_texture` at binding `n` is paired with
//! `<field>_sampler` at `n + 1` in set 1.

/// Which CPU kernel the software backend runs for a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kernel {
    Clear,
    Splat,
    Curl,
    Vorticity,
    Divergence,
    Pressure,
    GradientSubtract,
    Advection,
    Display,
    Copy,
}

#[derive(Debug, Clone, Copy)]
pub struct ProgramSource {
    pub name: &'static str,
    pub kernel: Kernel,
    pub vertex: &'static str,
    pub fragment: &'static str,
}

/// Full-screen triangle for off-screen passes. Row 0 of a target maps to `v_uv.y == 0`.
pub const SIMULATION_VERTEX: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

/// Full-screen triangle for the visible surface, top of the field at the top of the window.
pub const SURFACE_VERTEX: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = pos * 0.5 + vec2(0.5, 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

pub const CLEAR_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    float value;
} params;

layout(set = 1, binding = 0) uniform texture2D field_texture;
layout(set = 1, binding = 1) uniform sampler field_sampler;
#define u_field sampler2D(field_texture, field_sampler)

void main() {
    out_color = params.value * texture(u_field, v_uv);
}
";

pub const SPLAT_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec3 color;
    float aspect_ratio;
    vec2 point;
    float radius;
} params;

layout(set = 1, binding = 0) uniform texture2D target_texture;
layout(set = 1, binding = 1) uniform sampler target_sampler;
#define u_target sampler2D(target_texture, target_sampler)

void main() {
    vec2 p = v_uv - params.point;
    p.x *= params.aspect_ratio;
    vec3 splat = exp(-dot(p, p) / params.radius) * params.color;
    vec3 base = texture(u_target, v_uv).xyz;
    out_color = vec4(base + splat, 1.0);
}
";

pub const CURL_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec2 texel_size;
} params;

layout(set = 1, binding = 0) uniform texture2D velocity_texture;
layout(set = 1, binding = 1) uniform sampler velocity_sampler;
#define u_velocity sampler2D(velocity_texture, velocity_sampler)

void main() {
    vec2 vL = v_uv - vec2(params.texel_size.x, 0.0);
    vec2 vR = v_uv + vec2(params.texel_size.x, 0.0);
    vec2 vT = v_uv + vec2(0.0, params.texel_size.y);
    vec2 vB = v_uv - vec2(0.0, params.texel_size.y);
    float L = texture(u_velocity, vL).y;
    float R = texture(u_velocity, vR).y;
    float T = texture(u_velocity, vT).x;
    float B = texture(u_velocity, vB).x;
    float vorticity = R - L - T + B;
    out_color = vec4(0.5 * vorticity, 0.0, 0.0, 1.0);
}
";

pub const VORTICITY_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec2 texel_size;
    float curl_strength;
    float dt;
} params;

layout(set = 1, binding = 0) uniform texture2D velocity_texture;
layout(set = 1, binding = 1) uniform sampler velocity_sampler;
layout(set = 1, binding = 2) uniform texture2D curl_texture;
layout(set = 1, binding = 3) uniform sampler curl_sampler;
#define u_velocity sampler2D(velocity_texture, velocity_sampler)
#define u_curl sampler2D(curl_texture, curl_sampler)

void main() {
    vec2 vL = v_uv - vec2(params.texel_size.x, 0.0);
    vec2 vR = v_uv + vec2(params.texel_size.x, 0.0);
    vec2 vT = v_uv + vec2(0.0, params.texel_size.y);
    vec2 vB = v_uv - vec2(0.0, params.texel_size.y);
    float L = texture(u_curl, vL).x;
    float R = texture(u_curl, vR).x;
    float T = texture(u_curl, vT).x;
    float B = texture(u_curl, vB).x;
    float C = texture(u_curl, v_uv).x;

    vec2 force = 0.5 * vec2(abs(T) - abs(B), abs(R) - abs(L));
    force /= length(force) + 0.0001;
    force *= params.curl_strength * C;
    force.y *= -1.0;

    vec2 velocity = texture(u_velocity, v_uv).xy;
    velocity += force * params.dt;
    velocity = clamp(velocity, vec2(-1000.0), vec2(1000.0));
    out_color = vec4(velocity, 0.0, 1.0);
}
";

pub const DIVERGENCE_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec2 texel_size;
} params;

layout(set = 1, binding = 0) uniform texture2D velocity_texture;
layout(set = 1, binding = 1) uniform sampler velocity_sampler;
#define u_velocity sampler2D(velocity_texture, velocity_sampler)

void main() {
    vec2 vL = v_uv - vec2(params.texel_size.x, 0.0);
    vec2 vR = v_uv + vec2(params.texel_size.x, 0.0);
    vec2 vT = v_uv + vec2(0.0, params.texel_size.y);
    vec2 vB = v_uv - vec2(0.0, params.texel_size.y);
    float L = texture(u_velocity, vL).x;
    float R = texture(u_velocity, vR).x;
    float T = texture(u_velocity, vT).y;
    float B = texture(u_velocity, vB).y;

    vec2 C = texture(u_velocity, v_uv).xy;
    if (vL.x < 0.0) { L = -C.x; }
    if (vR.x > 1.0) { R = -C.x; }
    if (vT.y > 1.0) { T = -C.y; }
    if (vB.y < 0.0) { B = -C.y; }

    float div = 0.5 * (R - L + T - B);
    out_color = vec4(div, 0.0, 0.0, 1.0);
}
";

pub const PRESSURE_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec2 texel_size;
} params;

layout(set = 1, binding = 0) uniform texture2D pressure_texture;
layout(set = 1, binding = 1) uniform sampler pressure_sampler;
layout(set = 1, binding = 2) uniform texture2D divergence_texture;
layout(set = 1, binding = 3) uniform sampler divergence_sampler;
#define u_pressure sampler2D(pressure_texture, pressure_sampler)
#define u_divergence sampler2D(divergence_texture, divergence_sampler)

void main() {
    vec2 vL = v_uv - vec2(params.texel_size.x, 0.0);
    vec2 vR = v_uv + vec2(params.texel_size.x, 0.0);
    vec2 vT = v_uv + vec2(0.0, params.texel_size.y);
    vec2 vB = v_uv - vec2(0.0, params.texel_size.y);
    float L = texture(u_pressure, vL).x;
    float R = texture(u_pressure, vR).x;
    float T = texture(u_pressure, vT).x;
    float B = texture(u_pressure, vB).x;
    float divergence = texture(u_divergence, v_uv).x;
    float pressure = (L + R + B + T - divergence) * 0.25;
    out_color = vec4(pressure, 0.0, 0.0, 1.0);
}
";

pub const GRADIENT_SUBTRACT_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec2 texel_size;
} params;

layout(set = 1, binding = 0) uniform texture2D pressure_texture;
layout(set = 1, binding = 1) uniform sampler pressure_sampler;
layout(set = 1, binding = 2) uniform texture2D velocity_texture;
layout(set = 1, binding = 3) uniform sampler velocity_sampler;
#define u_pressure sampler2D(pressure_texture, pressure_sampler)
#define u_velocity sampler2D(velocity_texture, velocity_sampler)

void main() {
    vec2 vL = v_uv - vec2(params.texel_size.x, 0.0);
    vec2 vR = v_uv + vec2(params.texel_size.x, 0.0);
    vec2 vT = v_uv + vec2(0.0, params.texel_size.y);
    vec2 vB = v_uv - vec2(0.0, params.texel_size.y);
    float L = texture(u_pressure, vL).x;
    float R = texture(u_pressure, vR).x;
    float T = texture(u_pressure, vT).x;
    float B = texture(u_pressure, vB).x;
    vec2 velocity = texture(u_velocity, v_uv).xy;
    velocity -= 0.5 * vec2(R - L, T - B);
    out_color = vec4(velocity, 0.0, 1.0);
}
";

pub const ADVECTION_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec2 texel_size;
    vec2 source_texel_size;
    float dt;
    float dissipation;
} params;

layout(set = 1, binding = 0) uniform texture2D velocity_texture;
layout(set = 1, binding = 1) uniform sampler velocity_sampler;
layout(set = 1, binding = 2) uniform texture2D source_texture;
layout(set = 1, binding = 3) uniform sampler source_sampler;
#define u_velocity sampler2D(velocity_texture, velocity_sampler)
#define u_source sampler2D(source_texture, source_sampler)

#ifdef MANUAL_FILTERING
vec4 bilerp_velocity(vec2 uv, vec2 tsize) {
    vec2 st = uv / tsize - vec2(0.5, 0.5);
    vec2 iuv = floor(st);
    vec2 fuv = fract(st);
    vec4 a = texture(u_velocity, (iuv + vec2(0.5, 0.5)) * tsize);
    vec4 b = texture(u_velocity, (iuv + vec2(1.5, 0.5)) * tsize);
    vec4 c = texture(u_velocity, (iuv + vec2(0.5, 1.5)) * tsize);
    vec4 d = texture(u_velocity, (iuv + vec2(1.5, 1.5)) * tsize);
    return mix(mix(a, b, fuv.x), mix(c, d, fuv.x), fuv.y);
}

vec4 bilerp_source(vec2 uv, vec2 tsize) {
    vec2 st = uv / tsize - vec2(0.5, 0.5);
    vec2 iuv = floor(st);
    vec2 fuv = fract(st);
    vec4 a = texture(u_source, (iuv + vec2(0.5, 0.5)) * tsize);
    vec4 b = texture(u_source, (iuv + vec2(1.5, 0.5)) * tsize);
    vec4 c = texture(u_source, (iuv + vec2(0.5, 1.5)) * tsize);
    vec4 d = texture(u_source, (iuv + vec2(1.5, 1.5)) * tsize);
    return mix(mix(a, b, fuv.x), mix(c, d, fuv.x), fuv.y);
}
#endif

void main() {
#ifdef MANUAL_FILTERING
    vec2 coord = v_uv - params.dt * bilerp_velocity(v_uv, params.texel_size).xy * params.texel_size;
    vec4 result = bilerp_source(coord, params.source_texel_size);
#else
    vec2 coord = v_uv - params.dt * texture(u_velocity, v_uv).xy * params.texel_size;
    vec4 result = texture(u_source, coord);
#endif
    float decay = 1.0 + params.dissipation * params.dt;
    out_color = result / decay;
}
";

pub const DISPLAY_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(std140, set = 0, binding = 0) uniform Params {
    vec3 tint;
    float saturation;
    float gain;
    float alpha_scale;
    float alpha_clamp;
} params;

layout(set = 1, binding = 0) uniform texture2D dye_texture;
layout(set = 1, binding = 1) uniform sampler dye_sampler;
#define u_dye sampler2D(dye_texture, dye_sampler)

void main() {
    vec3 c = texture(u_dye, v_uv).rgb * params.gain;
    float a = max(c.r, max(c.g, c.b)) * params.alpha_scale;
    a = min(a, params.alpha_clamp);
    float luma = dot(c, vec3(0.299, 0.587, 0.114));
    vec3 color = mix(vec3(luma), c, params.saturation) * params.tint;
    color = clamp(color, vec3(0.0), vec3(1.0));
    out_color = vec4(color, a);
}
";

pub const COPY_FRAGMENT: &str = r"#version 450
layout(location = 0) in vec2 v_uv;
layout(location = 0) out vec4 out_color;

layout(set = 1, binding = 0) uniform texture2D source_texture;
layout(set = 1, binding = 1) uniform sampler source_sampler;
#define u_source sampler2D(source_texture, source_sampler)

void main() {
    out_color = texture(u_source, v_uv);
}
";

const fn simulation(name: &'static str, kernel: Kernel, fragment: &'static str) -> ProgramSource {
    ProgramSource {
        name,
        kernel,
        vertex: SIMULATION_VERTEX,
        fragment,
    }
}

pub const CLEAR: ProgramSource = simulation("clear", Kernel::Clear, CLEAR_FRAGMENT);
pub const SPLAT: ProgramSource = simulation("splat", Kernel::Splat, SPLAT_FRAGMENT);
pub const CURL: ProgramSource = simulation("curl", Kernel::Curl, CURL_FRAGMENT);
pub const VORTICITY: ProgramSource =
    simulation("vorticity", Kernel::Vorticity, VORTICITY_FRAGMENT);
pub const DIVERGENCE: ProgramSource =
    simulation("divergence", Kernel::Divergence, DIVERGENCE_FRAGMENT);
pub const PRESSURE: ProgramSource = simulation("pressure", Kernel::Pressure, PRESSURE_FRAGMENT);
pub const GRADIENT_SUBTRACT: ProgramSource = simulation(
    "gradient_subtract",
    Kernel::GradientSubtract,
    GRADIENT_SUBTRACT_FRAGMENT,
);
pub const ADVECTION: ProgramSource =
    simulation("advection", Kernel::Advection, ADVECTION_FRAGMENT);
pub const COPY: ProgramSource = simulation("copy", Kernel::Copy, COPY_FRAGMENT);
pub const DISPLAY: ProgramSource = ProgramSource {
    name: "display",
    kernel: Kernel::Display,
    vertex: SURFACE_VERTEX,
    fragment: DISPLAY_FRAGMENT,
};

pub const ALL: [ProgramSource; 10] = [
    CLEAR,
    SPLAT,
    CURL,
    VORTICITY,
    DIVERGENCE,
    PRESSURE,
    GRADIENT_SUBTRACT,
    ADVECTION,
    DISPLAY,
    COPY,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::link_program;

    #[test]
    fn every_builtin_program_links_with_and_without_manual_filtering() {
        for source in ALL {
            for manual in [false, true] {
                if let Err(err) = link_program(&source, manual) {
                    panic!("{} (manual filtering {manual}) failed: {err}", source.name);
                }
            }
        }
    }

    #[test]
    fn advection_exposes_both_texel_sizes() {
        let linked = link_program(&ADVECTION, true).expect("advection links");
        for name in ["texel_size", "source_texel_size", "dt", "dissipation"] {
            assert!(linked.reflection.uniform(name).is_some(), "missing {name}");
        }
        assert_eq!(linked.reflection.texture("velocity").map(|t| t.binding), Some(0));
        assert_eq!(linked.reflection.texture("source").map(|t| t.binding), Some(2));
    }

    #[test]
    fn copy_program_has_no_uniform_block() {
        let linked = link_program(&COPY, false).expect("copy links");
        assert_eq!(linked.reflection.uniform_size, 0);
        assert!(linked.reflection.uniforms.is_empty());
    }
}
