use cubecl::prelude::*;

#[cube]
pub(super) fn max_f32(a: f32, b: f32) -> f32 {
    if a > b { a } else { b }
}

#[cube]
pub(super) fn clamp_f32(v: f32, min_v: f32, max_v: f32) -> f32 {
    if v < min_v {
        min_v
    } else if v > max_v {
        max_v
    } else {
        v
    }
}

#[cube]
pub(super) fn vec3_dot(ax: f32, ay: f32, az: f32, bx: f32, by: f32, bz: f32) -> f32 {
    ax * bx + ay * by + az * bz
}

#[cube]
pub(super) fn vec3_length(ax: f32, ay: f32, az: f32) -> f32 {
    vec3_dot(ax, ay, az, ax, ay, az).sqrt()
}

/// Cross product, returned as [x, y, z, 0].
#[cube]
pub(super) fn vec3_cross(ax: f32, ay: f32, az: f32, bx: f32, by: f32, bz: f32) -> Line<f32> {
    let mut out = Line::empty(4usize);
    out[0] = ay * bz - az * by;
    out[1] = az * bx - ax * bz;
    out[2] = ax * by - ay * bx;
    out[3] = f32::new(0.0);
    out
}

/// Normalize, returned as [x, y, z, length]. Zero vectors map to +z.
#[cube]
pub(super) fn vec3_normalize(ax: f32, ay: f32, az: f32) -> Line<f32> {
    let len = vec3_length(ax, ay, az);
    let mut out = Line::empty(4usize);
    if len > f32::new(0.0) {
        let inv = f32::new(1.0) / len;
        out[0] = ax * inv;
        out[1] = ay * inv;
        out[2] = az * inv;
        out[3] = len;
    } else {
        out[0] = f32::new(0.0);
        out[1] = f32::new(0.0);
        out[2] = f32::new(1.0);
        out[3] = f32::new(0.0);
    }
    out
}

/// Build a tangent frame around a unit normal, returned as [tx, ty, tz, 0].
/// The bitangent is `cross(n, t)`.
#[cube]
pub(super) fn onb_tangent(nx: f32, ny: f32, nz: f32) -> Line<f32> {
    let mut ax = f32::new(1.0);
    let mut ay = f32::new(0.0);
    let az = f32::new(0.0);
    if nx > f32::new(0.9) || nx < f32::new(-0.9) {
        ax = f32::new(0.0);
        ay = f32::new(1.0);
    }
    let c = vec3_cross(nx, ny, nz, ax, ay, az);
    vec3_normalize(c[0], c[1], c[2])
}
