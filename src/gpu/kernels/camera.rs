//! Tile domain and primary-ray generation kernels, one per camera model.

use cubecl::prelude::*;

use crate::gpu::constants::*;
use super::math::*;
use super::rng::*;

/// Map tile-local slots to output pixels and publish the tile's ray count.
#[cube(launch_unchecked)]
pub(crate) fn generate_tile_domain(
    output_width: u32,
    output_height: u32,
    tile_origin_x: u32,
    tile_origin_y: u32,
    tile_width: u32,
    tile_height: u32,
    output_indices: &mut Array<u32>,
    ray_count: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= (tile_width * tile_height) as usize {
        terminate!();
    }
    let x = idx as u32 % tile_width;
    let y = idx as u32 / tile_width;
    let px = tile_origin_x + x;
    let py = tile_origin_y + y;
    if px < output_width && py < output_height {
        output_indices[idx] = py * output_width + px;
    }
    if idx == 0 {
        ray_count[0] = tile_width * tile_height;
    }
}

/// Jittered position of the slot's pixel on the sensor, in [-1, 1]^2.
/// Returned as [sx, sy].
#[cube]
fn sensor_sample(
    pixel: u32,
    width: u32,
    height: u32,
    seed: u32,
    scramble: &Array<u32>,
    frame: u32,
    salt: u32,
) -> Line<f32> {
    let px = pixel % width;
    let py = pixel / width;
    let jx = sample_f32(seed, scramble, u32::new(0), frame, salt);
    let jy = sample_f32(seed, scramble, u32::new(1), frame, salt);
    let mut out = Line::empty(2usize);
    out[0] = (f32::cast_from(px) + jx) / f32::cast_from(width) * f32::new(2.0) - f32::new(1.0);
    out[1] = f32::new(1.0) - (f32::cast_from(py) + jy) / f32::cast_from(height) * f32::new(2.0);
    out
}

#[cube]
fn write_ray(
    rays: &mut Array<f32>,
    slot: u32,
    ox: f32,
    oy: f32,
    oz: f32,
    dx: f32,
    dy: f32,
    dz: f32,
    max_t: f32,
) {
    let base = (slot * RAY_STRIDE) as usize;
    rays[base] = ox;
    rays[base + 1] = oy;
    rays[base + 2] = oz;
    rays[base + 3] = max_t;
    rays[base + 4] = dx;
    rays[base + 5] = dy;
    rays[base + 6] = dz;
    rays[base + 7] = f32::new(1.0);
}

/// Pinhole perspective ray generation.
#[cube(launch_unchecked)]
pub(crate) fn perspective_camera_generate_rays(
    camera: &Array<f32>,
    output_width: u32,
    output_height: u32,
    output_indices: &Array<u32>,
    ray_count: &Array<u32>,
    salt: u32,
    frame: u32,
    rays: &mut Array<f32>,
    seeds: &Array<u32>,
    scramble: &Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= ray_count[0] as usize {
        terminate!();
    }
    let slot = idx as u32;
    let pixel = output_indices[idx];
    let s = sensor_sample(
        pixel,
        output_width,
        output_height,
        seeds[idx],
        scramble,
        frame,
        salt,
    );

    let half_w = camera[16] * f32::new(0.5);
    let half_h = camera[17] * f32::new(0.5);
    let dx = camera[4] * camera[3] + camera[8] * s[0] * half_w + camera[12] * s[1] * half_h;
    let dy = camera[5] * camera[3] + camera[9] * s[0] * half_w + camera[13] * s[1] * half_h;
    let dz = camera[6] * camera[3] + camera[10] * s[0] * half_w + camera[14] * s[1] * half_h;
    let d = vec3_normalize(dx, dy, dz);
    write_ray(
        rays,
        slot,
        camera[0],
        camera[1],
        camera[2],
        d[0],
        d[1],
        d[2],
        f32::new(RAY_MAX_T),
    );
}

/// Perspective ray generation with a thin-lens aperture.
#[cube(launch_unchecked)]
pub(crate) fn perspective_camera_dof_generate_rays(
    camera: &Array<f32>,
    output_width: u32,
    output_height: u32,
    output_indices: &Array<u32>,
    ray_count: &Array<u32>,
    salt: u32,
    frame: u32,
    rays: &mut Array<f32>,
    seeds: &Array<u32>,
    scramble: &Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= ray_count[0] as usize {
        terminate!();
    }
    let slot = idx as u32;
    let pixel = output_indices[idx];
    let seed = seeds[idx];
    let s = sensor_sample(pixel, output_width, output_height, seed, scramble, frame, salt);

    let half_w = camera[16] * f32::new(0.5);
    let half_h = camera[17] * f32::new(0.5);
    let dx = camera[4] * camera[3] + camera[8] * s[0] * half_w + camera[12] * s[1] * half_h;
    let dy = camera[5] * camera[3] + camera[9] * s[0] * half_w + camera[13] * s[1] * half_h;
    let dz = camera[6] * camera[3] + camera[10] * s[0] * half_w + camera[14] * s[1] * half_h;
    let d = vec3_normalize(dx, dy, dz);

    // Focal point along the pinhole ray, then a lens-disk origin offset.
    let focus = camera[11];
    let fx = camera[0] + d[0] * focus;
    let fy = camera[1] + d[1] * focus;
    let fz = camera[2] + d[2] * focus;

    let u0 = sample_f32(seed, scramble, u32::new(2), frame, salt);
    let u1 = sample_f32(seed, scramble, u32::new(3), frame, salt);
    let r = camera[7] * u0.sqrt();
    let phi = u1 * f32::new(6.283_185_307_179_586);
    let lu = r * phi.cos();
    let lv = r * phi.sin();

    let ox = camera[0] + camera[8] * lu + camera[12] * lv;
    let oy = camera[1] + camera[9] * lu + camera[13] * lv;
    let oz = camera[2] + camera[10] * lu + camera[14] * lv;
    let nd = vec3_normalize(fx - ox, fy - oy, fz - oz);
    write_ray(rays, slot, ox, oy, oz, nd[0], nd[1], nd[2], f32::new(RAY_MAX_T));
}

/// Orthographic ray generation.
#[cube(launch_unchecked)]
pub(crate) fn orthographic_camera_generate_rays(
    camera: &Array<f32>,
    output_width: u32,
    output_height: u32,
    output_indices: &Array<u32>,
    ray_count: &Array<u32>,
    salt: u32,
    frame: u32,
    rays: &mut Array<f32>,
    seeds: &Array<u32>,
    scramble: &Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= ray_count[0] as usize {
        terminate!();
    }
    let slot = idx as u32;
    let pixel = output_indices[idx];
    let s = sensor_sample(
        pixel,
        output_width,
        output_height,
        seeds[idx],
        scramble,
        frame,
        salt,
    );

    let half_w = camera[16] * f32::new(0.5);
    let half_h = camera[17] * f32::new(0.5);
    let ox = camera[0] + camera[8] * s[0] * half_w + camera[12] * s[1] * half_h;
    let oy = camera[1] + camera[9] * s[0] * half_w + camera[13] * s[1] * half_h;
    let oz = camera[2] + camera[10] * s[0] * half_w + camera[14] * s[1] * half_h;
    write_ray(
        rays,
        slot,
        ox,
        oy,
        oz,
        camera[4],
        camera[5],
        camera[6],
        f32::new(RAY_MAX_T),
    );
}
