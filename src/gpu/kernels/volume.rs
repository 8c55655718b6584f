//! Participating-media kernels: free-flight sampling, in-scatter shading,
//! and shadow-ray transmission through transparent boundaries.

use cubecl::prelude::*;

use crate::gpu::constants::*;
use super::math::*;
use super::rng::*;
use super::shade::sample_direct_light;

/// Sample a scattering distance inside the path's enclosing medium. On a
/// scatter event the intersection distance is rewritten so downstream kernels
/// see the scatter point; otherwise the throughput is attenuated over the
/// full segment. Runs over the pre-compaction stream, and clears the scatter
/// flag left over from the previous bounce.
#[cube(launch_unchecked)]
pub(crate) fn sample_volume(
    rays: &Array<f32>,
    pixel_indices: &Array<u32>,
    hit_count: &Array<u32>,
    volumes: &Array<f32>,
    salt: u32,
    seeds: &Array<u32>,
    scramble: &Array<u32>,
    bounce: u32,
    frame: u32,
    intersections: &mut Array<f32>,
    paths: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let path_base = pixel_idx * PATH_STRIDE as usize;
    let flags = paths[path_base + 4] as u32;
    let cleared = (flags | PATH_FLAG_SCATTERED) ^ PATH_FLAG_SCATTERED;
    if cleared != flags {
        paths[path_base + 4] = f32::cast_from(cleared);
    }
    if (cleared & PATH_FLAG_KILLED) != u32::new(0) {
        terminate!();
    }
    let volume = paths[path_base + 3];
    if volume < f32::new(0.0) {
        terminate!();
    }
    let ray_active = rays[idx * RAY_STRIDE as usize + 7];
    if ray_active == f32::new(0.0) {
        terminate!();
    }

    let vol_base = (volume as u32 * VOLUME_STRIDE) as usize;
    let ar = volumes[vol_base];
    let ag = volumes[vol_base + 1];
    let ab = volumes[vol_base + 2];
    let sr = volumes[vol_base + 4];
    let sg = volumes[vol_base + 5];
    let sb = volumes[vol_base + 6];
    let tr_r = ar + sr;
    let tr_g = ag + sg;
    let tr_b = ab + sb;
    let sigma_avg = (tr_r + tr_g + tr_b) * f32::new(1.0 / 3.0);
    if sigma_avg <= f32::new(0.0) {
        terminate!();
    }

    let isect_base = idx * ISECT_STRIDE as usize;
    let t_surface = intersections[isect_base + 2];
    let shape_id = intersections[isect_base + 3];
    let mut t_max = t_surface;
    if shape_id < f32::new(0.0) {
        t_max = f32::new(RAY_MAX_T);
    }

    let seed = seeds[pixel_idx];
    let dim0 = bounce * DIMS_PER_BOUNCE;
    let u = sample_f32(seed, scramble, dim0 + u32::new(6), frame, salt);
    let t_scatter = -(f32::new(1.0) - u).ln() / sigma_avg;

    if t_scatter < t_max {
        // Scatter event: weight = sigma_s * exp(-sigma_t t) / pdf.
        let pdf = sigma_avg * (-sigma_avg * t_scatter).exp();
        let inv_pdf = f32::new(1.0) / pdf;
        paths[path_base] *= sr * (-tr_r * t_scatter).exp() * inv_pdf;
        paths[path_base + 1] *= sg * (-tr_g * t_scatter).exp() * inv_pdf;
        paths[path_base + 2] *= sb * (-tr_b * t_scatter).exp() * inv_pdf;
        paths[path_base + 4] = f32::cast_from(cleared | PATH_FLAG_SCATTERED);
        intersections[isect_base + 2] = t_scatter;
    } else if shape_id >= f32::new(0.0) {
        // Reached the surface: transmittance over the segment, weighted by
        // the probability of surviving the free-flight sampling.
        let p_surface = (-sigma_avg * t_surface).exp();
        let inv_p = f32::new(1.0) / p_surface;
        paths[path_base] *= (-tr_r * t_surface).exp() * inv_p;
        paths[path_base + 1] *= (-tr_g * t_surface).exp() * inv_p;
        paths[path_base + 2] *= (-tr_b * t_surface).exp() * inv_p;
    }
}

/// Shade paths that scattered inside a medium this bounce: isotropic phase
/// next-event estimation plus a uniform-sphere continuation ray. Runs over
/// the compacted stream, before `shade_surface`, which skips these slots.
#[cube(launch_unchecked)]
pub(crate) fn shade_volume(
    rays: &Array<f32>,
    intersections: &Array<f32>,
    compacted: &Array<u32>,
    pixel_indices: &Array<u32>,
    hit_count: &Array<u32>,
    lights: &Array<f32>,
    light_cdf: &Array<f32>,
    num_lights: u32,
    salt: u32,
    seeds: &mut Array<u32>,
    scramble: &Array<u32>,
    bounce: u32,
    frame: u32,
    shadow_rays: &mut Array<f32>,
    light_samples: &mut Array<f32>,
    paths: &mut Array<f32>,
    indirect_rays: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    let slot = idx as u32;
    let hit_idx = compacted[idx];
    let pixel_idx = pixel_indices[idx];
    let path_base = (pixel_idx * PATH_STRIDE) as usize;
    let flags = paths[path_base + 4] as u32;
    if (flags & PATH_FLAG_SCATTERED) == u32::new(0) {
        terminate!();
    }

    let ray_base = (hit_idx * RAY_STRIDE) as usize;
    let t = intersections[(hit_idx * ISECT_STRIDE) as usize + 2];
    let px = rays[ray_base] + rays[ray_base + 4] * t;
    let py = rays[ray_base + 1] + rays[ray_base + 5] * t;
    let pz = rays[ray_base + 2] + rays[ray_base + 6] * t;

    let tr = paths[path_base];
    let tg = paths[path_base + 1];
    let tb = paths[path_base + 2];
    let seed = seeds[pixel_idx as usize];
    let dim0 = bounce * DIMS_PER_BOUNCE;
    let inv_4pi = f32::new(1.0 / 12.566_370_614_359_172);

    if num_lights > u32::new(0) {
        let u_pick = sample_f32(seed, scramble, dim0, frame, salt);
        let u0 = sample_f32(seed, scramble, dim0 + u32::new(1), frame, salt);
        let u1 = sample_f32(seed, scramble, dim0 + u32::new(2), frame, salt);
        sample_direct_light(
            lights,
            light_cdf,
            num_lights,
            px,
            py,
            pz,
            f32::new(0.0),
            f32::new(0.0),
            f32::new(0.0),
            inv_4pi,
            inv_4pi,
            inv_4pi,
            tr,
            tg,
            tb,
            u_pick,
            u0,
            u1,
            slot,
            shadow_rays,
            light_samples,
        );
    } else {
        let sr = (slot * RAY_STRIDE) as usize;
        shadow_rays[sr + 3] = f32::new(0.0);
        shadow_rays[sr + 7] = f32::new(0.0);
        let ls = (slot * LIGHT_SAMPLE_STRIDE) as usize;
        light_samples[ls] = f32::new(0.0);
        light_samples[ls + 1] = f32::new(0.0);
        light_samples[ls + 2] = f32::new(0.0);
        light_samples[ls + 3] = f32::new(0.0);
    }

    // Uniform sphere continuation; phase over pdf is one for isotropic media.
    let u2 = sample_f32(seed, scramble, dim0 + u32::new(3), frame, salt);
    let u3 = sample_f32(seed, scramble, dim0 + u32::new(4), frame, salt);
    let z = f32::new(1.0) - f32::new(2.0) * u2;
    let r = max_f32(f32::new(0.0), f32::new(1.0) - z * z).sqrt();
    let phi = u3 * f32::new(6.283_185_307_179_586);
    let wx = r * phi.cos();
    let wy = r * phi.sin();
    let wz = z;

    let ir = (slot * RAY_STRIDE) as usize;
    indirect_rays[ir] = px;
    indirect_rays[ir + 1] = py;
    indirect_rays[ir + 2] = pz;
    indirect_rays[ir + 3] = f32::new(RAY_MAX_T);
    indirect_rays[ir + 4] = wx;
    indirect_rays[ir + 5] = wy;
    indirect_rays[ir + 6] = wz;
    indirect_rays[ir + 7] = f32::new(1.0);

    seeds[pixel_idx as usize] = advance_seed(seed, salt);
}

/// One transmission step for shadow rays: closest hits against transparent
/// boundaries attenuate the pending light sample and re-base the shadow ray
/// past the boundary; opaque hits end the sample early.
#[cube(launch_unchecked)]
pub(crate) fn apply_volume_transmission(
    pixel_indices: &Array<u32>,
    hit_count: &Array<u32>,
    intersections: &Array<f32>,
    paths: &Array<f32>,
    shapes: &Array<f32>,
    materials: &Array<f32>,
    volumes: &Array<f32>,
    shadow_rays: &mut Array<f32>,
    light_samples: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    let ray_base = idx * RAY_STRIDE as usize;
    if shadow_rays[ray_base + 7] == f32::new(0.0) {
        terminate!();
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let flags = paths[pixel_idx * PATH_STRIDE as usize + 4] as u32;
    if (flags & PATH_FLAG_KILLED) != u32::new(0) {
        terminate!();
    }

    let isect_base = idx * ISECT_STRIDE as usize;
    let shape_id = intersections[isect_base + 3];
    if shape_id < f32::new(0.0) {
        terminate!();
    }

    let ls_base = idx * LIGHT_SAMPLE_STRIDE as usize;
    let shape_base = (shape_id as u32 * SHAPE_STRIDE) as usize;
    let material_id = shapes[shape_base + 3] as u32;
    let kind = materials[(material_id * MATERIAL_STRIDE) as usize + 6] as u32;

    if kind == MATERIAL_KIND_TRANSPARENT {
        let t = intersections[isect_base + 2];
        let shape_volume = shapes[shape_base + 4];
        if shape_volume >= f32::new(0.0) {
            let vol_base = (shape_volume as u32 * VOLUME_STRIDE) as usize;
            let tr_r = volumes[vol_base] + volumes[vol_base + 4];
            let tr_g = volumes[vol_base + 1] + volumes[vol_base + 5];
            let tr_b = volumes[vol_base + 2] + volumes[vol_base + 6];
            light_samples[ls_base] *= (-tr_r * t).exp();
            light_samples[ls_base + 1] *= (-tr_g * t).exp();
            light_samples[ls_base + 2] *= (-tr_b * t).exp();
        }
        let step = t + f32::new(RAY_EPSILON);
        shadow_rays[ray_base] += shadow_rays[ray_base + 4] * step;
        shadow_rays[ray_base + 1] += shadow_rays[ray_base + 5] * step;
        shadow_rays[ray_base + 2] += shadow_rays[ray_base + 6] * step;
        shadow_rays[ray_base + 3] -= step;
        if shadow_rays[ray_base + 3] <= f32::new(0.0) {
            shadow_rays[ray_base + 3] = f32::new(0.0);
            shadow_rays[ray_base + 7] = f32::new(0.0);
        }
    } else {
        // Opaque blocker: the occlusion query would kill it anyway, ending
        // the sample here saves the remaining transmission steps.
        shadow_rays[ray_base + 3] = f32::new(0.0);
        shadow_rays[ray_base + 7] = f32::new(0.0);
        light_samples[ls_base] = f32::new(0.0);
        light_samples[ls_base + 1] = f32::new(0.0);
        light_samples[ls_base + 2] = f32::new(0.0);
    }
}
