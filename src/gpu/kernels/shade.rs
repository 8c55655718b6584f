//! Surface and miss shading kernels.
//!
//! `shade_surface` runs over the compacted stream: it accounts for direct
//! emission, samples one light for next-event estimation, and writes the
//! continuation ray into the opposite-parity ray buffer. The miss kernels run
//! over the pre-compaction stream so escaped rays can still credit their
//! pixel.

use cubecl::prelude::*;

use crate::gpu::constants::*;
use super::math::*;
use super::rng::*;

/// Nearest-texel fetch, returned as rgba.
#[cube]
pub(super) fn texture_fetch(
    textures: &Array<f32>,
    texture_data: &Array<f32>,
    texture_idx: u32,
    u: f32,
    v: f32,
) -> Line<f32> {
    let desc = (texture_idx * TEXTURE_DESC_STRIDE) as usize;
    let offset = textures[desc] as u32;
    let width = textures[desc + 1] as u32;
    let height = textures[desc + 2] as u32;

    let fx = clamp_f32(u, f32::new(0.0), f32::new(1.0)) * (f32::cast_from(width) - f32::new(1.0));
    let fy = clamp_f32(v, f32::new(0.0), f32::new(1.0)) * (f32::cast_from(height) - f32::new(1.0));
    let tx = fx as u32;
    let ty = fy as u32;

    let base = (offset + (ty * width + tx) * 4) as usize;
    let mut out = Line::empty(4usize);
    out[0] = texture_data[base];
    out[1] = texture_data[base + 1];
    out[2] = texture_data[base + 2];
    out[3] = texture_data[base + 3];
    out
}

/// Environment radiance for a unit direction, via a lat-long style lookup.
#[cube]
pub(super) fn env_radiance(
    textures: &Array<f32>,
    texture_data: &Array<f32>,
    envmap_idx: u32,
    dx: f32,
    dy: f32,
    dz: f32,
) -> Line<f32> {
    let u = f32::new(0.5) + f32::new(0.5) * dx / (abs3_max(dx, dy, dz) + f32::new(1.0e-6)) * sign_of(dz);
    let v = f32::new(0.5) * (f32::new(1.0) - dy);
    texture_fetch(textures, texture_data, envmap_idx, u, v)
}

#[cube]
fn abs3_max(x: f32, y: f32, z: f32) -> f32 {
    let ax = if x < f32::new(0.0) { -x } else { x };
    let ay = if y < f32::new(0.0) { -y } else { y };
    let az = if z < f32::new(0.0) { -z } else { z };
    max_f32(ax, max_f32(ay, az))
}

#[cube]
fn sign_of(x: f32) -> f32 {
    if x < f32::new(0.0) {
        f32::new(-1.0)
    } else {
        f32::new(1.0)
    }
}

/// Sample one light by the power distribution and emit a shadow ray plus the
/// tentative light-sample radiance for `slot`. `nx/ny/nz` is the shading
/// normal, or the zero vector at a volume scatter point (no receiver cosine,
/// no normal offset). `fr/fg/fb` is the bsdf or phase factor without the
/// receiver cosine; `tr/tg/tb` is the path throughput.
#[cube]
pub(super) fn sample_direct_light(
    lights: &Array<f32>,
    light_cdf: &Array<f32>,
    num_lights: u32,
    px: f32,
    py: f32,
    pz: f32,
    nx: f32,
    ny: f32,
    nz: f32,
    fr: f32,
    fg: f32,
    fb: f32,
    tr: f32,
    tg: f32,
    tb: f32,
    u_pick: f32,
    u0: f32,
    u1: f32,
    slot: u32,
    shadow_rays: &mut Array<f32>,
    light_samples: &mut Array<f32>,
) {
    let ray_base = (slot * RAY_STRIDE) as usize;
    let ls_base = (slot * LIGHT_SAMPLE_STRIDE) as usize;

    let mut light_idx = u32::new(0);
    let mut pick_pdf = f32::new(0.0);
    for i in 0..num_lights {
        let lo = light_cdf[i as usize];
        let hi = light_cdf[(i + 1) as usize];
        if u_pick >= lo && u_pick < hi {
            light_idx = i;
            pick_pdf = hi - lo;
        }
    }

    let base = (light_idx * LIGHT_STRIDE) as usize;
    let kind = lights[base] as u32;
    let area = lights[base + 1];
    let rr = lights[base + 2];
    let rg = lights[base + 3];
    let rb = lights[base + 4];

    let has_normal = nx * nx + ny * ny + nz * nz > f32::new(0.5);

    let mut active: bool = false;
    let mut wx = f32::new(0.0);
    let mut wy = f32::new(0.0);
    let mut wz = f32::new(1.0);
    let mut max_t = f32::new(0.0);
    let mut weight = f32::new(0.0);

    if kind == LIGHT_KIND_QUAD && pick_pdf > f32::new(0.0) {
        let sx = lights[base + 5] + u0 * lights[base + 8] + u1 * lights[base + 11];
        let sy = lights[base + 6] + u0 * lights[base + 9] + u1 * lights[base + 12];
        let sz = lights[base + 7] + u0 * lights[base + 10] + u1 * lights[base + 13];

        let to_x = sx - px;
        let to_y = sy - py;
        let to_z = sz - pz;
        let dist_sq = vec3_dot(to_x, to_y, to_z, to_x, to_y, to_z);
        let w = vec3_normalize(to_x, to_y, to_z);
        wx = w[0];
        wy = w[1];
        wz = w[2];
        max_t = w[3] - f32::new(2.0) * f32::new(RAY_EPSILON);

        let ln = vec3_cross(
            lights[base + 8],
            lights[base + 9],
            lights[base + 10],
            lights[base + 11],
            lights[base + 12],
            lights[base + 13],
        );
        let lnn = vec3_normalize(ln[0], ln[1], ln[2]);
        let cos_light = vec3_dot(lnn[0], lnn[1], lnn[2], -wx, -wy, -wz);
        let mut cos_recv = f32::new(1.0);
        if has_normal {
            cos_recv = vec3_dot(nx, ny, nz, wx, wy, wz);
        }

        if cos_light > f32::new(0.0) && cos_recv > f32::new(0.0) && dist_sq > f32::new(0.0) {
            let pdf = pick_pdf * dist_sq / (area * cos_light);
            weight = cos_recv / pdf;
            active = true;
        }
    } else if kind == LIGHT_KIND_DIRECTIONAL && pick_pdf > f32::new(0.0) {
        wx = -lights[base + 5];
        wy = -lights[base + 6];
        wz = -lights[base + 7];
        max_t = f32::new(RAY_MAX_T);
        let mut cos_recv = f32::new(1.0);
        if has_normal {
            cos_recv = vec3_dot(nx, ny, nz, wx, wy, wz);
        }
        if cos_recv > f32::new(0.0) {
            weight = cos_recv / pick_pdf;
            active = true;
        }
    }

    if active {
        let eps = f32::new(RAY_EPSILON);
        let mut ox = px + wx * eps;
        let mut oy = py + wy * eps;
        let mut oz = pz + wz * eps;
        if has_normal {
            ox = px + nx * eps;
            oy = py + ny * eps;
            oz = pz + nz * eps;
        }
        shadow_rays[ray_base] = ox;
        shadow_rays[ray_base + 1] = oy;
        shadow_rays[ray_base + 2] = oz;
        shadow_rays[ray_base + 3] = max_t;
        shadow_rays[ray_base + 4] = wx;
        shadow_rays[ray_base + 5] = wy;
        shadow_rays[ray_base + 6] = wz;
        shadow_rays[ray_base + 7] = f32::new(1.0);

        light_samples[ls_base] = tr * fr * rr * weight;
        light_samples[ls_base + 1] = tg * fg * rg * weight;
        light_samples[ls_base + 2] = tb * fb * rb * weight;
        light_samples[ls_base + 3] = f32::new(0.0);
    } else {
        shadow_rays[ray_base + 3] = f32::new(0.0);
        shadow_rays[ray_base + 7] = f32::new(0.0);
        light_samples[ls_base] = f32::new(0.0);
        light_samples[ls_base + 1] = f32::new(0.0);
        light_samples[ls_base + 2] = f32::new(0.0);
        light_samples[ls_base + 3] = f32::new(0.0);
    }
}

#[cube]
fn deactivate_slot(
    slot: u32,
    shadow_rays: &mut Array<f32>,
    light_samples: &mut Array<f32>,
    indirect_rays: &mut Array<f32>,
) {
    let ray_base = (slot * RAY_STRIDE) as usize;
    shadow_rays[ray_base + 3] = f32::new(0.0);
    shadow_rays[ray_base + 7] = f32::new(0.0);
    indirect_rays[ray_base + 3] = f32::new(0.0);
    indirect_rays[ray_base + 7] = f32::new(0.0);
    let ls_base = (slot * LIGHT_SAMPLE_STRIDE) as usize;
    light_samples[ls_base] = f32::new(0.0);
    light_samples[ls_base + 1] = f32::new(0.0);
    light_samples[ls_base + 2] = f32::new(0.0);
    light_samples[ls_base + 3] = f32::new(0.0);
}

/// Shade the compacted surface hits: emission, next-event estimation, bsdf
/// continuation. One thread per surviving path slot.
#[cube(launch_unchecked)]
pub(crate) fn shade_surface(
    rays: &Array<f32>,
    intersections: &Array<f32>,
    compacted: &Array<u32>,
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    hit_count: &Array<u32>,
    normals: &Array<f32>,
    uvs: &Array<f32>,
    indices: &Array<u32>,
    shapes: &Array<f32>,
    materials: &Array<f32>,
    textures: &Array<f32>,
    texture_data: &Array<f32>,
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
    output: &mut Array<f32>,
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

    if (flags & PATH_FLAG_SCATTERED) != u32::new(0) {
        // The volume kernel already produced this slot's rays and sample.
        terminate!();
    }
    if (flags & PATH_FLAG_KILLED) != u32::new(0) {
        deactivate_slot(slot, shadow_rays, light_samples, indirect_rays);
        terminate!();
    }

    let isect_base = (hit_idx * ISECT_STRIDE) as usize;
    let bu = intersections[isect_base];
    let bv = intersections[isect_base + 1];
    let t = intersections[isect_base + 2];
    let shape_id = intersections[isect_base + 3];
    let prim_id = intersections[isect_base + 4] as u32;
    if shape_id < f32::new(0.0) {
        deactivate_slot(slot, shadow_rays, light_samples, indirect_rays);
        terminate!();
    }

    let ray_base = (hit_idx * RAY_STRIDE) as usize;
    let ox = rays[ray_base];
    let oy = rays[ray_base + 1];
    let oz = rays[ray_base + 2];
    let dx = rays[ray_base + 4];
    let dy = rays[ray_base + 5];
    let dz = rays[ray_base + 6];
    let px = ox + dx * t;
    let py = oy + dy * t;
    let pz = oz + dz * t;

    let shape_base = (shape_id as u32 * SHAPE_STRIDE) as usize;
    let index_offset = shapes[shape_base] as u32;
    let vertex_offset = shapes[shape_base + 1] as u32;
    let material_id = shapes[shape_base + 3] as u32;
    let shape_volume = shapes[shape_base + 4];

    let tri = (index_offset + prim_id * 3) as usize;
    let i0 = indices[tri] + vertex_offset;
    let i1 = indices[tri + 1] + vertex_offset;
    let i2 = indices[tri + 2] + vertex_offset;
    let bw = f32::new(1.0) - bu - bv;

    let n0 = (i0 * VERTEX_STRIDE) as usize;
    let n1 = (i1 * VERTEX_STRIDE) as usize;
    let n2 = (i2 * VERTEX_STRIDE) as usize;
    let raw_nx = normals[n0] * bw + normals[n1] * bu + normals[n2] * bv;
    let raw_ny = normals[n0 + 1] * bw + normals[n1 + 1] * bu + normals[n2 + 1] * bv;
    let raw_nz = normals[n0 + 2] * bw + normals[n1 + 2] * bu + normals[n2 + 2] * bv;
    let nn = vec3_normalize(raw_nx, raw_ny, raw_nz);
    let mut nx = nn[0];
    let mut ny = nn[1];
    let mut nz = nn[2];
    let entering = vec3_dot(nx, ny, nz, dx, dy, dz) < f32::new(0.0);
    if !entering {
        nx = -nx;
        ny = -ny;
        nz = -nz;
    }

    let mat_base = (material_id * MATERIAL_STRIDE) as usize;
    let mut kr = materials[mat_base];
    let mut kg = materials[mat_base + 1];
    let mut kb = materials[mat_base + 2];
    let er = materials[mat_base + 3];
    let eg = materials[mat_base + 4];
    let eb = materials[mat_base + 5];
    let kind = materials[mat_base + 6] as u32;
    let albedo_tex = materials[mat_base + 7];
    if albedo_tex >= f32::new(0.0) {
        let u0 = (i0 * UV_STRIDE) as usize;
        let u1 = (i1 * UV_STRIDE) as usize;
        let u2 = (i2 * UV_STRIDE) as usize;
        let tu = uvs[u0] * bw + uvs[u1] * bu + uvs[u2] * bv;
        let tv = uvs[u0 + 1] * bw + uvs[u1 + 1] * bu + uvs[u2 + 1] * bv;
        let texel = texture_fetch(textures, texture_data, albedo_tex as u32, tu, tv);
        kr *= texel[0];
        kg *= texel[1];
        kb *= texel[2];
    }

    let mut tr = paths[path_base];
    let mut tg = paths[path_base + 1];
    let mut tb = paths[path_base + 2];
    let out_base = (output_indices[pixel_idx as usize] * OUTPUT_STRIDE) as usize;
    let seed = seeds[pixel_idx as usize];
    let dim0 = bounce * DIMS_PER_BOUNCE;

    if er > f32::new(0.0) || eg > f32::new(0.0) || eb > f32::new(0.0) {
        // Emitters terminate the path; radiance is credited only where
        // next-event estimation could not have counted it already.
        if bounce == u32::new(0) || (flags & PATH_FLAG_SPECULAR) != u32::new(0) {
            output[out_base] += tr * er;
            output[out_base + 1] += tg * eg;
            output[out_base + 2] += tb * eb;
        }
        paths[path_base + 4] = f32::cast_from(flags | PATH_FLAG_KILLED);
        deactivate_slot(slot, shadow_rays, light_samples, indirect_rays);
        seeds[pixel_idx as usize] = advance_seed(seed, salt);
        terminate!();
    }

    if kind == MATERIAL_KIND_TRANSPARENT {
        // Delta transmission through a volume boundary: tint, flip the
        // enclosing volume, continue straight.
        tr *= kr;
        tg *= kg;
        tb *= kb;
        if entering {
            paths[path_base + 3] = shape_volume;
        } else {
            paths[path_base + 3] = f32::new(-1.0);
        }
        paths[path_base] = tr;
        paths[path_base + 1] = tg;
        paths[path_base + 2] = tb;
        paths[path_base + 4] = f32::cast_from(flags | PATH_FLAG_SPECULAR);

        let eps = f32::new(RAY_EPSILON);
        let ir = (slot * RAY_STRIDE) as usize;
        indirect_rays[ir] = px + dx * eps;
        indirect_rays[ir + 1] = py + dy * eps;
        indirect_rays[ir + 2] = pz + dz * eps;
        indirect_rays[ir + 3] = f32::new(RAY_MAX_T);
        indirect_rays[ir + 4] = dx;
        indirect_rays[ir + 5] = dy;
        indirect_rays[ir + 6] = dz;
        indirect_rays[ir + 7] = f32::new(1.0);

        let sr = (slot * RAY_STRIDE) as usize;
        shadow_rays[sr + 3] = f32::new(0.0);
        shadow_rays[sr + 7] = f32::new(0.0);
        let ls = (slot * LIGHT_SAMPLE_STRIDE) as usize;
        light_samples[ls] = f32::new(0.0);
        light_samples[ls + 1] = f32::new(0.0);
        light_samples[ls + 2] = f32::new(0.0);
        light_samples[ls + 3] = f32::new(0.0);
        seeds[pixel_idx as usize] = advance_seed(seed, salt);
        terminate!();
    }

    let new_flags = (flags | PATH_FLAG_SPECULAR) ^ PATH_FLAG_SPECULAR;

    if bounce >= RUSSIAN_ROULETTE_START {
        let q = clamp_f32(max_f32(tr, max_f32(tg, tb)), f32::new(0.05), f32::new(1.0));
        let u_rr = sample_f32(seed, scramble, dim0 + u32::new(5), frame, salt);
        if u_rr >= q {
            paths[path_base + 4] = f32::cast_from(new_flags | PATH_FLAG_KILLED);
            deactivate_slot(slot, shadow_rays, light_samples, indirect_rays);
            seeds[pixel_idx as usize] = advance_seed(seed, salt);
            terminate!();
        }
        let inv_q = f32::new(1.0) / q;
        tr *= inv_q;
        tg *= inv_q;
        tb *= inv_q;
    }

    let inv_pi = f32::new(1.0 / 3.141_592_653_589_793);
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
            nx,
            ny,
            nz,
            kr * inv_pi,
            kg * inv_pi,
            kb * inv_pi,
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

    // Cosine-weighted hemisphere continuation; the cosine cancels the pdf.
    let ub0 = sample_f32(seed, scramble, dim0 + u32::new(3), frame, salt);
    let ub1 = sample_f32(seed, scramble, dim0 + u32::new(4), frame, salt);
    let r = ub0.sqrt();
    let phi = ub1 * f32::new(6.283_185_307_179_586);
    let lx = r * phi.cos();
    let ly = r * phi.sin();
    let lz = (f32::new(1.0) - ub0).sqrt();

    let tangent = onb_tangent(nx, ny, nz);
    let bitan = vec3_cross(nx, ny, nz, tangent[0], tangent[1], tangent[2]);
    let wx = tangent[0] * lx + bitan[0] * ly + nx * lz;
    let wy = tangent[1] * lx + bitan[1] * ly + ny * lz;
    let wz = tangent[2] * lx + bitan[2] * ly + nz * lz;

    tr *= kr;
    tg *= kg;
    tb *= kb;

    paths[path_base] = tr;
    paths[path_base + 1] = tg;
    paths[path_base + 2] = tb;
    paths[path_base + 4] = f32::cast_from(new_flags);

    let eps = f32::new(RAY_EPSILON);
    let ir = (slot * RAY_STRIDE) as usize;
    indirect_rays[ir] = px + nx * eps;
    indirect_rays[ir + 1] = py + ny * eps;
    indirect_rays[ir + 2] = pz + nz * eps;
    indirect_rays[ir + 3] = f32::new(RAY_MAX_T);
    indirect_rays[ir + 4] = wx;
    indirect_rays[ir + 5] = wy;
    indirect_rays[ir + 6] = wz;
    indirect_rays[ir + 7] = f32::new(1.0);

    seeds[pixel_idx as usize] = advance_seed(seed, salt);
}

/// Environment contribution for rays that escaped on a secondary bounce.
/// Runs over the pre-compaction stream.
#[cube(launch_unchecked)]
pub(crate) fn shade_miss(
    rays: &Array<f32>,
    intersections: &Array<f32>,
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    hit_count: &Array<u32>,
    envmap_idx: u32,
    textures: &Array<f32>,
    texture_data: &Array<f32>,
    paths: &Array<f32>,
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    let shape_id = intersections[idx * ISECT_STRIDE as usize + 3];
    if shape_id >= f32::new(0.0) {
        terminate!();
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let path_base = pixel_idx * PATH_STRIDE as usize;
    let flags = paths[path_base + 4] as u32;
    if (flags & (PATH_FLAG_KILLED | PATH_FLAG_SCATTERED)) != u32::new(0) {
        terminate!();
    }

    let ray_base = idx * RAY_STRIDE as usize;
    let env = env_radiance(
        textures,
        texture_data,
        envmap_idx,
        rays[ray_base + 4],
        rays[ray_base + 5],
        rays[ray_base + 6],
    );
    let out_base = (output_indices[pixel_idx] * OUTPUT_STRIDE) as usize;
    output[out_base] += paths[path_base] * env[0];
    output[out_base + 1] += paths[path_base + 1] * env[1];
    output[out_base + 2] += paths[path_base + 2] * env[2];
}

/// Bounce-0 environment shading. Every slot receives its one sample credit;
/// escaped rays additionally receive the environment radiance.
#[cube(launch_unchecked)]
pub(crate) fn shade_background(
    rays: &Array<f32>,
    intersections: &Array<f32>,
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    count: u32,
    envmap_idx: u32,
    textures: &Array<f32>,
    texture_data: &Array<f32>,
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= count as usize {
        terminate!();
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let out_base = (output_indices[pixel_idx] * OUTPUT_STRIDE) as usize;
    let shape_id = intersections[idx * ISECT_STRIDE as usize + 3];
    if shape_id < f32::new(0.0) {
        let ray_base = idx * RAY_STRIDE as usize;
        let env = env_radiance(
            textures,
            texture_data,
            envmap_idx,
            rays[ray_base + 4],
            rays[ray_base + 5],
            rays[ray_base + 6],
        );
        output[out_base] += env[0];
        output[out_base + 1] += env[1];
        output[out_base + 2] += env[2];
    }
    output[out_base + 3] += f32::new(1.0);
}

/// Bounce-0 backplate shading: escaped primary rays read the background
/// texture by pixel coordinate instead of by direction.
#[cube(launch_unchecked)]
pub(crate) fn shade_background_image(
    intersections: &Array<f32>,
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    count: u32,
    background_idx: u32,
    output_width: u32,
    output_height: u32,
    textures: &Array<f32>,
    texture_data: &Array<f32>,
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= count as usize {
        terminate!();
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let out_pixel = output_indices[pixel_idx];
    let out_base = (out_pixel * OUTPUT_STRIDE) as usize;
    let shape_id = intersections[idx * ISECT_STRIDE as usize + 3];
    if shape_id < f32::new(0.0) {
        let px = out_pixel % output_width;
        let py = out_pixel / output_width;
        let u = (f32::cast_from(px) + f32::new(0.5)) / f32::cast_from(output_width);
        let v = (f32::cast_from(py) + f32::new(0.5)) / f32::cast_from(output_height);
        let texel = texture_fetch(textures, texture_data, background_idx, u, v);
        output[out_base] += texel[0];
        output[out_base + 1] += texel[1];
        output[out_base + 2] += texel[2];
    }
    output[out_base + 3] += f32::new(1.0);
}

/// Bounce-0 bookkeeping when no environment is present: every slot still
/// counts as one sample so progressive normalization stays correct.
#[cube(launch_unchecked)]
pub(crate) fn advance_iteration_count(
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    count: u32,
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= count as usize {
        terminate!();
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let out_base = (output_indices[pixel_idx] * OUTPUT_STRIDE) as usize;
    output[out_base + 3] += f32::new(1.0);
}
