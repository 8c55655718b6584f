//! Gather kernels resolving shadow queries into output contributions.

use cubecl::prelude::*;

use crate::gpu::constants::*;

/// Add unoccluded light samples into the output accumulator.
#[cube(launch_unchecked)]
pub(crate) fn gather_light_samples(
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    hit_count: &Array<u32>,
    shadow_hits: &Array<u32>,
    light_samples: &Array<f32>,
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    if shadow_hits[idx] != u32::new(0) {
        terminate!();
    }
    let ls_base = idx * LIGHT_SAMPLE_STRIDE as usize;
    let pixel_idx = pixel_indices[idx] as usize;
    let out_base = (output_indices[pixel_idx] * OUTPUT_STRIDE) as usize;
    output[out_base] += light_samples[ls_base];
    output[out_base + 1] += light_samples[ls_base + 1];
    output[out_base + 2] += light_samples[ls_base + 2];
}

/// Float-atomic variant of [`gather_light_samples`] for callers whose output
/// indices contain duplicate entries.
#[cube(launch_unchecked)]
pub(crate) fn gather_light_samples_atomic(
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    hit_count: &Array<u32>,
    shadow_hits: &Array<u32>,
    light_samples: &Array<f32>,
    output: &mut Array<Atomic<f32>>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    if shadow_hits[idx] != u32::new(0) {
        terminate!();
    }
    let ls_base = idx * LIGHT_SAMPLE_STRIDE as usize;
    let pixel_idx = pixel_indices[idx] as usize;
    let out_base = (output_indices[pixel_idx] * OUTPUT_STRIDE) as usize;
    output[out_base].fetch_add(light_samples[ls_base]);
    output[out_base + 1].fetch_add(light_samples[ls_base + 1]);
    output[out_base + 2].fetch_add(light_samples[ls_base + 2]);
}

/// Resolve bounce-0 shadow visibility into the visibility AOV.
#[cube(launch_unchecked)]
pub(crate) fn gather_visibility(
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    hit_count: &Array<u32>,
    shadow_hits: &Array<u32>,
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    let mut visibility = f32::new(0.0);
    if shadow_hits[idx] == u32::new(0) {
        visibility = f32::new(1.0);
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let out_base = (output_indices[pixel_idx] * OUTPUT_STRIDE) as usize;
    output[out_base] += visibility;
    output[out_base + 1] += visibility;
    output[out_base + 2] += visibility;
    output[out_base + 3] += f32::new(1.0);
}

/// Record opacity for paths leaving the stream. In-loop calls credit the
/// slots dying this bounce; the trailing call (`final_pass != 0`) credits
/// every slot still present at the bounce limit.
#[cube(launch_unchecked)]
pub(crate) fn gather_opacity(
    pixel_indices: &Array<u32>,
    output_indices: &Array<u32>,
    hit_count: &Array<u32>,
    predicates: &Array<u32>,
    final_pass: u32,
    output: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    if final_pass == u32::new(0) && predicates[idx] != u32::new(0) {
        terminate!();
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let out_base = (output_indices[pixel_idx] * OUTPUT_STRIDE) as usize;
    output[out_base] += f32::new(1.0);
    output[out_base + 1] += f32::new(1.0);
    output[out_base + 2] += f32::new(1.0);
    output[out_base + 3] += f32::new(1.0);
}
