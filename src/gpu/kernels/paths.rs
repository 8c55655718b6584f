//! Path-stream bookkeeping kernels: slot init, liveness filter, pixel-index
//! restore after compaction.

use cubecl::prelude::*;

use crate::gpu::constants::*;

/// Reset path state for a fresh estimate and seed both pixel-index buffers
/// with the identity mapping. Thread 0 publishes the initial ray count.
#[cube(launch_unchecked)]
pub(crate) fn init_path_data(
    pixel_indices_a: &mut Array<u32>,
    pixel_indices_b: &mut Array<u32>,
    hit_count: &mut Array<u32>,
    camera_volume: f32,
    count: u32,
    paths: &mut Array<f32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= count as usize {
        terminate!();
    }
    pixel_indices_a[idx] = idx as u32;
    pixel_indices_b[idx] = idx as u32;

    let base = idx * PATH_STRIDE as usize;
    paths[base] = f32::new(1.0);
    paths[base + 1] = f32::new(1.0);
    paths[base + 2] = f32::new(1.0);
    paths[base + 3] = camera_volume;
    paths[base + 4] = f32::new(0.0);
    paths[base + 5] = f32::new(0.0);
    paths[base + 6] = f32::new(0.0);
    paths[base + 7] = f32::new(0.0);

    if idx == 0 {
        hit_count[0] = count;
    }
}

/// Convert intersections into the liveness predicate stream consumed by the
/// compactor. Paths whose ray escaped are marked killed so later gathers see
/// a consistent flag state.
#[cube(launch_unchecked)]
pub(crate) fn filter_path_stream(
    intersections: &Array<f32>,
    hit_count: &Array<u32>,
    pixel_indices: &Array<u32>,
    paths: &mut Array<f32>,
    predicates: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    let pixel_idx = pixel_indices[idx] as usize;
    let path_base = pixel_idx * PATH_STRIDE as usize;
    let flags = paths[path_base + 4] as u32;
    let shape_id = intersections[idx * ISECT_STRIDE as usize + 3];

    let killed = (flags & PATH_FLAG_KILLED) != u32::new(0);
    let scattered = (flags & PATH_FLAG_SCATTERED) != u32::new(0);
    let hit = shape_id >= f32::new(0.0) || scattered;

    if hit && !killed {
        predicates[idx] = u32::new(1);
    } else {
        predicates[idx] = u32::new(0);
        if !killed {
            paths[path_base + 4] = f32::cast_from(flags | PATH_FLAG_KILLED);
        }
    }
}

/// Re-derive the compacted pixel-index mapping:
/// `next[i] = prev[compacted[i]]` for every surviving slot.
#[cube(launch_unchecked)]
pub(crate) fn restore_pixel_indices(
    compacted: &Array<u32>,
    hit_count: &Array<u32>,
    prev_indices: &Array<u32>,
    next_indices: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= hit_count[0] as usize {
        terminate!();
    }
    next_indices[idx] = prev_indices[compacted[idx] as usize];
}
