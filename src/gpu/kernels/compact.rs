//! Stream-compaction primitives: predicate scan and index scatter.

use cubecl::prelude::*;

/// Fill a u32 buffer with a constant.
#[cube(launch_unchecked)]
pub(crate) fn fill_u32(buffer: &mut Array<u32>, value: u32, count: u32) {
    let idx = ABSOLUTE_POS;
    if idx >= count as usize {
        terminate!();
    }
    buffer[idx] = value;
}

/// Fill an rgba accumulator with a constant texel.
#[cube(launch_unchecked)]
pub(crate) fn fill_accumulator(
    buffer: &mut Array<f32>,
    pixel_count: u32,
    r: f32,
    g: f32,
    b: f32,
    w: f32,
) {
    let idx = ABSOLUTE_POS;
    if idx >= pixel_count as usize {
        terminate!();
    }
    let base = idx * 4;
    buffer[base] = r;
    buffer[base + 1] = g;
    buffer[base + 2] = b;
    buffer[base + 3] = w;
}

/// Seed the prefix-sum input from the predicate stream.
/// Writes `offsets[0] = 0` and `offsets[i + 1] = min(predicates[i], 1)`.
#[cube(launch_unchecked)]
pub(crate) fn init_compact_offsets(
    predicates: &Array<u32>,
    count: u32,
    offsets: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx > count as usize {
        terminate!();
    }
    if idx == 0 {
        offsets[0] = u32::new(0);
    } else {
        let p = predicates[idx - 1];
        if p > u32::new(0) {
            offsets[idx] = u32::new(1);
        } else {
            offsets[idx] = u32::new(0);
        }
    }
}

/// One Hillis-Steele inclusive scan step over the offsets array.
#[cube(launch_unchecked)]
pub(crate) fn scan_compact_offsets(
    src: &Array<u32>,
    dst: &mut Array<u32>,
    num_entries: u32,
    stride: u32,
) {
    let idx = ABSOLUTE_POS;
    if idx >= num_entries as usize {
        terminate!();
    }
    let mut value = src[idx];
    if idx >= stride as usize {
        value += src[idx - stride as usize];
    }
    dst[idx] = value;
}

/// Scatter surviving slot indices into dense order and publish the new count.
#[cube(launch_unchecked)]
pub(crate) fn compact_scatter(
    predicates: &Array<u32>,
    offsets: &Array<u32>,
    values: &Array<u32>,
    count: u32,
    compacted: &mut Array<u32>,
    hit_count: &mut Array<u32>,
) {
    let idx = ABSOLUTE_POS;
    if idx >= count as usize {
        terminate!();
    }
    if predicates[idx] > u32::new(0) {
        let pos = offsets[idx] as usize;
        compacted[pos] = values[idx];
    }
    if idx == 0 {
        hit_count[0] = offsets[count as usize];
    }
}
