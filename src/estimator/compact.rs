//! Host orchestration of the predicate scan and index scatter.
//!
//! The scan is a Hillis-Steele inclusive prefix sum over ping-pong offset
//! buffers; the resulting total is read back so the next bounce's dispatches
//! can shrink, and is also published into the device-resident hit count by
//! the scatter kernel.

use cubecl::prelude::*;
use cubecl::server::Handle;
use cubecl::wgpu::WgpuRuntime;

use crate::error::RenderError;
use crate::gpu;
use crate::renderer::tiles::div_ceil;
use crate::GpuClient;

pub(crate) struct StreamCompactor {
    offsets: [Handle; 2],
    capacity: usize,
}

impl StreamCompactor {
    pub(crate) fn new(client: &GpuClient, capacity: usize) -> Self {
        let zeroes = vec![0u32; capacity + 1];
        Self {
            offsets: [
                client.create_from_slice(u32::as_bytes(&zeroes)),
                client.create_from_slice(u32::as_bytes(&zeroes)),
            ],
            capacity,
        }
    }

    /// Compact `values[i]` for every slot `i < count` with a nonzero
    /// predicate into `compacted`, publish the surviving count into
    /// `hit_count`, and return it.
    pub(crate) fn compact(
        &self,
        client: &GpuClient,
        predicates: &Handle,
        values: &Handle,
        compacted: &Handle,
        hit_count: &Handle,
        count: usize,
    ) -> Result<usize, RenderError> {
        debug_assert!(count <= self.capacity);
        let num_entries = count as u32 + 1;
        let offsets_len = self.capacity + 1;
        let dim = CubeDim::new_1d(256);
        let entry_count = CubeCount::new_1d(div_ceil(num_entries, dim.x));

        unsafe {
            gpu::init_compact_offsets::launch_unchecked::<WgpuRuntime>(
                client,
                entry_count.clone(),
                dim,
                ArrayArg::from_raw_parts::<u32>(predicates, self.capacity, 1),
                ScalarArg::new(count as u32),
                ArrayArg::from_raw_parts::<u32>(&self.offsets[0], offsets_len, 1),
            )
            .map_err(RenderError::Launch)?;

            let mut offsets_in_a = true;
            let mut stride = 1u32;
            while stride < num_entries {
                let (src, dst) = if offsets_in_a {
                    (&self.offsets[0], &self.offsets[1])
                } else {
                    (&self.offsets[1], &self.offsets[0])
                };
                gpu::scan_compact_offsets::launch_unchecked::<WgpuRuntime>(
                    client,
                    entry_count.clone(),
                    dim,
                    ArrayArg::from_raw_parts::<u32>(src, offsets_len, 1),
                    ArrayArg::from_raw_parts::<u32>(dst, offsets_len, 1),
                    ScalarArg::new(num_entries),
                    ScalarArg::new(stride),
                )
                .map_err(RenderError::Launch)?;
                offsets_in_a = !offsets_in_a;
                stride = stride.saturating_mul(2);
            }

            let scanned = if offsets_in_a {
                &self.offsets[0]
            } else {
                &self.offsets[1]
            };

            let scatter_count = CubeCount::new_1d(div_ceil(count as u32, dim.x));
            gpu::compact_scatter::launch_unchecked::<WgpuRuntime>(
                client,
                scatter_count,
                dim,
                ArrayArg::from_raw_parts::<u32>(predicates, self.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(scanned, offsets_len, 1),
                ArrayArg::from_raw_parts::<u32>(values, self.capacity, 1),
                ScalarArg::new(count as u32),
                ArrayArg::from_raw_parts::<u32>(compacted, self.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(hit_count, 1, 1),
            )
            .map_err(RenderError::Launch)?;

            let bytes = client.read_one(scanned.clone());
            let offsets = u32::from_bytes(&bytes);
            Ok(offsets.get(count).copied().unwrap_or(0) as usize)
        }
    }
}

#[cfg(test)]
mod tests {
    /// Host mirror of the scan + scatter pipeline.
    fn compact_host(predicates: &[u32]) -> (Vec<u32>, usize) {
        let mut compacted = Vec::new();
        for (slot, &p) in predicates.iter().enumerate() {
            if p != 0 {
                compacted.push(slot as u32);
            }
        }
        let count = compacted.len();
        (compacted, count)
    }

    /// Host mirror of the pixel-index restore kernel.
    fn restore_host(compacted: &[u32], prev: &[u32]) -> Vec<u32> {
        compacted.iter().map(|&slot| prev[slot as usize]).collect()
    }

    #[test]
    fn compaction_preserves_slot_order() {
        let (compacted, count) = compact_host(&[1, 0, 1, 1, 0, 1]);
        assert_eq!(compacted, vec![0, 2, 3, 5]);
        assert_eq!(count, 4);
    }

    #[test]
    fn compaction_count_never_grows() {
        let mut predicates = vec![1u32; 16];
        let mut prev_count = predicates.len();
        for dead in [3usize, 7, 11, 15] {
            predicates[dead] = 0;
            let (_, count) = compact_host(&predicates);
            assert!(count <= prev_count);
            prev_count = count;
        }
        assert_eq!(prev_count, 12);
    }

    #[test]
    fn restore_composes_pixel_mappings_across_bounces() {
        // Bounce 0: slots map to their own pixels.
        let prev: Vec<u32> = (0..8).collect();
        // Slots 1, 4, 6 survive.
        let (compacted, _) = compact_host(&[0, 1, 0, 0, 1, 0, 1, 0]);
        let next = restore_host(&compacted, &prev);
        assert_eq!(next, vec![1, 4, 6]);

        // Bounce 1: the middle survivor dies; its pixel must vanish with it.
        let (compacted, _) = compact_host(&[1, 0, 1]);
        let next2 = restore_host(&compacted, &next);
        assert_eq!(next2, vec![1, 6]);
    }

    #[test]
    fn empty_predicates_compact_to_zero() {
        let (compacted, count) = compact_host(&[0, 0, 0]);
        assert!(compacted.is_empty());
        assert_eq!(count, 0);
    }
}
