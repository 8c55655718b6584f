//! Fixed-size work buffer pool, allocated once per capacity change.

use cubecl::prelude::*;
use cubecl::server::Handle;

use crate::gpu::constants::{
    ISECT_STRIDE, LIGHT_SAMPLE_STRIDE, PATH_STRIDE, RAY_STRIDE,
};
use crate::intersect::RayStreams;
use crate::renderer::rng::seed_buffer;
use crate::GpuClient;

/// Every per-slot device buffer the estimator owns, sized to `capacity`
/// concurrent paths.
pub(crate) struct WorkBuffers {
    pub capacity: usize,
    pub rays: [Handle; 2],
    pub shadow_rays: Handle,
    pub hits: Handle,
    pub shadow_hits: Handle,
    pub intersections: Handle,
    pub compacted_indices: Handle,
    pub pixel_indices: [Handle; 2],
    pub output_indices: Handle,
    pub iota: Handle,
    pub light_samples: Handle,
    pub paths: Handle,
    pub random: Handle,
    pub hit_count: Handle,
}

fn empty_f32(client: &GpuClient, len: usize) -> Handle {
    client.empty(len * core::mem::size_of::<f32>())
}

fn empty_u32(client: &GpuClient, len: usize) -> Handle {
    client.empty(len * core::mem::size_of::<u32>())
}

impl WorkBuffers {
    pub(crate) fn allocate(client: &GpuClient, capacity: usize, seed: u32) -> Self {
        let iota: Vec<u32> = (0..capacity as u32).collect();
        let seeds = seed_buffer(capacity, seed);
        Self {
            capacity,
            rays: [
                empty_f32(client, capacity * RAY_STRIDE as usize),
                empty_f32(client, capacity * RAY_STRIDE as usize),
            ],
            shadow_rays: empty_f32(client, capacity * RAY_STRIDE as usize),
            hits: empty_u32(client, capacity),
            shadow_hits: empty_u32(client, capacity),
            intersections: empty_f32(client, capacity * ISECT_STRIDE as usize),
            compacted_indices: empty_u32(client, capacity),
            pixel_indices: [empty_u32(client, capacity), empty_u32(client, capacity)],
            output_indices: empty_u32(client, capacity),
            iota: client.create_from_slice(u32::as_bytes(&iota)),
            light_samples: empty_f32(client, capacity * LIGHT_SAMPLE_STRIDE as usize),
            paths: empty_f32(client, capacity * PATH_STRIDE as usize),
            random: client.create_from_slice(u32::as_bytes(&seeds)),
            hit_count: empty_u32(client, 1),
        }
    }

    /// Non-owning stream views for the intersection backend.
    pub(crate) fn streams(&self) -> RayStreams {
        RayStreams {
            rays: [self.rays[0].clone(), self.rays[1].clone()],
            shadow_rays: self.shadow_rays.clone(),
            intersections: self.intersections.clone(),
            shadow_hits: self.shadow_hits.clone(),
            ray_count: self.hit_count.clone(),
            capacity: self.capacity,
        }
    }
}
