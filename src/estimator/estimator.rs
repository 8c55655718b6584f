//! The wavefront path-tracing estimator.

use std::time::Instant;

use cubecl::features::TypeUsage;
use cubecl::ir::{ElemType, FloatKind, StorageType};
use cubecl::prelude::*;
use cubecl::server::Handle;
use cubecl::wgpu::{WgpuDevice, WgpuRuntime};

use log::debug;

use crate::error::RenderError;
use crate::gpu;
use crate::gpu::constants::{
    ISECT_STRIDE, LIGHT_SAMPLE_STRIDE, PATH_STRIDE, RAY_STRIDE, SCRAMBLE_DIMS,
};
use crate::intersect::{Intersector, StreamSlot};
use crate::renderer::rng::{scramble_table, Pcg32};
use crate::renderer::tiles::div_ceil;
use crate::scene::CompiledScene;
use crate::GpuClient;

use super::buffers::WorkBuffers;
use super::compact::StreamCompactor;
use super::types::{
    IntermediateValue, MissedPrimaryRays, OutputBuffer, RandomBufferKind, RayTracingStats,
    INTERMEDIATE_VALUE_COUNT,
};

/// Caller-supplied replacement for the built-in bounce-0 miss shading.
pub type MissedPrimaryHandler<'a> =
    dyn FnMut(MissedPrimaryRays<'_>) -> Result<(), RenderError> + 'a;

const DEFAULT_MAX_BOUNCES: u32 = 5;

/// Runs one complete wavefront estimate of up to `capacity` independent
/// light paths per call, compacting the stream every bounce so dead paths
/// stop consuming dispatches.
pub struct PathTracingEstimator {
    device: WgpuDevice,
    intersector: Box<dyn Intersector>,
    buffers: Option<WorkBuffers>,
    compactor: Option<StreamCompactor>,
    scramble: Handle,
    seed: u32,
    salt: Pcg32,
    sample_counter: u32,
    max_bounces: u32,
    max_shadow_transmission_steps: u32,
    intermediate: [Option<OutputBuffer>; INTERMEDIATE_VALUE_COUNT],
}

impl PathTracingEstimator {
    /// Construct an estimator on `device` over the given intersection
    /// backend. `set_work_buffer_size` must be called before the first
    /// estimate.
    pub fn new(device: WgpuDevice, intersector: Box<dyn Intersector>) -> Self {
        let seed = 0;
        let client = WgpuRuntime::client(&device);
        let scramble = upload_scramble(&client, seed);
        Self {
            device,
            intersector,
            buffers: None,
            compactor: None,
            scramble,
            seed,
            salt: Pcg32::new(0, seed as u64),
            sample_counter: 0,
            max_bounces: DEFAULT_MAX_BOUNCES,
            max_shadow_transmission_steps: 0,
            intermediate: [None, None],
        }
    }

    /// Currently allocated path capacity, zero before the first allocation.
    pub fn work_buffer_size(&self) -> usize {
        self.buffers.as_ref().map_or(0, |b| b.capacity)
    }

    /// (Re)allocate every per-slot buffer for `size` concurrent paths and
    /// re-register the intersector's stream views. A no-op when `size`
    /// matches the current allocation.
    pub fn set_work_buffer_size(&mut self, size: usize) -> Result<(), RenderError> {
        if size == 0 {
            return Err(RenderError::Config("work buffer size must be nonzero"));
        }
        if size > crate::gpu::constants::MAX_F32_INT {
            return Err(RenderError::Config("work buffer size exceeds index range"));
        }
        if self.work_buffer_size() == size {
            return Ok(());
        }
        debug!("allocating work buffers for {size} paths");

        let client = self.client();
        self.intersector.release_streams();
        let buffers = WorkBuffers::allocate(&client, size, self.seed);
        self.compactor = Some(StreamCompactor::new(&client, size));
        self.intersector.register_streams(buffers.streams())?;
        self.buffers = Some(buffers);
        Ok(())
    }

    /// Reseed the per-slot seed buffer and the scramble table. Estimates
    /// with equal seeds and equal inputs produce identical results.
    pub fn set_random_seed(&mut self, seed: u32) {
        self.seed = seed;
        self.salt = Pcg32::new(0, seed as u64);
        let client = self.client();
        self.scramble = upload_scramble(&client, seed);
        if let Some(buffers) = self.buffers.as_mut() {
            let seeds = crate::renderer::rng::seed_buffer(buffers.capacity, seed);
            buffers.random = client.create_from_slice(u32::as_bytes(&seeds));
        }
    }

    pub fn set_max_bounces(&mut self, max_bounces: u32) {
        self.max_bounces = max_bounces;
    }

    pub fn max_bounces(&self) -> u32 {
        self.max_bounces
    }

    pub fn set_max_shadow_transmission_steps(&mut self, steps: u32) {
        self.max_shadow_transmission_steps = steps;
    }

    pub fn max_shadow_transmission_steps(&self) -> u32 {
        self.max_shadow_transmission_steps
    }

    /// Primary ray buffer, filled by the caller before `estimate`.
    pub fn ray_buffer(&self) -> Option<&Handle> {
        self.buffers.as_ref().map(|b| &b.rays[0])
    }

    /// Slot-to-output-pixel indirection, filled by the caller.
    pub fn output_index_buffer(&self) -> Option<&Handle> {
        self.buffers.as_ref().map(|b| &b.output_indices)
    }

    /// Device-resident ray count, written by the caller's generation kernel.
    pub fn ray_count_buffer(&self) -> Option<&Handle> {
        self.buffers.as_ref().map(|b| &b.hit_count)
    }

    /// First-hit intersection records, valid after `trace_first_hit`.
    pub fn first_hit_buffer(&self) -> Option<&Handle> {
        self.buffers.as_ref().map(|b| &b.intersections)
    }

    pub fn has_random_buffer(&self, kind: RandomBufferKind) -> bool {
        match kind {
            RandomBufferKind::SeedState => self.buffers.is_some(),
            RandomBufferKind::ScrambleLut => true,
        }
    }

    /// Random buffers consumed by the estimator's own kernels, exposed so
    /// ray generation stays consistent with shading.
    pub fn random_buffer(&self, kind: RandomBufferKind) -> Option<&Handle> {
        match kind {
            RandomBufferKind::SeedState => self.buffers.as_ref().map(|b| &b.random),
            RandomBufferKind::ScrambleLut => Some(&self.scramble),
        }
    }

    pub fn supports_intermediate_value(&self, value: IntermediateValue) -> bool {
        matches!(
            value,
            IntermediateValue::Visibility | IntermediateValue::Opacity
        )
    }

    pub fn set_intermediate_value_buffer(
        &mut self,
        value: IntermediateValue,
        buffer: Option<OutputBuffer>,
    ) {
        self.intermediate[value.index()] = buffer;
    }

    pub fn has_intermediate_value_buffer(&self, value: IntermediateValue) -> bool {
        self.intermediate[value.index()].is_some()
    }

    pub fn intermediate_value_buffer(&self, value: IntermediateValue) -> Option<&OutputBuffer> {
        self.intermediate[value.index()].as_ref()
    }

    pub fn sample_counter(&self) -> u32 {
        self.sample_counter
    }

    fn client(&self) -> GpuClient {
        WgpuRuntime::client(&self.device)
    }

    /// Run the full multi-bounce wavefront loop for `num_estimates` paths,
    /// accumulating radiance into `output`.
    ///
    /// The caller must have filled the primary ray buffer (and the output
    /// index buffer when `use_output_indices` is set). `atomic_update`
    /// signals that the output indices may contain duplicates; on devices
    /// with float atomic add the contended gather then routes through an
    /// atomic kernel.
    pub fn estimate(
        &mut self,
        scene: &CompiledScene,
        num_estimates: usize,
        output: &OutputBuffer,
        use_output_indices: bool,
        atomic_update: bool,
        mut missed_primary: Option<&mut MissedPrimaryHandler<'_>>,
    ) -> Result<(), RenderError> {
        validate_estimate(self.work_buffer_size(), num_estimates)?;
        if self.max_bounces == 0 {
            return Err(RenderError::Config("max bounces must be nonzero"));
        }
        if !use_output_indices && output.pixel_count() < num_estimates {
            return Err(RenderError::Config("output smaller than estimate count"));
        }
        let client = self.client();
        self.intersector.prepare(scene)?;

        let buffers = self
            .buffers
            .as_ref()
            .ok_or(RenderError::Config("work buffer size not set"))?;
        let compactor = self
            .compactor
            .as_ref()
            .ok_or(RenderError::Config("work buffer size not set"))?;

        let use_atomic_gather = atomic_update
            && client
                .properties()
                .type_usage(StorageType::Atomic(ElemType::Float(FloatKind::F32)))
                .contains(TypeUsage::AtomicAdd);

        let output_indices = if use_output_indices {
            buffers.output_indices.clone()
        } else {
            buffers.iota.clone()
        };

        let has_volumes = scene.num_volumes > 0;
        let has_envmap = scene.envmap_idx > -1;
        let has_visibility = self.has_intermediate_value_buffer(IntermediateValue::Visibility);
        let has_opacity = self.has_intermediate_value_buffer(IntermediateValue::Opacity);
        let visibility = self.intermediate[IntermediateValue::Visibility.index()].clone();
        let opacity = self.intermediate[IntermediateValue::Opacity.index()].clone();

        self.launch_init_path_data(
            &client,
            buffers,
            num_estimates,
            scene.camera_volume_index as f32,
        )?;

        let mut alive = num_estimates;
        for pass in 0..self.max_bounces {
            if alive == 0 {
                break;
            }
            let cur = (pass & 1) as usize;
            let next = ((pass + 1) & 1) as usize;

            self.launch_fill_u32(&client, &buffers.hits, 0, buffers.capacity)?;

            self.intersector
                .query_intersection(StreamSlot::Primary(cur), alive)?;

            if has_volumes {
                let salt = self.salt.next_u32();
                self.launch_sample_volume(&client, buffers, scene, pass, alive, next, salt)?;
            }

            if pass > 0 && has_envmap {
                self.launch_shade_miss(
                    &client,
                    buffers,
                    scene,
                    alive,
                    cur,
                    next,
                    &output_indices,
                    output,
                )?;
            }

            self.launch_filter_path_stream(&client, buffers, alive, next)?;

            if pass > 0 && has_opacity {
                if let Some(opacity) = opacity.as_ref() {
                    self.launch_gather_opacity(
                        &client,
                        buffers,
                        alive,
                        next,
                        &output_indices,
                        opacity,
                        false,
                    )?;
                }
            }

            let alive_next = compactor.compact(
                &client,
                &buffers.hits,
                &buffers.iota,
                &buffers.compacted_indices,
                &buffers.hit_count,
                alive,
            )?;

            if alive_next > 0 {
                self.launch_restore_pixel_indices(&client, buffers, alive_next, cur, next)?;
            }

            if pass == 0 {
                if let Some(handler) = missed_primary.as_deref_mut() {
                    handler(MissedPrimaryRays {
                        rays: &buffers.rays[0],
                        intersections: &buffers.intersections,
                        pixel_indices: &buffers.pixel_indices[1],
                        output_indices: &output_indices,
                        num_estimates,
                        output,
                    })?;
                } else if has_envmap {
                    self.launch_shade_background(
                        &client,
                        buffers,
                        scene,
                        num_estimates,
                        &output_indices,
                        output,
                    )?;
                } else {
                    self.launch_advance_iteration_count(
                        &client,
                        buffers,
                        num_estimates,
                        &output_indices,
                        output,
                    )?;
                }
            }

            if alive_next > 0 {
                if has_volumes {
                    let salt = self.salt.next_u32();
                    self.launch_shade_volume(
                        &client, buffers, scene, pass, alive_next, cur, salt,
                    )?;
                }

                let salt = self.salt.next_u32();
                self.launch_shade_surface(
                    &client,
                    buffers,
                    scene,
                    pass,
                    alive_next,
                    cur,
                    &output_indices,
                    output,
                    salt,
                )?;

                if has_volumes && self.max_shadow_transmission_steps > 0 {
                    for _ in 0..self.max_shadow_transmission_steps {
                        self.intersector
                            .query_intersection(StreamSlot::Shadow, alive_next)?;
                        self.launch_apply_volume_transmission(
                            &client, buffers, scene, alive_next, cur,
                        )?;
                    }
                }

                self.intersector.query_occlusion(alive_next)?;

                self.launch_gather_light_samples(
                    &client,
                    buffers,
                    alive_next,
                    cur,
                    &output_indices,
                    output,
                    use_atomic_gather,
                )?;

                if pass == 0 && has_visibility {
                    if let Some(visibility) = visibility.as_ref() {
                        self.launch_gather_visibility(
                            &client,
                            buffers,
                            alive_next,
                            cur,
                            &output_indices,
                            visibility,
                        )?;
                    }
                }
            }

            alive = alive_next;
        }

        if has_opacity && alive > 0 {
            if let Some(opacity) = opacity.as_ref() {
                let trailing = ((self.max_bounces + 1) & 1) as usize;
                self.launch_filter_path_stream(&client, buffers, alive, trailing)?;
                self.launch_gather_opacity(
                    &client,
                    buffers,
                    alive,
                    trailing,
                    &output_indices,
                    opacity,
                    true,
                )?;
            }
        }

        self.sample_counter += 1;
        Ok(())
    }

    /// Closest-hit trace of the primary ray buffer, for consumers that only
    /// need first-hit data.
    pub fn trace_first_hit(
        &mut self,
        scene: &CompiledScene,
        num_estimates: usize,
    ) -> Result<(), RenderError> {
        validate_estimate(self.work_buffer_size(), num_estimates)?;
        self.intersector.prepare(scene)?;
        self.intersector
            .query_intersection(StreamSlot::Primary(0), num_estimates)?;
        Ok(())
    }

    /// Measure primary/secondary/shadow ray throughput around one shading
    /// iteration. The caller must have generated primary rays, as for
    /// `estimate`.
    pub fn benchmark(
        &mut self,
        scene: &CompiledScene,
        num_estimates: usize,
    ) -> Result<RayTracingStats, RenderError> {
        const NUM_PASSES: u32 = 100;

        validate_estimate(self.work_buffer_size(), num_estimates)?;
        let client = self.client();
        self.intersector.prepare(scene)?;

        let buffers = self
            .buffers
            .as_ref()
            .ok_or(RenderError::Config("work buffer size not set"))?;
        let compactor = self
            .compactor
            .as_ref()
            .ok_or(RenderError::Config("work buffer size not set"))?;

        let temporary = OutputBuffer::new(&client, num_estimates, 1);
        let mut stats = RayTracingStats::default();

        self.launch_init_path_data(
            &client,
            buffers,
            num_estimates,
            scene.camera_volume_index as f32,
        )?;
        self.launch_fill_u32(&client, &buffers.hits, 0, buffers.capacity)?;

        let start = Instant::now();
        for _ in 0..NUM_PASSES {
            self.intersector
                .query_intersection(StreamSlot::Primary(0), num_estimates)?;
        }
        self.device_sync(&client, buffers);
        stats.primary_throughput = throughput(num_estimates, NUM_PASSES, start.elapsed());

        self.launch_filter_path_stream(&client, buffers, num_estimates, 1)?;
        let alive = compactor.compact(
            &client,
            &buffers.hits,
            &buffers.iota,
            &buffers.compacted_indices,
            &buffers.hit_count,
            num_estimates,
        )?;
        if alive > 0 {
            self.launch_restore_pixel_indices(&client, buffers, alive, 0, 1)?;
            let salt = self.salt.next_u32();
            self.launch_shade_surface(
                &client,
                buffers,
                scene,
                0,
                alive,
                0,
                &buffers.iota,
                &temporary,
                salt,
            )?;
        }

        if alive > 0 {
            let start = Instant::now();
            for _ in 0..NUM_PASSES {
                self.intersector.query_occlusion(alive)?;
            }
            self.device_sync(&client, buffers);
            stats.shadow_throughput = throughput(alive, NUM_PASSES, start.elapsed());

            self.launch_gather_light_samples(
                &client,
                buffers,
                alive,
                0,
                &buffers.iota,
                &temporary,
                false,
            )?;

            let start = Instant::now();
            for _ in 0..NUM_PASSES {
                self.intersector
                    .query_intersection(StreamSlot::Primary(1), alive)?;
            }
            self.device_sync(&client, buffers);
            stats.secondary_throughput = throughput(alive, NUM_PASSES, start.elapsed());
        }

        Ok(stats)
    }

    fn device_sync(&self, client: &GpuClient, buffers: &WorkBuffers) {
        let _ = client.read_one(buffers.hit_count.clone());
    }

    fn launch_fill_u32(
        &self,
        client: &GpuClient,
        buffer: &Handle,
        value: u32,
        count: usize,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::fill_u32::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<u32>(buffer, count, 1),
                ScalarArg::new(value),
                ScalarArg::new(count as u32),
            )
            .map_err(RenderError::Launch)
        }
    }

    fn launch_init_path_data(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        count: usize,
        camera_volume: f32,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::init_path_data::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<u32>(&buffers.pixel_indices[0], buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.pixel_indices[1], buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ScalarArg::new(camera_volume),
                ScalarArg::new(count as u32),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.paths,
                    buffers.capacity * PATH_STRIDE as usize,
                    1,
                ),
            )
            .map_err(RenderError::Launch)
        }
    }

    fn launch_filter_path_stream(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        count: usize,
        pixel_parity: usize,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::filter_path_stream::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.intersections,
                    buffers.capacity * ISECT_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.pixel_indices[pixel_parity],
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.paths,
                    buffers.capacity * PATH_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(&buffers.hits, buffers.capacity, 1),
            )
            .map_err(RenderError::Launch)
        }
    }

    fn launch_restore_pixel_indices(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        count: usize,
        cur: usize,
        next: usize,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::restore_pixel_indices::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<u32>(&buffers.compacted_indices, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.pixel_indices[next], buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.pixel_indices[cur], buffers.capacity, 1),
            )
            .map_err(RenderError::Launch)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_sample_volume(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        scene: &CompiledScene,
        pass: u32,
        count: usize,
        next: usize,
        salt: u32,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        let cur = (pass & 1) as usize;
        unsafe {
            gpu::sample_volume::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.rays[cur],
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.pixel_indices[next],
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.volumes.handle, scene.volumes.len, 1),
                ScalarArg::new(salt),
                ArrayArg::from_raw_parts::<u32>(&buffers.random, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&self.scramble, SCRAMBLE_DIMS as usize, 1),
                ScalarArg::new(pass),
                ScalarArg::new(self.sample_counter),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.intersections,
                    buffers.capacity * ISECT_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.paths,
                    buffers.capacity * PATH_STRIDE as usize,
                    1,
                ),
            )
            .map_err(RenderError::Launch)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_shade_miss(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        scene: &CompiledScene,
        count: usize,
        cur: usize,
        next: usize,
        output_indices: &Handle,
        output: &OutputBuffer,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::shade_miss::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.rays[cur],
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.intersections,
                    buffers.capacity * ISECT_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.pixel_indices[next],
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(output_indices, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ScalarArg::new(scene.envmap_idx as u32),
                ArrayArg::from_raw_parts::<f32>(&scene.textures.handle, scene.textures.len, 1),
                ArrayArg::from_raw_parts::<f32>(
                    &scene.texture_data.handle,
                    scene.texture_data.len,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.paths,
                    buffers.capacity * PATH_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
            )
            .map_err(RenderError::Launch)
        }
    }

    fn launch_shade_background(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        scene: &CompiledScene,
        count: usize,
        output_indices: &Handle,
        output: &OutputBuffer,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::shade_background::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.rays[0],
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.intersections,
                    buffers.capacity * ISECT_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(&buffers.pixel_indices[1], buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(output_indices, buffers.capacity, 1),
                ScalarArg::new(count as u32),
                ScalarArg::new(scene.envmap_idx as u32),
                ArrayArg::from_raw_parts::<f32>(&scene.textures.handle, scene.textures.len, 1),
                ArrayArg::from_raw_parts::<f32>(
                    &scene.texture_data.handle,
                    scene.texture_data.len,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
            )
            .map_err(RenderError::Launch)
        }
    }

    fn launch_advance_iteration_count(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        count: usize,
        output_indices: &Handle,
        output: &OutputBuffer,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::advance_iteration_count::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<u32>(&buffers.pixel_indices[1], buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(output_indices, buffers.capacity, 1),
                ScalarArg::new(count as u32),
                ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
            )
            .map_err(RenderError::Launch)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_shade_volume(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        scene: &CompiledScene,
        pass: u32,
        count: usize,
        cur: usize,
        salt: u32,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::shade_volume::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.rays[cur],
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.intersections,
                    buffers.capacity * ISECT_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.compacted_indices,
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.pixel_indices[cur],
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.lights.handle, scene.lights.len, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.light_cdf.handle, scene.light_cdf.len, 1),
                ScalarArg::new(scene.num_lights as u32),
                ScalarArg::new(salt),
                ArrayArg::from_raw_parts::<u32>(&buffers.random, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&self.scramble, SCRAMBLE_DIMS as usize, 1),
                ScalarArg::new(pass),
                ScalarArg::new(self.sample_counter),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.shadow_rays,
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.light_samples,
                    buffers.capacity * LIGHT_SAMPLE_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.paths,
                    buffers.capacity * PATH_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.rays[(cur + 1) & 1],
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
            )
            .map_err(RenderError::Launch)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_shade_surface(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        scene: &CompiledScene,
        pass: u32,
        count: usize,
        cur: usize,
        output_indices: &Handle,
        output: &OutputBuffer,
        salt: u32,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::shade_surface::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.rays[cur],
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.intersections,
                    buffers.capacity * ISECT_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.compacted_indices,
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.pixel_indices[cur],
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(output_indices, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.normals.handle, scene.normals.len, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.uvs.handle, scene.uvs.len, 1),
                ArrayArg::from_raw_parts::<u32>(&scene.indices.handle, scene.indices.len, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.shapes.handle, scene.shapes.len, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.materials.handle, scene.materials.len, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.textures.handle, scene.textures.len, 1),
                ArrayArg::from_raw_parts::<f32>(
                    &scene.texture_data.handle,
                    scene.texture_data.len,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(&scene.lights.handle, scene.lights.len, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.light_cdf.handle, scene.light_cdf.len, 1),
                ScalarArg::new(scene.num_lights as u32),
                ScalarArg::new(salt),
                ArrayArg::from_raw_parts::<u32>(&buffers.random, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&self.scramble, SCRAMBLE_DIMS as usize, 1),
                ScalarArg::new(pass),
                ScalarArg::new(self.sample_counter),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.shadow_rays,
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.light_samples,
                    buffers.capacity * LIGHT_SAMPLE_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.paths,
                    buffers.capacity * PATH_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.rays[(cur + 1) & 1],
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
            )
            .map_err(RenderError::Launch)
        }
    }

    fn launch_apply_volume_transmission(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        scene: &CompiledScene,
        count: usize,
        cur: usize,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::apply_volume_transmission::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.pixel_indices[cur],
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.intersections,
                    buffers.capacity * ISECT_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.paths,
                    buffers.capacity * PATH_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(&scene.shapes.handle, scene.shapes.len, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.materials.handle, scene.materials.len, 1),
                ArrayArg::from_raw_parts::<f32>(&scene.volumes.handle, scene.volumes.len, 1),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.shadow_rays,
                    buffers.capacity * RAY_STRIDE as usize,
                    1,
                ),
                ArrayArg::from_raw_parts::<f32>(
                    &buffers.light_samples,
                    buffers.capacity * LIGHT_SAMPLE_STRIDE as usize,
                    1,
                ),
            )
            .map_err(RenderError::Launch)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_gather_light_samples(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        count: usize,
        cur: usize,
        output_indices: &Handle,
        output: &OutputBuffer,
        atomic: bool,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            if atomic {
                gpu::gather_light_samples_atomic::launch_unchecked::<WgpuRuntime>(
                    client,
                    cubes,
                    dim,
                    ArrayArg::from_raw_parts::<u32>(
                        &buffers.pixel_indices[cur],
                        buffers.capacity,
                        1,
                    ),
                    ArrayArg::from_raw_parts::<u32>(output_indices, buffers.capacity, 1),
                    ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                    ArrayArg::from_raw_parts::<u32>(&buffers.shadow_hits, buffers.capacity, 1),
                    ArrayArg::from_raw_parts::<f32>(
                        &buffers.light_samples,
                        buffers.capacity * LIGHT_SAMPLE_STRIDE as usize,
                        1,
                    ),
                    ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
                )
                .map_err(RenderError::Launch)
            } else {
                gpu::gather_light_samples::launch_unchecked::<WgpuRuntime>(
                    client,
                    cubes,
                    dim,
                    ArrayArg::from_raw_parts::<u32>(
                        &buffers.pixel_indices[cur],
                        buffers.capacity,
                        1,
                    ),
                    ArrayArg::from_raw_parts::<u32>(output_indices, buffers.capacity, 1),
                    ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                    ArrayArg::from_raw_parts::<u32>(&buffers.shadow_hits, buffers.capacity, 1),
                    ArrayArg::from_raw_parts::<f32>(
                        &buffers.light_samples,
                        buffers.capacity * LIGHT_SAMPLE_STRIDE as usize,
                        1,
                    ),
                    ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
                )
                .map_err(RenderError::Launch)
            }
        }
    }

    fn launch_gather_visibility(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        count: usize,
        cur: usize,
        output_indices: &Handle,
        output: &OutputBuffer,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::gather_visibility::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<u32>(&buffers.pixel_indices[cur], buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(output_indices, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.shadow_hits, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
            )
            .map_err(RenderError::Launch)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn launch_gather_opacity(
        &self,
        client: &GpuClient,
        buffers: &WorkBuffers,
        count: usize,
        pixel_parity: usize,
        output_indices: &Handle,
        output: &OutputBuffer,
        final_pass: bool,
    ) -> Result<(), RenderError> {
        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(count as u32, dim.x));
        unsafe {
            gpu::gather_opacity::launch_unchecked::<WgpuRuntime>(
                client,
                cubes,
                dim,
                ArrayArg::from_raw_parts::<u32>(
                    &buffers.pixel_indices[pixel_parity],
                    buffers.capacity,
                    1,
                ),
                ArrayArg::from_raw_parts::<u32>(output_indices, buffers.capacity, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.hit_count, 1, 1),
                ArrayArg::from_raw_parts::<u32>(&buffers.hits, buffers.capacity, 1),
                ScalarArg::new(final_pass as u32),
                ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
            )
            .map_err(RenderError::Launch)
        }
    }
}

impl Drop for PathTracingEstimator {
    fn drop(&mut self) {
        // Stream views must not outlive the buffers they wrap.
        self.intersector.release_streams();
    }
}

/// Fail-fast precondition checks shared by `estimate` and friends.
fn validate_estimate(capacity: usize, num_estimates: usize) -> Result<(), RenderError> {
    if capacity == 0 {
        return Err(RenderError::Config("work buffer size not set"));
    }
    if num_estimates == 0 {
        return Err(RenderError::Config("estimate count must be nonzero"));
    }
    if num_estimates > capacity {
        return Err(RenderError::Config("estimate count exceeds work buffer size"));
    }
    Ok(())
}

fn throughput(rays: usize, passes: u32, elapsed: std::time::Duration) -> f32 {
    let per_pass = elapsed.as_secs_f32() / passes as f32;
    if per_pass > 0.0 {
        rays as f32 / per_pass
    } else {
        0.0
    }
}

fn upload_scramble(client: &GpuClient, seed: u32) -> Handle {
    let table = scramble_table(seed);
    client.create_from_slice(u32::as_bytes(&table))
}

#[cfg(test)]
mod tests {
    use super::validate_estimate;
    use crate::error::RenderError;

    #[test]
    fn estimate_requires_allocated_buffers() {
        assert!(matches!(
            validate_estimate(0, 16),
            Err(RenderError::Config("work buffer size not set"))
        ));
    }

    #[test]
    fn estimate_rejects_overflowing_count() {
        assert!(validate_estimate(1024, 1024).is_ok());
        assert!(matches!(
            validate_estimate(1024, 1025),
            Err(RenderError::Config("estimate count exceeds work buffer size"))
        ));
    }

    #[test]
    fn estimate_rejects_empty_count() {
        assert!(matches!(
            validate_estimate(1024, 0),
            Err(RenderError::Config("estimate count must be nonzero"))
        ));
    }
}
