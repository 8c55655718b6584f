//! Tiling Monte Carlo renderer: primary-ray generation, per-tile estimates,
//! progressive accumulation.

use cubecl::prelude::*;
use cubecl::wgpu::{WgpuDevice, WgpuRuntime};

use log::{debug, trace};

use crate::error::RenderError;
use crate::estimator::{
    IntermediateValue, MissedPrimaryRays, OutputBuffer, PathTracingEstimator, RandomBufferKind,
    RayTracingStats,
};
use crate::gpu;
use crate::gpu::constants::{ISECT_STRIDE, SCRAMBLE_DIMS};
use crate::math::Vec3;
use crate::scene::{CameraType, CompiledScene};
use crate::GpuClient;

use super::rng::Pcg32;
use super::tiles::{div_ceil, tile_partition, Tile};

/// Maximum tile extent for one estimator dispatch. Outputs larger than this
/// are partitioned and rendered tile by tile.
const TILE_SIZE_X: usize = 2560;
const TILE_SIZE_Y: usize = 1440;

/// Drives the estimator across screen-space tiles and owns the persistent
/// output accumulator.
pub struct MonteCarloRenderer {
    device: WgpuDevice,
    estimator: PathTracingEstimator,
    output: Option<OutputBuffer>,
    sample_counter: u32,
    salt: Pcg32,
}

impl MonteCarloRenderer {
    pub fn new(device: WgpuDevice, estimator: PathTracingEstimator) -> Self {
        Self {
            device,
            estimator,
            output: None,
            sample_counter: 0,
            salt: Pcg32::new(3, 0),
        }
    }

    pub fn estimator(&self) -> &PathTracingEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut PathTracingEstimator {
        &mut self.estimator
    }

    pub fn sample_counter(&self) -> u32 {
        self.sample_counter
    }

    fn client(&self) -> GpuClient {
        WgpuRuntime::client(&self.device)
    }

    /// Allocate the persistent accumulator and size the estimator's work
    /// buffers for the largest tile this output needs.
    pub fn set_output(&mut self, width: usize, height: usize) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::Config("output extent must be nonzero"));
        }
        let client = self.client();
        self.output = Some(OutputBuffer::new(&client, width, height));
        let tile_pixels = width.min(TILE_SIZE_X) * height.min(TILE_SIZE_Y);
        self.estimator.set_work_buffer_size(tile_pixels)?;
        self.sample_counter = 0;
        Ok(())
    }

    pub fn output(&self) -> Option<&OutputBuffer> {
        self.output.as_ref()
    }

    /// Blocking device-to-host copy of the accumulator, rgba per pixel.
    pub fn read_output(&self) -> Result<Vec<f32>, RenderError> {
        let output = self
            .output
            .as_ref()
            .ok_or(RenderError::Config("no output set"))?;
        let client = self.client();
        let bytes = client.read_one(output.handle.clone());
        Ok(f32::from_bytes(&bytes).to_vec())
    }

    /// Enable an auxiliary output, allocated at the color output's size and
    /// wired into the estimator. The color output must be set first.
    pub fn set_aov_output(
        &mut self,
        value: IntermediateValue,
        enabled: bool,
    ) -> Result<(), RenderError> {
        if !enabled {
            self.estimator.set_intermediate_value_buffer(value, None);
            return Ok(());
        }
        if !self.estimator.supports_intermediate_value(value) {
            return Err(RenderError::Config(
                "intermediate value unsupported by the estimator",
            ));
        }
        let output = self
            .output
            .as_ref()
            .ok_or(RenderError::Config("aov output requires a color output"))?;
        let client = self.client();
        let buffer = OutputBuffer::new(&client, output.width(), output.height());
        self.estimator
            .set_intermediate_value_buffer(value, Some(buffer));
        Ok(())
    }

    pub fn aov_output(&self, value: IntermediateValue) -> Option<&OutputBuffer> {
        self.estimator.intermediate_value_buffer(value)
    }

    /// Blocking read-back of an auxiliary output.
    pub fn read_aov_output(&self, value: IntermediateValue) -> Result<Vec<f32>, RenderError> {
        let output = self
            .aov_output(value)
            .ok_or(RenderError::Config("aov output not enabled"))?;
        let client = self.client();
        let bytes = client.read_one(output.handle.clone());
        Ok(f32::from_bytes(&bytes).to_vec())
    }

    /// Reset the accumulator (and every enabled AOV) to `value` and restart
    /// progressive accumulation. Must be called whenever the camera, scene
    /// topology, or resolution changes; the renderer does not detect that
    /// itself.
    pub fn clear(&mut self, value: Vec3) -> Result<(), RenderError> {
        let output = self
            .output
            .as_ref()
            .ok_or(RenderError::Config("no output set"))?;
        let client = self.client();
        launch_fill_accumulator(&client, output, value.x, value.y, value.z, 0.0)?;
        for kind in [IntermediateValue::Visibility, IntermediateValue::Opacity] {
            if let Some(aov) = self.estimator.intermediate_value_buffer(kind) {
                launch_fill_accumulator(&client, aov, 0.0, 0.0, 0.0, 0.0)?;
            }
        }
        self.sample_counter = 0;
        Ok(())
    }

    /// Forwarded to the estimator; also reseeds the renderer's own per-launch
    /// salt stream so whole renders replay deterministically.
    pub fn set_random_seed(&mut self, seed: u32) {
        self.estimator.set_random_seed(seed);
        self.salt = Pcg32::new(3, seed as u64);
    }

    pub fn set_max_bounces(&mut self, max_bounces: u32) {
        self.estimator.set_max_bounces(max_bounces);
    }

    /// Accumulate one progressive sample over the whole registered output.
    pub fn render(&mut self, scene: &CompiledScene) -> Result<(), RenderError> {
        let (width, height) = {
            let output = self
                .output
                .as_ref()
                .ok_or(RenderError::Config("no output set"))?;
            (output.width(), output.height())
        };

        let tiles = tile_partition(width, height, TILE_SIZE_X, TILE_SIZE_Y);
        trace!(
            "render sample {} over {} tile(s)",
            self.sample_counter,
            tiles.len()
        );
        for tile in tiles {
            self.render_tile(scene, tile)?;
        }
        self.sample_counter += 1;
        Ok(())
    }

    /// Generate primary rays for one tile and run the estimator over it.
    pub fn render_tile(&mut self, scene: &CompiledScene, tile: Tile) -> Result<(), RenderError> {
        let output = self
            .output
            .as_ref()
            .ok_or(RenderError::Config("no output set"))?
            .clone();
        let num_rays = tile.pixel_count();
        if num_rays == 0 {
            return Err(RenderError::Config("empty tile"));
        }

        self.generate_tile_domain(&output, tile, num_rays)?;
        self.generate_primary_rays(scene, &output, num_rays)?;

        let device = self.device.clone();
        let output_size = (output.width(), output.height());
        let mut handle_missed = |ctx: MissedPrimaryRays<'_>| {
            shade_missed_with_background(&device, scene, output_size, ctx)
        };
        let handler = if scene.background_idx > -1 {
            Some(&mut handle_missed as &mut _)
        } else {
            None
        };

        self.estimator
            .estimate(scene, num_rays, &output, true, false, handler)
    }

    /// Measure intersector throughput against the registered output size.
    pub fn benchmark(&mut self, scene: &CompiledScene) -> Result<RayTracingStats, RenderError> {
        let output = self
            .output
            .as_ref()
            .ok_or(RenderError::Config("no output set"))?
            .clone();
        let tile = Tile {
            origin_x: 0,
            origin_y: 0,
            width: output.width().min(TILE_SIZE_X),
            height: output.height().min(TILE_SIZE_Y),
        };
        let num_rays = tile.pixel_count();
        self.generate_tile_domain(&output, tile, num_rays)?;
        self.generate_primary_rays(scene, &output, num_rays)?;
        let stats = self.estimator.benchmark(scene, num_rays)?;
        debug!(
            "benchmark: {:.0} primary, {:.0} secondary, {:.0} shadow rays/s",
            stats.primary_throughput, stats.secondary_throughput, stats.shadow_throughput
        );
        Ok(stats)
    }

    fn generate_tile_domain(
        &mut self,
        output: &OutputBuffer,
        tile: Tile,
        num_rays: usize,
    ) -> Result<(), RenderError> {
        let client = self.client();
        let output_indices = self
            .estimator
            .output_index_buffer()
            .ok_or(RenderError::Config("work buffers not allocated"))?;
        let ray_count = self
            .estimator
            .ray_count_buffer()
            .ok_or(RenderError::Config("work buffers not allocated"))?;

        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(num_rays as u32, dim.x));
        unsafe {
            gpu::generate_tile_domain::launch_unchecked::<WgpuRuntime>(
                &client,
                cubes,
                dim,
                ScalarArg::new(output.width() as u32),
                ScalarArg::new(output.height() as u32),
                ScalarArg::new(tile.origin_x as u32),
                ScalarArg::new(tile.origin_y as u32),
                ScalarArg::new(tile.width as u32),
                ScalarArg::new(tile.height as u32),
                ArrayArg::from_raw_parts::<u32>(output_indices, num_rays, 1),
                ArrayArg::from_raw_parts::<u32>(ray_count, 1, 1),
            )
            .map_err(RenderError::Launch)
        }
    }

    fn generate_primary_rays(
        &mut self,
        scene: &CompiledScene,
        output: &OutputBuffer,
        num_rays: usize,
    ) -> Result<(), RenderError> {
        let salt = self.salt.next_u32();
        let client = self.client();
        let rays = self
            .estimator
            .ray_buffer()
            .ok_or(RenderError::Config("work buffers not allocated"))?;
        let output_indices = self
            .estimator
            .output_index_buffer()
            .ok_or(RenderError::Config("work buffers not allocated"))?;
        let ray_count = self
            .estimator
            .ray_count_buffer()
            .ok_or(RenderError::Config("work buffers not allocated"))?;
        let seeds = self
            .estimator
            .random_buffer(RandomBufferKind::SeedState)
            .ok_or(RenderError::Config("work buffers not allocated"))?;
        let scramble = self
            .estimator
            .random_buffer(RandomBufferKind::ScrambleLut)
            .ok_or(RenderError::Config("work buffers not allocated"))?;

        let dim = CubeDim::new_1d(256);
        let cubes = CubeCount::new_1d(div_ceil(num_rays as u32, dim.x));
        let camera =
            unsafe { ArrayArg::from_raw_parts::<f32>(&scene.camera.handle, scene.camera.len, 1) };
        let width = ScalarArg::new(output.width() as u32);
        let height = ScalarArg::new(output.height() as u32);
        let output_indices =
            unsafe { ArrayArg::from_raw_parts::<u32>(output_indices, num_rays, 1) };
        let ray_count = unsafe { ArrayArg::from_raw_parts::<u32>(ray_count, 1, 1) };
        let rays = unsafe {
            ArrayArg::from_raw_parts::<f32>(
                rays,
                num_rays * gpu::constants::RAY_STRIDE as usize,
                1,
            )
        };
        let seeds = unsafe { ArrayArg::from_raw_parts::<u32>(seeds, num_rays, 1) };
        let scramble =
            unsafe { ArrayArg::from_raw_parts::<u32>(scramble, SCRAMBLE_DIMS as usize, 1) };

        unsafe {
            match scene.camera_type {
                CameraType::Perspective => {
                    gpu::perspective_camera_generate_rays::launch_unchecked::<WgpuRuntime>(
                        &client,
                        cubes,
                        dim,
                        camera,
                        width,
                        height,
                        output_indices,
                        ray_count,
                        ScalarArg::new(salt),
                        ScalarArg::new(self.sample_counter),
                        rays,
                        seeds,
                        scramble,
                    )
                }
                CameraType::PerspectiveDof => {
                    gpu::perspective_camera_dof_generate_rays::launch_unchecked::<WgpuRuntime>(
                        &client,
                        cubes,
                        dim,
                        camera,
                        width,
                        height,
                        output_indices,
                        ray_count,
                        ScalarArg::new(salt),
                        ScalarArg::new(self.sample_counter),
                        rays,
                        seeds,
                        scramble,
                    )
                }
                CameraType::Orthographic => {
                    gpu::orthographic_camera_generate_rays::launch_unchecked::<WgpuRuntime>(
                        &client,
                        cubes,
                        dim,
                        camera,
                        width,
                        height,
                        output_indices,
                        ray_count,
                        ScalarArg::new(salt),
                        ScalarArg::new(self.sample_counter),
                        rays,
                        seeds,
                        scramble,
                    )
                }
            }
            .map_err(RenderError::Launch)
        }
    }
}

/// Bounce-0 miss handler launching the backplate kernel in place of the
/// built-in environment shading.
fn shade_missed_with_background(
    device: &WgpuDevice,
    scene: &CompiledScene,
    output_size: (usize, usize),
    ctx: MissedPrimaryRays<'_>,
) -> Result<(), RenderError> {
    let client = WgpuRuntime::client(device);
    let dim = CubeDim::new_1d(256);
    let cubes = CubeCount::new_1d(div_ceil(ctx.num_estimates as u32, dim.x));
    unsafe {
        gpu::shade_background_image::launch_unchecked::<WgpuRuntime>(
            &client,
            cubes,
            dim,
            ArrayArg::from_raw_parts::<f32>(
                ctx.intersections,
                ctx.num_estimates * ISECT_STRIDE as usize,
                1,
            ),
            ArrayArg::from_raw_parts::<u32>(ctx.pixel_indices, ctx.num_estimates, 1),
            ArrayArg::from_raw_parts::<u32>(ctx.output_indices, ctx.num_estimates, 1),
            ScalarArg::new(ctx.num_estimates as u32),
            ScalarArg::new(scene.background_idx as u32),
            ScalarArg::new(output_size.0 as u32),
            ScalarArg::new(output_size.1 as u32),
            ArrayArg::from_raw_parts::<f32>(&scene.textures.handle, scene.textures.len, 1),
            ArrayArg::from_raw_parts::<f32>(
                &scene.texture_data.handle,
                scene.texture_data.len,
                1,
            ),
            ArrayArg::from_raw_parts::<f32>(&ctx.output.handle, ctx.output.len(), 1),
        )
        .map_err(RenderError::Launch)
    }
}

fn launch_fill_accumulator(
    client: &GpuClient,
    output: &OutputBuffer,
    r: f32,
    g: f32,
    b: f32,
    w: f32,
) -> Result<(), RenderError> {
    let dim = CubeDim::new_1d(256);
    let cubes = CubeCount::new_1d(div_ceil(output.pixel_count() as u32, dim.x));
    unsafe {
        gpu::fill_accumulator::launch_unchecked::<WgpuRuntime>(
            client,
            cubes,
            dim,
            ArrayArg::from_raw_parts::<f32>(&output.handle, output.len(), 1),
            ScalarArg::new(output.pixel_count() as u32),
            ScalarArg::new(r),
            ScalarArg::new(g),
            ScalarArg::new(b),
            ScalarArg::new(w),
        )
        .map_err(RenderError::Launch)
    }
}
