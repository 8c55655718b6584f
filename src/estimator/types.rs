//! Estimator-facing value types.

use cubecl::prelude::*;
use cubecl::server::Handle;

use crate::GpuClient;

/// Auxiliary per-pixel quantities some shading passes optionally populate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntermediateValue {
    Visibility,
    Opacity,
}

pub(crate) const INTERMEDIATE_VALUE_COUNT: usize = 2;

impl IntermediateValue {
    pub(crate) fn index(self) -> usize {
        match self {
            IntermediateValue::Visibility => 0,
            IntermediateValue::Opacity => 1,
        }
    }
}

/// Random buffer categories exposed for primary-ray generation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RandomBufferKind {
    /// Mutable per-slot seed state.
    SeedState,
    /// Fixed per-dimension scramble table.
    ScrambleLut,
}

/// Ray throughput numbers produced by [`benchmark`].
///
/// [`benchmark`]: crate::PathTracingEstimator::benchmark
#[derive(Debug, Copy, Clone, Default)]
pub struct RayTracingStats {
    /// Primary closest-hit rays per second.
    pub primary_throughput: f32,
    /// Secondary closest-hit rays per second.
    pub secondary_throughput: f32,
    /// Shadow occlusion rays per second.
    pub shadow_throughput: f32,
}

/// Persistent per-pixel rgba accumulator. The rgb channels hold summed
/// radiance; the fourth channel counts samples for display normalization.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    pub(crate) handle: Handle,
    width: usize,
    height: usize,
}

impl OutputBuffer {
    pub(crate) fn new(client: &GpuClient, width: usize, height: usize) -> Self {
        let data = vec![0.0f32; width * height * 4];
        Self {
            handle: client.create_from_slice(f32::as_bytes(&data)),
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Element count of the underlying float buffer.
    pub(crate) fn len(&self) -> usize {
        self.pixel_count() * 4
    }

    /// Device handle, for callers wiring the buffer into their own kernels.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Context handed to a caller-supplied missed-primary-ray handler at
/// bounce 0, in place of the built-in environment shading.
pub struct MissedPrimaryRays<'a> {
    pub rays: &'a Handle,
    pub intersections: &'a Handle,
    pub pixel_indices: &'a Handle,
    pub output_indices: &'a Handle,
    pub num_estimates: usize,
    pub output: &'a OutputBuffer,
}
