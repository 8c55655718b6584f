//! Wavefront GPU path tracing on CubeCL/WGPU.
//!
//! The crate is organized around two cooperating pieces: the
//! [`PathTracingEstimator`], which advances a fixed pool of light paths in
//! lock-step GPU dispatches with per-bounce stream compaction, and the
//! [`MonteCarloRenderer`], which tiles oversized framebuffers, generates
//! primary rays per camera model, and accumulates progressive samples into a
//! persistent output buffer.
//!
//! Ray/scene intersection is delegated to an external backend through the
//! [`Intersector`] trait; scenes are uploaded once into a read-only
//! [`CompiledScene`] snapshot.

mod error;
mod estimator;
mod gpu;
mod intersect;
mod math;
mod renderer;
mod scene;

use cubecl::prelude::ComputeClient;
use cubecl::wgpu::WgpuRuntime;

pub(crate) type GpuClient = ComputeClient<WgpuRuntime>;

pub use error::RenderError;
pub use estimator::{
    IntermediateValue, MissedPrimaryHandler, MissedPrimaryRays, OutputBuffer,
    PathTracingEstimator, RandomBufferKind, RayTracingStats,
};
pub use intersect::{IntersectError, Intersector, RayStreams, StreamSlot};
pub use math::Vec3;
pub use renderer::{MonteCarloRenderer, Tile};
pub use scene::{
    Camera, CameraType, CompiledScene, DeviceArray, Light, Material, MaterialKind, SceneData,
    Shape, Texture, Volume,
};
