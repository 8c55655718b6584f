//! Boundary to the ray/scene intersection backend.
//!
//! The estimator owns every ray and result buffer; the backend holds
//! non-owning views registered through [`Intersector::register_streams`].
//! Whenever the estimator reallocates its work buffers it releases the old
//! views and registers fresh ones, which invalidates any query issued
//! against the previous registration.

use cubecl::server::Handle;
use thiserror::Error;

use crate::scene::CompiledScene;

/// Errors reported by an intersection backend.
#[derive(Debug, Error)]
pub enum IntersectError {
    /// A query was issued before `register_streams`.
    #[error("ray streams are not registered")]
    StreamsNotRegistered,
    /// Backend-specific device failure.
    #[error("intersection backend failure: {0}")]
    Backend(String),
}

/// Which registered ray stream a query reads.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamSlot {
    /// One of the two parity-indexed continuation ray buffers.
    Primary(usize),
    /// The shadow ray buffer.
    Shadow,
}

/// Non-owning views over the estimator's work buffers, handed to the backend
/// at registration time. Handles are reference-counted device allocations;
/// the backend must drop them in `release_streams` so a reallocation can
/// retire the underlying memory.
#[derive(Debug, Clone)]
pub struct RayStreams {
    /// Parity-indexed continuation ray buffers.
    pub rays: [Handle; 2],
    /// Shadow ray buffer.
    pub shadow_rays: Handle,
    /// Closest-hit intersection records, written by `query_intersection`.
    pub intersections: Handle,
    /// Boolean occlusion results, written by `query_occlusion`.
    pub shadow_hits: Handle,
    /// Device-resident ray count, read by both query kinds.
    pub ray_count: Handle,
    /// Number of slots in every stream above.
    pub capacity: usize,
}

/// Closest-hit and any-hit query service over registered ray streams.
///
/// Implementations own the acceleration structure for the scene passed to
/// [`Intersector::prepare`] and are expected to rebuild it only when the
/// scene actually changed.
pub trait Intersector {
    /// Adopt (or replace) the ray stream views. Called on every work-buffer
    /// reallocation.
    fn register_streams(&mut self, streams: RayStreams) -> Result<(), IntersectError>;

    /// Drop all stream views. Called before the underlying buffers are
    /// retired.
    fn release_streams(&mut self);

    /// Make the backend's acceleration structure consistent with `scene`.
    fn prepare(&mut self, scene: &CompiledScene) -> Result<(), IntersectError>;

    /// Closest-hit query: for the first `max_rays` rays of `rays`, write one
    /// intersection record per slot into the registered intersection buffer
    /// (shape id -1 on miss). Inactive rays must produce a miss.
    fn query_intersection(&self, rays: StreamSlot, max_rays: usize) -> Result<(), IntersectError>;

    /// Any-hit query over the shadow stream: writes 1 into the registered
    /// shadow-hit buffer when the ray is occluded within its max-t, else 0.
    fn query_occlusion(&self, max_rays: usize) -> Result<(), IntersectError>;
}
