//! Wavefront path-tracing estimator and its work buffer pool.

mod buffers;
mod compact;
mod estimator;
mod types;

pub use estimator::{MissedPrimaryHandler, PathTracingEstimator};
pub use types::{
    IntermediateValue, MissedPrimaryRays, OutputBuffer, RandomBufferKind, RayTracingStats,
};
