//! Render-time error conditions.

use cubecl::prelude::LaunchError;
use thiserror::Error;

use crate::intersect::IntersectError;

/// Errors surfaced by the estimator and renderer.
///
/// Configuration and scene errors are raised before any GPU work and are
/// recoverable by fixing the call; launch and intersector errors are fatal
/// for the in-progress estimate, which leaves the accumulator in an
/// undefined partially-updated state.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Caller configuration is inconsistent with the requested operation.
    #[error("configuration error: {0}")]
    Config(&'static str),
    /// The compiled scene is missing or exceeds what the kernels support.
    #[error("invalid scene: {0}")]
    Scene(&'static str),
    /// GPU kernel launch failed.
    #[error("kernel launch failed: {0:?}")]
    Launch(LaunchError),
    /// The intersection backend reported a failure.
    #[error(transparent)]
    Intersect(#[from] IntersectError),
}
