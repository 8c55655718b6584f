//! GPU kernels for wavefront path tracing.

pub(crate) mod constants;
mod kernels;

pub(crate) use kernels::*;
