//! Tiling Monte Carlo renderer built on the wavefront estimator.

mod renderer;
pub(crate) mod rng;
pub(crate) mod tiles;

pub use renderer::MonteCarloRenderer;
pub use tiles::Tile;
