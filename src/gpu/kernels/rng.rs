//! Device-side sample generation.
//!
//! Each path slot carries a mutable 32-bit seed; sample dimensions are
//! decorrelated through a per-dimension scramble table uploaded once per
//! estimator seed.

use cubecl::prelude::*;

use crate::gpu::constants::*;

/// 32-bit PCG-style hash.
#[cube]
pub(super) fn rng_hash(x: u32) -> u32 {
    let state = x * u32::new(747_796_405) + u32::new(0xac56_4b05u32 as i64);
    let word = ((state >> ((state >> 28) + u32::new(4))) ^ state) * u32::new(277_803_737);
    (word >> 22) ^ word
}

/// Map a hashed u32 to [0, 1) through a 23-bit mantissa.
#[cube]
pub(super) fn rng_unit_f32(x: u32) -> f32 {
    let mantissa = x >> 9;
    f32::cast_from(mantissa) * f32::new(1.0 / 8_388_608.0)
}

/// Draw one sample for `dim`, decorrelated by the scramble table, the frame
/// counter and the per-launch salt.
#[cube]
pub(super) fn sample_f32(
    seed: u32,
    scramble: &Array<u32>,
    dim: u32,
    frame: u32,
    salt: u32,
) -> f32 {
    let s = scramble[(dim % SCRAMBLE_DIMS) as usize];
    let mixed = seed ^ s ^ (frame * u32::new(0x9e37_79b9u32 as i64)) ^ salt;
    rng_unit_f32(rng_hash(mixed ^ (dim * u32::new(0x85eb_ca6bu32 as i64))))
}

/// Advance a per-slot seed once per consuming kernel.
#[cube]
pub(super) fn advance_seed(seed: u32, salt: u32) -> u32 {
    rng_hash(seed ^ salt) | u32::new(1)
}
