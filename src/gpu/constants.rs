//! GPU data layout and kernel constants.

/// Float stride for packed ray records (`rays`, `shadow_rays`).
/// Layout: origin xyz, max-t, direction xyz, active flag.
pub(crate) const RAY_STRIDE: u32 = 8;
/// Float stride for packed intersection records.
/// Layout: barycentric u, v, hit distance t, shape id, primitive id, pad.
pub(crate) const ISECT_STRIDE: u32 = 6;
/// Float stride for packed path state records.
/// Layout: throughput rgb, enclosing volume id, flag bits, pad x3.
pub(crate) const PATH_STRIDE: u32 = 8;
/// Float stride for tentative light-sample radiance records.
pub(crate) const LIGHT_SAMPLE_STRIDE: u32 = 4;
/// Float stride for output accumulator texels (rgb + sample count).
pub(crate) const OUTPUT_STRIDE: u32 = 4;

/// Float stride for packed vertex positions and normals.
pub(crate) const VERTEX_STRIDE: u32 = 4;
/// Float stride for packed texture coordinates.
pub(crate) const UV_STRIDE: u32 = 2;
/// Float stride for packed shape table records.
/// Layout: index offset, vertex offset, primitive count, material id,
/// volume id, pad x3.
pub(crate) const SHAPE_STRIDE: u32 = 8;
/// Float stride for packed material records.
/// Layout: albedo rgb, emission rgb, kind, albedo texture id.
pub(crate) const MATERIAL_STRIDE: u32 = 8;
/// Float stride for packed light table records.
/// Layout: kind, area, radiance rgb, pad, corner xyz, edge1 xyz, edge2 xyz.
pub(crate) const LIGHT_STRIDE: u32 = 16;
/// Float stride for packed volume records.
/// Layout: absorption rgb, phase g, scattering rgb, pad.
pub(crate) const VOLUME_STRIDE: u32 = 8;
/// Float stride for texture descriptor records.
/// Layout: texel offset, width, height, pad.
pub(crate) const TEXTURE_DESC_STRIDE: u32 = 4;
/// Float stride for the packed camera record.
pub(crate) const CAMERA_STRIDE: u32 = 24;

/// Material kind id for diffuse surfaces.
pub(crate) const MATERIAL_KIND_DIFFUSE: u32 = 0;
/// Material kind id for transparent volume boundaries.
pub(crate) const MATERIAL_KIND_TRANSPARENT: u32 = 1;

/// Light kind id for quad area lights.
pub(crate) const LIGHT_KIND_QUAD: u32 = 0;
/// Light kind id for directional lights.
pub(crate) const LIGHT_KIND_DIRECTIONAL: u32 = 1;

/// Path flag: terminated (missed, absorbed, or roulette-killed).
pub(crate) const PATH_FLAG_KILLED: u32 = 1;
/// Path flag: last bounce was specular.
pub(crate) const PATH_FLAG_SPECULAR: u32 = 2;
/// Path flag: scattered inside a participating medium this bounce.
pub(crate) const PATH_FLAG_SCATTERED: u32 = 4;

/// Number of sample dimensions reserved per bounce.
pub(crate) const DIMS_PER_BOUNCE: u32 = 8;
/// Entries in the per-dimension scramble table.
pub(crate) const SCRAMBLE_DIMS: u32 = 64;

/// Largest index exactly representable in an f32 lane.
pub(crate) const MAX_F32_INT: usize = 16_777_216;

/// Distance cap for continuation and directional shadow rays.
pub(crate) const RAY_MAX_T: f32 = 1.0e30;
/// Offset applied along the normal when spawning secondary rays.
pub(crate) const RAY_EPSILON: f32 = 1.0e-3;
/// Bounce index at which russian-roulette termination starts.
pub(crate) const RUSSIAN_ROULETTE_START: u32 = 3;
