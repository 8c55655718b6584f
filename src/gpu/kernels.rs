//! GPU kernel entrypoints for the wavefront estimator and renderer.

mod camera;
mod compact;
mod gather;
mod math;
mod paths;
mod rng;
mod shade;
mod volume;

pub(crate) use camera::{
    generate_tile_domain,
    orthographic_camera_generate_rays,
    perspective_camera_dof_generate_rays,
    perspective_camera_generate_rays,
};
pub(crate) use compact::{
    compact_scatter,
    fill_accumulator,
    fill_u32,
    init_compact_offsets,
    scan_compact_offsets,
};
pub(crate) use gather::{
    gather_light_samples,
    gather_light_samples_atomic,
    gather_opacity,
    gather_visibility,
};
pub(crate) use paths::{filter_path_stream, init_path_data, restore_pixel_indices};
pub(crate) use shade::{
    advance_iteration_count,
    shade_background,
    shade_background_image,
    shade_miss,
    shade_surface,
};
pub(crate) use volume::{apply_volume_transmission, sample_volume, shade_volume};
