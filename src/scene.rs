//! Host scene description and its compiled GPU-resident snapshot.
//!
//! `SceneData` carries flat CPU arrays; `compile` validates them once, packs
//! them into the stride layouts the kernels expect, and uploads the result.
//! All per-bounce consistency requirements are enforced here so no kernel
//! has to re-validate scene state.

use cubecl::prelude::*;
use cubecl::server::Handle;
use cubecl::wgpu::{WgpuDevice, WgpuRuntime};

use crate::error::RenderError;
use crate::gpu::constants::{
    CAMERA_STRIDE, LIGHT_KIND_DIRECTIONAL, LIGHT_KIND_QUAD, LIGHT_STRIDE, MATERIAL_KIND_DIFFUSE,
    MATERIAL_KIND_TRANSPARENT, MATERIAL_STRIDE, MAX_F32_INT, SHAPE_STRIDE, TEXTURE_DESC_STRIDE,
    UV_STRIDE, VERTEX_STRIDE, VOLUME_STRIDE,
};
use crate::math::Vec3;

/// Camera projection model, selecting the ray-generation kernel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CameraType {
    Perspective,
    PerspectiveDof,
    Orthographic,
}

/// Camera description shared by all projection models.
#[derive(Debug, Clone)]
pub struct Camera {
    pub camera_type: CameraType,
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    /// Distance from the pinhole to the sensor plane.
    pub focal_length: f32,
    /// Lens radius; only read by the depth-of-field model.
    pub aperture_radius: f32,
    /// Distance to the focus plane; only read by the depth-of-field model.
    pub focus_distance: f32,
    /// Sensor extent in world units (orthographic) or plane units.
    pub sensor_width: f32,
    pub sensor_height: f32,
}

impl Camera {
    /// Perspective camera looking from `position` toward `target`.
    pub fn look_at(position: Vec3, target: Vec3, up_hint: Vec3) -> Self {
        let forward = (target - position).normalized();
        let right = forward.cross(up_hint).normalized();
        let up = right.cross(forward);
        Self {
            camera_type: CameraType::Perspective,
            position,
            forward,
            right,
            up,
            focal_length: 1.0,
            aperture_radius: 0.0,
            focus_distance: 1.0,
            sensor_width: 1.0,
            sensor_height: 1.0,
        }
    }

    fn pack(&self) -> Vec<f32> {
        let mut data = vec![0.0; CAMERA_STRIDE as usize];
        data[0] = self.position.x;
        data[1] = self.position.y;
        data[2] = self.position.z;
        data[3] = self.focal_length;
        data[4] = self.forward.x;
        data[5] = self.forward.y;
        data[6] = self.forward.z;
        data[7] = self.aperture_radius;
        data[8] = self.right.x;
        data[9] = self.right.y;
        data[10] = self.right.z;
        data[11] = self.focus_distance;
        data[12] = self.up.x;
        data[13] = self.up.y;
        data[14] = self.up.z;
        data[16] = self.sensor_width;
        data[17] = self.sensor_height;
        data
    }
}

/// Surface response model.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MaterialKind {
    Diffuse,
    /// Delta transmission; marks volume boundaries.
    Transparent,
}

/// Material table entry.
#[derive(Debug, Clone)]
pub struct Material {
    pub kind: MaterialKind,
    pub albedo: Vec3,
    pub emission: Vec3,
    /// Optional albedo texture index.
    pub albedo_texture: Option<usize>,
}

impl Material {
    pub fn diffuse(albedo: Vec3) -> Self {
        Self {
            kind: MaterialKind::Diffuse,
            albedo,
            emission: Vec3::ZERO,
            albedo_texture: None,
        }
    }

    pub fn emissive(emission: Vec3) -> Self {
        Self {
            kind: MaterialKind::Diffuse,
            albedo: Vec3::ZERO,
            emission,
            albedo_texture: None,
        }
    }
}

/// One triangle-mesh entry in the shape table.
#[derive(Debug, Clone)]
pub struct Shape {
    /// First entry in the index buffer.
    pub index_offset: usize,
    /// Added to every index of this shape.
    pub vertex_offset: usize,
    /// Triangle count.
    pub prim_count: usize,
    /// Material table index.
    pub material: usize,
    /// Enclosed participating medium, if any.
    pub volume: Option<usize>,
}

/// Analytic light table entry.
#[derive(Debug, Clone)]
pub enum Light {
    Quad {
        corner: Vec3,
        edge1: Vec3,
        edge2: Vec3,
        radiance: Vec3,
    },
    Directional {
        direction: Vec3,
        radiance: Vec3,
    },
}

impl Light {
    fn power(&self) -> f32 {
        match self {
            Light::Quad {
                edge1,
                edge2,
                radiance,
                ..
            } => {
                let area = edge1.cross(*edge2).length();
                area * (radiance.x + radiance.y + radiance.z)
            }
            Light::Directional { radiance, .. } => radiance.x + radiance.y + radiance.z,
        }
    }
}

/// Homogeneous participating medium.
#[derive(Debug, Clone)]
pub struct Volume {
    pub absorption: Vec3,
    pub scattering: Vec3,
    /// Henyey-Greenstein asymmetry; kernels currently scatter isotropically.
    pub phase_g: f32,
}

/// RGBA float texture.
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: usize,
    pub height: usize,
    /// Row-major rgba texels, length `width * height * 4`.
    pub texels: Vec<f32>,
}

impl Texture {
    /// 1x1 constant-color texture.
    pub fn constant(color: Vec3) -> Self {
        Self {
            width: 1,
            height: 1,
            texels: vec![color.x, color.y, color.z, 1.0],
        }
    }
}

/// Host-side scene description, input to [`SceneData::compile`].
#[derive(Debug, Clone)]
pub struct SceneData {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Optional; required only when a material samples an albedo texture.
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub shapes: Vec<Shape>,
    pub materials: Vec<Material>,
    pub lights: Vec<Light>,
    pub volumes: Vec<Volume>,
    pub textures: Vec<Texture>,
    pub camera: Camera,
    /// Environment map texture index.
    pub envmap: Option<usize>,
    /// Backplate texture index for missed primary rays.
    pub background: Option<usize>,
    /// Medium enclosing the camera, if any.
    pub camera_volume: Option<usize>,
}

/// CPU-packed buffers, ready for upload. Produced by [`SceneData::pack`].
#[derive(Debug, Clone)]
pub(crate) struct PackedScene {
    pub vertices: Vec<f32>,
    pub normals: Vec<f32>,
    pub uvs: Vec<f32>,
    pub indices: Vec<u32>,
    pub shapes: Vec<f32>,
    pub materials: Vec<f32>,
    pub lights: Vec<f32>,
    pub light_cdf: Vec<f32>,
    pub volumes: Vec<f32>,
    pub textures: Vec<f32>,
    pub texture_data: Vec<f32>,
    pub camera: Vec<f32>,
}

/// An uploaded device buffer together with its element count.
#[derive(Debug, Clone)]
pub struct DeviceArray {
    pub handle: Handle,
    pub len: usize,
}

/// Read-only GPU-resident scene snapshot consumed by the estimator and the
/// intersection backend.
#[derive(Debug, Clone)]
pub struct CompiledScene {
    pub vertices: DeviceArray,
    pub normals: DeviceArray,
    pub uvs: DeviceArray,
    pub indices: DeviceArray,
    pub shapes: DeviceArray,
    pub materials: DeviceArray,
    pub lights: DeviceArray,
    pub light_cdf: DeviceArray,
    pub volumes: DeviceArray,
    pub textures: DeviceArray,
    pub texture_data: DeviceArray,
    pub camera: DeviceArray,
    pub camera_type: CameraType,
    pub num_lights: usize,
    pub num_volumes: usize,
    pub num_shapes: usize,
    /// Environment map texture index, -1 when absent.
    pub envmap_idx: i32,
    /// Backplate texture index, -1 when absent.
    pub background_idx: i32,
    /// Volume enclosing the camera, -1 when absent.
    pub camera_volume_index: i32,
}

pub(crate) fn ensure_nonempty(mut data: Vec<f32>, filler: f32) -> Vec<f32> {
    if data.is_empty() {
        data.push(filler);
    }
    data
}

pub(crate) fn ensure_nonempty_u32(mut data: Vec<u32>, filler: u32) -> Vec<u32> {
    if data.is_empty() {
        data.push(filler);
    }
    data
}

impl SceneData {
    /// Validate the description and pack every table into its GPU layout.
    pub(crate) fn pack(&self) -> Result<PackedScene, RenderError> {
        self.validate()?;

        let mut vertices = Vec::with_capacity(self.vertices.len() * VERTEX_STRIDE as usize);
        for v in &self.vertices {
            vertices.extend_from_slice(&[v.x, v.y, v.z, 0.0]);
        }
        let mut normals = Vec::with_capacity(self.normals.len() * VERTEX_STRIDE as usize);
        for n in &self.normals {
            normals.extend_from_slice(&[n.x, n.y, n.z, 0.0]);
        }
        let mut uvs = Vec::with_capacity(self.uvs.len() * UV_STRIDE as usize);
        for uv in &self.uvs {
            uvs.extend_from_slice(uv);
        }

        let mut shapes = Vec::with_capacity(self.shapes.len() * SHAPE_STRIDE as usize);
        for shape in &self.shapes {
            let volume = shape.volume.map_or(-1.0, |v| v as f32);
            shapes.extend_from_slice(&[
                shape.index_offset as f32,
                shape.vertex_offset as f32,
                shape.prim_count as f32,
                shape.material as f32,
                volume,
                0.0,
                0.0,
                0.0,
            ]);
        }

        let mut materials = Vec::with_capacity(self.materials.len() * MATERIAL_STRIDE as usize);
        for material in &self.materials {
            let kind = match material.kind {
                MaterialKind::Diffuse => MATERIAL_KIND_DIFFUSE,
                MaterialKind::Transparent => MATERIAL_KIND_TRANSPARENT,
            };
            let tex = material.albedo_texture.map_or(-1.0, |t| t as f32);
            materials.extend_from_slice(&[
                material.albedo.x,
                material.albedo.y,
                material.albedo.z,
                material.emission.x,
                material.emission.y,
                material.emission.z,
                kind as f32,
                tex,
            ]);
        }

        let mut lights = Vec::with_capacity(self.lights.len() * LIGHT_STRIDE as usize);
        for light in &self.lights {
            match light {
                Light::Quad {
                    corner,
                    edge1,
                    edge2,
                    radiance,
                } => {
                    let area = edge1.cross(*edge2).length();
                    lights.extend_from_slice(&[
                        LIGHT_KIND_QUAD as f32,
                        area,
                        radiance.x,
                        radiance.y,
                        radiance.z,
                        corner.x,
                        corner.y,
                        corner.z,
                        edge1.x,
                        edge1.y,
                        edge1.z,
                        edge2.x,
                        edge2.y,
                        edge2.z,
                        0.0,
                        0.0,
                        0.0,
                    ]);
                }
                Light::Directional {
                    direction,
                    radiance,
                } => {
                    let d = direction.normalized();
                    lights.extend_from_slice(&[
                        LIGHT_KIND_DIRECTIONAL as f32,
                        0.0,
                        radiance.x,
                        radiance.y,
                        radiance.z,
                        d.x,
                        d.y,
                        d.z,
                        0.0,
                        0.0,
                        0.0,
                        0.0,
                        0.0,
                        0.0,
                        0.0,
                        0.0,
                    ]);
                }
            }
        }

        let light_cdf = build_light_cdf(&self.lights);

        let mut volumes = Vec::with_capacity(self.volumes.len() * VOLUME_STRIDE as usize);
        for volume in &self.volumes {
            volumes.extend_from_slice(&[
                volume.absorption.x,
                volume.absorption.y,
                volume.absorption.z,
                volume.phase_g,
                volume.scattering.x,
                volume.scattering.y,
                volume.scattering.z,
                0.0,
            ]);
        }

        let mut textures = Vec::with_capacity(self.textures.len() * TEXTURE_DESC_STRIDE as usize);
        let mut texture_data = Vec::new();
        for texture in &self.textures {
            textures.extend_from_slice(&[
                texture_data.len() as f32,
                texture.width as f32,
                texture.height as f32,
                0.0,
            ]);
            texture_data.extend_from_slice(&texture.texels);
        }

        Ok(PackedScene {
            vertices,
            normals,
            uvs,
            indices: self.indices.clone(),
            shapes,
            materials,
            lights,
            light_cdf,
            volumes,
            textures,
            texture_data,
            camera: self.camera.pack(),
        })
    }

    /// Upload the packed scene to `device`.
    pub fn compile(&self, device: &WgpuDevice) -> Result<CompiledScene, RenderError> {
        let packed = self.pack()?;
        let client = WgpuRuntime::client(device);

        let upload_f32 = |data: Vec<f32>, filler: f32| {
            let data = ensure_nonempty(data, filler);
            let len = data.len();
            DeviceArray {
                handle: client.create_from_slice(f32::as_bytes(&data)),
                len,
            }
        };
        let indices = ensure_nonempty_u32(packed.indices, 0);
        let indices = DeviceArray {
            handle: client.create_from_slice(u32::as_bytes(&indices)),
            len: indices.len(),
        };

        Ok(CompiledScene {
            vertices: upload_f32(packed.vertices, 0.0),
            normals: upload_f32(packed.normals, 0.0),
            uvs: upload_f32(packed.uvs, 0.0),
            indices,
            shapes: upload_f32(packed.shapes, 0.0),
            materials: upload_f32(packed.materials, 0.0),
            lights: upload_f32(packed.lights, 0.0),
            light_cdf: upload_f32(packed.light_cdf, 0.0),
            volumes: upload_f32(packed.volumes, 0.0),
            textures: upload_f32(packed.textures, 0.0),
            texture_data: upload_f32(packed.texture_data, 0.0),
            camera: upload_f32(packed.camera, 0.0),
            camera_type: self.camera.camera_type,
            num_lights: self.lights.len(),
            num_volumes: self.volumes.len(),
            num_shapes: self.shapes.len(),
            envmap_idx: self.envmap.map_or(-1, |i| i as i32),
            background_idx: self.background.map_or(-1, |i| i as i32),
            camera_volume_index: self.camera_volume.map_or(-1, |i| i as i32),
        })
    }

    fn validate(&self) -> Result<(), RenderError> {
        if self.vertices.len() != self.normals.len() {
            return Err(RenderError::Scene("normals length differs from vertices"));
        }
        if !self.uvs.is_empty() && self.uvs.len() != self.vertices.len() {
            return Err(RenderError::Scene("uvs length differs from vertices"));
        }
        if self.vertices.len() > MAX_F32_INT
            || self.indices.len() > MAX_F32_INT
            || self.shapes.len() > MAX_F32_INT
        {
            return Err(RenderError::Scene("scene exceeds representable index range"));
        }

        for shape in &self.shapes {
            let index_end = shape
                .index_offset
                .checked_add(shape.prim_count.checked_mul(3).ok_or(RenderError::Scene(
                    "shape primitive count overflow",
                ))?)
                .ok_or(RenderError::Scene("shape index range overflow"))?;
            if index_end > self.indices.len() {
                return Err(RenderError::Scene("shape indices out of range"));
            }
            for &index in &self.indices[shape.index_offset..index_end] {
                let vertex = index as usize + shape.vertex_offset;
                if vertex >= self.vertices.len() {
                    return Err(RenderError::Scene("shape vertex out of range"));
                }
            }
            if shape.material >= self.materials.len() {
                return Err(RenderError::Scene("shape material out of range"));
            }
            if let Some(volume) = shape.volume {
                if volume >= self.volumes.len() {
                    return Err(RenderError::Scene("shape volume out of range"));
                }
            }
        }

        for material in &self.materials {
            if let Some(texture) = material.albedo_texture {
                if texture >= self.textures.len() {
                    return Err(RenderError::Scene("material texture out of range"));
                }
                if self.uvs.is_empty() {
                    return Err(RenderError::Scene("textured material requires uvs"));
                }
            }
        }

        for light in &self.lights {
            if let Light::Quad { edge1, edge2, .. } = light {
                if edge1.cross(*edge2).length() <= 0.0 {
                    return Err(RenderError::Scene("quad light has zero area"));
                }
            }
        }

        for texture in &self.textures {
            if texture.width == 0 || texture.height == 0 {
                return Err(RenderError::Scene("texture with zero extent"));
            }
            if texture.texels.len() != texture.width * texture.height * 4 {
                return Err(RenderError::Scene("texture texel count mismatch"));
            }
        }

        if let Some(envmap) = self.envmap {
            if envmap >= self.textures.len() {
                return Err(RenderError::Scene("environment map index out of range"));
            }
        }
        if let Some(background) = self.background {
            if background >= self.textures.len() {
                return Err(RenderError::Scene("background index out of range"));
            }
        }
        if let Some(camera_volume) = self.camera_volume {
            if camera_volume >= self.volumes.len() {
                return Err(RenderError::Scene("camera volume out of range"));
            }
        }

        Ok(())
    }
}

/// Power-proportional light selection distribution: `cdf[i]..cdf[i+1]` is
/// light `i`'s share, with `cdf[len] == 1`.
fn build_light_cdf(lights: &[Light]) -> Vec<f32> {
    if lights.is_empty() {
        return Vec::new();
    }
    let powers: Vec<f32> = lights.iter().map(Light::power).collect();
    let total: f32 = powers.iter().sum();
    let mut cdf = Vec::with_capacity(lights.len() + 1);
    cdf.push(0.0);
    let mut acc = 0.0;
    for (i, power) in powers.iter().enumerate() {
        if total > 0.0 {
            acc += power / total;
        } else {
            acc = (i + 1) as f32 / lights.len() as f32;
        }
        cdf.push(acc);
    }
    cdf[lights.len()] = 1.0;
    cdf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_quad_scene() -> SceneData {
        SceneData {
            vertices: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, 1.0),
            ],
            normals: vec![Vec3::new(0.0, 1.0, 0.0); 4],
            uvs: Vec::new(),
            indices: vec![0, 1, 2, 2, 1, 3],
            shapes: vec![Shape {
                index_offset: 0,
                vertex_offset: 0,
                prim_count: 2,
                material: 0,
                volume: None,
            }],
            materials: vec![Material::diffuse(Vec3::new(0.8, 0.8, 0.8))],
            lights: vec![Light::Quad {
                corner: Vec3::new(0.0, 2.0, 0.0),
                edge1: Vec3::new(1.0, 0.0, 0.0),
                edge2: Vec3::new(0.0, 0.0, 1.0),
                radiance: Vec3::new(5.0, 5.0, 5.0),
            }],
            volumes: Vec::new(),
            textures: Vec::new(),
            camera: Camera::look_at(
                Vec3::new(0.0, 1.0, -3.0),
                Vec3::ZERO,
                Vec3::new(0.0, 1.0, 0.0),
            ),
            envmap: None,
            background: None,
            camera_volume: None,
        }
    }

    #[test]
    fn pack_uses_declared_strides() {
        let packed = single_quad_scene().pack().unwrap();
        assert_eq!(packed.vertices.len(), 4 * VERTEX_STRIDE as usize);
        assert_eq!(packed.shapes.len(), SHAPE_STRIDE as usize);
        assert_eq!(packed.materials.len(), MATERIAL_STRIDE as usize);
        assert_eq!(packed.lights.len(), LIGHT_STRIDE as usize);
        assert_eq!(packed.camera.len(), CAMERA_STRIDE as usize);
        assert_eq!(packed.light_cdf, vec![0.0, 1.0]);
    }

    #[test]
    fn quad_light_packs_area() {
        let packed = single_quad_scene().pack().unwrap();
        assert_eq!(packed.lights[0], LIGHT_KIND_QUAD as f32);
        assert!((packed.lights[1] - 1.0).abs() < 1.0e-6);
    }

    #[test]
    fn light_cdf_is_power_proportional() {
        let lights = vec![
            Light::Directional {
                direction: Vec3::new(0.0, -1.0, 0.0),
                radiance: Vec3::new(1.0, 1.0, 1.0),
            },
            Light::Directional {
                direction: Vec3::new(0.0, -1.0, 0.0),
                radiance: Vec3::new(3.0, 3.0, 3.0),
            },
        ];
        let cdf = build_light_cdf(&lights);
        assert_eq!(cdf.len(), 3);
        assert!((cdf[1] - 0.25).abs() < 1.0e-6);
        assert_eq!(cdf[2], 1.0);
    }

    #[test]
    fn rejects_out_of_range_shape_indices() {
        let mut scene = single_quad_scene();
        scene.indices[5] = 9;
        assert!(matches!(
            scene.pack(),
            Err(RenderError::Scene("shape vertex out of range"))
        ));
    }

    #[test]
    fn rejects_textured_material_without_uvs() {
        let mut scene = single_quad_scene();
        scene.textures.push(Texture::constant(Vec3::new(1.0, 0.0, 0.0)));
        scene.materials[0].albedo_texture = Some(0);
        assert!(matches!(
            scene.pack(),
            Err(RenderError::Scene("textured material requires uvs"))
        ));
    }

    #[test]
    fn rejects_missing_camera_volume() {
        let mut scene = single_quad_scene();
        scene.camera_volume = Some(0);
        assert!(matches!(
            scene.pack(),
            Err(RenderError::Scene("camera volume out of range"))
        ));
    }

    #[test]
    fn texture_descriptors_chain_offsets() {
        let mut scene = single_quad_scene();
        scene.textures.push(Texture::constant(Vec3::new(1.0, 0.0, 0.0)));
        scene.textures.push(Texture {
            width: 2,
            height: 1,
            texels: vec![0.0; 8],
        });
        let packed = scene.pack().unwrap();
        assert_eq!(packed.textures[0], 0.0);
        assert_eq!(packed.textures[TEXTURE_DESC_STRIDE as usize], 4.0);
        assert_eq!(packed.texture_data.len(), 12);
    }
}
