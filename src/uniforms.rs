//! Uniform blocks handed to the renderer.
//!
//! These are plain values computed from the dataset and planes; pushing them to
//! the GPU is the renderer's job. The layouts are this crate's own: scalars
//! first, then vec3 slots padded to 16 bytes. A shader binding them has to
//! declare the same field order.

use crate::enums::BlendMode;
use crate::plane::MprPlane;
use crate::volume::{IntensityRange, VolumeDataset};

use bytemuck::{Pod, Zeroable};
use nalgebra::{Point3, Vector3};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MprUniforms {
    pub voxel_min: i32,
    pub voxel_max: i32,
    pub blend_mode: i32,
    /// 1 for a thin MPR, more for a slab.
    pub num_steps: i32,
    /// Slab half thickness in normalized units.
    pub slab_half: f32,
    pub use_transfer_function: i32,
    pub _padding0: [i32; 2],
    pub plane_origin: [f32; 3],
    pub _padding1: f32,
    pub plane_x: [f32; 3],
    pub _padding2: f32,
    pub plane_y: [f32; 3],
    pub _padding3: f32,
}

impl Default for MprUniforms {
    fn default() -> Self {
        Self {
            voxel_min: IntensityRange::HOUNSFIELD.min,
            voxel_max: IntensityRange::HOUNSFIELD.max,
            blend_mode: BlendMode::Single as i32,
            num_steps: 1,
            slab_half: 0.0,
            use_transfer_function: 1,
            _padding0: [0; 2],
            plane_origin: [0.0; 3],
            _padding1: 0.0,
            plane_x: [1.0, 0.0, 0.0],
            _padding2: 0.0,
            plane_y: [0.0, 1.0, 0.0],
            _padding3: 0.0,
        }
    }
}

impl MprUniforms {
    pub fn new(window: IntensityRange, plane: &MprPlane, use_transfer_function: bool) -> Self {
        Self {
            voxel_min: window.min,
            voxel_max: window.max,
            blend_mode: plane.slab.mode as i32,
            num_steps: plane.slab.steps.max(1) as i32,
            slab_half: plane.slab.half_thickness as f32,
            use_transfer_function: use_transfer_function as i32,
            plane_origin: point(&plane.descriptor.origin),
            plane_x: vector(&plane.descriptor.axis_u),
            plane_y: vector(&plane.descriptor.axis_v),
            ..Self::default()
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Projection method of the volume renderer. Values match the shader switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderMethod {
    Surface = 0,
    #[default]
    DirectVolume = 1,
    MaximumIntensity = 2,
    MinimumIntensity = 3,
    Average = 4,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VolumeUniforms {
    pub lighting: i32,
    pub backward: i32,
    pub method: i32,
    pub rendering_quality: i32,
    pub voxel_min: i32,
    pub voxel_max: i32,
    /// Projection gate in normalized density, `0 <= floor <= ceil <= 1`.
    pub density_floor: f32,
    pub density_ceil: f32,
    pub gate_hu_min: i32,
    pub gate_hu_max: i32,
    pub use_hu_gate: i32,
    pub dim_x: i32,
    pub dim_y: i32,
    pub dim_z: i32,
    pub use_transfer_function: i32,
    pub _padding: i32,
}

impl Default for VolumeUniforms {
    fn default() -> Self {
        Self {
            lighting: 1,
            backward: 0,
            method: RenderMethod::DirectVolume as i32,
            rendering_quality: 512,
            voxel_min: IntensityRange::HOUNSFIELD.min,
            voxel_max: IntensityRange::HOUNSFIELD.max,
            density_floor: 0.02,
            density_ceil: 1.0,
            gate_hu_min: -900,
            gate_hu_max: -500,
            use_hu_gate: 0,
            dim_x: 1,
            dim_y: 1,
            dim_z: 1,
            use_transfer_function: 0,
            _padding: 0,
        }
    }
}

impl VolumeUniforms {
    /// Defaults with the dataset's dimensions and intensity range.
    pub fn for_dataset(dataset: &VolumeDataset) -> Self {
        let dimensions = dataset.dimensions();
        let range = dataset.intensity_range();
        Self {
            voxel_min: range.min,
            voxel_max: range.max,
            dim_x: dimensions.x as i32,
            dim_y: dimensions.y as i32,
            dim_z: dimensions.z as i32,
            ..Self::default()
        }
    }

    pub fn with_lighting(mut self, on: bool) -> Self {
        self.lighting = on as i32;
        self
    }

    /// Ray-marching steps through the volume. At least one.
    pub fn with_rendering_quality(mut self, steps: u32) -> Self {
        self.rendering_quality = steps.clamp(1, i32::MAX as u32) as i32;
        self
    }

    /// Applies the transfer function to projection methods (MIP, MinIP, mean).
    pub fn with_transfer_function(mut self, on: bool) -> Self {
        self.use_transfer_function = on as i32;
        self
    }

    pub fn with_method(mut self, method: RenderMethod) -> Self {
        self.method = method as i32;
        self
    }

    pub fn with_density_gate(mut self, floor: f32, ceil: f32) -> Self {
        self.density_floor = floor.clamp(0.0, 1.0);
        self.density_ceil = ceil.min(1.0).max(self.density_floor);
        self
    }

    pub fn with_hu_gate(mut self, gate: Option<IntensityRange>) -> Self {
        if let Some(gate) = gate {
            self.gate_hu_min = gate.min;
            self.gate_hu_max = gate.max;
        }
        self.use_hu_gate = gate.is_some() as i32;
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

fn point(p: &Point3<f64>) -> [f32; 3] {
    [p.x as f32, p.y as f32, p.z as f32]
}

fn vector(v: &Vector3<f64>) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::{Axis, Orientation};
    use crate::plane::{PlaneDescriptor, Slab};
    use crate::volume::Dimensions;

    #[test]
    fn mpr_block_is_16_byte_aligned() {
        assert_eq!(std::mem::size_of::<MprUniforms>(), 80);
        assert_eq!(std::mem::offset_of!(MprUniforms, plane_origin), 32);
        assert_eq!(std::mem::offset_of!(MprUniforms, plane_x), 48);
        assert_eq!(std::mem::offset_of!(MprUniforms, plane_y), 64);
        assert_eq!(std::mem::size_of::<VolumeUniforms>() % 16, 0);
    }

    #[test]
    fn mpr_uniforms_from_plane() {
        let dimensions = Dimensions::new(64, 64, 32);
        let plane = MprPlane {
            descriptor: PlaneDescriptor::canonical(Orientation::Axial, 15, dimensions),
            slab: Slab::from_voxels(8, Axis::Z, dimensions, 9)
                .with_mode(BlendMode::MaximumIntensity),
        };
        let uniforms = MprUniforms::new(IntensityRange::new(-200, 400), &plane, false);
        assert_eq!(uniforms.voxel_min, -200);
        assert_eq!(uniforms.blend_mode, 1);
        assert_eq!(uniforms.num_steps, 9);
        assert_eq!(uniforms.slab_half, 0.125);
        assert_eq!(uniforms.use_transfer_function, 0);
        assert_eq!(uniforms.plane_origin, [0.0, 0.0, 0.484375]);
        assert_eq!(uniforms.as_bytes().len(), 80);
    }

    #[test]
    fn density_gate_is_ordered() {
        let uniforms = VolumeUniforms::default().with_density_gate(0.6, 0.3);
        assert_eq!(uniforms.density_floor, 0.6);
        assert_eq!(uniforms.density_ceil, 0.6);
        let uniforms = VolumeUniforms::default().with_density_gate(-1.0, 2.0);
        assert_eq!((uniforms.density_floor, uniforms.density_ceil), (0.0, 1.0));
    }

    #[test]
    fn volume_toggles() {
        let uniforms = VolumeUniforms::default()
            .with_lighting(false)
            .with_rendering_quality(0)
            .with_transfer_function(true);
        assert_eq!(uniforms.lighting, 0);
        assert_eq!(uniforms.rendering_quality, 1);
        assert_eq!(uniforms.use_transfer_function, 1);

        let uniforms = uniforms.with_lighting(true).with_rendering_quality(1024);
        assert_eq!((uniforms.lighting, uniforms.rendering_quality), (1, 1024));
    }

    #[test]
    fn volume_uniforms_follow_dataset() {
        let uniforms = VolumeUniforms::for_dataset(&VolumeDataset::placeholder())
            .with_method(RenderMethod::MaximumIntensity)
            .with_hu_gate(Some(IntensityRange::new(-900, -500)));
        assert_eq!((uniforms.dim_x, uniforms.dim_y, uniforms.dim_z), (1, 1, 1));
        assert_eq!(uniforms.method, 2);
        assert_eq!(uniforms.use_hu_gate, 1);
    }
}
