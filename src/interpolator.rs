use crate::plane::PlaneDescriptor;
use crate::volume::{Dimensions, VoxelBuffer};

use nalgebra::{Point3, Vector3};

pub(crate) struct Interpolator;

impl Interpolator {
    /// Pixel size of a plane rendered at the finest voxel spacing, so that
    /// anisotropic volumes keep their aspect ratio.
    pub(crate) fn plane_output_size(
        plane: &PlaneDescriptor,
        dimensions: Dimensions,
        spacing: Vector3<f64>,
    ) -> (u32, u32) {
        let min_spacing = spacing.x.min(spacing.y).min(spacing.z);
        let inv_min_spacing = 1.0 / min_spacing; // Multiply instead of divide
        let mm_per_unit = dimensions.to_vector().component_mul(&spacing);

        let width = plane.axis_u.component_mul(&mm_per_unit).norm() * inv_min_spacing;
        let height = plane.axis_v.component_mul(&mm_per_unit).norm() * inv_min_spacing;

        ((width.round() as u32).max(1), (height.round() as u32).max(1))
    }

    /// Trilinear sample at a texture coordinate, using the voxel-centre
    /// convention. Returns `None` outside `[0,1]³`.
    #[inline]
    pub(crate) fn trilinear_interpolate(
        data: &VoxelBuffer,
        dimensions: Dimensions,
        tex: &Point3<f64>,
    ) -> Option<f32> {
        if tex.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return None;
        }
        let (depth, height, width) = dimensions.shape();

        let x = (tex.x * width as f64 - 0.5).clamp(0.0, (width - 1) as f64);
        let y = (tex.y * height as f64 - 0.5).clamp(0.0, (height - 1) as f64);
        let z = (tex.z * depth as f64 - 0.5).clamp(0.0, (depth - 1) as f64);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let z1 = (z0 + 1).min(depth - 1);

        let dx = (x - x0 as f64) as f32;
        let dy = (y - y0 as f64) as f32;
        let dz = (z - z0 as f64) as f32;

        let lerp = |a: i32, b: i32, t: f32| (a as f32).mul_add(1.0 - t, b as f32 * t);

        let c00 = lerp(data.get(x0, y0, z0), data.get(x1, y0, z0), dx);
        let c10 = lerp(data.get(x0, y1, z0), data.get(x1, y1, z0), dx);
        let c01 = lerp(data.get(x0, y0, z1), data.get(x1, y0, z1), dx);
        let c11 = lerp(data.get(x0, y1, z1), data.get(x1, y1, z1), dx);

        let c0 = c00.mul_add(1.0 - dy, c10 * dy);
        let c1 = c01.mul_add(1.0 - dy, c11 * dy);

        Some(c0.mul_add(1.0 - dz, c1 * dz))
    }
}
