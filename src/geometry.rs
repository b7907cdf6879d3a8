//! Patient-space geometry of a volume.
//!
//! Maps between world millimetres (DICOM patient coordinates), voxel indices
//! (i, j, k) and normalized texture coordinates in `[0,1]³`:
//!
//! ```text
//! world = ipp0 + i·Δx·row + j·Δy·col + k·Δz·normal
//! tex   = (voxel + 0.5) / dims
//! ```

use crate::calibration::SeriesHeader;
use crate::plane::PlaneDescriptor;
use crate::volume::{Dimensions, VolumeDataset};

use nalgebra::{Matrix4, Point3, Vector3};
use thiserror::Error;

/// Below this the orientation vectors are treated as linearly dependent.
const DEGENERATE_EPSILON: f64 = 1e-9;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Orientation vectors are not linearly independent")]
    Degenerate,

    #[error("Volume dimensions must all be greater than zero")]
    EmptyDimensions,

    #[error("Voxel spacing must be finite and greater than zero")]
    InvalidSpacing,
}

/// Header fields the transforms are derived from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeGeometry {
    pub dimensions: Dimensions,
    /// Millimetres per voxel.
    pub spacing: Vector3<f64>,
    /// Image Orientation (Patient), row direction.
    pub iop_row: Vector3<f64>,
    /// Image Orientation (Patient), column direction.
    pub iop_col: Vector3<f64>,
    /// Image Position (Patient) of voxel (0, 0, 0).
    pub ipp0: Point3<f64>,
}

impl VolumeGeometry {
    pub fn from_header(header: &SeriesHeader) -> Self {
        Self {
            dimensions: header.dimensions,
            spacing: header.spacing,
            iop_row: header.row_cosines,
            iop_col: header.col_cosines,
            ipp0: header.image_position,
        }
    }

    /// Identity orientation with the first voxel at the world origin.
    pub fn axis_aligned(dimensions: Dimensions, spacing: Vector3<f64>) -> Self {
        Self {
            dimensions,
            spacing,
            iop_row: Vector3::x(),
            iop_col: Vector3::y(),
            ipp0: Point3::origin(),
        }
    }

    /// Slice direction, `normalize(row × col)`. `None` when row and col are
    /// parallel.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        self.iop_row
            .cross(&self.iop_col)
            .try_normalize(DEGENERATE_EPSILON)
    }
}

/// The four affine maps between voxel, world and texture space.
///
/// Derived once per series; holds no mutable state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryTransform {
    geometry: VolumeGeometry,
    normal: Vector3<f64>,
    voxel_to_world: Matrix4<f64>,
    world_to_voxel: Matrix4<f64>,
    voxel_to_tex: Matrix4<f64>,
    world_to_tex: Matrix4<f64>,
    tex_to_world: Matrix4<f64>,
}

impl GeometryTransform {
    /// # Errors
    ///
    /// Returns [`GeometryError::Degenerate`] when `voxel_to_world` cannot be
    /// inverted.
    pub fn new(geometry: VolumeGeometry) -> Result<Self, GeometryError> {
        if geometry.dimensions.is_empty() {
            return Err(GeometryError::EmptyDimensions);
        }
        if !geometry.spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(GeometryError::InvalidSpacing);
        }
        let normal = geometry.normal().ok_or(GeometryError::Degenerate)?;

        let voxel_to_world = Self::voxel_to_world_matrix(&geometry, &normal);
        let world_to_voxel = voxel_to_world
            .try_inverse()
            .ok_or(GeometryError::Degenerate)?;

        let voxel_to_tex = Self::voxel_to_tex_matrix(geometry.dimensions);
        let tex_to_voxel = Self::tex_to_voxel_matrix(geometry.dimensions);

        Ok(Self {
            geometry,
            normal,
            voxel_to_world,
            world_to_voxel,
            voxel_to_tex,
            world_to_tex: voxel_to_tex * world_to_voxel,
            tex_to_world: voxel_to_world * tex_to_voxel,
        })
    }

    pub fn from_header(header: &SeriesHeader) -> Result<Self, GeometryError> {
        Self::new(VolumeGeometry::from_header(header))
    }

    pub fn axis_aligned(
        dimensions: Dimensions,
        spacing: Vector3<f64>,
    ) -> Result<Self, GeometryError> {
        Self::new(VolumeGeometry::axis_aligned(dimensions, spacing))
    }

    /// Axis-aligned transform of a dataset. Cannot fail since a dataset
    /// always has non-empty dimensions and positive spacing.
    pub fn for_dataset(dataset: &VolumeDataset) -> Self {
        let geometry = VolumeGeometry::axis_aligned(dataset.dimensions(), dataset.spacing());
        let voxel_to_world = Matrix4::new_nonuniform_scaling(&geometry.spacing);
        let world_to_voxel = Matrix4::new_nonuniform_scaling(&geometry.spacing.map(|s| 1.0 / s));
        let voxel_to_tex = Self::voxel_to_tex_matrix(geometry.dimensions);
        let tex_to_voxel = Self::tex_to_voxel_matrix(geometry.dimensions);
        Self {
            geometry,
            normal: Vector3::z(),
            voxel_to_world,
            world_to_voxel,
            voxel_to_tex,
            world_to_tex: voxel_to_tex * world_to_voxel,
            tex_to_world: voxel_to_world * tex_to_voxel,
        }
    }

    fn voxel_to_world_matrix(geometry: &VolumeGeometry, normal: &Vector3<f64>) -> Matrix4<f64> {
        let r = geometry.iop_row * geometry.spacing.x;
        let c = geometry.iop_col * geometry.spacing.y;
        let n = normal * geometry.spacing.z;
        let t = geometry.ipp0;
        #[rustfmt::skip]
        let m = Matrix4::new(
            r.x, c.x, n.x, t.x,
            r.y, c.y, n.y, t.y,
            r.z, c.z, n.z, t.z,
            0.0, 0.0, 0.0, 1.0,
        );
        m
    }

    fn voxel_to_tex_matrix(dimensions: Dimensions) -> Matrix4<f64> {
        let d = dimensions.to_vector();
        #[rustfmt::skip]
        let m = Matrix4::new(
            1.0 / d.x, 0.0,       0.0,       0.5 / d.x,
            0.0,       1.0 / d.y, 0.0,       0.5 / d.y,
            0.0,       0.0,       1.0 / d.z, 0.5 / d.z,
            0.0,       0.0,       0.0,       1.0,
        );
        m
    }

    fn tex_to_voxel_matrix(dimensions: Dimensions) -> Matrix4<f64> {
        let d = dimensions.to_vector();
        #[rustfmt::skip]
        let m = Matrix4::new(
            d.x, 0.0, 0.0, -0.5,
            0.0, d.y, 0.0, -0.5,
            0.0, 0.0, d.z, -0.5,
            0.0, 0.0, 0.0, 1.0,
        );
        m
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn dimensions(&self) -> Dimensions {
        self.geometry.dimensions
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.normal
    }

    pub fn voxel_to_world(&self) -> &Matrix4<f64> {
        &self.voxel_to_world
    }

    pub fn world_to_voxel(&self) -> &Matrix4<f64> {
        &self.world_to_voxel
    }

    pub fn voxel_to_tex(&self) -> &Matrix4<f64> {
        &self.voxel_to_tex
    }

    pub fn world_to_tex(&self) -> &Matrix4<f64> {
        &self.world_to_tex
    }

    pub fn tex_to_world(&self) -> &Matrix4<f64> {
        &self.tex_to_world
    }

    pub fn voxel_to_world_point(&self, voxel: &Point3<f64>) -> Point3<f64> {
        self.voxel_to_world.transform_point(voxel)
    }

    pub fn world_to_voxel_point(&self, world: &Point3<f64>) -> Point3<f64> {
        self.world_to_voxel.transform_point(world)
    }

    pub fn voxel_to_tex_point(&self, voxel: &Point3<f64>) -> Point3<f64> {
        self.voxel_to_tex.transform_point(voxel)
    }

    pub fn world_to_tex_point(&self, world: &Point3<f64>) -> Point3<f64> {
        self.world_to_tex.transform_point(world)
    }

    pub fn tex_to_world_point(&self, tex: &Point3<f64>) -> Point3<f64> {
        self.tex_to_world.transform_point(tex)
    }

    /// Maps a world-space plane (origin and two edge vectors, in mm) into
    /// texture space. Edges are mapped as differences of transformed points
    /// since `world_to_tex` carries a translation.
    pub fn plane_world_to_tex(
        &self,
        origin: &Point3<f64>,
        axis_u: &Vector3<f64>,
        axis_v: &Vector3<f64>,
    ) -> PlaneDescriptor {
        let o = self.world_to_tex_point(origin);
        let u = self.world_to_tex_point(&(origin + axis_u)) - o;
        let v = self.world_to_tex_point(&(origin + axis_v)) - o;
        PlaneDescriptor::new(o, u, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-4;

    fn head() -> GeometryTransform {
        GeometryTransform::axis_aligned(
            Dimensions::new(512, 512, 511),
            Vector3::new(0.449, 0.449, 0.501),
        )
        .unwrap()
    }

    fn oblique() -> GeometryTransform {
        let angle = 0.3f64;
        GeometryTransform::new(VolumeGeometry {
            dimensions: Dimensions::new(64, 48, 32),
            spacing: Vector3::new(0.7, 0.8, 2.5),
            iop_row: Vector3::new(angle.cos(), angle.sin(), 0.0),
            iop_col: Vector3::new(0.0, 0.0, -1.0),
            ipp0: Point3::new(-120.0, 35.5, 260.0),
        })
        .unwrap()
    }

    #[test]
    fn head_voxel_to_world() {
        let world = head().voxel_to_world_point(&Point3::new(256.0, 256.0, 255.0));
        assert!((world - Point3::new(114.944, 114.944, 127.755)).norm() < TOLERANCE);
    }

    #[test]
    fn world_voxel_round_trip() {
        let transform = oblique();
        for &(i, j, k) in &[(0.0, 0.0, 0.0), (63.0, 47.0, 31.0), (12.0, 40.0, 7.0)] {
            let voxel = Point3::new(i, j, k);
            let back = transform.world_to_voxel_point(&transform.voxel_to_world_point(&voxel));
            assert!((back - voxel).norm() < TOLERANCE, "{voxel} -> {back}");
        }
    }

    #[test]
    fn slice_axis_follows_normal() {
        let transform = oblique();
        let step = transform.voxel_to_world_point(&Point3::new(0.0, 0.0, 1.0))
            - transform.voxel_to_world_point(&Point3::origin());
        let expected = transform.normal() * 2.5;
        assert!((step - expected).norm() < TOLERANCE);
        assert!((transform.normal().norm() - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn voxel_centers_map_inside_unit_cube() {
        let transform = head();
        for &(i, j, k) in &[(0.0, 0.0, 0.0), (511.0, 511.0, 510.0), (0.0, 511.0, 3.0)] {
            let tex = transform.voxel_to_tex_point(&Point3::new(i, j, k));
            assert!(tex.iter().all(|c| *c > 0.0 && *c < 1.0), "{tex}");
        }
        let first = transform.voxel_to_tex_point(&Point3::origin());
        assert!((first.x - 0.5 / 512.0).abs() < 1e-12);
    }

    #[test]
    fn world_to_tex_composes() {
        let transform = oblique();
        let voxel = Point3::new(10.0, 20.0, 5.0);
        let world = transform.voxel_to_world_point(&voxel);
        let direct = transform.voxel_to_tex_point(&voxel);
        let composed = transform.world_to_tex_point(&world);
        assert!((direct - composed).norm() < 1e-9);
        let back = transform.tex_to_world_point(&composed);
        assert!((back - world).norm() < TOLERANCE);
    }

    #[test]
    fn world_plane_to_tex() {
        let transform = head();
        let plane = transform.plane_world_to_tex(
            &Point3::new(0.0, 0.0, 0.0),
            &Vector3::new(0.449 * 512.0, 0.0, 0.0),
            &Vector3::new(0.0, 0.449 * 512.0, 0.0),
        );
        assert!((plane.origin.x - 0.5 / 512.0).abs() < 1e-9);
        assert!((plane.axis_u - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-9);
        assert!((plane.axis_v - Vector3::new(0.0, 1.0, 0.0)).norm() < 1e-9);
    }

    #[test]
    fn dataset_transform_matches_axis_aligned() {
        let dataset = VolumeDataset::placeholder();
        let fast = GeometryTransform::for_dataset(&dataset);
        let checked =
            GeometryTransform::axis_aligned(dataset.dimensions(), dataset.spacing()).unwrap();
        assert!((fast.world_to_tex() - checked.world_to_tex()).abs().max() < 1e-12);
        assert!((fast.tex_to_world() - checked.tex_to_world()).abs().max() < 1e-12);
    }

    #[test]
    fn parallel_orientation_is_degenerate() {
        let result = GeometryTransform::new(VolumeGeometry {
            dimensions: Dimensions::new(4, 4, 4),
            spacing: Vector3::new(1.0, 1.0, 1.0),
            iop_row: Vector3::x(),
            iop_col: Vector3::x() * 2.0,
            ipp0: Point3::origin(),
        });
        assert!(matches!(result, Err(GeometryError::Degenerate)));
    }

    #[test]
    fn zero_dimension_is_rejected() {
        let result = GeometryTransform::axis_aligned(
            Dimensions::new(4, 0, 4),
            Vector3::new(1.0, 1.0, 1.0),
        );
        assert!(matches!(result, Err(GeometryError::EmptyDimensions)));
    }
}
