//! Per-volume MPR context.
//!
//! A session owns the dataset, its transform and the navigation state. It is
//! built once per loaded volume and replaced or reset when the volume changes;
//! every mutation goes through `&mut self`, so dataset swaps cannot interleave
//! with navigation.

use crate::enums::{BlendMode, Orientation};
use crate::geometry::GeometryTransform;
use crate::navigator::CrosshairNavigator;
use crate::plane::{MprPlane, PlaneDescriptor, Slab, slice_index_from_normalized};
use crate::uniforms::{MprUniforms, VolumeUniforms};
use crate::volume::{IntensityRange, VolumeDataset};

use log::debug;
use nalgebra::{Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Transform dimensions {transform:?} do not match dataset dimensions {dataset:?}")]
    DimensionMismatch {
        dataset: (u32, u32, u32),
        transform: (u32, u32, u32),
    },
}

pub struct MprSession {
    dataset: VolumeDataset,
    transform: GeometryTransform,
    navigator: CrosshairNavigator,
    orientation: Orientation,
    slice: i64,
    plane: PlaneDescriptor,
    slab: Slab,
    window: IntensityRange,
    use_transfer_function: bool,
}

impl MprSession {
    /// # Errors
    ///
    /// Fails when the transform was derived for different dimensions.
    pub fn new(dataset: VolumeDataset, transform: GeometryTransform) -> Result<Self, SessionError> {
        check_dimensions(&dataset, &transform)?;
        let mut session = Self::axis_aligned(dataset);
        session.transform = transform;
        Ok(session)
    }

    /// Session for a dataset without patient geometry (presets, raw volumes).
    pub fn axis_aligned(dataset: VolumeDataset) -> Self {
        let transform = GeometryTransform::for_dataset(&dataset);
        let orientation = Orientation::Axial;
        let slice = mid_slice(&dataset, orientation);
        Self {
            plane: PlaneDescriptor::canonical(orientation, slice, dataset.dimensions()),
            window: dataset.intensity_range(),
            dataset,
            transform,
            navigator: CrosshairNavigator::new(),
            orientation,
            slice,
            slab: Slab::thin(),
            use_transfer_function: true,
        }
    }

    pub fn placeholder() -> Self {
        Self::axis_aligned(VolumeDataset::placeholder())
    }

    /// Swaps in a new volume and resets navigation.
    pub fn replace_dataset(
        &mut self,
        dataset: VolumeDataset,
        transform: GeometryTransform,
    ) -> Result<(), SessionError> {
        check_dimensions(&dataset, &transform)?;
        self.install(dataset, transform);
        Ok(())
    }

    fn install(&mut self, dataset: VolumeDataset, transform: GeometryTransform) {
        let dimensions = dataset.dimensions();
        debug!(
            "Session dataset {}x{}x{} spacing {:?} range {:?}",
            dimensions.x,
            dimensions.y,
            dimensions.z,
            dataset.spacing().as_slice(),
            dataset.intensity_range()
        );
        self.window = dataset.intensity_range();
        self.dataset = dataset;
        self.transform = transform;
        self.navigator.reset();
        self.slab = Slab::thin();
        self.set_orientation(Orientation::Axial);
    }

    pub fn dataset(&self) -> &VolumeDataset {
        &self.dataset
    }

    pub fn transform(&self) -> &GeometryTransform {
        &self.transform
    }

    pub fn navigator(&self) -> &CrosshairNavigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut CrosshairNavigator {
        &mut self.navigator
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn slice(&self) -> i64 {
        self.slice
    }

    pub fn window(&self) -> IntensityRange {
        self.window
    }

    /// Number of slices along the current plane's normal.
    pub fn slice_count(&self) -> u32 {
        self.dataset
            .dimensions()
            .along(self.orientation.normal_axis())
    }

    pub fn center_view(&mut self) {
        self.navigator.center_view();
    }

    /// Switches the single-plane view and moves it to the middle slice.
    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
        self.set_slice(mid_slice(&self.dataset, orientation));
    }

    pub fn set_slice(&mut self, index: i64) {
        let count = self.slice_count().max(1) as i64;
        self.slice = index.clamp(0, count - 1);
        self.plane =
            PlaneDescriptor::canonical(self.orientation, self.slice, self.dataset.dimensions());
    }

    /// Slider position in `[0, 1]` to slice.
    pub fn update_slice(&mut self, normalized: f64) {
        let index =
            slice_index_from_normalized(normalized, self.orientation, self.dataset.dimensions());
        self.set_slice(index);
    }

    /// Oblique plane in world millimetres.
    pub fn set_oblique_world(
        &mut self,
        origin: &Point3<f64>,
        axis_u: &Vector3<f64>,
        axis_v: &Vector3<f64>,
    ) {
        self.plane = PlaneDescriptor::from_world(&self.transform, origin, axis_u, axis_v);
    }

    pub fn set_oblique_texture(
        &mut self,
        origin: Point3<f64>,
        axis_u: Vector3<f64>,
        axis_v: Vector3<f64>,
    ) {
        self.plane = PlaneDescriptor::from_texture(origin, axis_u, axis_v);
    }

    /// Slab measured along the current orientation's normal.
    pub fn set_slab(&mut self, thickness_voxels: u32, steps: u32) {
        let mode = self.slab.mode;
        self.slab = Slab::from_voxels(
            thickness_voxels,
            self.orientation.normal_axis(),
            self.dataset.dimensions(),
            steps,
        )
        .with_mode(mode);
    }

    pub fn set_blend(&mut self, mode: BlendMode) {
        self.slab.mode = mode;
    }

    pub fn set_window(&mut self, window: IntensityRange) {
        self.window = window;
    }

    pub fn set_use_transfer_function(&mut self, on: bool) {
        self.use_transfer_function = on;
    }

    pub fn current_plane(&self) -> MprPlane {
        MprPlane {
            descriptor: self.plane,
            slab: self.slab,
        }
    }

    /// The three navigator planes, rendered thin.
    pub fn tri_planar(&self) -> [(Orientation, MprPlane); 3] {
        self.navigator.planes().map(|(orientation, descriptor)| {
            (
                orientation,
                MprPlane {
                    descriptor,
                    slab: Slab::thin(),
                },
            )
        })
    }

    /// Crosshair position in world millimetres.
    pub fn crosshair_world(&self) -> Point3<f64> {
        self.transform
            .tex_to_world_point(&self.navigator.crosshair())
    }

    pub fn uniforms(&self) -> MprUniforms {
        MprUniforms::new(self.window, &self.current_plane(), self.use_transfer_function)
    }

    pub fn tri_planar_uniforms(&self) -> [(Orientation, MprUniforms); 3] {
        self.tri_planar().map(|(orientation, plane)| {
            (
                orientation,
                MprUniforms::new(self.window, &plane, self.use_transfer_function),
            )
        })
    }

    pub fn volume_uniforms(&self) -> VolumeUniforms {
        VolumeUniforms::for_dataset(&self.dataset)
    }
}

fn mid_slice(dataset: &VolumeDataset, orientation: Orientation) -> i64 {
    dataset.dimensions().along(orientation.normal_axis()) as i64 / 2
}

fn check_dimensions(
    dataset: &VolumeDataset,
    transform: &GeometryTransform,
) -> Result<(), SessionError> {
    let d = dataset.dimensions();
    let t = transform.dimensions();
    if d != t {
        return Err(SessionError::DimensionMismatch {
            dataset: (d.x, d.y, d.z),
            transform: (t.x, t.y, t.z),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::Axis;
    use crate::volume::{Dimensions, VoxelBuffer};
    use ndarray::Array3;

    fn dataset(x: usize, y: usize, z: usize) -> VolumeDataset {
        VolumeDataset::new(
            VoxelBuffer::Int16(Array3::zeros((z, y, x))),
            Vector3::new(0.5, 0.5, 2.0),
            Some(IntensityRange::new(-500, 1500)),
        )
        .unwrap()
    }

    #[test]
    fn starts_on_middle_axial_slice() {
        let session = MprSession::axis_aligned(dataset(8, 8, 10));
        assert_eq!(session.orientation(), Orientation::Axial);
        assert_eq!(session.slice(), 5);
        let plane = session.current_plane();
        assert!((plane.descriptor.origin.z - 5.5 / 10.0).abs() < 1e-12);
        assert_eq!(session.window(), IntensityRange::new(-500, 1500));
    }

    #[test]
    fn slider_and_orientation() {
        let mut session = MprSession::axis_aligned(dataset(8, 6, 10));
        session.set_orientation(Orientation::Coronal);
        assert_eq!(session.slice(), 3);
        session.update_slice(1.0);
        assert_eq!(session.slice(), 5);
        session.set_slice(-4);
        assert_eq!(session.slice(), 0);
    }

    #[test]
    fn slab_follows_current_axis() {
        let mut session = MprSession::axis_aligned(dataset(8, 6, 10));
        session.set_blend(BlendMode::Mean);
        session.set_orientation(Orientation::Sagittal);
        session.set_slab(4, 5);
        let slab = session.current_plane().slab;
        assert!((slab.half_thickness - 0.25).abs() < 1e-12);
        assert_eq!(slab.steps, 5);
        assert_eq!(slab.mode, BlendMode::Mean);
        assert_eq!(session.uniforms().blend_mode, BlendMode::Mean as i32);
    }

    #[test]
    fn replacing_dataset_resets_navigation() {
        let mut session = MprSession::placeholder();
        session.navigator_mut().rotate(Axis::X, 0.5);
        session.navigator_mut().translate(Axis::Y, 0.2);

        let next = dataset(4, 4, 4);
        let transform = GeometryTransform::for_dataset(&next);
        session.replace_dataset(next, transform).unwrap();
        assert_eq!(*session.navigator(), CrosshairNavigator::new());
        assert_eq!(session.dataset().dimensions(), Dimensions::new(4, 4, 4));
    }

    #[test]
    fn rejects_mismatched_transform() {
        let transform = GeometryTransform::for_dataset(&dataset(4, 4, 4));
        let result = MprSession::new(dataset(4, 4, 5), transform);
        assert!(matches!(result, Err(SessionError::DimensionMismatch { .. })));
    }

    #[test]
    fn crosshair_in_world_space() {
        let session = MprSession::axis_aligned(dataset(8, 8, 10));
        // Texture centre is half the physical extent minus half a voxel.
        let world = session.crosshair_world();
        assert!((world - Point3::new(1.75, 1.75, 9.0)).norm() < 1e-9);
    }

    #[test]
    fn tri_planar_uniforms_are_thin() {
        let session = MprSession::axis_aligned(dataset(8, 8, 8));
        for (_, uniforms) in session.tri_planar_uniforms() {
            assert_eq!(uniforms.num_steps, 1);
            assert_eq!(uniforms.slab_half, 0.0);
        }
    }

    #[test]
    fn oblique_world_plane() {
        let mut session = MprSession::axis_aligned(dataset(8, 8, 10));
        session.set_oblique_world(
            &Point3::new(0.0, 0.0, 0.0),
            &Vector3::new(4.0, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 20.0),
        );
        let plane = session.current_plane().descriptor;
        assert!((plane.axis_u - Vector3::new(1.0, 0.0, 0.0)).norm() < 1e-9);
        assert!((plane.axis_v - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-9);
    }
}
