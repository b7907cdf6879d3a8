//! Tri-planar crosshair navigation.
//!
//! The navigator holds an orthonormal basis {x′, y′, z′} and a crosshair point,
//! both in normalized volume space. Each of the three views shows the plane
//! orthogonal to one basis axis through the crosshair, so rotating the basis
//! tilts all three planes coherently.

use crate::enums::{Axis, Orientation};
use crate::plane::PlaneDescriptor;

use nalgebra::{Matrix3, Point3, Rotation3, Unit, Vector3};

/// Margin keeping the crosshair away from the volume faces.
pub const CROSSHAIR_EPSILON: f64 = 1e-5;

/// Rotations between two Gram-Schmidt passes on the basis.
const REORTHONORMALIZE_INTERVAL: u32 = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrosshairNavigator {
    basis: Matrix3<f64>,
    crosshair: Point3<f64>,
    rotations: u32,
}

impl Default for CrosshairNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosshairNavigator {
    pub fn new() -> Self {
        Self {
            basis: Matrix3::identity(),
            crosshair: Point3::new(0.5, 0.5, 0.5),
            rotations: 0,
        }
    }

    /// Back to identity basis and centred crosshair.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn center_view(&mut self) {
        self.reset();
    }

    pub fn basis(&self) -> &Matrix3<f64> {
        &self.basis
    }

    pub fn crosshair(&self) -> Point3<f64> {
        self.crosshair
    }

    pub fn column(&self, axis: Axis) -> Vector3<f64> {
        self.basis.column(axis.index()).into_owned()
    }

    /// Rotates the basis by `delta` radians around its own `axis` column,
    /// counter-clockwise when looking down the axis.
    pub fn rotate(&mut self, axis: Axis, delta: f64) {
        let Some(direction) = Unit::try_new(self.column(axis), f64::EPSILON) else {
            return;
        };
        let rotation = Rotation3::from_axis_angle(&direction, delta);
        self.basis = rotation.matrix() * self.basis;

        self.rotations += 1;
        if self.rotations >= REORTHONORMALIZE_INTERVAL {
            self.reorthonormalize();
        }
    }

    /// Moves the crosshair by `delta` (normalized units) along basis `axis`.
    pub fn translate(&mut self, axis: Axis, delta: f64) {
        let moved = self.crosshair + self.column(axis) * delta;
        self.crosshair = moved.map(|c| c.clamp(CROSSHAIR_EPSILON, 1.0 - CROSSHAIR_EPSILON));
    }

    /// Plane for one of the three views, centred on the crosshair.
    pub fn plane_for(&self, orientation: Orientation) -> PlaneDescriptor {
        let (u, v) = orientation.in_plane_axes();
        let u = self.column(u);
        let v = self.column(v);
        let origin = self.crosshair - (u + v) * 0.5;
        PlaneDescriptor::from_texture(origin, u, v)
    }

    pub fn planes(&self) -> [(Orientation, PlaneDescriptor); 3] {
        Orientation::ALL.map(|orientation| (orientation, self.plane_for(orientation)))
    }

    /// Dragging the vertical crosshair line of a view moves along the view's
    /// horizontal in-plane axis.
    pub fn drag_vertical_line(&mut self, view: Orientation, dx: f64, viewport_width: f64) {
        if viewport_width > 0.0 {
            self.translate(view.in_plane_axes().0, dx / viewport_width);
        }
    }

    /// Dragging the horizontal line moves along the vertical in-plane axis.
    /// Screen y grows downwards.
    pub fn drag_horizontal_line(&mut self, view: Orientation, dy: f64, viewport_height: f64) {
        if viewport_height > 0.0 {
            self.translate(view.in_plane_axes().1, -dy / viewport_height);
        }
    }

    /// Two-finger rotation in a view spins around that view's normal.
    pub fn rotate_view(&mut self, view: Orientation, delta: f64) {
        self.rotate(view.normal_axis(), delta);
    }

    fn reorthonormalize(&mut self) {
        let x = self.basis.column(0).normalize();
        let y = self.basis.column(1) - x * x.dot(&self.basis.column(1));
        let y = y.normalize();
        let z = x.cross(&y);
        self.basis = Matrix3::from_columns(&[x, y, z]);
        self.rotations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const TOLERANCE: f64 = 1e-4;

    fn assert_orthonormal(basis: &Matrix3<f64>) {
        let product = basis.transpose() * basis;
        assert!(
            (product - Matrix3::identity()).abs().max() < TOLERANCE,
            "not orthonormal: {basis}"
        );
        assert!((basis.determinant() - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn starts_centred_with_identity() {
        let navigator = CrosshairNavigator::new();
        assert_eq!(*navigator.basis(), Matrix3::identity());
        assert_eq!(navigator.crosshair(), Point3::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn quarter_turn_about_z_then_sagittal() {
        let mut navigator = CrosshairNavigator::new();
        navigator.rotate(Axis::Z, FRAC_PI_2);
        let plane = navigator.plane_for(Orientation::Sagittal);
        // y' rotated 90° about z lands on -x, z' is unchanged.
        assert!((plane.axis_u.dot(&Vector3::new(-1.0, 0.0, 0.0)) - 1.0).abs() < TOLERANCE);
        assert!((plane.axis_v.dot(&Vector3::z()) - 1.0).abs() < TOLERANCE);
        assert!((plane.center() - navigator.crosshair()).norm() < TOLERANCE);
    }

    #[test]
    fn rotation_uses_current_basis_axis() {
        let mut navigator = CrosshairNavigator::new();
        navigator.rotate(Axis::X, FRAC_PI_2);
        // z' now points along -y; rotating around it must keep it fixed.
        let z_before = navigator.column(Axis::Z);
        navigator.rotate(Axis::Z, 0.7);
        assert!((navigator.column(Axis::Z) - z_before).norm() < TOLERANCE);
        assert!((z_before - Vector3::new(0.0, -1.0, 0.0)).norm() < TOLERANCE);
    }

    #[test]
    fn stays_orthonormal_after_many_rotations() {
        let mut navigator = CrosshairNavigator::new();
        for step in 0..10_000 {
            let axis = Axis::ALL[step % 3];
            navigator.rotate(axis, 0.013 * (step % 7) as f64 - 0.031);
            if step % 97 == 0 {
                assert_orthonormal(navigator.basis());
            }
        }
        assert_orthonormal(navigator.basis());
    }

    #[test]
    fn crosshair_stays_inside() {
        let mut navigator = CrosshairNavigator::new();
        navigator.rotate(Axis::Y, 0.4);
        for step in 0..200 {
            let axis = Axis::ALL[step % 3];
            let delta = if step % 2 == 0 { 0.37 } else { -0.91 };
            navigator.translate(axis, delta);
            assert!(navigator.crosshair().iter().all(|c| {
                (CROSSHAIR_EPSILON..=1.0 - CROSSHAIR_EPSILON).contains(c)
            }));
        }
    }

    #[test]
    fn translate_along_rotated_axis() {
        let mut navigator = CrosshairNavigator::new();
        navigator.rotate(Axis::Z, FRAC_PI_2);
        navigator.translate(Axis::X, 0.1);
        assert!((navigator.crosshair() - Point3::new(0.5, 0.6, 0.5)).norm() < TOLERANCE);
    }

    #[test]
    fn plane_roles() {
        let navigator = CrosshairNavigator::new();
        let axial = navigator.plane_for(Orientation::Axial);
        assert_eq!(axial.origin, Point3::new(0.0, 0.0, 0.5));
        assert_eq!((axial.axis_u, axial.axis_v), (Vector3::x(), Vector3::y()));
        let coronal = navigator.plane_for(Orientation::Coronal);
        assert_eq!((coronal.axis_u, coronal.axis_v), (Vector3::x(), Vector3::z()));
        let sagittal = navigator.plane_for(Orientation::Sagittal);
        assert_eq!((sagittal.axis_u, sagittal.axis_v), (Vector3::y(), Vector3::z()));
        assert_eq!(navigator.planes().len(), 3);
    }

    #[test]
    fn gestures_map_to_view_axes() {
        let mut navigator = CrosshairNavigator::new();
        navigator.drag_vertical_line(Orientation::Sagittal, 50.0, 500.0);
        navigator.drag_horizontal_line(Orientation::Coronal, 100.0, 400.0);
        let expected = Point3::new(0.5, 0.6, 0.25);
        assert!((navigator.crosshair() - expected).norm() < TOLERANCE);

        navigator.rotate_view(Orientation::Axial, 0.5);
        assert!((navigator.column(Axis::Z) - Vector3::z()).norm() < TOLERANCE);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut navigator = CrosshairNavigator::new();
        navigator.rotate(Axis::X, 1.0);
        navigator.translate(Axis::Y, 0.2);
        navigator.center_view();
        assert_eq!(navigator, CrosshairNavigator::new());
    }
}
