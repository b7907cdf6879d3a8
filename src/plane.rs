//! Sampling planes in texture space.
//!
//! A [`PlaneDescriptor`] is a parallelogram in `[0,1]³`: an origin corner and
//! two edge vectors whose lengths give the plane's extent. It can be built from
//! a canonical slice index, from a world-space plane, or directly from texture
//! coordinates.

use crate::enums::{Axis, BlendMode, Orientation};
use crate::geometry::GeometryTransform;
use crate::volume::Dimensions;

use nalgebra::{Matrix3, Point3, Rotation3, UnitQuaternion, Vector3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneDescriptor {
    pub origin: Point3<f64>,
    pub axis_u: Vector3<f64>,
    pub axis_v: Vector3<f64>,
}

impl PlaneDescriptor {
    pub fn new(origin: Point3<f64>, axis_u: Vector3<f64>, axis_v: Vector3<f64>) -> Self {
        Self {
            origin,
            axis_u,
            axis_v,
        }
    }

    /// Canonical plane through slice `index` along the orientation's normal
    /// axis. The index is clamped to the volume and placed on voxel centres.
    ///
    /// Only meaningful for volumes aligned with the texture cube; oblique
    /// acquisitions go through [`PlaneDescriptor::from_world`].
    pub fn canonical(orientation: Orientation, index: i64, dimensions: Dimensions) -> Self {
        let normal = orientation.normal_axis();
        let count = dimensions.along(normal).max(1) as i64;
        let clamped = index.clamp(0, count - 1);
        let position = (clamped as f64 + 0.5) / count as f64;

        let mut origin = Point3::origin();
        origin[normal.index()] = position;
        let (u, v) = orientation.in_plane_axes();
        Self::new(origin, unit(u), unit(v))
    }

    /// Oblique plane given in world millimetres.
    pub fn from_world(
        transform: &GeometryTransform,
        origin: &Point3<f64>,
        axis_u: &Vector3<f64>,
        axis_v: &Vector3<f64>,
    ) -> Self {
        transform.plane_world_to_tex(origin, axis_u, axis_v)
    }

    /// Plane already expressed in texture space.
    pub fn from_texture(origin: Point3<f64>, axis_u: Vector3<f64>, axis_v: Vector3<f64>) -> Self {
        Self::new(origin, axis_u, axis_v)
    }

    /// Point at plane coordinates (s, t), with (0, 0) at the origin corner and
    /// (1, 1) at the opposite one.
    pub fn point_at(&self, s: f64, t: f64) -> Point3<f64> {
        self.origin + self.axis_u * s + self.axis_v * t
    }

    pub fn center(&self) -> Point3<f64> {
        self.point_at(0.5, 0.5)
    }

    pub fn width(&self) -> f64 {
        self.axis_u.norm()
    }

    pub fn height(&self) -> f64 {
        self.axis_v.norm()
    }

    /// Unit normal `u × v`, or `None` for a degenerate plane.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        self.axis_u.cross(&self.axis_v).try_normalize(f64::EPSILON)
    }

    /// Placement of a unit quad inside a unit cube centred at the origin, so
    /// that it covers this plane.
    pub fn pose(&self) -> PlanePose {
        let width = self.width();
        let height = self.height();

        let u_hat = if width > 0.0 {
            self.axis_u / width
        } else {
            Vector3::x()
        };
        let v_ortho = self.axis_v - u_hat * self.axis_v.dot(&u_hat);
        let v_hat = v_ortho.try_normalize(f64::EPSILON).unwrap_or_else(Vector3::y);
        let n_hat = u_hat.cross(&v_hat).normalize();

        let rotation = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[
            u_hat, v_hat, n_hat,
        ]));
        PlanePose {
            center: self.center() - Vector3::repeat(0.5),
            orientation: UnitQuaternion::from_rotation_matrix(&rotation),
            width,
            height,
        }
    }
}

fn unit(axis: Axis) -> Vector3<f64> {
    let mut v = Vector3::zeros();
    v[axis.index()] = 1.0;
    v
}

/// Rigid placement of a plane quad in cube-local coordinates `[-0.5, 0.5]³`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlanePose {
    pub center: Point3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub width: f64,
    pub height: f64,
}

/// Thick-slab parameters carried alongside a plane.
///
/// The renderer samples `steps` points along the plane normal within
/// `±half_thickness` and combines them according to `mode`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Slab {
    /// Half thickness in normalized texture units.
    pub half_thickness: f64,
    pub steps: u32,
    pub mode: BlendMode,
}

impl Default for Slab {
    fn default() -> Self {
        Self::thin()
    }
}

impl Slab {
    /// Single-sample MPR.
    pub fn thin() -> Self {
        Self {
            half_thickness: 0.0,
            steps: 1,
            mode: BlendMode::Single,
        }
    }

    /// Slab `thickness` voxels thick along `axis`. `steps` is raised to 1.
    pub fn from_voxels(thickness: u32, axis: Axis, dimensions: Dimensions, steps: u32) -> Self {
        let count = dimensions.along(axis).max(1) as f64;
        Self {
            half_thickness: 0.5 * thickness as f64 / count,
            steps: steps.max(1),
            mode: BlendMode::Single,
        }
    }

    pub fn with_mode(mut self, mode: BlendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn is_thin(&self) -> bool {
        self.steps <= 1
    }

    /// Offsets along the normal at which the slab is sampled.
    pub fn offsets(&self) -> impl Iterator<Item = f64> + '_ {
        let steps = self.steps.max(1);
        (0..steps).map(move |step| {
            if steps == 1 {
                0.0
            } else {
                -self.half_thickness + 2.0 * self.half_thickness * step as f64 / (steps - 1) as f64
            }
        })
    }
}

/// A plane plus the slab it is rendered with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MprPlane {
    pub descriptor: PlaneDescriptor,
    pub slab: Slab,
}

/// Slice index for a slider position in `[0, 1]`.
pub fn slice_index_from_normalized(
    value: f64,
    orientation: Orientation,
    dimensions: Dimensions,
) -> i64 {
    let last = (dimensions.along(orientation.normal_axis()) as i64 - 1).max(1);
    (value.clamp(0.0, 1.0) * last as f64).round() as i64
}
