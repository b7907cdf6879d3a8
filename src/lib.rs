//! # DICOM-MPR library
//!
//! This crate turns a CT series into a calibrated, GPU-ready volume and
//! provides the geometry needed to cut arbitrary planes through it
//! (multiplanar reconstruction).
//!
//! A series is loaded either from multiple [`FileDicomObject<InMemDicomObject>`]
//! or from a folder where each ".dcm" file is read. Raw samples are converted
//! to Hounsfield units (`round(raw * slope + intercept)`), clamped to the CT
//! range and stored as signed 16-bit voxels. Calibration runs in parallel
//! using rayon.
//!
//! Planes are described in normalized texture space:
//!  - Axial, Coronal and Sagittal planes at a slice index
//!  - Oblique planes given in world millimetres or texture coordinates
//!  - Three mutually orthogonal planes driven by a rotatable crosshair
//!
//! Each plane can be thickened into a slab combined by maximum, minimum or
//! mean intensity. The crate computes the uniform blocks a shader needs and
//! ships a CPU reference slicer for previews and headless export. DICOM files
//! are assumed to have the following attributes:
//!   - 16 bits allocated per sample
//!   - No multiframe (always the first frame is used)
//!   - Images from the same series (Series Instance UID) and acquisition
//!     (Acquisition Number)
//!
//! # Roadmap
//!
//!  - Texture upload and render passes on top of the uniform blocks
//!  - Cubic interpolation in the CPU slicer
//!  - Windowing presets per body part
//!
//! # Examples
//!
//! ## Slicing a series along the crosshair planes
//!
//! Read all DICOM files from the dicom/ directory, sorted along the slice
//! normal, then render the three crosshair planes.
//!
//! ```no_run
//! # use dicom_mpr::{CalibrationOptions, MprSession, Slicer, SortBy, VolumeLoader};
//! let series = VolumeLoader::load_from_directory(
//!     "dicom",
//!     SortBy::ImagePositionPatient,
//!     CalibrationOptions::default(),
//! )
//! .expect("should have loaded files from directory");
//! let session = MprSession::new(series.dataset, series.transform)
//!     .expect("transform should match the dataset");
//! let slicer = Slicer::new(session.dataset());
//! for (orientation, plane) in session.tri_planar() {
//!     let image = slicer
//!         .render_isotropic(&plane)
//!         .expect("should have rendered plane");
//!     image.save(format!("{}.png", orientation.title())).ok();
//! }
//! ```
//!
//! [`FileDicomObject<InMemDicomObject>`]: https://docs.rs/dicom-object/latest/dicom_object/struct.FileDicomObject.html

pub mod calibration;
pub mod enums;
pub mod geometry;
mod interpolator;
pub mod navigator;
pub mod plane;
pub mod session;
pub mod slicer;
pub mod uniforms;
pub mod volume;
pub mod volume_loader;

pub use calibration::{
    Calibration, CalibrationError, CalibrationOptions, HuCalibrator, SeriesHeader,
    calibrate_series,
};
pub use enums::{Axis, BlendMode, BodyPart, Orientation, PixelFormat, SortBy};
pub use geometry::{GeometryError, GeometryTransform, VolumeGeometry};
pub use navigator::CrosshairNavigator;
pub use plane::{MprPlane, PlaneDescriptor, Slab};
pub use session::{MprSession, SessionError};
pub use slicer::Slicer;
pub use uniforms::{MprUniforms, RenderMethod, VolumeUniforms};
pub use volume::{Dimensions, IntensityRange, VolumeDataset, VolumeError};
pub use volume_loader::{LoadedSeries, VolumeLoader, VolumeLoaderError};
