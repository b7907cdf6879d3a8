use crate::calibration::{CalibrationError, CalibrationOptions, SeriesHeader, calibrate_series};
use crate::enums::{BodyPart, SortBy};
use crate::geometry::{GeometryError, GeometryTransform};
use crate::volume::{Dimensions, VolumeDataset, VolumeError};

use dicom::{
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::PixelDecoder,
};
use dicom_dictionary_std::tags;
use log::{debug, warn};
use nalgebra::{Point3, Vector3};
use std::{fs, path::Path};
use thiserror::Error;

/// Relative deviation between slice steps tolerated before warning.
const SPACING_TOLERANCE: f64 = 0.01;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Pixel data holds {actual} bytes, expected {expected} for one frame")]
    IncompleteFrame { expected: usize, actual: usize },

    #[error("Missing attribute: {0}")]
    MissingAttribute(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error("Calibration error: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),
}

/// A calibrated series together with its patient geometry.
#[derive(Clone, Debug)]
pub struct LoadedSeries {
    pub dataset: VolumeDataset,
    pub transform: GeometryTransform,
    pub header: SeriesHeader,
}

struct DecodedSlice<'a> {
    object: &'a FileDicomObject<InMemDicomObject>,
    order: Option<f64>,
    rows: u32,
    columns: u32,
    pixels: Vec<u8>,
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Load a series from DICOM objects
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Slice of DICOM file objects
    /// * `sort_by` - Method to sort the slices
    /// * `options` - Clamp bounds for the HU calibration
    ///
    /// # Errors
    ///
    /// Returns error if no valid images are found, dimensions are inconsistent,
    /// the bit depth is not 16 or the orientation is degenerate
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
        options: CalibrationOptions,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let first = dicom_objects.first().ok_or(VolumeLoaderError::NoValidImages)?;
        let (row_cosines, col_cosines) = Self::get_orientation(first);
        let normal = row_cosines
            .cross(&col_cosines)
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::z);

        let mut slices = dicom_objects
            .iter()
            .filter_map(|dicom_object| {
                Self::extract_slice(dicom_object, &sort_by, &normal).transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::sort_slices(&mut slices, &sort_by);
        Self::align_with_normal(&mut slices, &normal);
        Self::validate_dimensions(&slices)?;

        let header = Self::build_header(&slices, row_cosines, col_cosines, &normal)?;
        let bytes: Vec<u8> = slices
            .iter()
            .flat_map(|slice| slice.pixels.iter().copied())
            .collect();

        let calibration = calibrate_series(&header, &bytes, options)?;
        let dataset =
            VolumeDataset::from_calibration(calibration, header.dimensions, header.spacing)?;
        let transform = GeometryTransform::from_header(&header)?;

        debug!(
            "Loaded series {:?}: {} slices, range {:?}",
            header.series_description,
            header.dimensions.z,
            dataset.intensity_range()
        );

        Ok(LoadedSeries {
            dataset,
            transform,
            header,
        })
    }

    /// Load a series from file paths
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path>],
        sort_by: SortBy,
        options: CalibrationOptions,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let objects: Result<Vec<_>, _> =
            paths.iter().map(|path| open_file(path.as_ref())).collect();

        Self::load_from_dicom_objects(&objects?, sort_by, options)
    }

    /// Load a series from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
        options: CalibrationOptions,
    ) -> Result<LoadedSeries, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by, options)
    }

    /// Load a built-in dataset from its raw little-endian i16 voxel file
    pub fn load_preset(
        part: BodyPart,
        path: impl AsRef<Path>,
    ) -> Result<VolumeDataset, VolumeLoaderError> {
        let bytes = fs::read(path.as_ref())?;
        let dataset = VolumeDataset::from_preset(part, &bytes)?;
        debug!("Loaded preset {} from {}", part.name(), path.as_ref().display());
        Ok(dataset)
    }

    /// Decodes the first frame of one object. Slices without a sort key or
    /// with undecodable pixel data are skipped with a warning; a bit depth
    /// other than 16 or a truncated frame fails the whole series.
    fn extract_slice<'a>(
        dicom_object: &'a FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        normal: &Vector3<f64>,
    ) -> Result<Option<DecodedSlice<'a>>, VolumeLoaderError> {
        let bits_allocated = Self::get_int(dicom_object, tags::BITS_ALLOCATED)
            .ok_or(VolumeLoaderError::MissingAttribute("BitsAllocated"))?;
        if bits_allocated != 16 {
            let bits_allocated = u16::try_from(bits_allocated).unwrap_or(u16::MAX);
            return Err(CalibrationError::UnsupportedBitDepth(bits_allocated).into());
        }
        let rows = Self::get_int(dicom_object, tags::ROWS)
            .ok_or(VolumeLoaderError::MissingAttribute("Rows"))?;
        let columns = Self::get_int(dicom_object, tags::COLUMNS)
            .ok_or(VolumeLoaderError::MissingAttribute("Columns"))?;

        let Some(order) = Self::get_sort_order(dicom_object, sort_by, normal) else {
            warn!("Skipping slice without a sort key");
            return Ok(None);
        };

        let decoded = match dicom_object.decode_pixel_data() {
            Ok(decoded) => decoded,
            Err(error) => {
                warn!("Skipping slice with undecodable pixel data: {error}");
                return Ok(None);
            }
        };
        let frame_len = rows as usize * columns as usize * 2;
        let pixels = decoded
            .data()
            .get(..frame_len)
            .ok_or(VolumeLoaderError::IncompleteFrame {
                expected: frame_len,
                actual: decoded.data().len(),
            })?
            .to_vec();

        Ok(Some(DecodedSlice {
            object: dicom_object,
            order,
            rows,
            columns,
            pixels,
        }))
    }

    fn get_sort_order(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        sort_by: &SortBy,
        normal: &Vector3<f64>,
    ) -> Option<Option<f64>> {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let position = Self::get_position(dicom_object)?;
                Some(Some(position.coords.dot(normal)))
            }
            SortBy::TablePosition => {
                let pos = dicom_object
                    .element(tags::TABLE_POSITION)
                    .ok()?
                    .to_float64()
                    .ok();
                Some(pos)
            }
            SortBy::InstanceNumber => {
                let num = dicom_object
                    .element(tags::INSTANCE_NUMBER)
                    .ok()?
                    .to_int::<i32>()
                    .ok()
                    .map(|n| n as f64);
                Some(num)
            }
            SortBy::None => Some(Some(0.0)),
        }
    }

    fn sort_slices(slices: &mut [DecodedSlice<'_>], sort_by: &SortBy) {
        if !matches!(sort_by, SortBy::None) {
            slices.sort_by(|a, b| {
                a.order
                    .partial_cmp(&b.order)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }

    /// Reverses the stack when it runs against `row × col`, so that voxel k
    /// lies at `ipp0 + k·Δz·normal` whatever the sort key was.
    fn align_with_normal(slices: &mut [DecodedSlice<'_>], normal: &Vector3<f64>) {
        let step = match slices {
            [first, .., last] => Self::get_position(first.object)
                .zip(Self::get_position(last.object))
                .map(|(first, last)| (last - first).dot(normal)),
            _ => None,
        };
        if step.is_some_and(|step| step < 0.0) {
            debug!("Slices run against the slice normal, reversing {} slices", slices.len());
            slices.reverse();
        }
    }

    fn validate_dimensions(slices: &[DecodedSlice<'_>]) -> Result<(), VolumeLoaderError> {
        let first = (slices[0].rows, slices[0].columns);
        if slices.iter().any(|slice| (slice.rows, slice.columns) != first) {
            return Err(VolumeLoaderError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_header(
        slices: &[DecodedSlice<'_>],
        row_cosines: Vector3<f64>,
        col_cosines: Vector3<f64>,
        normal: &Vector3<f64>,
    ) -> Result<SeriesHeader, VolumeLoaderError> {
        let first = slices[0].object;
        let dimensions = Dimensions::new(slices[0].columns, slices[0].rows, slices.len() as u32);

        let pixel_spacing = first
            .element(tags::PIXEL_SPACING)
            .ok()
            .and_then(|element| element.to_multi_float64().ok())
            .filter(|spacing| spacing.len() >= 2)
            .ok_or(VolumeLoaderError::MissingAttribute("PixelSpacing"))?;

        let image_position = Self::get_position(first).unwrap_or_else(|| {
            warn!("Missing ImagePositionPatient, placing the first voxel at the origin");
            Point3::origin()
        });
        let slice_spacing = Self::get_slice_spacing(slices, normal)
            .ok_or(VolumeLoaderError::MissingAttribute("SliceThickness"))?;
        Self::check_even_spacing(slices, normal, slice_spacing);

        let rescale_slope = Self::get_float(first, tags::RESCALE_SLOPE).unwrap_or(1.0);
        let rescale_intercept = Self::get_float(first, tags::RESCALE_INTERCEPT).unwrap_or(0.0);
        let signed = Self::get_int(first, tags::PIXEL_REPRESENTATION).unwrap_or(0) == 1;
        let series_description = first
            .element(tags::SERIES_DESCRIPTION)
            .ok()
            .and_then(|element| element.to_str().ok())
            .map(|description| description.trim().to_string())
            .unwrap_or_default();

        Ok(SeriesHeader {
            dimensions,
            // PixelSpacing is (row spacing, column spacing), i.e. (y, x)
            spacing: Vector3::new(pixel_spacing[1], pixel_spacing[0], slice_spacing),
            row_cosines,
            col_cosines,
            image_position,
            rescale_slope,
            rescale_intercept,
            signed,
            bits_allocated: 16,
            series_description,
        })
    }

    /// Distance between the first two slice positions along the normal,
    /// falling back to SliceThickness / SpacingBetweenSlices. The stack is
    /// already aligned with the normal, so the step is positive.
    fn get_slice_spacing(slices: &[DecodedSlice<'_>], normal: &Vector3<f64>) -> Option<f64> {
        let from_positions = match slices {
            [first, second, ..] => {
                let a = Self::get_position(first.object)?;
                let b = Self::get_position(second.object)?;
                Some((b - a).dot(normal))
            }
            _ => None,
        }
        .filter(|spacing| *spacing > f64::EPSILON);

        let first = slices[0].object;
        from_positions
            .or_else(|| Self::get_float(first, tags::SLICE_THICKNESS))
            .or_else(|| Self::get_float(first, tags::SPACING_BETWEEN_SLICES))
            .filter(|spacing| *spacing > 0.0)
    }

    fn check_even_spacing(slices: &[DecodedSlice<'_>], normal: &Vector3<f64>, spacing: f64) {
        let positions: Vec<_> = slices
            .iter()
            .filter_map(|slice| Self::get_position(slice.object))
            .collect();
        let uneven = positions
            .windows(2)
            .map(|pair| (pair[1] - pair[0]).dot(normal))
            .find(|step| (step - spacing).abs() > SPACING_TOLERANCE * spacing);
        if let Some(step) = uneven {
            warn!("Uneven slice spacing: step of {step} mm in a series spaced {spacing} mm");
        }
    }

    fn get_orientation(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let cosines = dicom_object
            .element(tags::IMAGE_ORIENTATION_PATIENT)
            .ok()
            .and_then(|element| element.to_multi_float64().ok())
            .filter(|values| values.len() >= 6);
        match cosines {
            Some(v) => (
                Vector3::new(v[0], v[1], v[2]),
                Vector3::new(v[3], v[4], v[5]),
            ),
            None => {
                warn!("Missing ImageOrientationPatient, assuming an axial acquisition");
                (Vector3::x(), Vector3::y())
            }
        }
    }

    fn get_position(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<Point3<f64>> {
        let pos = dicom_object
            .element(tags::IMAGE_POSITION_PATIENT)
            .ok()?
            .to_multi_float64()
            .ok()?;
        (pos.len() >= 3).then(|| Point3::new(pos[0], pos[1], pos[2]))
    }

    fn get_float(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    fn get_int(
        dicom_object: &FileDicomObject<InMemDicomObject>,
        tag: dicom::core::Tag,
    ) -> Option<u32> {
        dicom_object.element(tag).ok()?.to_int::<u32>().ok()
    }
}
