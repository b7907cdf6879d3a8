//! Conversion of raw 16-bit pixel samples to Hounsfield Units.
//!
//! The calibrator tracks the real extent of the data before clamping, so the
//! reported [`IntensityRange`] reflects what is actually present while storage
//! never leaves the configured bounds.

use crate::volume::{Dimensions, IntensityRange};

use log::debug;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use thiserror::Error;
use web_time::Instant;

pub const CLAMP_MIN: i32 = -1024;
pub const CLAMP_MAX: i32 = 3071;

/// Voxels handled per rayon task.
const CHUNK_LEN: usize = 1 << 16;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Unsupported bit depth: {0} (only 16 bits allocated is supported)")]
    UnsupportedBitDepth(u16),

    #[error("Volume dimensions must all be greater than zero")]
    EmptyDimensions,

    #[error("Voxel spacing must be finite and greater than zero")]
    InvalidSpacing,

    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Invalid clamp bounds [{min}, {max}]")]
    InvalidClampBounds { min: i32, max: i32 },
}

/// Clamp bounds applied to calibrated values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalibrationOptions {
    pub clamp_min: i32,
    pub clamp_max: i32,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            clamp_min: CLAMP_MIN,
            clamp_max: CLAMP_MAX,
        }
    }
}

impl CalibrationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clamp(mut self, min: i32, max: i32) -> Self {
        self.clamp_min = min;
        self.clamp_max = max;
        self
    }

    pub fn bounds(&self) -> IntensityRange {
        IntensityRange::new(self.clamp_min, self.clamp_max)
    }

    fn validate(&self) -> Result<(), CalibrationError> {
        if self.clamp_min > self.clamp_max {
            return Err(CalibrationError::InvalidClampBounds {
                min: self.clamp_min,
                max: self.clamp_max,
            });
        }
        Ok(())
    }
}

/// Header fields handed over by the DICOM decoding collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct SeriesHeader {
    pub dimensions: Dimensions,
    /// Millimetres per voxel along (x, y, z).
    pub spacing: Vector3<f64>,
    pub row_cosines: Vector3<f64>,
    pub col_cosines: Vector3<f64>,
    /// Image Position (Patient) of the first slice, in millimetres.
    pub image_position: Point3<f64>,
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    pub signed: bool,
    pub bits_allocated: u16,
    pub series_description: String,
}

impl SeriesHeader {
    /// Rejects headers the calibrator cannot process.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        if self.bits_allocated != 16 {
            return Err(CalibrationError::UnsupportedBitDepth(self.bits_allocated));
        }
        if self.dimensions.is_empty() {
            return Err(CalibrationError::EmptyDimensions);
        }
        if !self.spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(CalibrationError::InvalidSpacing);
        }
        Ok(())
    }

    pub fn expected_byte_len(&self) -> usize {
        self.dimensions.voxel_count() * 2
    }
}

/// Decoded raw samples, before calibration.
#[derive(Clone, Debug, PartialEq)]
pub enum RawPixels {
    Signed(Vec<i16>),
    Unsigned(Vec<u16>),
}

impl RawPixels {
    /// Decodes a little-endian 16-bit buffer. A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8], signed: bool) -> Self {
        let pairs = bytes.chunks_exact(2).map(|pair| [pair[0], pair[1]]);
        if signed {
            RawPixels::Signed(pairs.map(i16::from_le_bytes).collect())
        } else {
            RawPixels::Unsigned(pairs.map(u16::from_le_bytes).collect())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RawPixels::Signed(values) => values.len(),
            RawPixels::Unsigned(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Running min/max of pre-clamp HU values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObservedRange {
    pub min: i32,
    pub max: i32,
}

impl ObservedRange {
    pub const EMPTY: ObservedRange = ObservedRange {
        min: i32::MAX,
        max: i32::MIN,
    };

    #[inline]
    pub fn observe(&mut self, value: i32) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(self, other: ObservedRange) -> ObservedRange {
        ObservedRange {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Intersects the observed extent with the clamp bounds. Falls back to
    /// the bounds themselves when nothing was observed.
    pub fn reported(&self, bounds: IntensityRange) -> IntensityRange {
        if self.is_empty() {
            return bounds;
        }
        IntensityRange::new(self.min.max(bounds.min), self.max.min(bounds.max))
    }
}

/// Output of a calibration pass.
#[derive(Clone, Debug, PartialEq)]
pub struct Calibration {
    pub data: Vec<i16>,
    pub range: IntensityRange,
    /// Pre-clamp extent, `None` when no voxel was processed.
    pub observed: Option<ObservedRange>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HuCalibrator {
    slope: f64,
    intercept: f64,
    options: CalibrationOptions,
}

impl HuCalibrator {
    /// A zero slope is treated as 1.
    pub fn new(
        slope: f64,
        intercept: f64,
        options: CalibrationOptions,
    ) -> Result<Self, CalibrationError> {
        options.validate()?;
        let slope = if slope == 0.0 { 1.0 } else { slope };
        Ok(Self {
            slope,
            intercept,
            options,
        })
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn options(&self) -> CalibrationOptions {
        self.options
    }

    /// Unclamped HU value, rounded half away from zero.
    #[inline]
    pub fn hu(&self, raw: i32) -> i32 {
        (raw as f64).mul_add(self.slope, self.intercept).round() as i32
    }

    /// Stored representation of an HU value.
    #[inline]
    pub fn clamp(&self, hu: i32) -> i16 {
        hu.clamp(self.options.clamp_min, self.options.clamp_max)
            .clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    pub fn calibrate(&self, raw: &RawPixels) -> Calibration {
        let start = Instant::now();
        let (data, observed) = match raw {
            RawPixels::Signed(values) => self.convert(values),
            RawPixels::Unsigned(values) => self.convert(values),
        };
        let range = observed.reported(self.options.bounds());
        debug!(
            "Calibrated {} voxels in {:?}: observed {:?}, range {}..={}, slope {}, intercept {}",
            data.len(),
            start.elapsed(),
            observed,
            range.min,
            range.max,
            self.slope,
            self.intercept
        );
        Calibration {
            data,
            range,
            observed: (!observed.is_empty()).then_some(observed),
        }
    }

    fn convert<T>(&self, source: &[T]) -> (Vec<i16>, ObservedRange)
    where
        T: Copy + Into<i32> + Sync,
    {
        let mut data = vec![0i16; source.len()];
        let observed = data
            .par_chunks_mut(CHUNK_LEN)
            .zip(source.par_chunks(CHUNK_LEN))
            .map(|(dest, src)| self.convert_chunk(src, dest))
            .reduce(|| ObservedRange::EMPTY, ObservedRange::merge);
        (data, observed)
    }

    fn convert_chunk<T>(&self, src: &[T], dest: &mut [i16]) -> ObservedRange
    where
        T: Copy + Into<i32>,
    {
        let mut observed = ObservedRange::EMPTY;
        for (out, &value) in dest.iter_mut().zip(src) {
            let hu = self.hu(value.into());
            observed.observe(hu);
            *out = self.clamp(hu);
        }
        observed
    }
}

/// Validates the header, decodes the buffer and calibrates it.
pub fn calibrate_series(
    header: &SeriesHeader,
    bytes: &[u8],
    options: CalibrationOptions,
) -> Result<Calibration, CalibrationError> {
    header.validate()?;
    let expected = header.expected_byte_len();
    if bytes.len() != expected {
        return Err(CalibrationError::BufferSizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    let raw = RawPixels::from_le_bytes(bytes, header.signed);
    let calibrator = HuCalibrator::new(header.rescale_slope, header.rescale_intercept, options)?;
    Ok(calibrator.calibrate(&raw))
}
