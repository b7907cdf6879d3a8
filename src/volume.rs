use crate::calibration::{CLAMP_MAX, CLAMP_MIN, Calibration};
use crate::enums::{Axis, BodyPart, PixelFormat};

use nalgebra::Vector3;
use ndarray::Array3;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("Volume dimensions must all be greater than zero")]
    EmptyDimensions,

    #[error("Voxel spacing must be finite and greater than zero")]
    InvalidSpacing,

    #[error("Voxel buffer holds {actual} bytes, expected {expected}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Voxel counts along (x, y, z) = (columns, rows, slices).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dimensions {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Dimensions {
    pub const fn new(x: u32, y: u32, z: u32) -> Self {
        Self { x, y, z }
    }

    pub fn along(&self, axis: Axis) -> u32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.x as usize * self.y as usize * self.z as usize
    }

    pub fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0
    }

    /// ndarray shape (depth, height, width), which lays voxels out with x
    /// varying fastest.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.z as usize, self.y as usize, self.x as usize)
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x as f64, self.y as f64, self.z as f64)
    }

    /// Linear index of voxel (i, j, k).
    pub fn linear_index(&self, i: u32, j: u32, k: u32) -> usize {
        i as usize + j as usize * self.x as usize + k as usize * self.x as usize * self.y as usize
    }
}

/// Closed interval of intensity values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntensityRange {
    pub min: i32,
    pub max: i32,
}

impl IntensityRange {
    pub const HOUNSFIELD: IntensityRange = IntensityRange {
        min: CLAMP_MIN,
        max: CLAMP_MAX,
    };

    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn width(&self) -> i64 {
        self.max as i64 - self.min as i64
    }
}

/// Typed voxel storage. The variant fixes the pixel format.
#[derive(Clone, Debug, PartialEq)]
pub enum VoxelBuffer {
    Int16(Array3<i16>),
    UInt16(Array3<u16>),
}

impl VoxelBuffer {
    pub fn pixel_format(&self) -> PixelFormat {
        match self {
            VoxelBuffer::Int16(_) => PixelFormat::Int16Signed,
            VoxelBuffer::UInt16(_) => PixelFormat::Int16Unsigned,
        }
    }

    /// (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            VoxelBuffer::Int16(data) => data.dim(),
            VoxelBuffer::UInt16(data) => data.dim(),
        }
    }

    /// Value at voxel (i, j, k) widened to i32.
    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> i32 {
        match self {
            VoxelBuffer::Int16(data) => data[[k, j, i]] as i32,
            VoxelBuffer::UInt16(data) => data[[k, j, i]] as i32,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        // Arrays are always built in standard layout by the constructors below.
        match self {
            VoxelBuffer::Int16(data) => data
                .as_slice()
                .map(bytemuck::cast_slice::<i16, u8>)
                .unwrap_or_default(),
            VoxelBuffer::UInt16(data) => data
                .as_slice()
                .map(bytemuck::cast_slice::<u16, u8>)
                .unwrap_or_default(),
        }
    }
}

/// Calibrated voxel buffer plus the metadata needed to sample it.
///
/// Immutable once built; a new series replaces the whole value.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeDataset {
    data: VoxelBuffer,
    dimensions: Dimensions,
    spacing: Vector3<f64>,
    intensity_range: IntensityRange,
}

impl VolumeDataset {
    /// Builds a dataset from voxels stored x-fastest.
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is zero, a spacing is not positive, or
    /// the buffer length does not match the voxel count.
    pub fn new(
        data: VoxelBuffer,
        spacing: Vector3<f64>,
        intensity_range: Option<IntensityRange>,
    ) -> Result<Self, VolumeError> {
        let (depth, height, width) = data.dim();
        let dimensions = Dimensions::new(width as u32, height as u32, depth as u32);
        if dimensions.is_empty() {
            return Err(VolumeError::EmptyDimensions);
        }
        if !spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(VolumeError::InvalidSpacing);
        }
        let data = match data {
            VoxelBuffer::Int16(data) => VoxelBuffer::Int16(data.as_standard_layout().into_owned()),
            VoxelBuffer::UInt16(data) => {
                VoxelBuffer::UInt16(data.as_standard_layout().into_owned())
            }
        };
        let intensity_range = intensity_range.unwrap_or_else(|| {
            let (min, max) = data.pixel_format().default_intensity_range();
            IntensityRange::new(min, max)
        });
        Ok(Self {
            data,
            dimensions,
            spacing,
            intensity_range,
        })
    }

    pub fn from_calibration(
        calibration: Calibration,
        dimensions: Dimensions,
        spacing: Vector3<f64>,
    ) -> Result<Self, VolumeError> {
        if dimensions.is_empty() {
            return Err(VolumeError::EmptyDimensions);
        }
        let expected = dimensions.voxel_count();
        if calibration.data.len() != expected {
            return Err(VolumeError::BufferSizeMismatch {
                expected: expected * 2,
                actual: calibration.data.len() * 2,
            });
        }
        let array = Array3::from_shape_vec(dimensions.shape(), calibration.data)?;
        Self::new(VoxelBuffer::Int16(array), spacing, Some(calibration.range))
    }

    /// Builds a dataset from a little-endian 16-bit buffer.
    pub fn from_raw_bytes(
        bytes: &[u8],
        dimensions: Dimensions,
        spacing: Vector3<f64>,
        pixel_format: PixelFormat,
        intensity_range: Option<IntensityRange>,
    ) -> Result<Self, VolumeError> {
        if dimensions.is_empty() {
            return Err(VolumeError::EmptyDimensions);
        }
        let expected = dimensions.voxel_count() * pixel_format.bytes_per_voxel();
        if bytes.len() != expected {
            return Err(VolumeError::BufferSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let pairs = bytes.chunks_exact(2).map(|pair| [pair[0], pair[1]]);
        let data = match pixel_format {
            PixelFormat::Int16Signed => VoxelBuffer::Int16(Array3::from_shape_vec(
                dimensions.shape(),
                pairs.map(i16::from_le_bytes).collect(),
            )?),
            PixelFormat::Int16Unsigned => VoxelBuffer::UInt16(Array3::from_shape_vec(
                dimensions.shape(),
                pairs.map(u16::from_le_bytes).collect(),
            )?),
        };
        Self::new(data, spacing, intensity_range)
    }

    /// Builds one of the built-in demo datasets from its raw voxel file.
    pub fn from_preset(part: BodyPart, bytes: &[u8]) -> Result<Self, VolumeError> {
        let preset = Preset::of(part);
        Self::from_raw_bytes(
            bytes,
            preset.dimensions,
            preset.spacing,
            PixelFormat::Int16Signed,
            Some(IntensityRange::HOUNSFIELD),
        )
    }

    /// A 1×1×1 dataset so that renderers always have something to bind.
    pub fn placeholder() -> Self {
        Self {
            data: VoxelBuffer::Int16(Array3::zeros((1, 1, 1))),
            dimensions: Dimensions::new(1, 1, 1),
            spacing: Vector3::new(1.0, 1.0, 1.0),
            intensity_range: IntensityRange::HOUNSFIELD,
        }
    }

    pub fn data(&self) -> &VoxelBuffer {
        &self.data
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn spacing(&self) -> Vector3<f64> {
        self.spacing
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.data.pixel_format()
    }

    pub fn intensity_range(&self) -> IntensityRange {
        self.intensity_range
    }

    pub fn voxel_count(&self) -> usize {
        self.dimensions.voxel_count()
    }

    /// Physical extent of the volume (spacing × dimensions).
    pub fn scale(&self) -> Vector3<f64> {
        self.spacing.component_mul(&self.dimensions.to_vector())
    }

    /// Raw bytes in upload order (x fastest, then y, then z).
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn texture_format(&self) -> wgpu::TextureFormat {
        self.pixel_format().texture_format()
    }

    pub fn texture_extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.dimensions.x,
            height: self.dimensions.y,
            depth_or_array_layers: self.dimensions.z,
        }
    }

    /// Bytes per row and per image for a 3D texture upload.
    pub fn texel_layout(&self) -> (u32, u32) {
        let bytes_per_row = self.pixel_format().bytes_per_voxel() as u32 * self.dimensions.x;
        (bytes_per_row, bytes_per_row * self.dimensions.y)
    }
}

/// Geometry of a built-in dataset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Preset {
    pub dimensions: Dimensions,
    /// Millimetres per voxel.
    pub spacing: Vector3<f64>,
}

impl Preset {
    pub fn of(part: BodyPart) -> Self {
        match part {
            BodyPart::Head => Self {
                dimensions: Dimensions::new(512, 512, 511),
                spacing: Vector3::new(0.449, 0.449, 0.501),
            },
            BodyPart::Chest => Self {
                dimensions: Dimensions::new(512, 512, 179),
                spacing: Vector3::new(0.586, 0.586, 2.0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ObservedRange;

    #[test]
    fn byte_length_matches_voxel_count() {
        let dimensions = Dimensions::new(3, 2, 4);
        let bytes = vec![0u8; dimensions.voxel_count() * 2];
        let dataset = VolumeDataset::from_raw_bytes(
            &bytes,
            dimensions,
            Vector3::new(1.0, 1.0, 1.0),
            PixelFormat::Int16Unsigned,
            None,
        )
        .unwrap();
        assert_eq!(dataset.as_bytes().len(), 24 * 2);
        assert_eq!(dataset.intensity_range(), IntensityRange::new(0, 65535));
        assert_eq!(dataset.texture_format(), wgpu::TextureFormat::R16Uint);
    }

    #[test]
    fn x_varies_fastest() {
        let dimensions = Dimensions::new(3, 2, 2);
        let bytes: Vec<u8> = (0..12i16).flat_map(|v| v.to_le_bytes()).collect();
        let dataset = VolumeDataset::from_raw_bytes(
            &bytes,
            dimensions,
            Vector3::new(1.0, 1.0, 1.0),
            PixelFormat::Int16Signed,
            None,
        )
        .unwrap();
        assert_eq!(dataset.data().get(1, 0, 0), 1);
        assert_eq!(dataset.data().get(0, 1, 0), 3);
        assert_eq!(dataset.data().get(2, 1, 1), 11);
        assert_eq!(dimensions.linear_index(2, 1, 1), 11);
        assert_eq!(&dataset.as_bytes()[..4], &bytes[..4]);
    }

    #[test]
    fn rejects_empty_dimensions() {
        let result = VolumeDataset::from_raw_bytes(
            &[],
            Dimensions::new(0, 4, 4),
            Vector3::new(1.0, 1.0, 1.0),
            PixelFormat::Int16Signed,
            None,
        );
        assert!(matches!(result, Err(VolumeError::EmptyDimensions)));
    }

    #[test]
    fn rejects_wrong_buffer_length() {
        let result = VolumeDataset::from_raw_bytes(
            &[0; 10],
            Dimensions::new(2, 2, 2),
            Vector3::new(1.0, 1.0, 1.0),
            PixelFormat::Int16Signed,
            None,
        );
        assert!(matches!(
            result,
            Err(VolumeError::BufferSizeMismatch {
                expected: 16,
                actual: 10
            })
        ));
    }

    #[test]
    fn rejects_non_positive_spacing() {
        let result = VolumeDataset::new(
            VoxelBuffer::Int16(Array3::zeros((1, 1, 1))),
            Vector3::new(1.0, 0.0, 1.0),
            None,
        );
        assert!(matches!(result, Err(VolumeError::InvalidSpacing)));
    }

    #[test]
    fn placeholder_is_valid() {
        let dataset = VolumeDataset::placeholder();
        assert_eq!(dataset.dimensions(), Dimensions::new(1, 1, 1));
        assert_eq!(dataset.intensity_range(), IntensityRange::HOUNSFIELD);
        assert_eq!(dataset.as_bytes().len(), 2);
    }

    #[test]
    fn from_calibration_keeps_range() {
        let calibration = Calibration {
            data: vec![-1024, 0, 100, 3071],
            range: IntensityRange::new(-1024, 3071),
            observed: Some(ObservedRange {
                min: -1024,
                max: 4000,
            }),
        };
        let dataset = VolumeDataset::from_calibration(
            calibration,
            Dimensions::new(2, 2, 1),
            Vector3::new(0.5, 0.5, 1.0),
        )
        .unwrap();
        assert_eq!(dataset.intensity_range(), IntensityRange::new(-1024, 3071));
        assert_eq!(dataset.data().get(0, 1, 0), 100);
        assert_eq!(dataset.scale(), Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(dataset.texel_layout(), (4, 8));
    }

    #[test]
    fn preset_geometry() {
        let head = Preset::of(BodyPart::Head);
        assert_eq!(head.dimensions, Dimensions::new(512, 512, 511));
        let chest = Preset::of(BodyPart::Chest);
        assert_eq!(chest.dimensions, Dimensions::new(512, 512, 179));
        assert_eq!(chest.spacing.z, 2.0);
    }
}
