//! CPU reference resampling of a plane into an 8-bit image.
//!
//! Mirrors what the MPR shader does per fragment: walk the plane, sample the
//! volume trilinearly, combine slab samples and map the HU window to grey
//! levels. Meant for previews, tests and headless export.

use crate::enums::BlendMode;
use crate::interpolator::Interpolator;
use crate::plane::MprPlane;
use crate::volume::{IntensityRange, VolumeDataset};

use image::{ImageBuffer, Luma};
use rayon::prelude::*;

pub struct Slicer<'a> {
    dataset: &'a VolumeDataset,
    window: IntensityRange,
}

impl<'a> Slicer<'a> {
    /// Uses the dataset's intensity range as the display window.
    pub fn new(dataset: &'a VolumeDataset) -> Self {
        Self {
            dataset,
            window: dataset.intensity_range(),
        }
    }

    pub fn with_window(mut self, window: IntensityRange) -> Self {
        self.window = window;
        self
    }

    /// Image size keeping the plane's physical aspect ratio.
    pub fn output_size(&self, plane: &MprPlane) -> (u32, u32) {
        Interpolator::plane_output_size(
            &plane.descriptor,
            self.dataset.dimensions(),
            self.dataset.spacing(),
        )
    }

    /// Combined slab value at plane coordinates (s, t), `None` when every
    /// sample falls outside the volume.
    pub fn sample(&self, plane: &MprPlane, s: f64, t: f64) -> Option<f32> {
        let center = plane.descriptor.point_at(s, t);
        let data = self.dataset.data();
        let dimensions = self.dataset.dimensions();

        let normal = match plane.descriptor.normal() {
            Some(normal) if !plane.slab.is_thin() && plane.slab.mode != BlendMode::Single => normal,
            _ => return Interpolator::trilinear_interpolate(data, dimensions, &center),
        };

        let samples = plane
            .slab
            .offsets()
            .filter_map(|offset| {
                let point = center + normal * offset;
                Interpolator::trilinear_interpolate(data, dimensions, &point)
            });
        combine(plane.slab.mode, samples)
    }

    /// Renders the plane at `width` × `height`. Row 0 is the top of the image,
    /// i.e. the far end of the plane's v axis.
    pub fn render(
        &self,
        plane: &MprPlane,
        width: u32,
        height: u32,
    ) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        if width == 0 || height == 0 {
            return None;
        }
        let pixel_data: Vec<u8> = (0..height)
            .into_par_iter()
            .flat_map(|y| {
                (0..width)
                    .map(|x| {
                        let s = (x as f64 + 0.5) / width as f64;
                        let t = 1.0 - (y as f64 + 0.5) / height as f64;
                        self.sample(plane, s, t)
                            .map(|value| self.to_grey(value))
                            .unwrap_or(0)
                    })
                    .collect::<Vec<u8>>()
            })
            .collect();

        ImageBuffer::from_raw(width, height, pixel_data)
    }

    /// Renders at [`Slicer::output_size`].
    pub fn render_isotropic(&self, plane: &MprPlane) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (width, height) = self.output_size(plane);
        self.render(plane, width, height)
    }

    #[inline]
    fn to_grey(&self, value: f32) -> u8 {
        let span = self.window.width().max(1) as f32;
        (((value - self.window.min as f32) / span) * 255.0)
            .round()
            .clamp(0.0, 255.0) as u8
    }
}

fn combine(mode: BlendMode, mut samples: impl Iterator<Item = f32>) -> Option<f32> {
    match mode {
        BlendMode::Single => samples.next(),
        BlendMode::MaximumIntensity => samples.reduce(f32::max),
        BlendMode::MinimumIntensity => samples.reduce(f32::min),
        BlendMode::Mean => {
            let (sum, count) = samples.fold((0.0f32, 0u32), |(sum, count), v| (sum + v, count + 1));
            (count > 0).then(|| sum / count as f32)
        }
    }
}
