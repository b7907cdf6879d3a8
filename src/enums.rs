/// Canonical viewing planes. Each one is named after the plane it shows, and
/// is orthogonal to [`Orientation::normal_axis`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// Axis the plane is orthogonal to.
    pub fn normal_axis(self) -> Axis {
        match self {
            Orientation::Axial => Axis::Z,
            Orientation::Coronal => Axis::Y,
            Orientation::Sagittal => Axis::X,
        }
    }

    /// The two in-plane axes as (u, v).
    pub fn in_plane_axes(self) -> (Axis, Axis) {
        match self {
            // Looking down Z: X is width, Y is height
            Orientation::Axial => (Axis::X, Axis::Y),
            // Looking down Y: X is width, Z is height
            Orientation::Coronal => (Axis::X, Axis::Z),
            // Looking down X: Y is width, Z is height
            Orientation::Sagittal => (Axis::Y, Axis::Z),
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Orientation::Axial => "Axial",
            Orientation::Coronal => "Coronal",
            Orientation::Sagittal => "Sagittal",
        }
    }
}

/// One of the three volume axes. Also used to address a column of the
/// navigator basis (x′, y′, z′).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// How samples inside a slab are combined. Values match the shader switch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Single = 0,
    MaximumIntensity = 1,
    MinimumIntensity = 2,
    Mean = 3,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFormat {
    #[default]
    Int16Signed,
    Int16Unsigned,
}

impl PixelFormat {
    pub fn bytes_per_voxel(self) -> usize {
        2
    }

    pub fn texture_format(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Int16Signed => wgpu::TextureFormat::R16Sint,
            PixelFormat::Int16Unsigned => wgpu::TextureFormat::R16Uint,
        }
    }

    /// Full native range, used when a dataset does not declare one.
    pub fn default_intensity_range(self) -> (i32, i32) {
        match self {
            PixelFormat::Int16Signed => (i16::MIN as i32, i16::MAX as i32),
            PixelFormat::Int16Unsigned => (u16::MIN as i32, u16::MAX as i32),
        }
    }
}

/// Built-in demo datasets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyPart {
    Head,
    Chest,
}

impl BodyPart {
    pub fn name(self) -> &'static str {
        match self {
            BodyPart::Head => "head",
            BodyPart::Chest => "chest",
        }
    }
}

#[derive(Default)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}
