//! Codec-level image metadata: CICP codes, sampling, range and transform properties

/// Chroma subsampling format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaSampling {
    /// 4:2:0 - chroma is half resolution in both dimensions
    Cs420,
    /// 4:2:2 - chroma is half resolution horizontally
    Cs422,
    /// 4:4:4 - no chroma subsampling
    Cs444,
    /// Monochrome (no chroma)
    Monochrome,
}

impl ChromaSampling {
    /// Chroma plane dimensions for a luma plane of the given size, or `None` for monochrome
    pub fn chroma_size(self, width: usize, height: usize) -> Option<(usize, usize)> {
        match self {
            ChromaSampling::Cs420 => Some((width.div_ceil(2), height.div_ceil(2))),
            ChromaSampling::Cs422 => Some((width.div_ceil(2), height)),
            ChromaSampling::Cs444 => Some((width, height)),
            ChromaSampling::Monochrome => None,
        }
    }
}

/// Color primaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColorPrimaries(pub u8);

impl ColorPrimaries {
    pub const UNKNOWN_0: Self = Self(0);
    pub const BT709: Self = Self(1);
    pub const UNSPECIFIED: Self = Self(2);
    pub const BT470M: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const FILM: Self = Self(8);
    pub const BT2020: Self = Self(9);
    pub const XYZ: Self = Self(10);
    pub const SMPTE431: Self = Self(11);
    pub const SMPTE432: Self = Self(12);
    pub const EBU3213: Self = Self(22);
}

/// Transfer characteristics (gamma curve)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TransferCharacteristics(pub u8);

impl TransferCharacteristics {
    pub const UNKNOWN_0: Self = Self(0);
    pub const BT709: Self = Self(1);
    pub const UNSPECIFIED: Self = Self(2);
    pub const BT470M: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const LINEAR: Self = Self(8);
    pub const LOG100: Self = Self(9);
    pub const LOG100_SQRT10: Self = Self(10);
    pub const IEC61966: Self = Self(11);
    pub const BT1361: Self = Self(12);
    pub const SRGB: Self = Self(13);
    pub const BT2020_10BIT: Self = Self(14);
    pub const BT2020_12BIT: Self = Self(15);
    pub const SMPTE2084: Self = Self(16);
    pub const SMPTE428: Self = Self(17);
    pub const HLG: Self = Self(18);
}

/// Matrix coefficients for YUV to RGB conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MatrixCoefficients(pub u8);

impl MatrixCoefficients {
    pub const IDENTITY: Self = Self(0);
    pub const BT709: Self = Self(1);
    pub const UNSPECIFIED: Self = Self(2);
    pub const FCC: Self = Self(4);
    pub const BT470BG: Self = Self(5);
    pub const BT601: Self = Self(6);
    pub const SMPTE240: Self = Self(7);
    pub const YCGCO: Self = Self(8);
    pub const BT2020_NCL: Self = Self(9);
    pub const BT2020_CL: Self = Self(10);
    pub const SMPTE2085: Self = Self(11);
    pub const CHROMAT_NCL: Self = Self(12);
    pub const CHROMAT_CL: Self = Self(13);
    pub const ICTCP: Self = Self(14);
}

/// Color range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    /// Limited/studio range (Y: 16-235, UV: 16-240 for 8-bit)
    #[default]
    Limited,
    /// Full range (0-255 for 8-bit)
    Full,
}

/// Clean aperture box (`clap`): a centered crop expressed as rationals.
///
/// Offsets are relative to the image center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanAperture {
    pub width_n: u32,
    pub width_d: u32,
    pub height_n: u32,
    pub height_d: u32,
    pub horiz_off_n: i32,
    pub horiz_off_d: u32,
    pub vert_off_n: i32,
    pub vert_off_d: u32,
}

/// Image rotation property (`irot`): anti-clockwise quarter turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageRotation(pub u8);

/// Image mirror property (`imir`).
///
/// Axis 0 mirrors top-to-bottom (vertical flip), axis 1 mirrors left-to-right
/// (horizontal flip).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMirror(pub u8);

/// Transformative item properties attached to a frame, applied in declaration
/// order: crop, rotate, mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Transforms {
    pub clean_aperture: Option<CleanAperture>,
    pub rotation: Option<ImageRotation>,
    pub mirror: Option<ImageMirror>,
}

impl Transforms {
    pub fn is_empty(&self) -> bool {
        self.clean_aperture.is_none() && self.rotation.is_none() && self.mirror.is_none()
    }
}
