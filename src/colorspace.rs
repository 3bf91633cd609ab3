//! Color space values attached to bitmaps
//!
//! A [`ColorSpace`] is either a valid set of primaries plus a transfer
//! function, or invalid. Either kind may carry the raw ICC profile it was
//! created from. Conversion between two valid spaces linearizes, maps through
//! CIE XYZ (with Bradford adaptation when white points differ), and re-encodes.

#![allow(clippy::excessive_precision)]

use crate::icc;

/// A CIE 1931 xy chromaticity coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticity {
    pub x: f64,
    pub y: f64,
}

impl Chromaticity {
    /// D65 white point
    pub const D65: Self = Self::new(0.3127, 0.3290);
    /// D50 white point (ICC profile connection space)
    pub const D50: Self = Self::new(0.3457, 0.3585);

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Normalize coordinates from untrusted metadata into valid chromaticity space.
    ///
    /// The result satisfies `x ∈ [0,1]`, `y ∈ [f64::MIN_POSITIVE, 1]` and `x + y ≤ 1`.
    pub fn compatible(x: f64, y: f64) -> Self {
        let y = if y.is_nan() {
            f64::MIN_POSITIVE
        } else {
            y.clamp(f64::MIN_POSITIVE, 1.0)
        };
        let mut x = if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        if x + y > 1.0 {
            x = 1.0 - y;
        }
        Self { x, y }
    }

    /// XYZ tristimulus with Y = 1
    pub(crate) fn to_xyz(self) -> [f64; 3] {
        [self.x / self.y, 1.0, (1.0 - self.x - self.y) / self.y]
    }

    pub(crate) fn from_xyz(xyz: [f64; 3]) -> Option<Self> {
        let sum = xyz[0] + xyz[1] + xyz[2];
        if !sum.is_finite() || sum.abs() < 1e-12 {
            return None;
        }
        Some(Self::new(xyz[0] / sum, xyz[1] / sum))
    }

    fn approx_eq(self, other: Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

/// The four chromaticity points that define an RGB gamut
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimaryPoints {
    pub white: Chromaticity,
    pub red: Chromaticity,
    pub green: Chromaticity,
    pub blue: Chromaticity,
}

impl PrimaryPoints {
    /// BT.709 / sRGB
    pub const SRGB: Self = Self {
        white: Chromaticity::D65,
        red: Chromaticity::new(0.64, 0.33),
        green: Chromaticity::new(0.30, 0.60),
        blue: Chromaticity::new(0.15, 0.06),
    };

    /// SMPTE EG 432-1 (DCI-P3 with D65 white)
    pub const DCI_P3_D65: Self = Self {
        white: Chromaticity::D65,
        red: Chromaticity::new(0.680, 0.320),
        green: Chromaticity::new(0.265, 0.690),
        blue: Chromaticity::new(0.150, 0.060),
    };

    fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.white.approx_eq(other.white, tolerance)
            && self.red.approx_eq(other.red, tolerance)
            && self.green.approx_eq(other.green, tolerance)
            && self.blue.approx_eq(other.blue, tolerance)
    }

    /// RGB → XYZ matrix for these primaries, or `None` when they are degenerate
    pub(crate) fn rgb_to_xyz(&self) -> Option<Matrix3> {
        let r = self.red.to_xyz();
        let g = self.green.to_xyz();
        let b = self.blue.to_xyz();
        let m = Matrix3([[r[0], g[0], b[0]], [r[1], g[1], b[1]], [r[2], g[2], b[2]]]);
        let s = m.inverse()?.transform(self.white.to_xyz());
        let scaled = Matrix3([
            [m.0[0][0] * s[0], m.0[0][1] * s[1], m.0[0][2] * s[2]],
            [m.0[1][0] * s[0], m.0[1][1] * s[1], m.0[1][2] * s[2]],
            [m.0[2][0] * s[0], m.0[2][1] * s[1], m.0[2][2] * s[2]],
        ]);
        scaled.is_finite().then_some(scaled)
    }
}

/// Named or custom color primaries
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primaries {
    Srgb,
    DciP3D65,
    Custom(PrimaryPoints),
}

impl Primaries {
    /// Build primaries from points, recognizing the named gamuts.
    pub fn from_points(points: PrimaryPoints) -> Self {
        const TOLERANCE: f64 = 0.0015;
        if points.approx_eq(&PrimaryPoints::SRGB, TOLERANCE) {
            Primaries::Srgb
        } else if points.approx_eq(&PrimaryPoints::DCI_P3_D65, TOLERANCE) {
            Primaries::DciP3D65
        } else {
            Primaries::Custom(points)
        }
    }

    pub fn points(&self) -> PrimaryPoints {
        match self {
            Primaries::Srgb => PrimaryPoints::SRGB,
            Primaries::DciP3D65 => PrimaryPoints::DCI_P3_D65,
            Primaries::Custom(points) => *points,
        }
    }
}

/// Transfer function (tone response curve)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransferFunction {
    Linear,
    /// Pure power curve with the given exponent
    Gamma(f32),
    /// IEC 61966-2-1 piecewise curve
    Srgb,
}

impl TransferFunction {
    /// Encoded value → linear light, both in `[0, 1]`
    #[inline]
    pub fn to_linear(self, v: f32) -> f32 {
        match self {
            TransferFunction::Linear => v,
            TransferFunction::Gamma(g) => v.max(0.0).powf(g),
            TransferFunction::Srgb => linear_srgb::default::srgb_to_linear(v),
        }
    }

    /// Linear light → encoded value, both in `[0, 1]`
    #[inline]
    pub fn from_linear(self, v: f32) -> f32 {
        match self {
            TransferFunction::Linear => v,
            TransferFunction::Gamma(g) => v.max(0.0).powf(1.0 / g),
            TransferFunction::Srgb => linear_srgb::default::linear_to_srgb(v),
        }
    }

    fn is_valid(self) -> bool {
        match self {
            TransferFunction::Gamma(g) => g.is_finite() && g > 0.0,
            _ => true,
        }
    }
}

/// Primaries plus transfer function of a valid color space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Colorimetry {
    pub primaries: Primaries,
    pub transfer: TransferFunction,
}

/// A color space value, possibly invalid, possibly carrying ICC bytes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColorSpace {
    colorimetry: Option<Colorimetry>,
    icc_profile: Option<Vec<u8>>,
}

impl ColorSpace {
    /// Build from primaries and transfer function.
    ///
    /// The result is invalid when the primaries are degenerate (no RGB→XYZ
    /// matrix exists) or the gamma is not a positive number.
    pub fn new(primaries: Primaries, transfer: TransferFunction) -> Self {
        let valid = transfer.is_valid() && primaries.points().rgb_to_xyz().is_some();
        Self {
            colorimetry: valid.then_some(Colorimetry {
                primaries,
                transfer,
            }),
            icc_profile: None,
        }
    }

    /// sRGB primaries with the sRGB curve
    pub fn srgb() -> Self {
        Self::new(Primaries::Srgb, TransferFunction::Srgb)
    }

    /// sRGB primaries with linear transfer
    pub fn srgb_linear() -> Self {
        Self::new(Primaries::Srgb, TransferFunction::Linear)
    }

    /// DCI-P3 D65 primaries with the sRGB curve
    pub fn display_p3() -> Self {
        Self::new(Primaries::DciP3D65, TransferFunction::Srgb)
    }

    /// Interpret an ICC profile.
    ///
    /// Profiles this crate cannot represent produce an invalid color space that
    /// still carries the original bytes.
    pub fn from_icc_profile(data: &[u8]) -> Self {
        let colorimetry = icc::parse_profile(data).and_then(|c| {
            let candidate = Self::new(c.primaries, c.transfer);
            candidate.colorimetry
        });
        Self {
            colorimetry,
            icc_profile: Some(data.to_vec()),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.colorimetry.is_some()
    }

    pub fn colorimetry(&self) -> Option<&Colorimetry> {
        self.colorimetry.as_ref()
    }

    pub fn primaries(&self) -> Option<Primaries> {
        self.colorimetry.map(|c| c.primaries)
    }

    pub fn transfer_function(&self) -> Option<TransferFunction> {
        self.colorimetry.map(|c| c.transfer)
    }

    /// Raw ICC bytes this space was created from, if any
    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.icc_profile.as_deref()
    }

    /// Same primaries with a different transfer function. Invalid spaces stay invalid.
    pub fn with_transfer_function(&self, transfer: TransferFunction) -> Self {
        match self.colorimetry {
            Some(c) => Self::new(c.primaries, transfer),
            None => Self::default(),
        }
    }

    /// Same transfer function with different primaries. Invalid spaces stay invalid.
    pub fn with_primaries(&self, primaries: Primaries) -> Self {
        match self.colorimetry {
            Some(c) => Self::new(primaries, c.transfer),
            None => Self::default(),
        }
    }

    /// Build a pixel transform from `self` into `target`.
    ///
    /// Returns `None` if either space is invalid.
    pub fn transform_to(&self, target: &ColorSpace) -> Option<ColorTransform> {
        let src = self.colorimetry?;
        let dst = target.colorimetry?;
        let src_points = src.primaries.points();
        let dst_points = dst.primaries.points();
        let to_xyz = src_points.rgb_to_xyz()?;
        let from_xyz = dst_points.rgb_to_xyz()?.inverse()?;
        let adapt = bradford(src_points.white, dst_points.white)?;
        let matrix = from_xyz.multiply(&adapt).multiply(&to_xyz);
        Some(ColorTransform {
            source: src.transfer,
            target: dst.transfer,
            matrix: matrix.to_f32(),
            identity_matrix: src.primaries == dst.primaries,
        })
    }
}

/// A prepared conversion between two valid color spaces
#[derive(Debug, Clone, Copy)]
pub struct ColorTransform {
    source: TransferFunction,
    target: TransferFunction,
    matrix: [[f32; 3]; 3],
    identity_matrix: bool,
}

impl ColorTransform {
    /// Convert one encoded RGB triple in `[0, 1]`.
    #[inline]
    pub fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let lin = rgb.map(|c| self.source.to_linear(c));
        let mapped = if self.identity_matrix {
            lin
        } else {
            let m = &self.matrix;
            [
                m[0][0] * lin[0] + m[0][1] * lin[1] + m[0][2] * lin[2],
                m[1][0] * lin[0] + m[1][1] * lin[1] + m[1][2] * lin[2],
                m[2][0] * lin[0] + m[2][1] * lin[1] + m[2][2] * lin[2],
            ]
        };
        mapped.map(|c| self.target.from_linear(c.clamp(0.0, 1.0)).clamp(0.0, 1.0))
    }
}

/// 3x3 matrix in double precision
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Matrix3(pub [[f64; 3]; 3]);

impl Matrix3 {
    pub const IDENTITY: Self = Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]);

    /// Multiply matrix by column vector
    #[inline]
    pub fn transform(&self, v: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [
            m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
            m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
            m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
        ]
    }

    /// Matrix multiplication: self * other
    pub fn multiply(&self, other: &Self) -> Self {
        let a = &self.0;
        let b = &other.0;
        let mut result = [[0.0f64; 3]; 3];
        for (i, row) in result.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
        }
        Self(result)
    }

    pub fn inverse(&self) -> Option<Self> {
        let m = &self.0;
        let c00 = m[1][1] * m[2][2] - m[1][2] * m[2][1];
        let c01 = m[1][2] * m[2][0] - m[1][0] * m[2][2];
        let c02 = m[1][0] * m[2][1] - m[1][1] * m[2][0];
        let det = m[0][0] * c00 + m[0][1] * c01 + m[0][2] * c02;
        if !det.is_finite() || det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        Some(Self([
            [
                c00 * inv,
                (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv,
                (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv,
            ],
            [
                c01 * inv,
                (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv,
                (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv,
            ],
            [
                c02 * inv,
                (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv,
                (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv,
            ],
        ]))
    }

    fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_finite())
    }

    fn to_f32(self) -> [[f32; 3]; 3] {
        self.0.map(|row| row.map(|v| v as f32))
    }
}

const BRADFORD: Matrix3 = Matrix3([
    [0.8951, 0.2664, -0.1614],
    [-0.7502, 1.7135, 0.0367],
    [0.0389, -0.0685, 1.0296],
]);

/// Chromatic adaptation matrix (XYZ → XYZ) from one white point to another
pub(crate) fn bradford(from: Chromaticity, to: Chromaticity) -> Option<Matrix3> {
    if from == to {
        return Some(Matrix3::IDENTITY);
    }
    let src = BRADFORD.transform(from.to_xyz());
    let dst = BRADFORD.transform(to.to_xyz());
    if src.iter().any(|v| v.abs() < 1e-12) {
        return None;
    }
    let scale = Matrix3([
        [dst[0] / src[0], 0.0, 0.0],
        [0.0, dst[1] / src[1], 0.0],
        [0.0, 0.0, dst[2] / src[2]],
    ]);
    Some(BRADFORD.inverse()?.multiply(&scale).multiply(&BRADFORD))
}
