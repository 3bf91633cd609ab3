//! Mapping between codec color metadata (CICP codes or ICC bytes) and [`ColorSpace`]
//!
//! Both directions are driven by the static tables below so the mapping rules
//! can be tested in one place.

use crate::colorspace::{Chromaticity, ColorSpace, Primaries, PrimaryPoints, TransferFunction};
use crate::image::{ColorPrimaries, MatrixCoefficients, TransferCharacteristics};
use log::warn;

/// Chromaticities for each primaries code: `[rx, ry, gx, gy, bx, by, wx, wy]`
pub const PRIMARIES_TABLE: &[(ColorPrimaries, &str, [f64; 8])] = &[
    (ColorPrimaries::BT709, "BT.709", [0.64, 0.33, 0.30, 0.60, 0.15, 0.06, 0.3127, 0.3290]),
    (ColorPrimaries::BT470M, "BT.470-6 System M", [0.67, 0.33, 0.21, 0.71, 0.14, 0.08, 0.310, 0.316]),
    (ColorPrimaries::BT470BG, "BT.470-6 System BG", [0.64, 0.33, 0.29, 0.60, 0.15, 0.06, 0.3127, 0.3290]),
    (ColorPrimaries::BT601, "BT.601", [0.630, 0.340, 0.310, 0.595, 0.155, 0.070, 0.3127, 0.3290]),
    (ColorPrimaries::SMPTE240, "SMPTE 240M", [0.630, 0.340, 0.310, 0.595, 0.155, 0.070, 0.3127, 0.3290]),
    (ColorPrimaries::FILM, "Generic film", [0.681, 0.319, 0.243, 0.692, 0.145, 0.049, 0.310, 0.316]),
    (ColorPrimaries::BT2020, "BT.2020", [0.708, 0.292, 0.170, 0.797, 0.131, 0.046, 0.3127, 0.3290]),
    (ColorPrimaries::XYZ, "XYZ", [1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.3333, 0.3333]),
    (ColorPrimaries::SMPTE431, "SMPTE RP 431-2", [0.680, 0.320, 0.265, 0.690, 0.150, 0.060, 0.314, 0.351]),
    (ColorPrimaries::SMPTE432, "SMPTE EG 432-1", [0.680, 0.320, 0.265, 0.690, 0.150, 0.060, 0.3127, 0.3290]),
    (ColorPrimaries::EBU3213, "EBU Tech. 3213-E", [0.630, 0.340, 0.295, 0.605, 0.155, 0.077, 0.3127, 0.3290]),
];

/// Primaries codes that decode to named host primaries
const NAMED_PRIMARIES: &[(ColorPrimaries, Primaries)] = &[
    (ColorPrimaries::UNKNOWN_0, Primaries::Srgb),
    (ColorPrimaries::BT709, Primaries::Srgb),
    (ColorPrimaries::UNSPECIFIED, Primaries::Srgb),
    (ColorPrimaries::SMPTE432, Primaries::DciP3D65),
];

/// Transfer codes understood on decode
pub const TRANSFER_TABLE: &[(TransferCharacteristics, TransferFunction)] = &[
    (TransferCharacteristics::UNKNOWN_0, TransferFunction::Srgb),
    (TransferCharacteristics::UNSPECIFIED, TransferFunction::Srgb),
    (TransferCharacteristics::SRGB, TransferFunction::Srgb),
    (TransferCharacteristics::BT470M, TransferFunction::Gamma(2.2)),
    (TransferCharacteristics::BT470BG, TransferFunction::Gamma(2.8)),
    (TransferCharacteristics::LINEAR, TransferFunction::Linear),
];

/// Chromaticity points for a primaries code. Unknown codes use BT.709.
pub fn primaries_points(code: ColorPrimaries) -> PrimaryPoints {
    let values = PRIMARIES_TABLE
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, _, v)| *v)
        .unwrap_or(PRIMARIES_TABLE[0].2);
    PrimaryPoints {
        red: Chromaticity::compatible(values[0], values[1]),
        green: Chromaticity::compatible(values[2], values[3]),
        blue: Chromaticity::compatible(values[4], values[5]),
        white: Chromaticity::compatible(values[6], values[7]),
    }
}

/// Host color space for a frame with CICP metadata and no ICC profile.
///
/// Never fails. The result may be invalid if the code's points are degenerate.
pub fn color_space_from_cicp(
    primaries: ColorPrimaries,
    transfer: TransferCharacteristics,
) -> ColorSpace {
    let trc = match TRANSFER_TABLE.iter().find(|(c, _)| *c == transfer) {
        Some((_, tf)) => *tf,
        None => {
            warn!(
                "CICP colorPrimaries: {}, transferCharacteristics: {}: transfer is not supported, using sRGB",
                primaries.0, transfer.0
            );
            TransferFunction::Srgb
        }
    };

    let prim = match NAMED_PRIMARIES.iter().find(|(c, _)| *c == primaries) {
        Some((_, p)) => *p,
        None => Primaries::from_points(primaries_points(primaries)),
    };

    let cs = ColorSpace::new(prim, trc);
    if !cs.is_valid() {
        warn!(
            "AVIF image produced an invalid color space from CICP {}/{}",
            primaries.0, transfer.0
        );
    }
    cs
}

/// Decode direction: resolve the color space for one frame.
///
/// A non-empty ICC profile takes precedence over CICP codes.
pub fn resolve_decode(
    icc: &[u8],
    primaries: ColorPrimaries,
    transfer: TransferCharacteristics,
) -> ColorSpace {
    if !icc.is_empty() {
        let cs = ColorSpace::from_icc_profile(icc);
        if !cs.is_valid() {
            warn!("AVIF image has unsupported or invalid ICC profile");
        }
        return cs;
    }
    color_space_from_cicp(primaries, transfer)
}

/// Color metadata to store in the encoded file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorMetadata {
    pub primaries: ColorPrimaries,
    pub transfer: TransferCharacteristics,
    pub matrix: MatrixCoefficients,
    /// Embedded ICC profile; empty when CICP alone describes the color
    pub icc: Vec<u8>,
}

impl ColorMetadata {
    /// Codec defaults before any resolution: unspecified primaries/transfer, BT.601 matrix
    pub fn codec_default() -> Self {
        Self {
            primaries: ColorPrimaries::UNSPECIFIED,
            transfer: TransferCharacteristics::UNSPECIFIED,
            matrix: MatrixCoefficients::BT601,
            icc: Vec::new(),
        }
    }
}

/// Outcome of the encode-direction resolution for the color path
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeColorResolution {
    pub metadata: ColorMetadata,
    /// The working depth must be raised to 10 bits
    pub upgrade_depth: bool,
    /// Pixel data must be converted into this color space before encoding
    pub convert_to: Option<ColorSpace>,
}

const GAMMA_TOLERANCE: f32 = 0.1;

fn encode_primaries(p: Primaries) -> Option<(ColorPrimaries, MatrixCoefficients)> {
    match p {
        Primaries::Srgb => Some((ColorPrimaries::BT709, MatrixCoefficients::BT709)),
        Primaries::DciP3D65 => Some((ColorPrimaries::SMPTE432, MatrixCoefficients::CHROMAT_NCL)),
        Primaries::Custom(_) => None,
    }
}

fn encode_transfer(tf: TransferFunction) -> Option<TransferCharacteristics> {
    match tf {
        TransferFunction::Linear => Some(TransferCharacteristics::LINEAR),
        TransferFunction::Srgb => Some(TransferCharacteristics::SRGB),
        TransferFunction::Gamma(g) if (g - 2.2).abs() < GAMMA_TOLERANCE => {
            Some(TransferCharacteristics::BT470M)
        }
        TransferFunction::Gamma(g) if (g - 2.8).abs() < GAMMA_TOLERANCE => {
            Some(TransferCharacteristics::BT470BG)
        }
        TransferFunction::Gamma(_) => None,
    }
}

/// Encode direction for the color (YUV) path.
pub fn resolve_encode(cs: &ColorSpace) -> EncodeColorResolution {
    let mut metadata = ColorMetadata {
        matrix: MatrixCoefficients::BT709,
        ..ColorMetadata::codec_default()
    };

    let Some(colorimetry) = cs.colorimetry() else {
        if let Some(icc) = cs.icc_profile().filter(|icc| !icc.is_empty()) {
            metadata.matrix = MatrixCoefficients::BT601;
            metadata.icc = icc.to_vec();
        }
        return EncodeColorResolution {
            metadata,
            upgrade_depth: false,
            convert_to: None,
        };
    };

    let primaries = encode_primaries(colorimetry.primaries);
    let transfer = encode_transfer(colorimetry.transfer);

    let convert_to = match (primaries, transfer) {
        (Some((p, m)), Some(t)) => {
            metadata.primaries = p;
            metadata.matrix = m;
            metadata.transfer = t;
            return EncodeColorResolution {
                metadata,
                upgrade_depth: false,
                convert_to: None,
            };
        }
        (None, Some(t)) => {
            warn!("unsupported primaries, converting to sRGB primaries");
            metadata.primaries = ColorPrimaries::BT709;
            metadata.matrix = MatrixCoefficients::BT709;
            metadata.transfer = t;
            ColorSpace::new(Primaries::Srgb, colorimetry.transfer)
        }
        (Some((p, m)), None) => {
            warn!("unsupported transfer function, converting to the sRGB curve");
            metadata.primaries = p;
            metadata.matrix = m;
            metadata.transfer = TransferCharacteristics::SRGB;
            cs.with_transfer_function(TransferFunction::Srgb)
        }
        (None, None) => {
            warn!("unsupported color space, converting to sRGB");
            metadata.primaries = ColorPrimaries::BT709;
            metadata.matrix = MatrixCoefficients::BT709;
            metadata.transfer = TransferCharacteristics::SRGB;
            ColorSpace::srgb()
        }
    };

    EncodeColorResolution {
        metadata,
        upgrade_depth: true,
        convert_to: Some(convert_to),
    }
}

/// Encode direction for the single-plane grayscale path.
pub fn resolve_gray_encode(cs: &ColorSpace) -> ColorMetadata {
    let mut metadata = ColorMetadata::codec_default();
    if let Some(tf) = cs.transfer_function() {
        metadata.primaries = ColorPrimaries::BT709;
        metadata.matrix = MatrixCoefficients::BT709;
        metadata.transfer = match tf {
            TransferFunction::Linear => TransferCharacteristics::LINEAR,
            TransferFunction::Srgb => TransferCharacteristics::SRGB,
            TransferFunction::Gamma(_) => TransferCharacteristics::UNSPECIFIED,
        };
    }
    metadata
}
