//! Minimal ICC profile reader
//!
//! Reads just enough of an ICC v2/v4 matrix/TRC display profile to recover its
//! primaries and transfer function. LUT-based profiles, gray profiles and
//! anything else this crate cannot represent yield `None`.

use crate::colorspace::{Chromaticity, Colorimetry, Matrix3, Primaries, PrimaryPoints, TransferFunction, bradford};

const HEADER_SIZE: usize = 128;

/// PCS illuminant (D50) as XYZ
const PCS_D50: [f64; 3] = [0.9642, 1.0, 0.8249];

type Signature = [u8; 4];

struct TagTable<'a> {
    data: &'a [u8],
}

impl<'a> TagTable<'a> {
    fn new(data: &'a [u8]) -> Option<Self> {
        if data.len() < HEADER_SIZE + 4 {
            return None;
        }
        let declared = read_u32(data, 0)? as usize;
        if declared < HEADER_SIZE + 4 || declared > data.len() {
            return None;
        }
        let data = &data[..declared];
        if &data[36..40] != b"acsp" {
            return None;
        }
        Some(Self { data })
    }

    fn header_field(&self, offset: usize) -> Option<Signature> {
        self.data.get(offset..offset + 4)?.try_into().ok()
    }

    fn find(&self, sig: &Signature) -> Option<&'a [u8]> {
        let count = read_u32(self.data, HEADER_SIZE)? as usize;
        for i in 0..count {
            let entry = HEADER_SIZE + 4 + i * 12;
            let tag_sig = self.data.get(entry..entry + 4)?;
            if tag_sig != sig {
                continue;
            }
            let offset = read_u32(self.data, entry + 4)? as usize;
            let size = read_u32(self.data, entry + 8)? as usize;
            return self.data.get(offset..offset.checked_add(size)?);
        }
        None
    }
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(bytes.try_into().ok()?))
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes(bytes.try_into().ok()?))
}

fn read_s15f16(data: &[u8], offset: usize) -> Option<f64> {
    Some(read_u32(data, offset)? as i32 as f64 / 65536.0)
}

fn read_xyz(tag: &[u8]) -> Option<[f64; 3]> {
    if tag.get(0..4)? != b"XYZ " {
        return None;
    }
    Some([
        read_s15f16(tag, 8)?,
        read_s15f16(tag, 12)?,
        read_s15f16(tag, 16)?,
    ])
}

fn read_chad(tag: &[u8]) -> Option<Matrix3> {
    if tag.get(0..4)? != b"sf32" {
        return None;
    }
    let mut m = [[0.0f64; 3]; 3];
    for (i, row) in m.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = read_s15f16(tag, 8 + (i * 3 + j) * 4)?;
        }
    }
    Some(Matrix3(m))
}

fn gamma_or_linear(g: f64) -> Option<TransferFunction> {
    if !g.is_finite() || g <= 0.0 {
        None
    } else if (g - 1.0).abs() < 0.01 {
        Some(TransferFunction::Linear)
    } else {
        Some(TransferFunction::Gamma(g as f32))
    }
}

fn read_trc(tag: &[u8]) -> Option<TransferFunction> {
    match tag.get(0..4)? {
        b"curv" => {
            let count = read_u32(tag, 8)? as usize;
            match count {
                0 => Some(TransferFunction::Linear),
                1 => gamma_or_linear(read_u16(tag, 12)? as f64 / 256.0),
                _ => {
                    // Sampled curve: accept only a tabulated sRGB curve
                    let last = (count - 1) as f32;
                    for i in 0..count {
                        let v = read_u16(tag, 12 + i * 2)? as f32 / 65535.0;
                        let expected = linear_srgb::default::srgb_to_linear(i as f32 / last);
                        if (v - expected).abs() > 0.01 {
                            return None;
                        }
                    }
                    Some(TransferFunction::Srgb)
                }
            }
        }
        b"para" => {
            let function = read_u16(tag, 8)?;
            let g = read_s15f16(tag, 12)?;
            match function {
                0 => gamma_or_linear(g),
                3 => {
                    let a = read_s15f16(tag, 16)?;
                    let b = read_s15f16(tag, 20)?;
                    let c = read_s15f16(tag, 24)?;
                    let d = read_s15f16(tag, 28)?;
                    let is_srgb = (g - 2.4).abs() < 0.01
                        && (a - 1.0 / 1.055).abs() < 0.001
                        && (b - 0.055 / 1.055).abs() < 0.001
                        && (c - 1.0 / 12.92).abs() < 0.001
                        && (d - 0.04045).abs() < 0.002;
                    is_srgb.then_some(TransferFunction::Srgb)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Recover primaries and transfer function from an RGB matrix/TRC profile.
pub(crate) fn parse_profile(data: &[u8]) -> Option<Colorimetry> {
    let table = TagTable::new(data)?;
    if &table.header_field(16)? != b"RGB " || &table.header_field(20)? != b"XYZ " {
        return None;
    }

    let red = read_xyz(table.find(b"rXYZ")?)?;
    let green = read_xyz(table.find(b"gXYZ")?)?;
    let blue = read_xyz(table.find(b"bXYZ")?)?;

    // Colorants are stored adapted to D50. Undo the adaptation to recover the
    // device primaries and white.
    let (undo, white) = match table.find(b"chad").and_then(read_chad) {
        Some(chad) => {
            let inv = chad.inverse()?;
            (inv, inv.transform(PCS_D50))
        }
        None => {
            let wtpt = table.find(b"wtpt").and_then(read_xyz).unwrap_or(PCS_D50);
            let white = Chromaticity::from_xyz(wtpt)?;
            (bradford(Chromaticity::D50, white)?, wtpt)
        }
    };

    let points = PrimaryPoints {
        white: Chromaticity::from_xyz(white)?,
        red: Chromaticity::from_xyz(undo.transform(red))?,
        green: Chromaticity::from_xyz(undo.transform(green))?,
        blue: Chromaticity::from_xyz(undo.transform(blue))?,
    };

    let r_trc = read_trc(table.find(b"rTRC")?)?;
    let g_trc = read_trc(table.find(b"gTRC")?)?;
    let b_trc = read_trc(table.find(b"bTRC")?)?;
    if r_trc != g_trc || r_trc != b_trc {
        return None;
    }

    Some(Colorimetry {
        primaries: Primaries::from_points(points),
        transfer: r_trc,
    })
}
