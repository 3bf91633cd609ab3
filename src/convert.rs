//! Alpha channel handling, premultiply conversion, and bit depth scaling

use crate::codec::Plane;
use crate::error::{Error, Result};
use crate::image::ColorRange;
use imgref::ImgVec;
use rgb::Rgba;
use rgb::prelude::*;
use whereat::at;

/// Scale a limited-range Y value to full range (8-bit)
#[inline]
pub(crate) fn limited_to_full_8(y: u8) -> u8 {
    // Limited range: Y ∈ [16, 235]
    ((y as u32).saturating_sub(16) * 255 / 219).min(255) as u8
}

/// Scale a limited-range Y value to full range (16-bit, given bit depth)
#[inline]
pub(crate) fn limited_to_full_16(y: u16, bit_depth: u8) -> u16 {
    let max_val = (1u32 << bit_depth) - 1;
    let y_min = 16u32 << (bit_depth - 8);
    let y_range = 219u32 << (bit_depth - 8);
    let y32 = y as u32;
    ((y32.saturating_sub(y_min)) * max_val / y_range).min(max_val) as u16
}

/// Scale a value from native bit depth to full u16 range using LSB replication.
///
/// For 10-bit: `(v << 6) | (v >> 4)` maps 0→0, 1023→65535
/// For 12-bit: `(v << 4) | (v >> 8)` maps 0→0, 4095→65535
#[inline]
pub(crate) fn scale_to_u16(v: u16, bit_depth: u8) -> u16 {
    let shift = 16 - bit_depth;
    if shift == 0 {
        return v;
    }
    (v << shift) | (v >> (bit_depth - shift))
}

/// Scale a full u16 value (0–65535) down to native bit depth range.
///
/// Truncation is the exact inverse of LSB replication in [`scale_to_u16`].
#[inline]
pub(crate) fn scale_from_u16(v: u16, bit_depth: u8) -> u16 {
    let shift = 16 - bit_depth;
    if shift == 0 {
        return v;
    }
    v >> shift
}

/// Requantize a 16-bit sample into 10-bit range with rounding
#[inline]
pub(crate) fn requantize_to_10bit(v: u16) -> u16 {
    (v as f32 / 65535.0 * 1023.0).round().clamp(0.0, 1023.0) as u16
}

#[inline]
pub(crate) fn u8_to_u16(v: u8) -> u16 {
    v as u16 * 257
}

#[inline]
pub(crate) fn u16_to_u8(v: u16) -> u8 {
    ((v as u32 * 255 + 32767) / 65535) as u8
}

/// Write an 8-bit alpha plane into an RGBA image
pub fn add_alpha8(
    img: &mut ImgVec<Rgba<u8>>,
    alpha: &Plane<u8>,
    alpha_range: ColorRange,
    premultiplied: bool,
) -> Result<()> {
    if alpha.width < img.width() || alpha.height < img.height() || !alpha.is_consistent() {
        return Err(at(Error::Decode("alpha plane smaller than color image".into())));
    }

    for (alpha_row, img_row) in alpha.rows().zip(img.rows_mut()) {
        for (&y, px) in alpha_row.iter().zip(img_row.iter_mut()) {
            px.a = match alpha_range {
                ColorRange::Full => y,
                ColorRange::Limited => limited_to_full_8(y),
            };
        }
        if premultiplied {
            unpremultiply8(img_row);
        }
    }

    Ok(())
}

/// Write a 10/12-bit alpha plane into a 16-bit RGBA image.
///
/// Alpha samples are range-converted (limited→full if needed) and then scaled
/// to full u16 to match the already-scaled RGB channels.
pub fn add_alpha16(
    img: &mut ImgVec<Rgba<u16>>,
    alpha: &Plane<u16>,
    alpha_range: ColorRange,
    bit_depth: u8,
    premultiplied: bool,
) -> Result<()> {
    if alpha.width < img.width() || alpha.height < img.height() || !alpha.is_consistent() {
        return Err(at(Error::Decode("alpha plane smaller than color image".into())));
    }

    for (alpha_row, img_row) in alpha.rows().zip(img.rows_mut()) {
        for (&y, px) in alpha_row.iter().zip(img_row.iter_mut()) {
            let a = match alpha_range {
                ColorRange::Full => y,
                ColorRange::Limited => limited_to_full_16(y, bit_depth),
            };
            px.a = scale_to_u16(a, bit_depth);
        }
        if premultiplied {
            unpremultiply16(img_row);
        }
    }

    Ok(())
}

/// Convert premultiplied alpha to straight alpha for 8-bit RGBA
#[inline(never)]
pub fn unpremultiply8(img_row: &mut [Rgba<u8>]) {
    for px in img_row.iter_mut() {
        if px.a != 255 && px.a != 0 {
            *px.rgb_mut() = px
                .rgb()
                .map(|c| (c as u16 * 255 / px.a as u16).min(255) as u8);
        }
    }
}

/// Convert premultiplied alpha to straight alpha for 16-bit RGBA
#[inline(never)]
pub fn unpremultiply16(img_row: &mut [Rgba<u16>]) {
    for px in img_row.iter_mut() {
        if px.a != 0xFFFF && px.a != 0 {
            *px.rgb_mut() = px
                .rgb()
                .map(|c| (c as u32 * 0xFFFF / px.a as u32).min(0xFFFF) as u16);
        }
    }
}
