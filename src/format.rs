//! Pixel format selection for both directions
//!
//! Decode picks a working buffer the YUV conversion writes into and the format
//! handed to the caller. Encode picks the path (single-plane gray or YUV color),
//! the bit depth, the chroma subsampling and the buffer the source is
//! converted into before plane extraction.

use crate::bitmap::{Bitmap, PixelFormat};
use crate::image::ChromaSampling;

/// Buffer formats used while decoding one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeFormats {
    /// What YUV→RGB conversion writes into
    pub working: PixelFormat,
    /// What the caller receives
    pub output: PixelFormat,
}

/// Select decode formats from the codec frame's properties
pub fn decode_formats(depth: u8, has_alpha: bool, sampling: ChromaSampling) -> DecodeFormats {
    let wide = depth > 8;
    let mono = sampling == ChromaSampling::Monochrome;

    let working = match (wide, has_alpha) {
        (true, true) => PixelFormat::Rgba16,
        (true, false) => PixelFormat::Rgbx16,
        (false, true) => PixelFormat::Rgba8,
        (false, false) => PixelFormat::Rgbx8,
    };

    let output = match (wide, has_alpha, mono) {
        (true, false, true) => PixelFormat::Gray16,
        (true, _, _) => working,
        (false, true, _) => PixelFormat::Bgra8,
        (false, false, true) => PixelFormat::Gray8,
        (false, false, false) => PixelFormat::Bgrx8,
    };

    DecodeFormats { working, output }
}

/// Plane layout of the encoded image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeLayout {
    /// Luma only, no alpha
    Grayscale,
    /// YUV, optionally with an alpha plane
    Color,
}

/// Whether the source only holds gray values
pub fn is_grayscale_source(bitmap: &Bitmap) -> bool {
    match bitmap.format() {
        PixelFormat::Mono | PixelFormat::Gray8 | PixelFormat::Gray16 => true,
        PixelFormat::Indexed8 => bitmap.is_grayscale(),
        _ => false,
    }
}

/// Pick the encode layout. Gray sources with alpha must go through the color path.
pub fn encode_layout(bitmap: &Bitmap) -> EncodeLayout {
    if is_grayscale_source(bitmap) && !bitmap.has_alpha_channel() {
        EncodeLayout::Grayscale
    } else {
        EncodeLayout::Color
    }
}

/// Bit depth (8 or 10) that preserves the source format's precision
pub fn encode_depth(format: PixelFormat) -> u8 {
    match format {
        PixelFormat::Rgb30
        | PixelFormat::Gray16
        | PixelFormat::Rgb16
        | PixelFormat::Rgbx16
        | PixelFormat::Rgba16 => 10,
        f if f.bits_per_pixel() > 32 => 10,
        _ => 8,
    }
}

/// Chroma subsampling for a maximum quantizer: finer sampling at higher quality
pub fn chroma_for_quantizer(max_quantizer: u8) -> ChromaSampling {
    if max_quantizer < 10 {
        ChromaSampling::Cs444
    } else if max_quantizer < 20 {
        ChromaSampling::Cs422
    } else {
        ChromaSampling::Cs420
    }
}

/// The buffer the source is converted into before planes are extracted
pub fn encode_working_format(layout: EncodeLayout, depth: u8, has_alpha: bool) -> PixelFormat {
    match (layout, depth > 8, has_alpha) {
        (EncodeLayout::Grayscale, true, _) => PixelFormat::Gray16,
        (EncodeLayout::Grayscale, false, _) => PixelFormat::Gray8,
        (EncodeLayout::Color, true, true) => PixelFormat::Rgba16,
        (EncodeLayout::Color, true, false) => PixelFormat::Rgbx16,
        (EncodeLayout::Color, false, true) => PixelFormat::Rgba8,
        (EncodeLayout::Color, false, false) => PixelFormat::Rgb8,
    }
}
