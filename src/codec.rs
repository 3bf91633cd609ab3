//! Interfaces to the AV1 codec and the planar images exchanged with it
//!
//! The transcoding core never touches AV1 bitstreams. A [`DecodeSession`]
//! turns container bytes into [`CodecImage`]s, an [`Av1Encoder`] turns a
//! [`CodecImage`] into a finished AVIF file.

use crate::error::Result;
use crate::image::{
    ChromaSampling, ColorPrimaries, ColorRange, MatrixCoefficients, TransferCharacteristics,
    Transforms,
};

/// One plane of samples, row-major with a stride in elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane<T> {
    pub data: Vec<T>,
    pub width: usize,
    pub height: usize,
    pub stride: usize,
}

impl<T: Copy + Default> Plane<T> {
    /// Zero-filled plane with `stride == width`
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![T::default(); width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Wrap tightly packed samples
    pub fn from_vec(data: Vec<T>, width: usize, height: usize) -> Self {
        Self {
            data,
            width,
            height,
            stride: width,
        }
    }

    /// True when the buffer holds every row the dimensions promise
    pub fn is_consistent(&self) -> bool {
        if self.width == 0 || self.height == 0 {
            return true;
        }
        self.stride >= self.width
            && self.data.len() >= self.stride * (self.height - 1) + self.width
    }

    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        (0..self.height).map(move |y| self.row(y))
    }
}

/// Luma plus optional chroma planes of one bit depth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneSet<T> {
    pub y: Plane<T>,
    pub u: Option<Plane<T>>,
    pub v: Option<Plane<T>>,
}

/// Sample storage: 8-bit, or 10/12/16-bit samples held in `u16`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Planes {
    Depth8(PlaneSet<u8>),
    Depth16(PlaneSet<u16>),
}

/// Auxiliary alpha plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlphaPlane {
    Depth8(Plane<u8>),
    Depth16(Plane<u16>),
}

/// A planar YUV image as produced or consumed by the AV1 codec
#[derive(Debug, Clone)]
pub struct CodecImage {
    pub width: u32,
    pub height: u32,
    /// Bits per sample: 8, 10 or 12
    pub depth: u8,
    pub sampling: ChromaSampling,
    pub range: ColorRange,
    pub primaries: ColorPrimaries,
    pub transfer: TransferCharacteristics,
    pub matrix: MatrixCoefficients,
    /// Embedded ICC profile, empty if none
    pub icc: Vec<u8>,
    pub planes: Planes,
    pub alpha: Option<AlphaPlane>,
    pub alpha_range: ColorRange,
    pub premultiplied_alpha: bool,
    pub transforms: Transforms,
    /// Presentation duration in seconds (0 for still images)
    pub duration: f64,
}

impl CodecImage {
    pub fn has_alpha(&self) -> bool {
        self.alpha.is_some()
    }
}

/// Container-level facts known after parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Number of images (1 for still images)
    pub image_count: usize,
}

/// A codec decode session over one container.
///
/// After [`parse`](Self::parse), [`next_image`](Self::next_image) yields
/// images 0, 1, 2, ... in order. [`nth_image`](Self::nth_image) decodes an
/// arbitrary image and repositions the session after it. [`reset`](Self::reset)
/// rewinds to before image 0.
pub trait DecodeSession {
    fn parse(&mut self, data: Vec<u8>) -> Result<ContainerInfo>;
    fn next_image(&mut self) -> Result<CodecImage>;
    fn nth_image(&mut self, index: usize) -> Result<CodecImage>;
    fn reset(&mut self) -> Result<()>;
}

/// Settings handed to the AV1 encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub threads: usize,
    /// Quantizers use the 0 (lossless) ..= 63 (worst) scale
    pub min_quantizer: u8,
    pub max_quantizer: u8,
    pub min_quantizer_alpha: u8,
    pub max_quantizer_alpha: u8,
    pub speed: u8,
}

/// Encodes one planar image into a complete single-image AVIF file
pub trait Av1Encoder {
    fn encode(&mut self, image: &CodecImage, settings: &EncodeSettings) -> Result<Vec<u8>>;
}
