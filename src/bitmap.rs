//! In-memory host bitmap
//!
//! A [`Bitmap`] is a typed pixel buffer ([`PixelData`]) plus the [`ColorSpace`]
//! its values are encoded in. All geometric operations are pure: they return a
//! new bitmap and leave the receiver untouched.

use crate::colorspace::ColorSpace;
use crate::convert::{scale_from_u16, scale_to_u16, u8_to_u16, u16_to_u8};
use crate::error::{Error, Result};
use imgref::ImgVec;
use rgb::alt::BGRA;
use rgb::{Rgb, Rgba};
use whereat::at;

/// Pixel layouts a [`Bitmap`] can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 1 bit per pixel, `true` is white
    Mono,
    /// 8-bit palette index
    Indexed8,
    Gray8,
    Gray16,
    Rgb8,
    /// RGB with an unused fourth byte, always 255
    Rgbx8,
    Rgba8,
    /// Host-native packed RGB32
    Bgrx8,
    /// Host-native packed ARGB32
    Bgra8,
    /// 10 bits per channel packed into a `u32`: `0b11 << 30 | r << 20 | g << 10 | b`
    Rgb30,
    Rgb16,
    Rgbx16,
    Rgba16,
}

impl PixelFormat {
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Mono => 1,
            PixelFormat::Indexed8 | PixelFormat::Gray8 => 8,
            PixelFormat::Gray16 => 16,
            PixelFormat::Rgb8 => 24,
            PixelFormat::Rgbx8
            | PixelFormat::Rgba8
            | PixelFormat::Bgrx8
            | PixelFormat::Bgra8
            | PixelFormat::Rgb30 => 32,
            PixelFormat::Rgb16 => 48,
            PixelFormat::Rgbx16 | PixelFormat::Rgba16 => 64,
        }
    }

    /// The format stores a meaningful alpha channel
    pub fn has_alpha_channel(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 | PixelFormat::Rgba16
        )
    }

    /// The format can only hold gray values
    pub fn is_gray(self) -> bool {
        matches!(
            self,
            PixelFormat::Mono | PixelFormat::Gray8 | PixelFormat::Gray16
        )
    }
}

/// Typed pixel storage for every [`PixelFormat`]
#[derive(Debug, Clone)]
pub enum PixelData {
    Mono(ImgVec<bool>),
    Indexed8 {
        pixels: ImgVec<u8>,
        palette: Vec<Rgba<u8>>,
    },
    Gray8(ImgVec<u8>),
    Gray16(ImgVec<u16>),
    Rgb8(ImgVec<Rgb<u8>>),
    Rgbx8(ImgVec<Rgba<u8>>),
    Rgba8(ImgVec<Rgba<u8>>),
    Bgrx8(ImgVec<BGRA<u8>>),
    Bgra8(ImgVec<BGRA<u8>>),
    Rgb30(ImgVec<u32>),
    Rgb16(ImgVec<Rgb<u16>>),
    Rgbx16(ImgVec<Rgba<u16>>),
    Rgba16(ImgVec<Rgba<u16>>),
}

/// Evaluate `$body` with `$img` bound to the variant's image buffer.
macro_rules! on_pixels {
    ($data:expr, $img:ident => $body:expr) => {
        match $data {
            PixelData::Mono($img) => $body,
            PixelData::Indexed8 { pixels: $img, .. } => $body,
            PixelData::Gray8($img) => $body,
            PixelData::Gray16($img) => $body,
            PixelData::Rgb8($img) => $body,
            PixelData::Rgbx8($img) => $body,
            PixelData::Rgba8($img) => $body,
            PixelData::Bgrx8($img) => $body,
            PixelData::Bgra8($img) => $body,
            PixelData::Rgb30($img) => $body,
            PixelData::Rgb16($img) => $body,
            PixelData::Rgbx16($img) => $body,
            PixelData::Rgba16($img) => $body,
        }
    };
}

/// Rebuild the same variant from `$body`, which maps `$img` to a new buffer.
macro_rules! map_pixels {
    ($data:expr, $img:ident => $body:expr) => {
        match $data {
            PixelData::Mono($img) => PixelData::Mono($body),
            PixelData::Indexed8 {
                pixels: $img,
                palette,
            } => PixelData::Indexed8 {
                pixels: $body,
                palette: palette.clone(),
            },
            PixelData::Gray8($img) => PixelData::Gray8($body),
            PixelData::Gray16($img) => PixelData::Gray16($body),
            PixelData::Rgb8($img) => PixelData::Rgb8($body),
            PixelData::Rgbx8($img) => PixelData::Rgbx8($body),
            PixelData::Rgba8($img) => PixelData::Rgba8($body),
            PixelData::Bgrx8($img) => PixelData::Bgrx8($body),
            PixelData::Bgra8($img) => PixelData::Bgra8($body),
            PixelData::Rgb30($img) => PixelData::Rgb30($body),
            PixelData::Rgb16($img) => PixelData::Rgb16($body),
            PixelData::Rgbx16($img) => PixelData::Rgbx16($body),
            PixelData::Rgba16($img) => PixelData::Rgba16($body),
        }
    };
}

impl PixelData {
    pub fn format(&self) -> PixelFormat {
        match self {
            PixelData::Mono(_) => PixelFormat::Mono,
            PixelData::Indexed8 { .. } => PixelFormat::Indexed8,
            PixelData::Gray8(_) => PixelFormat::Gray8,
            PixelData::Gray16(_) => PixelFormat::Gray16,
            PixelData::Rgb8(_) => PixelFormat::Rgb8,
            PixelData::Rgbx8(_) => PixelFormat::Rgbx8,
            PixelData::Rgba8(_) => PixelFormat::Rgba8,
            PixelData::Bgrx8(_) => PixelFormat::Bgrx8,
            PixelData::Bgra8(_) => PixelFormat::Bgra8,
            PixelData::Rgb30(_) => PixelFormat::Rgb30,
            PixelData::Rgb16(_) => PixelFormat::Rgb16,
            PixelData::Rgbx16(_) => PixelFormat::Rgbx16,
            PixelData::Rgba16(_) => PixelFormat::Rgba16,
        }
    }

    pub fn width(&self) -> usize {
        on_pixels!(self, img => img.width())
    }

    pub fn height(&self) -> usize {
        on_pixels!(self, img => img.height())
    }
}

/// Clockwise rotation steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Clockwise90,
    Rotate180,
    CounterClockwise90,
}

/// A pixel buffer tagged with its color space
#[derive(Debug, Clone)]
pub struct Bitmap {
    pixels: PixelData,
    color_space: ColorSpace,
}

impl Bitmap {
    /// Wrap pixel data. The color space starts as sRGB.
    pub fn new(pixels: PixelData) -> Self {
        Self {
            pixels,
            color_space: ColorSpace::srgb(),
        }
    }

    /// Allocate a zero-filled bitmap, reporting allocation failure instead of aborting.
    ///
    /// Padding channels (the x in `Rgbx`/`Bgrx`) start at their opaque value.
    pub fn allocate(format: PixelFormat, width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(at(Error::EmptyImage));
        }
        let pixels = match format {
            PixelFormat::Mono => PixelData::Mono(alloc(width, height, false)?),
            PixelFormat::Indexed8 => PixelData::Indexed8 {
                pixels: alloc(width, height, 0)?,
                palette: gray_palette(),
            },
            PixelFormat::Gray8 => PixelData::Gray8(alloc(width, height, 0)?),
            PixelFormat::Gray16 => PixelData::Gray16(alloc(width, height, 0)?),
            PixelFormat::Rgb8 => PixelData::Rgb8(alloc(width, height, Rgb::new(0, 0, 0))?),
            PixelFormat::Rgbx8 => {
                PixelData::Rgbx8(alloc(width, height, Rgba::new(0, 0, 0, 255))?)
            }
            PixelFormat::Rgba8 => PixelData::Rgba8(alloc(width, height, Rgba::new(0, 0, 0, 0))?),
            PixelFormat::Bgrx8 => PixelData::Bgrx8(alloc(width, height, bgra(0, 0, 0, 255))?),
            PixelFormat::Bgra8 => PixelData::Bgra8(alloc(width, height, bgra(0, 0, 0, 0))?),
            PixelFormat::Rgb30 => PixelData::Rgb30(alloc(width, height, pack_rgb30(0, 0, 0))?),
            PixelFormat::Rgb16 => PixelData::Rgb16(alloc(width, height, Rgb::new(0, 0, 0))?),
            PixelFormat::Rgbx16 => {
                PixelData::Rgbx16(alloc(width, height, Rgba::new(0, 0, 0, 0xFFFF))?)
            }
            PixelFormat::Rgba16 => {
                PixelData::Rgba16(alloc(width, height, Rgba::new(0, 0, 0, 0))?)
            }
        };
        Ok(Self::new(pixels))
    }

    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.pixels.format()
    }

    /// Bits per pixel of the storage format
    pub fn depth(&self) -> u32 {
        self.format().bits_per_pixel()
    }

    pub fn pixels(&self) -> &PixelData {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut PixelData {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> PixelData {
        self.pixels
    }

    pub fn color_space(&self) -> &ColorSpace {
        &self.color_space
    }

    pub fn set_color_space(&mut self, color_space: ColorSpace) {
        self.color_space = color_space;
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// True for alpha formats and for palettes containing a non-opaque entry
    pub fn has_alpha_channel(&self) -> bool {
        match &self.pixels {
            PixelData::Indexed8 { palette, .. } => palette.iter().any(|c| c.a != 255),
            other => other.format().has_alpha_channel(),
        }
    }

    /// True for gray formats and for palettes whose entries are all gray
    pub fn is_grayscale(&self) -> bool {
        match &self.pixels {
            PixelData::Indexed8 { palette, .. } => {
                palette.iter().all(|c| c.r == c.g && c.g == c.b)
            }
            other => other.format().is_gray(),
        }
    }

    /// Every pixel as 16-bit RGBA (straight alpha, 0xFFFF when there is none)
    pub fn to_rgba16(&self) -> ImgVec<Rgba<u16>> {
        match &self.pixels {
            PixelData::Mono(img) => map_img(img, |&v| {
                let c = if v { 0xFFFF } else { 0 };
                Rgba::new(c, c, c, 0xFFFF)
            }),
            PixelData::Indexed8 { pixels, palette } => {
                let lut: Vec<Rgba<u16>> = (0..256)
                    .map(|i| {
                        let c = palette.get(i).copied().unwrap_or(Rgba::new(0, 0, 0, 255));
                        widen(c)
                    })
                    .collect();
                map_img(pixels, |&i| lut[i as usize])
            }
            PixelData::Gray8(img) => map_img(img, |&v| {
                let c = u8_to_u16(v);
                Rgba::new(c, c, c, 0xFFFF)
            }),
            PixelData::Gray16(img) => map_img(img, |&c| Rgba::new(c, c, c, 0xFFFF)),
            PixelData::Rgb8(img) => map_img(img, |p| {
                Rgba::new(u8_to_u16(p.r), u8_to_u16(p.g), u8_to_u16(p.b), 0xFFFF)
            }),
            PixelData::Rgbx8(img) => map_img(img, |p| Rgba { a: 0xFFFF, ..widen(*p) }),
            PixelData::Rgba8(img) => map_img(img, |p| widen(*p)),
            PixelData::Bgrx8(img) => map_img(img, |p| {
                Rgba::new(u8_to_u16(p.r), u8_to_u16(p.g), u8_to_u16(p.b), 0xFFFF)
            }),
            PixelData::Bgra8(img) => map_img(img, |p| {
                Rgba::new(u8_to_u16(p.r), u8_to_u16(p.g), u8_to_u16(p.b), u8_to_u16(p.a))
            }),
            PixelData::Rgb30(img) => map_img(img, |&v| {
                let [r, g, b] = unpack_rgb30(v);
                Rgba::new(scale_to_u16(r, 10), scale_to_u16(g, 10), scale_to_u16(b, 10), 0xFFFF)
            }),
            PixelData::Rgb16(img) => map_img(img, |p| Rgba::new(p.r, p.g, p.b, 0xFFFF)),
            PixelData::Rgbx16(img) => map_img(img, |p| Rgba { a: 0xFFFF, ..*p }),
            PixelData::Rgba16(img) => img.clone(),
        }
    }

    /// Convert into another pixel format.
    ///
    /// Color to gray uses BT.709 luma weights on the encoded values. Dropping
    /// alpha discards it without compositing. Conversion to `Indexed8` produces
    /// a 256-entry gray palette.
    pub fn convert_to_format(&self, format: PixelFormat) -> Bitmap {
        if format == self.format() {
            return self.clone();
        }
        let rgba = self.to_rgba16();
        Bitmap {
            pixels: from_rgba16(&rgba, format),
            color_space: self.color_space.clone(),
        }
    }

    /// Copy out a rectangle, clipped to the bitmap bounds.
    ///
    /// Returns `None` when the clipped rectangle is empty.
    pub fn copy(&self, x: usize, y: usize, width: usize, height: usize) -> Option<Bitmap> {
        let width = width.min(self.width().saturating_sub(x));
        let height = height.min(self.height().saturating_sub(y));
        if width == 0 || height == 0 {
            return None;
        }
        let pixels = map_pixels!(&self.pixels, img => crop_img(img, x, y, width, height));
        Some(Bitmap {
            pixels,
            color_space: self.color_space.clone(),
        })
    }

    pub fn rotated(&self, rotation: Rotation) -> Bitmap {
        let pixels = map_pixels!(&self.pixels, img => rotate_img(img, rotation));
        Bitmap {
            pixels,
            color_space: self.color_space.clone(),
        }
    }

    /// Flip left-to-right when `horizontal`, top-to-bottom when `vertical`
    pub fn mirrored(&self, horizontal: bool, vertical: bool) -> Bitmap {
        let pixels = map_pixels!(&self.pixels, img => mirror_img(img, horizontal, vertical));
        Bitmap {
            pixels,
            color_space: self.color_space.clone(),
        }
    }

    /// Convert pixel values into `target` and tag the result with it.
    ///
    /// Fails when either space is invalid. Palettes are converted in place of
    /// pixels. `Mono` data cannot change and only receives the new tag.
    pub fn convert_to_color_space(&self, target: &ColorSpace) -> Result<Bitmap> {
        let transform = self.color_space.transform_to(target).ok_or_else(|| {
            at(Error::Unsupported(
                "color space conversion needs two valid color spaces",
            ))
        })?;
        let apply = |p: Rgba<u16>| -> Rgba<u16> {
            let rgb = [p.r, p.g, p.b].map(|c| c as f32 / 65535.0);
            let [r, g, b] = transform.apply(rgb).map(|c| (c * 65535.0).round() as u16);
            Rgba::new(r, g, b, p.a)
        };

        let pixels = match &self.pixels {
            PixelData::Mono(img) => PixelData::Mono(img.clone()),
            PixelData::Indexed8 { pixels, palette } => PixelData::Indexed8 {
                pixels: pixels.clone(),
                palette: palette.iter().map(|&c| narrow(apply(widen(c)))).collect(),
            },
            _ => {
                let rgba = self.to_rgba16();
                let converted = map_img(&rgba, |&p| apply(p));
                from_rgba16(&converted, self.format())
            }
        };
        Ok(Bitmap {
            pixels,
            color_space: target.clone(),
        })
    }
}

fn alloc<T: Copy>(width: usize, height: usize, fill: T) -> Result<ImgVec<T>> {
    let len = width
        .checked_mul(height)
        .ok_or_else(|| at(Error::OutOfMemory))?;
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| at(Error::from(e)))?;
    buf.resize(len, fill);
    Ok(ImgVec::new(buf, width, height))
}

fn build<T>(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> ImgVec<T> {
    let mut buf = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            buf.push(f(x, y));
        }
    }
    ImgVec::new(buf, width, height)
}

fn map_img<T, U>(img: &ImgVec<T>, f: impl FnMut(&T) -> U) -> ImgVec<U> {
    let buf: Vec<U> = img.rows().flatten().map(f).collect();
    ImgVec::new(buf, img.width(), img.height())
}

#[inline]
fn pixel<T: Copy>(img: &ImgVec<T>, x: usize, y: usize) -> T {
    img.buf()[y * img.stride() + x]
}

fn crop_img<T: Copy>(img: &ImgVec<T>, x: usize, y: usize, w: usize, h: usize) -> ImgVec<T> {
    build(w, h, |cx, cy| pixel(img, x + cx, y + cy))
}

fn rotate_img<T: Copy>(img: &ImgVec<T>, rotation: Rotation) -> ImgVec<T> {
    let (w, h) = (img.width(), img.height());
    match rotation {
        Rotation::Clockwise90 => build(h, w, |x, y| pixel(img, y, h - 1 - x)),
        Rotation::Rotate180 => build(w, h, |x, y| pixel(img, w - 1 - x, h - 1 - y)),
        Rotation::CounterClockwise90 => build(h, w, |x, y| pixel(img, w - 1 - y, x)),
    }
}

fn mirror_img<T: Copy>(img: &ImgVec<T>, horizontal: bool, vertical: bool) -> ImgVec<T> {
    let (w, h) = (img.width(), img.height());
    build(w, h, |x, y| {
        let sx = if horizontal { w - 1 - x } else { x };
        let sy = if vertical { h - 1 - y } else { y };
        pixel(img, sx, sy)
    })
}

#[inline]
fn bgra(r: u8, g: u8, b: u8, a: u8) -> BGRA<u8> {
    BGRA { b, g, r, a }
}

#[inline]
fn widen(c: Rgba<u8>) -> Rgba<u16> {
    Rgba::new(u8_to_u16(c.r), u8_to_u16(c.g), u8_to_u16(c.b), u8_to_u16(c.a))
}

#[inline]
fn narrow(c: Rgba<u16>) -> Rgba<u8> {
    Rgba::new(u16_to_u8(c.r), u16_to_u8(c.g), u16_to_u8(c.b), u16_to_u8(c.a))
}

#[inline]
pub(crate) fn pack_rgb30(r: u16, g: u16, b: u16) -> u32 {
    0xC000_0000 | (r as u32 & 0x3FF) << 20 | (g as u32 & 0x3FF) << 10 | (b as u32 & 0x3FF)
}

#[inline]
pub(crate) fn unpack_rgb30(v: u32) -> [u16; 3] {
    [
        ((v >> 20) & 0x3FF) as u16,
        ((v >> 10) & 0x3FF) as u16,
        (v & 0x3FF) as u16,
    ]
}

/// BT.709 luma of 16-bit encoded RGB
#[inline]
fn luma16(p: Rgba<u16>) -> u16 {
    (0.2126 * p.r as f32 + 0.7152 * p.g as f32 + 0.0722 * p.b as f32)
        .round()
        .clamp(0.0, 65535.0) as u16
}

fn gray_palette() -> Vec<Rgba<u8>> {
    (0..=255u8).map(|v| Rgba::new(v, v, v, 255)).collect()
}

fn from_rgba16(rgba: &ImgVec<Rgba<u16>>, format: PixelFormat) -> PixelData {
    match format {
        PixelFormat::Mono => PixelData::Mono(map_img(rgba, |&p| luma16(p) >= 0x8000)),
        PixelFormat::Indexed8 => PixelData::Indexed8 {
            pixels: map_img(rgba, |&p| u16_to_u8(luma16(p))),
            palette: gray_palette(),
        },
        PixelFormat::Gray8 => PixelData::Gray8(map_img(rgba, |&p| u16_to_u8(luma16(p)))),
        PixelFormat::Gray16 => PixelData::Gray16(map_img(rgba, |&p| luma16(p))),
        PixelFormat::Rgb8 => PixelData::Rgb8(map_img(rgba, |p| {
            Rgb::new(u16_to_u8(p.r), u16_to_u8(p.g), u16_to_u8(p.b))
        })),
        PixelFormat::Rgbx8 => PixelData::Rgbx8(map_img(rgba, |&p| Rgba {
            a: 255,
            ..narrow(p)
        })),
        PixelFormat::Rgba8 => PixelData::Rgba8(map_img(rgba, |&p| narrow(p))),
        PixelFormat::Bgrx8 => PixelData::Bgrx8(map_img(rgba, |p| {
            bgra(u16_to_u8(p.r), u16_to_u8(p.g), u16_to_u8(p.b), 255)
        })),
        PixelFormat::Bgra8 => PixelData::Bgra8(map_img(rgba, |p| {
            bgra(u16_to_u8(p.r), u16_to_u8(p.g), u16_to_u8(p.b), u16_to_u8(p.a))
        })),
        PixelFormat::Rgb30 => PixelData::Rgb30(map_img(rgba, |p| {
            pack_rgb30(
                scale_from_u16(p.r, 10),
                scale_from_u16(p.g, 10),
                scale_from_u16(p.b, 10),
            )
        })),
        PixelFormat::Rgb16 => PixelData::Rgb16(map_img(rgba, |p| Rgb::new(p.r, p.g, p.b))),
        PixelFormat::Rgbx16 => PixelData::Rgbx16(map_img(rgba, |&p| Rgba { a: 0xFFFF, ..p })),
        PixelFormat::Rgba16 => PixelData::Rgba16(rgba.clone()),
    }
}
