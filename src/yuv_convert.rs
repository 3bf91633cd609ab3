//! YUV ↔ RGB color space conversion
//!
//! Decode uses the `yuv` crate's bulk converters where they cover the frame
//! (monochrome, and 10/12-bit color with a standard matrix and bilinear
//! upsampling). Everything else goes through the scalar path below, which
//! handles any depth, identity (GBR) coding, matrices derived from the
//! primaries, and nearest-neighbor chroma.
//!
//! Encode always produces full-range YUV.
//!
//! References:
//! - ITU-R BT.601 (SD video)
//! - ITU-R BT.709 (HD video)
//! - ITU-R BT.2020 (UHD video)
//! - ITU-T H.273 (chromaticity-derived matrices)

use crate::codec::{Plane, PlaneSet, Planes};
use crate::config::ChromaUpsampling;
use crate::convert::scale_to_u16;
use crate::error::{Error, Result};
use crate::image::{ChromaSampling, ColorPrimaries, ColorRange, MatrixCoefficients};
use crate::profile::primaries_points;
use imgref::ImgVec;
use rgb::Rgba;
use whereat::at;
use yuv::{YuvGrayImage, YuvPlanarImage, YuvStandardMatrix};

/// YUV color range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YuvRange {
    /// Limited/studio range: Y [16..235], UV [16..240] for 8-bit
    Limited,
    /// Full range: Y [0..255], UV [0..255] for 8-bit
    Full,
}

impl From<ColorRange> for YuvRange {
    fn from(range: ColorRange) -> Self {
        match range {
            ColorRange::Limited => YuvRange::Limited,
            ColorRange::Full => YuvRange::Full,
        }
    }
}

/// YUV matrix coefficients (color space)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum YuvMatrix {
    /// ITU-R BT.601 (SD video, NTSC/PAL)
    Bt601,
    /// ITU-R BT.709 (HD video)
    Bt709,
    /// ITU-R BT.2020 (UHD video, HDR)
    Bt2020,
    /// SMPTE 240M
    Smpte240,
    /// No matrix: Y carries G, U carries B, V carries R
    Identity,
    /// Kr/Kb computed from the primaries (matrix codes 12 and 13)
    Derived { kr: f32, kb: f32 },
}

impl YuvMatrix {
    /// Pick the matrix for a frame. Unknown codes use BT.601.
    pub fn from_cicp(matrix: MatrixCoefficients, primaries: ColorPrimaries) -> Self {
        match matrix {
            MatrixCoefficients::IDENTITY => YuvMatrix::Identity,
            MatrixCoefficients::BT709 => YuvMatrix::Bt709,
            MatrixCoefficients::BT2020_NCL | MatrixCoefficients::BT2020_CL => YuvMatrix::Bt2020,
            MatrixCoefficients::SMPTE240 => YuvMatrix::Smpte240,
            MatrixCoefficients::CHROMAT_NCL | MatrixCoefficients::CHROMAT_CL => {
                derived_coefficients(primaries)
                    .map(|(kr, kb)| YuvMatrix::Derived { kr, kb })
                    .unwrap_or(YuvMatrix::Bt601)
            }
            _ => YuvMatrix::Bt601,
        }
    }

    fn standard(self) -> Option<YuvStandardMatrix> {
        match self {
            YuvMatrix::Bt601 => Some(YuvStandardMatrix::Bt601),
            YuvMatrix::Bt709 => Some(YuvStandardMatrix::Bt709),
            YuvMatrix::Bt2020 => Some(YuvStandardMatrix::Bt2020),
            YuvMatrix::Smpte240 => Some(YuvStandardMatrix::Smpte240),
            YuvMatrix::Identity | YuvMatrix::Derived { .. } => None,
        }
    }
}

/// Luma weights of red and blue from the primaries' RGB→XYZ Y row
fn derived_coefficients(primaries: ColorPrimaries) -> Option<(f32, f32)> {
    let m = primaries_points(primaries).rgb_to_xyz()?;
    let (kr, kb) = (m.0[1][0] as f32, m.0[1][2] as f32);
    (kr > 0.0 && kb > 0.0 && kr + kb < 1.0).then_some((kr, kb))
}

/// Get matrix coefficients (Kr, Kb) for the specified color space
fn matrix_coefficients(matrix: YuvMatrix) -> (f32, f32) {
    match matrix {
        // ITU-R BT.601 (SD)
        YuvMatrix::Bt601 => (0.299, 0.114),
        // ITU-R BT.709 (HD)
        YuvMatrix::Bt709 => (0.2126, 0.0722),
        // ITU-R BT.2020 (UHD)
        YuvMatrix::Bt2020 => (0.2627, 0.0593),
        YuvMatrix::Smpte240 => (0.212, 0.087),
        YuvMatrix::Derived { kr, kb } => (kr, kb),
        // Unused: identity coding bypasses the matrix
        YuvMatrix::Identity => (0.299, 0.114),
    }
}

/// How one frame's planes are interpreted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YuvLayout {
    pub sampling: ChromaSampling,
    pub range: YuvRange,
    pub matrix: YuvMatrix,
    pub upsampling: ChromaUpsampling,
}

/// Per-depth normalization of code values to `[0, 1]` luma and `[-0.5, 0.5]` chroma
#[derive(Debug, Clone, Copy)]
struct Normalize {
    y_offset: f32,
    y_scale: f32,
    uv_center: f32,
    uv_scale: f32,
}

impl Normalize {
    fn new(depth: u8, range: YuvRange) -> Self {
        let max = ((1u32 << depth) - 1) as f32;
        let uv_center = (1u32 << (depth - 1)) as f32;
        let step = (1u32 << (depth - 8)) as f32;
        match range {
            YuvRange::Full => Self {
                y_offset: 0.0,
                y_scale: 1.0 / max,
                uv_center,
                uv_scale: 1.0 / max,
            },
            YuvRange::Limited => Self {
                y_offset: 16.0 * step,
                y_scale: 1.0 / (219.0 * step),
                uv_center,
                uv_scale: 1.0 / (224.0 * step),
            },
        }
    }

    #[inline]
    fn luma(&self, v: f32) -> f32 {
        (v - self.y_offset) * self.y_scale
    }

    #[inline]
    fn chroma(&self, v: f32) -> f32 {
        (v - self.uv_center) * self.uv_scale
    }
}

/// Convert normalized YUV to normalized RGB using the given matrix coefficients
#[inline]
fn yuv_to_rgb(y: f32, u: f32, v: f32, kr: f32, kg: f32, kb: f32) -> [f32; 3] {
    let vr = 2.0 * (1.0 - kr);
    let ug = -2.0 * kb * (1.0 - kb) / kg;
    let vg = -2.0 * kr * (1.0 - kr) / kg;
    let ub = 2.0 * (1.0 - kb);

    let r = y + vr * v;
    let g = y + ug * u + vg * v;
    let b = y + ub * u;

    [r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)]
}

/// Sample a chroma plane at a luma position
#[inline]
fn sample_chroma<T: Copy + Into<u32>>(
    plane: &Plane<T>,
    x: usize,
    y: usize,
    sampling: ChromaSampling,
    upsampling: ChromaUpsampling,
) -> f32 {
    let fetch = |cx: usize, cy: usize| Into::<u32>::into(plane.data[cy * plane.stride + cx]) as f32;
    match sampling {
        ChromaSampling::Cs444 | ChromaSampling::Monochrome => fetch(x, y),
        // For 4:2:2, chroma is at half horizontal resolution
        ChromaSampling::Cs422 => fetch((x / 2).min(plane.width - 1), y),
        ChromaSampling::Cs420 if upsampling == ChromaUpsampling::Fastest => {
            fetch((x / 2).min(plane.width - 1), (y / 2).min(plane.height - 1))
        }
        ChromaSampling::Cs420 => {
            let chroma_width = plane.width;
            let chroma_height = plane.height;

            // Map luma position to chroma position (with 0.5 offset for centering)
            let chroma_x_raw = (x as f32 + 0.5) * 0.5 - 0.5;
            let chroma_y_raw = (y as f32 + 0.5) * 0.5 - 0.5;

            // Clamp to valid range BEFORE calculating floor
            let chroma_x = chroma_x_raw.max(0.0).min(chroma_width as f32 - 1.0);
            let chroma_y = chroma_y_raw.max(0.0).min(chroma_height as f32 - 1.0);

            let cx0 = chroma_x.floor() as usize;
            let cy0 = chroma_y.floor() as usize;
            let cx1 = (cx0 + 1).min(chroma_width - 1);
            let cy1 = (cy0 + 1).min(chroma_height - 1);

            let fx = chroma_x - cx0 as f32;
            let fy = chroma_y - cy0 as f32;
            let fx1 = 1.0 - fx;
            let fy1 = 1.0 - fy;

            fetch(cx0, cy0) * fx1 * fy1
                + fetch(cx1, cy0) * fx * fy1
                + fetch(cx0, cy1) * fx1 * fy
                + fetch(cx1, cy1) * fx * fy
        }
    }
}

fn check_planes<T: Copy + Default>(
    planes: &PlaneSet<T>,
    sampling: ChromaSampling,
    width: usize,
    height: usize,
) -> Result<()> {
    if !planes.y.is_consistent() || planes.y.width < width || planes.y.height < height {
        return Err(at(Error::Decode("luma plane smaller than frame".into())));
    }
    if let Some((cw, ch)) = sampling.chroma_size(width, height) {
        for plane in [&planes.u, &planes.v] {
            let plane = plane
                .as_ref()
                .ok_or_else(|| at(Error::Decode("missing chroma plane".into())))?;
            if !plane.is_consistent() || plane.width < cw || plane.height < ch {
                return Err(at(Error::Decode("chroma plane smaller than frame".into())));
            }
        }
    }
    Ok(())
}

/// Scalar conversion of any depth, writing normalized RGB through `store`.
fn convert_scalar<T: Copy + Default + Into<u32>>(
    planes: &PlaneSet<T>,
    depth: u8,
    layout: &YuvLayout,
    width: usize,
    height: usize,
    mut store: impl FnMut(usize, usize, [f32; 3]),
) {
    let norm = Normalize::new(depth, layout.range);
    let (kr, kb) = matrix_coefficients(layout.matrix);
    let kg = 1.0 - kr - kb;
    let chroma = planes.u.as_ref().zip(planes.v.as_ref());

    for y in 0..height {
        let y_row = planes.y.row(y);
        for x in 0..width {
            let y_val = Into::<u32>::into(y_row[x]) as f32;
            let rgb = match chroma {
                None => {
                    let l = norm.luma(y_val).clamp(0.0, 1.0);
                    [l, l, l]
                }
                Some((u_plane, v_plane)) => {
                    let u_val = sample_chroma(u_plane, x, y, layout.sampling, layout.upsampling);
                    let v_val = sample_chroma(v_plane, x, y, layout.sampling, layout.upsampling);
                    if layout.matrix == YuvMatrix::Identity {
                        [norm.luma(v_val), norm.luma(y_val), norm.luma(u_val)]
                            .map(|c| c.clamp(0.0, 1.0))
                    } else {
                        yuv_to_rgb(
                            norm.luma(y_val),
                            norm.chroma(u_val),
                            norm.chroma(v_val),
                            kr,
                            kg,
                            kb,
                        )
                    }
                }
            };
            store(x, y, rgb);
        }
    }
}

fn fill_alpha<T: Copy>(img: &mut ImgVec<Rgba<T>>, opaque: T) {
    for row in img.rows_mut() {
        for px in row {
            px.a = opaque;
        }
    }
}

/// Convert 8-bit planes into an RGBA buffer of the same size. Alpha is set opaque.
pub fn yuv_to_rgba8(
    planes: &PlaneSet<u8>,
    layout: &YuvLayout,
    out: &mut ImgVec<Rgba<u8>>,
) -> Result<()> {
    let (width, height) = (out.width(), out.height());
    check_planes(planes, layout.sampling, width, height)?;

    if layout.sampling == ChromaSampling::Monochrome && out.stride() == width {
        let gray = YuvGrayImage {
            y_plane: planes.y.data.as_slice(),
            y_stride: planes.y.stride as u32,
            width: width as u32,
            height: height as u32,
        };
        yuv::yuv400_to_rgba(
            &gray,
            bytemuck::cast_slice_mut(out.buf_mut().as_mut_slice()),
            width as u32 * 4,
            to_yuv_range(layout.range),
            layout.matrix.standard().unwrap_or(YuvStandardMatrix::Bt601),
        )
        .map_err(|e| at(Error::ColorConversion(e)))?;
    } else {
        let stride = out.stride();
        let buf = out.buf_mut();
        convert_scalar(planes, 8, layout, width, height, |x, y, [r, g, b]| {
            buf[y * stride + x] = Rgba::new(
                (r * 255.0).round() as u8,
                (g * 255.0).round() as u8,
                (b * 255.0).round() as u8,
                255,
            );
        });
    }

    fill_alpha(out, 255);
    Ok(())
}

/// Convert 10/12-bit planes into a full-range 16-bit RGBA buffer. Alpha is set opaque.
pub fn yuv_to_rgba16(
    planes: &PlaneSet<u16>,
    depth: u8,
    layout: &YuvLayout,
    out: &mut ImgVec<Rgba<u16>>,
) -> Result<()> {
    if !(9..=16).contains(&depth) {
        return Err(at(Error::Unsupported("bit depth")));
    }
    let (width, height) = (out.width(), out.height());
    check_planes(planes, layout.sampling, width, height)?;

    let bulk = out.stride() == width
        && matches!(depth, 10 | 12)
        && (layout.sampling == ChromaSampling::Monochrome
            || (layout.upsampling != ChromaUpsampling::Fastest && layout.matrix.standard().is_some()));

    if bulk {
        convert_bulk16(planes, depth, layout, width, height, out)?;
        for px in out.buf_mut().iter_mut() {
            px.r = scale_to_u16(px.r, depth);
            px.g = scale_to_u16(px.g, depth);
            px.b = scale_to_u16(px.b, depth);
        }
    } else {
        let stride = out.stride();
        let buf = out.buf_mut();
        convert_scalar(planes, depth, layout, width, height, |x, y, [r, g, b]| {
            buf[y * stride + x] = Rgba::new(
                (r * 65535.0).round() as u16,
                (g * 65535.0).round() as u16,
                (b * 65535.0).round() as u16,
                0xFFFF,
            );
        });
    }

    fill_alpha(out, 0xFFFF);
    Ok(())
}

fn to_yuv_range(range: YuvRange) -> yuv::YuvRange {
    match range {
        YuvRange::Full => yuv::YuvRange::Full,
        YuvRange::Limited => yuv::YuvRange::Limited,
    }
}

/// Native-depth conversion through the `yuv` crate
fn convert_bulk16(
    planes: &PlaneSet<u16>,
    depth: u8,
    layout: &YuvLayout,
    width: usize,
    height: usize,
    out: &mut ImgVec<Rgba<u16>>,
) -> Result<()> {
    let range = to_yuv_range(layout.range);
    let matrix = layout.matrix.standard().unwrap_or(YuvStandardMatrix::Bt601);
    let rgb_stride = width as u32 * 4;
    let dst: &mut [u16] = bytemuck::cast_slice_mut(out.buf_mut().as_mut_slice());

    let result = match (&planes.u, &planes.v) {
        (Some(u), Some(v)) if layout.sampling != ChromaSampling::Monochrome => {
            let planar = YuvPlanarImage {
                y_plane: planes.y.data.as_slice(),
                y_stride: planes.y.stride as u32,
                u_plane: u.data.as_slice(),
                u_stride: u.stride as u32,
                v_plane: v.data.as_slice(),
                v_stride: v.stride as u32,
                width: width as u32,
                height: height as u32,
            };
            match (depth, layout.sampling) {
                (10, ChromaSampling::Cs420) => {
                    yuv::i010_to_rgba10(&planar, dst, rgb_stride, range, matrix)
                }
                (10, ChromaSampling::Cs422) => {
                    yuv::i210_to_rgba10(&planar, dst, rgb_stride, range, matrix)
                }
                (10, _) => yuv::i410_to_rgba10(&planar, dst, rgb_stride, range, matrix),
                (_, ChromaSampling::Cs420) => {
                    yuv::i012_to_rgba12(&planar, dst, rgb_stride, range, matrix)
                }
                (_, ChromaSampling::Cs422) => {
                    yuv::i212_to_rgba12(&planar, dst, rgb_stride, range, matrix)
                }
                (_, _) => yuv::i412_to_rgba12(&planar, dst, rgb_stride, range, matrix),
            }
        }
        _ => {
            let gray = YuvGrayImage {
                y_plane: planes.y.data.as_slice(),
                y_stride: planes.y.stride as u32,
                width: width as u32,
                height: height as u32,
            };
            match depth {
                10 => yuv::y010_to_rgba10(&gray, dst, rgb_stride, range, matrix),
                _ => yuv::y012_to_rgba12(&gray, dst, rgb_stride, range, matrix),
            }
        }
    };
    result.map_err(|e| at(Error::ColorConversion(e)))
}

/// Convert normalized RGB into full-range YUV planes at `depth` bits.
///
/// `pixel(x, y)` returns RGB in `[0, 1]`. Subsampled chroma averages the
/// covered luma positions.
pub fn rgb_to_yuv(
    width: usize,
    height: usize,
    depth: u8,
    sampling: ChromaSampling,
    matrix: YuvMatrix,
    pixel: impl Fn(usize, usize) -> [f32; 3],
) -> Planes {
    let max = ((1u32 << depth) - 1) as f32;
    let center = (1u32 << (depth - 1)) as f32;
    let (kr, kb) = matrix_coefficients(matrix);
    let kg = 1.0 - kr - kb;
    let quantize = |v: f32| (v * max).round().clamp(0.0, max) as u16;
    let quantize_chroma = |v: f32| (v * max + center).round().clamp(0.0, max) as u16;

    let identity = matrix == YuvMatrix::Identity;
    let luma = |[r, g, b]: [f32; 3]| {
        if identity { g } else { kr * r + kg * g + kb * b }
    };
    // Chroma components as (U, V), centered on zero
    let chroma = |[r, g, b]: [f32; 3]| {
        if identity {
            (b - 0.5, r - 0.5)
        } else {
            let y = kr * r + kg * g + kb * b;
            ((b - y) / (2.0 * (1.0 - kb)), (r - y) / (2.0 * (1.0 - kr)))
        }
    };

    let mut y_plane = Plane::new(width, height);
    for y in 0..height {
        for x in 0..width {
            y_plane.data[y * width + x] = quantize(luma(pixel(x, y)));
        }
    }

    let (u_plane, v_plane) = match sampling.chroma_size(width, height) {
        None => (None, None),
        Some((cw, ch)) => {
            let (sx, sy) = match sampling {
                ChromaSampling::Cs420 => (2, 2),
                ChromaSampling::Cs422 => (2, 1),
                _ => (1, 1),
            };
            let mut u_plane = Plane::new(cw, ch);
            let mut v_plane = Plane::new(cw, ch);
            for cy in 0..ch {
                for cx in 0..cw {
                    let (mut su, mut sv, mut n) = (0.0f32, 0.0f32, 0.0f32);
                    for y in cy * sy..((cy + 1) * sy).min(height) {
                        for x in cx * sx..((cx + 1) * sx).min(width) {
                            let (u, v) = chroma(pixel(x, y));
                            su += u;
                            sv += v;
                            n += 1.0;
                        }
                    }
                    u_plane.data[cy * cw + cx] = quantize_chroma(su / n);
                    v_plane.data[cy * cw + cx] = quantize_chroma(sv / n);
                }
            }
            (Some(u_plane), Some(v_plane))
        }
    };

    if depth <= 8 {
        let narrow = |p: Plane<u16>| Plane {
            data: p.data.iter().map(|&v| v as u8).collect(),
            width: p.width,
            height: p.height,
            stride: p.stride,
        };
        Planes::Depth8(PlaneSet {
            y: narrow(y_plane),
            u: u_plane.map(narrow),
            v: v_plane.map(narrow),
        })
    } else {
        Planes::Depth16(PlaneSet {
            y: y_plane,
            u: u_plane,
            v: v_plane,
        })
    }
}
