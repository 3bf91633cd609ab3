//! Frame encoder: one host bitmap to codec-ready planes and an AVIF file
//!
//! Quality maps onto the codec's 0 (lossless) ..= 63 (worst) quantizer scale.
//! Gray sources without alpha are encoded as a single luma plane with reduced
//! color metadata. Everything else is converted to full-range YUV with the
//! matrix the resolved color metadata names.

use crate::bitmap::{Bitmap, PixelData, PixelFormat};
use crate::codec::{AlphaPlane, Av1Encoder, CodecImage, EncodeSettings, Plane, PlaneSet, Planes};
use crate::config::{EncoderConfig, normalize_quality};
use crate::convert::requantize_to_10bit;
use crate::decoder::check_dimensions;
use crate::error::{Error, Result};
use crate::format::{
    EncodeLayout, chroma_for_quantizer, encode_depth, encode_layout, encode_working_format,
};
use crate::image::{ChromaSampling, ColorRange, Transforms};
use crate::profile::{ColorMetadata, resolve_encode, resolve_gray_encode};
use crate::yuv_convert::{YuvMatrix, rgb_to_yuv};
use imgref::ImgVec;
use log::debug;
use std::borrow::Cow;
use whereat::at;

/// Worst quantizer on the codec scale
pub const WORST_QUALITY: u8 = 63;

/// Lossless quantizer
pub const LOSSLESS: u8 = 0;

/// Parameters derived for one encode call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeParameters {
    pub min_quantizer: u8,
    pub max_quantizer: u8,
    pub min_quantizer_alpha: u8,
    pub max_quantizer_alpha: u8,
    pub chroma: ChromaSampling,
    /// 8 or 10
    pub depth: u8,
    pub layout: EncodeLayout,
}

impl EncodeParameters {
    /// Quantizers for a quality value: `(min, max, min_alpha, max_alpha)`
    pub fn quantizers(quality: i32) -> (u8, u8, u8, u8) {
        let q = normalize_quality(quality);
        let max_q = (WORST_QUALITY as i32 * (100 - q) / 100) as u8;
        let min_q = max_q.saturating_sub(20);
        let max_q_alpha = max_q.saturating_sub(40);
        (min_q, max_q, LOSSLESS, max_q_alpha)
    }

    /// Derive parameters from quality and the source bitmap.
    ///
    /// The depth may still be raised by the color-space resolution.
    pub fn new(quality: i32, bitmap: &Bitmap) -> Self {
        let (min_quantizer, max_quantizer, min_quantizer_alpha, max_quantizer_alpha) =
            Self::quantizers(quality);
        let layout = encode_layout(bitmap);
        let chroma = match layout {
            EncodeLayout::Grayscale => ChromaSampling::Monochrome,
            EncodeLayout::Color => chroma_for_quantizer(max_quantizer),
        };
        Self {
            min_quantizer,
            max_quantizer,
            min_quantizer_alpha,
            max_quantizer_alpha,
            chroma,
            depth: encode_depth(bitmap.format()),
            layout,
        }
    }

    pub(crate) fn settings(&self, config: &EncoderConfig) -> EncodeSettings {
        EncodeSettings {
            threads: config.effective_threads(),
            min_quantizer: self.min_quantizer,
            max_quantizer: self.max_quantizer,
            min_quantizer_alpha: self.min_quantizer_alpha,
            max_quantizer_alpha: self.max_quantizer_alpha,
            speed: config.get_speed(),
        }
    }
}

/// Convert a bitmap into the codec's planar input.
///
/// Returns the image together with the parameters used, so callers can pass
/// the matching [`EncodeSettings`] on.
pub fn prepare_image(bitmap: &Bitmap, quality: i32) -> Result<(CodecImage, EncodeParameters)> {
    let width = u32::try_from(bitmap.width()).unwrap_or(u32::MAX);
    let height = u32::try_from(bitmap.height()).unwrap_or(u32::MAX);
    check_dimensions(width, height)?;

    let mut params = EncodeParameters::new(quality, bitmap);
    let image = match params.layout {
        EncodeLayout::Grayscale => {
            let metadata = resolve_gray_encode(bitmap.color_space());
            let planes = gray_planes(bitmap, params.depth)?;
            codec_image(width, height, &params, metadata, planes, None)
        }
        EncodeLayout::Color => {
            let resolution = resolve_encode(bitmap.color_space());
            if resolution.upgrade_depth {
                params.depth = 10;
            }
            // Widen before converting so the extra depth carries the converted values
            let source = match &resolution.convert_to {
                Some(target) => {
                    let working = encode_working_format(
                        EncodeLayout::Color,
                        params.depth,
                        bitmap.has_alpha_channel(),
                    );
                    let widened = bitmap.convert_to_format(working);
                    Cow::Owned(widened.convert_to_color_space(target)?)
                }
                None => Cow::Borrowed(bitmap),
            };
            let metadata = resolution.metadata;
            let matrix = YuvMatrix::from_cicp(metadata.matrix, metadata.primaries);
            let (planes, alpha) = color_planes(&source, &params, matrix)?;
            codec_image(width, height, &params, metadata, planes, alpha)
        }
    };

    debug!(
        "encoding {}x{} {:?} depth {} {:?}, quantizers {}..{} alpha {}..{}",
        width,
        height,
        params.layout,
        params.depth,
        params.chroma,
        params.min_quantizer,
        params.max_quantizer,
        params.min_quantizer_alpha,
        params.max_quantizer_alpha
    );
    Ok((image, params))
}

/// Encode one bitmap into a complete AVIF file
pub fn encode_bitmap<E: Av1Encoder + ?Sized>(
    bitmap: &Bitmap,
    config: &EncoderConfig,
    encoder: &mut E,
) -> Result<Vec<u8>> {
    let (image, params) = prepare_image(bitmap, config.get_quality())?;
    encoder.encode(&image, &params.settings(config))
}

fn codec_image(
    width: u32,
    height: u32,
    params: &EncodeParameters,
    metadata: ColorMetadata,
    planes: Planes,
    alpha: Option<AlphaPlane>,
) -> CodecImage {
    CodecImage {
        width,
        height,
        depth: params.depth,
        sampling: params.chroma,
        range: ColorRange::Full,
        primaries: metadata.primaries,
        transfer: metadata.transfer,
        matrix: metadata.matrix,
        icc: metadata.icc,
        planes,
        alpha,
        alpha_range: ColorRange::Full,
        premultiplied_alpha: false,
        transforms: Transforms::default(),
        duration: 0.0,
    }
}

fn gray_planes(bitmap: &Bitmap, depth: u8) -> Result<Planes> {
    let working = encode_working_format(EncodeLayout::Grayscale, depth, false);
    match bitmap.convert_to_format(working).into_pixels() {
        PixelData::Gray16(img) => Ok(Planes::Depth16(PlaneSet {
            y: plane_from(&img, |&v| requantize_to_10bit(v)),
            u: None,
            v: None,
        })),
        PixelData::Gray8(img) => Ok(Planes::Depth8(PlaneSet {
            y: plane_from(&img, |&v| v),
            u: None,
            v: None,
        })),
        other => Err(at(Error::Encode(format!(
            "unexpected working format {:?}",
            other.format()
        )))),
    }
}

fn color_planes(
    source: &Bitmap,
    params: &EncodeParameters,
    matrix: YuvMatrix,
) -> Result<(Planes, Option<AlphaPlane>)> {
    let has_alpha = source.has_alpha_channel();
    let working = encode_working_format(EncodeLayout::Color, params.depth, has_alpha);
    let converted = source.convert_to_format(working);
    let (w, h) = (converted.width(), converted.height());
    let (depth, chroma) = (params.depth, params.chroma);

    let result = match converted.pixels() {
        PixelData::Rgba16(img) | PixelData::Rgbx16(img) => {
            let planes = rgb_to_yuv(w, h, depth, chroma, matrix, |x, y| {
                let p = img.buf()[y * img.stride() + x];
                [p.r, p.g, p.b].map(|c| c as f32 / 65535.0)
            });
            let alpha = (working == PixelFormat::Rgba16)
                .then(|| AlphaPlane::Depth16(plane_from(img, |p| requantize_to_10bit(p.a))));
            (planes, alpha)
        }
        PixelData::Rgba8(img) => {
            let planes = rgb_to_yuv(w, h, depth, chroma, matrix, |x, y| {
                let p = img.buf()[y * img.stride() + x];
                [p.r, p.g, p.b].map(|c| c as f32 / 255.0)
            });
            (planes, Some(AlphaPlane::Depth8(plane_from(img, |p| p.a))))
        }
        PixelData::Rgb8(img) => {
            let planes = rgb_to_yuv(w, h, depth, chroma, matrix, |x, y| {
                let p = img.buf()[y * img.stride() + x];
                [p.r, p.g, p.b].map(|c| c as f32 / 255.0)
            });
            (planes, None)
        }
        other => {
            return Err(at(Error::Encode(format!(
                "unexpected working format {:?}",
                other.format()
            ))));
        }
    };
    Ok(result)
}

fn plane_from<T, U: Copy + Default>(img: &ImgVec<T>, f: impl Fn(&T) -> U) -> Plane<U> {
    let data = img.rows().flatten().map(f).collect();
    Plane::from_vec(data, img.width(), img.height())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colorspace::{ColorSpace, Primaries, TransferFunction};
    use crate::image::{ColorPrimaries, MatrixCoefficients, TransferCharacteristics};
    use rgb::{Rgb, Rgba};

    fn rgb8(w: usize, h: usize) -> Bitmap {
        let buf = (0..w * h).map(|i| Rgb::new(i as u8, 100, 200)).collect();
        Bitmap::new(PixelData::Rgb8(ImgVec::new(buf, w, h)))
    }

    #[test]
    fn quantizer_table() {
        assert_eq!(EncodeParameters::quantizers(52), (10, 30, 0, 0));
        assert_eq!(EncodeParameters::quantizers(100), (0, 0, 0, 0));
        assert_eq!(EncodeParameters::quantizers(0), (43, 63, 0, 23));
        // Out-of-range values follow the option rules
        assert_eq!(EncodeParameters::quantizers(250), (0, 0, 0, 0));
        assert_eq!(
            EncodeParameters::quantizers(-1),
            EncodeParameters::quantizers(52)
        );
    }

    #[test]
    fn high_quality_uses_full_chroma() {
        let b = rgb8(4, 4);
        assert_eq!(EncodeParameters::new(100, &b).chroma, ChromaSampling::Cs444);
        // maxQ 63 * 15 / 100 = 9
        assert_eq!(EncodeParameters::new(85, &b).chroma, ChromaSampling::Cs444);
        // maxQ 63 * 20 / 100 = 12
        assert_eq!(EncodeParameters::new(80, &b).chroma, ChromaSampling::Cs422);
        assert_eq!(EncodeParameters::new(52, &b).chroma, ChromaSampling::Cs420);
    }

    #[test]
    fn srgb_rgb8_stays_8bit() {
        let (image, params) = prepare_image(&rgb8(3, 2), 100).unwrap();
        assert_eq!(params.depth, 8);
        assert_eq!(image.primaries, ColorPrimaries::BT709);
        assert_eq!(image.transfer, TransferCharacteristics::SRGB);
        assert_eq!(image.matrix, MatrixCoefficients::BT709);
        assert!(image.alpha.is_none());
        assert!(matches!(image.planes, Planes::Depth8(_)));
    }

    #[test]
    fn unknown_transfer_upgrades_depth() {
        let b = rgb8(2, 2).with_color_space(ColorSpace::new(
            Primaries::Srgb,
            TransferFunction::Gamma(1.8),
        ));
        let (image, params) = prepare_image(&b, 52).unwrap();
        assert_eq!(params.depth, 10);
        assert_eq!(image.transfer, TransferCharacteristics::SRGB);
        assert!(matches!(image.planes, Planes::Depth16(_)));
    }

    #[test]
    fn depth_upgrade_happens_before_color_conversion() {
        let buf = (0..=255u8).map(|v| Rgb::new(v, v, v)).collect();
        let b = Bitmap::new(PixelData::Rgb8(ImgVec::new(buf, 256, 1))).with_color_space(
            ColorSpace::new(Primaries::DciP3D65, TransferFunction::Gamma(1.8)),
        );
        let (image, params) = prepare_image(&b, 100).unwrap();
        assert_eq!(params.depth, 10);
        let Planes::Depth16(p) = image.planes else {
            panic!("expected 16-bit planes");
        };
        // Input level 1 is below one 8-bit step after conversion but not below a 10-bit one
        assert_eq!(p.y.data[0], 0);
        assert!(p.y.data[1] > 0, "{:?}", &p.y.data[..4]);
        let mut levels = p.y.data.clone();
        levels.dedup();
        assert_eq!(levels.len(), 256);
    }

    #[test]
    fn gray16_is_requantized_to_10bit() {
        let img = ImgVec::new(vec![0u16, 32768, 65535, 64], 2, 2);
        let b = Bitmap::new(PixelData::Gray16(img));
        let (image, params) = prepare_image(&b, 52).unwrap();
        assert_eq!(params.layout, EncodeLayout::Grayscale);
        assert_eq!(image.sampling, ChromaSampling::Monochrome);
        match image.planes {
            Planes::Depth16(p) => {
                assert_eq!(p.y.data, vec![0, 512, 1023, 1]);
                assert!(p.u.is_none());
            }
            _ => panic!("expected 16-bit planes"),
        }
    }

    #[test]
    fn gray_with_invalid_space_keeps_codec_defaults() {
        let img = ImgVec::new(vec![7u8; 4], 2, 2);
        let b = Bitmap::new(PixelData::Gray8(img)).with_color_space(ColorSpace::default());
        let (image, _) = prepare_image(&b, 52).unwrap();
        assert_eq!(image.primaries, ColorPrimaries::UNSPECIFIED);
        assert_eq!(image.matrix, MatrixCoefficients::BT601);
    }

    #[test]
    fn alpha_gets_its_own_plane() {
        let buf = vec![Rgba::new(10u8, 20, 30, 40); 4];
        let b = Bitmap::new(PixelData::Rgba8(ImgVec::new(buf, 2, 2)));
        let (image, _) = prepare_image(&b, 52).unwrap();
        match image.alpha {
            Some(AlphaPlane::Depth8(a)) => assert_eq!(a.data, vec![40; 4]),
            other => panic!("expected 8-bit alpha, got {other:?}"),
        }
    }

    #[test]
    fn oversized_bitmap_is_rejected() {
        let b = Bitmap::allocate(PixelFormat::Gray8, 40000, 1).unwrap();
        let err = prepare_image(&b, 52).unwrap_err();
        assert!(matches!(err.into_inner(), Error::ImageTooLarge { .. }));
    }
}
