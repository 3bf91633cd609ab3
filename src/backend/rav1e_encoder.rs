//! AV1 still-image encoding with rav1e, muxed by avif-serialize

use super::mux::{Property, add_item_properties};
use crate::codec::{AlphaPlane, Av1Encoder, CodecImage, EncodeSettings, PlaneSet, Planes};
use crate::error::{Error, Result};
use crate::image::{self, ChromaSampling};
use avif_serialize::Aviffy;
use avif_serialize::constants;
use log::debug;
use rav1e::prelude::{
    ChromaSampling as Rav1eChroma, ColorDescription, ColorPrimaries, Config, EncoderConfig,
    EncoderStatus, MatrixCoefficients, Pixel, PixelRange, SpeedSettings, TransferCharacteristics,
};
use whereat::at;

/// [`Av1Encoder`] backed by rav1e
#[derive(Debug, Clone, Default)]
pub struct Rav1eEncoder;

impl Rav1eEncoder {
    pub fn new() -> Self {
        Self
    }
}

/// Quantizers arrive on the 0..=63 scale; rav1e uses 0..=255
fn rav1e_quantizer(q: u8) -> u8 {
    ((q.min(63) as u16 * 255 + 31) / 63) as u8
}

struct PlaneJob<'a, T> {
    planes: &'a PlaneSet<T>,
    width: usize,
    height: usize,
    depth: u8,
    chroma: Rav1eChroma,
    range: PixelRange,
    color: Option<ColorDescription>,
    min_quantizer: u8,
    max_quantizer: u8,
}

impl<T: Pixel + Default> PlaneJob<'_, T> {
    fn encode(&self, settings: &EncodeSettings) -> Result<Vec<u8>> {
        let enc = EncoderConfig {
            width: self.width,
            height: self.height,
            bit_depth: self.depth as usize,
            chroma_sampling: self.chroma,
            pixel_range: self.range,
            color_description: self.color,
            still_picture: true,
            quantizer: rav1e_quantizer(self.max_quantizer) as usize,
            min_quantizer: rav1e_quantizer(self.min_quantizer),
            speed_settings: SpeedSettings::from_preset(settings.speed),
            ..Default::default()
        };
        let cfg = Config::new()
            .with_encoder_config(enc)
            .with_threads(settings.threads);
        let mut ctx = cfg
            .new_context::<T>()
            .map_err(|e| at(Error::Encode(e.to_string())))?;

        let mut frame = ctx.new_frame();
        let sources = [Some(&self.planes.y), self.planes.u.as_ref(), self.planes.v.as_ref()];
        for (dst, src) in frame.planes.iter_mut().zip(sources) {
            let Some(src) = src else { continue };
            for (dst_row, src_row) in dst.rows_iter_mut().zip(src.rows()) {
                let n = dst_row.len().min(src_row.len());
                dst_row[..n].copy_from_slice(&src_row[..n]);
            }
        }

        ctx.send_frame(frame)
            .map_err(|e| at(Error::Encode(e.to_string())))?;
        ctx.flush();

        let mut out = Vec::new();
        loop {
            match ctx.receive_packet() {
                Ok(packet) => out.extend_from_slice(&packet.data),
                Err(EncoderStatus::Encoded) => {}
                Err(EncoderStatus::LimitReached) => break,
                Err(e) => return Err(at(Error::Encode(e.to_string()))),
            }
        }
        Ok(out)
    }
}

fn rav1e_chroma(sampling: ChromaSampling) -> Rav1eChroma {
    match sampling {
        ChromaSampling::Cs420 => Rav1eChroma::Cs420,
        ChromaSampling::Cs422 => Rav1eChroma::Cs422,
        ChromaSampling::Cs444 => Rav1eChroma::Cs444,
        ChromaSampling::Monochrome => Rav1eChroma::Cs400,
    }
}

fn color_description(img: &CodecImage) -> ColorDescription {
    let color_primaries = match img.primaries {
        image::ColorPrimaries::BT709 => ColorPrimaries::BT709,
        image::ColorPrimaries::BT470M => ColorPrimaries::BT470M,
        image::ColorPrimaries::BT470BG => ColorPrimaries::BT470BG,
        image::ColorPrimaries::BT601 => ColorPrimaries::BT601,
        image::ColorPrimaries::SMPTE240 => ColorPrimaries::SMPTE240,
        image::ColorPrimaries::BT2020 => ColorPrimaries::BT2020,
        image::ColorPrimaries::SMPTE431 => ColorPrimaries::SMPTE431,
        image::ColorPrimaries::SMPTE432 => ColorPrimaries::SMPTE432,
        _ => ColorPrimaries::Unspecified,
    };
    let transfer_characteristics = match img.transfer {
        image::TransferCharacteristics::BT709 => TransferCharacteristics::BT709,
        image::TransferCharacteristics::BT470M => TransferCharacteristics::BT470M,
        image::TransferCharacteristics::BT470BG => TransferCharacteristics::BT470BG,
        image::TransferCharacteristics::BT601 => TransferCharacteristics::BT601,
        image::TransferCharacteristics::LINEAR => TransferCharacteristics::Linear,
        image::TransferCharacteristics::SRGB => TransferCharacteristics::SRGB,
        image::TransferCharacteristics::SMPTE2084 => TransferCharacteristics::SMPTE2084,
        image::TransferCharacteristics::HLG => TransferCharacteristics::HLG,
        _ => TransferCharacteristics::Unspecified,
    };
    let matrix_coefficients = match img.matrix {
        image::MatrixCoefficients::IDENTITY => MatrixCoefficients::Identity,
        image::MatrixCoefficients::BT709 => MatrixCoefficients::BT709,
        image::MatrixCoefficients::BT470BG => MatrixCoefficients::BT470BG,
        image::MatrixCoefficients::BT601 => MatrixCoefficients::BT601,
        image::MatrixCoefficients::SMPTE240 => MatrixCoefficients::SMPTE240,
        image::MatrixCoefficients::BT2020_NCL => MatrixCoefficients::BT2020NCL,
        image::MatrixCoefficients::CHROMAT_NCL => MatrixCoefficients::ChromatNCL,
        _ => MatrixCoefficients::Unspecified,
    };
    ColorDescription {
        color_primaries,
        transfer_characteristics,
        matrix_coefficients,
    }
}

fn colr_primaries(p: image::ColorPrimaries) -> Option<constants::ColorPrimaries> {
    use constants::ColorPrimaries as C;
    Some(match p {
        image::ColorPrimaries::BT709 => C::Bt709,
        image::ColorPrimaries::UNSPECIFIED => C::Unspecified,
        image::ColorPrimaries::BT601 => C::Bt601,
        image::ColorPrimaries::BT2020 => C::Bt2020,
        image::ColorPrimaries::SMPTE431 => C::DciP3,
        image::ColorPrimaries::SMPTE432 => C::DisplayP3,
        _ => return None,
    })
}

#[allow(deprecated)]
fn colr_transfer(t: image::TransferCharacteristics) -> Option<constants::TransferCharacteristics> {
    use constants::TransferCharacteristics as C;
    use image::TransferCharacteristics as T;
    Some(match t {
        T::BT709 => C::Bt709,
        T::UNSPECIFIED => C::Unspecified,
        T::BT470M => C::Bt470M,
        T::BT470BG => C::Bt470BG,
        T::BT601 => C::Bt601,
        T::SMPTE240 => C::Smpte240,
        T::LINEAR => C::Linear,
        T::LOG100 => C::Log,
        T::LOG100_SQRT10 => C::LogSqrt,
        T::IEC61966 => C::Iec61966,
        T::BT1361 => C::Bt1361,
        T::SRGB => C::Srgb,
        T::BT2020_10BIT => C::Bt2020_10,
        T::BT2020_12BIT => C::Bt2020_12,
        T::SMPTE2084 => C::Smpte2084,
        T::SMPTE428 => C::Smpte428,
        T::HLG => C::Hlg,
        _ => return None,
    })
}

fn colr_matrix(m: image::MatrixCoefficients) -> Option<constants::MatrixCoefficients> {
    use constants::MatrixCoefficients as C;
    use image::MatrixCoefficients as M;
    Some(match m {
        M::IDENTITY => C::Rgb,
        M::BT709 => C::Bt709,
        M::UNSPECIFIED => C::Unspecified,
        M::BT601 => C::Bt601,
        M::YCGCO => C::Ycgco,
        M::BT2020_NCL => C::Bt2020Ncl,
        M::BT2020_CL => C::Bt2020Cl,
        _ => return None,
    })
}

/// Wrap encoded AV1 payloads in an AVIF container
///
/// An ICC profile replaces the `nclx` box. CICP codes the muxer cannot name
/// are left to the AV1 sequence header rather than written as something else.
fn mux(img: &CodecImage, color_data: &[u8], alpha_data: Option<&[u8]>) -> Result<Vec<u8>> {
    let mut muxer = Aviffy::new();
    let subsampled = match img.sampling {
        ChromaSampling::Cs420 => (true, true),
        ChromaSampling::Cs422 => (true, false),
        ChromaSampling::Cs444 | ChromaSampling::Monochrome => (false, false),
    };
    muxer
        .set_chroma_subsampling(subsampled)
        .set_monochrome(img.sampling == ChromaSampling::Monochrome)
        .set_premultiplied_alpha(alpha_data.is_some() && img.premultiplied_alpha);

    let mut properties = Vec::new();
    if !img.icc.is_empty() {
        properties.push(Property::IccProfile(img.icc.clone()));
    } else {
        let nclx = (
            colr_primaries(img.primaries),
            colr_transfer(img.transfer),
            colr_matrix(img.matrix),
        );
        match nclx {
            (Some(primaries), Some(transfer), Some(matrix)) => {
                muxer
                    .set_color_primaries(primaries)
                    .set_transfer_characteristics(transfer)
                    .set_matrix_coefficients(matrix)
                    .set_full_color_range(img.range == image::ColorRange::Full);
            }
            _ => debug!(
                "no nclx for CICP {}/{}/{}",
                img.primaries.0, img.transfer.0, img.matrix.0
            ),
        }
    }
    if let Some(clap) = img.transforms.clean_aperture {
        properties.push(Property::CleanAperture(clap));
    }
    if let Some(rotation) = img.transforms.rotation {
        properties.push(Property::Rotation(rotation));
    }
    if let Some(mirror) = img.transforms.mirror {
        properties.push(Property::Mirror(mirror));
    }

    let mut out = Vec::new();
    muxer
        .write(&mut out, color_data, alpha_data, img.width, img.height, img.depth)
        .map_err(|e| at(Error::Encode(format!("AVIF mux failed: {e}"))))?;
    add_item_properties(out, &properties)
}

impl Av1Encoder for Rav1eEncoder {
    fn encode(&mut self, img: &CodecImage, settings: &EncodeSettings) -> Result<Vec<u8>> {
        let width = img.width as usize;
        let height = img.height as usize;
        let range = match img.range {
            image::ColorRange::Full => PixelRange::Full,
            image::ColorRange::Limited => PixelRange::Limited,
        };
        let color = Some(color_description(img));
        let chroma = rav1e_chroma(img.sampling);

        let color_data = match &img.planes {
            Planes::Depth8(planes) => PlaneJob {
                planes,
                width,
                height,
                depth: img.depth,
                chroma,
                range,
                color,
                min_quantizer: settings.min_quantizer,
                max_quantizer: settings.max_quantizer,
            }
            .encode(settings)?,
            Planes::Depth16(planes) => PlaneJob {
                planes,
                width,
                height,
                depth: img.depth,
                chroma,
                range,
                color,
                min_quantizer: settings.min_quantizer,
                max_quantizer: settings.max_quantizer,
            }
            .encode(settings)?,
        };

        let alpha_data = match &img.alpha {
            None => None,
            Some(alpha) => {
                let alpha_range = match img.alpha_range {
                    image::ColorRange::Full => PixelRange::Full,
                    image::ColorRange::Limited => PixelRange::Limited,
                };
                let data = match alpha {
                    AlphaPlane::Depth8(y) => PlaneJob {
                        planes: &PlaneSet {
                            y: y.clone(),
                            u: None,
                            v: None,
                        },
                        width,
                        height,
                        depth: img.depth,
                        chroma: Rav1eChroma::Cs400,
                        range: alpha_range,
                        color: None,
                        min_quantizer: settings.min_quantizer_alpha,
                        max_quantizer: settings.max_quantizer_alpha,
                    }
                    .encode(settings)?,
                    AlphaPlane::Depth16(y) => PlaneJob {
                        planes: &PlaneSet {
                            y: y.clone(),
                            u: None,
                            v: None,
                        },
                        width,
                        height,
                        depth: img.depth,
                        chroma: Rav1eChroma::Cs400,
                        range: alpha_range,
                        color: None,
                        min_quantizer: settings.min_quantizer_alpha,
                        max_quantizer: settings.max_quantizer_alpha,
                    }
                    .encode(settings)?,
                };
                Some(data)
            }
        };

        let out = mux(img, &color_data, alpha_data.as_deref())?;
        debug!(
            "encoded {}x{} depth {} {:?}: {} bytes",
            img.width,
            img.height,
            img.depth,
            img.sampling,
            out.len()
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mux::primary_properties;
    use crate::codec::Plane;
    use crate::image::{
        CleanAperture, ColorPrimaries as Primaries, ColorRange, ImageMirror, ImageRotation,
        MatrixCoefficients as Matrix, TransferCharacteristics as Transfer, Transforms,
    };

    const AV1: &[u8] = &[0x12, 0x00, 0x0A, 0x0B, 0x00, 0x00];

    fn image(primaries: Primaries, transfer: Transfer, matrix: Matrix) -> CodecImage {
        CodecImage {
            width: 4,
            height: 2,
            depth: 8,
            sampling: ChromaSampling::Cs444,
            range: ColorRange::Full,
            primaries,
            transfer,
            matrix,
            icc: Vec::new(),
            planes: Planes::Depth8(PlaneSet {
                y: Plane::new(4, 2),
                u: Some(Plane::new(4, 2)),
                v: Some(Plane::new(4, 2)),
            }),
            alpha: None,
            alpha_range: ColorRange::Full,
            premultiplied_alpha: false,
            transforms: Transforms::default(),
            duration: 0.0,
        }
    }

    fn colr_boxes(file: &[u8]) -> Vec<Vec<u8>> {
        primary_properties(file)
            .unwrap()
            .into_iter()
            .filter(|(typ, _)| typ == b"colr")
            .map(|(_, body)| body)
            .collect()
    }

    fn nclx(primaries: u16, transfer: u16, matrix: u16, full: bool) -> Vec<u8> {
        let mut body = b"nclx".to_vec();
        for v in [primaries, transfer, matrix] {
            body.extend_from_slice(&v.to_be_bytes());
        }
        body.push(if full { 0x80 } else { 0 });
        body
    }

    #[test]
    fn quantizer_scale() {
        assert_eq!(rav1e_quantizer(0), 0);
        assert_eq!(rav1e_quantizer(63), 255);
        assert_eq!(rav1e_quantizer(30), 121);
        assert_eq!(rav1e_quantizer(200), 255);
    }

    #[test]
    fn display_p3_keeps_its_codes() {
        let img = image(Primaries::SMPTE432, Transfer::SRGB, Matrix::BT601);
        let file = mux(&img, AV1, None).unwrap();
        assert_eq!(colr_boxes(&file), vec![nclx(12, 13, 6, true)]);
    }

    #[test]
    fn bt2020_pq_keeps_its_codes() {
        let mut img = image(Primaries::BT2020, Transfer::SMPTE2084, Matrix::BT2020_NCL);
        img.range = ColorRange::Limited;
        let file = mux(&img, AV1, None).unwrap();
        assert_eq!(colr_boxes(&file), vec![nclx(9, 16, 9, false)]);
    }

    #[test]
    fn unnameable_matrix_writes_no_nclx() {
        let img = image(Primaries::SMPTE432, Transfer::SRGB, Matrix::CHROMAT_NCL);
        let file = mux(&img, AV1, None).unwrap();
        assert!(colr_boxes(&file).is_empty());
    }

    #[test]
    fn icc_profile_replaces_nclx() {
        let mut img = image(Primaries::UNSPECIFIED, Transfer::UNSPECIFIED, Matrix::BT601);
        img.icc = b"not really an ICC profile".to_vec();
        let file = mux(&img, AV1, None).unwrap();
        let mut expected = b"prof".to_vec();
        expected.extend_from_slice(&img.icc);
        assert_eq!(colr_boxes(&file), vec![expected]);
    }

    #[test]
    fn transforms_are_written_as_properties() {
        let mut img = image(Primaries::BT709, Transfer::SRGB, Matrix::BT601);
        img.transforms = Transforms {
            clean_aperture: Some(CleanAperture {
                width_n: 2,
                width_d: 1,
                height_n: 2,
                height_d: 1,
                horiz_off_n: 0,
                horiz_off_d: 1,
                vert_off_n: 0,
                vert_off_d: 1,
            }),
            rotation: Some(ImageRotation(3)),
            mirror: Some(ImageMirror(0)),
        };
        let file = mux(&img, AV1, Some(&[1, 2, 3])).unwrap();
        let types: Vec<[u8; 4]> = primary_properties(&file)
            .unwrap()
            .into_iter()
            .map(|(typ, _)| typ)
            .collect();
        let tail = &types[types.len() - 3..];
        assert_eq!(tail, &[*b"clap", *b"irot", *b"imir"][..]);
        let props = primary_properties(&file).unwrap();
        assert!(props.contains(&(*b"irot", vec![3])));
        assert!(props.contains(&(*b"imir", vec![0])));
    }
}
