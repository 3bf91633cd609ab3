//! Encode with rav1e, decode with rav1d
#![cfg(all(feature = "rav1d", feature = "rav1e"))]

use imgref::ImgVec;
use rgb::{Rgb, Rgba};
use zenavif_io::{
    Av1Encoder, Bitmap, ChromaSampling, CleanAperture, CodecImage, ColorPrimaries, ColorRange,
    ColorSpace, EncodeSettings, EncoderConfig, ImageCodec, ImageMirror, ImageRotation,
    MatrixCoefficients, NativeCodec, PixelData, PixelFormat, Plane, PlaneSet, Planes,
    Rav1eEncoder, TransferCharacteristics, Transforms, probe,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gradient(width: usize, height: usize) -> Bitmap {
    let buf = (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            Rgb::new((x * 4) as u8, (y * 4) as u8, 128)
        })
        .collect();
    Bitmap::new(PixelData::Rgb8(ImgVec::new(buf, width, height)))
}

fn mean_abs_error(a: &[u8], b: &[u8]) -> f64 {
    let total: u64 = a.iter().zip(b).map(|(x, y)| x.abs_diff(*y) as u64).sum();
    total as f64 / a.len() as f64
}

#[test]
fn rgb8_roundtrip() {
    init_logger();
    let codec = NativeCodec::new();
    let src = gradient(64, 48);
    let file = codec
        .encode(&src, &EncoderConfig::new().quality(90).speed(10))
        .expect("encode should succeed");
    assert!(probe::is_avif(&file));

    let out = codec.decode(&file).expect("decode should succeed");
    assert_eq!(out.format(), PixelFormat::Bgrx8);
    assert_eq!((out.width(), out.height()), (64, 48));

    let (PixelData::Rgb8(a), PixelData::Bgrx8(b)) = (src.pixels(), out.pixels()) else {
        panic!("unexpected formats");
    };
    let a: Vec<u8> = a.buf().iter().flat_map(|p| [p.r, p.g, p.b]).collect();
    let b: Vec<u8> = b.buf().iter().flat_map(|p| [p.r, p.g, p.b]).collect();
    let err = mean_abs_error(&a, &b);
    assert!(err < 4.0, "mean error {err}");
}

#[test]
fn alpha_roundtrip() {
    init_logger();
    let codec = NativeCodec::new();
    let buf = (0..32 * 32)
        .map(|i| Rgba::new(200, 80, 40, (i % 32 * 8) as u8))
        .collect();
    let src = Bitmap::new(PixelData::Rgba8(ImgVec::new(buf, 32, 32)));
    let file = codec
        .encode(&src, &EncoderConfig::new().quality(100).speed(10))
        .expect("encode should succeed");

    let out = codec.decode(&file).expect("decode should succeed");
    assert_eq!(out.format(), PixelFormat::Bgra8);
    let (PixelData::Rgba8(a), PixelData::Bgra8(b)) = (src.pixels(), out.pixels()) else {
        panic!("unexpected formats");
    };
    let a: Vec<u8> = a.buf().iter().map(|p| p.a).collect();
    let b: Vec<u8> = b.buf().iter().map(|p| p.a).collect();
    let err = mean_abs_error(&a, &b);
    assert!(err < 2.0, "mean alpha error {err}");
}

#[test]
fn gray_roundtrip_stays_gray() {
    init_logger();
    let codec = NativeCodec::new();
    let buf = (0..40 * 24).map(|i| (i % 40 * 6) as u8).collect();
    let src = Bitmap::new(PixelData::Gray8(ImgVec::new(buf, 40, 24)));
    let file = codec
        .encode(&src, &EncoderConfig::new().quality(90).speed(10))
        .expect("encode should succeed");
    let out = codec.decode(&file).expect("decode should succeed");
    assert_eq!(out.format(), PixelFormat::Gray8);
    assert_eq!((out.width(), out.height()), (40, 24));
}

#[test]
fn garbage_is_rejected() {
    init_logger();
    let err = NativeCodec::new()
        .decode(b"\0\0\0\x14ftypavif\0\0\0\0mif1 truncated")
        .unwrap_err();
    assert!(!matches!(err.into_inner(), zenavif_io::Error::ContainerFailed));
}

#[test]
fn icc_profile_survives_roundtrip() {
    init_logger();
    let codec = NativeCodec::new();
    let profile = b"opaque profile bytes".to_vec();
    let src = gradient(16, 16).with_color_space(ColorSpace::from_icc_profile(&profile));
    let file = codec
        .encode(&src, &EncoderConfig::new().quality(90).speed(10))
        .expect("encode should succeed");
    let out = codec.decode(&file).expect("decode should succeed");
    assert_eq!(out.color_space().icc_profile(), Some(&profile[..]));
}

#[test]
fn transforms_survive_roundtrip() {
    init_logger();
    let (width, height) = (8, 4);
    let image = CodecImage {
        width: width as u32,
        height: height as u32,
        depth: 8,
        sampling: ChromaSampling::Monochrome,
        range: ColorRange::Full,
        primaries: ColorPrimaries::BT709,
        transfer: TransferCharacteristics::SRGB,
        matrix: MatrixCoefficients::BT601,
        icc: Vec::new(),
        planes: Planes::Depth8(PlaneSet {
            y: Plane::from_vec(vec![128; width * height], width, height),
            u: None,
            v: None,
        }),
        alpha: None,
        alpha_range: ColorRange::Full,
        premultiplied_alpha: false,
        transforms: Transforms {
            clean_aperture: Some(CleanAperture {
                width_n: 6,
                width_d: 1,
                height_n: 2,
                height_d: 1,
                horiz_off_n: 0,
                horiz_off_d: 1,
                vert_off_n: 0,
                vert_off_d: 1,
            }),
            rotation: Some(ImageRotation(1)),
            mirror: Some(ImageMirror(1)),
        },
        duration: 0.0,
    };
    let settings = EncodeSettings {
        threads: 1,
        min_quantizer: 0,
        max_quantizer: 10,
        min_quantizer_alpha: 0,
        max_quantizer_alpha: 10,
        speed: 10,
    };
    let file = Rav1eEncoder::new()
        .encode(&image, &settings)
        .expect("encode should succeed");

    // 6x2 crop, then a quarter turn
    let out = NativeCodec::new().decode(&file).expect("decode should succeed");
    assert_eq!((out.width(), out.height()), (2, 6));
}
