//! Encode then decode through the in-memory codec: only the color conversion is lossy

mod common;

use common::{MemoryEncoder, init_logger};
use imgref::ImgVec;
use rgb::{Rgb, Rgba};
use zenavif_io::{
    AvifReader, AvifWriter, Bitmap, ColorSpace, DecoderConfig, EncoderConfig, PixelData,
    PixelFormat, Primaries, TransferFunction,
};

fn roundtrip(bitmap: &Bitmap, quality: i32) -> Bitmap {
    init_logger();
    let encoder = MemoryEncoder::default();
    let images = encoder.images.clone();
    let mut writer =
        AvifWriter::new(Vec::new(), encoder).with_config(EncoderConfig::new().quality(quality));
    writer.write(bitmap).expect("encode should succeed");
    let file = writer.into_inner();

    let session = common::MemorySession::new(images.borrow().clone());
    let mut reader = AvifReader::new(&file[..], session, DecoderConfig::new());
    reader.read().expect("decode should succeed")
}

fn gradient(width: usize, height: usize) -> Vec<Rgb<u8>> {
    (0..width * height)
        .map(|i| {
            let (x, y) = (i % width, i / width);
            Rgb::new((x * 255 / (width - 1)) as u8, (y * 255 / (height - 1)) as u8, 96)
        })
        .collect()
}

#[test]
fn rgb8_survives_at_full_quality() {
    let src = gradient(16, 8);
    let out = roundtrip(
        &Bitmap::new(PixelData::Rgb8(ImgVec::new(src.clone(), 16, 8))),
        100,
    );
    assert_eq!(out.format(), PixelFormat::Bgrx8);
    assert_eq!((out.width(), out.height()), (16, 8));
    assert_eq!(out.color_space(), &ColorSpace::srgb());
    match out.pixels() {
        PixelData::Bgrx8(img) => {
            for (a, b) in src.iter().zip(img.buf().iter()) {
                assert!(a.r.abs_diff(b.r) <= 3, "{a:?} vs {b:?}");
                assert!(a.g.abs_diff(b.g) <= 3, "{a:?} vs {b:?}");
                assert!(a.b.abs_diff(b.b) <= 3, "{a:?} vs {b:?}");
            }
        }
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn alpha_survives_exactly() {
    let buf: Vec<Rgba<u8>> = (0..16)
        .map(|i| Rgba::new(100, 150, 200, (i * 16) as u8))
        .collect();
    let out = roundtrip(
        &Bitmap::new(PixelData::Rgba8(ImgVec::new(buf.clone(), 4, 4))),
        100,
    );
    assert_eq!(out.format(), PixelFormat::Bgra8);
    match out.pixels() {
        PixelData::Bgra8(img) => {
            let alphas: Vec<u8> = img.buf().iter().map(|p| p.a).collect();
            let expected: Vec<u8> = buf.iter().map(|p| p.a).collect();
            assert_eq!(alphas, expected);
        }
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn gray8_survives_exactly() {
    let samples: Vec<u8> = (0..=255).collect();
    let out = roundtrip(
        &Bitmap::new(PixelData::Gray8(ImgVec::new(samples.clone(), 16, 16))),
        52,
    );
    assert_eq!(out.format(), PixelFormat::Gray8);
    match out.pixels() {
        PixelData::Gray8(img) => {
            for (a, b) in samples.iter().zip(img.buf().iter()) {
                assert!(a.abs_diff(*b) <= 1, "{a} vs {b}");
            }
        }
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn rgb16_goes_through_10bit() {
    let buf: Vec<Rgb<u16>> = (0..16u16)
        .map(|i| Rgb::new(i * 4000, 65535 - i * 4000, 30000))
        .collect();
    let out = roundtrip(
        &Bitmap::new(PixelData::Rgb16(ImgVec::new(buf.clone(), 4, 4))),
        100,
    );
    assert_eq!(out.format(), PixelFormat::Rgbx16);
    match out.pixels() {
        PixelData::Rgbx16(img) => {
            for (a, b) in buf.iter().zip(img.buf().iter()) {
                assert!(a.r.abs_diff(b.r) <= 256, "{a:?} vs {b:?}");
                assert!(a.g.abs_diff(b.g) <= 256, "{a:?} vs {b:?}");
                assert!(a.b.abs_diff(b.b) <= 256, "{a:?} vs {b:?}");
            }
        }
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn display_p3_is_tagged_through_cicp() {
    let src = Bitmap::new(PixelData::Rgb8(ImgVec::new(gradient(4, 4), 4, 4)))
        .with_color_space(ColorSpace::new(Primaries::DciP3D65, TransferFunction::Srgb));
    let out = roundtrip(&src, 100);
    assert_eq!(out.color_space(), &ColorSpace::display_p3());
}
