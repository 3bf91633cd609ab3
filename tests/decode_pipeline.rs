//! One codec image through the full decode pipeline: formats, color, alpha, transforms

mod common;

use common::{color_frame, gray_frame, gray_frame_from, gray_values, init_logger};
use zenavif_io::{
    AlphaPlane, AvifReader, ChromaUpsampling, CleanAperture, CodecImage, ColorPrimaries,
    ColorRange, ColorSpace, DecoderConfig, Error, ImageMirror, ImageOption, ImageRotation,
    OptionValue, PixelData, PixelFormat, Plane, PlaneSet, Planes, TransferCharacteristics,
    decode_frame,
};

fn decode(image: &CodecImage) -> zenavif_io::Bitmap {
    init_logger();
    decode_frame(image, ChromaUpsampling::Bilinear).expect("decode should succeed")
}

fn clap(width: u32, height: u32, denominator: u32) -> CleanAperture {
    CleanAperture {
        width_n: width,
        width_d: denominator,
        height_n: height,
        height_d: denominator,
        horiz_off_n: 0,
        horiz_off_d: 1,
        vert_off_n: 0,
        vert_off_d: 1,
    }
}

#[test]
fn mono_8bit_decodes_to_gray8() {
    let bitmap = decode(&gray_frame(3, 2, 120));
    assert_eq!(bitmap.format(), PixelFormat::Gray8);
    assert_eq!((bitmap.width(), bitmap.height()), (3, 2));
    assert_eq!(gray_values(&bitmap), vec![120; 6]);
}

#[test]
fn color_without_alpha_decodes_to_bgrx8() {
    let bitmap = decode(&color_frame(4, 4));
    assert_eq!(bitmap.format(), PixelFormat::Bgrx8);
    assert!(!bitmap.has_alpha_channel());
    match bitmap.pixels() {
        PixelData::Bgrx8(img) => {
            for px in img.buf().iter() {
                // Neutral chroma decodes to gray
                assert!(px.r.abs_diff(px.g) <= 1 && px.g.abs_diff(px.b) <= 1, "{px:?}");
                assert_eq!(px.a, 255);
            }
        }
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn alpha_decodes_to_bgra8() {
    let mut image = color_frame(2, 2);
    image.alpha = Some(AlphaPlane::Depth8(Plane::from_vec(vec![128, 0, 255, 64], 2, 2)));
    let bitmap = decode(&image);
    assert_eq!(bitmap.format(), PixelFormat::Bgra8);
    match bitmap.pixels() {
        PixelData::Bgra8(img) => {
            let alphas: Vec<u8> = img.buf().iter().map(|p| p.a).collect();
            assert_eq!(alphas, vec![128, 0, 255, 64]);
        }
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn limited_range_alpha_is_expanded() {
    let mut image = color_frame(2, 1);
    image.alpha = Some(AlphaPlane::Depth8(Plane::from_vec(vec![16, 235], 2, 1)));
    image.alpha_range = ColorRange::Limited;
    let bitmap = decode(&image);
    match bitmap.pixels() {
        PixelData::Bgra8(img) => {
            let alphas: Vec<u8> = img.buf().iter().map(|p| p.a).collect();
            assert_eq!(alphas, vec![0, 255]);
        }
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn ten_bit_mono_decodes_to_gray16() {
    let image = CodecImage {
        depth: 10,
        planes: Planes::Depth16(PlaneSet {
            y: Plane::from_vec(vec![0, 1023], 2, 1),
            u: None,
            v: None,
        }),
        ..gray_frame(2, 1, 0)
    };
    let bitmap = decode(&image);
    assert_eq!(bitmap.format(), PixelFormat::Gray16);
    match bitmap.pixels() {
        PixelData::Gray16(img) => {
            let values: &[u16] = img.buf();
            assert!(values[0] <= 64, "{values:?}");
            assert!(values[1] >= 65535 - 64, "{values:?}");
        }
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn ten_bit_alpha_keeps_16bit_rgba() {
    let image = CodecImage {
        depth: 10,
        sampling: zenavif_io::ChromaSampling::Cs444,
        planes: Planes::Depth16(PlaneSet {
            y: Plane::from_vec(vec![512; 4], 2, 2),
            u: Some(Plane::from_vec(vec![512; 4], 2, 2)),
            v: Some(Plane::from_vec(vec![512; 4], 2, 2)),
        }),
        alpha: Some(AlphaPlane::Depth16(Plane::from_vec(vec![1023; 4], 2, 2))),
        ..gray_frame(2, 2, 0)
    };
    let bitmap = decode(&image);
    assert_eq!(bitmap.format(), PixelFormat::Rgba16);
    match bitmap.pixels() {
        PixelData::Rgba16(img) => assert!(img.buf().iter().all(|p| p.a == 0xFFFF)),
        other => panic!("unexpected {:?}", other.format()),
    }
}

#[test]
fn mismatched_alpha_depth_is_an_error() {
    let mut image = color_frame(2, 2);
    image.alpha = Some(AlphaPlane::Depth16(Plane::from_vec(vec![0; 4], 2, 2)));
    let err = decode_frame(&image, ChromaUpsampling::Bilinear).unwrap_err();
    assert!(matches!(err.into_inner(), Error::Decode(_)));
}

#[test]
fn cicp_codes_become_color_space() {
    let bitmap = decode(&gray_frame(1, 1, 0));
    assert_eq!(bitmap.color_space(), &ColorSpace::srgb());

    let mut image = gray_frame(1, 1, 0);
    image.primaries = ColorPrimaries::SMPTE432;
    assert_eq!(decode(&image).color_space(), &ColorSpace::display_p3());

    image.primaries = ColorPrimaries::BT709;
    image.transfer = TransferCharacteristics::LINEAR;
    assert_eq!(decode(&image).color_space(), &ColorSpace::srgb_linear());
}

#[test]
fn corrupt_icc_still_decodes() {
    let mut image = gray_frame(2, 2, 100);
    image.icc = vec![0xde, 0xad, 0xbe, 0xef];
    let bitmap = decode(&image);
    assert_eq!(gray_values(&bitmap), vec![100; 4]);
    assert!(!bitmap.color_space().is_valid());
    assert_eq!(
        bitmap.color_space().icc_profile(),
        Some(&[0xde, 0xad, 0xbe, 0xef][..])
    );
}

#[test]
fn clean_aperture_crops_centered() {
    let samples: Vec<u8> = (0..16).map(|i| (i * 10) as u8).collect();
    let mut image = gray_frame_from(4, 4, &samples);
    image.transforms.clean_aperture = Some(clap(2, 2, 1));
    let bitmap = decode(&image);
    assert_eq!((bitmap.width(), bitmap.height()), (2, 2));
    assert_eq!(gray_values(&bitmap), vec![50, 60, 90, 100]);
}

#[test]
fn zero_denominator_clap_is_ignored() {
    let mut image = gray_frame(4, 3, 0);
    image.transforms.clean_aperture = Some(clap(2, 2, 0));
    let bitmap = decode(&image);
    assert_eq!((bitmap.width(), bitmap.height()), (4, 3));
}

#[test]
fn rotation_turns_anticlockwise() {
    // [10 20]
    let mut image = gray_frame_from(2, 1, &[10, 20]);
    image.transforms.rotation = Some(ImageRotation(1));
    let bitmap = decode(&image);
    assert_eq!((bitmap.width(), bitmap.height()), (1, 2));
    assert_eq!(gray_values(&bitmap), vec![20, 10]);

    image.transforms.rotation = Some(ImageRotation(3));
    assert_eq!(gray_values(&decode(&image)), vec![10, 20]);

    image.transforms.rotation = Some(ImageRotation(2));
    let bitmap = decode(&image);
    assert_eq!((bitmap.width(), bitmap.height()), (2, 1));
    assert_eq!(gray_values(&bitmap), vec![20, 10]);
}

#[test]
fn mirror_axes() {
    let mut image = gray_frame_from(2, 2, &[10, 20, 30, 40]);
    image.transforms.mirror = Some(ImageMirror(0));
    assert_eq!(gray_values(&decode(&image)), vec![30, 40, 10, 20]);

    image.transforms.mirror = Some(ImageMirror(1));
    assert_eq!(gray_values(&decode(&image)), vec![20, 10, 40, 30]);
}

#[test]
fn transforms_apply_crop_then_rotate_then_mirror() {
    // 3x1 [10 20 30], crop to the left 2 columns, rotate anticlockwise, flip vertically
    let mut image = gray_frame_from(3, 1, &[10, 20, 30]);
    image.transforms.clean_aperture = Some(CleanAperture {
        horiz_off_n: -1,
        horiz_off_d: 2,
        ..clap(2, 1, 1)
    });
    image.transforms.rotation = Some(ImageRotation(1));
    image.transforms.mirror = Some(ImageMirror(0));
    let bitmap = decode(&image);
    assert_eq!((bitmap.width(), bitmap.height()), (1, 2));
    assert_eq!(gray_values(&bitmap), vec![10, 20]);
}

#[test]
fn oversized_frame_is_rejected() {
    let image = gray_frame(1, 32769, 0);
    let err = decode_frame(&image, ChromaUpsampling::Bilinear).unwrap_err();
    assert!(matches!(err.into_inner(), Error::ImageTooLarge { .. }));
}

#[test]
fn reader_size_option_reflects_rotation() {
    init_logger();
    let mut image = gray_frame(4, 2, 0);
    image.transforms.rotation = Some(ImageRotation(1));
    let mut reader = AvifReader::new(
        std::io::Cursor::new(common::avif_header()),
        common::MemorySession::new(vec![image]),
        DecoderConfig::new(),
    );
    assert_eq!(
        reader.option(ImageOption::Size),
        Some(OptionValue::Size {
            width: 2,
            height: 4
        })
    );
}
