//! In-memory codec fixtures shared by the integration tests

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use zenavif_io::{
    Av1Encoder, Bitmap, ChromaSampling, CodecImage, ColorPrimaries, ColorRange, ContainerInfo,
    DecodeSession, EncodeSettings, Error, MatrixCoefficients, PixelData, Plane, PlaneSet, Planes, Result,
    TransferCharacteristics, Transforms,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Minimal `ftyp` box with the `avif` major brand
pub fn avif_header() -> Vec<u8> {
    let mut out = 20u32.to_be_bytes().to_vec();
    out.extend_from_slice(b"ftypavif");
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(b"mif1");
    out
}

/// Full-range 8-bit monochrome frame filled with `value`
pub fn gray_frame(width: u32, height: u32, value: u8) -> CodecImage {
    let plane = Plane::from_vec(
        vec![value; width as usize * height as usize],
        width as usize,
        height as usize,
    );
    CodecImage {
        width,
        height,
        depth: 8,
        sampling: ChromaSampling::Monochrome,
        range: ColorRange::Full,
        primaries: ColorPrimaries::BT709,
        transfer: TransferCharacteristics::SRGB,
        matrix: MatrixCoefficients::BT601,
        icc: Vec::new(),
        planes: Planes::Depth8(PlaneSet {
            y: plane,
            u: None,
            v: None,
        }),
        alpha: None,
        alpha_range: ColorRange::Full,
        premultiplied_alpha: false,
        transforms: Transforms::default(),
        duration: 0.0,
    }
}

/// Full-range 8-bit monochrome frame from row-major samples
pub fn gray_frame_from(width: u32, height: u32, samples: &[u8]) -> CodecImage {
    let mut image = gray_frame(width, height, 0);
    image.planes = Planes::Depth8(PlaneSet {
        y: Plane::from_vec(samples.to_vec(), width as usize, height as usize),
        u: None,
        v: None,
    });
    image
}

/// Same frame with a presentation duration in seconds
pub fn timed(mut image: CodecImage, duration: f64) -> CodecImage {
    image.duration = duration;
    image
}

/// Row-major samples of a `Gray8` bitmap, snapped to multiples of 10 to
/// absorb fixed-point rounding in the YUV conversion
pub fn gray_values(bitmap: &Bitmap) -> Vec<u8> {
    match bitmap.pixels() {
        PixelData::Gray8(img) => img
            .rows()
            .flatten()
            .map(|&v| ((v as u16 + 5) / 10 * 10).min(250) as u8)
            .collect(),
        other => panic!("expected Gray8, got {:?}", other.format()),
    }
}

/// Full-range 8-bit 4:4:4 frame with neutral chroma and a luma ramp
pub fn color_frame(width: u32, height: u32) -> CodecImage {
    let (w, h) = (width as usize, height as usize);
    let luma: Vec<u8> = (0..w * h).map(|i| (i * 255 / (w * h - 1).max(1)) as u8).collect();
    CodecImage {
        sampling: ChromaSampling::Cs444,
        planes: Planes::Depth8(PlaneSet {
            y: Plane::from_vec(luma, w, h),
            u: Some(Plane::from_vec(vec![128; w * h], w, h)),
            v: Some(Plane::from_vec(vec![128; w * h], w, h)),
        }),
        ..gray_frame(width, height, 0)
    }
}

/// Value of the top-left luma sample
pub fn first_luma(image: &CodecImage) -> u16 {
    match &image.planes {
        Planes::Depth8(p) => p.y.data[0] as u16,
        Planes::Depth16(p) => p.y.data[0],
    }
}

/// Decode session over a fixed list of images
pub struct MemorySession {
    images: Vec<CodecImage>,
    cursor: usize,
    /// Every image index handed out, in order
    pub log: Rc<RefCell<Vec<usize>>>,
    pub resets: Rc<RefCell<usize>>,
}

impl MemorySession {
    pub fn new(images: Vec<CodecImage>) -> Self {
        Self {
            images,
            cursor: 0,
            log: Rc::default(),
            resets: Rc::default(),
        }
    }

    fn take(&mut self, index: usize) -> Result<CodecImage> {
        let image = self.images.get(index).cloned().ok_or_else(|| {
            whereat::at(Error::FrameOutOfRange {
                index,
                count: self.images.len(),
            })
        })?;
        self.log.borrow_mut().push(index);
        self.cursor = index + 1;
        Ok(image)
    }
}

impl DecodeSession for MemorySession {
    fn parse(&mut self, data: Vec<u8>) -> Result<ContainerInfo> {
        if !data.starts_with(&avif_header()) {
            return Err(whereat::at(Error::Malformed("unknown test container".into())));
        }
        self.cursor = 0;
        Ok(ContainerInfo {
            image_count: self.images.len(),
        })
    }

    fn next_image(&mut self) -> Result<CodecImage> {
        self.take(self.cursor)
    }

    fn nth_image(&mut self, index: usize) -> Result<CodecImage> {
        self.take(index)
    }

    fn reset(&mut self) -> Result<()> {
        self.cursor = 0;
        *self.resets.borrow_mut() += 1;
        Ok(())
    }
}

/// Encoder that keeps every image verbatim and emits a header plus an index
#[derive(Default)]
pub struct MemoryEncoder {
    pub images: Rc<RefCell<Vec<CodecImage>>>,
    pub settings: Rc<RefCell<Vec<EncodeSettings>>>,
}

impl MemoryEncoder {
    /// A session that replays what this encoder stored
    pub fn session(&self) -> MemorySession {
        MemorySession::new(self.images.borrow().clone())
    }
}

impl Av1Encoder for MemoryEncoder {
    fn encode(&mut self, image: &CodecImage, settings: &EncodeSettings) -> Result<Vec<u8>> {
        let mut images = self.images.borrow_mut();
        let mut out = avif_header();
        out.extend_from_slice(&(images.len() as u32).to_be_bytes());
        images.push(image.clone());
        self.settings.borrow_mut().push(*settings);
        Ok(out)
    }
}
