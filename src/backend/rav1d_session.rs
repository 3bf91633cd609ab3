//! Decode session over zenavif-parse and the rav1d-safe managed API
//!
//! Still images decode the primary item (stitching grid tiles when present)
//! and the auxiliary alpha item, each with a fresh decoder. Sequences keep
//! one decoder alive across frames so inter frames find their references.
//!
//! The primary item's `colr` ICC profile and its `clap`/`irot`/`imir`
//! properties are read once at parse time and attached to every image.

#![deny(unsafe_code)]

use crate::codec::{AlphaPlane, CodecImage, ContainerInfo, DecodeSession, Plane, PlaneSet, Planes};
use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use crate::image::{
    ChromaSampling, CleanAperture, ColorPrimaries, ColorRange, ImageMirror, ImageRotation,
    MatrixCoefficients, TransferCharacteristics, Transforms,
};
use zenavif_parse::{AvifParser, ColorInformation, DecodeConfig, GridConfig, Unstoppable};
use log::{debug, warn};
use rav1d_safe::src::managed::{
    ColorRange as Rav1dColorRange, Decoder as Rav1dDecoder, Frame, PixelLayout, PlaneView8,
    PlaneView16, Planes as FramePlanes, Settings,
};
use whereat::at;

/// [`DecodeSession`] backed by rav1d
pub struct Rav1dSession {
    config: DecoderConfig,
    parser: Option<AvifParser<'static>>,
    properties: ItemProperties,
    /// Kept across sequence frames; dropped on rewind
    sequence_decoder: Option<Rav1dDecoder>,
    animated: bool,
    image_count: usize,
    /// Index the next `next_image` call returns
    cursor: usize,
}

impl Rav1dSession {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            parser: None,
            properties: ItemProperties::default(),
            sequence_decoder: None,
            animated: false,
            image_count: 0,
            cursor: 0,
        }
    }

    fn open_decoder(&self, threads: u32) -> Result<Rav1dDecoder> {
        let mut settings = Settings::default();
        settings.threads = threads;
        settings.apply_grain = self.config.get_apply_grain();
        settings.frame_size_limit = self.config.get_frame_size_limit();
        Rav1dDecoder::with_settings(settings)
            .map_err(|e| at(Error::Decode(format!("failed to create decoder: {e}"))))
    }

    fn parser(&self) -> Result<&AvifParser<'static>> {
        self.parser
            .as_ref()
            .ok_or_else(|| at(Error::Decode("container not parsed".into())))
    }

    fn decode_still(&self) -> Result<CodecImage> {
        let parser = self.parser()?;
        let threads = self.config.effective_threads() as u32;

        let mut image = match parser.grid_config() {
            Some(grid) => self.decode_grid(parser, grid, threads)?,
            None => {
                let data = parser.primary_data().map_err(|e| at(Error::from(e)))?;
                let mut decoder = self.open_decoder(threads)?;
                codec_image(&decode_av1(&mut decoder, &data, true)?)
            }
        };

        if let Some(alpha) = parser.alpha_data() {
            let data = alpha.map_err(|e| at(Error::from(e)))?;
            let mut decoder = self.open_decoder(threads)?;
            let frame = decode_av1(&mut decoder, &data, true)?;
            let plane = alpha_plane(&frame);
            let (w, h) = match &plane {
                AlphaPlane::Depth8(p) => (p.width, p.height),
                AlphaPlane::Depth16(p) => (p.width, p.height),
            };
            if w < image.width as usize || h < image.height as usize {
                warn!("alpha plane {w}x{h} smaller than image, ignoring alpha");
            } else {
                image.alpha = Some(plane);
                image.alpha_range = color_range(frame.color_info().color_range);
                image.premultiplied_alpha = parser.premultiplied_alpha();
            }
        }
        Ok(image)
    }

    /// Decode every tile and copy the planes into one image
    fn decode_grid(
        &self,
        parser: &AvifParser<'static>,
        grid: &GridConfig,
        threads: u32,
    ) -> Result<CodecImage> {
        let rows = grid.rows as usize;
        let cols = grid.columns as usize;
        if parser.grid_tile_count() != rows * cols || rows == 0 || cols == 0 {
            return Err(at(Error::Malformed(
                "tile count does not match grid dimensions".into(),
            )));
        }

        let mut tiles = Vec::with_capacity(rows * cols);
        for index in 0..rows * cols {
            let data = parser.tile_data(index).map_err(|e| at(Error::from(e)))?;
            let mut decoder = self.open_decoder(threads)?;
            tiles.push(codec_image(&decode_av1(&mut decoder, &data, true)?));
        }
        debug!("decoded {rows}x{cols} grid");
        stitch_tiles(tiles, grid)
    }

    /// Decode sequence frame `index` on the shared decoder
    fn decode_sequence_frame(&mut self, index: usize) -> Result<CodecImage> {
        if self.sequence_decoder.is_none() {
            // Single-threaded so every call yields its picture synchronously
            self.sequence_decoder = Some(self.open_decoder(1)?);
        }
        let parser = self
            .parser
            .as_ref()
            .ok_or_else(|| at(Error::Decode("container not parsed".into())))?;
        let decoder = self
            .sequence_decoder
            .as_mut()
            .ok_or_else(|| at(Error::Decode("no sequence decoder".into())))?;

        let frame_ref = parser.frame(index).map_err(|e| at(Error::from(e)))?;
        let frame = decode_av1(decoder, &frame_ref.data, false)?;
        let mut image = codec_image(&frame);
        image.duration = frame_ref.duration_ms as f64 / 1000.0;
        Ok(image)
    }
}

impl DecodeSession for Rav1dSession {
    fn parse(&mut self, data: Vec<u8>) -> Result<ContainerInfo> {
        let config = DecodeConfig::unlimited().lenient(true);
        let parser = AvifParser::from_owned_with_config(data, &config, &Unstoppable)
            .map_err(|e| at(Error::from(e)))?;

        let frames = parser.animation_info().map_or(0, |info| info.frame_count);
        self.animated = frames > 0;
        self.image_count = if self.animated { frames } else { 1 };
        self.properties = ItemProperties::from_parser(&parser);
        self.parser = Some(parser);
        self.sequence_decoder = None;
        self.cursor = 0;
        debug!(
            "parsed container: {} image(s), animated: {}",
            self.image_count, self.animated
        );
        Ok(ContainerInfo {
            image_count: self.image_count,
        })
    }

    fn next_image(&mut self) -> Result<CodecImage> {
        if self.cursor >= self.image_count {
            return Err(at(Error::FrameOutOfRange {
                index: self.cursor,
                count: self.image_count,
            }));
        }
        let mut image = if self.animated {
            self.decode_sequence_frame(self.cursor)?
        } else {
            self.decode_still()?
        };
        self.properties.apply(&mut image);
        self.cursor += 1;
        Ok(image)
    }

    fn nth_image(&mut self, index: usize) -> Result<CodecImage> {
        if index >= self.image_count {
            return Err(at(Error::FrameOutOfRange {
                index,
                count: self.image_count,
            }));
        }
        if index < self.cursor {
            self.reset()?;
        }
        // Frames in between still have to pass through the decoder
        while self.cursor < index {
            self.decode_sequence_frame(self.cursor)?;
            self.cursor += 1;
        }
        self.next_image()
    }

    fn reset(&mut self) -> Result<()> {
        self.sequence_decoder = None;
        self.cursor = 0;
        Ok(())
    }
}

/// Item properties that apply to every decoded image
#[derive(Debug, Clone, Default, PartialEq)]
struct ItemProperties {
    icc: Vec<u8>,
    transforms: Transforms,
}

impl ItemProperties {
    fn from_parser(parser: &AvifParser<'_>) -> Self {
        let icc = match parser.color_info() {
            Some(ColorInformation::IccProfile(data)) => data.to_vec(),
            _ => Vec::new(),
        };
        // irot arrives in degrees anti-clockwise
        let rotation = parser
            .rotation()
            .map(|r| ImageRotation((r.angle / 90 % 4) as u8))
            .filter(|r| r.0 != 0);
        let mirror = parser.mirror().map(|m| ImageMirror(m.axis as u8));
        let clean_aperture = parser.clean_aperture().map(|c| CleanAperture {
            width_n: c.width_n as u32,
            width_d: c.width_d as u32,
            height_n: c.height_n as u32,
            height_d: c.height_d as u32,
            horiz_off_n: c.horiz_off_n as i32,
            horiz_off_d: c.horiz_off_d as u32,
            vert_off_n: c.vert_off_n as i32,
            vert_off_d: c.vert_off_d as u32,
        });
        let properties = Self {
            icc,
            transforms: Transforms {
                clean_aperture,
                rotation,
                mirror,
            },
        };
        if !properties.icc.is_empty() || !properties.transforms.is_empty() {
            debug!(
                "item properties: {} byte ICC profile, {:?}",
                properties.icc.len(),
                properties.transforms
            );
        }
        properties
    }

    fn apply(&self, image: &mut CodecImage) {
        if !self.icc.is_empty() {
            image.icc = self.icc.clone();
        }
        image.transforms = self.transforms;
    }
}

/// Feed one temporal unit and take its picture.
///
/// With `drain`, a picture held back by frame threading is flushed out.
fn decode_av1(decoder: &mut Rav1dDecoder, data: &[u8], drain: bool) -> Result<Frame> {
    let decoded = decoder
        .decode(data)
        .map_err(|e| at(Error::Decode(e.to_string())))?;
    if let Some(frame) = decoded {
        return Ok(frame);
    }
    let pending = decoder
        .get_frame()
        .map_err(|e| at(Error::Decode(e.to_string())))?;
    if let Some(frame) = pending {
        return Ok(frame);
    }
    if drain {
        let flushed = decoder
            .flush()
            .map_err(|e| at(Error::Decode(e.to_string())))?;
        if let Some(frame) = flushed.into_iter().next() {
            return Ok(frame);
        }
    }
    Err(at(Error::Decode("no frame returned from decoder".into())))
}

fn color_range(range: Rav1dColorRange) -> ColorRange {
    match range {
        Rav1dColorRange::Limited => ColorRange::Limited,
        Rav1dColorRange::Full => ColorRange::Full,
    }
}

fn chroma_sampling(layout: PixelLayout) -> ChromaSampling {
    match layout {
        PixelLayout::I400 => ChromaSampling::Monochrome,
        PixelLayout::I420 => ChromaSampling::Cs420,
        PixelLayout::I422 => ChromaSampling::Cs422,
        PixelLayout::I444 => ChromaSampling::Cs444,
    }
}

fn copy_plane8(view: &PlaneView8<'_>) -> Plane<u8> {
    let mut data = Vec::with_capacity(view.width() * view.height());
    for y in 0..view.height() {
        data.extend_from_slice(view.row(y));
    }
    Plane::from_vec(data, view.width(), view.height())
}

fn copy_plane16(view: &PlaneView16<'_>) -> Plane<u16> {
    let mut data = Vec::with_capacity(view.width() * view.height());
    for y in 0..view.height() {
        data.extend_from_slice(view.row(y));
    }
    Plane::from_vec(data, view.width(), view.height())
}

/// Copy a decoded picture out of the decoder's buffers
fn codec_image(frame: &Frame) -> CodecImage {
    let color = frame.color_info();
    let sampling = chroma_sampling(frame.pixel_layout());
    let planes = match frame.planes() {
        FramePlanes::Depth8(p) => Planes::Depth8(PlaneSet {
            y: copy_plane8(&p.y()),
            u: p.u().map(|v| copy_plane8(&v)),
            v: p.v().map(|v| copy_plane8(&v)),
        }),
        FramePlanes::Depth16(p) => Planes::Depth16(PlaneSet {
            y: copy_plane16(&p.y()),
            u: p.u().map(|v| copy_plane16(&v)),
            v: p.v().map(|v| copy_plane16(&v)),
        }),
    };

    CodecImage {
        width: frame.width(),
        height: frame.height(),
        depth: frame.bit_depth(),
        sampling,
        range: color_range(color.color_range),
        primaries: ColorPrimaries(color.primaries as u8),
        transfer: TransferCharacteristics(color.transfer_characteristics as u8),
        matrix: MatrixCoefficients(color.matrix_coefficients as u8),
        icc: Vec::new(),
        planes,
        alpha: None,
        alpha_range: ColorRange::Full,
        premultiplied_alpha: false,
        transforms: Transforms::default(),
        duration: 0.0,
    }
}

fn alpha_plane(frame: &Frame) -> AlphaPlane {
    match frame.planes() {
        FramePlanes::Depth8(p) => AlphaPlane::Depth8(copy_plane8(&p.y())),
        FramePlanes::Depth16(p) => AlphaPlane::Depth16(copy_plane16(&p.y())),
    }
}

/// Copy `src` into `dst` at `(x, y)`, clipped to `dst`
fn blit<T: Copy + Default>(dst: &mut Plane<T>, src: &Plane<T>, x: usize, y: usize) {
    if x >= dst.width || y >= dst.height {
        return;
    }
    let w = src.width.min(dst.width - x);
    let h = src.height.min(dst.height - y);
    for row in 0..h {
        let start = (y + row) * dst.stride + x;
        dst.data[start..start + w].copy_from_slice(&src.row(row)[..w]);
    }
}

fn stitch_set<T: Copy + Default>(
    tiles: &[&PlaneSet<T>],
    cols: usize,
    sampling: ChromaSampling,
    width: usize,
    height: usize,
) -> PlaneSet<T> {
    let mut y = Plane::new(width, height);
    let chroma = sampling.chroma_size(width, height);
    let mut u = chroma.map(|(w, h)| Plane::new(w, h));
    let mut v = chroma.map(|(w, h)| Plane::new(w, h));

    for (i, tile) in tiles.iter().enumerate() {
        let (row, col) = (i / cols, i % cols);
        blit(&mut y, &tile.y, col * tile.y.width, row * tile.y.height);
        for (dst, src) in [(&mut u, &tile.u), (&mut v, &tile.v)] {
            if let (Some(dst), Some(src)) = (dst.as_mut(), src.as_ref()) {
                blit(dst, src, col * src.width, row * src.height);
            }
        }
    }
    PlaneSet { y, u, v }
}

/// Assemble grid tiles into one image of the grid's output size
fn stitch_tiles(tiles: Vec<CodecImage>, grid: &GridConfig) -> Result<CodecImage> {
    let cols = grid.columns as usize;
    let rows = grid.rows as usize;
    let mut iter = tiles.iter();
    let first = iter
        .next()
        .ok_or_else(|| at(Error::Malformed("grid without tiles".into())))?;
    let format = |t: &CodecImage| (t.width, t.height, t.depth, t.sampling);
    if iter.any(|t| format(t) != format(first)) {
        return Err(at(Error::Malformed("grid tiles differ in format".into())));
    }

    let width = match grid.output_width {
        0 => first.width as usize * cols,
        w => w as usize,
    };
    let height = match grid.output_height {
        0 => first.height as usize * rows,
        h => h as usize,
    };

    let planes = match &first.planes {
        Planes::Depth8(_) => {
            let sets: Vec<&PlaneSet<u8>> = tiles
                .iter()
                .filter_map(|t| match &t.planes {
                    Planes::Depth8(p) => Some(p),
                    Planes::Depth16(_) => None,
                })
                .collect();
            Planes::Depth8(stitch_set(&sets, cols, first.sampling, width, height))
        }
        Planes::Depth16(_) => {
            let sets: Vec<&PlaneSet<u16>> = tiles
                .iter()
                .filter_map(|t| match &t.planes {
                    Planes::Depth16(p) => Some(p),
                    Planes::Depth8(_) => None,
                })
                .collect();
            Planes::Depth16(stitch_set(&sets, cols, first.sampling, width, height))
        }
    };
    if tiles.len() != rows * cols {
        return Err(at(Error::Malformed("grid tile count mismatch".into())));
    }

    Ok(CodecImage {
        width: width as u32,
        height: height as u32,
        planes,
        ..first.clone()
    })
}
