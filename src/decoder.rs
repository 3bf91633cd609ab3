//! Frame decoder: one codec image to one color-correct host bitmap
//!
//! The steps run in a fixed order: allocate the working buffer, attach the
//! resolved color space, convert YUV to RGB and merge alpha, then apply the
//! clean aperture crop, rotation and mirror, and finally convert into the
//! output format. Geometric metadata that cannot be honored is logged and
//! skipped, never fatal.

use crate::bitmap::{Bitmap, PixelData, Rotation};
use crate::codec::{AlphaPlane, CodecImage, Planes};
use crate::config::ChromaUpsampling;
use crate::convert::{add_alpha8, add_alpha16};
use crate::error::{Error, Result};
use crate::format::decode_formats;
use crate::image::{CleanAperture, ImageMirror, ImageRotation};
use crate::profile::resolve_decode;
use crate::yuv_convert::{YuvLayout, YuvMatrix, yuv_to_rgba8, yuv_to_rgba16};
use log::{debug, warn};
use whereat::at;

/// Largest width or height accepted in either direction
pub const MAX_DIMENSION: u32 = 32768;

/// Reject zero and oversized dimensions
pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(at(Error::EmptyImage));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(at(Error::ImageTooLarge { width, height }));
    }
    Ok(())
}

/// Decode one codec image into a bitmap
pub fn decode_frame(image: &CodecImage, upsampling: ChromaUpsampling) -> Result<Bitmap> {
    check_dimensions(image.width, image.height)?;
    let width = image.width as usize;
    let height = image.height as usize;

    let formats = decode_formats(image.depth, image.has_alpha(), image.sampling);
    debug!(
        "decoding {}x{} depth {} {:?}: working {:?}, output {:?}",
        width, height, image.depth, image.sampling, formats.working, formats.output
    );

    let mut bitmap = Bitmap::allocate(formats.working, width, height)?;
    bitmap.set_color_space(resolve_decode(&image.icc, image.primaries, image.transfer));

    convert_planes(image, upsampling, &mut bitmap)?;

    if let Some(clap) = image.transforms.clean_aperture {
        bitmap = apply_clean_aperture(bitmap, &clap);
    }
    if let Some(rotation) = image.transforms.rotation {
        bitmap = apply_rotation(bitmap, rotation);
    }
    if let Some(mirror) = image.transforms.mirror {
        bitmap = apply_mirror(bitmap, mirror);
    }

    if bitmap.format() != formats.output {
        bitmap = bitmap.convert_to_format(formats.output);
    }
    Ok(bitmap)
}

/// YUV→RGB into the working buffer, then merge the alpha plane
fn convert_planes(
    image: &CodecImage,
    upsampling: ChromaUpsampling,
    bitmap: &mut Bitmap,
) -> Result<()> {
    let layout = YuvLayout {
        sampling: image.sampling,
        range: image.range.into(),
        matrix: YuvMatrix::from_cicp(image.matrix, image.primaries),
        upsampling,
    };

    match (bitmap.pixels_mut(), &image.planes) {
        (PixelData::Rgba8(img) | PixelData::Rgbx8(img), Planes::Depth8(planes)) => {
            yuv_to_rgba8(planes, &layout, img)?;
        }
        (PixelData::Rgba16(img) | PixelData::Rgbx16(img), Planes::Depth16(planes)) => {
            yuv_to_rgba16(planes, image.depth, &layout, img)?;
        }
        _ => {
            return Err(at(Error::Decode(format!(
                "sample storage does not match bit depth {}",
                image.depth
            ))));
        }
    }

    match (bitmap.pixels_mut(), &image.alpha) {
        (_, None) => Ok(()),
        (PixelData::Rgba8(img), Some(AlphaPlane::Depth8(alpha))) => {
            add_alpha8(img, alpha, image.alpha_range, image.premultiplied_alpha)
        }
        (PixelData::Rgba16(img), Some(AlphaPlane::Depth16(alpha))) => add_alpha16(
            img,
            alpha,
            image.alpha_range,
            image.depth,
            image.premultiplied_alpha,
        ),
        _ => Err(at(Error::Decode(
            "alpha plane depth does not match color planes".into(),
        ))),
    }
}

/// Crop rectangle `(x, y, width, height)` for a clean aperture box.
///
/// Returns `None` when the box is unusable: a zero denominator (logged) or an
/// empty crop size.
pub fn clean_aperture_rect(
    clap: &CleanAperture,
    width: usize,
    height: usize,
) -> Option<(usize, usize, usize, usize)> {
    if clap.width_d == 0 || clap.height_d == 0 || clap.horiz_off_d == 0 || clap.vert_off_d == 0 {
        warn!("wrong values in clean aperture box");
        return None;
    }

    let crop_w = ((clap.width_n as f64 / clap.width_d as f64 + 0.5) as usize).min(width);
    let crop_h = ((clap.height_n as f64 / clap.height_d as f64 + 0.5) as usize).min(height);
    if crop_w == 0 || crop_h == 0 {
        return None;
    }

    let offset = |off_n: i32, off_d: u32, full: usize, crop: usize| -> usize {
        let centered = off_n as f64 / off_d as f64 + (full - crop) as f64 / 2.0 + 0.5;
        (centered as i64).clamp(0, (full - crop) as i64) as usize
    };
    let x = offset(clap.horiz_off_n, clap.horiz_off_d, width, crop_w);
    let y = offset(clap.vert_off_n, clap.vert_off_d, height, crop_h);
    Some((x, y, crop_w, crop_h))
}

fn apply_clean_aperture(bitmap: Bitmap, clap: &CleanAperture) -> Bitmap {
    match clean_aperture_rect(clap, bitmap.width(), bitmap.height()) {
        Some((x, y, w, h)) if (w, h) != (bitmap.width(), bitmap.height()) => {
            debug!("clean aperture crop {w}x{h} at ({x}, {y})");
            bitmap.copy(x, y, w, h).unwrap_or(bitmap)
        }
        _ => bitmap,
    }
}

/// `irot` counts anti-clockwise quarter turns
fn apply_rotation(bitmap: Bitmap, rotation: ImageRotation) -> Bitmap {
    match rotation.0 {
        0 => bitmap,
        1 => bitmap.rotated(Rotation::CounterClockwise90),
        2 => bitmap.rotated(Rotation::Rotate180),
        3 => bitmap.rotated(Rotation::Clockwise90),
        other => {
            warn!("ignoring invalid rotation code {other}");
            bitmap
        }
    }
}

fn apply_mirror(bitmap: Bitmap, mirror: ImageMirror) -> Bitmap {
    match mirror.0 {
        0 => bitmap.mirrored(false, true),
        1 => bitmap.mirrored(true, false),
        other => {
            warn!("ignoring invalid mirror axis {other}");
            bitmap
        }
    }
}
