//! # zenavif-io
//!
//! AVIF image reader and writer that turns AV1 frames into color-correct host
//! bitmaps and back.
//!
//! The AV1 codec sits behind two traits, [`DecodeSession`] and
//! [`Av1Encoder`]. This crate does everything around it: YUV↔RGB
//! conversion, alpha merging, clean aperture crop, rotation and mirroring,
//! color-space resolution from CICP codes or ICC profiles, output format
//! selection, quantizer derivation, and frame sequencing for animations.
//!
//! ## Quick Start
//!
//! ```no_run
//! # #[cfg(feature = "rav1d")]
//! # {
//! use zenavif_io::{ImageCodec, NativeCodec};
//!
//! let avif_data = std::fs::read("image.avif").unwrap();
//! let bitmap = NativeCodec::new().decode(&avif_data).unwrap();
//! println!("{}x{} {:?}", bitmap.width(), bitmap.height(), bitmap.format());
//! # }
//! ```
//!
//! ## Animations
//!
//! ```no_run
//! # #[cfg(feature = "rav1d")]
//! # {
//! use zenavif_io::{ImageCodec, NativeCodec};
//!
//! let file = std::fs::File::open("animation.avif").unwrap();
//! let mut reader = NativeCodec::new().open(std::io::BufReader::new(file));
//! for _ in 0..reader.image_count() {
//!     let frame = reader.read().unwrap();
//!     let delay_ms = reader.next_image_delay();
//!     println!("{}x{} for {delay_ms} ms", frame.width(), frame.height());
//! }
//! # }
//! ```
//!
//! ## Features
//!
//! - **`rav1d`** (default): decoding through zenavif-parse and rav1d-safe's
//!   managed API (no unsafe code in the decode path)
//! - **`rav1e`**: encoding through rav1e and avif-serialize
//!
//! ## Configuration
//!
//! ```
//! use zenavif_io::{ChromaUpsampling, DecoderConfig, EncoderConfig};
//!
//! let decoder = DecoderConfig::new()
//!     .threads(4)
//!     .apply_grain(true)
//!     .chroma_upsampling(ChromaUpsampling::Bilinear);
//! let encoder = EncoderConfig::new().quality(80).speed(6);
//! # let _ = (decoder, encoder);
//! ```

pub mod backend;
mod bitmap;
mod codec;
mod colorspace;
mod config;
mod convert;
mod decoder;
mod encoder;
mod error;
mod format;
mod handler;
pub mod icc;
mod image;
pub mod probe;
pub mod profile;
mod sequence;
mod yuv_convert;

#[cfg(feature = "rav1d")]
pub use backend::Rav1dSession;
#[cfg(feature = "rav1e")]
pub use backend::Rav1eEncoder;
pub use backend::{NativeCodec, UnavailableEncoder};
pub use bitmap::{Bitmap, PixelData, PixelFormat, Rotation};
pub use codec::{
    AlphaPlane, Av1Encoder, CodecImage, ContainerInfo, DecodeSession, EncodeSettings, Plane,
    PlaneSet, Planes,
};
pub use colorspace::{
    Chromaticity, ColorSpace, ColorTransform, Colorimetry, Primaries, PrimaryPoints,
    TransferFunction,
};
pub use config::{ChromaUpsampling, DecoderConfig, EncoderConfig, worker_threads};
pub use convert::{add_alpha8, add_alpha16, unpremultiply8, unpremultiply16};
pub use decoder::{MAX_DIMENSION, clean_aperture_rect, decode_frame};
pub use encoder::{EncodeParameters, encode_bitmap, prepare_image};
pub use error::{Error, Result};
pub use format::{
    DecodeFormats, EncodeLayout, chroma_for_quantizer, decode_formats, encode_layout,
};
pub use handler::{
    AvifReader, AvifWriter, Capabilities, ImageCodec, ImageOption, OptionValue, can_read,
    capabilities,
};
pub use image::{
    ChromaSampling, CleanAperture, ColorPrimaries, ColorRange, ImageMirror, ImageRotation,
    MatrixCoefficients, TransferCharacteristics, Transforms,
};
pub use sequence::{ParseState, SequenceController};
pub use yuv_convert::{YuvLayout, YuvMatrix, YuvRange, rgb_to_yuv, yuv_to_rgba8, yuv_to_rgba16};
pub use whereat::At;
