//! Image-IO handler surface: reader, writer, runtime options
//!
//! [`AvifReader`] wraps the [`SequenceController`] and exposes the
//! host-facing frame and option queries. [`AvifWriter`] runs the frame
//! encoder and writes the finished file in one call. [`ImageCodec`] ties a
//! decode session and an AV1 encoder together behind one interface.

use crate::bitmap::Bitmap;
use crate::codec::{Av1Encoder, DecodeSession};
use crate::config::{DecoderConfig, EncoderConfig, normalize_quality};
use crate::encoder::encode_bitmap;
use crate::error::{Error, Result};
use crate::probe;
use crate::sequence::SequenceController;
use log::debug;
use std::io::{BufRead, Read, Write};
use whereat::at;

/// Runtime options a handler can report or accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageOption {
    /// Encode quality, 0..=100
    Quality,
    /// Size of the current frame after transforms
    Size,
    /// Whether the container holds two or more frames
    Animation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    Int(i32),
    Size { width: usize, height: usize },
    Bool(bool),
}

/// What a format name can be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub can_read: bool,
    pub can_write: bool,
}

/// Capabilities for a lowercase format name, `None` if unknown
pub fn capabilities(format: &str) -> Option<Capabilities> {
    match format {
        "avif" => Some(Capabilities {
            can_read: true,
            can_write: true,
        }),
        "avifs" => Some(Capabilities {
            can_read: true,
            can_write: false,
        }),
        _ => None,
    }
}

/// Peek at a buffered source without consuming it
pub fn can_read<B: BufRead + ?Sized>(source: &mut B) -> bool {
    match source.fill_buf() {
        Ok(header) => probe::is_avif(header),
        Err(_) => false,
    }
}

/// Decode side of the handler
pub struct AvifReader<R, D> {
    sequence: SequenceController<R, D>,
    quality: i32,
}

impl<R: Read, D: DecodeSession> AvifReader<R, D> {
    pub fn new(source: R, session: D, config: DecoderConfig) -> Self {
        Self {
            sequence: SequenceController::new(source, session, config),
            quality: EncoderConfig::new().get_quality(),
        }
    }

    /// Next frame of the sequence (the first frame on the first call)
    pub fn read(&mut self) -> Result<Bitmap> {
        self.sequence.read_next()
    }

    pub fn jump_to_next_image(&mut self) -> Result<()> {
        self.sequence.jump_to_next_image()
    }

    pub fn jump_to_image(&mut self, index: usize) -> Result<()> {
        self.sequence.seek(index)
    }

    pub fn image_count(&mut self) -> usize {
        self.sequence.image_count()
    }

    pub fn current_image_number(&self) -> Option<usize> {
        self.sequence.current_image_number()
    }

    pub fn next_image_delay(&mut self) -> u32 {
        self.sequence.next_image_delay()
    }

    pub fn loop_count(&mut self) -> u32 {
        self.sequence.loop_count()
    }

    pub fn supports_option(&self, option: ImageOption) -> bool {
        matches!(
            option,
            ImageOption::Quality | ImageOption::Size | ImageOption::Animation
        )
    }

    /// Current value of `option`. `Size` and `Animation` parse the container.
    pub fn option(&mut self, option: ImageOption) -> Option<OptionValue> {
        match option {
            ImageOption::Quality => Some(OptionValue::Int(self.quality)),
            ImageOption::Size => self
                .sequence
                .size()
                .map(|(width, height)| OptionValue::Size { width, height }),
            ImageOption::Animation => {
                self.sequence.ensure_parsed().ok()?;
                Some(OptionValue::Bool(self.sequence.is_animation()))
            }
        }
    }

    /// Only `Quality` is settable
    pub fn set_option(&mut self, option: ImageOption, value: OptionValue) -> bool {
        match (option, value) {
            (ImageOption::Quality, OptionValue::Int(q)) => {
                self.quality = normalize_quality(q);
                true
            }
            _ => false,
        }
    }
}

/// Encode side of the handler
pub struct AvifWriter<W, E> {
    sink: W,
    encoder: E,
    config: EncoderConfig,
}

impl<W: Write, E: Av1Encoder> AvifWriter<W, E> {
    pub fn new(sink: W, encoder: E) -> Self {
        Self {
            sink,
            encoder,
            config: EncoderConfig::new(),
        }
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn supports_option(&self, option: ImageOption) -> bool {
        option == ImageOption::Quality
    }

    pub fn option(&self, option: ImageOption) -> Option<OptionValue> {
        match option {
            ImageOption::Quality => Some(OptionValue::Int(self.config.get_quality())),
            _ => None,
        }
    }

    pub fn set_option(&mut self, option: ImageOption, value: OptionValue) -> bool {
        match (option, value) {
            (ImageOption::Quality, OptionValue::Int(q)) => {
                self.config = self.config.clone().quality(q);
                true
            }
            _ => false,
        }
    }

    /// Encode `bitmap` and write the file with a single write call.
    ///
    /// Nothing reaches the sink when encoding fails.
    pub fn write(&mut self, bitmap: &Bitmap) -> Result<()> {
        let data = encode_bitmap(bitmap, &self.config, &mut self.encoder)?;
        let written = self.sink.write(&data).map_err(|e| at(Error::Io(e)))?;
        if written != data.len() {
            return Err(at(Error::ShortWrite {
                written,
                expected: data.len(),
            }));
        }
        self.sink.flush().map_err(|e| at(Error::Io(e)))?;
        debug!("wrote {} byte AVIF file", data.len());
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// One AVIF codec: a decode session factory plus an AV1 encoder factory
pub trait ImageCodec {
    type Session: DecodeSession;
    type Encoder: Av1Encoder;

    fn new_session(&self) -> Self::Session;
    fn new_encoder(&self) -> Self::Encoder;

    fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig::default()
    }

    fn open<R: Read>(&self, source: R) -> AvifReader<R, Self::Session> {
        AvifReader::new(source, self.new_session(), self.decoder_config())
    }

    /// First frame of an in-memory file
    fn decode(&self, data: &[u8]) -> Result<Bitmap> {
        self.open(data).read()
    }

    fn encode(&self, bitmap: &Bitmap, config: &EncoderConfig) -> Result<Vec<u8>> {
        encode_bitmap(bitmap, config, &mut self.new_encoder())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_capabilities() {
        assert_eq!(
            capabilities("avif"),
            Some(Capabilities {
                can_read: true,
                can_write: true
            })
        );
        assert_eq!(capabilities("avifs").map(|c| c.can_write), Some(false));
        assert_eq!(capabilities("png"), None);
    }

    #[test]
    fn can_read_peeks_without_consuming() {
        let data = b"\0\0\0\x14ftypavis\0\0\0\0mif1rest";
        let mut source = std::io::BufReader::new(&data[..]);
        assert!(can_read(&mut source));
        let mut all = Vec::new();
        source.read_to_end(&mut all).unwrap();
        assert_eq!(all, data);

        let mut png = std::io::BufReader::new(&b"\x89PNG\r\n\x1a\n\0\0\0\x0dIHDR"[..]);
        assert!(!can_read(&mut png));
    }
}
