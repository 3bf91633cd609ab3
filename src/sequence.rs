//! Frame sequence state machine
//!
//! The controller owns the decode session and the most recently decoded
//! frame. Parsing happens lazily on first use. Once the container fails,
//! the session is dropped and every later call reports
//! [`Error::ContainerFailed`].

use crate::bitmap::Bitmap;
use crate::codec::{CodecImage, DecodeSession};
use crate::config::DecoderConfig;
use crate::decoder::{check_dimensions, decode_frame};
use crate::error::{Error, Result};
use crate::probe;
use log::{debug, warn};
use std::io::Read;
use whereat::at;

/// Lifecycle of the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    NotParsed,
    Success,
    /// Terminal: the container cannot be used anymore
    Error,
}

pub struct SequenceController<R, D> {
    source: Option<R>,
    session: Option<D>,
    config: DecoderConfig,
    state: ParseState,
    image_count: usize,
    index: usize,
    geometry: Option<(u32, u32)>,
    current: Option<Bitmap>,
    current_duration: f64,
    /// The cached frame was handed out; the next read must advance first
    must_jump: bool,
}

impl<R: Read, D: DecodeSession> SequenceController<R, D> {
    pub fn new(source: R, session: D, config: DecoderConfig) -> Self {
        Self {
            source: Some(source),
            session: Some(session),
            config,
            state: ParseState::NotParsed,
            image_count: 0,
            index: 0,
            geometry: None,
            current: None,
            current_duration: 0.0,
            must_jump: false,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Parse the container and decode the first image, once.
    pub fn ensure_parsed(&mut self) -> Result<()> {
        match self.state {
            ParseState::Success => Ok(()),
            ParseState::Error => Err(at(Error::ContainerFailed)),
            ParseState::NotParsed => self.guarded(Self::parse),
        }
    }

    fn parse(&mut self) -> Result<()> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| at(Error::ContainerFailed))?;
        let mut data = Vec::new();
        source
            .read_to_end(&mut data)
            .map_err(|e| at(Error::Io(e)))?;
        if !probe::is_avif(&data) {
            return Err(at(Error::Malformed("missing AVIF ftyp signature".into())));
        }

        let session = self.session_mut()?;
        let info = session.parse(data)?;
        if info.image_count == 0 {
            return Err(at(Error::Malformed("container holds no images".into())));
        }
        let image = session.next_image()?;
        check_dimensions(image.width, image.height)?;

        self.image_count = info.image_count;
        self.geometry = Some((image.width, image.height));
        self.index = 0;
        self.show(&image)?;
        self.state = ParseState::Success;
        debug!(
            "parsed AVIF container: {}x{}, {} image(s)",
            image.width, image.height, self.image_count
        );
        Ok(())
    }

    fn session_mut(&mut self) -> Result<&mut D> {
        self.session
            .as_mut()
            .ok_or_else(|| at(Error::ContainerFailed))
    }

    /// Run `f`; on failure move to the error state and release the session.
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = f(self);
        if let Err(e) = &result {
            warn!("AVIF container failed: {e:?}");
            self.state = ParseState::Error;
            self.session = None;
            self.source = None;
            self.current = None;
        }
        result
    }

    /// Geometry check plus frame decode into the cache
    fn show(&mut self, image: &CodecImage) -> Result<()> {
        if let Some((expected_width, expected_height)) = self.geometry
            && (image.width, image.height) != (expected_width, expected_height)
        {
            return Err(at(Error::GeometryMismatch {
                width: image.width,
                height: image.height,
                expected_width,
                expected_height,
            }));
        }
        let upsampling = self
            .config
            .chroma_upsampling
            .resolve(self.image_count >= 2);
        self.current = Some(decode_frame(image, upsampling)?);
        self.current_duration = image.duration;
        self.must_jump = false;
        Ok(())
    }

    /// Return the current frame, advancing first if it was already returned.
    pub fn read_next(&mut self) -> Result<Bitmap> {
        self.ensure_parsed()?;
        if self.must_jump && self.image_count >= 2 {
            self.jump_to_next_image()?;
        }
        let frame = self
            .current
            .clone()
            .ok_or_else(|| at(Error::ContainerFailed))?;
        self.must_jump = true;
        Ok(frame)
    }

    /// Decode the following frame, wrapping to the first after the last.
    ///
    /// No-op for still images.
    pub fn jump_to_next_image(&mut self) -> Result<()> {
        self.ensure_parsed()?;
        if self.image_count < 2 {
            return Ok(());
        }
        self.guarded(|this| {
            let next = (this.index + 1) % this.image_count;
            let session = this.session_mut()?;
            if next == 0 {
                session.reset()?;
            }
            let image = session.next_image()?;
            this.show(&image)?;
            this.index = next;
            debug!("advanced to image {next}");
            Ok(())
        })
    }

    /// Random access to image `index`
    pub fn seek(&mut self, index: usize) -> Result<()> {
        self.ensure_parsed()?;
        if index >= self.image_count {
            return Err(at(Error::FrameOutOfRange {
                index,
                count: self.image_count,
            }));
        }
        if self.image_count < 2 {
            return Ok(());
        }
        self.guarded(|this| {
            let image = this.session_mut()?.nth_image(index)?;
            this.show(&image)?;
            this.index = index;
            Ok(())
        })
    }

    /// Number of images, 0 if the container cannot be parsed
    pub fn image_count(&mut self) -> usize {
        match self.ensure_parsed() {
            Ok(()) => self.image_count,
            Err(_) => 0,
        }
    }

    /// Index of the current image: `None` before parsing, 0 after a failure
    pub fn current_image_number(&self) -> Option<usize> {
        match self.state {
            ParseState::NotParsed => None,
            ParseState::Error => Some(0),
            ParseState::Success => Some(self.index),
        }
    }

    /// Display time of the current frame in milliseconds, 0 for still images
    pub fn next_image_delay(&mut self) -> u32 {
        if self.image_count() < 2 {
            return 0;
        }
        ((self.current_duration * 1000.0).round() as u32).max(1)
    }

    /// 0 for still images, 1 for sequences
    pub fn loop_count(&mut self) -> u32 {
        if self.image_count() < 2 { 0 } else { 1 }
    }

    pub fn is_animation(&mut self) -> bool {
        self.image_count() >= 2
    }

    /// Size of the current frame after transforms
    pub fn size(&mut self) -> Option<(usize, usize)> {
        self.ensure_parsed().ok()?;
        self.current.as_ref().map(|b| (b.width(), b.height()))
    }

    pub fn current_frame(&self) -> Option<&Bitmap> {
        self.current.as_ref()
    }
}
