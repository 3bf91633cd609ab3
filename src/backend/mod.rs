//! Native codec backends
//!
//! - **`rav1d`**: [`Rav1dSession`] parses with zenavif-parse and decodes with
//!   the rav1d-safe managed API.
//! - **`rav1e`**: [`Rav1eEncoder`] encodes with rav1e and muxes with
//!   avif-serialize. ICC profiles and `clap`/`irot`/`imir` are added to the
//!   muxed file afterwards.
//!
//! [`NativeCodec`] bundles whichever of the two are compiled in.

#[cfg(feature = "rav1d")]
mod rav1d_session;
#[cfg(feature = "rav1e")]
mod mux;
#[cfg(feature = "rav1e")]
mod rav1e_encoder;

#[cfg(feature = "rav1d")]
pub use rav1d_session::Rav1dSession;
#[cfg(feature = "rav1e")]
pub use rav1e_encoder::Rav1eEncoder;

use crate::codec::{Av1Encoder, CodecImage, EncodeSettings};
use crate::config::DecoderConfig;
use crate::error::{Error, Result};
use whereat::at;

/// Encoder used when the crate is built without an AV1 encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableEncoder;

impl Av1Encoder for UnavailableEncoder {
    fn encode(&mut self, _image: &CodecImage, _settings: &EncodeSettings) -> Result<Vec<u8>> {
        Err(at(Error::Unsupported(
            "AVIF encoding requires the `rav1e` feature",
        )))
    }
}

/// The built-in codec
#[derive(Debug, Clone, Default)]
pub struct NativeCodec {
    decoder: DecoderConfig,
}

impl NativeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decoder_config(mut self, config: DecoderConfig) -> Self {
        self.decoder = config;
        self
    }
}

#[cfg(feature = "rav1d")]
impl crate::handler::ImageCodec for NativeCodec {
    type Session = Rav1dSession;
    #[cfg(feature = "rav1e")]
    type Encoder = Rav1eEncoder;
    #[cfg(not(feature = "rav1e"))]
    type Encoder = UnavailableEncoder;

    fn new_session(&self) -> Rav1dSession {
        Rav1dSession::new(self.decoder.clone())
    }

    fn new_encoder(&self) -> Self::Encoder {
        Default::default()
    }

    fn decoder_config(&self) -> DecoderConfig {
        self.decoder.clone()
    }
}
