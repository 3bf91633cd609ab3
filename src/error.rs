//! Error types for zenavif-io

/// Error type for AVIF reading and writing
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Input is not an AVIF file or its container structure is broken
    #[error("Malformed AVIF input: {0}")]
    Malformed(String),

    /// AVIF container parsing error
    #[cfg(feature = "rav1d")]
    #[error("AVIF parse error: {0}")]
    Parse(#[from] zenavif_parse::Error),

    /// AV1 decode error from the codec
    #[error("AV1 decode error: {0}")]
    Decode(String),

    /// AV1 encode error from the codec
    #[error("AV1 encode error: {0}")]
    Encode(String),

    /// YUV to RGB color conversion error
    #[error("Color conversion error: {0}")]
    ColorConversion(#[from] yuv::YuvError),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    /// Image dimensions exceed the container limit
    #[error("Image too large: {width}x{height}")]
    ImageTooLarge {
        /// Image width
        width: u32,
        /// Image height
        height: u32,
    },

    /// Image has a zero dimension
    #[error("Empty image")]
    EmptyImage,

    /// A later frame does not match the size recorded from the first frame
    #[error(
        "Frame size {width}x{height} does not match container size {expected_width}x{expected_height}"
    )]
    GeometryMismatch {
        /// Frame width
        width: u32,
        /// Frame height
        height: u32,
        /// Container width
        expected_width: u32,
        /// Container height
        expected_height: u32,
    },

    /// Seek target outside the frame sequence
    #[error("Frame {index} out of range ({count} frames)")]
    FrameOutOfRange {
        /// Requested frame index
        index: usize,
        /// Number of frames in the container
        count: usize,
    },

    /// The container failed earlier and cannot be used anymore
    #[error("AVIF container is in the error state")]
    ContainerFailed,

    /// Memory allocation failed
    #[error("Out of memory")]
    OutOfMemory,

    /// Reading the source or writing the sink failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink accepted fewer bytes than were produced
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes accepted by the sink
        written: usize,
        /// Bytes in the encoded file
        expected: usize,
    },
}

impl From<std::collections::TryReserveError> for Error {
    fn from(_: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory
    }
}

/// Result type for zenavif-io operations with location tracking
pub type Result<T, E = whereat::At<Error>> = core::result::Result<T, E>;
