//! Decoder and encoder configuration

/// Upper bound for codec worker threads
pub const MAX_THREADS: usize = 64;

/// Default encode quality
pub const DEFAULT_QUALITY: i32 = 52;

/// Default encoder speed preset
pub const DEFAULT_SPEED: u8 = 7;

/// Resolve a requested thread count into the range the codec accepts.
///
/// 0 means automatic (use available cores).
pub fn worker_threads(requested: usize) -> usize {
    let n = if requested == 0 {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    } else {
        requested
    };
    n.clamp(1, MAX_THREADS)
}

/// How subsampled chroma is brought up to luma resolution during decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaUpsampling {
    /// Bilinear for still images, nearest-neighbor for animations
    #[default]
    Automatic,
    /// Always interpolate bilinearly
    Bilinear,
    /// Always replicate the nearest chroma sample
    Fastest,
}

impl ChromaUpsampling {
    pub(crate) fn resolve(self, animated: bool) -> Self {
        match self {
            ChromaUpsampling::Automatic if animated => ChromaUpsampling::Fastest,
            ChromaUpsampling::Automatic => ChromaUpsampling::Bilinear,
            other => other,
        }
    }
}

/// Configuration for AVIF decoding
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Number of threads to use for decoding (0 = auto)
    pub(crate) threads: u32,
    /// Whether to apply film grain synthesis
    pub(crate) apply_grain: bool,
    /// Maximum frame size limit in pixels (0 = no limit)
    pub(crate) frame_size_limit: u32,
    pub(crate) chroma_upsampling: ChromaUpsampling,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            apply_grain: true,
            frame_size_limit: 0,
            chroma_upsampling: ChromaUpsampling::Automatic,
        }
    }
}

impl DecoderConfig {
    /// Create a new decoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of threads for decoding
    ///
    /// 0 means automatic. The effective count is always within 1..=64.
    pub fn threads(mut self, threads: u32) -> Self {
        self.threads = threads;
        self
    }

    /// Enable or disable film grain synthesis
    pub fn apply_grain(mut self, apply: bool) -> Self {
        self.apply_grain = apply;
        self
    }

    /// Set maximum frame size limit in total pixels
    ///
    /// 0 means no limit.
    pub fn frame_size_limit(mut self, limit: u32) -> Self {
        self.frame_size_limit = limit;
        self
    }

    /// Select the chroma upsampling filter
    pub fn chroma_upsampling(mut self, upsampling: ChromaUpsampling) -> Self {
        self.chroma_upsampling = upsampling;
        self
    }

    /// Effective worker thread count
    pub fn effective_threads(&self) -> usize {
        worker_threads(self.threads as usize)
    }

    pub(crate) fn get_apply_grain(&self) -> bool {
        self.apply_grain
    }

    pub(crate) fn get_frame_size_limit(&self) -> u32 {
        self.frame_size_limit
    }
}

/// Configuration for AVIF encoding
///
/// Uses a builder pattern matching [`DecoderConfig`].
///
/// # Example
///
/// ```
/// use zenavif_io::EncoderConfig;
///
/// let config = EncoderConfig::new().quality(80);
/// assert_eq!(config.get_quality(), 80);
/// ```
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub(crate) quality: i32,
    pub(crate) speed: u8,
    pub(crate) threads: Option<usize>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            speed: DEFAULT_SPEED,
            threads: None,
        }
    }
}

impl EncoderConfig {
    /// Create a new encoder configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set quality (0 = smallest, 100 = lossless).
    ///
    /// Values above 100 are clamped to 100. Negative values restore the default.
    pub fn quality(mut self, quality: i32) -> Self {
        self.quality = normalize_quality(quality);
        self
    }

    /// Set encoder speed preset (0 = slowest, 10 = fastest)
    pub fn speed(mut self, speed: u8) -> Self {
        self.speed = speed.min(10);
        self
    }

    /// Set the number of encoder threads. `None` uses available cores.
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }

    /// Current quality value
    pub fn get_quality(&self) -> i32 {
        self.quality
    }

    /// Current speed preset
    pub fn get_speed(&self) -> u8 {
        self.speed
    }

    /// Effective worker thread count
    pub fn effective_threads(&self) -> usize {
        worker_threads(self.threads.unwrap_or(0))
    }
}

/// Apply the quality option rules: >100 clamps, negative resets to the default.
pub fn normalize_quality(quality: i32) -> i32 {
    if quality > 100 {
        100
    } else if quality < 0 {
        DEFAULT_QUALITY
    } else {
        quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_option_rules() {
        assert_eq!(EncoderConfig::new().get_quality(), 52);
        assert_eq!(EncoderConfig::new().quality(150).get_quality(), 100);
        assert_eq!(EncoderConfig::new().quality(-3).get_quality(), 52);
        assert_eq!(EncoderConfig::new().quality(0).get_quality(), 0);
    }

    #[test]
    fn worker_threads_bounded() {
        assert_eq!(worker_threads(1000), 64);
        assert_eq!(worker_threads(3), 3);
        let auto = worker_threads(0);
        assert!((1..=64).contains(&auto));
    }

    #[test]
    fn automatic_upsampling_depends_on_animation() {
        assert_eq!(
            ChromaUpsampling::Automatic.resolve(true),
            ChromaUpsampling::Fastest
        );
        assert_eq!(
            ChromaUpsampling::Automatic.resolve(false),
            ChromaUpsampling::Bilinear
        );
        assert_eq!(
            ChromaUpsampling::Bilinear.resolve(true),
            ChromaUpsampling::Bilinear
        );
    }
}
