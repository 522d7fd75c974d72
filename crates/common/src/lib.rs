/// Common types and constants for the unmix separation workspace
use thiserror::Error;

/// Default sample rate (Hz) assumed when a buffer is built from a bare array.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Bit depth used when writing PCM output.
pub const DEFAULT_BIT_DEPTH: u32 = 16;

/// Regularizer added to the numerator and denominator of division-prone
/// ratios (channel ratios, soft masks, column norms).
pub const EPSILON: f64 = 1e-16;

/// Separation errors
#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("Cannot read audio file: {0}")]
    IoRead(String),

    #[error("Cannot write audio file: {0}")]
    IoWrite(String),

    #[error("Channel count mismatch: {left} vs {right}")]
    ChannelMismatch { left: usize, right: usize },

    #[error("Sample rate mismatch: {left} Hz vs {right} Hz")]
    RateMismatch { left: u32, right: u32 },

    #[error("Channel index {index} out of range (1..={count})")]
    BadChannelIndex { index: usize, count: usize },

    #[error("Expected {expected} input channel(s), got {actual}")]
    InvalidChannelCount { expected: usize, actual: usize },

    #[error("Not enough peaks: {found} candidate(s) above threshold, {requested} requested")]
    InsufficientPeaks { requested: usize, found: usize },

    #[error("Inverse STFT requires a prior forward STFT")]
    InvalidStftState,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for separation operations
pub type Result<T> = std::result::Result<T, SeparationError>;
