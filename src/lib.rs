//! Time-frequency masking source separation for short audio mixtures
//!
//! `unmix` bundles two classic mask-based separators behind a shared set of
//! signal-processing kernels:
//!
//! - **DUET** ([`duet`]): extracts N spatially distinct sources from a
//!   stereo recording by clustering time-frequency bins in an
//!   (attenuation, delay) plane.
//! - **REPET** ([`repet`]): splits a mixture into a repeating background
//!   and a non-repeating foreground, either from a global repeating period
//!   (Original) or from frame self-similarity (SIM).
//!
//! The kernels (PCM buffers, the STFT/iSTFT pair, peak finding, and 2-D
//! smoothing) live in [`core`] and are usable on their own.
//!
//! # Example
//! ```no_run
//! use unmix::{AudioBuffer, Duet, DuetConfig, WindowParams};
//!
//! # fn main() -> unmix::Result<()> {
//! let mixture = AudioBuffer::from_file("stereo_mixture.wav")?;
//! let window = WindowParams::default_for_rate(mixture.sample_rate());
//! let result = Duet::new(&mixture, window, DuetConfig::new(2))?.run()?;
//! for (i, mut source) in result.sources.into_iter().enumerate() {
//!     source.write_to_file(format!("source_{}.wav", i + 1))?;
//! }
//! # Ok(())
//! # }
//! ```

pub use unmix_common as common;
pub use unmix_core as core;
pub use unmix_duet as duet;
pub use unmix_repet as repet;

pub use unmix_common::{Result, SeparationError, DEFAULT_BIT_DEPTH, DEFAULT_SAMPLE_RATE, EPSILON};
pub use unmix_core::{AudioBuffer, StftResult, WindowParams, WindowType};
pub use unmix_duet::{Duet, DuetConfig, DuetResult, SourceEstimate};
pub use unmix_repet::{Repet, RepetConfig, RepetResult, RepetVariant};
