//! Core signal-processing kernels for time-frequency source separation
//!
//! This crate holds the pieces every separator builds on:
//! - [`buffer`]: the multi-channel PCM container with WAV I/O and
//!   buffer arithmetic
//! - [`stft`]: the windowed, overlapped, zero-padded DFT pair with exact
//!   constant-overlap-add inversion
//! - [`peaks`]: greedy 1-D/2-D peak extraction with minimum-distance
//!   suppression
//! - [`smooth`]: small-kernel 2-D smoothing with edge-replicated padding

pub mod buffer;
pub mod peaks;
pub mod smooth;
pub mod stft;

pub use buffer::AudioBuffer;
pub use stft::{istft, stft, StftResult, WindowParams, WindowType};
