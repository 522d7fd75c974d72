//! Short-Time Fourier Transform (STFT) and inverse STFT (iSTFT)
//!
//! Windowed, overlapped, zero-padded DFT and its exact inverse under
//! constant-overlap-add. The forward transform produces a one-sided complex
//! spectrogram of shape [bins, frames] with bins = N/2 + 1, where N is the
//! FFT length rounded up to the next power of two. The inverse mirrors the
//! spectrum, runs a per-frame inverse DFT, applies the analysis window a
//! second time as the synthesis window and overlap-adds, normalizing each
//! output sample by the summed squared window.
//!
//! # Example
//! ```no_run
//! use unmix_core::stft::{stft, istft, WindowParams, WindowType};
//!
//! # fn main() -> unmix_common::Result<()> {
//! let signal = vec![0.0f64; 44100];
//! let params = WindowParams::new(1024, 512, WindowType::Hamming, 1024);
//! let forward = stft(&signal, &params, 44100)?;
//! let (reconstructed, _times) = istft(forward.spectrogram.view(), &params, 44100)?;
//! # Ok(())
//! # }
//! ```

use ndarray::{Array2, ArrayView2};
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;
use unmix_common::{Result, SeparationError};

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowType {
    /// Rectangular window (no tapering)
    Rectangular,
    /// Hamming window
    Hamming,
    /// Hanning window (raised cosine)
    Hanning,
    /// Blackman window
    Blackman,
}

impl WindowType {
    /// Generate the window coefficients for a given length.
    ///
    /// All tapered windows use the symmetric form with denominator L - 1.
    #[must_use]
    pub fn generate(self, length: usize) -> Vec<f64> {
        if length <= 1 {
            return vec![1.0; length];
        }
        let denom = (length - 1) as f64;
        match self {
            WindowType::Rectangular => vec![1.0; length],
            WindowType::Hamming => (0..length)
                .map(|n| 0.54 - 0.46 * (2.0 * PI * n as f64 / denom).cos())
                .collect(),
            WindowType::Hanning => (0..length)
                .map(|n| 0.5 * (1.0 - (2.0 * PI * n as f64 / denom).cos()))
                .collect(),
            WindowType::Blackman => (0..length)
                .map(|n| {
                    0.42 - 0.5 * (2.0 * PI * n as f64 / denom).cos()
                        + 0.08 * (4.0 * PI * n as f64 / denom).cos()
                })
                .collect(),
        }
    }
}

/// STFT window parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowParams {
    /// Analysis window length L in samples
    pub window_length: usize,
    /// Hop H between adjacent frames in samples (typically L/2)
    pub hop_length: usize,
    /// Window function
    pub window_type: WindowType,
    /// Requested number of frequency samples; must be >= L. Rounded up to
    /// the next power of two when not one already.
    pub n_fft: usize,
}

impl WindowParams {
    #[must_use]
    pub fn new(window_length: usize, hop_length: usize, window_type: WindowType, n_fft: usize) -> Self {
        Self {
            window_length,
            hop_length,
            window_type,
            n_fft,
        }
    }

    /// Default analysis parameters for a sample rate: a 40 ms window rounded
    /// up to a power of two, Hamming, 50% overlap, nfft equal to the window.
    #[must_use]
    pub fn default_for_rate(sample_rate: u32) -> Self {
        let window_length = ((0.04 * f64::from(sample_rate)).ceil() as usize).next_power_of_two();
        Self {
            window_length,
            hop_length: window_length / 2,
            window_type: WindowType::Hamming,
            n_fft: window_length,
        }
    }

    /// Validate the parameter combination.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when L = 0, H = 0, H > L, or nfft < L.
    pub fn validate(&self) -> Result<()> {
        if self.window_length == 0 {
            return Err(SeparationError::InvalidParameter(
                "window_length must be > 0".to_string(),
            ));
        }
        if self.hop_length == 0 {
            return Err(SeparationError::InvalidParameter(
                "hop_length must be > 0".to_string(),
            ));
        }
        if self.hop_length > self.window_length {
            return Err(SeparationError::InvalidParameter(
                "hop_length must be <= window_length".to_string(),
            ));
        }
        if self.n_fft < self.window_length {
            return Err(SeparationError::InvalidParameter(
                "n_fft must be >= window_length".to_string(),
            ));
        }
        Ok(())
    }

    /// Actual DFT length: the next power of two >= max(nfft, L).
    #[must_use]
    pub fn fft_length(&self) -> usize {
        self.n_fft.max(self.window_length).next_power_of_two()
    }

    /// Number of one-sided frequency bins produced by the forward transform.
    #[must_use]
    pub fn bin_count(&self) -> usize {
        self.fft_length() / 2 + 1
    }

    /// Number of frames for a signal of the given length: the last frame
    /// starts at the final hop boundary before the signal end and zero-pads
    /// past the tail.
    #[must_use]
    pub fn frame_count(&self, num_samples: usize) -> usize {
        if num_samples <= self.window_length {
            1
        } else {
            (num_samples - self.window_length + self.hop_length - 1) / self.hop_length + 1
        }
    }
}

/// Result of a forward STFT
#[derive(Debug, Clone)]
pub struct StftResult {
    /// One-sided complex spectrogram, shape [N/2 + 1, frames]
    pub spectrogram: Array2<Complex<f64>>,
    /// Power spectrum |X|^2, same shape
    pub power: Array2<f64>,
    /// Frequency of each bin in Hz: k * fs / N
    pub frequencies: Vec<f64>,
    /// Center time of each frame in seconds: (m * H + L/2) / fs
    pub times: Vec<f64>,
}

/// Forward STFT of a mono signal.
///
/// Frames start at multiples of the hop; any frame reaching past the signal
/// end is zero-padded. Each frame is windowed, zero-padded to the FFT
/// length, and transformed; bins [0, N/2] are kept.
///
/// # Errors
/// Returns `InvalidParameter` when the window parameters are inconsistent.
pub fn stft(signal: &[f64], params: &WindowParams, sample_rate: u32) -> Result<StftResult> {
    params.validate()?;

    let win_len = params.window_length;
    let hop = params.hop_length;
    let n_fft = params.fft_length();
    let bins = n_fft / 2 + 1;
    let frames = params.frame_count(signal.len());

    debug!(
        "STFT: {} samples -> {} frames x {} bins (L={}, H={}, N={})",
        signal.len(),
        frames,
        bins,
        win_len,
        hop,
        n_fft
    );

    let window = params.window_type.generate(win_len);

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n_fft);

    let mut spectrogram = Array2::<Complex<f64>>::zeros((bins, frames));
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

    for frame in 0..frames {
        let start = frame * hop;
        buffer.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        for n in 0..win_len {
            if start + n < signal.len() {
                buffer[n] = Complex::new(signal[start + n] * window[n], 0.0);
            }
        }

        fft.process(&mut buffer);

        for (bin, value) in buffer.iter().take(bins).enumerate() {
            spectrogram[[bin, frame]] = *value;
        }
    }

    let power = spectrogram.mapv(|c| c.norm_sqr());
    let fs = f64::from(sample_rate);
    let frequencies = (0..bins).map(|k| k as f64 * fs / n_fft as f64).collect();
    let times = (0..frames)
        .map(|m| ((m * hop) as f64 + win_len as f64 / 2.0) / fs)
        .collect();

    Ok(StftResult {
        spectrogram,
        power,
        frequencies,
        times,
    })
}

/// Inverse STFT of a one-sided complex spectrogram.
///
/// Mirrors the spectrum with conjugate symmetry, inverse-transforms each
/// frame, applies the synthesis window (the analysis window again) and
/// overlap-adds into a buffer of length (frames - 1) * H + L. Each output
/// sample is divided by the summed squared window at that position, which
/// makes the reconstruction exact wherever that sum is nonzero.
///
/// Returns the time-domain signal and its time vector.
///
/// # Errors
/// Returns `InvalidParameter` when the parameters are inconsistent or the
/// spectrogram shape does not match them.
pub fn istft(
    spectrogram: ArrayView2<'_, Complex<f64>>,
    params: &WindowParams,
    sample_rate: u32,
) -> Result<(Vec<f64>, Vec<f64>)> {
    params.validate()?;

    let win_len = params.window_length;
    let hop = params.hop_length;
    let n_fft = params.fft_length();
    let bins = n_fft / 2 + 1;
    let frames = spectrogram.ncols();

    if spectrogram.nrows() != bins {
        return Err(SeparationError::InvalidParameter(format!(
            "expected {} frequency bins, got {}",
            bins,
            spectrogram.nrows()
        )));
    }
    if frames == 0 {
        return Err(SeparationError::InvalidParameter(
            "empty spectrogram".to_string(),
        ));
    }

    debug!(
        "iSTFT: {} frames x {} bins -> {} samples (L={}, H={}, N={})",
        frames,
        bins,
        (frames - 1) * hop + win_len,
        win_len,
        hop,
        n_fft
    );

    let window = params.window_type.generate(win_len);

    let mut planner = FftPlanner::new();
    let ifft = planner.plan_fft_inverse(n_fft);

    let output_length = (frames - 1) * hop + win_len;
    let mut output = vec![0.0f64; output_length];
    let mut window_sum = vec![0.0f64; output_length];
    let mut buffer = vec![Complex::new(0.0, 0.0); n_fft];

    for frame in 0..frames {
        for bin in 0..bins {
            buffer[bin] = spectrogram[[bin, frame]];
        }
        // Conjugate symmetry: X[N - k] = conj(X[k]); DC and Nyquist map to
        // themselves.
        for bin in 1..n_fft / 2 {
            buffer[n_fft - bin] = spectrogram[[bin, frame]].conj();
        }

        ifft.process(&mut buffer);

        let start = frame * hop;
        for n in 0..win_len {
            // rustfft leaves the inverse transform unnormalized
            output[start + n] += buffer[n].re / n_fft as f64 * window[n];
            window_sum[start + n] += window[n] * window[n];
        }
    }

    for (sample, &w) in output.iter_mut().zip(&window_sum) {
        if w > 1e-12 {
            *sample /= w;
        }
    }

    let fs = f64::from(sample_rate);
    let times = (0..output_length).map(|n| n as f64 / fs).collect();

    Ok((output, times))
}
