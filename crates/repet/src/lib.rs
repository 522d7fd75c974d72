//! REPET repeating-pattern separation
//!
//! The REpeating Pattern Extraction Technique splits a mixture into a
//! repeating background and a non-repeating foreground. Two variants share
//! the same front and back end:
//!
//! - **Original**: a beat spectrum (per-frequency autocorrelation of the
//!   power spectrogram, averaged over frequencies) picks one global
//!   repeating period; the background mask is a median over period-length
//!   blocks of the magnitude spectrogram.
//! - **SIM**: a frame-to-frame cosine-similarity matrix picks, for every
//!   frame, its most similar frames; the background mask is a median over
//!   those frames.
//!
//! In both cases the mask is clipped against the magnitude spectrogram,
//! turned into a soft ratio, high-pass-filtered so the lowest bins always
//! pass to the background, applied to the complex spectrogram, and
//! inverted back to the time domain. The foreground is the mixture minus
//! the background.
//!
//! # Example
//! ```no_run
//! use unmix_core::{AudioBuffer, WindowParams};
//! use unmix_repet::{Repet, RepetConfig};
//!
//! # fn main() -> unmix_common::Result<()> {
//! let mixture = AudioBuffer::from_file("mixture.wav")?;
//! let window = WindowParams::default_for_rate(mixture.sample_rate());
//! let repet = Repet::new(&mixture, window, RepetConfig::original())?;
//! let result = repet.run()?;
//! println!(
//!     "background {} samples, period {:?} frames",
//!     result.background.num_samples(),
//!     result.period_frames
//! );
//! # Ok(())
//! # }
//! ```

use ndarray::Array2;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use unmix_common::{Result, SeparationError, EPSILON};
use unmix_core::peaks::find_peaks;
use unmix_core::stft::{istft, stft, WindowParams};
use unmix_core::AudioBuffer;

/// Which REPET algorithm to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepetVariant {
    /// Periodicity-based: one global repeating period from the beat spectrum
    Original,
    /// Similarity-based: per-frame repeating frames from the similarity
    /// matrix
    Sim,
}

/// REPET configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepetConfig {
    /// Algorithm variant
    pub variant: RepetVariant,
    /// Cutoff (Hz) below which the background mask is forced open
    pub high_pass_cutoff_hz: f64,
    /// SIM: minimum similarity, in [0, 1], for a frame to count as repeating
    pub similarity_threshold: f64,
    /// SIM: minimum distance between repeating frames, in seconds
    pub min_distance_between_frames_secs: f64,
    /// SIM: maximum number of repeating frames fed to the median filter
    pub max_repeating_frames: usize,
    /// Original: exact repeating period in seconds; when set, the beat
    /// spectrum search is skipped
    pub period_secs: Option<f64>,
    /// Original: lower bound of the period search, in seconds
    pub min_period_secs: f64,
    /// Original: upper bound of the period search, in seconds; defaults to
    /// min(8, mixture length / 3)
    pub max_period_secs: Option<f64>,
}

impl RepetConfig {
    /// Periodicity-based separation with the default period search range.
    #[must_use]
    pub fn original() -> Self {
        Self {
            variant: RepetVariant::Original,
            high_pass_cutoff_hz: 100.0,
            similarity_threshold: 0.0,
            min_distance_between_frames_secs: 1.0,
            max_repeating_frames: 100,
            period_secs: None,
            min_period_secs: 0.8,
            max_period_secs: None,
        }
    }

    /// Periodicity-based separation with a caller-provided period.
    #[must_use]
    pub fn with_period(period_secs: f64) -> Self {
        Self {
            period_secs: Some(period_secs),
            ..Self::original()
        }
    }

    /// Similarity-based separation with the default similarity parameters.
    #[must_use]
    pub fn sim() -> Self {
        Self {
            variant: RepetVariant::Sim,
            ..Self::original()
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for out-of-range thresholds, distances or
    /// periods.
    pub fn validate(&self) -> Result<()> {
        if self.high_pass_cutoff_hz < 0.0 {
            return Err(SeparationError::InvalidParameter(
                "high_pass_cutoff_hz must be >= 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SeparationError::InvalidParameter(
                "similarity_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.min_distance_between_frames_secs < 0.0 {
            return Err(SeparationError::InvalidParameter(
                "min_distance_between_frames_secs must be >= 0".to_string(),
            ));
        }
        if self.max_repeating_frames == 0 {
            return Err(SeparationError::InvalidParameter(
                "max_repeating_frames must be >= 1".to_string(),
            ));
        }
        if let Some(period) = self.period_secs {
            if period <= 0.0 {
                return Err(SeparationError::InvalidParameter(
                    "period_secs must be > 0".to_string(),
                ));
            }
        }
        if self.min_period_secs <= 0.0 {
            return Err(SeparationError::InvalidParameter(
                "min_period_secs must be > 0".to_string(),
            ));
        }
        if let Some(max) = self.max_period_secs {
            if max <= self.min_period_secs {
                return Err(SeparationError::InvalidParameter(
                    "max_period_secs must be > min_period_secs".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Result of a REPET run
#[derive(Debug, Clone)]
pub struct RepetResult {
    /// Repeating background, same channel count and length as the mixture
    pub background: AudioBuffer,
    /// Non-repeating foreground: mixture minus background
    pub foreground: AudioBuffer,
    /// Selected repeating period in frames (Original variant only)
    pub period_frames: Option<usize>,
}

/// Per-channel spectra shared by both variants
struct MixtureSpectra {
    complex: Vec<Array2<Complex<f64>>>,
    magnitude: Vec<Array2<f64>>,
}

/// REPET separator over a borrowed mixture
pub struct Repet<'a> {
    mixture: &'a AudioBuffer,
    window: WindowParams,
    config: RepetConfig,
}

impl<'a> Repet<'a> {
    /// Create a separator for a mixture with any channel count >= 1.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for a bad configuration or window, or
    /// `InvalidChannelCount` for an empty buffer.
    pub fn new(mixture: &'a AudioBuffer, window: WindowParams, config: RepetConfig) -> Result<Self> {
        config.validate()?;
        window.validate()?;
        if mixture.num_channels() == 0 {
            return Err(SeparationError::InvalidChannelCount {
                expected: 1,
                actual: 0,
            });
        }
        Ok(Self {
            mixture,
            window,
            config,
        })
    }

    /// Run the separation and return background, foreground, and the chosen
    /// period (Original variant).
    ///
    /// # Errors
    /// Propagates `InsufficientPeaks` from the SIM frame selection and
    /// `InvalidParameter` from an unusable period search range.
    pub fn run(&self) -> Result<RepetResult> {
        info!(
            "REPET ({:?}): {} channel(s), {} samples",
            self.config.variant,
            self.mixture.num_channels(),
            self.mixture.num_samples()
        );

        let spectra = self.compute_spectra()?;
        let (bins, frames) = spectra.magnitude[0].dim();
        let channels = spectra.magnitude.len();

        let mut period = None;
        let mut frame_sets = None;
        match self.config.variant {
            RepetVariant::Original => {
                let frames_period = match self.config.period_secs {
                    Some(secs) => self.period_to_frames(secs),
                    None => {
                        let beat = compute_beat_spectrum(&self.mean_power(&spectra));
                        let min_period = self.period_to_frames(self.config.min_period_secs);
                        let max_secs = self
                            .config
                            .max_period_secs
                            .unwrap_or_else(|| 8f64.min(self.mixture.duration_secs() / 3.0));
                        let max_period = self.period_to_frames(max_secs);
                        find_repeating_period(&beat, min_period, max_period)?
                    }
                };
                let frames_period = frames_period.clamp(1, frames.max(1));
                debug!("repeating period: {} frame(s)", frames_period);
                period = Some(frames_period);
            }
            RepetVariant::Sim => {
                let similarity = compute_similarity_matrix(&self.mean_magnitude(&spectra));
                let fs = f64::from(self.mixture.sample_rate());
                let distance = (self.config.min_distance_between_frames_secs * fs
                    / self.window.hop_length as f64)
                    .round() as usize;

                let mut sets = Vec::with_capacity(frames);
                for t in 0..frames {
                    let row = similarity.row(t).to_vec();
                    let picks = find_peaks(
                        &row,
                        self.config.similarity_threshold,
                        Some(distance),
                        self.config.max_repeating_frames,
                    )?;
                    sets.push(picks);
                }
                frame_sets = Some(sets);
            }
        }

        // Cutoff in bins; rows 1..cutoff of the mask are forced open so low
        // frequencies always pass to the background.
        let n_fft = self.window.fft_length();
        let fs = f64::from(self.mixture.sample_rate());
        let cutoff = ((self.config.high_pass_cutoff_hz * (n_fft - 1) as f64) / fs).ceil() as usize;

        let num_samples = self.mixture.num_samples();
        let mut background_data = Array2::<f64>::zeros((channels, num_samples));
        for ch in 0..channels {
            let magnitude = &spectra.magnitude[ch];
            let mut mask = match self.config.variant {
                RepetVariant::Original => {
                    repeating_mask_periodic(magnitude, period.unwrap_or(1))
                }
                RepetVariant::Sim => {
                    repeating_mask_similar(magnitude, frame_sets.as_deref().unwrap_or(&[]))
                }
            };

            for row in 1..cutoff.min(bins) {
                for t in 0..frames {
                    mask[[row, t]] = 1.0;
                }
            }

            let mut masked = spectra.complex[ch].clone();
            for ((r, t), value) in masked.indexed_iter_mut() {
                *value *= mask[[r, t]];
            }

            let (samples, _times) = istft(masked.view(), &self.window, self.mixture.sample_rate())?;
            for (n, &v) in samples.iter().take(num_samples).enumerate() {
                background_data[[ch, n]] = v;
            }
        }

        let background = AudioBuffer::from_array(background_data, self.mixture.sample_rate());
        let foreground = self.mixture.subtract(&background)?;

        info!("REPET: separated background and foreground");

        Ok(RepetResult {
            background,
            foreground,
            period_frames: period,
        })
    }

    /// The beat spectrum of the mixture: per-lag average of row-wise
    /// autocorrelations of the channel-mean power spectrogram.
    ///
    /// # Errors
    /// Propagates STFT parameter errors.
    pub fn beat_spectrum(&self) -> Result<Vec<f64>> {
        let spectra = self.compute_spectra()?;
        Ok(compute_beat_spectrum(&self.mean_power(&spectra)))
    }

    /// The frame-to-frame cosine-similarity matrix of the channel-mean
    /// magnitude spectrogram.
    ///
    /// # Errors
    /// Propagates STFT parameter errors.
    pub fn similarity_matrix(&self) -> Result<Array2<f64>> {
        let spectra = self.compute_spectra()?;
        Ok(compute_similarity_matrix(&self.mean_magnitude(&spectra)))
    }

    fn compute_spectra(&self) -> Result<MixtureSpectra> {
        let fs = self.mixture.sample_rate();
        let channels = self.mixture.num_channels();
        let mut complex = Vec::with_capacity(channels);
        let mut magnitude = Vec::with_capacity(channels);
        for ch in 1..=channels {
            let samples = self.mixture.channel(ch)?.to_vec();
            let result = stft(&samples, &self.window, fs)?;
            magnitude.push(result.spectrogram.mapv(|c| c.norm()));
            complex.push(result.spectrogram);
        }
        Ok(MixtureSpectra { complex, magnitude })
    }

    fn mean_magnitude(&self, spectra: &MixtureSpectra) -> Array2<f64> {
        let mut mean = Array2::<f64>::zeros(spectra.magnitude[0].dim());
        for channel in &spectra.magnitude {
            mean += channel;
        }
        mean / spectra.magnitude.len() as f64
    }

    fn mean_power(&self, spectra: &MixtureSpectra) -> Array2<f64> {
        let mut mean = Array2::<f64>::zeros(spectra.magnitude[0].dim());
        for channel in &spectra.magnitude {
            mean += &channel.mapv(|v| v * v);
        }
        mean / spectra.magnitude.len() as f64
    }

    /// Convert a period in seconds to frames, matching the original
    /// rounding: ceil((secs * fs + L/H - 1) / H).
    fn period_to_frames(&self, secs: f64) -> usize {
        let fs = f64::from(self.mixture.sample_rate());
        let l = self.window.window_length as f64;
        let h = self.window.hop_length as f64;
        (((secs * fs + l / h - 1.0) / h).ceil() as usize).max(1)
    }
}

/// Beat spectrum of a power spectrogram [bins, frames]: autocorrelate each
/// row by FFT (zero-padded to twice the frame count), keep the first
/// `frames` lags, divide by the ramp [frames, frames-1, .., 1], and average
/// over rows.
fn compute_beat_spectrum(power: &Array2<f64>) -> Vec<f64> {
    let (rows, lags) = power.dim();
    if lags == 0 || rows == 0 {
        return Vec::new();
    }

    let padded_len = 2 * lags;
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(padded_len);
    let ifft = planner.plan_fft_inverse(padded_len);

    let mut beat = vec![0.0f64; lags];
    let mut buffer = vec![Complex::new(0.0, 0.0); padded_len];
    for r in 0..rows {
        for t in 0..lags {
            buffer[t] = Complex::new(power[[r, t]], 0.0);
        }
        for entry in buffer.iter_mut().skip(lags) {
            *entry = Complex::new(0.0, 0.0);
        }

        fft.process(&mut buffer);
        for entry in buffer.iter_mut() {
            *entry = Complex::new(entry.norm_sqr(), 0.0);
        }
        ifft.process(&mut buffer);

        for (lag, value) in beat.iter_mut().enumerate() {
            // Unnormalized inverse FFT plus the shrinking overlap ramp.
            *value += buffer[lag].re / padded_len as f64 / (lags - lag) as f64;
        }
    }

    for value in beat.iter_mut() {
        *value /= rows as f64;
    }
    beat
}

/// Pick the repeating period from a beat spectrum: drop lag 0, search
/// [min_period, max_period] (in frames), return the argmax lag.
fn find_repeating_period(beat: &[f64], min_period: usize, max_period: usize) -> Result<usize> {
    let lags = &beat[1.min(beat.len())..];
    if min_period == 0 || min_period > max_period || min_period - 1 >= lags.len() {
        return Err(SeparationError::InvalidParameter(format!(
            "period search range [{min_period}, {max_period}] frames does not fit {} lag(s)",
            lags.len()
        )));
    }

    let hi = max_period.min(lags.len());
    let search = &lags[min_period - 1..hi];
    let mut best = 0;
    let mut value = f64::NEG_INFINITY;
    for (i, &v) in search.iter().enumerate() {
        if v > value {
            value = v;
            best = i;
        }
    }
    Ok(best + min_period)
}

/// Cosine-similarity matrix of a magnitude spectrogram [bins, frames]:
/// L2-normalize each column, then S = V^T V, shape [frames, frames].
fn compute_similarity_matrix(magnitude: &Array2<f64>) -> Array2<f64> {
    let (_bins, frames) = magnitude.dim();
    let mut normalized = magnitude.clone();
    for t in 0..frames {
        let norm = normalized.column(t).mapv(|v| v * v).sum().sqrt();
        let mut column = normalized.column_mut(t);
        column.mapv_inplace(|v| v / (norm + EPSILON));
    }
    normalized.t().dot(&normalized)
}

/// Repeating mask from a global period: for every frame offset within the
/// period, take the per-bin median over all frames at that offset, clip
/// against the spectrogram, and form the soft ratio (W + eps) / (V + eps).
///
/// Offsets near the start of the period have ceil(frames/period) instances;
/// the tail offsets one fewer.
fn repeating_mask_periodic(magnitude: &Array2<f64>, period: usize) -> Array2<f64> {
    let (bins, frames) = magnitude.dim();
    let period = period.clamp(1, frames.max(1));

    let mut repeating = Array2::<f64>::zeros((bins, frames));
    let mut values = Vec::new();
    for offset in 0..period.min(frames) {
        for bin in 0..bins {
            values.clear();
            let mut frame = offset;
            while frame < frames {
                values.push(magnitude[[bin, frame]]);
                frame += period;
            }
            let med = median(&mut values);
            let mut frame = offset;
            while frame < frames {
                repeating[[bin, frame]] = med;
                frame += period;
            }
        }
    }

    soft_mask(&repeating, magnitude)
}

/// Repeating mask from per-frame similar-frame sets: frame t's column is
/// the per-bin median over the frames in its set.
fn repeating_mask_similar(magnitude: &Array2<f64>, frame_sets: &[Vec<usize>]) -> Array2<f64> {
    let (bins, frames) = magnitude.dim();

    let mut repeating = Array2::<f64>::zeros((bins, frames));
    let mut values = Vec::new();
    for (t, set) in frame_sets.iter().enumerate().take(frames) {
        for bin in 0..bins {
            values.clear();
            for &frame in set {
                values.push(magnitude[[bin, frame]]);
            }
            repeating[[bin, t]] = median(&mut values);
        }
    }

    soft_mask(&repeating, magnitude)
}

/// Clip the repeating estimate against the spectrogram and form the soft
/// ratio mask in [0, 1].
fn soft_mask(repeating: &Array2<f64>, magnitude: &Array2<f64>) -> Array2<f64> {
    let mut mask = Array2::<f64>::zeros(magnitude.dim());
    for ((r, t), value) in mask.indexed_iter_mut() {
        let w = repeating[[r, t]].min(magnitude[[r, t]]);
        *value = (w + EPSILON) / (magnitude[[r, t]] + EPSILON);
    }
    mask
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::f64::consts::PI;
    use unmix_core::stft::WindowType;

    fn window() -> WindowParams {
        WindowParams::new(512, 256, WindowType::Hamming, 512)
    }

    /// A one-second two-note loop tiled four times, at 8 kHz. The loop has
    /// internal structure (a 220 Hz half followed by a 650 Hz half) so its
    /// spectrogram actually repeats with a one-second period.
    fn repeating_mixture() -> AudioBuffer {
        let fs = 8000usize;
        let loop_samples: Vec<f64> = (0..fs)
            .map(|n| {
                let t = n as f64 / fs as f64;
                if n < fs / 2 {
                    0.5 * (2.0 * PI * 220.0 * t).sin()
                } else {
                    0.3 * (2.0 * PI * 650.0 * t).sin()
                }
            })
            .collect();
        let mut samples = Vec::with_capacity(4 * fs);
        for _ in 0..4 {
            samples.extend_from_slice(&loop_samples);
        }
        // A touch of deterministic noise so no frame is exactly silent.
        let mut state = 0x9e3779b97f4a7c15u64;
        for sample in samples.iter_mut() {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            *sample += 0.01 * ((state >> 11) as f64 / (1u64 << 53) as f64 - 0.5);
        }
        AudioBuffer::from_mono(samples, fs as u32)
    }

    #[test]
    fn test_config_validation() {
        assert!(RepetConfig::original().validate().is_ok());
        assert!(RepetConfig::sim().validate().is_ok());
        assert!(RepetConfig::with_period(1.0).validate().is_ok());

        let mut cfg = RepetConfig::original();
        cfg.similarity_threshold = -0.1;
        assert!(cfg.validate().is_err());

        cfg = RepetConfig::with_period(0.0);
        assert!(cfg.validate().is_err());

        cfg = RepetConfig::original();
        cfg.max_period_secs = Some(0.5);
        assert!(cfg.validate().is_err());

        cfg = RepetConfig::sim();
        cfg.max_repeating_frames = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_median() {
        let mut odd = vec![3.0, 1.0, 2.0];
        assert_eq!(median(&mut odd), 2.0);

        let mut even = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut even), 2.5);

        let mut empty: Vec<f64> = vec![];
        assert_eq!(median(&mut empty), 0.0);
    }

    #[test]
    fn test_similarity_matrix_is_cosine() {
        // Two orthogonal columns and a repeat of the first.
        let magnitude = array![[1.0, 0.0, 2.0], [0.0, 1.0, 0.0]];
        let s = compute_similarity_matrix(&magnitude);
        assert_eq!(s.dim(), (3, 3));
        assert!((s[[0, 0]] - 1.0).abs() < 1e-9);
        assert!(s[[0, 1]].abs() < 1e-9);
        assert!((s[[0, 2]] - 1.0).abs() < 1e-9);
        assert!((s[[2, 0]] - s[[0, 2]]).abs() < 1e-12);
    }

    #[test]
    fn test_beat_spectrum_peaks_at_repetition_lag() {
        // A period-4 pattern along frames.
        let (bins, frames) = (3usize, 32usize);
        let mut power = Array2::<f64>::zeros((bins, frames));
        for bin in 0..bins {
            for frame in (0..frames).step_by(4) {
                power[[bin, frame]] = 1.0;
            }
        }
        let beat = compute_beat_spectrum(&power);
        assert_eq!(beat.len(), frames);
        // Lag 4 dominates every lag that is not a multiple of 4.
        for lag in 1..8 {
            if lag != 4 {
                assert!(beat[4] > beat[lag], "lag {lag} beat {} >= {}", beat[lag], beat[4]);
            }
        }
    }

    #[test]
    fn test_find_repeating_period_bounds() {
        let mut beat = vec![0.0; 64];
        beat[0] = 10.0; // lag zero must be ignored
        beat[12] = 1.0;
        let period = find_repeating_period(&beat, 4, 20).expect("period");
        assert_eq!(period, 12);

        // Range that does not fit the lag axis.
        assert!(find_repeating_period(&beat, 80, 90).is_err());
        assert!(find_repeating_period(&beat, 20, 10).is_err());
    }

    #[test]
    fn test_periodic_mask_on_exact_repetition_is_unity() {
        // Period 2 along frames, identical instances: the median equals the
        // data, so the mask is all ones.
        let magnitude = array![[1.0, 2.0, 1.0, 2.0], [0.5, 0.1, 0.5, 0.1]];
        let mask = repeating_mask_periodic(&magnitude, 2);
        for &v in &mask {
            assert!((v - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_periodic_mask_suppresses_outlier() {
        // A one-off burst on top of a constant repeating value.
        let mut magnitude = Array2::<f64>::from_elem((1, 9), 1.0);
        magnitude[[0, 4]] = 10.0;
        let mask = repeating_mask_periodic(&magnitude, 3);
        // The burst frame keeps only the repeating fraction.
        assert!((mask[[0, 4]] - 0.1).abs() < 1e-6);
        // All other frames pass through.
        assert!((mask[[0, 0]] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_periodic_mask_tail_split() {
        // 5 frames with period 2: offsets {0} have 3 instances, offset {1}
        // has 2.
        let magnitude = array![[1.0, 5.0, 3.0, 7.0, 2.0]];
        let mask = repeating_mask_periodic(&magnitude, 2);
        // Offset 0 median over [1, 3, 2] = 2; offset 1 median over [5, 7] = 6.
        // Frame 0: min(2, 1) = 1 -> mask 1; frame 2: min(2, 3)/3 = 2/3.
        assert!((mask[[0, 0]] - 1.0).abs() < 1e-9);
        assert!((mask[[0, 2]] - 2.0 / 3.0).abs() < 1e-9);
        assert!((mask[[0, 1]] - 1.0).abs() < 1e-9);
        assert!((mask[[0, 3]] - 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_recovers_period_of_looped_audio() {
        let mixture = repeating_mixture();
        let repet = Repet::new(&mixture, window(), RepetConfig::original()).expect("new");
        let result = repet.run().expect("run");

        // One second at hop 256 and fs 8000 is 31.25 frames.
        let period = result.period_frames.expect("period");
        assert!(
            (30..=33).contains(&period),
            "period {period} not within a frame of 31.25"
        );

        assert_eq!(result.background.num_samples(), mixture.num_samples());
        assert_eq!(result.foreground.num_samples(), mixture.num_samples());
    }

    #[test]
    fn test_background_plus_foreground_is_mixture() {
        let mixture = repeating_mixture();
        let repet = Repet::new(&mixture, window(), RepetConfig::with_period(1.0)).expect("new");
        let result = repet.run().expect("run");

        let total = result.background.add(&result.foreground).expect("add");
        for n in 0..mixture.num_samples() {
            assert!((total.data()[[0, n]] - mixture.data()[[0, n]]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_silent_input_yields_silent_stems() {
        let silent = AudioBuffer::from_mono(vec![0.0; 32000], 8000);
        let repet = Repet::new(&silent, window(), RepetConfig::original()).expect("new");
        let result = repet.run().expect("run");

        assert!(result.background.data().iter().all(|&v| v.abs() < 1e-12));
        assert!(result.foreground.data().iter().all(|&v| v.abs() < 1e-12));
    }

    #[test]
    fn test_sim_variant_runs_on_repeating_audio() {
        let mixture = repeating_mixture();
        let mut config = RepetConfig::sim();
        // Short clip: cap the repeating frames well below the frame count.
        config.max_repeating_frames = 3;
        config.min_distance_between_frames_secs = 0.5;
        let repet = Repet::new(&mixture, window(), config).expect("new");
        let result = repet.run().expect("run");

        assert!(result.period_frames.is_none());
        assert_eq!(result.background.num_channels(), 1);
        assert_eq!(result.background.num_samples(), mixture.num_samples());
    }

    #[test]
    fn test_similarity_diagnostic_is_square_in_frames() {
        let mixture = repeating_mixture();
        let repet = Repet::new(&mixture, window(), RepetConfig::sim()).expect("new");
        let s = repet.similarity_matrix().expect("similarity");
        let frames = window().frame_count(mixture.num_samples());
        assert_eq!(s.dim(), (frames, frames));
        // Self-similarity of a nonzero frame is 1.
        assert!((s[[10, 10]] - 1.0).abs() < 1e-6);
    }
}
