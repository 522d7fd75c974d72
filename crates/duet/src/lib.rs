//! DUET blind source separation
//!
//! The Degenerate Unmixing Estimation Technique extracts N sources from a
//! stereo mixture by clustering time-frequency bins in an (attenuation,
//! delay) plane. Per-bin relative attenuation and delay between the two
//! channels feed a weighted 2-D histogram; its peaks are the source mixing
//! estimates, and a maximum-likelihood binary mask assigns every bin to the
//! closest estimate.
//!
//! # Example
//! ```no_run
//! use unmix_core::{AudioBuffer, WindowParams};
//! use unmix_duet::{Duet, DuetConfig};
//!
//! # fn main() -> unmix_common::Result<()> {
//! let mixture = AudioBuffer::from_file("mixture.wav")?;
//! let window = WindowParams::default_for_rate(mixture.sample_rate());
//! let duet = Duet::new(&mixture, window, DuetConfig::new(2))?;
//! let result = duet.run()?;
//! for (source, estimate) in result.sources.iter().zip(&result.estimates) {
//!     println!("{} samples at delay {}", source.num_samples(), estimate.delay);
//! }
//! # Ok(())
//! # }
//! ```

use ndarray::{s, Array2};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info};
use unmix_common::{Result, SeparationError, EPSILON};
use unmix_core::peaks::find_peaks_2d;
use unmix_core::smooth::{box_kernel, smooth_2d};
use unmix_core::stft::{istft, stft, WindowParams};
use unmix_core::AudioBuffer;

/// DUET estimator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuetConfig {
    /// Number of sources to extract
    pub num_sources: usize,
    /// Lower bound of the symmetric-attenuation axis
    pub attenuation_min: f64,
    /// Upper bound of the symmetric-attenuation axis
    pub attenuation_max: f64,
    /// Number of attenuation histogram bins
    pub attenuation_bins: usize,
    /// Lower bound of the delay axis (samples)
    pub delay_min: f64,
    /// Upper bound of the delay axis (samples)
    pub delay_max: f64,
    /// Number of delay histogram bins
    pub delay_bins: usize,
    /// Peak-picking threshold on the normalized histogram, in [0, 1]
    pub peak_threshold: f64,
    /// Minimum distance between histogram peaks along the attenuation axis,
    /// in bins
    pub attenuation_min_distance: usize,
    /// Minimum distance between histogram peaks along the delay axis, in bins
    pub delay_min_distance: usize,
    /// Exponent p on the |X1|*|X2| magnitude product in the histogram weights
    pub magnitude_exponent: f64,
    /// Exponent q on |omega| in the histogram weights
    pub frequency_exponent: f64,
}

impl DuetConfig {
    /// Default estimator parameters for a given source count: a +-3 window
    /// on both axes with 50 bins each, threshold 0.2, minimum peak distance
    /// of 5 bins, and weights |X1|*|X2| (p = 1, q = 0).
    #[must_use]
    pub fn new(num_sources: usize) -> Self {
        Self {
            num_sources,
            attenuation_min: -3.0,
            attenuation_max: 3.0,
            attenuation_bins: 50,
            delay_min: -3.0,
            delay_max: 3.0,
            delay_bins: 50,
            peak_threshold: 0.2,
            attenuation_min_distance: 5,
            delay_min_distance: 5,
            magnitude_exponent: 1.0,
            frequency_exponent: 0.0,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for an empty source count, inverted axis
    /// ranges, zero bin counts, or an out-of-range threshold.
    pub fn validate(&self) -> Result<()> {
        if self.num_sources == 0 {
            return Err(SeparationError::InvalidParameter(
                "num_sources must be >= 1".to_string(),
            ));
        }
        if self.attenuation_max <= self.attenuation_min {
            return Err(SeparationError::InvalidParameter(
                "attenuation_max must be > attenuation_min".to_string(),
            ));
        }
        if self.delay_max <= self.delay_min {
            return Err(SeparationError::InvalidParameter(
                "delay_max must be > delay_min".to_string(),
            ));
        }
        if self.attenuation_bins == 0 || self.delay_bins == 0 {
            return Err(SeparationError::InvalidParameter(
                "histogram bin counts must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.peak_threshold) {
            return Err(SeparationError::InvalidParameter(
                "peak_threshold must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mixing-parameter estimate for one source
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SourceEstimate {
    /// Symmetric attenuation a - 1/a at the histogram peak
    pub symmetric_attenuation: f64,
    /// Relative delay in samples at the histogram peak
    pub delay: f64,
}

impl SourceEstimate {
    /// Convert the symmetric attenuation back to the linear inter-channel
    /// magnitude ratio a.
    #[must_use]
    pub fn linear_attenuation(&self) -> f64 {
        let alpha = self.symmetric_attenuation;
        (alpha + (alpha * alpha + 4.0).sqrt()) / 2.0
    }
}

/// The weighted attenuation/delay histogram with its bin edges
#[derive(Debug, Clone)]
pub struct DuetHistogram {
    /// Normalized smoothed weights, shape [attenuation_bins, delay_bins],
    /// max value 1
    pub counts: Array2<f64>,
    /// Attenuation bin edges, length attenuation_bins + 1
    pub attenuation_edges: Vec<f64>,
    /// Delay bin edges, length delay_bins + 1
    pub delay_edges: Vec<f64>,
}

impl DuetHistogram {
    /// Center of an attenuation bin.
    #[must_use]
    pub fn attenuation_center(&self, bin: usize) -> f64 {
        (self.attenuation_edges[bin] + self.attenuation_edges[bin + 1]) / 2.0
    }

    /// Center of a delay bin.
    #[must_use]
    pub fn delay_center(&self, bin: usize) -> f64 {
        (self.delay_edges[bin] + self.delay_edges[bin + 1]) / 2.0
    }
}

/// Result of a DUET run
#[derive(Debug, Clone)]
pub struct DuetResult {
    /// Separated sources, one single-channel buffer each, truncated to the
    /// mixture length
    pub sources: Vec<AudioBuffer>,
    /// Mixing estimates, one per source, in the same order
    pub estimates: Vec<SourceEstimate>,
    /// Binary masks, shape [bins, frames] including the (always zero) DC
    /// row; each time-frequency bin above DC belongs to exactly one mask
    pub masks: Vec<Array2<f64>>,
}

/// Per-bin features extracted from the two channel spectrograms
struct TfFeatures {
    x1: Array2<Complex<f64>>,
    x2: Array2<Complex<f64>>,
    /// Angular frequency of each kept bin in radians/sample (DC dropped)
    omega: Vec<f64>,
    alpha: Array2<f64>,
    delta: Array2<f64>,
    weights: Array2<f64>,
}

/// DUET separator over a borrowed stereo mixture
#[derive(Debug)]
pub struct Duet<'a> {
    mixture: &'a AudioBuffer,
    window: WindowParams,
    config: DuetConfig,
}

impl<'a> Duet<'a> {
    /// Create a separator for a stereo mixture.
    ///
    /// # Errors
    /// Returns `InvalidChannelCount` unless the mixture has exactly two
    /// channels, or `InvalidParameter` for bad configuration.
    pub fn new(mixture: &'a AudioBuffer, window: WindowParams, config: DuetConfig) -> Result<Self> {
        config.validate()?;
        window.validate()?;
        if mixture.num_channels() != 2 {
            return Err(SeparationError::InvalidChannelCount {
                expected: 2,
                actual: mixture.num_channels(),
            });
        }
        Ok(Self {
            mixture,
            window,
            config,
        })
    }

    /// Run the full estimation: histogram, peak picking, maximum-likelihood
    /// masking, and per-source reconstruction.
    ///
    /// # Errors
    /// Returns `InsufficientPeaks` when the histogram cannot supply the
    /// requested number of peaks.
    pub fn run(&self) -> Result<DuetResult> {
        info!(
            "DUET: extracting {} source(s) from {} samples",
            self.config.num_sources,
            self.mixture.num_samples()
        );

        let features = self.compute_features()?;
        let histogram = self.build_histogram(&features)?;

        let peaks = find_peaks_2d(
            histogram.counts.view(),
            self.config.peak_threshold,
            Some((
                self.config.attenuation_min_distance,
                self.config.delay_min_distance,
            )),
            self.config.num_sources,
        )?;

        let estimates: Vec<SourceEstimate> = peaks
            .iter()
            .map(|&(a_bin, d_bin)| SourceEstimate {
                symmetric_attenuation: histogram.attenuation_center(a_bin),
                delay: histogram.delay_center(d_bin),
            })
            .collect();

        for (i, est) in estimates.iter().enumerate() {
            debug!(
                "peak {}: alpha={:.3} (a={:.3}), delta={:.3}",
                i,
                est.symmetric_attenuation,
                est.linear_attenuation(),
                est.delay
            );
        }

        let assignment = self.assign_bins(&features, &estimates);
        self.reconstruct(&features, &estimates, &assignment)
    }

    /// The normalized, smoothed attenuation/delay histogram.
    ///
    /// # Errors
    /// Returns `InsufficientPeaks` when no time-frequency point lands
    /// inside the histogram ranges.
    pub fn histogram(&self) -> Result<DuetHistogram> {
        let features = self.compute_features()?;
        self.build_histogram(&features)
    }

    fn compute_features(&self) -> Result<TfFeatures> {
        let fs = self.mixture.sample_rate();
        let ch1 = self.mixture.channel(1)?.to_vec();
        let ch2 = self.mixture.channel(2)?.to_vec();

        let s1 = stft(&ch1, &self.window, fs)?;
        let s2 = stft(&ch2, &self.window, fs)?;

        // Drop the DC bin so delay estimation never divides by zero
        // frequency.
        let x1 = s1.spectrogram.slice(s![1.., ..]).to_owned();
        let x2 = s2.spectrogram.slice(s![1.., ..]).to_owned();
        let omega: Vec<f64> = s1.frequencies[1..]
            .iter()
            .map(|&f| 2.0 * PI * f / f64::from(fs))
            .collect();

        let (bins, frames) = x1.dim();
        let mut alpha = Array2::<f64>::zeros((bins, frames));
        let mut delta = Array2::<f64>::zeros((bins, frames));
        let mut weights = Array2::<f64>::zeros((bins, frames));

        let p = self.config.magnitude_exponent;
        let q = self.config.frequency_exponent;
        let eps = Complex::new(EPSILON, 0.0);

        for k in 0..bins {
            for t in 0..frames {
                let ratio = (x2[[k, t]] + eps) / (x1[[k, t]] + eps);
                let attenuation = ratio.norm();
                alpha[[k, t]] = attenuation - 1.0 / attenuation;
                delta[[k, t]] = -ratio.ln().im / omega[k];
                weights[[k, t]] =
                    (x1[[k, t]].norm() * x2[[k, t]].norm()).powf(p) * omega[k].abs().powf(q);
            }
        }

        Ok(TfFeatures {
            x1,
            x2,
            omega,
            alpha,
            delta,
            weights,
        })
    }

    fn build_histogram(&self, features: &TfFeatures) -> Result<DuetHistogram> {
        let cfg = &self.config;
        let a_span = cfg.attenuation_max - cfg.attenuation_min;
        let d_span = cfg.delay_max - cfg.delay_min;

        let mut counts = Array2::<f64>::zeros((cfg.attenuation_bins, cfg.delay_bins));

        // Only time-frequency points with in-bounds estimates contribute.
        for ((k, t), &alpha) in features.alpha.indexed_iter() {
            let delta = features.delta[[k, t]];
            if alpha <= cfg.attenuation_min
                || alpha >= cfg.attenuation_max
                || delta <= cfg.delay_min
                || delta >= cfg.delay_max
            {
                continue;
            }
            let a_bin = (((alpha - cfg.attenuation_min) / a_span) * cfg.attenuation_bins as f64)
                as usize;
            let d_bin = (((delta - cfg.delay_min) / d_span) * cfg.delay_bins as f64) as usize;
            let a_bin = a_bin.min(cfg.attenuation_bins - 1);
            let d_bin = d_bin.min(cfg.delay_bins - 1);
            counts[[a_bin, d_bin]] += features.weights[[k, t]];
        }

        let max = counts.iter().fold(0.0f64, |acc, &v| acc.max(v));
        if max <= 0.0 {
            return Err(SeparationError::InsufficientPeaks {
                requested: cfg.num_sources,
                found: 0,
            });
        }
        counts.mapv_inplace(|v| v / max);

        let mut counts = smooth_2d(counts.view(), &box_kernel(3));
        let max = counts.iter().fold(0.0f64, |acc, &v| acc.max(v));
        counts.mapv_inplace(|v| v / max);

        debug!(
            "histogram: {} x {} bins",
            cfg.attenuation_bins, cfg.delay_bins
        );

        let attenuation_edges = (0..=cfg.attenuation_bins)
            .map(|i| cfg.attenuation_min + i as f64 * a_span / cfg.attenuation_bins as f64)
            .collect();
        let delay_edges = (0..=cfg.delay_bins)
            .map(|i| cfg.delay_min + i as f64 * d_span / cfg.delay_bins as f64)
            .collect();

        Ok(DuetHistogram {
            counts,
            attenuation_edges,
            delay_edges,
        })
    }

    /// Maximum-likelihood assignment: each bin goes to the estimate
    /// minimizing |a*e^(-j*omega*d)*X1 - X2|^2 / (1 + a^2), ties to the
    /// lower source index.
    fn assign_bins(&self, features: &TfFeatures, estimates: &[SourceEstimate]) -> Array2<usize> {
        let (bins, frames) = features.x1.dim();
        let mut best_score = Array2::<f64>::from_elem((bins, frames), f64::INFINITY);
        let mut best_index = Array2::<usize>::zeros((bins, frames));

        for (i, estimate) in estimates.iter().enumerate() {
            let a = estimate.linear_attenuation();
            let d = estimate.delay;
            let norm = 1.0 + a * a;
            for k in 0..bins {
                let steer = Complex::from_polar(a, -features.omega[k] * d);
                for t in 0..frames {
                    let score =
                        (steer * features.x1[[k, t]] - features.x2[[k, t]]).norm_sqr() / norm;
                    if score < best_score[[k, t]] {
                        best_score[[k, t]] = score;
                        best_index[[k, t]] = i;
                    }
                }
            }
        }

        best_index
    }

    fn reconstruct(
        &self,
        features: &TfFeatures,
        estimates: &[SourceEstimate],
        assignment: &Array2<usize>,
    ) -> Result<DuetResult> {
        let fs = self.mixture.sample_rate();
        let num_samples = self.mixture.num_samples();
        let (bins, frames) = features.x1.dim();

        let mut sources = Vec::with_capacity(estimates.len());
        let mut masks = Vec::with_capacity(estimates.len());

        for (i, estimate) in estimates.iter().enumerate() {
            let a = estimate.linear_attenuation();
            let d = estimate.delay;
            let norm = 1.0 + a * a;

            // Combined spectrogram with the DC row restored as zeros.
            let mut combined = Array2::<Complex<f64>>::zeros((bins + 1, frames));
            let mut mask = Array2::<f64>::zeros((bins + 1, frames));
            for k in 0..bins {
                let steer = Complex::from_polar(a, features.omega[k] * d);
                for t in 0..frames {
                    if assignment[[k, t]] == i {
                        mask[[k + 1, t]] = 1.0;
                        combined[[k + 1, t]] =
                            (features.x1[[k, t]] + steer * features.x2[[k, t]]) / norm;
                    }
                }
            }

            let (mut samples, _times) = istft(combined.view(), &self.window, fs)?;
            samples.truncate(num_samples);
            sources.push(AudioBuffer::from_mono(samples, fs));
            masks.push(mask);
        }

        info!("DUET: reconstructed {} source(s)", sources.len());

        Ok(DuetResult {
            sources,
            estimates: estimates.to_vec(),
            masks,
        })
    }
}
