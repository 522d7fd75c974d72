//! Multi-channel PCM container
//!
//! [`AudioBuffer`] holds floating-point PCM shaped [channels, samples] in
//! [-1, 1] together with its sample rate. It covers WAV load/store, channel
//! access, concatenation, zero-extending arithmetic, peak normalization and
//! a stateful STFT/iSTFT pair that caches the multi-channel spectrogram.

use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rustfft::num_complex::Complex;
use std::path::Path;
use tracing::debug;
use unmix_common::{Result, SeparationError, DEFAULT_BIT_DEPTH, DEFAULT_SAMPLE_RATE};

use crate::stft::{self, WindowParams};

/// Multi-channel PCM buffer, shaped [channels, samples]
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    data: Array2<f64>,
    sample_rate: u32,
    stft_data: Option<Array3<Complex<f64>>>,
}

impl AudioBuffer {
    /// Build a buffer from an existing [channels, samples] array.
    #[must_use]
    pub fn from_array(data: Array2<f64>, sample_rate: u32) -> Self {
        Self {
            data,
            sample_rate,
            stft_data: None,
        }
    }

    /// Build a single-channel buffer from a sample vector.
    #[must_use]
    pub fn from_mono(samples: Vec<f64>, sample_rate: u32) -> Self {
        let len = samples.len();
        let data = Array2::from_shape_vec((1, len), samples)
            .unwrap_or_else(|_| Array2::zeros((1, 0)));
        Self::from_array(data, sample_rate)
    }

    /// Load a WAV file into a buffer.
    ///
    /// Integer PCM is converted to float by dividing by 2^(bits - 1); float
    /// PCM is taken as-is. The channel layout of the file is preserved.
    ///
    /// # Errors
    /// Returns `IoRead` when the file cannot be opened or decoded.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::load(path.as_ref(), 0, None)
    }

    /// Load a section of a WAV file, given a starting position and duration
    /// in seconds. The section is clamped to the available samples.
    ///
    /// # Errors
    /// Returns `IoRead` when the file cannot be opened or decoded.
    pub fn from_file_segment(
        path: impl AsRef<Path>,
        start_secs: f64,
        duration_secs: f64,
    ) -> Result<Self> {
        let path = path.as_ref();
        let reader = hound::WavReader::open(path)
            .map_err(|e| SeparationError::IoRead(format!("{}: {e}", path.display())))?;
        let sample_rate = reader.spec().sample_rate;
        drop(reader);

        let start = (start_secs * f64::from(sample_rate)) as usize;
        let length = (duration_secs * f64::from(sample_rate)) as usize;
        Self::load(path, start, Some(length))
    }

    fn load(path: &Path, start: usize, length: Option<usize>) -> Result<Self> {
        let mut reader = hound::WavReader::open(path)
            .map_err(|e| SeparationError::IoRead(format!("{}: {e}", path.display())))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 {
            return Err(SeparationError::IoRead(format!(
                "{}: no channels",
                path.display()
            )));
        }

        let interleaved: Vec<f64> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let scale = f64::from(1u32 << (spec.bits_per_sample - 1));
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| f64::from(v) / scale))
                    .collect::<std::result::Result<_, _>>()
                    .map_err(|e| SeparationError::IoRead(format!("{}: {e}", path.display())))?
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| SeparationError::IoRead(format!("{}: {e}", path.display())))?,
        };

        let total = interleaved.len() / channels;
        let start = start.min(total);
        let end = match length {
            Some(len) => (start + len).min(total),
            None => total,
        };
        let samples = end - start;

        let mut data = Array2::<f64>::zeros((channels, samples));
        for frame in 0..samples {
            for ch in 0..channels {
                data[[ch, frame]] = interleaved[(start + frame) * channels + ch];
            }
        }

        debug!(
            "loaded {}: {} channel(s), {} samples at {} Hz",
            path.display(),
            channels,
            samples,
            spec.sample_rate
        );

        Ok(Self::from_array(data, spec.sample_rate))
    }

    /// Write the buffer as 16-bit PCM WAV at its own sample rate.
    ///
    /// # Errors
    /// Returns `IoWrite` when the file cannot be created or encoded.
    pub fn write_to_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let rate = self.sample_rate;
        self.write_to_file_with_rate(path, rate)
    }

    /// Write the buffer as 16-bit PCM WAV at an explicit sample rate.
    ///
    /// The buffer is peak-normalized in place first, then each sample is
    /// scaled by 2^15 and clamped to the i16 range.
    ///
    /// # Errors
    /// Returns `IoWrite` when the file cannot be created or encoded.
    pub fn write_to_file_with_rate(
        &mut self,
        path: impl AsRef<Path>,
        sample_rate: u32,
    ) -> Result<()> {
        let path = path.as_ref();
        self.peak_normalize();

        let spec = hound::WavSpec {
            channels: self.num_channels() as u16,
            sample_rate,
            bits_per_sample: DEFAULT_BIT_DEPTH as u16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| SeparationError::IoWrite(format!("{}: {e}", path.display())))?;

        for frame in 0..self.num_samples() {
            for ch in 0..self.num_channels() {
                let scaled = (self.data[[ch, frame]] * 32768.0)
                    .clamp(f64::from(i16::MIN), f64::from(i16::MAX));
                writer
                    .write_sample(scaled as i16)
                    .map_err(|e| SeparationError::IoWrite(format!("{}: {e}", path.display())))?;
            }
        }

        writer
            .finalize()
            .map_err(|e| SeparationError::IoWrite(format!("{}: {e}", path.display())))?;

        debug!("wrote {} at {} Hz", path.display(), sample_rate);
        Ok(())
    }

    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.data.nrows()
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.data.ncols()
    }

    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration of the buffer in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.num_samples() as f64 / f64::from(self.sample_rate)
    }

    /// The raw [channels, samples] data.
    #[must_use]
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Time of each sample in seconds.
    #[must_use]
    pub fn times(&self) -> Vec<f64> {
        let fs = f64::from(self.sample_rate);
        (0..self.num_samples()).map(|n| n as f64 / fs).collect()
    }

    /// A single channel, 1-based.
    ///
    /// # Errors
    /// Returns `BadChannelIndex` when the index is 0 or past the channel
    /// count.
    pub fn channel(&self, n: usize) -> Result<ArrayView1<'_, f64>> {
        if n == 0 || n > self.num_channels() {
            return Err(SeparationError::BadChannelIndex {
                index: n,
                count: self.num_channels(),
            });
        }
        Ok(self.data.row(n - 1))
    }

    /// Append another buffer along time.
    ///
    /// # Errors
    /// Returns `ChannelMismatch` when the channel counts differ.
    pub fn concat(&mut self, other: &AudioBuffer) -> Result<()> {
        if self.num_channels() != other.num_channels() {
            return Err(SeparationError::ChannelMismatch {
                left: self.num_channels(),
                right: other.num_channels(),
            });
        }

        let channels = self.num_channels();
        let (n1, n2) = (self.num_samples(), other.num_samples());
        let mut combined = Array2::<f64>::zeros((channels, n1 + n2));
        combined.slice_mut(s![.., ..n1]).assign(&self.data);
        combined.slice_mut(s![.., n1..]).assign(&other.data);
        self.data = combined;
        self.stft_data = None;
        Ok(())
    }

    /// Sample-wise sum of two buffers, zero-extending the shorter one.
    ///
    /// # Errors
    /// Returns `ChannelMismatch` or `RateMismatch` when the buffers are not
    /// compatible.
    pub fn add(&self, other: &AudioBuffer) -> Result<AudioBuffer> {
        self.combine(other, 1.0)
    }

    /// Sample-wise difference of two buffers, zero-extending the shorter one.
    ///
    /// # Errors
    /// Returns `ChannelMismatch` or `RateMismatch` when the buffers are not
    /// compatible.
    pub fn subtract(&self, other: &AudioBuffer) -> Result<AudioBuffer> {
        self.combine(other, -1.0)
    }

    fn combine(&self, other: &AudioBuffer, sign: f64) -> Result<AudioBuffer> {
        if self.num_channels() != other.num_channels() {
            return Err(SeparationError::ChannelMismatch {
                left: self.num_channels(),
                right: other.num_channels(),
            });
        }
        if self.sample_rate != other.sample_rate {
            return Err(SeparationError::RateMismatch {
                left: self.sample_rate,
                right: other.sample_rate,
            });
        }

        let channels = self.num_channels();
        let samples = self.num_samples().max(other.num_samples());
        let mut combined = Array2::<f64>::zeros((channels, samples));
        combined
            .slice_mut(s![.., ..self.num_samples()])
            .assign(&self.data);
        for ch in 0..channels {
            for n in 0..other.num_samples() {
                combined[[ch, n]] += sign * other.data[[ch, n]];
            }
        }

        Ok(AudioBuffer::from_array(combined, self.sample_rate))
    }

    /// Divide by the absolute maximum if it exceeds 1; no-op otherwise.
    pub fn peak_normalize(&mut self) {
        let peak = self.data.iter().fold(0.0f64, |acc, &v| acc.max(v.abs()));
        if peak > 1.0 {
            self.data.mapv_inplace(|v| v / peak);
        }
    }

    /// Truncate the buffer to the first `samples` samples.
    pub fn truncate(&mut self, samples: usize) {
        if samples < self.num_samples() {
            self.data = self.data.slice(s![.., ..samples]).to_owned();
            self.stft_data = None;
        }
    }

    /// Forward STFT of every channel, cached on the buffer.
    ///
    /// Returns the [channels, bins, frames] complex spectrogram.
    ///
    /// # Errors
    /// Returns `InvalidParameter` when the window parameters are
    /// inconsistent.
    pub fn stft(&mut self, params: &WindowParams) -> Result<&Array3<Complex<f64>>> {
        let channels = self.num_channels();
        let bins = params.bin_count();
        let frames = params.frame_count(self.num_samples());

        let mut cube = Array3::<Complex<f64>>::zeros((channels, bins, frames));
        for ch in 0..channels {
            let samples = self.data.row(ch).to_vec();
            let result = stft::stft(&samples, params, self.sample_rate)?;
            cube.slice_mut(s![ch, .., ..]).assign(&result.spectrogram);
        }

        self.stft_data = Some(cube);
        self.stft_data
            .as_ref()
            .ok_or(SeparationError::InvalidStftState)
    }

    /// The cached spectrogram from the last forward STFT, if any.
    #[must_use]
    pub fn stft_data(&self) -> Option<&Array3<Complex<f64>>> {
        self.stft_data.as_ref()
    }

    /// Rebuild the PCM data from the cached spectrogram.
    ///
    /// Overwrites the audio data with the overlap-add reconstruction, whose
    /// length is (frames - 1) * H + L.
    ///
    /// # Errors
    /// Returns `InvalidStftState` when no forward STFT has been run.
    pub fn istft(&mut self, params: &WindowParams) -> Result<()> {
        let signals: Vec<Vec<f64>> = {
            let spec = self
                .stft_data
                .as_ref()
                .ok_or(SeparationError::InvalidStftState)?;
            let mut signals = Vec::with_capacity(spec.shape()[0]);
            for ch in 0..spec.shape()[0] {
                let view: ArrayView2<'_, Complex<f64>> = spec.index_axis(Axis(0), ch);
                let (samples, _times) = stft::istft(view, params, self.sample_rate)?;
                signals.push(samples);
            }
            signals
        };

        let channels = signals.len();
        let length = signals.first().map_or(0, Vec::len);
        let mut data = Array2::<f64>::zeros((channels, length));
        for (ch, samples) in signals.iter().enumerate() {
            for (n, &v) in samples.iter().enumerate() {
                data[[ch, n]] = v;
            }
        }
        self.data = data;
        Ok(())
    }
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::from_array(Array2::zeros((1, 0)), DEFAULT_SAMPLE_RATE)
    }
}
