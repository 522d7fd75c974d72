//! STFT Round-Trip Suite
//!
//! Verifies the forward/inverse transform contract across window sizes and
//! window types: shape invariants, interior reconstruction accuracy, and
//! multi-channel buffer round-trips.

use unmix::core::stft::{istft, stft};
use unmix::{AudioBuffer, WindowParams, WindowType};

/// Deterministic pseudo-random signal in [-0.5, 0.5].
fn noise_signal(num_samples: usize, seed: u64) -> Vec<f64> {
    let mut state = seed;
    (0..num_samples)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            (state >> 11) as f64 / (1u64 << 53) as f64 - 0.5
        })
        .collect()
}

fn relative_rms_error(reference: &[f64], candidate: &[f64], skip: usize) -> f64 {
    let hi = reference.len() - skip;
    let mut err = 0.0;
    let mut norm = 0.0;
    for n in skip..hi {
        err += (candidate[n] - reference[n]).powi(2);
        norm += reference[n].powi(2);
    }
    (err / norm).sqrt()
}

#[test]
fn roundtrip_across_window_sizes_and_types() {
    let sample_rate = 44100;
    for &window_length in &[256usize, 1024, 2048] {
        for &window_type in &[WindowType::Hamming, WindowType::Hanning] {
            let params = WindowParams::new(
                window_length,
                window_length / 2,
                window_type,
                window_length,
            );
            let signal = noise_signal(4 * window_length, 0xdead_beef);

            let forward = stft(&signal, &params, sample_rate).expect("stft failed");
            assert_eq!(forward.spectrogram.nrows(), window_length / 2 + 1);

            let (reconstructed, _times) =
                istft(forward.spectrogram.view(), &params, sample_rate).expect("istft failed");
            assert!(reconstructed.len() >= signal.len());

            let error = relative_rms_error(&signal, &reconstructed, window_length);
            assert!(
                error < 1e-5,
                "L={window_length} {window_type:?}: relative error {error}"
            );
        }
    }
}

#[test]
fn frame_count_matches_grid_formula() {
    let params = WindowParams::new(1024, 512, WindowType::Hamming, 1024);
    for &num_samples in &[100usize, 1024, 1025, 4096, 44100] {
        let signal = vec![0.0; num_samples];
        let forward = stft(&signal, &params, 44100).expect("stft failed");
        let expected = if num_samples <= 1024 {
            1
        } else {
            (num_samples - 1024 + 511) / 512 + 1
        };
        assert_eq!(
            forward.spectrogram.ncols(),
            expected,
            "wrong frame count for {num_samples} samples"
        );
    }
}

#[test]
fn two_channel_buffer_roundtrip_preserves_shape() {
    let sample_rate = 8000;
    let num_samples = 20000;
    let left = noise_signal(num_samples, 1);
    let right = noise_signal(num_samples, 2);

    let mut data = ndarray::Array2::<f64>::zeros((2, num_samples));
    for n in 0..num_samples {
        data[[0, n]] = left[n];
        data[[1, n]] = right[n];
    }
    let mut buffer = AudioBuffer::from_array(data, sample_rate);

    let params = WindowParams::new(512, 256, WindowType::Hanning, 512);
    let cube = buffer.stft(&params).expect("stft failed");
    assert_eq!(cube.shape()[0], 2);
    assert_eq!(cube.shape()[1], 257);

    buffer.istft(&params).expect("istft failed");
    assert_eq!(buffer.num_channels(), 2);
    assert!(buffer.num_samples() >= num_samples);
    buffer.truncate(num_samples);
    assert_eq!(buffer.num_samples(), num_samples);

    let recovered_left = buffer.channel(1).expect("channel").to_vec();
    let error = relative_rms_error(&left, &recovered_left, 512);
    assert!(error < 1e-6, "channel 1 relative error {error}");
}

#[test]
fn blackman_and_rectangular_also_invert() {
    let sample_rate = 16000;
    for &window_type in &[WindowType::Blackman, WindowType::Rectangular] {
        let params = WindowParams::new(512, 256, window_type, 512);
        let signal = noise_signal(4096, 42);

        let forward = stft(&signal, &params, sample_rate).expect("stft failed");
        let (reconstructed, _) =
            istft(forward.spectrogram.view(), &params, sample_rate).expect("istft failed");

        let error = relative_rms_error(&signal, &reconstructed, 512);
        assert!(error < 1e-6, "{window_type:?}: relative error {error}");
    }
}
