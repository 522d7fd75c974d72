//! Greedy peak extraction with threshold and minimum-distance suppression
//!
//! Both finders mask out values below the threshold, then repeatedly take
//! the argmax and zero a neighborhood around it so no two returned peaks
//! are closer than the minimum distance. Argmax ties resolve to the first
//! index in row-major traversal order.

use ndarray::ArrayView2;
use unmix_common::{Result, SeparationError};

/// Find up to `max_count` peaks in a vector.
///
/// Values below `threshold` are masked to zero first; if fewer than
/// `max_count` entries survive the mask, the search fails. Each pick zeroes
/// the inclusive window [p - d, p + d]. The search stops early when
/// suppression empties the vector. `min_distance` defaults to a quarter of
/// the vector length.
///
/// Returns peak indices sorted ascending.
///
/// # Errors
/// Returns `InsufficientPeaks` when fewer than `max_count` values pass the
/// threshold.
pub fn find_peaks(
    data: &[f64],
    threshold: f64,
    min_distance: Option<usize>,
    max_count: usize,
) -> Result<Vec<usize>> {
    let distance = min_distance.unwrap_or(data.len() / 4);

    let mut masked: Vec<f64> = data
        .iter()
        .map(|&v| if v >= threshold { v } else { 0.0 })
        .collect();

    let candidates = masked.iter().filter(|&&v| v != 0.0).count();
    if candidates < max_count {
        return Err(SeparationError::InsufficientPeaks {
            requested: max_count,
            found: candidates,
        });
    }

    let mut peaks = Vec::with_capacity(max_count);
    while peaks.len() < max_count {
        let (best, value) = argmax(&masked);
        if value == 0.0 {
            break;
        }
        peaks.push(best);

        let lo = best.saturating_sub(distance);
        let hi = (best + distance).min(masked.len() - 1);
        for entry in &mut masked[lo..=hi] {
            *entry = 0.0;
        }
    }

    peaks.sort_unstable();
    Ok(peaks)
}

/// Find up to `max_count` peaks in a matrix.
///
/// Same greedy rule as [`find_peaks`] in two dimensions: each pick zeroes a
/// (2*d_r + 1) x (2*d_c + 1) rectangle around it. `min_distance` defaults
/// to a quarter of each matrix dimension.
///
/// Returns (row, col) pairs in pick order (descending value).
///
/// # Errors
/// Returns `InsufficientPeaks` when fewer than `max_count` values pass the
/// threshold.
pub fn find_peaks_2d(
    data: ArrayView2<'_, f64>,
    threshold: f64,
    min_distance: Option<(usize, usize)>,
    max_count: usize,
) -> Result<Vec<(usize, usize)>> {
    let (rows, cols) = data.dim();
    let (row_dist, col_dist) = min_distance.unwrap_or((rows / 4, cols / 4));

    let mut masked = data.mapv(|v| if v >= threshold { v } else { 0.0 });

    let candidates = masked.iter().filter(|&&v| v != 0.0).count();
    if candidates < max_count {
        return Err(SeparationError::InsufficientPeaks {
            requested: max_count,
            found: candidates,
        });
    }

    let mut peaks = Vec::with_capacity(max_count);
    while peaks.len() < max_count {
        let mut best = (0usize, 0usize);
        let mut value = f64::NEG_INFINITY;
        for ((r, c), &v) in masked.indexed_iter() {
            if v > value {
                value = v;
                best = (r, c);
            }
        }
        if value == 0.0 {
            break;
        }
        peaks.push(best);

        let r_lo = best.0.saturating_sub(row_dist);
        let r_hi = (best.0 + row_dist).min(rows - 1);
        let c_lo = best.1.saturating_sub(col_dist);
        let c_hi = (best.1 + col_dist).min(cols - 1);
        for r in r_lo..=r_hi {
            for c in c_lo..=c_hi {
                masked[[r, c]] = 0.0;
            }
        }
    }

    Ok(peaks)
}

fn argmax(data: &[f64]) -> (usize, f64) {
    let mut best = 0;
    let mut value = f64::NEG_INFINITY;
    for (i, &v) in data.iter().enumerate() {
        if v > value {
            value = v;
            best = i;
        }
    }
    (best, value)
}
