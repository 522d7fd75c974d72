//! Small 2-D kernel smoothing with edge-replicated padding
//!
//! Used to low-pass the DUET attenuation/delay histogram before peak
//! picking. The input is padded by replicating its border values, then
//! correlated with the kernel in valid mode, so the output keeps the input
//! shape. A constant matrix smooths to itself.

use ndarray::{Array2, ArrayView2};

/// k x k averaging kernel with entries 1/k^2.
#[must_use]
pub fn box_kernel(size: usize) -> Array2<f64> {
    Array2::from_elem((size, size), 1.0 / (size * size) as f64)
}

/// Smooth a matrix with the given kernel.
///
/// Kernels with an even dimension are first convolved with [1; 1]/2 along
/// that axis so the kernel center is well defined. The input is
/// replicate-padded by half the kernel size on every edge (corners take
/// the corner value) and correlated in valid mode; the result has the
/// input's shape.
#[must_use]
pub fn smooth_2d(input: ArrayView2<'_, f64>, kernel: &Array2<f64>) -> Array2<f64> {
    if input.is_empty() {
        return input.to_owned();
    }
    let kernel = make_odd(kernel);
    let (k_rows, k_cols) = kernel.dim();
    let (rows, cols) = input.dim();
    let pad_rows = k_rows / 2;
    let pad_cols = k_cols / 2;

    let padded = replicate_pad(input, pad_rows, pad_cols);

    let mut output = Array2::<f64>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for u in 0..k_rows {
                for v in 0..k_cols {
                    acc += padded[[r + u, c + v]] * kernel[[u, v]];
                }
            }
            output[[r, c]] = acc;
        }
    }
    output
}

/// Convolve even kernel dimensions with a length-2 averaging kernel so both
/// dimensions end up odd.
fn make_odd(kernel: &Array2<f64>) -> Array2<f64> {
    let mut kernel = kernel.clone();

    if kernel.nrows() % 2 == 0 {
        let (rows, cols) = kernel.dim();
        let mut widened = Array2::<f64>::zeros((rows + 1, cols));
        for r in 0..=rows {
            for c in 0..cols {
                let above = if r > 0 { kernel[[r - 1, c]] } else { 0.0 };
                let here = if r < rows { kernel[[r, c]] } else { 0.0 };
                widened[[r, c]] = 0.5 * (above + here);
            }
        }
        kernel = widened;
    }

    if kernel.ncols() % 2 == 0 {
        let (rows, cols) = kernel.dim();
        let mut widened = Array2::<f64>::zeros((rows, cols + 1));
        for r in 0..rows {
            for c in 0..=cols {
                let left = if c > 0 { kernel[[r, c - 1]] } else { 0.0 };
                let here = if c < cols { kernel[[r, c]] } else { 0.0 };
                widened[[r, c]] = 0.5 * (left + here);
            }
        }
        kernel = widened;
    }

    kernel
}

fn replicate_pad(input: ArrayView2<'_, f64>, pad_rows: usize, pad_cols: usize) -> Array2<f64> {
    let (rows, cols) = input.dim();
    let mut padded = Array2::<f64>::zeros((rows + 2 * pad_rows, cols + 2 * pad_cols));
    for r in 0..rows + 2 * pad_rows {
        for c in 0..cols + 2 * pad_cols {
            let src_r = r.saturating_sub(pad_rows).min(rows - 1);
            let src_c = c.saturating_sub(pad_cols).min(cols - 1);
            padded[[r, c]] = input[[src_r, src_c]];
        }
    }
    padded
}
