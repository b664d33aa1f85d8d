//! This module provides the tapering windows used before spectral analysis of antenna blocks, the
//! double-zero digitizer fault counter and a few order statistics (median, sorted percentile) that
//! the RFI classifier relies on.

use ndarray::{Array1, ArrayViewMut1, Zip};
use num_traits::Float;
use std::f64::consts::PI;

/// Computes a symmetric Hann window of length `m`.
///
/// The implementation follows the definition used by scipy (`sym=True`), i.e. both end points
/// are exactly zero.
///
/// # Arguments
/// - `m`: The window length.
///
/// # Returns
/// The window values. A window of length 1 is `[1.0]`, a window of length 0 is empty.
pub fn hann_window(m: usize) -> Array1<f64> {
    match m {
        0 => Array1::zeros(0),
        1 => Array1::ones(1),
        _ => {
            let denominator = (m - 1) as f64;
            Array1::from_shape_fn(m, |n| 0.5 - 0.5 * (2.0 * PI * n as f64 / denominator).cos())
        }
    }
}

/// Computes a half Hann window: flat at one, with the rising half of a Hann window at the
/// beginning and the falling half at the end.
///
/// # Arguments
/// - `length`: The total window length.
/// - `half_percent`: The fraction of `length` covered by each tapered edge.
///
/// # Returns
/// The window values. The tapered edges span `int(2 * length * half_percent) / 2` samples each.
pub fn half_hann_window(length: usize, half_percent: f64) -> Array1<f64> {
    let hann_window_length = ((2.0 * length as f64 * half_percent) as usize).min(length);
    let hann = hann_window(hann_window_length);
    let mut window = Array1::<f64>::ones(length);

    let half = hann_window_length / 2;
    for i in 0..half {
        window[i] = hann[i];
    }
    // the falling edge uses the second half of the Hann window (rounded towards the end)
    let falling = hann_window_length - half;
    for i in 0..falling {
        window[length - falling + i] = hann[half + i];
    }
    window
}

/// Multiplies a signal in place by a window of the same length.
///
/// # Arguments
/// - `signal`: A mutable view of the signal to modify.
/// - `window`: The window values.
pub fn apply_window(signal: &mut ArrayViewMut1<f64>, window: &Array1<f64>) {
    Zip::from(signal).and(window).for_each(|s, w| {
        *s *= w;
    });
}

/// Counts the number of double zeros, i.e. pairs of consecutive samples which are both zero.
///
/// Runs of zeros are a known fault signature of the digitizer (lost data is replaced by zeros),
/// so this is used to reject bad blocks. A run of `k` zeros counts as `k - 1` double zeros.
pub fn num_double_zeros(data: &[f64]) -> usize {
    data.windows(2)
        .filter(|pair| pair[0] == 0.0 && pair[1] == 0.0)
        .count()
}

/// Median of the given values, averaging the two middle elements for even lengths.
///
/// NaN values are ordered with `total_cmp`, so they sort to the end. Returns NaN for an empty
/// input.
pub fn median<T: Float>(values: &[T]) -> T {
    if values.is_empty() {
        return T::nan();
    }
    let mut sorted = values.to_vec();
    sort_floats(&mut sorted);
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        let two = T::one() + T::one();
        (sorted[n / 2 - 1] + sorted[n / 2]) / two
    }
}

/// Returns the element of an already sorted slice found at `int(len * fraction)`, clamped to the
/// last element.
pub fn sorted_percentile<T: Float>(sorted: &[T], fraction: f64) -> T {
    if sorted.is_empty() {
        return T::nan();
    }
    let index = ((sorted.len() as f64 * fraction) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Sorts floats in ascending order, NaN last.
pub fn sort_floats<T: Float>(values: &mut [T]) {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan())));
}

/// Greatest common divisor of two unsigned integers.
pub fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Finds the rational approximation `numerator / denominator` (reduced) of `ratio`.
///
/// Denominators up to 1000 are tried and the first one reproducing the ratio to within `1e-10` is
/// taken, otherwise the best approximation found.
pub fn find_rational(ratio: f64) -> (usize, usize) {
    let max_factor = 1000;
    let mut best_numerator = 1usize;
    let mut best_denominator = 1usize;
    let mut best_error = f64::MAX;

    for denominator in 1..=max_factor {
        let numerator = (ratio * denominator as f64).round() as usize;
        if numerator == 0 {
            continue;
        }
        let error = (numerator as f64 / denominator as f64 - ratio).abs();
        if error < best_error {
            best_error = error;
            best_numerator = numerator;
            best_denominator = denominator;
            if error < 1e-10 {
                break;
            }
        }
    }

    let g = gcd(best_numerator, best_denominator);
    (best_numerator / g, best_denominator / g)
}
