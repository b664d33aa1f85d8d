//! Real-valued FFT helpers shared by [`crate::trace::Trace`], the resampler and the RFI analysis.
//!
//! Traces use a physically normalised convention: the spectrum of a trace sampled at `fs` is
//! `rfft(x) / fs * sqrt(2)` (the `sqrt(2)` accounts for the omitted negative frequencies) and the
//! inverse multiplies by `fs / sqrt(2)`. The raw `forward`/`inverse` helpers are unnormalised
//! like numpy's `rfft`/`irfft` without the `1/n` factor.

use crate::error::Result;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_complex::Complex64;
use rayon::prelude::*;
use realfft::RealFftPlanner;
use std::f64::consts::SQRT_2;

/// Forward real FFT (unnormalised) of a single lane.
pub fn forward(signal: ArrayView1<f64>) -> Result<Array1<Complex64>> {
    let n = signal.len();
    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let mut input = signal.to_vec();
    let mut spectrum = r2c.make_output_vec();
    r2c.process(&mut input, &mut spectrum)?;
    Ok(Array1::from_vec(spectrum))
}

/// Inverse real FFT (unnormalised) producing `n` samples from `n / 2 + 1` bins.
///
/// The imaginary parts of the DC bin and, for even `n`, the Nyquist bin are discarded, as a real
/// signal cannot carry them.
pub fn inverse(spectrum: ArrayView1<Complex64>, n: usize) -> Result<Array1<f64>> {
    let mut planner = RealFftPlanner::<f64>::new();
    let c2r = planner.plan_fft_inverse(n);
    let mut input = c2r.make_input_vec();
    for (dst, src) in input.iter_mut().zip(spectrum.iter()) {
        *dst = *src;
    }
    if let Some(first) = input.first_mut() {
        first.im = 0.0;
    }
    if n % 2 == 0 {
        if let Some(last) = input.last_mut() {
            last.im = 0.0;
        }
    }
    let mut output = c2r.make_output_vec();
    c2r.process(&mut input, &mut output)?;
    Ok(Array1::from_vec(output))
}

/// Converts time traces (one lane per row) into normalised spectra.
pub fn time2freq(trace: ArrayView2<f64>, sampling_rate: f64) -> Result<Array2<Complex64>> {
    let (rows, n) = trace.dim();
    if n == 0 {
        return Ok(Array2::zeros((rows, 0)));
    }
    let mut spectrum = Array2::<Complex64>::zeros((rows, n / 2 + 1));
    let scale = SQRT_2 / sampling_rate;
    spectrum
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(trace.axis_iter(Axis(0)).into_par_iter())
        .try_for_each(|(mut out, lane)| -> Result<()> {
            let lane_spectrum = forward(lane)?;
            out.assign(&lane_spectrum.mapv(|c| c * scale));
            Ok(())
        })?;
    Ok(spectrum)
}

/// Converts normalised spectra (one lane per row) back into time traces of
/// `(bins - 1) * 2` samples.
pub fn freq2time(spectrum: ArrayView2<Complex64>, sampling_rate: f64) -> Result<Array2<f64>> {
    let (rows, bins) = spectrum.dim();
    let n = bins.saturating_sub(1) * 2;
    let mut trace = Array2::<f64>::zeros((rows, n));
    if n == 0 {
        return Ok(trace);
    }
    // irfft carries a 1/n factor which realfft leaves out
    let scale = sampling_rate / SQRT_2 / n as f64;
    trace
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(spectrum.axis_iter(Axis(0)).into_par_iter())
        .try_for_each(|(mut out, lane)| -> Result<()> {
            let lane_trace = inverse(lane, n)?;
            out.assign(&lane_trace.mapv(|x| x * scale));
            Ok(())
        })?;
    Ok(trace)
}

/// Non-negative frequency grid of a real FFT of `n` samples (numpy's `rfftfreq`).
pub fn rfft_frequencies(n: usize, sampling_rate: f64) -> Array1<f64> {
    if n == 0 {
        return Array1::zeros(0);
    }
    let df = sampling_rate / n as f64;
    Array1::from_shape_fn(n / 2 + 1, |k| k as f64 * df)
}
