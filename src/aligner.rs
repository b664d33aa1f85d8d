//! Additive combination of two traces recorded at different start times and sampling rates.
//!
//! The lower-rate trace is brought to the higher rate by FFT resampling with a rational factor
//! `p / q` (upsample by `p`, then downsample by `q`). Both traces are then zero-padded to a common
//! even length that covers both time ranges, the later trace is moved to its position with a
//! sub-sample accurate Fourier shift, and the buffers are summed.

use crate::error::{Error, Result};
use crate::fft;
use crate::math_tools::find_rational;
use crate::trace::{ChannelLayout, Trace};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_complex::Complex64;
use std::ops::Add;

/// Resamples a real signal to `num` samples using the Fourier method.
///
/// The spectrum is truncated or zero-padded. For an even number of retained bins the Nyquist
/// component is halved when upsampling and doubled when downsampling, so the result matches a
/// resampling of the periodic signal.
pub fn resample(signal: ArrayView1<f64>, num: usize) -> Result<Array1<f64>> {
    let nx = signal.len();
    if nx == 0 || num == 0 {
        return Ok(Array1::zeros(num));
    }
    if num == nx {
        return Ok(signal.to_owned());
    }

    let x = fft::forward(signal)?;
    let mut y = Array1::<Complex64>::zeros(num / 2 + 1);
    let n = num.min(nx);
    let nyquist = n / 2 + 1;
    y.slice_mut(s![..nyquist]).assign(&x.slice(s![..nyquist]));

    if n % 2 == 0 {
        if num < nx {
            y[n / 2] *= 2.0;
        } else {
            y[n / 2] *= 0.5;
        }
    }

    // irfft(y, num) * num / nx, realfft omits the 1/num of irfft
    let output = fft::inverse(y.view(), num)?;
    Ok(output.mapv(|v| v / nx as f64))
}

fn resample_rows(trace: ArrayView2<f64>, num: usize) -> Result<Array2<f64>> {
    let mut resampled = Array2::<f64>::zeros((trace.nrows(), num));
    for (lane, mut out) in trace.axis_iter(Axis(0)).zip(resampled.axis_iter_mut(Axis(0))) {
        out.assign(&resample(lane, num)?);
    }
    Ok(resampled)
}

/// Brings a trace sampled at `rate` to `target_rate > rate`.
fn upsample_to(trace: Array2<f64>, rate: f64, target_rate: f64) -> Result<Array2<f64>> {
    let (numerator, denominator) = find_rational(target_rate / rate);
    log::debug!("resampling trace from {rate} to {target_rate} by {numerator}/{denominator}");
    let mut trace = trace;
    if numerator != 1 {
        let num = numerator * trace.ncols();
        trace = resample_rows(trace.view(), num)?;
    }
    if denominator != 1 {
        let num = trace.ncols() / denominator;
        trace = resample_rows(trace.view(), num)?;
    }
    Ok(trace)
}

/// Places `trace` at the beginning of a zero buffer of `length` samples.
fn zero_pad(trace: &Array2<f64>, length: usize) -> Array2<f64> {
    let mut padded = Array2::<f64>::zeros((trace.nrows(), length));
    let n = trace.ncols().min(length);
    padded
        .slice_mut(s![.., ..n])
        .assign(&trace.slice(s![.., ..n]));
    padded
}

/// Returns the sample-wise sum of two traces.
///
/// The result is sampled at the higher of the two rates, starts at the earlier start time and is
/// long enough (rounded up to an even sample count) to hold both traces.
///
/// Fails with [`Error::IncompatibleTrace`] if either trace has no samples or the two traces have
/// a different channel layout or component count.
pub fn combine(first: &Trace, second: &Trace) -> Result<Trace> {
    if !first.has_samples() || !second.has_samples() {
        return Err(Error::IncompatibleTrace(
            "one of the traces has no samples set".to_string(),
        ));
    }
    if first.layout() != second.layout() || first.channel_count() != second.channel_count() {
        return Err(Error::IncompatibleTrace(format!(
            "traces have different dimensions ({:?} x {} and {:?} x {})",
            first.layout(),
            first.channel_count(),
            second.layout(),
            second.channel_count()
        )));
    }

    let mut trace_1 = first.to_time_trace()?;
    let mut trace_2 = second.to_time_trace()?;
    let rate_1 = first.sampling_rate();
    let rate_2 = second.sampling_rate();

    let sampling_rate = if rate_1 > rate_2 {
        trace_2 = upsample_to(trace_2, rate_2, rate_1)?;
        rate_1
    } else if rate_2 > rate_1 {
        trace_1 = upsample_to(trace_1, rate_1, rate_2)?;
        rate_2
    } else {
        rate_1
    };

    let (early, late, trace_start, time_offset) = if first.start_time() <= second.start_time() {
        (
            trace_1,
            trace_2,
            first.start_time(),
            second.start_time() - first.start_time(),
        )
    } else {
        (
            trace_2,
            trace_1,
            second.start_time(),
            first.start_time() - second.start_time(),
        )
    };

    let i_start = (time_offset * sampling_rate).round() as usize;
    let mut trace_length = early.ncols().max(i_start + late.ncols());
    trace_length += trace_length % 2;

    let early = zero_pad(&early, trace_length);
    let mut late_trace = Trace::from_time_trace(zero_pad(&late, trace_length), sampling_rate)?;
    late_trace.apply_time_shift(time_offset, true)?;

    let summed = early + late_trace.time_trace()?;
    let mut combined = match first.layout() {
        ChannelLayout::Scalar => {
            Trace::from_time_trace(summed.index_axis_move(Axis(0), 0), sampling_rate)?
        }
        ChannelLayout::Vector => Trace::from_time_trace(summed, sampling_rate)?,
    };
    combined.set_start_time(trace_start);
    Ok(combined)
}

impl Add for &Trace {
    type Output = Result<Trace>;

    fn add(self, other: Self) -> Self::Output {
        combine(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn tone(n: usize, rate: f64, frequency: f64) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| (2.0 * PI * frequency * i as f64 / rate).sin())
    }

    #[test]
    fn test_adding_zeros_returns_the_original() {
        let x = tone(200, 100.0, 7.0) + 0.3;
        let mut a = Trace::from_time_trace(x.clone(), 100.0).unwrap();
        a.set_start_time(2.0);
        let mut zeros = Trace::from_time_trace(Array1::<f64>::zeros(200), 100.0).unwrap();
        zeros.set_start_time(2.0);

        let mut sum = (&a + &zeros).unwrap();
        assert_eq!(sum.start_time(), 2.0);
        assert_eq!(sum.number_of_samples(), 200);
        for (expected, actual) in x.iter().zip(sum.time_trace().unwrap().row(0).iter()) {
            assert_abs_diff_eq!(expected, actual, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_combined_length_covers_both_traces() {
        let rate = 10.0;
        let mut a = Trace::from_time_trace(Array1::<f64>::ones(40), rate).unwrap();
        a.set_start_time(1.0);
        let mut b = Trace::from_time_trace(Array1::<f64>::ones(30), rate).unwrap();
        b.set_start_time(4.3);

        let sum = combine(&b, &a).unwrap();
        assert_eq!(sum.start_time(), 1.0);
        // max(5.0, 7.3) - 1.0 = 6.3 s -> 63 samples -> 64
        assert_eq!(sum.number_of_samples(), 64);
        assert_eq!(sum.sampling_rate(), rate);
    }

    #[test]
    fn test_later_trace_lands_at_its_offset() {
        let rate = 1.0;
        let mut pulse = Array1::<f64>::zeros(8);
        pulse[0] = 1.0;
        let early = Trace::from_time_trace(Array1::<f64>::zeros(16), rate).unwrap();
        let mut late = Trace::from_time_trace(pulse, rate).unwrap();
        late.set_start_time(5.0);

        let mut sum = combine(&early, &late).unwrap();
        let samples = sum.time_trace().unwrap();
        assert_eq!(samples.ncols(), 16);
        assert_abs_diff_eq!(samples[[0, 5]], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(samples[[0, 4]], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_lower_rate_trace_is_resampled_to_the_higher_rate() {
        let slow = Trace::from_time_trace(tone(1000, 1000.0, 5.0), 1000.0).unwrap();
        let fast = Trace::from_time_trace(Array1::<f64>::zeros(2000), 2000.0).unwrap();

        let mut sum = combine(&slow, &fast).unwrap();
        assert_eq!(sum.sampling_rate(), 2000.0);
        assert_eq!(sum.number_of_samples(), 2000);

        let expected = tone(2000, 2000.0, 5.0);
        for (e, a) in expected.iter().zip(sum.time_trace().unwrap().row(0).iter()) {
            assert_abs_diff_eq!(e, a, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_non_integer_rate_ratio_goes_up_then_down() {
        // 3000 / 2000 = 3 / 2: 2000 -> 6000 -> 3000 samples
        let mut slow = Trace::from_time_trace(tone(2000, 2000.0, 7.0), 2000.0).unwrap();
        slow.set_start_time(0.25);
        let mut fast = Trace::from_time_trace(Array1::<f64>::zeros(3000), 3000.0).unwrap();
        fast.set_start_time(0.25);

        let mut sum = combine(&fast, &slow).unwrap();
        assert_eq!(sum.sampling_rate(), 3000.0);
        assert_eq!(sum.number_of_samples(), 3000);
        assert_eq!(sum.start_time(), 0.25);

        let expected = tone(3000, 3000.0, 7.0);
        for (e, a) in expected.iter().zip(sum.time_trace().unwrap().row(0).iter()) {
            assert_abs_diff_eq!(e, a, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_resample_down_and_up_keeps_band_limited_content() {
        let x = tone(300, 300.0, 4.0);
        let down = resample(x.view(), 200).unwrap();
        let expected = tone(200, 200.0, 4.0);
        for (e, a) in expected.iter().zip(down.iter()) {
            assert_abs_diff_eq!(e, a, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_incompatible_traces_are_rejected() {
        let scalar = Trace::from_time_trace(Array1::<f64>::zeros(8), 1.0).unwrap();
        let vector = Trace::from_time_trace(Array2::<f64>::zeros((3, 8)), 1.0).unwrap();
        assert_eq!(vector.layout(), ChannelLayout::Vector);
        assert!(matches!(
            combine(&scalar, &vector),
            Err(Error::IncompatibleTrace(_))
        ));

        let empty = Trace::from_time_trace(Array1::<f64>::zeros(0), 1.0).unwrap();
        assert!(matches!(
            combine(&scalar, &empty),
            Err(Error::IncompatibleTrace(_))
        ));
    }

    #[test]
    fn test_vector_traces_are_summed_per_component() {
        let mut a = Array2::<f64>::zeros((3, 8));
        a.row_mut(0).fill(1.0);
        let mut b = Array2::<f64>::zeros((3, 8));
        b.row_mut(2).fill(2.0);
        let a = Trace::from_time_trace(a, 1.0).unwrap();
        let b = Trace::from_time_trace(b, 1.0).unwrap();

        let mut sum = combine(&a, &b).unwrap();
        assert_eq!(sum.layout(), ChannelLayout::Vector);
        let samples = sum.time_trace().unwrap();
        assert_abs_diff_eq!(samples[[0, 3]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(samples[[1, 3]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(samples[[2, 3]], 2.0, epsilon = 1e-12);
    }
}
