//! Dual-domain signal container.
//!
//! A [`Trace`] holds one channel (or a vector-valued signal such as a three component electric
//! field) either as a time series or as its real-FFT spectrum. Exactly one representation is held
//! at any time: reading the other one converts the data and drops the previous representation, and
//! every setter replaces the held representation. There is therefore no way to observe a stale
//! cached copy.

use crate::error::{Error, Result};
use crate::fft;
use ndarray::{Array1, Array2, Axis, Zip};
use num_complex::Complex64;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Whether a trace carries a single scalar signal or a vector-valued one (one row per component).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Scalar,
    Vector,
}

/// Conversion of 1D (scalar) and 2D (vector-valued, components x samples) arrays into the
/// row-per-component matrix a [`Trace`] stores.
pub trait IntoChannels<T> {
    fn into_channels(self) -> (ChannelLayout, Array2<T>);
}

impl<T> IntoChannels<T> for Array1<T> {
    fn into_channels(self) -> (ChannelLayout, Array2<T>) {
        (ChannelLayout::Scalar, self.insert_axis(Axis(0)))
    }
}

impl<T> IntoChannels<T> for Array2<T> {
    fn into_channels(self) -> (ChannelLayout, Array2<T>) {
        (ChannelLayout::Vector, self)
    }
}

#[derive(Debug, Clone)]
enum Representation {
    Time(Array2<f64>),
    Frequency(Array2<Complex64>),
}

/// A sampled signal that can be viewed in the time or in the frequency domain.
///
/// # Fields
/// - `sampling_rate`: The inverse of the sample spacing.
/// - `start_time`: The time of the first sample.
/// - `layout`: Scalar or vector-valued signal.
/// - `representation`: The authoritative representation.
#[derive(Debug, Clone)]
pub struct Trace {
    sampling_rate: f64,
    start_time: f64,
    layout: ChannelLayout,
    representation: Representation,
}

fn check_even(samples: usize) -> Result<()> {
    if samples % 2 != 0 {
        return Err(Error::InvalidSampleCount(samples));
    }
    Ok(())
}

impl Trace {
    /// Creates a trace from a time series, either an `Array1` (scalar) or an `Array2`
    /// (components x samples).
    ///
    /// Fails with [`Error::InvalidSampleCount`] if the number of samples is odd.
    pub fn from_time_trace(samples: impl IntoChannels<f64>, sampling_rate: f64) -> Result<Self> {
        let (layout, samples) = samples.into_channels();
        check_even(samples.ncols())?;
        Ok(Trace {
            sampling_rate,
            start_time: 0.0,
            layout,
            representation: Representation::Time(samples),
        })
    }

    /// Creates a trace from a real-FFT spectrum (`n / 2 + 1` bins for `n` time samples).
    pub fn from_frequency_spectrum(
        spectrum: impl IntoChannels<Complex64>,
        sampling_rate: f64,
    ) -> Self {
        let (layout, spectrum) = spectrum.into_channels();
        Trace {
            sampling_rate,
            start_time: 0.0,
            layout,
            representation: Representation::Frequency(spectrum),
        }
    }

    /// Replaces the trace by the given time series. The spectrum, if held, is dropped.
    ///
    /// Fails with [`Error::InvalidSampleCount`] if the number of samples is odd, in which case the
    /// trace is left unchanged.
    pub fn set_time_trace(
        &mut self,
        samples: impl IntoChannels<f64>,
        sampling_rate: f64,
    ) -> Result<()> {
        let (layout, samples) = samples.into_channels();
        check_even(samples.ncols())?;
        self.layout = layout;
        self.sampling_rate = sampling_rate;
        self.representation = Representation::Time(samples);
        Ok(())
    }

    /// Replaces the trace by the given spectrum. The time series, if held, is dropped.
    pub fn set_frequency_spectrum(
        &mut self,
        spectrum: impl IntoChannels<Complex64>,
        sampling_rate: f64,
    ) {
        let (layout, spectrum) = spectrum.into_channels();
        self.layout = layout;
        self.sampling_rate = sampling_rate;
        self.representation = Representation::Frequency(spectrum);
    }

    /// Returns the time series (components x samples), converting from the spectrum if needed.
    ///
    /// After the conversion the spectrum is discarded.
    pub fn time_trace(&mut self) -> Result<&Array2<f64>> {
        self.ensure_time_domain().map(|trace| &*trace)
    }

    /// Mutable access to the time series. Edits become authoritative.
    pub fn time_trace_mut(&mut self) -> Result<&mut Array2<f64>> {
        self.ensure_time_domain()
    }

    /// Returns the spectrum (components x bins), converting from the time series if needed.
    ///
    /// After the conversion the time series is discarded.
    pub fn frequency_spectrum(&mut self) -> Result<&Array2<Complex64>> {
        self.ensure_frequency_domain().map(|spectrum| &*spectrum)
    }

    /// Mutable access to the spectrum. Edits become authoritative.
    pub fn frequency_spectrum_mut(&mut self) -> Result<&mut Array2<Complex64>> {
        self.ensure_frequency_domain()
    }

    /// Returns a copy of the time series without changing the held representation.
    pub fn to_time_trace(&self) -> Result<Array2<f64>> {
        match &self.representation {
            Representation::Time(trace) => Ok(trace.clone()),
            Representation::Frequency(spectrum) => {
                fft::freq2time(spectrum.view(), self.sampling_rate)
            }
        }
    }

    fn ensure_time_domain(&mut self) -> Result<&mut Array2<f64>> {
        if let Representation::Frequency(spectrum) = &self.representation {
            let trace = fft::freq2time(spectrum.view(), self.sampling_rate)?;
            self.representation = Representation::Time(trace);
        }
        match &mut self.representation {
            Representation::Time(trace) => Ok(trace),
            Representation::Frequency(_) => Err(Error::IncompatibleTrace(
                "trace holds no time series".to_string(),
            )),
        }
    }

    fn ensure_frequency_domain(&mut self) -> Result<&mut Array2<Complex64>> {
        if let Representation::Time(trace) = &self.representation {
            let spectrum = fft::time2freq(trace.view(), self.sampling_rate)?;
            self.representation = Representation::Frequency(spectrum);
        }
        match &mut self.representation {
            Representation::Frequency(spectrum) => Ok(spectrum),
            Representation::Time(_) => Err(Error::IncompatibleTrace(
                "trace holds no spectrum".to_string(),
            )),
        }
    }

    /// `true` if the time series is the held representation.
    pub fn is_time_domain(&self) -> bool {
        matches!(self.representation, Representation::Time(_))
    }

    /// `true` if the spectrum is the held representation.
    pub fn is_frequency_domain(&self) -> bool {
        matches!(self.representation, Representation::Frequency(_))
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Number of rows (1 for scalar traces).
    pub fn channel_count(&self) -> usize {
        match &self.representation {
            Representation::Time(trace) => trace.nrows(),
            Representation::Frequency(spectrum) => spectrum.nrows(),
        }
    }

    /// Number of samples in the time domain, independent of the held representation.
    pub fn number_of_samples(&self) -> usize {
        match &self.representation {
            Representation::Time(trace) => trace.ncols(),
            Representation::Frequency(spectrum) => spectrum.ncols().saturating_sub(1) * 2,
        }
    }

    pub fn has_samples(&self) -> bool {
        self.number_of_samples() > 0 && self.channel_count() > 0
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn set_start_time(&mut self, start_time: f64) {
        self.start_time = start_time;
    }

    pub fn add_start_time(&mut self, delta: f64) {
        self.start_time += delta;
    }

    /// Duration covered by the samples, `n / sampling_rate`.
    pub fn duration(&self) -> f64 {
        self.number_of_samples() as f64 / self.sampling_rate
    }

    /// Non-negative frequency bins of the current sample count and rate.
    pub fn frequencies(&self) -> Array1<f64> {
        fft::rfft_frequencies(self.number_of_samples(), self.sampling_rate)
    }

    /// Sample times `start_time + k / sampling_rate`.
    ///
    /// Returns an empty array (and logs an error) if the sampling rate cannot describe the samples.
    pub fn times(&self) -> Array1<f64> {
        let n = self.number_of_samples();
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            log::error!(
                "time array cannot be built for the trace. n_samples = {n}, sampling rate = {:.5e}",
                self.sampling_rate
            );
            return Array1::zeros(0);
        }
        Array1::from_shape_fn(n, |k| self.start_time + k as f64 / self.sampling_rate)
    }

    /// Shifts the trace by `delta_t` using the Fourier shift theorem.
    ///
    /// This is a cyclic shift: samples moved past the end reappear at the beginning. A warning is
    /// logged if the shift exceeds 10% of the trace duration, unless `silent` is set.
    pub fn apply_time_shift(&mut self, delta_t: f64, silent: bool) -> Result<()> {
        if let Some(message) = self.shift_warning(delta_t, silent) {
            log::warn!("{message}");
        }
        let frequencies = self.frequencies();
        let spectrum = self.frequency_spectrum_mut()?;
        for mut lane in spectrum.axis_iter_mut(Axis(0)) {
            Zip::from(&mut lane).and(&frequencies).for_each(|s, f| {
                *s *= Complex64::from_polar(1.0, -2.0 * PI * f * delta_t);
            });
        }
        Ok(())
    }

    /// The warning [`Trace::apply_time_shift`] logs for `delta_t`, if any.
    fn shift_warning(&self, delta_t: f64, silent: bool) -> Option<String> {
        let duration = self.duration();
        (!silent && delta_t.abs() > 0.1 * duration).then(|| {
            format!("trace is shifted by {delta_t:.5e}, more than 10% of its length ({duration:.5e})")
        })
    }

    /// Sets the given frequency bins of every component to zero. Bins outside the spectrum are
    /// ignored.
    pub fn zero_frequency_bins(&mut self, bins: &[usize]) -> Result<()> {
        let spectrum = self.frequency_spectrum_mut()?;
        let n_bins = spectrum.ncols();
        for &bin in bins.iter().filter(|&&bin| bin < n_bins) {
            spectrum.column_mut(bin).fill(Complex64::new(0.0, 0.0));
        }
        Ok(())
    }

    /// Magnitude of the analytic signal of every component.
    pub fn hilbert_envelope(&self) -> Result<Array2<f64>> {
        let trace = self.to_time_trace()?;
        let (rows, n) = trace.dim();
        let mut envelope = Array2::<f64>::zeros((rows, n));
        if n == 0 {
            return Ok(envelope);
        }

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);

        // analytic signal: keep DC and Nyquist, double positive and drop negative frequencies
        let gain = Array1::from_shape_fn(n, |k| {
            if k == 0 || (n % 2 == 0 && k == n / 2) {
                1.0
            } else if k < n.div_ceil(2) {
                2.0
            } else {
                0.0
            }
        });

        for (lane, mut out) in trace.axis_iter(Axis(0)).zip(envelope.axis_iter_mut(Axis(0))) {
            let mut buffer: Vec<Complex64> =
                lane.iter().map(|&x| Complex64::new(x, 0.0)).collect();
            forward.process(&mut buffer);
            for (b, g) in buffer.iter_mut().zip(gain.iter()) {
                *b *= g;
            }
            inverse.process(&mut buffer);
            for (o, b) in out.iter_mut().zip(buffer.iter()) {
                *o = b.norm() / n as f64;
            }
        }
        Ok(envelope)
    }

    /// Euclidean norm of the Hilbert envelope across the components.
    pub fn hilbert_envelope_magnitude(&self) -> Result<Array1<f64>> {
        let envelope = self.hilbert_envelope()?;
        Ok(envelope
            .map_axis(Axis(0), |column| column.iter().map(|x| x * x).sum::<f64>().sqrt()))
    }

    /// Snapshot of the trace in the time domain for persistence.
    pub fn to_record(&self) -> Result<TraceRecord> {
        Ok(TraceRecord {
            sampling_rate: self.sampling_rate,
            start_time: self.start_time,
            layout: self.layout,
            time_trace: self.to_time_trace()?,
        })
    }
}

/// Serialisable form of a [`Trace`]: sampling rate, start time and time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub sampling_rate: f64,
    pub start_time: f64,
    pub layout: ChannelLayout,
    pub time_trace: Array2<f64>,
}

impl TryFrom<TraceRecord> for Trace {
    type Error = Error;

    fn try_from(record: TraceRecord) -> Result<Self> {
        if record.layout == ChannelLayout::Scalar && record.time_trace.nrows() != 1 {
            return Err(Error::IncompatibleTrace(format!(
                "scalar trace record has {} rows",
                record.time_trace.nrows()
            )));
        }
        check_even(record.time_trace.ncols())?;
        Ok(Trace {
            sampling_rate: record.sampling_rate,
            start_time: record.start_time,
            layout: record.layout,
            representation: Representation::Time(record.time_trace),
        })
    }
}
