//! Phase-variance detection of radio frequency interference (RFI).
//!
//! Continuous narrowband transmitters are received by every antenna of a station with a phase
//! relation that stays fixed from block to block, whereas the phase of thermal noise is random.
//! The analysis therefore compares, per frequency channel, the phase of every antenna against a
//! reference antenna over many blocks and flags channels whose relative phase is too stable.
//!
//! # Stages
//!
//! 1. **Block quality**: reject blocks with digitizer faults and measure average antenna power.
//! 2. **Reference antenna**: pick the antenna that lets most other antennas take part and whose
//!    power is closest to the station median.
//! 3. **Phase coherence**: average the per-block relative phasors and powers.
//! 4. **Classification**: compare each channel's median phase stability with the noise floor and
//!    dilate the flagged channels.
//!
//! The [`analysis::analyze`] entry point runs all stages, and [`station_filter`] applies the result
//! to the channel traces of a station.

/// Full analysis entry point and its result.
pub mod analysis;

/// Per-antenna, per-block validity and average power.
pub mod block_quality;

/// Noise floor estimation and contiguous dilation of the flagged channels.
pub mod classifier;

/// Averaged spectra relative to the reference antenna.
pub mod phase_coherence;

/// Reference antenna selection.
pub mod reference;

/// Station-level driver which derives dirty channels for a given trace length and zeroes them in
/// the channel traces.
pub mod station_filter;

/// Fraction of a block tapered at each edge before the FFT.
pub const WINDOW_TAPER_FRACTION: f64 = 0.1;

/// Number of samples per half flag width when dilating dirty channels.
pub const FLAG_WIDTH_SAMPLES: usize = 8192;

/// Returns the band `[lower, upper)` of positive-frequency bin indices of a `block_size` sample
/// FFT whose frequencies lie in `[lower_frequency, upper_frequency)`.
///
/// Both indices are the first bin at or above the respective frequency, searched among the
/// `block_size / 2` bins below the Nyquist frequency.
pub fn frequency_band_indices(
    block_size: usize,
    sample_frequency: f64,
    lower_frequency: f64,
    upper_frequency: f64,
) -> (usize, usize) {
    let half = block_size / 2;
    let df = sample_frequency / block_size as f64;
    let search = |frequency: f64| {
        (0..half)
            .position(|k| k as f64 * df >= frequency)
            .unwrap_or(half)
    };
    (search(lower_frequency), search(upper_frequency))
}
